// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Tree-walking evaluation of statements and expressions.

use std::collections::HashSet;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use num_traits::Zero;

use crate::engine::ContextId;
use crate::engine::Frame;
use crate::engine::JsResult;
use crate::engine::ast::AssignOp;
use crate::engine::ast::BinaryOp;
use crate::engine::ast::Block;
use crate::engine::ast::DEFAULT_EXPORT_BINDING;
use crate::engine::ast::Expr;
use crate::engine::ast::ExprKind;
use crate::engine::ast::ForBinding;
use crate::engine::ast::ForInit;
use crate::engine::ast::FunctionBody;
use crate::engine::ast::FunctionNode;
use crate::engine::ast::LexicalDecl;
use crate::engine::ast::LogicalOp;
use crate::engine::ast::MemberProp;
use crate::engine::ast::Program;
use crate::engine::ast::PropDef;
use crate::engine::ast::PropName;
use crate::engine::ast::Span;
use crate::engine::ast::Stmt;
use crate::engine::ast::StmtKind;
use crate::engine::ast::SwitchCase;
use crate::engine::ast::UnaryOp;
use crate::engine::ast::VarDeclarator;
use crate::engine::ast::VarKind;
use crate::engine::conversion::f64_to_int32;
use crate::engine::conversion::f64_to_uint32;
use crate::engine::env::Binding;
use crate::engine::env::Env;
use crate::engine::env::Mutability;
use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::heap::Cell;
use crate::engine::object;
use crate::engine::object::Attributes;
use crate::engine::object::FunctionData;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropertyDescriptor;
use crate::engine::ops;
use crate::engine::source::SourceInfo;
use crate::engine::value::EnvRef;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

/// How a statement finished.
pub(crate) enum Completion {
  Normal(Option<JsValue>),
  Return(JsValue),
  Break(Option<JsStr>),
  Continue(Option<JsStr>),
}

/// Per-activation evaluation state.
struct Activation {
  env: EnvRef,
  strict: bool,
  source: Rc<SourceInfo>,
}

enum Reference {
  Declarative(EnvRef, JsStr),
  Object(ObjRef, JsStr),
  Unresolved(JsStr),
  Property(JsValue, PropertyKey),
}

fn mark(cx: &mut Isolate, span: Span) {
  if let Some(frame) = cx.vm.frames.last_mut() {
    frame.span = span;
  }
}

fn new_env(cx: &mut Isolate, parent: EnvRef) -> EnvRef {
  cx.vm.heap.alloc(Cell::Env(Env::declarative(Some(parent))))
}

fn declare_lexical(cx: &mut Isolate, env: EnvRef, decls: &[LexicalDecl]) {
  let env = cx.vm.heap.env_mut(env);
  for decl in decls {
    let mutability = if decl.is_const {
      Mutability::Const
    } else {
      Mutability::Mutable
    };
    env.declare(decl.name.clone(), None, mutability);
  }
}

fn declare_functions(
  cx: &mut Isolate,
  env: EnvRef,
  functions: &[Rc<FunctionNode>],
  source: &Rc<SourceInfo>,
) {
  for node in functions {
    // Anonymous declarations only occur as `export default function`.
    let closure = make_function(cx, node, env, source, Some("default".into()));
    let name = node
      .name
      .clone()
      .unwrap_or_else(|| DEFAULT_EXPORT_BINDING.into());
    cx.vm
      .heap
      .env_mut(env)
      .declare(name, Some(JsValue::Object(closure)), Mutability::Mutable);
  }
}

// Functions

/// Creates a closure over `env`. `name` overrides the node's own name for
/// anonymous functions that get one from their context.
pub(crate) fn make_function(
  cx: &mut Isolate,
  node: &Rc<FunctionNode>,
  env: EnvRef,
  source: &Rc<SourceInfo>,
  name: Option<JsStr>,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let intrinsics = &cx.vm.realm(realm).intrinsics;
  let (function_prototype, object_prototype) =
    (intrinsics.function_prototype, intrinsics.object_prototype);
  let is_constructor = !node.is_arrow;
  let mut object = JsObject::with_class(
    Some(function_prototype),
    realm,
    ObjectClass::Function(Box::new(FunctionData {
      kind: FunctionKind::Script {
        node: node.clone(),
        env,
        source: source.clone(),
      },
      is_constructor,
    })),
  );
  let display_name = match (&node.name, name) {
    (Some(own), _) => own.clone(),
    (None, Some(given)) => given,
    (None, None) => "".into(),
  };
  object.insert(
    PropertyKey::str("length"),
    JsValue::Number(node.params.len() as f64),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  object.insert(
    PropertyKey::str("name"),
    JsValue::String(display_name),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  let id = ops::alloc(cx, object);
  if is_constructor {
    let mut prototype = JsObject::ordinary(Some(object_prototype), realm);
    prototype.insert(
      PropertyKey::str("constructor"),
      JsValue::Object(id),
      Attributes::HIDDEN,
    );
    let prototype = ops::alloc(cx, prototype);
    cx.vm.heap.object_mut(id).insert(
      PropertyKey::str("prototype"),
      JsValue::Object(prototype),
      Attributes {
        writable: true,
        enumerable: false,
        configurable: false,
      },
    );
  }
  id
}

/// A function expression: named ones see their own name in an intermediate
/// scope.
fn function_expression(
  cx: &mut Isolate,
  act: &Activation,
  node: &Rc<FunctionNode>,
  name: Option<JsStr>,
) -> ObjRef {
  match (&node.name, node.binds_own_name) {
    (Some(own), true) => {
      let env = new_env(cx, act.env);
      let closure = make_function(cx, node, env, &act.source, None);
      cx.vm.heap.env_mut(env).declare(
        own.clone(),
        Some(JsValue::Object(closure)),
        Mutability::FunctionName,
      );
      closure
    }
    (None, _) => make_function(
      cx,
      node,
      act.env,
      &act.source,
      Some(name.unwrap_or_else(|| "".into())),
    ),
    _ => make_function(cx, node, act.env, &act.source, None),
  }
}

/// [[Call]] for functions defined in script.
pub(crate) fn call_script_function(
  cx: &mut Isolate,
  callee: ObjRef,
  this: JsValue,
  args: &[JsValue],
  new_target: Option<ObjRef>,
) -> JsResult<JsValue> {
  ops::check_interrupts(cx)?;
  let object = cx.vm.heap.object(callee);
  let realm = object.realm;
  let Some(FunctionKind::Script { node, env, source }) =
    object.function_data().map(|d| &d.kind)
  else {
    unreachable!("call_script_function on a non-script function");
  };
  let (node, env, source) = (node.clone(), *env, source.clone());

  cx.vm.frames.push(Frame {
    function: Some(callee),
    name: object::function_name(&cx.vm.heap, callee),
    source: Some(source.clone()),
    span: node.span,
    realm,
    is_constructor: new_target.is_some(),
  });
  let result = call_frame(cx, callee, &node, env, source, this, args);
  cx.vm.frames.pop();
  result
}

fn call_frame(
  cx: &mut Isolate,
  callee: ObjRef,
  node: &Rc<FunctionNode>,
  parent: EnvRef,
  source: Rc<SourceInfo>,
  this: JsValue,
  args: &[JsValue],
) -> JsResult<JsValue> {
  let strict = node.strict || cx.vm.config.strict;
  let this = if node.is_arrow {
    None
  } else if strict {
    Some(this)
  } else {
    Some(match this {
      JsValue::Undefined | JsValue::Null => {
        let realm = cx.vm.heap.object(callee).realm;
        JsValue::Object(cx.vm.realm(realm).global_object)
      }
      JsValue::Object(_) => this,
      primitive => JsValue::Object(ops::wrap_primitive(cx, primitive)),
    })
  };

  let mut env = Env::declarative(Some(parent));
  env.this = this;
  env.function = Some(callee);
  for (i, param) in node.params.iter().enumerate() {
    env.declare(
      param.clone(),
      Some(args.get(i).cloned().unwrap_or_default()),
      Mutability::Mutable,
    );
  }
  let needs_arguments = node.uses_arguments
    && !node.params.iter().any(|p| &**p == "arguments")
    && !node
      .scope
      .functions
      .iter()
      .any(|f| f.name.as_deref() == Some("arguments"));
  let env = cx.vm.heap.alloc(Cell::Env(env));

  if needs_arguments {
    let arguments = create_arguments_object(cx, callee, args, strict);
    cx.vm.heap.env_mut(env).declare(
      "arguments".into(),
      Some(JsValue::Object(arguments)),
      Mutability::Mutable,
    );
  }
  {
    let env = cx.vm.heap.env_mut(env);
    for name in &node.scope.var_names {
      if !env.bindings.contains_key(name) {
        env.declare(
          name.clone(),
          Some(JsValue::Undefined),
          Mutability::Mutable,
        );
      }
    }
  }
  declare_functions(cx, env, &node.scope.functions, &source);
  declare_lexical(cx, env, &node.lexical);

  let mut act = Activation {
    env,
    strict,
    source,
  };
  match &node.body {
    FunctionBody::Expression(body) => expr(cx, &mut act, body),
    FunctionBody::Block(body) => match statements(cx, &mut act, body)? {
      Completion::Return(value) => Ok(value),
      _ => Ok(JsValue::Undefined),
    },
  }
}

fn create_arguments_object(
  cx: &mut Isolate,
  callee: ObjRef,
  args: &[JsValue],
  strict: bool,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let proto = cx.vm.realm(realm).intrinsics.object_prototype;
  let mut object = JsObject::with_class(
    Some(proto),
    realm,
    ObjectClass::Arguments,
  );
  for (i, arg) in args.iter().enumerate() {
    object.insert(PropertyKey::index(i), arg.clone(), Attributes::DEFAULT);
  }
  object.insert(
    PropertyKey::str("length"),
    JsValue::Number(args.len() as f64),
    Attributes::HIDDEN,
  );
  if !strict {
    object.insert(
      PropertyKey::str("callee"),
      JsValue::Object(callee),
      Attributes::HIDDEN,
    );
  }
  ops::alloc(cx, object)
}

// Scripts and modules

fn syntax_error(cx: &mut Isolate, message: String) -> crate::engine::Abrupt {
  error::throw_error(cx, ErrorKind::SyntaxError, &message)
}

/// GlobalDeclarationInstantiation followed by evaluation of the body.
/// Returns the completion value.
pub(crate) fn run_script(
  cx: &mut Isolate,
  program: &Rc<Program>,
  source: &Rc<SourceInfo>,
  realm: ContextId,
) -> JsResult<JsValue> {
  cx.vm.frames.push(Frame {
    function: None,
    name: "".into(),
    source: Some(source.clone()),
    span: Span::default(),
    realm,
    is_constructor: false,
  });
  let result = run_script_frame(cx, program, source, realm);
  cx.vm.frames.pop();
  result
}

fn run_script_frame(
  cx: &mut Isolate,
  program: &Rc<Program>,
  source: &Rc<SourceInfo>,
  realm: ContextId,
) -> JsResult<JsValue> {
  let global = cx.vm.realm(realm).global_object;
  let global_env = cx.vm.realm(realm).global_env;

  for decl in &program.lexical {
    let key = PropertyKey::String(decl.name.clone());
    let clash = cx.vm.heap.env(global_env).bindings.contains_key(&decl.name)
      || object::get_own_property(&cx.vm.heap, global, &key)
        .is_some_and(|p| !p.attrs.configurable);
    if clash {
      return Err(syntax_error(
        cx,
        format!("Identifier '{}' has already been declared", decl.name),
      ));
    }
  }
  for name in &program.scope.var_names {
    if cx.vm.heap.env(global_env).bindings.contains_key(name) {
      return Err(syntax_error(
        cx,
        format!("Identifier '{name}' has already been declared"),
      ));
    }
  }

  let declared = Attributes {
    writable: true,
    enumerable: true,
    configurable: false,
  };
  for name in &program.scope.var_names {
    let key = PropertyKey::String(name.clone());
    if !ops::has_own_property(cx, global, &key)? {
      ops::define_property_or_throw(
        cx,
        global,
        key,
        PropertyDescriptor::data(JsValue::Undefined, declared),
      )?;
    }
  }
  for node in &program.scope.functions {
    let closure = make_function(
      cx,
      node,
      global_env,
      source,
      Some("default".into()),
    );
    let name = node
      .name
      .clone()
      .unwrap_or_else(|| DEFAULT_EXPORT_BINDING.into());
    let key = PropertyKey::String(name);
    let replaceable = object::get_own_property(&cx.vm.heap, global, &key)
      .is_none_or(|p| p.attrs.configurable);
    if replaceable {
      ops::define_property_or_throw(
        cx,
        global,
        key,
        PropertyDescriptor::data(JsValue::Object(closure), declared),
      )?;
    } else {
      ops::put(cx, global, key, JsValue::Object(closure), true)?;
    }
  }
  declare_lexical(cx, global_env, &program.lexical);

  let mut act = Activation {
    env: global_env,
    strict: program.strict || cx.vm.config.strict,
    source: source.clone(),
  };
  match statements(cx, &mut act, &program.body)? {
    Completion::Normal(value) => Ok(value.unwrap_or_default()),
    Completion::Return(value) => Ok(value),
    Completion::Break(_) | Completion::Continue(_) => Ok(JsValue::Undefined),
  }
}

/// Runs a linked module body in its environment.
pub(crate) fn run_module_body(
  cx: &mut Isolate,
  program: &Rc<Program>,
  source: &Rc<SourceInfo>,
  env: EnvRef,
  realm: ContextId,
) -> JsResult<()> {
  cx.vm.frames.push(Frame {
    function: None,
    name: "".into(),
    source: Some(source.clone()),
    span: Span::default(),
    realm,
    is_constructor: false,
  });
  let mut act = Activation {
    env,
    strict: true,
    source: source.clone(),
  };
  let result = statements(cx, &mut act, &program.body);
  cx.vm.frames.pop();
  result.map(|_| ())
}

// Bindings

fn resolve(
  cx: &mut Isolate,
  mut env: EnvRef,
  name: &JsStr,
) -> JsResult<Reference> {
  loop {
    let record = cx.vm.heap.env(env);
    let parent = record.parent;
    if let Some(object) = record.object {
      if ops::has_property(cx, object, &PropertyKey::String(name.clone()))? {
        return Ok(Reference::Object(object, name.clone()));
      }
    } else if record.bindings.contains_key(name) {
      return Ok(Reference::Declarative(env, name.clone()));
    }
    match parent {
      Some(parent) => env = parent,
      None => return Ok(Reference::Unresolved(name.clone())),
    }
  }
}

fn read_binding(
  cx: &mut Isolate,
  env: EnvRef,
  name: &JsStr,
) -> JsResult<JsValue> {
  let binding = cx.vm.heap.env(env).bindings.get(name).cloned();
  match binding {
    Some(Binding::Value {
      value: Some(value), ..
    }) => Ok(value),
    Some(Binding::Value { value: None, .. }) => Err(error::reference_error(
      cx,
      format!("Cannot access '{name}' before initialization"),
    )),
    Some(Binding::Import { env, name }) => read_binding(cx, env, &name),
    None => Err(error::reference_error(cx, format!("{name} is not defined"))),
  }
}

fn write_binding(
  cx: &mut Isolate,
  env: EnvRef,
  name: &JsStr,
  value: JsValue,
  strict: bool,
) -> JsResult<()> {
  let binding = cx.vm.heap.env(env).bindings.get(name).cloned();
  match binding {
    Some(Binding::Value { value: None, .. }) => Err(error::reference_error(
      cx,
      format!("Cannot access '{name}' before initialization"),
    )),
    Some(Binding::Value {
      mutability: Mutability::Mutable,
      ..
    }) => {
      if let Some(Binding::Value { value: slot, .. }) =
        cx.vm.heap.env_mut(env).bindings.get_mut(name)
      {
        *slot = Some(value);
      }
      Ok(())
    }
    Some(Binding::Value {
      mutability: Mutability::FunctionName,
      ..
    }) if !strict => Ok(()),
    Some(_) => Err(error::type_error(cx, "Assignment to constant variable.")),
    None => Err(error::reference_error(cx, format!("{name} is not defined"))),
  }
}

/// Ends the temporal dead zone of a lexical binding.
fn initialize_binding(
  cx: &mut Isolate,
  mut env: EnvRef,
  name: &JsStr,
  value: JsValue,
) {
  loop {
    let record = cx.vm.heap.env_mut(env);
    if let Some(Binding::Value { value: slot, .. }) =
      record.bindings.get_mut(name)
    {
      *slot = Some(value);
      return;
    }
    match record.parent {
      Some(parent) => env = parent,
      None => return,
    }
  }
}

fn get_reference(cx: &mut Isolate, reference: &Reference) -> JsResult<JsValue> {
  match reference {
    Reference::Declarative(env, name) => read_binding(cx, *env, name),
    Reference::Object(object, name) => {
      ops::get(cx, *object, &PropertyKey::String(name.clone()))
    }
    Reference::Unresolved(name) => {
      Err(error::reference_error(cx, format!("{name} is not defined")))
    }
    Reference::Property(base, key) => ops::get_value(cx, base, key),
  }
}

fn put_reference(
  cx: &mut Isolate,
  act: &Activation,
  reference: Reference,
  value: JsValue,
) -> JsResult<()> {
  match reference {
    Reference::Declarative(env, name) => {
      write_binding(cx, env, &name, value, act.strict)
    }
    Reference::Object(object, name) => {
      ops::put(cx, object, PropertyKey::String(name), value, act.strict)
    }
    Reference::Unresolved(name) => {
      if act.strict {
        return Err(error::reference_error(
          cx,
          format!("{name} is not defined"),
        ));
      }
      let realm = ops::current_realm(cx);
      let global = cx.vm.realm(realm).global_object;
      ops::put(cx, global, PropertyKey::String(name), value, false)
    }
    Reference::Property(base, key) => {
      ops::put_value(cx, &base, key, value, act.strict)
    }
  }
}

fn this_value(cx: &Isolate, mut env: EnvRef) -> JsValue {
  loop {
    let record = cx.vm.heap.env(env);
    if let Some(this) = &record.this {
      return this.clone();
    }
    match record.parent {
      Some(parent) => env = parent,
      None => return JsValue::Undefined,
    }
  }
}

// Statements

fn statements(
  cx: &mut Isolate,
  act: &mut Activation,
  body: &[Stmt],
) -> JsResult<Completion> {
  let mut last = None;
  for stmt in body {
    match statement(cx, act, stmt, &[])? {
      Completion::Normal(value) => {
        if value.is_some() {
          last = value;
        }
      }
      abrupt => return Ok(abrupt),
    }
  }
  Ok(Completion::Normal(last))
}

fn block(
  cx: &mut Isolate,
  act: &mut Activation,
  block: &Block,
) -> JsResult<Completion> {
  if !block.needs_scope() {
    return statements(cx, act, &block.body);
  }
  let saved = act.env;
  let env = new_env(cx, saved);
  declare_lexical(cx, env, &block.lexical);
  declare_functions(cx, env, &block.functions, &act.source);
  act.env = env;
  let result = statements(cx, act, &block.body);
  act.env = saved;
  result
}

/// Folds one loop body completion into the loop's state. Returns the
/// completion to leave the loop with, if any.
fn loop_continues(
  completion: Completion,
  labels: &[JsStr],
  value: &mut Option<JsValue>,
) -> Option<Completion> {
  match completion {
    Completion::Normal(v) => {
      if v.is_some() {
        *value = v;
      }
      None
    }
    Completion::Continue(None) => None,
    Completion::Continue(Some(label)) if labels.contains(&label) => None,
    Completion::Break(None) => Some(Completion::Normal(value.take())),
    Completion::Break(Some(label)) if labels.contains(&label) => {
      Some(Completion::Normal(value.take()))
    }
    abrupt => Some(abrupt),
  }
}

fn var_declarations(
  cx: &mut Isolate,
  act: &mut Activation,
  kind: VarKind,
  decls: &[VarDeclarator],
) -> JsResult<()> {
  for decl in decls {
    mark(cx, decl.span);
    match kind {
      VarKind::Var => {
        let Some(init) = &decl.init else {
          continue;
        };
        let reference = resolve(cx, act.env, &decl.name)?;
        let value = named_expr(cx, act, init, &decl.name)?;
        put_reference(cx, act, reference, value)?;
      }
      VarKind::Let | VarKind::Const => {
        let value = match &decl.init {
          Some(init) => named_expr(cx, act, init, &decl.name)?,
          None => JsValue::Undefined,
        };
        initialize_binding(cx, act.env, &decl.name, value);
      }
    }
  }
  Ok(())
}

/// A copy of a loop environment so closures capture one binding per
/// iteration.
fn copy_iteration_env(cx: &mut Isolate, env: EnvRef) -> EnvRef {
  let record = cx.vm.heap.env(env);
  let copy = Env {
    parent: record.parent,
    bindings: record.bindings.clone(),
    object: None,
    this: None,
    function: None,
  };
  cx.vm.heap.alloc(Cell::Env(copy))
}

fn statement(
  cx: &mut Isolate,
  act: &mut Activation,
  stmt: &Stmt,
  labels: &[JsStr],
) -> JsResult<Completion> {
  mark(cx, stmt.span);
  match &stmt.kind {
    StmtKind::Empty
    | StmtKind::Debugger
    | StmtKind::FunctionDecl(_)
    | StmtKind::Import
    | StmtKind::ExportNamed => Ok(Completion::Normal(None)),
    StmtKind::Expr(e) => Ok(Completion::Normal(Some(expr(cx, act, e)?))),
    StmtKind::Var(kind, decls) => {
      var_declarations(cx, act, *kind, decls)?;
      Ok(Completion::Normal(None))
    }
    StmtKind::Return(value) => {
      let value = match value {
        Some(e) => expr(cx, act, e)?,
        None => JsValue::Undefined,
      };
      Ok(Completion::Return(value))
    }
    StmtKind::If(test, consequent, alternate) => {
      let completion = if expr(cx, act, test)?.truthy() {
        statement(cx, act, consequent, &[])?
      } else if let Some(alternate) = alternate {
        statement(cx, act, alternate, &[])?
      } else {
        Completion::Normal(None)
      };
      Ok(match completion {
        Completion::Normal(value) => {
          Completion::Normal(Some(value.unwrap_or_default()))
        }
        abrupt => abrupt,
      })
    }
    StmtKind::Block(b) => block(cx, act, b),
    StmtKind::While(test, body) => {
      let mut value = None;
      loop {
        ops::check_interrupts(cx)?;
        if !expr(cx, act, test)?.truthy() {
          return Ok(Completion::Normal(Some(value.unwrap_or_default())));
        }
        let completion = statement(cx, act, body, &[])?;
        if let Some(exit) = loop_continues(completion, labels, &mut value) {
          return Ok(exit);
        }
      }
    }
    StmtKind::DoWhile(body, test) => {
      let mut value = None;
      loop {
        ops::check_interrupts(cx)?;
        let completion = statement(cx, act, body, &[])?;
        if let Some(exit) = loop_continues(completion, labels, &mut value) {
          return Ok(exit);
        }
        if !expr(cx, act, test)?.truthy() {
          return Ok(Completion::Normal(Some(value.unwrap_or_default())));
        }
      }
    }
    StmtKind::For {
      init,
      test,
      update,
      body,
    } => {
      let saved = act.env;
      let result = for_statement(cx, act, init, test, update, body, labels);
      act.env = saved;
      result
    }
    StmtKind::ForIn(binding, object, body) => {
      let saved = act.env;
      let result = for_in_statement(cx, act, binding, object, body, labels);
      act.env = saved;
      result
    }
    StmtKind::ForOf(binding, iterable, body) => {
      let saved = act.env;
      let result = for_of_statement(cx, act, binding, iterable, body, labels);
      act.env = saved;
      result
    }
    StmtKind::Break(label) => Ok(Completion::Break(label.clone())),
    StmtKind::Continue(label) => Ok(Completion::Continue(label.clone())),
    StmtKind::Throw(e) => {
      let value = expr(cx, act, e)?;
      mark(cx, stmt.span);
      Err(error::throw_value(cx, value))
    }
    StmtKind::Try {
      block: body,
      handler,
      finalizer,
    } => try_statement(cx, act, body, handler.as_ref(), finalizer.as_ref()),
    StmtKind::Switch {
      discriminant,
      cases,
      lexical,
      functions,
    } => {
      let value = expr(cx, act, discriminant)?;
      let saved = act.env;
      if !lexical.is_empty() || !functions.is_empty() {
        let env = new_env(cx, saved);
        declare_lexical(cx, env, lexical);
        declare_functions(cx, env, functions, &act.source);
        act.env = env;
      }
      let result = switch_cases(cx, act, &value, cases);
      act.env = saved;
      Ok(match result? {
        Completion::Break(None) => Completion::Normal(None),
        Completion::Break(Some(label)) if labels.contains(&label) => {
          Completion::Normal(None)
        }
        completion => completion,
      })
    }
    StmtKind::Labeled(label, body) => {
      let mut inner = labels.to_vec();
      inner.push(label.clone());
      match statement(cx, act, body, &inner)? {
        Completion::Break(Some(l)) if &l == label => {
          Ok(Completion::Normal(None))
        }
        completion => Ok(completion),
      }
    }
    StmtKind::ExportDefaultExpr(e) => {
      let value = named_expr(cx, act, e, &"default".into())?;
      initialize_binding(cx, act.env, &DEFAULT_EXPORT_BINDING.into(), value);
      Ok(Completion::Normal(None))
    }
    StmtKind::ExportDecl(inner) => statement(cx, act, inner, labels),
  }
}

fn switch_cases(
  cx: &mut Isolate,
  act: &mut Activation,
  value: &JsValue,
  cases: &[SwitchCase],
) -> JsResult<Completion> {
  let mut start = None;
  for (i, case) in cases.iter().enumerate() {
    if let Some(test) = &case.test {
      if expr(cx, act, test)?.strict_equals(value) {
        start = Some(i);
        break;
      }
    }
  }
  let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
  let Some(start) = start else {
    return Ok(Completion::Normal(None));
  };
  let mut last = None;
  for case in &cases[start..] {
    match statements(cx, act, &case.body)? {
      Completion::Normal(value) => {
        if value.is_some() {
          last = value;
        }
      }
      abrupt => return Ok(abrupt),
    }
  }
  Ok(Completion::Normal(last))
}

fn try_statement(
  cx: &mut Isolate,
  act: &mut Activation,
  body: &Block,
  handler: Option<&crate::engine::ast::CatchClause>,
  finalizer: Option<&Block>,
) -> JsResult<Completion> {
  let saved = act.env;
  let mut result = block(cx, act, body);
  act.env = saved;

  if let (Err(crate::engine::Abrupt::Throw(exception)), Some(handler)) =
    (&result, handler)
  {
    let exception = exception.clone();
    cx.vm.pending_message = None;
    let env = new_env(cx, saved);
    if let Some(param) = &handler.param {
      cx.vm
        .heap
        .env_mut(env)
        .declare(param.clone(), Some(exception), Mutability::Mutable);
    }
    act.env = env;
    result = block(cx, act, &handler.body);
    act.env = saved;
  }

  if let Some(finalizer) = finalizer {
    if matches!(result, Err(crate::engine::Abrupt::Terminate)) {
      return result;
    }
    let pending = cx.vm.pending_message.take();
    let outcome = block(cx, act, finalizer);
    act.env = saved;
    match outcome? {
      Completion::Normal(_) => cx.vm.pending_message = pending,
      abrupt => return Ok(abrupt),
    }
  }
  result.map(|completion| match completion {
    Completion::Normal(value) => {
      Completion::Normal(Some(value.unwrap_or_default()))
    }
    abrupt => abrupt,
  })
}

fn for_statement(
  cx: &mut Isolate,
  act: &mut Activation,
  init: &Option<ForInit>,
  test: &Option<Expr>,
  update: &Option<Expr>,
  body: &Stmt,
  labels: &[JsStr],
) -> JsResult<Completion> {
  let mut per_iteration = false;
  match init {
    None => {}
    Some(ForInit::Expr(e)) => {
      expr(cx, act, e)?;
    }
    Some(ForInit::Var(VarKind::Var, decls)) => {
      var_declarations(cx, act, VarKind::Var, decls)?
    }
    Some(ForInit::Var(kind, decls)) => {
      let env = new_env(cx, act.env);
      let mutability = if *kind == VarKind::Const {
        Mutability::Const
      } else {
        Mutability::Mutable
      };
      for decl in decls {
        cx.vm
          .heap
          .env_mut(env)
          .declare(decl.name.clone(), None, mutability);
      }
      act.env = env;
      var_declarations(cx, act, *kind, decls)?;
      per_iteration = *kind == VarKind::Let;
    }
  }
  if per_iteration {
    act.env = copy_iteration_env(cx, act.env);
  }
  let mut value = None;
  loop {
    ops::check_interrupts(cx)?;
    if let Some(test) = test {
      if !expr(cx, act, test)?.truthy() {
        break;
      }
    }
    let completion = statement(cx, act, body, &[])?;
    if let Some(exit) = loop_continues(completion, labels, &mut value) {
      return Ok(exit);
    }
    if per_iteration {
      act.env = copy_iteration_env(cx, act.env);
    }
    if let Some(update) = update {
      expr(cx, act, update)?;
    }
  }
  Ok(Completion::Normal(Some(value.unwrap_or_default())))
}

/// Binds the loop variable of a `for-in`/`for-of` iteration.
fn bind_loop_value(
  cx: &mut Isolate,
  act: &mut Activation,
  binding: &ForBinding,
  outer: EnvRef,
  value: JsValue,
) -> JsResult<()> {
  match binding {
    ForBinding::Decl(VarKind::Var, name) => {
      act.env = outer;
      let reference = resolve(cx, act.env, name)?;
      put_reference(cx, act, reference, value)
    }
    ForBinding::Decl(kind, name) => {
      let env = new_env(cx, outer);
      let mutability = if *kind == VarKind::Const {
        Mutability::Const
      } else {
        Mutability::Mutable
      };
      cx.vm
        .heap
        .env_mut(env)
        .declare(name.clone(), Some(value), mutability);
      act.env = env;
      Ok(())
    }
    ForBinding::Target(target) => {
      act.env = outer;
      let reference = reference_of(cx, act, target)?;
      put_reference(cx, act, reference, value)
    }
  }
}

fn for_in_keys(cx: &mut Isolate, object: ObjRef) -> JsResult<Vec<PropertyKey>> {
  let mut seen = HashSet::new();
  let mut keys = Vec::new();
  let mut current = Some(object);
  while let Some(id) = current {
    for key in ops::own_property_keys(cx, id) {
      if matches!(key, PropertyKey::Symbol(_)) || !seen.insert(key.clone()) {
        continue;
      }
      if ops::own_property(cx, id, &key)?.is_some_and(|p| p.attrs.enumerable) {
        keys.push(key);
      }
    }
    current = cx.vm.heap.object(id).proto;
  }
  Ok(keys)
}

fn for_in_statement(
  cx: &mut Isolate,
  act: &mut Activation,
  binding: &ForBinding,
  object: &Expr,
  body: &Stmt,
  labels: &[JsStr],
) -> JsResult<Completion> {
  let outer = act.env;
  let value = expr(cx, act, object)?;
  if value.is_nullish() {
    return Ok(Completion::Normal(None));
  }
  let object = ops::to_object(cx, &value)?;
  let keys = for_in_keys(cx, object)?;
  let mut value = None;
  for key in keys {
    ops::check_interrupts(cx)?;
    if !ops::has_property(cx, object, &key)? {
      continue;
    }
    bind_loop_value(cx, act, binding, outer, key.to_value())?;
    let completion = statement(cx, act, body, &[])?;
    if let Some(exit) = loop_continues(completion, labels, &mut value) {
      return Ok(exit);
    }
  }
  Ok(Completion::Normal(Some(value.unwrap_or_default())))
}

fn for_of_statement(
  cx: &mut Isolate,
  act: &mut Activation,
  binding: &ForBinding,
  iterable: &Expr,
  body: &Stmt,
  labels: &[JsStr],
) -> JsResult<Completion> {
  let outer = act.env;
  let iterable = expr(cx, act, iterable)?;
  // Arrays are walked live so that pushes during iteration are seen.
  let object = match &iterable {
    JsValue::Object(id)
      if !matches!(
        cx.vm.heap.object(*id).class,
        ObjectClass::Primitive(JsValue::String(_))
      ) =>
    {
      Some(*id)
    }
    _ => None,
  };
  let snapshot = match object {
    Some(_) => Vec::new(),
    None => ops::iterable_to_list(cx, &iterable)?,
  };
  let mut value = None;
  let mut index = 0usize;
  loop {
    ops::check_interrupts(cx)?;
    let item = match object {
      Some(id) => {
        if index as u64 >= ops::length_of_array_like(cx, id)? {
          break;
        }
        ops::get(cx, id, &PropertyKey::index(index))?
      }
      None => match snapshot.get(index) {
        Some(item) => item.clone(),
        None => break,
      },
    };
    index += 1;
    bind_loop_value(cx, act, binding, outer, item)?;
    let completion = statement(cx, act, body, &[])?;
    if let Some(exit) = loop_continues(completion, labels, &mut value) {
      return Ok(exit);
    }
  }
  Ok(Completion::Normal(Some(value.unwrap_or_default())))
}

// Expressions

fn reference_of(
  cx: &mut Isolate,
  act: &mut Activation,
  target: &Expr,
) -> JsResult<Reference> {
  match &target.kind {
    ExprKind::Ident(name) => resolve(cx, act.env, name),
    ExprKind::Member(object, prop) => {
      let base = expr(cx, act, object)?;
      let key = member_key(cx, act, prop)?;
      if base.is_nullish() {
        mark(cx, target.span);
        let detail = error::detail_string(&cx.vm, &base);
        let key = ops::to_property_key(cx, &key)?;
        return Err(error::type_error(
          cx,
          format!("Cannot set properties of {detail} (setting '{key}')"),
        ));
      }
      let key = ops::to_property_key(cx, &key)?;
      Ok(Reference::Property(base, key))
    }
    _ => {
      mark(cx, target.span);
      Err(error::throw_error(
        cx,
        ErrorKind::SyntaxError,
        "Invalid left-hand side in assignment",
      ))
    }
  }
}

/// The key expression of a member access, not yet converted to a key.
fn member_key(
  cx: &mut Isolate,
  act: &mut Activation,
  prop: &MemberProp,
) -> JsResult<JsValue> {
  match prop {
    MemberProp::Named(name) => Ok(JsValue::String(name.clone())),
    MemberProp::Computed(e) => expr(cx, act, e),
  }
}

/// Evaluates `e`, naming it `name` if it is an anonymous function.
fn named_expr(
  cx: &mut Isolate,
  act: &mut Activation,
  e: &Expr,
  name: &JsStr,
) -> JsResult<JsValue> {
  match &e.kind {
    ExprKind::Function(node) if node.name.is_none() => {
      let name = Some(name.clone());
      Ok(JsValue::Object(function_expression(cx, act, node, name)))
    }
    _ => expr(cx, act, e),
  }
}

fn source_text(act: &Activation, span: Span) -> String {
  act
    .source
    .text
    .get(span.start as usize..span.end as usize)
    .unwrap_or("expression")
    .to_string()
}

fn expr(cx: &mut Isolate, act: &mut Activation, e: &Expr) -> JsResult<JsValue> {
  match &e.kind {
    ExprKind::Number(n) => Ok(JsValue::Number(*n)),
    ExprKind::String(s) => Ok(JsValue::String(s.clone())),
    ExprKind::BigInt(b) => Ok(JsValue::BigInt(b.clone())),
    ExprKind::Bool(b) => Ok(JsValue::Bool(*b)),
    ExprKind::Null => Ok(JsValue::Null),
    ExprKind::Ident(name) => {
      let reference = resolve(cx, act.env, name)?;
      if let Reference::Unresolved(_) = reference {
        mark(cx, e.span);
      }
      get_reference(cx, &reference)
    }
    ExprKind::This => Ok(this_value(cx, act.env)),
    ExprKind::Array(elements) => {
      let array = ops::new_array(cx, Vec::new());
      for (i, element) in elements.iter().enumerate() {
        if let Some(element) = element {
          let value = expr(cx, act, element)?;
          ops::create_data_property(cx, array, PropertyKey::index(i), value)?;
        }
      }
      if let ObjectClass::Array { length, .. } =
        &mut cx.vm.heap.object_mut(array).class
      {
        *length = elements.len() as u32;
      }
      Ok(JsValue::Object(array))
    }
    ExprKind::Object(props) => object_literal(cx, act, props),
    ExprKind::Function(node) => {
      Ok(JsValue::Object(function_expression(cx, act, node, None)))
    }
    ExprKind::Unary(op, operand) => unary(cx, act, *op, operand),
    ExprKind::Update {
      increment,
      prefix,
      target,
    } => {
      let reference = reference_of(cx, act, target)?;
      let old = get_reference(cx, &reference)?;
      let old = ops::to_numeric(cx, &old)?;
      let new = match &old {
        JsValue::BigInt(b) => {
          let one = BigInt::from(1);
          JsValue::BigInt(Rc::new(
            if *increment { &**b + one } else { &**b - one },
          ))
        }
        JsValue::Number(n) => {
          JsValue::Number(if *increment { n + 1.0 } else { n - 1.0 })
        }
        _ => JsValue::Number(f64::NAN),
      };
      put_reference(cx, act, reference, new.clone())?;
      Ok(if *prefix { new } else { old })
    }
    ExprKind::Binary(op, left, right) => {
      let l = expr(cx, act, left)?;
      let r = expr(cx, act, right)?;
      mark(cx, e.span);
      binary(cx, *op, &l, &r)
    }
    ExprKind::Logical(op, left, right) => {
      let l = expr(cx, act, left)?;
      let short_circuit = match op {
        LogicalOp::And => !l.truthy(),
        LogicalOp::Or => l.truthy(),
        LogicalOp::Coalesce => !l.is_nullish(),
      };
      if short_circuit {
        Ok(l)
      } else {
        expr(cx, act, right)
      }
    }
    ExprKind::Conditional(test, consequent, alternate) => {
      if expr(cx, act, test)?.truthy() {
        expr(cx, act, consequent)
      } else {
        expr(cx, act, alternate)
      }
    }
    ExprKind::Assign(op, target, value) => {
      assignment(cx, act, *op, target, value)
    }
    ExprKind::Sequence(items) => {
      let mut last = JsValue::Undefined;
      for item in items {
        last = expr(cx, act, item)?;
      }
      Ok(last)
    }
    ExprKind::Member(object, prop) => {
      let base = expr(cx, act, object)?;
      let key = member_key(cx, act, prop)?;
      if base.is_nullish() {
        mark(cx, e.span);
        let detail = error::detail_string(&cx.vm, &base);
        let key = ops::to_property_key(cx, &key)?;
        return Err(error::type_error(
          cx,
          format!("Cannot read properties of {detail} (reading '{key}')"),
        ));
      }
      let key = ops::to_property_key(cx, &key)?;
      ops::get_value(cx, &base, &key)
    }
    ExprKind::Call(callee, args) => {
      call_expression(cx, act, e.span, callee, args)
    }
    ExprKind::New(callee, args) => {
      let constructor = expr(cx, act, callee)?;
      let args = arguments(cx, act, args)?;
      mark(cx, e.span);
      match constructor.as_object() {
        Some(id) if cx.vm.heap.object(id).is_constructor() => {
          ops::construct(cx, id, &args, None)
        }
        _ => {
          let text = source_text(act, callee.span);
          Err(error::type_error(cx, format!("{text} is not a constructor")))
        }
      }
    }
  }
}

fn arguments(
  cx: &mut Isolate,
  act: &mut Activation,
  args: &[Expr],
) -> JsResult<Vec<JsValue>> {
  let mut values = Vec::with_capacity(args.len());
  for arg in args {
    values.push(expr(cx, act, arg)?);
  }
  Ok(values)
}

fn call_expression(
  cx: &mut Isolate,
  act: &mut Activation,
  span: Span,
  callee: &Expr,
  args: &[Expr],
) -> JsResult<JsValue> {
  let (function, this) = match &callee.kind {
    ExprKind::Member(object, prop) => {
      let base = expr(cx, act, object)?;
      let key = member_key(cx, act, prop)?;
      if base.is_nullish() {
        mark(cx, callee.span);
        let detail = error::detail_string(&cx.vm, &base);
        let key = ops::to_property_key(cx, &key)?;
        return Err(error::type_error(
          cx,
          format!("Cannot read properties of {detail} (reading '{key}')"),
        ));
      }
      let key = ops::to_property_key(cx, &key)?;
      (ops::get_value(cx, &base, &key)?, base)
    }
    _ => (expr(cx, act, callee)?, JsValue::Undefined),
  };
  let args = arguments(cx, act, args)?;
  mark(cx, span);
  match function.as_object() {
    Some(id) if cx.vm.heap.object(id).is_callable() => {
      ops::call_function(cx, id, this, &args)
    }
    _ => {
      let text = source_text(act, callee.span);
      Err(error::type_error(cx, format!("{text} is not a function")))
    }
  }
}

fn property_key(
  cx: &mut Isolate,
  act: &mut Activation,
  name: &PropName,
) -> JsResult<PropertyKey> {
  match name {
    PropName::Named(name) => Ok(PropertyKey::String(name.clone())),
    PropName::Computed(e) => {
      let value = expr(cx, act, e)?;
      ops::to_property_key(cx, &value)
    }
  }
}

fn object_literal(
  cx: &mut Isolate,
  act: &mut Activation,
  props: &[PropDef],
) -> JsResult<JsValue> {
  let object = ops::new_object(cx);
  for prop in props {
    match prop {
      PropDef::Value(name, value) => {
        let key = property_key(cx, act, name)?;
        let value = named_expr(cx, act, value, &key.function_name())?;
        ops::create_data_property(cx, object, key, value)?;
      }
      PropDef::Getter(name, node) | PropDef::Setter(name, node) => {
        let is_getter = matches!(prop, PropDef::Getter(..));
        let key = property_key(cx, act, name)?;
        let prefix = if is_getter { "get" } else { "set" };
        let accessor_name: JsStr = format!(
          "{prefix} {}",
          key.function_name(),
        ).into();
        let function = make_function(cx, node, act.env, &act.source, None);
        cx.vm.heap.object_mut(function).insert(
          PropertyKey::str("name"),
          JsValue::String(accessor_name),
          Attributes::READ_ONLY_CONFIGURABLE,
        );
        let mut desc = PropertyDescriptor {
          enumerable: Some(true),
          configurable: Some(true),
          ..Default::default()
        };
        if is_getter {
          desc.get = Some(Some(function));
        } else {
          desc.set = Some(Some(function));
        }
        ops::define_property_or_throw(cx, object, key, desc)?;
      }
      PropDef::Proto(value) => {
        let value = expr(cx, act, value)?;
        match value {
          JsValue::Object(proto) => {
            ops::set_prototype_of(cx, object, Some(proto));
          }
          JsValue::Null => {
            ops::set_prototype_of(cx, object, None);
          }
          _ => {}
        }
      }
    }
  }
  Ok(JsValue::Object(object))
}

fn unary(
  cx: &mut Isolate,
  act: &mut Activation,
  op: UnaryOp,
  operand: &Expr,
) -> JsResult<JsValue> {
  match op {
    UnaryOp::TypeOf => {
      if let ExprKind::Ident(name) = &operand.kind {
        let reference = resolve(cx, act.env, name)?;
        if let Reference::Unresolved(_) = reference {
          return Ok(JsValue::str("undefined"));
        }
        let value = get_reference(cx, &reference)?;
        return Ok(JsValue::str(ops::type_of(cx, &value)));
      }
      let value = expr(cx, act, operand)?;
      Ok(JsValue::str(ops::type_of(cx, &value)))
    }
    UnaryOp::Delete => match &operand.kind {
      ExprKind::Member(..) => {
        let Reference::Property(base, key) =
          reference_of(cx, act, operand)?
        else {
          return Ok(JsValue::Bool(true));
        };
        let object = ops::to_object(cx, &base)?;
        let deleted = ops::delete_property(cx, object, &key)?;
        if !deleted && act.strict {
          let detail = error::detail_string(&cx.vm, &base);
          return Err(error::type_error(
            cx,
            format!("Cannot delete property '{key}' of {detail}"),
          ));
        }
        Ok(JsValue::Bool(deleted))
      }
      ExprKind::Ident(name) => match resolve(cx, act.env, name)? {
        Reference::Object(object, name) => {
          let key = PropertyKey::String(name);
          Ok(JsValue::Bool(ops::delete_property(cx, object, &key)?))
        }
        Reference::Unresolved(_) => Ok(JsValue::Bool(true)),
        _ => Ok(JsValue::Bool(false)),
      },
      _ => {
        expr(cx, act, operand)?;
        Ok(JsValue::Bool(true))
      }
    },
    UnaryOp::Void => {
      expr(cx, act, operand)?;
      Ok(JsValue::Undefined)
    }
    UnaryOp::Not => Ok(JsValue::Bool(!expr(cx, act, operand)?.truthy())),
    UnaryOp::Plus => {
      let value = expr(cx, act, operand)?;
      Ok(JsValue::Number(ops::to_number(cx, &value)?))
    }
    UnaryOp::Minus => {
      let value = expr(cx, act, operand)?;
      Ok(match ops::to_numeric(cx, &value)? {
        JsValue::BigInt(b) => JsValue::BigInt(Rc::new(-&*b)),
        JsValue::Number(n) => JsValue::Number(-n),
        _ => JsValue::Number(f64::NAN),
      })
    }
    UnaryOp::BitNot => {
      let value = expr(cx, act, operand)?;
      Ok(match ops::to_numeric(cx, &value)? {
        JsValue::BigInt(b) => JsValue::BigInt(Rc::new(-&*b - BigInt::from(1))),
        JsValue::Number(n) => JsValue::Number(!f64_to_int32(n) as f64),
        _ => JsValue::Number(f64::NAN),
      })
    }
  }
}

fn assignment(
  cx: &mut Isolate,
  act: &mut Activation,
  op: AssignOp,
  target: &Expr,
  value: &Expr,
) -> JsResult<JsValue> {
  let reference = reference_of(cx, act, target)?;
  let name = match &target.kind {
    ExprKind::Ident(name) => Some(name.clone()),
    _ => None,
  };
  let evaluate = |cx: &mut Isolate, act: &mut Activation| match &name {
    Some(name) => named_expr(cx, act, value, name),
    None => expr(cx, act, value),
  };
  let result = match op {
    AssignOp::Assign => evaluate(cx, act)?,
    AssignOp::Compound(op) => {
      let old = get_reference(cx, &reference)?;
      let r = expr(cx, act, value)?;
      mark(cx, target.span.to(value.span));
      binary(cx, op, &old, &r)?
    }
    AssignOp::Logical(op) => {
      let old = get_reference(cx, &reference)?;
      let keep = match op {
        LogicalOp::And => !old.truthy(),
        LogicalOp::Or => old.truthy(),
        LogicalOp::Coalesce => !old.is_nullish(),
      };
      if keep {
        return Ok(old);
      }
      evaluate(cx, act)?
    }
  };
  put_reference(cx, act, reference, result.clone())?;
  Ok(result)
}

// Operators

fn mixed_bigint(cx: &mut Isolate) -> crate::engine::Abrupt {
  error::type_error(
    cx,
    "Cannot mix BigInt and other types, use explicit conversions",
  )
}

fn number_pow(base: f64, exponent: f64) -> f64 {
  if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
    f64::NAN
  } else {
    base.powf(exponent)
  }
}

fn bigint_shift(
  cx: &mut Isolate,
  value: &BigInt,
  shift: &BigInt,
  left: bool,
) -> JsResult<BigInt> {
  let Some(mut amount) = shift.to_i64() else {
    return Err(error::range_error(cx, "Maximum BigInt size exceeded"));
  };
  if !left {
    amount = -amount;
  }
  Ok(if amount >= 0 {
    if amount > (1 << 30) {
      return Err(error::range_error(cx, "Maximum BigInt size exceeded"));
    }
    value << amount as usize
  } else {
    value >> amount.unsigned_abs().min(u32::MAX as u64) as usize
  })
}

fn bigint_binary(
  cx: &mut Isolate,
  op: BinaryOp,
  a: &BigInt,
  b: &BigInt,
) -> JsResult<JsValue> {
  let result = match op {
    BinaryOp::Add => a + b,
    BinaryOp::Sub => a - b,
    BinaryOp::Mul => a * b,
    BinaryOp::Div | BinaryOp::Rem => {
      if b.is_zero() {
        return Err(error::range_error(cx, "Division by zero"));
      }
      if op == BinaryOp::Div { a / b } else { a % b }
    }
    BinaryOp::Exp => {
      if b < &BigInt::zero() {
        return Err(error::range_error(cx, "Exponent must be non-negative"));
      }
      match b.to_u32() {
        Some(exponent) => a.pow(exponent),
        None => {
          return Err(error::range_error(cx, "Maximum BigInt size exceeded"))
        }
      }
    }
    BinaryOp::Shl => bigint_shift(cx, a, b, true)?,
    BinaryOp::Shr => bigint_shift(cx, a, b, false)?,
    BinaryOp::UShr => {
      return Err(error::type_error(
        cx,
        "BigInts have no unsigned right shift, use >> instead",
      ));
    }
    BinaryOp::BitAnd => a & b,
    BinaryOp::BitOr => a | b,
    BinaryOp::BitXor => a ^ b,
    _ => unreachable!("not an arithmetic operator"),
  };
  Ok(JsValue::BigInt(Rc::new(result)))
}

fn number_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
  match op {
    BinaryOp::Add => a + b,
    BinaryOp::Sub => a - b,
    BinaryOp::Mul => a * b,
    BinaryOp::Div => a / b,
    BinaryOp::Rem => a % b,
    BinaryOp::Exp => number_pow(a, b),
    BinaryOp::Shl => f64_to_int32(a).wrapping_shl(f64_to_uint32(b) & 31) as f64,
    BinaryOp::Shr => (f64_to_int32(a) >> (f64_to_uint32(b) & 31)) as f64,
    BinaryOp::UShr => (f64_to_uint32(a) >> (f64_to_uint32(b) & 31)) as f64,
    BinaryOp::BitAnd => (f64_to_int32(a) & f64_to_int32(b)) as f64,
    BinaryOp::BitOr => (f64_to_int32(a) | f64_to_int32(b)) as f64,
    BinaryOp::BitXor => (f64_to_int32(a) ^ f64_to_int32(b)) as f64,
    _ => unreachable!("not an arithmetic operator"),
  }
}

/// Applies a binary operator to evaluated operands.
pub(crate) fn binary(
  cx: &mut Isolate,
  op: BinaryOp,
  l: &JsValue,
  r: &JsValue,
) -> JsResult<JsValue> {
  match op {
    BinaryOp::Add => {
      let lp = ops::to_primitive(cx, l, ops::Hint::Default)?;
      let rp = ops::to_primitive(cx, r, ops::Hint::Default)?;
      if matches!(lp, JsValue::String(_)) || matches!(rp, JsValue::String(_)) {
        let ls = ops::to_string(cx, &lp)?;
        let rs = ops::to_string(cx, &rp)?;
        let mut joined = String::with_capacity(ls.len() + rs.len());
        joined.push_str(&ls);
        joined.push_str(&rs);
        return Ok(JsValue::String(joined.into()));
      }
      arithmetic(cx, op, &lp, &rp)
    }
    BinaryOp::Sub
    | BinaryOp::Mul
    | BinaryOp::Div
    | BinaryOp::Rem
    | BinaryOp::Exp
    | BinaryOp::Shl
    | BinaryOp::Shr
    | BinaryOp::UShr
    | BinaryOp::BitAnd
    | BinaryOp::BitOr
    | BinaryOp::BitXor => arithmetic(cx, op, l, r),
    BinaryOp::Eq => Ok(JsValue::Bool(ops::loose_equals(cx, l, r)?)),
    BinaryOp::NotEq => Ok(JsValue::Bool(!ops::loose_equals(cx, l, r)?)),
    BinaryOp::StrictEq => Ok(JsValue::Bool(l.strict_equals(r))),
    BinaryOp::StrictNotEq => Ok(JsValue::Bool(!l.strict_equals(r))),
    BinaryOp::Lt => {
      Ok(JsValue::Bool(ops::less_than(cx, l, r, true)? == Some(true)))
    }
    BinaryOp::Gt => {
      Ok(JsValue::Bool(ops::less_than(cx, r, l, false)? == Some(true)))
    }
    BinaryOp::LtEq => {
      Ok(JsValue::Bool(ops::less_than(cx, r, l, false)? == Some(false)))
    }
    BinaryOp::GtEq => {
      Ok(JsValue::Bool(ops::less_than(cx, l, r, true)? == Some(false)))
    }
    BinaryOp::In => {
      let JsValue::Object(object) = r else {
        let key = error::detail_string(&cx.vm, l);
        let target = error::detail_string(&cx.vm, r);
        return Err(error::type_error(
          cx,
          format!("Cannot use 'in' operator to search for '{key}' in {target}"),
        ));
      };
      let key = ops::to_property_key(cx, l)?;
      Ok(JsValue::Bool(ops::has_property(cx, *object, &key)?))
    }
    BinaryOp::InstanceOf => Ok(JsValue::Bool(ops::instance_of(cx, l, r)?)),
  }
}

fn arithmetic(
  cx: &mut Isolate,
  op: BinaryOp,
  l: &JsValue,
  r: &JsValue,
) -> JsResult<JsValue> {
  let ln = ops::to_numeric(cx, l)?;
  let rn = ops::to_numeric(cx, r)?;
  match (&ln, &rn) {
    (JsValue::Number(a), JsValue::Number(b)) => {
      Ok(JsValue::Number(number_binary(op, *a, *b)))
    }
    (JsValue::BigInt(a), JsValue::BigInt(b)) => bigint_binary(cx, op, a, b),
    _ => Err(mixed_bigint(cx)),
  }
}
