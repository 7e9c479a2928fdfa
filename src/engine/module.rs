// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Module records: linking import bindings between module environments,
//! evaluation order, and namespace objects.

use std::collections::HashSet;
use std::rc::Rc;

use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::ModuleId;
use crate::engine::ast::ImportName;
use crate::engine::ast::Program;
use crate::engine::ast::Span;
use crate::engine::env::Binding;
use crate::engine::env::Env;
use crate::engine::env::Mutability;
use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::error::MessageData;
use crate::engine::heap::Cell;
use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::interp;
use crate::engine::object::Attributes;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::Property;
use crate::engine::ops;
use crate::engine::parser;
use crate::engine::promise;
use crate::engine::source::SourceInfo;
use crate::engine::value::EnvRef;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;
use crate::module::ModuleStatus;
use crate::module::SyntheticModuleEvaluationSteps;

pub(crate) enum ModuleKind {
  SourceText {
    program: Rc<Program>,
    source: Rc<SourceInfo>,
  },
  Synthetic {
    export_names: Vec<JsStr>,
    steps: SyntheticModuleEvaluationSteps,
  },
}

/// What an export name resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
  Binding { module: ModuleId, name: JsStr },
  Namespace(ModuleId),
}

enum ResolveFailure {
  NotFound,
  Ambiguous,
}

pub(crate) struct ModuleRecord {
  pub kind: ModuleKind,
  pub status: ModuleStatus,
  pub env: Option<EnvRef>,
  /// The context the module was linked in.
  pub realm: Option<ContextId>,
  /// Resolved targets of `requests`, filled in while linking.
  pub requested: Vec<Option<ModuleId>>,
  pub exception: Option<JsValue>,
  pub namespace: Option<ObjRef>,
  /// Sorted export names and their resolutions, computed with the
  /// namespace object.
  pub exports: Vec<(JsStr, Resolution)>,
  /// The promise handed out by `evaluate`.
  pub evaluation: Option<ObjRef>,
  pub identity_hash: i32,
  pub script_id: i32,
}

impl ModuleRecord {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    if let ModuleKind::SourceText { source, .. } = &self.kind {
      source.trace(tracer);
    }
    if let Some(env) = self.env {
      tracer.visit(env);
    }
    if let Some(exception) = &self.exception {
      tracer.visit_value(exception);
    }
    if let Some(namespace) = self.namespace {
      tracer.visit(namespace);
    }
    if let Some(promise) = self.evaluation {
      tracer.visit(promise);
    }
  }

  pub fn program(&self) -> Option<&Rc<Program>> {
    match &self.kind {
      ModuleKind::SourceText { program, .. } => Some(program),
      ModuleKind::Synthetic { .. } => None,
    }
  }

  pub fn source(&self) -> Option<&Rc<SourceInfo>> {
    match &self.kind {
      ModuleKind::SourceText { source, .. } => Some(source),
      ModuleKind::Synthetic { .. } => None,
    }
  }

  pub fn request_count(&self) -> usize {
    self
      .program()
      .and_then(|p| p.module.as_ref())
      .map_or(0, |m| m.requests.len())
  }
}

fn record(cx: &Isolate, id: ModuleId) -> &ModuleRecord {
  &cx.vm.modules[id.index()]
}

fn record_mut(cx: &mut Isolate, id: ModuleId) -> &mut ModuleRecord {
  &mut cx.vm.modules[id.index()]
}

fn set_status(cx: &mut Isolate, id: ModuleId, status: ModuleStatus) {
  log::debug!("module {} -> {:?}", id.0, status);
  record_mut(cx, id).status = status;
}

fn push_record(cx: &mut Isolate, kind: ModuleKind, script_id: i32) -> ModuleId {
  let id = ModuleId(cx.vm.modules.len() as u32);
  let requests = match &kind {
    ModuleKind::SourceText { program, .. } => {
      program.module.as_ref().map_or(0, |m| m.requests.len())
    }
    ModuleKind::Synthetic { .. } => 0,
  };
  let identity_hash = cx.vm.new_identity_hash();
  cx.vm.modules.push(ModuleRecord {
    kind,
    status: ModuleStatus::Uninstantiated,
    env: None,
    realm: None,
    requested: vec![None; requests],
    exception: None,
    namespace: None,
    exports: Vec::new(),
    evaluation: None,
    identity_hash,
    script_id,
  });
  id
}

/// Parses `source` as a module.
pub(crate) fn compile(
  cx: &mut Isolate,
  source: Rc<SourceInfo>,
) -> JsResult<ModuleId> {
  let stack = parser::StackBudget::new(
    cx.vm.stack_base,
    cx.vm.config.stack_limit,
  );
  let program = match parser::parse_module(&source.text, stack) {
    Ok(program) => program,
    Err(e) => return Err(error::throw_syntax_error(cx, &e, &source)),
  };
  let script_id = source.script_id;
  Ok(push_record(
    cx,
    ModuleKind::SourceText {
      program: Rc::new(program),
      source,
    },
    script_id,
  ))
}

pub(crate) fn create_synthetic(
  cx: &mut Isolate,
  export_names: Vec<JsStr>,
  steps: SyntheticModuleEvaluationSteps,
) -> ModuleId {
  let script_id = cx.vm.next_script_id();
  push_record(cx, ModuleKind::Synthetic { export_names, steps }, script_id)
}

// Linking

/// Called once per module request: `(referrer, request index)`.
pub(crate) type Resolver<'a> = dyn FnMut(
  &mut Isolate,
  ModuleId,
  usize,
) -> JsResult<ModuleId> + 'a;

fn throw_link_error(
  cx: &mut Isolate,
  module: ModuleId,
  span: Span,
  message: String,
) -> Abrupt {
  let error = error::create_error(cx, ErrorKind::SyntaxError, &message);
  let value = JsValue::Object(error);
  let text = format!("Uncaught {}", error::detail_string(&cx.vm, &value));
  let source = record(cx, module).source().cloned();
  cx.vm.pending_message = Some(Rc::new(MessageData {
    text: text.into(),
    source,
    span,
    frames: Rc::new(Vec::new()),
  }));
  Abrupt::Throw(value)
}

/// Links `id` and everything it depends on. On failure every module this
/// call started linking becomes `Errored` with the thrown exception.
pub(crate) fn instantiate(
  cx: &mut Isolate,
  id: ModuleId,
  realm: ContextId,
  resolver: &mut Resolver<'_>,
) -> JsResult<()> {
  let mut linking = Vec::new();
  let result = link_graph(cx, id, realm, resolver, &mut linking);
  match result {
    Ok(()) => {
      for &module in &linking {
        set_status(cx, module, ModuleStatus::Instantiated);
      }
      Ok(())
    }
    Err(e) => {
      let exception = match &e {
        Abrupt::Throw(value) => Some(value.clone()),
        Abrupt::Terminate => None,
      };
      for &module in &linking {
        record_mut(cx, module).exception = exception.clone();
        set_status(cx, module, ModuleStatus::Errored);
      }
      Err(e)
    }
  }
}

fn link_graph(
  cx: &mut Isolate,
  id: ModuleId,
  realm: ContextId,
  resolver: &mut Resolver<'_>,
  linking: &mut Vec<ModuleId>,
) -> JsResult<()> {
  collect_requests(cx, id, realm, resolver, linking)?;
  for &module in linking.iter() {
    create_environment(cx, module, realm);
  }
  for &module in linking.iter() {
    initialize_environment(cx, module)?;
  }
  Ok(())
}

/// Depth-first walk that asks the resolver for every request and marks the
/// modules it reaches as instantiating.
fn collect_requests(
  cx: &mut Isolate,
  id: ModuleId,
  realm: ContextId,
  resolver: &mut Resolver<'_>,
  linking: &mut Vec<ModuleId>,
) -> JsResult<()> {
  ops::check_interrupts(cx)?;
  match record(cx, id).status {
    ModuleStatus::Uninstantiated => {}
    ModuleStatus::Errored => {
      let exception = record(cx, id).exception.clone().unwrap_or_default();
      return Err(error::throw_value(cx, exception));
    }
    _ => return Ok(()),
  }
  set_status(cx, id, ModuleStatus::Instantiating);
  record_mut(cx, id).realm = Some(realm);
  linking.push(id);
  for index in 0..record(cx, id).request_count() {
    let target = resolver(cx, id, index)?;
    record_mut(cx, id).requested[index] = Some(target);
    collect_requests(cx, target, realm, resolver, linking)?;
  }
  Ok(())
}

fn create_environment(cx: &mut Isolate, id: ModuleId, realm: ContextId) {
  let global_env = cx.vm.realm(realm).global_env;
  let mut env = Env::declarative(Some(global_env));
  env.this = Some(JsValue::Undefined);
  match &record(cx, id).kind {
    ModuleKind::SourceText { program, .. } => {
      for name in &program.scope.var_names {
        env.declare(
          name.clone(),
          Some(JsValue::Undefined),
          Mutability::Mutable,
        );
      }
      for decl in &program.lexical {
        let mutability = if decl.is_const {
          Mutability::Const
        } else {
          Mutability::Mutable
        };
        env.declare(decl.name.clone(), None, mutability);
      }
    }
    ModuleKind::Synthetic { export_names, .. } => {
      for name in export_names {
        env.declare(
          name.clone(),
          Some(JsValue::Undefined),
          Mutability::Mutable,
        );
      }
    }
  }
  let env = cx.vm.heap.alloc(Cell::Env(env));
  record_mut(cx, id).env = Some(env);
}

fn requested_module(cx: &Isolate, id: ModuleId, request: usize) -> ModuleId {
  match record(cx, id).requested.get(request).copied().flatten() {
    Some(target) => target,
    None => panic!("module request {request} was not resolved"),
  }
}

fn request_specifier(cx: &Isolate, id: ModuleId, request: usize) -> JsStr {
  record(cx, id)
    .program()
    .and_then(|p| p.module.as_ref())
    .map(|m| m.requests[request].specifier.clone())
    .unwrap_or_else(|| "".into())
}

/// Binds imports and instantiates hoisted functions.
fn initialize_environment(cx: &mut Isolate, id: ModuleId) -> JsResult<()> {
  let (program, source) = match &record(cx, id).kind {
    ModuleKind::SourceText { program, source } => {
      (program.clone(), source.clone())
    }
    ModuleKind::Synthetic { .. } => return Ok(()),
  };
  let Some(env) = record(cx, id).env else {
    return Ok(());
  };
  let Some(info) = program.module.as_ref() else {
    return Ok(());
  };

  for export in &info.indirect_exports {
    let Some(name) = &export.import_name else {
      continue;
    };
    let target = requested_module(cx, id, export.request);
    let mut visited = HashSet::new();
    if let Err(failure) = resolve_export(cx, target, name, &mut visited) {
      let specifier = request_specifier(cx, id, export.request);
      return Err(throw_link_error(
        cx,
        id,
        export.span,
        resolution_message(failure, &specifier, name),
      ));
    }
  }

  for import in &info.imports {
    let target = requested_module(cx, id, import.request);
    let binding = match &import.import_name {
      ImportName::Namespace => {
        let namespace = get_namespace(cx, target);
        Binding::Value {
          value: Some(JsValue::Object(namespace)),
          mutability: Mutability::Const,
        }
      }
      ImportName::Named(name) => {
        let mut visited = HashSet::new();
        match resolve_export(cx, target, name, &mut visited) {
          Ok(Resolution::Namespace(module)) => {
            let namespace = get_namespace(cx, module);
            Binding::Value {
              value: Some(JsValue::Object(namespace)),
              mutability: Mutability::Const,
            }
          }
          Ok(Resolution::Binding { module, name }) => {
            let Some(target_env) = record(cx, module).env else {
              panic!("module {} has no environment", module.0);
            };
            Binding::Import {
              env: target_env,
              name,
            }
          }
          Err(failure) => {
            let specifier = request_specifier(cx, id, import.request);
            return Err(throw_link_error(
              cx,
              id,
              import.span,
              resolution_message(failure, &specifier, name),
            ));
          }
        }
      }
    };
    cx.vm
      .heap
      .env_mut(env)
      .bindings
      .insert(import.local.clone(), binding);
  }

  for node in &program.scope.functions {
    let closure = interp::make_function(
      cx,
      node,
      env,
      &source,
      Some("default".into()),
    );
    let name = node
      .name
      .clone()
      .unwrap_or_else(|| crate::engine::ast::DEFAULT_EXPORT_BINDING.into());
    cx.vm.heap.env_mut(env).declare(
      name,
      Some(JsValue::Object(closure)),
      Mutability::Mutable,
    );
  }
  Ok(())
}

fn resolution_message(
  failure: ResolveFailure,
  specifier: &str,
  name: &str,
) -> String {
  match failure {
    ResolveFailure::NotFound => format!(
      "The requested module '{specifier}' does not provide an export named '{name}'"
    ),
    ResolveFailure::Ambiguous => format!(
      "The requested module '{specifier}' contains conflicting star exports for name '{name}'"
    ),
  }
}

/// ResolveExport. `visited` breaks cycles through re-exports.
fn resolve_export(
  cx: &Isolate,
  id: ModuleId,
  name: &JsStr,
  visited: &mut HashSet<(ModuleId, JsStr)>,
) -> Result<Resolution, ResolveFailure> {
  if !visited.insert((id, name.clone())) {
    return Err(ResolveFailure::NotFound);
  }
  let program = match &record(cx, id).kind {
    ModuleKind::Synthetic { export_names, .. } => {
      return if export_names.contains(name) {
        Ok(Resolution::Binding {
          module: id,
          name: name.clone(),
        })
      } else {
        Err(ResolveFailure::NotFound)
      };
    }
    ModuleKind::SourceText { program, .. } => program.clone(),
  };
  let Some(info) = program.module.as_ref() else {
    return Err(ResolveFailure::NotFound);
  };

  if let Some((_, local)) = info.local_exports.iter().find(|(e, _)| e == name) {
    // Re-exporting an imported binding resolves through the import.
    if let Some(import) = info.imports.iter().find(|i| i.local == *local) {
      let target = requested_module(cx, id, import.request);
      return match &import.import_name {
        ImportName::Namespace => Ok(Resolution::Namespace(target)),
        ImportName::Named(imported) => {
          resolve_export(cx, target, imported, visited)
        }
      };
    }
    return Ok(Resolution::Binding {
      module: id,
      name: local.clone(),
    });
  }

  if let Some(export) =
    info.indirect_exports.iter().find(|e| e.export_name == *name)
  {
    let target = requested_module(cx, id, export.request);
    return match &export.import_name {
      Some(imported) => resolve_export(cx, target, imported, visited),
      None => Ok(Resolution::Namespace(target)),
    };
  }

  if &**name == "default" {
    return Err(ResolveFailure::NotFound);
  }

  let mut star_resolution: Option<Resolution> = None;
  for &request in &info.star_exports {
    let target = requested_module(cx, id, request);
    match resolve_export(cx, target, name, visited) {
      Ok(resolution) => match &star_resolution {
        None => star_resolution = Some(resolution),
        Some(existing) if *existing == resolution => {}
        Some(_) => return Err(ResolveFailure::Ambiguous),
      },
      Err(ResolveFailure::Ambiguous) => return Err(ResolveFailure::Ambiguous),
      Err(ResolveFailure::NotFound) => {}
    }
  }
  star_resolution.ok_or(ResolveFailure::NotFound)
}

/// GetExportedNames.
fn exported_names(
  cx: &Isolate,
  id: ModuleId,
  visited: &mut HashSet<ModuleId>,
) -> Vec<JsStr> {
  if !visited.insert(id) {
    return Vec::new();
  }
  let program = match &record(cx, id).kind {
    ModuleKind::Synthetic { export_names, .. } => return export_names.clone(),
    ModuleKind::SourceText { program, .. } => program.clone(),
  };
  let Some(info) = program.module.as_ref() else {
    return Vec::new();
  };
  let mut names: Vec<JsStr> = info
    .local_exports
    .iter()
    .map(|(e, _)| e.clone())
    .collect();
  names.extend(info.indirect_exports.iter().map(|e| e.export_name.clone()));
  for &request in &info.star_exports {
    let target = requested_module(cx, id, request);
    for name in exported_names(cx, target, visited) {
      if &*name != "default" && !names.contains(&name) {
        names.push(name);
      }
    }
  }
  names
}

/// The module namespace object, created on first request.
pub(crate) fn get_namespace(cx: &mut Isolate, id: ModuleId) -> ObjRef {
  if let Some(namespace) = record(cx, id).namespace {
    return namespace;
  }
  let mut exports = Vec::new();
  for name in exported_names(cx, id, &mut HashSet::new()) {
    let mut visited = HashSet::new();
    if let Ok(resolution) = resolve_export(cx, id, &name, &mut visited) {
      exports.push((name, resolution));
    }
  }
  exports.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
  let realm = record(cx, id).realm.unwrap_or(ContextId(0));
  let mut object = JsObject::with_class(
    None,
    realm,
    ObjectClass::Namespace(id),
  );
  object.extensible = false;
  let namespace = cx.vm.heap.alloc(Cell::Object(object));
  let record = record_mut(cx, id);
  record.exports = exports;
  record.namespace = Some(namespace);
  namespace
}

/// Reads a binding straight out of a module environment. `None` means the
/// binding is still in its temporal dead zone.
fn read_module_binding(
  cx: &Isolate,
  env: EnvRef,
  name: &JsStr,
) -> Option<JsValue> {
  match cx.vm.heap.env(env).bindings.get(name)? {
    Binding::Value { value, .. } => value.clone(),
    Binding::Import { env, name } => read_module_binding(cx, *env, name),
  }
}

pub(crate) fn namespace_own_property(
  cx: &mut Isolate,
  id: ModuleId,
  key: &PropertyKey,
) -> JsResult<Option<Property>> {
  let PropertyKey::String(name) = key else {
    return Ok(None);
  };
  let Some((_, resolution)) = record(cx, id)
    .exports
    .iter()
    .find(|(n, _)| n == name)
    .cloned()
  else {
    return Ok(None);
  };
  let value = match resolution {
    Resolution::Namespace(module) => JsValue::Object(get_namespace(cx, module)),
    Resolution::Binding { module, name } => {
      let value = record(cx, module)
        .env
        .and_then(|env| read_module_binding(cx, env, &name));
      match value {
        Some(value) => value,
        None => {
          return Err(error::reference_error(
            cx,
            format!("Cannot access '{name}' before initialization"),
          ));
        }
      }
    }
  };
  Ok(Some(Property::data(
    value,
    Attributes {
      writable: true,
      enumerable: true,
      configurable: false,
    },
  )))
}

pub(crate) fn namespace_keys(cx: &Isolate, id: ModuleId) -> Vec<PropertyKey> {
  record(cx, id)
    .exports
    .iter()
    .map(|(name, _)| PropertyKey::String(name.clone()))
    .collect()
}

// Evaluation

/// Evaluates a linked module graph. Returns the (already settled) promise
/// for the evaluation.
pub(crate) fn evaluate(cx: &mut Isolate, id: ModuleId) -> JsResult<ObjRef> {
  match record(cx, id).status {
    ModuleStatus::Evaluated | ModuleStatus::Evaluating => {
      if let Some(promise) = record(cx, id).evaluation {
        return Ok(promise);
      }
    }
    ModuleStatus::Errored => {
      let exception = record(cx, id).exception.clone().unwrap_or_default();
      return Err(error::throw_value(cx, exception));
    }
    ModuleStatus::Instantiated => {}
    status => panic!("cannot evaluate a module in state {status:?}"),
  }
  inner_evaluate(cx, id)?;
  if let Some(promise) = record(cx, id).evaluation {
    return Ok(promise);
  }
  let promise = promise::new_promise(cx, None);
  promise::resolve_promise(cx, promise, JsValue::Undefined);
  record_mut(cx, id).evaluation = Some(promise);
  Ok(promise)
}

fn inner_evaluate(cx: &mut Isolate, id: ModuleId) -> JsResult<()> {
  ops::check_interrupts(cx)?;
  match record(cx, id).status {
    ModuleStatus::Evaluated | ModuleStatus::Evaluating => return Ok(()),
    ModuleStatus::Errored => {
      let exception = record(cx, id).exception.clone().unwrap_or_default();
      return Err(error::throw_value(cx, exception));
    }
    _ => {}
  }
  set_status(cx, id, ModuleStatus::Evaluating);
  let result = evaluate_dependencies_and_body(cx, id);
  match &result {
    Ok(()) => set_status(cx, id, ModuleStatus::Evaluated),
    Err(Abrupt::Throw(exception)) => {
      record_mut(cx, id).exception = Some(exception.clone());
      set_status(cx, id, ModuleStatus::Errored);
    }
    Err(Abrupt::Terminate) => set_status(cx, id, ModuleStatus::Errored),
  }
  result
}

fn evaluate_dependencies_and_body(
  cx: &mut Isolate,
  id: ModuleId,
) -> JsResult<()> {
  let requested: Vec<ModuleId> = record(
    cx,
    id,
  ).requested.iter().flatten().copied().collect();
  for dependency in requested {
    inner_evaluate(cx, dependency)?;
  }
  let realm = record(cx, id).realm.unwrap_or(ContextId(0));
  let Some(env) = record(cx, id).env else {
    panic!("module {} was not linked", id.0);
  };
  match &record(cx, id).kind {
    ModuleKind::SourceText { program, source } => {
      let (program, source) = (program.clone(), source.clone());
      interp::run_module_body(cx, &program, &source, env, realm)
    }
    ModuleKind::Synthetic { steps, .. } => {
      let steps = *steps;
      crate::module::run_synthetic_steps(cx, steps, id, realm)
    }
  }
}

/// SetSyntheticModuleExport.
pub(crate) fn set_synthetic_export(
  cx: &mut Isolate,
  id: ModuleId,
  name: &JsStr,
  value: JsValue,
) -> JsResult<()> {
  let declared = match &record(cx, id).kind {
    ModuleKind::Synthetic { export_names, .. } => export_names.contains(name),
    ModuleKind::SourceText { .. } => false,
  };
  match record(cx, id).env {
    Some(env) if declared => {
      cx.vm.heap.env_mut(env).declare(
        name.clone(),
        Some(value),
        Mutability::Mutable,
      );
      Ok(())
    }
    _ => Err(error::reference_error(
      cx,
      format!("Export '{name}' is not defined in module"),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolution_messages_name_the_module() {
    assert_eq!(
      resolution_message(ResolveFailure::NotFound, "./a.js", "x"),
      "The requested module './a.js' does not provide an export named 'x'"
    );
    assert!(
      resolution_message(ResolveFailure::Ambiguous, "./b.js", "y")
        .contains("conflicting star exports")
    );
  }
}
