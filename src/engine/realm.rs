// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Realms: a global object, its environment and the built-in objects.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;

use crate::engine::ContextId;
use crate::engine::builtins;
use crate::engine::env::Env;
use crate::engine::error::ErrorKind;
use crate::engine::heap::Cell;
use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::value::EnvRef;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::isolate::Isolate;

/// Built-in prototypes and constructors a realm needs to create values.
pub(crate) struct Intrinsics {
  pub object_prototype: ObjRef,
  pub function_prototype: ObjRef,
  pub array_prototype: ObjRef,
  pub string_prototype: ObjRef,
  pub number_prototype: ObjRef,
  pub boolean_prototype: ObjRef,
  pub symbol_prototype: ObjRef,
  pub bigint_prototype: ObjRef,
  pub promise_prototype: ObjRef,
  pub array_buffer_prototype: ObjRef,
  pub uint8_array_prototype: ObjRef,
  pub error_prototypes: [ObjRef; 7],
  pub object_constructor: Option<ObjRef>,
  pub array_constructor: Option<ObjRef>,
  pub promise_constructor: Option<ObjRef>,
}

impl Intrinsics {
  fn all(&self) -> impl Iterator<Item = ObjRef> + '_ {
    [
      self.object_prototype,
      self.function_prototype,
      self.array_prototype,
      self.string_prototype,
      self.number_prototype,
      self.boolean_prototype,
      self.symbol_prototype,
      self.bigint_prototype,
      self.promise_prototype,
      self.array_buffer_prototype,
      self.uint8_array_prototype,
    ]
    .into_iter()
    .chain(self.error_prototypes)
    .chain(self.object_constructor)
    .chain(self.array_constructor)
    .chain(self.promise_constructor)
  }

  pub fn error_prototype(&self, kind: ErrorKind) -> ObjRef {
    self.error_prototypes[kind.index()]
  }
}

pub(crate) struct Realm {
  pub global_object: ObjRef,
  /// Declarative environment for top-level `let`/`const`; its parent is
  /// the object environment of the global object.
  pub global_env: EnvRef,
  pub intrinsics: Intrinsics,
  pub embedder_data: Vec<JsValue>,
  pub security_token: JsValue,
  pub slots: HashMap<TypeId, Box<dyn Any>>,
}

impl Realm {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    tracer.visit(self.global_object);
    tracer.visit(self.global_env);
    for id in self.intrinsics.all() {
      tracer.visit(id);
    }
    self.embedder_data.trace(tracer);
    tracer.visit_value(&self.security_token);
  }
}

fn alloc_object(
  cx: &mut Isolate,
  proto: Option<ObjRef>,
  realm: ContextId,
) -> ObjRef {
  cx.vm.heap.alloc(Cell::Object(JsObject::ordinary(proto, realm)))
}

/// Creates a realm with all built-ins installed. `global_object` lets the
/// embedder supply a pre-built global (from an object template); its
/// prototype is reset to `Object.prototype`.
pub(crate) fn create_realm(
  cx: &mut Isolate,
  global_object: impl FnOnce(&mut Isolate, ContextId, ObjRef) -> ObjRef,
) -> ContextId {
  let realm = ContextId(cx.vm.realms.len() as u32);
  let object_prototype = alloc_object(cx, None, realm);
  let function_prototype = cx.vm.heap.alloc(Cell::Object(JsObject::with_class(
    Some(object_prototype),
    realm,
    ObjectClass::Function(Box::new(crate::engine::object::FunctionData {
      kind: crate::engine::object::FunctionKind::Builtin {
        f: builtins::function::empty,
        captures: Vec::new(),
        resolved: None,
      },
      is_constructor: false,
    })),
  )));
  let proto = |cx: &mut Isolate, class: ObjectClass| {
    cx.vm.heap.alloc(Cell::Object(JsObject::with_class(
      Some(object_prototype),
      realm,
      class,
    )))
  };
  let array_prototype = proto(
    cx,
    ObjectClass::Array {
      length: 0,
      length_writable: true,
    },
  );
  let string_prototype = proto(cx, ObjectClass::Primitive(JsValue::str("")));
  let number_prototype = proto(
    cx,
    ObjectClass::Primitive(JsValue::Number(0.0)),
  );
  let boolean_prototype = proto(
    cx,
    ObjectClass::Primitive(JsValue::Bool(false)),
  );
  let symbol_prototype = proto(cx, ObjectClass::Ordinary);
  let bigint_prototype = proto(cx, ObjectClass::Ordinary);
  let promise_prototype = proto(cx, ObjectClass::Ordinary);
  let array_buffer_prototype = proto(cx, ObjectClass::Ordinary);
  let uint8_array_prototype = proto(cx, ObjectClass::Ordinary);
  let base_error = proto(cx, ObjectClass::Ordinary);
  let mut error_prototypes = [base_error; 7];
  for kind in &ErrorKind::ALL[1..] {
    error_prototypes[kind.index()] = alloc_object(cx, Some(base_error), realm);
  }

  let placeholder_global = alloc_object(cx, Some(object_prototype), realm);
  let object_env = cx.vm.heap.alloc(Cell::Env(Env::object(placeholder_global)));
  let mut global_env = Env::declarative(Some(object_env));
  global_env.this = Some(JsValue::Object(placeholder_global));
  let global_env = cx.vm.heap.alloc(Cell::Env(global_env));

  cx.vm.realms.push(Realm {
    global_object: placeholder_global,
    global_env,
    intrinsics: Intrinsics {
      object_prototype,
      function_prototype,
      array_prototype,
      string_prototype,
      number_prototype,
      boolean_prototype,
      symbol_prototype,
      bigint_prototype,
      promise_prototype,
      array_buffer_prototype,
      uint8_array_prototype,
      error_prototypes,
      object_constructor: None,
      array_constructor: None,
      promise_constructor: None,
    },
    embedder_data: Vec::new(),
    security_token: JsValue::Undefined,
    slots: HashMap::new(),
  });

  // The global is built inside the new realm.
  cx.entered_contexts.push(realm);
  let global = global_object(cx, realm, placeholder_global);
  cx.entered_contexts.pop();
  if global != placeholder_global {
    cx.vm.heap.object_mut(global).proto = Some(object_prototype);
    cx.vm.heap.env_mut(object_env).object = Some(global);
    cx.vm.heap.env_mut(global_env).this = Some(JsValue::Object(global));
    cx.vm.realm_mut(realm).global_object = global;
  }

  builtins::install(cx, realm);
  log::debug!("created context {}", realm.0);
  realm
}
