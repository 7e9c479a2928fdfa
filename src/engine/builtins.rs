// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! The standard library installed into every new context.

pub(crate) mod array;
pub(crate) mod buffer;
pub(crate) mod error;
pub(crate) mod function;
pub(crate) mod global;
pub(crate) mod json;
pub(crate) mod math;
pub(crate) mod number;
pub(crate) mod object;
pub(crate) mod promise;
pub(crate) mod string;

use std::cell::Cell as StdCell;
use std::rc::Rc;

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::error as errors;
use crate::engine::object::Attributes;
use crate::engine::object::BuiltinFn;
use crate::engine::object::FunctionData;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropSlot;
use crate::engine::object::Property;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

pub(crate) fn alloc_function(
  cx: &mut Isolate,
  realm: ContextId,
  name: &str,
  length: u32,
  kind: FunctionKind,
  is_constructor: bool,
) -> ObjRef {
  let proto = cx.vm.realm(realm).intrinsics.function_prototype;
  let mut object = JsObject::with_class(
    Some(proto),
    realm,
    ObjectClass::Function(Box::new(FunctionData {
      kind,
      is_constructor,
    })),
  );
  object.insert(
    PropertyKey::str("length"),
    JsValue::Number(length as f64),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  object.insert(
    PropertyKey::str("name"),
    JsValue::str(name),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  ops::alloc(cx, object)
}

/// A built-in function object living in `realm`.
pub(crate) fn builtin_function(
  cx: &mut Isolate,
  realm: ContextId,
  name: &str,
  length: u32,
  f: BuiltinFn,
  is_constructor: bool,
) -> ObjRef {
  let kind = FunctionKind::Builtin {
    f,
    captures: Vec::new(),
    resolved: None,
  };
  alloc_function(cx, realm, name, length, kind, is_constructor)
}

/// An anonymous built-in closing over `captures`, created in the running
/// realm.
pub(crate) fn closure(
  cx: &mut Isolate,
  f: BuiltinFn,
  length: u32,
  captures: Vec<JsValue>,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let kind = FunctionKind::Builtin {
    f,
    captures,
    resolved: None,
  };
  alloc_function(cx, realm, "", length, kind, false)
}

/// One of a pair of promise resolving functions sharing `flag`.
pub(crate) fn resolving_function(
  cx: &mut Isolate,
  f: BuiltinFn,
  captures: Vec<JsValue>,
  flag: Rc<StdCell<bool>>,
) -> ObjRef {
  let realm = ops::current_realm(cx);
  let kind = FunctionKind::Builtin {
    f,
    captures,
    resolved: Some(flag),
  };
  alloc_function(cx, realm, "", 1, kind, false)
}

/// The value a built-in closure captured at `index`.
pub(crate) fn capture(cx: &Isolate, callee: ObjRef, index: usize) -> JsValue {
  match cx.vm.heap.object(callee).function_data().map(|d| &d.kind) {
    Some(FunctionKind::Builtin { captures, .. }) => {
      captures.get(index).cloned().unwrap_or_default()
    }
    _ => JsValue::Undefined,
  }
}

pub(crate) fn method(
  cx: &mut Isolate,
  realm: ContextId,
  target: ObjRef,
  name: &str,
  length: u32,
  f: BuiltinFn,
) -> ObjRef {
  let function = builtin_function(cx, realm, name, length, f, false);
  value(cx, target, name, JsValue::Object(function));
  function
}

/// A non-enumerable data property.
pub(crate) fn value(
  cx: &mut Isolate,
  target: ObjRef,
  name: &str,
  value: JsValue,
) {
  ops::define_value(cx, target, name, value, Attributes::HIDDEN);
}

/// A non-enumerable accessor with only a getter.
pub(crate) fn getter(
  cx: &mut Isolate,
  realm: ContextId,
  target: ObjRef,
  name: &str,
  f: BuiltinFn,
) {
  let get = builtin_function(cx, realm, &format!("get {name}"), 0, f, false);
  cx.vm.heap.object_mut(target).props.insert(
    PropertyKey::str(name),
    Property {
      slot: PropSlot::Accessor {
        get: Some(get),
        set: None,
      },
      attrs: Attributes {
        writable: false,
        enumerable: false,
        configurable: true,
      },
    },
  );
}

/// A constructor wired up with its prototype object.
pub(crate) fn constructor(
  cx: &mut Isolate,
  realm: ContextId,
  name: &str,
  length: u32,
  f: BuiltinFn,
  prototype: ObjRef,
) -> ObjRef {
  let function = builtin_function(cx, realm, name, length, f, true);
  ops::define_value(
    cx,
    function,
    "prototype",
    JsValue::Object(prototype),
    Attributes::FROZEN,
  );
  value(cx, prototype, "constructor", JsValue::Object(function));
  let global = cx.vm.realm(realm).global_object;
  value(cx, global, name, JsValue::Object(function));
  function
}

/// Functions like `Symbol` and `BigInt` are installed like constructors
/// but reject `new`.
pub(crate) fn forbid_new(cx: &mut Isolate, function: ObjRef) {
  if let ObjectClass::Function(data) =
    &mut cx.vm.heap.object_mut(function).class
  {
    data.is_constructor = false;
  }
}

/// A plain namespace object such as `Math` or `JSON`.
pub(crate) fn namespace(
  cx: &mut Isolate,
  realm: ContextId,
  name: &str,
) -> ObjRef {
  let proto = cx.vm.realm(realm).intrinsics.object_prototype;
  let object = ops::alloc(cx, JsObject::ordinary(Some(proto), realm));
  let global = cx.vm.realm(realm).global_object;
  value(cx, global, name, JsValue::Object(object));
  object
}

/// `this` as an object, for methods that work on any receiver.
pub(crate) fn this_object(
  cx: &mut Isolate,
  this: &JsValue,
  method: &str,
) -> JsResult<ObjRef> {
  match this {
    JsValue::Undefined | JsValue::Null => Err(errors::type_error(
      cx,
      format!("{method} called on null or undefined"),
    )),
    _ => ops::to_object(cx, this),
  }
}

/// `value` as a callable, or a TypeError naming it.
pub(crate) fn callable_arg(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<ObjRef> {
  match value.as_object() {
    Some(id) if cx.vm.heap.object(id).is_callable() => Ok(id),
    _ => {
      let detail = errors::detail_string(&cx.vm, value);
      Err(errors::type_error(cx, format!("{detail} is not a function")))
    }
  }
}

/// Populates a freshly created realm.
pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  function::install(cx, realm);
  object::install(cx, realm);
  array::install(cx, realm);
  string::install(cx, realm);
  number::install(cx, realm);
  math::install(cx, realm);
  error::install(cx, realm);
  promise::install(cx, realm);
  json::install(cx, realm);
  buffer::install(cx, realm);
  global::install(cx, realm);
}
