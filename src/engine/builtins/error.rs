// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `Error` and its native subclasses.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error as errors;
use crate::engine::error::ErrorKind;
use crate::engine::object::Attributes;
use crate::engine::object::CallInfo;
use crate::engine::object::JsObject;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

/// `new XError(message, { cause })`. Calling without `new` behaves the same.
fn construct_error(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  kind: ErrorKind,
) -> JsResult<JsValue> {
  let realm = ops::current_realm(cx);
  let fallback = cx.vm.realm(realm).intrinsics.error_prototypes[kind.index()];
  let new_target = info.new_target.unwrap_or(info.callee);
  let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
  let error = ops::alloc(cx, JsObject::ordinary(Some(proto), realm));
  let message = info.arg(0);
  if !message.is_undefined() {
    let message = ops::to_string(cx, &message)?;
    ops::define_value(
      cx,
      error,
      "message",
      JsValue::String(message),
      Attributes::HIDDEN,
    );
  }
  if let JsValue::Object(options) = info.arg(1) {
    let cause = PropertyKey::str("cause");
    if ops::has_property(cx, options, &cause)? {
      let cause = ops::get(cx, options, &cause)?;
      ops::define_value(cx, error, "cause", cause, Attributes::HIDDEN);
    }
  }
  errors::install_stack(cx, error);
  Ok(JsValue::Object(error))
}

macro_rules! error_constructors {
  ($($name:ident => $kind:ident),* $(,)?) => {
    $(
      fn $name(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
        construct_error(cx, info, ErrorKind::$kind)
      }
    )*

    fn constructor_for(kind: ErrorKind) -> crate::engine::object::BuiltinFn {
      match kind {
        $(ErrorKind::$kind => $name,)*
      }
    }
  };
}

error_constructors! {
  error_constructor => Error,
  type_error_constructor => TypeError,
  range_error_constructor => RangeError,
  syntax_error_constructor => SyntaxError,
  reference_error_constructor => ReferenceError,
  eval_error_constructor => EvalError,
  uri_error_constructor => UriError,
}

fn error_to_string(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let JsValue::Object(this) = info.this else {
    return Err(errors::type_error(
      cx,
      "Error.prototype.toString requires that 'this' be an Object",
    ));
  };
  let name = match ops::get_str(cx, this, "name")? {
    JsValue::Undefined => "Error".into(),
    name => ops::to_string(cx, &name)?,
  };
  let message = match ops::get_str(cx, this, "message")? {
    JsValue::Undefined => "".into(),
    message => ops::to_string(cx, &message)?,
  };
  let summary = match (name.is_empty(), message.is_empty()) {
    (true, _) => message.to_string(),
    (false, true) => name.to_string(),
    (false, false) => format!("{name}: {message}"),
  };
  Ok(JsValue::str(&summary))
}

/// `Error.captureStackTrace(target)` installs a fresh `stack` on `target`.
fn capture_stack_trace(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let JsValue::Object(target) = info.arg(0) else {
    return Err(errors::type_error(cx, "Invalid argument"));
  };
  let frames = errors::capture_frames(&cx.vm, errors::STACK_TRACE_LIMIT);
  let summary = errors::error_summary(&cx.vm, target);
  let stack = errors::stack_string(&summary, &frames);
  ops::define_value(
    cx,
    target,
    "stack",
    JsValue::str(&stack),
    Attributes::HIDDEN,
  );
  Ok(JsValue::Undefined)
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototypes = cx.vm.realm(realm).intrinsics.error_prototypes;
  let mut base = None;
  for kind in ErrorKind::ALL {
    let prototype = prototypes[kind.index()];
    let constructor = builtins::constructor(
      cx,
      realm,
      kind.name(),
      1,
      constructor_for(kind),
      prototype,
    );
    builtins::value(cx, prototype, "name", JsValue::str(kind.name()));
    builtins::value(cx, prototype, "message", JsValue::str(""));
    match base {
      None => base = Some(constructor),
      // Subclass constructors inherit statics from `Error`.
      Some(base) => cx.vm.heap.object_mut(constructor).proto = Some(base),
    }
  }
  let error_prototype = prototypes[ErrorKind::Error.index()];
  builtins::method(cx, realm, error_prototype, "toString", 0, error_to_string);
  if let Some(base) = base {
    builtins::method(
      cx,
      realm,
      base,
      "captureStackTrace",
      1,
      capture_stack_trace,
    );
    ops::define_value(
      cx,
      base,
      "stackTraceLimit",
      JsValue::Number(errors::STACK_TRACE_LIMIT as f64),
      Attributes::DEFAULT,
    );
  }
}
