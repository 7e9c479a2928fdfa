// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Value properties and functions of the global object.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::builtins::number::parse_float_builtin;
use crate::engine::builtins::number::parse_int_builtin;
use crate::engine::object::Attributes;
use crate::engine::object::CallInfo;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::isolate::Isolate;

fn is_nan(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(ops::to_number(cx, &info.arg(0))?.is_nan()))
}

fn is_finite(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(ops::to_number(cx, &info.arg(0))?.is_finite()))
}

/// `gc()`: collection runs once the outermost activation returns.
fn gc(cx: &mut Isolate, _info: &CallInfo<'_>) -> JsResult<JsValue> {
  cx.schedule_collection();
  Ok(JsValue::Undefined)
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let global = cx.vm.realm(realm).global_object;
  builtins::value(cx, global, "globalThis", JsValue::Object(global));
  let constants = [
    ("undefined", JsValue::Undefined),
    ("NaN", JsValue::Number(f64::NAN)),
    ("Infinity", JsValue::Number(f64::INFINITY)),
  ];
  for (name, value) in constants {
    ops::define_value(cx, global, name, value, Attributes::FROZEN);
  }
  builtins::method(cx, realm, global, "parseInt", 2, parse_int_builtin);
  builtins::method(cx, realm, global, "parseFloat", 1, parse_float_builtin);
  builtins::method(cx, realm, global, "isNaN", 1, is_nan);
  builtins::method(cx, realm, global, "isFinite", 1, is_finite);
  if cx.vm.config.expose_gc {
    builtins::method(cx, realm, global, "gc", 0, gc);
  }
}
