// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::json;
use crate::engine::object::CallInfo;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::isolate::Isolate;

fn parse(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let text = ops::to_string(cx, &info.arg(0))?;
  let reviver = info
    .arg(1)
    .as_object()
    .filter(|id| cx.vm.heap.object(*id).is_callable());
  json::parse(cx, &text, reviver)
}

fn stringify(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let text = json::stringify(cx, &info.arg(0), &info.arg(1), &info.arg(2))?;
  Ok(text.map(JsValue::String).unwrap_or_default())
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let namespace = builtins::namespace(cx, realm, "JSON");
  builtins::method(cx, realm, namespace, "parse", 2, parse);
  builtins::method(cx, realm, namespace, "stringify", 3, stringify);
}
