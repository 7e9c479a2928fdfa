// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
//! A JSON Parser and Stringifier.
use crate::engine::json;
use crate::engine::value::JsValue;
use crate::script::string_text;
use crate::HandleScope;
use crate::Local;
use crate::String;
use crate::Value;

/// Tries to parse the string `json_string` and returns it as value if
/// successful. A malformed string throws a `SyntaxError`.
pub fn parse<'s>(
  scope: &mut HandleScope<'s>,
  json_string: Local<'_, String>,
) -> Option<Local<'s, Value>> {
  let text = string_text(&json_string);
  let value = scope.run_js(|cx, _| json::parse(cx, &text, None))?;
  Some(scope.value_local(value))
}

/// Tries to stringify the JSON-serializable object `json_object` and returns
/// it as string if successful. Values without a JSON representation
/// (`undefined`, functions, symbols) stringify to `None` without throwing.
pub fn stringify<'s>(
  scope: &mut HandleScope<'s>,
  json_object: Local<'_, Value>,
) -> Option<Local<'s, String>> {
  let value = json_object.js_value();
  let text = scope.run_js(|cx, _| {
    json::stringify(cx, &value, &JsValue::Undefined, &JsValue::Undefined)
  })??;
  Some(scope.value_local(JsValue::String(text)))
}
