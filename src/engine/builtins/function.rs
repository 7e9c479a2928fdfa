// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `Function.prototype`.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error;
use crate::engine::error::ErrorKind;
use crate::engine::object;
use crate::engine::object::Attributes;
use crate::engine::object::CallInfo;
use crate::engine::object::FunctionData;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

/// `Function.prototype` itself: accepts anything, returns undefined.
pub(crate) fn empty(
  _cx: &mut Isolate,
  _info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Ok(JsValue::Undefined)
}

fn function_constructor(
  cx: &mut Isolate,
  _info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  Err(error::throw_error(
    cx,
    ErrorKind::EvalError,
    "Code generation from strings disallowed for this context",
  ))
}

fn this_function(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  method: &str,
) -> JsResult<crate::engine::value::ObjRef> {
  match info.this.as_object() {
    Some(id) if cx.vm.heap.object(id).is_callable() => Ok(id),
    _ => Err(error::type_error(
      cx,
      format!("Function.prototype.{method} called on a non-function"),
    )),
  }
}

fn call(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = this_function(cx, info, "call")?;
  let args = info.args.get(1..).unwrap_or_default();
  ops::call_function(cx, target, info.arg(0), args)
}

fn apply(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = this_function(cx, info, "apply")?;
  let args = match info.arg(1) {
    JsValue::Undefined | JsValue::Null => Vec::new(),
    JsValue::Object(list) => ops::array_like_to_list(cx, list)?,
    _ => {
      return Err(error::type_error(
        cx,
        "CreateListFromArrayLike called on non-object",
      ));
    }
  };
  ops::call_function(cx, target, info.arg(0), &args)
}

fn bind(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = this_function(cx, info, "bind")?;
  let bound_args: Vec<JsValue> = info.args.get(
    1..,
  ).unwrap_or_default().to_vec();
  let target_length = match ops::get_str(cx, target, "length")? {
    JsValue::Number(n) => n,
    _ => 0.0,
  };
  let length = (target_length - bound_args.len() as f64).max(0.0);
  let name = match ops::get_str(cx, target, "name")? {
    JsValue::String(s) => s,
    _ => "".into(),
  };
  let target_object = cx.vm.heap.object(target);
  let proto = target_object.proto;
  let is_constructor = target_object.is_constructor();
  let realm = ops::current_realm(cx);
  let mut object = JsObject::with_class(
    proto,
    realm,
    ObjectClass::Function(Box::new(FunctionData {
      kind: FunctionKind::Bound {
        target,
        this: info.arg(0),
        args: bound_args,
      },
      is_constructor,
    })),
  );
  object.insert(
    PropertyKey::str("length"),
    JsValue::Number(length),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  object.insert(
    PropertyKey::str("name"),
    JsValue::String(format!("bound {name}").into()),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  Ok(JsValue::Object(ops::alloc(cx, object)))
}

fn to_string(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = this_function(cx, info, "toString")?;
  let text = match cx.vm.heap.object(target).function_data().map(|d| &d.kind) {
    Some(FunctionKind::Script { node, source, .. }) => source
      .text
      .get(node.span.start as usize..node.span.end as usize)
      .unwrap_or_default()
      .to_string(),
    _ => {
      let name = object::function_name(&cx.vm.heap, target);
      format!("function {name}() {{ [native code] }}")
    }
  };
  Ok(JsValue::String(text.into()))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototype = cx.vm.realm(realm).intrinsics.function_prototype;
  ops::define_value(
    cx,
    prototype,
    "length",
    JsValue::Number(0.0),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  ops::define_value(
    cx,
    prototype,
    "name",
    JsValue::str(""),
    Attributes::READ_ONLY_CONFIGURABLE,
  );
  builtins::constructor(
    cx,
    realm,
    "Function",
    1,
    function_constructor,
    prototype,
  );
  builtins::method(cx, realm, prototype, "call", 1, call);
  builtins::method(cx, realm, prototype, "apply", 2, apply);
  builtins::method(cx, realm, prototype, "bind", 1, bind);
  builtins::method(cx, realm, prototype, "toString", 0, to_string);
}
