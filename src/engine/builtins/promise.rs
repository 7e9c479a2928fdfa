// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! The `Promise` constructor and prototype.

use std::cell::Cell as StdCell;
use std::rc::Rc;

use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error as errors;
use crate::engine::object::Attributes;
use crate::engine::object::BuiltinFn;
use crate::engine::object::CallInfo;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::ops;
use crate::engine::promise;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

fn promise_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let Some(new_target) = info.new_target else {
    return Err(errors::type_error(
      cx,
      "Promise constructor cannot be invoked without 'new'",
    ));
  };
  let executor = info.arg(0);
  if !ops::is_callable(cx, &executor) {
    let detail = errors::detail_string(&cx.vm, &executor);
    return Err(errors::type_error(
      cx,
      format!("Promise resolver {detail} is not a function"),
    ));
  }
  let fallback = ops::intrinsics(cx).promise_prototype;
  let proto = ops::prototype_from_constructor(cx, new_target, fallback)?;
  let promise = promise::new_promise(cx, Some(proto));
  let flag = promise::data(cx, promise).resolved.clone();
  let (resolve, reject) = promise::resolving_functions(cx, promise, flag);
  let args = [JsValue::Object(resolve), JsValue::Object(reject)];
  match ops::call(cx, &executor, JsValue::Undefined, &args) {
    Ok(_) => {}
    Err(Abrupt::Throw(error)) => {
      cx.vm.pending_message = None;
      ops::call_function(cx, reject, JsValue::Undefined, &[error])?;
    }
    Err(Abrupt::Terminate) => return Err(Abrupt::Terminate),
  }
  Ok(JsValue::Object(promise))
}

fn this_promise(
  cx: &mut Isolate,
  this: &JsValue,
  method: &str,
) -> JsResult<ObjRef> {
  match this {
    JsValue::Object(id) if promise::is_promise(cx, this) => Ok(*id),
    _ => {
      let detail = errors::detail_string(&cx.vm, this);
      Err(errors::type_error(
        cx,
        format!(
          "Method Promise.prototype.{method} called on incompatible receiver {detail}",
        ),
      ))
    }
  }
}

fn callable_or_none(cx: &Isolate, value: &JsValue) -> Option<ObjRef> {
  value.as_object().filter(|id| cx.vm.heap.object(*id).is_callable())
}

fn then(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let promise = this_promise(cx, &info.this, "then")?;
  let on_fulfilled = callable_or_none(cx, &info.arg(0));
  let on_rejected = callable_or_none(cx, &info.arg(1));
  let derived = promise::then(cx, promise, on_fulfilled, on_rejected);
  Ok(JsValue::Object(derived))
}

fn catch(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  ops::invoke(cx, &info.this, "then", &[JsValue::Undefined, info.arg(0)])
}

fn value_thunk(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(builtins::capture(cx, info.callee, 0))
}

fn thrower(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let reason = builtins::capture(cx, info.callee, 0);
  Err(errors::throw_value(cx, reason))
}

/// Runs the `finally` callback, then continues with `continuation` closing
/// over the original outcome.
fn after_finally(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  continuation: BuiltinFn,
) -> JsResult<JsValue> {
  let on_finally = builtins::capture(cx, info.callee, 0);
  let result = ops::call(cx, &on_finally, JsValue::Undefined, &[])?;
  let settled = promise::promise_resolve(cx, result);
  let next = builtins::closure(cx, continuation, 0, vec![info.arg(0)]);
  let derived = promise::then(cx, settled, Some(next), None);
  Ok(JsValue::Object(derived))
}

fn then_finally(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  after_finally(cx, info, value_thunk)
}

fn catch_finally(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  after_finally(cx, info, thrower)
}

fn finally(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let on_finally = info.arg(0);
  if !ops::is_callable(cx, &on_finally) {
    return ops::invoke(
      cx,
      &info.this,
      "then",
      &[on_finally.clone(), on_finally],
    );
  }
  let on_fulfilled = builtins::closure(
    cx,
    then_finally,
    1,
    vec![on_finally.clone()],
  );
  let on_rejected = builtins::closure(cx, catch_finally, 1, vec![on_finally]);
  ops::invoke(
    cx,
    &info.this,
    "then",
    &[JsValue::Object(on_fulfilled), JsValue::Object(on_rejected)],
  )
}

fn resolve(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Object(promise::promise_resolve(cx, info.arg(0))))
}

fn reject(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let promise = promise::new_promise(cx, None);
  promise::reject_promise(cx, promise, info.arg(0));
  Ok(JsValue::Object(promise))
}

#[derive(Clone, Copy)]
enum Combinator {
  All,
  AllSettled,
}

/// Shared bookkeeping for one `Promise.all` style call: the result array,
/// the outstanding element count and the aggregate promise.
struct Aggregate {
  values: ObjRef,
  counter: ObjRef,
  promise: ObjRef,
}

impl Aggregate {
  fn from_captures(cx: &Isolate, callee: ObjRef) -> Option<(Aggregate, u64)> {
    let object = |i| builtins::capture(cx, callee, i).as_object();
    let index = match builtins::capture(cx, callee, 3) {
      JsValue::Number(n) => n as u64,
      _ => return None,
    };
    Some((
      Aggregate {
        values: object(0)?,
        counter: object(1)?,
        promise: object(2)?,
      },
      index,
    ))
  }

  fn captures(&self, index: u64) -> Vec<JsValue> {
    vec![
      JsValue::Object(self.values),
      JsValue::Object(self.counter),
      JsValue::Object(self.promise),
      JsValue::Number(index as f64),
    ]
  }

  fn remaining(cx: &mut Isolate, counter: ObjRef) -> JsResult<f64> {
    let remaining = ops::get_str(cx, counter, "remaining")?;
    ops::to_number(cx, &remaining)
  }

  fn adjust(cx: &mut Isolate, counter: ObjRef, delta: f64) -> JsResult<f64> {
    let remaining = Self::remaining(cx, counter)? + delta;
    ops::define_value(
      cx,
      counter,
      "remaining",
      JsValue::Number(remaining),
      Attributes::DEFAULT,
    );
    Ok(remaining)
  }

  /// Stores `value` at `index` and fulfills the aggregate once every
  /// element reported.
  fn settle_element(
    &self,
    cx: &mut Isolate,
    index: u64,
    value: JsValue,
  ) -> JsResult<()> {
    ops::create_data_property(
      cx,
      self.values,
      PropertyKey::index(index as usize),
      value,
    )?;
    if Self::adjust(cx, self.counter, -1.0)? == 0.0 {
      promise::resolve_promise(cx, self.promise, JsValue::Object(self.values));
    }
    Ok(())
  }
}

fn settlement_record(
  cx: &mut Isolate,
  status: &str,
  key: &str,
  value: JsValue,
) -> JsValue {
  let record = ops::new_object(cx);
  ops::define_value(
    cx,
    record,
    "status",
    JsValue::str(status),
    Attributes::DEFAULT,
  );
  ops::define_value(cx, record, key, value, Attributes::DEFAULT);
  JsValue::Object(record)
}

/// Flips the element's "already called" flag, reporting whether this is
/// the first call.
fn first_call(cx: &Isolate, callee: ObjRef) -> bool {
  match cx.vm.heap.object(callee).function_data().map(|d| &d.kind) {
    Some(FunctionKind::Builtin {
      resolved: Some(flag),
      ..
    }) => !flag.replace(true),
    _ => true,
  }
}

fn all_resolve_element(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  if !first_call(cx, info.callee) {
    return Ok(JsValue::Undefined);
  }
  if let Some((aggregate, index)) = Aggregate::from_captures(cx, info.callee) {
    aggregate.settle_element(cx, index, info.arg(0))?;
  }
  Ok(JsValue::Undefined)
}

fn all_settled_fulfill_element(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  if !first_call(cx, info.callee) {
    return Ok(JsValue::Undefined);
  }
  if let Some((aggregate, index)) = Aggregate::from_captures(cx, info.callee) {
    let record = settlement_record(cx, "fulfilled", "value", info.arg(0));
    aggregate.settle_element(cx, index, record)?;
  }
  Ok(JsValue::Undefined)
}

fn all_settled_reject_element(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  if !first_call(cx, info.callee) {
    return Ok(JsValue::Undefined);
  }
  if let Some((aggregate, index)) = Aggregate::from_captures(cx, info.callee) {
    let record = settlement_record(cx, "rejected", "reason", info.arg(0));
    aggregate.settle_element(cx, index, record)?;
  }
  Ok(JsValue::Undefined)
}

fn aggregate_reject(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  if let JsValue::Object(promise) = builtins::capture(cx, info.callee, 0) {
    promise::reject_promise(cx, promise, info.arg(0));
  }
  Ok(JsValue::Undefined)
}

fn combine(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
  combinator: Combinator,
) -> JsResult<JsValue> {
  let result = promise::new_promise(cx, None);
  let items = match ops::iterable_to_list(cx, &info.arg(0)) {
    Ok(items) => items,
    Err(Abrupt::Throw(error)) => {
      cx.vm.pending_message = None;
      promise::reject_promise(cx, result, error);
      return Ok(JsValue::Object(result));
    }
    Err(Abrupt::Terminate) => return Err(Abrupt::Terminate),
  };
  let values = ops::new_array(cx, vec![JsValue::Undefined; items.len()]);
  let realm = ops::current_realm(cx);
  let counter = ops::alloc(cx, JsObject::ordinary(None, realm));
  ops::define_value(
    cx,
    counter,
    "remaining",
    JsValue::Number(1.0),
    Attributes::DEFAULT,
  );
  let aggregate = Aggregate {
    values,
    counter,
    promise: result,
  };
  for (index, item) in items.into_iter().enumerate() {
    let index = index as u64;
    let next = promise::promise_resolve(cx, item);
    Aggregate::adjust(cx, counter, 1.0)?;
    // Each element gets its own "already called" flag.
    let called = Rc::new(StdCell::new(false));
    let (on_fulfilled, on_rejected) = match combinator {
      Combinator::All => (
        builtins::resolving_function(
          cx,
          all_resolve_element,
          aggregate.captures(index),
          called,
        ),
        builtins::closure(
          cx,
          aggregate_reject,
          1,
          vec![JsValue::Object(result)],
        ),
      ),
      Combinator::AllSettled => (
        builtins::resolving_function(
          cx,
          all_settled_fulfill_element,
          aggregate.captures(index),
          called.clone(),
        ),
        builtins::resolving_function(
          cx,
          all_settled_reject_element,
          aggregate.captures(index),
          called,
        ),
      ),
    };
    promise::perform_then(
      cx,
      next,
      Some(on_fulfilled),
      Some(on_rejected),
      None,
    );
  }
  if Aggregate::adjust(cx, counter, -1.0)? == 0.0 {
    promise::resolve_promise(cx, result, JsValue::Object(values));
  }
  Ok(JsValue::Object(result))
}

fn all(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  combine(cx, info, Combinator::All)
}

fn all_settled(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  combine(cx, info, Combinator::AllSettled)
}

fn race(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let result = promise::new_promise(cx, None);
  let items = ops::iterable_to_list(cx, &info.arg(0))?;
  let flag = promise::data(cx, result).resolved.clone();
  let (resolve, reject) = promise::resolving_functions(cx, result, flag);
  for item in items {
    let next = promise::promise_resolve(cx, item);
    promise::perform_then(cx, next, Some(resolve), Some(reject), None);
  }
  Ok(JsValue::Object(result))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototype = cx.vm.realm(realm).intrinsics.promise_prototype;
  let constructor = builtins::constructor(
    cx,
    realm,
    "Promise",
    1,
    promise_constructor,
    prototype,
  );
  builtins::method(cx, realm, prototype, "then", 2, then);
  builtins::method(cx, realm, prototype, "catch", 1, catch);
  builtins::method(cx, realm, prototype, "finally", 1, finally);
  let statics: [(&str, u32, BuiltinFn); 5] = [
    ("resolve", 1, resolve),
    ("reject", 1, reject),
    ("all", 1, all),
    ("allSettled", 1, all_settled),
    ("race", 1, race),
  ];
  for (name, length, f) in statics {
    builtins::method(cx, realm, constructor, name, length, f);
  }
  cx.vm.realm_mut(realm).intrinsics.promise_constructor = Some(constructor);
}
