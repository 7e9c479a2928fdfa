// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::data::Tag;
use crate::engine::promise as engine;
use crate::engine::value::JsValue;
use crate::handle::Handled;
use crate::Function;
use crate::HandleScope;
use crate::Local;
use crate::Promise;
use crate::PromiseResolver;
use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
  Pending,
  Fulfilled,
  Rejected,
}

impl Promise {
  /// Returns the value of the [[PromiseState]] field.
  pub fn state(&self) -> PromiseState {
    engine::data(self.host_isolate(), self.obj()).state
  }

  /// Returns true if the promise has at least one derived promise, and
  /// therefore resolve/reject handlers (including default handler).
  pub fn has_handler(&self) -> bool {
    engine::data(self.host_isolate(), self.obj()).is_handled
  }

  /// Returns the content of the [[PromiseResult]] field. A pending promise
  /// reads as `undefined`.
  pub fn result<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Value> {
    let result = engine::data(scope, self.obj()).result.clone();
    scope.value_local(result)
  }

  /// Marks this promise as handled to avoid reporting unhandled rejections.
  pub fn mark_as_handled(&self) {
    engine::data_mut(self.host_isolate(), self.obj()).is_handled = true;
  }

  /// Register a rejection handler with a promise.
  ///
  /// See `Self::then2`.
  pub fn catch<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    handler: Local<Function>,
  ) -> Option<Local<'s, Promise>> {
    self.chain(scope, None, Some(handler))
  }

  /// Register a resolution handler with a promise.
  ///
  /// See `Self::then2`.
  pub fn then<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    handler: Local<Function>,
  ) -> Option<Local<'s, Promise>> {
    self.chain(scope, Some(handler), None)
  }

  /// Register a resolution/rejection handler with a promise.
  /// The handler is given the respective resolution/rejection value as
  /// an argument. If the promise is already resolved/rejected, the handler is
  /// invoked at the end of turn.
  pub fn then2<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    on_fulfilled: Local<Function>,
    on_rejected: Local<Function>,
  ) -> Option<Local<'s, Promise>> {
    self.chain(scope, Some(on_fulfilled), Some(on_rejected))
  }

  fn chain<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    on_fulfilled: Option<Local<Function>>,
    on_rejected: Option<Local<Function>>,
  ) -> Option<Local<'s, Promise>> {
    let promise = self.obj();
    let on_fulfilled = on_fulfilled.map(|f| f.obj());
    let on_rejected = on_rejected.map(|f| f.obj());
    let derived = scope.run_js(|cx, _| {
      Ok(engine::then(cx, promise, on_fulfilled, on_rejected))
    })?;
    Some(scope.new_object_local(derived))
  }
}

impl PromiseResolver {
  /// Create a new resolver, along with an associated promise in pending state.
  pub fn new<'s>(
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, PromiseResolver>> {
    let promise =
      scope.run_js(|cx, _| Ok(engine::new_promise(cx, None)))?;
    let content = Handled::Value(JsValue::Object(promise));
    let tag = crate::data::tag_of(scope, &content) | Tag::PROMISE_RESOLVER;
    Some(scope.new_local_with_tag(content, tag))
  }

  /// Extract the associated promise.
  pub fn get_promise<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Promise> {
    scope.new_object_local(self.obj())
  }

  /// Resolve the associated promise with a given value.
  /// Ignored if the promise is no longer pending.
  pub fn resolve(
    &self,
    scope: &mut HandleScope,
    value: Local<Value>,
  ) -> Option<bool> {
    let promise = self.obj();
    let value = value.js_value();
    scope.run_js(|cx, _| {
      engine::resolve_promise(cx, promise, value);
      Ok(())
    })?;
    Some(true)
  }

  /// Reject the associated promise with a given value.
  /// Ignored if the promise is no longer pending.
  pub fn reject(
    &self,
    scope: &mut HandleScope,
    value: Local<Value>,
  ) -> Option<bool> {
    let promise = self.obj();
    let value = value.js_value();
    scope.run_js(|cx, _| {
      engine::reject_promise(cx, promise, value);
      Ok(())
    })?;
    Some(true)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseRejectEvent {
  PromiseRejectWithNoHandler,
  PromiseHandlerAddedAfterReject,
  PromiseRejectAfterResolved,
  PromiseResolveAfterResolved,
}

/// What `Isolate::set_promise_reject_callback` callbacks receive.
#[derive(Clone, Copy, Debug)]
pub struct PromiseRejectMessage<'msg> {
  promise: Local<'msg, Promise>,
  event: PromiseRejectEvent,
  value: Option<Local<'msg, Value>>,
}

impl<'msg> PromiseRejectMessage<'msg> {
  pub(crate) fn new(
    promise: Local<'msg, Promise>,
    event: PromiseRejectEvent,
    value: Option<Local<'msg, Value>>,
  ) -> Self {
    Self {
      promise,
      event,
      value,
    }
  }

  pub fn get_promise(&self) -> Local<'msg, Promise> {
    self.promise
  }

  pub fn get_event(&self) -> PromiseRejectEvent {
    self.event
  }

  /// The rejection reason or resolution value. Absent for
  /// `PromiseHandlerAddedAfterReject`.
  pub fn get_value(&self) -> Option<Local<'msg, Value>> {
    self.value
  }
}
