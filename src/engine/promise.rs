// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Promise state, reactions and the jobs they schedule.

use std::cell::Cell as StdCell;
use std::rc::Rc;

use crate::engine::Abrupt;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error;
use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::object::CallInfo;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;
use crate::promise::PromiseRejectEvent;
pub(crate) use crate::promise::PromiseState;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReactionKind {
  Fulfill,
  Reject,
}

pub(crate) struct Reaction {
  /// The promise returned by `then`, settled with the handler's outcome.
  pub derived: Option<ObjRef>,
  pub kind: ReactionKind,
  pub handler: Option<ObjRef>,
}

impl Trace for Reaction {
  fn trace(&self, tracer: &mut Tracer) {
    self.derived.trace(tracer);
    self.handler.trace(tracer);
  }
}

pub(crate) struct PromiseData {
  pub state: PromiseState,
  pub result: JsValue,
  pub fulfill_reactions: Vec<Reaction>,
  pub reject_reactions: Vec<Reaction>,
  pub is_handled: bool,
  /// "Already resolved" flag shared by the promise's own resolving
  /// functions and the embedder's resolver.
  pub resolved: Rc<StdCell<bool>>,
}

impl PromiseData {
  fn new() -> Self {
    Self {
      state: PromiseState::Pending,
      result: JsValue::Undefined,
      fulfill_reactions: Vec::new(),
      reject_reactions: Vec::new(),
      is_handled: false,
      resolved: Rc::new(StdCell::new(false)),
    }
  }

  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    tracer.visit_value(&self.result);
    self.fulfill_reactions.trace(tracer);
    self.reject_reactions.trace(tracer);
  }
}

/// A unit of work on the microtask queue.
pub(crate) enum Job {
  Reaction {
    reaction: Reaction,
    argument: JsValue,
  },
  ResolveThenable {
    promise: ObjRef,
    thenable: JsValue,
    then: ObjRef,
  },
  /// `enqueue_microtask` from the embedder.
  Callback(ObjRef),
}

impl Job {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    match self {
      Job::Reaction { reaction, argument } => {
        reaction.trace(tracer);
        tracer.visit_value(argument);
      }
      Job::ResolveThenable {
        promise,
        thenable,
        then,
      } => {
        tracer.visit(*promise);
        tracer.visit_value(thenable);
        tracer.visit(*then);
      }
      Job::Callback(function) => tracer.visit(*function),
    }
  }
}

pub(crate) fn data(cx: &Isolate, promise: ObjRef) -> &PromiseData {
  match &cx.vm.heap.object(promise).class {
    ObjectClass::Promise(data) => data,
    _ => panic!("object is not a promise"),
  }
}

pub(crate) fn data_mut(cx: &mut Isolate, promise: ObjRef) -> &mut PromiseData {
  match &mut cx.vm.heap.object_mut(promise).class {
    ObjectClass::Promise(data) => data,
    _ => panic!("object is not a promise"),
  }
}

pub(crate) fn is_promise(cx: &Isolate, value: &JsValue) -> bool {
  value
    .as_object()
    .is_some_and(|id| matches!(
      cx.vm.heap.object(id).class,
      ObjectClass::Promise(_),
    ))
}

/// A pending promise with the given prototype (defaults to the current
/// realm's `Promise.prototype`).
pub(crate) fn new_promise(cx: &mut Isolate, proto: Option<ObjRef>) -> ObjRef {
  let realm = ops::current_realm(cx);
  let proto = proto.unwrap_or(cx.vm.realm(realm).intrinsics.promise_prototype);
  ops::alloc(
    cx,
    JsObject::with_class(
      Some(proto),
      realm,
      ObjectClass::Promise(Box::new(PromiseData::new())),
    ),
  )
}

fn trigger_reactions(
  cx: &mut Isolate,
  reactions: Vec<Reaction>,
  argument: &JsValue,
) {
  for reaction in reactions {
    cx.vm.jobs.push_back(Job::Reaction {
      reaction,
      argument: argument.clone(),
    });
  }
}

pub(crate) fn fulfill(cx: &mut Isolate, promise: ObjRef, value: JsValue) {
  let data = data_mut(cx, promise);
  debug_assert_eq!(data.state, PromiseState::Pending);
  data.state = PromiseState::Fulfilled;
  data.result = value.clone();
  data.reject_reactions.clear();
  let reactions = std::mem::take(&mut data.fulfill_reactions);
  trigger_reactions(cx, reactions, &value);
}

pub(crate) fn reject(cx: &mut Isolate, promise: ObjRef, reason: JsValue) {
  let data = data_mut(cx, promise);
  debug_assert_eq!(data.state, PromiseState::Pending);
  data.state = PromiseState::Rejected;
  data.result = reason.clone();
  data.fulfill_reactions.clear();
  let reactions = std::mem::take(&mut data.reject_reactions);
  let handled = data.is_handled;
  if !handled {
    crate::isolate::report_promise_reject(
      cx,
      promise,
      PromiseRejectEvent::PromiseRejectWithNoHandler,
      reason.clone(),
    );
  }
  trigger_reactions(cx, reactions, &reason);
}

/// The body of a resolve function once the "already resolved" check
/// passed.
fn resolve_unchecked(cx: &mut Isolate, promise: ObjRef, resolution: JsValue) {
  let JsValue::Object(object) = resolution else {
    fulfill(cx, promise, resolution);
    return;
  };
  if object == promise {
    let error = error::create_error(
      cx,
      error::ErrorKind::TypeError,
      "Chaining cycle detected for promise #<Promise>",
    );
    reject(cx, promise, JsValue::Object(error));
    return;
  }
  let then = match ops::get(cx, object, &PropertyKey::str("then")) {
    Ok(then) => then,
    Err(Abrupt::Throw(error)) => {
      cx.vm.pending_message = None;
      reject(cx, promise, error);
      return;
    }
    Err(Abrupt::Terminate) => return,
  };
  match then {
    JsValue::Object(then) if cx.vm.heap.object(then).is_callable() => {
      cx.vm.jobs.push_back(Job::ResolveThenable {
        promise,
        thenable: resolution,
        then,
      });
    }
    _ => fulfill(cx, promise, resolution),
  }
}

/// Resolves through the given "already resolved" flag.
pub(crate) fn resolve_with(
  cx: &mut Isolate,
  promise: ObjRef,
  flag: &Rc<StdCell<bool>>,
  resolution: JsValue,
) {
  if flag.replace(true) {
    crate::isolate::report_promise_reject(
      cx,
      promise,
      PromiseRejectEvent::PromiseResolveAfterResolved,
      resolution,
    );
    return;
  }
  resolve_unchecked(cx, promise, resolution);
}

pub(crate) fn reject_with(
  cx: &mut Isolate,
  promise: ObjRef,
  flag: &Rc<StdCell<bool>>,
  reason: JsValue,
) {
  if flag.replace(true) {
    crate::isolate::report_promise_reject(
      cx,
      promise,
      PromiseRejectEvent::PromiseRejectAfterResolved,
      reason,
    );
    return;
  }
  reject(cx, promise, reason);
}

/// Resolves `promise` through its own flag, as the embedder's resolver
/// does.
pub(crate) fn resolve_promise(
  cx: &mut Isolate,
  promise: ObjRef,
  resolution: JsValue,
) {
  let flag = data(cx, promise).resolved.clone();
  resolve_with(cx, promise, &flag, resolution);
}

pub(crate) fn reject_promise(
  cx: &mut Isolate,
  promise: ObjRef,
  reason: JsValue,
) {
  let flag = data(cx, promise).resolved.clone();
  reject_with(cx, promise, &flag, reason);
}

fn resolving_flag(cx: &Isolate, callee: ObjRef) -> Rc<StdCell<bool>> {
  match cx.vm.heap.object(callee).function_data().map(|d| &d.kind) {
    Some(FunctionKind::Builtin {
      resolved: Some(flag),
      ..
    }) => flag.clone(),
    _ => Rc::new(StdCell::new(false)),
  }
}

fn captured_promise(cx: &Isolate, callee: ObjRef) -> ObjRef {
  match builtins::capture(cx, callee, 0) {
    JsValue::Object(promise) => promise,
    _ => panic!("resolving function without a promise"),
  }
}

fn resolve_function(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let promise = captured_promise(cx, info.callee);
  let flag = resolving_flag(cx, info.callee);
  resolve_with(cx, promise, &flag, info.arg(0));
  Ok(JsValue::Undefined)
}

fn reject_function(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let promise = captured_promise(cx, info.callee);
  let flag = resolving_flag(cx, info.callee);
  reject_with(cx, promise, &flag, info.arg(0));
  Ok(JsValue::Undefined)
}

/// CreateResolvingFunctions sharing `flag`.
pub(crate) fn resolving_functions(
  cx: &mut Isolate,
  promise: ObjRef,
  flag: Rc<StdCell<bool>>,
) -> (ObjRef, ObjRef) {
  let captures = vec![JsValue::Object(promise)];
  let resolve = builtins::resolving_function(
    cx,
    resolve_function,
    captures.clone(),
    flag.clone(),
  );
  let reject = builtins::resolving_function(
    cx,
    reject_function,
    captures,
    flag,
  );
  (resolve, reject)
}

/// PerformPromiseThen. `derived` receives the handler's outcome.
pub(crate) fn perform_then(
  cx: &mut Isolate,
  promise: ObjRef,
  on_fulfilled: Option<ObjRef>,
  on_rejected: Option<ObjRef>,
  derived: Option<ObjRef>,
) {
  let fulfill_reaction = Reaction {
    derived,
    kind: ReactionKind::Fulfill,
    handler: on_fulfilled,
  };
  let reject_reaction = Reaction {
    derived,
    kind: ReactionKind::Reject,
    handler: on_rejected,
  };
  let data = data_mut(cx, promise);
  let was_handled = data.is_handled;
  data.is_handled = true;
  match data.state {
    PromiseState::Pending => {
      data.fulfill_reactions.push(fulfill_reaction);
      data.reject_reactions.push(reject_reaction);
    }
    PromiseState::Fulfilled => {
      let argument = data.result.clone();
      cx.vm.jobs.push_back(Job::Reaction {
        reaction: fulfill_reaction,
        argument,
      });
    }
    PromiseState::Rejected => {
      let argument = data.result.clone();
      if !was_handled {
        crate::isolate::report_promise_reject(
          cx,
          promise,
          PromiseRejectEvent::PromiseHandlerAddedAfterReject,
          JsValue::Undefined,
        );
      }
      cx.vm.jobs.push_back(Job::Reaction {
        reaction: reject_reaction,
        argument,
      });
    }
  }
}

/// `promise.then(on_fulfilled, on_rejected)` on an intrinsic promise.
pub(crate) fn then(
  cx: &mut Isolate,
  promise: ObjRef,
  on_fulfilled: Option<ObjRef>,
  on_rejected: Option<ObjRef>,
) -> ObjRef {
  let derived = new_promise(cx, None);
  perform_then(cx, promise, on_fulfilled, on_rejected, Some(derived));
  derived
}

/// PromiseResolve with the intrinsic constructor.
pub(crate) fn promise_resolve(cx: &mut Isolate, value: JsValue) -> ObjRef {
  if let JsValue::Object(id) = value {
    if is_promise(cx, &value) {
      return id;
    }
  }
  let promise = new_promise(cx, None);
  resolve_promise(cx, promise, value);
  promise
}

/// Runs one job. Script exceptions settle the derived promise instead of
/// propagating; only termination escapes.
pub(crate) fn run_job(cx: &mut Isolate, job: Job) -> JsResult<()> {
  match job {
    Job::Reaction { reaction, argument } => {
      let outcome = match reaction.handler {
        Some(handler) => {
          ops::call_function(cx, handler, JsValue::Undefined, &[argument])
        }
        None if reaction.kind == ReactionKind::Fulfill => Ok(argument),
        None => Err(Abrupt::Throw(argument)),
      };
      let Some(derived) = reaction.derived else {
        return match outcome {
          Err(Abrupt::Terminate) => Err(Abrupt::Terminate),
          _ => Ok(()),
        };
      };
      match outcome {
        Ok(value) => resolve_promise(cx, derived, value),
        Err(Abrupt::Throw(error)) => {
          cx.vm.pending_message = None;
          reject_promise(cx, derived, error);
        }
        Err(Abrupt::Terminate) => return Err(Abrupt::Terminate),
      }
      Ok(())
    }
    Job::ResolveThenable {
      promise,
      thenable,
      then,
    } => {
      let flag = Rc::new(StdCell::new(false));
      let (resolve, reject) = resolving_functions(cx, promise, flag.clone());
      let result = ops::call_function(
        cx,
        then,
        thenable,
        &[JsValue::Object(resolve), JsValue::Object(reject)],
      );
      match result {
        Ok(_) => Ok(()),
        Err(Abrupt::Throw(error)) => {
          cx.vm.pending_message = None;
          reject_with(cx, promise, &flag, error);
          Ok(())
        }
        Err(Abrupt::Terminate) => Err(Abrupt::Terminate),
      }
    }
    Job::Callback(function) => {
      ops::call_function(cx, function, JsValue::Undefined, &[])?;
      Ok(())
    }
  }
}
