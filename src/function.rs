// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::data::tag_of;
use crate::data::Tag;
use crate::engine::builtins;
use crate::engine::object::Attributes;
use crate::engine::object::FunctionKind;
use crate::engine::object::NativeAccessor;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::handle::Handled;
use crate::handle::Slot;
use crate::isolate::Isolate;
use crate::scope::CallbackScope;
use crate::scope::ContextScope;
use crate::scope::HandleScope;
use crate::Function;
use crate::Local;
use crate::Name;
use crate::Object;
use crate::String;
use crate::Value;

/// A native function invoked from JavaScript.
pub type FunctionCallback = for<'s> fn(
  &mut HandleScope<'s>,
  FunctionCallbackArguments<'s>,
  ReturnValue<'s>,
);

/// Accessor[Getter|Setter] are used as callback functions when
/// setting|getting a particular property. See Object and ObjectTemplate's
/// method SetAccessor.
pub type AccessorNameGetterCallback = for<'s> fn(
  &mut HandleScope<'s>,
  Local<'s, Name>,
  PropertyCallbackArguments<'s>,
  ReturnValue<'s>,
);

pub type AccessorNameSetterCallback = for<'s> fn(
  &mut HandleScope<'s>,
  Local<'s, Name>,
  Local<'s, Value>,
  PropertyCallbackArguments<'s>,
);

/// Whether a function created from the API may be used with `new`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstructorBehavior {
  Throw,
  #[default]
  Allow,
}

/// In V8-style embeddings a callback sets its result through this slot
/// rather than returning it. A callback that never touches it returns
/// `undefined`.
pub struct ReturnValue<'s> {
  slot: NonNull<Slot>,
  _phantom: PhantomData<&'s ()>,
}

impl<'s> ReturnValue<'s> {
  fn new(slot: NonNull<Slot>) -> Self {
    Self {
      slot,
      _phantom: PhantomData,
    }
  }

  fn slot(&self) -> &Slot {
    unsafe { self.slot.as_ref() }
  }

  fn fill(&mut self, value: JsValue) {
    let slot = self.slot();
    let isolate = slot.isolate_ptr();
    let content = Handled::Value(value);
    let tag = tag_of(unsafe { &*isolate }, &content);
    slot.fill(isolate, content, tag);
  }

  pub fn set(&mut self, value: Local<Value>) {
    let content = value.handled();
    let tag = value.tag();
    let slot = self.slot();
    slot.fill(slot.isolate_ptr(), content, tag);
  }

  pub fn set_bool(&mut self, value: bool) {
    self.fill(JsValue::Bool(value));
  }

  pub fn set_int32(&mut self, value: i32) {
    self.fill(JsValue::Number(value as f64));
  }

  pub fn set_uint32(&mut self, value: u32) {
    self.fill(JsValue::Number(value as f64));
  }

  pub fn set_double(&mut self, value: f64) {
    self.fill(JsValue::Number(value));
  }

  pub fn set_null(&mut self) {
    self.fill(JsValue::Null);
  }

  pub fn set_undefined(&mut self) {
    self.fill(JsValue::Undefined);
  }

  pub fn set_empty_string(&mut self) {
    self.fill(JsValue::str(""));
  }

  /// Getter. Creates a new Local<> so it comes with a certain performance
  /// hit. If the ReturnValue was not yet set, this will return the undefined
  /// value.
  pub fn get(&self, scope: &mut HandleScope<'s>) -> Local<'s, Value> {
    let slot = self.slot();
    scope.new_local_with_tag(slot.content(), slot.tag())
  }

  fn take(&self) -> JsValue {
    self.slot().value()
  }
}

/// The argument information given to function call callbacks. This
/// class provides access to information about the context of the call,
/// including the receiver, the number and values of arguments, and
/// the holder of the function.
pub struct FunctionCallbackArguments<'s> {
  this: Local<'s, Object>,
  holder: Local<'s, Object>,
  data: Local<'s, Value>,
  new_target: Local<'s, Value>,
  args: Vec<Local<'s, Value>>,
  undefined: Local<'s, Value>,
}

impl<'s> FunctionCallbackArguments<'s> {
  /// Returns the receiver. This corresponds to the "this" value.
  pub fn this(&self) -> Local<'s, Object> {
    self.this
  }

  /// If the callback was created without a Signature, this is the same
  /// value as `this()`. Otherwise it is the object that matched the
  /// signature.
  pub fn holder(&self) -> Local<'s, Object> {
    self.holder
  }

  /// For construct calls, this returns the "new.target" value.
  pub fn new_target(&self) -> Local<'s, Value> {
    self.new_target
  }

  /// Returns true if this is a construct call, i.e., if the function was
  /// called with the `new` operator.
  pub fn is_construct_call(&self) -> bool {
    !self.new_target.is_undefined()
  }

  /// Returns the data argument specified when creating the callback.
  pub fn data(&self) -> Local<'s, Value> {
    self.data
  }

  /// The number of available arguments.
  pub fn length(&self) -> i32 {
    self.args.len() as i32
  }

  /// Accessor for the available arguments. Returns `undefined` if the index is
  /// out of bounds.
  pub fn get(&self, i: i32) -> Local<'s, Value> {
    usize::try_from(i)
      .ok()
      .and_then(|i| self.args.get(i).copied())
      .unwrap_or(self.undefined)
  }
}

/// The information passed to a property callback about the context
/// of the property access.
pub struct PropertyCallbackArguments<'s> {
  this: Local<'s, Object>,
  holder: Local<'s, Object>,
  data: Local<'s, Value>,
}

impl<'s> PropertyCallbackArguments<'s> {
  /// Returns the receiver. In many cases, this is the object on which the
  /// property access was intercepted. When using
  /// `Reflect.get`, `Function.prototype.call`, or similar functions, it is the
  /// object passed in as receiver or thisArg.
  pub fn this(&self) -> Local<'s, Object> {
    self.this
  }

  /// Returns the object in the prototype chain of the receiver that has the
  /// accessor.
  pub fn holder(&self) -> Local<'s, Object> {
    self.holder
  }

  /// Returns the data set in the configuration, i.e., in
  /// `ObjectTemplate::set_accessor`.
  pub fn data(&self) -> Local<'s, Value> {
    self.data
  }
}

/// Opens the scopes a native callback runs in: a callback scope on top of
/// whatever the embedder has open, a handle scope for the callback's own
/// handles and the callee's context. Exceptions the callback throws were
/// scheduled on the isolate and are picked up here.
pub(crate) fn enter_callback<R>(
  cx: &mut Isolate,
  realm: ContextId,
  f: impl for<'s> FnOnce(&mut HandleScope<'s>) -> R,
) -> JsResult<R> {
  let result = {
    let scope = &mut unsafe { CallbackScope::new(&mut *cx) };
    let scope = &mut HandleScope::new(scope);
    let context =
      scope.new_local_with_tag(Handled::Context(realm), Tag::CONTEXT | Tag::DATA);
    let scope = &mut ContextScope::new(scope, context);
    f(&mut **scope)
  };
  if let Some(exception) = cx.scheduled_exception.take() {
    return Err(Abrupt::Throw(exception));
  }
  if cx.is_terminating() {
    return Err(Abrupt::Terminate);
  }
  Ok(result)
}

/// Sloppy-mode receiver conversion for API functions.
fn receiver_object(
  cx: &mut Isolate,
  realm: ContextId,
  this: JsValue,
) -> JsResult<ObjRef> {
  match this {
    JsValue::Object(id) => Ok(id),
    JsValue::Undefined | JsValue::Null => Ok(cx.vm.realm(realm).global_object),
    other => ops::to_object(cx, &other),
  }
}

fn undefined_tag() -> Tag {
  Tag::VALUE | Tag::PRIMITIVE | Tag::UNDEFINED | Tag::DATA
}

/// [[Call]] and [[Construct]] of functions backed by a `FunctionCallback`.
pub(crate) fn call_host_function(
  cx: &mut Isolate,
  callee: ObjRef,
  this: JsValue,
  args: &[JsValue],
  new_target: Option<ObjRef>,
) -> JsResult<JsValue> {
  let object = cx.vm.heap.object(callee);
  let realm = object.realm;
  let (callback, data) = match object.function_data().map(|d| &d.kind) {
    Some(FunctionKind::Host { callback, data, .. }) => (*callback, data.clone()),
    _ => unreachable!("not a host function"),
  };
  let Some(callback) = callback else {
    return Ok(JsValue::Undefined);
  };
  let this = receiver_object(cx, realm, this)?;
  enter_callback(cx, realm, |scope| {
    let undefined = scope.new_local_with_tag(
      Handled::Value(JsValue::Undefined),
      undefined_tag(),
    );
    let this = scope.new_object_local::<Object>(this);
    let args = FunctionCallbackArguments {
      this,
      holder: this,
      data: scope.value_local(data),
      new_target: match new_target {
        Some(id) => scope.new_object_local(id),
        None => undefined,
      },
      args: args.iter().map(|a| scope.value_local(a.clone())).collect(),
      undefined,
    };
    let rv_slot = NonNull::from(
      scope
        .new_local_with_tag::<Value>(
          Handled::Value(JsValue::Undefined),
          undefined_tag(),
        )
        .slot(),
    );
    callback(scope, args, ReturnValue::new(rv_slot));
    ReturnValue::new(rv_slot).take()
  })
}

fn property_arguments<'s>(
  scope: &mut HandleScope<'s>,
  receiver: ObjRef,
  holder: ObjRef,
  data: JsValue,
) -> PropertyCallbackArguments<'s> {
  PropertyCallbackArguments {
    this: scope.new_object_local(receiver),
    holder: scope.new_object_local(holder),
    data: scope.value_local(data),
  }
}

/// Reads a property backed by an `AccessorNameGetterCallback`.
pub(crate) fn call_native_getter(
  cx: &mut Isolate,
  accessor: Rc<NativeAccessor>,
  key: &PropertyKey,
  receiver: JsValue,
  holder: ObjRef,
) -> JsResult<JsValue> {
  let realm = cx.vm.heap.object(holder).realm;
  let receiver = receiver_object(cx, realm, receiver)?;
  let getter = accessor.getter;
  let data = accessor.data.clone();
  let key = key.to_value();
  enter_callback(cx, realm, |scope| {
    let name = scope.value_local::<Name>(key);
    let args = property_arguments(scope, receiver, holder, data);
    let rv_slot = NonNull::from(
      scope
        .new_local_with_tag::<Value>(
          Handled::Value(JsValue::Undefined),
          undefined_tag(),
        )
        .slot(),
    );
    getter(scope, name, args, ReturnValue::new(rv_slot));
    ReturnValue::new(rv_slot).take()
  })
}

/// Writes a property backed by an `AccessorNameSetterCallback`.
pub(crate) fn call_native_setter(
  cx: &mut Isolate,
  accessor: Rc<NativeAccessor>,
  key: &PropertyKey,
  value: JsValue,
  receiver: JsValue,
  holder: ObjRef,
) -> JsResult<()> {
  let Some(setter) = accessor.setter else {
    return Ok(());
  };
  let realm = cx.vm.heap.object(holder).realm;
  let receiver = receiver_object(cx, realm, receiver)?;
  let data = accessor.data.clone();
  let key = key.to_value();
  enter_callback(cx, realm, |scope| {
    let name = scope.value_local::<Name>(key);
    let value = scope.value_local::<Value>(value);
    let args = property_arguments(scope, receiver, holder, data);
    setter(scope, name, value, args);
  })
}

/// Allocates a function object backed by a native callback.
pub(crate) fn new_host_function(
  cx: &mut Isolate,
  realm: ContextId,
  name: &str,
  length: u32,
  kind: FunctionKind,
  is_constructor: bool,
) -> ObjRef {
  let function =
    builtins::alloc_function(cx, realm, name, length, kind, is_constructor);
  if is_constructor {
    let object_prototype = cx.vm.realm(realm).intrinsics.object_prototype;
    let prototype = ops::new_object_with_proto(cx, Some(object_prototype));
    cx.vm.heap.object_mut(prototype).realm = realm;
    ops::define_value(
      cx,
      prototype,
      "constructor",
      JsValue::Object(function),
      Attributes::HIDDEN,
    );
    ops::define_value(
      cx,
      function,
      "prototype",
      JsValue::Object(prototype),
      Attributes {
        writable: true,
        enumerable: false,
        configurable: false,
      },
    );
  }
  function
}

/// A builder for functions and function templates.
pub struct FunctionBuilder<'s, T> {
  pub(crate) callback: Option<FunctionCallback>,
  pub(crate) data: Option<Local<'s, Value>>,
  pub(crate) length: i32,
  pub(crate) constructor_behavior: ConstructorBehavior,
  _phantom: PhantomData<T>,
}

impl<'s, T> FunctionBuilder<'s, T> {
  /// Create a new FunctionBuilder.
  pub fn new(callback: FunctionCallback) -> Self {
    Self {
      callback: Some(callback),
      data: None,
      length: 0,
      constructor_behavior: ConstructorBehavior::Allow,
      _phantom: PhantomData,
    }
  }

  /// Set the associated data. The default is no associated data.
  pub fn data(mut self, data: Local<'s, Value>) -> Self {
    self.data = Some(data);
    self
  }

  /// Set the function length. The default is 0.
  pub fn length(mut self, length: i32) -> Self {
    self.length = length;
    self
  }

  /// Set the constructor behavior. The default is ConstructorBehavior::Allow.
  pub fn constructor_behavior(
    mut self,
    constructor_behavior: ConstructorBehavior,
  ) -> Self {
    self.constructor_behavior = constructor_behavior;
    self
  }

  pub(crate) fn data_value(&self) -> JsValue {
    self.data.map(|d| d.js_value()).unwrap_or_default()
  }

  pub(crate) fn length_u32(&self) -> u32 {
    u32::try_from(self.length).unwrap_or(0)
  }
}

impl<'s> FunctionBuilder<'s, Function> {
  /// Create the function in the current execution context.
  pub fn build(
    self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Function>> {
    let realm = scope.context_id();
    let kind = FunctionKind::Host {
      callback: self.callback,
      data: self.data_value(),
      template: None,
    };
    let is_constructor = self.constructor_behavior == ConstructorBehavior::Allow;
    let isolate: &mut Isolate = scope.as_mut();
    let function = new_host_function(
      isolate,
      realm,
      "",
      self.length_u32(),
      kind,
      is_constructor,
    );
    Some(scope.new_object_local(function))
  }
}

/// A JavaScript function object (ECMA-262, 15.3).
impl Function {
  /// Create a FunctionBuilder to configure a Function.
  /// This is the same as FunctionBuilder::<Function>::new().
  pub fn builder<'s>(
    callback: FunctionCallback,
  ) -> FunctionBuilder<'s, Self> {
    FunctionBuilder::new(callback)
  }

  /// Create a function in the current execution context
  /// for a given FunctionCallback.
  pub fn new<'s>(
    scope: &mut HandleScope<'s>,
    callback: FunctionCallback,
  ) -> Option<Local<'s, Function>> {
    Self::builder(callback).build(scope)
  }

  pub fn call<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    recv: Local<Value>,
    args: &[Local<Value>],
  ) -> Option<Local<'s, Value>> {
    let callee = self.obj();
    let recv = recv.js_value();
    let args: Vec<JsValue> = args.iter().map(|a| a.js_value()).collect();
    let result =
      scope.run_js(|cx, _| ops::call_function(cx, callee, recv, &args))?;
    Some(scope.value_local(result))
  }

  pub fn new_instance<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    args: &[Local<Value>],
  ) -> Option<Local<'s, Object>> {
    let callee = self.obj();
    let args: Vec<JsValue> = args.iter().map(|a| a.js_value()).collect();
    let result = scope.run_js(|cx, _| {
      if !cx.vm.heap.object(callee).is_constructor() {
        let name = crate::engine::object::function_name(&cx.vm.heap, callee);
        return Err(crate::engine::error::type_error(
          cx,
          format!("{name} is not a constructor"),
        ));
      }
      ops::construct(cx, callee, &args, None)
    })?;
    Some(scope.value_local(result))
  }

  pub fn get_name<'s>(&self, scope: &mut HandleScope<'s>) -> Local<'s, String> {
    let name = {
      let isolate: &Isolate = scope.as_ref();
      crate::engine::object::function_name(&isolate.vm.heap, self.obj())
    };
    scope.value_local(JsValue::String(name))
  }

  pub fn set_name(&self, name: Local<String>) {
    let name = name.js_value();
    let isolate = self.host_isolate();
    isolate.vm.heap.object_mut(self.obj()).insert(
      PropertyKey::str("name"),
      name,
      Attributes::READ_ONLY_CONFIGURABLE,
    );
  }

  fn script_position(&self) -> Option<(i32, i32, i32)> {
    let isolate = self.host_isolate();
    let object = isolate.vm.heap.object(self.obj());
    match object.function_data().map(|d| &d.kind) {
      Some(FunctionKind::Script { node, source, .. }) => {
        let location = source.location(node.span.start);
        Some((location.line, location.column, source.script_id))
      }
      _ => None,
    }
  }

  /// Zero-based line number of the function body, or `None` for functions
  /// that were not compiled from script.
  pub fn get_script_line_number(&self) -> Option<u32> {
    self.script_position().map(|(line, _, _)| line as u32)
  }

  /// Zero-based column of the function body.
  pub fn get_script_column_number(&self) -> Option<u32> {
    self.script_position().map(|(_, column, _)| column as u32)
  }

  /// The id of the script the function was compiled from; zero for native
  /// functions.
  pub fn script_id(&self) -> i32 {
    self.script_position().map_or(0, |(_, _, id)| id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_constructor_behavior() {
    assert_eq!(ConstructorBehavior::default(), ConstructorBehavior::Allow);
    let builder = FunctionBuilder::<'_, Function>::new(|_, _, _| {})
      .length(2)
      .constructor_behavior(ConstructorBehavior::Throw);
    assert_eq!(builder.length_u32(), 2);
    assert!(builder.data_value().is_undefined());
    let builder = builder.length(-1);
    assert_eq!(builder.length_u32(), 0);
  }
}
