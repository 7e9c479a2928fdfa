// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

use std::any::type_name;
use std::convert::From;
use std::convert::TryFrom;
use std::ops::Deref;

use bitflags::bitflags;
use thiserror::Error;

use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::Vm;
use crate::handle::Handled;
use crate::handle::Slot;
use crate::Isolate;
use crate::Local;

bitflags! {
  /// What a handle refers to, computed once when the handle is created.
  /// Type predicates and checked casts only look at these bits.
  #[derive(Clone, Copy, Debug, PartialEq, Eq)]
  pub(crate) struct Tag: u64 {
    const VALUE = 1 << 0;
    const PRIMITIVE = 1 << 1;
    const UNDEFINED = 1 << 2;
    const NULL = 1 << 3;
    const BOOLEAN = 1 << 4;
    const TRUE = 1 << 5;
    const FALSE = 1 << 6;
    const NUMBER = 1 << 7;
    const INTEGER = 1 << 8;
    const INT32 = 1 << 9;
    const UINT32 = 1 << 10;
    const NAME = 1 << 11;
    const STRING = 1 << 12;
    const SYMBOL = 1 << 13;
    const BIGINT = 1 << 14;
    const OBJECT = 1 << 15;
    const ARRAY = 1 << 16;
    const FUNCTION = 1 << 17;
    const PROMISE = 1 << 18;
    const PROMISE_RESOLVER = 1 << 19;
    const NATIVE_ERROR = 1 << 20;
    const ARRAY_BUFFER = 1 << 21;
    const ARRAY_BUFFER_VIEW = 1 << 22;
    const TYPED_ARRAY = 1 << 23;
    const UINT8_ARRAY = 1 << 24;
    const EXTERNAL = 1 << 25;
    const BOOLEAN_OBJECT = 1 << 26;
    const NUMBER_OBJECT = 1 << 27;
    const STRING_OBJECT = 1 << 28;
    const SYMBOL_OBJECT = 1 << 29;
    const BIGINT_OBJECT = 1 << 30;
    const MODULE_NAMESPACE = 1 << 31;
    const ARGUMENTS = 1 << 32;
    const CONTEXT = 1 << 33;
    const SCRIPT = 1 << 34;
    const UNBOUND_SCRIPT = 1 << 35;
    const MODULE = 1 << 36;
    const MODULE_REQUEST = 1 << 37;
    const FIXED_ARRAY = 1 << 38;
    const TEMPLATE = 1 << 39;
    const FUNCTION_TEMPLATE = 1 << 40;
    const OBJECT_TEMPLATE = 1 << 41;
    const MESSAGE = 1 << 42;
    const STACK_TRACE = 1 << 43;
    const STACK_FRAME = 1 << 44;
    /// Every non-empty handle.
    const DATA = 1 << 45;
  }
}

pub(crate) fn tag_of(isolate: &Isolate, content: &Handled) -> Tag {
  let tag = match content {
    Handled::Empty => return Tag::empty(),
    Handled::Value(value) => value_tag(&isolate.vm, value),
    Handled::Context(_) => Tag::CONTEXT,
    Handled::Script { .. } => Tag::SCRIPT,
    Handled::UnboundScript(_) => Tag::UNBOUND_SCRIPT,
    Handled::Module(_) => Tag::MODULE,
    Handled::ModuleRequest { .. } => Tag::MODULE_REQUEST,
    Handled::FixedArray(_) => Tag::FIXED_ARRAY,
    Handled::FunctionTemplate(_) => Tag::TEMPLATE | Tag::FUNCTION_TEMPLATE,
    Handled::ObjectTemplate(_) => Tag::TEMPLATE | Tag::OBJECT_TEMPLATE,
    Handled::Message(_) => Tag::MESSAGE,
    Handled::StackTrace(_) => Tag::STACK_TRACE,
    Handled::StackFrame { .. } => Tag::STACK_FRAME,
  };
  tag | Tag::DATA
}

fn value_tag(vm: &Vm, value: &JsValue) -> Tag {
  let tag = match value {
    JsValue::Undefined => Tag::PRIMITIVE | Tag::UNDEFINED,
    JsValue::Null => Tag::PRIMITIVE | Tag::NULL,
    JsValue::Bool(true) => Tag::PRIMITIVE | Tag::BOOLEAN | Tag::TRUE,
    JsValue::Bool(false) => Tag::PRIMITIVE | Tag::BOOLEAN | Tag::FALSE,
    JsValue::Number(n) => Tag::PRIMITIVE | number_tag(*n),
    JsValue::String(_) => Tag::PRIMITIVE | Tag::NAME | Tag::STRING,
    JsValue::Symbol(_) => Tag::PRIMITIVE | Tag::NAME | Tag::SYMBOL,
    JsValue::BigInt(_) => Tag::PRIMITIVE | Tag::BIGINT,
    JsValue::Object(id) => object_tag(vm.heap.object(*id)),
  };
  tag | Tag::VALUE
}

fn number_tag(n: f64) -> Tag {
  let mut tag = Tag::NUMBER;
  let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
  if integral && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
    tag |= Tag::INTEGER | Tag::INT32;
  }
  if integral && n >= 0.0 && n <= u32::MAX as f64 {
    tag |= Tag::INTEGER | Tag::UINT32;
  }
  tag
}

fn object_tag(object: &JsObject) -> Tag {
  let kind = match &object.class {
    ObjectClass::Ordinary => Tag::empty(),
    ObjectClass::Array { .. } => Tag::ARRAY,
    ObjectClass::Function(_) => Tag::FUNCTION,
    ObjectClass::Error(_) => Tag::NATIVE_ERROR,
    ObjectClass::Primitive(JsValue::Bool(_)) => Tag::BOOLEAN_OBJECT,
    ObjectClass::Primitive(JsValue::Number(_)) => Tag::NUMBER_OBJECT,
    ObjectClass::Primitive(JsValue::String(_)) => Tag::STRING_OBJECT,
    ObjectClass::Primitive(JsValue::Symbol(_)) => Tag::SYMBOL_OBJECT,
    ObjectClass::Primitive(JsValue::BigInt(_)) => Tag::BIGINT_OBJECT,
    ObjectClass::Primitive(_) => Tag::empty(),
    ObjectClass::Promise(_) => Tag::PROMISE,
    ObjectClass::ArrayBuffer(_) => Tag::ARRAY_BUFFER,
    ObjectClass::Uint8Array { .. } => {
      Tag::ARRAY_BUFFER_VIEW | Tag::TYPED_ARRAY | Tag::UINT8_ARRAY
    }
    // Externals are values, not objects, even though they live on the heap.
    ObjectClass::External(_) => return Tag::EXTERNAL,
    ObjectClass::Arguments => Tag::ARGUMENTS,
    ObjectClass::Namespace(_) => Tag::MODULE_NAMESPACE,
  };
  kind | Tag::OBJECT
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DataError {
  #[error("expected type `{expected}`, got `{actual}`")]
  BadType {
    actual: &'static str,
    expected: &'static str,
  },
  #[error("expected `Some({expected})`, found `None`")]
  NoData { expected: &'static str },
}

impl DataError {
  pub(crate) fn bad_type<E: 'static, A: 'static>() -> Self {
    Self::BadType {
      expected: type_name::<E>(),
      actual: type_name::<A>(),
    }
  }

  pub(crate) fn no_data<E: 'static>() -> Self {
    Self::NoData {
      expected: type_name::<E>(),
    }
  }
}

macro_rules! impl_deref {
  ($a:ident => $b:ident) => {
    impl Deref for $a {
      type Target = $b;
      fn deref(&self) -> &Self::Target {
        unsafe { &*(self as *const _ as *const Self::Target) }
      }
    }
  };
}

macro_rules! impl_from {
  ($a:ident, $b:ident) => {
    impl<'s> From<Local<'s, $a>> for Local<'s, $b> {
      fn from(l: Local<'s, $a>) -> Self {
        unsafe { Local::reinterpret(l) }
      }
    }
  };
}

macro_rules! impl_try_from {
  ($source:ident => $target:ident if $tag:ident) => {
    impl<'s> TryFrom<Local<'s, $source>> for Local<'s, $target> {
      type Error = DataError;
      fn try_from(l: Local<'s, $source>) -> Result<Self, Self::Error> {
        if l.slot().tag().contains(Tag::$tag) {
          Ok(unsafe { Local::reinterpret(l) })
        } else {
          Err(DataError::bad_type::<$target, $source>())
        }
      }
    }
  };
}

/// Declares the upcasts and checked downcasts of a data type. The first
/// ancestor is the `Deref` target.
macro_rules! data_type {
  ($ty:ident: $parent:ident $(, $ancestor:ident)* ; $tag:ident) => {
    impl_deref!($ty => $parent);
    impl_from!($ty, $parent);
    impl_try_from!($parent => $ty if $tag);
    $(
      impl_from!($ty, $ancestor);
      impl_try_from!($ancestor => $ty if $tag);
    )*
  };
}

/// The superclass of objects that can reside on the engine's heap.
#[repr(transparent)]
pub struct Data(Slot);

impl Data {
  pub(crate) fn slot(&self) -> &Slot {
    &self.0
  }

  pub(crate) fn tag(&self) -> Tag {
    self.0.tag()
  }

  pub(crate) fn handled(&self) -> Handled {
    self.0.content()
  }

  pub(crate) fn js_value(&self) -> JsValue {
    self.0.value()
  }

  /// The heap object behind an object handle.
  pub(crate) fn obj(&self) -> ObjRef {
    match self.js_value() {
      JsValue::Object(id) => id,
      _ => panic!("handle does not refer to an object"),
    }
  }

  /// The isolate that owns the handle. Only for short, non-reentrant reads
  /// and writes from `&self` methods that have no scope to go through.
  #[allow(clippy::mut_from_ref)]
  pub(crate) fn host_isolate(&self) -> &mut Isolate {
    let isolate = self.0.isolate_ptr();
    assert!(!isolate.is_null(), "handle is not hosted by an Isolate");
    unsafe { &mut *isolate }
  }

  /// Returns true if this data is a `Value`.
  pub fn is_value(&self) -> bool {
    self.tag().contains(Tag::VALUE)
  }

  /// Returns true if this data is a `Module`.
  pub fn is_module(&self) -> bool {
    self.tag().contains(Tag::MODULE)
  }

  /// Returns true if this data is a `ModuleRequest`.
  pub fn is_module_request(&self) -> bool {
    self.tag().contains(Tag::MODULE_REQUEST)
  }

  /// Returns true if this data is a `FixedArray`.
  pub fn is_fixed_array(&self) -> bool {
    self.tag().contains(Tag::FIXED_ARRAY)
  }

  /// Returns true if this data is a `Context`.
  pub fn is_context(&self) -> bool {
    self.tag().contains(Tag::CONTEXT)
  }

  /// Returns true if this data is a `FunctionTemplate`.
  pub fn is_function_template(&self) -> bool {
    self.tag().contains(Tag::FUNCTION_TEMPLATE)
  }

  /// Returns true if this data is an `ObjectTemplate`.
  pub fn is_object_template(&self) -> bool {
    self.tag().contains(Tag::OBJECT_TEMPLATE)
  }
}

/// A sandboxed execution context with its own set of built-in objects and
/// functions.
#[repr(transparent)]
pub struct Context(Slot);

data_type!(Context: Data; CONTEXT);

/// A compiled JavaScript script, tied to a Context which was active when the
/// script was compiled.
#[repr(transparent)]
pub struct Script(Slot);

data_type!(Script: Data; SCRIPT);

/// A compiled JavaScript script, not yet tied to a Context.
#[repr(transparent)]
pub struct UnboundScript(Slot);

data_type!(UnboundScript: Data; UNBOUND_SCRIPT);

/// A compiled JavaScript module.
#[repr(transparent)]
pub struct Module(Slot);

data_type!(Module: Data; MODULE);

/// A static import request of a module: its specifier, where it appears in
/// the source and its import attributes.
#[repr(transparent)]
pub struct ModuleRequest(Slot);

data_type!(ModuleRequest: Data; MODULE_REQUEST);

/// A fixed-sized array of data. Used for import attributes.
#[repr(transparent)]
pub struct FixedArray(Slot);

data_type!(FixedArray: Data; FIXED_ARRAY);

/// The superclass of object and function templates.
#[repr(transparent)]
pub struct Template(Slot);

data_type!(Template: Data; TEMPLATE);

/// A FunctionTemplate is used to create functions at runtime. There
/// can only be one function created from a FunctionTemplate in a
/// context. The lifetime of the created function is equal to the
/// lifetime of the context.
///
/// A FunctionTemplate can have properties, these properties are added to the
/// function object when it is created.
///
/// A FunctionTemplate has a corresponding instance template which is
/// used to create object instances when the function is used as a
/// constructor. Properties added to the instance template are added to
/// each object instance.
///
/// A FunctionTemplate can have a prototype template. The prototype template
/// is used to create the prototype object of the function.
///
/// A FunctionTemplate can inherit from another one by calling
/// `FunctionTemplate::inherit`. The prototype object of the child function
/// then has its `__proto__` pointing to the parent function's prototype
/// object, and instances of the child get all properties of the parent's
/// instance template.
#[repr(transparent)]
pub struct FunctionTemplate(Slot);

data_type!(FunctionTemplate: Template, Data; FUNCTION_TEMPLATE);

/// An ObjectTemplate is used to create objects at runtime.
///
/// Properties added to an ObjectTemplate are added to each object
/// created from the ObjectTemplate.
#[repr(transparent)]
pub struct ObjectTemplate(Slot);

data_type!(ObjectTemplate: Template, Data; OBJECT_TEMPLATE);

/// An error message.
#[repr(transparent)]
pub struct Message(Slot);

data_type!(Message: Data; MESSAGE);

/// Representation of a JavaScript stack trace. The information collected is a
/// snapshot of the execution stack and the information remains valid after
/// execution continues.
#[repr(transparent)]
pub struct StackTrace(Slot);

data_type!(StackTrace: Data; STACK_TRACE);

/// A single JavaScript stack frame.
#[repr(transparent)]
pub struct StackFrame(Slot);

data_type!(StackFrame: Data; STACK_FRAME);

/// The superclass of all JavaScript values and objects.
#[repr(transparent)]
pub struct Value(Slot);

data_type!(Value: Data; VALUE);

/// A JavaScript value that wraps a host pointer. This type of value is
/// mainly used to associate host data structures with JavaScript objects.
#[repr(transparent)]
pub struct External(Slot);

data_type!(External: Value, Data; EXTERNAL);

/// A JavaScript object (ECMA-262, 4.3.3)
#[repr(transparent)]
pub struct Object(Slot);

data_type!(Object: Value, Data; OBJECT);

/// An instance of the built-in array constructor (ECMA-262, 15.4.2).
#[repr(transparent)]
pub struct Array(Slot);

data_type!(Array: Object, Value, Data; ARRAY);

/// An instance of the built-in ArrayBuffer constructor (ES6 draft 15.13.5).
#[repr(transparent)]
pub struct ArrayBuffer(Slot);

data_type!(ArrayBuffer: Object, Value, Data; ARRAY_BUFFER);

/// A base class for an instance of one of "views" over ArrayBuffer,
/// including TypedArrays (ES6 draft 15.13).
#[repr(transparent)]
pub struct ArrayBufferView(Slot);

data_type!(ArrayBufferView: Object, Value, Data; ARRAY_BUFFER_VIEW);

/// A base class for an instance of TypedArray series of constructors
/// (ES6 draft 15.13.6).
#[repr(transparent)]
pub struct TypedArray(Slot);

data_type!(TypedArray: ArrayBufferView, Object, Value, Data; TYPED_ARRAY);

/// An instance of Uint8Array constructor (ES6 draft 15.13.6).
#[repr(transparent)]
pub struct Uint8Array(Slot);

data_type!(
  Uint8Array: TypedArray, ArrayBufferView, Object, Value, Data; UINT8_ARRAY
);

/// A BigInt object (https://tc39.github.io/proposal-bigint)
#[repr(transparent)]
pub struct BigIntObject(Slot);

data_type!(BigIntObject: Object, Value, Data; BIGINT_OBJECT);

/// A Boolean object (ECMA-262, 4.3.15).
#[repr(transparent)]
pub struct BooleanObject(Slot);

data_type!(BooleanObject: Object, Value, Data; BOOLEAN_OBJECT);

/// A JavaScript function object (ECMA-262, 15.3).
#[repr(transparent)]
pub struct Function(Slot);

data_type!(Function: Object, Value, Data; FUNCTION);

/// A Number object (ECMA-262, 4.3.21).
#[repr(transparent)]
pub struct NumberObject(Slot);

data_type!(NumberObject: Object, Value, Data; NUMBER_OBJECT);

/// An instance of the built-in Promise constructor (ES6 draft).
#[repr(transparent)]
pub struct Promise(Slot);

data_type!(Promise: Object, Value, Data; PROMISE);

/// The resolving side of a promise. It is only ever created through
/// `PromiseResolver::new`; a promise that came from script cannot be cast
/// to a resolver.
#[repr(transparent)]
pub struct PromiseResolver(Slot);

data_type!(PromiseResolver: Object, Value, Data; PROMISE_RESOLVER);

/// A String object (ECMA-262, 4.3.18).
#[repr(transparent)]
pub struct StringObject(Slot);

data_type!(StringObject: Object, Value, Data; STRING_OBJECT);

/// A Symbol object (ECMA-262 edition 6).
#[repr(transparent)]
pub struct SymbolObject(Slot);

data_type!(SymbolObject: Object, Value, Data; SYMBOL_OBJECT);

/// The superclass of primitive values. See ECMA-262 4.3.2.
#[repr(transparent)]
pub struct Primitive(Slot);

data_type!(Primitive: Value, Data; PRIMITIVE);

/// A JavaScript BigInt value (https://tc39.github.io/proposal-bigint)
#[repr(transparent)]
pub struct BigInt(Slot);

data_type!(BigInt: Primitive, Value, Data; BIGINT);

/// A primitive boolean value (ECMA-262, 4.3.14). Either the true
/// or false value.
#[repr(transparent)]
pub struct Boolean(Slot);

data_type!(Boolean: Primitive, Value, Data; BOOLEAN);

/// A superclass for symbols and strings.
#[repr(transparent)]
pub struct Name(Slot);

data_type!(Name: Primitive, Value, Data; NAME);

/// A JavaScript string value (ECMA-262, 4.3.17).
#[repr(transparent)]
pub struct String(Slot);

data_type!(String: Name, Primitive, Value, Data; STRING);

/// A JavaScript symbol (ECMA-262 edition 6)
#[repr(transparent)]
pub struct Symbol(Slot);

data_type!(Symbol: Name, Primitive, Value, Data; SYMBOL);

/// A JavaScript number value (ECMA-262, 4.3.20)
#[repr(transparent)]
pub struct Number(Slot);

data_type!(Number: Primitive, Value, Data; NUMBER);

/// A JavaScript value representing a signed integer.
#[repr(transparent)]
pub struct Integer(Slot);

data_type!(Integer: Number, Primitive, Value, Data; INTEGER);

/// A JavaScript value representing a 32-bit signed integer.
#[repr(transparent)]
pub struct Int32(Slot);

data_type!(Int32: Integer, Number, Primitive, Value, Data; INT32);

/// A JavaScript value representing a 32-bit unsigned integer.
#[repr(transparent)]
pub struct Uint32(Slot);

data_type!(Uint32: Integer, Number, Primitive, Value, Data; UINT32);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn number_tags() {
    assert!(number_tag(1.0).contains(Tag::INT32 | Tag::UINT32));
    assert!(number_tag(-1.0).contains(Tag::INT32));
    assert!(!number_tag(-1.0).contains(Tag::UINT32));
    assert!(!number_tag(-0.0).intersects(Tag::INTEGER));
    assert!(!number_tag(0.5).intersects(Tag::INTEGER));
    assert!(number_tag(4294967295.0).contains(Tag::UINT32));
    assert!(!number_tag(4294967295.0).contains(Tag::INT32));
    assert!(!number_tag(f64::NAN).intersects(Tag::INTEGER));
  }

  #[test]
  fn data_error_messages() {
    let err = DataError::bad_type::<Object, Value>();
    assert!(err.to_string().starts_with("expected type `"));
    let err = DataError::no_data::<Object>();
    assert!(err.to_string().contains("found `None`"));
  }
}
