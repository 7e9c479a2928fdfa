// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Abstract operations: property access that may run accessors, calls,
//! and the conversions between value types.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::FromPrimitive;
use num_traits::ToPrimitive;
use num_traits::Zero;

use crate::engine::Abrupt;
use crate::engine::ContextId;
use crate::engine::Frame;
use crate::engine::JsResult;
use crate::engine::ast::Span;
use crate::engine::conversion::f64_to_int32;
use crate::engine::conversion::f64_to_integer;
use crate::engine::conversion::f64_to_uint32;
use crate::engine::conversion::number_to_string;
use crate::engine::conversion::string_to_number;
use crate::engine::conversion::trim_js_whitespace;
use crate::engine::error;
use crate::engine::heap::Cell;
use crate::engine::interp;
use crate::engine::module;
use crate::engine::object;
use crate::engine::object::Attributes;
use crate::engine::object::CallInfo;
use crate::engine::object::FunctionKind;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropSlot;
use crate::engine::object::Property;
use crate::engine::object::PropertyDescriptor;
use crate::engine::realm::Intrinsics;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::engine::value::utf16_len;
use crate::engine::value::utf16_slice;
use crate::isolate::Isolate;

/// The realm code is currently running in: the innermost frame's, or the
/// entered context's when no script is on the stack.
pub(crate) fn current_realm(cx: &Isolate) -> ContextId {
  if let Some(frame) = cx.vm.frames.last() {
    return frame.realm;
  }
  match cx.entered_context_id() {
    Some(id) => id,
    None => panic!("no context is entered; create a ContextScope first"),
  }
}

pub(crate) fn intrinsics(cx: &Isolate) -> &Intrinsics {
  &cx.vm.realm(current_realm(cx)).intrinsics
}

pub(crate) fn alloc(cx: &mut Isolate, object: JsObject) -> ObjRef {
  cx.vm.heap.alloc(Cell::Object(object))
}

pub(crate) fn new_object_with_proto(
  cx: &mut Isolate,
  proto: Option<ObjRef>,
) -> ObjRef {
  let realm = current_realm(cx);
  alloc(cx, JsObject::ordinary(proto, realm))
}

/// `{}` in the current realm.
pub(crate) fn new_object(cx: &mut Isolate) -> ObjRef {
  let proto = intrinsics(cx).object_prototype;
  new_object_with_proto(cx, Some(proto))
}

pub(crate) fn new_array(cx: &mut Isolate, values: Vec<JsValue>) -> ObjRef {
  let realm = current_realm(cx);
  let proto = intrinsics(cx).array_prototype;
  let mut object = JsObject::with_class(
    Some(proto),
    realm,
    ObjectClass::Array {
      length: values.len() as u32,
      length_writable: true,
    },
  );
  for (i, value) in values.into_iter().enumerate() {
    object.insert(PropertyKey::index(i), value, Attributes::DEFAULT);
  }
  alloc(cx, object)
}

pub(crate) fn is_callable(cx: &Isolate, value: &JsValue) -> bool {
  value
    .as_object()
    .is_some_and(|id| cx.vm.heap.object(id).is_callable())
}

pub(crate) fn is_constructor(cx: &Isolate, value: &JsValue) -> bool {
  value
    .as_object()
    .is_some_and(|id| cx.vm.heap.object(id).is_constructor())
}

pub(crate) fn is_array(cx: &Isolate, value: &JsValue) -> bool {
  value
    .as_object()
    .is_some_and(|id| cx.vm.heap.object(id).is_array())
}

pub(crate) fn type_of(cx: &Isolate, value: &JsValue) -> &'static str {
  if is_callable(cx, value) {
    "function"
  } else {
    value.primitive_type_of()
  }
}

// Properties

/// [[GetOwnProperty]], including module namespace objects.
pub(crate) fn own_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
) -> JsResult<Option<Property>> {
  if let ObjectClass::Namespace(module) = cx.vm.heap.object(id).class {
    return module::namespace_own_property(cx, module, key);
  }
  Ok(object::get_own_property(&cx.vm.heap, id, key))
}

pub(crate) fn own_property_keys(cx: &Isolate, id: ObjRef) -> Vec<PropertyKey> {
  if let ObjectClass::Namespace(module) = cx.vm.heap.object(id).class {
    return module::namespace_keys(cx, module);
  }
  object::own_keys(&cx.vm.heap, id)
}

pub(crate) fn get_prototype_of(cx: &Isolate, id: ObjRef) -> Option<ObjRef> {
  cx.vm.heap.object(id).proto
}

/// [[SetPrototypeOf]]. Fails on non-extensible objects and cycles.
pub(crate) fn set_prototype_of(
  cx: &mut Isolate,
  id: ObjRef,
  proto: Option<ObjRef>,
) -> bool {
  let object = cx.vm.heap.object(id);
  if object.proto == proto {
    return true;
  }
  if !object.extensible || matches!(object.class, ObjectClass::Namespace(_)) {
    return false;
  }
  let mut walk = proto;
  while let Some(p) = walk {
    if p == id {
      return false;
    }
    walk = cx.vm.heap.object(p).proto;
  }
  cx.vm.heap.object_mut(id).proto = proto;
  true
}

pub(crate) fn get(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
) -> JsResult<JsValue> {
  get_with_receiver(cx, id, key, JsValue::Object(id))
}

pub(crate) fn get_str(
  cx: &mut Isolate,
  id: ObjRef,
  key: &str,
) -> JsResult<JsValue> {
  get(cx, id, &PropertyKey::str(key))
}

/// [[Get]] with an explicit receiver for accessors.
pub(crate) fn get_with_receiver(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
  receiver: JsValue,
) -> JsResult<JsValue> {
  let mut current = Some(id);
  while let Some(holder) = current {
    if let Some(prop) = own_property(cx, holder, key)? {
      return match prop.slot {
        PropSlot::Data(value) => Ok(value),
        PropSlot::Accessor { get: Some(getter), .. } => {
          call_function(cx, getter, receiver, &[])
        }
        PropSlot::Accessor { get: None, .. } => Ok(JsValue::Undefined),
        PropSlot::Native(accessor) => {
          crate::function::call_native_getter(
            cx,
            accessor,
            key,
            receiver,
            holder,
          )
        }
      };
    }
    current = cx.vm.heap.object(holder).proto;
  }
  Ok(JsValue::Undefined)
}

fn prototype_for_primitive(cx: &Isolate, value: &JsValue) -> Option<ObjRef> {
  let intrinsics = intrinsics(cx);
  Some(match value {
    JsValue::Bool(_) => intrinsics.boolean_prototype,
    JsValue::Number(_) => intrinsics.number_prototype,
    JsValue::String(_) => intrinsics.string_prototype,
    JsValue::Symbol(_) => intrinsics.symbol_prototype,
    JsValue::BigInt(_) => intrinsics.bigint_prototype,
    _ => return None,
  })
}

/// GetValue on a property reference whose base may be a primitive.
pub(crate) fn get_value(
  cx: &mut Isolate,
  base: &JsValue,
  key: &PropertyKey,
) -> JsResult<JsValue> {
  match base {
    JsValue::Object(id) => get(cx, *id, key),
    JsValue::Undefined | JsValue::Null => {
      let detail = error::detail_string(&cx.vm, base);
      Err(error::type_error(
        cx,
        format!("Cannot read properties of {detail} (reading '{key}')"),
      ))
    }
    JsValue::String(s) => {
      if key.as_str() == Some("length") {
        return Ok(JsValue::Number(utf16_len(s) as f64));
      }
      if let Some(index) = key.as_index() {
        if index < utf16_len(s) {
          return Ok(JsValue::String(utf16_slice(s, index, index + 1).into()));
        }
      }
      let proto = intrinsics(cx).string_prototype;
      get_with_receiver(cx, proto, key, base.clone())
    }
    _ => match prototype_for_primitive(cx, base) {
      Some(proto) => get_with_receiver(cx, proto, key, base.clone()),
      None => Ok(JsValue::Undefined),
    },
  }
}

/// [[Set]]. Returns false where strict code would throw.
pub(crate) fn set(
  cx: &mut Isolate,
  id: ObjRef,
  key: PropertyKey,
  value: JsValue,
  receiver: JsValue,
) -> JsResult<bool> {
  let mut found = None;
  let mut current = Some(id);
  while let Some(holder) = current {
    if let Some(prop) = own_property(cx, holder, &key)? {
      found = Some((holder, prop));
      break;
    }
    current = cx.vm.heap.object(holder).proto;
  }
  match found {
    Some((
      _,
      Property { slot: PropSlot::Accessor { set, .. }, .. },
    )) => match set {
      Some(setter) => {
        call_function(cx, setter, receiver, &[value])?;
        Ok(true)
      }
      None => Ok(false),
    },
    Some((holder, Property { slot: PropSlot::Native(accessor), .. })) => {
      if accessor.setter.is_some() {
        crate::function::call_native_setter(
          cx,
          accessor,
          &key,
          value,
          receiver,
          holder,
        )?;
      }
      Ok(true)
    }
    Some((_, Property { attrs, .. })) if !attrs.writable => Ok(false),
    _ => {
      let Some(target) = receiver.as_object() else {
        return Ok(false);
      };
      if let Some(existing) = own_property(cx, target, &key)? {
        match existing.slot {
          PropSlot::Data(_) if existing.attrs.writable => {}
          _ => return Ok(false),
        }
        return define_property(
          cx,
          target,
          key,
          PropertyDescriptor {
            value: Some(value),
            ..Default::default()
          },
        );
      }
      define_property(
        cx,
        target,
        key,
        PropertyDescriptor::data(value, Attributes::DEFAULT),
      )
    }
  }
}

/// Assignment to `object[key]`, throwing in strict code when it fails.
pub(crate) fn put(
  cx: &mut Isolate,
  id: ObjRef,
  key: PropertyKey,
  value: JsValue,
  strict: bool,
) -> JsResult<()> {
  let name = key.clone();
  if !set(cx, id, key, value, JsValue::Object(id))? && strict {
    let detail = error::detail_string(&cx.vm, &JsValue::Object(id));
    return Err(error::type_error(
      cx,
      format!(
        "Cannot assign to read only property '{name}' of object '{detail}'",
      ),
    ));
  }
  Ok(())
}

/// PutValue on a property reference whose base may be a primitive.
pub(crate) fn put_value(
  cx: &mut Isolate,
  base: &JsValue,
  key: PropertyKey,
  value: JsValue,
  strict: bool,
) -> JsResult<()> {
  match base {
    JsValue::Object(id) => put(cx, *id, key, value, strict),
    JsValue::Undefined | JsValue::Null => {
      let detail = error::detail_string(&cx.vm, base);
      Err(error::type_error(
        cx,
        format!("Cannot set properties of {detail} (setting '{key}')"),
      ))
    }
    _ => {
      let Some(proto) = prototype_for_primitive(cx, base) else {
        return Ok(());
      };
      let ok = set(cx, proto, key.clone(), value, base.clone())?;
      if !ok && strict {
        let detail = error::detail_string(&cx.vm, base);
        let kind = base.primitive_type_of();
        return Err(error::type_error(
          cx,
          format!("Cannot create property '{key}' on {kind} '{detail}'"),
        ));
      }
      Ok(())
    }
  }
}

pub(crate) fn has_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
) -> JsResult<bool> {
  let mut current = Some(id);
  while let Some(holder) = current {
    if own_property(cx, holder, key)?.is_some() {
      return Ok(true);
    }
    current = cx.vm.heap.object(holder).proto;
  }
  Ok(false)
}

pub(crate) fn has_own_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
) -> JsResult<bool> {
  Ok(own_property(cx, id, key)?.is_some())
}

/// [[Delete]]. Returns false for non-configurable properties.
pub(crate) fn delete_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: &PropertyKey,
) -> JsResult<bool> {
  if let ObjectClass::Namespace(module) = cx.vm.heap.object(id).class {
    return Ok(module::namespace_own_property(cx, module, key)?.is_none());
  }
  Ok(object::delete_own_property(&mut cx.vm.heap, id, key))
}

fn checked_array_length(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<JsValue> {
  let number = to_number(cx, value)?;
  let length = f64_to_uint32(number);
  if length as f64 != number {
    return Err(error::range_error(cx, "Invalid array length"));
  }
  Ok(JsValue::Number(length as f64))
}

/// [[DefineOwnProperty]] with the conversions exotic objects apply to the
/// incoming value.
pub(crate) fn define_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: PropertyKey,
  mut desc: PropertyDescriptor,
) -> JsResult<bool> {
  match &cx.vm.heap.object(id).class {
    ObjectClass::Namespace(_) => return Ok(false),
    ObjectClass::Array { .. } if key.as_str() == Some("length") => {
      if let Some(value) = &desc.value {
        let value = value.clone();
        desc.value = Some(checked_array_length(cx, &value)?);
      }
    }
    ObjectClass::Uint8Array { .. } if key.as_index().is_some() => {
      if let Some(value) = &desc.value {
        let value = value.clone();
        desc.value = Some(JsValue::Number(to_number(cx, &value)?));
      }
    }
    _ => {}
  }
  Ok(object::define_own_property(&mut cx.vm.heap, id, key, desc))
}

pub(crate) fn define_property_or_throw(
  cx: &mut Isolate,
  id: ObjRef,
  key: PropertyKey,
  desc: PropertyDescriptor,
) -> JsResult<()> {
  let name = key.clone();
  if !define_property(cx, id, key, desc)? {
    return Err(error::type_error(
      cx,
      format!("Cannot redefine property: {name}"),
    ));
  }
  Ok(())
}

pub(crate) fn create_data_property(
  cx: &mut Isolate,
  id: ObjRef,
  key: PropertyKey,
  value: JsValue,
) -> JsResult<bool> {
  define_property(
    cx,
    id,
    key,
    PropertyDescriptor::data(value, Attributes::DEFAULT),
  )
}

/// Installs a data property without any checks. Only for freshly created
/// objects.
pub(crate) fn define_value(
  cx: &mut Isolate,
  id: ObjRef,
  key: &str,
  value: JsValue,
  attrs: Attributes,
) {
  cx.vm
    .heap
    .object_mut(id)
    .insert(PropertyKey::str(key), value, attrs);
}

// Calls

/// Bails out when the embedder asked for termination or the native stack
/// budget is spent.
pub(crate) fn check_interrupts(cx: &mut Isolate) -> JsResult<()> {
  if cx.is_terminating() {
    return Err(Abrupt::Terminate);
  }
  let marker = 0u8;
  let here = &marker as *const u8 as usize;
  let base = cx.vm.stack_base;
  if base != 0 && base.saturating_sub(here) > cx.vm.config.stack_limit {
    return Err(error::range_error(cx, "Maximum call stack size exceeded"));
  }
  Ok(())
}

pub(crate) fn call(
  cx: &mut Isolate,
  callee: &JsValue,
  this: JsValue,
  args: &[JsValue],
) -> JsResult<JsValue> {
  match callee.as_object() {
    Some(id) if cx.vm.heap.object(id).is_callable() => {
      call_function(cx, id, this, args)
    }
    _ => {
      let detail = error::detail_string(&cx.vm, callee);
      Err(error::type_error(cx, format!("{detail} is not a function")))
    }
  }
}

enum Callee {
  Script,
  Builtin(crate::engine::object::BuiltinFn),
  Host,
  Bound(ObjRef, JsValue, Vec<JsValue>),
}

fn classify(cx: &Isolate, id: ObjRef) -> Callee {
  match cx.vm.heap.object(id).function_data().map(|data| &data.kind) {
    Some(FunctionKind::Script { .. }) => Callee::Script,
    Some(FunctionKind::Builtin { f, .. }) => Callee::Builtin(*f),
    Some(FunctionKind::Host { .. }) => Callee::Host,
    Some(FunctionKind::Bound { target, this, args }) => {
      Callee::Bound(*target, this.clone(), args.clone())
    }
    None => unreachable!("call_function on a non-callable object"),
  }
}

fn native_frame(cx: &Isolate, id: ObjRef, is_constructor: bool) -> Frame {
  Frame {
    function: Some(id),
    name: object::function_name(&cx.vm.heap, id),
    source: None,
    span: Span::default(),
    realm: cx.vm.heap.object(id).realm,
    is_constructor,
  }
}

fn call_native(
  cx: &mut Isolate,
  id: ObjRef,
  this: JsValue,
  args: &[JsValue],
  new_target: Option<ObjRef>,
  builtin: Option<crate::engine::object::BuiltinFn>,
) -> JsResult<JsValue> {
  check_interrupts(cx)?;
  let frame = native_frame(cx, id, new_target.is_some());
  cx.vm.frames.push(frame);
  let result = match builtin {
    Some(f) => f(
      cx,
      &CallInfo {
        callee: id,
        this,
        args,
        new_target,
      },
    ),
    None => crate::function::call_host_function(cx, id, this, args, new_target),
  };
  cx.vm.frames.pop();
  result
}

/// [[Call]] on a function object.
pub(crate) fn call_function(
  cx: &mut Isolate,
  id: ObjRef,
  this: JsValue,
  args: &[JsValue],
) -> JsResult<JsValue> {
  match classify(cx, id) {
    Callee::Script => interp::call_script_function(cx, id, this, args, None),
    Callee::Builtin(f) => call_native(cx, id, this, args, None, Some(f)),
    Callee::Host => call_native(cx, id, this, args, None, None),
    Callee::Bound(target, bound_this, mut bound_args) => {
      bound_args.extend_from_slice(args);
      call_function(cx, target, bound_this, &bound_args)
    }
  }
}

/// GetPrototypeFromConstructor.
pub(crate) fn prototype_from_constructor(
  cx: &mut Isolate,
  constructor: ObjRef,
  fallback: ObjRef,
) -> JsResult<ObjRef> {
  match get_str(cx, constructor, "prototype")? {
    JsValue::Object(proto) => Ok(proto),
    _ => Ok(fallback),
  }
}

/// [[Construct]]. `new_target` defaults to the constructor itself.
pub(crate) fn construct(
  cx: &mut Isolate,
  id: ObjRef,
  args: &[JsValue],
  new_target: Option<ObjRef>,
) -> JsResult<JsValue> {
  if !cx.vm.heap.object(id).is_constructor() {
    let name = object::function_name(&cx.vm.heap, id);
    let name = if name.is_empty() { "anonymous".into() } else { name };
    return Err(error::type_error(cx, format!("{name} is not a constructor")));
  }
  let new_target = new_target.unwrap_or(id);
  match classify(cx, id) {
    Callee::Script => {
      let fallback = intrinsics(cx).object_prototype;
      let proto = prototype_from_constructor(cx, new_target, fallback)?;
      let this = new_object_with_proto(cx, Some(proto));
      let result =
        interp::call_script_function(
          cx,
          id,
          JsValue::Object(this),
          args,
          Some(new_target),
        )?;
      Ok(match result {
        JsValue::Object(_) => result,
        _ => JsValue::Object(this),
      })
    }
    Callee::Builtin(f) => {
      call_native(cx, id, JsValue::Undefined, args, Some(new_target), Some(f))
    }
    Callee::Host => {
      let fallback = intrinsics(cx).object_prototype;
      let proto = prototype_from_constructor(cx, new_target, fallback)?;
      let this = crate::template::construct_receiver(cx, id, proto);
      let result = call_native(
        cx,
        id,
        JsValue::Object(this),
        args,
        Some(new_target),
        None,
      )?;
      Ok(match result {
        JsValue::Object(_) => result,
        _ => JsValue::Object(this),
      })
    }
    Callee::Bound(target, _, mut bound_args) => {
      bound_args.extend_from_slice(args);
      let new_target = if new_target == id { target } else { new_target };
      construct(cx, target, &bound_args, Some(new_target))
    }
  }
}

/// Calls `value[name](...args)`.
pub(crate) fn invoke(
  cx: &mut Isolate,
  value: &JsValue,
  name: &str,
  args: &[JsValue],
) -> JsResult<JsValue> {
  let method = get_value(cx, value, &PropertyKey::str(name))?;
  call(cx, &method, value.clone(), args)
}

// Conversions

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Hint {
  Default,
  Number,
  String,
}

pub(crate) fn to_primitive(
  cx: &mut Isolate,
  value: &JsValue,
  hint: Hint,
) -> JsResult<JsValue> {
  let JsValue::Object(id) = value else {
    return Ok(value.clone());
  };
  let order = match hint {
    Hint::String => ["toString", "valueOf"],
    Hint::Default | Hint::Number => ["valueOf", "toString"],
  };
  for name in order {
    let method = get_str(cx, *id, name)?;
    if is_callable(cx, &method) {
      let result = call(cx, &method, value.clone(), &[])?;
      if !matches!(result, JsValue::Object(_)) {
        return Ok(result);
      }
    }
  }
  Err(error::type_error(cx, "Cannot convert object to primitive value"))
}

pub(crate) fn to_number(cx: &mut Isolate, value: &JsValue) -> JsResult<f64> {
  match value {
    JsValue::Undefined => Ok(f64::NAN),
    JsValue::Null => Ok(0.0),
    JsValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
    JsValue::Number(n) => Ok(*n),
    JsValue::String(s) => Ok(string_to_number(s)),
    JsValue::Symbol(_) => {
      Err(error::type_error(cx, "Cannot convert a Symbol value to a number"))
    }
    JsValue::BigInt(_) => {
      Err(error::type_error(cx, "Cannot convert a BigInt value to a number"))
    }
    JsValue::Object(_) => {
      let primitive = to_primitive(cx, value, Hint::Number)?;
      to_number(cx, &primitive)
    }
  }
}

/// ToNumeric: a Number or a BigInt.
pub(crate) fn to_numeric(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<JsValue> {
  let primitive = to_primitive(cx, value, Hint::Number)?;
  if let JsValue::BigInt(_) = primitive {
    return Ok(primitive);
  }
  Ok(JsValue::Number(to_number(cx, &primitive)?))
}

/// ToString for values that are already primitive and not symbols.
pub(crate) fn primitive_to_string(value: &JsValue) -> Option<JsStr> {
  Some(match value {
    JsValue::Undefined => "undefined".into(),
    JsValue::Null => "null".into(),
    JsValue::Bool(true) => "true".into(),
    JsValue::Bool(false) => "false".into(),
    JsValue::Number(n) => number_to_string(*n).into(),
    JsValue::String(s) => s.clone(),
    JsValue::BigInt(b) => b.to_string().into(),
    JsValue::Symbol(_) | JsValue::Object(_) => return None,
  })
}

pub(crate) fn to_string(cx: &mut Isolate, value: &JsValue) -> JsResult<JsStr> {
  if let Some(s) = primitive_to_string(value) {
    return Ok(s);
  }
  match value {
    JsValue::Symbol(_) => {
      Err(error::type_error(cx, "Cannot convert a Symbol value to a string"))
    }
    _ => {
      let primitive = to_primitive(cx, value, Hint::String)?;
      to_string(cx, &primitive)
    }
  }
}

pub(crate) fn to_property_key(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<PropertyKey> {
  match value {
    JsValue::String(s) => Ok(PropertyKey::String(s.clone())),
    JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.clone())),
    JsValue::Number(n)
      if *n >= 0.0 && *n < u32::MAX as f64 && n.fract() == 0.0 =>
    {
      Ok(PropertyKey::index(*n as usize))
    }
    JsValue::Object(_) => {
      let primitive = to_primitive(cx, value, Hint::String)?;
      to_property_key(cx, &primitive)
    }
    _ => Ok(PropertyKey::String(to_string(cx, value)?)),
  }
}

/// Wraps a primitive in its wrapper object.
pub(crate) fn wrap_primitive(cx: &mut Isolate, value: JsValue) -> ObjRef {
  let realm = current_realm(cx);
  let proto = prototype_for_primitive(cx, &value);
  alloc(cx, JsObject::with_class(proto, realm, ObjectClass::Primitive(value)))
}

pub(crate) fn to_object(cx: &mut Isolate, value: &JsValue) -> JsResult<ObjRef> {
  match value {
    JsValue::Object(id) => Ok(*id),
    JsValue::Undefined | JsValue::Null => Err(error::type_error(
      cx,
      "Cannot convert undefined or null to object",
    )),
    _ => Ok(wrap_primitive(cx, value.clone())),
  }
}

pub(crate) fn to_integer_or_infinity(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<f64> {
  Ok(f64_to_integer(to_number(cx, value)?))
}

pub(crate) fn to_int32(cx: &mut Isolate, value: &JsValue) -> JsResult<i32> {
  Ok(f64_to_int32(to_number(cx, value)?))
}

pub(crate) fn to_uint32(cx: &mut Isolate, value: &JsValue) -> JsResult<u32> {
  Ok(f64_to_uint32(to_number(cx, value)?))
}

/// ToLength, clamped to what fits an array.
pub(crate) fn to_length(cx: &mut Isolate, value: &JsValue) -> JsResult<u64> {
  let n = to_integer_or_infinity(cx, value)?;
  Ok(n.clamp(0.0, 9_007_199_254_740_991.0) as u64)
}

/// Resolves a relative index argument (`slice`, `splice`, ...) against a
/// length.
pub(crate) fn relative_index(
  cx: &mut Isolate,
  value: &JsValue,
  length: u64,
  default: u64,
) -> JsResult<u64> {
  if value.is_undefined() {
    return Ok(default);
  }
  let n = to_integer_or_infinity(cx, value)?;
  Ok(if n < 0.0 {
    (length as f64 + n).max(0.0) as u64
  } else {
    n.min(length as f64) as u64
  })
}

pub(crate) fn length_of_array_like(
  cx: &mut Isolate,
  id: ObjRef,
) -> JsResult<u64> {
  if let ObjectClass::Array { length, .. } = cx.vm.heap.object(id).class {
    return Ok(length as u64);
  }
  let length = get_str(cx, id, "length")?;
  to_length(cx, &length)
}

pub(crate) fn array_like_to_list(
  cx: &mut Isolate,
  id: ObjRef,
) -> JsResult<Vec<JsValue>> {
  let length = length_of_array_like(cx, id)?;
  let mut values = Vec::with_capacity(length.min(1 << 16) as usize);
  for i in 0..length {
    values.push(get(cx, id, &PropertyKey::index(i as usize))?);
  }
  Ok(values)
}

/// Materializes the values a `for-of` loop or `Promise.all` iterates.
/// Arrays, strings and array-likes are supported.
pub(crate) fn iterable_to_list(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<Vec<JsValue>> {
  match value {
    JsValue::String(s) => {
      Ok(s.chars().map(|c| JsValue::String(c.to_string().into())).collect())
    }
    JsValue::Object(id) => {
      if let ObjectClass::Primitive(JsValue::String(s)) =
        &cx.vm.heap.object(*id).class
      {
        let s = s.clone();
        return iterable_to_list(cx, &JsValue::String(s));
      }
      array_like_to_list(cx, *id)
    }
    _ => {
      let detail = error::detail_string(&cx.vm, value);
      Err(error::type_error(cx, format!("{detail} is not iterable")))
    }
  }
}

// Operators

pub(crate) fn string_to_bigint(s: &str) -> Option<BigInt> {
  let s = trim_js_whitespace(s);
  if s.is_empty() {
    return Some(BigInt::zero());
  }
  let (radix, digits) = match s.get(..2) {
    Some("0x" | "0X") => (16, &s[2..]),
    Some("0o" | "0O") => (8, &s[2..]),
    Some("0b" | "0B") => (2, &s[2..]),
    _ => (10, s),
  };
  if digits.is_empty() || (radix != 10 && digits.starts_with(['+', '-'])) {
    return None;
  }
  BigInt::parse_bytes(digits.as_bytes(), radix)
}

fn compare_bigint_number(big: &BigInt, n: f64) -> Option<Ordering> {
  if n.is_nan() {
    return None;
  }
  if n.is_infinite() {
    return Some(if n > 0.0 { Ordering::Less } else { Ordering::Greater });
  }
  let floor = BigInt::from_f64(n.floor())?;
  match big.cmp(&floor) {
    Ordering::Equal if n.fract() != 0.0 => Some(Ordering::Less),
    ordering => Some(ordering),
  }
}

/// The `==` operator.
pub(crate) fn loose_equals(
  cx: &mut Isolate,
  a: &JsValue,
  b: &JsValue,
) -> JsResult<bool> {
  use JsValue::*;
  Ok(match (a, b) {
    (Undefined | Null, Undefined | Null) => true,
    (Undefined | Null, _) | (_, Undefined | Null) => false,
    (Number(_), String(s)) => a.strict_equals(&Number(string_to_number(s))),
    (String(s), Number(_)) => Number(string_to_number(s)).strict_equals(b),
    (BigInt(x), String(s)) | (String(s), BigInt(x)) => {
      string_to_bigint(s).is_some_and(|y| **x == y)
    }
    (Bool(x), _) => {
      return loose_equals(cx, &Number(if *x { 1.0 } else { 0.0 }), b)
    }
    (_, Bool(y)) => {
      return loose_equals(cx, a, &Number(if *y { 1.0 } else { 0.0 }))
    }
    (Object(_), Object(_)) => a.strict_equals(b),
    (Object(_), _) => {
      let primitive = to_primitive(cx, a, Hint::Default)?;
      return loose_equals(cx, &primitive, b);
    }
    (_, Object(_)) => {
      let primitive = to_primitive(cx, b, Hint::Default)?;
      return loose_equals(cx, a, &primitive);
    }
    (BigInt(x), Number(n)) | (Number(n), BigInt(x)) => {
      compare_bigint_number(x, *n) == Some(Ordering::Equal)
    }
    _ => a.strict_equals(b),
  })
}

/// IsLessThan on already converted primitives. `None` means undefined
/// (a NaN was involved).
fn primitive_less_than(
  cx: &mut Isolate,
  a: &JsValue,
  b: &JsValue,
) -> JsResult<Option<bool>> {
  if let (JsValue::String(x), JsValue::String(y)) = (a, b) {
    return Ok(Some(x.encode_utf16().cmp(y.encode_utf16()) == Ordering::Less));
  }
  match (a, b) {
    (JsValue::BigInt(x), JsValue::String(y)) => {
      return Ok(string_to_bigint(y).map(|y| **x < y));
    }
    (JsValue::String(x), JsValue::BigInt(y)) => {
      return Ok(string_to_bigint(x).map(|x| x < **y));
    }
    _ => {}
  }
  let x = to_numeric(cx, a)?;
  let y = to_numeric(cx, b)?;
  Ok(match (&x, &y) {
    (JsValue::Number(x), JsValue::Number(y)) => {
      if x.is_nan() || y.is_nan() {
        None
      } else {
        Some(x < y)
      }
    }
    (JsValue::BigInt(x), JsValue::BigInt(y)) => Some(x < y),
    (JsValue::BigInt(x), JsValue::Number(y)) => {
      compare_bigint_number(x, *y).map(|o| o == Ordering::Less)
    }
    (JsValue::Number(x), JsValue::BigInt(y)) => {
      compare_bigint_number(y, *x).map(|o| o == Ordering::Greater)
    }
    _ => None,
  })
}

/// Abstract relational comparison. `left_first` preserves the evaluation
/// order of user `valueOf` calls when the operands were swapped.
pub(crate) fn less_than(
  cx: &mut Isolate,
  a: &JsValue,
  b: &JsValue,
  left_first: bool,
) -> JsResult<Option<bool>> {
  let (pa, pb) = if left_first {
    let pa = to_primitive(cx, a, Hint::Number)?;
    let pb = to_primitive(cx, b, Hint::Number)?;
    (pa, pb)
  } else {
    let pb = to_primitive(cx, b, Hint::Number)?;
    let pa = to_primitive(cx, a, Hint::Number)?;
    (pa, pb)
  };
  primitive_less_than(cx, &pa, &pb)
}

pub(crate) fn ordinary_has_instance(
  cx: &mut Isolate,
  constructor: &JsValue,
  value: &JsValue,
) -> JsResult<bool> {
  let Some(ctor) =
    constructor.as_object().filter(|_| is_callable(cx, constructor))
  else {
    return Ok(false);
  };
  if let Some(FunctionKind::Bound { target, .. }) =
    cx.vm.heap.object(ctor).function_data().map(|d| &d.kind)
  {
    let target = JsValue::Object(*target);
    return instance_of(cx, value, &target);
  }
  let Some(mut current) = value.as_object() else {
    return Ok(false);
  };
  let proto = get_str(cx, ctor, "prototype")?;
  let JsValue::Object(proto) = proto else {
    let detail = error::detail_string(&cx.vm, &proto);
    return Err(error::type_error(
      cx,
      format!(
        "Function has non-object prototype '{detail}' in instanceof check",
      ),
    ));
  };
  loop {
    match cx.vm.heap.object(current).proto {
      Some(p) if p == proto => return Ok(true),
      Some(p) => current = p,
      None => return Ok(false),
    }
  }
}

/// The `instanceof` operator.
pub(crate) fn instance_of(
  cx: &mut Isolate,
  value: &JsValue,
  target: &JsValue,
) -> JsResult<bool> {
  if !matches!(target, JsValue::Object(_)) {
    return Err(error::type_error(
      cx,
      "Right-hand side of 'instanceof' is not an object",
    ));
  }
  if !is_callable(cx, target) {
    return Err(error::type_error(
      cx,
      "Right-hand side of 'instanceof' is not callable",
    ));
  }
  ordinary_has_instance(cx, target, value)
}

/// BigInt arithmetic helpers shared by the interpreter and `BigInt()`.
pub(crate) fn number_to_bigint(
  cx: &mut Isolate,
  n: f64,
) -> JsResult<Rc<BigInt>> {
  if n.fract() != 0.0 || !n.is_finite() {
    let detail = number_to_string(n);
    return Err(error::range_error(
      cx,
      format!(
        "The number {detail} cannot be converted to a BigInt because it is not an integer",
      ),
    ));
  }
  match BigInt::from_f64(n) {
    Some(b) => Ok(Rc::new(b)),
    None => Err(error::range_error(cx, "Invalid BigInt")),
  }
}

pub(crate) fn bigint_to_f64(b: &BigInt) -> f64 {
  b.to_f64().unwrap_or(f64::NAN)
}

/// Object.prototype.toString's tag for a value.
pub(crate) fn to_string_tag(cx: &Isolate, value: &JsValue) -> String {
  match value {
    JsValue::Undefined => "[object Undefined]".into(),
    JsValue::Null => "[object Null]".into(),
    JsValue::Object(id) => {
      format!("[object {}]", object::builtin_tag(cx.vm.heap.object(*id)))
    }
    JsValue::Bool(_) => "[object Boolean]".into(),
    JsValue::Number(_) => "[object Number]".into(),
    JsValue::String(_) => "[object String]".into(),
    JsValue::Symbol(_) => "[object Symbol]".into(),
    JsValue::BigInt(_) => "[object BigInt]".into(),
  }
}
