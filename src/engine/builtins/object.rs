// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! `Object` and `Object.prototype`.

use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::builtins;
use crate::engine::error;
use crate::engine::object::Attributes;
use crate::engine::object::CallInfo;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropSlot;
use crate::engine::object::PropertyDescriptor;
use crate::engine::ops;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::isolate::Isolate;

fn object_arg(
  cx: &mut Isolate,
  value: &JsValue,
  method: &str,
) -> JsResult<ObjRef> {
  match value {
    JsValue::Object(id) => Ok(*id),
    _ => Err(error::type_error(cx, format!("{method} called on non-object"))),
  }
}

fn object_constructor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let value = info.arg(0);
  if value.is_nullish() {
    return Ok(JsValue::Object(ops::new_object(cx)));
  }
  Ok(JsValue::Object(ops::to_object(cx, &value)?))
}

/// Own enumerable string keys, in property order.
pub(crate) fn enumerable_own_keys(
  cx: &mut Isolate,
  id: ObjRef,
) -> JsResult<Vec<PropertyKey>> {
  let mut keys = Vec::new();
  for key in ops::own_property_keys(cx, id) {
    if let PropertyKey::Symbol(_) = key {
      continue;
    }
    if ops::own_property(cx, id, &key)?.is_some_and(|p| p.attrs.enumerable) {
      keys.push(key);
    }
  }
  Ok(keys)
}

fn keys(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let keys = enumerable_own_keys(cx, id)?
    .iter()
    .map(PropertyKey::to_value)
    .collect();
  Ok(JsValue::Object(ops::new_array(cx, keys)))
}

fn values(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let mut values = Vec::new();
  for key in enumerable_own_keys(cx, id)? {
    values.push(ops::get(cx, id, &key)?);
  }
  Ok(JsValue::Object(ops::new_array(cx, values)))
}

fn entries(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let mut entries = Vec::new();
  for key in enumerable_own_keys(cx, id)? {
    let value = ops::get(cx, id, &key)?;
    let pair = ops::new_array(cx, vec![key.to_value(), value]);
    entries.push(JsValue::Object(pair));
  }
  Ok(JsValue::Object(ops::new_array(cx, entries)))
}

fn assign(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = ops::to_object(cx, &info.arg(0))?;
  for source in info.args.iter().skip(1) {
    if source.is_nullish() {
      continue;
    }
    let from = ops::to_object(cx, source)?;
    for key in ops::own_property_keys(cx, from) {
      let property = ops::own_property(cx, from, &key)?;
      if property.is_some_and(|p| p.attrs.enumerable) {
        let value = ops::get(cx, from, &key)?;
        ops::put(cx, target, key, value, true)?;
      }
    }
  }
  Ok(JsValue::Object(target))
}

fn get_prototype_of(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  Ok(match ops::get_prototype_of(cx, id) {
    Some(proto) => JsValue::Object(proto),
    None => JsValue::Null,
  })
}

fn set_prototype_of(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let target = info.arg(0);
  let proto = match info.arg(1) {
    JsValue::Object(id) => Some(id),
    JsValue::Null => None,
    other => {
      let detail = error::detail_string(&cx.vm, &other);
      return Err(error::type_error(
        cx,
        format!("Object prototype may only be an Object or null: {detail}"),
      ));
    }
  };
  if target.is_nullish() {
    return Err(error::type_error(
      cx,
      "Object.setPrototypeOf called on null or undefined",
    ));
  }
  if let JsValue::Object(id) = target {
    if !ops::set_prototype_of(cx, id, proto) {
      let message = if cx.vm.heap.object(id).extensible {
        "Cyclic __proto__ value".to_string()
      } else {
        let detail = error::detail_string(&cx.vm, &target);
        format!("{detail} is not extensible")
      };
      return Err(error::type_error(cx, message));
    }
  }
  Ok(target)
}

/// ToPropertyDescriptor.
pub(crate) fn to_property_descriptor(
  cx: &mut Isolate,
  value: &JsValue,
) -> JsResult<PropertyDescriptor> {
  let JsValue::Object(id) = value else {
    let detail = error::detail_string(&cx.vm, value);
    return Err(error::type_error(
      cx,
      format!("Property description must be an object: {detail}"),
    ));
  };
  let id = *id;
  let mut desc = PropertyDescriptor::default();
  let flag = |cx: &mut Isolate, name: &str| -> JsResult<Option<bool>> {
    let key = PropertyKey::str(name);
    if ops::has_property(cx, id, &key)? {
      Ok(Some(ops::get(cx, id, &key)?.truthy()))
    } else {
      Ok(None)
    }
  };
  desc.enumerable = flag(cx, "enumerable")?;
  desc.configurable = flag(cx, "configurable")?;
  desc.writable = flag(cx, "writable")?;
  if ops::has_property(cx, id, &PropertyKey::str("value"))? {
    desc.value = Some(ops::get_str(cx, id, "value")?);
  }
  for name in ["get", "set"] {
    if !ops::has_property(cx, id, &PropertyKey::str(name))? {
      continue;
    }
    let accessor = ops::get_str(cx, id, name)?;
    let function = match &accessor {
      JsValue::Undefined => None,
      JsValue::Object(f) if cx.vm.heap.object(*f).is_callable() => Some(*f),
      _ => {
        let kind = if name == "get" { "Getter" } else { "Setter" };
        let detail = error::detail_string(&cx.vm, &accessor);
        return Err(error::type_error(
          cx,
          format!("{kind} must be a function: {detail}"),
        ));
      }
    };
    if name == "get" {
      desc.get = Some(function);
    } else {
      desc.set = Some(function);
    }
  }
  if desc.is_accessor() && desc.is_data() {
    return Err(error::type_error(
      cx,
      "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
    ));
  }
  Ok(desc)
}

fn define_property(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let target = object_arg(cx, &info.arg(0), "Object.defineProperty")?;
  let key = ops::to_property_key(cx, &info.arg(1))?;
  let desc = to_property_descriptor(cx, &info.arg(2))?;
  ops::define_property_or_throw(cx, target, key, desc)?;
  Ok(JsValue::Object(target))
}

fn define_properties(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let target = object_arg(cx, &info.arg(0), "Object.defineProperties")?;
  let props = ops::to_object(cx, &info.arg(1))?;
  let mut descriptors = Vec::new();
  for key in enumerable_own_keys(cx, props)? {
    let value = ops::get(cx, props, &key)?;
    descriptors.push((key, to_property_descriptor(cx, &value)?));
  }
  for (key, desc) in descriptors {
    ops::define_property_or_throw(cx, target, key, desc)?;
  }
  Ok(JsValue::Object(target))
}

fn create(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let proto = match info.arg(0) {
    JsValue::Object(id) => Some(id),
    JsValue::Null => None,
    other => {
      let detail = error::detail_string(&cx.vm, &other);
      return Err(error::type_error(
        cx,
        format!("Object prototype may only be an Object or null: {detail}"),
      ));
    }
  };
  let object = ops::new_object_with_proto(cx, proto);
  if !info.arg(1).is_undefined() {
    let args = [JsValue::Object(object), info.arg(1)];
    define_properties(
      cx,
      &CallInfo {
        callee: info.callee,
        this: JsValue::Undefined,
        args: &args,
        new_target: None,
      },
    )?;
  }
  Ok(JsValue::Object(object))
}

fn get_own_property_names(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let names = ops::own_property_keys(cx, id)
    .into_iter()
    .filter(|key| matches!(key, PropertyKey::String(_)))
    .map(|key| key.to_value())
    .collect();
  Ok(JsValue::Object(ops::new_array(cx, names)))
}

/// FromPropertyDescriptor for an own property. Native accessors report as
/// data properties holding their current value.
fn get_own_property_descriptor(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let key = ops::to_property_key(cx, &info.arg(1))?;
  let Some(prop) = ops::own_property(cx, id, &key)? else {
    return Ok(JsValue::Undefined);
  };
  let result = ops::new_object(cx);
  let mut fields: Vec<(&str, JsValue)> = Vec::new();
  match prop.slot {
    PropSlot::Data(value) => {
      fields.push(("value", value));
      fields.push(("writable", JsValue::Bool(prop.attrs.writable)));
    }
    PropSlot::Native(_) => {
      let value = ops::get(cx, id, &key)?;
      fields.push(("value", value));
      fields.push(("writable", JsValue::Bool(prop.attrs.writable)));
    }
    PropSlot::Accessor { get, set } => {
      fields.push(("get", get.map_or(JsValue::Undefined, JsValue::Object)));
      fields.push(("set", set.map_or(JsValue::Undefined, JsValue::Object)));
    }
  }
  fields.push(("enumerable", JsValue::Bool(prop.attrs.enumerable)));
  fields.push(("configurable", JsValue::Bool(prop.attrs.configurable)));
  for (name, value) in fields {
    ops::define_value(cx, result, name, value, Attributes::DEFAULT);
  }
  Ok(JsValue::Object(result))
}

/// SetIntegrityLevel. `frozen` also makes data properties read-only.
pub(crate) fn set_integrity_level(
  cx: &mut Isolate,
  id: ObjRef,
  frozen: bool,
) -> JsResult<bool> {
  if frozen {
    if let ObjectClass::Uint8Array { length, .. } =
      cx.vm.heap.object(id).class
    {
      if length > 0 {
        return Err(error::type_error(
          cx,
          "Cannot freeze array buffer views with elements",
        ));
      }
    }
  }
  cx.vm.heap.object_mut(id).extensible = false;
  for key in ops::own_property_keys(cx, id) {
    let Some(prop) = ops::own_property(cx, id, &key)? else {
      continue;
    };
    let mut desc = PropertyDescriptor {
      configurable: Some(false),
      ..Default::default()
    };
    if frozen && !matches!(prop.slot, PropSlot::Accessor { .. }) {
      desc.writable = Some(false);
    }
    if !ops::define_property(cx, id, key, desc)? {
      return Ok(false);
    }
  }
  Ok(true)
}

fn test_integrity_level(
  cx: &mut Isolate,
  id: ObjRef,
  frozen: bool,
) -> JsResult<bool> {
  if cx.vm.heap.object(id).extensible {
    return Ok(false);
  }
  for key in ops::own_property_keys(cx, id) {
    if let Some(prop) = ops::own_property(cx, id, &key)? {
      if prop.attrs.configurable {
        return Ok(false);
      }
      if frozen
        && prop.attrs.writable
        && !matches!(prop.slot, PropSlot::Accessor { .. })
      {
        return Ok(false);
      }
    }
  }
  Ok(true)
}

fn freeze(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let value = info.arg(0);
  if let JsValue::Object(id) = value {
    if !set_integrity_level(cx, id, true)? {
      return Err(error::type_error(cx, "Cannot freeze"));
    }
  }
  Ok(value)
}

fn is_frozen(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(match info.arg(0) {
    JsValue::Object(id) => test_integrity_level(cx, id, true)?,
    _ => true,
  }))
}

fn seal(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let value = info.arg(0);
  if let JsValue::Object(id) = value {
    if !set_integrity_level(cx, id, false)? {
      return Err(error::type_error(cx, "Cannot seal"));
    }
  }
  Ok(value)
}

fn is_sealed(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(match info.arg(0) {
    JsValue::Object(id) => test_integrity_level(cx, id, false)?,
    _ => true,
  }))
}

fn prevent_extensions(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let value = info.arg(0);
  if let JsValue::Object(id) = value {
    cx.vm.heap.object_mut(id).extensible = false;
  }
  Ok(value)
}

fn is_extensible(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(match info.arg(0) {
    JsValue::Object(id) => {
      cx.vm.heap.object(id).extensible
        && !matches!(cx.vm.heap.object(id).class, ObjectClass::Namespace(_))
    }
    _ => false,
  }))
}

fn is(_cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::Bool(info.arg(0).same_value(&info.arg(1))))
}

fn has_own_property(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let key = ops::to_property_key(cx, &info.arg(0))?;
  let id = builtins::this_object(
    cx,
    &info.this,
    "Object.prototype.hasOwnProperty",
  )?;
  Ok(JsValue::Bool(ops::has_own_property(cx, id, &key)?))
}

fn has_own(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = ops::to_object(cx, &info.arg(0))?;
  let key = ops::to_property_key(cx, &info.arg(1))?;
  Ok(JsValue::Bool(ops::has_own_property(cx, id, &key)?))
}

fn is_prototype_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let JsValue::Object(mut current) = info.arg(0) else {
    return Ok(JsValue::Bool(false));
  };
  let id = builtins::this_object(
    cx,
    &info.this,
    "Object.prototype.isPrototypeOf",
  )?;
  while let Some(proto) = ops::get_prototype_of(cx, current) {
    if proto == id {
      return Ok(JsValue::Bool(true));
    }
    current = proto;
  }
  Ok(JsValue::Bool(false))
}

fn property_is_enumerable(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  let key = ops::to_property_key(cx, &info.arg(0))?;
  let id = builtins::this_object(
    cx,
    &info.this,
    "Object.prototype.propertyIsEnumerable",
  )?;
  let enumerable = ops::own_property(cx, id, &key)?
    .is_some_and(|p| p.attrs.enumerable);
  Ok(JsValue::Bool(enumerable))
}

fn to_string(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  Ok(JsValue::String(ops::to_string_tag(cx, &info.this).into()))
}

fn to_locale_string(
  cx: &mut Isolate,
  info: &CallInfo<'_>,
) -> JsResult<JsValue> {
  ops::invoke(cx, &info.this, "toString", &[])
}

fn value_of(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let id = builtins::this_object(cx, &info.this, "Object.prototype.valueOf")?;
  Ok(JsValue::Object(id))
}

pub(crate) fn install(cx: &mut Isolate, realm: ContextId) {
  let prototype = cx.vm.realm(realm).intrinsics.object_prototype;
  let ctor = builtins::constructor(
    cx,
    realm,
    "Object",
    1,
    object_constructor,
    prototype,
  );
  cx.vm.realm_mut(realm).intrinsics.object_constructor = Some(ctor);

  type Entry = (&'static str, u32, crate::engine::object::BuiltinFn);
  let statics: [Entry; 21] = [
    ("keys", 1, keys),
    ("values", 1, values),
    ("entries", 1, entries),
    ("assign", 2, assign),
    ("getPrototypeOf", 1, get_prototype_of),
    ("setPrototypeOf", 2, set_prototype_of),
    ("create", 2, create),
    ("defineProperty", 3, define_property),
    ("defineProperties", 2, define_properties),
    ("getOwnPropertyNames", 1, get_own_property_names),
    ("getOwnPropertyDescriptor", 2, get_own_property_descriptor),
    ("freeze", 1, freeze),
    ("isFrozen", 1, is_frozen),
    ("seal", 1, seal),
    ("isSealed", 1, is_sealed),
    ("preventExtensions", 1, prevent_extensions),
    ("isExtensible", 1, is_extensible),
    ("is", 2, is),
    ("hasOwn", 2, has_own),
    ("fromEntries", 1, from_entries),
    ("groupBy", 2, group_by),
  ];
  for (name, length, f) in statics {
    builtins::method(cx, realm, ctor, name, length, f);
  }

  let methods: [Entry; 6] = [
    ("hasOwnProperty", 1, has_own_property),
    ("isPrototypeOf", 1, is_prototype_of),
    ("propertyIsEnumerable", 1, property_is_enumerable),
    ("toString", 0, to_string),
    ("toLocaleString", 0, to_locale_string),
    ("valueOf", 0, value_of),
  ];
  for (name, length, f) in methods {
    builtins::method(cx, realm, prototype, name, length, f);
  }
}

fn from_entries(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let entries = ops::iterable_to_list(cx, &info.arg(0))?;
  let object = ops::new_object(cx);
  for entry in entries {
    let JsValue::Object(pair) = entry else {
      let detail = error::detail_string(&cx.vm, &entry);
      return Err(error::type_error(
        cx,
        format!("Iterator value {detail} is not an entry object"),
      ));
    };
    let key = ops::get(cx, pair, &PropertyKey::index(0))?;
    let value = ops::get(cx, pair, &PropertyKey::index(1))?;
    let key = ops::to_property_key(cx, &key)?;
    ops::create_data_property(cx, object, key, value)?;
  }
  Ok(JsValue::Object(object))
}

fn group_by(cx: &mut Isolate, info: &CallInfo<'_>) -> JsResult<JsValue> {
  let items = ops::iterable_to_list(cx, &info.arg(0))?;
  let callback = builtins::callable_arg(cx, &info.arg(1))?;
  let groups = ops::new_object_with_proto(cx, None);
  for (index, item) in items.into_iter().enumerate() {
    let key = ops::call_function(
      cx,
      callback,
      JsValue::Undefined,
      &[item.clone(), JsValue::Number(index as f64)],
    )?;
    let key = ops::to_property_key(cx, &key)?;
    let group = match ops::get(cx, groups, &key)? {
      JsValue::Object(group) => group,
      _ => {
        let group = ops::new_array(cx, Vec::new());
        ops::create_data_property(cx, groups, key, JsValue::Object(group))?;
        group
      }
    };
    let length = ops::length_of_array_like(cx, group)?;
    ops::create_data_property(
      cx,
      group,
      PropertyKey::index(length as usize),
      item,
    )?;
  }
  Ok(JsValue::Object(groups))
}
