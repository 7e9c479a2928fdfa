// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Object layout and the own-property operations that never run script.

use std::cell::Cell as StdCell;
use std::ffi::c_void;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::array_buffer::BackingStore;
use crate::engine::ContextId;
use crate::engine::FunctionTemplateId;
use crate::engine::JsResult;
use crate::engine::ModuleId;
use crate::engine::ast::FunctionNode;
use crate::engine::error::FrameInfo;
use crate::engine::heap::Heap;
use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::promise::PromiseData;
use crate::engine::source::SourceInfo;
use crate::engine::value::EnvRef;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::engine::value::utf16_len;
use crate::engine::value::utf16_slice;
use crate::function::AccessorNameGetterCallback;
use crate::function::AccessorNameSetterCallback;
use crate::function::FunctionCallback;
use crate::isolate::Isolate;
use crate::support::SharedRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Attributes {
  pub writable: bool,
  pub enumerable: bool,
  pub configurable: bool,
}

impl Attributes {
  /// Plain assignment and object literal properties.
  pub const DEFAULT: Attributes = Attributes {
    writable: true,
    enumerable: true,
    configurable: true,
  };
  /// Built-in methods.
  pub const HIDDEN: Attributes = Attributes {
    writable: true,
    enumerable: false,
    configurable: true,
  };
  pub const FROZEN: Attributes = Attributes {
    writable: false,
    enumerable: false,
    configurable: false,
  };
  pub const READ_ONLY_CONFIGURABLE: Attributes = Attributes {
    writable: false,
    enumerable: false,
    configurable: true,
  };
}

/// A native accessor installed through the embedding API.
pub(crate) struct NativeAccessor {
  pub getter: AccessorNameGetterCallback,
  pub setter: Option<AccessorNameSetterCallback>,
  pub data: JsValue,
}

#[derive(Clone)]
pub(crate) enum PropSlot {
  Data(JsValue),
  Accessor {
    get: Option<ObjRef>,
    set: Option<ObjRef>,
  },
  /// Behaves like a data property whose reads and writes call back into
  /// the embedder.
  Native(Rc<NativeAccessor>),
}

#[derive(Clone)]
pub(crate) struct Property {
  pub slot: PropSlot,
  pub attrs: Attributes,
}

impl Property {
  pub fn data(value: JsValue, attrs: Attributes) -> Self {
    Self {
      slot: PropSlot::Data(value),
      attrs,
    }
  }
}

/// A partially specified property, as given to `defineProperty`.
#[derive(Clone, Default)]
pub(crate) struct PropertyDescriptor {
  pub value: Option<JsValue>,
  pub get: Option<Option<ObjRef>>,
  pub set: Option<Option<ObjRef>>,
  pub writable: Option<bool>,
  pub enumerable: Option<bool>,
  pub configurable: Option<bool>,
}

impl PropertyDescriptor {
  pub fn data(value: JsValue, attrs: Attributes) -> Self {
    Self {
      value: Some(value),
      get: None,
      set: None,
      writable: Some(attrs.writable),
      enumerable: Some(attrs.enumerable),
      configurable: Some(attrs.configurable),
    }
  }

  pub fn is_accessor(&self) -> bool {
    self.get.is_some() || self.set.is_some()
  }

  pub fn is_data(&self) -> bool {
    self.value.is_some() || self.writable.is_some()
  }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum InternalField {
  Value,
  Pointer(*mut c_void),
}

/// Internal field storage. Values are kept apart from pointers so the
/// collector can trace them.
#[derive(Clone, Debug, Default)]
pub(crate) struct InternalFields {
  pub values: Vec<JsValue>,
  pub kinds: Vec<InternalField>,
}

impl InternalFields {
  pub fn new(count: usize) -> Self {
    Self {
      values: vec![JsValue::Undefined; count],
      kinds: vec![InternalField::Value; count],
    }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }
}

pub(crate) struct CallInfo<'a> {
  pub callee: ObjRef,
  pub this: JsValue,
  pub args: &'a [JsValue],
  /// Set for `new` invocations.
  pub new_target: Option<ObjRef>,
}

impl CallInfo<'_> {
  pub fn arg(&self, i: usize) -> JsValue {
    self.args.get(i).cloned().unwrap_or_default()
  }
}

pub(crate) type BuiltinFn = fn(
  &mut Isolate,
  &CallInfo<'_>,
) -> JsResult<JsValue>;

pub(crate) enum FunctionKind {
  Script {
    node: Rc<FunctionNode>,
    env: EnvRef,
    source: Rc<SourceInfo>,
  },
  Builtin {
    f: BuiltinFn,
    captures: Vec<JsValue>,
    /// Shared "already resolved" flag of a pair of promise resolving
    /// functions.
    resolved: Option<Rc<StdCell<bool>>>,
  },
  Host {
    callback: Option<FunctionCallback>,
    data: JsValue,
    template: Option<FunctionTemplateId>,
  },
  Bound {
    target: ObjRef,
    this: JsValue,
    args: Vec<JsValue>,
  },
}

pub(crate) struct FunctionData {
  pub kind: FunctionKind,
  pub is_constructor: bool,
}

pub(crate) enum ObjectClass {
  Ordinary,
  Array { length: u32, length_writable: bool },
  Function(Box<FunctionData>),
  /// Error instances keep the frames captured at construction.
  Error(Rc<Vec<FrameInfo>>),
  /// Boolean, Number, String, Symbol and BigInt wrapper objects.
  Primitive(JsValue),
  Promise(Box<PromiseData>),
  ArrayBuffer(SharedRef<BackingStore>),
  Uint8Array {
    buffer: ObjRef,
    offset: usize,
    length: usize,
  },
  External(*mut c_void),
  Arguments,
  Namespace(ModuleId),
}

pub(crate) struct JsObject {
  pub proto: Option<ObjRef>,
  pub extensible: bool,
  pub props: IndexMap<PropertyKey, Property>,
  pub class: ObjectClass,
  pub internal_fields: InternalFields,
  /// The context the object was created in.
  pub realm: ContextId,
  /// Identity hash; zero until first requested.
  pub hash: i32,
  /// Set on instances created from a function template.
  pub template: Option<FunctionTemplateId>,
}

impl JsObject {
  pub fn ordinary(proto: Option<ObjRef>, realm: ContextId) -> Self {
    Self::with_class(proto, realm, ObjectClass::Ordinary)
  }

  pub fn with_class(
    proto: Option<ObjRef>,
    realm: ContextId,
    class: ObjectClass,
  ) -> Self {
    Self {
      proto,
      extensible: true,
      props: IndexMap::new(),
      class,
      internal_fields: InternalFields::default(),
      realm,
      hash: 0,
      template: None,
    }
  }

  pub fn function_data(&self) -> Option<&FunctionData> {
    match &self.class {
      ObjectClass::Function(data) => Some(data),
      _ => None,
    }
  }

  pub fn is_callable(&self) -> bool {
    matches!(self.class, ObjectClass::Function(_))
  }

  pub fn is_constructor(&self) -> bool {
    self.function_data().is_some_and(|f| f.is_constructor)
  }

  pub fn is_array(&self) -> bool {
    matches!(self.class, ObjectClass::Array { .. })
  }

  pub fn insert(
    &mut self,
    key: PropertyKey,
    value: JsValue,
    attrs: Attributes,
  ) {
    self.props.insert(key, Property::data(value, attrs));
  }

  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    self.proto.trace(tracer);
    for prop in self.props.values() {
      match &prop.slot {
        PropSlot::Data(value) => tracer.visit_value(value),
        PropSlot::Accessor { get, set } => {
          get.trace(tracer);
          set.trace(tracer);
        }
        PropSlot::Native(native) => tracer.visit_value(&native.data),
      }
    }
    tracer.visit_all(&self.internal_fields.values);
    match &self.class {
      ObjectClass::Function(data) => match &data.kind {
        FunctionKind::Script { env, source, .. } => {
          tracer.visit(*env);
          source.trace(tracer);
        }
        FunctionKind::Builtin { captures, .. } => tracer.visit_all(captures),
        FunctionKind::Host { data, .. } => tracer.visit_value(data),
        FunctionKind::Bound { target, this, args } => {
          tracer.visit(*target);
          tracer.visit_value(this);
          tracer.visit_all(args);
        }
      },
      ObjectClass::Error(frames) => {
        for frame in frames.iter() {
          tracer.visit_value(&frame.script_name);
        }
      }
      ObjectClass::Primitive(value) => tracer.visit_value(value),
      ObjectClass::Promise(data) => data.trace(tracer),
      ObjectClass::Uint8Array { buffer, .. } => tracer.visit(*buffer),
      ObjectClass::Ordinary
      | ObjectClass::Array { .. }
      | ObjectClass::ArrayBuffer(_)
      | ObjectClass::External(_)
      | ObjectClass::Arguments
      | ObjectClass::Namespace(_) => {}
    }
  }
}

fn typed_array_byte(heap: &Heap, buffer: ObjRef, at: usize) -> Option<u8> {
  match &heap.object(buffer).class {
    ObjectClass::ArrayBuffer(store) => store.get(at),
    _ => None,
  }
}

/// [[GetOwnProperty]] for everything except module namespaces, which need
/// the module table.
pub(crate) fn get_own_property(
  heap: &Heap,
  id: ObjRef,
  key: &PropertyKey,
) -> Option<Property> {
  let object = heap.object(id);
  match &object.class {
    ObjectClass::Array { length, length_writable }
      if key.as_str() == Some("length") =>
    {
      return Some(Property::data(
        JsValue::Number(*length as f64),
        Attributes {
          writable: *length_writable,
          enumerable: false,
          configurable: false,
        },
      ));
    }
    ObjectClass::Primitive(JsValue::String(s)) => {
      if key.as_str() == Some("length") {
        return Some(Property::data(
          JsValue::Number(utf16_len(s) as f64),
          Attributes::FROZEN,
        ));
      }
      if let Some(index) = key.as_index() {
        if index < utf16_len(s) {
          return Some(Property::data(
            JsValue::String(utf16_slice(s, index, index + 1).into()),
            Attributes {
              writable: false,
              enumerable: true,
              configurable: false,
            },
          ));
        }
      }
    }
    ObjectClass::Uint8Array {
      buffer,
      offset,
      length,
    } => {
      if let Some(index) = key.as_index() {
        if index >= *length {
          return None;
        }
        let byte = typed_array_byte(heap, *buffer, offset + index)?;
        return Some(Property::data(
          JsValue::Number(byte as f64),
          Attributes {
            writable: true,
            enumerable: true,
            configurable: true,
          },
        ));
      }
    }
    _ => {}
  }
  object.props.get(key).cloned()
}

/// Own keys in property order: array indices ascending, then strings in
/// insertion order, then symbols.
pub(crate) fn own_keys(heap: &Heap, id: ObjRef) -> Vec<PropertyKey> {
  let object = heap.object(id);
  let mut indices: Vec<usize> = Vec::new();
  match &object.class {
    ObjectClass::Primitive(JsValue::String(s)) => {
      indices.extend(0..utf16_len(s))
    }
    ObjectClass::Uint8Array { length, .. } => indices.extend(0..*length),
    _ => {}
  }
  let mut strings = Vec::new();
  let mut symbols = Vec::new();
  for key in object.props.keys() {
    match key {
      PropertyKey::Symbol(_) => symbols.push(key.clone()),
      PropertyKey::String(_) => match key.as_index() {
        Some(index) => indices.push(index),
        None => strings.push(key.clone()),
      },
    }
  }
  indices.sort_unstable();
  indices.dedup();
  let mut keys: Vec<PropertyKey> = indices.into_iter().map(
    PropertyKey::index,
  ).collect();
  match &object.class {
    ObjectClass::Array { .. } | ObjectClass::Primitive(JsValue::String(_)) => {
      keys.push(PropertyKey::str("length"));
    }
    _ => {}
  }
  keys.extend(strings);
  keys.extend(symbols);
  keys
}

/// ValidateAndApplyPropertyDescriptor on an ordinary (or array) object.
pub(crate) fn define_own_property(
  heap: &mut Heap,
  id: ObjRef,
  key: PropertyKey,
  desc: PropertyDescriptor,
) -> bool {
  // Exotic cases first.
  let mut new_length = None;
  match &heap.object(id).class {
    ObjectClass::Array { length, length_writable } => {
      if key.as_str() == Some("length") {
        if desc.is_accessor()
          || desc.configurable == Some(true)
          || desc.enumerable == Some(true)
        {
          return false;
        }
        let requested = match &desc.value {
          Some(JsValue::Number(n)) => *n as u32,
          Some(_) => return false,
          None => *length,
        };
        if !*length_writable && requested != *length {
          return false;
        }
        return set_array_length(heap, id, requested, desc.writable);
      }
      if let Some(index) = key.as_index() {
        if index as u32 >= *length {
          if !*length_writable {
            return false;
          }
          new_length = Some(index as u32 + 1);
        }
      }
    }
    ObjectClass::Primitive(JsValue::String(s)) => {
      if key.as_str() == Some("length")
        || key.as_index().is_some_and(|i| i < utf16_len(s))
      {
        return false;
      }
    }
    ObjectClass::Uint8Array {
      buffer,
      offset,
      length,
    } => {
      if let Some(index) = key.as_index() {
        if index >= *length || desc.is_accessor() {
          return false;
        }
        if let Some(value) = &desc.value {
          let byte = match value {
            JsValue::Number(n) => {
              crate::engine::conversion::f64_to_uint32(*n) as u8
            }
            _ => return false,
          };
          let (buffer, at) = (*buffer, offset + index);
          if let ObjectClass::ArrayBuffer(store) = &heap.object(buffer).class {
            store.set(at, byte);
          }
        }
        return true;
      }
    }
    _ => {}
  }

  let object = heap.object_mut(id);
  if !object.props.contains_key(&key) {
    if !object.extensible {
      return false;
    }
    let slot = if desc.is_accessor() {
      PropSlot::Accessor {
        get: desc.get.flatten(),
        set: desc.set.flatten(),
      }
    } else {
      PropSlot::Data(desc.value.clone().unwrap_or_default())
    };
    let attrs = Attributes {
      writable: !desc.is_accessor() && desc.writable.unwrap_or(false),
      enumerable: desc.enumerable.unwrap_or(false),
      configurable: desc.configurable.unwrap_or(false),
    };
    object.props.insert(key, Property { slot, attrs });
    if let (Some(length), ObjectClass::Array { length: current, .. }) =
      (new_length, &mut object.class)
    {
      *current = length;
    }
    return true;
  }
  let Some(current) = object.props.get_mut(&key) else {
    return false;
  };

  if !current.attrs.configurable {
    if desc.configurable == Some(true) {
      return false;
    }
    if desc.enumerable.is_some_and(|e| e != current.attrs.enumerable) {
      return false;
    }
    match &current.slot {
      PropSlot::Data(_) | PropSlot::Native(_) if !desc.is_accessor() => {
        if !current.attrs.writable {
          if desc.writable == Some(true) {
            return false;
          }
          if let (Some(new), PropSlot::Data(old)) =
            (&desc.value, &current.slot)
          {
            if !new.same_value(old) {
              return false;
            }
          }
        }
      }
      PropSlot::Accessor { get, set } if desc.is_accessor() => {
        if desc.get.is_some_and(|g| g != *get)
          || desc.set.is_some_and(|s| s != *set)
        {
          return false;
        }
      }
      _ => return false,
    }
  }

  if desc.is_accessor() {
    let (old_get, old_set) = match &current.slot {
      PropSlot::Accessor { get, set } => (*get, *set),
      _ => (None, None),
    };
    current.slot = PropSlot::Accessor {
      get: desc.get.unwrap_or(old_get),
      set: desc.set.unwrap_or(old_set),
    };
    current.attrs.writable = false;
  } else if desc.is_data() {
    if let PropSlot::Accessor { .. } = current.slot {
      current.slot = PropSlot::Data(JsValue::Undefined);
      current.attrs.writable = false;
    }
    // A value replaces a native accessor with plain data.
    if let Some(value) = desc.value {
      current.slot = PropSlot::Data(value);
    }
    if let Some(writable) = desc.writable {
      current.attrs.writable = writable;
    }
  }
  if let Some(enumerable) = desc.enumerable {
    current.attrs.enumerable = enumerable;
  }
  if let Some(configurable) = desc.configurable {
    current.attrs.configurable = configurable;
  }
  true
}

fn set_array_length(
  heap: &mut Heap,
  id: ObjRef,
  length: u32,
  writable: Option<bool>,
) -> bool {
  let object = heap.object_mut(id);
  let doomed: Vec<PropertyKey> = object
    .props
    .keys()
    .filter(|k| k.as_index().is_some_and(|i| i as u32 >= length))
    .cloned()
    .collect();
  let mut final_length = length;
  for key in doomed {
    let configurable = object
      .props
      .get(&key)
      .is_some_and(|p| p.attrs.configurable);
    if configurable {
      object.props.shift_remove(&key);
    } else if let Some(index) = key.as_index() {
      final_length = final_length.max(index as u32 + 1);
    }
  }
  if let ObjectClass::Array {
    length: current,
    length_writable,
  } = &mut object.class
  {
    *current = final_length;
    if let Some(w) = writable {
      *length_writable = w;
    }
  }
  final_length == length
}

/// [[Delete]] on own properties.
pub(crate) fn delete_own_property(
  heap: &mut Heap,
  id: ObjRef,
  key: &PropertyKey,
) -> bool {
  match &heap.object(id).class {
    ObjectClass::Array { .. } if key.as_str() == Some("length") => return false,
    ObjectClass::Primitive(JsValue::String(_)) => {
      if key.as_str() == Some("length") {
        return false;
      }
      if key.as_index().is_some() && get_own_property(heap, id, key).is_some() {
        return false;
      }
    }
    ObjectClass::Uint8Array { length, .. } => {
      if let Some(index) = key.as_index() {
        return index >= *length;
      }
    }
    _ => {}
  }
  let object = heap.object_mut(id);
  match object.props.get(key) {
    None => true,
    Some(prop) if prop.attrs.configurable => {
      object.props.shift_remove(key);
      true
    }
    Some(_) => false,
  }
}

/// The `[[Class]]`-like name used by `Object.prototype.toString` and
/// `get_constructor_name` fallbacks.
pub(crate) fn builtin_tag(object: &JsObject) -> &'static str {
  match &object.class {
    ObjectClass::Array { .. } => "Array",
    ObjectClass::Function(_) => "Function",
    ObjectClass::Error(_) => "Error",
    ObjectClass::Primitive(JsValue::Bool(_)) => "Boolean",
    ObjectClass::Primitive(JsValue::Number(_)) => "Number",
    ObjectClass::Primitive(JsValue::String(_)) => "String",
    ObjectClass::Primitive(JsValue::Symbol(_)) => "Symbol",
    ObjectClass::Primitive(JsValue::BigInt(_)) => "BigInt",
    ObjectClass::Promise(_) => "Promise",
    ObjectClass::ArrayBuffer(_) => "ArrayBuffer",
    ObjectClass::Uint8Array { .. } => "Uint8Array",
    ObjectClass::Arguments => "Arguments",
    ObjectClass::Namespace(_) => "Module",
    _ => "Object",
  }
}

/// Name of a function object as recorded in its own `name` property.
pub(crate) fn function_name(heap: &Heap, id: ObjRef) -> JsStr {
  match heap.object(id).props.get(&PropertyKey::str("name")) {
    Some(Property {
      slot: PropSlot::Data(JsValue::String(s)),
      ..
    }) => s.clone(),
    _ => "".into(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::heap::Cell;

  fn new_object(heap: &mut Heap, class: ObjectClass) -> ObjRef {
    heap.alloc(Cell::Object(JsObject::with_class(None, ContextId(0), class)))
  }

  #[test]
  fn key_order() {
    let mut heap = Heap::new(0, 0);
    let id = new_object(&mut heap, ObjectClass::Ordinary);
    for key in ["b", "2", "a", "0"] {
      define_own_property(
        &mut heap,
        id,
        PropertyKey::str(key),
        PropertyDescriptor::data(JsValue::Null, Attributes::DEFAULT),
      );
    }
    let keys: Vec<String> = own_keys(&heap, id)
      .iter()
      .map(|k| k.to_string())
      .collect();
    assert_eq!(keys, vec!["0", "2", "b", "a"]);
  }

  #[test]
  fn non_configurable_properties_resist_redefinition() {
    let mut heap = Heap::new(0, 0);
    let id = new_object(&mut heap, ObjectClass::Ordinary);
    assert!(define_own_property(
      &mut heap,
      id,
      PropertyKey::str("x"),
      PropertyDescriptor::data(JsValue::Number(1.0), Attributes::FROZEN),
    ));
    assert!(!define_own_property(
      &mut heap,
      id,
      PropertyKey::str("x"),
      PropertyDescriptor::data(JsValue::Number(2.0), Attributes::FROZEN),
    ));
    assert!(define_own_property(
      &mut heap,
      id,
      PropertyKey::str("x"),
      PropertyDescriptor::data(JsValue::Number(1.0), Attributes::FROZEN),
    ));
    assert!(!delete_own_property(&mut heap, id, &PropertyKey::str("x")));
  }

  #[test]
  fn array_length_tracks_indices() {
    let mut heap = Heap::new(0, 0);
    let id = new_object(
      &mut heap,
      ObjectClass::Array {
        length: 0,
        length_writable: true,
      },
    );
    define_own_property(
      &mut heap,
      id,
      PropertyKey::index(4),
      PropertyDescriptor::data(JsValue::Null, Attributes::DEFAULT),
    );
    let length = get_own_property(
      &heap,
      id,
      &PropertyKey::str("length"),
    ).unwrap();
    assert!(matches!(
      length.slot,
      PropSlot::Data(JsValue::Number(n)) if n == 5.0,
    ));
    define_own_property(
      &mut heap,
      id,
      PropertyKey::str("length"),
      PropertyDescriptor {
        value: Some(JsValue::Number(2.0)),
        ..Default::default()
      },
    );
    assert!(get_own_property(&heap, id, &PropertyKey::index(4)).is_none());
  }
}
