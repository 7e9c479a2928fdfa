// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::collections::HashSet;
use std::ffi::c_void;
use std::num::NonZeroI32;

use crate::engine::object;
use crate::engine::object::InternalField;
use crate::engine::object::JsObject;
use crate::engine::object::ObjectClass;
use crate::engine::object::PropSlot;
use crate::engine::object::Property;
use crate::engine::object::PropertyDescriptor;
use crate::engine::ops;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::engine::JsResult;
use crate::function::AccessorNameGetterCallback;
use crate::function::AccessorNameSetterCallback;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::property_attribute::PropertyAttribute;
use crate::template;
use crate::template::name_key;
use crate::AccessorConfiguration;
use crate::Array;
use crate::Context;
use crate::Data;
use crate::HandleScope;
use crate::Local;
use crate::Name;
use crate::Object;
use crate::String;
use crate::Value;

/// Returns the identity hash of `id`, assigning one on first use.
pub(crate) fn identity_hash(isolate: &mut Isolate, id: ObjRef) -> NonZeroI32 {
  let mut hash = isolate.vm.heap.object(id).hash;
  if hash == 0 {
    hash = isolate.vm.new_identity_hash();
    isolate.vm.heap.object_mut(id).hash = hash;
  }
  match NonZeroI32::new(hash) {
    Some(hash) => hash,
    None => unreachable!("identity hashes are never zero"),
  }
}

/// Keys as `get_own_property_names` reports them: array indices become
/// numbers.
fn key_to_name(key: &PropertyKey) -> JsValue {
  match key.as_index() {
    Some(index) => JsValue::Number(index as f64),
    None => key.to_value(),
  }
}

fn constructor_name(cx: &Isolate, id: ObjRef) -> JsStr {
  let heap = &cx.vm.heap;
  if let Some(name) = heap
    .object(id)
    .template
    .and_then(|t| template::class_name(cx, t))
  {
    return name;
  }
  let constructor = PropertyKey::str("constructor");
  let mut current = Some(id);
  while let Some(holder) = current {
    let object = heap.object(holder);
    if let Some(Property {
      slot: PropSlot::Data(JsValue::Object(function)),
      ..
    }) = object.props.get(&constructor)
    {
      if heap.object(*function).is_callable() {
        let name = object::function_name(heap, *function);
        if !name.is_empty() {
          return name;
        }
      }
    }
    current = object.proto;
  }
  object::builtin_tag(heap.object(id)).into()
}

impl Object {
  /// Creates an empty object.
  pub fn new<'s>(scope: &mut HandleScope<'s>) -> Local<'s, Object> {
    let realm = scope.context_id();
    let isolate: &mut Isolate = scope.as_mut();
    let proto = isolate.vm.realm(realm).intrinsics.object_prototype;
    let id = ops::alloc(isolate, JsObject::ordinary(Some(proto), realm));
    scope.new_object_local(id)
  }

  /// Creates a JavaScript object with the given properties, and
  /// a the given prototype_or_null (which can be any JavaScript
  /// value, and if it's null, the newly created object won't have
  /// a prototype at all). This is similar to Object.create().
  /// All properties will be created as enumerable, configurable
  /// and writable properties.
  pub fn with_prototype_and_properties<'s>(
    scope: &mut HandleScope<'s>,
    prototype_or_null: Local<Value>,
    names: &[Local<Name>],
    values: &[Local<Value>],
  ) -> Local<'s, Object> {
    assert_eq!(names.len(), values.len());
    let proto = prototype_or_null.js_value().as_object();
    let realm = scope.context_id();
    let mut object = JsObject::ordinary(proto, realm);
    for (name, value) in names.iter().zip(values) {
      object.insert(
        name_key(name),
        value.js_value(),
        object::Attributes::DEFAULT,
      );
    }
    let isolate: &mut Isolate = scope.as_mut();
    let id = ops::alloc(isolate, object);
    scope.new_object_local(id)
  }

  fn run<'s, T>(
    &self,
    scope: &mut HandleScope<'s>,
    f: impl FnOnce(&mut Isolate, ObjRef) -> JsResult<T>,
  ) -> Option<T> {
    let id = self.obj();
    scope.run_js(|cx, _| f(cx, id))
  }

  /// Returns `Some(false)` when the assignment was rejected, e.g. because
  /// the property is read-only, and `None` when a setter threw.
  pub fn set(
    &self,
    scope: &mut HandleScope,
    key: Local<Value>,
    value: Local<Value>,
  ) -> Option<bool> {
    let key = key.js_value();
    let value = value.js_value();
    self.run(scope, |cx, id| {
      let key = ops::to_property_key(cx, &key)?;
      ops::set(cx, id, key, value, JsValue::Object(id))
    })
  }

  pub fn set_index(
    &self,
    scope: &mut HandleScope,
    index: u32,
    value: Local<Value>,
  ) -> Option<bool> {
    let value = value.js_value();
    self.run(scope, |cx, id| {
      ops::set(
        cx,
        id,
        PropertyKey::index(index as usize),
        value,
        JsValue::Object(id),
      )
    })
  }

  /// Set the prototype object. This does not skip objects marked to be
  /// skipped by proto and it does not consult the security handler.
  pub fn set_prototype(
    &self,
    scope: &mut HandleScope,
    prototype: Local<Value>,
  ) -> Option<bool> {
    let proto = match prototype.js_value() {
      JsValue::Object(proto) => Some(proto),
      JsValue::Null => None,
      _ => return Some(false),
    };
    self.run(scope, |cx, id| Ok(ops::set_prototype_of(cx, id, proto)))
  }

  /// Implements CreateDataProperty (ECMA-262, 7.3.4).
  ///
  /// Defines a configurable, writable, enumerable property with the given
  /// value on the object unless the property already exists and is not
  /// configurable or the object is not extensible.
  ///
  /// Returns true on success.
  pub fn create_data_property(
    &self,
    scope: &mut HandleScope,
    key: Local<Name>,
    value: Local<Value>,
  ) -> Option<bool> {
    let key = name_key(&key);
    let value = value.js_value();
    self.run(scope, |cx, id| ops::create_data_property(cx, id, key, value))
  }

  /// Implements DefineOwnProperty.
  ///
  /// In general, CreateDataProperty will be faster, however, does not allow
  /// for specifying attributes.
  ///
  /// Returns true on success.
  pub fn define_own_property(
    &self,
    scope: &mut HandleScope,
    key: Local<Name>,
    value: Local<Value>,
    attr: PropertyAttribute,
  ) -> Option<bool> {
    let key = name_key(&key);
    let desc = PropertyDescriptor::data(value.js_value(), attr.to_attributes());
    self.run(scope, |cx, id| ops::define_property(cx, id, key, desc))
  }

  pub fn get<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    key: Local<Value>,
  ) -> Option<Local<'s, Value>> {
    let key = key.js_value();
    let value = self.run(scope, |cx, id| {
      let key = ops::to_property_key(cx, &key)?;
      ops::get(cx, id, &key)
    })?;
    Some(scope.value_local(value))
  }

  pub fn get_index<'s>(
    &self,
    scope: &mut HandleScope<'s>,
    index: u32,
  ) -> Option<Local<'s, Value>> {
    let value = self.run(scope, |cx, id| {
      ops::get(cx, id, &PropertyKey::index(index as usize))
    })?;
    Some(scope.value_local(value))
  }

  /// Get the prototype object. This does not skip objects marked to be
  /// skipped by proto and it does not consult the security handler.
  pub fn get_prototype<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Value>> {
    let isolate: &Isolate = scope.as_ref();
    let proto = match ops::get_prototype_of(isolate, self.obj()) {
      Some(proto) => JsValue::Object(proto),
      None => JsValue::Null,
    };
    Some(scope.value_local(proto))
  }

  /// Returns true if the object or its prototype chain has the property.
  pub fn has(
    &self,
    scope: &mut HandleScope,
    key: Local<Value>,
  ) -> Option<bool> {
    let key = key.js_value();
    self.run(scope, |cx, id| {
      let key = ops::to_property_key(cx, &key)?;
      ops::has_property(cx, id, &key)
    })
  }

  pub fn has_index(&self, scope: &mut HandleScope, index: u32) -> Option<bool> {
    self.run(scope, |cx, id| {
      ops::has_property(cx, id, &PropertyKey::index(index as usize))
    })
  }

  /// HasOwnProperty() is like JavaScript's
  /// Object.prototype.hasOwnProperty().
  pub fn has_own_property(
    &self,
    scope: &mut HandleScope,
    key: Local<Name>,
  ) -> Option<bool> {
    let key = name_key(&key);
    self.run(scope, |cx, id| ops::has_own_property(cx, id, &key))
  }

  /// Returns false for properties that are not configurable.
  pub fn delete(
    &self,
    scope: &mut HandleScope,
    key: Local<Value>,
  ) -> Option<bool> {
    let key = key.js_value();
    self.run(scope, |cx, id| {
      let key = ops::to_property_key(cx, &key)?;
      ops::delete_property(cx, id, &key)
    })
  }

  pub fn delete_index(
    &self,
    scope: &mut HandleScope,
    index: u32,
  ) -> Option<bool> {
    self.run(scope, |cx, id| {
      ops::delete_property(cx, id, &PropertyKey::index(index as usize))
    })
  }

  /// Note: SideEffectType affects the getter only, not the setter.
  pub fn set_accessor(
    &self,
    scope: &mut HandleScope,
    name: Local<Name>,
    getter: AccessorNameGetterCallback,
  ) -> Option<bool> {
    self.set_accessor_with_configuration(
      scope,
      name,
      AccessorConfiguration::new(getter),
    )
  }

  pub fn set_accessor_with_setter(
    &self,
    scope: &mut HandleScope,
    name: Local<Name>,
    getter: AccessorNameGetterCallback,
    setter: AccessorNameSetterCallback,
  ) -> Option<bool> {
    self.set_accessor_with_configuration(
      scope,
      name,
      AccessorConfiguration::new(getter).setter(setter),
    )
  }

  /// Installs a native accessor as an own property. Fails if a
  /// non-configurable property is in the way or the object is not
  /// extensible.
  pub fn set_accessor_with_configuration(
    &self,
    scope: &mut HandleScope,
    name: Local<Name>,
    configuration: AccessorConfiguration,
  ) -> Option<bool> {
    let key = name_key(&name);
    let property = Property {
      slot: PropSlot::Native(configuration.native_accessor()),
      attrs: configuration.property_attribute.to_attributes(),
    };
    self.run(scope, |cx, id| {
      let existing = ops::own_property(cx, id, &key)?;
      let object = cx.vm.heap.object_mut(id);
      let allowed = match existing {
        Some(existing) => existing.attrs.configurable,
        None => object.extensible,
      };
      if !allowed || matches!(object.class, ObjectClass::Namespace(_)) {
        return Ok(false);
      }
      object.props.insert(key, property);
      Ok(true)
    })
  }

  /// Returns the identity hash for this object. The current implementation
  /// uses a hidden property to store the identity hash.
  ///
  /// The return value will never be 0. Also, it is not guaranteed to be
  /// unique.
  pub fn get_identity_hash(&self) -> NonZeroI32 {
    identity_hash(self.host_isolate(), self.obj())
  }

  /// Returns the context in which the object was created.
  pub fn get_creation_context<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Option<Local<'s, Context>> {
    let isolate: &Isolate = scope.as_ref();
    let realm = isolate.vm.heap.object(self.obj()).realm;
    Some(scope.new_local(Handled::Context(realm)))
  }

  /// This function has the same functionality as GetPropertyNames but the
  /// returned array doesn't contain the names of properties from prototype
  /// objects.
  pub fn get_own_property_names<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Array>> {
    let array = self.run(scope, |cx, id| {
      let keys =
        crate::engine::builtins::object::enumerable_own_keys(cx, id)?;
      let names = keys.iter().map(key_to_name).collect();
      Ok(ops::new_array(cx, names))
    })?;
    Some(scope.new_object_local(array))
  }

  /// Returns an array containing the names of the enumerable properties
  /// of this object, including properties from prototype objects. The
  /// array returned by this method contains the same values as would
  /// be enumerated by a for-in statement over this object.
  pub fn get_property_names<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Array>> {
    let array = self.run(scope, |cx, id| {
      let mut seen = HashSet::new();
      let mut names = Vec::new();
      let mut current = Some(id);
      while let Some(holder) = current {
        for key in ops::own_property_keys(cx, holder) {
          if matches!(key, PropertyKey::Symbol(_)) || !seen.insert(key.clone())
          {
            continue;
          }
          if ops::own_property(cx, holder, &key)?
            .is_some_and(|p| p.attrs.enumerable)
          {
            names.push(key_to_name(&key));
          }
        }
        current = ops::get_prototype_of(cx, holder);
      }
      Ok(ops::new_array(cx, names))
    })?;
    Some(scope.new_object_local(array))
  }

  /// Returns the name of the function invoked as a constructor for this
  /// object.
  pub fn get_constructor_name<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, String> {
    let isolate: &Isolate = scope.as_ref();
    let name = constructor_name(isolate, self.obj());
    scope.value_local(JsValue::String(name))
  }

  /// Gets the number of internal fields for this Object.
  pub fn internal_field_count(&self) -> usize {
    let isolate = self.host_isolate();
    isolate.vm.heap.object(self.obj()).internal_fields.len()
  }

  /// Gets the value from an internal field. Fields holding an aligned
  /// pointer, and indices past the end, read as `None`.
  pub fn get_internal_field<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
    index: usize,
  ) -> Option<Local<'s, Data>> {
    let isolate: &Isolate = scope.as_ref();
    let fields = &isolate.vm.heap.object(self.obj()).internal_fields;
    let value = match fields.kinds.get(index)? {
      InternalField::Value => fields.values[index].clone(),
      InternalField::Pointer(_) => return None,
    };
    Some(scope.value_local(value))
  }

  /// Sets the value in an internal field. Returns false when the index
  /// does not exist.
  pub fn set_internal_field(&self, index: usize, value: Local<Data>) -> bool {
    let value = value.js_value();
    let isolate = self.host_isolate();
    let fields = &mut isolate.vm.heap.object_mut(self.obj()).internal_fields;
    if index >= fields.len() {
      return false;
    }
    fields.values[index] = value;
    fields.kinds[index] = InternalField::Value;
    true
  }

  /// Gets a 2-byte-aligned native pointer from an internal field. Fields
  /// holding a value read as null.
  ///
  /// # Safety
  /// This field must have been set by SetAlignedPointerInInternalField,
  /// everything else leads to undefined behavior.
  pub unsafe fn get_aligned_pointer_from_internal_field(
    &self,
    index: usize,
  ) -> *mut c_void {
    let isolate = self.host_isolate();
    let fields = &isolate.vm.heap.object(self.obj()).internal_fields;
    assert!(index < fields.len(), "internal field index out of bounds");
    match fields.kinds[index] {
      InternalField::Pointer(pointer) => pointer,
      InternalField::Value => std::ptr::null_mut(),
    }
  }

  /// Sets a 2-byte-aligned native pointer in an internal field.
  pub fn set_aligned_pointer_in_internal_field(
    &self,
    index: usize,
    value: *const c_void,
  ) {
    let isolate = self.host_isolate();
    let fields = &mut isolate.vm.heap.object_mut(self.obj()).internal_fields;
    assert!(index < fields.len(), "internal field index out of bounds");
    assert_eq!(
      value as usize & 1,
      0,
      "internal field pointers must be 2-byte aligned"
    );
    fields.values[index] = JsValue::Undefined;
    fields.kinds[index] = InternalField::Pointer(value as *mut c_void);
  }
}

impl Array {
  /// Creates a JavaScript array with the given length. If the length
  /// is negative the returned array will have length 0.
  pub fn new<'s>(scope: &mut HandleScope<'s>, length: i32) -> Local<'s, Array> {
    let realm = scope.context_id();
    let isolate: &mut Isolate = scope.as_mut();
    let proto = isolate.vm.realm(realm).intrinsics.array_prototype;
    let class = ObjectClass::Array {
      length: length.max(0) as u32,
      length_writable: true,
    };
    let id = ops::alloc(isolate, JsObject::with_class(Some(proto), realm, class));
    scope.new_object_local(id)
  }

  /// Creates a JavaScript array out of a Local<Value> array with a known
  /// length.
  pub fn new_with_elements<'s>(
    scope: &mut HandleScope<'s>,
    elements: &[Local<Value>],
  ) -> Local<'s, Array> {
    let values: Vec<JsValue> = elements.iter().map(|e| e.js_value()).collect();
    let realm = scope.context_id();
    let isolate: &mut Isolate = scope.as_mut();
    let proto = isolate.vm.realm(realm).intrinsics.array_prototype;
    let class = ObjectClass::Array {
      length: values.len() as u32,
      length_writable: true,
    };
    let mut array = JsObject::with_class(Some(proto), realm, class);
    for (index, value) in values.into_iter().enumerate() {
      array.insert(
        PropertyKey::index(index),
        value,
        object::Attributes::DEFAULT,
      );
    }
    let id = ops::alloc(isolate, array);
    scope.new_object_local(id)
  }

  pub fn length(&self) -> u32 {
    let isolate = self.host_isolate();
    match isolate.vm.heap.object(self.obj()).class {
      ObjectClass::Array { length, .. } => length,
      _ => unreachable!("not an array"),
    }
  }
}
