// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::heap::Tracer;
use crate::engine::object::Attributes;
use crate::engine::object::FunctionKind;
use crate::engine::object::InternalFields;
use crate::engine::object::NativeAccessor;
use crate::engine::object::PropSlot;
use crate::engine::object::Property;
use crate::engine::ops;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;
use crate::engine::value::PropertyKey;
use crate::engine::ContextId;
use crate::engine::FunctionTemplateId;
use crate::engine::ObjectTemplateId;
use crate::function::new_host_function;
use crate::function::AccessorNameGetterCallback;
use crate::function::AccessorNameSetterCallback;
use crate::function::ConstructorBehavior;
use crate::function::FunctionBuilder;
use crate::function::FunctionCallback;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::property_attribute::PropertyAttribute;
use crate::Data;
use crate::Function;
use crate::FunctionTemplate;
use crate::HandleScope;
use crate::Local;
use crate::Name;
use crate::Object;
use crate::ObjectTemplate;
use crate::String;
use crate::Template;
use crate::Value;

/// What a template property instantiates to.
#[derive(Clone)]
enum TemplateValue {
  Value(JsValue),
  FunctionTemplate(FunctionTemplateId),
  ObjectTemplate(ObjectTemplateId),
}

#[derive(Clone)]
enum TemplateProperty {
  Data {
    key: PropertyKey,
    value: TemplateValue,
    attrs: Attributes,
  },
  Native {
    key: PropertyKey,
    accessor: Rc<NativeAccessor>,
    attrs: Attributes,
  },
  Accessor {
    key: PropertyKey,
    getter: Option<FunctionTemplateId>,
    setter: Option<FunctionTemplateId>,
    attrs: Attributes,
  },
}

impl TemplateProperty {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      TemplateProperty::Data {
        value: TemplateValue::Value(value),
        ..
      } => tracer.visit_value(value),
      TemplateProperty::Native { accessor, .. } => {
        tracer.visit_value(&accessor.data)
      }
      _ => {}
    }
  }
}

/// Engine-side record of a `FunctionTemplate`. Templates live as long as
/// the isolate.
pub(crate) struct FunctionTemplateData {
  callback: Option<FunctionCallback>,
  data: JsValue,
  length: u32,
  constructor_behavior: ConstructorBehavior,
  class_name: Option<JsStr>,
  properties: Vec<TemplateProperty>,
  prototype_template: Option<ObjectTemplateId>,
  instance_template: Option<ObjectTemplateId>,
  parent: Option<FunctionTemplateId>,
  read_only_prototype: bool,
  remove_prototype: bool,
  /// The one function per context.
  functions: HashMap<ContextId, ObjRef>,
}

impl FunctionTemplateData {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    tracer.visit_value(&self.data);
    for property in &self.properties {
      property.trace(tracer);
    }
    for function in self.functions.values() {
      tracer.visit(*function);
    }
  }
}

/// Engine-side record of an `ObjectTemplate`.
#[derive(Default)]
pub(crate) struct ObjectTemplateData {
  constructor: Option<FunctionTemplateId>,
  properties: Vec<TemplateProperty>,
  internal_field_count: usize,
}

impl ObjectTemplateData {
  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    for property in &self.properties {
      property.trace(tracer);
    }
  }
}

fn function_template(
  cx: &Isolate,
  id: FunctionTemplateId,
) -> &FunctionTemplateData {
  &cx.function_templates[id.index()]
}

/// The class name given with `FunctionTemplate::set_class_name`.
pub(crate) fn class_name(cx: &Isolate, id: FunctionTemplateId) -> Option<JsStr> {
  function_template(cx, id).class_name.clone()
}

fn function_template_mut(
  cx: &mut Isolate,
  id: FunctionTemplateId,
) -> &mut FunctionTemplateData {
  &mut cx.function_templates[id.index()]
}

fn object_template(cx: &Isolate, id: ObjectTemplateId) -> &ObjectTemplateData {
  &cx.object_templates[id.index()]
}

fn object_template_mut(
  cx: &mut Isolate,
  id: ObjectTemplateId,
) -> &mut ObjectTemplateData {
  &mut cx.object_templates[id.index()]
}

fn new_object_template(
  cx: &mut Isolate,
  constructor: Option<FunctionTemplateId>,
) -> ObjectTemplateId {
  let id = ObjectTemplateId(cx.object_templates.len() as u32);
  cx.object_templates.push(ObjectTemplateData {
    constructor,
    ..Default::default()
  });
  id
}

fn template_value(cx: &mut Isolate, realm: ContextId, value: &TemplateValue) -> JsValue {
  match value {
    TemplateValue::Value(value) => value.clone(),
    TemplateValue::FunctionTemplate(id) => {
      JsValue::Object(get_function(cx, realm, *id))
    }
    TemplateValue::ObjectTemplate(id) => {
      JsValue::Object(instantiate_object(cx, realm, *id))
    }
  }
}

/// Installs template properties on a fresh object. Nothing here runs
/// script, so instantiation cannot throw.
fn apply_properties(
  cx: &mut Isolate,
  realm: ContextId,
  target: ObjRef,
  properties: &[TemplateProperty],
) {
  for property in properties {
    let (key, prop) = match property {
      TemplateProperty::Data { key, value, attrs } => {
        let value = template_value(cx, realm, value);
        (key.clone(), Property::data(value, *attrs))
      }
      TemplateProperty::Native {
        key,
        accessor,
        attrs,
      } => (
        key.clone(),
        Property {
          slot: PropSlot::Native(accessor.clone()),
          attrs: *attrs,
        },
      ),
      TemplateProperty::Accessor {
        key,
        getter,
        setter,
        attrs,
      } => {
        let get = getter.map(|id| get_function(cx, realm, id));
        let set = setter.map(|id| get_function(cx, realm, id));
        (
          key.clone(),
          Property {
            slot: PropSlot::Accessor { get, set },
            attrs: *attrs,
          },
        )
      }
    };
    cx.vm.heap.object_mut(target).props.insert(key, prop);
  }
}

/// Applies an instance template to `target`: its properties and its
/// internal field count.
fn apply_object_template(
  cx: &mut Isolate,
  realm: ContextId,
  target: ObjRef,
  template: ObjectTemplateId,
) {
  let data = object_template(cx, template);
  let properties = data.properties.clone();
  let count = data.internal_field_count;
  apply_properties(cx, realm, target, &properties);
  let object = cx.vm.heap.object_mut(target);
  if object.internal_fields.len() < count {
    object.internal_fields = InternalFields::new(count);
  }
}

/// The template chain of `template`, outermost ancestor first.
fn lineage(cx: &Isolate, template: FunctionTemplateId) -> Vec<FunctionTemplateId> {
  let mut chain = vec![template];
  let mut current = function_template(cx, template).parent;
  while let Some(parent) = current {
    if chain.contains(&parent) {
      break;
    }
    chain.push(parent);
    current = function_template(cx, parent).parent;
  }
  chain.reverse();
  chain
}

/// Builds an object the way `new F()` would for a template function `F`,
/// without calling the callback.
fn new_templated_object(
  cx: &mut Isolate,
  realm: ContextId,
  template: FunctionTemplateId,
  proto: ObjRef,
) -> ObjRef {
  let object = ops::new_object_with_proto(cx, Some(proto));
  cx.vm.heap.object_mut(object).realm = realm;
  for ancestor in lineage(cx, template) {
    if let Some(instance) = function_template(cx, ancestor).instance_template {
      apply_object_template(cx, realm, object, instance);
    }
  }
  cx.vm.heap.object_mut(object).template = Some(template);
  object
}

/// The receiver for `new` on a host function.
pub(crate) fn construct_receiver(
  cx: &mut Isolate,
  function: ObjRef,
  proto: ObjRef,
) -> ObjRef {
  let object = cx.vm.heap.object(function);
  let realm = object.realm;
  let template = match object.function_data().map(|d| &d.kind) {
    Some(FunctionKind::Host { template, .. }) => *template,
    _ => None,
  };
  match template {
    Some(template) => new_templated_object(cx, realm, template, proto),
    None => {
      let object = ops::new_object_with_proto(cx, Some(proto));
      cx.vm.heap.object_mut(object).realm = realm;
      object
    }
  }
}

/// Creates an object from an object template in `realm`.
pub(crate) fn instantiate_object(
  cx: &mut Isolate,
  realm: ContextId,
  template: ObjectTemplateId,
) -> ObjRef {
  match object_template(cx, template).constructor {
    Some(constructor) => {
      let function = get_function(cx, realm, constructor);
      let proto = match cx.vm.heap.object(function).props.get(&PropertyKey::str("prototype")) {
        Some(Property {
          slot: PropSlot::Data(JsValue::Object(proto)),
          ..
        }) => *proto,
        _ => cx.vm.realm(realm).intrinsics.object_prototype,
      };
      let object = new_templated_object(cx, realm, constructor, proto);
      // The constructor's instance template may be a different record than
      // this one.
      if function_template(cx, constructor).instance_template != Some(template) {
        apply_object_template(cx, realm, object, template);
      }
      object
    }
    None => {
      let proto = cx.vm.realm(realm).intrinsics.object_prototype;
      let object = ops::new_object_with_proto(cx, Some(proto));
      cx.vm.heap.object_mut(object).realm = realm;
      apply_object_template(cx, realm, object, template);
      object
    }
  }
}

/// Returns the unique function of `template` in `realm`, creating it on
/// first use.
pub(crate) fn get_function(
  cx: &mut Isolate,
  realm: ContextId,
  template: FunctionTemplateId,
) -> ObjRef {
  if let Some(function) = function_template(cx, template).functions.get(&realm) {
    return *function;
  }
  let data = function_template(cx, template);
  let kind = FunctionKind::Host {
    callback: data.callback,
    data: data.data.clone(),
    template: Some(template),
  };
  let name = data.class_name.clone().unwrap_or_else(|| "".into());
  let length = data.length;
  let remove_prototype = data.remove_prototype;
  let is_constructor = data.constructor_behavior == ConstructorBehavior::Allow
    && !remove_prototype;
  let read_only_prototype = data.read_only_prototype;
  let prototype_template = data.prototype_template;
  let parent = data.parent;
  let properties = data.properties.clone();

  let function =
    new_host_function(cx, realm, &name, length, kind, is_constructor);
  function_template_mut(cx, template)
    .functions
    .insert(realm, function);

  if is_constructor {
    let key = PropertyKey::str("prototype");
    let prototype = match cx.vm.heap.object(function).props.get(&key) {
      Some(Property {
        slot: PropSlot::Data(JsValue::Object(proto)),
        ..
      }) => *proto,
      _ => unreachable!("constructor without a prototype"),
    };
    if let Some(prototype_template) = prototype_template {
      apply_object_template(cx, realm, prototype, prototype_template);
    }
    if let Some(parent) = parent {
      let parent_function = get_function(cx, realm, parent);
      if let Some(Property {
        slot: PropSlot::Data(JsValue::Object(parent_proto)),
        ..
      }) = cx.vm.heap.object(parent_function).props.get(&key).cloned()
      {
        cx.vm.heap.object_mut(prototype).proto = Some(parent_proto);
      }
    }
    if read_only_prototype {
      if let Some(prop) = cx.vm.heap.object_mut(function).props.get_mut(&key) {
        prop.attrs.writable = false;
      }
    }
  }
  apply_properties(cx, realm, function, &properties);
  function
}

/// Whether `value` was created by `template` or a template inheriting
/// from it.
pub(crate) fn has_instance(
  cx: &Isolate,
  template: FunctionTemplateId,
  value: &JsValue,
) -> bool {
  let Some(id) = value.as_object() else {
    return false;
  };
  let mut current = cx.vm.heap.object(id).template;
  let mut steps = 0;
  while let Some(t) = current {
    if t == template {
      return true;
    }
    steps += 1;
    if steps > cx.function_templates.len() {
      break;
    }
    current = function_template(cx, t).parent;
  }
  false
}

/// Accessor callbacks and their options for `ObjectTemplate` and
/// `Object::set_accessor_with_configuration`.
#[derive(Clone, Copy)]
pub struct AccessorConfiguration<'s> {
  pub(crate) getter: AccessorNameGetterCallback,
  pub(crate) setter: Option<AccessorNameSetterCallback>,
  pub(crate) data: Option<Local<'s, Value>>,
  pub(crate) property_attribute: PropertyAttribute,
}

impl<'s> AccessorConfiguration<'s> {
  pub fn new(getter: AccessorNameGetterCallback) -> Self {
    Self {
      getter,
      setter: None,
      data: None,
      property_attribute: PropertyAttribute::NONE,
    }
  }

  pub fn setter(mut self, setter: AccessorNameSetterCallback) -> Self {
    self.setter = Some(setter);
    self
  }

  pub fn property_attribute(mut self, attr: PropertyAttribute) -> Self {
    self.property_attribute = attr;
    self
  }

  /// Set the associated data. The default is no associated data.
  pub fn data(mut self, data: Local<'s, Value>) -> Self {
    self.data = Some(data);
    self
  }

  pub(crate) fn native_accessor(&self) -> Rc<NativeAccessor> {
    Rc::new(NativeAccessor {
      getter: self.getter,
      setter: self.setter,
      data: self.data.map(|d| d.js_value()).unwrap_or_default(),
    })
  }
}

pub(crate) fn name_key(name: &Name) -> PropertyKey {
  match name.js_value() {
    JsValue::String(s) => PropertyKey::String(s),
    JsValue::Symbol(s) => PropertyKey::Symbol(s),
    _ => unreachable!("a Name is a string or a symbol"),
  }
}

impl Template {
  fn properties_mut<'a>(
    &self,
    isolate: &'a mut Isolate,
  ) -> &'a mut Vec<TemplateProperty> {
    match self.handled() {
      Handled::FunctionTemplate(id) => {
        &mut function_template_mut(isolate, id).properties
      }
      Handled::ObjectTemplate(id) => {
        &mut object_template_mut(isolate, id).properties
      }
      _ => unreachable!("not a template"),
    }
  }

  fn push_property(&self, property: TemplateProperty) {
    let isolate = self.host_isolate();
    self.properties_mut(isolate).push(property);
  }

  /// Adds a property to each instance created by this template.
  pub fn set(&self, key: Local<Name>, value: Local<Data>) {
    self.set_with_attr(key, value, PropertyAttribute::NONE)
  }

  /// Adds a property to each instance created by this template with
  /// the specified property attributes.
  ///
  /// The value may be a JavaScript value or another template, which is
  /// instantiated along with the instance.
  pub fn set_with_attr(
    &self,
    key: Local<Name>,
    value: Local<Data>,
    attr: PropertyAttribute,
  ) {
    let value = match value.handled() {
      Handled::Value(value) => TemplateValue::Value(value),
      Handled::FunctionTemplate(id) => TemplateValue::FunctionTemplate(id),
      Handled::ObjectTemplate(id) => TemplateValue::ObjectTemplate(id),
      _ => panic!("template properties must be values or templates"),
    };
    self.push_property(TemplateProperty::Data {
      key: name_key(&key),
      value,
      attrs: attr.to_attributes(),
    });
  }

  /// Sets an [accessor property](https://tc39.es/ecma262/#sec-property-attributes)
  /// on the object template.
  ///
  /// # Panics
  ///
  /// Panics if both `getter` and `setter` are `None`.
  pub fn set_accessor_property(
    &self,
    key: Local<Name>,
    getter: Option<Local<FunctionTemplate>>,
    setter: Option<Local<FunctionTemplate>>,
    attr: PropertyAttribute,
  ) {
    assert!(getter.is_some() || setter.is_some());
    let mut attrs = attr.to_attributes();
    attrs.writable = false;
    self.push_property(TemplateProperty::Accessor {
      key: name_key(&key),
      getter: getter.map(|t| t.id()),
      setter: setter.map(|t| t.id()),
      attrs,
    });
  }
}

impl<'s> FunctionBuilder<'s, FunctionTemplate> {
  /// Creates the function template.
  pub fn build(
    self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, FunctionTemplate> {
    let data = FunctionTemplateData {
      callback: self.callback,
      data: self.data_value(),
      length: self.length_u32(),
      constructor_behavior: self.constructor_behavior,
      class_name: None,
      properties: Vec::new(),
      prototype_template: None,
      instance_template: None,
      parent: None,
      read_only_prototype: false,
      remove_prototype: false,
      functions: HashMap::new(),
    };
    let isolate: &mut Isolate = scope.as_mut();
    let id = FunctionTemplateId(isolate.function_templates.len() as u32);
    isolate.function_templates.push(data);
    scope.new_local(Handled::FunctionTemplate(id))
  }
}

impl FunctionTemplate {
  pub(crate) fn id(&self) -> FunctionTemplateId {
    match self.handled() {
      Handled::FunctionTemplate(id) => id,
      _ => unreachable!("not a function template"),
    }
  }

  fn with_data<R>(&self, f: impl FnOnce(&mut FunctionTemplateData) -> R) -> R {
    let id = self.id();
    f(function_template_mut(self.host_isolate(), id))
  }

  /// Create a FunctionBuilder to configure a FunctionTemplate.
  /// This is the same as FunctionBuilder::<FunctionTemplate>::new().
  pub fn builder<'s>(
    callback: FunctionCallback,
  ) -> FunctionBuilder<'s, Self> {
    FunctionBuilder::new(callback)
  }

  /// Creates a function template.
  pub fn new<'s>(
    scope: &mut HandleScope<'s, ()>,
    callback: FunctionCallback,
  ) -> Local<'s, FunctionTemplate> {
    Self::builder(callback).build(scope)
  }

  /// Set the call-handler callback for a FunctionTemplate. This
  /// callback is called whenever the function created from this
  /// FunctionTemplate is called. Functions that were already created keep
  /// the handler they were created with.
  pub fn set_call_handler(&self, callback: FunctionCallback) {
    self.with_data(|data| data.callback = Some(callback));
  }

  /// Returns the unique function instance in the current execution context.
  pub fn get_function<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Function>> {
    let realm = scope.context_id();
    let id = self.id();
    let isolate: &mut Isolate = scope.as_mut();
    let function = get_function(isolate, realm, id);
    Some(scope.new_object_local(function))
  }

  /// Set the class name of the FunctionTemplate. This is used for
  /// printing objects created with the function created from the
  /// FunctionTemplate as its constructor.
  pub fn set_class_name(&self, name: Local<String>) {
    let name = match name.js_value() {
      JsValue::String(s) => s,
      _ => unreachable!("a String handle holds a string"),
    };
    self.with_data(|data| data.class_name = Some(name));
  }

  /// Returns the ObjectTemplate that is used by this
  /// FunctionTemplate as a PrototypeTemplate
  pub fn prototype_template<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, ObjectTemplate> {
    let id = self.id();
    let isolate: &mut Isolate = scope.as_mut();
    let template = match function_template(isolate, id).prototype_template {
      Some(template) => template,
      None => {
        let template = new_object_template(isolate, None);
        function_template_mut(isolate, id).prototype_template = Some(template);
        template
      }
    };
    scope.new_local(Handled::ObjectTemplate(template))
  }

  /// Returns the object template that is used for instances created when this function
  /// template is called as a constructor.
  pub fn instance_template<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, ObjectTemplate> {
    let id = self.id();
    let isolate: &mut Isolate = scope.as_mut();
    let template = match function_template(isolate, id).instance_template {
      Some(template) => template,
      None => {
        let template = new_object_template(isolate, Some(id));
        function_template_mut(isolate, id).instance_template = Some(template);
        template
      }
    };
    scope.new_local(Handled::ObjectTemplate(template))
  }

  /// Causes the function template to inherit from a parent function template.
  /// This means the function's prototype.__proto__ is set to the parent function's prototype.
  pub fn inherit(&self, parent: Local<FunctionTemplate>) {
    let parent = parent.id();
    assert!(parent != self.id(), "a template cannot inherit from itself");
    self.with_data(|data| data.parent = Some(parent));
  }

  /// Sets the ReadOnly flag in the attributes of the 'prototype' property
  /// of functions created from this FunctionTemplate to true.
  pub fn read_only_prototype(&self) {
    self.with_data(|data| data.read_only_prototype = true);
  }

  /// Removes the prototype property from functions created from this FunctionTemplate.
  pub fn remove_prototype(&self) {
    self.with_data(|data| data.remove_prototype = true);
  }

  /// Returns true if the given object is an instance of this function
  /// template.
  pub fn has_instance(&self, object: Local<Value>) -> bool {
    let value = object.js_value();
    has_instance(self.host_isolate(), self.id(), &value)
  }
}

impl ObjectTemplate {
  pub(crate) fn id(&self) -> ObjectTemplateId {
    match self.handled() {
      Handled::ObjectTemplate(id) => id,
      _ => unreachable!("not an object template"),
    }
  }

  /// Creates an object template.
  pub fn new<'s>(scope: &mut HandleScope<'s, ()>) -> Local<'s, ObjectTemplate> {
    let isolate: &mut Isolate = scope.as_mut();
    let id = new_object_template(isolate, None);
    scope.new_local(Handled::ObjectTemplate(id))
  }

  /// Creates an object template from a function template.
  pub fn new_from_template<'s>(
    scope: &mut HandleScope<'s, ()>,
    templ: Local<FunctionTemplate>,
  ) -> Local<'s, ObjectTemplate> {
    let constructor = templ.id();
    let isolate: &mut Isolate = scope.as_mut();
    let id = new_object_template(isolate, Some(constructor));
    scope.new_local(Handled::ObjectTemplate(id))
  }

  /// Creates a new instance of this object template.
  pub fn new_instance<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Object>> {
    let realm = scope.context_id();
    let id = self.id();
    let isolate: &mut Isolate = scope.as_mut();
    let object = instantiate_object(isolate, realm, id);
    Some(scope.new_object_local(object))
  }

  /// Gets the number of internal fields for objects generated from
  /// this template.
  pub fn internal_field_count(&self) -> usize {
    object_template(self.host_isolate(), self.id()).internal_field_count
  }

  /// Sets the number of internal fields for objects generated from
  /// this template.
  pub fn set_internal_field_count(&self, value: usize) -> bool {
    // Counts that would not fit a signed 32-bit integer are refused.
    if i32::try_from(value).is_err() {
      return false;
    }
    let id = self.id();
    object_template_mut(self.host_isolate(), id).internal_field_count = value;
    true
  }

  pub fn set_accessor(
    &self,
    key: Local<Name>,
    getter: AccessorNameGetterCallback,
  ) {
    self.set_accessor_with_configuration(key, AccessorConfiguration::new(getter))
  }

  pub fn set_accessor_with_setter(
    &self,
    key: Local<Name>,
    getter: AccessorNameGetterCallback,
    setter: AccessorNameSetterCallback,
  ) {
    self.set_accessor_with_configuration(
      key,
      AccessorConfiguration::new(getter).setter(setter),
    )
  }

  pub fn set_accessor_with_configuration(
    &self,
    key: Local<Name>,
    configuration: AccessorConfiguration,
  ) {
    self.push_property(TemplateProperty::Native {
      key: name_key(&key),
      accessor: configuration.native_accessor(),
      attrs: configuration.property_attribute.to_attributes(),
    });
  }
}
