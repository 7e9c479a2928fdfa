// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::any::TypeId;

use crate::engine::realm::create_realm;
use crate::engine::value::JsValue;
use crate::engine::ContextId;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::template::instantiate_object;
use crate::Context;
use crate::HandleScope;
use crate::Local;
use crate::Object;
use crate::ObjectTemplate;
use crate::Value;

/// Options for `Context::new_with_options`.
#[derive(Default)]
pub struct ContextOptions<'s> {
  /// An optional object template from which the global object for the
  /// newly created context will be created.
  pub global_template: Option<Local<'s, ObjectTemplate>>,
  /// An optional object that becomes the global object of the new
  /// context in place of a fresh one.
  pub global_object: Option<Local<'s, Object>>,
}

impl Context {
  pub(crate) fn id(&self) -> ContextId {
    match self.handled() {
      Handled::Context(id) => id,
      _ => unreachable!("not a context"),
    }
  }

  /// Creates a new context.
  pub fn new<'s>(scope: &mut HandleScope<'s, ()>) -> Local<'s, Context> {
    Self::new_with_options(scope, Default::default())
  }

  /// Creates a new context whose global object is an instance of
  /// `templ`.
  pub fn new_from_template<'s>(
    scope: &mut HandleScope<'s, ()>,
    templ: Local<ObjectTemplate>,
  ) -> Local<'s, Context> {
    Self::new_with_options(
      scope,
      ContextOptions {
        global_template: Some(templ),
        global_object: None,
      },
    )
  }

  pub fn new_with_options<'s>(
    scope: &mut HandleScope<'s, ()>,
    options: ContextOptions,
  ) -> Local<'s, Context> {
    let template = options.global_template.map(|t| t.id());
    let global = options.global_object.map(|o| o.obj());
    let isolate: &mut Isolate = scope.as_mut();
    let realm = create_realm(isolate, |cx, realm, placeholder| {
      match (global, template) {
        (Some(global), _) => global,
        (None, Some(template)) => instantiate_object(cx, realm, template),
        (None, None) => placeholder,
      }
    });
    scope.new_local(Handled::Context(realm))
  }

  /// Returns the global proxy object.
  ///
  /// The global object is the `globalThis` of script running in this
  /// context and the holder of the built-ins.
  pub fn global<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Object> {
    let isolate: &Isolate = scope.as_ref();
    let global = isolate.vm.realm(self.id()).global_object;
    scope.new_object_local(global)
  }

  /// Gets the embedder data with the given index, which must have been set
  /// by a previous call to `set_embedder_data` with the same index. Indices
  /// that were never set read as `undefined`; a negative index gives `None`.
  pub fn get_embedder_data<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
    slot: i32,
  ) -> Option<Local<'s, Value>> {
    let index = usize::try_from(slot).ok()?;
    let isolate: &Isolate = scope.as_ref();
    let value = isolate
      .vm
      .realm(self.id())
      .embedder_data
      .get(index)
      .cloned()
      .unwrap_or_default();
    Some(scope.value_local(value))
  }

  /// Sets the embedder data with the given index, growing the data as
  /// needed.
  ///
  /// # Panics
  ///
  /// Panics if `slot` is negative.
  pub fn set_embedder_data(&self, slot: i32, data: Local<Value>) {
    let index = match usize::try_from(slot) {
      Ok(index) => index,
      Err(_) => panic!("embedder data index must not be negative"),
    };
    let value = data.js_value();
    let embedder_data =
      &mut self.host_isolate().vm.realm_mut(self.id()).embedder_data;
    if embedder_data.len() <= index {
      embedder_data.resize(index + 1, JsValue::Undefined);
    }
    embedder_data[index] = value;
  }

  /// Get a reference to embedder data added with [`Self::set_slot()`].
  pub fn get_slot<'a, T: 'static>(
    &self,
    isolate: &'a Isolate,
  ) -> Option<&'a T> {
    isolate
      .vm
      .realm(self.id())
      .slots
      .get(&TypeId::of::<T>())
      .and_then(|slot| slot.downcast_ref::<T>())
  }

  /// Get a mutable reference to embedder data added with [`Self::set_slot()`].
  pub fn get_slot_mut<'a, T: 'static>(
    &self,
    isolate: &'a mut Isolate,
  ) -> Option<&'a mut T> {
    isolate
      .vm
      .realm_mut(self.id())
      .slots
      .get_mut(&TypeId::of::<T>())
      .and_then(|slot| slot.downcast_mut::<T>())
  }

  /// Use with [`Context::get_slot`] and [`Context::get_slot_mut`] to associate
  /// state with a Context.
  ///
  /// This method gives ownership of value to the Context. Exactly one object of
  /// each type can be associated with a Context. If called more than once with
  /// an object of the same type, the earlier version will be dropped and
  /// replaced.
  ///
  /// Returns true if value was set without replacing an existing value.
  ///
  /// The value will be dropped when the isolate is dropped.
  pub fn set_slot<T: 'static>(&self, isolate: &mut Isolate, value: T) -> bool {
    isolate
      .vm
      .realm_mut(self.id())
      .slots
      .insert(TypeId::of::<T>(), Box::new(value))
      .is_none()
  }

  /// Removes the embedder data added with [`Self::set_slot()`] and returns it
  /// if it exists.
  pub fn remove_slot<T: 'static>(&self, isolate: &mut Isolate) -> Option<T> {
    let slot = isolate
      .vm
      .realm_mut(self.id())
      .slots
      .remove(&TypeId::of::<T>())?;
    slot.downcast::<T>().ok().map(|boxed| *boxed)
  }
}
