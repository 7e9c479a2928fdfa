// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::num::NonZeroI32;
use std::rc::Rc;

use crate::engine::error;
use crate::engine::module;
use crate::engine::module::ModuleKind;
use crate::engine::module::ModuleRecord;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::ContextId;
use crate::engine::JsResult;
use crate::engine::ModuleId;
use crate::function::enter_callback;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::script::string_text;
use crate::Context;
use crate::FixedArray;
use crate::HandleScope;
use crate::Local;
use crate::Module;
use crate::ModuleRequest;
use crate::String;
use crate::Value;

/// Called during Module::instantiate_module once per import request, with
/// the requesting context, the specifier, the import attributes and the
/// referring module. Returning `None` without throwing fails the
/// instantiation with a generic error.
pub type ResolveModuleCallback<'a> = for<'s> fn(
  Local<'s, Context>,
  Local<'s, String>,
  Local<'s, FixedArray>,
  Local<'s, Module>,
) -> Option<Local<'s, Module>>;

/// Runs the body of a synthetic module. Exports are filled in with
/// `Module::set_synthetic_module_export`. Return `None` after throwing to
/// fail the evaluation.
pub type SyntheticModuleEvaluationSteps =
  for<'s> fn(Local<'s, Context>, Local<'s, Module>) -> Option<Local<'s, Value>>;

/// The different states a module can be in.
///
/// This corresponds to the states used in ECMAScript except that "evaluated"
/// is split into kEvaluated and kErrored, indicating success and failure,
/// respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
  Uninstantiated,
  Instantiating,
  Instantiated,
  Evaluating,
  Evaluated,
  Errored,
}

/// A location in JavaScript source. Both coordinates are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location(i32, i32);

impl Location {
  pub fn get_line_number(&self) -> i32 {
    self.0
  }

  pub fn get_column_number(&self) -> i32 {
    self.1
  }
}

/// Entry point for synthetic module evaluation from the engine.
pub(crate) fn run_synthetic_steps(
  cx: &mut Isolate,
  steps: SyntheticModuleEvaluationSteps,
  id: ModuleId,
  realm: ContextId,
) -> JsResult<()> {
  enter_callback(cx, realm, |scope| {
    let context = scope.get_current_context();
    let module = scope.new_local::<Module>(Handled::Module(id));
    steps(context, module).is_some()
  })
  .map(|_| ())
}

/// Import attributes as `[key, value, source offset]` triples.
fn attributes_array(cx: &Isolate, module: ModuleId, index: usize) -> Handled {
  let record = &cx.vm.modules[module.index()];
  let request = match record.program().and_then(|p| p.module.as_ref()) {
    Some(info) => &info.requests[index],
    None => unreachable!("module request out of range"),
  };
  let offset = JsValue::Number(request.offset as f64);
  let items: Vec<Handled> = request
    .attributes
    .iter()
    .flat_map(|(key, value)| {
      [
        Handled::Value(JsValue::String(key.clone())),
        Handled::Value(JsValue::String(value.clone())),
        Handled::Value(offset.clone()),
      ]
    })
    .collect();
  Handled::FixedArray(Rc::from(items))
}

fn request_specifier(cx: &Isolate, module: ModuleId, index: usize) -> JsStr {
  let record = &cx.vm.modules[module.index()];
  match record.program().and_then(|p| p.module.as_ref()) {
    Some(info) => info.requests[index].specifier.clone(),
    None => unreachable!("module request out of range"),
  }
}

/// A compiled JavaScript module.
impl Module {
  pub(crate) fn id(&self) -> ModuleId {
    match self.handled() {
      Handled::Module(id) => id,
      _ => unreachable!("not a module"),
    }
  }

  fn with_record<R>(&self, f: impl FnOnce(&ModuleRecord) -> R) -> R {
    let isolate = self.host_isolate();
    f(&isolate.vm.modules[self.id().index()])
  }

  /// Returns the module's current status.
  pub fn get_status(&self) -> ModuleStatus {
    self.with_record(|record| record.status)
  }

  /// For a module in kErrored status, this returns the corresponding exception.
  ///
  /// # Panics
  ///
  /// Panics if the module is not `Errored`.
  pub fn get_exception<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Value> {
    let (status, exception) =
      self.with_record(|record| (record.status, record.exception.clone()));
    assert_eq!(
      status,
      ModuleStatus::Errored,
      "Module::get_exception() called on a module that is not errored"
    );
    scope.value_local(exception.unwrap_or_default())
  }

  /// Returns the ModuleRequests for this module.
  pub fn get_module_requests<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, FixedArray> {
    let module = self.id();
    let count = self.with_record(|record| record.request_count());
    let requests: Vec<Handled> = (0..count)
      .map(|index| Handled::ModuleRequest { module, index })
      .collect();
    scope.new_local(Handled::FixedArray(Rc::from(requests)))
  }

  /// For the given source text offset in this module, returns the
  /// corresponding Location with line and column numbers.
  pub fn source_offset_to_location(&self, offset: i32) -> Location {
    self.with_record(|record| match record.source() {
      Some(source) => {
        let location = source.location(offset.max(0) as u32);
        Location(location.line, location.column)
      }
      None => Location(0, 0),
    })
  }

  /// Returns the identity hash for this object. The hash is stable for the
  /// lifetime of the module.
  pub fn get_identity_hash(&self) -> NonZeroI32 {
    let hash = self.with_record(|record| record.identity_hash);
    match NonZeroI32::new(hash) {
      Some(hash) => hash,
      None => unreachable!("identity hashes are never zero"),
    }
  }

  /// Returns the underlying script's id. Synthetic modules have no script
  /// and return `None`.
  pub fn script_id(&self) -> Option<i32> {
    self.with_record(|record| match record.kind {
      ModuleKind::SourceText { .. } => Some(record.script_id),
      ModuleKind::Synthetic { .. } => None,
    })
  }

  /// Returns whether the module is a SourceTextModule.
  pub fn is_source_text_module(&self) -> bool {
    self.with_record(|record| {
      matches!(record.kind, ModuleKind::SourceText { .. })
    })
  }

  /// Returns whether the module is a SyntheticModule.
  pub fn is_synthetic_module(&self) -> bool {
    !self.is_source_text_module()
  }

  /// Returns the namespace object of this module.
  ///
  /// # Panics
  ///
  /// Panics if the module has not been instantiated yet.
  pub fn get_module_namespace<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Local<'s, Value> {
    let status = self.get_status();
    assert!(
      !matches!(
        status,
        ModuleStatus::Uninstantiated | ModuleStatus::Instantiating
      ),
      "Module::get_module_namespace() called on a module in state {status:?}"
    );
    let isolate: &mut Isolate = scope.as_mut();
    let namespace = module::get_namespace(isolate, self.id());
    scope.new_object_local(namespace)
  }

  /// Instantiates the module and its dependencies.
  ///
  /// Returns an empty Maybe<bool> if an exception occurred during
  /// instantiation. (In the case where the callback throws an exception, that
  /// exception is propagated.) Instantiating a module that is already
  /// instantiated succeeds without calling `callback`.
  #[must_use]
  pub fn instantiate_module<'s, F>(
    &self,
    scope: &mut HandleScope<'s>,
    mut callback: F,
  ) -> Option<bool>
  where
    F: for<'a> FnMut(
      Local<'a, Context>,
      Local<'a, String>,
      Local<'a, FixedArray>,
      Local<'a, Module>,
    ) -> Option<Local<'a, Module>>,
  {
    let id = self.id();
    scope.run_js(|cx, realm| {
      let mut resolver =
        |cx: &mut Isolate, referrer: ModuleId, index: usize| {
          let specifier = request_specifier(cx, referrer, index);
          let attributes = attributes_array(cx, referrer, index);
          let resolved = enter_callback(cx, realm, |scope| {
            let context = scope.get_current_context();
            let specifier = scope
              .value_local::<String>(JsValue::String(specifier.clone()));
            let attributes = scope.new_local::<FixedArray>(attributes);
            let referrer = scope.new_local::<Module>(Handled::Module(referrer));
            callback(context, specifier, attributes, referrer)
              .map(|module| module.id())
          })?;
          match resolved {
            Some(module) => Ok(module),
            None => Err(error::type_error(
              cx,
              format!("Cannot resolve module '{specifier}'"),
            )),
          }
        };
      module::instantiate(cx, id, realm, &mut resolver)
    })?;
    Some(true)
  }

  /// Evaluates the module and its dependencies.
  ///
  /// If status is kInstantiated, run the module's code. On success, set status
  /// to kEvaluated and return a promise fulfilled with `undefined`; on
  /// failure, set status to kErrored and propagate the thrown exception
  /// (which is then also available via |GetException|). Evaluating a module
  /// that was already evaluated returns the same promise without running it
  /// again.
  ///
  /// # Panics
  ///
  /// Panics if the module has not been instantiated.
  #[must_use]
  pub fn evaluate<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Value>> {
    let id = self.id();
    let promise = scope.run_js(|cx, _| module::evaluate(cx, id))?;
    Some(scope.new_object_local(promise))
  }

  /// Creates a new SyntheticModule with the specified export names, where
  /// evaluation_steps will be executed upon module evaluation.
  /// export_names must not contain duplicates.
  /// module_name is used solely for logging/debugging and doesn't affect
  /// module behavior.
  pub fn create_synthetic_module<'s>(
    scope: &mut HandleScope<'s, ()>,
    module_name: Local<String>,
    export_names: &[Local<String>],
    evaluation_steps: SyntheticModuleEvaluationSteps,
  ) -> Local<'s, Module> {
    let names: Vec<JsStr> =
      export_names.iter().map(|name| string_text(name)).collect();
    let isolate: &mut Isolate = scope.as_mut();
    let id = module::create_synthetic(isolate, names, evaluation_steps);
    log::debug!(
      "created synthetic module {} ({})",
      id.0,
      string_text(&module_name)
    );
    scope.new_local(Handled::Module(id))
  }

  /// Set this module's exported value for the name export_name to the
  /// specified export_value. This method must be called only on Modules
  /// created via create_synthetic_module. An error will be thrown if
  /// export_name is not one of the export_names that were passed in that
  /// create_synthetic_module call. Returns Some(true) on success, None if an
  /// error was thrown.
  #[must_use]
  pub fn set_synthetic_module_export(
    &self,
    scope: &mut HandleScope,
    export_name: Local<String>,
    export_value: Local<Value>,
  ) -> Option<bool> {
    let id = self.id();
    let name = string_text(&export_name);
    let value = export_value.js_value();
    scope.run_js(|cx, _| module::set_synthetic_export(cx, id, &name, value))?;
    Some(true)
  }
}

impl ModuleRequest {
  fn parts(&self) -> (ModuleId, usize) {
    match self.handled() {
      Handled::ModuleRequest { module, index } => (module, index),
      _ => unreachable!("not a module request"),
    }
  }

  /// Returns the module specifier for this ModuleRequest.
  pub fn get_specifier<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, String> {
    let (module, index) = self.parts();
    let isolate: &Isolate = scope.as_ref();
    let specifier = request_specifier(isolate, module, index);
    scope.value_local(JsValue::String(specifier))
  }

  /// Returns the source code offset of this module request.
  /// Use Module::source_offset_to_location to convert this to line/column
  /// numbers.
  pub fn get_source_offset(&self) -> i32 {
    let (module, index) = self.parts();
    let isolate = self.host_isolate();
    let record = &isolate.vm.modules[module.index()];
    match record.program().and_then(|p| p.module.as_ref()) {
      Some(info) => info.requests[index].offset as i32,
      None => unreachable!("module request out of range"),
    }
  }

  /// Contains the import attributes for this request in the form:
  /// [key1, value1, source_offset1, key2, value2, source_offset2, ...].
  /// The keys and values are of type `String`, and the source offsets are
  /// of type `Int32`. Use Module::source_offset_to_location to convert the
  /// source offsets to Locations with line/column numbers.
  pub fn get_import_attributes<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, FixedArray> {
    let (module, index) = self.parts();
    let isolate: &Isolate = scope.as_ref();
    let attributes = attributes_array(isolate, module, index);
    scope.new_local(attributes)
  }
}
