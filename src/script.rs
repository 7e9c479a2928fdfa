// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::interp;
use crate::engine::source::SourceInfo;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::ContextId;
use crate::engine::ScriptId;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::script_compiler;
use crate::HandleScope;
use crate::Local;
use crate::Script;
use crate::String;
use crate::UnboundScript;
use crate::Value;

/// The origin, within a file, of a script.
#[derive(Debug, Clone, Copy)]
pub struct ScriptOrigin<'s> {
  resource_name: Local<'s, Value>,
  resource_line_offset: i32,
  resource_column_offset: i32,
  resource_is_shared_cross_origin: bool,
  script_id: i32,
  source_map_url: Option<Local<'s, Value>>,
  resource_is_opaque: bool,
  is_wasm: bool,
  is_module: bool,
  host_defined_options: Option<Local<'s, Value>>,
}

impl<'s> ScriptOrigin<'s> {
  #[allow(clippy::too_many_arguments)]
  #[inline(always)]
  pub fn new(
    resource_name: Local<'s, Value>,
    resource_line_offset: i32,
    resource_column_offset: i32,
    resource_is_shared_cross_origin: bool,
    script_id: i32,
    source_map_url: Option<Local<'s, Value>>,
    resource_is_opaque: bool,
    is_wasm: bool,
    is_module: bool,
    host_defined_options: Option<Local<'s, Value>>,
  ) -> Self {
    Self {
      resource_name,
      resource_line_offset,
      resource_column_offset,
      resource_is_shared_cross_origin,
      script_id,
      source_map_url,
      resource_is_opaque,
      is_wasm,
      is_module,
      host_defined_options,
    }
  }

  /// The origin recorded for compiled source.
  pub(crate) fn from_source_info(
    scope: &mut HandleScope<'s, ()>,
    info: &SourceInfo,
  ) -> Self {
    fn optional<'s>(
      scope: &mut HandleScope<'s, ()>,
      value: &JsValue,
    ) -> Option<Local<'s, Value>> {
      match value {
        JsValue::Undefined => None,
        value => Some(scope.value_local(value.clone())),
      }
    }
    Self {
      resource_name: scope.value_local(info.resource_name.clone()),
      resource_line_offset: info.line_offset,
      resource_column_offset: info.column_offset,
      resource_is_shared_cross_origin: info.shared_cross_origin,
      script_id: info.script_id,
      source_map_url: optional(scope, &info.source_map_url),
      resource_is_opaque: info.opaque,
      is_wasm: info.is_wasm,
      is_module: info.is_module,
      host_defined_options: optional(scope, &info.host_defined_options),
    }
  }

  /// Copies the origin onto freshly compiled source.
  pub(crate) fn apply(&self, info: &mut SourceInfo) {
    info.resource_name = self.resource_name.js_value();
    info.line_offset = self.resource_line_offset;
    info.column_offset = self.resource_column_offset;
    info.shared_cross_origin = self.resource_is_shared_cross_origin;
    info.source_map_url = self
      .source_map_url
      .map(|url| url.js_value())
      .unwrap_or_default();
    info.opaque = self.resource_is_opaque;
    info.is_wasm = self.is_wasm;
    info.is_module = self.is_module;
    info.host_defined_options = self
      .host_defined_options
      .map(|options| options.js_value())
      .unwrap_or_default();
  }

  pub fn resource_name(&self) -> Local<'s, Value> {
    self.resource_name
  }

  pub fn resource_line_offset(&self) -> i32 {
    self.resource_line_offset
  }

  pub fn resource_column_offset(&self) -> i32 {
    self.resource_column_offset
  }

  pub fn is_shared_cross_origin(&self) -> bool {
    self.resource_is_shared_cross_origin
  }

  /// The id the embedder passed in. The engine numbers scripts itself;
  /// see `UnboundScript::get_id`.
  pub fn script_id(&self) -> i32 {
    self.script_id
  }

  pub fn source_map_url(&self) -> Option<Local<'s, Value>> {
    self.source_map_url
  }

  pub fn is_opaque(&self) -> bool {
    self.resource_is_opaque
  }

  pub fn is_wasm(&self) -> bool {
    self.is_wasm
  }

  pub fn is_module(&self) -> bool {
    self.is_module
  }

  pub fn host_defined_options(&self) -> Option<Local<'s, Value>> {
    self.host_defined_options
  }
}

/// The text of a string handle.
pub(crate) fn string_text(source: &String) -> JsStr {
  match source.js_value() {
    JsValue::String(text) => text,
    _ => unreachable!("not a string"),
  }
}

impl Script {
  /// A shorthand for ScriptCompiler::Compile().
  #[inline(always)]
  pub fn compile<'s>(
    scope: &mut HandleScope<'s>,
    source: Local<String>,
    origin: Option<&ScriptOrigin>,
  ) -> Option<Local<'s, Script>> {
    let source = script_compiler::Source::new(source, origin);
    script_compiler::compile(
      scope,
      source,
      script_compiler::CompileOptions::NoCompileOptions,
    )
  }

  fn ids(&self) -> (ScriptId, ContextId) {
    match self.handled() {
      Handled::Script { script, context } => (script, context),
      _ => unreachable!("not a script"),
    }
  }

  /// Returns the corresponding context-unbound script.
  pub fn get_unbound_script<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, UnboundScript> {
    let (script, _) = self.ids();
    scope.new_local(Handled::UnboundScript(script))
  }

  /// Runs the script returning the resulting value. It will be run in the
  /// context in which it was created (ScriptCompiler::CompileBound or
  /// UnboundScript::BindToCurrentContext()).
  pub fn run<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Option<Local<'s, Value>> {
    let (script, context) = self.ids();
    let isolate: &mut Isolate = scope.as_mut();
    let record = &isolate.vm.scripts[script.index()];
    let (program, source) = (record.program.clone(), record.source.clone());
    isolate.entered_contexts.push(context);
    let result = isolate
      .run_js(|cx| interp::run_script(cx, &program, &source, context));
    isolate.entered_contexts.pop();
    Some(scope.value_local(result?))
  }
}
