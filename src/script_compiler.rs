// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
//! Compilation of scripts and modules from source text.
use std::rc::Rc;

use crate::engine::error;
use crate::engine::module;
use crate::engine::parser;
use crate::engine::source::SourceInfo;
use crate::engine::JsResult;
use crate::engine::ScriptId;
use crate::engine::ScriptRecord;
use crate::handle::Handled;
use crate::isolate::Isolate;
use crate::script::string_text;
use crate::HandleScope;
use crate::Local;
use crate::Module;
use crate::Script;
use crate::ScriptOrigin;
use crate::String;
use crate::UnboundScript;

/// Source code given to the compiler: the text plus its origin.
pub struct Source {
  info: SourceInfo,
}

impl Source {
  pub fn new(
    source_string: Local<String>,
    origin: Option<&ScriptOrigin>,
  ) -> Self {
    let mut info = SourceInfo::new(string_text(&source_string), 0);
    if let Some(origin) = origin {
      origin.apply(&mut info);
    }
    Self { info }
  }

  pub fn new_with_origin(
    source_string: Local<String>,
    origin: &ScriptOrigin,
  ) -> Self {
    Self::new(source_string, Some(origin))
  }

  /// Stamps the source with a fresh script id.
  fn finish(self, isolate: &mut Isolate) -> Rc<SourceInfo> {
    let mut info = self.info;
    info.script_id = isolate.vm.next_script_id();
    Rc::new(info)
  }
}

impl std::fmt::Debug for Source {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Source")
      .field("length", &self.info.text.len())
      .field("is_module", &self.info.is_module)
      .finish()
  }
}

/// Compilation flags. Source is always parsed completely up front, so
/// `EagerCompile` only exists for callers written against lazy
/// compilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileOptions {
  #[default]
  NoCompileOptions,
  EagerCompile,
}

fn compile_script(isolate: &mut Isolate, source: Source) -> JsResult<ScriptId> {
  let info = source.finish(isolate);
  let strict = isolate.vm.config.strict;
  let stack = parser::StackBudget::new(
    isolate.vm.stack_base,
    isolate.vm.config.stack_limit,
  );
  match parser::parse_script(&info.text, strict, stack) {
    Ok(program) => {
      let id = ScriptId(isolate.vm.scripts.len() as u32);
      isolate.vm.scripts.push(ScriptRecord {
        program: Rc::new(program),
        source: info,
      });
      Ok(id)
    }
    Err(e) => Err(error::throw_syntax_error(isolate, &e, &info)),
  }
}

/// Compiles the specified script (context-independent) and binds it to the
/// current context. A syntax error is thrown as a `SyntaxError` and `None`
/// is returned.
pub fn compile<'s>(
  scope: &mut HandleScope<'s>,
  source: Source,
  _options: CompileOptions,
) -> Option<Local<'s, Script>> {
  let context = scope.context_id();
  let script = scope.run_js(|cx, _| compile_script(cx, source))?;
  Some(scope.new_local(Handled::Script { script, context }))
}

/// Compiles the specified script without binding it to a context. Bind it
/// with `UnboundScript::bind_to_current_context` to run it.
pub fn compile_unbound_script<'s>(
  scope: &mut HandleScope<'s>,
  source: Source,
  _options: CompileOptions,
) -> Option<Local<'s, UnboundScript>> {
  let script = scope.run_js(|cx, _| compile_script(cx, source))?;
  Some(scope.new_local(Handled::UnboundScript(script)))
}

/// Compiles the specified source as an ECMAScript module. The module starts
/// out `Uninstantiated`.
pub fn compile_module<'s>(
  scope: &mut HandleScope<'s>,
  mut source: Source,
) -> Option<Local<'s, Module>> {
  source.info.is_module = true;
  let module = scope.run_js(|cx, _| {
    let info = source.finish(cx);
    module::compile(cx, info)
  })?;
  Some(scope.new_local(Handled::Module(module)))
}
