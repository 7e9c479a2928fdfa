// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::ScriptId;
use crate::handle::Handled;
use crate::HandleScope;
use crate::Local;
use crate::Script;
use crate::UnboundScript;
use crate::Value;

impl UnboundScript {
  pub(crate) fn script_id(&self) -> ScriptId {
    match self.handled() {
      Handled::UnboundScript(script) => script,
      _ => unreachable!("not an unbound script"),
    }
  }

  /// Binds the script to the currently entered context.
  pub fn bind_to_current_context<'s>(
    &self,
    scope: &mut HandleScope<'s>,
  ) -> Local<'s, Script> {
    let context = scope.context_id();
    scope.new_local(Handled::Script {
      script: self.script_id(),
      context,
    })
  }

  /// The id the engine assigned to this script when it was compiled.
  pub fn get_id(&self) -> i32 {
    let isolate = self.host_isolate();
    isolate.vm.scripts[self.script_id().index()].source.script_id
  }

  /// The resource name from the script's origin, `undefined` if it had
  /// none.
  pub fn get_script_name<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Value> {
    let isolate: &crate::Isolate = scope.as_ref();
    let name = isolate.vm.scripts[self.script_id().index()]
      .source
      .resource_name
      .clone();
    scope.value_local(name)
  }

  /// The source map URL from the script's origin, `undefined` if it had
  /// none.
  pub fn get_source_mapping_url<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Value> {
    let isolate: &crate::Isolate = scope.as_ref();
    let url = isolate.vm.scripts[self.script_id().index()]
      .source
      .source_map_url
      .clone();
    scope.value_local(url)
  }
}
