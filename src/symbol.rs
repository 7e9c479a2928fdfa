// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::engine::value::JsValue;
use crate::engine::value::SymbolRef;
use crate::isolate::Isolate;
use crate::script::string_text;
use crate::HandleScope;
use crate::Local;
use crate::String;
use crate::Symbol;
use crate::Value;

impl Symbol {
  /// Create a symbol. If description is not empty, it will be used as the
  /// description.
  pub fn new<'s>(
    scope: &mut HandleScope<'s, ()>,
    description: Option<Local<String>>,
  ) -> Local<'s, Symbol> {
    let description = description.map(|d| string_text(&d));
    scope.value_local(JsValue::Symbol(SymbolRef::new(description)))
  }

  /// Access global symbol registry.
  /// Note that symbols created this way are never collected, so
  /// they should only be used for statically fixed properties.
  /// Also, there is only one global description space for the descriptions
  /// used as keys.
  pub fn for_global<'s>(
    scope: &mut HandleScope<'s, ()>,
    description: Local<String>,
  ) -> Local<'s, Symbol> {
    let key = string_text(&description);
    let isolate: &mut Isolate = scope.as_mut();
    let symbol = isolate
      .symbol_registry
      .entry(key.clone())
      .or_insert_with(|| SymbolRef::new(Some(key)))
      .clone();
    scope.value_local(JsValue::Symbol(symbol))
  }

  /// Returns the description string of the symbol, or undefined if none.
  pub fn description<'s>(
    &self,
    scope: &mut HandleScope<'s, ()>,
  ) -> Local<'s, Value> {
    let description = match self.js_value() {
      JsValue::Symbol(symbol) => symbol.description().cloned(),
      _ => unreachable!("not a symbol"),
    };
    match description {
      Some(text) => scope.value_local(JsValue::String(text)),
      None => scope.value_local(JsValue::Undefined),
    }
  }
}
