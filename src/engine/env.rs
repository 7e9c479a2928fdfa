// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! Environment records. Each one is a heap cell so closures can keep their
//! defining scope alive.

use indexmap::IndexMap;

use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::value::EnvRef;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mutability {
  Mutable,
  Const,
  /// The self-binding of a named function expression. Writes are ignored
  /// in sloppy code and throw in strict code.
  FunctionName,
}

#[derive(Clone, Debug)]
pub(crate) enum Binding {
  /// `None` while the binding is in its temporal dead zone.
  Value {
    value: Option<JsValue>,
    mutability: Mutability,
  },
  /// A live import: reads go to `name` in the exporting module's
  /// environment.
  Import { env: EnvRef, name: JsStr },
}

pub(crate) struct Env {
  pub parent: Option<EnvRef>,
  pub bindings: IndexMap<JsStr, Binding>,
  /// Object environment records (the global object) resolve names as
  /// properties of this object.
  pub object: Option<ObjRef>,
  /// `Some` for environments that provide a `this` binding.
  pub this: Option<JsValue>,
  /// The function whose invocation created this environment.
  pub function: Option<ObjRef>,
}

impl Env {
  pub fn declarative(parent: Option<EnvRef>) -> Self {
    Self {
      parent,
      bindings: IndexMap::new(),
      object: None,
      this: None,
      function: None,
    }
  }

  pub fn object(object: ObjRef) -> Self {
    Self {
      parent: None,
      bindings: IndexMap::new(),
      object: Some(object),
      this: None,
      function: None,
    }
  }

  pub fn declare(
    &mut self,
    name: JsStr,
    value: Option<JsValue>,
    mutability: Mutability,
  ) {
    self.bindings.insert(name, Binding::Value { value, mutability });
  }

  pub(crate) fn trace(&self, tracer: &mut Tracer) {
    self.parent.trace(tracer);
    self.object.trace(tracer);
    self.this.trace(tracer);
    self.function.trace(tracer);
    for binding in self.bindings.values() {
      match binding {
        Binding::Value { value, .. } => value.trace(tracer),
        Binding::Import { env, .. } => tracer.visit(*env),
      }
    }
  }
}
