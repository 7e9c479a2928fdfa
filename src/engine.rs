// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.

//! The reference engine behind the embedding API: a tree-walking
//! interpreter over a garbage-collected heap.
//!
//! Nothing in here is public. The handle types in the rest of the crate are
//! the only way in, and every entry point goes through
//! [`Isolate::run_js`](crate::isolate::Isolate) so that exceptions end up in
//! the right `TryCatch`.

pub(crate) mod ast;
pub(crate) mod builtins;
pub(crate) mod conversion;
pub(crate) mod env;
pub(crate) mod error;
pub(crate) mod heap;
pub(crate) mod interp;
pub(crate) mod json;
pub(crate) mod lexer;
pub(crate) mod module;
pub(crate) mod object;
pub(crate) mod ops;
pub(crate) mod parser;
pub(crate) mod promise;
pub(crate) mod realm;
pub(crate) mod source;
pub(crate) mod value;

use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::ast::Program;
use crate::engine::ast::Span;
use crate::engine::heap::Heap;
use crate::engine::heap::Trace;
use crate::engine::heap::Tracer;
use crate::engine::module::ModuleRecord;
use crate::engine::promise::Job;
use crate::engine::realm::Realm;
use crate::engine::source::SourceInfo;
use crate::engine::value::JsStr;
use crate::engine::value::JsValue;
use crate::engine::value::ObjRef;

macro_rules! id_type {
  ($($name:ident),* $(,)?) => {
    $(
      #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
      pub(crate) struct $name(pub u32);

      impl $name {
        pub fn index(self) -> usize {
          self.0 as usize
        }
      }
    )*
  };
}

id_type!(ContextId, ModuleId, ScriptId, FunctionTemplateId, ObjectTemplateId);

/// Result of evaluating anything that may throw.
pub(crate) type JsResult<T> = Result<T, Abrupt>;

/// Non-local exits that unwind through Rust frames.
#[derive(Clone, Debug)]
pub(crate) enum Abrupt {
  Throw(JsValue),
  /// Raised when the embedder terminated execution. Script code cannot
  /// catch it.
  Terminate,
}

/// A compiled script that is not tied to a context yet.
pub(crate) struct ScriptRecord {
  pub program: Rc<Program>,
  pub source: Rc<SourceInfo>,
}

/// One activation on the engine's call stack.
pub(crate) struct Frame {
  pub function: Option<ObjRef>,
  pub name: JsStr,
  pub source: Option<Rc<SourceInfo>>,
  /// The construct being evaluated.
  pub span: Span,
  pub realm: ContextId,
  pub is_constructor: bool,
}

/// Engine tunables read from the process-wide flags when an isolate is
/// created.
#[derive(Clone, Debug)]
pub(crate) struct EngineConfig {
  pub strict: bool,
  pub expose_gc: bool,
  pub stack_limit: usize,
}

pub(crate) struct Vm {
  pub heap: Heap,
  pub realms: Vec<Realm>,
  pub frames: Vec<Frame>,
  /// Number of engine activations (script runs, callbacks, jobs) on the
  /// native stack. Collection only happens when this is zero.
  pub depth: u32,
  /// Address of a local in the outermost activation, used to bound native
  /// stack growth.
  pub stack_base: usize,
  pub config: EngineConfig,
  pub jobs: VecDeque<Job>,
  pub scripts: Vec<ScriptRecord>,
  pub modules: Vec<ModuleRecord>,
  next_script_id: i32,
  rng_state: u64,
  pub pending_message: Option<Rc<error::MessageData>>,
}

impl Vm {
  pub fn new(
    config: EngineConfig,
    initial_heap: usize,
    max_heap: usize,
  ) -> Self {
    Self {
      heap: Heap::new(initial_heap, max_heap),
      realms: Vec::new(),
      frames: Vec::new(),
      depth: 0,
      stack_base: 0,
      config,
      jobs: VecDeque::new(),
      scripts: Vec::new(),
      modules: Vec::new(),
      next_script_id: 1,
      rng_state: 0x2545_f491_4f6c_dd1d,
      pending_message: None,
    }
  }

  pub fn realm(&self, id: ContextId) -> &Realm {
    &self.realms[id.index()]
  }

  pub fn realm_mut(&mut self, id: ContextId) -> &mut Realm {
    &mut self.realms[id.index()]
  }

  pub fn next_script_id(&mut self) -> i32 {
    let id = self.next_script_id;
    self.next_script_id += 1;
    id
  }

  /// xorshift64*; drives `Math.random` and identity hashes.
  pub fn next_random(&mut self) -> u64 {
    let mut x = self.rng_state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    self.rng_state = x;
    x.wrapping_mul(0x2545_f491_4f6c_dd1d)
  }

  /// A non-zero 31-bit hash, the shape `GetIdentityHash` promises.
  pub fn new_identity_hash(&mut self) -> i32 {
    loop {
      let hash = (self.next_random() >> 33) as i32 & 0x7fff_ffff;
      if hash != 0 {
        return hash;
      }
    }
  }

  pub fn trace_roots(&self, tracer: &mut Tracer) {
    for realm in &self.realms {
      realm.trace(tracer);
    }
    for frame in &self.frames {
      frame.function.trace(tracer);
    }
    for job in &self.jobs {
      job.trace(tracer);
    }
    for module in &self.modules {
      module.trace(tracer);
    }
    for script in &self.scripts {
      script.source.trace(tracer);
    }
  }
}
