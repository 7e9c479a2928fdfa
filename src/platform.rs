// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use crate::isolate::IsolateHandle;
use crate::support::SharedRef;
use crate::support::UniqueRef;
use crate::Isolate;

/// A unit of work that runs on an isolate's thread. Tasks can be posted
/// from any thread with [`post_task`] and run when the embedder pumps the
/// message loop of the isolate they were posted to.
pub trait Task: Send + 'static {
  fn run(self: Box<Self>, isolate: &mut Isolate);
}

impl<F> Task for F
where
  F: FnOnce(&mut Isolate) + Send + 'static,
{
  fn run(self: Box<Self>, isolate: &mut Isolate) {
    (*self)(isolate)
  }
}

/// The process-wide service object handed to `V8::initialize_platform`.
///
/// Foreground tasks are kept per isolate, so the platform itself only
/// records how it was configured.
#[derive(Debug)]
pub struct Platform {
  thread_pool_size: u32,
  idle_task_support: bool,
}

impl Platform {
  /// Number of worker threads; zero means single threaded.
  pub fn thread_pool_size(&self) -> u32 {
    self.thread_pool_size
  }

  pub fn idle_task_support(&self) -> bool {
    self.idle_task_support
  }
}

/// Returns a new instance of the default platform implementation.
///
/// The caller will take ownership of the returned platform.
///
/// `idle_task_support` is recorded for embedders that schedule their own
/// idle work; the engine posts no idle tasks.
pub fn new_default_platform(
  thread_pool_size: u32,
  idle_task_support: bool,
) -> UniqueRef<Platform> {
  UniqueRef::new(Platform {
    thread_pool_size,
    idle_task_support,
  })
}

/// The same as new_default_platform() but disables the worker thread pool.
pub fn new_single_threaded_default_platform(
  idle_task_support: bool,
) -> UniqueRef<Platform> {
  new_default_platform(0, idle_task_support)
}

/// Pumps the message loop for the given isolate.
///
/// The caller has to make sure that this is called from the right thread.
/// Returns true if a task was executed, and false otherwise. If the call to
/// PumpMessageLoop is nested within another call to PumpMessageLoop, only
/// nestable tasks may run. Otherwise, any task may run. Unless requested through
/// the |wait_for_work| parameter, this call does not block if no task is
/// pending.
pub fn pump_message_loop(
  _platform: &SharedRef<Platform>,
  isolate: &mut Isolate,
  wait_for_work: bool,
) -> bool {
  isolate.run_posted_task(wait_for_work)
}

/// Posts a foreground task to the isolate behind `handle`. Returns false if
/// the isolate was already disposed.
pub fn post_task(handle: &IsolateHandle, task: impl Task) -> bool {
  handle.post_task(Box::new(task))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_configuration() {
    let platform = new_default_platform(4, true).make_shared();
    assert_eq!(platform.thread_pool_size(), 4);
    assert!(platform.idle_task_support());
    let platform = new_single_threaded_default_platform(false);
    assert_eq!(platform.thread_pool_size(), 0);
  }
}
