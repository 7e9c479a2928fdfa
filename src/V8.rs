// Copyright 2019-2021 the Deno authors. All rights reserved. MIT license.
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::vec::Vec;

use log::warn;

use crate::platform::Platform;
use crate::support::SharedRef;

#[derive(Debug)]
enum GlobalState {
  Uninitialized,
  PlatformInitialized(SharedRef<Platform>),
  Initialized(SharedRef<Platform>),
  Disposed(SharedRef<Platform>),
  PlatformShutdown,
}
use GlobalState::*;

/// Engine flags. They are process-wide and read whenever an isolate is
/// created, so changing them only affects isolates created afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Flags {
  pub expose_gc: bool,
  pub use_strict: bool,
  pub stack_size_kb: usize,
  pub max_heap_size_mb: usize,
}

impl Default for Flags {
  fn default() -> Self {
    Self {
      expose_gc: false,
      use_strict: false,
      stack_size_kb: 984,
      max_heap_size_mb: 1024,
    }
  }
}

impl Flags {
  /// Applies one `--flag[=value]` argument. Returns false if the flag is
  /// not recognized.
  fn apply(&mut self, arg: &str, usage: Option<&str>) -> bool {
    let Some(flag) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))
    else {
      return false;
    };
    let flag = flag.replace('-', "_");
    let (name, value) = match flag.split_once('=') {
      Some((name, value)) => (name.to_string(), Some(value.to_string())),
      None => (flag.clone(), None),
    };
    let (name, negated) = match name.strip_prefix("no") {
      Some(rest) if rest.starts_with('_') || is_bool_flag(rest) => {
        (rest.trim_start_matches('_').to_string(), true)
      }
      _ => (name, false),
    };
    match (name.as_str(), value) {
      ("expose_gc", None) => self.expose_gc = !negated,
      ("use_strict", None) => self.use_strict = !negated,
      ("stack_size", Some(value)) if !negated => match value.parse() {
        Ok(kb) => self.stack_size_kb = kb,
        Err(_) => return false,
      },
      ("max_heap_size", Some(value)) if !negated => match value.parse() {
        Ok(mb) => self.max_heap_size_mb = mb,
        Err(_) => return false,
      },
      ("allow_natives_syntax", None) => {}
      (name, _) if name.starts_with("harmony") => {}
      ("help", None) => print_usage(usage),
      _ => return false,
    }
    true
  }
}

fn is_bool_flag(name: &str) -> bool {
  matches!(name, "expose_gc" | "use_strict" | "allow_natives_syntax")
    || name.starts_with("harmony")
}

fn print_usage(usage: Option<&str>) {
  if let Some(usage) = usage {
    print!("{usage}");
  }
  println!("Options:");
  println!("  --expose_gc            expose gc() to scripts");
  println!("  --use_strict           run all scripts in strict mode");
  println!("  --stack_size=<kb>      native stack budget for script calls");
  println!("  --max_heap_size=<mb>   hard limit of the heap");
  println!("  --harmony*             accepted, no effect");
  println!("  --allow_natives_syntax accepted, no effect");
}

lazy_static! {
  static ref GLOBAL_STATE: Mutex<GlobalState> = Mutex::new(Uninitialized);
  static ref FLAGS: Mutex<Flags> = Mutex::new(Flags::default());
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

pub fn assert_initialized() {
  let global_state_guard = lock(&GLOBAL_STATE);
  match *global_state_guard {
    Initialized(_) => {}
    _ => panic!("Invalid global state"),
  };
}

/// A snapshot of the current engine flags.
pub(crate) fn engine_flags() -> Flags {
  lock(&FLAGS).clone()
}

/// Pass the command line arguments to the engine.
/// The first element of args (which usually corresponds to the binary name) is
/// ignored.
/// Returns a vector of command line arguments that the engine did not
/// understand.
pub fn set_flags_from_command_line(args: Vec<String>) -> Vec<String> {
  set_flags_from_command_line_with_usage(args, None)
}

/// Like `set_flags_from_command_line`, with a usage string that `--help`
/// prints ahead of the option list.
///
/// # Examples
///
/// ```
///     let r = jsembed::V8::set_flags_from_command_line_with_usage(
///       vec!["binaryname".to_string(), "--harmony".to_string()],
///       Some("Usage: binaryname --startup-src=file\n\n"),
///     );
///     assert_eq!(r, vec!["binaryname".to_string()]);
/// ```
pub fn set_flags_from_command_line_with_usage(
  args: Vec<String>,
  usage: Option<&str>,
) -> Vec<String> {
  let mut flags = lock(&FLAGS);
  let mut rest = Vec::with_capacity(args.len());
  let mut args = args.into_iter();
  rest.extend(args.next());
  for arg in args {
    if !flags.apply(&arg, usage) {
      rest.push(arg);
    }
  }
  rest
}

/// Sets engine flags from a string of whitespace separated flags.
/// Unrecognized flags are logged and otherwise ignored.
pub fn set_flags_from_string(flags: &str) {
  let mut current = lock(&FLAGS);
  for arg in flags.split_whitespace() {
    if !current.apply(arg, None) {
      warn!("unknown engine flag: {arg}");
    }
  }
}

/// Get the version string.
pub fn get_version() -> &'static str {
  env!("CARGO_PKG_VERSION")
}

/// Sets the Platform to use. This should be invoked before the engine is
/// initialized.
pub fn initialize_platform(platform: SharedRef<Platform>) {
  let mut global_state_guard = lock(&GLOBAL_STATE);
  *global_state_guard = match *global_state_guard {
    Uninitialized => PlatformInitialized(platform),
    _ => panic!("Invalid global state"),
  };
}

/// Initializes the engine. This function needs to be called before the
/// first Isolate is created.
pub fn initialize() {
  let mut global_state_guard = lock(&GLOBAL_STATE);
  *global_state_guard = match *global_state_guard {
    PlatformInitialized(ref platform) => Initialized(platform.clone()),
    _ => panic!("Invalid global state"),
  };
}

/// Returns the Platform handed to `initialize_platform`.
pub fn get_current_platform() -> SharedRef<Platform> {
  let global_state_guard = lock(&GLOBAL_STATE);
  match *global_state_guard {
    Initialized(ref platform) => platform.clone(),
    _ => panic!("Invalid global state"),
  }
}

/// Releases any resources used by the engine. Note that disposing is
/// permanent, the engine cannot be reinitialized.
///
/// It should generally not be necessary to dispose before exiting
/// a process, this should happen automatically.
///
/// # Safety
///
/// Calling this function before completely disposing all isolates will lead
/// to a crash.
pub unsafe fn dispose() -> bool {
  let mut global_state_guard = lock(&GLOBAL_STATE);
  *global_state_guard = match *global_state_guard {
    Initialized(ref platform) => Disposed(platform.clone()),
    _ => panic!("Invalid global state"),
  };
  true
}

/// Clears all references to the Platform. This should be invoked after
/// the engine was disposed.
pub fn dispose_platform() {
  let mut global_state_guard = lock(&GLOBAL_STATE);
  *global_state_guard = match *global_state_guard {
    Disposed(_) => PlatformShutdown,
    _ => panic!("Invalid global state"),
  };
}

/// Alias of `dispose_platform`.
pub fn shutdown_platform() {
  dispose_platform()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flag_parsing() {
    let mut flags = Flags::default();
    assert!(flags.apply("--expose_gc", None));
    assert!(flags.expose_gc);
    assert!(flags.apply("--no-expose-gc", None));
    assert!(!flags.expose_gc);
    assert!(flags.apply("--stack-size=100", None));
    assert_eq!(flags.stack_size_kb, 100);
    assert!(flags.apply("--max_heap_size=8", None));
    assert_eq!(flags.max_heap_size_mb, 8);
    assert!(flags.apply("--harmony-import-attributes", None));
    assert!(flags.apply("--allow_natives_syntax", None));
    assert!(!flags.apply("--stack_size=lots", None));
    assert!(!flags.apply("--frobnicate", None));
    assert!(!flags.apply("expose_gc", None));
  }
}
