use jsembed as v8;

fn main() {
  // Initialize the engine.
  let platform = v8::new_default_platform(0, false).make_shared();
  v8::V8::initialize_platform(platform);
  v8::V8::initialize();

  // Pass command line arguments to the engine.
  let args: Vec<String> = std::env::args().collect();
  let args = v8::V8::set_flags_from_command_line(args);

  let mut run_shell_flag = args.len() == 1;
  let isolate = &mut v8::Isolate::new(v8::CreateParams::default());
  let handle_scope = &mut v8::HandleScope::new(isolate);

  let global = v8::ObjectTemplate::new(handle_scope);
  let name = v8::String::new(handle_scope, "print").unwrap();
  let print_fn = v8::FunctionTemplate::new(handle_scope, print);
  global.set(name.into(), print_fn.into());
  let context = v8::Context::new_from_template(handle_scope, global);

  let context_scope = &mut v8::ContextScope::new(handle_scope, context);
  let scope = &mut v8::HandleScope::new(context_scope);

  run_main(scope, &args, &mut run_shell_flag);

  if run_shell_flag {
    run_shell(scope);
  }
}

/// Writes its arguments to stdout, separated by spaces.
fn print(
  scope: &mut v8::HandleScope,
  args: v8::FunctionCallbackArguments,
  _rv: v8::ReturnValue,
) {
  let mut line = Vec::new();
  for i in 0..args.length() {
    line.push(args.get(i).to_rust_string_lossy(scope));
  }
  println!("{}", line.join(" "));
}

/// The read-eval-print loop.
fn run_shell(scope: &mut v8::HandleScope) {
  use std::io::{self, Write};

  println!("jsembed {} [sample shell]", v8::V8::get_version());

  loop {
    print!("> ");
    if io::stdout().flush().is_err() {
      return;
    }

    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
      Ok(n) => {
        if n == 0 {
          println!();
          return;
        }

        execute_string(scope, &buf, "(shell)", true, true);
      }
      Err(error) => println!("error: {}", error),
    }
  }
}

/// Process remaining command line arguments and execute files
fn run_main(
  scope: &mut v8::HandleScope,
  args: &[String],
  run_shell: &mut bool,
) {
  let mut skip_next = false;

  // Parse command-line arguments.
  for (i, arg) in args.iter().enumerate().skip(1) {
    if skip_next {
      skip_next = false;
      continue;
    }

    match &**arg {
      "--shell" => {
        // Enables the shell.
        *run_shell = true;
      }
      "-f" => {
        // Ignore any -f flags for compatibility with other stand-alone
        // JavaScript engines.
      }
      "-e" | "-m" => {
        skip_next = true;
        let Some(operand) = args.get(i + 1) else {
          eprintln!("Error: {} requires an argument", arg);
          continue;
        };
        if arg == "-e" {
          execute_string(scope, operand, "unnamed", false, true);
        } else {
          execute_module(scope, operand);
        }
        drain_tasks(scope);
      }
      arg => {
        if arg.starts_with("--") {
          eprintln!("Warning: unknown flag {}.\nTry --help for options", arg);
          continue;
        }

        // Use all other arguments as names of files to load and run.
        match std::fs::read_to_string(arg) {
          Ok(script) => execute_string(scope, &script, arg, false, true),
          Err(error) => {
            eprintln!("Error reading '{}': {}", arg, error);
            continue;
          }
        }
        drain_tasks(scope);
      }
    }
  }
}

/// Runs pending microtasks and tasks posted to the isolate.
fn drain_tasks(scope: &mut v8::HandleScope) {
  scope.perform_microtask_checkpoint();
  while v8::pump_message_loop(&v8::V8::get_current_platform(), scope, false) {
    // do nothing
  }
}

fn script_origin<'s>(
  scope: &mut v8::HandleScope<'s>,
  filename: &str,
  is_module: bool,
) -> Option<v8::ScriptOrigin<'s>> {
  let filename = v8::String::new(scope, filename)?;
  Some(v8::ScriptOrigin::new(
    filename.into(),
    0,
    0,
    false,
    0,
    None,
    false,
    false,
    is_module,
    None,
  ))
}

fn execute_string(
  scope: &mut v8::HandleScope,
  script: &str,
  filename: &str,
  print_result: bool,
  report_exceptions_flag: bool,
) {
  let scope = &mut v8::TryCatch::new(scope);

  let Some(origin) = script_origin(scope, filename, false) else {
    return;
  };
  let Some(script) = v8::String::new(scope, script) else {
    eprintln!("Error: script is too long");
    return;
  };

  let Some(script) = v8::Script::compile(scope, script, Some(&origin)) else {
    if report_exceptions_flag {
      report_exceptions(scope);
    }
    return;
  };

  match script.run(scope) {
    Some(result) => {
      if print_result && !result.is_undefined() {
        println!("{}", result.to_rust_string_lossy(scope));
      }
    }
    None => {
      if report_exceptions_flag {
        report_exceptions(scope);
      }
    }
  }
}

/// Loads `path` as an ES module. Imports are read from the file system,
/// relative to the working directory.
fn execute_module(scope: &mut v8::HandleScope, path: &str) {
  let scope = &mut v8::TryCatch::new(scope);

  let Some(module) = load_module(scope, path) else {
    report_exceptions(scope);
    return;
  };
  let instantiated =
    module.instantiate_module(scope, |context, specifier, _, _| {
      let scope = &mut unsafe { v8::CallbackScope::new(context) };
      let path = specifier.to_rust_string_lossy(scope);
      load_module(scope, &path)
    });
  if instantiated.is_none() {
    report_exceptions(scope);
    return;
  }
  if module.evaluate(scope).is_none() {
    report_exceptions(scope);
  }
}

fn load_module<'s>(
  scope: &mut v8::HandleScope<'s>,
  path: &str,
) -> Option<v8::Local<'s, v8::Module>> {
  let text = match std::fs::read_to_string(path) {
    Ok(text) => text,
    Err(error) => {
      let message = format!("Cannot load module '{}': {}", path, error);
      let message = v8::String::new(scope, &message)?;
      let exception = v8::Exception::error(scope, message);
      scope.throw_exception(exception);
      return None;
    }
  };
  let origin = script_origin(scope, path, true)?;
  let text = v8::String::new(scope, &text)?;
  let source = v8::script_compiler::Source::new_with_origin(text, &origin);
  v8::script_compiler::compile_module(scope, source)
}

fn report_exceptions(try_catch: &mut v8::TryCatch<v8::HandleScope>) {
  let Some(exception) = try_catch.exception() else {
    return;
  };
  let exception_string = exception.to_rust_string_lossy(try_catch);
  let Some(message) = try_catch.message() else {
    eprintln!("{}", exception_string);
    return;
  };

  // Print (filename):(line number): (message).
  let filename = message
    .get_script_resource_name(try_catch)
    .map_or_else(|| "(unknown)".into(), |s| s.to_rust_string_lossy(try_catch));
  let line_number = message.get_line_number(try_catch).unwrap_or_default();

  eprintln!("{}:{}: {}", filename, line_number, exception_string);

  // Print line of source code.
  if let Some(source_line) = message.get_source_line(try_catch) {
    eprintln!("{}", source_line.to_rust_string_lossy(try_catch));

    // Print wavy underline.
    let start_column = message.get_start_column();
    let end_column = message.get_end_column();
    eprintln!(
      "{}{}",
      " ".repeat(start_column),
      "^".repeat(end_column.saturating_sub(start_column))
    );
  }

  // Print stack trace
  if let Some(stack_trace) = try_catch.stack_trace() {
    eprintln!("{}", stack_trace.to_rust_string_lossy(try_catch));
  }
}
