use exscript::{Engine, EngineConfig, ScriptError, Value};
use maplit::btreemap;
use std::fs;
use std::path::PathBuf;

// Helper to create a script file in the temp directory
fn create_test_script(content: &str, filename: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("exscript_test_{}_{}.vim", std::process::id(), filename));
    fs::write(&path, content).expect("Failed to write test file");
    path
}

// Helper to cleanup test files
fn cleanup_test_script(path: &PathBuf) {
    let _ = fs::remove_file(path);
}

fn run(script: &str) -> Vec<String> {
    let mut engine = Engine::captured(EngineConfig::default());
    engine.source_str("test.vim", script);
    engine.take_messages()
}

#[cfg(test)]
mod sourcing_tests {
    use super::*;

    #[test]
    fn test_source_file_from_disk() {
        let content = r#"let s:greeting = 'Hello'
function! s:Greet(name)
  return s:greeting . ', ' . a:name
endfunction
function! Public(name)
  return s:Greet(a:name)
endfunction
echo Public('Alice')
"#;
        let path = create_test_script(content, "source");

        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_file(&path).expect("script should be readable");
        assert_eq!(engine.take_messages(), vec!["Hello, Alice"]);

        // Script-local items stay private to the file.
        engine.execute("echo exists('s:greeting') exists('*s:Greet') Public('Bob')");
        assert_eq!(engine.take_messages(), vec!["0 0 Hello, Bob"]);

        cleanup_test_script(&path);
    }

    #[test]
    fn test_missing_file() {
        let mut engine = Engine::captured(EngineConfig::default());
        let err = engine.source_file("/nonexistent/script.vim").unwrap_err();
        assert_eq!(err, ScriptError::CantOpenFile("/nonexistent/script.vim".to_string()));
    }

    #[test]
    fn test_config_file_limits_call_depth() {
        let path = create_test_script(r#"{ "max_func_depth": 3 }"#, "config");
        let config = EngineConfig::from_json_file(&path).expect("valid config");
        assert_eq!(config.max_func_depth, 3);

        let mut engine = Engine::captured(config);
        engine.source_str(
            "deep.vim",
            "function! R(n)\n  if a:n > 10\n    return a:n\n  endif\n  return R(a:n + 1)\nendfunction\ncall R(0)",
        );
        let out = engine.take_messages();
        assert!(
            out.iter().any(|l| l == "E132: Function call depth is higher than 'maxfuncdepth'"),
            "{:?}",
            out
        );

        cleanup_test_script(&path);
    }
}

#[cfg(test)]
mod exception_tests {
    use super::*;

    #[test]
    fn test_throw_from_function_is_caught() {
        let out = run(r#"function! Fail()
  throw 'boom'
endfunction
try
  call Fail()
catch /boom/
  echo 'caught' v:exception
finally
  echo 'finally'
endtry
echo 'done'"#);
        assert_eq!(out, vec!["caught boom", "finally", "done"]);
    }

    #[test]
    fn test_error_becomes_exception() {
        let out = run("try\n  echo nosuch\ncatch /^Vim(echo):E121/\n  echo v:exception\nendtry");
        assert_eq!(out, vec!["Vim(echo):E121: Undefined variable: nosuch"]);
    }

    #[test]
    fn test_uncaught_exception_reported_in_function() {
        let out = run("function! F()\n  throw 'x'\nendfunction\ncall F()\necho 'not reached'");
        assert_eq!(
            out,
            vec![
                "Error detected while processing function F:",
                "line    1:",
                "E605: Exception not caught: x"
            ]
        );
    }

    #[test]
    fn test_return_runs_finally() {
        let out = run(r#"function! F()
  try
    return 'r'
  finally
    echo 'cleanup'
  endtry
  echo 'not reached'
endfunction
echo F()"#);
        assert_eq!(out, vec!["cleanup", "r"]);
    }

    #[test]
    fn test_break_runs_finally() {
        let out = run(r#"for i in [1, 2, 3]
  try
    if i == 2
      break
    endif
    echo i
  finally
    echo 'f' . i
  endtry
endfor
echo 'out'"#);
        assert_eq!(out, vec!["1", "f1", "f2", "out"]);
    }

    #[test]
    fn test_rethrow_from_catch() {
        let out = run(r#"try
  try
    throw 'inner'
  catch
    throw 'outer:' . v:exception
  endtry
catch /^outer/
  echo v:exception
endtry"#);
        assert_eq!(out, vec!["outer:inner"]);
    }

    #[test]
    fn test_vim_prefix_cannot_be_thrown() {
        let out = run("function! Stop()\n  throw 'Vim:Interrupt'\nendfunction\ntry\n  call Stop()\ncatch\n  echo v:exception\nendtry");
        assert_eq!(out, vec!["Vim(throw):E608: Cannot :throw exceptions with 'Vim' prefix"]);
    }

    #[test]
    fn test_abort_function_stops_at_error() {
        let out = run(r#"function! A() abort
  echo nosuch
  echo 'not reached'
endfunction
call A()
echo 'next'"#);
        assert!(!out.iter().any(|l| l == "not reached"), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("next"));
        assert!(out.iter().any(|l| l == "E121: Undefined variable: nosuch"));
    }

    #[test]
    fn test_deferred_calls_run_while_exception_is_pending() {
        let out = run(r#"function! Log(s)
  echo a:s
endfunction
function! F()
  defer Log('one')
  defer Log('two')
  throw 'x'
endfunction
try
  call F()
catch
  echo 'caught ' . v:exception
endtry"#);
        assert_eq!(out, vec!["two", "one", "caught x"]);
    }
}

#[cfg(test)]
mod conditional_tests {
    use super::*;

    #[test]
    fn test_inactive_blocks_are_skipped() {
        let out = run("if 0\n  echo 'bad'\nendif\nlet i = 0\nwhile i < 2\n  echo i\n  let i += 1\nendwhile\necho 'ok'");
        assert_eq!(out, vec!["0", "1", "ok"]);
    }

    #[test]
    fn test_only_first_matching_catch_runs() {
        let out = run(r#"try
  throw 'E1'
catch /E/
  echo 'c1'
catch /E1/
  echo 'c2'
endtry
echo 'done'"#);
        assert_eq!(out, vec!["c1", "done"]);
    }

    #[test]
    fn test_unmatched_exception_leaves_endtry() {
        let out = run(r#"try
  try
    throw 'inner'
  catch /nomatch/
    echo 'wrong'
  endtry
  echo 'skipped'
catch /inner/
  echo 'outer caught ' . v:exception
endtry"#);
        assert_eq!(out, vec!["outer caught inner"]);
    }

    #[test]
    fn test_continue_runs_finally() {
        let out = run(r#"for i in [1, 2]
  try
    if i == 1
      continue
    endif
    echo i
  finally
    echo 'f' . i
  endtry
endfor"#);
        assert_eq!(out, vec!["f1", "2", "f2"]);
    }

    #[test]
    fn test_finish_runs_finally() {
        let out = run("try\n  finish\nfinally\n  echo 'cleanup'\nendtry\necho 'not reached'");
        assert_eq!(out, vec!["cleanup"]);
    }

    #[test]
    fn test_error_runs_finally() {
        let out = run("try\n  echo nosuch\nfinally\n  echo 'cleanup'\nendtry\necho 'next'");
        assert_eq!(out.first().map(String::as_str), Some("cleanup"));
        assert!(out.iter().any(|l| l == "E121: Undefined variable: nosuch"), "{:?}", out);
        assert!(!out.iter().any(|l| l == "next"), "{:?}", out);
    }

    #[test]
    fn test_interrupt_runs_finally() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.register_native("Stop", |engine, _| {
            engine.interrupt_handle().interrupt();
            Ok(Value::Number(0))
        });
        engine.source_str(
            "int.vim",
            "try\n  call Stop()\n  echo 'not reached'\nfinally\n  echo 'cleanup'\nendtry\necho 'after'",
        );
        let out = engine.take_messages();
        assert_eq!(out.first().map(String::as_str), Some("cleanup"));
        assert!(!out.iter().any(|l| l == "not reached" || l == "after"), "{:?}", out);
    }

    #[test]
    fn test_nesting_too_deep() {
        let config = EngineConfig {
            cstack_len: 1,
            ..EngineConfig::default()
        };
        let cases = [
            ("if 1\n  if 1\n  endif\nendif", "E579: :if nesting too deep"),
            ("for i in [1]\n  for j in [2]\n  endfor\nendfor", "E585: :while/:for nesting too deep"),
            ("try\n  try\n  endtry\nendtry", "E601: :try nesting too deep"),
        ];
        for (script, expected) in cases {
            let mut engine = Engine::captured(config.clone());
            engine.source_str("deep.vim", script);
            let out = engine.take_messages();
            assert!(out.iter().any(|l| l == expected), "{}: {:?}", expected, out);
        }
    }

    #[test]
    fn test_stray_block_ends_then_recovery() {
        let out = run("catch\nfinally\nendtry\nendwhile\nendfor\ntry\n  throw 'ok'\ncatch\n  echo 'recovered ' . v:exception\nendtry");
        for expected in [
            "E603: :catch without :try",
            "E606: :finally without :try",
            "E602: :endtry without :try",
            "E588: :endwhile without :while",
            "E588: :endfor without :for",
        ] {
            assert!(out.iter().any(|l| l == expected), "{}: {:?}", expected, out);
        }
        assert_eq!(out.last().map(String::as_str), Some("recovered ok"));
    }
}

#[cfg(test)]
mod function_tests {
    use super::*;

    #[test]
    fn test_lambda_captures_arguments() {
        let out = run("function! MakeAdder(n)\n  return {x -> x + a:n}\nendfunction\nlet Add3 = MakeAdder(3)\necho Add3(4) Add3(10)");
        assert_eq!(out, vec!["7 13"]);
    }

    #[test]
    fn test_partial_with_dict() {
        let out = run(r#"let counter = {'n': 0}
function counter.bump(step) dict
  let self.n += a:step
  return self.n
endfunction
let Bump = function(counter.bump, [5], counter)
call Bump()
call Bump()
echo counter.n"#);
        assert_eq!(out, vec!["10"]);
    }

    #[test]
    fn test_double_quoted_arguments() {
        let out = run("echo \"abc\" 'd'\nexecute \"echo 'a'\"\nfunction! Q()\n  return \"x\"\nendfunction\necho Q()");
        assert_eq!(out, vec!["abc d", "a", "x"]);
    }

    #[test]
    fn test_varargs_loop_runs_once_per_item() {
        let out = run("function! Sum(...)\n  let total = 0\n  for n in a:000\n    let total += n\n  endfor\n  return total\nendfunction\necho Sum(1, 2, 3)");
        assert_eq!(out, vec!["6"]);
    }

    #[test]
    fn test_execute_defines_function() {
        let out = run("execute \"function! Dyn()\\nreturn 5\\nendfunction\"\necho Dyn()");
        assert_eq!(out, vec!["5"]);
    }

    #[test]
    fn test_native_functions() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.register_native("Twice", |_, args| Ok(Value::Number(args[0].to_number()? * 2)));
        engine.source_str("native.vim", "echo Twice(21)\nlet g:r = call('Twice', [4])");
        assert_eq!(engine.take_messages(), vec!["42"]);
        assert_eq!(engine.global("r").map(|v| v.repr()), Some("8".to_string()));

        let result = engine.call_function("Twice", &[Value::Number(5)]).unwrap();
        assert_eq!(result.repr(), "10");
    }

    #[test]
    fn test_call_function_from_embedder() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("lib.vim", "function! Sum(...)\n  let total = 0\n  for n in a:000\n    let total += n\n  endfor\n  return total\nendfunction");
        let sum = engine
            .call_function("Sum", &[1.into(), 2.into(), 3.into()])
            .unwrap();
        assert_eq!(sum.repr(), "6");
        assert!(matches!(
            engine.call_function("Nope", &[]),
            Err(ScriptError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_json_values() {
        let mut engine = Engine::captured(EngineConfig::default());
        let decoded = engine.eval(r#"json_decode('{"a": [1, 2], "b": "x"}')"#).unwrap();
        let expected = Value::dict(btreemap! {
            "a".to_string() => Value::list(vec![1.into(), 2.into()]),
            "b".to_string() => "x".into(),
        });
        assert!(decoded.loose_eq(&expected, false).unwrap());

        engine.set_global(
            "cfg",
            Value::dict(btreemap! {
                "on".to_string() => Value::Number(1),
            }),
        );
        let encoded = engine.eval("json_encode(g:cfg)").unwrap();
        assert_eq!(encoded.to_display(), r#"{"on":1}"#);
    }

    #[test]
    fn test_garbage_collect_keeps_live_closures() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str(
            "gc.vim",
            r#"function! Counter()
  let n = 0
  function! Inc() closure
    let n += 1
    return n
  endfunction
  return funcref('Inc')
endfunction
let C = Counter()
call garbagecollect()"#,
        );
        engine.execute("echo C() C()");
        assert_eq!(engine.take_messages(), vec!["1 2"]);
    }
}

#[cfg(test)]
mod interrupt_tests {
    use super::*;

    #[test]
    fn test_interrupt_stops_script() {
        let mut engine = Engine::captured(EngineConfig::default());
        let handle = engine.interrupt_handle();
        handle.interrupt();
        engine.source_str("int.vim", "echo 'a'\necho 'b'\necho 'c'");
        let out = engine.take_messages();
        assert!(!out.iter().any(|l| l == "c"), "{:?}", out);
        assert!(out.iter().any(|l| l == "Interrupted"), "{:?}", out);
    }

    #[test]
    fn test_cleanup_commands_from_native() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.register_native("RunCleanup", |engine, _| {
            engine.execute_cleanup("let g:ran = 1");
            Ok(Value::from(engine.is_aborting()))
        });
        engine.source_str("cleanup.vim", "echo RunCleanup() g:ran");
        assert_eq!(engine.take_messages(), vec!["0 1"]);
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;

    const MAKE: &str = "function! Make()\n  let n = 1\n  return {-> n}\nendfunction\nlet F = Make()";

    #[test]
    fn test_captured_frame_is_released() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("make.vim", MAKE);
        assert_eq!(engine.retained_frames(), 1);
        engine.execute("echo F()");
        assert_eq!(engine.take_messages(), vec!["1"]);

        engine.execute("unlet F");
        assert_eq!(engine.retained_frames(), 0);
    }

    #[test]
    fn test_gc_root_keeps_frame() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("make.vim", MAKE);
        let closure = engine.global("F").expect("closure defined");
        engine.add_gc_root(closure);
        engine.execute("unlet F\ncall garbagecollect()");
        assert_eq!(engine.retained_frames(), 1);
    }
}
