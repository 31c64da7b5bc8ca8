// tests/interactive_simulation.rs
// Simulates interactive debugging sessions

use exscript::debugger::BREAK_ALWAYS;
use exscript::{Engine, EngineConfig, Message, ScriptedInput};
use std::fs;
use std::path::PathBuf;

#[cfg(test)]
mod interactive_tests {
    use super::*;

    const ENTERING: &str = "Entering Debug mode.  Type \"cont\" to continue.";

    // Helper to create test files
    fn create_test_script(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("exscript_dbg_{}_{}.vim", std::process::id(), name));
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    fn cleanup(path: &PathBuf) {
        let _ = fs::remove_file(path);
    }

    fn engine_with(commands: &[&str], breakpoints: &[&str]) -> Engine {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.set_debug_input(Box::new(ScriptedInput::new(commands.iter().copied())));
        for bp in breakpoints {
            engine.add_breakpoint(bp).expect("valid breakpoint");
        }
        engine
    }

    fn texts(engine: &mut Engine) -> Vec<String> {
        engine.take_messages()
    }

    fn debug_lines(engine: &Engine) -> Vec<String> {
        engine
            .output()
            .iter()
            .filter_map(|m| match m {
                Message::Debug(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_function_breakpoint_then_continue() {
        let mut engine = engine_with(&["cont"], &["func F"]);
        engine.source_str(
            "t.vim",
            "function! F()\necho 'in'\necho 'two'\nendfunction\ncall F()\necho 'after'",
        );
        assert_eq!(
            texts(&mut engine),
            vec![
                "Breakpoint in \"F\" line 1",
                ENTERING,
                "function F",
                "line 1: echo 'in'",
                "in",
                "two",
                "after"
            ]
        );
    }

    #[test]
    fn test_step_and_next_in_script() {
        let mut engine = engine_with(&["next", "cont"], &[]);
        engine.set_break_level(BREAK_ALWAYS);
        engine.source_str("s.vim", "let x = 1\nlet x += 1\necho x");
        assert_eq!(
            texts(&mut engine),
            vec![
                ENTERING,
                "s.vim",
                "line 1: let x = 1",
                "s.vim",
                "line 2: let x += 1",
                "2"
            ]
        );
    }

    #[test]
    fn test_step_into_function() {
        let mut engine = engine_with(&["step", "step", "cont"], &[]);
        engine.set_break_level(BREAK_ALWAYS);
        engine.source_str(
            "t.vim",
            "function! F()\necho 'f1'\necho 'f2'\nendfunction\ncall F()\necho 'end'",
        );
        assert_eq!(
            texts(&mut engine),
            vec![
                ENTERING,
                "t.vim",
                "line 1: function! F()",
                "t.vim",
                "line 5: call F()",
                "function F",
                "line 1: echo 'f1'",
                "f1",
                "f2",
                "end"
            ]
        );
    }

    #[test]
    fn test_next_steps_over_function() {
        let mut engine = engine_with(&["step", "next"], &[]);
        engine.set_break_level(BREAK_ALWAYS);
        engine.source_str(
            "t.vim",
            "function! F()\necho 'f1'\necho 'f2'\nendfunction\ncall F()\necho 'end'",
        );
        let out = texts(&mut engine);
        assert_eq!(
            &out[out.len() - 5..],
            &["f1", "f2", "t.vim", "line 6: echo 'end'", "end"]
        );
        assert!(!out.iter().any(|l| l == "function F"), "{:?}", out);
    }

    #[test]
    fn test_finish_stops_at_end_of_function() {
        let mut engine = engine_with(&["finish", "cont"], &["func F"]);
        engine.source_str(
            "t.vim",
            "function! F()\necho 'f1'\necho 'f2'\nendfunction\ncall F()\necho 'end'",
        );
        let out = texts(&mut engine);
        let f2 = out.iter().position(|l| l == "f2").expect("function ran");
        assert!(out[f2 + 1..].iter().any(|l| l.ends_with("End of function")), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("end"));
    }

    #[test]
    fn test_backtrace_and_frames() {
        let mut engine = engine_with(&["bt", "up", "bt", "up", "down 5", "cont"], &["func G"]);
        engine.source_str(
            "t.vim",
            "function! G()\necho 'g'\nendfunction\nfunction! F()\ncall G()\nendfunction\ncall F()",
        );
        assert_eq!(
            texts(&mut engine),
            vec![
                "Breakpoint in \"G\" line 1",
                ENTERING,
                "function F[1]..G",
                "line 1: echo 'g'",
                "  1 function F[1]",
                "->0 G",
                "line 1: echo 'g'",
                "->1 function F[1]",
                "  0 G",
                "line 1: echo 'g'",
                "frame at highest level: 1",
                "frame is zero",
                "g"
            ]
        );
    }

    #[test]
    fn test_commands_at_prompt_see_locals() {
        let mut engine = engine_with(&["echo n", "cont"], &["func 2 F"]);
        engine.source_str(
            "t.vim",
            "function! F()\nlet n = 41\nlet n += 1\necho n\nendfunction\ncall F()",
        );
        assert_eq!(
            texts(&mut engine),
            vec![
                "Breakpoint in \"F\" line 2",
                ENTERING,
                "function F",
                "line 2: let n += 1",
                "41",
                "42"
            ]
        );
    }

    #[test]
    fn test_watch_expression_reports_changes() {
        let mut engine = engine_with(&["cont", "cont"], &["expr g:x"]);
        engine.source_str(
            "w.vim",
            "let g:x = 1\necho 'one'\nlet g:x = 2\necho 'two'\necho 'three'",
        );
        assert_eq!(
            debug_lines(&engine),
            vec![
                "Breakpoint in \"w.vim\" line 2",
                ENTERING,
                "Oldval = \"(does not exist)\"",
                "Newval = \"1\"",
                "w.vim",
                "line 2: echo 'one'",
                "Breakpoint in \"w.vim\" line 4",
                "Oldval = \"1\"",
                "Newval = \"2\"",
                "w.vim",
                "line 4: echo 'two'"
            ]
        );
        let out = texts(&mut engine);
        assert_eq!(&out[out.len() - 1..], &["three"]);
    }

    #[test]
    fn test_watch_expression_fires_on_change_only() {
        let mut engine = engine_with(&["cont"], &[]);
        engine.execute("let g:x = 1");
        engine.add_breakpoint("expr g:x > 3").expect("valid breakpoint");
        engine.source_str(
            "w.vim",
            "let g:x = 2\nlet g:x = 4\nlet g:x = 4\nlet g:x = 5\necho 'end'",
        );
        assert_eq!(
            debug_lines(&engine),
            vec![
                "Breakpoint in \"w.vim\" line 3",
                ENTERING,
                "Oldval = \"0\"",
                "Newval = \"1\"",
                "w.vim",
                "line 3: let g:x = 4"
            ]
        );
        assert_eq!(texts(&mut engine).last().map(String::as_str), Some("end"));
    }

    #[test]
    fn test_file_breakpoint_by_base_name() {
        let path = create_test_script("file", "echo 'one'\necho 'two'\n");
        let base = path.file_name().and_then(|n| n.to_str()).expect("utf-8 name").to_string();
        let spec = format!("file 2 {}", base);
        let mut engine = engine_with(&["cont"], &[spec.as_str()]);
        engine.source_file(&path).expect("script should be readable");
        let name = path.display().to_string();
        assert_eq!(
            texts(&mut engine),
            vec![
                "one".to_string(),
                format!("Breakpoint in \"{}\" line 2", name),
                ENTERING.to_string(),
                name.clone(),
                "line 2: echo 'two'".to_string(),
                "two".to_string()
            ]
        );
        cleanup(&path);
    }

    #[test]
    fn test_quit_interrupts_script() {
        let mut engine = engine_with(&["quit"], &[]);
        engine.set_break_level(BREAK_ALWAYS);
        engine.source_str("q.vim", "echo 'a'\necho 'b'");
        let out = texts(&mut engine);
        assert!(!out.iter().any(|l| l == "b"), "{:?}", out);
    }

    #[test]
    fn test_end_of_input_continues() {
        let mut engine = engine_with(&[], &[]);
        engine.set_break_level(BREAK_ALWAYS);
        engine.source_str("e.vim", "echo 'a'\necho 'b'");
        assert_eq!(texts(&mut engine), vec![ENTERING, "e.vim", "line 1: echo 'a'", "a", "b"]);
    }

    #[test]
    fn test_debug_command() {
        let mut engine = engine_with(&["cont"], &[]);
        engine.execute("debug echo 'x'");
        assert_eq!(texts(&mut engine), vec![ENTERING, "cmd: echo 'x'", "x"]);
    }

    #[test]
    fn test_breakpoint_commands() {
        let mut engine = engine_with(&[], &[]);
        engine.execute("breakadd func 3 Foo\nbreakadd file *.vim\nbreakadd expr g:y\nbreaklist");
        assert_eq!(
            texts(&mut engine),
            vec!["  1  func Foo  line 3", "  2  file *.vim  line 1", "  3  expr g:y"]
        );

        engine.execute("breakdel 2\nbreakdel func Foo\nbreaklist");
        assert_eq!(texts(&mut engine), vec!["  3  expr g:y"]);

        engine.execute("breakdel 7");
        assert_eq!(texts(&mut engine), vec!["E161: Breakpoint not found: 7"]);

        engine.execute("breakdel *\nbreaklist");
        assert_eq!(texts(&mut engine), vec!["No breakpoints defined"]);
    }

    #[test]
    fn test_breakpoint_added_during_run() {
        let mut engine = engine_with(&["cont"], &[]);
        engine.source_str(
            "t.vim",
            "function! F()\necho 'f1'\necho 'f2'\nendfunction\nbreakadd func 2 F\ncall F()",
        );
        assert_eq!(
            texts(&mut engine),
            vec![
                "f1",
                "Breakpoint in \"F\" line 2",
                ENTERING,
                "function F",
                "line 2: echo 'f2'",
                "f2"
            ]
        );
    }
}
