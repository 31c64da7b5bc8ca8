use super::source::{LineSource, SourceKind};
use super::Engine;
use crate::condstack::{CondStack, PendingAction, Search};
use crate::error::ScriptError;
use crate::parser::{parse_command, split_bar, BarMode, CmdId, ExArg};
use std::fs;
use tracing::trace;

/// Commands that accept nothing but a comment after them.
fn takes_no_arg(cmd: CmdId) -> bool {
    matches!(
        cmd,
        CmdId::Else
            | CmdId::Endif
            | CmdId::Endwhile
            | CmdId::Endfor
            | CmdId::Try
            | CmdId::Finally
            | CmdId::Endtry
            | CmdId::Endfunction
            | CmdId::Continue
            | CmdId::Break
            | CmdId::Finish
            | CmdId::Breaklist
    )
}

impl Engine {
    /// Execute one command of `line`.  Returns the rest of the line after
    /// a `|`, when there is more to do.
    pub(crate) fn do_one_cmd(
        &mut self,
        line: &str,
        cstack: &mut CondStack,
        source: &mut dyn LineSource,
    ) -> Option<String> {
        self.ctx.ex_nesting_level += 1;
        self.poll_interrupt();

        let head = parse_command(line);
        if head.cmd_text.is_empty() || head.cmd_text.starts_with('"') {
            self.ctx.ex_nesting_level -= 1;
            return None;
        }

        let saved_msg_silent = self.msg_silent;
        let mut did_esilent = 0usize;
        if head.mods.silent_bang {
            self.ctx.emsg_silent += 1;
            did_esilent = 1;
            self.msg_silent += 1;
        } else if head.mods.silent {
            self.msg_silent += 1;
        }
        if head.mods.sandbox {
            self.ctx.sandbox += 1;
        }

        let mut skip = self.skip_command(cstack);
        self.dbg_check_breakpoint(line, skip);
        if !skip && self.ctx.got_int {
            skip = true;
            self.do_intthrow(cstack);
        }

        let mut errmsg: Option<ScriptError> = None;
        let mut nextcmd: Option<String> = None;
        let mut cmdname: Option<&'static str> = None;

        'doend: {
            let Some(def) = head.def else {
                if skip {
                    nextcmd = split_bar(head.arg).1.map(str::to_string);
                } else {
                    errmsg = Some(ScriptError::NotACommand(head.cmd_text.trim().to_string()));
                }
                break 'doend;
            };
            cmdname = Some(def.name);

            let arg = match def.bar {
                BarMode::Split => {
                    let (arg, rest) = split_bar(head.arg);
                    nextcmd = rest.map(str::to_string);
                    arg
                }
                BarMode::Expr | BarMode::Rest => head.arg,
            };
            let mut eap = ExArg::new(def, line, arg, head.bang, skip);

            // Skipped commands only matter for the block structure, or to
            // find where the next command starts.
            if skip && !def.structural && def.bar != BarMode::Expr {
                break 'doend;
            }

            if takes_no_arg(def.id) && !eap.arg.is_empty() && !eap.arg.starts_with('"') {
                errmsg = Some(ScriptError::TrailingCharacters(eap.arg.clone()));
                break 'doend;
            }
            if !skip && self.ctx.sandbox > 0 && !def.sandbox_ok {
                errmsg = Some(ScriptError::Sandbox);
                break 'doend;
            }

            // ":silent! try" is handled by the try conditional itself.
            if def.id == CmdId::Try && did_esilent > 0 {
                self.ctx.emsg_silent = self.ctx.emsg_silent.saturating_sub(did_esilent);
                did_esilent = 0;
            }

            trace!(cmd = def.name, skip, "executing");
            self.dispatch(&mut eap, cstack, source);

            // A nested dispatcher left an exception, or a :return or
            // :finish, for this one to act on.
            if self.ctx.need_rethrow {
                self.do_throw(cstack);
            } else if self.ctx.check_cstack {
                match source.kind() {
                    SourceKind::Script if source.has_ended(self) => self.do_finish(cstack, source, true),
                    SourceKind::Function if self.current_frame().map_or(false, |f| f.returned) => {
                        self.do_return(cstack, true, None);
                    }
                    _ => {}
                }
            }
            self.ctx.need_rethrow = false;
            self.ctx.check_cstack = false;

            errmsg = eap.errmsg.take();
            if let Some(next) = eap.nextcmd.take() {
                nextcmd = Some(next);
            }
        }

        if let Some(err) = errmsg {
            if !self.ctx.did_emsg {
                self.emsg(&err);
            }
        }
        self.do_errthrow(Some(cstack), cmdname);

        if head.mods.silent || head.mods.silent_bang {
            // A serious error may have enabled messages again.
            if !self.ctx.did_emsg || self.msg_silent > saved_msg_silent {
                self.msg_silent = saved_msg_silent;
            }
        }
        self.ctx.emsg_silent = self.ctx.emsg_silent.saturating_sub(did_esilent);
        if head.mods.sandbox {
            self.ctx.sandbox = self.ctx.sandbox.saturating_sub(1);
        }

        self.ctx.ex_nesting_level -= 1;
        nextcmd.filter(|next| !next.trim().is_empty())
    }

    fn dispatch(&mut self, eap: &mut ExArg, cstack: &mut CondStack, source: &mut dyn LineSource) {
        match eap.cmd {
            CmdId::Break => self.ex_break(eap, cstack),
            CmdId::Breakadd => self.ex_breakadd(eap),
            CmdId::Breakdel => self.ex_breakdel(eap),
            CmdId::Breaklist => self.ex_breaklist(eap),
            CmdId::Call => self.ex_call(eap),
            CmdId::Catch => self.ex_catch(eap, cstack),
            CmdId::Continue => self.ex_continue(eap, cstack),
            CmdId::Debug => self.ex_debug(eap),
            CmdId::Defer => self.ex_defer(eap),
            CmdId::Delfunction => self.ex_delfunction(eap),
            CmdId::Echo | CmdId::Echon => self.ex_echo(eap),
            CmdId::Echoerr | CmdId::Echomsg => self.ex_echomsg(eap),
            CmdId::Else => self.ex_else(eap, cstack, false),
            CmdId::Elseif => self.ex_else(eap, cstack, true),
            CmdId::Endfor => self.ex_endwhile(eap, cstack, true),
            CmdId::Endfunction => self.ex_endfunction(eap),
            CmdId::Endif => self.ex_endif(eap, cstack),
            CmdId::Endtry => self.ex_endtry(eap, cstack, source),
            CmdId::Endwhile => self.ex_endwhile(eap, cstack, false),
            CmdId::Execute => self.ex_execute(eap, source),
            CmdId::Finally => self.ex_finally(eap, cstack),
            CmdId::Finish => self.ex_finish(eap, cstack, source),
            CmdId::For => self.ex_while(eap, cstack, true),
            CmdId::Function => self.ex_function(eap, source),
            CmdId::If => self.ex_if(eap, cstack),
            CmdId::Let => self.ex_let(eap),
            CmdId::Return => self.ex_return(eap, cstack),
            CmdId::Source => self.ex_source(eap),
            CmdId::Throw => self.ex_throw(eap, cstack),
            CmdId::Try => self.ex_try(eap, cstack),
            CmdId::Unlet => self.ex_unlet(eap),
            CmdId::While => self.ex_while(eap, cstack, false),
        }
    }

    fn ex_finish(&mut self, eap: &mut ExArg, cstack: &mut CondStack, source: &mut dyn LineSource) {
        if source.kind() == SourceKind::Script {
            self.do_finish(cstack, source, false);
        } else {
            eap.errmsg = Some(ScriptError::FinishOutsideSource);
        }
    }

    /// End the sourced script, or make the `:finish` pending on a try that
    /// has a finally clause to run first.  `reanimate` is set when the
    /// `:finish` came from a nested dispatcher and is checked again here.
    pub(crate) fn do_finish(&mut self, cstack: &mut CondStack, source: &mut dyn LineSource, reanimate: bool) {
        if reanimate {
            source.set_finished(false);
        }
        match self.cleanup_conditionals(cstack, Search::Nothing, true) {
            Some(idx) => {
                cstack.level_mut(idx).pending = PendingAction::Finish;
                self.report_pending("made pending", &PendingAction::Finish, None);
            }
            None => source.set_finished(true),
        }
    }

    fn ex_source(&mut self, eap: &mut ExArg) {
        let path = eap.arg.trim();
        if path.is_empty() {
            eap.errmsg = Some(ScriptError::ArgumentRequired);
            return;
        }
        let path = path.to_string();
        match fs::read_to_string(&path) {
            Ok(text) => self.do_source(&path, &text),
            Err(_) => eap.errmsg = Some(ScriptError::CantOpenFile(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::executor::Engine;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("cmd.vim", script);
        engine.take_messages()
    }

    #[test]
    fn test_bar_separated_commands() {
        assert_eq!(run("echo 1 | echo 2 | \" comment"), vec!["1", "2"]);
    }

    #[test]
    fn test_unknown_command() {
        let out = run("frobnicate now");
        assert_eq!(out.last().map(String::as_str), Some("E492: Not an editor command: frobnicate now"));
    }

    #[test]
    fn test_trailing_characters() {
        // The :endif is rejected, so the :if is still open at the end.
        let out = run("if 1\nendif junk");
        assert_eq!(
            out,
            vec![
                "Error detected while processing cmd.vim:",
                "line    2:",
                "E488: Trailing characters: junk",
                "line    3:",
                "E171: Missing :endif"
            ]
        );
    }

    #[test]
    fn test_silent_bang_hides_errors() {
        assert_eq!(run("silent! echo nosuch\necho 'after'"), vec!["after"]);
        assert_eq!(run("silent echo 'quiet'\necho 'loud'"), vec!["loud"]);
    }

    #[test]
    fn test_skipped_commands_keep_structure() {
        let out = run("if 0 | echo 'no' | frobnicate | endif\nif 0\n  echo nosuch\nelse\n  echo 'yes'\nendif");
        assert_eq!(out, vec!["yes"]);
    }

    #[test]
    fn test_source_not_allowed_in_sandbox() {
        let out = run("sandbox source /tmp/none.vim");
        assert_eq!(out.last().map(String::as_str), Some("E48: Not allowed in sandbox"));
    }

    #[test]
    fn test_source_missing_file() {
        let out = run("source /nonexistent/file.vim");
        assert_eq!(
            out.last().map(String::as_str),
            Some("E484: Can't open file /nonexistent/file.vim")
        );
    }

    #[test]
    fn test_finish_outside_script() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.execute("finish");
        assert_eq!(
            engine.take_messages(),
            vec!["E168: :finish used outside of a sourced file"]
        );
    }

    #[test]
    fn test_finish_stops_script() {
        assert_eq!(run("echo 1\nfinish\necho 2"), vec!["1"]);
    }
}
