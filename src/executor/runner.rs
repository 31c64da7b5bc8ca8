use super::engine::Sourcing;
use super::source::{LineSource, SourceKind};
use super::{DoCmdFlags, Engine};
use crate::condstack::{end_emsg, CondStack, Counted, ExceptionKind, Search};
use crate::error::ScriptError;
use crate::parser::{has_loop_cmd, SourceLine};
use tracing::{debug, trace};

impl Engine {
    /// The statement dispatcher: execute lines from `source` until it runs
    /// out, or until an error, interrupt or exception that no try
    /// conditional handles ends it.  Returns false when it stopped early.
    pub(crate) fn do_cmdline(&mut self, source: &mut dyn LineSource, flags: DoCmdFlags) -> bool {
        if self.cmdline_depth >= self.config.max_cmdline_depth
            && self.cmdline_depth >= self.config.max_func_depth
        {
            self.emsg(&ScriptError::CommandTooRecursive);
            // There is no conditional stack yet, the caller rethrows.
            self.do_errthrow(None, None);
            return false;
        }
        self.cmdline_depth += 1;

        let kind = source.kind();
        let mut cstack = CondStack::new(self.config.cstack_len);
        // Lines kept while a loop is open, to jump back to its start.
        let mut lines: Vec<SourceLine> = Vec::new();
        let mut current_line = 0usize;
        let mut next_cmdline: Option<String> = None;
        let mut retval = true;

        // Commands of a function body run one level deeper than the call.
        if kind == SourceKind::Function && self.ctx.ex_nesting_level == source.level(self) {
            self.ctx.ex_nesting_level += 1;
        }

        if self.cmdline_depth == 1 {
            self.ctx.force_abort = false;
            self.ctx.suppress_errthrow = false;
        }

        let saved_debug = flags.excreset.then(|| self.ctx.take_debug_state());
        let initial_trylevel = self.ctx.trylevel;
        self.ctx.did_emsg = false;
        let saved_msg_list = self.ctx.msg_list.take();
        trace!(depth = self.cmdline_depth, ?kind, "dispatcher started");

        'lines: loop {
            // An error only skips up to the end of the line or block, unless
            // it aborts.
            if next_cmdline.is_none()
                && !self.ctx.force_abort
                && cstack.is_empty()
                && !(kind == SourceKind::Function && source.has_abort(self))
            {
                self.ctx.did_emsg = false;
            }

            if cstack.looplevel > 0 && current_line < lines.len() {
                // Replay a stored loop line.
                if source.has_ended(self) || source.aborted(self) {
                    retval = false;
                    break 'lines;
                }
                let stored = lines[current_line].clone();
                source.check_replayed(self, stored.lnum);
                self.sourcing.lnum = stored.lnum;
                next_cmdline = Some(stored.text);
            } else if next_cmdline.is_none() {
                match source.next_line(self) {
                    Some(line) => next_cmdline = Some(line.text),
                    None => {
                        retval = false;
                        break 'lines;
                    }
                }
            }

            let Some(cmdline) = next_cmdline.take() else {
                break 'lines;
            };

            // Inside a loop, and for a line starting one, keep the line
            // (each '|' separated part on its own) to be able to jump back.
            if current_line == lines.len() && (cstack.looplevel > 0 || has_loop_cmd(&cmdline)) {
                lines.push(SourceLine::new(cmdline.clone(), self.sourcing.lnum));
            }

            next_cmdline = self.do_one_cmd(&cmdline, &mut cstack, source);

            // An error in a function without "abort" does not end it.
            if self.ctx.did_emsg
                && !self.ctx.force_abort
                && kind == SourceKind::Function
                && !source.has_abort(self)
            {
                self.ctx.did_emsg = false;
            }

            if cstack.looplevel > 0 {
                current_line += 1;

                if cstack.lflags.had_cont || cstack.lflags.had_endloop {
                    cstack.lflags.had_cont = false;
                    cstack.lflags.had_endloop = false;

                    let clean = !self.ctx.did_emsg && !self.ctx.got_int && self.ctx.current_exception.is_none();
                    let jump = match cstack.top() {
                        Some(top) if clean && top.kind.is_loop() && top.state.active => top.loop_line,
                        _ => None,
                    };
                    match jump {
                        Some(loop_line) => {
                            current_line = loop_line;
                            cstack.lflags.had_loop = true;
                            self.poll_interrupt();
                            if let Some(start) = lines.get(current_line) {
                                let after = start.lnum.saturating_sub(1);
                                source.recheck_breakpoint(self, after);
                            }
                        }
                        // Only an :endwhile or :endfor gets here.
                        None => {
                            if let Some(top) = cstack.top_index() {
                                cstack.rewind_to(top.checked_sub(1), Counted::Loops);
                            }
                        }
                    }
                } else if cstack.lflags.had_loop {
                    cstack.lflags.had_loop = false;
                    if let Some(top) = cstack.top_mut() {
                        top.loop_line = Some(current_line - 1);
                    }
                }
            }

            if self.debugger.registry.has_watch() {
                let lnum = self.sourcing.lnum;
                source.recheck_breakpoint(self, lnum);
            }

            if cstack.looplevel == 0 {
                if let Some(last) = lines.last() {
                    self.sourcing.lnum = last.lnum;
                }
                lines.clear();
                current_line = 0;
            }

            // A :finally parks the error, interrupt and exception on its
            // level (see ex_finally) and makes the clause run.
            if cstack.lflags.had_finally {
                cstack.lflags.had_finally = false;
                self.ctx.did_emsg = false;
                self.ctx.got_int = false;
                self.ctx.current_exception = None;
                if let Some(top) = cstack.top_mut() {
                    top.state.active = true;
                    top.state.finally = true;
                }
            }

            self.ctx.trylevel = initial_trylevel + cstack.trylevel;

            // Leaving the outermost try normally ends the abort mode.
            if self.ctx.trylevel == 0
                && !self.ctx.did_emsg
                && !self.ctx.got_int
                && self.ctx.current_exception.is_none()
            {
                self.ctx.force_abort = false;
            }

            self.do_intthrow(&mut cstack);

            let aborting = (self.ctx.got_int
                || (self.ctx.did_emsg && self.ctx.force_abort)
                || self.ctx.current_exception.is_some())
                && cstack.trylevel == 0;
            let more = next_cmdline.is_some()
                || !cstack.is_empty()
                || flags.repeat
                || source.has_pending_lines();
            if aborting || !more {
                break 'lines;
            }
        }

        // Blocks left open by a script or function that ran to its end.
        if let Some(top) = cstack.top() {
            let ran_out = match kind {
                SourceKind::Command => false,
                _ => !(source.has_ended(self) || source.aborted(self)),
            };
            if ran_out && !self.ctx.got_int && self.ctx.current_exception.is_none() {
                let err = end_emsg(top);
                self.emsg(&err);
            }
        }

        // Unwind what is left.  Pending actions of finally clauses are
        // discarded, caught exceptions finished.
        while !cstack.is_empty() {
            let idx = self.cleanup_conditionals(&mut cstack, Search::Nothing, true);
            cstack.rewind_to(idx.and_then(|i| i.checked_sub(1)), Counted::Loops);
        }
        self.ctx.trylevel = initial_trylevel;

        // An error reported above becomes an exception now.
        let end_cmd = (kind == SourceKind::Function).then_some("endfunction");
        self.do_errthrow(Some(&mut cstack), end_cmd);

        if self.ctx.trylevel == 0 {
            if self.ctx.current_exception.is_some() {
                self.handle_did_throw();
            } else if self.ctx.got_int || (self.ctx.did_emsg && self.ctx.force_abort) {
                self.ctx.suppress_errthrow = true;
            }
        }

        // Exceptions and :return/:finish in a nested dispatcher also have
        // to be seen by the conditional stack of the one that called it.
        if self.ctx.current_exception.is_some() {
            self.ctx.need_rethrow = true;
        }
        let level = source.level(self);
        let nested = match kind {
            SourceKind::Script => self.ctx.ex_nesting_level > level,
            SourceKind::Function => self.ctx.ex_nesting_level > level + 1,
            SourceKind::Command => false,
        };
        if nested {
            if self.ctx.current_exception.is_none() {
                self.ctx.check_cstack = true;
            }
        } else {
            if kind == SourceKind::Function {
                self.ctx.ex_nesting_level -= 1;
            }
            if kind != SourceKind::Command && self.ctx.ex_nesting_level + 1 <= self.debugger.break_level {
                let what = if kind == SourceKind::Script {
                    "End of sourced file"
                } else {
                    "End of function"
                };
                self.do_debug(what);
            }
        }

        if let Some(saved) = saved_debug {
            self.ctx.restore_debug_state(saved);
        }
        self.ctx.msg_list = saved_msg_list;
        self.cmdline_depth -= 1;
        trace!(depth = self.cmdline_depth, retval, "dispatcher finished");
        retval
    }

    /// Report an exception nobody caught and stop everything: a user
    /// exception as E605, an error exception with its own messages.
    fn handle_did_throw(&mut self) {
        let Some(exc) = self.ctx.current_exception.clone() else {
            return;
        };
        debug!(value = %exc.value, "exception not caught");
        let mut errors: Vec<ScriptError> = match exc.kind {
            ExceptionKind::User => vec![ScriptError::UncaughtException(exc.value.clone())],
            ExceptionKind::Error => exc.messages.iter().cloned().map(ScriptError::Message).collect(),
            ExceptionKind::Interrupt => Vec::new(),
        };

        // Messages appear where the exception was thrown.
        let saved_sourcing = std::mem::replace(
            &mut self.sourcing,
            Sourcing {
                name: exc.throw_name.clone(),
                lnum: exc.throw_lnum,
            },
        );
        self.discard_current_exception();

        // With "silent!" an uncaught exception is not fatal.
        if self.ctx.emsg_silent == 0 {
            self.ctx.suppress_errthrow = true;
            self.ctx.force_abort = true;
        }
        for err in errors.drain(..) {
            self.emsg(&err);
        }
        self.sourcing = saved_sourcing;
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::executor::Engine;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("test.vim", script);
        engine.take_messages()
    }

    #[test]
    fn test_while_loop_replays_stored_lines() {
        let out = run("let i = 0\nwhile i < 3\n  echo i\n  let i += 1\nendwhile\necho 'done'");
        assert_eq!(out, vec!["0", "1", "2", "done"]);
    }

    #[test]
    fn test_loop_on_one_line() {
        let out = run("let i = 2 | while i > 0 | echo i | let i -= 1 | endwhile");
        assert_eq!(out, vec!["2", "1"]);
    }

    #[test]
    fn test_missing_endif_is_reported() {
        // Reported at the line after the last one.
        let out = run("if 1\necho 'in'");
        assert_eq!(
            out,
            vec![
                "in",
                "Error detected while processing test.vim:",
                "line    3:",
                "E171: Missing :endif"
            ]
        );
    }

    #[test]
    fn test_uncaught_exception_reported_at_throw_point() {
        let out = run("echo 'a'\nthrow 'oops'\necho 'b'");
        assert_eq!(
            out,
            vec![
                "a",
                "Error detected while processing test.vim:",
                "line    2:",
                "E605: Exception not caught: oops"
            ]
        );
    }

    #[test]
    fn test_error_outside_try_continues_script() {
        let out = run("echo nosuchvar\necho 'next'");
        assert_eq!(out.last().map(String::as_str), Some("next"));
        assert!(out.iter().any(|l| l == "E121: Undefined variable: nosuchvar"));
    }

    #[test]
    fn test_command_recursion_limit() {
        let config = EngineConfig {
            max_func_depth: 5,
            max_cmdline_depth: 3,
            ..EngineConfig::default()
        };
        let mut engine = Engine::captured(config);
        engine.source_str(
            "rec.vim",
            "let g:n = 0\nfunction! R()\n  let g:n += 1\n  execute 'call R()'\nendfunction\ncall R()",
        );
        let out = engine.take_messages();
        assert!(out.iter().any(|l| l.contains("E169: Command too recursive")), "{:?}", out);
    }
}
