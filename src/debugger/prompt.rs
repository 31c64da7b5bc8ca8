//! The debug prompt and the breakpoint commands.

use super::breakpoints::{BreakKind, BreakSpec};
use super::context::{backtrace_lines, max_backtrace_level, BREAK_ALWAYS, NO_BREAK};
use super::DebugCommand;
use crate::error::{ScriptError, ScriptResult};
use crate::executor::{DoCmdFlags, Engine, StringSource};
use crate::parser::ExArg;
use crate::value::Value;
use tracing::debug;

/// How a watch value is shown in "Oldval"/"Newval".
fn watch_text(value: Option<&Value>) -> String {
    value.map_or_else(|| "(does not exist)".to_string(), Value::repr)
}

impl Engine {
    /// Stop at a breakpoint or after a stepping command, before `cmd` runs.
    /// A command that is only parsed does not stop; it is remembered for
    /// `dbg_check_skipped`.
    pub(crate) fn dbg_check_breakpoint(&mut self, cmd: &str, skip: bool) {
        self.debugger.skipped = false;
        if let Some((name, lnum)) = self.debugger.pending_hit.take() {
            if !skip {
                debug!(name = %name, lnum, "breakpoint hit");
                self.debug_msg(&format!("Breakpoint in \"{}\" line {}", name, lnum));
                self.do_debug(cmd);
            } else {
                self.debugger.skipped = true;
                self.debugger.skipped_hit = Some((name, lnum));
            }
        } else if self.debugger.should_stop_at(self.ctx.ex_nesting_level) {
            if !skip {
                self.do_debug(cmd);
            } else {
                self.debugger.skipped = true;
                self.debugger.skipped_hit = None;
            }
        }
    }

    /// Give a stop that was skipped while the command was only parsed a
    /// second chance, now that it turned out to be executed after all.
    pub(crate) fn dbg_check_skipped(&mut self, eap: &ExArg) -> bool {
        if !self.debugger.skipped {
            return false;
        }
        let prev_got_int = std::mem::take(&mut self.ctx.got_int);
        self.debugger.pending_hit = self.debugger.skipped_hit.take();
        self.dbg_check_breakpoint(&eap.cmdline, false);
        self.ctx.got_int |= prev_got_int;
        true
    }

    /// Remember a breakpoint reached while fetching a line.
    pub(crate) fn dbg_breakpoint(&mut self, name: &str, lnum: usize) {
        self.debugger.pending_hit = Some((name.to_string(), lnum));
    }

    /// Line of the next breakpoint in function or file `name` after line
    /// `after`, 0 when there is none.  Watch expressions are evaluated
    /// here; a changed value stops at once.
    pub(crate) fn dbg_find_breakpoint(&mut self, file: bool, name: &str, after: usize) -> usize {
        let lnum = self.debugger.registry.next_line(file, name, after);

        for idx in 0..self.debugger.registry.len() {
            let expr = match self.debugger.registry.get_mut(idx) {
                Some(bp) if bp.kind == BreakKind::Expr => bp.name.clone(),
                _ => continue,
            };
            let new = self.eval_quiet(&expr);
            let Some(bp) = self.debugger.registry.get_mut(idx) else {
                break;
            };
            let changed = match (&bp.value, &new) {
                (None, None) => false,
                (Some(old), Some(new)) => !old.is_same(new),
                _ => true,
            };
            if changed {
                let old = std::mem::replace(&mut bp.value, new);
                self.debugger.oldval = Some(watch_text(old.as_ref()));
                self.debugger.newval = Some(watch_text(bp.value.as_ref()));
                debug!(expr = %expr, "watch expression changed");
                return if after > 0 { after } else { 1 };
            }
        }

        lnum
    }

    fn show_debug_line(&mut self, cmd: &str) {
        let line = if self.sourcing.lnum != 0 {
            format!("line {}: {}", self.sourcing.lnum, cmd)
        } else {
            format!("cmd: {}", cmd)
        };
        self.debug_msg(&line);
    }

    fn show_backtrace(&mut self, cmd: &str) {
        let name = self.sourcing.name.clone();
        for line in backtrace_lines(name.as_deref(), self.debugger.backtrace_level) {
            self.debug_msg(&line);
        }
        self.show_debug_line(cmd);
    }

    fn check_backtrace_level(&mut self, level: i64) {
        let max = max_backtrace_level(self.sourcing.name.as_deref());
        if level < 0 {
            self.debugger.backtrace_level = 0;
            self.debug_msg("frame is zero");
        } else if level as usize > max {
            self.debugger.backtrace_level = max;
            self.debug_msg(&format!("frame at highest level: {}", max));
        } else {
            self.debugger.backtrace_level = level as usize;
        }
    }

    fn set_backtrace_level(&mut self, arg: &str) {
        let level: i64 = arg
            .trim_start_matches('+')
            .parse()
            .unwrap_or(0);
        let current = self.debugger.backtrace_level as i64;
        if arg.starts_with('+') || level < 0 {
            self.check_backtrace_level(current + level);
        } else {
            self.check_backtrace_level(level);
        }
    }

    /// The debug prompt: read commands until one resumes execution.
    pub(crate) fn do_debug(&mut self, cmd: &str) {
        let save_did_emsg = std::mem::take(&mut self.ctx.did_emsg);
        let save_emsg_silent = std::mem::take(&mut self.ctx.emsg_silent);

        if !self.debugger.did_msg {
            self.debug_msg("Entering Debug mode.  Type \"cont\" to continue.");
        }
        if let Some(old) = self.debugger.oldval.take() {
            self.debug_msg(&format!("Oldval = \"{}\"", old));
        }
        if let Some(new) = self.debugger.newval.take() {
            self.debug_msg(&format!("Newval = \"{}\"", new));
        }
        if let Some(name) = self.sourcing.name.clone() {
            self.debug_msg(&name);
        }
        self.show_debug_line(cmd);

        let outer_frames = self.debugger.prompt_frames.replace(self.frames.len());
        let nesting = self.ctx.ex_nesting_level;

        loop {
            let Some(line) = self.debugger.read_command() else {
                // No more input: run to the end.
                self.debugger.break_level = NO_BREAK;
                self.debugger.backtrace_level = 0;
                break;
            };

            let mut arg = String::new();
            if !line.trim().is_empty() {
                self.debugger.last_cmd = DebugCommand::parse(&line).map(|(c, a)| {
                    arg = a.to_string();
                    c
                });
            }

            let Some(command) = self.debugger.last_cmd else {
                // Not a debugger command: execute it with breakpoints off.
                let saved_level = self.debugger.break_level;
                self.debugger.break_level = NO_BREAK;
                let mut source = StringSource::new(vec![line], None);
                self.do_cmdline(&mut source, DoCmdFlags::EXCRESET);
                self.debugger.break_level = saved_level;
                continue;
            };

            match command {
                DebugCommand::Cont => self.debugger.break_level = NO_BREAK,
                DebugCommand::Next => self.debugger.break_level = nesting,
                DebugCommand::Step => self.debugger.break_level = BREAK_ALWAYS,
                DebugCommand::Finish => self.debugger.break_level = nesting - 1,
                DebugCommand::Quit => {
                    self.ctx.got_int = true;
                    self.debugger.break_level = NO_BREAK;
                }
                DebugCommand::Interrupt => {
                    self.ctx.got_int = true;
                    self.debugger.break_level = BREAK_ALWAYS;
                    // Typing Enter afterwards steps.
                    self.debugger.last_cmd = Some(DebugCommand::Step);
                }
                DebugCommand::Backtrace => self.show_backtrace(cmd),
                DebugCommand::Frame => {
                    if arg.is_empty() {
                        self.show_backtrace(cmd);
                    } else {
                        self.set_backtrace_level(&arg);
                    }
                }
                DebugCommand::Up | DebugCommand::Down => {
                    let count = arg.parse::<i64>().unwrap_or(1);
                    let step = if command == DebugCommand::Up { count } else { -count };
                    let current = self.debugger.backtrace_level as i64;
                    self.check_backtrace_level(current + step);
                }
            }
            if !command.resumes() {
                continue;
            }
            debug!(?command, break_level = self.debugger.break_level, "leaving debug prompt");
            self.debugger.backtrace_level = 0;
            break;
        }

        self.debugger.prompt_frames = outer_frames;
        self.ctx.did_emsg = save_did_emsg;
        self.ctx.emsg_silent = save_emsg_silent;
        self.debugger.did_msg = true;
    }

    /// Add a breakpoint from a `breakadd` argument; returns its number.
    pub fn add_breakpoint(&mut self, arg: &str) -> ScriptResult<usize> {
        let spec = BreakSpec::parse(arg)?;
        let value = match spec.kind {
            BreakKind::Expr => self.eval_quiet(&spec.name),
            _ => None,
        };
        let nr = self.debugger.registry.add(spec, value)?.nr;
        self.ctx.debug_tick += 1;
        debug!(nr, "breakpoint added");
        Ok(nr)
    }

    pub(crate) fn ex_breakadd(&mut self, eap: &mut ExArg) {
        if let Err(err) = self.add_breakpoint(&eap.arg) {
            eap.errmsg = Some(err);
        }
    }

    pub(crate) fn ex_breakdel(&mut self, eap: &mut ExArg) {
        let arg = eap.arg.trim().to_string();
        let not_found = || ScriptError::BreakpointNotFound(arg.clone());

        if arg.starts_with(|c: char| c.is_ascii_digit()) {
            let removed = arg
                .parse::<usize>()
                .ok()
                .and_then(|nr| self.debugger.registry.remove_nr(nr));
            if removed.is_none() {
                eap.errmsg = Some(not_found());
                return;
            }
            self.ctx.debug_tick += 1;
        } else if arg == "*" {
            let n = self.debugger.registry.clear();
            self.ctx.debug_tick += n as u64;
        } else {
            let spec = match BreakSpec::parse(&arg) {
                Ok(spec) => spec,
                Err(err) => {
                    eap.errmsg = Some(err);
                    return;
                }
            };
            if self.debugger.registry.remove_spec(&spec).is_none() {
                eap.errmsg = Some(not_found());
                return;
            }
            self.ctx.debug_tick += 1;
        }
        debug!(arg = %arg, "breakpoint deleted");
    }

    pub(crate) fn ex_breaklist(&mut self, _eap: &mut ExArg) {
        for line in self.debugger.registry.listing() {
            self.msg(&line);
        }
    }

    /// `:debug CMD`: run one command stepping through it.
    pub(crate) fn ex_debug(&mut self, eap: &mut ExArg) {
        let saved_level = self.debugger.break_level;
        self.debugger.break_level = BREAK_ALWAYS;
        let mut source = StringSource::new(vec![eap.arg.clone()], None);
        self.do_cmdline(&mut source, DoCmdFlags::default());
        self.debugger.break_level = saved_level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_text() {
        assert_eq!(watch_text(None), "(does not exist)");
        assert_eq!(watch_text(Some(&Value::from("a"))), "'a'");
        assert_eq!(watch_text(Some(&Value::Number(4))), "4");
    }
}
