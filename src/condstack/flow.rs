//! Conditional and exception commands.
//!
//! Every handler also runs while commands are being skipped, so that the
//! block structure stays intact; `ExArg::skip` tells them whether to act.

use super::{CondKind, CondLevel, CondStack, Counted, Exception, ExceptionKind, PendingAction};
use super::{error_exception_value, has_vim_prefix};
use crate::context::{CleanupState, MsgList};
use crate::error::ScriptError;
use crate::executor::{Engine, LineSource};
use crate::parser::{compile_pattern, find_nextcmd, skip_pattern, ExArg};
use std::rc::Rc;
use tracing::{debug, warn};

/// Kind of level `cleanup_conditionals` is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Search {
    /// Stop at the first active try (used by throw, return and finish).
    Nothing,
    Loop,
    Try,
    /// Like `Try`, also restoring `emsg_silent` of the level found.
    TrySilent,
}

impl Search {
    fn matches(self, level: &CondLevel) -> bool {
        match self {
            Search::Nothing => false,
            Search::Loop => level.kind.is_loop(),
            Search::Try | Search::TrySilent => level.kind == CondKind::Try,
        }
    }
}

/// Text for "made pending", "resumed" and "discarded" reports.
fn describe_pending(pending: &PendingAction, exception: Option<&Rc<Exception>>) -> Option<String> {
    match pending {
        PendingAction::None => None,
        PendingAction::Continue => Some(":continue".to_string()),
        PendingAction::Break => Some(":break".to_string()),
        PendingAction::Finish => Some(":finish".to_string()),
        PendingAction::Return(Some(value)) => Some(format!(":return {}", value.repr())),
        PendingAction::Return(None) => Some(":return".to_string()),
        PendingAction::Signal {
            error,
            interrupt,
            exception: thrown,
        } => {
            if *thrown {
                exception.map(|e| format!("Exception: {}", e.value))
            } else if *error && *interrupt {
                Some("Error and interrupt".to_string())
            } else if *error {
                Some("Error".to_string())
            } else {
                Some("Interrupt".to_string())
            }
        }
    }
}

/// Error for a level left open at the end of its block or script.
pub(crate) fn end_emsg(level: &CondLevel) -> ScriptError {
    match level.kind {
        CondKind::While => ScriptError::MissingEndwhile,
        CondKind::For => ScriptError::MissingEndfor,
        CondKind::If => ScriptError::MissingEndif,
        CondKind::Try => ScriptError::MissingEndtry,
    }
}

impl Engine {
    /// The current command must not be executed: error, interrupt or
    /// exception pending, or the innermost level is inactive.
    pub(crate) fn skip_command(&self, cstack: &CondStack) -> bool {
        self.pending_abort() || cstack.top_inactive()
    }

    /// Like `skip_command`, for a block command whose own level is the
    /// innermost one: only the level enclosing it counts.
    pub(crate) fn check_skip(&self, cstack: &CondStack) -> bool {
        self.pending_abort() || cstack.enclosing_inactive()
    }

    fn pending_abort(&self) -> bool {
        self.ctx.did_emsg || self.ctx.got_int || self.ctx.current_exception.is_some()
    }

    /// Exception tracing, shown as messages while debugging.
    fn exception_event(&mut self, text: String) {
        debug!("{}", text);
        if self.debugger.break_level > 0 || self.config.verbose >= 13 {
            self.msg(&text);
        }
    }

    pub(crate) fn report_pending(&mut self, what: &str, pending: &PendingAction, exception: Option<&Rc<Exception>>) {
        if let Some(desc) = describe_pending(pending, exception) {
            self.exception_event(format!("{} {}", desc, what));
        }
    }

    // --- Exception primitives ---

    /// Turn an error message into part of an error exception instead of
    /// displaying it.  Returns true when the message was taken.
    pub(crate) fn cause_errthrow(&mut self, mesg: &str, ignore: &mut bool) -> bool {
        if self.ctx.suppress_errthrow {
            return false;
        }
        if !self.ctx.did_emsg {
            self.ctx.cause_abort = self.ctx.force_abort;
            self.ctx.force_abort = false;
        }
        if ((self.ctx.trylevel == 0 && !self.ctx.cause_abort) || self.ctx.emsg_silent > 0)
            && self.ctx.current_exception.is_none()
        {
            return false;
        }
        if mesg == ScriptError::Interrupted.to_string() {
            *ignore = true;
            return true;
        }
        self.ctx.cause_abort = true;

        if let Some(exc) = self.ctx.current_exception.clone() {
            if exc.kind == ExceptionKind::Interrupt {
                self.ctx.got_int = false;
            }
            self.discard_current_exception();
        }

        let list = self.ctx.msg_list.get_or_insert_with(MsgList::default);
        list.messages.push(mesg.to_string());
        if list.throw_msg.is_none() {
            list.throw_msg = Some(list.messages.len() - 1);
        }
        true
    }

    /// Throw the messages collected by `cause_errthrow` as one error exception.
    pub(crate) fn do_errthrow(&mut self, cstack: Option<&mut CondStack>, cmdname: Option<&str>) {
        if self.ctx.cause_abort {
            self.ctx.cause_abort = false;
            self.ctx.force_abort = true;
        }
        let list = match self.ctx.msg_list.as_mut() {
            Some(list) if !list.is_empty() => std::mem::take(list),
            _ => return,
        };
        if self.throw_error_exception(list, cmdname) {
            match cstack {
                Some(cs) => self.do_throw(cs),
                None => self.ctx.need_rethrow = true,
            }
        }
    }

    /// Convert a pending interrupt into an exception.  Returns true when one
    /// was thrown (or an interrupt exception is already being thrown).
    pub(crate) fn do_intthrow(&mut self, cstack: &mut CondStack) -> bool {
        if !self.ctx.got_int || (self.ctx.trylevel == 0 && self.ctx.current_exception.is_none()) {
            return false;
        }
        match self.ctx.current_exception.as_ref().map(|e| e.kind) {
            Some(ExceptionKind::Interrupt) => return false,
            Some(_) => self.discard_current_exception(),
            None => {}
        }
        if self.throw_exception("Vim:Interrupt".to_string(), ExceptionKind::Interrupt) {
            self.do_throw(cstack);
        }
        true
    }

    /// Make `value` the current exception.  User values with the "Vim"
    /// prefix are refused.
    pub(crate) fn throw_exception(&mut self, value: String, kind: ExceptionKind) -> bool {
        if kind == ExceptionKind::User && has_vim_prefix(&value) {
            self.emsg(&ScriptError::VimPrefix);
            return false;
        }
        let mut exc = Exception::new(kind, value);
        exc.throw_name = self.sourcing.name.clone();
        exc.throw_lnum = self.sourcing.lnum;
        self.install_exception(exc);
        true
    }

    fn throw_error_exception(&mut self, list: MsgList, cmdname: Option<&str>) -> bool {
        let idx = list.throw_msg.unwrap_or(0);
        let mesg = list.messages.get(idx).cloned().unwrap_or_default();
        let mut exc = Exception::new(ExceptionKind::Error, error_exception_value(&mesg, cmdname));
        exc.messages = list.messages;
        exc.throw_name = self.sourcing.name.clone();
        exc.throw_lnum = self.sourcing.lnum;
        self.install_exception(exc);
        true
    }

    fn install_exception(&mut self, exc: Exception) {
        let exc = Rc::new(exc);
        self.exception_event(format!("Exception thrown: {}", exc.value));
        self.ctx.current_exception = Some(exc);
    }

    pub(crate) fn discard_exception(&mut self, exc: &Rc<Exception>, was_finished: bool) {
        let what = if was_finished { "finished" } else { "discarded" };
        self.exception_event(format!("Exception {}: {}", what, exc.value));
    }

    pub(crate) fn discard_current_exception(&mut self) {
        if let Some(exc) = self.ctx.current_exception.take() {
            self.discard_exception(&exc, false);
        }
        self.ctx.need_rethrow = false;
    }

    fn catch_exception(&mut self, exc: Rc<Exception>) {
        self.exception_event(format!("Exception caught: {}", exc.value));
        self.ctx.caught_stack.push(exc);
    }

    fn finish_exception(&mut self, exc: &Rc<Exception>) {
        match self.ctx.caught_stack.last() {
            Some(top) if Rc::ptr_eq(top, exc) => {
                self.ctx.caught_stack.pop();
            }
            _ => {
                warn!("finishing exception that is not on top of the caught stack: {}", exc.value);
                self.ctx.caught_stack.retain(|e| !Rc::ptr_eq(e, exc));
            }
        }
        self.discard_exception(exc, true);
    }

    /// Throw the current exception through `cstack`: deactivate levels up to
    /// the innermost active try and mark that one thrown.
    pub(crate) fn do_throw(&mut self, cstack: &mut CondStack) {
        if let Some(idx) = self.cleanup_conditionals(cstack, Search::Nothing, false) {
            let exception = self.ctx.current_exception.clone();
            let level = cstack.level_mut(idx);
            if !level.state.caught {
                level.state.thrown = level.state.active;
            }
            level.state.active = false;
            level.exception = exception;
        }
    }

    /// Make levels inactive from the top down to the one matching `searched`
    /// (or the first active try when nothing is searched).  Pending actions
    /// of try levels in their finally clause are discarded, caught
    /// exceptions finished.  Returns the index of the level where it stopped.
    pub(crate) fn cleanup_conditionals(
        &mut self,
        cstack: &mut CondStack,
        searched: Search,
        inclusive: bool,
    ) -> Option<usize> {
        let mut idx = cstack.top_index()?;
        let mut stop = false;
        loop {
            if cstack.level(idx).kind == CondKind::Try {
                let in_finally = cstack.level(idx).state.finally;
                if self.ctx.did_emsg || self.ctx.got_int || in_finally {
                    let pending = std::mem::take(&mut cstack.level_mut(idx).pending);
                    match pending {
                        PendingAction::None => {}
                        PendingAction::Signal { exception, .. } => {
                            if in_finally {
                                match cstack.level_mut(idx).exception.take() {
                                    Some(exc) if exception => self.discard_exception(&exc, false),
                                    _ => self.report_pending("discarded", &pending, None),
                                }
                            } else {
                                cstack.level_mut(idx).pending = pending;
                            }
                        }
                        other => self.report_pending("discarded", &other, None),
                    }
                }

                if !in_finally {
                    let state = cstack.level(idx).state;
                    if state.active && state.caught && !state.finished {
                        if let Some(exc) = cstack.level(idx).exception.clone() {
                            self.finish_exception(&exc);
                        }
                        cstack.level_mut(idx).state.finished = true;
                    }
                    if state.truthy {
                        if searched == Search::Nothing && !inclusive {
                            return Some(idx);
                        }
                        stop = true;
                    }
                }
            }

            if searched.matches(cstack.level(idx)) {
                if !inclusive {
                    return Some(idx);
                }
                stop = true;
            }
            cstack.level_mut(idx).state.active = false;
            if stop && searched != Search::TrySilent {
                return Some(idx);
            }

            if let Some(saved) = cstack.level_mut(idx).saved_emsg_silent.take() {
                self.ctx.emsg_silent = saved;
            }
            if stop {
                return Some(idx);
            }
            if idx == 0 {
                return None;
            }
            idx -= 1;
        }
    }

    // --- :if / :elseif / :else / :endif ---

    pub(crate) fn ex_if(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        if cstack.is_full() {
            eap.errmsg = Some(ScriptError::IfNesting);
            return;
        }
        cstack.push(CondKind::If);
        let skip = self.check_skip(cstack);
        let (result, error) = self.eval_to_bool(&eap.arg, skip, &mut eap.nextcmd);
        if let Some(top) = cstack.top_mut() {
            if !skip && !error {
                if result {
                    top.state.active = true;
                    top.state.truthy = true;
                }
            } else {
                // Skip the rest, including any :else.
                top.state.truthy = true;
            }
        }
    }

    pub(crate) fn ex_endif(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        match cstack.top() {
            Some(top) if top.kind == CondKind::If => {
                // A skipped :if still gets a chance to stop in the debugger.
                if !top.state.truthy && self.dbg_check_skipped(eap) {
                    self.do_intthrow(cstack);
                }
                cstack.pop();
            }
            _ => eap.errmsg = Some(ScriptError::EndifWithoutIf),
        }
    }

    pub(crate) fn ex_else(&mut self, eap: &mut ExArg, cstack: &mut CondStack, elseif: bool) {
        let mut skip = self.check_skip(cstack);

        match cstack.top() {
            Some(top) if top.kind == CondKind::If => {
                if top.state.else_seen {
                    if !elseif {
                        eap.errmsg = Some(ScriptError::MultipleElse);
                        return;
                    }
                    eap.errmsg = Some(ScriptError::ElseifAfterElse);
                    skip = true;
                }
            }
            _ => {
                if !elseif {
                    eap.errmsg = Some(ScriptError::ElseWithoutIf);
                    return;
                }
                eap.errmsg = Some(ScriptError::ElseifWithoutIf);
                skip = true;
            }
        }

        // An earlier branch was taken (or we are skipping): skip this one.
        let top_truthy = cstack.top().map_or(false, |t| t.state.truthy);
        if skip || top_truthy {
            if eap.errmsg.is_none() {
                if let Some(top) = cstack.top_mut() {
                    top.state.active = false;
                    top.state.truthy = true;
                }
            }
            skip = true;
        } else if let Some(top) = cstack.top_mut() {
            top.state.active = true;
        }

        if !skip && self.dbg_check_skipped(eap) && self.ctx.got_int {
            self.do_intthrow(cstack);
            skip = true;
        }

        if elseif {
            let (result, error) = self.eval_to_bool(&eap.arg, skip, &mut eap.nextcmd);
            if !skip && !error {
                if let Some(top) = cstack.top_mut() {
                    top.state.active = result;
                    top.state.truthy = result;
                }
            } else if eap.errmsg.is_none() {
                if let Some(top) = cstack.top_mut() {
                    top.state.active = false;
                    top.state.truthy = true;
                }
            }
        } else if let Some(top) = cstack.top_mut() {
            top.state.else_seen = true;
        }
    }

    // --- :while / :for / :continue / :break / :endwhile / :endfor ---

    pub(crate) fn ex_while(&mut self, eap: &mut ExArg, cstack: &mut CondStack, is_for: bool) {
        if cstack.is_full() {
            eap.errmsg = Some(ScriptError::LoopNesting);
            return;
        }
        // A jump back from :endwhile reuses the level.
        if !cstack.lflags.had_loop {
            cstack.push(CondKind::While);
            cstack.looplevel += 1;
        }
        let kind = if is_for { CondKind::For } else { CondKind::While };
        if let Some(top) = cstack.top_mut() {
            top.kind = kind;
            top.state = Default::default();
        }
        let skip = self.check_skip(cstack);

        let (result, error) = if !is_for {
            self.eval_to_bool(&eap.arg, skip, &mut eap.nextcmd)
        } else {
            let (info, error) = if cstack.lflags.had_loop {
                (cstack.top_mut().and_then(|t| t.for_info.take()), false)
            } else {
                self.eval_for_line(&eap.arg, skip, &mut eap.nextcmd)
            };
            let mut info = info;
            let result = match info.as_mut() {
                Some(fi) if !error && !skip => self.next_for_item(fi),
                _ => false,
            };
            if let Some(top) = cstack.top_mut() {
                top.for_info = if result { info } else { None };
            }
            (result, error)
        };

        if !skip && !error && result {
            if let Some(top) = cstack.top_mut() {
                top.state.active = true;
                top.state.truthy = true;
            }
            cstack.lflags.had_loop = !cstack.lflags.had_loop;
        } else {
            cstack.lflags.had_loop = false;
            if !skip && !error {
                if let Some(top) = cstack.top_mut() {
                    top.state.truthy = true;
                }
            }
        }
    }

    pub(crate) fn ex_continue(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        if cstack.looplevel == 0 || cstack.is_empty() {
            eap.errmsg = Some(ScriptError::ContinueWithoutLoop);
            return;
        }
        // Deactivate everything up to the loop, stopping early at a try
        // with a finally clause that has to run first.
        let Some(idx) = self.cleanup_conditionals(cstack, Search::Loop, false) else {
            return;
        };
        if cstack.level(idx).kind.is_loop() {
            cstack.rewind_to(Some(idx), Counted::Tries);
            cstack.lflags.had_cont = true;
        } else {
            cstack.level_mut(idx).pending = PendingAction::Continue;
            self.report_pending("made pending", &PendingAction::Continue, None);
        }
    }

    pub(crate) fn ex_break(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        if cstack.looplevel == 0 || cstack.is_empty() {
            eap.errmsg = Some(ScriptError::BreakWithoutLoop);
            return;
        }
        if let Some(idx) = self.cleanup_conditionals(cstack, Search::Loop, true) {
            if !cstack.level(idx).kind.is_loop() {
                cstack.level_mut(idx).pending = PendingAction::Break;
                self.report_pending("made pending", &PendingAction::Break, None);
            }
        }
    }

    pub(crate) fn ex_endwhile(&mut self, eap: &mut ExArg, cstack: &mut CondStack, is_endfor: bool) {
        let (err, wanted) = if is_endfor {
            (ScriptError::EndforWithoutFor, CondKind::For)
        } else {
            (ScriptError::EndwhileWithoutWhile, CondKind::While)
        };

        let Some(top_idx) = cstack.top_index().filter(|_| cstack.looplevel > 0) else {
            eap.errmsg = Some(err);
            return;
        };

        let top = cstack.level(top_idx);
        if top.kind.is_loop() && top.kind != wanted {
            eap.errmsg = Some(if top.kind == CondKind::While {
                ScriptError::EndforWithWhile
            } else {
                ScriptError::EndwhileWithFor
            });
        }

        if !top.kind.is_loop() {
            // Unclosed :if or :try inside the loop.
            eap.errmsg = Some(if top.kind != CondKind::Try {
                ScriptError::MissingEndif
            } else if top.state.finally {
                ScriptError::MissingEndtry
            } else {
                end_emsg(top)
            });

            let mut idx = top_idx;
            while idx > 0 {
                let level = cstack.level(idx);
                if level.kind == CondKind::Try && !level.state.finally {
                    // Give up at a try that still has to do its finally.
                    eap.errmsg = Some(err);
                    return;
                }
                if level.kind == wanted {
                    break;
                }
                idx -= 1;
            }
            self.cleanup_conditionals(cstack, Search::Loop, false);
            cstack.rewind_to(Some(idx), Counted::Tries);
        } else if top.state.truthy && !top.state.active && self.dbg_check_skipped(eap) {
            // Last iteration done: stop in the debugger when skipping.
            self.do_intthrow(cstack);
        }

        cstack.lflags.had_endloop = true;
    }

    // --- :throw / :try / :catch / :finally / :endtry ---

    pub(crate) fn ex_throw(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        let arg = eap.arg.trim_start();
        let value = if arg.is_empty() || arg.starts_with('|') {
            self.emsg(&ScriptError::ArgumentRequired);
            None
        } else {
            let arg = arg.to_string();
            self.eval_to_string(&arg, eap.skip, &mut eap.nextcmd)
        };

        if !eap.skip {
            if let Some(value) = value {
                if self.throw_exception(value, ExceptionKind::User) {
                    self.do_throw(cstack);
                }
            }
        }
    }

    pub(crate) fn ex_try(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        if cstack.is_full() {
            eap.errmsg = Some(ScriptError::TryNesting);
            return;
        }
        cstack.push(CondKind::Try);
        cstack.trylevel += 1;

        if !self.check_skip(cstack) {
            let emsg_silent = self.ctx.emsg_silent;
            if let Some(top) = cstack.top_mut() {
                top.state.active = true;
                top.state.truthy = true;
                // ":silent! try" lets the try conditional see the errors.
                if emsg_silent > 0 {
                    top.saved_emsg_silent = Some(emsg_silent);
                }
            }
            if emsg_silent > 0 {
                self.ctx.emsg_silent = 0;
            }
        }
    }

    pub(crate) fn ex_catch(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        let mut idx = 0;
        let mut give_up = false;
        let mut skip = false;

        if cstack.trylevel == 0 || cstack.is_empty() {
            eap.errmsg = Some(ScriptError::CatchWithoutTry);
            give_up = true;
        } else {
            let top_idx = cstack.len() - 1;
            if cstack.level(top_idx).kind != CondKind::Try {
                eap.errmsg = Some(end_emsg(cstack.level(top_idx)));
                skip = true;
            }
            idx = cstack.find_try_from(top_idx);
            if cstack.level(idx).state.finally {
                eap.errmsg = Some(ScriptError::CatchAfterFinally);
                give_up = true;
            } else {
                cstack.rewind_to(Some(idx), Counted::Loops);
            }
        }

        let arg = eap.arg.clone();
        let trimmed = arg.trim_start();
        let (pattern, rest) = if trimmed.is_empty() || trimmed.starts_with('|') || trimmed.starts_with('"') {
            eap.nextcmd = find_nextcmd(trimmed);
            (".*".to_string(), None)
        } else {
            let delim = trimmed.chars().next().unwrap_or('/');
            let body = &trimmed[delim.len_utf8()..];
            let end = skip_pattern(body, delim);
            (body[..end].to_string(), Some(body[end..].to_string()))
        };

        if !give_up {
            let throwing = self.ctx.current_exception.is_some();
            if !throwing || !cstack.level(idx).state.truthy {
                skip = true;
            }

            let mut caught = false;
            let state = cstack.level(idx).state;
            if !skip && state.thrown && !state.caught {
                if let Some(rest) = &rest {
                    let after = rest
                        .chars()
                        .next()
                        .map_or("", |d| &rest[d.len_utf8()..])
                        .trim_start();
                    if !rest.is_empty() && !(after.is_empty() || after.starts_with('|') || after.starts_with('"')) {
                        self.emsg(&ScriptError::TrailingCharacters(after.to_string()));
                        return;
                    }
                }
                if !self.dbg_check_skipped(eap) || !self.do_intthrow(cstack) {
                    match compile_pattern(&pattern, false) {
                        Err(_) => self.emsg(&ScriptError::InvalidArgument(pattern.clone())),
                        Ok(re) => {
                            let prev_got_int = std::mem::take(&mut self.ctx.got_int);
                            caught = self
                                .ctx
                                .current_exception
                                .as_ref()
                                .map_or(false, |exc| re.is_match(&exc.value));
                            self.ctx.got_int |= prev_got_int;
                        }
                    }
                }
            }

            if caught {
                let level = cstack.level_mut(idx);
                level.state.active = true;
                level.state.caught = true;
                let exc = level.exception.clone();
                self.ctx.did_emsg = false;
                self.ctx.got_int = false;
                if let Some(exc) = exc {
                    self.catch_exception(exc);
                }
                self.ctx.current_exception = None;
            } else {
                // Deactivate: the exception was caught before or this
                // catch does not match.
                self.cleanup_conditionals(cstack, Search::Try, true);
            }
        }

        if let Some(rest) = rest {
            eap.nextcmd = find_nextcmd(&rest);
        }
    }

    pub(crate) fn ex_finally(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        let mut pending_error = false;

        if cstack.trylevel == 0 || cstack.is_empty() {
            eap.errmsg = Some(ScriptError::FinallyWithoutTry);
            return;
        }

        let top_idx = cstack.len() - 1;
        let idx = if cstack.level(top_idx).kind != CondKind::Try {
            eap.errmsg = Some(end_emsg(cstack.level(top_idx)));
            pending_error = true;
            cstack.find_try_from(top_idx.saturating_sub(1))
        } else {
            top_idx
        };
        if cstack.level(idx).state.finally {
            eap.errmsg = Some(ScriptError::MultipleFinally);
            return;
        }
        cstack.rewind_to(Some(idx), Counted::Loops);

        // The finally clause runs when the try was ever active.
        let skip = !cstack.level(idx).state.truthy;
        if skip {
            return;
        }

        if self.dbg_check_skipped(eap) {
            self.do_intthrow(cstack);
        }

        // Cancel a pending :continue/:break/:return/:finish of an inner try
        // and make the one from this try pending.
        self.cleanup_conditionals(cstack, Search::Try, false);

        if pending_error
            || self.ctx.did_emsg
            || self.ctx.got_int
            || self.ctx.current_exception.is_some()
        {
            let old = std::mem::take(&mut cstack.level_mut(idx).pending);
            if let PendingAction::Return(_) = old {
                self.report_pending("discarded", &old, None);
            }
            let exception = if pending_error && !self.ctx.did_emsg {
                true
            } else {
                self.ctx.current_exception.is_some()
            };
            let pending = PendingAction::Signal {
                error: pending_error || self.ctx.did_emsg,
                interrupt: self.ctx.got_int,
                exception,
            };
            let exc = self.ctx.current_exception.clone();
            self.report_pending("made pending", &pending, exc.as_ref());
            cstack.level_mut(idx).pending = pending;
        }
        cstack.lflags.had_finally = true;
    }

    pub(crate) fn ex_endtry(&mut self, eap: &mut ExArg, cstack: &mut CondStack, source: &mut dyn LineSource) {
        if cstack.trylevel == 0 || cstack.is_empty() {
            eap.errmsg = Some(ScriptError::EndtryWithoutTry);
            return;
        }

        let mut rethrow = false;
        let top_idx = cstack.len() - 1;
        let mut skip = self.ctx.did_emsg
            || self.ctx.got_int
            || self.ctx.current_exception.is_some()
            || !cstack.level(top_idx).state.truthy;

        let idx = if cstack.level(top_idx).kind != CondKind::Try {
            eap.errmsg = Some(end_emsg(cstack.level(top_idx)));
            let idx = cstack.find_try_from(top_idx.saturating_sub(1));
            cstack.rewind_to(Some(idx), Counted::Loops);
            skip = true;
            // The exception cannot be caught or rethrown from here.
            if self.ctx.current_exception.is_some() {
                self.discard_current_exception();
            }
            idx
        } else {
            let state = cstack.level(top_idx).state;
            if self.ctx.current_exception.is_some() && state.truthy && !state.finally {
                rethrow = true;
            }
            top_idx
        };

        let state = cstack.level(idx).state;
        if (rethrow || (!skip && !state.finally && cstack.level(idx).pending.is_none()))
            && self.dbg_check_skipped(eap)
            && self.ctx.got_int
        {
            skip = true;
            self.do_intthrow(cstack);
            rethrow = self.ctx.current_exception.is_some() && !cstack.level(idx).state.finally;
        }

        let mut pending = PendingAction::None;
        if !skip {
            pending = std::mem::take(&mut cstack.level_mut(idx).pending);
            if let PendingAction::Signal { exception: true, .. } = pending {
                self.ctx.current_exception = cstack.level(idx).exception.clone();
            }
        }

        // Finish a caught exception and restore emsg_silent.
        self.cleanup_conditionals(cstack, Search::TrySilent, true);
        cstack.pop();
        cstack.trylevel = cstack.trylevel.saturating_sub(1);

        if !skip {
            let exc = self.ctx.current_exception.clone();
            self.report_pending("resumed", &pending, exc.as_ref());
            match pending {
                PendingAction::None => {}
                PendingAction::Continue => self.ex_continue(eap, cstack),
                PendingAction::Break => self.ex_break(eap, cstack),
                PendingAction::Return(value) => {
                    self.do_return(cstack, false, value);
                }
                PendingAction::Finish => self.do_finish(cstack, source, false),
                PendingAction::Signal {
                    error,
                    interrupt,
                    exception,
                } => {
                    if error {
                        self.ctx.did_emsg = true;
                    }
                    if interrupt {
                        self.ctx.got_int = true;
                    }
                    if exception {
                        rethrow = true;
                    }
                }
            }
        }

        if rethrow && self.ctx.current_exception.is_some() {
            self.do_throw(cstack);
        }
    }

    // --- cleanup around code run while an error is pending ---

    /// Park a pending error, interrupt or exception so cleanup code can run.
    pub(crate) fn enter_cleanup(&mut self) -> CleanupState {
        let ctx = &mut self.ctx;
        if !(ctx.did_emsg || ctx.got_int || ctx.current_exception.is_some() || ctx.need_rethrow) {
            return CleanupState::default();
        }
        let throw = ctx.current_exception.is_some() || ctx.need_rethrow;
        let state = CleanupState {
            error: ctx.did_emsg,
            interrupt: ctx.got_int,
            throw,
            exception: ctx.current_exception.take(),
        };
        if !throw && ctx.did_emsg {
            ctx.force_abort |= ctx.cause_abort;
            ctx.cause_abort = false;
        }
        ctx.did_emsg = false;
        ctx.got_int = false;
        ctx.need_rethrow = false;

        let pending = PendingAction::Signal {
            error: state.error,
            interrupt: state.interrupt,
            exception: state.throw,
        };
        self.report_pending("made pending", &pending, state.exception.as_ref());
        state
    }

    /// Restore what `enter_cleanup` parked, unless the cleanup code itself
    /// aborted; then the parked state is discarded.
    pub(crate) fn leave_cleanup(&mut self, state: CleanupState) {
        if !state.is_pending() {
            return;
        }
        let pending = PendingAction::Signal {
            error: state.error,
            interrupt: state.interrupt,
            exception: state.throw,
        };
        if self.ctx.aborting() || self.ctx.need_rethrow {
            match &state.exception {
                Some(exc) if state.throw => self.discard_exception(exc, false),
                _ => self.report_pending("discarded", &pending, None),
            }
            self.ctx.msg_list = Some(MsgList::default());
            return;
        }
        if state.throw {
            self.ctx.current_exception = state.exception.clone();
            self.ctx.need_rethrow = true;
        } else if state.error {
            self.ctx.cause_abort = self.ctx.force_abort;
            self.ctx.force_abort = false;
        }
        if state.error {
            self.ctx.did_emsg = true;
        }
        if state.interrupt {
            self.ctx.got_int = true;
        }
        self.report_pending("resumed", &pending, state.exception.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_describe_pending() {
        assert_eq!(describe_pending(&PendingAction::None, None), None);
        assert_eq!(
            describe_pending(&PendingAction::Return(Some(3.into())), None).as_deref(),
            Some(":return 3")
        );
        let both = PendingAction::Signal {
            error: true,
            interrupt: true,
            exception: false,
        };
        assert_eq!(describe_pending(&both, None).as_deref(), Some("Error and interrupt"));
        let exc = Rc::new(Exception::new(ExceptionKind::User, "oops".into()));
        let thrown = PendingAction::Signal {
            error: false,
            interrupt: false,
            exception: true,
        };
        assert_eq!(
            describe_pending(&thrown, Some(&exc)).as_deref(),
            Some("Exception: oops")
        );
    }

    #[test]
    fn test_caught_exception_finished_once() {
        let mut engine = Engine::captured(EngineConfig {
            verbose: 13,
            ..EngineConfig::default()
        });
        let outer = Rc::new(Exception::new(ExceptionKind::User, "outer".into()));
        let inner = Rc::new(Exception::new(ExceptionKind::User, "inner".into()));
        engine.ctx.caught_stack = vec![outer.clone(), inner.clone()];

        let mut cs = CondStack::new(10);
        let level = cs.push(CondKind::Try);
        level.state.truthy = true;
        level.state.active = true;
        level.state.caught = true;
        level.exception = Some(inner);

        engine.cleanup_conditionals(&mut cs, Search::Try, true);
        assert!(cs.level(0).state.finished);
        assert_eq!(engine.ctx.caught_stack.len(), 1);

        // Leaving the same try again leaves the outer exception alone.
        cs.level_mut(0).state.active = true;
        engine.cleanup_conditionals(&mut cs, Search::TrySilent, true);
        assert_eq!(engine.ctx.caught_stack.len(), 1);
        assert!(Rc::ptr_eq(&engine.ctx.caught_stack[0], &outer));
        let finished = engine
            .take_messages()
            .into_iter()
            .filter(|l| l == "Exception finished: inner")
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn test_search_matches() {
        let mut cs = CondStack::new(10);
        cs.push(CondKind::For);
        assert!(Search::Loop.matches(cs.level(0)));
        assert!(!Search::Try.matches(cs.level(0)));
        assert!(!Search::Nothing.matches(cs.level(0)));
    }
}
