//! Result-code discipline shared by every subsystem.
//!
//! Commands and library calls report their outcome through two cooperating
//! pieces: a typed error (`EdError`, carried in `EdResult<T>`) that unwinds
//! through `?`, and a session-wide register (`ResultChannel`) that remembers
//! the most severe outcome plus its message for the message line. Writes to
//! the register are severity-gated so the worst failure in a call chain is
//! the one the user sees.
//!
//! Informational outcomes (not-found, end-of-file, no-such-file) never travel
//! through either piece; callers return `Option`/sentinels for those.

use std::fmt;
use thiserror::Error;

/// Outcome severity, ordered worst-first. The derived `Ord` follows
/// declaration order, so `Panic < OSError < ... < Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Unrecoverable internal failure; restore the terminal and exit.
    Panic,
    /// Fatal OS error (errno context).
    OSError,
    /// Fatal library error.
    FatalError,
    /// Script forced exit with dirty buffers.
    ScriptExit,
    /// Clean exit, or user forced exit with dirty buffers.
    UserExit,
    /// Help/version/usage switch exit.
    HelpExit,
    /// Command failed during script execution.
    ScriptError,
    /// Command failed.
    Failure,
    /// Command aborted by the user (abort key).
    UserAbort,
    /// Command cancelled by the user (empty response to a prompt).
    Cancelled,
    /// Search or retrieval was unsuccessful. Never stored in the register.
    NotFound,
    /// Command succeeded.
    Success,
}

impl Severity {
    /// True for severities that terminate the process once they reach the
    /// main loop (`HelpExit` and worse).
    pub fn is_exit(self) -> bool {
        self <= Self::HelpExit
    }

    /// True for the user-visible failure band that unwinds to the command
    /// loop (or to the nearest `!force` in a script).
    pub fn is_user_visible(self) -> bool {
        matches!(
            self,
            Self::ScriptError | Self::Failure | Self::UserAbort | Self::Cancelled
        )
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Panic => "panic",
            Self::OSError => "OS error",
            Self::FatalError => "fatal error",
            Self::ScriptExit => "script exit",
            Self::UserExit => "exit",
            Self::HelpExit => "help exit",
            Self::ScriptError => "script error",
            Self::Failure => "failure",
            Self::UserAbort => "abort",
            Self::Cancelled => "cancelled",
            Self::NotFound => "not found",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}

/// The error type every fallible editor entry point returns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EdError {
    pub severity: Severity,
    pub message: String,
}

impl EdError {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// `Failure` with a message: the everyday error.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(Severity::Failure, message)
    }

    /// `ScriptError` with a message.
    pub fn script(message: impl Into<String>) -> Self {
        Self::new(Severity::ScriptError, message)
    }

    /// User hit the abort key.
    pub fn aborted() -> Self {
        Self::new(Severity::UserAbort, "Aborted")
    }

    /// User gave an empty response to a required prompt.
    pub fn cancelled() -> Self {
        Self::new(Severity::Cancelled, "")
    }
}

pub type EdResult<T> = Result<T, EdError>;

bitflags::bitflags! {
    /// Flags qualifying a result-channel write or its pending message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RcFlags: u16 {
        /// Write even if the new severity is milder than the current one.
        const FORCE = 1 << 0;
        /// Don't wrap the message in `[ ]` when painting.
        const NO_WRAP = 1 << 1;
        /// Keep the message past the next command-loop iteration.
        const KEEP = 1 << 2;
        /// High-priority Success message: overwrites a non-high one.
        const HIGH = 1 << 3;
        /// Message contains `~`-escape terminal attributes.
        const TERM_ATTR = 1 << 4;
    }
}

/// Session-wide status register. One per session; written only through
/// [`ResultChannel::set`], which enforces the severity gate.
#[derive(Debug, Clone)]
pub struct ResultChannel {
    status: Severity,
    flags: RcFlags,
    message: String,
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultChannel {
    pub fn new() -> Self {
        Self {
            status: Severity::Success,
            flags: RcFlags::empty(),
            message: String::new(),
        }
    }

    pub fn status(&self) -> Severity {
        self.status
    }

    pub fn flags(&self) -> RcFlags {
        self.flags
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Record an outcome. A write milder than the current status is dropped
    /// unless `FORCE` is set; an equal-severity Success write replaces the
    /// pending message only when `HIGH` outranks it or none is pending.
    /// Returns the severity now held.
    pub fn set(&mut self, severity: Severity, flags: RcFlags, message: &str) -> Severity {
        if !flags.contains(RcFlags::FORCE) {
            if severity > self.status {
                // Milder than what we already hold: drop.
                return self.status;
            }
            if severity == Severity::Success
                && self.status == Severity::Success
                && !self.message.is_empty()
                && !flags.contains(RcFlags::HIGH)
                && self.flags.contains(RcFlags::HIGH)
            {
                return self.status;
            }
        }
        self.status = severity;
        self.flags = flags;
        self.message.clear();
        self.message.push_str(message);
        self.status
    }

    /// Record an error through the same gate.
    pub fn set_error(&mut self, err: &EdError) -> Severity {
        self.set(err.severity, RcFlags::empty(), &err.message)
    }

    /// Top-of-loop reset: drop the message (unless `KEEP`) and return the
    /// register to Success so the next command starts clean.
    pub fn clear(&mut self) {
        if !self.flags.contains(RcFlags::KEEP) {
            self.message.clear();
            self.flags = RcFlags::empty();
        } else {
            self.flags.remove(RcFlags::KEEP);
        }
        self.status = Severity::Success;
    }

    /// True when a message is pending for the message line.
    pub fn has_message(&self) -> bool {
        !self.message.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn severity_ordering_worst_first() {
        assert!(Severity::Panic < Severity::OSError);
        assert!(Severity::HelpExit < Severity::ScriptError);
        assert!(Severity::Failure < Severity::UserAbort);
        assert!(Severity::NotFound < Severity::Success);
        assert!(Severity::Panic.is_exit());
        assert!(Severity::HelpExit.is_exit());
        assert!(!Severity::ScriptError.is_exit());
    }

    #[test]
    fn milder_write_is_dropped() {
        let mut rc = ResultChannel::new();
        rc.set(Severity::Failure, RcFlags::empty(), "first failure");
        let held = rc.set(Severity::Success, RcFlags::empty(), "all good");
        assert_eq!(held, Severity::Failure);
        assert_eq!(rc.message(), "first failure");
    }

    #[test]
    fn worse_write_replaces() {
        let mut rc = ResultChannel::new();
        rc.set(Severity::Failure, RcFlags::empty(), "failed");
        rc.set(Severity::UserExit, RcFlags::empty(), "bye");
        assert_eq!(rc.status(), Severity::UserExit);
        assert_eq!(rc.message(), "bye");
    }

    #[test]
    fn force_overrides_gate() {
        let mut rc = ResultChannel::new();
        rc.set(Severity::Failure, RcFlags::empty(), "failed");
        rc.set(Severity::Success, RcFlags::FORCE, "overridden");
        assert_eq!(rc.status(), Severity::Success);
        assert_eq!(rc.message(), "overridden");
    }

    #[test]
    fn high_success_message_sticks() {
        let mut rc = ResultChannel::new();
        rc.set(Severity::Success, RcFlags::HIGH, "important");
        let held = rc.set(Severity::Success, RcFlags::empty(), "routine");
        assert_eq!(held, Severity::Success);
        assert_eq!(rc.message(), "important");
    }

    #[test]
    fn clear_respects_keep() {
        let mut rc = ResultChannel::new();
        rc.set(Severity::Success, RcFlags::KEEP, "sticky");
        rc.clear();
        assert_eq!(rc.message(), "sticky");
        rc.clear();
        assert_eq!(rc.message(), "");
    }

    #[test]
    fn error_constructors() {
        assert_eq!(EdError::aborted().severity, Severity::UserAbort);
        assert_eq!(EdError::cancelled().severity, Severity::Cancelled);
        assert_eq!(EdError::failure("x").severity, Severity::Failure);
        assert!(EdError::failure("no such thing").to_string().contains("no such thing"));
    }
}
