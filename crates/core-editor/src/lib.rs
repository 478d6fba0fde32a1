//! The editor session: state assembly, command table and dispatch, file
//! I/O, and the keystroke interaction cycle.
//!
//! Everything user-visible funnels through [`Session`]: buffers, windows,
//! modes, rings, bindings, the interpreter, and the result channel. The
//! terminal front end supplies a [`Ui`] implementation (key reads and
//! prompts); scripts run against the same command table with prompting
//! suppressed.

pub mod commands;
pub mod file;
pub mod interact;
pub mod session;

pub use commands::{CmdFlags, CommandSpec, command_index, command_table, dispatch};
pub use interact::interact_once;
pub use session::Session;

use core_input::ExtKey;
use core_status::EdResult;

/// Supplied by the front end: raw key reads and message-line prompting.
/// Tests drive scenarios through scripted implementations.
pub trait Ui {
    /// Blocking read of the next assembled key from the terminal.
    fn read_key(&mut self) -> EdResult<ExtKey>;

    /// Prompt on the message line; `None` means the user cancelled with an
    /// empty response.
    fn prompt(&mut self, msg: &str) -> EdResult<Option<String>>;

    /// Prompt for a single key (query-replace responses, fence pause).
    fn ask_key(&mut self, msg: &str) -> EdResult<ExtKey>;
}

/// A `Ui` for script execution: prompting is suppressed, so any prompt is a
/// script error.
pub struct ScriptUi;

impl Ui for ScriptUi {
    fn read_key(&mut self) -> EdResult<ExtKey> {
        Err(core_status::EdError::script(
            "Keyboard input not available in a script",
        ))
    }

    fn prompt(&mut self, msg: &str) -> EdResult<Option<String>> {
        Err(core_status::EdError::script(format!(
            "Missing argument: {}",
            msg
        )))
    }

    fn ask_key(&mut self, msg: &str) -> EdResult<ExtKey> {
        Err(core_status::EdError::script(format!(
            "Keyboard input not available in a script: {}",
            msg
        )))
    }
}
