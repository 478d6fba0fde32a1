//! Terminal implementation of the editor's `Ui`: raw key reads and
//! message-line prompting.

use core_editor::Ui;
use core_input::{ExtKey, KeyMods, encode_term};
use core_render::message;
use core_status::{EdError, EdResult};
use core_terminal::{CrosstermBackend, TermEvent, TerminalBackend};

pub struct TermUi<'a> {
    backend: &'a mut CrosstermBackend,
    resize: Option<(u16, u16)>,
}

impl<'a> TermUi<'a> {
    pub fn new(backend: &'a mut CrosstermBackend) -> Self {
        Self {
            backend,
            resize: None,
        }
    }

    /// A resize observed while reading keys, for the loop to apply.
    pub fn take_resize(&mut self) -> Option<(u16, u16)> {
        self.resize.take()
    }

    fn msg_row(&self) -> u16 {
        self.backend
            .size()
            .map(|(_, rows)| rows.saturating_sub(1))
            .unwrap_or(0)
    }

    fn paint_prompt(&mut self, msg: &str) -> EdResult<()> {
        let row = self.msg_row();
        message::paint(self.backend, row, msg, false, false)
            .and_then(|()| self.backend.flush())
            .map_err(|e| EdError::failure(format!("Terminal write failed: {}", e)))
    }
}

impl<'a> Ui for TermUi<'a> {
    fn read_key(&mut self) -> EdResult<ExtKey> {
        loop {
            let ev = self
                .backend
                .read_event()
                .map_err(|e| EdError::failure(format!("Terminal read failed: {}", e)))?;
            match ev {
                TermEvent::Key(input) => {
                    if let Some(key) = encode_term(input) {
                        return Ok(key);
                    }
                }
                TermEvent::Resize(c, r) => {
                    self.resize = Some((c, r));
                }
            }
        }
    }

    fn prompt(&mut self, msg: &str) -> EdResult<Option<String>> {
        let mut text = String::new();
        loop {
            self.paint_prompt(&format!("{}: {}", msg, text))?;
            let key = self.read_key()?;
            if key.mods.contains(KeyMods::CTRL) {
                match key.base {
                    b'G' => return Err(EdError::aborted()),
                    b'M' | b'J' => break, // RTN
                    b'?' => {
                        text.pop();
                        continue;
                    }
                    _ => continue,
                }
            }
            if key.mods.is_empty() && (0x20..0x7F).contains(&key.base) {
                text.push(key.base as char);
            }
        }
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    fn ask_key(&mut self, msg: &str) -> EdResult<ExtKey> {
        self.paint_prompt(msg)?;
        self.read_key()
    }
}
