//! Terminal backend abstraction and crossterm implementation.
//!
//! The backend is the only place crossterm types appear; the rest of the
//! editor sees a cell grid with cursor, attributes, and a small input event
//! model. Raw-mode state is guarded so the terminal is restored even when a
//! caller unwinds.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Attribute, Color, Print, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
        enable_raw_mode, size,
    },
};
use std::io::{Write, stdout};
use std::time::Duration;

bitflags::bitflags! {
    /// Display attributes for a run of cells.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attrs: u8 {
        const BOLD = 1 << 0;
        const REVERSE = 1 << 1;
        const UNDERLINE = 1 << 2;
    }
}

/// A normalized input key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKey {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    F(u8),
}

/// One keystroke with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermInput {
    pub key: TermKey,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// Events surfaced to the editor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEvent {
    Key(TermInput),
    Resize(u16, u16),
}

/// The terminal surface the renderer paints and the input loop reads.
pub trait TerminalBackend {
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
    fn size(&self) -> Result<(u16, u16)>;
    fn move_to(&mut self, col: u16, row: u16) -> Result<()>;
    fn print(&mut self, text: &str) -> Result<()>;
    fn set_attrs(&mut self, attrs: Attrs) -> Result<()>;
    fn set_color_pair(&mut self, pair: Option<u8>) -> Result<()>;
    fn clear_to_eol(&mut self) -> Result<()>;
    fn clear_all(&mut self) -> Result<()>;
    fn show_cursor(&mut self, show: bool) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    /// Blocking read of the next event.
    fn read_event(&mut self) -> Result<TermEvent>;
    /// True when input is already waiting (the typahead check).
    fn typahead(&mut self) -> Result<bool>;
}

/// Production backend over crossterm.
pub struct CrosstermBackend {
    entered: bool,
}

impl Default for CrosstermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermBackend {
    pub fn new() -> Self {
        Self { entered: false }
    }

    /// Enter and return a guard that leaves on drop.
    pub fn enter_guard(&mut self) -> Result<TerminalGuard<'_>> {
        self.enter()?;
        Ok(TerminalGuard {
            backend: self,
            active: true,
        })
    }

    fn translate(ev: Event) -> Option<TermEvent> {
        match ev {
            Event::Key(k) if k.kind != KeyEventKind::Release => {
                let key = match k.code {
                    KeyCode::Char(c) => TermKey::Char(c),
                    KeyCode::Enter => TermKey::Enter,
                    KeyCode::Tab | KeyCode::BackTab => TermKey::Tab,
                    KeyCode::Backspace => TermKey::Backspace,
                    KeyCode::Delete => TermKey::Delete,
                    KeyCode::Esc => TermKey::Esc,
                    KeyCode::Up => TermKey::Up,
                    KeyCode::Down => TermKey::Down,
                    KeyCode::Left => TermKey::Left,
                    KeyCode::Right => TermKey::Right,
                    KeyCode::Home => TermKey::Home,
                    KeyCode::End => TermKey::End,
                    KeyCode::PageUp => TermKey::PageUp,
                    KeyCode::PageDown => TermKey::PageDown,
                    KeyCode::Insert => TermKey::Insert,
                    KeyCode::F(n) => TermKey::F(n),
                    _ => return None,
                };
                let shift = k.modifiers.contains(KeyModifiers::SHIFT)
                    || matches!(k.code, KeyCode::BackTab);
                Some(TermEvent::Key(TermInput {
                    key,
                    ctrl: k.modifiers.contains(KeyModifiers::CONTROL),
                    alt: k.modifiers.contains(KeyModifiers::ALT),
                    shift,
                }))
            }
            Event::Resize(c, r) => Some(TermEvent::Resize(c, r)),
            _ => None,
        }
    }

    fn color(pair: u8) -> Color {
        // Small fixed palette addressed by the message-line `~c N` escape.
        match pair % 8 {
            0 => Color::White,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            _ => Color::Grey,
        }
    }
}

impl TerminalBackend for CrosstermBackend {
    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(stdout(), LeaveAlternateScreen, Show)?;
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }

    fn size(&self) -> Result<(u16, u16)> {
        Ok(size()?)
    }

    fn move_to(&mut self, col: u16, row: u16) -> Result<()> {
        queue!(stdout(), MoveTo(col, row))?;
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<()> {
        queue!(stdout(), Print(text))?;
        Ok(())
    }

    fn set_attrs(&mut self, attrs: Attrs) -> Result<()> {
        let mut out = stdout();
        queue!(out, SetAttribute(Attribute::Reset))?;
        if attrs.contains(Attrs::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if attrs.contains(Attrs::REVERSE) {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        if attrs.contains(Attrs::UNDERLINE) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        Ok(())
    }

    fn set_color_pair(&mut self, pair: Option<u8>) -> Result<()> {
        let mut out = stdout();
        match pair {
            Some(p) => {
                queue!(out, SetForegroundColor(Self::color(p)))?;
            }
            None => {
                queue!(
                    out,
                    SetForegroundColor(Color::Reset),
                    SetBackgroundColor(Color::Reset)
                )?;
            }
        }
        Ok(())
    }

    fn clear_to_eol(&mut self) -> Result<()> {
        queue!(stdout(), Clear(ClearType::UntilNewLine))?;
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        queue!(stdout(), Clear(ClearType::All))?;
        Ok(())
    }

    fn show_cursor(&mut self, show: bool) -> Result<()> {
        if show {
            execute!(stdout(), Show)?;
        } else {
            execute!(stdout(), Hide)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        stdout().flush()?;
        Ok(())
    }

    fn read_event(&mut self) -> Result<TermEvent> {
        loop {
            if let Some(ev) = Self::translate(event::read()?) {
                return Ok(ev);
            }
        }
    }

    fn typahead(&mut self) -> Result<bool> {
        Ok(event::poll(Duration::from_millis(0))?)
    }
}

impl Drop for CrosstermBackend {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

/// RAII guard ensuring terminal state restoration even if the caller
/// early-returns or panics.
pub struct TerminalGuard<'a> {
    backend: &'a mut CrosstermBackend,
    active: bool,
}

impl<'a> TerminalGuard<'a> {
    pub fn backend(&mut self) -> &mut CrosstermBackend {
        self.backend
    }

    /// Leave now instead of at drop.
    pub fn release(mut self) -> Result<()> {
        self.active = false;
        self.backend.leave()
    }
}

impl<'a> Drop for TerminalGuard<'a> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.backend.leave();
        }
    }
}
