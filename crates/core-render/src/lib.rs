//! Redisplay: dirty-flag driven refresh of the current screen.
//!
//! The pipeline per cycle: (1) propagate buffer touch levels to the windows
//! showing each buffer, recompute dot rows/columns, and reframe windows whose
//! dot left the visible range; (2) repaint the text of dirty windows,
//! honoring horizontal scroll with `$` markers on truncated lines; (3) paint
//! dirty mode lines in reverse video; (4) paint the message line; (5) park
//! the terminal cursor on the dot of the current window. A screen's
//! full-redraw flag forces every phase.

pub mod message;
pub mod text;

use anyhow::Result;
use core_layout::{Layout, Screen, WinFlags, Window};
use core_modes::{ModeFlags, ModeTable};
use core_terminal::{Attrs, TerminalBackend};
use core_text::{BufferSet, TouchLevel};
use tracing::trace;

/// Session tunables the renderer needs.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    /// Vertical reframe jump as a percentage of window height; 0 scrolls
    /// smoothly one line at a time.
    pub vjump: u16,
    /// Horizontal scroll jump as a percentage of terminal width; 0 jumps a
    /// single column.
    pub hjump: u16,
    /// All windows share the screen's first column (HorzScroll mode).
    pub screen_wide_hscroll: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            vjump: 0,
            hjump: 0,
            screen_wide_hscroll: false,
        }
    }
}

/// The message pending for the message line this cycle.
#[derive(Debug, Clone, Copy)]
pub struct PendingMessage<'a> {
    pub text: &'a str,
    /// Process `~` attribute escapes.
    pub attrs: bool,
    /// Wrap in `[ ]`.
    pub wrap: bool,
}

/// Run one redisplay cycle against the current screen.
pub fn update(
    bufs: &mut BufferSet,
    layout: &mut Layout,
    modes: &ModeTable,
    term: &mut dyn TerminalBackend,
    params: &RenderParams,
    msg: Option<PendingMessage<'_>>,
    typahead: bool,
) -> Result<()> {
    // A user typing ahead sees the next state soon enough; skip the paint.
    if typahead {
        return Ok(());
    }
    let force = {
        let s = layout.current_screen_mut();
        std::mem::replace(&mut s.full_redraw, false)
    };

    // Phase 1: touches -> window dirty flags.
    for (buf, level) in bufs.drain_touches() {
        let flags = match level {
            TouchLevel::None => WinFlags::empty(),
            TouchLevel::Move => WinFlags::MOVE,
            TouchLevel::Edit => WinFlags::EDIT,
            TouchLevel::Hard => WinFlags::HARD,
        };
        for w in &mut layout.current_screen_mut().windows {
            if w.buf == buf {
                w.dirty(flags);
            }
        }
    }

    if force {
        term.clear_all()?;
    }

    let screen = layout.current_screen_mut();
    let cols = screen.cols as usize;
    let body_cur = screen.cur;
    let mut cursor: (u16, u16) = (0, 0);

    for i in 0..screen.windows.len() {
        let is_cur = i == body_cur;
        reframe_window(bufs, screen, i, params);
        let w = &screen.windows[i];
        let dirty_text = force || w.flags.intersects(WinFlags::EDIT | WinFlags::HARD);
        let dirty_mode = force || w.flags.contains(WinFlags::MODE);
        let first_col = effective_first_col(screen, i, params);
        if dirty_text {
            paint_window(term, bufs, &screen.windows[i], first_col, cols)?;
        }
        if dirty_mode {
            paint_mode_line(term, bufs, modes, &screen.windows[i], cols)?;
        }
        let w = &mut screen.windows[i];
        w.flags = WinFlags::empty();
        if is_cur {
            let buf = bufs.buf(w.buf);
            let dot_idx = buf.line_index(w.face.dot.line);
            let top_idx = buf.line_index(w.face.top);
            let col = text::display_col(buf.line_text(w.face.dot.line), w.face.dot.off);
            let row = w.top_row + (dot_idx.saturating_sub(top_idx)) as u16;
            cursor = ((col.saturating_sub(first_col)) as u16, row);
        }
    }

    // Phase 4: message line on the terminal's bottom row.
    let msg_row = screen.rows.saturating_sub(1);
    match msg {
        Some(m) => message::paint(term, msg_row, m.text, m.attrs, m.wrap)?,
        None => {
            term.move_to(0, msg_row)?;
            term.set_attrs(Attrs::empty())?;
            term.set_color_pair(None)?;
            term.clear_to_eol()?;
        }
    }

    term.move_to(cursor.0, cursor.1)?;
    term.show_cursor(true)?;
    term.flush()?;
    trace!(target: "render", force, "redisplay_cycle");
    Ok(())
}

/// Pick the first displayed column for a window, adjusting it (per window or
/// screen-wide) so the dot stays visible.
fn effective_first_col(screen: &mut Screen, idx: usize, params: &RenderParams) -> usize {
    let cols = screen.cols as usize;
    let is_cur = idx == screen.cur;
    let w = &screen.windows[idx];
    let mut first = if params.screen_wide_hscroll {
        screen.first_col
    } else {
        w.face.first_col
    };
    if is_cur && cols > 0 {
        // Keep the dot visible, sliding by the configured jump.
        let jump = ((cols * params.hjump as usize) / 100).max(1);
        let col = w.hscroll_col;
        while col < first {
            first = first.saturating_sub(jump);
        }
        while col >= first + cols {
            first += jump;
        }
    }
    if params.screen_wide_hscroll {
        screen.first_col = first;
    } else {
        screen.windows[idx].face.first_col = first;
    }
    first
}

/// Recompute the top line when the window is flagged for reframe or the dot
/// fell outside the visible range.
fn reframe_window(bufs: &BufferSet, screen: &mut Screen, idx: usize, params: &RenderParams) {
    let w = &mut screen.windows[idx];
    let buf = bufs.buf(w.buf);
    if !buf.contains_line(w.face.top) {
        w.face.top = w.face.dot.line;
        w.flags.insert(WinFlags::REFRAME);
    }
    if !buf.contains_line(w.face.dot.line) {
        w.face.dot = buf.start_dot();
        w.face.top = w.face.dot.line;
        w.flags.insert(WinFlags::REFRAME);
    }
    let rows = w.rows as usize;
    let dot_idx = buf.line_index(w.face.dot.line);
    let top_idx = buf.line_index(w.face.top);
    let out_of_view = dot_idx < top_idx || dot_idx >= top_idx + rows.max(1);
    if w.flags.contains(WinFlags::REFRAME) || out_of_view {
        let target = if w.reframe_row >= 0 {
            (w.reframe_row as usize).min(rows.saturating_sub(1))
        } else if params.vjump == 0 {
            // Smooth scroll: slide the minimum distance.
            if dot_idx < top_idx {
                0
            } else {
                rows.saturating_sub(1)
            }
        } else {
            (rows * params.vjump as usize / 100).min(rows.saturating_sub(1))
        };
        let new_top_idx = dot_idx.saturating_sub(target);
        w.face.top = line_at_index(buf, new_top_idx);
        w.reframe_row = -1;
        w.flags.remove(WinFlags::REFRAME);
        w.flags.insert(WinFlags::HARD);
    }
    // Remember the dot's display column for horizontal scroll handling.
    w.hscroll_col = text::display_col(buf.line_text(w.face.dot.line), w.face.dot.off);
}

fn line_at_index(buf: &core_text::Buffer, idx: usize) -> core_text::LineId {
    let mut last = buf.first_line();
    for (n, id) in buf.lines().enumerate() {
        if n == idx {
            return id;
        }
        last = id;
    }
    last
}

/// Paint every visible text row of a window.
fn paint_window(
    term: &mut dyn TerminalBackend,
    bufs: &BufferSet,
    w: &Window,
    first_col: usize,
    cols: usize,
) -> Result<()> {
    let buf = bufs.buf(w.buf);
    term.set_attrs(Attrs::empty())?;
    term.set_color_pair(None)?;
    let mut line = Some(w.face.top);
    for r in 0..w.rows {
        term.move_to(0, w.top_row + r)?;
        term.clear_to_eol()?;
        if let Some(id) = line {
            let expanded = text::expand_line(buf.line_text(id));
            let len = expanded.len();
            let lo = first_col.min(len);
            let hi = (first_col + cols).min(len);
            let mut visible: String = expanded[lo..hi].to_string();
            if len > first_col + cols && !visible.is_empty() {
                // Extended-line marker.
                visible.pop();
                visible.push('$');
            }
            if first_col > 0 && !visible.is_empty() {
                visible.replace_range(0..1, "$");
            }
            term.print(&visible)?;
            line = buf.next_line(id);
        }
    }
    Ok(())
}

/// Mode line: reversed, showing the buffer's state, name, in-line mode tags,
/// file, and position.
fn paint_mode_line(
    term: &mut dyn TerminalBackend,
    bufs: &BufferSet,
    modes: &ModeTable,
    w: &Window,
    cols: usize,
) -> Result<()> {
    let buf = bufs.buf(w.buf);
    let changed = if buf.flags.contains(core_text::BufFlags::CHANGED) {
        "*"
    } else {
        " "
    };
    let mut tags = String::new();
    for &mid in &buf.modes {
        if let Some(spec) = modes.get(mid) {
            if spec.flags.contains(ModeFlags::IN_LINE) {
                if !tags.is_empty() {
                    tags.push(' ');
                }
                tags.push_str(&spec.name);
            }
        }
    }
    let dot_line = buf.line_index(w.face.dot.line) + 1;
    let total = buf.line_count();
    let file = buf
        .filename
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let mut line = format!(
        "{} {}  {}  {}  L{}/{}",
        changed, buf.name, tags, file, dot_line, total
    );
    if line.len() > cols {
        line.truncate(cols);
    } else {
        line.push_str(&"-".repeat(cols - line.len()));
    }
    term.move_to(0, w.top_row + w.rows)?;
    term.set_attrs(Attrs::REVERSE)?;
    term.print(&line)?;
    term.set_attrs(Attrs::empty())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_text::Face;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    /// Capture backend recording a character grid.
    struct Grid {
        cells: Vec<Vec<char>>,
        col: usize,
        row: usize,
        reverse_rows: Vec<usize>,
        cur_attrs: Attrs,
    }

    impl Grid {
        fn new(cols: usize, rows: usize) -> Self {
            Self {
                cells: vec![vec![' '; cols]; rows],
                col: 0,
                row: 0,
                reverse_rows: Vec::new(),
                cur_attrs: Attrs::empty(),
            }
        }

        fn line(&self, row: usize) -> String {
            self.cells[row].iter().collect::<String>().trim_end().to_string()
        }
    }

    impl TerminalBackend for Grid {
        fn enter(&mut self) -> Result<()> {
            Ok(())
        }
        fn leave(&mut self) -> Result<()> {
            Ok(())
        }
        fn size(&self) -> Result<(u16, u16)> {
            Ok((self.cells[0].len() as u16, self.cells.len() as u16))
        }
        fn move_to(&mut self, col: u16, row: u16) -> Result<()> {
            self.col = col as usize;
            self.row = row as usize;
            Ok(())
        }
        fn print(&mut self, text: &str) -> Result<()> {
            if self.cur_attrs.contains(Attrs::REVERSE) && !self.reverse_rows.contains(&self.row)
            {
                self.reverse_rows.push(self.row);
            }
            for c in text.chars() {
                if self.row < self.cells.len() && self.col < self.cells[0].len() {
                    self.cells[self.row][self.col] = c;
                    self.col += 1;
                }
            }
            Ok(())
        }
        fn set_attrs(&mut self, attrs: Attrs) -> Result<()> {
            self.cur_attrs = attrs;
            Ok(())
        }
        fn set_color_pair(&mut self, _pair: Option<u8>) -> Result<()> {
            Ok(())
        }
        fn clear_to_eol(&mut self) -> Result<()> {
            let row = self.row;
            if row < self.cells.len() {
                for c in self.cells[row][self.col..].iter_mut() {
                    *c = ' ';
                }
            }
            Ok(())
        }
        fn clear_all(&mut self) -> Result<()> {
            for row in &mut self.cells {
                row.fill(' ');
            }
            Ok(())
        }
        fn show_cursor(&mut self, _show: bool) -> Result<()> {
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn read_event(&mut self) -> Result<core_terminal::TermEvent> {
            unreachable!("tests never read input")
        }
        fn typahead(&mut self) -> Result<bool> {
            Ok(false)
        }
    }

    fn setup(content: &[u8], rows: u16) -> (BufferSet, Layout, ModeTable, Grid) {
        let mut bufs = BufferSet::new();
        let id = bufs.create("main").unwrap();
        let mut d = bufs.buf(id).start_dot();
        let b = bufs.buf_mut(id);
        b.insert_text(&mut d, content).unwrap();
        let face = Face::at(b.first_line());
        let layout = Layout::new(id, face, 20, rows, PathBuf::from("."));
        let grid = Grid::new(20, rows as usize);
        (bufs, layout, ModeTable::new(), grid)
    }

    #[test]
    fn paints_buffer_lines() {
        let (mut bufs, mut layout, modes, mut grid) = setup(b"alpha\nbeta", 6);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            None,
            false,
        )
        .unwrap();
        assert_eq!(grid.line(0), "alpha");
        assert_eq!(grid.line(1), "beta");
    }

    #[test]
    fn mode_line_reversed_and_shows_name() {
        let (mut bufs, mut layout, modes, mut grid) = setup(b"x", 6);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            None,
            false,
        )
        .unwrap();
        let mode_row = layout.current_window().rows as usize;
        assert!(grid.line(mode_row).contains("main"));
        assert!(grid.reverse_rows.contains(&mode_row));
    }

    #[test]
    fn message_line_painted_and_wrapped() {
        let (mut bufs, mut layout, modes, mut grid) = setup(b"x", 6);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            Some(PendingMessage {
                text: "done",
                attrs: true,
                wrap: true,
            }),
            false,
        )
        .unwrap();
        assert_eq!(grid.line(5), "[done]");
    }

    #[test]
    fn long_line_gets_marker() {
        let (mut bufs, mut layout, modes, mut grid) =
            setup(b"abcdefghijklmnopqrstuvwxyz", 6);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            None,
            false,
        )
        .unwrap();
        let line = grid.line(0);
        assert_eq!(line.len(), 20);
        assert!(line.ends_with('$'));
    }

    #[test]
    fn typahead_skips_paint() {
        let (mut bufs, mut layout, modes, mut grid) = setup(b"hello", 6);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            None,
            true,
        )
        .unwrap();
        assert_eq!(grid.line(0), "");
    }

    #[test]
    fn reframe_scrolls_dot_into_view() {
        let (mut bufs, mut layout, modes, mut grid) = setup(b"0\n1\n2\n3\n4\n5\n6\n7\n8\n9", 6);
        // 6 terminal rows: body 5, one window of 4 text rows.
        let id = bufs.find("main").unwrap();
        let buf = bufs.buf(id);
        let mut dot = buf.start_dot();
        buf.forward(&mut dot, 14); // line "7"
        layout.current_window_mut().face.dot = dot;
        layout.current_window_mut().flags.insert(WinFlags::MOVE);
        update(
            &mut bufs,
            &mut layout,
            &modes,
            &mut grid,
            &RenderParams::default(),
            None,
            false,
        )
        .unwrap();
        // Smooth scroll puts the dot on the bottom row.
        assert_eq!(grid.line(3), "7");
        assert_eq!(grid.line(0), "4");
    }
}
