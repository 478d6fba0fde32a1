//! Windows and screens.
//!
//! A screen is a full-terminal stack of windows, top to bottom, each window
//! showing one buffer through a face. The bottom terminal row is the message
//! line; every window is followed by its own mode line, so the invariant over
//! a screen body is: the sum of `rows + 1` over all windows equals the body
//! height, and each window's `top_row + rows + 1` is the next window's
//! `top_row`. Layout operations keep that invariant at every observable
//! moment.

use core_status::{EdError, EdResult};
use core_text::{BufferId, Face, WINDOW_MARK_BASE};
use std::path::PathBuf;
use tracing::debug;

bitflags::bitflags! {
    /// Window dirty flags consumed by redisplay.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WinFlags: u16 {
        /// Top line must be recomputed.
        const REFRAME = 1 << 0;
        /// Point moved; row/column need recomputation.
        const MOVE = 1 << 1;
        /// Text changed within the window's lines.
        const EDIT = 1 << 2;
        /// Structural change; repaint every line.
        const HARD = 1 << 3;
        /// Mode line needs repainting.
        const MODE = 1 << 4;
    }
}

/// A window must have more than this many text rows to be split.
pub const MIN_SPLIT_ROWS: u16 = 3;

/// A rectangular view of one buffer.
#[derive(Debug, Clone)]
pub struct Window {
    /// Unique 16-bit id, disjoint from printable mark ids.
    pub id: u16,
    pub buf: BufferId,
    pub face: Face,
    /// First terminal row of the text area.
    pub top_row: u16,
    /// Text rows, excluding the mode line.
    pub rows: u16,
    /// Target row for the next reframe; negative means unset.
    pub reframe_row: i16,
    pub flags: WinFlags,
    /// Display column of the dot, cached by redisplay for horizontal scroll
    /// decisions.
    pub hscroll_col: usize,
}

impl Window {
    /// Dirty-flag helper: also marks the mode line when the text changed.
    pub fn dirty(&mut self, flags: WinFlags) {
        self.flags.insert(flags);
        if flags.intersects(WinFlags::EDIT | WinFlags::HARD) {
            self.flags.insert(WinFlags::MODE);
        }
    }
}

/// A full-terminal window stack.
#[derive(Debug)]
pub struct Screen {
    pub windows: Vec<Window>,
    pub cur: usize,
    pub work_dir: PathBuf,
    /// Terminal geometry snapshot (columns, total rows).
    pub cols: u16,
    pub rows: u16,
    /// Screen-wide first displayed column (HorzScroll mode).
    pub first_col: usize,
    pub full_redraw: bool,
    pub last_buf: Option<BufferId>,
}

impl Screen {
    /// Rows available to windows plus their mode lines (everything except
    /// the message line).
    pub fn body_rows(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    pub fn current(&self) -> &Window {
        &self.windows[self.cur]
    }

    pub fn current_mut(&mut self) -> &mut Window {
        &mut self.windows[self.cur]
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn find_by_id(&self, id: u16) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    /// First window showing `buf`, if any.
    pub fn find_by_buffer(&self, buf: BufferId) -> Option<usize> {
        self.windows.iter().position(|w| w.buf == buf)
    }

    /// Recompute `top_row` for every window from the accumulated heights.
    fn relayout_tops(&mut self) {
        let mut row = 0;
        for w in &mut self.windows {
            w.top_row = row;
            row += w.rows + 1;
        }
    }

    /// Validate the partition invariant.
    pub fn check_partition(&self) -> bool {
        let mut row = 0;
        for w in &self.windows {
            if w.top_row != row {
                return false;
            }
            row += w.rows + 1;
        }
        row == self.body_rows()
    }

    /// Mark every window for full repaint.
    pub fn force_redraw(&mut self) {
        self.full_redraw = true;
        for w in &mut self.windows {
            w.dirty(WinFlags::HARD | WinFlags::MODE);
        }
    }
}

/// The screen list; exactly one screen is current.
#[derive(Debug)]
pub struct Layout {
    screens: Vec<Screen>,
    cur: usize,
    next_win_id: u16,
}

impl Layout {
    /// Build the initial screen showing `buf` with the given terminal size.
    pub fn new(buf: BufferId, face: Face, cols: u16, rows: u16, work_dir: PathBuf) -> Self {
        let mut layout = Self {
            screens: Vec::new(),
            cur: 0,
            next_win_id: WINDOW_MARK_BASE,
        };
        let screen = layout.build_screen(buf, face, cols, rows, work_dir);
        layout.screens.push(screen);
        layout
    }

    fn alloc_win_id(&mut self) -> u16 {
        let id = self.next_win_id;
        self.next_win_id = self.next_win_id.wrapping_add(1).max(WINDOW_MARK_BASE);
        id
    }

    fn build_screen(
        &mut self,
        buf: BufferId,
        face: Face,
        cols: u16,
        rows: u16,
        work_dir: PathBuf,
    ) -> Screen {
        let body = rows.saturating_sub(1);
        let win = Window {
            id: self.alloc_win_id(),
            buf,
            face,
            top_row: 0,
            rows: body.saturating_sub(1),
            reframe_row: -1,
            flags: WinFlags::HARD | WinFlags::MODE,
            hscroll_col: 0,
        };
        Screen {
            windows: vec![win],
            cur: 0,
            work_dir,
            cols,
            rows,
            first_col: 0,
            full_redraw: true,
            last_buf: None,
        }
    }

    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    pub fn current_screen(&self) -> &Screen {
        &self.screens[self.cur]
    }

    pub fn current_screen_mut(&mut self) -> &mut Screen {
        &mut self.screens[self.cur]
    }

    pub fn current_window(&self) -> &Window {
        self.screens[self.cur].current()
    }

    pub fn current_window_mut(&mut self) -> &mut Window {
        self.screens[self.cur].current_mut()
    }

    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    pub fn screens_mut(&mut self) -> &mut [Screen] {
        &mut self.screens
    }

    pub fn current_index(&self) -> usize {
        self.cur
    }

    /// Create a new screen showing `buf` and make it current.
    pub fn create_screen(&mut self, buf: BufferId, face: Face, work_dir: PathBuf) -> usize {
        let (cols, rows) = {
            let s = self.current_screen();
            (s.cols, s.rows)
        };
        let screen = self.build_screen(buf, face, cols, rows, work_dir);
        self.screens.push(screen);
        self.cur = self.screens.len() - 1;
        debug!(target: "layout", screen = self.cur, "screen_created");
        self.cur
    }

    /// Delete a screen by index; the current screen cannot be deleted.
    pub fn delete_screen(&mut self, index: usize) -> EdResult<()> {
        if index == self.cur {
            return Err(EdError::failure("Cannot delete the current screen"));
        }
        if index >= self.screens.len() {
            return Err(EdError::failure("No such screen"));
        }
        self.screens.remove(index);
        if self.cur > index {
            self.cur -= 1;
        }
        Ok(())
    }

    pub fn switch_screen(&mut self, index: usize) -> EdResult<()> {
        if index >= self.screens.len() {
            return Err(EdError::failure("No such screen"));
        }
        self.cur = index;
        self.screens[index].force_redraw();
        Ok(())
    }

    /// Split the current window. With no argument the upper half gets
    /// `(rows - 1) / 2` text rows; a positive `n` sets the upper size, a
    /// negative `n` the lower. The dot stays in whichever half contains it;
    /// the other half is flagged for a centering reframe.
    pub fn split_window(&mut self, n: Option<i64>, dot_row: u16) -> EdResult<usize> {
        let id = self.alloc_win_id();
        let screen = &mut self.screens[self.cur];
        let cur = screen.cur;
        let old = screen.windows[cur].clone();
        if old.rows <= MIN_SPLIT_ROWS {
            return Err(EdError::failure(format!(
                "Cannot split a {}-line window",
                old.rows
            )));
        }
        let upper_rows = match n {
            None => (old.rows - 1) / 2,
            Some(v) if v > 0 => v as u16,
            Some(v) => old.rows.saturating_sub(1).saturating_sub((-v) as u16),
        };
        if upper_rows == 0 || upper_rows >= old.rows {
            return Err(EdError::failure("Wrong number of rows for split"));
        }
        let lower_rows = old.rows - upper_rows - 1;
        let dot_in_upper = dot_row < upper_rows;

        let mut upper = old.clone();
        upper.rows = upper_rows;
        let mut lower = Window {
            id,
            buf: old.buf,
            face: old.face,
            top_row: 0,
            rows: lower_rows,
            reframe_row: -1,
            flags: WinFlags::HARD | WinFlags::MODE,
            hscroll_col: old.hscroll_col,
        };
        upper.flags = WinFlags::HARD | WinFlags::MODE;
        // The half that loses the dot recenters on its next reframe.
        if dot_in_upper {
            lower.flags.insert(WinFlags::REFRAME);
            lower.reframe_row = (lower_rows / 2) as i16;
        } else {
            upper.flags.insert(WinFlags::REFRAME);
            upper.reframe_row = (upper_rows / 2) as i16;
        }
        screen.windows[cur] = upper;
        screen.windows.insert(cur + 1, lower);
        screen.cur = if dot_in_upper { cur } else { cur + 1 };
        screen.relayout_tops();
        debug_assert!(screen.check_partition());
        debug!(target: "layout", upper_rows, lower_rows, "window_split");
        Ok(screen.cur)
    }

    /// Delete the current window, giving its rows to the neighbor selected
    /// by `n` (negative = upper, positive = lower, default = lower when one
    /// exists). Returns the face of the deleted window so the session can
    /// save it into the buffer.
    pub fn delete_window(&mut self, n: Option<i64>) -> EdResult<(BufferId, Face)> {
        let screen = &mut self.screens[self.cur];
        if screen.windows.len() < 2 {
            return Err(EdError::failure("Cannot delete the only window"));
        }
        let cur = screen.cur;
        let receiver = neighbor_index(screen.windows.len(), cur, n)?;
        let freed = screen.windows[cur].rows + 1;
        let removed = screen.windows.remove(cur);
        // Removal shifts indexes above `cur` down one.
        let receiver = if receiver > cur { receiver - 1 } else { receiver };
        let r = &mut screen.windows[receiver];
        r.rows += freed;
        r.dirty(WinFlags::HARD | WinFlags::REFRAME);
        screen.cur = receiver;
        screen.relayout_tops();
        debug_assert!(screen.check_partition());
        Ok((removed.buf, removed.face))
    }

    /// Grow (`how` > 0) or shrink (`how` < 0) the current window by `n`
    /// rows, trading rows with the window below (or above, for the last
    /// window). `how == 0` resizes to an absolute row count.
    pub fn resize_window(&mut self, n: u16, how: i8) -> EdResult<()> {
        let screen = &mut self.screens[self.cur];
        if screen.windows.len() < 2 {
            return Err(EdError::failure("Only one window"));
        }
        let cur = screen.cur;
        let other = if cur + 1 < screen.windows.len() {
            cur + 1
        } else {
            cur - 1
        };
        let delta: i32 = match how {
            0 => {
                let want = n as i32;
                if want == 0 {
                    return self.equalize_windows();
                }
                want - screen.windows[cur].rows as i32
            }
            h if h > 0 => n as i32,
            _ => -(n as i32),
        };
        if delta == 0 {
            return Ok(());
        }
        let (donor, gain) = if delta > 0 { (other, cur) } else { (cur, other) };
        let take = delta.unsigned_abs() as u16;
        if screen.windows[donor].rows <= take {
            return Err(EdError::failure(format!(
                "Too few rows in window to give up {}",
                take
            )));
        }
        screen.windows[donor].rows -= take;
        screen.windows[gain].rows += take;
        screen.windows[donor].dirty(WinFlags::HARD | WinFlags::REFRAME);
        screen.windows[gain].dirty(WinFlags::HARD | WinFlags::REFRAME);
        screen.relayout_tops();
        debug_assert!(screen.check_partition());
        Ok(())
    }

    /// Redistribute rows as evenly as possible. Repeats passes until stable;
    /// a deadlock (no window can give up a row) is accepted silently.
    pub fn equalize_windows(&mut self) -> EdResult<()> {
        let screen = &mut self.screens[self.cur];
        let count = screen.windows.len();
        if count < 2 {
            return Ok(());
        }
        let body = screen.body_rows();
        let total_text = body - count as u16; // mode lines off the top
        let base = total_text / count as u16;
        let extra = total_text % count as u16;
        for (i, w) in screen.windows.iter_mut().enumerate() {
            let want = base + u16::from((i as u16) < extra);
            if w.rows != want {
                w.rows = want;
                w.dirty(WinFlags::HARD | WinFlags::REFRAME);
            }
        }
        screen.relayout_tops();
        debug_assert!(screen.check_partition());
        Ok(())
    }

    /// Cycle the current window on the current screen: `n` > 0 moves down,
    /// `n` < 0 up, wrapping at the ends.
    pub fn select_window(&mut self, n: i64) -> usize {
        let screen = &mut self.screens[self.cur];
        let count = screen.windows.len() as i64;
        let idx = (screen.cur as i64 + n).rem_euclid(count) as usize;
        screen.cur = idx;
        idx
    }

    /// Resize every screen's notion of the terminal.
    pub fn resize_terminal(&mut self, cols: u16, rows: u16) {
        for s in &mut self.screens {
            s.cols = cols;
            s.rows = rows;
            // Give all change to the bottom window, then fix if impossible.
            let body = s.rows.saturating_sub(1);
            let need: i32 =
                body as i32 - s.windows.iter().map(|w| w.rows as i32 + 1).sum::<i32>();
            if need != 0 {
                let last = s.windows.len() - 1;
                let new_rows = s.windows[last].rows as i32 + need;
                if new_rows >= 1 {
                    s.windows[last].rows = new_rows as u16;
                } else {
                    // Too small to keep the stack: collapse to one window.
                    let keep = s.windows[s.cur].clone();
                    s.windows = vec![keep];
                    s.cur = 0;
                    s.windows[0].rows = body.saturating_sub(1);
                }
                s.relayout_tops();
            }
            s.force_redraw();
        }
    }
}

/// Resolve the neighbor of `cur` selected by `n`: negative picks the upper,
/// positive the lower, `None` the lower when present. Wraps around when the
/// stack has at least three windows.
fn neighbor_index(count: usize, cur: usize, n: Option<i64>) -> EdResult<usize> {
    let want_upper = match n {
        Some(v) if v < 0 => true,
        Some(_) => false,
        None => cur + 1 >= count,
    };
    if want_upper {
        if cur > 0 {
            Ok(cur - 1)
        } else if count >= 3 {
            Ok(count - 1)
        } else {
            Err(EdError::failure("No window above this one"))
        }
    } else if cur + 1 < count {
        Ok(cur + 1)
    } else if count >= 3 {
        Ok(0)
    } else {
        Err(EdError::failure("No window below this one"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout(rows: u16) -> Layout {
        let face = Face::at(core_text::LineId(0));
        Layout::new(BufferId(0), face, 80, rows, PathBuf::from("."))
    }

    #[test]
    fn initial_screen_partition() {
        let l = layout(24);
        let s = l.current_screen();
        assert_eq!(s.windows.len(), 1);
        assert_eq!(s.windows[0].rows, 22);
        assert!(s.check_partition());
    }

    #[test]
    fn split_halves_partition_holds() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        let s = l.current_screen();
        assert_eq!(s.windows.len(), 2);
        assert!(s.check_partition());
        // Upper (22 - 1) / 2 = 10; lower 22 - 10 - 1 = 11.
        assert_eq!(s.windows[0].rows, 10);
        assert_eq!(s.windows[1].rows, 11);
        assert_eq!(s.windows[1].top_row, 11);
        // Dot row 0 lives in the upper half.
        assert_eq!(s.cur, 0);
    }

    #[test]
    fn split_ids_disjoint_from_marks() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        let s = l.current_screen();
        for w in &s.windows {
            assert!(w.id >= WINDOW_MARK_BASE);
        }
        assert_ne!(s.windows[0].id, s.windows[1].id);
    }

    #[test]
    fn small_window_refuses_split() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        l.resize_window(2, 0).unwrap(); // absolute: current to 2 rows
        let before: Vec<u16> = l.current_screen().windows.iter().map(|w| w.rows).collect();
        let err = l.split_window(None, 0).unwrap_err();
        assert!(err.message.contains("Cannot split a 2-line window"));
        let after: Vec<u16> = l.current_screen().windows.iter().map(|w| w.rows).collect();
        assert_eq!(before, after, "layout unchanged on refusal");
    }

    #[test]
    fn delete_gives_rows_to_upper_when_negative() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        l.select_window(1);
        l.delete_window(Some(-1)).unwrap();
        let s = l.current_screen();
        assert_eq!(s.windows.len(), 1);
        assert_eq!(s.windows[0].rows, 22);
        assert!(s.check_partition());
    }

    #[test]
    fn delete_only_window_refused() {
        let mut l = layout(24);
        assert!(l.delete_window(None).is_err());
    }

    #[test]
    fn delete_wraps_with_three_windows() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        l.split_window(None, 0).unwrap();
        assert_eq!(l.current_screen().windows.len(), 3);
        // Current is topmost; ask for the upper neighbor: wraps to bottom.
        l.current_screen_mut().cur = 0;
        l.delete_window(Some(-1)).unwrap();
        let s = l.current_screen();
        assert_eq!(s.windows.len(), 2);
        assert!(s.check_partition());
        assert_eq!(s.cur, s.windows.len() - 1);
    }

    #[test]
    fn resize_trades_rows() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        let before_upper = l.current_screen().windows[0].rows;
        l.resize_window(3, 1).unwrap();
        let s = l.current_screen();
        assert_eq!(s.windows[0].rows, before_upper + 3);
        assert!(s.check_partition());
        // Shrinking the donor below 1 row is refused.
        let big = s.windows[1].rows;
        assert!(l.resize_window(big, 1).is_err());
    }

    #[test]
    fn equalize_distributes_evenly() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        l.split_window(None, 0).unwrap();
        l.resize_window(2, 1).unwrap();
        l.equalize_windows().unwrap();
        let s = l.current_screen();
        let rows: Vec<u16> = s.windows.iter().map(|w| w.rows).collect();
        let min = *rows.iter().min().unwrap();
        let max = *rows.iter().max().unwrap();
        assert!(max - min <= 1, "rows {:?}", rows);
        assert!(s.check_partition());
    }

    #[test]
    fn select_window_wraps() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        assert_eq!(l.current_screen().cur, 0);
        l.select_window(1);
        assert_eq!(l.current_screen().cur, 1);
        l.select_window(1);
        assert_eq!(l.current_screen().cur, 0);
        l.select_window(-1);
        assert_eq!(l.current_screen().cur, 1);
    }

    #[test]
    fn screens_create_switch_delete() {
        let mut l = layout(24);
        let idx = l.create_screen(BufferId(0), Face::at(core_text::LineId(0)), PathBuf::from("."));
        assert_eq!(idx, 1);
        assert_eq!(l.screen_count(), 2);
        assert!(l.delete_screen(1).is_err()); // current
        l.switch_screen(0).unwrap();
        l.delete_screen(1).unwrap();
        assert_eq!(l.screen_count(), 1);
    }

    #[test]
    fn terminal_resize_keeps_partition() {
        let mut l = layout(24);
        l.split_window(None, 0).unwrap();
        l.resize_terminal(100, 40);
        assert!(l.current_screen().check_partition());
        l.resize_terminal(80, 10);
        assert!(l.current_screen().check_partition());
    }

    proptest::proptest! {
        /// Whatever sequence of layout operations runs, the window row
        /// ranges always partition the screen body.
        #[test]
        fn partition_invariant_under_random_ops(ops in proptest::collection::vec(0u8..5, 0..40)) {
            let mut l = layout(30);
            for op in ops {
                let _ = match op {
                    0 => l.split_window(None, 0).map(|_| ()),
                    1 => l.delete_window(None).map(|_| ()),
                    2 => l.resize_window(1, 1),
                    3 => l.resize_window(1, -1),
                    _ => l.equalize_windows(),
                };
                proptest::prop_assert!(l.current_screen().check_partition());
            }
            let _ = l.select_window(1);
            proptest::prop_assert!(l.current_screen().check_partition());
        }
    }
}
