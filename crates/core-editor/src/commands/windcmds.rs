//! Window and screen commands.

use crate::{Session, Ui};
use core_datum::Datum;
use core_layout::WinFlags;
use core_status::{EdError, EdResult};

/// Split the current window; `n` picks the upper size (negative: lower).
pub fn split_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let dot_row = {
        let w = s.layout.current_window();
        let b = s.bufs.buf(w.buf);
        let dot_idx = b.line_index(w.face.dot.line);
        let top_idx = b.line_index(w.face.top);
        dot_idx.saturating_sub(top_idx) as u16
    };
    s.layout.split_window(n, dot_row)?;
    Ok(Datum::Bool(true))
}

/// Delete the current window, handing its rows to a neighbor. The freed
/// face is saved into the buffer when no other window still shows it.
pub fn delete_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let (buf, face) = s.layout.delete_window(n)?;
    if s.window_count(buf) == 0 {
        s.bufs.buf_mut(buf).face = face;
    }
    Ok(Datum::Bool(true))
}

/// Collapse the screen to the current window.
pub fn only_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let removed: Vec<(core_text::BufferId, core_text::Face)> = {
        let screen = s.layout.current_screen_mut();
        if screen.windows.len() < 2 {
            return Ok(Datum::Bool(false));
        }
        let keep = screen.cur;
        let body = screen.body_rows();
        let mut removed = Vec::new();
        let kept = screen.windows.remove(keep);
        for w in screen.windows.drain(..) {
            removed.push((w.buf, w.face));
        }
        screen.windows.push(kept);
        screen.cur = 0;
        screen.windows[0].rows = body.saturating_sub(1);
        screen.windows[0].top_row = 0;
        screen.windows[0].dirty(WinFlags::HARD | WinFlags::MODE | WinFlags::REFRAME);
        removed
    };
    for (buf, face) in removed {
        if s.window_count(buf) == 0 {
            s.bufs.buf_mut(buf).face = face;
        }
    }
    Ok(Datum::Bool(true))
}

pub fn next_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    s.layout.select_window(n.unwrap_or(1));
    Ok(Datum::Bool(true))
}

pub fn prev_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    s.layout.select_window(-n.unwrap_or(1));
    Ok(Datum::Bool(true))
}

pub fn grow_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = n.unwrap_or(1);
    if k < 0 {
        return shrink_wind(s, _ui, _args, Some(-k));
    }
    s.layout.resize_window(k as u16, 1)?;
    Ok(Datum::Bool(true))
}

pub fn shrink_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = n.unwrap_or(1);
    if k < 0 {
        return grow_wind(s, _ui, _args, Some(-k));
    }
    s.layout.resize_window(k as u16, -1)?;
    Ok(Datum::Bool(true))
}

/// Resize to an absolute row count; zero equalizes all windows.
pub fn resize_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = n.unwrap_or(0);
    if k < 0 {
        return Err(EdError::failure("Window size cannot be negative"));
    }
    s.layout.resize_window(k as u16, 0)?;
    Ok(Datum::Bool(true))
}

/// Set the target row for the next reframe; the default centers the dot.
pub fn reframe_wind(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let w = s.layout.current_window_mut();
    let rows = w.rows as i64;
    let row = match n {
        Some(v) if v >= 0 => v.min(rows - 1),
        Some(v) => (rows + v).max(0),
        None => rows / 2,
    };
    w.reframe_row = row as i16;
    w.dirty(WinFlags::REFRAME);
    Ok(Datum::Bool(true))
}

pub fn new_screen(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let buf = s.cur_buf_id();
    let face = s.layout.current_window().face;
    let dir = s.layout.current_screen().work_dir.clone();
    let idx = s.layout.create_screen(buf, face, dir);
    s.notify(&format!("Screen {} created", idx + 1));
    Ok(Datum::Int(idx as i64 + 1))
}

pub fn next_screen(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let next = (s.layout.current_index() + 1) % s.layout.screen_count();
    s.layout.switch_screen(next)?;
    Ok(Datum::Int(next as i64 + 1))
}

/// Delete screen number `n` (1-based).
pub fn delete_screen(
    s: &mut Session,
    _ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let which = match (args.first(), n) {
        (Some(d), _) => d.as_int()?,
        (None, Some(v)) => v,
        _ => return Err(EdError::failure("Screen number required")),
    };
    if which < 1 {
        return Err(EdError::failure("No such screen"));
    }
    s.layout.delete_screen((which - 1) as usize)?;
    Ok(Datum::Bool(true))
}
