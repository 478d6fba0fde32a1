//! Text mutation, kill/yank, marks, and the keyboard macro commands.

use crate::{Session, Ui};
use core_datum::Datum;
use core_status::{EdError, EdResult};
use core_text::{REGION_MARK, case, region};
use core_text::region::RegionFlags;

fn count(n: Option<i64>) -> i64 {
    n.unwrap_or(1)
}

pub fn newline(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n).max(0) as usize;
    let text = vec![b'\n'; k];
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    s.bufs.buf_mut(id).insert_text(&mut dot, &text)?;
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

/// Insert a string at the dot (`insertText text[, n]`).
pub fn insert_text(
    s: &mut Session,
    _ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let text = crate::commands::arg_str(&args, 0, "text to insert")?;
    let k = count(n).max(1);
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    for _ in 0..k {
        s.bufs.buf_mut(id).insert_text(&mut dot, text.as_bytes())?;
    }
    s.set_dot(dot);
    Ok(Datum::Str(text))
}

pub fn delete_forw_char(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return delete_back_char(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    let cut = s.bufs.buf_mut(id).delete_span(&mut dot, k)?;
    s.undelete.record(cut);
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn delete_back_char(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return delete_forw_char(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    let cut = s.bufs.buf_mut(id).delete_span(&mut dot, -k)?;
    s.undelete.record(cut);
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

/// Kill a line block selected by `n` (default: dot to end of line, or the
/// newline when already there).
pub fn kill_line(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_text_region(s.cur_buf(), dot, n, RegionFlags::empty());
    if reg.size == 0 {
        return Err(EdError::failure("No text to kill"));
    }
    kill_span(s, reg.size)
}

pub fn kill_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_region(s.cur_buf(), dot, RegionFlags::empty())?;
    kill_span(s, reg.size)
}

fn kill_span(s: &mut Session, size: i64) -> EdResult<Datum> {
    let cont = s.last_was_kill;
    s.kill.prep(cont);
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    let cut = s.bufs.buf_mut(id).delete_span(&mut dot, size)?;
    s.kill.collect(&cut, size > 0);
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn copy_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_region(s.cur_buf(), dot, RegionFlags::EMPTY_OK)?;
    let text = region::extract(s.cur_buf(), &reg);
    let cont = s.last_was_kill;
    s.kill.prep(cont);
    s.kill.collect(&text, reg.size >= 0);
    s.notify("Region copied");
    Ok(Datum::Bool(true))
}

pub fn delete_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_region(s.cur_buf(), dot, RegionFlags::empty())?;
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    let cut = s.bufs.buf_mut(id).delete_span(&mut dot, reg.size)?;
    s.undelete.record(cut);
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn yank(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let depth = count(n).max(1) as usize - 1;
    let text = s
        .kill
        .nth(depth)
        .cloned()
        .ok_or_else(|| EdError::failure("Kill ring is empty"))?;
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    let start_abs = s.bufs.buf(id).dot_to_abs(dot);
    s.bufs.buf_mut(id).insert_text(&mut dot, &text)?;
    s.set_dot(dot);
    s.last_yank = Some((start_abs, text.len()));
    Ok(Datum::Bool(true))
}

/// Replace the text of the immediately preceding yank with the next older
/// ring entry, leaving the point at the end of the replacement.
pub fn yank_cycle(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    if !matches!(s.last_command, "yank" | "yankCycle") {
        return Err(EdError::failure("Last command was not a yank"));
    }
    let (start, len) = s
        .last_yank
        .ok_or_else(|| EdError::failure("Last command was not a yank"))?;
    s.kill.cycle();
    let text = s
        .kill
        .top()
        .cloned()
        .ok_or_else(|| EdError::failure("Kill ring is empty"))?;
    let id = s.cur_buf_id();
    let mut dot = s.bufs.buf(id).abs_to_dot(start);
    s.bufs.buf_mut(id).delete_span(&mut dot, len as i64)?;
    s.bufs.buf_mut(id).insert_text(&mut dot, &text)?;
    s.set_dot(dot);
    s.last_yank = Some((start, text.len()));
    Ok(Datum::Bool(true))
}

pub fn cycle_kill_ring(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    for _ in 0..count(n).max(1) {
        s.kill.cycle();
    }
    s.notify("Kill ring cycled");
    Ok(Datum::Bool(true))
}

pub fn undelete(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let text = s
        .undelete
        .text()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| EdError::failure("Nothing deleted"))?;
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    s.bufs.buf_mut(id).insert_text(&mut dot, &text)?;
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

fn mark_id(args: &[Datum]) -> EdResult<u16> {
    match args.first() {
        None | Some(Datum::Nil) => Ok(REGION_MARK),
        Some(d) => {
            let text = d.as_str()?;
            let c = text
                .bytes()
                .next()
                .ok_or_else(|| EdError::failure("Empty mark name"))?;
            if !(0x20..0x7F).contains(&c) {
                return Err(EdError::failure("Mark must be a printable character"));
            }
            Ok(c as u16)
        }
    }
}

pub fn set_mark(
    s: &mut Session,
    _ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = mark_id(&args)?;
    let dot = s.dot();
    s.cur_buf_mut().set_mark(id, dot, -1);
    s.notify_flags(
        core_status::RcFlags::TERM_ATTR,
        &format!("Mark ~u{}~U set", char::from_u32(id as u32).unwrap_or('.')),
    );
    Ok(Datum::Bool(true))
}

pub fn swap_mark(
    s: &mut Session,
    _ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = mark_id(&args)?;
    let mut dot = s.dot();
    s.cur_buf_mut().swap_mark(id, &mut dot)?;
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn delete_mark(
    s: &mut Session,
    _ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = mark_id(&args)?;
    if !s.cur_buf_mut().delete_mark(id) {
        return Err(EdError::failure("No such mark in this buffer"));
    }
    Ok(Datum::Bool(true))
}

fn case_region(s: &mut Session, xform: fn(&mut [u8])) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_region(s.cur_buf(), dot, RegionFlags::FORCE_BEGIN)?;
    let (start, len) = reg.span(s.cur_buf());
    let id = s.cur_buf_id();
    let mut d = start;
    let mut cut = s.bufs.buf_mut(id).delete_span(&mut d, len as i64)?;
    xform(&mut cut);
    s.bufs.buf_mut(id).insert_text(&mut d, &cut)?;
    s.set_dot(d);
    Ok(Datum::Bool(true))
}

pub fn upper_case_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    case_region(s, case::upcase)
}

pub fn lower_case_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    case_region(s, case::downcase)
}

pub fn title_case_region(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    case_region(s, case::titlecase)
}

// --- keyboard macro ----------------------------------------------------------

pub fn begin_key_macro(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    s.input.kbd.start_record()?;
    s.notify("Begin macro");
    Ok(Datum::Bool(true))
}

pub fn end_key_macro(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    s.input.kbd.stop_record()?;
    s.notify("End macro");
    Ok(Datum::Bool(true))
}

pub fn xeq_key_macro(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let reps = count(n);
    if reps < 0 {
        return Err(EdError::failure("Repeat count cannot be negative"));
    }
    let loop_max = s.interp.loop_max;
    s.input.kbd.start_play(reps as u32, loop_max)?;
    Ok(Datum::Bool(true))
}
