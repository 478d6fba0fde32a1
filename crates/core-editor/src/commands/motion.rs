//! Point motion commands. Each returns `false` (without an error) when the
//! motion ran out of buffer, matching the informational not-found rule.

use crate::{Session, Ui};
use core_datum::Datum;
use core_status::EdResult;
use core_text::{Dot, case};

fn count(n: Option<i64>) -> i64 {
    n.unwrap_or(1)
}

pub fn forw_char(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return back_char(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let moved = s.cur_buf().forward(&mut dot, k as usize);
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn back_char(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return forw_char(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let moved = s.cur_buf().backward(&mut dot, k as usize);
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn forw_line(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return back_line(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let mut moved = true;
    {
        let b = s.cur_buf();
        for _ in 0..k {
            match b.next_line(dot.line) {
                Some(nx) => dot.line = nx,
                None => {
                    moved = false;
                    break;
                }
            }
        }
        dot.off = dot.off.min(b.line_len(dot.line));
    }
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn back_line(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n);
    if k < 0 {
        return forw_line(s, ui, args, Some(-k));
    }
    let mut dot = s.dot();
    let mut moved = true;
    {
        let b = s.cur_buf();
        for _ in 0..k {
            match b.prev_line(dot.line) {
                Some(pv) => dot.line = pv,
                None => {
                    moved = false;
                    break;
                }
            }
        }
        dot.off = dot.off.min(b.line_len(dot.line));
    }
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn begin_line(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let mut dot = s.dot();
    dot.off = 0;
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn end_line(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let mut dot = s.dot();
    dot.off = s.cur_buf().line_len(dot.line);
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn begin_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.cur_buf().start_dot();
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

pub fn end_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.cur_buf().end_dot();
    s.set_dot(dot);
    Ok(Datum::Bool(true))
}

fn word_byte(b: Option<u8>) -> bool {
    matches!(b, Some(c) if c == b'_' || c.is_ascii_alphanumeric() || case::is_letter(c))
}

pub fn forw_word(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n).max(1);
    let mut dot = s.dot();
    let mut moved = true;
    {
        let b = s.cur_buf();
        for _ in 0..k {
            // Skip to the next word, then over it.
            while !word_byte(b.byte_at(dot)) {
                if !b.forward(&mut dot, 1) {
                    moved = false;
                    break;
                }
            }
            while word_byte(b.byte_at(dot)) {
                if !b.forward(&mut dot, 1) {
                    break;
                }
            }
            if !moved {
                break;
            }
        }
    }
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn back_word(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let k = count(n).max(1);
    let mut dot = s.dot();
    let mut moved = true;
    {
        let b = s.cur_buf();
        for _ in 0..k {
            if !b.backward(&mut dot, 1) {
                moved = false;
                break;
            }
            while !word_byte(b.byte_at(dot)) {
                if !b.backward(&mut dot, 1) {
                    moved = false;
                    break;
                }
            }
            while word_byte(b.byte_at(dot)) {
                if !b.backward(&mut dot, 1) {
                    break;
                }
            }
            // Ended on the separator before the word (unless at start).
            if word_byte(b.byte_at(dot)) {
                continue;
            }
            b.forward(&mut dot, 1);
        }
    }
    s.set_dot(dot);
    Ok(Datum::Bool(moved))
}

pub fn forw_page(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let pages = count(n);
    let rows = s.layout.current_window().rows.max(3) as i64;
    forw_line(s, ui, args, Some(pages * (rows - 2)))
}

pub fn back_page(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let pages = count(n);
    let rows = s.layout.current_window().rows.max(3) as i64;
    back_line(s, ui, args, Some(pages * (rows - 2)))
}

/// Find the fence character matching the one at (or before) the dot and
/// return its position, honoring nesting. Scans forward from an opener,
/// backward from a closer.
pub(crate) fn match_fence(buf: &core_text::Buffer, dot: Dot) -> Option<Dot> {
    let (open, close, forward, mut pos) = match buf.byte_at(dot) {
        Some(c @ (b'(' | b'[' | b'{')) => (c, closer_of(c), true, dot),
        _ => {
            // Closer just typed: the dot sits after it.
            let mut p = dot;
            if !buf.backward(&mut p, 1) {
                return None;
            }
            match buf.byte_at(p) {
                Some(c @ (b')' | b']' | b'}')) => (opener_of(c), c, false, p),
                _ => return None,
            }
        }
    };
    let mut depth = 0i32;
    loop {
        match buf.byte_at(pos) {
            Some(c) if c == open && forward || c == close && !forward => depth += 1,
            Some(c) if c == close && forward || c == open && !forward => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
        let moved = if forward {
            buf.forward(&mut pos, 1)
        } else {
            buf.backward(&mut pos, 1)
        };
        if !moved {
            return None;
        }
    }
}

fn closer_of(c: u8) -> u8 {
    match c {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

fn opener_of(c: u8) -> u8 {
    match c {
        b')' => b'(',
        b']' => b'[',
        _ => b'{',
    }
}

/// Move the dot to the fence matching the one at (or just before) it.
pub fn goto_fence(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    match match_fence(s.cur_buf(), dot) {
        Some(target) => {
            s.set_dot(target);
            Ok(Datum::Bool(true))
        }
        None => Err(core_status::EdError::failure("No matching fence")),
    }
}

/// Go to a 1-based line number (the `n` argument or first argument);
/// negative counts from the end of the buffer.
pub fn goto_line(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let target = match (args.first(), n) {
        (Some(d), _) => d.as_int()?,
        (None, Some(v)) => v,
        (None, None) => {
            let text = crate::commands::str_or_prompt(&args, 0, ui, "Go to line")?;
            text.trim()
                .parse::<i64>()
                .map_err(|_| core_status::EdError::failure("Invalid line number"))?
        }
    };
    let total = s.cur_buf().line_count() as i64;
    let idx = if target < 0 {
        (total + target).max(0)
    } else {
        (target - 1).max(0)
    }
    .min(total - 1) as usize;
    let line = {
        let b = s.cur_buf();
        let mut it = b.lines();
        let mut chosen = b.first_line();
        for _ in 0..=idx {
            match it.next() {
                Some(id) => chosen = id,
                None => break,
            }
        }
        chosen
    };
    s.set_dot(Dot::new(line, 0));
    Ok(Datum::Bool(true))
}
