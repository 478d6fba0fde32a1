//! Buffer selection, file commands, narrow/widen, and exit.

use crate::{Session, Ui};
use core_datum::{BlobKind, Datum};
use core_layout::WinFlags;
use core_script::HookKind;
use core_status::{EdError, EdResult, RcFlags, Severity};
use core_text::{BufFlags, Face, region, region::RegionFlags};
use std::path::{Path, PathBuf};

/// Select (creating if necessary) a buffer by name and show it in the
/// current window.
pub fn select_buf(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Use buffer")?;
    let (id, created) = s.bufs.find_or_create(&name)?;
    if created {
        s.run_hook(HookKind::CreateBuf, vec![Datum::str(name.clone())])?;
    }
    s.show_buffer(id)?;
    Ok(Datum::Bool(created))
}

fn cycle_buf(s: &mut Session, forward: bool) -> EdResult<Datum> {
    let names = s.bufs.names();
    let visible: Vec<&String> = names
        .iter()
        .filter(|n| {
            s.bufs
                .find(n)
                .map(|id| !s.bufs.buf(id).flags.contains(BufFlags::HIDDEN))
                .unwrap_or(false)
        })
        .collect();
    if visible.len() < 2 {
        return Err(EdError::failure("No other buffer"));
    }
    let cur_name = s.cur_buf().name.clone();
    let pos = visible.iter().position(|n| **n == cur_name).unwrap_or(0);
    let next = if forward {
        (pos + 1) % visible.len()
    } else {
        (pos + visible.len() - 1) % visible.len()
    };
    let id = s.bufs.find(visible[next]).expect("name came from the set");
    s.show_buffer(id)?;
    Ok(Datum::Bool(true))
}

pub fn next_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    cycle_buf(s, true)
}

pub fn prev_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    cycle_buf(s, false)
}

pub fn delete_buf(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Delete buffer")?;
    let id = s
        .bufs
        .find(&name)
        .ok_or_else(|| EdError::failure(format!("No such buffer, \"{}\"", name)))?;
    s.delete_buffer(id)?;
    s.notify(&format!("Buffer \"{}\" deleted", name));
    Ok(Datum::Bool(true))
}

pub fn rename_buf(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let new_name = crate::commands::str_or_prompt(&args, 0, ui, "New name")?;
    let id = s.cur_buf_id();
    s.bufs.rename(id, &new_name)?;
    Ok(Datum::str(new_name))
}

/// List buffers on the message line; the return value is an array of
/// buffer references usable from scripts.
pub fn show_buffers(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let names = s.bufs.names().join(", ");
    s.notify_flags(RcFlags::NO_WRAP, &names);
    let refs: Vec<Datum> = s
        .bufs
        .iter()
        .map(|(id, _)| Datum::Blob {
            kind: BlobKind::Buffer,
            id: id.0,
        })
        .collect();
    Ok(Datum::Array(refs))
}

/// Hide everything outside the line block selected by `n` (0 selects the
/// dot/mark region).
pub fn narrow_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let reg = region::get_line_region(
        s.cur_buf(),
        dot,
        n,
        RegionFlags::INCLUDE_DELIM | RegionFlags::LINE_SELECT,
    )?;
    let first_keep = reg.dot.line;
    let last_keep = {
        let b = s.cur_buf();
        let mut cur = first_keep;
        for _ in 1..reg.line_count.max(1) {
            match b.next_line(cur) {
                Some(nx) => cur = nx,
                None => break,
            }
        }
        cur
    };
    let id = s.cur_buf_id();
    s.bufs.buf_mut(id).narrow(first_keep, last_keep)?;
    // Faces pointing into the hidden chains land on the block start.
    let first = s.bufs.buf(id).first_line();
    for screen in s.layout.screens_mut() {
        for w in &mut screen.windows {
            if w.buf == id {
                w.face = Face::at(first);
                w.dirty(WinFlags::HARD | WinFlags::MODE);
            }
        }
    }
    s.notify("Buffer narrowed");
    Ok(Datum::Bool(true))
}

pub fn widen_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = s.cur_buf_id();
    s.bufs.buf_mut(id).widen()?;
    for screen in s.layout.screens_mut() {
        for w in &mut screen.windows {
            if w.buf == id {
                w.dirty(WinFlags::HARD | WinFlags::MODE | WinFlags::REFRAME);
            }
        }
    }
    s.notify("Buffer widened");
    Ok(Datum::Bool(true))
}

pub fn trunc_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let dot = s.dot();
    let (abs, total) = {
        let b = s.cur_buf();
        (b.dot_to_abs(dot), b.byte_count())
    };
    let remaining = (total - abs) as i64;
    if remaining > 0 {
        let mut d = dot;
        let id = s.cur_buf_id();
        let cut = s.bufs.buf_mut(id).delete_span(&mut d, remaining)?;
        s.undelete.record(cut);
        s.set_dot(d);
    }
    s.notify("Buffer truncated");
    Ok(Datum::Bool(true))
}

pub fn clear_buf(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = s.cur_buf_id();
    s.bufs.buf_mut(id).clear();
    let first = s.bufs.buf(id).first_line();
    for screen in s.layout.screens_mut() {
        for w in &mut screen.windows {
            if w.buf == id {
                w.face = Face::at(first);
                w.dirty(WinFlags::HARD | WinFlags::MODE);
            }
        }
    }
    Ok(Datum::Bool(true))
}

// --- file commands -----------------------------------------------------------

/// Read a file into the current buffer.
pub fn read_file(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let path = crate::commands::str_or_prompt(&args, 0, ui, "Read file")?;
    let path = s.cfg.expand_tilde(&path);
    let id = s.cur_buf_id();
    let lines = s.read_file_into(id, &path, None)?;
    let dot = s.bufs.buf(id).start_dot();
    s.set_dot(dot);
    s.notify(&format!("Read {} lines", lines));
    Ok(Datum::Int(lines as i64))
}

/// Buffer name a file lands in: its final path component.
fn file_buffer_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Switch to (creating and reading if needed) a buffer holding the file.
pub fn find_file(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let raw = crate::commands::str_or_prompt(&args, 0, ui, "Find file")?;
    let path = s.cfg.expand_tilde(&raw);
    let name = file_buffer_name(&path);
    let (id, created) = s.bufs.find_or_create(&name)?;
    if created {
        s.run_hook(HookKind::CreateBuf, vec![Datum::str(name.clone())])?;
    }
    let need_read = created || !s.bufs.buf(id).flags.contains(BufFlags::ACTIVE);
    if need_read {
        if path.exists() {
            let lines = s.read_file_into(id, &path, None)?;
            s.notify(&format!("Read {} lines", lines));
        } else {
            let b = s.bufs.buf_mut(id);
            b.filename = Some(path.clone());
            b.flags.insert(BufFlags::ACTIVE);
            s.notify("(New file)");
        }
    }
    s.show_buffer(id)?;
    s.run_hook(HookKind::Filename, vec![Datum::str(path.display().to_string())])?;
    Ok(Datum::Bool(created))
}

pub fn save_file(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let id = s.cur_buf_id();
    if !s.bufs.buf(id).flags.contains(BufFlags::CHANGED) {
        s.notify("(No changes)");
        return Ok(Datum::Bool(false));
    }
    let lines = s.write_buffer(id, None)?;
    s.notify(&format!("Wrote {} lines", lines));
    Ok(Datum::Bool(true))
}

pub fn write_file(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let path = crate::commands::str_or_prompt(&args, 0, ui, "Write file")?;
    let path: PathBuf = s.cfg.expand_tilde(&path);
    let id = s.cur_buf_id();
    let lines = s.write_buffer(id, Some(&path))?;
    s.notify(&format!("Wrote {} lines", lines));
    Ok(Datum::Int(lines as i64))
}

/// Leave the editor. With changed buffers present, a numeric argument
/// forces the exit.
pub fn exit(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let dirty = s
        .bufs
        .iter()
        .any(|(_, b)| b.flags.contains(BufFlags::CHANGED) && !b.flags.contains(BufFlags::HIDDEN));
    if dirty && n.is_none() {
        return Err(EdError::failure(
            "Changed buffer(s) exist; use a numeric argument to force exit",
        ));
    }
    s.exiting = Some(0);
    Err(EdError::new(Severity::UserExit, ""))
}
