//! Mode commands: buffer and global mode changes, user mode management.

use crate::{Session, Ui};
use core_datum::Datum;
use core_modes::ModeFlags;
use core_script::HookKind;
use core_status::{EdError, EdResult};

/// Requested state: explicit on/off, or toggle when unstated.
fn requested(args: &[Datum], current: bool) -> bool {
    match args.get(1) {
        Some(d) => d.is_true(),
        None => !current,
    }
}

/// Change a buffer-scope mode in the current buffer.
pub fn chg_mode(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Change buffer mode")?;
    let id = s
        .modes
        .find(&name)
        .ok_or_else(|| EdError::failure(format!("No such mode, \"{}\"", name)))?;
    let spec = s.modes.get(id).expect("just found");
    if spec.flags.contains(ModeFlags::GLOBAL) {
        return Err(EdError::failure(format!(
            "\"{}\" is a global mode",
            spec.name
        )));
    }
    let group = spec.group;
    let on_now = s.buf_mode_on(id);
    let want = requested(&args, on_now);
    {
        let buf = s.cur_buf_mut();
        if want {
            if !buf.modes.contains(&id) {
                buf.modes.push(id);
            }
        } else {
            buf.modes.retain(|m| *m != id);
        }
    }
    // Group exclusivity within the buffer.
    if want {
        if let Some(gid) = group {
            let siblings: Vec<_> = s
                .modes
                .iter()
                .filter(|(mid, m)| *mid != id && m.group == Some(gid))
                .map(|(mid, _)| mid)
                .collect();
            let buf = s.cur_buf_mut();
            buf.modes.retain(|m| !siblings.contains(m));
        }
    }
    s.cur_buf_mut().touch(core_text::TouchLevel::Edit);
    s.run_hook(
        HookKind::Mode,
        vec![Datum::str(name.clone()), Datum::Bool(want)],
    )?;
    s.notify(&format!(
        "Mode \"{}\" {}",
        name,
        if want { "enabled" } else { "disabled" }
    ));
    Ok(Datum::Bool(want))
}

/// Change a global mode.
pub fn chg_global_mode(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Change global mode")?;
    let id = s
        .modes
        .find(&name)
        .ok_or_else(|| EdError::failure(format!("No such mode, \"{}\"", name)))?;
    let spec = s.modes.get(id).expect("just found");
    if !spec.flags.contains(ModeFlags::GLOBAL) {
        return Err(EdError::failure(format!(
            "\"{}\" is a buffer mode",
            spec.name
        )));
    }
    let want = requested(&args, s.modes.enabled(id));
    s.modes.set_enabled(id, want)?;
    s.run_hook(
        HookKind::Mode,
        vec![Datum::str(name.clone()), Datum::Bool(want)],
    )?;
    s.notify(&format!(
        "Global mode \"{}\" {}",
        name,
        if want { "enabled" } else { "disabled" }
    ));
    Ok(Datum::Bool(want))
}

pub fn create_mode(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Create mode")?;
    let desc = crate::commands::opt_str(&args, 1)?;
    // Global scope when the numeric argument says so.
    let global = n.is_some();
    s.modes.create(&name, desc.as_deref(), global)?;
    s.notify(&format!("Mode \"{}\" created", name));
    Ok(Datum::Bool(true))
}

pub fn delete_mode(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Delete mode")?;
    let id = s
        .modes
        .find(&name)
        .ok_or_else(|| EdError::failure(format!("No such mode, \"{}\"", name)))?;
    s.modes.delete(id)?;
    // Drop memberships pointing at the dead slot.
    let ids: Vec<core_text::BufferId> = s.bufs.iter().map(|(i, _)| i).collect();
    for bid in ids {
        s.bufs.buf_mut(bid).modes.retain(|m| *m != id);
    }
    s.notify(&format!("Mode \"{}\" deleted", name));
    Ok(Datum::Bool(true))
}

pub fn show_modes(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let mut global = Vec::new();
    for (id, m) in s.modes.iter() {
        if m.name.is_empty() || m.flags.contains(ModeFlags::HIDDEN) {
            continue;
        }
        if m.flags.contains(ModeFlags::GLOBAL) && s.modes.enabled(id) {
            global.push(m.name.clone());
        }
    }
    let buf_modes: Vec<String> = s
        .cur_buf()
        .modes
        .iter()
        .filter_map(|id| s.modes.get(*id).map(|m| m.name.clone()))
        .collect();
    let msg = format!(
        "Global: {}  Buffer: {}",
        if global.is_empty() {
            "(none)".to_string()
        } else {
            global.join(" ")
        },
        if buf_modes.is_empty() {
            "(none)".to_string()
        } else {
            buf_modes.join(" ")
        }
    );
    s.notify(&msg);
    Ok(Datum::str(msg))
}
