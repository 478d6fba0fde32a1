//! The keystroke cycle: key assembly, numeric arguments, binding
//! resolution, hooks, and self-insert.
//!
//! One call handles one command: key (possibly with prefix composition) →
//! pre-key hook → bound command, macro, or self-insert → post-key hook. The
//! caller owns redisplay and error recording, so a keyboard macro playing
//! back produces exactly the sequence the recording produced.

use crate::commands::dispatch;
use crate::{Session, Ui};
use core_datum::Datum;
use core_input::{BindTarget, ExtKey, KeyMods};
use core_script::HookKind;
use core_status::{EdError, EdResult};
use tracing::trace;

fn next_key(s: &mut Session, ui: &mut dyn Ui) -> EdResult<ExtKey> {
    s.input.next_key(|| ui.read_key())
}

/// Read and execute one command. Returns the key that drove it.
pub fn interact_once(s: &mut Session, ui: &mut dyn Ui) -> EdResult<ExtKey> {
    s.input.kbd.note_command_start();
    let mut key = next_key(s, ui)?;
    // The pending message dies once the user acts again.
    s.rc.clear();

    if key == s.core_keys.abort {
        return Err(EdError::aborted());
    }

    // Numeric argument collection.
    let mut n: Option<i64> = s.pending_n.take();
    if key == s.core_keys.univ_arg || key == s.core_keys.neg_arg {
        let mut value: i64 = 4;
        let mut digits: Option<i64> = None;
        let mut neg = key == s.core_keys.neg_arg;
        loop {
            let k = next_key(s, ui)?;
            if k == s.core_keys.abort {
                return Err(EdError::aborted());
            }
            if k == s.core_keys.univ_arg {
                value = value.saturating_mul(4);
                continue;
            }
            if k == s.core_keys.neg_arg {
                neg = true;
                continue;
            }
            if k.mods.is_empty() && k.base.is_ascii_digit() {
                digits = Some(digits.unwrap_or(0) * 10 + (k.base - b'0') as i64);
                continue;
            }
            key = k;
            break;
        }
        let magnitude = digits.unwrap_or(if neg { 1 } else { value });
        n = Some(if neg { -magnitude } else { magnitude });
    }

    // Quote: the next key inserts literally.
    if key == s.core_keys.quote {
        let k = next_key(s, ui)?;
        let byte = if k.mods.contains(KeyMods::CTRL) {
            k.base ^ 0x40
        } else {
            k.base
        };
        self_insert_byte(s, byte, n)?;
        s.run_hook(HookKind::PostKey, vec![])?;
        return Ok(key);
    }

    s.run_hook(HookKind::PreKey, vec![Datum::Int(key.hash() as i64)])?;

    // Binding resolution with prefix composition.
    let mut ek = key;
    loop {
        match s.bindings.get(ek) {
            Some(BindTarget::Prefix(p)) => {
                let k2 = next_key(s, ui)?;
                if k2 == s.core_keys.abort {
                    return Err(EdError::aborted());
                }
                ek = k2.with_prefix(p);
            }
            Some(BindTarget::Command(id)) => {
                dispatch(s, ui, id, Vec::new(), n)?;
                break;
            }
            Some(BindTarget::Macro(bid)) => {
                s.exec_macro_buffer(bid, Vec::new(), n)?;
                s.last_command = "";
                break;
            }
            None => {
                self_insert(s, ek, n)?;
                break;
            }
        }
    }

    s.run_hook(HookKind::PostKey, vec![])?;
    Ok(ek)
}

/// An unbound key: printable characters insert themselves, anything else is
/// an error.
fn self_insert(s: &mut Session, key: ExtKey, n: Option<i64>) -> EdResult<()> {
    if !key.is_self_insert() {
        return Err(EdError::failure(format!("Key \"{}\" not bound", key)));
    }
    self_insert_byte(s, key.base, n)?;
    s.last_command = "selfInsert";
    Ok(())
}

fn self_insert_byte(s: &mut Session, byte: u8, n: Option<i64>) -> EdResult<()> {
    let k = n.unwrap_or(1);
    if k < 0 {
        return Err(EdError::failure("Repeat count cannot be negative"));
    }
    s.check_writable()?;
    let replace_mode = s.buf_mode_on(s.mode_cache.repl);
    let wrap_mode = s.buf_mode_on(s.modes.find(core_modes::builtin::WRAP).expect("seeded"));
    let id = s.cur_buf_id();
    let mut dot = s.dot();
    let text = vec![byte; k as usize];
    if replace_mode {
        // Overwrite up to end of line, then insert.
        let avail = s.bufs.buf(id).line_len(dot.line).saturating_sub(dot.off);
        let over = (k as usize).min(avail);
        if over > 0 {
            s.bufs.buf_mut(id).delete_span(&mut dot, over as i64)?;
        }
    }
    s.bufs.buf_mut(id).insert_text(&mut dot, &text)?;
    s.set_dot(dot);
    trace!(target: "input.key", byte, count = k, "self_insert");
    if matches!(byte, b')' | b']' | b'}') {
        s.fence_flash = crate::commands::motion::match_fence(s.cur_buf(), dot);
    }
    if wrap_mode && byte == b' ' {
        s.run_hook(HookKind::Wrap, vec![])?;
    }
    s.kill.stop_accumulating();
    s.last_was_kill = false;
    Ok(())
}
