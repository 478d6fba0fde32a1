//! Script execution, key binding, and hook commands.

use crate::{Session, Ui};
use core_datum::Datum;
use core_input::{BindTarget, ExtKey, parse_key_seq};
use core_script::HookKind;
use core_status::{EdError, EdResult};
use std::fs;

/// Execute a macro buffer by name, passing any further arguments.
pub fn xeq_buf(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Execute buffer")?;
    let id = s
        .bufs
        .find(&name)
        .or_else(|| s.bufs.find(&crate::session::macro_buffer_name(&name)))
        .ok_or_else(|| EdError::failure(format!("No such buffer, \"{}\"", name)))?;
    s.exec_macro_buffer(id, args.into_iter().skip(1).collect(), n)
}

/// Execute a script file, resolving it on the script search path.
pub fn xeq_file(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Execute file")?;
    let path = s
        .cfg
        .find_script(&name)
        .ok_or_else(|| EdError::failure(format!("No such script, \"{}\"", name)))?;
    let text = fs::read_to_string(&path)
        .map_err(|e| EdError::failure(format!("Cannot read \"{}\": {}", path.display(), e)))?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    s.exec_lines(&lines)
}

/// Execute a command or macro by name (the `M-x` entry point).
pub fn run(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let name = crate::commands::str_or_prompt(&args, 0, ui, "Execute")?;
    crate::commands::dispatch_name(s, ui, &name, args.into_iter().skip(1).collect(), n)
}

/// Resolve a one- or two-key literal against the binding table, requiring a
/// bound prefix for the leading key of a pair.
pub fn resolve_key_seq(s: &Session, text: &str) -> EdResult<ExtKey> {
    let keys = parse_key_seq(text)?;
    match keys.as_slice() {
        [one] => Ok(*one),
        [first, second] => match s.bindings.get(*first) {
            Some(BindTarget::Prefix(p)) => Ok(second.with_prefix(p)),
            _ => Err(EdError::failure(format!(
                "\"{}\" is not a prefix key",
                first
            ))),
        },
        _ => unreachable!("parse_key_seq caps at two"),
    }
}

/// Bind a key sequence to a command or macro.
pub fn bind_key(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let lit = crate::commands::str_or_prompt(&args, 0, ui, "Bind key")?;
    let name = crate::commands::str_or_prompt(&args, 1, ui, "To command or macro")?;
    let key = resolve_key_seq(s, &lit)?;
    let target = match crate::commands::command_index(&name) {
        Some(id) => BindTarget::Command(id),
        None => {
            let bname = crate::session::macro_buffer_name(&name);
            let id = s.bufs.find(&bname).ok_or_else(|| {
                EdError::failure(format!("No such command or macro, \"{}\"", name))
            })?;
            BindTarget::Macro(id)
        }
    };
    s.bindings.bind(key, target)?;
    s.notify(&format!("\"{}\" bound to \"{}\"", key, name));
    Ok(Datum::Bool(true))
}

pub fn unbind_key(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let lit = crate::commands::str_or_prompt(&args, 0, ui, "Unbind key")?;
    let key = resolve_key_seq(s, &lit)?;
    let existed = s.bindings.unbind(key);
    if !existed {
        return Err(EdError::failure(format!("Key \"{}\" is not bound", key)));
    }
    Ok(Datum::Bool(true))
}

/// Attach a macro to a hook (`setHook hook, macro`); a nil macro clears it.
pub fn set_hook(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let hook_name = crate::commands::str_or_prompt(&args, 0, ui, "Set hook")?;
    let kind = HookKind::from_name(&hook_name)?;
    match args.get(1) {
        Some(Datum::Nil) => {
            s.hooks.set(kind, None);
            s.notify(&format!("Hook \"{}\" cleared", kind.name()));
            Ok(Datum::Bool(true))
        }
        Some(d) => {
            let target = d.as_str()?.to_string();
            let bname = crate::session::macro_buffer_name(&target);
            if s.bufs.find(&bname).is_none() {
                return Err(EdError::failure(format!("No such macro, \"{}\"", target)));
            }
            s.hooks.set(kind, Some(target.clone()));
            s.notify(&format!("Hook \"{}\" set to \"{}\"", kind.name(), target));
            Ok(Datum::Bool(true))
        }
        None => {
            let target = ui
                .prompt("Macro")?
                .filter(|t| !t.is_empty());
            match target {
                Some(t) => {
                    s.hooks.set(kind, Some(t));
                    Ok(Datum::Bool(true))
                }
                None => {
                    s.hooks.set(kind, None);
                    Ok(Datum::Bool(true))
                }
            }
        }
    }
}
