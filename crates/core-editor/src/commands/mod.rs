//! The command table and dispatcher.
//!
//! Every operation reachable from a key, a script, or the launcher's `-e`
//! lives here as a named entry. Dispatch enforces the edit gate (read-only
//! buffers), maintains kill-accumulation continuity, and is shared by the
//! interactive loop and the script executor (which suppresses prompting via
//! its `Ui`).

pub mod bufcmds;
pub mod editcmds;
pub mod modecmds;
pub mod motion;
pub mod scriptcmds;
pub mod searchcmds;
pub mod windcmds;

use crate::{ScriptUi, Session, Ui};
use core_datum::Datum;
use core_input::{BindTarget, BindTable, CmdId, Prefix, parse_key_seq};
use core_script::{CommandHost, Interp};
use core_status::{EdError, EdResult};
use core_text::BufFlags;
use tracing::trace;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CmdFlags: u16 {
        /// Mutates buffer text; refused in read-only buffers.
        const EDIT = 1 << 0;
        /// A kill command: consecutive kills extend one ring entry.
        const KILL = 1 << 1;
        /// Hidden from completion listings.
        const HIDDEN = 1 << 2;
    }
}

pub type CmdFunc = fn(&mut Session, &mut dyn Ui, Vec<Datum>, Option<i64>) -> EdResult<Datum>;

pub struct CommandSpec {
    pub name: &'static str,
    pub flags: CmdFlags,
    pub func: CmdFunc,
}

macro_rules! cmd {
    ($name:literal, $func:path) => {
        CommandSpec {
            name: $name,
            flags: CmdFlags::empty(),
            func: $func,
        }
    };
    ($name:literal, $func:path, $($flag:ident)|+) => {
        CommandSpec {
            name: $name,
            flags: CmdFlags::from_bits_truncate($(CmdFlags::$flag.bits())|+),
            func: $func,
        }
    };
}

/// The command table, sorted by name for binary search.
static COMMANDS: &[CommandSpec] = &[
    cmd!("backChar", motion::back_char),
    cmd!("backLine", motion::back_line),
    cmd!("backPage", motion::back_page),
    cmd!("backWord", motion::back_word),
    cmd!("beginBuf", motion::begin_buf),
    cmd!("beginKeyMacro", editcmds::begin_key_macro),
    cmd!("beginLine", motion::begin_line),
    cmd!("bindKey", scriptcmds::bind_key),
    cmd!("chgGlobalMode", modecmds::chg_global_mode),
    cmd!("chgMode", modecmds::chg_mode),
    cmd!("clearBuf", bufcmds::clear_buf, EDIT),
    cmd!("copyRegion", editcmds::copy_region),
    cmd!("createMode", modecmds::create_mode),
    cmd!("cycleKillRing", editcmds::cycle_kill_ring),
    cmd!("deleteBackChar", editcmds::delete_back_char, EDIT),
    cmd!("deleteBuf", bufcmds::delete_buf),
    cmd!("deleteForwChar", editcmds::delete_forw_char, EDIT),
    cmd!("deleteMark", editcmds::delete_mark),
    cmd!("deleteMode", modecmds::delete_mode),
    cmd!("deleteRegion", editcmds::delete_region, EDIT),
    cmd!("deleteScreen", windcmds::delete_screen),
    cmd!("deleteWind", windcmds::delete_wind),
    cmd!("endBuf", motion::end_buf),
    cmd!("endKeyMacro", editcmds::end_key_macro),
    cmd!("endLine", motion::end_line),
    cmd!("exit", bufcmds::exit),
    cmd!("findFile", bufcmds::find_file),
    cmd!("forwChar", motion::forw_char),
    cmd!("forwLine", motion::forw_line),
    cmd!("forwPage", motion::forw_page),
    cmd!("forwWord", motion::forw_word),
    cmd!("gotoFence", motion::goto_fence),
    cmd!("gotoLine", motion::goto_line),
    cmd!("growWind", windcmds::grow_wind),
    cmd!("huntBack", searchcmds::hunt_back),
    cmd!("huntForw", searchcmds::hunt_forw),
    cmd!("insertText", editcmds::insert_text, EDIT),
    cmd!("killLine", editcmds::kill_line, EDIT | KILL),
    cmd!("killRegion", editcmds::kill_region, EDIT | KILL),
    cmd!("lowerCaseRegion", editcmds::lower_case_region, EDIT),
    cmd!("narrowBuf", bufcmds::narrow_buf),
    cmd!("newScreen", windcmds::new_screen),
    cmd!("newline", editcmds::newline, EDIT),
    cmd!("nextBuf", bufcmds::next_buf),
    cmd!("nextScreen", windcmds::next_screen),
    cmd!("nextWind", windcmds::next_wind),
    cmd!("onlyWind", windcmds::only_wind),
    cmd!("prevBuf", bufcmds::prev_buf),
    cmd!("prevWind", windcmds::prev_wind),
    cmd!("queryReplace", searchcmds::query_replace, EDIT),
    cmd!("readFile", bufcmds::read_file),
    cmd!("reframeWind", windcmds::reframe_wind),
    cmd!("renameBuf", bufcmds::rename_buf),
    cmd!("replace", searchcmds::replace_cmd, EDIT),
    cmd!("resizeWind", windcmds::resize_wind),
    cmd!("run", scriptcmds::run),
    cmd!("saveFile", bufcmds::save_file),
    cmd!("searchBack", searchcmds::search_back),
    cmd!("searchForw", searchcmds::search_forw),
    cmd!("selectBuf", bufcmds::select_buf),
    cmd!("setHook", scriptcmds::set_hook),
    cmd!("setMark", editcmds::set_mark),
    cmd!("setReplacePat", searchcmds::set_replace_pat),
    cmd!("setSearchPat", searchcmds::set_search_pat),
    cmd!("showBuffers", bufcmds::show_buffers),
    cmd!("showModes", modecmds::show_modes),
    cmd!("shrinkWind", windcmds::shrink_wind),
    cmd!("splitWind", windcmds::split_wind),
    cmd!("swapMark", editcmds::swap_mark),
    cmd!("titleCaseRegion", editcmds::title_case_region, EDIT),
    cmd!("truncBuf", bufcmds::trunc_buf, EDIT),
    cmd!("unbindKey", scriptcmds::unbind_key),
    cmd!("undelete", editcmds::undelete, EDIT),
    cmd!("upperCaseRegion", editcmds::upper_case_region, EDIT),
    cmd!("widenBuf", bufcmds::widen_buf),
    cmd!("writeFile", bufcmds::write_file),
    cmd!("xeqBuf", scriptcmds::xeq_buf),
    cmd!("xeqFile", scriptcmds::xeq_file),
    cmd!("xeqKeyMacro", editcmds::xeq_key_macro),
    cmd!("yank", editcmds::yank, EDIT),
    cmd!("yankCycle", editcmds::yank_cycle, EDIT),
];

pub fn command_table() -> &'static [CommandSpec] {
    COMMANDS
}

/// Index of a command by exact name.
pub fn command_index(name: &str) -> Option<CmdId> {
    COMMANDS
        .binary_search_by(|c| c.name.cmp(name))
        .ok()
        .map(|i| CmdId(i as u16))
}

/// Execute a command by id, enforcing the edit gate and the kill
/// continuity rule.
pub fn dispatch(
    session: &mut Session,
    ui: &mut dyn Ui,
    id: CmdId,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let spec = COMMANDS
        .get(id.0 as usize)
        .ok_or_else(|| EdError::failure("No such command"))?;
    if spec.flags.contains(CmdFlags::EDIT) {
        session.check_writable()?;
    }
    trace!(target: "session.dispatch", command = spec.name, ?n, "dispatch");
    let was_kill = spec.flags.contains(CmdFlags::KILL);
    if !was_kill {
        session.kill.stop_accumulating();
    }
    let result = (spec.func)(session, ui, args, n);
    session.last_was_kill = was_kill && result.is_ok();
    if result.is_ok() {
        session.last_command = spec.name;
    }
    result
}

/// Execute by name (scripts, `-e`, hooks).
pub fn dispatch_name(
    session: &mut Session,
    ui: &mut dyn Ui,
    name: &str,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    match command_index(name) {
        Some(id) => dispatch(session, ui, id, args, n),
        None => session.exec_macro_by_name(name, args, n),
    }
}

impl CommandHost for Session {
    fn call(
        &mut self,
        interp: &mut Interp,
        name: &str,
        args: Vec<Datum>,
        n: Option<i64>,
    ) -> EdResult<Datum> {
        let mut ui = ScriptUi;
        // Script-executing operations stay on the live interpreter so
        // frames, globals, and the depth bound remain shared; everything
        // else goes through the ordinary dispatcher.
        match name {
            "xeqBuf" => {
                let bname = arg_str(&args, 0, "buffer to execute")?;
                let id = self
                    .bufs
                    .find(&bname)
                    .or_else(|| self.bufs.find(&crate::session::macro_buffer_name(&bname)))
                    .ok_or_else(|| {
                        EdError::failure(format!("No such buffer, \"{}\"", bname))
                    })?;
                self.exec_macro_in(interp, id, args.into_iter().skip(1).collect(), n)
            }
            "run" => {
                let cname = arg_str(&args, 0, "name to execute")?;
                let rest: Vec<Datum> = args.into_iter().skip(1).collect();
                match command_index(&cname) {
                    Some(id) => dispatch(self, &mut ui, id, rest, n),
                    None => {
                        let bname = crate::session::macro_buffer_name(&cname);
                        let id = self.bufs.find(&bname).ok_or_else(|| {
                            EdError::failure(format!("No such macro, \"{}\"", cname))
                        })?;
                        self.exec_macro_in(interp, id, rest, n)
                    }
                }
            }
            _ => match command_index(name) {
                Some(id) => dispatch(self, &mut ui, id, args, n),
                None => {
                    let bname = crate::session::macro_buffer_name(name);
                    let id = self.bufs.find(&bname).ok_or_else(|| {
                        EdError::failure(format!("No such command or macro, \"{}\"", name))
                    })?;
                    self.exec_macro_in(interp, id, args, n)
                }
            },
        }
    }

    fn define_macro(
        &mut self,
        name: &str,
        min_args: u16,
        max_args: Option<u16>,
        lines: &[String],
    ) -> EdResult<()> {
        let bname = crate::session::macro_buffer_name(name);
        let id = match self.bufs.find(&bname) {
            Some(id) => {
                self.interp.invalidate(id.0);
                id
            }
            None => self.bufs.create(&bname)?,
        };
        let b = self.bufs.buf_mut(id);
        let mut text = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                text.push(b'\n');
            }
            text.extend_from_slice(line.as_bytes());
        }
        b.set_text(&text);
        b.flags.insert(BufFlags::MACRO | BufFlags::HIDDEN);
        b.flags.remove(BufFlags::CHANGED);
        b.macro_info = Some(core_text::MacroInfo {
            min_args,
            max_args,
            usage: None,
            desc: None,
            exec_depth: 0,
        });
        trace!(target: "session.dispatch", macro_name = name, "macro_defined");
        Ok(())
    }
}

// --- argument helpers --------------------------------------------------------

pub(crate) fn arg_str(args: &[Datum], i: usize, what: &str) -> EdResult<String> {
    match args.get(i) {
        Some(d) => Ok(d.as_str()?.to_string()),
        None => Err(EdError::script(format!("Missing argument: {}", what))),
    }
}

pub(crate) fn arg_int(args: &[Datum], i: usize, what: &str) -> EdResult<i64> {
    match args.get(i) {
        Some(d) => d.as_int(),
        None => Err(EdError::script(format!("Missing argument: {}", what))),
    }
}

pub(crate) fn opt_str(args: &[Datum], i: usize) -> EdResult<Option<String>> {
    match args.get(i) {
        Some(Datum::Nil) | None => Ok(None),
        Some(d) => Ok(Some(d.as_str()?.to_string())),
    }
}

/// Argument or prompt: scripts must pass the argument, interactive use
/// prompts on the message line.
pub(crate) fn str_or_prompt(
    args: &[Datum],
    i: usize,
    ui: &mut dyn Ui,
    msg: &str,
) -> EdResult<String> {
    if let Some(d) = args.get(i) {
        return Ok(d.as_str()?.to_string());
    }
    match ui.prompt(msg)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(EdError::cancelled()),
    }
}

/// Default key bindings, in the editor's traditional layout.
pub fn bind_defaults(table: &mut BindTable) -> EdResult<()> {
    let prefixes = [
        ("C-x", BindTarget::Prefix(Prefix::Pref1)),
        ("C-c", BindTarget::Prefix(Prefix::Pref2)),
        ("C-h", BindTarget::Prefix(Prefix::Pref3)),
        ("ESC", BindTarget::Prefix(Prefix::Meta)),
    ];
    for (lit, target) in prefixes {
        table.bind(core_input::parse_key(lit)?, target)?;
    }
    let binds: &[(&str, &str)] = &[
        ("C-f", "forwChar"),
        ("C-b", "backChar"),
        ("C-n", "forwLine"),
        ("C-p", "backLine"),
        ("C-a", "beginLine"),
        ("C-e", "endLine"),
        ("C-v", "forwPage"),
        ("C-z", "backPage"),
        ("M-f", "forwWord"),
        ("M-b", "backWord"),
        ("M-<", "beginBuf"),
        ("M->", "endBuf"),
        ("M-g", "gotoLine"),
        ("RTN", "newline"),
        ("C-d", "deleteForwChar"),
        ("DEL", "deleteBackChar"),
        ("C-k", "killLine"),
        ("C-w", "killRegion"),
        ("M-w", "copyRegion"),
        ("C-y", "yank"),
        ("M-y", "yankCycle"),
        ("C-x u", "undelete"),
        ("C-SPC", "setMark"),
        ("C-s", "searchForw"),
        ("C-r", "searchBack"),
        ("C-]", "huntForw"),
        ("M-q", "queryReplace"),
        ("M-r", "replace"),
        ("C-x 2", "splitWind"),
        ("C-x 0", "deleteWind"),
        ("C-x 1", "onlyWind"),
        ("C-x n", "nextWind"),
        ("C-x p", "prevWind"),
        ("C-x z", "growWind"),
        ("C-x Z", "shrinkWind"),
        ("C-x b", "selectBuf"),
        ("C-x k", "deleteBuf"),
        ("C-x C-f", "findFile"),
        ("C-x C-s", "saveFile"),
        ("C-x C-w", "writeFile"),
        ("C-x C-n", "narrowBuf"),
        ("C-x C-d", "widenBuf"),
        ("C-x (", "beginKeyMacro"),
        ("C-x )", "endKeyMacro"),
        ("C-x e", "xeqKeyMacro"),
        ("C-x C-c", "exit"),
        ("C-x x", "xeqBuf"),
        ("M-x", "run"),
        ("C-x m", "chgMode"),
        ("M-m", "chgGlobalMode"),
    ];
    for (seq, name) in binds {
        let id = command_index(name)
            .ok_or_else(|| EdError::failure(format!("No such command, {}", name)))?;
        let keys = parse_key_seq(seq)?;
        let key = match keys.as_slice() {
            [one] => *one,
            [first, second] => {
                // The leading key must resolve to a bound prefix.
                let prefix = match table.get(*first) {
                    Some(BindTarget::Prefix(p)) => p,
                    _ => {
                        return Err(EdError::failure(format!(
                            "\"{}\" is not a prefix key",
                            first
                        )));
                    }
                };
                second.with_prefix(prefix)
            }
            _ => unreachable!("parse_key_seq caps at two"),
        };
        table.bind(key, BindTarget::Command(id))?;
    }
    Ok(())
}
