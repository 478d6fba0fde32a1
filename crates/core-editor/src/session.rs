//! Session state and the operations commands build on.

use core_config::Config;
use core_datum::{Datum, Ring};
use core_input::{BindTable, CoreKeys, InputState};
use core_layout::{Layout, WinFlags};
use core_modes::{ModeId, ModeTable, builtin};
use core_script::{HookKind, HookTable, Interp};
use core_search::{PatFlags, Pattern, ReplPat};
use core_status::{EdError, EdResult, RcFlags, ResultChannel, Severity};
use core_text::{
    BufFlags, Buffer, BufferId, BufferSet, Dot, Face, KillRing, TouchLevel, Undelete,
};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Search/replace state shared by the search commands and the script `=~`
/// operator's defaults.
#[derive(Debug)]
pub struct SearchState {
    /// Last search pattern text, as entered (may carry `:opts`).
    pub pat_text: String,
    pub pattern: Option<Pattern>,
    pub repl_text: String,
    pub repl: Option<ReplPat>,
    /// MRU of previous pattern texts.
    pub ring: Ring<String>,
    /// Text of the last successful match.
    pub last_match: Option<Vec<u8>>,
}

impl SearchState {
    fn new(ring_size: usize) -> Self {
        Self {
            pat_text: String::new(),
            pattern: None,
            repl_text: String::new(),
            repl: None,
            ring: Ring::new(ring_size),
            last_match: None,
        }
    }
}

/// Cached ids of built-in modes consulted on hot paths.
#[derive(Debug, Clone, Copy)]
pub struct ModeCache {
    pub exact: ModeId,
    pub regexp: ModeId,
    pub hscrl: ModeId,
    pub msgdisp: ModeId,
    pub rdonly: ModeId,
    pub repl: ModeId,
}

/// The editor session; one per process.
pub struct Session {
    pub bufs: BufferSet,
    pub layout: Layout,
    pub modes: ModeTable,
    pub mode_cache: ModeCache,
    pub rc: ResultChannel,
    pub kill: KillRing,
    pub undelete: Undelete,
    pub search: SearchState,
    pub bindings: BindTable,
    pub core_keys: CoreKeys,
    pub input: InputState,
    pub interp: Interp,
    pub hooks: HookTable,
    pub cfg: Config,
    /// Set when an exit severity reaches the command loop; holds the
    /// process exit code.
    pub exiting: Option<i32>,
    /// The previous command was a kill, so the next kill extends the same
    /// ring entry.
    pub last_was_kill: bool,
    /// Pending numeric argument for the next command.
    pub pending_n: Option<i64>,
    /// Name of the last successfully dispatched command; yank-cycling and
    /// kill accumulation consult it.
    pub last_command: &'static str,
    /// Span of the text inserted by the last yank, for yankCycle.
    pub last_yank: Option<(usize, usize)>,
    /// Opener to show transiently after a closing fence was typed.
    pub fence_flash: Option<Dot>,
    /// Nesting level of in-flight hook invocations.
    hook_depth: u32,
}

impl Session {
    /// Build a session with a scratch buffer on one screen.
    pub fn new(cfg: Config, cols: u16, rows: u16) -> EdResult<Self> {
        let modes = ModeTable::new();
        let mode_cache = ModeCache {
            exact: modes.find(builtin::EXACT).expect("seeded"),
            regexp: modes.find(builtin::REGEXP).expect("seeded"),
            hscrl: modes.find(builtin::HSCRL).expect("seeded"),
            msgdisp: modes.find(builtin::MSGDISP).expect("seeded"),
            rdonly: modes.find(builtin::RDONLY).expect("seeded"),
            repl: modes.find(builtin::REPL).expect("seeded"),
        };
        let mut bufs = BufferSet::new();
        let scratch = bufs.create("scratch")?;
        let face = Face::at(bufs.buf(scratch).first_line());
        let work_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let layout = Layout::new(scratch, face, cols, rows, work_dir);
        let mut interp = Interp::new();
        interp.loop_max = cfg.file.script.loop_max;
        interp.max_depth = cfg.file.script.max_depth;
        let kill = KillRing::new(cfg.file.rings.kill_size);
        let search = SearchState::new(cfg.file.rings.search_size);
        let mut session = Self {
            bufs,
            layout,
            modes,
            mode_cache,
            rc: ResultChannel::new(),
            kill,
            undelete: Undelete::default(),
            search,
            bindings: BindTable::new(),
            core_keys: CoreKeys::default(),
            input: InputState::new(),
            interp,
            hooks: HookTable::new(),
            cfg,
            exiting: None,
            last_was_kill: false,
            pending_n: None,
            last_command: "",
            last_yank: None,
            fence_flash: None,
            hook_depth: 0,
        };
        crate::commands::bind_defaults(&mut session.bindings)?;
        Ok(session)
    }

    // --- current-object access ----------------------------------------------

    pub fn cur_buf_id(&self) -> BufferId {
        self.layout.current_window().buf
    }

    pub fn cur_buf(&self) -> &Buffer {
        self.bufs.buf(self.cur_buf_id())
    }

    pub fn cur_buf_mut(&mut self) -> &mut Buffer {
        let id = self.cur_buf_id();
        self.bufs.buf_mut(id)
    }

    pub fn dot(&self) -> Dot {
        self.layout.current_window().face.dot
    }

    /// Move the dot, recording the movement for redisplay.
    pub fn set_dot(&mut self, dot: Dot) {
        let w = self.layout.current_window_mut();
        w.face.dot = dot;
        w.dirty(WinFlags::MOVE);
        let id = self.cur_buf_id();
        self.bufs.buf_mut(id).touch(TouchLevel::Move);
    }

    /// Fail when the current buffer may not be edited.
    pub fn check_writable(&self) -> EdResult<()> {
        let b = self.cur_buf();
        if b.flags.contains(BufFlags::READ_ONLY) || self.buf_mode_on(self.mode_cache.rdonly) {
            return Err(EdError::failure(format!(
                "Buffer \"{}\" is read-only",
                b.name
            )));
        }
        Ok(())
    }

    /// Is a buffer-scope mode enabled in the current buffer?
    pub fn buf_mode_on(&self, id: ModeId) -> bool {
        self.cur_buf().modes.contains(&id)
    }

    /// Is a global mode enabled?
    pub fn global_mode_on(&self, id: ModeId) -> bool {
        self.modes.enabled(id)
    }

    /// Pattern flags implied by the session modes.
    pub fn default_pat_flags(&self) -> PatFlags {
        let mut flags = PatFlags::empty();
        if self.global_mode_on(self.mode_cache.exact) {
            flags |= PatFlags::EXACT;
        } else {
            flags |= PatFlags::IGNORE;
        }
        if self.global_mode_on(self.mode_cache.regexp) {
            flags |= PatFlags::REGEXP;
        }
        flags
    }

    // --- messages -----------------------------------------------------------

    /// Success message through the severity gate.
    pub fn notify(&mut self, msg: &str) {
        self.rc.set(Severity::Success, RcFlags::empty(), msg);
    }

    pub fn notify_flags(&mut self, flags: RcFlags, msg: &str) {
        self.rc.set(Severity::Success, flags, msg);
    }

    // --- buffer/window plumbing ---------------------------------------------

    /// Show a buffer in the current window, saving the old buffer's face and
    /// firing the exit/enter hooks.
    pub fn show_buffer(&mut self, id: BufferId) -> EdResult<()> {
        let old = self.cur_buf_id();
        if old == id {
            return Ok(());
        }
        self.run_hook(HookKind::ExitBuf, vec![])?;
        let face = self.layout.current_window().face;
        self.bufs.buf_mut(old).face = face;
        // Restore (and revalidate) the new buffer's saved face.
        let new_buf = self.bufs.buf(id);
        let mut face = new_buf.face;
        if !new_buf.contains_line(face.dot.line) {
            face = Face::at(new_buf.first_line());
        } else if !new_buf.contains_line(face.top) {
            face.top = face.dot.line;
        }
        let w = self.layout.current_window_mut();
        w.buf = id;
        w.face = face;
        w.dirty(WinFlags::HARD | WinFlags::MODE);
        let screen = self.layout.current_screen_mut();
        screen.last_buf = Some(old);
        self.bufs.buf_mut(id).flags.insert(BufFlags::ACTIVE);
        debug!(target: "session", buffer = %self.bufs.buf(id).name, "buffer_shown");
        self.run_hook(HookKind::EnterBuf, vec![])?;
        Ok(())
    }

    /// Number of windows (across screens) showing a buffer.
    pub fn window_count(&self, id: BufferId) -> usize {
        self.layout
            .screens()
            .iter()
            .flat_map(|s| s.windows.iter())
            .filter(|w| w.buf == id)
            .count()
    }

    /// Delete a buffer: refused while displayed or running.
    pub fn delete_buffer(&mut self, id: BufferId) -> EdResult<()> {
        if self.window_count(id) > 0 {
            return Err(EdError::failure(format!(
                "Buffer \"{}\" is being displayed",
                self.bufs.buf(id).name
            )));
        }
        if let Some(info) = &self.bufs.buf(id).macro_info {
            if info.exec_depth > 0 {
                return Err(EdError::failure(format!(
                    "Macro \"{}\" is executing",
                    self.bufs.buf(id).name
                )));
            }
        }
        self.interp.invalidate(id.0);
        self.bufs.delete(id)?;
        Ok(())
    }

    // --- hooks ---------------------------------------------------------------

    /// Run a hook if one is set. A `false` return aborts the triggering
    /// command; a hard failure disables the hook and appends an explanatory
    /// message. Hooks that retrigger themselves are cut off by a depth
    /// bound instead of recursing away.
    pub fn run_hook(&mut self, kind: HookKind, args: Vec<Datum>) -> EdResult<()> {
        let Some(target) = self.hooks.get(kind).map(str::to_string) else {
            return Ok(());
        };
        if self.hook_depth >= 8 {
            return Err(EdError::failure(format!(
                "{} hook recursion too deep",
                kind.name()
            )));
        }
        self.hook_depth += 1;
        let outcome = self.exec_macro_by_name(&target, args, None);
        self.hook_depth -= 1;
        match outcome {
            Ok(v) => {
                if v == Datum::Bool(false) {
                    Err(EdError::failure(format!(
                        "False return from {} hook macro \"{}\"",
                        kind.name(),
                        target
                    )))
                } else {
                    Ok(())
                }
            }
            Err(err) if err.severity.is_user_visible() => {
                self.hooks.disable(kind);
                warn!(target: "session.hooks", hook = kind.name(), %target, "hook_disabled");
                Err(EdError::new(
                    err.severity,
                    format!("{} [{} hook macro \"{}\" disabled]", err.message, kind.name(), target),
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Execute a macro buffer by its user-visible name (without the `@`
    /// sigil) with the given arguments.
    pub fn exec_macro_by_name(
        &mut self,
        name: &str,
        args: Vec<Datum>,
        n: Option<i64>,
    ) -> EdResult<Datum> {
        let bname = macro_buffer_name(name);
        let id = self
            .bufs
            .find(&bname)
            .ok_or_else(|| EdError::failure(format!("No such macro, \"{}\"", name)))?;
        self.exec_macro_buffer(id, args, n)
    }

    /// Top-level macro execution (key bindings, hooks, the interactive
    /// `xeqBuf`): temporarily moves the session interpreter out so it can
    /// call back into the session as the command host.
    pub fn exec_macro_buffer(
        &mut self,
        id: BufferId,
        args: Vec<Datum>,
        n: Option<i64>,
    ) -> EdResult<Datum> {
        let mut interp = std::mem::take(&mut self.interp);
        let result = self.exec_macro_in(&mut interp, id, args, n);
        self.interp = interp;
        result
    }

    /// Execute a macro buffer against a live interpreter, enforcing
    /// argument counts and the constrained flag, with the compile cache
    /// keyed by the buffer's edit version. Nested macro calls come through
    /// here so frames, globals, and the depth bound stay shared.
    pub fn exec_macro_in(
        &mut self,
        interp: &mut Interp,
        id: BufferId,
        args: Vec<Datum>,
        n: Option<i64>,
    ) -> EdResult<Datum> {
        let (lines, version, constrained) = {
            let b = self.bufs.buf(id);
            if let Some(info) = &b.macro_info {
                let argc = args.len();
                if argc < info.min_args as usize {
                    return Err(EdError::script(format!(
                        "Too few arguments for macro \"{}\"",
                        b.name
                    )));
                }
                if let Some(max) = info.max_args {
                    if argc > max as usize {
                        return Err(EdError::script(format!(
                            "Too many arguments for macro \"{}\"",
                            b.name
                        )));
                    }
                }
            }
            let lines: Vec<String> = b
                .lines()
                .map(|l| String::from_utf8_lossy(b.line_text(l)).into_owned())
                .collect();
            (lines, b.version, b.flags.contains(BufFlags::CONSTRAINED))
        };
        if constrained && interp.depth() > 0 {
            return Err(EdError::script(format!(
                "Constrained macro \"{}\" cannot be called from a macro",
                self.bufs.buf(id).name
            )));
        }
        if let Some(info) = &mut self.bufs.buf_mut(id).macro_info {
            info.exec_depth += 1;
        }
        let prog = interp.compile_cached(id.0, version, &lines);
        let result = prog.and_then(|p| interp.run_macro(self, &p, args, n));
        if let Some(info) = &mut self.bufs.buf_mut(id).macro_info {
            info.exec_depth = info.exec_depth.saturating_sub(1);
        }
        result
    }

    /// Execute loose script lines (startup files, `-e`).
    pub fn exec_lines(&mut self, lines: &[String]) -> EdResult<Datum> {
        let mut interp = std::mem::take(&mut self.interp);
        let out = interp.run_lines(self, lines);
        self.interp = interp;
        out
    }
}

/// A macro's buffer name: the reserved `@` sigil plus the macro name.
pub fn macro_buffer_name(name: &str) -> String {
    if let Some(stripped) = name.strip_prefix('@') {
        format!("@{}", stripped)
    } else {
        format!("@{}", name)
    }
}
