//! Ember entry point: command line, logging, terminal bring-up, startup
//! files, and the command loop.

mod termui;

use anyhow::Result;
use clap::Parser;
use core_config::{SITE_STARTUP, USER_STARTUP};
use core_datum::Datum;
use core_editor::{Session, interact_once};
use core_render::{PendingMessage, RenderParams};
use core_status::{RcFlags, Severity};
use core_terminal::{CrosstermBackend, TerminalBackend};
use core_text::BufFlags;
use std::path::PathBuf;
use std::process::ExitCode;
use termui::TermUi;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "em",
    version,
    about = "Ember: a terminal Emacs-style editor with an embedded scripting language",
    disable_help_flag = false
)]
struct Args {
    /// Display the usage summary and exit.
    #[arg(short = 'C', long = "usage")]
    usage: bool,
    /// Disable (!) or enable buffer modes on the first buffer: -D[!]mode,...
    #[arg(short = 'D', value_name = "MODES")]
    buf_modes: Option<String>,
    /// Working directory to change to before anything else.
    #[arg(short = 'd', value_name = "DIR")]
    dir: Option<PathBuf>,
    /// Execute a statement after startup files run.
    #[arg(short = 'e', value_name = "STMT")]
    exec: Vec<String>,
    /// Disable (!) or enable global modes: -G[!]mode,...
    #[arg(short = 'G', value_name = "MODES")]
    global_modes: Option<String>,
    /// Go to line[:pos] in the first file buffer.
    #[arg(short = 'g', value_name = "LINE[:POS]")]
    goto: Option<String>,
    /// Line-delimiter override for reads: nl, cr, or crlf.
    #[arg(short = 'i', value_name = "DELIM")]
    in_delim: Option<String>,
    /// Skip the site and user startup files.
    #[arg(short = 'n')]
    no_startup: bool,
    /// Open following files read-only.
    #[arg(short = 'R')]
    read_only: bool,
    /// Open following files read-write (cancels -R).
    #[arg(short = 'r')]
    read_write: bool,
    /// Search forward for a pattern in the first file buffer.
    #[arg(short = 's', value_name = "PAT")]
    search: Option<String>,
    /// Override the script search path (EMBERPATH).
    #[arg(short = 'X', value_name = "PATH")]
    script_path: Option<String>,
    /// `@script` executes a script; `-` reads standard input; anything else
    /// is a file to open.
    #[arg(value_name = "FILE")]
    files: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.usage {
        println!(
            "usage: em [-C] [-D[!]modes] [-d dir] [-e stmt] [-G[!]modes] \
             [-g line[:pos]] [-i delim] [-n] [-R | -r] [-s pat] [-X path] \
             [@script] [file ...]"
        );
        return ExitCode::SUCCESS;
    }
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("em: {}", err);
            ExitCode::from(255)
        }
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    // The terminal is the UI; logs go to a file beside the config.
    let dir = dirs_dir();
    let appender = tracing_appender::rolling::never(dir, "ember.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_from_env("EMBER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn dirs_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|h| PathBuf::from(h).join(".ember"))
        .filter(|p| p.exists() || std::fs::create_dir_all(p).is_ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_delim(text: &str) -> Option<Vec<u8>> {
    match text.to_ascii_lowercase().as_str() {
        "nl" | "lf" => Some(b"\n".to_vec()),
        "cr" => Some(b"\r".to_vec()),
        "crlf" => Some(b"\r\n".to_vec()),
        _ => None,
    }
}

/// Apply a `[!]mode,...` list through the mode commands.
fn apply_mode_list(session: &mut Session, list: &str, global: bool) {
    for item in list.split(',') {
        let (name, on) = match item.strip_prefix('!') {
            Some(rest) => (rest, false),
            None => (item, true),
        };
        if name.is_empty() {
            continue;
        }
        let cmd = if global { "chgGlobalMode" } else { "chgMode" };
        let args = vec![Datum::str(name), Datum::Bool(on)];
        let mut ui = core_editor::ScriptUi;
        if let Err(err) = core_editor::commands::dispatch_name(session, &mut ui, cmd, args, None) {
            warn!(target: "runtime", mode = name, %err, "startup_mode_failed");
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let log_guard = configure_logging();
    info!(target: "runtime", "startup");

    if let Some(dir) = &args.dir {
        std::env::set_current_dir(dir)?;
    }

    let cfg = core_config::load(None, args.script_path.as_deref())?;
    let mut backend = CrosstermBackend::new();
    let (cols, rows) = backend.size().unwrap_or((80, 24));
    let mut session = Session::new(cfg, cols, rows)
        .map_err(|e| anyhow::anyhow!("session init failed: {}", e.message))?;

    // Startup files before command-line files.
    if !args.no_startup {
        run_startup_files(&mut session);
    }
    if let Some(modes) = &args.global_modes {
        apply_mode_list(&mut session, modes, true);
    }

    let delim_override = args.in_delim.as_deref().and_then(parse_delim);
    open_files(&mut session, &args, delim_override.as_deref());
    if let Some(modes) = &args.buf_modes {
        apply_mode_list(&mut session, modes, false);
    }

    // -g line[:pos] and -s pattern operate on the first file buffer.
    if let Some(spec) = &args.goto {
        goto_spec(&mut session, spec);
    }
    if let Some(pat) = &args.search {
        let mut ui = core_editor::ScriptUi;
        let _ = core_editor::commands::dispatch_name(
            &mut session,
            &mut ui,
            "searchForw",
            vec![Datum::str(pat.clone())],
            None,
        );
    }

    // -e statements after everything else.
    for stmt in &args.exec {
        let lines: Vec<String> = stmt.lines().map(str::to_string).collect();
        if let Err(err) = session.exec_lines(&lines) {
            if err.severity.is_exit() {
                return finish(session, err.severity, &err.message);
            }
            session.rc.set_error(&err);
        }
    }

    let code = event_loop(&mut backend, &mut session)?;
    drop(backend);
    drop(log_guard);
    Ok(code)
}

fn run_startup_files(session: &mut Session) {
    // Site file from the script path, then the user file from $HOME.
    if let Some(path) = session.cfg.find_script(SITE_STARTUP) {
        exec_script_file(session, &path);
    }
    let user = session
        .cfg
        .home
        .as_ref()
        .map(|h| h.join(USER_STARTUP))
        .filter(|p| p.exists())
        .or_else(|| session.cfg.find_script(USER_STARTUP));
    if let Some(path) = user {
        exec_script_file(session, &path);
    }
}

fn exec_script_file(session: &mut Session, path: &std::path::Path) {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let lines: Vec<String> = text.lines().map(str::to_string).collect();
            if let Err(err) = session.exec_lines(&lines) {
                warn!(target: "runtime", path = %path.display(), %err, "startup_script_failed");
                session.rc.set_error(&err);
            } else {
                info!(target: "runtime", path = %path.display(), "startup_script_run");
            }
        }
        Err(err) => {
            warn!(target: "runtime", path = %path.display(), %err, "startup_script_unreadable");
        }
    }
}

fn open_files(session: &mut Session, args: &Args, delim: Option<&[u8]>) {
    let read_only = args.read_only && !args.read_write;
    let mut first = true;
    let mut ui = core_editor::ScriptUi;
    for item in &args.files {
        if let Some(script) = item.strip_prefix('@') {
            let _ = core_editor::commands::dispatch_name(
                session,
                &mut ui,
                "xeqFile",
                vec![Datum::str(script)],
                None,
            )
            .map_err(|err| {
                warn!(target: "runtime", script = item.as_str(), %err, "startup_script_failed")
            });
            continue;
        }
        if item == "-" {
            let id = session.cur_buf_id();
            if let Err(err) = session.read_stdin_into(id) {
                warn!(target: "runtime", %err, "stdin_read_failed");
            }
            first = false;
            continue;
        }
        if let Some(spec) = item.strip_prefix('+') {
            // `+line[:pos]` positions the point in the buffer just opened.
            goto_spec(session, spec);
            continue;
        }
        let path = session.cfg.expand_tilde(item);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.clone());
        match session.bufs.find_or_create(&name) {
            Ok((id, _)) => {
                if path.exists() {
                    if let Err(err) = session.read_file_into(id, &path, delim) {
                        session.rc.set_error(&err);
                    }
                } else {
                    let b = session.bufs.buf_mut(id);
                    b.filename = Some(path);
                    b.flags.insert(BufFlags::ACTIVE);
                }
                if read_only {
                    session.bufs.buf_mut(id).flags.insert(BufFlags::READ_ONLY);
                }
                if first {
                    let _ = session.show_buffer(id);
                    first = false;
                }
            }
            Err(err) => {
                session.rc.set_error(&err);
            }
        }
    }
}

fn goto_spec(session: &mut Session, spec: &str) {
    let spec = spec.strip_prefix('+').unwrap_or(spec);
    let mut parts = spec.splitn(2, ':');
    let line: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let pos: usize = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let mut ui = core_editor::ScriptUi;
    let _ = core_editor::commands::dispatch_name(
        session,
        &mut ui,
        "gotoLine",
        vec![Datum::Int(line)],
        None,
    );
    if pos > 0 {
        let mut dot = session.dot();
        let len = session.cur_buf().line_len(dot.line);
        dot.off = pos.min(len);
        session.set_dot(dot);
    }
}

/// The command loop: key → command → redisplay, until an exit severity.
fn event_loop(backend: &mut CrosstermBackend, session: &mut Session) -> Result<ExitCode> {
    backend.enter()?;
    loop {
        let params = RenderParams {
            vjump: session.cfg.file.display.vjump,
            hjump: session.cfg.file.display.hjump,
            screen_wide_hscroll: session.global_mode_on(session.mode_cache.hscrl),
        };
        let msg_text = session.rc.message().to_string();
        let show_msg = session.rc.has_message()
            && session.global_mode_on(session.mode_cache.msgdisp);
        let flags = session.rc.flags();
        let typahead = backend.typahead().unwrap_or(false);
        let msg = show_msg.then(|| PendingMessage {
            text: &msg_text,
            attrs: flags.contains(RcFlags::TERM_ATTR),
            wrap: !flags.contains(RcFlags::NO_WRAP),
        });
        {
            let Session {
                ref mut bufs,
                ref mut layout,
                ref modes,
                ..
            } = *session;
            if let Err(err) = core_render::update(bufs, layout, modes, backend, &params, msg, typahead)
            {
                error!(target: "runtime", %err, "redisplay_failed");
            }
        }

        // Transient fence show: park the cursor on the matching opener
        // briefly, unless the user is already typing ahead.
        if let Some(fdot) = session.fence_flash.take() {
            if !backend.typahead().unwrap_or(true) {
                flash_fence(backend, session, fdot);
            }
        }

        let mut ui = TermUi::new(backend);
        match interact_once(session, &mut ui) {
            Ok(_) => {}
            Err(err) => {
                if err.severity.is_exit() {
                    // Covers the exit requests and the fatal band; the
                    // terminal is restored before any message prints.
                    backend.leave()?;
                    if !err.message.is_empty() {
                        eprintln!("{}", err.message);
                    }
                    info!(target: "runtime", severity = %err.severity, "exit");
                    return Ok(exit_code(err.severity));
                }
                // User-visible failures: record, stop any keyboard macro.
                if matches!(err.severity, Severity::UserAbort | Severity::Cancelled) {
                    session.input.kbd.abort();
                }
                session.rc.set_error(&err);
            }
        }
        if let Some(code) = session.exiting {
            info!(target: "runtime", code, "clean_exit");
            return Ok(if code == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(255)
            });
        }
        // Terminal resizes observed by the input path land here.
        if let Some((c, r)) = ui.take_resize() {
            session.layout.resize_terminal(c, r);
        }
    }
}

/// Move the terminal cursor onto a matched fence for the configured pause
/// when it is visible in the current window.
fn flash_fence(backend: &mut CrosstermBackend, session: &Session, fdot: core_text::Dot) {
    let w = session.layout.current_window();
    let buf = session.bufs.buf(w.buf);
    let top_idx = buf.line_index(w.face.top);
    let fence_idx = buf.line_index(fdot.line);
    if fence_idx < top_idx || fence_idx >= top_idx + w.rows as usize {
        return;
    }
    let col = core_render::text::display_col(buf.line_text(fdot.line), fdot.off);
    let first = w.face.first_col;
    if col < first {
        return;
    }
    let row = w.top_row + (fence_idx - top_idx) as u16;
    if backend.move_to((col - first) as u16, row).is_ok() && backend.flush().is_ok() {
        std::thread::sleep(std::time::Duration::from_millis(
            session.cfg.file.display.fence_pause_ms.min(2000),
        ));
    }
}

fn exit_code(sev: Severity) -> ExitCode {
    match sev {
        Severity::UserExit => ExitCode::SUCCESS,
        Severity::HelpExit => ExitCode::from(2),
        _ => ExitCode::from(255),
    }
}

fn finish(session: Session, sev: Severity, message: &str) -> Result<ExitCode> {
    drop(session);
    if !message.is_empty() {
        eprintln!("{}", message);
    }
    Ok(exit_code(sev))
}
