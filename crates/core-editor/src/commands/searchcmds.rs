//! Search and replace commands.

use crate::{Session, Ui};
use core_datum::Datum;
use core_search::{Pattern, QueryResponder, QueryResponse, ReplPat, replace_loop};
use core_status::{EdError, EdResult, RcFlags, Severity};
use core_text::Dot;
use tracing::debug;

/// Width a match sample or replacement preview is fitted to in the query
/// prompt.
const SAMPLE_WIDTH: usize = 30;

fn fit(bytes: &[u8]) -> String {
    let mut s = String::new();
    for &b in bytes {
        if s.len() >= SAMPLE_WIDTH {
            s.push('…');
            break;
        }
        match b {
            b'\n' => s.push_str("<NL>"),
            0x20..=0x7E => s.push(b as char),
            _ => s.push_str(&format!("<{:02X}>", b)),
        }
    }
    s
}

/// Compile and remember a search pattern, pushing the previous one onto the
/// search ring.
pub fn set_pattern(s: &mut Session, text: &str) -> EdResult<()> {
    let pat = Pattern::compile(text.as_bytes(), s.default_pat_flags())?;
    if !s.search.pat_text.is_empty() && s.search.pat_text != text {
        let old = s.search.pat_text.clone();
        s.search.ring.push(old);
    }
    s.search.pat_text = text.to_string();
    s.search.pattern = Some(pat);
    Ok(())
}

fn pattern_arg(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: &[Datum],
    prompt: &str,
) -> EdResult<()> {
    match args.first() {
        Some(d) => set_pattern(s, d.as_str()?),
        None => {
            if s.search.pattern.is_some() {
                // Reuse the remembered pattern unless the user enters a new
                // one; an empty response keeps it, and a script (where
                // prompting is suppressed) always reuses.
                match ui.prompt(&format!("{} [{}]", prompt, s.search.pat_text)) {
                    Ok(Some(text)) if !text.is_empty() => set_pattern(s, &text)?,
                    Ok(_) => {}
                    Err(err) if err.severity == Severity::ScriptError => {}
                    Err(err) => return Err(err),
                }
                Ok(())
            } else {
                let text = ui
                    .prompt(prompt)?
                    .filter(|t| !t.is_empty())
                    .ok_or_else(EdError::cancelled)?;
                set_pattern(s, &text)
            }
        }
    }
}

pub fn set_search_pat(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let text = crate::commands::str_or_prompt(&args, 0, ui, "Search pattern")?;
    set_pattern(s, &text)?;
    Ok(Datum::str(text))
}

pub fn set_replace_pat(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    _n: Option<i64>,
) -> EdResult<Datum> {
    let text = match args.first() {
        Some(d) => d.as_str()?.to_string(),
        None => ui.prompt("Replace with")?.unwrap_or_default(),
    };
    let regexp = s
        .search
        .pattern
        .as_ref()
        .map(Pattern::is_regex)
        .unwrap_or(false);
    s.search.repl = Some(ReplPat::compile(text.as_bytes(), regexp));
    s.search.repl_text = text.clone();
    Ok(Datum::str(text))
}

fn do_search(s: &mut Session, forward: bool, n: Option<i64>) -> EdResult<Datum> {
    let reps = n.unwrap_or(1).max(1);
    let pat = s
        .search
        .pattern
        .clone()
        .ok_or_else(|| EdError::failure("No search pattern set"))?;
    let hay = s.cur_buf().to_bytes();
    let mut pos = s.cur_buf().dot_to_abs(s.dot());
    let mut found = None;
    for _ in 0..reps {
        found = if forward {
            pat.scan_forward(&hay, pos)
        } else {
            pat.scan_backward(&hay, pos)
        };
        match &found {
            Some(f) => pos = if forward { f.end } else { f.start },
            None => break,
        }
    }
    match found {
        Some(f) => {
            s.search.last_match = Some(hay[f.start..f.end].to_vec());
            let dot = s.cur_buf().abs_to_dot(pos);
            s.set_dot(dot);
            debug!(target: "search.scan", start = f.start, end = f.end, forward, "search_hit");
            Ok(Datum::str(String::from_utf8_lossy(&hay[f.start..f.end])))
        }
        None => Err(EdError::failure("Not found")),
    }
}

pub fn search_forw(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    pattern_arg(s, ui, &args, "Search")?;
    do_search(s, true, n)
}

pub fn search_back(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    pattern_arg(s, ui, &args, "Reverse search")?;
    do_search(s, false, n)
}

/// Repeat the last search without prompting.
pub fn hunt_forw(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    do_search(s, true, n)
}

pub fn hunt_back(
    s: &mut Session,
    _ui: &mut dyn Ui,
    _args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    do_search(s, false, n)
}

fn replace_args(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: &[Datum],
) -> EdResult<(Pattern, ReplPat)> {
    if let Some(d) = args.first() {
        set_pattern(s, d.as_str()?)?;
    } else if s.search.pattern.is_none() {
        let text = ui
            .prompt("Replace")?
            .filter(|t| !t.is_empty())
            .ok_or_else(EdError::cancelled)?;
        set_pattern(s, &text)?;
    }
    let pat = s.search.pattern.clone().expect("set above");
    let repl = match args.get(1) {
        Some(d) => ReplPat::compile(d.as_str()?.as_bytes(), pat.is_regex()),
        None => match &s.search.repl {
            Some(r) => r.clone(),
            None => {
                let text = ui.prompt("Replace with")?.unwrap_or_default();
                let r = ReplPat::compile(text.as_bytes(), pat.is_regex());
                s.search.repl = Some(r.clone());
                s.search.repl_text = text;
                r
            }
        },
    };
    Ok((pat, repl))
}

fn finish_replace(
    s: &mut Session,
    outcome: core_search::ReplaceOutcome,
    dot: Dot,
) -> EdResult<Datum> {
    s.set_dot(dot);
    let subs = outcome.substitutions;
    let mut msg = format!(
        "{} substitution{}",
        subs,
        if subs == 1 { "" } else { "s" }
    );
    if outcome.origin_marked {
        msg.push_str(", mark ~u.~U set to original position");
        s.notify_flags(RcFlags::TERM_ATTR, &msg);
    } else {
        s.notify(&msg);
    }
    Ok(Datum::Int(subs as i64))
}

/// Replace the next `n` matches (all by default) without asking.
pub fn replace_cmd(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let (pat, repl) = replace_args(s, ui, &args)?;
    let max = n.map(|v| v.max(0) as u64);
    let id = s.cur_buf_id();
    let mut dot = s.dot();
    let outcome = replace_loop(s.bufs.buf_mut(id), &mut dot, &pat, &repl, max, None)?;
    finish_replace(s, outcome, dot)
}

/// Bridge from the replace loop's query protocol to the message line.
struct UiResponder<'a> {
    ui: &'a mut dyn Ui,
    abort_base: u8,
}

impl<'a> QueryResponder for UiResponder<'a> {
    fn ask(&mut self, matched: &[u8], replacement: &[u8]) -> EdResult<QueryResponse> {
        loop {
            let key = self.ui.ask_key(&format!(
                "Replace \"{}\" with \"{}\"? (y/n/!/u/./q/?)",
                fit(matched),
                fit(replacement)
            ))?;
            if key.mods.contains(core_input::KeyMods::CTRL) {
                if key.base == self.abort_base {
                    return Err(EdError::aborted());
                }
                if key.base == b'[' {
                    return Ok(QueryResponse::StopHere); // ESC
                }
                continue;
            }
            match key.base {
                b'y' | b' ' => return Ok(QueryResponse::Replace),
                b'n' => return Ok(QueryResponse::Skip),
                b'!' => return Ok(QueryResponse::ReplaceRest),
                b'u' => return Ok(QueryResponse::UndoLast),
                b'.' => return Ok(QueryResponse::StopOrigin),
                b'q' => return Ok(QueryResponse::StopHere),
                b'?' => return Ok(QueryResponse::Help),
                _ => continue,
            }
        }
    }

    fn show_help(&mut self) {
        let _ = self.ui.ask_key(
            "y/SPC replace, n skip, ! replace rest, u undo last, . stop at origin, q/ESC stop",
        );
    }
}

/// Replace with a per-match query.
pub fn query_replace(
    s: &mut Session,
    ui: &mut dyn Ui,
    args: Vec<Datum>,
    n: Option<i64>,
) -> EdResult<Datum> {
    let (pat, repl) = replace_args(s, ui, &args)?;
    let max = n.map(|v| v.max(0) as u64);
    let id = s.cur_buf_id();
    let mut dot = s.dot();
    let abort_base = s.core_keys.abort.base;
    let mut responder = UiResponder { ui, abort_base };
    let outcome = replace_loop(
        s.bufs.buf_mut(id),
        &mut dot,
        &pat,
        &repl,
        max,
        Some(&mut responder),
    )?;
    finish_replace(s, outcome, dot)
}
