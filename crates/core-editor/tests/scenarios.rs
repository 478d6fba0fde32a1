//! End-to-end scenarios driven through the interaction cycle with scripted
//! keys, exercising the same paths the terminal front end uses.

use core_config::Config;
use core_datum::Datum;
use core_editor::{Session, Ui, interact_once};
use core_input::{ExtKey, KeyMods, parse_key};
use core_modes::builtin;
use core_status::{EdError, EdResult, Severity};
use core_text::Dot;

/// Ui fed from scripted keys and prompt answers.
struct Scripted {
    keys: Vec<ExtKey>,
    prompts: Vec<Option<String>>,
}

impl Scripted {
    fn keys(seq: &[&str]) -> Self {
        Self {
            keys: seq.iter().map(|k| parse_key(k).unwrap()).collect(),
            prompts: Vec::new(),
        }
    }

    fn drained(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Ui for Scripted {
    fn read_key(&mut self) -> EdResult<ExtKey> {
        if self.keys.is_empty() {
            return Err(EdError::aborted());
        }
        Ok(self.keys.remove(0))
    }

    fn prompt(&mut self, _msg: &str) -> EdResult<Option<String>> {
        if self.prompts.is_empty() {
            return Err(EdError::cancelled());
        }
        Ok(self.prompts.remove(0))
    }

    fn ask_key(&mut self, _msg: &str) -> EdResult<ExtKey> {
        self.read_key()
    }
}

fn session() -> Session {
    Session::new(Config::default(), 80, 24).unwrap()
}

fn text(s: &Session) -> String {
    String::from_utf8_lossy(&s.cur_buf().to_bytes()).into_owned()
}

fn insert(s: &mut Session, content: &str) {
    let mut dot = s.dot();
    let id = s.cur_buf_id();
    s.bufs
        .buf_mut(id)
        .insert_text(&mut dot, content.as_bytes())
        .unwrap();
    s.set_dot(dot);
}

fn run_keys(s: &mut Session, ui: &mut Scripted) {
    while !(ui.drained() && !matches!(s.input.kbd.state(), core_input::MacState::Play)) {
        match interact_once(s, ui) {
            Ok(_) => {}
            Err(err) if err.severity == Severity::UserAbort && ui.drained() => break,
            Err(err) => panic!("command failed: {} ({})", err.message, err.severity),
        }
    }
}

#[test]
fn scenario_region_copy_and_yank() {
    let mut s = session();
    insert(&mut s, "abc\ndef\nghi");
    // Mark at the end of line 1, dot to the end of line 2: region "\ndef".
    let l1 = s.cur_buf().first_line();
    let l2 = s.cur_buf().next_line(l1).unwrap();
    s.set_dot(Dot::new(l1, 3));
    let mut ui = Scripted::keys(&["C-SPC"]);
    interact_once(&mut s, &mut ui).unwrap();
    s.set_dot(Dot::new(l2, 3));
    let mut ui = Scripted::keys(&["M-w"]); // copyRegion
    interact_once(&mut s, &mut ui).unwrap();
    // End of buffer, yank.
    let mut ui = Scripted::keys(&["M->", "C-y"]);
    run_keys(&mut s, &mut ui);
    assert_eq!(text(&s), "abc\ndef\nghi\ndef");
}

#[test]
fn scenario_regexp_replace_all() {
    let mut s = session();
    insert(&mut s, "foo bar foo bar foo");
    s.set_dot(s.cur_buf().start_dot());
    // Enable regexp mode, then replace through the command surface.
    let regexp = s.modes.find(builtin::REGEXP).unwrap();
    s.modes.set_enabled(regexp, true).unwrap();
    let mut ui = Scripted {
        keys: Vec::new(),
        prompts: Vec::new(),
    };
    let out = core_editor::commands::dispatch_name(
        &mut s,
        &mut ui,
        "replace",
        vec![Datum::str("foo"), Datum::str("FOO")],
        None,
    )
    .unwrap();
    assert_eq!(out, Datum::Int(3));
    assert_eq!(text(&s), "FOO bar FOO bar FOO");
    assert!(s.rc.message().contains("3 substitutions"));
}

#[test]
fn scenario_keyboard_macro_duplicates_lines() {
    let mut s = session();
    insert(&mut s, "aaa\nbbb\nccc\nddd");
    s.set_dot(s.cur_buf().start_dot());
    // Record: C-a C-SPC C-e M-w RTN C-y C-n, bracketed by C-x ( and C-x ).
    let mut ui = Scripted::keys(&[
        "C-x", "(", "C-a", "C-SPC", "C-e", "M-w", "RTN", "C-y", "C-n", "C-x", ")",
    ]);
    run_keys(&mut s, &mut ui);
    assert_eq!(text(&s), "aaa\naaa\nbbb\nccc\nddd");
    // Undo the recording's side effect to get a clean 4-line buffer again.
    let mut s2 = session();
    insert(&mut s2, "aaa\nbbb\nccc\nddd");
    s2.set_dot(s2.cur_buf().start_dot());
    s2.input.kbd = std::mem::take(&mut s.input.kbd);
    // Play twice: C-u 2 C-x e.
    let mut ui = Scripted::keys(&["C-u", "2", "C-x", "e"]);
    run_keys(&mut s2, &mut ui);
    assert_eq!(text(&s2), "aaa\naaa\nbbb\nbbb\nccc\nddd");
}

#[test]
fn scenario_split_refusal_leaves_layout_intact() {
    let mut s = session();
    let mut ui = Scripted::keys(&["C-x", "2"]);
    run_keys(&mut s, &mut ui);
    assert_eq!(s.layout.current_screen().window_count(), 2);
    // Resize the current (upper) window to exactly 3 rows.
    s.layout.resize_window(3, 0).unwrap();
    let rows_before: Vec<u16> = s
        .layout
        .current_screen()
        .windows
        .iter()
        .map(|w| w.rows)
        .collect();
    let mut ui = Scripted::keys(&["C-x", "2"]);
    let err = interact_once(&mut s, &mut ui).unwrap_err();
    assert_eq!(err.severity, Severity::Failure);
    assert!(err.message.contains("Cannot split a 3-line window"));
    let rows_after: Vec<u16> = s
        .layout
        .current_screen()
        .windows
        .iter()
        .map(|w| w.rows)
        .collect();
    assert_eq!(rows_before, rows_after);
}

#[test]
fn scenario_script_if_loop_break() {
    let mut s = session();
    let lines: Vec<String> = ["!if 1 == 1", "!loop", "!break", "!endloop", "!endif", "42"]
        .iter()
        .map(|l| l.to_string())
        .collect();
    let out = s.exec_lines(&lines).unwrap();
    assert_eq!(out, Datum::Int(42));
}

#[test]
fn scenario_query_replace_with_undo() {
    let mut s = session();
    insert(&mut s, "xxx");
    s.set_dot(s.cur_buf().start_dot());
    // y, u, y, y, y over prompts at x1, x2, x1, x2, x3.
    let mut ui = Scripted {
        keys: ["y", "u", "y", "y", "y"]
            .iter()
            .map(|k| parse_key(k).unwrap())
            .collect(),
        prompts: Vec::new(),
    };
    let out = core_editor::commands::dispatch_name(
        &mut s,
        &mut ui,
        "queryReplace",
        vec![Datum::str("x"), Datum::str("y")],
        None,
    )
    .unwrap();
    assert_eq!(out, Datum::Int(3));
    assert_eq!(text(&s), "yyy");
    assert!(s.rc.message().contains("3 substitutions"));
}

#[test]
fn macro_defined_by_script_is_callable_and_bindable() {
    let mut s = session();
    let lines: Vec<String> = [
        "!macro dup,0",
        "insertText 'Z'",
        "!endmacro",
        "run 'dup'",
    ]
    .iter()
    .map(|l| l.to_string())
    .collect();
    s.exec_lines(&lines).unwrap();
    assert_eq!(text(&s), "Z");
    // Bind the macro to a key and drive it interactively.
    let mut ui = Scripted {
        keys: Vec::new(),
        prompts: Vec::new(),
    };
    core_editor::commands::dispatch_name(
        &mut s,
        &mut ui,
        "bindKey",
        vec![Datum::str("C-c d"), Datum::str("dup")],
        None,
    )
    .unwrap();
    let mut ui = Scripted::keys(&["C-c", "d"]);
    interact_once(&mut s, &mut ui).unwrap();
    assert_eq!(text(&s), "ZZ");
}

#[test]
fn self_insert_and_numeric_argument() {
    let mut s = session();
    let mut ui = Scripted::keys(&["a", "C-u", "3", "b"]);
    run_keys(&mut s, &mut ui);
    assert_eq!(text(&s), "abbb");
}

#[test]
fn narrow_then_widen_round_trip_through_commands() {
    let mut s = session();
    insert(&mut s, "one\ntwo\nthree\nfour");
    let l2 = {
        let b = s.cur_buf();
        b.next_line(b.first_line()).unwrap()
    };
    s.set_dot(Dot::new(l2, 0));
    let before = text(&s);
    let mut ui = Scripted {
        keys: Vec::new(),
        prompts: Vec::new(),
    };
    core_editor::commands::dispatch_name(&mut s, &mut ui, "narrowBuf", vec![], Some(2)).unwrap();
    assert_eq!(text(&s), "two\nthree");
    core_editor::commands::dispatch_name(&mut s, &mut ui, "widenBuf", vec![], None).unwrap();
    assert_eq!(text(&s), before);
}

#[test]
fn hook_false_return_aborts_and_hard_failure_disables() {
    let mut s = session();
    let lines: Vec<String> = [
        "!macro nope,0",
        "!return false",
        "!endmacro",
        "!macro boom,0",
        "bogusCommandName",
        "!endmacro",
        "setHook 'enterBuf', 'nope'",
    ]
    .iter()
    .map(|l| l.to_string())
    .collect();
    s.exec_lines(&lines).unwrap();
    // Switching buffers runs enterBuf, whose false return aborts.
    let id = s.bufs.create("other").unwrap();
    let err = s.show_buffer(id).unwrap_err();
    assert!(err.message.contains("False return"));
    // A hard failure clears the hook (fresh target buffer: the failed
    // switch above already landed in "other").
    let lines: Vec<String> = ["setHook 'enterBuf', 'boom'"]
        .iter()
        .map(|l| l.to_string())
        .collect();
    s.exec_lines(&lines).unwrap();
    let id2 = s.bufs.create("another").unwrap();
    let err = s.show_buffer(id2).unwrap_err();
    assert!(err.message.contains("disabled"));
    assert!(s.hooks.get(core_script::HookKind::EnterBuf).is_none());
}

#[test]
fn kill_then_yank_restores_text() {
    let mut s = session();
    insert(&mut s, "hello world");
    s.set_dot(s.cur_buf().start_dot());
    let mut ui = Scripted::keys(&["C-k", "C-y"]);
    run_keys(&mut s, &mut ui);
    assert_eq!(text(&s), "hello world");
}

#[test]
fn yank_cycle_swaps_in_older_kill() {
    let mut s = session();
    insert(&mut s, "first\nsecond\n");
    s.set_dot(s.cur_buf().start_dot());
    // Kill "first", then move down and kill "second": two ring entries.
    let mut ui = Scripted::keys(&["C-k", "C-n", "C-a", "C-k"]);
    run_keys(&mut s, &mut ui);
    // Yank at end, then cycle to the older entry.
    let mut ui = Scripted::keys(&["M->", "C-y", "M-y"]);
    run_keys(&mut s, &mut ui);
    assert!(text(&s).ends_with("first"));
}

#[test]
fn exit_with_dirty_buffer_needs_force() {
    let mut s = session();
    insert(&mut s, "dirty");
    let mut ui = Scripted::keys(&["C-x", "C-c"]);
    let err = interact_once(&mut s, &mut ui).unwrap_err();
    assert_eq!(err.severity, Severity::Failure);
    assert!(s.exiting.is_none());
    let mut ui = Scripted::keys(&["C-u", "C-x", "C-c"]);
    let err = interact_once(&mut s, &mut ui).unwrap_err();
    assert_eq!(err.severity, Severity::UserExit);
    assert_eq!(s.exiting, Some(0));
}

#[test]
fn mode_commands_respect_scope() {
    let mut s = session();
    let mut ui = Scripted {
        keys: Vec::new(),
        prompts: Vec::new(),
    };
    // A buffer mode cannot be changed globally, and vice versa.
    let err = core_editor::commands::dispatch_name(
        &mut s,
        &mut ui,
        "chgGlobalMode",
        vec![Datum::str("Replace")],
        None,
    )
    .unwrap_err();
    assert!(err.message.contains("buffer mode"));
    core_editor::commands::dispatch_name(
        &mut s,
        &mut ui,
        "chgMode",
        vec![Datum::str("Replace")],
        None,
    )
    .unwrap();
    assert!(s.buf_mode_on(s.mode_cache.repl));
}

#[test]
fn file_round_trip_preserves_crlf_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dos.txt");
    std::fs::write(&path, b"one\r\ntwo\r\nthree").unwrap();
    let mut s = session();
    let id = s.cur_buf_id();
    s.read_file_into(id, &path, None).unwrap();
    assert_eq!(text(&s), "one\ntwo\nthree");
    assert_eq!(s.cur_buf().delim.as_deref(), Some(&b"\r\n"[..]));
    // Edit and write back: the CR-LF delimiter is reused.
    insert(&mut s, "zero\n");
    s.write_buffer(id, None).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, b"zero\r\none\r\ntwo\r\nthree");
}

#[test]
fn unknown_key_reports_not_bound() {
    let mut s = session();
    let mut ui = Scripted {
        keys: vec![ExtKey::new(b'Q', KeyMods::META | KeyMods::CTRL)],
        prompts: Vec::new(),
    };
    let err = interact_once(&mut s, &mut ui).unwrap_err();
    assert!(err.message.contains("not bound"));
}
