//! Message-line escape language.
//!
//! Printable characters render as themselves; controls render in caret or
//! hex notation. `~` introduces an attribute: `~b`/`~B` bold on/off, `~c N`
//! color pair on / `~C` off, `~r`/`~R` reverse, `~u`/`~U` underline, `~#u`
//! alternate underline (skipping spaces), `~Z` all off, `~~` a literal `~`.

use crate::text;
use anyhow::Result;
use core_terminal::{Attrs, TerminalBackend};

/// One run of the parsed message: text with the attributes in force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgRun {
    pub text: String,
    pub attrs: Attrs,
    pub color: Option<u8>,
}

/// Parse a message into attribute runs. When `process_attrs` is false the
/// text is rendered verbatim (controls still expanded) with empty attributes.
pub fn parse(message: &str, process_attrs: bool) -> Vec<MsgRun> {
    let mut runs = Vec::new();
    let mut cur = String::new();
    let mut attrs = Attrs::empty();
    let mut color: Option<u8> = None;
    let mut alt_underline = false;
    let bytes: Vec<char> = message.chars().collect();
    let mut i = 0;
    let flush = |cur: &mut String, attrs: Attrs, color: Option<u8>, runs: &mut Vec<MsgRun>| {
        if !cur.is_empty() {
            runs.push(MsgRun {
                text: std::mem::take(cur),
                attrs,
                color,
            });
        }
    };
    while i < bytes.len() {
        let c = bytes[i];
        if process_attrs && c == '~' {
            let next = bytes.get(i + 1).copied();
            match next {
                Some('~') => {
                    cur.push('~');
                    i += 2;
                    continue;
                }
                Some('b') | Some('B') | Some('r') | Some('R') | Some('u') | Some('U')
                | Some('c') | Some('C') | Some('Z') | Some('#') => {
                    flush(&mut cur, attrs, color, &mut runs);
                    match next.expect("checked") {
                        'b' => attrs.insert(Attrs::BOLD),
                        'B' => attrs.remove(Attrs::BOLD),
                        'r' => attrs.insert(Attrs::REVERSE),
                        'R' => attrs.remove(Attrs::REVERSE),
                        'u' => {
                            attrs.insert(Attrs::UNDERLINE);
                            alt_underline = false;
                        }
                        'U' => attrs.remove(Attrs::UNDERLINE),
                        'C' => color = None,
                        'Z' => {
                            attrs = Attrs::empty();
                            color = None;
                        }
                        'c' => {
                            // Optional space, then digits.
                            let mut j = i + 2;
                            if bytes.get(j) == Some(&' ') {
                                j += 1;
                            }
                            let mut n: u32 = 0;
                            let mut any = false;
                            while let Some(d) = bytes.get(j).and_then(|ch| ch.to_digit(10)) {
                                n = n * 10 + d;
                                any = true;
                                j += 1;
                            }
                            if any {
                                color = Some((n % 256) as u8);
                                i = j;
                                continue;
                            }
                        }
                        '#' => {
                            if bytes.get(i + 2) == Some(&'u') {
                                attrs.insert(Attrs::UNDERLINE);
                                alt_underline = true;
                                i += 3;
                                continue;
                            }
                            // Unknown sequence: drop it.
                        }
                        _ => unreachable!(),
                    }
                    i += 2;
                    continue;
                }
                _ => {
                    // Unknown or dangling escape: swallowed.
                    i += if next.is_some() { 2 } else { 1 };
                    continue;
                }
            }
        }
        if alt_underline && c == ' ' {
            // Alternate underline leaves spaces unattributed.
            flush(&mut cur, attrs, color, &mut runs);
            runs.push(MsgRun {
                text: " ".to_string(),
                attrs: attrs - Attrs::UNDERLINE,
                color,
            });
            i += 1;
            continue;
        }
        let b = if (c as u32) < 0x100 { c as u32 as u8 } else { b'?' };
        if (0x20..0x7F).contains(&(b as u32)) {
            cur.push(c);
        } else {
            let mut s = String::new();
            text::expand_byte(b, 0, &mut s);
            cur.push_str(&s);
        }
        i += 1;
    }
    flush(&mut cur, attrs, color, &mut runs);
    runs
}

/// Paint a message at the given terminal row, optionally wrapped in `[ ]`.
pub fn paint(
    term: &mut dyn TerminalBackend,
    row: u16,
    message: &str,
    process_attrs: bool,
    wrap: bool,
) -> Result<()> {
    term.move_to(0, row)?;
    term.set_attrs(Attrs::empty())?;
    term.set_color_pair(None)?;
    term.clear_to_eol()?;
    if wrap {
        term.print("[")?;
    }
    for run in parse(message, process_attrs) {
        term.set_attrs(run.attrs)?;
        term.set_color_pair(run.color)?;
        term.print(&run.text)?;
    }
    term.set_attrs(Attrs::empty())?;
    term.set_color_pair(None)?;
    if wrap {
        term.print("]")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flat(runs: &[MsgRun]) -> String {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn plain_text_single_run() {
        let runs = parse("hello", true);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].attrs, Attrs::empty());
    }

    #[test]
    fn tilde_escape_literal() {
        let runs = parse("a~~b", true);
        assert_eq!(flat(&runs), "a~b");
    }

    #[test]
    fn bold_run_brackets() {
        let runs = parse("a~bB~Bc", true);
        assert_eq!(flat(&runs), "aBc");
        assert_eq!(runs[1].attrs, Attrs::BOLD);
        assert_eq!(runs[2].attrs, Attrs::empty());
    }

    #[test]
    fn color_pair_with_number() {
        let runs = parse("~c 3ok~C.", true);
        assert_eq!(runs[0].color, Some(3));
        assert_eq!(runs[0].text, "ok");
        assert_eq!(runs[1].color, None);
    }

    #[test]
    fn all_off_resets() {
        let runs = parse("~b~u~rx~Zy", true);
        assert_eq!(runs[0].attrs, Attrs::BOLD | Attrs::UNDERLINE | Attrs::REVERSE);
        assert_eq!(runs[1].attrs, Attrs::empty());
    }

    #[test]
    fn alt_underline_skips_spaces() {
        let runs = parse("~#uab cd", true);
        let spaces: Vec<_> = runs
            .iter()
            .filter(|r| r.text == " ")
            .map(|r| r.attrs)
            .collect();
        assert_eq!(spaces, vec![Attrs::empty()]);
        assert!(runs
            .iter()
            .filter(|r| r.text != " ")
            .all(|r| r.attrs.contains(Attrs::UNDERLINE)));
    }

    #[test]
    fn controls_render_caret() {
        let runs = parse("a\u{1}b", true);
        assert_eq!(flat(&runs), "a^Ab");
    }

    #[test]
    fn attrs_disabled_renders_verbatim() {
        let runs = parse("~bx", false);
        assert_eq!(flat(&runs), "~bx");
        assert_eq!(runs[0].attrs, Attrs::empty());
    }
}
