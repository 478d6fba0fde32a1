//! Replacement patterns and the replace loop.
//!
//! A replacement pattern compiles to a list of elements: literal strings,
//! group references `\1`..`\9`, and the whole-match reference `&`. When no
//! metacharacter is present the raw string is inserted verbatim. The replace
//! loop walks matches forward from the dot, optionally consulting a
//! [`QueryResponder`] per match, and supports undoing the previous
//! substitution from the prompt.

use crate::{Found, Pattern};
use core_status::{EdError, EdResult};
use core_text::{Buffer, Dot, REGION_MARK};
use tracing::debug;

/// One element of a compiled replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplElem {
    Lit(Vec<u8>),
    /// `\1`..`\9`.
    Group(u8),
    /// `&`: the whole match.
    Ditto,
}

/// A compiled replacement pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplPat {
    pub elems: Vec<ReplElem>,
    /// Clear when the replacement is a plain literal usable verbatim.
    pub has_meta: bool,
}

impl ReplPat {
    /// Compile. Metacharacters are recognized only for regular-expression
    /// replacements; otherwise the text is one literal.
    pub fn compile(pat: &[u8], regexp: bool) -> Self {
        if !regexp {
            return Self {
                elems: if pat.is_empty() {
                    Vec::new()
                } else {
                    vec![ReplElem::Lit(pat.to_vec())]
                },
                has_meta: false,
            };
        }
        let mut elems = Vec::new();
        let mut lit = Vec::new();
        let mut has_meta = false;
        let mut i = 0;
        while i < pat.len() {
            match pat[i] {
                b'&' => {
                    if !lit.is_empty() {
                        elems.push(ReplElem::Lit(std::mem::take(&mut lit)));
                    }
                    elems.push(ReplElem::Ditto);
                    has_meta = true;
                }
                b'\\' => match pat.get(i + 1) {
                    Some(&d) if d.is_ascii_digit() && d != b'0' => {
                        if !lit.is_empty() {
                            elems.push(ReplElem::Lit(std::mem::take(&mut lit)));
                        }
                        elems.push(ReplElem::Group(d - b'0'));
                        has_meta = true;
                        i += 1;
                    }
                    Some(&c) => {
                        lit.push(c);
                        has_meta = true;
                        i += 1;
                    }
                    None => lit.push(b'\\'),
                },
                other => lit.push(other),
            }
            i += 1;
        }
        if !lit.is_empty() {
            elems.push(ReplElem::Lit(lit));
        }
        Self { elems, has_meta }
    }

    /// Reconstruct the textual pattern; compiling the result yields the same
    /// element list.
    pub fn to_pattern(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for e in &self.elems {
            match e {
                ReplElem::Lit(bytes) => {
                    for &b in bytes {
                        if self.has_meta && (b == b'&' || b == b'\\') {
                            out.push(b'\\');
                        }
                        out.push(b);
                    }
                }
                ReplElem::Group(n) => {
                    out.push(b'\\');
                    out.push(b'0' + n);
                }
                ReplElem::Ditto => out.push(b'&'),
            }
        }
        out
    }

    /// Expand against a match over `hay`.
    pub fn expand(&self, hay: &[u8], found: &Found) -> Vec<u8> {
        let mut out = Vec::new();
        for e in &self.elems {
            match e {
                ReplElem::Lit(bytes) => out.extend_from_slice(bytes),
                ReplElem::Ditto => out.extend_from_slice(&hay[found.start..found.end]),
                ReplElem::Group(n) => {
                    if let Some(text) = found.group_text(hay, *n as usize) {
                        out.extend_from_slice(&text);
                    }
                }
            }
        }
        out
    }
}

/// Answers a replace query for one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResponse {
    /// `y` / SPC
    Replace,
    /// `n`
    Skip,
    /// `!`
    ReplaceRest,
    /// `u`
    UndoLast,
    /// `q` / ESC
    StopHere,
    /// `.`
    StopOrigin,
    /// `?`
    Help,
}

/// Supplied by the editor layer to drive query-replace; tests use a scripted
/// implementation.
pub trait QueryResponder {
    /// Prompt for one match, given the matched text and the expansion that
    /// would replace it.
    fn ask(&mut self, matched: &[u8], replacement: &[u8]) -> EdResult<QueryResponse>;

    /// Show the response help; re-prompting follows.
    fn show_help(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub substitutions: usize,
    /// A mark was left at the origin because the dot ended elsewhere.
    pub origin_marked: bool,
}

struct LastSubst {
    start: usize,
    repl_len: usize,
    original: Vec<u8>,
}

/// Replace up to `max` matches (all when `None`) forward from the dot.
/// With a responder, each match is queried first; `u` restores the previous
/// substitution and re-prompts there. On completion, when the dot has moved,
/// the region mark is set at the origin.
pub fn replace_loop(
    buf: &mut Buffer,
    dot: &mut Dot,
    pat: &Pattern,
    repl: &ReplPat,
    max: Option<u64>,
    mut query: Option<&mut dyn QueryResponder>,
) -> EdResult<ReplaceOutcome> {
    let origin_abs = buf.dot_to_abs(*dot);
    let mut scan_abs = origin_abs;
    let mut subs: usize = 0;
    let mut asking = query.is_some();
    let mut last: Option<LastSubst> = None;
    let mut return_to_origin = false;

    'outer: loop {
        if let Some(m) = max {
            if subs as u64 >= m {
                break;
            }
        }
        let hay = buf.to_bytes();
        let Some(found) = pat.scan_forward(&hay, scan_abs) else {
            break;
        };
        let matched = hay[found.start..found.end].to_vec();
        let expansion = repl.expand(&hay, &found);

        if asking {
            loop {
                let responder = query.as_mut().expect("asking implies a responder");
                match responder.ask(&matched, &expansion)? {
                    QueryResponse::Replace => break,
                    QueryResponse::Skip => {
                        scan_abs = if found.is_empty() {
                            found.end + 1
                        } else {
                            found.end
                        };
                        continue 'outer;
                    }
                    QueryResponse::ReplaceRest => {
                        asking = false;
                        break;
                    }
                    QueryResponse::UndoLast => {
                        if let Some(prev) = last.take() {
                            let mut d = buf.abs_to_dot(prev.start);
                            buf.delete_span(&mut d, prev.repl_len as i64)?;
                            let mut d = buf.abs_to_dot(prev.start);
                            buf.insert_text(&mut d, &prev.original)?;
                            subs -= 1;
                            scan_abs = prev.start;
                            *dot = buf.abs_to_dot(prev.start);
                            debug!(target: "search.replace", at = prev.start, "undo_subst");
                        }
                        continue 'outer;
                    }
                    QueryResponse::StopHere => break 'outer,
                    QueryResponse::StopOrigin => {
                        return_to_origin = true;
                        break 'outer;
                    }
                    QueryResponse::Help => {
                        responder.show_help();
                    }
                }
            }
        }

        let mut d = buf.abs_to_dot(found.start);
        if !found.is_empty() {
            buf.delete_span(&mut d, found.len() as i64)?;
        }
        buf.insert_text(&mut d, &expansion)?;
        subs += 1;
        *dot = d;
        scan_abs = found.start + expansion.len();
        last = Some(LastSubst {
            start: found.start,
            repl_len: expansion.len(),
            original: matched,
        });
        debug!(target: "search.replace", at = found.start, len = found.len(), "subst");
        if found.is_empty() {
            // An empty match would re-match in place forever.
            break;
        }
    }

    let mut origin_marked = false;
    if return_to_origin {
        *dot = buf.abs_to_dot(origin_abs);
    } else if buf.dot_to_abs(*dot) != origin_abs {
        let origin = buf.abs_to_dot(origin_abs);
        buf.set_mark(REGION_MARK, origin, -1);
        origin_marked = true;
    }
    Ok(ReplaceOutcome {
        substitutions: subs,
        origin_marked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PatFlags;
    use pretty_assertions::assert_eq;

    fn buf(content: &[u8]) -> (Buffer, Dot) {
        let mut b = Buffer::new("t");
        let mut d = b.start_dot();
        b.insert_text(&mut d, content).unwrap();
        let start = b.start_dot();
        (b, start)
    }

    fn text(b: &Buffer) -> String {
        String::from_utf8_lossy(&b.to_bytes()).into_owned()
    }

    struct Scripted(Vec<QueryResponse>);

    impl QueryResponder for Scripted {
        fn ask(&mut self, _m: &[u8], _r: &[u8]) -> EdResult<QueryResponse> {
            if self.0.is_empty() {
                return Err(EdError::aborted());
            }
            Ok(self.0.remove(0))
        }
    }

    #[test]
    fn compile_literal_without_regexp() {
        let r = ReplPat::compile(b"a&b\\1", false);
        assert!(!r.has_meta);
        assert_eq!(r.elems, vec![ReplElem::Lit(b"a&b\\1".to_vec())]);
    }

    #[test]
    fn compile_meta_elements() {
        let r = ReplPat::compile(b"<&>\\1x", true);
        assert!(r.has_meta);
        assert_eq!(
            r.elems,
            vec![
                ReplElem::Lit(b"<".to_vec()),
                ReplElem::Ditto,
                ReplElem::Lit(b">".to_vec()),
                ReplElem::Group(1),
                ReplElem::Lit(b"x".to_vec()),
            ]
        );
    }

    #[test]
    fn serialize_reparse_round_trip() {
        for pat in [&b"<&>\\1x"[..], b"plain", b"a\\&b", b"\\2\\9&&"] {
            let r = ReplPat::compile(pat, true);
            let text = r.to_pattern();
            let r2 = ReplPat::compile(&text, true);
            assert_eq!(r.elems, r2.elems, "pattern {:?}", String::from_utf8_lossy(pat));
        }
    }

    #[test]
    fn replace_all_plain() {
        let (mut b, mut dot) = buf(b"foo bar foo bar foo");
        let pat = Pattern::compile(b"foo", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"FOO", false);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, None).unwrap();
        assert_eq!(out.substitutions, 3);
        assert_eq!(text(&b), "FOO bar FOO bar FOO");
    }

    #[test]
    fn replace_respects_count() {
        let (mut b, mut dot) = buf(b"xxxx");
        let pat = Pattern::compile(b"x", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"y", false);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, Some(2), None).unwrap();
        assert_eq!(out.substitutions, 2);
        assert_eq!(text(&b), "yyxx");
    }

    #[test]
    fn replace_with_groups() {
        let (mut b, mut dot) = buf(b"john smith");
        let pat = Pattern::compile(b"([a-z]+) ([a-z]+):r", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"\\2, \\1", true);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, None).unwrap();
        assert_eq!(out.substitutions, 1);
        assert_eq!(text(&b), "smith, john");
    }

    #[test]
    fn query_loop_with_undo() {
        let (mut b, mut dot) = buf(b"xxx");
        let pat = Pattern::compile(b"x", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"y", false);
        // Prompts land on x1, x2 (undone back to x1), x1, x2, x3.
        let mut q = Scripted(vec![
            QueryResponse::Replace,
            QueryResponse::UndoLast,
            QueryResponse::Replace,
            QueryResponse::Replace,
            QueryResponse::Replace,
        ]);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, Some(&mut q)).unwrap();
        assert_eq!(text(&b), "yyy");
        assert_eq!(out.substitutions, 3);
    }

    #[test]
    fn query_skip_and_stop() {
        let (mut b, mut dot) = buf(b"aaa");
        let pat = Pattern::compile(b"a", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"b", false);
        let mut q = Scripted(vec![
            QueryResponse::Skip,
            QueryResponse::Replace,
            QueryResponse::StopHere,
        ]);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, Some(&mut q)).unwrap();
        assert_eq!(text(&b), "aba");
        assert_eq!(out.substitutions, 1);
    }

    #[test]
    fn query_replace_rest() {
        let (mut b, mut dot) = buf(b"aaaa");
        let pat = Pattern::compile(b"a", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"b", false);
        let mut q = Scripted(vec![QueryResponse::Skip, QueryResponse::ReplaceRest]);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, Some(&mut q)).unwrap();
        assert_eq!(text(&b), "abbb");
        assert_eq!(out.substitutions, 3);
    }

    #[test]
    fn stop_origin_returns_dot() {
        let (mut b, mut dot) = buf(b"qq qq");
        let pat = Pattern::compile(b"qq", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"ZZ", false);
        let mut q = Scripted(vec![QueryResponse::Replace, QueryResponse::StopOrigin]);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, Some(&mut q)).unwrap();
        assert_eq!(text(&b), "ZZ qq");
        assert_eq!(dot, b.start_dot());
        assert!(!out.origin_marked);
    }

    #[test]
    fn origin_mark_set_when_dot_moves() {
        let (mut b, mut dot) = buf(b"m m");
        let pat = Pattern::compile(b"m", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"n", false);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, None).unwrap();
        assert!(out.origin_marked);
        assert_eq!(b.region_mark().unwrap(), b.start_dot());
    }

    #[test]
    fn empty_match_substitutes_once_then_stops() {
        let (mut b, mut dot) = buf(b"abc");
        let pat = Pattern::compile(b"x*:r", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"-", false);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, None).unwrap();
        assert_eq!(out.substitutions, 1);
        assert_eq!(text(&b), "-abc");
    }

    #[test]
    fn multi_line_replace() {
        let (mut b, mut dot) = buf(b"one\ntwo\none");
        let pat = Pattern::compile(b"one", PatFlags::empty()).unwrap();
        let repl = ReplPat::compile(b"1", false);
        let out = replace_loop(&mut b, &mut dot, &pat, &repl, None, None).unwrap();
        assert_eq!(out.substitutions, 2);
        assert_eq!(text(&b), "1\ntwo\n1");
        assert!(b.check_links());
    }
}
