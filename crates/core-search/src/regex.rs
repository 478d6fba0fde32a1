//! Regular-expression engine: compile to meta-elements, scan by backtracking.
//!
//! A pattern compiles to a flat array of elements (literal, any, class,
//! negated class, line anchors, group brackets) where each matchable element
//! may carry a closure attribute (`*`, `+`, `?`, `{m,n}`, with `?` after a
//! closure selecting minimal match). Groups are numbered 1..9; group 0 is the
//! whole match. The reversed form (elements reversed, brackets and anchors
//! swapped) drives backward scanning over a mirrored view of the text.

use crate::{Found, MAX_GROUPS};
use core_status::{EdError, EdResult};
use core_text::case;

/// 256-bit membership map for character classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap([u64; 4]);

impl ClassMap {
    fn new() -> Self {
        Self([0; 4])
    }

    fn set(&mut self, b: u8) {
        self.0[(b >> 6) as usize] |= 1 << (b & 63);
    }

    fn set_range(&mut self, lo: u8, hi: u8) {
        for b in lo..=hi {
            self.set(b);
        }
    }

    pub fn contains(&self, b: u8) -> bool {
        self.0[(b >> 6) as usize] & (1 << (b & 63)) != 0
    }

    /// Membership with optional case folding.
    fn matches(&self, b: u8, fold: bool) -> bool {
        self.contains(b)
            || (fold && (self.contains(case::to_lower(b)) || self.contains(case::to_upper(b))))
    }
}

/// Closure attribute on a matchable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closure {
    pub min: u32,
    /// `None` is unbounded.
    pub max: Option<u32>,
    pub minimal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaKind {
    Lit(u8),
    /// Any character but newline (newline too in multiline mode).
    Any,
    Class(ClassMap),
    NegClass(ClassMap),
    Bol,
    Eol,
    GroupBegin(u8),
    GroupEnd(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub kind: MetaKind,
    pub closure: Option<Closure>,
}

impl Meta {
    fn plain(kind: MetaKind) -> Self {
        Self {
            kind,
            closure: None,
        }
    }

    fn closable(&self) -> bool {
        matches!(
            self.kind,
            MetaKind::Lit(_) | MetaKind::Any | MetaKind::Class(_) | MetaKind::NegClass(_)
        )
    }
}

/// Compile a pattern into its element array.
pub fn compile(pat: &[u8]) -> EdResult<Vec<Meta>> {
    let mut out: Vec<Meta> = Vec::with_capacity(pat.len());
    let mut group_stack: Vec<u8> = Vec::new();
    let mut next_group: u8 = 1;
    let mut i = 0;
    while i < pat.len() {
        let b = pat[i];
        match b {
            b'.' => out.push(Meta::plain(MetaKind::Any)),
            b'^' if out.is_empty() => out.push(Meta::plain(MetaKind::Bol)),
            b'$' if i == pat.len() - 1 => out.push(Meta::plain(MetaKind::Eol)),
            b'[' => {
                let (kind, next) = compile_class(pat, i + 1)?;
                out.push(Meta::plain(kind));
                i = next;
                continue;
            }
            b'(' => {
                if next_group as usize >= MAX_GROUPS {
                    return Err(EdError::failure("Too many groups in RE pattern"));
                }
                out.push(Meta::plain(MetaKind::GroupBegin(next_group)));
                group_stack.push(next_group);
                next_group += 1;
            }
            b')' => {
                let n = group_stack
                    .pop()
                    .ok_or_else(|| EdError::failure("Unmatched ')' in RE pattern"))?;
                out.push(Meta::plain(MetaKind::GroupEnd(n)));
            }
            b'*' => attach_closure(&mut out, 0, None)?,
            b'+' => attach_closure(&mut out, 1, None)?,
            b'?' => {
                match out.last_mut() {
                    Some(m) if m.closure.is_some() => {
                        m.closure.as_mut().expect("checked").minimal = true;
                    }
                    _ => attach_closure(&mut out, 0, Some(1))?,
                }
            }
            b'{' => {
                let (min, max, next) = compile_count(pat, i + 1)?;
                attach_closure(&mut out, min, max)?;
                i = next;
                continue;
            }
            b'\\' => {
                i += 1;
                let esc = *pat
                    .get(i)
                    .ok_or_else(|| EdError::failure("Trailing '\\' in RE pattern"))?;
                let lit = match esc {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    other => other,
                };
                out.push(Meta::plain(MetaKind::Lit(lit)));
            }
            other => out.push(Meta::plain(MetaKind::Lit(other))),
        }
        i += 1;
    }
    if !group_stack.is_empty() {
        return Err(EdError::failure("Unmatched '(' in RE pattern"));
    }
    Ok(out)
}

fn attach_closure(out: &mut [Meta], min: u32, max: Option<u32>) -> EdResult<()> {
    let last = out
        .last_mut()
        .ok_or_else(|| EdError::failure("Closure on empty RE pattern"))?;
    if !last.closable() || last.closure.is_some() {
        return Err(EdError::failure("Closure on invalid RE element"));
    }
    last.closure = Some(Closure {
        min,
        max,
        minimal: false,
    });
    Ok(())
}

/// Parse a `[...]` class body starting just past the bracket. Returns the
/// element kind and the index past the closing bracket.
fn compile_class(pat: &[u8], mut i: usize) -> EdResult<(MetaKind, usize)> {
    let negate = pat.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }
    let mut map = ClassMap::new();
    let mut first = true;
    loop {
        let Some(&b) = pat.get(i) else {
            return Err(EdError::failure("Unterminated character class"));
        };
        if b == b']' && !first {
            i += 1;
            break;
        }
        first = false;
        let lo = if b == b'\\' {
            i += 1;
            *pat.get(i)
                .ok_or_else(|| EdError::failure("Unterminated character class"))?
        } else {
            b
        };
        // Range when a '-' follows with a bound before ']'.
        if pat.get(i + 1) == Some(&b'-') && pat.get(i + 2).is_some_and(|&c| c != b']') {
            let hi = pat[i + 2];
            if hi < lo {
                return Err(EdError::failure("Inverted range in character class"));
            }
            map.set_range(lo, hi);
            i += 3;
        } else {
            map.set(lo);
            i += 1;
        }
    }
    let kind = if negate {
        MetaKind::NegClass(map)
    } else {
        MetaKind::Class(map)
    };
    Ok((kind, i))
}

/// Parse a `{m[,n]}` count starting just past the brace. Returns (min, max,
/// index past the closing brace).
fn compile_count(pat: &[u8], mut i: usize) -> EdResult<(u32, Option<u32>, usize)> {
    let mut digits = |i: &mut usize| -> Option<u32> {
        let start = *i;
        let mut v: u32 = 0;
        while let Some(&b) = pat.get(*i) {
            if !b.is_ascii_digit() {
                break;
            }
            v = v.saturating_mul(10).saturating_add((b - b'0') as u32);
            *i += 1;
        }
        (*i > start).then_some(v)
    };
    let min = digits(&mut i).ok_or_else(|| EdError::failure("Invalid closure count"))?;
    let max = match pat.get(i) {
        Some(&b',') => {
            i += 1;
            digits(&mut i)
        }
        _ => Some(min),
    };
    if pat.get(i) != Some(&b'}') {
        return Err(EdError::failure("Invalid closure count"));
    }
    if let Some(mx) = max {
        if mx < min {
            return Err(EdError::failure("Invalid closure count"));
        }
    }
    Ok((min, max, i + 1))
}

/// Build the reversed form: elements reversed, group brackets and line
/// anchors swapped, closures staying with their element.
pub fn reverse(elems: &[Meta]) -> Vec<Meta> {
    elems
        .iter()
        .rev()
        .map(|m| {
            let kind = match &m.kind {
                MetaKind::Bol => MetaKind::Eol,
                MetaKind::Eol => MetaKind::Bol,
                MetaKind::GroupBegin(n) => MetaKind::GroupEnd(*n),
                MetaKind::GroupEnd(n) => MetaKind::GroupBegin(*n),
                other => other.clone(),
            };
            Meta {
                kind,
                closure: m.closure,
            }
        })
        .collect()
}

/// Highest group number used.
pub fn group_count(elems: &[Meta]) -> usize {
    elems
        .iter()
        .filter_map(|m| match m.kind {
            MetaKind::GroupBegin(n) => Some(n as usize),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

struct Ctx<'a> {
    len: usize,
    at: &'a dyn Fn(usize) -> u8,
    fold: bool,
    multi: bool,
}

fn char_match(kind: &MetaKind, b: u8, fold: bool, multi: bool) -> bool {
    match kind {
        MetaKind::Lit(c) => {
            if fold {
                case::eq_ignore(*c, b)
            } else {
                *c == b
            }
        }
        MetaKind::Any => multi || b != b'\n',
        MetaKind::Class(map) => map.matches(b, fold),
        MetaKind::NegClass(map) => (multi || b != b'\n') && !map.matches(b, fold),
    _ => false,
    }
}

/// Anchored match attempt: does `elems[idx..]` match at `pos`? Returns the
/// end position on success, filling group spans.
fn amatch(
    ctx: &Ctx<'_>,
    elems: &[Meta],
    idx: usize,
    pos: usize,
    groups: &mut [Option<(usize, usize)>],
) -> Option<usize> {
    let Some(elem) = elems.get(idx) else {
        return Some(pos);
    };
    if let Some(cl) = elem.closure {
        let max = cl.max.map(|m| m as usize).unwrap_or(usize::MAX);
        let min = cl.min as usize;
        // The mandatory prefix.
        for k in 0..min {
            if pos + k >= ctx.len || !char_match(&elem.kind, (ctx.at)(pos + k), ctx.fold, ctx.multi)
            {
                return None;
            }
        }
        if cl.minimal {
            let mut c = min;
            loop {
                if let Some(end) = amatch(ctx, elems, idx + 1, pos + c, groups) {
                    return Some(end);
                }
                if c >= max
                    || pos + c >= ctx.len
                    || !char_match(&elem.kind, (ctx.at)(pos + c), ctx.fold, ctx.multi)
                {
                    return None;
                }
                c += 1;
            }
        }
        // Greedy: absorb as much as possible, then back off.
        let mut c = min;
        while c < max
            && pos + c < ctx.len
            && char_match(&elem.kind, (ctx.at)(pos + c), ctx.fold, ctx.multi)
        {
            c += 1;
        }
        loop {
            if let Some(end) = amatch(ctx, elems, idx + 1, pos + c, groups) {
                return Some(end);
            }
            if c == min {
                return None;
            }
            c -= 1;
        }
    }
    match &elem.kind {
        MetaKind::Bol => {
            if pos == 0 || (ctx.at)(pos - 1) == b'\n' {
                amatch(ctx, elems, idx + 1, pos, groups)
            } else {
                None
            }
        }
        MetaKind::Eol => {
            if pos == ctx.len || (ctx.at)(pos) == b'\n' {
                amatch(ctx, elems, idx + 1, pos, groups)
            } else {
                None
            }
        }
        MetaKind::GroupBegin(n) => {
            let slot = *n as usize;
            let saved = groups[slot];
            groups[slot] = Some((pos, pos));
            match amatch(ctx, elems, idx + 1, pos, groups) {
                Some(end) => Some(end),
                None => {
                    groups[slot] = saved;
                    None
                }
            }
        }
        MetaKind::GroupEnd(n) => {
            let slot = *n as usize;
            let saved = groups[slot];
            if let Some((start, _)) = saved {
                groups[slot] = Some((start, pos));
            }
            match amatch(ctx, elems, idx + 1, pos, groups) {
                Some(end) => Some(end),
                None => {
                    groups[slot] = saved;
                    None
                }
            }
        }
        kind => {
            if pos < ctx.len && char_match(kind, (ctx.at)(pos), ctx.fold, ctx.multi) {
                amatch(ctx, elems, idx + 1, pos + 1, groups)
            } else {
                None
            }
        }
    }
}

/// Leftmost match at or after `start`.
pub fn scan_forward(
    elems: &[Meta],
    hay: &[u8],
    start: usize,
    fold: bool,
    multi: bool,
) -> Option<Found> {
    let ctx = Ctx {
        len: hay.len(),
        at: &|i| hay[i],
        fold,
        multi,
    };
    for pos in start..=hay.len() {
        let mut groups = vec![None; MAX_GROUPS];
        if let Some(end) = amatch(&ctx, elems, 0, pos, &mut groups) {
            groups[0] = Some((pos, end));
            return Some(Found {
                start: pos,
                end,
                groups,
            });
        }
    }
    None
}

/// Rightmost match ending at or before `end`, found with the reversed form
/// over a mirrored view; groups are recovered by re-matching forward at the
/// discovered start.
pub fn scan_backward(
    rev: &[Meta],
    fwd: &[Meta],
    hay: &[u8],
    end: usize,
    fold: bool,
    multi: bool,
) -> Option<Found> {
    let end = end.min(hay.len());
    let ctx = Ctx {
        len: end,
        at: &|i| hay[end - 1 - i],
        fold,
        multi,
    };
    for vs in 0..=end {
        let mut scratch = vec![None; MAX_GROUPS];
        if let Some(vend) = amatch(&ctx, rev, 0, vs, &mut scratch) {
            let start = end - vend;
            let stop = end - vs;
            let fctx = Ctx {
                len: hay.len(),
                at: &|i| hay[i],
                fold,
                multi,
            };
            let mut groups = vec![None; MAX_GROUPS];
            if let Some(fend) = amatch(&fctx, fwd, 0, start, &mut groups) {
                groups[0] = Some((start, fend));
                return Some(Found {
                    start,
                    end: fend,
                    groups,
                });
            }
            groups = vec![None; MAX_GROUPS];
            groups[0] = Some((start, stop));
            return Some(Found {
                start,
                end: stop,
                groups,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn find(pat: &[u8], hay: &[u8]) -> Option<(usize, usize)> {
        let elems = compile(pat).unwrap();
        scan_forward(&elems, hay, 0, false, false).map(|f| (f.start, f.end))
    }

    #[test]
    fn literal_and_any() {
        assert_eq!(find(b"a.c", b"xxabc"), Some((2, 5)));
        assert_eq!(find(b"a.c", b"a\nc"), None); // '.' never matches newline
    }

    #[test]
    fn multiline_dot_matches_newline() {
        let elems = compile(b"a.c").unwrap();
        assert!(scan_forward(&elems, b"a\nc", 0, false, true).is_some());
    }

    #[test]
    fn classes_and_ranges() {
        assert_eq!(find(b"[0-9]+", b"abc123def"), Some((3, 6)));
        assert_eq!(find(b"[^a-z]", b"abc!"), Some((3, 4)));
        assert_eq!(find(b"[]x]", b"a]b"), Some((1, 2))); // leading ']' is literal
        assert_eq!(find(b"[x]]", b"ax]b"), Some((1, 3)));
    }

    #[test]
    fn closures() {
        assert_eq!(find(b"ab*c", b"ac"), Some((0, 2)));
        assert_eq!(find(b"ab*c", b"abbbc"), Some((0, 5)));
        assert_eq!(find(b"ab+c", b"ac"), None);
        assert_eq!(find(b"ab?c", b"abc"), Some((0, 3)));
        assert_eq!(find(b"ab{2,3}c", b"abbbc"), Some((0, 5)));
        assert_eq!(find(b"ab{2,3}c", b"abc"), None);
        assert_eq!(find(b"ab{2}c", b"abbc"), Some((0, 4)));
    }

    #[test]
    fn minimal_closure_stops_early() {
        let elems = compile(b"<.*?>").unwrap();
        let f = scan_forward(&elems, b"<a><b>", 0, false, false).unwrap();
        assert_eq!((f.start, f.end), (0, 3));
        let elems = compile(b"<.*>").unwrap();
        let f = scan_forward(&elems, b"<a><b>", 0, false, false).unwrap();
        assert_eq!((f.start, f.end), (0, 6));
    }

    #[test]
    fn anchors() {
        assert_eq!(find(b"^abc", b"zabc\nabc"), Some((5, 8)));
        assert_eq!(find(b"abc$", b"abcz\nabc"), Some((5, 8)));
        assert_eq!(find(b"^$", b"a\n\nb"), Some((2, 2)));
    }

    #[test]
    fn caret_and_dollar_literal_midpattern() {
        assert_eq!(find(b"a^b", b"za^bz"), Some((1, 4)));
        assert_eq!(find(b"a$b", b"za$bz"), Some((1, 4)));
    }

    #[test]
    fn groups_capture() {
        let elems = compile(b"(a+)(b)").unwrap();
        assert_eq!(group_count(&elems), 2);
        let f = scan_forward(&elems, b"xxaab", 0, false, false).unwrap();
        assert_eq!((f.start, f.end), (2, 5));
        assert_eq!(f.groups[1], Some((2, 4)));
        assert_eq!(f.groups[2], Some((4, 5)));
    }

    #[test]
    fn closure_on_group_refused() {
        assert!(compile(b"(ab)+").is_err());
    }

    #[test]
    fn escapes() {
        assert_eq!(find(b"a\\.c", b"a.c abc"), Some((0, 3)));
        assert_eq!(find(b"a\\nb", b"a\nb"), Some((0, 3)));
        assert_eq!(find(b"\\(x\\)", b"(x)"), Some((0, 3)));
    }

    #[test]
    fn compile_errors() {
        assert!(compile(b"*a").is_err());
        assert!(compile(b"a**").is_err());
        assert!(compile(b"[abc").is_err());
        assert!(compile(b"(ab").is_err());
        assert!(compile(b"ab)").is_err());
        assert!(compile(b"a{2,1}").is_err());
        assert!(compile(b"a\\").is_err());
        assert!(compile(b"((((((((((x))))))))))").is_err());
    }

    #[test]
    fn reversed_form_swaps_brackets() {
        let elems = compile(b"^a(b)$").unwrap();
        let rev = reverse(&elems);
        assert_eq!(rev[0].kind, MetaKind::Bol); // was Eol
        assert!(matches!(rev[1].kind, MetaKind::GroupBegin(1))); // was end
        assert_eq!(rev.last().unwrap().kind, MetaKind::Eol);
    }

    #[test]
    fn backward_scan_finds_rightmost() {
        let elems = compile(b"a+b").unwrap();
        let rev = reverse(&elems);
        let hay = b"aab aab aab";
        let f = scan_backward(&rev, &elems, hay, hay.len(), false, false).unwrap();
        assert_eq!((f.start, f.end), (8, 11));
        let f = scan_backward(&rev, &elems, hay, 7, false, false).unwrap();
        assert_eq!((f.start, f.end), (4, 7));
    }
}
