//! Search and replace.
//!
//! Two engines share one match-result shape and one set of pattern flags: a
//! Boyer-Moore plain-text scanner (forward and backward delta tables, the
//! backward side compiled from the reversed pattern) and a regular-expression
//! engine compiled to an array of meta-elements with closure attributes.
//! Replacement patterns compile to an element list of literals, group
//! references, and the whole-match reference.
//!
//! Scanning operates on a byte snapshot of the target with absolute offsets;
//! the editor layer maps offsets to buffer positions. Patterns may carry
//! trailing options (`:e`, `:i`, `:p`, `:r`, `:m`) overriding the session
//! defaults.

pub mod bm;
pub mod regex;
pub mod replace;

pub use replace::{
    QueryResponder, QueryResponse, ReplPat, ReplaceOutcome, replace_loop,
};

use core_status::{EdError, EdResult};

bitflags::bitflags! {
    /// Pattern behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PatFlags: u8 {
        /// Case-sensitive match (`:e`).
        const EXACT = 1 << 0;
        /// Case-insensitive match (`:i`).
        const IGNORE = 1 << 1;
        /// Plain-text match even if the Regexp mode is on (`:p`).
        const PLAIN = 1 << 2;
        /// Regular-expression match (`:r`).
        const REGEXP = 1 << 3;
        /// `.` and negated classes match newline (`:m`).
        const MULTI = 1 << 4;
    }
}

/// The maximum group number; group 0 is the whole match.
pub const MAX_GROUPS: usize = 10;

/// A successful scan: absolute span plus group spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub start: usize,
    pub end: usize,
    /// Index 0 is the whole match; 1..9 are group spans when present.
    pub groups: Vec<Option<(usize, usize)>>,
}

impl Found {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Owned text of group `n` out of the scanned bytes.
    pub fn group_text(&self, hay: &[u8], n: usize) -> Option<Vec<u8>> {
        self.groups
            .get(n)
            .copied()
            .flatten()
            .map(|(s, e)| hay[s..e].to_vec())
    }
}

/// A compiled search pattern: the raw text, its flags, and both engines'
/// forward and reversed forms.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub raw: Vec<u8>,
    pub flags: PatFlags,
    fold: bool,
    plain_fwd: bm::BmPat,
    plain_bwd: bm::BmPat,
    regex_fwd: Option<Vec<regex::Meta>>,
    regex_bwd: Option<Vec<regex::Meta>>,
    pub group_count: usize,
}

impl Pattern {
    /// Compile `text`, honoring a trailing option suffix (`:eipmr` letters
    /// after the final `:`). `default_flags` supplies the session modes for
    /// options the suffix leaves unstated.
    pub fn compile(text: &[u8], default_flags: PatFlags) -> EdResult<Self> {
        let (raw, flags) = split_options(text, default_flags)?;
        if raw.is_empty() {
            return Err(EdError::failure("Empty search pattern"));
        }
        let fold = flags.contains(PatFlags::IGNORE) && !flags.contains(PatFlags::EXACT);
        let use_regex = flags.contains(PatFlags::REGEXP) && !flags.contains(PatFlags::PLAIN);
        let (regex_fwd, regex_bwd, group_count) = if use_regex {
            let fwd = regex::compile(&raw)?;
            let bwd = regex::reverse(&fwd);
            let groups = regex::group_count(&fwd);
            (Some(fwd), Some(bwd), groups)
        } else {
            (None, None, 0)
        };
        let mut reversed = raw.clone();
        reversed.reverse();
        Ok(Self {
            plain_fwd: bm::BmPat::compile(&raw, fold),
            plain_bwd: bm::BmPat::compile(&reversed, fold),
            raw,
            flags,
            fold,
            regex_fwd,
            regex_bwd,
            group_count,
        })
    }

    pub fn is_regex(&self) -> bool {
        self.regex_fwd.is_some()
    }

    pub fn fold_case(&self) -> bool {
        self.fold
    }

    /// Leftmost match at or after `start`.
    pub fn scan_forward(&self, hay: &[u8], start: usize) -> Option<Found> {
        match &self.regex_fwd {
            Some(elems) => regex::scan_forward(
                elems,
                hay,
                start,
                self.fold,
                self.flags.contains(PatFlags::MULTI),
            ),
            None => self.plain_fwd.find_forward(hay, start).map(|s| Found {
                start: s,
                end: s + self.raw.len(),
                groups: vec![Some((s, s + self.raw.len()))],
            }),
        }
    }

    /// Rightmost match ending at or before `end`.
    pub fn scan_backward(&self, hay: &[u8], end: usize) -> Option<Found> {
        match &self.regex_bwd {
            Some(rev) => regex::scan_backward(
                rev,
                self.regex_fwd.as_deref().expect("both forms compiled"),
                hay,
                end,
                self.fold,
                self.flags.contains(PatFlags::MULTI),
            ),
            None => self.plain_bwd.find_backward(hay, end).map(|s| Found {
                start: s,
                end: s + self.raw.len(),
                groups: vec![Some((s, s + self.raw.len()))],
            }),
        }
    }
}

/// Split a trailing `:opts` suffix off a pattern and merge its option letters
/// over the defaults. A lone or absent suffix leaves the defaults in place;
/// an unknown option letter fails.
fn split_options(text: &[u8], defaults: PatFlags) -> EdResult<(Vec<u8>, PatFlags)> {
    let Some(colon) = text.iter().rposition(|&b| b == b':') else {
        return Ok((text.to_vec(), defaults));
    };
    let opts = &text[colon + 1..];
    if opts.is_empty() || !opts.iter().all(|b| b"eimpr".contains(b)) {
        // Not an option suffix; the colon belongs to the pattern.
        return Ok((text.to_vec(), defaults));
    }
    let mut flags = defaults;
    for &b in opts {
        match b {
            b'e' => {
                flags.insert(PatFlags::EXACT);
                flags.remove(PatFlags::IGNORE);
            }
            b'i' => {
                flags.insert(PatFlags::IGNORE);
                flags.remove(PatFlags::EXACT);
            }
            b'm' => flags.insert(PatFlags::MULTI),
            b'p' => {
                flags.insert(PatFlags::PLAIN);
                flags.remove(PatFlags::REGEXP);
            }
            b'r' => {
                flags.insert(PatFlags::REGEXP);
                flags.remove(PatFlags::PLAIN);
            }
            _ => unreachable!("filtered above"),
        }
    }
    Ok((text[..colon].to_vec(), flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn option_suffix_parsed() {
        let p = Pattern::compile(b"foo:ri", PatFlags::empty()).unwrap();
        assert_eq!(p.raw, b"foo");
        assert!(p.is_regex());
        assert!(p.fold_case());
    }

    #[test]
    fn colon_without_options_stays_in_pattern() {
        let p = Pattern::compile(b"a:b", PatFlags::empty()).unwrap();
        assert_eq!(p.raw, b"a:b");
        let p = Pattern::compile(b"end:", PatFlags::empty()).unwrap();
        assert_eq!(p.raw, b"end:");
    }

    #[test]
    fn plain_and_regex_agree_without_metacharacters() {
        let hay = b"the cat sat on the mat";
        let plain = Pattern::compile(b"at", PatFlags::empty()).unwrap();
        let re = Pattern::compile(b"at:r", PatFlags::empty()).unwrap();
        let mut pos = 0;
        loop {
            let a = plain.scan_forward(hay, pos);
            let b = re.scan_forward(hay, pos);
            match (a, b) {
                (None, None) => break,
                (Some(x), Some(y)) => {
                    assert_eq!((x.start, x.end), (y.start, y.end));
                    pos = x.end;
                }
                other => panic!("engines disagree: {:?}", other),
            }
        }
    }

    #[test]
    fn backward_agreement() {
        let hay = b"abc abc abc";
        let plain = Pattern::compile(b"abc", PatFlags::empty()).unwrap();
        let re = Pattern::compile(b"abc:r", PatFlags::empty()).unwrap();
        let a = plain.scan_backward(hay, hay.len()).unwrap();
        let b = re.scan_backward(hay, hay.len()).unwrap();
        assert_eq!((a.start, a.end), (8, 11));
        assert_eq!((b.start, b.end), (8, 11));
    }

    #[test]
    fn case_folding() {
        let hay = b"Foo FOO foo";
        let p = Pattern::compile(b"foo:i", PatFlags::empty()).unwrap();
        assert_eq!(p.scan_forward(hay, 0).unwrap().start, 0);
        let p = Pattern::compile(b"foo:e", PatFlags::empty()).unwrap();
        assert_eq!(p.scan_forward(hay, 0).unwrap().start, 8);
    }

    proptest::proptest! {
        /// On metacharacter-free patterns the plain and regex engines find
        /// identical match positions, and both agree with a naive scan.
        #[test]
        fn engines_agree_on_literal_patterns(
            hay in "[abc ]{0,40}",
            pat in "[abc]{1,4}",
        ) {
            let plain = Pattern::compile(pat.as_bytes(), PatFlags::empty()).unwrap();
            let mut spec = pat.clone().into_bytes();
            spec.extend_from_slice(b":r");
            let re = Pattern::compile(&spec, PatFlags::empty()).unwrap();
            let hay = hay.as_bytes();
            let naive = hay
                .windows(pat.len())
                .position(|w| w == pat.as_bytes());
            let a = plain.scan_forward(hay, 0).map(|f| f.start);
            let b = re.scan_forward(hay, 0).map(|f| f.start);
            proptest::prop_assert_eq!(a, naive);
            proptest::prop_assert_eq!(b, naive);
        }
    }
}
