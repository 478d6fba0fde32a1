//! Boyer-Moore plain-text scanning.
//!
//! A compiled pattern carries the bad-character (delta-1) table over all 256
//! byte values and the good-suffix (delta-2) table. Backward scanning runs
//! the same machinery over a mirrored view of the text using a pattern
//! compiled from the reversed bytes.

use core_text::case;

/// A compiled plain pattern for one scan direction.
#[derive(Debug, Clone)]
pub struct BmPat {
    pat: Vec<u8>,
    fold: bool,
    delta1: [i64; 256],
    delta2: Vec<i64>,
}

impl BmPat {
    pub fn compile(pattern: &[u8], fold: bool) -> Self {
        let pat: Vec<u8> = if fold {
            pattern.iter().map(|&b| case::to_lower(b)).collect()
        } else {
            pattern.to_vec()
        };
        let m = pat.len() as i64;
        let mut delta1 = [m; 256];
        for (i, &b) in pat.iter().enumerate() {
            delta1[b as usize] = m - 1 - i as i64;
        }
        let delta2 = build_delta2(&pat);
        Self {
            pat,
            fold,
            delta1,
            delta2,
        }
    }

    fn byte(&self, b: u8) -> u8 {
        if self.fold { case::to_lower(b) } else { b }
    }

    /// Core scan over an indexable view. Returns the first alignment at or
    /// after `start` where the whole pattern matches.
    fn search(&self, len: usize, start: usize, at: impl Fn(usize) -> u8) -> Option<usize> {
        let m = self.pat.len() as i64;
        if m == 0 || start as i64 + m > len as i64 {
            return None;
        }
        let mut j = start as i64;
        let last = len as i64 - m;
        while j <= last {
            let mut i = m - 1;
            while i >= 0 && self.pat[i as usize] == self.byte(at((j + i) as usize)) {
                i -= 1;
            }
            if i < 0 {
                return Some(j as usize);
            }
            let bad = self.delta1[self.byte(at((j + i) as usize)) as usize] - (m - 1 - i);
            j += self.delta2[i as usize].max(bad).max(1);
        }
        None
    }

    /// Leftmost match starting at or after `start`; returns the match start.
    pub fn find_forward(&self, hay: &[u8], start: usize) -> Option<usize> {
        self.search(hay.len(), start, |i| hay[i])
    }

    /// Rightmost match ending at or before `end`; returns the match start.
    /// `self` must have been compiled from the reversed pattern.
    pub fn find_backward(&self, hay: &[u8], end: usize) -> Option<usize> {
        let end = end.min(hay.len());
        let m = self.pat.len();
        self.search(end, 0, |i| hay[end - 1 - i])
            .map(|vs| end - vs - m)
    }
}

/// Good-suffix shift table.
fn build_delta2(pat: &[u8]) -> Vec<i64> {
    let m = pat.len() as i64;
    if m == 0 {
        return Vec::new();
    }
    let suff = suffixes(pat);
    let mut d2 = vec![m; m as usize];
    let mut j: i64 = 0;
    let mut i = m - 1;
    loop {
        if i == -1 || suff[i as usize] == i + 1 {
            while j < m - 1 - i {
                if d2[j as usize] == m {
                    d2[j as usize] = m - 1 - i;
                }
                j += 1;
            }
        }
        if i == -1 {
            break;
        }
        i -= 1;
    }
    for i in 0..m - 1 {
        d2[(m - 1 - suff[i as usize]) as usize] = m - 1 - i;
    }
    d2
}

/// Length of the longest suffix of `pat` ending at each position.
fn suffixes(pat: &[u8]) -> Vec<i64> {
    let m = pat.len() as i64;
    let mut suff = vec![0i64; m as usize];
    suff[(m - 1) as usize] = m;
    let mut g = m - 1;
    let mut f = m - 1;
    let mut i = m - 2;
    while i >= 0 {
        if i > g && suff[(i + m - 1 - f) as usize] < i - g {
            suff[i as usize] = suff[(i + m - 1 - f) as usize];
        } else {
            if i < g {
                g = i;
            }
            f = i;
            while g >= 0 && pat[g as usize] == pat[(g + m - 1 - f) as usize] {
                g -= 1;
            }
            suff[i as usize] = f - g;
        }
        i -= 1;
    }
    suff
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fwd(pat: &[u8], hay: &[u8], start: usize) -> Option<usize> {
        BmPat::compile(pat, false).find_forward(hay, start)
    }

    fn bwd(pat: &[u8], hay: &[u8], end: usize) -> Option<usize> {
        let mut rev = pat.to_vec();
        rev.reverse();
        BmPat::compile(&rev, false).find_backward(hay, end)
    }

    #[test]
    fn forward_basic() {
        assert_eq!(fwd(b"needle", b"find the needle here", 0), Some(9));
        assert_eq!(fwd(b"needle", b"no match at all", 0), None);
        assert_eq!(fwd(b"aa", b"aaaa", 1), Some(1));
    }

    #[test]
    fn forward_start_bound() {
        assert_eq!(fwd(b"ab", b"ab ab", 1), Some(3));
        assert_eq!(fwd(b"ab", b"ab", 1), None);
    }

    #[test]
    fn backward_finds_rightmost() {
        let hay = b"one two one two";
        assert_eq!(bwd(b"one", hay, hay.len()), Some(8));
        assert_eq!(bwd(b"one", hay, 9), Some(0));
        assert_eq!(bwd(b"two", hay, 7), Some(4));
        assert_eq!(bwd(b"xyz", hay, hay.len()), None);
    }

    #[test]
    fn folded_compare() {
        let p = BmPat::compile(b"AbC", true);
        assert_eq!(p.find_forward(b"xxaBcxx", 0), Some(2));
    }

    #[test]
    fn repetitive_pattern_agrees_with_naive() {
        let hay = b"abababaababbababab";
        let pat = b"abab";
        let mut naive = Vec::new();
        for i in 0..=hay.len() - pat.len() {
            if &hay[i..i + pat.len()] == pat {
                naive.push(i);
            }
        }
        let bmp = BmPat::compile(pat, false);
        let mut got = Vec::new();
        let mut pos = 0;
        while let Some(s) = bmp.find_forward(hay, pos) {
            got.push(s);
            pos = s + 1;
        }
        assert_eq!(got, naive);
    }
}
