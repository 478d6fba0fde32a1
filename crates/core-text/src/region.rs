//! Region derivation: from dot and the region mark, or from a line block
//! selected by the numeric argument.
//!
//! Regions are computed on demand and never stored. Size is signed: negative
//! means the region extends backward from its dot. `FORCE_BEGIN` normalizes
//! the dot to the earlier endpoint and the size to non-negative.

use crate::{Buffer, Dot};
use core_status::{EdError, EdResult};

bitflags::bitflags! {
    /// Region derivation options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u8 {
        /// Put the region dot at the earlier endpoint; size becomes >= 0.
        const FORCE_BEGIN = 1 << 0;
        /// Include the delimiter of the final line.
        const INCLUDE_DELIM = 1 << 1;
        /// An empty region is acceptable.
        const EMPTY_OK = 1 << 2;
        /// Count a trailing partial line when the region ends at a line start.
        const LINE_SELECT = 1 << 3;
    }
}

/// An ordered byte range within one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub dot: Dot,
    /// Signed byte length; negative extends backward from `dot`.
    pub size: i64,
    pub line_count: usize,
}

impl Region {
    /// The starting dot and positive length.
    pub fn span(&self, buf: &Buffer) -> (Dot, usize) {
        if self.size >= 0 {
            (self.dot, self.size as usize)
        } else {
            let mut d = self.dot;
            buf.backward(&mut d, (-self.size) as usize);
            (d, (-self.size) as usize)
        }
    }
}

/// Region between dot and the region mark. Fails when the mark is unset, or
/// when the region is empty and `EMPTY_OK` is absent.
pub fn get_region(buf: &Buffer, dot: Dot, flags: RegionFlags) -> EdResult<Region> {
    let mark = buf
        .region_mark()
        .ok_or_else(|| EdError::failure("No mark '.' in this buffer"))?;
    let da = buf.dot_to_abs(dot) as i64;
    let ma = buf.dot_to_abs(mark) as i64;
    if da == ma && !flags.contains(RegionFlags::EMPTY_OK) {
        return Err(EdError::failure("No text selected"));
    }
    let (lo_dot, hi_dot, lo, hi) = if da <= ma {
        (dot, mark, da, ma)
    } else {
        (mark, dot, ma, da)
    };
    let line_count = if lo == hi {
        0
    } else {
        let mut probe = lo_dot;
        let mut newlines = 0;
        while probe.line != hi_dot.line {
            newlines += 1;
            let Some(next) = buf.next_line(probe.line) else {
                // The mark points at a line outside the (possibly narrowed)
                // visible chain.
                return Err(EdError::new(
                    core_status::Severity::FatalError,
                    "Mark '.' not found in buffer",
                ));
            };
            probe = Dot::new(next, 0);
        }
        newlines + usize::from(hi_dot.off > 0)
    };
    let (rdot, size) = if flags.contains(RegionFlags::FORCE_BEGIN) {
        (lo_dot, hi - lo)
    } else {
        (dot, ma - da)
    };
    Ok(Region {
        dot: rdot,
        size,
        line_count,
    })
}

/// Region from a dot and the numeric argument `n` used as a text selector.
/// `n` of `None` (the default) or 1 selects from dot to end of line, or just
/// the newline when dot already sits at end of line; 0 selects back to the
/// start of the line; larger values extend over further line breaks.
pub fn get_text_region(buf: &Buffer, dot: Dot, n: Option<i64>, flags: RegionFlags) -> Region {
    let mut rdot = dot;
    let mut line_count = usize::from(!buf.is_empty());
    let n_val = n.unwrap_or(1);
    let chunk: i64;
    if n.is_none() || n_val == 1 {
        let rest = (buf.line_len(dot.line) - dot.off) as i64;
        if rest == 0 {
            // Select the line delimiter, if any.
            chunk = i64::from(buf.next_line(dot.line).is_some());
        } else if flags.contains(RegionFlags::INCLUDE_DELIM) && buf.next_line(dot.line).is_some() {
            chunk = rest + 1;
        } else {
            chunk = rest;
        }
    } else if n_val == 0 {
        if flags.contains(RegionFlags::FORCE_BEGIN) {
            rdot.off = 0;
        }
        chunk = -(dot.off as i64);
    } else if n_val > 1 {
        let mut acc = (buf.line_len(dot.line) - dot.off) as i64;
        let mut remaining = n_val;
        let mut cur = buf.next_line(dot.line);
        while let Some(id) = cur {
            acc += 1 + buf.line_len(id) as i64;
            if buf.line_len(id) > 0 || buf.next_line(id).is_some() {
                line_count += 1;
            }
            remaining -= 1;
            if remaining == 1 {
                if flags.contains(RegionFlags::INCLUDE_DELIM) && buf.next_line(id).is_some() {
                    acc += 1;
                }
                break;
            }
            cur = buf.next_line(id);
        }
        chunk = acc;
    } else {
        // Backward over |n| line breaks to the start of the first line.
        if flags.contains(RegionFlags::FORCE_BEGIN) {
            rdot.off = 0;
        }
        let mut acc = -(dot.off as i64);
        if acc == 0 {
            line_count = 0;
        }
        let mut cur = dot.line;
        let mut remaining = n_val;
        loop {
            let Some(prev) = buf.prev_line(cur) else {
                break;
            };
            cur = prev;
            acc -= 1 + buf.line_len(prev) as i64;
            line_count += 1;
            if flags.contains(RegionFlags::FORCE_BEGIN) {
                rdot.line = prev;
            }
            remaining += 1;
            if remaining >= 0 {
                break;
            }
        }
        chunk = acc;
    }
    let size = if flags.contains(RegionFlags::FORCE_BEGIN) {
        chunk.abs()
    } else {
        chunk
    };
    Region {
        dot: rdot,
        size,
        line_count: if size == 0 { 0 } else { line_count },
    }
}

/// Region bounded by a line block, dot forced to the block start. `n == 0`
/// expands the dot/mark region to whole lines; otherwise `n` counts lines
/// forward or backward from dot.
pub fn get_line_region(
    buf: &Buffer,
    dot: Dot,
    n: Option<i64>,
    flags: RegionFlags,
) -> EdResult<Region> {
    let no_text = || -> EdResult<Region> {
        if flags.contains(RegionFlags::EMPTY_OK) {
            Ok(Region {
                dot,
                size: 0,
                line_count: 0,
            })
        } else {
            Err(EdError::failure("No text selected"))
        }
    };
    if buf.is_empty() {
        return no_text();
    }

    if n == Some(0) {
        // Select all lines touched by the dot/mark region.
        let mut region = get_region(
            buf,
            dot,
            (flags | RegionFlags::FORCE_BEGIN) | RegionFlags::EMPTY_OK,
        )?;
        if region.size == 0 && !flags.contains(RegionFlags::EMPTY_OK) {
            return no_text();
        }
        let mark = buf.region_mark().expect("checked by get_region");
        // The endpoint opposite the region start.
        let end = if region.dot == dot { mark } else { dot };
        if flags.contains(RegionFlags::LINE_SELECT)
            && region.size > 0
            && end.off == 0
            && (buf.next_line(end.line).is_some() || buf.line_len(end.line) > 0)
        {
            region.line_count += 1;
        }
        region.size += if region.dot == dot {
            (dot.off + buf.line_len(mark.line) - mark.off) as i64
        } else {
            (mark.off + buf.line_len(dot.line) - dot.off) as i64
        };
        if flags.contains(RegionFlags::INCLUDE_DELIM)
            && buf.next_line(dot.line).is_some()
            && buf.next_line(mark.line).is_some()
        {
            region.size += 1;
        }
        region.dot.off = 0;
        if region.size == 0 {
            return no_text();
        }
        if region.line_count == 0 {
            region.line_count = 1;
        }
        return Ok(region);
    }

    // A line block around dot.
    let mut d = dot;
    let mut n_val = n.unwrap_or(1);
    if n.is_none() {
        d.off = 0;
    } else if n_val < 0 {
        if buf.next_line(d.line).is_none() || !flags.contains(RegionFlags::INCLUDE_DELIM) {
            d.off = buf.line_len(d.line);
        } else {
            d.line = buf.next_line(d.line).expect("checked above");
            d.off = 0;
            n_val -= 1;
        }
    } else {
        d.off = 0;
    }
    let region = get_text_region(buf, d, Some(n_val), flags | RegionFlags::FORCE_BEGIN);
    if region.size == 0 {
        return no_text();
    }
    Ok(region)
}

/// Copy the region's bytes without disturbing the buffer.
pub fn extract(buf: &Buffer, region: &Region) -> Vec<u8> {
    let (start, len) = region.span(buf);
    let mut out = Vec::with_capacity(len);
    let mut dot = start;
    while out.len() < len {
        match buf.byte_at(dot) {
            Some(b) => out.push(b),
            None => break,
        }
        if !buf.forward(&mut dot, 1) {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REGION_MARK;
    use pretty_assertions::assert_eq;

    fn buf(content: &[u8]) -> Buffer {
        let mut b = Buffer::new("t");
        let mut d = b.start_dot();
        b.insert_text(&mut d, content).unwrap();
        b
    }

    #[test]
    fn mark_required() {
        let b = buf(b"abc");
        assert!(get_region(&b, b.start_dot(), RegionFlags::empty()).is_err());
    }

    #[test]
    fn forward_region_same_line() {
        let mut b = buf(b"hello");
        b.set_mark(REGION_MARK, Dot::new(b.first_line(), 1), -1);
        let dot = Dot::new(b.first_line(), 4);
        let r = get_region(&b, dot, RegionFlags::empty()).unwrap();
        assert_eq!(r.size, -3);
        assert_eq!(r.dot, dot);
        assert_eq!(r.line_count, 1);
        let r = get_region(&b, dot, RegionFlags::FORCE_BEGIN).unwrap();
        assert_eq!(r.size, 3);
        assert_eq!(r.dot.off, 1);
        assert_eq!(extract(&b, &r), b"ell");
    }

    #[test]
    fn force_begin_orders_endpoints() {
        let mut b = buf(b"ab\ncd\nef");
        let l2 = b.next_line(b.first_line()).unwrap();
        b.set_mark(REGION_MARK, Dot::new(l2, 1), -1);
        let r = get_region(&b, b.start_dot(), RegionFlags::FORCE_BEGIN).unwrap();
        assert!(r.size >= 0);
        assert_eq!(r.dot, b.start_dot());
        assert_eq!(r.size, 4);
        assert_eq!(r.line_count, 2);
        assert_eq!(extract(&b, &r), b"ab\nc");
    }

    #[test]
    fn empty_region_needs_flag() {
        let mut b = buf(b"abc");
        b.set_mark(REGION_MARK, Dot::new(b.first_line(), 1), -1);
        let dot = Dot::new(b.first_line(), 1);
        assert!(get_region(&b, dot, RegionFlags::empty()).is_err());
        let r = get_region(&b, dot, RegionFlags::EMPTY_OK).unwrap();
        assert_eq!(r.size, 0);
        assert_eq!(r.line_count, 0);
    }

    #[test]
    fn text_region_default_to_line_end() {
        let b = buf(b"abcdef\nxyz");
        let r = get_text_region(&b, Dot::new(b.first_line(), 2), None, RegionFlags::empty());
        assert_eq!(r.size, 4);
        assert_eq!(extract(&b, &r), b"cdef");
    }

    #[test]
    fn text_region_at_eol_selects_newline() {
        let b = buf(b"ab\ncd");
        let r = get_text_region(&b, Dot::new(b.first_line(), 2), None, RegionFlags::empty());
        assert_eq!(r.size, 1);
        assert_eq!(extract(&b, &r), b"\n");
    }

    #[test]
    fn text_region_zero_selects_to_bol() {
        let b = buf(b"abcdef");
        let r = get_text_region(&b, Dot::new(b.first_line(), 4), Some(0), RegionFlags::empty());
        assert_eq!(r.size, -4);
        let r = get_text_region(
            &b,
            Dot::new(b.first_line(), 4),
            Some(0),
            RegionFlags::FORCE_BEGIN,
        );
        assert_eq!(r.size, 4);
        assert_eq!(r.dot.off, 0);
    }

    #[test]
    fn text_region_multi_line_forward() {
        let b = buf(b"ab\ncd\nef");
        let r = get_text_region(&b, Dot::new(b.first_line(), 1), Some(2), RegionFlags::empty());
        // "b" + newline + "cd"
        assert_eq!(r.size, 4);
        assert_eq!(extract(&b, &r), b"b\ncd");
        let r = get_text_region(
            &b,
            Dot::new(b.first_line(), 1),
            Some(2),
            RegionFlags::INCLUDE_DELIM,
        );
        assert_eq!(r.size, 5);
    }

    #[test]
    fn text_region_backward() {
        let b = buf(b"ab\ncd\nef");
        let l2 = b.next_line(b.first_line()).unwrap();
        let r = get_text_region(&b, Dot::new(l2, 1), Some(-1), RegionFlags::FORCE_BEGIN);
        // "ab\nc" backward to the start of the previous line.
        assert_eq!(r.size, 4);
        assert_eq!(r.dot, b.start_dot());
        assert_eq!(extract(&b, &r), b"ab\nc");
    }

    #[test]
    fn line_region_whole_current_line() {
        let b = buf(b"abc\ndef");
        let r = get_line_region(
            &b,
            Dot::new(b.first_line(), 1),
            None,
            RegionFlags::INCLUDE_DELIM,
        )
        .unwrap();
        assert_eq!(extract(&b, &r), b"abc\n");
        assert_eq!(r.dot.off, 0);
    }

    #[test]
    fn line_region_from_marked_block() {
        let mut b = buf(b"aa\nbb\ncc");
        let l2 = b.next_line(b.first_line()).unwrap();
        b.set_mark(REGION_MARK, Dot::new(b.first_line(), 1), -1);
        let r = get_line_region(
            &b,
            Dot::new(l2, 1),
            Some(0),
            RegionFlags::INCLUDE_DELIM | RegionFlags::LINE_SELECT,
        )
        .unwrap();
        assert_eq!(r.dot, b.start_dot());
        assert_eq!(extract(&b, &r), b"aa\nbb\n");
        assert_eq!(r.line_count, 2);
    }

    #[test]
    fn empty_buffer_line_region() {
        let b = Buffer::new("t");
        assert!(get_line_region(&b, b.start_dot(), None, RegionFlags::empty()).is_err());
        let r =
            get_line_region(&b, b.start_dot(), None, RegionFlags::EMPTY_OK).unwrap();
        assert_eq!(r.size, 0);
    }
}
