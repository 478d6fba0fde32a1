//! Buffers and their line lists.
//!
//! All text mutation funnels through [`Buffer::insert_text`] and
//! [`Buffer::delete_span`]; both maintain the line-list invariants, relocate
//! marks, set the changed flag, bump the edit version, and record a touch
//! level for the layout engine. A mutation either succeeds or leaves the
//! buffer untouched and fails with a message.

use crate::{Dot, Face, LineId, Mark, REGION_MARK};
use core_modes::ModeId;
use core_status::{EdError, EdResult};
use slab::Slab;
use std::path::PathBuf;
use tracing::trace;

bitflags::bitflags! {
    /// Buffer attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u16 {
        /// File has been read (or buffer otherwise made live).
        const ACTIVE = 1 << 0;
        /// Text differs from the associated file.
        const CHANGED = 1 << 1;
        /// Hidden from buffer listings.
        const HIDDEN = 1 << 2;
        /// Holds macro source; name begins with `@`.
        const MACRO = 1 << 3;
        /// Head and/or tail lines are hidden pending a widen.
        const NARROWED = 1 << 4;
        /// May only be invoked from an unconstrained context.
        const CONSTRAINED = 1 << 5;
        /// Message-line attribute escapes are honored when displaying.
        const TERM_ATTR = 1 << 6;
        /// Buffer may not be modified.
        const READ_ONLY = 1 << 7;
    }
}

/// How far an edit disturbed any window showing the buffer. Levels merge by
/// maximum and are drained once per redisplay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TouchLevel {
    None,
    /// Point moved only.
    Move,
    /// Text changed within single lines.
    Edit,
    /// Lines were inserted or deleted.
    Hard,
}

/// Extension record carried by macro buffers.
#[derive(Debug, Clone, Default)]
pub struct MacroInfo {
    pub min_args: u16,
    /// `None` means no upper bound.
    pub max_args: Option<u16>,
    pub usage: Option<String>,
    pub desc: Option<String>,
    /// Number of invocations currently on the call stack.
    pub exec_depth: u32,
}

/// One line of text. `text` never contains a newline; the terminator between
/// lines is implicit.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: Vec<u8>,
    /// Previous line; for the first line this is the last line.
    pub prev: LineId,
    /// Next line; `None` on the last line.
    pub next: Option<LineId>,
}

/// Hidden chains set aside by narrow.
#[derive(Debug, Clone, Copy)]
struct NarrowState {
    head: Option<(LineId, LineId)>,
    tail: Option<(LineId, LineId)>,
}

/// A named text container.
#[derive(Debug)]
pub struct Buffer {
    pub name: String,
    lines: Slab<Line>,
    first: LineId,
    nlines: usize,
    pub flags: BufFlags,
    pub filename: Option<PathBuf>,
    /// Line delimiter recorded when the file was read; reused on write.
    pub delim: Option<Vec<u8>>,
    /// Face restored when the buffer next appears in a window.
    pub face: Face,
    pub modes: Vec<ModeId>,
    pub macro_info: Option<MacroInfo>,
    marks: Vec<Mark>,
    narrow: Option<NarrowState>,
    touch: TouchLevel,
    /// Bumped on every text mutation; keys compiled-script caching.
    pub version: u64,
}

impl Buffer {
    /// Create a buffer holding a single empty line.
    pub fn new(name: impl Into<String>) -> Self {
        let mut lines = Slab::new();
        let entry = lines.vacant_entry();
        let id = LineId(entry.key());
        entry.insert(Line {
            text: Vec::new(),
            prev: id,
            next: None,
        });
        let name = name.into();
        let mut flags = BufFlags::empty();
        if name.starts_with('@') {
            flags |= BufFlags::MACRO;
        }
        Self {
            name,
            lines,
            first: id,
            nlines: 1,
            flags,
            filename: None,
            delim: None,
            face: Face::at(id),
            modes: Vec::new(),
            macro_info: None,
            marks: Vec::new(),
            narrow: None,
            touch: TouchLevel::None,
            version: 0,
        }
    }

    // --- line access ---------------------------------------------------------

    pub fn first_line(&self) -> LineId {
        self.first
    }

    pub fn last_line(&self) -> LineId {
        self.lines[self.first.0].prev
    }

    pub fn next_line(&self, id: LineId) -> Option<LineId> {
        self.lines[id.0].next
    }

    /// Previous line, or `None` at the first line.
    pub fn prev_line(&self, id: LineId) -> Option<LineId> {
        if id == self.first {
            None
        } else {
            Some(self.lines[id.0].prev)
        }
    }

    pub fn line_text(&self, id: LineId) -> &[u8] {
        &self.lines[id.0].text
    }

    pub fn line_len(&self, id: LineId) -> usize {
        self.lines[id.0].text.len()
    }

    pub fn contains_line(&self, id: LineId) -> bool {
        self.lines.contains(id.0)
    }

    pub fn line_count(&self) -> usize {
        self.nlines
    }

    /// Total bytes including implicit newlines.
    pub fn byte_count(&self) -> usize {
        let mut total = 0;
        let mut id = Some(self.first);
        while let Some(cur) = id {
            total += self.line_len(cur);
            id = self.next_line(cur);
            if id.is_some() {
                total += 1;
            }
        }
        total
    }

    /// Iterate line ids first to last.
    pub fn lines(&self) -> LineIter<'_> {
        LineIter {
            buf: self,
            next: Some(self.first),
        }
    }

    /// The position one past the final byte.
    pub fn end_dot(&self) -> Dot {
        let last = self.last_line();
        Dot::new(last, self.line_len(last))
    }

    pub fn start_dot(&self) -> Dot {
        Dot::new(self.first, 0)
    }

    /// True when the buffer holds no text at all.
    pub fn is_empty(&self) -> bool {
        self.nlines == 1 && self.line_len(self.first) == 0
    }

    /// Ordinal of a line, counting from zero.
    pub fn line_index(&self, id: LineId) -> usize {
        let mut n = 0;
        for cur in self.lines() {
            if cur == id {
                return n;
            }
            n += 1;
        }
        n
    }

    // --- touch & change tracking --------------------------------------------

    pub fn touch(&mut self, level: TouchLevel) {
        if level > self.touch {
            self.touch = level;
        }
    }

    pub fn take_touch(&mut self) -> TouchLevel {
        std::mem::replace(&mut self.touch, TouchLevel::None)
    }

    fn note_edit(&mut self, level: TouchLevel) {
        self.flags.insert(BufFlags::CHANGED);
        self.version += 1;
        self.touch(level);
    }

    // --- marks ---------------------------------------------------------------

    pub fn set_mark(&mut self, id: u16, dot: Dot, reframe_row: i16) {
        if let Some(m) = self.marks.iter_mut().find(|m| m.id == id) {
            m.dot = dot;
            m.reframe_row = reframe_row;
        } else {
            self.marks.push(Mark {
                id,
                dot,
                reframe_row,
            });
        }
    }

    pub fn mark(&self, id: u16) -> Option<&Mark> {
        self.marks.iter().find(|m| m.id == id)
    }

    pub fn delete_mark(&mut self, id: u16) -> bool {
        let before = self.marks.len();
        self.marks.retain(|m| m.id != id);
        before != self.marks.len()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    /// Exchange dot with the named mark. The mark keeps no reframe row.
    pub fn swap_mark(&mut self, id: u16, dot: &mut Dot) -> EdResult<()> {
        let m = self
            .marks
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| {
                EdError::failure(format!(
                    "No mark '{}' in this buffer",
                    char::from_u32(id as u32).unwrap_or('?')
                ))
            })?;
        std::mem::swap(&mut m.dot, dot);
        self.touch(TouchLevel::Move);
        Ok(())
    }

    /// The region mark's dot, if set.
    pub fn region_mark(&self) -> Option<Dot> {
        self.mark(REGION_MARK).map(|m| m.dot)
    }

    // --- linking primitives --------------------------------------------------

    fn alloc_line(&mut self, text: Vec<u8>) -> LineId {
        let entry = self.lines.vacant_entry();
        let id = LineId(entry.key());
        entry.insert(Line {
            text,
            prev: id,
            next: None,
        });
        id
    }

    fn link_after(&mut self, at: LineId, new: LineId) {
        let at_next = self.lines[at.0].next;
        self.lines[new.0].prev = at;
        self.lines[new.0].next = at_next;
        self.lines[at.0].next = Some(new);
        match at_next {
            Some(nx) => self.lines[nx.0].prev = new,
            None => self.lines[self.first.0].prev = new,
        }
        self.nlines += 1;
    }

    /// Remove a line from the chain, relocating its marks to the successor
    /// (or, for the last line, the predecessor) at offset 0. The caller must
    /// not unlink the only line.
    fn unlink(&mut self, id: LineId) {
        debug_assert!(self.nlines > 1, "cannot unlink the only line");
        let prev = self.lines[id.0].prev;
        let next = self.lines[id.0].next;
        let fallback = next.unwrap_or(prev);
        for m in &mut self.marks {
            if m.dot.line == id {
                m.dot = Dot::new(fallback, 0);
            }
        }
        if id == self.first {
            let new_first = next.expect("first line with no successor");
            self.lines[new_first.0].prev = prev;
            self.first = new_first;
        } else {
            self.lines[prev.0].next = next;
            match next {
                Some(nx) => self.lines[nx.0].prev = prev,
                None => self.lines[self.first.0].prev = prev,
            }
        }
        self.lines.remove(id.0);
        self.nlines -= 1;
    }

    // --- absolute offsets ----------------------------------------------------

    pub fn dot_to_abs(&self, dot: Dot) -> usize {
        let mut total = 0;
        for id in self.lines() {
            if id == dot.line {
                return total + dot.off;
            }
            total += self.line_len(id) + 1;
        }
        total
    }

    pub fn abs_to_dot(&self, mut abs: usize) -> Dot {
        let mut last = self.first;
        for id in self.lines() {
            let len = self.line_len(id);
            if abs <= len {
                return Dot::new(id, abs);
            }
            abs -= len + 1;
            last = id;
        }
        Dot::new(last, self.line_len(last))
    }

    /// Move a dot forward `n` bytes (newlines count one). Returns false and
    /// leaves the dot at end-of-buffer when the text runs out.
    pub fn forward(&self, dot: &mut Dot, mut n: usize) -> bool {
        while n > 0 {
            let len = self.line_len(dot.line);
            let avail = len - dot.off;
            if n <= avail {
                dot.off += n;
                return true;
            }
            match self.next_line(dot.line) {
                Some(nx) => {
                    n -= avail + 1;
                    *dot = Dot::new(nx, 0);
                }
                None => {
                    dot.off = len;
                    return false;
                }
            }
        }
        true
    }

    /// Move a dot backward `n` bytes. Returns false and leaves the dot at
    /// the start of the buffer when the text runs out.
    pub fn backward(&self, dot: &mut Dot, mut n: usize) -> bool {
        while n > 0 {
            if n <= dot.off {
                dot.off -= n;
                return true;
            }
            match self.prev_line(dot.line) {
                Some(pv) => {
                    n -= dot.off + 1;
                    *dot = Dot::new(pv, self.line_len(pv));
                }
                None => {
                    dot.off = 0;
                    return false;
                }
            }
        }
        true
    }

    /// Byte at the dot; the implicit newline reads as `\n`, end-of-buffer as
    /// `None`.
    pub fn byte_at(&self, dot: Dot) -> Option<u8> {
        let text = self.line_text(dot.line);
        if dot.off < text.len() {
            Some(text[dot.off])
        } else if self.next_line(dot.line).is_some() {
            Some(b'\n')
        } else {
            None
        }
    }

    // --- mutation ------------------------------------------------------------

    /// Insert bytes at the dot, splitting lines at newlines. The dot advances
    /// past the inserted text; marks after the insertion point shift with it.
    pub fn insert_text(&mut self, dot: &mut Dot, bytes: &[u8]) -> EdResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.contains_line(dot.line) {
            return Err(EdError::failure("Position is not in this buffer"));
        }
        let nl_count = bytes.iter().filter(|&&b| b == b'\n').count();
        if nl_count == 0 {
            let off = dot.off;
            let line = &mut self.lines[dot.line.0].text;
            if off > line.len() {
                return Err(EdError::failure("Position past end of line"));
            }
            line.splice(off..off, bytes.iter().copied());
            let n = bytes.len();
            for m in &mut self.marks {
                if m.dot.line == dot.line && m.dot.off > off {
                    m.dot.off += n;
                }
            }
            dot.off += n;
            self.note_edit(TouchLevel::Edit);
            trace!(target: "text.edit", bytes = n, "insert_inline");
            return Ok(());
        }

        // Structural insert: split the current line at the dot, then lay the
        // segments down as whole lines.
        let off = dot.off;
        if off > self.line_len(dot.line) {
            return Err(EdError::failure("Position past end of line"));
        }
        let tail: Vec<u8> = self.lines[dot.line.0].text.split_off(off);
        let mut segments = bytes.split(|&b| b == b'\n');
        let head_seg = segments.next().expect("split yields at least one");
        self.lines[dot.line.0].text.extend_from_slice(head_seg);

        // Marks sitting in the moved tail relocate to the final segment line.
        let relocating: Vec<(usize, usize)> = self
            .marks
            .iter()
            .enumerate()
            .filter(|(_, m)| m.dot.line == dot.line && m.dot.off > off)
            .map(|(i, m)| (i, m.dot.off - off))
            .collect();

        let mut cur = dot.line;
        let mut pending: Vec<&[u8]> = segments.collect();
        let final_seg = pending.pop().expect("at least one newline present");
        for seg in pending {
            let id = self.alloc_line(seg.to_vec());
            self.link_after(cur, id);
            cur = id;
        }
        let last_seg_len = final_seg.len();
        let mut final_text = final_seg.to_vec();
        final_text.extend_from_slice(&tail);
        let final_id = self.alloc_line(final_text);
        self.link_after(cur, final_id);

        for (i, rel) in relocating {
            self.marks[i].dot = Dot::new(final_id, last_seg_len + rel);
        }
        *dot = Dot::new(final_id, last_seg_len);
        self.note_edit(TouchLevel::Hard);
        trace!(target: "text.edit", bytes = bytes.len(), lines = nl_count, "insert_split");
        Ok(())
    }

    /// Delete `n` bytes forward (n > 0) or backward (n < 0) from the dot,
    /// merging across line breaks. Returns the removed text in document
    /// order. Fails without mutating when the buffer holds too few bytes.
    pub fn delete_span(&mut self, dot: &mut Dot, n: i64) -> EdResult<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let count = n.unsigned_abs() as usize;
        let mut start = *dot;
        if n < 0 {
            let mut probe = *dot;
            if !self.backward(&mut probe, count) {
                return Err(EdError::failure("Too few characters to delete"));
            }
            start = probe;
        } else {
            // Availability check before any mutation.
            let mut probe = *dot;
            if !self.forward(&mut probe, count) {
                return Err(EdError::failure("Too few characters to delete"));
            }
        }

        let mut collected = Vec::with_capacity(count);
        let mut remaining = count;
        let mut pos = start;
        while remaining > 0 {
            let line_len = self.line_len(pos.line);
            let avail = line_len - pos.off;
            if remaining <= avail {
                let drained: Vec<u8> = self.lines[pos.line.0]
                    .text
                    .drain(pos.off..pos.off + remaining)
                    .collect();
                collected.extend_from_slice(&drained);
                let (cut_start, cut_len) = (pos.off, remaining);
                for m in &mut self.marks {
                    if m.dot.line == pos.line && m.dot.off > cut_start {
                        m.dot.off = m.dot.off.saturating_sub(cut_len).max(cut_start);
                    }
                }
                self.note_edit(TouchLevel::Edit);
                remaining = 0;
            } else {
                let drained: Vec<u8> =
                    self.lines[pos.line.0].text.drain(pos.off..line_len).collect();
                collected.extend_from_slice(&drained);
                for m in &mut self.marks {
                    if m.dot.line == pos.line && m.dot.off > pos.off {
                        m.dot.off = pos.off;
                    }
                }
                remaining -= avail;
                // Consume the line break: merge the successor in.
                let next = self
                    .next_line(pos.line)
                    .expect("availability was pre-checked");
                collected.push(b'\n');
                remaining -= 1;
                let next_text = std::mem::take(&mut self.lines[next.0].text);
                for m in &mut self.marks {
                    if m.dot.line == next {
                        m.dot = Dot::new(pos.line, pos.off + m.dot.off);
                    }
                }
                self.lines[pos.line.0].text.extend_from_slice(&next_text);
                self.unlink(next);
                self.note_edit(TouchLevel::Hard);
            }
        }
        *dot = start;
        trace!(target: "text.edit", bytes = collected.len(), "delete_span");
        Ok(collected)
    }

    /// Replace the entire contents. Marks are dropped; the face returns to
    /// the start.
    pub fn set_text(&mut self, bytes: &[u8]) {
        self.lines.clear();
        self.marks.clear();
        let entry = self.lines.vacant_entry();
        let first = LineId(entry.key());
        entry.insert(Line {
            text: Vec::new(),
            prev: first,
            next: None,
        });
        self.first = first;
        self.nlines = 1;
        self.narrow = None;
        self.flags.remove(BufFlags::NARROWED);
        let mut cur = first;
        let mut segs = bytes.split(|&b| b == b'\n');
        if let Some(head) = segs.next() {
            self.lines[first.0].text = head.to_vec();
        }
        for seg in segs {
            let id = self.alloc_line(seg.to_vec());
            self.link_after(cur, id);
            cur = id;
        }
        self.face = Face::at(first);
        self.note_edit(TouchLevel::Hard);
    }

    /// Append bytes after the final line.
    pub fn append_text(&mut self, bytes: &[u8]) -> EdResult<()> {
        let mut d = self.end_dot();
        self.insert_text(&mut d, bytes)
    }

    /// Whole contents joined with `\n`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut iter = self.lines().peekable();
        while let Some(id) = iter.next() {
            out.extend_from_slice(self.line_text(id));
            if iter.peek().is_some() {
                out.push(b'\n');
            }
        }
        out
    }

    /// Drop all text, leaving one empty line.
    pub fn clear(&mut self) {
        self.set_text(b"");
    }

    // --- narrow / widen ------------------------------------------------------

    /// Hide everything outside `first_keep..=last_keep`. The hidden chains
    /// are set aside intact and restored by [`Buffer::widen`].
    pub fn narrow(&mut self, first_keep: LineId, last_keep: LineId) -> EdResult<()> {
        if self.flags.contains(BufFlags::NARROWED) {
            return Err(EdError::failure(format!(
                "Buffer \"{}\" is already narrowed",
                self.name
            )));
        }
        let old_first = self.first;
        let old_last = self.last_line();
        let head = if first_keep != old_first {
            Some((old_first, self.lines[first_keep.0].prev))
        } else {
            None
        };
        let tail = self.lines[last_keep.0].next.map(|after| (after, old_last));
        if head.is_none() && tail.is_none() {
            return Err(EdError::failure("Nothing to hide"));
        }
        self.first = first_keep;
        self.lines[last_keep.0].next = None;
        self.lines[first_keep.0].prev = last_keep;
        self.narrow = Some(NarrowState { head, tail });
        self.flags.insert(BufFlags::NARROWED);
        self.nlines = self.lines().count();
        self.touch(TouchLevel::Hard);
        Ok(())
    }

    /// Reattach the chains hidden by [`Buffer::narrow`].
    pub fn widen(&mut self) -> EdResult<()> {
        let st = self.narrow.take().ok_or_else(|| {
            EdError::failure(format!("Buffer \"{}\" is not narrowed", self.name))
        })?;
        let vis_first = self.first;
        let vis_last = self.last_line();
        let mut new_first = vis_first;
        let mut new_last = vis_last;
        if let Some((hf, hl)) = st.head {
            self.lines[hl.0].next = Some(vis_first);
            self.lines[vis_first.0].prev = hl;
            new_first = hf;
        }
        if let Some((tf, tl)) = st.tail {
            self.lines[vis_last.0].next = Some(tf);
            self.lines[tf.0].prev = vis_last;
            new_last = tl;
        }
        self.first = new_first;
        self.lines[new_first.0].prev = new_last;
        self.lines[new_last.0].next = None;
        self.flags.remove(BufFlags::NARROWED);
        self.nlines = self.lines().count();
        self.touch(TouchLevel::Hard);
        Ok(())
    }

    /// Verify the line-list invariants; used by tests and debug assertions.
    pub fn check_links(&self) -> bool {
        let first = self.first;
        let last = self.lines[first.0].prev;
        if self.lines[last.0].next.is_some() {
            return false;
        }
        let mut count = 0;
        let mut id = Some(first);
        let mut prev = last;
        while let Some(cur) = id {
            if self.lines[cur.0].prev != prev {
                return false;
            }
            count += 1;
            prev = cur;
            id = self.lines[cur.0].next;
        }
        count == self.nlines
    }
}

/// Forward iterator over line ids.
pub struct LineIter<'a> {
    buf: &'a Buffer,
    next: Option<LineId>,
}

impl<'a> Iterator for LineIter<'a> {
    type Item = LineId;

    fn next(&mut self) -> Option<LineId> {
        let cur = self.next?;
        self.next = self.buf.next_line(cur);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(buf: &Buffer) -> String {
        String::from_utf8_lossy(&buf.to_bytes()).into_owned()
    }

    #[test]
    fn new_buffer_has_one_empty_line() {
        let b = Buffer::new("main");
        assert_eq!(b.line_count(), 1);
        assert!(b.is_empty());
        assert!(b.check_links());
    }

    #[test]
    fn macro_name_sets_flag() {
        let b = Buffer::new("@helper");
        assert!(b.flags.contains(BufFlags::MACRO));
    }

    #[test]
    fn inline_insert_moves_dot_and_marks() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"hello").unwrap();
        assert_eq!(text(&b), "hello");
        assert_eq!(dot.off, 5);
        b.set_mark(b'a' as u16, Dot::new(b.first_line(), 5), -1);
        let mut dot = Dot::new(b.first_line(), 0);
        b.insert_text(&mut dot, b"XX").unwrap();
        assert_eq!(text(&b), "XXhello");
        assert_eq!(b.mark(b'a' as u16).unwrap().dot.off, 7);
    }

    #[test]
    fn split_insert_structures_lines() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"abcdef").unwrap();
        let mut dot = Dot::new(b.first_line(), 3);
        b.insert_text(&mut dot, b"xx\nyy").unwrap();
        assert_eq!(text(&b), "abcxx\nyydef");
        assert_eq!(b.line_count(), 2);
        assert_eq!(dot.off, 2);
        assert_eq!(b.line_text(dot.line), b"yydef");
        assert!(b.check_links());
    }

    #[test]
    fn split_insert_relocates_tail_marks() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"abcdef").unwrap();
        b.set_mark(b'm' as u16, Dot::new(b.first_line(), 5), -1); // before 'f'
        let mut dot = Dot::new(b.first_line(), 3);
        b.insert_text(&mut dot, b"\n").unwrap();
        let m = b.mark(b'm' as u16).unwrap();
        assert_eq!(m.dot.line, dot.line);
        assert_eq!(m.dot.off, 2);
    }

    #[test]
    fn multi_line_insert() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"one\ntwo\nthree").unwrap();
        assert_eq!(b.line_count(), 3);
        assert_eq!(text(&b), "one\ntwo\nthree");
        assert_eq!(b.byte_count(), 13);
        assert!(b.check_links());
    }

    #[test]
    fn delete_forward_within_line() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"hello world").unwrap();
        let mut dot = Dot::new(b.first_line(), 5);
        let cut = b.delete_span(&mut dot, 6).unwrap();
        assert_eq!(cut, b" world");
        assert_eq!(text(&b), "hello");
        assert_eq!(dot.off, 5);
    }

    #[test]
    fn delete_across_line_break_merges() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"ab\ncd").unwrap();
        let mut dot = Dot::new(b.first_line(), 2);
        let cut = b.delete_span(&mut dot, 1).unwrap();
        assert_eq!(cut, b"\n");
        assert_eq!(text(&b), "abcd");
        assert_eq!(b.line_count(), 1);
        assert!(b.check_links());
    }

    #[test]
    fn delete_backward_returns_document_order() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"ab\ncd").unwrap();
        // dot after 'c' on line 2
        let second = b.next_line(b.first_line()).unwrap();
        let mut dot = Dot::new(second, 1);
        let cut = b.delete_span(&mut dot, -2).unwrap();
        assert_eq!(cut, b"\nc");
        assert_eq!(text(&b), "abd");
        assert_eq!(dot.line, b.first_line());
        assert_eq!(dot.off, 2);
    }

    #[test]
    fn delete_too_much_fails_untouched() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"abc").unwrap();
        let before = text(&b);
        let mut dot = Dot::new(b.first_line(), 1);
        assert!(b.delete_span(&mut dot, 10).is_err());
        assert_eq!(text(&b), before);
        assert_eq!(dot.off, 1);
    }

    #[test]
    fn marks_on_deleted_line_relocate() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"ab\ncd\nef").unwrap();
        let second = b.next_line(b.first_line()).unwrap();
        b.set_mark(b'x' as u16, Dot::new(second, 1), -1);
        // Delete "ab\ncd\n" entirely.
        let mut dot = b.start_dot();
        b.delete_span(&mut dot, 6).unwrap();
        assert_eq!(text(&b), "ef");
        let m = b.mark(b'x' as u16).unwrap();
        assert_eq!(m.dot.line, b.first_line());
        assert_eq!(m.dot.off, 0);
    }

    #[test]
    fn forward_backward_round_trip() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"one\ntwo\nthree").unwrap();
        let mut d = b.start_dot();
        assert!(b.forward(&mut d, 7));
        assert_eq!(b.byte_at(d), Some(b'\n'));
        assert!(b.backward(&mut d, 7));
        assert_eq!(d, b.start_dot());
    }

    #[test]
    fn narrow_then_widen_restores_exactly() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"aa\nbb\ncc\ndd\nee").unwrap();
        let before = text(&b);
        let l2 = b.next_line(b.first_line()).unwrap();
        let l3 = b.next_line(l2).unwrap();
        b.set_mark(b'z' as u16, Dot::new(l3, 1), -1);
        b.narrow(l2, l3).unwrap();
        assert_eq!(text(&b), "bb\ncc");
        assert_eq!(b.line_count(), 2);
        assert!(b.flags.contains(BufFlags::NARROWED));
        assert!(b.check_links());
        b.widen().unwrap();
        assert_eq!(text(&b), before);
        assert_eq!(b.line_count(), 5);
        assert!(b.check_links());
        let m = b.mark(b'z' as u16).unwrap();
        assert_eq!((m.dot.line, m.dot.off), (l3, 1));
    }

    #[test]
    fn narrow_head_only_and_tail_only() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"1\n2\n3").unwrap();
        let l2 = b.next_line(b.first_line()).unwrap();
        let l3 = b.next_line(l2).unwrap();
        b.narrow(l2, l3).unwrap();
        assert_eq!(text(&b), "2\n3");
        b.widen().unwrap();
        b.narrow(b.first_line(), l2).unwrap();
        assert_eq!(text(&b), "1\n2");
        b.widen().unwrap();
        assert_eq!(text(&b), "1\n2\n3");
        assert!(b.check_links());
    }

    #[test]
    fn double_narrow_refused() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"1\n2\n3").unwrap();
        let l2 = b.next_line(b.first_line()).unwrap();
        b.narrow(l2, b.last_line()).unwrap();
        assert!(b.narrow(l2, l2).is_err());
    }

    #[test]
    fn edit_marks_changed_and_bumps_version() {
        let mut b = Buffer::new("t");
        let v0 = b.version;
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"x").unwrap();
        assert!(b.flags.contains(BufFlags::CHANGED));
        assert!(b.version > v0);
        assert_eq!(b.take_touch(), TouchLevel::Edit);
        assert_eq!(b.take_touch(), TouchLevel::None);
    }

    #[test]
    fn abs_offset_round_trip() {
        let mut b = Buffer::new("t");
        let mut dot = b.start_dot();
        b.insert_text(&mut dot, b"ab\ncde\nf").unwrap();
        for abs in 0..=b.byte_count() {
            let d = b.abs_to_dot(abs);
            assert_eq!(b.dot_to_abs(d), abs);
        }
    }

    proptest::proptest! {
        /// The line list stays circular-via-prev through arbitrary edit
        /// sequences, and the content matches a flat-string model.
        #[test]
        fn links_and_content_match_flat_model(
            ops in proptest::collection::vec((0usize..40, proptest::option::of("[a-c\\n]{0,4}"), 0i64..6), 0..30)
        ) {
            let mut b = Buffer::new("t");
            let mut model: Vec<u8> = Vec::new();
            for (pos, ins, del) in ops {
                let at = pos.min(model.len());
                let mut dot = b.abs_to_dot(at);
                if let Some(text) = ins {
                    b.insert_text(&mut dot, text.as_bytes()).unwrap();
                    model.splice(at..at, text.bytes());
                } else {
                    let avail = (model.len() - at) as i64;
                    let k = del.min(avail);
                    if k > 0 {
                        b.delete_span(&mut dot, k).unwrap();
                        model.drain(at..at + k as usize);
                    }
                }
                proptest::prop_assert!(b.check_links());
                proptest::prop_assert_eq!(b.to_bytes(), model.clone());
            }
        }
    }
}
