//! The text store: slab-arena line lists, buffers, marks, and regions.
//!
//! Lines are raw byte sequences held in a per-buffer `slab::Slab` and linked
//! into a list by stable `LineId` indices, so every other subsystem can hold
//! a position across edits without dangling. The list is circular via `prev`:
//! the first line's `prev` is the last line (O(1) tail access) while the last
//! line's `next` is `None`. A buffer always contains at least one line; all
//! lines except the last carry an implicit newline terminator.
//!
//! Positions are `Dot` values (`LineId` + byte offset). Marks are named dots
//! owned by their buffer; regions are derived on demand and never stored.

pub mod buffer;
pub mod case;
pub mod kill;
pub mod region;
pub mod registry;

pub use buffer::{BufFlags, Buffer, Line, MacroInfo, TouchLevel};
pub use kill::{KillRing, Undelete};
pub use region::{Region, RegionFlags};
pub use registry::{BufferId, BufferSet};

/// Stable index of a line within its buffer's slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(pub usize);

/// A position in a buffer: a line and a byte offset within it. Offset equal
/// to the line length addresses the implicit newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dot {
    pub line: LineId,
    pub off: usize,
}

impl Dot {
    pub fn new(line: LineId, off: usize) -> Self {
        Self { line, off }
    }
}

/// What a window shows of a buffer: the top line, the dot, and the first
/// displayed column. Saved in the buffer whenever it leaves its last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub top: LineId,
    pub dot: Dot,
    pub first_col: usize,
}

impl Face {
    pub fn at(line: LineId) -> Self {
        Self {
            top: line,
            dot: Dot::new(line, 0),
            first_col: 0,
        }
    }
}

/// A named saved position. Printable ids are user marks; ids at or above
/// [`WINDOW_MARK_BASE`] are reserved for window saves (narrow/widen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub id: u16,
    pub dot: Dot,
    /// Window row to reframe to when the mark is returned to; negative means
    /// none recorded.
    pub reframe_row: i16,
}

/// The well-known mark delimiting the region opposite dot.
pub const REGION_MARK: u16 = b'.' as u16;

/// First mark id reserved for window saves; disjoint from printable ids.
pub const WINDOW_MARK_BASE: u16 = 0x0100;
