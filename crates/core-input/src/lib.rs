//! Extended keys, key literal grammar, binding tables, and the keyboard
//! macro.
//!
//! An extended key is a base byte plus modifier flags (`Ctrl`, `Meta`, the
//! three prefix-key flags, `Shift`, `Func`). A 16-bit hash (low byte base,
//! high bits flags, identical to the external key grammar's encoding) is
//! derivable for table slots and display. The binding table is five
//! fixed-size vectors, one per prefix class, indexed O(1) by a compact slot
//! mapping that folds control keys onto their base characters and packs
//! function keys, S-TAB, and shifted function keys above 127.

pub mod kbdmacro;

pub use kbdmacro::{KbdMacro, MacState};

use core_status::{EdError, EdResult};
use core_terminal::{TermInput, TermKey};
use core_text::BufferId;
use std::fmt;
use tracing::trace;

bitflags::bitflags! {
    /// Extended-key modifier flags. Values match the external hash layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyMods: u16 {
        const CTRL = 0x0100;
        const META = 0x0200;
        /// The `C-x` prefix.
        const PREF1 = 0x0400;
        /// The `C-c` prefix.
        const PREF2 = 0x0800;
        /// The `C-h` prefix.
        const PREF3 = 0x1000;
        const SHIFT = 0x2000;
        const FUNC = 0x4000;
    }
}

impl KeyMods {
    /// All prefix-class flags.
    pub fn prefix_mask() -> Self {
        Self::META | Self::PREF1 | Self::PREF2 | Self::PREF3
    }
}

/// One fully assembled input key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtKey {
    pub base: u8,
    pub mods: KeyMods,
}

impl ExtKey {
    pub fn new(base: u8, mods: KeyMods) -> Self {
        Self { base, mods }
    }

    pub fn plain(c: u8) -> Self {
        Self::new(c, KeyMods::empty())
    }

    pub fn ctrl(c: u8) -> Self {
        Self::new(c.to_ascii_uppercase(), KeyMods::CTRL)
    }

    /// The 16-bit external hash: low byte base, high bits flags.
    pub fn hash(self) -> u16 {
        self.mods.bits() | self.base as u16
    }

    pub fn from_hash(h: u16) -> Self {
        Self {
            base: (h & 0xFF) as u8,
            mods: KeyMods::from_bits_truncate(h & 0xFF00),
        }
    }

    /// OR a prefix flag into this key.
    pub fn with_prefix(self, prefix: Prefix) -> Self {
        Self {
            base: self.base,
            mods: self.mods | prefix.flag(),
        }
    }

    /// True for a key that inserts itself when unbound.
    pub fn is_self_insert(self) -> bool {
        self.mods.is_empty() && (0x20..0x7F).contains(&self.base)
            || self.mods.is_empty() && self.base >= 0x80
    }
}

/// The return key.
pub const RTN_KEY: ExtKey = ExtKey {
    base: b'M',
    mods: KeyMods::CTRL,
};

/// The newline key (alternate return).
pub const ALT_RTN_KEY: ExtKey = ExtKey {
    base: b'J',
    mods: KeyMods::CTRL,
};

/// Prefix classes beyond the plain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Meta,
    /// `C-x`
    Pref1,
    /// `C-c`
    Pref2,
    /// `C-h`
    Pref3,
}

impl Prefix {
    pub fn flag(self) -> KeyMods {
        match self {
            Self::Meta => KeyMods::META,
            Self::Pref1 => KeyMods::PREF1,
            Self::Pref2 => KeyMods::PREF2,
            Self::Pref3 => KeyMods::PREF3,
        }
    }
}

/// Opaque index into the session command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CmdId(pub u16);

/// What a key is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    Command(CmdId),
    Macro(BufferId),
    Prefix(Prefix),
}

/// Slots per prefix vector: 128 ordinal characters, 94 function keys,
/// S-TAB, 94 shifted function keys.
pub const NKEY_VECT: usize = 128 + 94 + 1 + 94;

/// Fold an extended key onto its slot within a prefix vector. Control keys
/// collapse onto their control character; function keys pack above 127.
/// Returns `None` for keys that cannot be bound (e.g. high-bit bytes).
fn slot(ek: ExtKey) -> Option<usize> {
    let mods = ek.mods;
    // Special cases first.
    if mods.contains(KeyMods::CTRL) && ek.base == b' ' {
        return Some(0); // the null character
    }
    if mods.contains(KeyMods::SHIFT | KeyMods::CTRL) && ek.base.eq_ignore_ascii_case(&b'I') {
        return Some(128 + 94); // S-TAB
    }
    if mods.contains(KeyMods::SHIFT) && !mods.contains(KeyMods::FUNC) {
        // Shift is only meaningful on TAB and function keys.
        return None;
    }
    let c = ek.base;
    if mods.contains(KeyMods::CTRL) {
        let folded = c.to_ascii_uppercase() ^ 0x40;
        return (folded < 128).then_some(folded as usize);
    }
    if mods.contains(KeyMods::FUNC) {
        if !(b'!'..=b'~').contains(&c) {
            return None;
        }
        let base = if mods.contains(KeyMods::SHIFT) {
            128 + 94 + 1
        } else {
            128
        };
        return Some(base + (c - b'!') as usize);
    }
    (c < 128).then_some(c as usize)
}

fn vector_index(mods: KeyMods) -> usize {
    match mods & KeyMods::prefix_mask() {
        m if m == KeyMods::META => 1,
        m if m == KeyMods::PREF1 => 2,
        m if m == KeyMods::PREF2 => 3,
        m if m.is_empty() => 0,
        _ => 4,
    }
}

/// The session binding table.
pub struct BindTable {
    vects: Vec<Vec<Option<BindTarget>>>,
}

impl Default for BindTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BindTable {
    pub fn new() -> Self {
        Self {
            vects: (0..5).map(|_| vec![None; NKEY_VECT]).collect(),
        }
    }

    /// O(1) lookup.
    pub fn get(&self, ek: ExtKey) -> Option<BindTarget> {
        let s = slot(ek)?;
        self.vects[vector_index(ek.mods)][s]
    }

    /// Bind a key, replacing any previous target.
    pub fn bind(&mut self, ek: ExtKey, target: BindTarget) -> EdResult<()> {
        let s = slot(ek).ok_or_else(|| {
            EdError::failure(format!("Key {} cannot be bound", ek))
        })?;
        self.vects[vector_index(ek.mods)][s] = Some(target);
        trace!(target: "input.bind", key = %ek, "key_bound");
        Ok(())
    }

    /// Remove a binding; reports whether one existed.
    pub fn unbind(&mut self, ek: ExtKey) -> bool {
        match slot(ek) {
            Some(s) => self.vects[vector_index(ek.mods)][s].take().is_some(),
            None => false,
        }
    }

    /// First key bound to the given target, for listings and the core-key
    /// cache.
    pub fn key_of(&self, target: BindTarget) -> Option<ExtKey> {
        for (v, vect) in self.vects.iter().enumerate() {
            for (s, t) in vect.iter().enumerate() {
                if *t == Some(target) {
                    return Some(unslot(v, s));
                }
            }
        }
        None
    }

    /// All bindings as (key, target) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ExtKey, BindTarget)> + '_ {
        self.vects.iter().enumerate().flat_map(|(v, vect)| {
            vect.iter()
                .enumerate()
                .filter_map(move |(s, t)| t.map(|t| (unslot(v, s), t)))
        })
    }
}

/// Inverse of the slot mapping, for iteration and display.
fn unslot(vect: usize, s: usize) -> ExtKey {
    let mut mods = match vect {
        1 => KeyMods::META,
        2 => KeyMods::PREF1,
        3 => KeyMods::PREF2,
        4 => KeyMods::PREF3,
        _ => KeyMods::empty(),
    };
    let base;
    if s == 0 {
        mods |= KeyMods::CTRL;
        base = b' ';
    } else if s < 0x20 {
        mods |= KeyMods::CTRL;
        base = (s as u8) ^ 0x40;
    } else if s == 0x7F {
        mods |= KeyMods::CTRL;
        base = b'?';
    } else if s < 128 {
        base = s as u8;
    } else if s < 128 + 94 {
        mods |= KeyMods::FUNC;
        base = b'!' + (s - 128) as u8;
    } else if s == 128 + 94 {
        mods |= KeyMods::SHIFT | KeyMods::CTRL;
        base = b'I';
    } else {
        mods |= KeyMods::FUNC | KeyMods::SHIFT;
        base = b'!' + (s - (128 + 94 + 1)) as u8;
    }
    ExtKey { base, mods }
}

// --- key literal grammar -----------------------------------------------------

const LITERALS: &[(&str, u8, u16)] = &[
    ("SPC", b' ', 0),
    ("TAB", b'I', KeyMods::CTRL.bits()),
    ("ESC", b'[', KeyMods::CTRL.bits()),
    ("RTN", b'M', KeyMods::CTRL.bits()),
    ("DEL", b'?', KeyMods::CTRL.bits()),
];

impl fmt::Display for ExtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mods.contains(KeyMods::PREF1) {
            write!(f, "C-x ")?;
        } else if self.mods.contains(KeyMods::PREF2) {
            write!(f, "C-c ")?;
        } else if self.mods.contains(KeyMods::PREF3) {
            write!(f, "C-h ")?;
        } else if self.mods.contains(KeyMods::META) {
            write!(f, "M-")?;
        }
        if self.mods.contains(KeyMods::SHIFT) {
            write!(f, "S-")?;
        }
        if self.mods.contains(KeyMods::FUNC) {
            return write!(f, "FN{}", self.base as char);
        }
        if self.mods.contains(KeyMods::CTRL) {
            for (name, base, m) in LITERALS {
                if *m == KeyMods::CTRL.bits() && *base == self.base.to_ascii_uppercase() {
                    return write!(f, "{}", name);
                }
            }
            if self.base == b' ' {
                return write!(f, "C-SPC");
            }
            return write!(f, "C-{}", (self.base as char).to_ascii_lowercase());
        }
        if self.base == b' ' {
            write!(f, "SPC")
        } else {
            write!(f, "{}", self.base as char)
        }
    }
}

/// Parse one key literal: optional prefixes `C-` (or `^`), `M-`, `S-`, `FN`,
/// then a literal name or single character. Case-insensitive on prefixes and
/// literal names; rejects combinations that cannot denote one input event.
pub fn parse_key(text: &str) -> EdResult<ExtKey> {
    let mut mods = KeyMods::empty();
    let mut rest = text;
    loop {
        let upper: String = rest.chars().take(3).collect::<String>().to_ascii_uppercase();
        if upper.starts_with("C-") {
            if mods.contains(KeyMods::CTRL) {
                return Err(bad_key(text));
            }
            mods |= KeyMods::CTRL;
            rest = &rest[2..];
        } else if let Some(stripped) = rest.strip_prefix('^') {
            if mods.contains(KeyMods::CTRL) || stripped.is_empty() {
                return Err(bad_key(text));
            }
            mods |= KeyMods::CTRL;
            rest = stripped;
        } else if upper.starts_with("M-") {
            if mods.contains(KeyMods::META) {
                return Err(bad_key(text));
            }
            mods |= KeyMods::META;
            rest = &rest[2..];
        } else if upper.starts_with("S-") {
            if mods.contains(KeyMods::SHIFT) {
                return Err(bad_key(text));
            }
            mods |= KeyMods::SHIFT;
            rest = &rest[2..];
        } else if upper.starts_with("FN") && rest.len() == 3 {
            mods |= KeyMods::FUNC;
            rest = &rest[2..];
            break;
        } else {
            break;
        }
    }
    let upper = rest.to_ascii_uppercase();
    for (name, base, m) in LITERALS {
        if upper == *name {
            mods |= KeyMods::from_bits_truncate(*m);
            return finish_key(text, *base, mods);
        }
    }
    let mut chars = rest.chars();
    let c = chars.next().ok_or_else(|| bad_key(text))?;
    if chars.next().is_some() || !c.is_ascii() {
        return Err(bad_key(text));
    }
    let base = if mods.contains(KeyMods::CTRL) {
        (c as u8).to_ascii_uppercase()
    } else {
        c as u8
    };
    finish_key(text, base, mods)
}

fn finish_key(text: &str, base: u8, mods: KeyMods) -> EdResult<ExtKey> {
    // Shift denotes a distinct event only on TAB and function keys.
    if mods.contains(KeyMods::SHIFT)
        && !mods.contains(KeyMods::FUNC)
        && !(mods.contains(KeyMods::CTRL) && base.eq_ignore_ascii_case(&b'I'))
    {
        return Err(bad_key(text));
    }
    if mods.contains(KeyMods::CTRL) && mods.contains(KeyMods::FUNC) {
        return Err(bad_key(text));
    }
    Ok(ExtKey { base, mods })
}

fn bad_key(text: &str) -> EdError {
    EdError::failure(format!("\"{}\" is not a valid key literal", text))
}

/// Parse a one- or two-key sequence ("C-x C-f"); the session resolves
/// whether the first key is bound as a prefix.
pub fn parse_key_seq(text: &str) -> EdResult<Vec<ExtKey>> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    match parts.len() {
        1 => Ok(vec![parse_key(parts[0])?]),
        2 => Ok(vec![parse_key(parts[0])?, parse_key(parts[1])?]),
        _ => Err(EdError::failure(format!(
            "\"{}\" is not a valid key sequence",
            text
        ))),
    }
}

// --- terminal event normalization -------------------------------------------

/// Normalize a terminal keystroke into an extended key. C0 controls and DEL
/// fold into `Ctrl` form; the Alt modifier becomes `Meta`.
pub fn encode_term(input: TermInput) -> Option<ExtKey> {
    let mut mods = KeyMods::empty();
    if input.alt {
        mods |= KeyMods::META;
    }
    let (base, extra) = match input.key {
        TermKey::Char(c) => {
            let b = if (c as u32) < 0x100 { c as u32 as u8 } else { return None };
            if input.ctrl {
                (b.to_ascii_uppercase(), KeyMods::CTRL)
            } else if b < 0x20 {
                (b ^ 0x40, KeyMods::CTRL)
            } else if b == 0x7F {
                (b'?', KeyMods::CTRL)
            } else {
                (b, KeyMods::empty())
            }
        }
        TermKey::Enter => (b'M', KeyMods::CTRL),
        TermKey::Tab => {
            let shift = if input.shift { KeyMods::SHIFT } else { KeyMods::empty() };
            (b'I', KeyMods::CTRL | shift)
        }
        TermKey::Esc => (b'[', KeyMods::CTRL),
        TermKey::Backspace => (b'?', KeyMods::CTRL),
        TermKey::Delete => (b'3', KeyMods::FUNC),
        TermKey::Up => (b'A', KeyMods::FUNC),
        TermKey::Down => (b'B', KeyMods::FUNC),
        TermKey::Right => (b'C', KeyMods::FUNC),
        TermKey::Left => (b'D', KeyMods::FUNC),
        TermKey::Home => (b'H', KeyMods::FUNC),
        TermKey::End => (b'F', KeyMods::FUNC),
        TermKey::PageUp => (b'5', KeyMods::FUNC),
        TermKey::PageDown => (b'6', KeyMods::FUNC),
        TermKey::Insert => (b'2', KeyMods::FUNC),
        TermKey::F(n) => {
            let base = match n {
                1..=9 => b'0' + n,
                10 => b'a',
                11 => b'b',
                _ => b'c',
            };
            (base, KeyMods::FUNC)
        }
    };
    mods |= extra;
    if input.shift && extra.contains(KeyMods::FUNC) {
        mods |= KeyMods::SHIFT;
    }
    Some(ExtKey { base, mods })
}

// --- core-key cache ----------------------------------------------------------

/// Bindings the main loop consults on every keystroke, cached so it never
/// searches the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreKeys {
    pub abort: ExtKey,
    pub univ_arg: ExtKey,
    pub neg_arg: ExtKey,
    pub quote: ExtKey,
}

impl Default for CoreKeys {
    fn default() -> Self {
        Self {
            abort: ExtKey::ctrl(b'G'),
            univ_arg: ExtKey::ctrl(b'U'),
            neg_arg: ExtKey::ctrl(b'_'),
            quote: ExtKey::ctrl(b'Q'),
        }
    }
}

// --- input assembly ----------------------------------------------------------

/// The unget buffer plus the keyboard macro, shared by every key consumer.
#[derive(Debug, Default)]
pub struct InputState {
    unget: Option<ExtKey>,
    pub kbd: KbdMacro,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one key back for a rescan.
    pub fn unget(&mut self, key: ExtKey) {
        debug_assert!(self.unget.is_none(), "unget buffer is one deep");
        self.unget = Some(key);
    }

    /// Next key: the unget buffer first, then keyboard-macro playback, then
    /// the terminal. A key read while recording is captured.
    pub fn next_key<F>(&mut self, mut read_raw: F) -> EdResult<ExtKey>
    where
        F: FnMut() -> EdResult<ExtKey>,
    {
        if let Some(k) = self.unget.take() {
            return Ok(k);
        }
        if let Some(k) = self.kbd.next_play_key() {
            return Ok(k);
        }
        let k = read_raw()?;
        self.kbd.record(k);
        Ok(k)
    }
}
