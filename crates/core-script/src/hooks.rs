//! Hook table: well-known events bound to user macros.
//!
//! The session invokes a hook by building its declared argument tuple and
//! executing the target macro. A `false` return aborts the triggering
//! command; a hard failure clears the target (the hook disables itself) and
//! an explanatory message is appended by the caller.

use core_status::{EdError, EdResult};

/// The hook kinds, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    ChgDir,
    CreateBuf,
    EnterBuf,
    ExitBuf,
    Filename,
    Help,
    Mode,
    PostKey,
    PreKey,
    Read,
    Wrap,
    Write,
}

pub const HOOK_COUNT: usize = 12;

const NAMES: [(&str, HookKind); HOOK_COUNT] = [
    ("chgDir", HookKind::ChgDir),
    ("createBuf", HookKind::CreateBuf),
    ("enterBuf", HookKind::EnterBuf),
    ("exitBuf", HookKind::ExitBuf),
    ("filename", HookKind::Filename),
    ("help", HookKind::Help),
    ("mode", HookKind::Mode),
    ("postKey", HookKind::PostKey),
    ("preKey", HookKind::PreKey),
    ("read", HookKind::Read),
    ("wrap", HookKind::Wrap),
    ("write", HookKind::Write),
];

impl HookKind {
    pub fn from_name(name: &str) -> EdResult<Self> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, k)| *k)
            .ok_or_else(|| EdError::failure(format!("No such hook \"{}\"", name)))
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, k)| *k == self)
            .map(|(n, _)| *n)
            .expect("every kind is named")
    }

    fn index(self) -> usize {
        NAMES
            .iter()
            .position(|(_, k)| *k == self)
            .expect("every kind is listed")
    }
}

/// Hook kind to target-macro mapping.
#[derive(Debug, Default)]
pub struct HookTable {
    targets: [Option<String>; HOOK_COUNT],
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: HookKind, target: Option<String>) {
        self.targets[kind.index()] = target;
    }

    pub fn get(&self, kind: HookKind) -> Option<&str> {
        self.targets[kind.index()].as_deref()
    }

    /// Disable a hook after a hard failure; returns the cleared target for
    /// the caller's explanatory message.
    pub fn disable(&mut self, kind: HookKind) -> Option<String> {
        self.targets[kind.index()].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HookKind, Option<&str>)> {
        NAMES
            .iter()
            .map(move |(_, k)| (*k, self.targets[k.index()].as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_round_trip() {
        for (name, kind) in NAMES {
            assert_eq!(HookKind::from_name(name).unwrap(), kind);
            assert_eq!(kind.name(), name);
        }
        assert_eq!(HookKind::from_name("PREKEY").unwrap(), HookKind::PreKey);
        assert!(HookKind::from_name("bogus").is_err());
    }

    #[test]
    fn set_get_disable() {
        let mut t = HookTable::new();
        t.set(HookKind::Read, Some("@onRead".into()));
        assert_eq!(t.get(HookKind::Read), Some("@onRead"));
        let cleared = t.disable(HookKind::Read);
        assert_eq!(cleared.as_deref(), Some("@onRead"));
        assert_eq!(t.get(HookKind::Read), None);
    }
}
