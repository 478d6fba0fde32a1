//! Mode table: named on/off attributes with global or buffer scope, and
//! mutually exclusive mode groups.
//!
//! Built-in modes are seeded at table construction and cannot be deleted;
//! user modes and groups may be deleted once nothing uses them. A group's
//! members always share one scope, and at most one member of a group is
//! enabled at a time: enabling a mode first disables its enabled sibling.
//!
//! For buffer-scope modes the table's `ENABLED` bit is only the default for
//! new buffers; actual membership lives with each buffer.

use core_status::{EdError, EdResult};
use tracing::debug;

bitflags::bitflags! {
    /// Mode attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u16 {
        /// User-created (deletable when unused).
        const USER = 1 << 0;
        /// Session scope; clear means buffer scope.
        const GLOBAL = 1 << 1;
        /// Scope may not be changed.
        const LOCKED = 1 << 2;
        /// Not shown by mode listings.
        const HIDDEN = 1 << 3;
        /// Shown on the mode line when enabled.
        const IN_LINE = 1 << 4;
        /// Enabled (global modes), or enabled-by-default (buffer modes).
        const ENABLED = 1 << 5;
    }
}

/// Stable handle into the mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeId(pub u32);

/// Stable handle to a mode group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u32);

#[derive(Debug, Clone)]
pub struct ModeSpec {
    pub name: String,
    pub desc: Option<String>,
    pub flags: ModeFlags,
    pub group: Option<GroupId>,
}

#[derive(Debug, Clone)]
pub struct ModeGroup {
    pub name: String,
    pub desc: Option<String>,
    pub user: bool,
    pub use_count: u32,
}

/// Built-in mode names. Seeded into every table; referenced by the editor
/// core by cached id.
pub mod builtin {
    /// Case-sensitive searching.
    pub const EXACT: &str = "Exact";
    /// Patterns are regular expressions.
    pub const REGEXP: &str = "Regexp";
    /// Horizontal scrolling moves the whole screen, not one window.
    pub const HSCRL: &str = "HorzScroll";
    /// Buffer is read-only.
    pub const RDONLY: &str = "ReadOnly";
    /// Overwrite instead of insert.
    pub const REPL: &str = "Replace";
    /// Show the result message on the message line.
    pub const MSGDISP: &str = "RtnMsg";
    /// Wrap long lines while typing.
    pub const WRAP: &str = "Wrap";
    /// Automatic save after a threshold of keystrokes.
    pub const ASAVE: &str = "ASave";
}

/// The session mode table: modes and groups addressed by stable ids.
#[derive(Debug)]
pub struct ModeTable {
    modes: Vec<ModeSpec>,
    groups: Vec<ModeGroup>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    /// Build a table seeded with the built-in modes.
    pub fn new() -> Self {
        let mut table = Self {
            modes: Vec::new(),
            groups: Vec::new(),
        };
        table.seed(builtin::EXACT, "Case-sensitive searches", ModeFlags::GLOBAL | ModeFlags::ENABLED);
        table.seed(builtin::REGEXP, "Regular-expression searches", ModeFlags::GLOBAL);
        table.seed(builtin::HSCRL, "Horizontal scrolling moves the whole screen", ModeFlags::GLOBAL | ModeFlags::ENABLED);
        table.seed(builtin::MSGDISP, "Display return messages", ModeFlags::GLOBAL | ModeFlags::ENABLED | ModeFlags::HIDDEN);
        table.seed(builtin::RDONLY, "Buffer may not be modified", ModeFlags::LOCKED | ModeFlags::IN_LINE);
        table.seed(builtin::REPL, "Typing replaces instead of inserting", ModeFlags::IN_LINE);
        table.seed(builtin::WRAP, "Wrap long lines while typing", ModeFlags::IN_LINE);
        table.seed(builtin::ASAVE, "Automatic file save", ModeFlags::GLOBAL);
        table
    }

    fn seed(&mut self, name: &str, desc: &str, flags: ModeFlags) {
        self.modes.push(ModeSpec {
            name: name.to_string(),
            desc: Some(desc.to_string()),
            flags,
            group: None,
        });
    }

    pub fn get(&self, id: ModeId) -> Option<&ModeSpec> {
        self.modes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ModeId) -> Option<&mut ModeSpec> {
        self.modes.get_mut(id.0 as usize)
    }

    pub fn group(&self, id: GroupId) -> Option<&ModeGroup> {
        self.groups.get(id.0 as usize)
    }

    /// Case-insensitive name lookup.
    pub fn find(&self, name: &str) -> Option<ModeId> {
        self.modes
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
            .map(|i| ModeId(i as u32))
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.groups
            .iter()
            .position(|g| g.name.eq_ignore_ascii_case(name))
            .map(|i| GroupId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModeId, &ModeSpec)> {
        self.modes
            .iter()
            .enumerate()
            .map(|(i, m)| (ModeId(i as u32), m))
    }

    /// Create a user mode. Fails on a duplicate name.
    pub fn create(&mut self, name: &str, desc: Option<&str>, global: bool) -> EdResult<ModeId> {
        if name.is_empty() {
            return Err(EdError::failure("Mode name cannot be empty"));
        }
        if self.find(name).is_some() {
            return Err(EdError::failure(format!("Mode \"{}\" already exists", name)));
        }
        let mut flags = ModeFlags::USER;
        if global {
            flags |= ModeFlags::GLOBAL;
        }
        self.modes.push(ModeSpec {
            name: name.to_string(),
            desc: desc.map(str::to_string),
            flags,
            group: None,
        });
        let id = ModeId((self.modes.len() - 1) as u32);
        debug!(target: "modes", name, global, "mode_created");
        Ok(id)
    }

    /// Delete a user mode. Built-in modes are permanent.
    pub fn delete(&mut self, id: ModeId) -> EdResult<()> {
        let spec = self
            .get(id)
            .ok_or_else(|| EdError::failure("No such mode"))?;
        if !spec.flags.contains(ModeFlags::USER) {
            return Err(EdError::failure(format!(
                "Cannot delete built-in mode \"{}\"",
                spec.name
            )));
        }
        if let Some(gid) = spec.group {
            if let Some(g) = self.groups.get_mut(gid.0 as usize) {
                g.use_count = g.use_count.saturating_sub(1);
            }
        }
        // Slots are never reused; mark the entry dead by clearing the name so
        // ids held elsewhere (buffers) stay stable and simply stop matching.
        let spec = self.get_mut(id).expect("checked above");
        spec.name.clear();
        spec.flags = ModeFlags::USER | ModeFlags::HIDDEN;
        spec.group = None;
        Ok(())
    }

    /// Create a user group.
    pub fn create_group(&mut self, name: &str, desc: Option<&str>) -> EdResult<GroupId> {
        if self.find_group(name).is_some() {
            return Err(EdError::failure(format!(
                "Mode group \"{}\" already exists",
                name
            )));
        }
        self.groups.push(ModeGroup {
            name: name.to_string(),
            desc: desc.map(str::to_string),
            user: true,
            use_count: 0,
        });
        Ok(GroupId((self.groups.len() - 1) as u32))
    }

    /// Delete a user group; members must have been detached first.
    pub fn delete_group(&mut self, id: GroupId) -> EdResult<()> {
        let g = self
            .groups
            .get(id.0 as usize)
            .ok_or_else(|| EdError::failure("No such mode group"))?;
        if !g.user {
            return Err(EdError::failure(format!(
                "Cannot delete built-in mode group \"{}\"",
                g.name
            )));
        }
        if g.use_count > 0 {
            return Err(EdError::failure(format!(
                "Mode group \"{}\" is in use",
                g.name
            )));
        }
        let g = self.groups.get_mut(id.0 as usize).expect("checked above");
        g.name.clear();
        Ok(())
    }

    /// Attach a mode to a group. The group's members must share one scope.
    pub fn set_group(&mut self, mode: ModeId, group: Option<GroupId>) -> EdResult<()> {
        let scope_global = {
            let spec = self
                .get(mode)
                .ok_or_else(|| EdError::failure("No such mode"))?;
            spec.flags.contains(ModeFlags::GLOBAL)
        };
        if let Some(gid) = group {
            let mismatch = self.modes.iter().any(|m| {
                m.group == Some(gid) && m.flags.contains(ModeFlags::GLOBAL) != scope_global
            });
            if mismatch {
                return Err(EdError::failure(
                    "Modes in a group must all have the same scope",
                ));
            }
        }
        let old = self.get(mode).expect("checked above").group;
        if let Some(gid) = old {
            if let Some(g) = self.groups.get_mut(gid.0 as usize) {
                g.use_count = g.use_count.saturating_sub(1);
            }
        }
        if let Some(gid) = group {
            let g = self
                .groups
                .get_mut(gid.0 as usize)
                .ok_or_else(|| EdError::failure("No such mode group"))?;
            g.use_count += 1;
        }
        self.get_mut(mode).expect("checked above").group = group;
        Ok(())
    }

    /// Change a mode's scope. Locked modes refuse.
    pub fn set_scope(&mut self, mode: ModeId, global: bool) -> EdResult<()> {
        let spec = self
            .get_mut(mode)
            .ok_or_else(|| EdError::failure("No such mode"))?;
        if spec.flags.contains(ModeFlags::LOCKED) {
            return Err(EdError::failure(format!(
                "Scope of mode \"{}\" is locked",
                spec.name
            )));
        }
        spec.flags.set(ModeFlags::GLOBAL, global);
        Ok(())
    }

    /// Enable or disable a global mode, honoring group exclusivity. Returns
    /// the sibling that was disabled, if any.
    pub fn set_enabled(&mut self, mode: ModeId, on: bool) -> EdResult<Option<ModeId>> {
        let (group, name_ok) = {
            let spec = self
                .get(mode)
                .ok_or_else(|| EdError::failure("No such mode"))?;
            (spec.group, !spec.name.is_empty())
        };
        if !name_ok {
            return Err(EdError::failure("No such mode"));
        }
        let mut displaced = None;
        if on {
            if let Some(gid) = group {
                displaced = self.enabled_sibling(gid, mode);
                if let Some(sib) = displaced {
                    self.get_mut(sib)
                        .expect("sibling exists")
                        .flags
                        .remove(ModeFlags::ENABLED);
                    debug!(target: "modes", sibling = sib.0, "group_sibling_disabled");
                }
            }
        }
        self.get_mut(mode)
            .expect("checked above")
            .flags
            .set(ModeFlags::ENABLED, on);
        Ok(displaced)
    }

    /// The enabled member of `group` other than `except`, if any.
    pub fn enabled_sibling(&self, group: GroupId, except: ModeId) -> Option<ModeId> {
        self.modes.iter().enumerate().find_map(|(i, m)| {
            let id = ModeId(i as u32);
            (id != except && m.group == Some(group) && m.flags.contains(ModeFlags::ENABLED))
                .then_some(id)
        })
    }

    /// Is a global mode currently enabled?
    pub fn enabled(&self, id: ModeId) -> bool {
        self.get(id)
            .map(|m| m.flags.contains(ModeFlags::ENABLED))
            .unwrap_or(false)
    }

    /// Convenience: is the named global mode enabled?
    pub fn enabled_by_name(&self, name: &str) -> bool {
        self.find(name).map(|id| self.enabled(id)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_seeded() {
        let t = ModeTable::new();
        assert!(t.find(builtin::EXACT).is_some());
        assert!(t.enabled_by_name(builtin::EXACT));
        assert!(!t.enabled_by_name(builtin::REGEXP));
    }

    #[test]
    fn find_is_case_insensitive() {
        let t = ModeTable::new();
        assert_eq!(t.find("exact"), t.find("Exact"));
    }

    #[test]
    fn builtin_delete_refused() {
        let mut t = ModeTable::new();
        let id = t.find(builtin::EXACT).unwrap();
        assert!(t.delete(id).is_err());
    }

    #[test]
    fn locked_scope_refused() {
        let mut t = ModeTable::new();
        let id = t.find(builtin::RDONLY).unwrap();
        assert!(t.set_scope(id, true).is_err());
    }

    #[test]
    fn group_exclusivity() {
        let mut t = ModeTable::new();
        let g = t.create_group("Indent", None).unwrap();
        let a = t.create("Tabs", None, true).unwrap();
        let b = t.create("Spaces", None, true).unwrap();
        t.set_group(a, Some(g)).unwrap();
        t.set_group(b, Some(g)).unwrap();
        t.set_enabled(a, true).unwrap();
        let displaced = t.set_enabled(b, true).unwrap();
        assert_eq!(displaced, Some(a));
        assert!(!t.enabled(a));
        assert!(t.enabled(b));
        // Invariant: never two enabled members.
        let enabled = t
            .iter()
            .filter(|(_, m)| m.group == Some(g) && m.flags.contains(ModeFlags::ENABLED))
            .count();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn group_scope_must_match() {
        let mut t = ModeTable::new();
        let g = t.create_group("Mixed", None).unwrap();
        let a = t.create("GlobalOne", None, true).unwrap();
        let b = t.create("BufOne", None, false).unwrap();
        t.set_group(a, Some(g)).unwrap();
        assert!(t.set_group(b, Some(g)).is_err());
    }

    #[test]
    fn group_delete_requires_zero_use() {
        let mut t = ModeTable::new();
        let g = t.create_group("G", None).unwrap();
        let a = t.create("M", None, true).unwrap();
        t.set_group(a, Some(g)).unwrap();
        assert!(t.delete_group(g).is_err());
        t.set_group(a, None).unwrap();
        assert!(t.delete_group(g).is_ok());
    }

    #[test]
    fn deleted_mode_stops_matching() {
        let mut t = ModeTable::new();
        let id = t.create("Mine", None, true).unwrap();
        t.delete(id).unwrap();
        assert!(t.find("Mine").is_none());
        assert!(t.set_enabled(id, true).is_err());
    }
}
