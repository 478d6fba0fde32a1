//! File reading and writing.
//!
//! Files are byte streams. The line delimiter is detected on read (the
//! first of NL, CR-LF, CR seen wins) unless an override is given, recorded
//! on the buffer, and reused on write. Writes go through a randomized
//! sibling file renamed into place, restoring permissions; a `.bak` backup
//! is kept only when one does not already exist.

use crate::Session;
use core_status::{EdError, EdResult};
use core_text::{BufFlags, BufferId, Face};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Backup file extension.
pub const BACKUP_EXT: &str = "bak";

/// A recorded line delimiter.
pub fn delim_name(delim: &[u8]) -> &'static str {
    match delim {
        b"\r\n" => "CR-LF",
        b"\r" => "CR",
        _ => "NL",
    }
}

/// Detect the first line delimiter in raw file bytes.
pub fn detect_delim(bytes: &[u8]) -> Option<Vec<u8>> {
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            return Some(b"\n".to_vec());
        }
        if b == b'\r' {
            return Some(if bytes.get(i + 1) == Some(&b'\n') {
                b"\r\n".to_vec()
            } else {
                b"\r".to_vec()
            });
        }
    }
    None
}

/// Split raw bytes on a delimiter, yielding newline-normalized text.
pub fn normalize(bytes: &[u8], delim: &[u8]) -> Vec<u8> {
    if delim == b"\n" {
        return bytes.to_vec();
    }
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(delim) {
            out.push(b'\n');
            i += delim.len();
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

impl Session {
    /// Read a file into a buffer, detecting (or honoring the override for)
    /// its line delimiter. Fires the read hook.
    pub fn read_file_into(
        &mut self,
        id: BufferId,
        path: &Path,
        delim_override: Option<&[u8]>,
    ) -> EdResult<usize> {
        let bytes = fs::read(path)
            .map_err(|e| EdError::failure(format!("Cannot read \"{}\": {}", path.display(), e)))?;
        let delim = match delim_override {
            Some(d) => d.to_vec(),
            None => detect_delim(&bytes).unwrap_or_else(|| b"\n".to_vec()),
        };
        let text = normalize(&bytes, &delim);
        let b = self.bufs.buf_mut(id);
        b.set_text(&text);
        b.delim = Some(delim);
        b.filename = Some(path.to_path_buf());
        b.flags.insert(BufFlags::ACTIVE);
        b.flags.remove(BufFlags::CHANGED);
        let lines = b.line_count();
        // A fresh read resets every window showing the buffer.
        let first = b.first_line();
        for s in self.layout.screens_mut() {
            for w in &mut s.windows {
                if w.buf == id {
                    w.face = Face::at(first);
                    w.dirty(core_layout::WinFlags::HARD | core_layout::WinFlags::MODE);
                }
            }
        }
        info!(target: "session.file", path = %path.display(), lines, "file_read");
        self.run_hook(core_script::HookKind::Read, vec![])?;
        Ok(lines)
    }

    /// Read standard input into a buffer (the `-` launcher argument).
    pub fn read_stdin_into(&mut self, id: BufferId) -> EdResult<usize> {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| EdError::failure(format!("Cannot read standard input: {}", e)))?;
        let delim = detect_delim(&bytes).unwrap_or_else(|| b"\n".to_vec());
        let text = normalize(&bytes, &delim);
        let b = self.bufs.buf_mut(id);
        b.set_text(&text);
        b.delim = Some(delim);
        b.flags.insert(BufFlags::ACTIVE);
        b.flags.remove(BufFlags::CHANGED);
        Ok(b.line_count())
    }

    /// Write a buffer to its file (or `path`), safe-save style: write a
    /// randomized sibling, restore permissions, rename into place. Fires the
    /// write hook first.
    pub fn write_buffer(&mut self, id: BufferId, path: Option<&Path>) -> EdResult<usize> {
        self.run_hook(core_script::HookKind::Write, vec![])?;
        let (target, delim, bytes) = {
            let b = self.bufs.buf(id);
            let target = match path {
                Some(p) => p.to_path_buf(),
                None => b.filename.clone().ok_or_else(|| {
                    EdError::failure(format!("No file name for buffer \"{}\"", b.name))
                })?,
            };
            let delim = b.delim.clone().unwrap_or_else(|| b"\n".to_vec());
            (target, delim, b.to_bytes())
        };
        let out = if delim == b"\n" {
            bytes
        } else {
            let mut out = Vec::with_capacity(bytes.len());
            for &byte in &bytes {
                if byte == b'\n' {
                    out.extend_from_slice(&delim);
                } else {
                    out.push(byte);
                }
            }
            out
        };

        // Keep a backup only if one does not already exist.
        let backup = target.with_extension(BACKUP_EXT);
        if target.exists() && !backup.exists() {
            let _ = fs::copy(&target, &backup);
            debug!(target: "session.file", backup = %backup.display(), "backup_written");
        }

        let sibling = randomized_sibling(&target);
        fs::write(&sibling, &out)
            .map_err(|e| EdError::failure(format!("Cannot write \"{}\": {}", sibling.display(), e)))?;
        if let Ok(meta) = fs::metadata(&target) {
            let _ = fs::set_permissions(&sibling, meta.permissions());
        }
        fs::rename(&sibling, &target)
            .map_err(|e| EdError::failure(format!("Cannot rename to \"{}\": {}", target.display(), e)))?;

        let b = self.bufs.buf_mut(id);
        b.filename = Some(target.clone());
        b.flags.remove(BufFlags::CHANGED);
        let lines = b.line_count();
        info!(target: "session.file", path = %target.display(), lines, "file_written");
        Ok(lines)
    }
}

/// A sibling path with a randomized suffix, in the same directory so the
/// final rename stays on one filesystem.
fn randomized_sibling(target: &Path) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    target.with_file_name(format!("{}.{}{:x}~", name, pid, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn delim_detection() {
        assert_eq!(detect_delim(b"a\nb"), Some(b"\n".to_vec()));
        assert_eq!(detect_delim(b"a\r\nb"), Some(b"\r\n".to_vec()));
        assert_eq!(detect_delim(b"a\rb"), Some(b"\r".to_vec()));
        assert_eq!(detect_delim(b"plain"), None);
    }

    #[test]
    fn normalize_crlf() {
        assert_eq!(normalize(b"a\r\nb\r\n", b"\r\n"), b"a\nb\n");
        assert_eq!(normalize(b"a\rb", b"\r"), b"a\nb");
    }

    #[test]
    fn sibling_is_in_same_dir() {
        let p = randomized_sibling(Path::new("/tmp/file.txt"));
        assert_eq!(p.parent(), Some(Path::new("/tmp")));
        assert!(p.to_string_lossy().ends_with('~'));
    }
}
