//! Configuration loading and environment resolution.
//!
//! `ember.toml` is looked for in the working directory first, then the
//! platform config directory. Unknown fields are tolerated so older configs
//! keep working across releases; a file that fails to parse falls back to
//! defaults rather than aborting startup. Environment gives the script
//! search path (`EMBERPATH`), the shell (`SHELL`), and the home directory
//! used for `~` expansion and the user startup file.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};
use tracing::{info, warn};

/// Script file extension.
pub const SCRIPT_EXT: &str = "em";

/// Site startup file, searched on the script path.
pub const SITE_STARTUP: &str = "site.em";

/// User startup file, searched in `$HOME` then on the script path.
pub const USER_STARTUP: &str = ".ember.em";

/// Compiled-in default script search path.
pub const DEFAULT_SCRIPT_PATH: &str = "/usr/local/lib/ember:/usr/lib/ember";

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Vertical reframe jump, percent of window height; 0 scrolls smoothly.
    #[serde(default)]
    pub vjump: u16,
    /// Horizontal scroll jump, percent of terminal width.
    #[serde(default)]
    pub hjump: u16,
    /// Milliseconds to show a matched fence before restoring the cursor.
    #[serde(default = "DisplayConfig::default_fence_pause")]
    pub fence_pause_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            vjump: 0,
            hjump: 0,
            fence_pause_ms: DisplayConfig::default_fence_pause(),
        }
    }
}

impl DisplayConfig {
    const fn default_fence_pause() -> u64 {
        1000
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScriptConfig {
    /// Loop iteration bound enforced by the executor.
    #[serde(default = "ScriptConfig::default_loop_max")]
    pub loop_max: u32,
    /// Macro nesting bound.
    #[serde(default = "ScriptConfig::default_max_depth")]
    pub max_depth: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            loop_max: Self::default_loop_max(),
            max_depth: Self::default_max_depth(),
        }
    }
}

impl ScriptConfig {
    const fn default_loop_max() -> u32 {
        2500
    }
    const fn default_max_depth() -> usize {
        100
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RingConfig {
    #[serde(default = "RingConfig::default_kill")]
    pub kill_size: usize,
    #[serde(default = "RingConfig::default_search")]
    pub search_size: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            kill_size: Self::default_kill(),
            search_size: Self::default_search(),
        }
    }
}

impl RingConfig {
    const fn default_kill() -> usize {
        40
    }
    const fn default_search() -> usize {
        40
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub rings: RingConfig,
}

/// Parsed configuration plus resolved environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    /// Colon-separated script search directories.
    pub script_path: Vec<PathBuf>,
    pub shell: PathBuf,
    pub home: Option<PathBuf>,
}

/// Best-effort config path: working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("ember.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("ember").join("ember.toml");
    }
    PathBuf::from("ember.toml")
}

/// Load the config file (or defaults) and resolve the environment.
/// `path_override` substitutes for `EMBERPATH` (the `-X` switch).
pub fn load(path: Option<PathBuf>, path_override: Option<&str>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let file = match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                file
            }
            Err(err) => {
                warn!(target: "config", path = %path.display(), %err, "config_parse_failed");
                ConfigFile::default()
            }
        },
        Err(_) => ConfigFile::default(),
    };
    let home = env::var_os("HOME").map(PathBuf::from).or_else(dirs::home_dir);
    let raw_path = match path_override {
        Some(p) => p.to_string(),
        None => env::var("EMBERPATH").unwrap_or_else(|_| DEFAULT_SCRIPT_PATH.to_string()),
    };
    let script_path = raw_path
        .split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    let shell = env::var_os("SHELL")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/bin/sh"));
    Ok(Config {
        file,
        script_path,
        shell,
        home,
    })
}

impl Config {
    /// Expand a leading `~` to the home directory.
    pub fn expand_tilde(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = &self.home {
                return home.join(rest);
            }
        } else if path == "~" {
            if let Some(home) = &self.home {
                return home.clone();
            }
        }
        PathBuf::from(path)
    }

    /// Locate a script on the search path. A name with a slash is used as
    /// given; otherwise each path directory is tried, with the script
    /// extension appended when missing.
    pub fn find_script(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            let p = self.expand_tilde(name);
            return p.exists().then_some(p);
        }
        let with_ext = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}.{}", name, SCRIPT_EXT)
        };
        for dir in &self.script_path {
            let candidate = dir.join(&with_ext);
            if candidate.exists() {
                return Some(candidate);
            }
            let plain = dir.join(name);
            if plain.exists() {
                return Some(plain);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing_file() {
        let cfg = load(Some(PathBuf::from("__absent__.toml")), Some("")).unwrap();
        assert_eq!(cfg.file.display.vjump, 0);
        assert_eq!(cfg.file.script.loop_max, 2500);
        assert_eq!(cfg.file.rings.kill_size, 40);
    }

    #[test]
    fn parses_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[display]\nvjump = 25\nhjump = 10\n[script]\nloop_max = 99\n[rings]\nkill_size = 5\n",
        )
        .unwrap();
        let cfg = load(Some(tmp.path().to_path_buf()), Some("")).unwrap();
        assert_eq!(cfg.file.display.vjump, 25);
        assert_eq!(cfg.file.display.hjump, 10);
        assert_eq!(cfg.file.script.loop_max, 99);
        assert_eq!(cfg.file.rings.kill_size, 5);
    }

    #[test]
    fn bad_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not [valid toml").unwrap();
        let cfg = load(Some(tmp.path().to_path_buf()), Some("")).unwrap();
        assert_eq!(cfg.file.script.max_depth, 100);
    }

    #[test]
    fn path_override_wins() {
        let cfg = load(Some(PathBuf::from("__absent__.toml")), Some("/a:/b")).unwrap();
        assert_eq!(
            cfg.script_path,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn find_script_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("init.em"), "1").unwrap();
        let mut cfg = load(Some(PathBuf::from("__absent__.toml")), Some("")).unwrap();
        cfg.script_path = vec![dir.path().to_path_buf()];
        assert_eq!(
            cfg.find_script("init"),
            Some(dir.path().join("init.em"))
        );
        assert_eq!(cfg.find_script("missing"), None);
    }

    #[test]
    fn tilde_expansion() {
        let mut cfg = Config::default();
        cfg.home = Some(PathBuf::from("/home/me"));
        assert_eq!(cfg.expand_tilde("~/x"), PathBuf::from("/home/me/x"));
        assert_eq!(cfg.expand_tilde("/abs"), PathBuf::from("/abs"));
    }
}
