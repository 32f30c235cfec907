/*!
 * Process Filters
 * Allow-list (never touch) and deny-list (always skip) membership
 *
 * Deny-list names go through a two-stage test: a small bloom filter rejects
 * most names outright, and an exact set confirms the rest.
 */

use super::snapshot::ProcessSnapshot;
use crate::core::errors::{ConfigError, Result};
use crate::core::types::Pid;
use ahash::{AHashSet, RandomState};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

pub const DEFAULT_DENY_NAMES: &[&str] = &[
    "system", "idle", "smss.exe", "csrss.exe", "wininit.exe", "winlogon.exe", "services.exe",
    "lsass.exe", "svchost.exe", "fontdrvhost.exe", "registry", "memcompression", "sihost.exe",
    "dwm.exe", "ctfmon.exe", "cmd.exe", "python.exe", "pythonw.exe", "conhost.exe", "taskmgr.exe",
    "taskhostw.exe", "runtimebroker.exe", "systemd", "init", "kthreadd", "xorg", "gnome-shell",
    "kwin_x11", "kwin_wayland", "pipewire", "pulseaudio", "dbus-daemon",
];

pub const DEFAULT_DENY_PATHS: &[&str] = &[
    "\\windows\\", "defender", "msmpeng.exe", "wuauclt.exe", "tiworker.exe",
];

const BLOOM_BITS: usize = 1024;

/// Two-hash bloom filter over lowercase names
#[derive(Debug, Clone)]
struct BloomFilter {
    bits: Vec<u64>,
    hashers: [RandomState; 2],
}

impl BloomFilter {
    fn new() -> Self {
        Self {
            bits: vec![0; BLOOM_BITS / 64],
            hashers: [
                RandomState::with_seeds(0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344),
                RandomState::with_seeds(0xa409_3822, 0x299f_31d0, 0x082e_fa98, 0xec4e_6c89),
            ],
        }
    }

    fn positions<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.hashers
            .iter()
            .map(move |h| (h.hash_one(name) as usize) % BLOOM_BITS)
    }

    fn insert(&mut self, name: &str) {
        let positions: Vec<usize> = self.positions(name).collect();
        for bit in positions {
            self.bits[bit / 64] |= 1 << (bit % 64);
        }
    }

    fn may_contain(&self, name: &str) -> bool {
        self.positions(name)
            .all(|bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
    }
}

/// Exact name set fronted by a bloom filter
#[derive(Debug, Clone)]
pub struct NameSet {
    bloom: BloomFilter,
    exact: AHashSet<String>,
}

impl NameSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            bloom: BloomFilter::new(),
            exact: AHashSet::new(),
        };
        for name in names {
            set.insert(name.as_ref());
        }
        set
    }

    pub fn insert(&mut self, name: &str) {
        let lower = name.trim().to_lowercase();
        if lower.is_empty() {
            return;
        }
        self.bloom.insert(&lower);
        self.exact.insert(lower);
    }

    /// `name` must already be lowercase
    pub fn contains(&self, name: &str) -> bool {
        self.bloom.may_contain(name) && self.exact.contains(name)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

/// List contents as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterLists {
    pub allow_names: Vec<String>,
    pub allow_paths: Vec<String>,
    pub deny_names: Vec<String>,
    pub deny_paths: Vec<String>,
}

impl FilterLists {
    /// Built-in deny-list, empty allow-list
    pub fn defaults() -> Self {
        Self {
            allow_names: Vec::new(),
            allow_paths: Vec::new(),
            deny_names: DEFAULT_DENY_NAMES.iter().map(|s| s.to_string()).collect(),
            deny_paths: DEFAULT_DENY_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for FilterLists {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Why a process is left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Not in the current snapshot
    Absent,
    Allowed,
    DeniedName,
    DeniedPath,
    SystemAccount,
    SystemSession,
}

/// Allow/deny decisions for snapshot entries
pub struct ProcessFilter {
    allow_names: RwLock<NameSet>,
    allow_paths: Vec<String>,
    deny_names: NameSet,
    deny_paths: Vec<String>,
}

impl ProcessFilter {
    pub fn new(lists: &FilterLists) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            allow_names: RwLock::new(NameSet::new(&lists.allow_names)),
            allow_paths: lower(&lists.allow_paths),
            deny_names: NameSet::new(&lists.deny_names),
            deny_paths: lower(&lists.deny_paths),
        }
    }

    /// Decide whether `pid` must be skipped; `None` means it may be optimized
    pub fn skip_reason(&self, pid: Pid, snapshot: &ProcessSnapshot) -> Option<SkipReason> {
        let Some(entry) = snapshot.get(pid) else {
            return Some(SkipReason::Absent);
        };
        let exe = entry.exe.as_deref().map(str::to_lowercase);

        if self.allow_names.read().contains(&entry.name)
            || exe
                .as_deref()
                .is_some_and(|exe| self.allow_paths.iter().any(|p| exe.contains(p.as_str())))
        {
            return Some(SkipReason::Allowed);
        }
        if self.deny_names.contains(&entry.name) {
            return Some(SkipReason::DeniedName);
        }
        if exe
            .as_deref()
            .is_some_and(|exe| self.deny_paths.iter().any(|p| exe.contains(p.as_str())))
        {
            return Some(SkipReason::DeniedPath);
        }
        if entry.system_account {
            return Some(SkipReason::SystemAccount);
        }
        if entry.session == 0 {
            return Some(SkipReason::SystemSession);
        }
        None
    }

    pub fn is_skipped(&self, pid: Pid, snapshot: &ProcessSnapshot) -> bool {
        self.skip_reason(pid, snapshot).is_some()
    }

    /// Replace the allow-list names
    pub fn set_allow_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.allow_names.write() = NameSet::new(names);
    }

    pub fn allow_count(&self) -> usize {
        self.allow_names.read().len()
    }

    pub fn deny_count(&self) -> usize {
        self.deny_names.len()
    }
}

#[derive(Debug, Deserialize)]
struct AllowListDocument {
    #[serde(default)]
    whitelist: Vec<String>,
}

/// `{"whitelist": [...]}` file re-read only when its mtime changes
pub struct AllowListFile {
    path: PathBuf,
    last_modified: Mutex<Option<SystemTime>>,
}

impl AllowListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the list if the file changed; `Ok(None)` when unchanged or absent
    pub fn reload_if_changed(&self) -> Result<Option<Vec<String>>> {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                debug!(path = %self.path.display(), "Allow-list file not present");
                return Ok(None);
            }
        };

        let mut last = self.last_modified.lock();
        if *last == Some(modified) {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| ConfigError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let doc: AllowListDocument =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        *last = Some(modified);

        info!(path = %self.path.display(), entries = doc.whitelist.len(), "Allow-list reloaded");
        Ok(Some(doc.whitelist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ProcessEntry;
    use std::io::Write;
    use std::time::Instant;

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot::from_entries(
            vec![
                ProcessEntry::new(1, 0, "systemd"),
                ProcessEntry::new(2, 1, "notepad.exe").with_exe("C:\\Windows\\notepad.exe"),
                ProcessEntry::new(3, 1, "daemon").with_system_account(true),
                ProcessEntry::new(4, 1, "service").with_session(0),
                ProcessEntry::new(5, 1, "game.exe").with_exe("D:\\Games\\game.exe"),
                ProcessEntry::new(6, 1, "Xorg"),
            ],
            Instant::now(),
        )
    }

    #[test]
    fn test_skip_reasons() {
        let filter = ProcessFilter::new(&FilterLists::defaults());
        let snap = snapshot();
        assert_eq!(filter.skip_reason(1, &snap), Some(SkipReason::DeniedName));
        assert_eq!(filter.skip_reason(2, &snap), Some(SkipReason::DeniedPath));
        assert_eq!(filter.skip_reason(3, &snap), Some(SkipReason::SystemAccount));
        assert_eq!(filter.skip_reason(4, &snap), Some(SkipReason::SystemSession));
        assert_eq!(filter.skip_reason(5, &snap), None);
        assert_eq!(filter.skip_reason(6, &snap), Some(SkipReason::DeniedName));
        assert_eq!(filter.skip_reason(99, &snap), Some(SkipReason::Absent));
    }

    #[test]
    fn test_allow_list_wins() {
        let filter = ProcessFilter::new(&FilterLists::defaults());
        filter.set_allow_names(["Game.exe"]);
        assert_eq!(filter.skip_reason(5, &snapshot()), Some(SkipReason::Allowed));
    }

    #[test]
    fn test_allow_path_substring() {
        let lists = FilterLists {
            allow_paths: vec!["\\games\\".into()],
            ..FilterLists::defaults()
        };
        let filter = ProcessFilter::new(&lists);
        assert!(filter.is_skipped(5, &snapshot()));
    }

    #[test]
    fn test_name_set_has_no_false_negatives() {
        let set = NameSet::new(DEFAULT_DENY_NAMES);
        for name in DEFAULT_DENY_NAMES {
            assert!(set.contains(name));
        }
        assert!(!set.contains("firefox"));
    }

    #[test]
    fn test_allow_list_file_reload_on_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"whitelist": ["a.exe", "b.exe"]}}"#).unwrap();
        file.flush().unwrap();

        let source = AllowListFile::new(file.path());
        assert_eq!(
            source.reload_if_changed().unwrap(),
            Some(vec!["a.exe".to_string(), "b.exe".to_string()])
        );
        assert_eq!(source.reload_if_changed().unwrap(), None);
    }

    #[test]
    fn test_allow_list_file_missing_or_malformed() {
        assert_eq!(AllowListFile::new("/nonexistent/allow.json").reload_if_changed().unwrap(), None);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        file.flush().unwrap();
        assert!(AllowListFile::new(file.path()).reload_if_changed().is_err());
    }
}
