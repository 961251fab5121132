use std::path::{Path, PathBuf};

/// Roots of the kernel pseudo filesystems the producers read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub proc: PathBuf,
    pub sys: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            proc: PathBuf::from("/proc"),
            sys: PathBuf::from("/sys"),
        }
    }
}

impl HostPaths {
    /// `proc` and `sys` under `root`, for fixtures
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        Self {
            proc: root.join("proc"),
            sys: root.join("sys"),
        }
    }

    #[must_use]
    pub fn proc_file(&self, name: &str) -> PathBuf {
        self.proc.join(name)
    }

    #[must_use]
    pub fn hwmon(&self) -> PathBuf {
        self.sys.join("class/hwmon")
    }

    #[must_use]
    pub fn block_device(&self, name: &str) -> PathBuf {
        self.sys.join("block").join(name)
    }

    #[must_use]
    pub fn dmi(&self, name: &str) -> PathBuf {
        self.sys.join("class/dmi/id").join(name)
    }
}

/// Read a small text file, trimmed; `None` if missing or unreadable
pub(crate) fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}
