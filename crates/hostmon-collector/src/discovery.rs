use std::path::PathBuf;

/// Finds the PIDs of processes whose name matches a pattern.
pub trait ProcessFinder: Send {
    /// Sorted, deduplicated PIDs whose command name contains `pattern`.
    fn find(&mut self, pattern: &str) -> Vec<u32>;
}

/// Scans `<proc_root>/<pid>/comm` the way `pgrep <name>` does.
///
/// Only thread-group leaders are listed at the top of `/proc`, so threads
/// sharing a process name are not counted twice.
#[derive(Debug, Clone)]
pub struct ProcfsFinder {
    proc_root: PathBuf,
}

impl ProcfsFinder {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl ProcessFinder for ProcfsFinder {
    fn find(&mut self, pattern: &str) -> Vec<u32> {
        let entries = match std::fs::read_dir(&self.proc_root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.proc_root.display(), error = %e, "Failed to list processes");
                return Vec::new();
            }
        };

        let mut pids: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| {
                std::fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
                    .is_ok_and(|comm| comm.trim_end().contains(pattern))
            })
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }
}
