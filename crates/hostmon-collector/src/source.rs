use crate::procfs::{self, DiskStatLine, MemInfo};
use hostmon_common::error::{CollectError, Result};
use hostmon_common::types::{CounterVector, EntityKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Filesystem types left out of disk reporting: network, memory-backed and
/// optical filesystems, plus ZFS whose pools do not map onto block devices.
pub const EXCLUDED_FS: &[&str] = &[
    "smbfs", "tmpfs", "devtmpfs", "cifs", "iso9660", "udf", "nfsv4", "nfs", "mvfs", "zfs",
];

/// Block device counters plus the capacity gauges of the filesystem on it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSample {
    pub name: String,
    pub counters: CounterVector,
    /// Filesystem size in MB.
    pub capacity_mb: u64,
    /// Used space in percent, rounded up.
    pub usage_percent: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetSample {
    pub name: String,
    pub counters: CounterVector,
    pub link_up: bool,
}

/// A mounted filesystem as seen by the capacity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedFs {
    /// Kernel name of the backing device (`sda1`, `dm-0`).
    pub device: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MountedFs {
    pub fn capacity_mb(&self) -> u64 {
        self.total_bytes / (1024 * 1024)
    }

    pub fn usage_percent(&self) -> u64 {
        if self.total_bytes == 0 {
            return 0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes) as u128;
        let total = self.total_bytes as u128;
        ((used * 100 + total - 1) / total) as u64
    }
}

/// Supplies instantaneous absolute counters. Implementations hold no
/// history; every call reflects the system at call time.
pub trait CounterSource: Send {
    /// Every line of the system CPU table, aggregate first.
    fn read_system_cpu(&self) -> Result<Vec<(String, CounterVector)>>;

    /// `[utime, stime, cutime, cstime]` of one process.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::EntityVanished`] when the process is gone.
    fn read_process_cpu(&self, pid: u32) -> Result<CounterVector>;

    /// Mounted block devices with their counters and capacity gauges.
    fn read_disks(&self) -> Result<Vec<DiskSample>>;

    fn read_nets(&self) -> Result<Vec<NetSample>>;

    fn read_memory(&self) -> Result<MemInfo>;

    /// Seconds since boot.
    fn read_uptime(&self) -> Result<f64>;
}

/// Lists mounted filesystems for capacity reporting.
pub trait MountTable: Send {
    fn mounted(&self) -> Vec<MountedFs>;
}

/// Mount table backed by `sysinfo`.
#[derive(Debug, Default)]
pub struct SysinfoMounts;

impl MountTable for SysinfoMounts {
    fn mounted(&self) -> Vec<MountedFs> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| {
                let fs = disk.file_system().to_string_lossy();
                !EXCLUDED_FS.iter().any(|excluded| fs == *excluded)
            })
            .filter_map(|disk| {
                Some(MountedFs {
                    device: device_name(Path::new(disk.name()))?,
                    total_bytes: disk.total_space(),
                    available_bytes: disk.available_space(),
                })
            })
            .collect()
    }
}

/// Kernel device name for a mount source, following symlinks such as
/// `/dev/mapper/vg-root -> ../dm-0`.
fn device_name(path: &Path) -> Option<String> {
    let resolved = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    };
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Pairs mounted filesystems with their `/proc/diskstats` rows.
///
/// A mounted partition reports the counters of its whole disk (same major,
/// minor 0). Device-mapper minors are separate volumes and keep their own
/// counters. A partition whose disk row is missing reports zeros.
pub fn join_disks(rows: &[DiskStatLine], mounts: &[MountedFs]) -> Vec<DiskSample> {
    let mounted: HashMap<&str, &MountedFs> =
        mounts.iter().map(|m| (m.device.as_str(), m)).collect();

    rows.iter()
        .filter(|row| procfs::is_tracked_disk(&row.name))
        .filter_map(|row| {
            let fs = mounted.get(row.name.as_str())?;
            let counters = if row.minor != 0 && !row.name.starts_with("dm-") {
                rows.iter()
                    .find(|r| r.major == row.major && r.minor == 0)
                    .map(|r| r.counters.clone())
                    .unwrap_or_else(|| {
                        CounterVector::padded(EntityKind::DiskDevice, Vec::new())
                    })
            } else {
                row.counters.clone()
            };
            Some(DiskSample {
                name: row.name.clone(),
                counters,
                capacity_mb: fs.capacity_mb(),
                usage_percent: fs.usage_percent(),
            })
        })
        .collect()
}

/// [`CounterSource`] over the Linux `/proc` and `/sys` trees.
pub struct ProcSource {
    proc_root: PathBuf,
    sys_root: PathBuf,
    mounts: Box<dyn MountTable>,
}

impl ProcSource {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self::with_mounts(proc_root, sys_root, Box::new(SysinfoMounts))
    }

    pub fn with_mounts(
        proc_root: impl Into<PathBuf>,
        sys_root: impl Into<PathBuf>,
        mounts: Box<dyn MountTable>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            mounts,
        }
    }

    fn read_proc(&self, relative: &str) -> Result<String> {
        let path = self.proc_root.join(relative);
        std::fs::read_to_string(&path)
            .map_err(|e| CollectError::unavailable(path.display().to_string(), e))
    }

    fn link_up(&self, interface: &str) -> bool {
        let path = self
            .sys_root
            .join("class/net")
            .join(interface)
            .join("carrier");
        std::fs::read_to_string(path)
            .ok()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .is_some_and(|v| v != 0)
    }
}

impl CounterSource for ProcSource {
    fn read_system_cpu(&self) -> Result<Vec<(String, CounterVector)>> {
        procfs::parse_proc_stat(&self.read_proc("stat")?)
    }

    fn read_process_cpu(&self, pid: u32) -> Result<CounterVector> {
        let path = self.proc_root.join(pid.to_string()).join("stat");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollectError::EntityVanished {
                    kind: EntityKind::ProcessCpu,
                    key: pid.to_string(),
                })
            }
            Err(e) => return Err(CollectError::unavailable(path.display().to_string(), e)),
        };
        // A process exiting mid-read can leave an empty stat file.
        if content.trim().is_empty() {
            return Err(CollectError::EntityVanished {
                kind: EntityKind::ProcessCpu,
                key: pid.to_string(),
            });
        }
        procfs::parse_pid_stat(&content)
    }

    fn read_disks(&self) -> Result<Vec<DiskSample>> {
        let rows = procfs::parse_diskstats(&self.read_proc("diskstats")?);
        Ok(join_disks(&rows, &self.mounts.mounted()))
    }

    fn read_nets(&self) -> Result<Vec<NetSample>> {
        let interfaces = procfs::parse_net_dev(&self.read_proc("net/dev")?)?;
        Ok(interfaces
            .into_iter()
            .map(|(name, counters)| NetSample {
                link_up: self.link_up(&name),
                name,
                counters,
            })
            .collect())
    }

    fn read_memory(&self) -> Result<MemInfo> {
        procfs::parse_meminfo(&self.read_proc("meminfo")?)
    }

    fn read_uptime(&self) -> Result<f64> {
        procfs::parse_uptime(&self.read_proc("uptime")?)
    }
}
