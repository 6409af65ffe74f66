use std::fmt::Display;
use std::path::{Component, Path, PathBuf};

use crate::common::{self, CgroupSetup, WrappedIoError, CPUSET_SUBSYSTEM};
use crate::path::CgroupsPath;

pub const CGROUP_CPUSET_CPUS: &str = "cpuset.cpus";

#[derive(thiserror::Error, Debug)]
pub enum TargetError {
    #[error("invalid cgroup path: {path} is not below {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// The `cpuset.cpus` interface file of a container's cgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupTarget {
    /// `<root>/cpuset/<cgroups path>/cpuset.cpus` on legacy and hybrid hosts.
    V1 { path: PathBuf },
    /// `<root>/<cgroups path>/cpuset.cpus` on unified hosts.
    V2 { path: PathBuf },
}

impl CgroupTarget {
    pub fn resolve(
        root: &Path,
        setup: CgroupSetup,
        cgroups_path: &CgroupsPath,
    ) -> Result<Self, TargetError> {
        let target = match setup {
            CgroupSetup::Legacy | CgroupSetup::Hybrid => {
                let path = join_within(root, &root.join(CPUSET_SUBSYSTEM), cgroups_path)?;
                CgroupTarget::V1 { path }
            }
            CgroupSetup::Unified => {
                let path = join_within(root, root, cgroups_path)?;
                CgroupTarget::V2 { path }
            }
        };

        tracing::debug!(%setup, cgroups_path = %cgroups_path, ?target, "resolved cgroup target");
        Ok(target)
    }

    pub fn path(&self) -> &Path {
        match self {
            CgroupTarget::V1 { path } | CgroupTarget::V2 { path } => path,
        }
    }

    /// Sets the cpus of the cgroup to `cpus`, replacing the previous value.
    pub fn apply(&self, cpus: &str) -> Result<(), WrappedIoError> {
        let path = self.path();
        if let Ok(previous) = common::read_cgroup_file(path) {
            tracing::debug!(?path, previous = previous.trim(), cpus, "replacing cpuset");
        }

        common::write_cgroup_file_str(path, cpus)?;
        tracing::info!(?path, cpus, "applied cpuset");
        Ok(())
    }
}

impl Display for CgroupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CgroupTarget::V1 { path } => write!(f, "{} (cgroup v1)", path.display()),
            CgroupTarget::V2 { path } => write!(f, "{} (cgroup v2)", path.display()),
        }
    }
}

// The segments are validated when the cgroups path is parsed. The joined path
// is checked again against the root since join alone never rejects escapes.
fn join_within(
    root: &Path,
    base: &Path,
    cgroups_path: &CgroupsPath,
) -> Result<PathBuf, TargetError> {
    let mut path = base.to_path_buf();
    for segment in cgroups_path.segments() {
        path.push(segment);
    }
    path.push(CGROUP_CPUSET_CPUS);

    let inside = path
        .strip_prefix(root)
        .map(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))))
        .unwrap_or(false);
    if !inside {
        return Err(TargetError::OutsideRoot {
            path,
            root: root.to_path_buf(),
        });
    }

    Ok(path)
}
