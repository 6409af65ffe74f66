use crate::path::{CgroupsPath, CgroupsPathError};
use crate::spec::RuntimeSpec;

/// Annotation carrying the requested CPU list, e.g. `"0-3,7"`.
pub const CPU_SET_ANNOTATION: &str = "cpu-set";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("missing annotations in runtime spec")]
    MissingAnnotations,
    #[error("annotation '{0}' not found")]
    MissingPolicyKey(&'static str),
    #[error("cgroup path is empty")]
    MissingCgroupPath,
    #[error("annotation '{0}' has an empty value")]
    InvalidPolicyValue(&'static str),
    #[error("invalid cgroup path {path:?}: {err}")]
    InvalidCgroupPath { path: String, err: CgroupsPathError },
}

impl PolicyError {
    /// True when the spec simply does not ask for a cpuset, as opposed to
    /// asking for one in a broken way.
    pub fn is_not_requested(&self) -> bool {
        matches!(
            self,
            PolicyError::MissingAnnotations | PolicyError::MissingPolicyKey(_)
        )
    }
}

/// What the hook is asked to do for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    cpus: String,
    cgroups_path: CgroupsPath,
}

impl Policy {
    /// CPU list, passed to the kernel as is.
    pub fn cpus(&self) -> &str {
        &self.cpus
    }

    pub fn cgroups_path(&self) -> &CgroupsPath {
        &self.cgroups_path
    }
}

/// Derives the cpuset policy from the annotations and `linux.cgroupsPath` of
/// the spec. `systemd_cgroup` selects how the cgroups path is read, see
/// [`CgroupsPath::parse`].
pub fn resolve(spec: &RuntimeSpec, systemd_cgroup: bool) -> Result<Policy, PolicyError> {
    let annotations = spec
        .annotations()
        .filter(|annotations| !annotations.is_empty())
        .ok_or(PolicyError::MissingAnnotations)?;

    let cpus = annotations
        .get(CPU_SET_ANNOTATION)
        .ok_or(PolicyError::MissingPolicyKey(CPU_SET_ANNOTATION))?;

    let raw_path = spec
        .cgroups_path()
        .filter(|path| !path.is_empty())
        .ok_or(PolicyError::MissingCgroupPath)?;

    if cpus.is_empty() {
        return Err(PolicyError::InvalidPolicyValue(CPU_SET_ANNOTATION));
    }

    let cgroups_path = CgroupsPath::parse(raw_path, systemd_cgroup).map_err(|err| {
        PolicyError::InvalidCgroupPath {
            path: raw_path.to_owned(),
            err,
        }
    })?;

    tracing::debug!(cpus = %cpus, cgroups_path = %cgroups_path, "resolved cpuset policy");
    Ok(Policy {
        cpus: cpus.to_owned(),
        cgroups_path,
    })
}
