use std::fmt::Display;
use std::path::PathBuf;

use crate::common::{
    self, CgroupSetup, GetCgroupSetupError, WrappedIoError, DEFAULT_CGROUP_ROOT,
};
use crate::cpuset::{CgroupTarget, TargetError};
use crate::policy::{self, PolicyError};
use crate::spec::{self, RuntimeSpec, SpecError};

/// Which cgroup hierarchy layout to write to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Detect the layout from the cgroup root.
    #[default]
    Auto,
    V1,
    V2,
}

/// What to do when the spec does not request a cpuset at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail the hook, so a misconfigured container does not start unpinned.
    #[default]
    Fail,
    /// Succeed without touching the cgroup.
    Skip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookConfig {
    /// Mount point of the cgroup hierarchy, e.g. /sys/fs/cgroup
    pub cgroup_root: PathBuf,
    pub cgroup_version: CgroupVersion,
    /// Read relative cgroups paths as systemd `[slice]:[prefix]:[name]`.
    pub systemd_cgroup: bool,
    pub missing_policy: MissingPolicy,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            cgroup_version: CgroupVersion::default(),
            systemd_cgroup: false,
            missing_policy: MissingPolicy::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error("failed to decode runtime spec")]
    Decode(#[from] SpecError),
    #[error("failed to resolve cpuset policy")]
    Resolve(#[from] PolicyError),
    #[error("failed to detect cgroup setup")]
    Setup(#[from] GetCgroupSetupError),
    #[error("failed to resolve cgroup target")]
    Target(#[from] TargetError),
    #[error("failed to write cpuset")]
    Write(#[from] WrappedIoError),
}

/// Result of a successful hook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { target: CgroupTarget, cpus: String },
    Skipped { reason: String },
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Applied { cpus, .. } => {
                write!(f, "Successfully set cpuset {cpus} for container")
            }
            Outcome::Skipped { reason } => {
                write!(f, "No cpuset requested, nothing to do: {reason}")
            }
        }
    }
}

/// Applies the cpuset policy of one container: decode, resolve, write.
/// Nothing is written unless every step before the write succeeded.
#[derive(Debug, Default)]
pub struct Hook {
    config: HookConfig,
}

impl Hook {
    pub fn new(config: HookConfig) -> Self {
        Self { config }
    }

    pub fn process_json(&self, data: &[u8]) -> Result<Outcome, HookError> {
        let spec = spec::decode(data)?;
        self.process(&spec)
    }

    pub fn process(&self, spec: &RuntimeSpec) -> Result<Outcome, HookError> {
        let policy = match policy::resolve(spec, self.config.systemd_cgroup) {
            Ok(policy) => policy,
            Err(err)
                if err.is_not_requested() && self.config.missing_policy == MissingPolicy::Skip =>
            {
                tracing::info!(%err, "no cpuset requested, skipping");
                return Ok(Outcome::Skipped {
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let setup = self.cgroup_setup()?;
        let target =
            CgroupTarget::resolve(&self.config.cgroup_root, setup, policy.cgroups_path())?;
        target.apply(policy.cpus())?;

        Ok(Outcome::Applied {
            target,
            cpus: policy.cpus().to_owned(),
        })
    }

    fn cgroup_setup(&self) -> Result<CgroupSetup, GetCgroupSetupError> {
        let setup = match self.config.cgroup_version {
            CgroupVersion::Auto => common::get_cgroup_setup_with_root(&self.config.cgroup_root)?,
            CgroupVersion::V1 => CgroupSetup::Legacy,
            CgroupVersion::V2 => CgroupSetup::Unified,
        };
        tracing::debug!(%setup, root = ?self.config.cgroup_root, "using cgroup setup");
        Ok(setup)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use anyhow::Result;
    use serde_json::json;

    use super::*;
    use crate::test::{set_fixture, setup_cpuset, spec_json};

    fn hook(root: &Path, cgroup_version: CgroupVersion) -> Hook {
        Hook::new(HookConfig {
            cgroup_root: root.to_path_buf(),
            cgroup_version,
            ..Default::default()
        })
    }

    fn pod_spec(cpus: &str, cgroups_path: &str) -> Vec<u8> {
        spec_json(json!({
            "annotations": {"cpu-set": cpus},
            "linux": {"cgroupsPath": cgroups_path}
        }))
    }

    #[test]
    fn test_default_config() {
        let config = HookConfig::default();
        assert_eq!(config.cgroup_root, Path::new("/sys/fs/cgroup"));
        assert_eq!(config.cgroup_version, CgroupVersion::Auto);
        assert_eq!(config.missing_policy, MissingPolicy::Fail);
        assert!(!config.systemd_cgroup);
    }

    #[test]
    fn test_process_v1() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/kubepods/pod123", "");

        let outcome = hook(tmp.path(), CgroupVersion::V1)
            .process_json(&pod_spec("0-3", "/kubepods/pod123"))?;

        assert_eq!(fs::read_to_string(&file)?, "0-3");
        assert_eq!(
            outcome,
            Outcome::Applied {
                target: CgroupTarget::V1 { path: file },
                cpus: "0-3".to_owned(),
            }
        );
        assert_eq!(outcome.to_string(), "Successfully set cpuset 0-3 for container");
        Ok(())
    }

    #[test]
    fn test_process_v2() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "kubepods/pod123", "0-7\n");

        hook(tmp.path(), CgroupVersion::V2).process_json(&pod_spec("4", "/kubepods/pod123"))?;

        assert_eq!(fs::read_to_string(&file)?, "4");
        Ok(())
    }

    #[test]
    fn test_process_detects_unified_root() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        set_fixture(tmp.path(), common::CGROUP_CONTROLLERS, "cpuset cpu io memory")?;
        let file = setup_cpuset(tmp.path(), "pod", "");

        let outcome =
            hook(tmp.path(), CgroupVersion::Auto).process_json(&pod_spec("1", "/pod"))?;

        assert!(matches!(
            outcome,
            Outcome::Applied {
                target: CgroupTarget::V2 { .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(file)?, "1");
        Ok(())
    }

    #[test]
    fn test_process_detects_legacy_root() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/pod", "");

        let outcome =
            hook(tmp.path(), CgroupVersion::Auto).process_json(&pod_spec("1", "/pod"))?;

        assert!(matches!(
            outcome,
            Outcome::Applied {
                target: CgroupTarget::V1 { .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(file)?, "1");
        Ok(())
    }

    #[test]
    fn test_process_twice_is_idempotent() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/kubepods/pod123", "");
        let hook = hook(tmp.path(), CgroupVersion::V1);
        let spec = pod_spec("0-3", "/kubepods/pod123");

        let first = hook.process_json(&spec)?;
        let second = hook.process_json(&spec)?;

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(file)?, "0-3");
        Ok(())
    }

    #[test]
    fn test_process_malformed_spec() -> Result<()> {
        let tmp = tempfile::tempdir()?;

        let err = hook(tmp.path(), CgroupVersion::V1)
            .process_json(b"{not json")
            .unwrap_err();

        assert!(matches!(err, HookError::Decode(SpecError::MalformedSpec(_))));
        assert_eq!(fs::read_dir(tmp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_process_missing_annotations_writes_nothing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/pod", "0-7");

        let err = hook(tmp.path(), CgroupVersion::V1)
            .process_json(&spec_json(json!({"linux": {"cgroupsPath": "/pod"}})))
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::Resolve(PolicyError::MissingAnnotations)
        ));
        assert_eq!(fs::read_to_string(file)?, "0-7");
        Ok(())
    }

    #[test]
    fn test_process_missing_key_writes_nothing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/pod", "0-7");

        let err = hook(tmp.path(), CgroupVersion::V1)
            .process_json(&spec_json(json!({
                "annotations": {"cpu-shares": "2"},
                "linux": {"cgroupsPath": "/pod"}
            })))
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::Resolve(PolicyError::MissingPolicyKey(_))
        ));
        assert_eq!(fs::read_to_string(file)?, "0-7");
        Ok(())
    }

    #[test]
    fn test_process_skip_when_not_requested() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(tmp.path(), "cpuset/pod", "0-7");
        let hook = Hook::new(HookConfig {
            cgroup_root: tmp.path().to_path_buf(),
            cgroup_version: CgroupVersion::V1,
            missing_policy: MissingPolicy::Skip,
            ..Default::default()
        });

        let outcome = hook.process_json(&spec_json(json!({"linux": {"cgroupsPath": "/pod"}})))?;
        assert_eq!(
            outcome,
            Outcome::Skipped {
                reason: "missing annotations in runtime spec".to_owned()
            }
        );

        let outcome = hook.process_json(&spec_json(json!({
            "annotations": {"other": "x"},
            "linux": {"cgroupsPath": "/pod"}
        })))?;
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert_eq!(fs::read_to_string(file)?, "0-7");

        // a requested but broken policy still fails
        let err = hook.process_json(&pod_spec("", "/pod")).unwrap_err();
        assert!(matches!(
            err,
            HookError::Resolve(PolicyError::InvalidPolicyValue(_))
        ));
        Ok(())
    }

    #[test]
    fn test_process_traversal_writes_nothing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("cgroup");
        fs::create_dir(&root)?;
        // a file an escaping path would reach from <root>/cpuset
        let outside = setup_cpuset(tmp.path(), "etc", "untouched");

        let err = hook(&root, CgroupVersion::V1)
            .process_json(&pod_spec("0", "../../etc"))
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::Resolve(PolicyError::InvalidCgroupPath { .. })
        ));
        assert_eq!(fs::read_to_string(outside)?, "untouched");
        Ok(())
    }

    #[test]
    fn test_process_cgroup_not_created() -> Result<()> {
        let tmp = tempfile::tempdir()?;

        let err = hook(tmp.path(), CgroupVersion::V1)
            .process_json(&pod_spec("0-3", "/kubepods/pod123"))
            .unwrap_err();

        match err {
            HookError::Write(err) => {
                assert_eq!(err.inner().kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_process_missing_root() -> Result<()> {
        let tmp = tempfile::tempdir()?;

        let err = hook(&tmp.path().join("missing"), CgroupVersion::Auto)
            .process_json(&pod_spec("0-3", "/pod"))
            .unwrap_err();

        assert!(matches!(
            err,
            HookError::Setup(GetCgroupSetupError::RootNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_process_systemd_cgroups_path() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = setup_cpuset(
            tmp.path(),
            "kubepods.slice/kubepods-pod1.slice/cri-containerd-abc.scope",
            "",
        );
        let hook = Hook::new(HookConfig {
            cgroup_root: tmp.path().to_path_buf(),
            cgroup_version: CgroupVersion::V2,
            systemd_cgroup: true,
            ..Default::default()
        });

        hook.process_json(&pod_spec("0-1", "kubepods-pod1.slice:cri-containerd:abc"))?;

        assert_eq!(fs::read_to_string(file)?, "0-1");
        Ok(())
    }
}
