//! cgroups paths as handed out by runtimes using the systemd cgroup driver.
use std::fmt::Display;

use crate::path::CgroupsPathError;

const SLICE_SUFFIX: &str = ".slice";
const DEFAULT_SLICE: &str = "system.slice";

/// Represents the systemd cgroups path:
/// It should be of the form [slice]:[scope_prefix]:[name].
/// The slice is the "parent" and should be expanded properly,
/// see expand_slice below.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SystemdCgroupsPath {
    parent: String,
    prefix: String,
    name: String,
}

impl Display for SystemdCgroupsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.parent, self.prefix, self.name)
    }
}

impl SystemdCgroupsPath {
    pub(crate) fn destructure(cgroups_path: &str) -> Result<Self, CgroupsPathError> {
        let parts: Vec<&str> = cgroups_path.split(':').collect();
        let [parent, prefix, name] = parts.as_slice() else {
            return Err(CgroupsPathError::NotSystemd(cgroups_path.to_owned()));
        };
        if name.is_empty() || parts.iter().any(|part| part.contains('/')) {
            return Err(CgroupsPathError::NotSystemd(cgroups_path.to_owned()));
        }

        Ok(Self {
            parent: (*parent).to_owned(),
            prefix: (*prefix).to_owned(),
            name: (*name).to_owned(),
        })
    }

    /// unit_name returns the unit (scope) name from the path provided by the runtime
    /// for example: foo:docker:bar returns 'docker-bar.scope'
    fn unit_name(&self) -> String {
        if !self.name.ends_with(SLICE_SUFFIX) {
            return format!("{}-{}.scope", self.prefix, self.name);
        }
        self.name.clone()
    }

    /// Path segments of the unit below the hierarchy root, e.g.
    /// "system.slice:docker:foo" becomes ["system.slice", "docker-foo.scope"].
    pub(crate) fn expand(&self) -> Result<Vec<String>, CgroupsPathError> {
        let parent = match self.parent.as_str() {
            "" => DEFAULT_SLICE,
            parent => parent,
        };

        let mut segments = expand_slice(parent)?;
        segments.push(self.unit_name());
        tracing::debug!(path = %self, ?segments, "expanded systemd cgroups path");
        Ok(segments)
    }
}

// systemd represents slice hierarchy using `-`, so we need to follow suit when
// generating the path of slice. For example, 'test-a-b.slice' becomes
// 'test.slice/test-a.slice/test-a-b.slice'.
fn expand_slice(slice: &str) -> Result<Vec<String>, CgroupsPathError> {
    let invalid = || CgroupsPathError::InvalidSlice(slice.to_owned());
    let slice_name = slice.strip_suffix(SLICE_SUFFIX).ok_or_else(invalid)?;
    if slice_name.is_empty() || slice_name.contains('/') {
        return Err(invalid());
    }
    // -.slice is the root slice
    if slice_name == "-" {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut prefix = String::new();
    for component in slice_name.split('-') {
        if component.is_empty() {
            return Err(invalid());
        }
        segments.push(format!("{prefix}{component}{SLICE_SUFFIX}"));
        prefix.push_str(component);
        prefix.push('-');
    }

    Ok(segments)
}
