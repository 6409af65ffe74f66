use std::fmt::Display;
use std::path::PathBuf;

use crate::systemd::SystemdCgroupsPath;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CgroupsPathError {
    #[error("segment {0:?} would leave the cgroup hierarchy")]
    Traversal(String),
    #[error("segment {0:?} contains a separator or control character")]
    UnsafeSegment(String),
    #[error("path does not name a cgroup")]
    NoSegments,
    #[error("{0:?} is not of the form [slice]:[prefix]:[name]")]
    NotSystemd(String),
    #[error("invalid slice name: {0}")]
    InvalidSlice(String),
}

/// A cgroups path from the runtime spec, validated segment by segment so it
/// can be joined below a hierarchy root without leaving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupsPath {
    raw: String,
    segments: Vec<String>,
}

impl CgroupsPath {
    /// Parses `raw` as a cgroupfs path such as `/kubepods/pod123`. With
    /// `systemd_cgroup` set, relative paths are read as `[slice]:[prefix]:[name]`
    /// and expanded to the unit's location in the hierarchy; absolute paths stay
    /// cgroupfs paths.
    /// ref https://github.com/opencontainers/runtime-spec/blob/main/config-linux.md#cgroups-path
    pub fn parse(raw: &str, systemd_cgroup: bool) -> Result<Self, CgroupsPathError> {
        let segments = if systemd_cgroup && !raw.starts_with('/') {
            SystemdCgroupsPath::destructure(raw)?.expand()?
        } else {
            raw.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect()
        };

        if segments.is_empty() {
            return Err(CgroupsPathError::NoSegments);
        }
        for segment in &segments {
            validate_segment(segment)?;
        }

        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl Display for CgroupsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Checks a single path segment. A segment names one directory: it is never
/// `.` or `..` and holds no separator or control character. Spaces and
/// non-ASCII names are valid cgroup directory names.
pub fn validate_segment(segment: &str) -> Result<(), CgroupsPathError> {
    if segment == "." || segment == ".." {
        return Err(CgroupsPathError::Traversal(segment.to_owned()));
    }
    if segment.is_empty() || segment.chars().any(|c| c == '/' || c.is_control()) {
        return Err(CgroupsPathError::UnsafeSegment(segment.to_owned()));
    }

    Ok(())
}
