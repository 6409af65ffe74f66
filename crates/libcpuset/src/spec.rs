//! The part of the OCI runtime spec the hook reads.
//!
//! Only annotations and `linux.cgroupsPath` are modelled. Every other field of
//! the runtime spec is ignored on decode, so specs written for newer
//! runtime-spec versions still decode.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

#[derive(thiserror::Error, Debug)]
pub enum SpecError {
    #[error("malformed spec")]
    MalformedSpec(#[from] serde_json::Error),
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    #[serde(default, deserialize_with = "deserialize_annotations")]
    annotations: Option<HashMap<String, String>>,
    #[serde(default)]
    linux: Option<Linux>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default)]
    cgroups_path: Option<String>,
}

// A null annotation value reads as an empty string, so `"cpu-set": null` is
// rejected as an empty policy value rather than as a malformed spec.
fn deserialize_annotations<'de, D>(
    deserializer: D,
) -> Result<Option<HashMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let annotations: Option<HashMap<String, Option<String>>> =
        Option::deserialize(deserializer)?;
    Ok(annotations.map(|annotations| {
        annotations
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect()
    }))
}

impl RuntimeSpec {
    /// Loads the spec from a `config.json` file, e.g. inside an OCI bundle.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| SpecError::Read {
            err,
            path: path.to_path_buf(),
        })?;
        decode(&data)
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        self.annotations.as_ref()
    }

    pub fn linux(&self) -> Option<&Linux> {
        self.linux.as_ref()
    }

    /// Shortcut for `linux.cgroupsPath`.
    pub fn cgroups_path(&self) -> Option<&str> {
        self.linux.as_ref().and_then(Linux::cgroups_path)
    }
}

impl Linux {
    pub fn cgroups_path(&self) -> Option<&str> {
        self.cgroups_path.as_deref()
    }
}

/// Decodes a serialized runtime spec. Only syntax and the types of the known
/// fields are checked here.
pub fn decode(data: &[u8]) -> Result<RuntimeSpec, SpecError> {
    let spec = serde_json::from_slice(data)?;
    tracing::debug!(?spec, "decoded runtime spec");
    Ok(spec)
}
