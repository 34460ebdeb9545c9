//! Job descriptors and execution outcomes.

use crate::error::{Result, ValidationError};
use crate::names;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// File contents carried inside a descriptor.
///
/// Serialized as base64 so descriptors can travel through text-based brokers.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Blob)
            .map_err(serde::de::Error::custom)
    }
}

/// Password used to log in to the registry as the image owner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    password: String,
}

impl RegistryCredential {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RegistryCredential(***)")
    }
}

/// Immutable description of one build-and-publish request.
///
/// Construction validates every field; there are no setters. Deserialization
/// goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJobDescriptor")]
pub struct JobDescriptor {
    owner: String,
    repository: String,
    tag: String,
    dockerfile: Blob,
    auxiliary_files: BTreeMap<String, Blob>,
    registry_credential: Option<RegistryCredential>,
}

#[derive(Deserialize)]
struct RawJobDescriptor {
    owner: String,
    repository: String,
    tag: Option<String>,
    dockerfile: Blob,
    #[serde(default)]
    auxiliary_files: BTreeMap<String, Blob>,
    registry_credential: Option<RegistryCredential>,
}

impl TryFrom<RawJobDescriptor> for JobDescriptor {
    type Error = ValidationError;

    fn try_from(raw: RawJobDescriptor) -> Result<Self> {
        JobDescriptor::new(
            raw.owner,
            raw.repository,
            raw.tag.as_deref(),
            raw.dockerfile,
            raw.auxiliary_files,
            raw.registry_credential,
        )
    }
}

impl JobDescriptor {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        tag: Option<&str>,
        dockerfile: impl Into<Blob>,
        auxiliary_files: BTreeMap<String, Blob>,
        registry_credential: Option<RegistryCredential>,
    ) -> Result<Self> {
        let owner = owner.into();
        let repository = repository.into();
        names::validate_component("user_name", &owner)?;
        names::validate_component("repo", &repository)?;
        let tag = names::resolve_tag(tag)?;

        let dockerfile = dockerfile.into();
        if dockerfile.is_empty() {
            return Err(ValidationError::EmptyDockerfile);
        }

        for name in auxiliary_files.keys() {
            names::validate_file_name(name)?;
        }

        Ok(Self {
            owner,
            repository,
            tag,
            dockerfile,
            auxiliary_files,
            registry_credential,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn dockerfile(&self) -> &Blob {
        &self.dockerfile
    }

    pub fn auxiliary_files(&self) -> &BTreeMap<String, Blob> {
        &self.auxiliary_files
    }

    pub fn registry_credential(&self) -> Option<&RegistryCredential> {
        self.registry_credential.as_ref()
    }

    /// `owner/repository:tag`
    pub fn image_reference(&self) -> String {
        format!("{}/{}:{}", self.owner, self.repository, self.tag)
    }
}

/// Phase of a job that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStep {
    Build,
    Push,
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStep::Build => write!(f, "build"),
            FailedStep::Push => write!(f, "push"),
        }
    }
}

/// Final result of executing a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded {
        image_reference: String,
        registry_url: String,
    },
    Failed {
        step: FailedStep,
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn succeeded(image_reference: impl Into<String>, registry_url: impl Into<String>) -> Self {
        ExecutionOutcome::Succeeded {
            image_reference: image_reference.into(),
            registry_url: registry_url.into(),
        }
    }

    pub fn failed(step: FailedStep, message: impl Into<String>) -> Self {
        ExecutionOutcome::Failed {
            step,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> JobDescriptor {
        let mut files = BTreeMap::new();
        files.insert("requirements.txt".to_string(), Blob::from(&b"requests"[..]));
        JobDescriptor::new(
            "alice",
            "demo",
            None,
            b"FROM scratch".to_vec(),
            files,
            Some(RegistryCredential::new("hunter2")),
        )
        .unwrap()
    }

    #[test]
    fn test_image_reference_uses_default_tag() {
        assert_eq!(demo().image_reference(), "alice/demo:latest");
    }

    #[test]
    fn test_empty_dockerfile_rejected() {
        let result = JobDescriptor::new("alice", "demo", None, Vec::new(), BTreeMap::new(), None);
        assert_eq!(result, Err(ValidationError::EmptyDockerfile));
    }

    #[test]
    fn test_credential_is_redacted_in_debug() {
        let debug = format!("{:?}", demo());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("RegistryCredential(***)"));
    }

    #[test]
    fn test_descriptor_survives_broker_encoding() {
        let descriptor = demo();
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"dockerfile\":\"RlJPTSBzY3JhdGNo\""));

        let decoded: JobDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, descriptor);
    }

    #[test]
    fn test_deserialization_revalidates_file_names() {
        let json = r#"{
            "owner": "alice",
            "repository": "demo",
            "tag": null,
            "dockerfile": "RlJPTSBzY3JhdGNo",
            "auxiliary_files": { "../escape": "eA==" },
            "registry_credential": null
        }"#;
        let result: std::result::Result<JobDescriptor, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_outcome_wire_shape() {
        let failed = ExecutionOutcome::failed(FailedStep::Push, "denied");
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["step"], "push");
        assert_eq!(value["message"], "denied");
    }
}
