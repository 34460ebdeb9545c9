//! Turns an incoming build request into a [`JobDescriptor`].
//!
//! The HTTP layer reads each multipart part as it arrives and hands the
//! result over as an [`Upload`]; assembly decides whether the request as a
//! whole is acceptable. Nothing here touches disk or the network.

use crate::error::{Result, ValidationError};
use crate::model::{Blob, JobDescriptor, RegistryCredential};
use std::collections::BTreeMap;

/// Suffix the primary upload's declared name must end with.
const DOCKERFILE_SUFFIX: &str = "dockerfile";

/// A file part of the request, already drained from the transport.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name declared by the client.
    pub file_name: String,
    /// Contents, or the reason reading them failed.
    pub body: std::result::Result<Vec<u8>, String>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            body: Ok(bytes.into()),
        }
    }

    pub fn unreadable(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            body: Err(reason.into()),
        }
    }
}

/// Text fields of a build request.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub owner: String,
    pub repository: String,
    pub tag: Option<String>,
    pub password: Option<String>,
}

/// True when the declared name ends with `dockerfile`, ignoring case.
pub fn is_dockerfile_name(file_name: &str) -> bool {
    file_name
        .to_ascii_lowercase()
        .ends_with(DOCKERFILE_SUFFIX)
}

/// Validate a request and package it as an immutable job descriptor.
///
/// Checks run in a fixed order: the primary upload's name, its body, each
/// auxiliary body, and finally the descriptor's own field rules. The first
/// failure aborts the whole request.
pub fn assemble(
    request: BuildRequest,
    dockerfile: Upload,
    auxiliary: Vec<Upload>,
) -> Result<JobDescriptor> {
    if !is_dockerfile_name(&dockerfile.file_name) {
        return Err(ValidationError::NotADockerfile {
            file_name: dockerfile.file_name,
        });
    }

    let dockerfile_bytes = dockerfile
        .body
        .map_err(|reason| ValidationError::UnreadableInput {
            which: "dockerfile".to_string(),
            reason,
        })?;

    let mut files = BTreeMap::new();
    for upload in auxiliary {
        let bytes = upload
            .body
            .map_err(|reason| ValidationError::UnreadableInput {
                which: upload.file_name.clone(),
                reason,
            })?;

        if files.contains_key(&upload.file_name) {
            return Err(ValidationError::DuplicateFileName(upload.file_name));
        }
        files.insert(upload.file_name, Blob::from(bytes));
    }

    let credential = request
        .password
        .filter(|password| !password.trim().is_empty())
        .map(RegistryCredential::new);

    let descriptor = JobDescriptor::new(
        request.owner.trim(),
        request.repository.trim(),
        request.tag.as_deref(),
        dockerfile_bytes,
        files,
        credential,
    )?;

    tracing::debug!(
        "Assembled job for {} ({} bytes Dockerfile, {} auxiliary files)",
        descriptor.image_reference(),
        descriptor.dockerfile().len(),
        descriptor.auxiliary_files().len()
    );

    Ok(descriptor)
}
