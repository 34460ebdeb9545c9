//! Reads a `POST /build` multipart body into assembler inputs.

use crate::error::ApiError;
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use dockhand_core::{BuildRequest, Upload, ValidationError};

const DOCKERFILE_FIELD: &str = "dockerfile";
const OPTIONAL_FILES_FIELD: &str = "optional_files";

/// Form contents of a build request, before validation.
#[derive(Debug, Default)]
pub struct BuildForm {
    pub request: BuildRequest,
    pub dockerfile: Option<Upload>,
    pub optional_files: Vec<Upload>,
}

impl BuildForm {
    /// Drain every part of the body. Unknown fields are skipped.
    ///
    /// Once a file part has started, a transport failure is blamed on that
    /// file: the primary upload is reported as `dockerfile`, auxiliary ones
    /// by their file name.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = BuildForm::default();
        let mut current_file: Option<String> = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(read_failure(current_file.take(), e)),
            };

            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "user_name" | "repo" | "tag" | "password" => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| read_failure(current_file.take(), e))?;
                    current_file = None;
                    match name.as_str() {
                        "user_name" => form.request.owner = value,
                        "repo" => form.request.repository = value,
                        "tag" => form.request.tag = Some(value),
                        _ => form.request.password = Some(value),
                    }
                }
                DOCKERFILE_FIELD => {
                    current_file = Some(DOCKERFILE_FIELD.to_string());
                    form.dockerfile = Some(file(field, DOCKERFILE_FIELD).await?);
                }
                OPTIONAL_FILES_FIELD => {
                    // No filename means an empty name, which assembly refuses.
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    current_file = Some(file_name.clone());
                    form.optional_files.push(file(field, &file_name).await?);
                }
                other => tracing::debug!("Ignoring multipart field '{}'", other),
            }
        }

        Ok(form)
    }

    /// Split into the assembler's arguments.
    pub fn into_parts(self) -> Result<(BuildRequest, Upload, Vec<Upload>), ValidationError> {
        let dockerfile = self
            .dockerfile
            .ok_or(ValidationError::MissingField(DOCKERFILE_FIELD))?;
        Ok((self.request, dockerfile, self.optional_files))
    }
}

/// Drain a file part. The declared filename is kept as is; a part sent
/// without one gets an empty name, so a plain text `dockerfile` field is
/// not mistaken for a Dockerfile upload.
async fn file(field: Field<'_>, which: &str) -> Result<Upload, ApiError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| read_failure(Some(which.to_string()), e))?;
    Ok(Upload::new(file_name, bytes.to_vec()))
}

fn read_failure(current_file: Option<String>, error: MultipartError) -> ApiError {
    match current_file {
        Some(which) => ValidationError::UnreadableInput {
            which,
            reason: error.body_text(),
        }
        .into(),
        None => ApiError::Multipart(error.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dockerfile_part() {
        let form = BuildForm::default();
        assert_eq!(
            form.into_parts().unwrap_err(),
            ValidationError::MissingField("dockerfile")
        );
    }
}
