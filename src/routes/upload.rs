//! Multipart form collection shared by the upload endpoints.

use axum::extract::{multipart::MultipartError, Multipart};
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::services::documents::UploadedFile;

/// Text and file fields of a multipart form, keyed by field name.
#[derive(Debug, Default)]
pub struct UploadForm {
    texts: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    // Browsers send an empty part when no file was chosen
                    if filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files
                        .insert(name, UploadedFile::new(filename, bytes.to_vec()));
                }
                None => {
                    let text = field.text().await.map_err(multipart_error)?;
                    form.texts.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    /// A non-blank text field, or a validation error naming it.
    pub fn required_text(&self, name: &str) -> ApiResult<&str> {
        self.text(name)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation(format!("{} is required", name)))
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::validation(format!("Malformed multipart upload: {}", e))
}
