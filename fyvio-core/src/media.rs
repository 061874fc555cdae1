//! Presentation metadata for streamed media.

use rand::Rng;

use crate::backend::FileProperties;

/// Fallback content type when neither the backend nor the name tells us.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Content type and file name sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPresentation {
    pub mime_type: String,
    pub file_name: String,
}

impl MediaPresentation {
    /// Derives presentation metadata from resolved file properties.
    ///
    /// The mime type comes from the backend, else is guessed from the file
    /// name extension, else falls back to [`DEFAULT_MIME_TYPE`]. A missing
    /// file name is synthesized as four random hex characters followed by
    /// the mime subtype, or `unknown` when there is none.
    pub fn from_properties(file: &FileProperties) -> Self {
        let mime_type = file
            .mime_type
            .clone()
            .filter(|mime| !mime.is_empty())
            .or_else(|| {
                file.file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first_raw())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let file_name = match file.file_name.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => synthesize_file_name(file.mime_type.as_deref()),
        };

        Self {
            mime_type,
            file_name,
        }
    }

    /// `Content-Disposition` header value; media is always shown inline.
    pub fn content_disposition(&self) -> String {
        format!(
            "inline; filename=\"{}\"",
            self.file_name.replace(['"', '\\', '\r', '\n'], "_")
        )
    }
}

fn synthesize_file_name(mime_type: Option<&str>) -> String {
    let extension = mime_type
        .and_then(|mime| mime.split('/').nth(1))
        .map(|subtype| subtype.split(';').next().unwrap_or(subtype).trim())
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or("unknown");
    let prefix: [u8; 2] = rand::rng().random();
    format!("{}.{}", hex::encode(prefix), extension)
}
