use axum::body::Bytes;

/// One uploaded file, held only for the duration of the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    /// Content type as declared by the client; empty when omitted.
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn resolved_mime_type(&self) -> String {
        resolve_mime_type(&self.content_type, &self.file_name)
    }
}

/// Resolve the effective MIME type of an upload. Browsers frequently omit or
/// report `application/octet-stream` for drag-and-drop uploads, in which case
/// the type is inferred from the filename extension alone. Unrecognized
/// extensions leave the declared type untouched.
pub fn resolve_mime_type(declared: &str, file_name: &str) -> String {
    if !declared.is_empty() && declared != "application/octet-stream" {
        return declared.to_string();
    }

    let name = file_name.to_lowercase();
    if name.ends_with(".pdf") {
        "application/pdf".to_string()
    } else if name.ends_with(".png") {
        "image/png".to_string()
    } else if name.ends_with(".jpg") || name.ends_with(".jpeg") {
        "image/jpeg".to_string()
    } else {
        declared.to_string()
    }
}
