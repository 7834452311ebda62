use crate::error::SubmitError;

use super::multipart::FilePart;

/// 100 MiB.
pub const MAX_PDF_BYTES: usize = 104_857_600;
pub const PDF_SIGNATURE: &[u8] = b"%PDF";

/// Check an uploaded file against the size, extension and signature rules,
/// in that order. The first failing rule decides the message.
pub fn validate_pdf(file: &FilePart) -> Result<(), SubmitError> {
    if file.content.len() > MAX_PDF_BYTES {
        return Err(SubmitError::ValidationFailed(
            "PDF exceeds the maximum size of 100 MB".to_string(),
        ));
    }
    if !file.filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(SubmitError::ValidationFailed(
            "Only PDF files are accepted".to_string(),
        ));
    }
    if !file.content.starts_with(PDF_SIGNATURE) {
        return Err(SubmitError::ValidationFailed(
            "File content is not a valid PDF document".to_string(),
        ));
    }
    Ok(())
}
