use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::domain::{ApplicationId, DocumentCategory, UploadedFile};

/// File-intake boundary: accepts an uploaded stream and returns where it was stored.
pub trait DocumentIntake: Send + Sync {
    /// Reject a file before anything is stored. Callers check a whole upload first so a bad file
    /// never leaves its siblings behind.
    fn validate(&self, file: &UploadedFile) -> Result<(), IntakeError> {
        check_upload(file)
    }

    /// Store the file and return a location no other call has returned.
    fn store(
        &self,
        application_id: ApplicationId,
        category: DocumentCategory,
        file: &UploadedFile,
    ) -> Result<String, IntakeError>;

    /// Remove a stored file whose unit of work did not commit.
    fn discard(&self, location: &str) -> Result<(), IntakeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("file '{0}' is empty")]
    EmptyFile(String),
    #[error("file name '{0}' is not allowed")]
    InvalidName(String),
    #[error("document storage unavailable: {0}")]
    Unavailable(String),
}

/// Name and size rules shared by every intake.
pub fn check_upload(file: &UploadedFile) -> Result<(), IntakeError> {
    let name = file.name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(IntakeError::InvalidName(file.name.clone()));
    }
    if file.content.is_empty() {
        return Err(IntakeError::EmptyFile(file.name.clone()));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Blobs {
    uploads: u64,
    files: BTreeMap<String, Vec<u8>>,
}

/// Keeps uploads in memory under `memory://<category>/<application>/<upload>/<name>`. The upload
/// counter never rewinds, so repeated names and reused application ids get distinct locations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentIntake {
    blobs: Arc<Mutex<Blobs>>,
}

impl InMemoryDocumentIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, location: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.files.get(location).cloned())
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentIntake for InMemoryDocumentIntake {
    fn store(
        &self,
        application_id: ApplicationId,
        category: DocumentCategory,
        file: &UploadedFile,
    ) -> Result<String, IntakeError> {
        self.validate(file)?;

        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| IntakeError::Unavailable("intake mutex poisoned".to_string()))?;
        blobs.uploads += 1;
        let location = format!(
            "memory://{}/{}/{}/{}",
            category.label(),
            application_id,
            blobs.uploads,
            file.name.trim()
        );
        blobs.files.insert(location.clone(), file.content.clone());
        Ok(location)
    }

    fn discard(&self, location: &str) -> Result<(), IntakeError> {
        self.blobs
            .lock()
            .map_err(|_| IntakeError::Unavailable("intake mutex poisoned".to_string()))?
            .files
            .remove(location);
        Ok(())
    }
}
