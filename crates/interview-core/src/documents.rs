//! Tailored CV and cover letter generation.
//!
//! The backend renders the document; this client only posts the job
//! description, classifies failures and hands the bytes to a [`SaveTarget`].

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use crate::backend::{Backend, DocumentRequest};
use crate::config::{Config, DEFAULT_MODEL};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Cv,
    CoverLetter,
}

impl DocumentKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "/generate-cv",
            DocumentKind::CoverLetter => "/generate-cover-letter",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "Tailored_CV.docx",
            DocumentKind::CoverLetter => "Cover_Letter.docx",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "CV",
            DocumentKind::CoverLetter => "Cover Letter",
        }
    }

    pub fn all() -> Vec<DocumentKind> {
        vec![DocumentKind::Cv, DocumentKind::CoverLetter]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The document was fetched and handed to the save target.
    Downloaded(DownloadedFile),
    /// The backend declined because the role doesn't fit the candidate.
    Rejected(String),
    /// Anything else, already phrased for the user.
    Failed(String),
    /// The job description was blank; no request was made.
    MissingInput,
}

impl GenerationOutcome {
    /// Banner text for the view, `None` on success.
    pub fn user_message(&self) -> Option<String> {
        match self {
            GenerationOutcome::Downloaded(_) => None,
            GenerationOutcome::Rejected(reason) => {
                Some(ClientError::GuardrailRejected(reason.clone()).user_message())
            }
            GenerationOutcome::Failed(message) => Some(message.clone()),
            GenerationOutcome::MissingInput => {
                Some(ClientError::InputRejected(JOB_DESCRIPTION).user_message())
            }
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, GenerationOutcome::Downloaded(_))
    }
}

impl From<ClientError> for GenerationOutcome {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InputRejected(_) => GenerationOutcome::MissingInput,
            ClientError::GuardrailRejected(reason) => GenerationOutcome::Rejected(reason),
            other => GenerationOutcome::Failed(other.user_message()),
        }
    }
}

const JOB_DESCRIPTION: &str = "job description";

/// Destination for generated documents.
///
/// A save is three steps: `stage` the bytes somewhere temporary, `trigger`
/// the actual save, then `release` the staged copy. `release` is called
/// exactly once for every successful `stage`, whether or not `trigger`
/// returns an error or panics.
pub trait SaveTarget {
    type Handle;

    fn stage(&self, name: &str, bytes: &[u8]) -> io::Result<Self::Handle>;

    fn trigger(&self, handle: &Self::Handle) -> io::Result<()>;

    fn release(&self, handle: Self::Handle);
}

/// Stage, trigger and release through `target`.
pub fn deliver<S: SaveTarget>(target: &S, name: &str, bytes: &[u8]) -> io::Result<()> {
    let staged = Staged {
        target,
        handle: Some(target.stage(name, bytes)?),
    };
    if let Some(handle) = staged.handle.as_ref() {
        target.trigger(handle)?;
    }
    Ok(())
}

/// Releases the staged handle on drop.
struct Staged<'a, S: SaveTarget> {
    target: &'a S,
    handle: Option<S::Handle>,
}

impl<S: SaveTarget> Drop for Staged<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.target.release(handle);
        }
    }
}

/// Saves documents into a directory on disk.
///
/// The final file appears atomically under its fixed name, so a failed save
/// never leaves a partial document behind.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

#[derive(Debug)]
pub struct StagedFile {
    name: String,
    file: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.resolved_download_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveTarget for DirectorySaver {
    type Handle = StagedFile;

    fn stage(&self, name: &str, bytes: &[u8]) -> io::Result<StagedFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(StagedFile {
            name: name.to_string(),
            file,
        })
    }

    fn trigger(&self, handle: &StagedFile) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let partial = NamedTempFile::new_in(&self.dir)?;
        fs::copy(handle.path(), partial.path())?;
        partial
            .persist(self.dir.join(&handle.name))
            .map_err(|e| e.error)?;
        Ok(())
    }

    fn release(&self, handle: StagedFile) {
        tracing::debug!(path = %handle.path().display(), "releasing staged document");
        drop(handle);
    }
}

pub struct DocumentGenerator<B: Backend, S: SaveTarget> {
    backend: B,
    target: S,
    model: String,
    pending: Mutex<HashMap<DocumentKind, usize>>,
}

impl<B: Backend, S: SaveTarget> DocumentGenerator<B, S> {
    pub fn new(backend: B, target: S) -> Self {
        Self {
            backend,
            target,
            model: DEFAULT_MODEL.to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Whether a document of this kind is being generated. Views disable the
    /// matching control while this is true; other kinds stay available.
    pub fn is_pending(&self, kind: DocumentKind) -> bool {
        self.pending().get(&kind).is_some_and(|count| *count > 0)
    }

    /// Generate a document for `job_description` and save it.
    ///
    /// Never fails: every error is classified into the returned outcome.
    pub async fn generate(&self, kind: DocumentKind, job_description: &str) -> GenerationOutcome {
        if job_description.trim().is_empty() {
            return GenerationOutcome::MissingInput;
        }

        let _pending = Pending::enter(&self.pending, kind);
        let bytes = match self.fetch(kind, job_description).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(kind = kind.display_name(), error = %e, "document generation failed");
                return e.into();
            }
        };

        let name = kind.file_name();
        match deliver(&self.target, name, &bytes) {
            Ok(()) => {
                tracing::info!(file = name, size = bytes.len(), "document saved");
                GenerationOutcome::Downloaded(DownloadedFile {
                    name: name.to_string(),
                    bytes,
                })
            }
            Err(e) => {
                tracing::warn!(file = name, error = %e, "could not save document");
                GenerationOutcome::Failed(format!("Could not save {name}: {e}"))
            }
        }
    }

    async fn fetch(&self, kind: DocumentKind, job_description: &str) -> Result<Vec<u8>, ClientError> {
        let body = serde_json::to_value(DocumentRequest {
            job_description,
            model: &self.model,
        })?;

        tracing::debug!(endpoint = kind.endpoint(), "requesting document");
        let response = self.backend.post_json(kind.endpoint(), body).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        if response.body.is_empty() {
            return Err(ClientError::Transport("empty document body".to_string()));
        }
        Ok(response.body)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<DocumentKind, usize>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one generation of `kind` as in flight until dropped.
struct Pending<'a> {
    pending: &'a Mutex<HashMap<DocumentKind, usize>>,
    kind: DocumentKind,
}

impl<'a> Pending<'a> {
    fn enter(pending: &'a Mutex<HashMap<DocumentKind, usize>>, kind: DocumentKind) -> Self {
        *pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_insert(0) += 1;
        Self { pending, kind }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = pending.get_mut(&self.kind) {
            *count = count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::backend::RawResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::Notify;

    #[derive(Clone, Copy, PartialEq)]
    enum TriggerMode {
        Succeed,
        Fail,
        Panic,
    }

    struct RecordingTarget {
        mode: TriggerMode,
        staged: AtomicUsize,
        triggered: AtomicUsize,
        released: AtomicUsize,
    }

    impl RecordingTarget {
        fn new(mode: TriggerMode) -> Self {
            Self {
                mode,
                staged: AtomicUsize::new(0),
                triggered: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }
        }

        fn counts(&self) -> (usize, usize, usize) {
            (
                self.staged.load(Ordering::SeqCst),
                self.triggered.load(Ordering::SeqCst),
                self.released.load(Ordering::SeqCst),
            )
        }
    }

    impl SaveTarget for RecordingTarget {
        type Handle = String;

        fn stage(&self, name: &str, _bytes: &[u8]) -> io::Result<String> {
            self.staged.fetch_add(1, Ordering::SeqCst);
            Ok(format!("blob:{name}"))
        }

        fn trigger(&self, _handle: &String) -> io::Result<()> {
            self.triggered.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                TriggerMode::Succeed => Ok(()),
                TriggerMode::Fail => Err(io::Error::other("save dialog closed")),
                TriggerMode::Panic => panic!("save trigger blew up"),
            }
        }

        fn release(&self, _handle: String) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn docx_reply() -> Result<RawResponse, ClientError> {
        Ok(RawResponse::new(200, b"PK\x03\x04fake-docx".to_vec()))
    }

    #[tokio::test]
    async fn test_blank_job_description_makes_no_request() {
        let generator = DocumentGenerator::new(
            ScriptedBackend::new(),
            RecordingTarget::new(TriggerMode::Succeed),
        );

        assert_eq!(
            generator.generate(DocumentKind::Cv, "  \n").await,
            GenerationOutcome::MissingInput
        );
        assert!(generator.backend.calls().is_empty());
        assert_eq!(generator.target.counts(), (0, 0, 0));
        assert!(GenerationOutcome::MissingInput.user_message().is_some());
    }

    #[tokio::test]
    async fn test_success_saves_with_fixed_name() {
        let backend = ScriptedBackend::new().reply(docx_reply());
        let generator = DocumentGenerator::new(backend, RecordingTarget::new(TriggerMode::Succeed))
            .with_model("gpt-4o");

        let outcome = generator
            .generate(DocumentKind::CoverLetter, "Senior Rust engineer")
            .await;

        assert_eq!(
            outcome,
            GenerationOutcome::Downloaded(DownloadedFile {
                name: "Cover_Letter.docx".to_string(),
                bytes: b"PK\x03\x04fake-docx".to_vec(),
            })
        );
        assert_eq!(outcome.user_message(), None);
        assert_eq!(generator.target.counts(), (1, 1, 1));

        let calls = generator.backend.calls();
        assert_eq!(calls[0].path, "/generate-cover-letter");
        assert_eq!(
            calls[0].body,
            json!({"job_description": "Senior Rust engineer", "model": "gpt-4o"})
        );
        assert!(!generator.is_pending(DocumentKind::CoverLetter));
    }

    #[tokio::test]
    async fn test_guardrail_detail_is_rejected() {
        let backend = ScriptedBackend::new()
            .reply_json(400, json!({"detail": "Role not relevant to candidate"}));
        let generator = DocumentGenerator::new(backend, RecordingTarget::new(TriggerMode::Succeed));

        let outcome = generator.generate(DocumentKind::Cv, "Head chef").await;
        assert_eq!(
            outcome,
            GenerationOutcome::Rejected("Role not relevant to candidate".to_string())
        );
        assert!(outcome.user_message().unwrap().contains("skillset"));
        assert_eq!(generator.target.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_other_detail_is_failed_verbatim() {
        let backend = ScriptedBackend::new().reply_json(400, json!({"detail": "Server exploded"}));
        let generator = DocumentGenerator::new(backend, RecordingTarget::new(TriggerMode::Succeed));

        assert_eq!(
            generator.generate(DocumentKind::Cv, "Backend developer").await,
            GenerationOutcome::Failed("Server exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_unparsable_error_and_transport_failure_are_generic() {
        let backend = ScriptedBackend::new()
            .reply(Ok(RawResponse::new(500, "Internal Server Error")))
            .reply(Err(ClientError::Transport("connection reset".to_string())))
            .reply(Ok(RawResponse::new(200, Vec::new())));
        let generator = DocumentGenerator::new(backend, RecordingTarget::new(TriggerMode::Succeed));
        let generic = ClientError::Transport(String::new()).user_message();

        for _ in 0..3 {
            assert_eq!(
                generator.generate(DocumentKind::Cv, "Data scientist").await,
                GenerationOutcome::Failed(generic.clone())
            );
        }
        assert_eq!(generator.target.counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_failed_trigger_still_releases() {
        let backend = ScriptedBackend::new().reply(docx_reply());
        let generator = DocumentGenerator::new(backend, RecordingTarget::new(TriggerMode::Fail));

        let outcome = generator.generate(DocumentKind::Cv, "ML engineer").await;
        assert!(matches!(outcome, GenerationOutcome::Failed(ref m) if m.contains("Tailored_CV.docx")));
        assert_eq!(generator.target.counts(), (1, 1, 1));
    }

    #[test]
    fn test_panicking_trigger_still_releases() {
        let target = RecordingTarget::new(TriggerMode::Panic);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            deliver(&target, "Tailored_CV.docx", b"bytes")
        }));
        assert!(result.is_err());
        assert_eq!(target.counts(), (1, 1, 1));
    }

    #[test]
    fn test_directory_saver_writes_document() {
        let dir = tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path().join("downloads"));

        let handle = saver.stage("Tailored_CV.docx", b"docx bytes").unwrap();
        let staged_path = handle.path().to_path_buf();
        assert!(staged_path.exists());

        saver.trigger(&handle).unwrap();
        saver.release(handle);

        assert!(!staged_path.exists());
        let saved = fs::read(saver.dir().join("Tailored_CV.docx")).unwrap();
        assert_eq!(saved, b"docx bytes");
        assert_eq!(fs::read_dir(saver.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_directory_saver_overwrites_previous_document() {
        let dir = tempdir().unwrap();
        let saver = DirectorySaver::new(dir.path());

        deliver(&saver, "Cover_Letter.docx", b"first").unwrap();
        deliver(&saver, "Cover_Letter.docx", b"second").unwrap();

        let saved = fs::read(dir.path().join("Cover_Letter.docx")).unwrap();
        assert_eq!(saved, b"second");
    }

    struct SlowBackend {
        release: Notify,
    }

    #[async_trait]
    impl Backend for SlowBackend {
        async fn post_json(
            &self,
            _path: &str,
            _body: serde_json::Value,
        ) -> Result<RawResponse, ClientError> {
            self.release.notified().await;
            docx_reply()
        }

        async fn get(&self, _path: &str) -> Result<RawResponse, ClientError> {
            Err(ClientError::Transport("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_pending_is_tracked_per_kind() {
        let generator = DocumentGenerator::new(
            SlowBackend {
                release: Notify::new(),
            },
            RecordingTarget::new(TriggerMode::Succeed),
        );

        let (outcome, ()) = tokio::join!(generator.generate(DocumentKind::Cv, "Rust"), async {
            assert!(generator.is_pending(DocumentKind::Cv));
            assert!(!generator.is_pending(DocumentKind::CoverLetter));
            generator.backend.release.notify_one();
        });

        assert!(outcome.is_downloaded());
        assert!(!generator.is_pending(DocumentKind::Cv));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DocumentKind::Cv.endpoint(), "/generate-cv");
        assert_eq!(DocumentKind::CoverLetter.endpoint(), "/generate-cover-letter");
        assert_ne!(
            DocumentKind::Cv.file_name(),
            DocumentKind::CoverLetter.file_name()
        );
        assert_eq!(DocumentKind::all().len(), 2);
    }
}
