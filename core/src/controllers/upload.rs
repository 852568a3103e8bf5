use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::ApiClient;
use crate::client::ProminisClient;
use crate::error::ApiError;
use crate::http::{FilePart, HttpRequest};
use crate::notify::Notifier;
use crate::sequence::RequestSequence;
use crate::types::UploadResult;
use crate::validation::{file_size_ok, file_type_ok, DEFAULT_MAX_FILE_MB};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    pub uploading: bool,
    /// 0 while idle or in flight, 100 once the server accepted the file.
    pub progress: u8,
    pub error: Option<String>,
}

/// Limits checked before a file is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_mb: u64,
    /// Accepted content types; empty accepts any.
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_mb: DEFAULT_MAX_FILE_MB,
            allowed_types: Vec::new(),
        }
    }
}

impl UploadPolicy {
    pub fn with_allowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn check(&self, part: &FilePart) -> Result<(), ApiError> {
        if !file_size_ok(part.len() as u64, self.max_mb) {
            return Err(ApiError::InvalidFile(format!(
                "File size must be less than {}MB",
                self.max_mb
            )));
        }
        if !self.allowed_types.is_empty() && !file_type_ok(&part.content_type, &self.allowed_types) {
            return Err(ApiError::InvalidFile(format!(
                "File type {} is not allowed",
                part.content_type
            )));
        }
        Ok(())
    }
}

/// Sends files as multipart field `file`. Overlapping uploads each report
/// their own outcome; `uploading` stays set until the last one settles.
pub struct Uploader {
    api: Arc<ApiClient>,
    build: fn(&ProminisClient, FilePart) -> HttpRequest,
    policy: Option<UploadPolicy>,
    state: watch::Sender<UploadState>,
    in_flight: AtomicUsize,
    sequence: RequestSequence,
    notifier: Arc<dyn Notifier>,
}

impl Uploader {
    /// Upload to the general file endpoint.
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self::for_endpoint(api, ProminisClient::build_upload_file, notifier)
    }

    /// Upload the signed-in user's avatar.
    pub fn avatar(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self::for_endpoint(api, ProminisClient::build_upload_avatar, notifier)
    }

    pub fn for_endpoint(
        api: Arc<ApiClient>,
        build: fn(&ProminisClient, FilePart) -> HttpRequest,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::default());
        Self {
            api,
            build,
            policy: None,
            state,
            in_flight: AtomicUsize::new(0),
            sequence: RequestSequence::new(),
            notifier,
        }
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub async fn upload_file(&self, part: FilePart) -> Result<UploadResult, ApiError> {
        if let Some(policy) = &self.policy {
            if let Err(e) = policy.check(&part) {
                let message = e.display_message();
                self.state.send_modify(|state| state.error = Some(message.clone()));
                self.notifier.error(&message);
                return Err(e);
            }
        }

        let ticket = self.sequence.issue();
        tracing::debug!(file = %part.file_name, bytes = part.len(), "uploading");
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.uploading = true;
            state.progress = 0;
            state.error = None;
        });

        let request = (self.build)(self.api.endpoints(), part);
        let result = self
            .sequence
            .run(&ticket, self.api.send_json::<UploadResult>(request))
            .await;
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;

        if ticket.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        match &result {
            Ok(uploaded) => {
                tracing::debug!(url = %uploaded.url, "upload stored");
                self.state.send_modify(|state| state.progress = 100);
                self.notifier.success(UPLOAD_SUCCESS_MESSAGE);
            }
            Err(e) => {
                let message = e.display_message_or(UPLOAD_FAILED_MESSAGE);
                self.state.send_modify(|state| state.error = Some(message.clone()));
                self.notifier.error(&message);
            }
        }
        if remaining == 0 {
            self.state.send_modify(|state| {
                state.uploading = false;
                state.progress = 0;
            });
        }
        result
    }

    pub fn teardown(&self) {
        self.sequence.cancel_all();
        self.state.send_modify(|state| {
            state.uploading = false;
            state.progress = 0;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedTransport;
    use crate::http::{HttpResponse, RequestBody};
    use crate::notify::{Notice, RecordingNotifier};
    use crate::session::Session;
    use std::time::Duration;

    fn uploader(transport: Arc<ScriptedTransport>) -> (Uploader, Arc<RecordingNotifier>) {
        let api = Arc::new(ApiClient::new(
            ProminisClient::new("http://api.test"),
            transport,
            Session::in_memory(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        (Uploader::new(api, notifier.clone()), notifier)
    }

    fn pdf(bytes: usize) -> FilePart {
        FilePart::new("brief.pdf", "application/pdf", vec![0u8; bytes])
    }

    #[tokio::test]
    async fn upload_sends_multipart_and_resets_state() {
        let transport = Arc::new(ScriptedTransport::replying(vec![Ok(HttpResponse::text(
            200,
            r#"{"id":1,"url":"/files/1"}"#,
        ))]));
        let (uploader, notifier) = uploader(transport.clone());

        let uploaded = uploader.upload_file(pdf(16)).await.unwrap();
        assert_eq!(uploaded.id, Some(1));
        assert_eq!(uploaded.url, "/files/1");
        assert_eq!(uploader.state(), UploadState::default());
        assert_eq!(notifier.notices(), vec![Notice::Success(UPLOAD_SUCCESS_MESSAGE.to_string())]);

        let sent = transport.sent();
        assert!(sent[0].url.ends_with("/files/upload"));
        match &sent[0].body {
            Some(RequestBody::Multipart { field, part }) => {
                assert_eq!(field, "file");
                assert_eq!(part.file_name, "brief.pdf");
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_without_server_message_reports_upload_failed() {
        let transport = Arc::new(ScriptedTransport::replying(vec![Ok(HttpResponse::text(500, ""))]));
        let (uploader, notifier) = uploader(transport);

        assert!(uploader.upload_file(pdf(4)).await.is_err());
        let state = uploader.state();
        assert!(!state.uploading);
        assert_eq!(state.progress, 0);
        assert_eq!(state.error.as_deref(), Some(UPLOAD_FAILED_MESSAGE));
        assert_eq!(notifier.errors(), vec![UPLOAD_FAILED_MESSAGE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn uploading_is_set_while_in_flight() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedTransport::replying(vec![Ok(HttpResponse::text(200, r#"{"url":"/a.png"}"#))])
        });
        let (uploader, _) = uploader(transport);
        let uploader = Arc::new(uploader);

        let pending = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.upload_file(pdf(1)).await }
        });
        tokio::task::yield_now().await;
        assert!(uploader.state().uploading);

        let uploaded = pending.await.unwrap().unwrap();
        assert_eq!(uploaded.id, None);
        assert!(!uploader.state().uploading);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_upload_does_not_end_slow_one() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedTransport::replying(vec![
                Ok(HttpResponse::text(200, r#"{"id":1,"url":"/files/1"}"#)),
                Ok(HttpResponse::text(200, r#"{"id":2,"url":"/files/2"}"#)),
            ])
        });
        let (uploader, _) = uploader(transport);
        let uploader = Arc::new(uploader);

        let first = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.upload_file(pdf(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.upload_file(pdf(2)).await }
        });

        first.await.unwrap().unwrap();
        let state = uploader.state();
        assert!(state.uploading);
        assert_eq!(state.progress, 100);

        second.await.unwrap().unwrap();
        assert_eq!(uploader.state(), UploadState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_upload_in_flight() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(100)),
            ..ScriptedTransport::replying(vec![Ok(HttpResponse::text(200, r#"{"id":1,"url":"/files/1"}"#))])
        });
        let (uploader, notifier) = uploader(transport);
        let uploader = Arc::new(uploader);

        let pending = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.upload_file(pdf(1)).await }
        });
        tokio::task::yield_now().await;
        assert!(uploader.state().uploading);
        uploader.teardown();

        assert!(matches!(pending.await.unwrap(), Err(ApiError::Cancelled)));
        assert_eq!(uploader.state(), UploadState::default());
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn policy_rejects_before_sending() {
        let transport = Arc::new(ScriptedTransport::default());
        let (uploader, notifier) = uploader(transport.clone());
        let uploader = uploader.with_policy(UploadPolicy {
            max_mb: 1,
            ..UploadPolicy::default()
        });

        let err = uploader.upload_file(pdf(1024 * 1024 + 1)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidFile(_)));
        assert!(transport.sent().is_empty());
        assert_eq!(notifier.errors(), vec!["File size must be less than 1MB".to_string()]);
    }

    #[test]
    fn policy_checks_content_type() {
        let policy = UploadPolicy::default().with_allowed_types(["image/png"]);
        assert!(policy.check(&FilePart::new("a.png", "image/png", vec![1])).is_ok());
        assert!(policy.check(&pdf(1)).is_err());
    }
}
