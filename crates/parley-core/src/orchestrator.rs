//! The conversation orchestrator: stateless replay of bounded history.

use crate::error::ChatError;
use crate::locks::SessionLocks;
use crate::transcript::prepare_turn;
use crate::uploads::{UploadDir, display_name};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parley_api::{PollConfig, wait_until_active};
use parley_session::{PendingAttachment, Session, SessionId, SessionStore};
use parley_types::{GenerationConfig, GenerativeModel, RemoteFile, preview};
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    pub filename: String,
}

/// Handles chat, upload and reset requests for browser sessions.
///
/// The remote model keeps no conversation state, so every chat call resends
/// the stored history. History is only written back after a successful reply.
pub struct Orchestrator {
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn SessionStore>,
    uploads: UploadDir,
    generation: GenerationConfig,
    poll: PollConfig,
    locks: SessionLocks,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn SessionStore>,
        uploads: UploadDir,
        generation: GenerationConfig,
        poll: PollConfig,
    ) -> Self {
        Self {
            model,
            store,
            uploads,
            generation,
            poll,
            locks: SessionLocks::new(),
        }
    }

    /// The stored session for `id`, or an empty one.
    ///
    /// Empty sessions are not written back; one is persisted by the first
    /// successful chat or upload.
    pub async fn ensure_session(&self, id: SessionId) -> Result<Session, ChatError> {
        let _guard = self.locks.lock(id).await;
        Ok(self.store.get(id).await?)
    }

    /// Current state of a session, without modifying it.
    pub async fn session(&self, id: SessionId) -> Result<Session, ChatError> {
        Ok(self.store.get(id).await?)
    }

    /// Send `user_text` (plus any pending attachment) with the full history.
    pub async fn handle_chat(&self, id: SessionId, user_text: &str) -> Result<String, ChatError> {
        let _guard = self.locks.lock(id).await;
        let mut session = self.store.get(id).await?;

        if user_text.trim().is_empty() && session.pending_attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let turn = prepare_turn(
            &session.history,
            user_text,
            session.pending_attachment.as_ref(),
        );
        tracing::debug!(
            "Session {}: sending {} contents to {} ({})",
            id.short(),
            turn.contents.len(),
            self.model.name(),
            preview(&turn.logged_text, 80)
        );

        let reply = match self.model.generate(&turn.contents, &self.generation).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Model call failed for session {}: {e}", id.short());
                return Err(e.into());
            }
        };

        session.take_attachment();
        session.history.record_exchange(turn.logged_text, reply.clone());
        session.touch();
        self.store.put(id, &session).await?;

        Ok(reply)
    }

    /// Store a file locally, host it remotely, and mark it pending for `id`.
    pub async fn handle_upload(
        &self,
        id: SessionId,
        data: Bytes,
        filename: &str,
    ) -> Result<UploadAck, ChatError> {
        let name = display_name(filename);
        if name.is_empty() {
            return Err(ChatError::InvalidUpload("No file selected".into()));
        }
        if data.is_empty() {
            return Err(ChatError::InvalidUpload(format!("{name} is empty")));
        }

        let mime_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let path = self.uploads.store(name, &data).await?;
        tracing::info!(
            "Session {}: stored upload {name} ({} bytes, {mime_type}) at {}",
            id.short(),
            data.len(),
            path.display()
        );

        let hosted = self.host_file(data, name, &mime_type).await;
        if let Err(e) = self.uploads.remove(&path).await {
            tracing::warn!("Failed to remove local copy {}: {e}", path.display());
        }
        let ready = hosted?;

        let attachment = PendingAttachment {
            remote_file_id: ready.uri,
            display_name: name.to_string(),
            mime_type: if ready.mime_type.is_empty() {
                mime_type
            } else {
                ready.mime_type
            },
        };

        let _guard = self.locks.lock(id).await;
        let mut session = self.store.get(id).await?;
        session.set_attachment(attachment);
        session.touch();
        self.store.put(id, &session).await?;

        Ok(UploadAck {
            filename: name.to_string(),
        })
    }

    async fn host_file(
        &self,
        data: Bytes,
        name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ChatError> {
        let remote = self
            .model
            .upload_file(data, name, mime_type)
            .await
            .inspect_err(|e| tracing::error!("Remote upload of {name} failed: {e}"))?;
        let ready = wait_until_active(self.model.as_ref(), remote, &self.poll)
            .await
            .inspect_err(|e| tracing::error!("Uploaded file {name} never became usable: {e}"))?;
        Ok(ready)
    }

    /// Remove sessions idle for longer than `max_idle`.
    pub async fn prune_idle(&self, max_idle: Duration) -> Result<usize, ChatError> {
        let cutoff = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.prune_idle(cutoff).await?;
        if removed > 0 {
            tracing::info!("Pruned {removed} idle sessions from {} store", self.store.name());
        }
        Ok(removed)
    }

    /// Drop all history and any pending attachment. Idempotent.
    pub async fn clear(&self, id: SessionId) -> Result<(), ChatError> {
        let _guard = self.locks.lock(id).await;
        self.store.clear(id).await?;
        tracing::debug!("Session {} cleared", id.short());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_session::{MAX_HISTORY_TURNS, MemorySessionStore};
    use parley_types::provider::ModelFuture;
    use parley_types::{ApiError, Content, FileState, Part, Role, Turn};
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Model double: replies from a queue and records every transcript sent.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ApiError>>>,
        requests: Mutex<Vec<Vec<Content>>>,
        uploads: Mutex<Vec<(String, String)>>,
        final_state: Mutex<Option<FileState>>,
    }

    impl ScriptedModel {
        fn replying(replies: Vec<Result<String, ApiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<Vec<Content>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl GenerativeModel for ScriptedModel {
        fn generate<'a>(
            &'a self,
            contents: &'a [Content],
            _config: &'a GenerationConfig,
        ) -> ModelFuture<'a, String> {
            self.requests.lock().unwrap().push(contents.to_vec());
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()));
            Box::pin(async move { next })
        }

        fn upload_file<'a>(
            &'a self,
            _data: Bytes,
            display_name: &'a str,
            mime_type: &'a str,
        ) -> ModelFuture<'a, RemoteFile> {
            self.uploads
                .lock()
                .unwrap()
                .push((display_name.to_string(), mime_type.to_string()));
            let file = RemoteFile {
                name: "files/abc".into(),
                uri: "https://files.example/abc".into(),
                mime_type: mime_type.to_string(),
                display_name: display_name.to_string(),
                state: FileState::Processing,
            };
            Box::pin(async move { Ok(file) })
        }

        fn get_file<'a>(&'a self, name: &'a str) -> ModelFuture<'a, RemoteFile> {
            let state = self.final_state.lock().unwrap().unwrap_or(FileState::Active);
            let file = RemoteFile {
                name: name.to_string(),
                uri: "https://files.example/abc".into(),
                mime_type: String::new(),
                display_name: String::new(),
                state,
            };
            Box::pin(async move { Ok(file) })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        model: Arc<ScriptedModel>,
        store: Arc<MemorySessionStore>,
        uploads_root: PathBuf,
        _tmp: TempDir,
    }

    async fn harness(model: ScriptedModel) -> Harness {
        let tmp = TempDir::new().unwrap();
        let model = Arc::new(model);
        let store = Arc::new(MemorySessionStore::new());
        let uploads = UploadDir::new(tmp.path().join("uploads")).await.unwrap();
        let uploads_root = uploads.root().to_path_buf();
        let orchestrator = Orchestrator::new(
            model.clone(),
            store.clone(),
            uploads,
            GenerationConfig::default(),
            PollConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                backoff_factor: 1.0,
            },
        );
        Harness {
            orchestrator,
            model,
            store,
            uploads_root,
            _tmp: tmp,
        }
    }

    fn stored_uploads(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    fn texts(session: &Session) -> Vec<String> {
        session
            .history
            .iter()
            .map(|t| t.text().to_string())
            .collect()
    }

    #[tokio::test]
    async fn chat_records_exchange_and_returns_reply() {
        let h = harness(ScriptedModel::replying(vec![Ok("Hi there".into())])).await;
        let id = SessionId::new();

        let reply = h.orchestrator.handle_chat(id, "Hello").await.unwrap();
        assert_eq!(reply, "Hi there");

        let session = h.orchestrator.session(id).await.unwrap();
        assert_eq!(
            session.history.turns(),
            &[Turn::user("Hello"), Turn::model("Hi there")]
        );
    }

    #[tokio::test]
    async fn chat_replays_full_history_each_call() {
        let h = harness(ScriptedModel::replying(vec![
            Ok("a1".into()),
            Ok("a2".into()),
        ]))
        .await;
        let id = SessionId::new();

        h.orchestrator.handle_chat(id, "q1").await.unwrap();
        h.orchestrator.handle_chat(id, "q2").await.unwrap();

        let requests = h.model.requests();
        assert_eq!(requests[0], vec![Content::text(Role::User, "q1")]);
        assert_eq!(
            requests[1],
            vec![
                Content::text(Role::User, "q1"),
                Content::text(Role::Model, "a1"),
                Content::text(Role::User, "q2"),
            ]
        );
    }

    #[tokio::test]
    async fn history_caps_at_twenty_keeping_the_newest() {
        let h = harness(ScriptedModel::default()).await;
        let id = SessionId::new();

        for i in 1..=11 {
            h.orchestrator.handle_chat(id, &format!("q{i}")).await.unwrap();
            let session = h.orchestrator.session(id).await.unwrap();
            assert!(session.history.len() <= MAX_HISTORY_TURNS);
        }

        let session = h.orchestrator.session(id).await.unwrap();
        assert_eq!(session.history.len(), 20);
        let texts = texts(&session);
        assert_eq!(texts[0], "q2");
        assert_eq!(texts[18], "q11");
        // The 12th call replays exactly the bounded window.
        h.orchestrator.handle_chat(id, "q12").await.unwrap();
        assert_eq!(h.model.requests().last().unwrap().len(), 21);
    }

    #[tokio::test]
    async fn remote_failure_leaves_history_unchanged() {
        let h = harness(ScriptedModel::replying(vec![
            Ok("a1".into()),
            Err(ApiError::Server {
                status: 503,
                message: "unavailable".into(),
            }),
        ]))
        .await;
        let id = SessionId::new();

        h.orchestrator.handle_chat(id, "q1").await.unwrap();
        let before = h.orchestrator.session(id).await.unwrap().history;

        let err = h.orchestrator.handle_chat(id, "q2").await.unwrap_err();
        assert!(matches!(err, ChatError::Remote(ApiError::Server { .. })));
        assert!(!err.is_client_error());

        let after = h.orchestrator.session(id).await.unwrap().history;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_remote_call() {
        let h = harness(ScriptedModel::default()).await;
        let err = h
            .orchestrator
            .handle_chat(SessionId::new(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(h.model.requests().is_empty());
    }

    #[tokio::test]
    async fn upload_then_chat_merges_attachment_once() {
        let h = harness(ScriptedModel::replying(vec![
            Ok("It is a report.".into()),
            Ok("You're welcome.".into()),
        ]))
        .await;
        let id = SessionId::new();

        let ack = h
            .orchestrator
            .handle_upload(id, Bytes::from_static(b"%PDF-1.4"), "report.pdf")
            .await
            .unwrap();
        assert_eq!(ack.filename, "report.pdf");
        assert_eq!(
            h.model.uploads.lock().unwrap()[0],
            ("report.pdf".to_string(), "application/pdf".to_string())
        );

        let pending = h.orchestrator.session(id).await.unwrap().pending_attachment;
        assert_eq!(
            pending.as_ref().map(|a| a.remote_file_id.as_str()),
            Some("https://files.example/abc")
        );

        h.orchestrator.handle_chat(id, "Summarize this").await.unwrap();
        let session = h.orchestrator.session(id).await.unwrap();
        assert_eq!(texts(&session)[0], "[Attached: report.pdf] Summarize this");
        assert!(session.pending_attachment.is_none());

        let first = h.model.requests()[0].clone();
        assert!(matches!(first[0].parts[0], Part::FileData(_)));

        h.orchestrator.handle_chat(id, "Thanks").await.unwrap();
        let second = h.model.requests()[1].clone();
        assert_eq!(second.last().unwrap(), &Content::text(Role::User, "Thanks"));
        let file_parts = second
            .iter()
            .flat_map(|c| &c.parts)
            .filter(|p| matches!(p, Part::FileData(_)))
            .count();
        assert_eq!(file_parts, 0);
        assert_eq!(texts(&h.orchestrator.session(id).await.unwrap())[2], "Thanks");
    }

    #[tokio::test]
    async fn failed_chat_keeps_pending_attachment() {
        let h = harness(ScriptedModel::replying(vec![Err(ApiError::Timeout)])).await;
        let id = SessionId::new();

        h.orchestrator
            .handle_upload(id, Bytes::from_static(b"data"), "notes.txt")
            .await
            .unwrap();
        assert!(h.orchestrator.handle_chat(id, "Read it").await.is_err());

        let session = h.orchestrator.session(id).await.unwrap();
        assert!(session.history.is_empty());
        assert!(session.pending_attachment.is_some());
    }

    #[tokio::test]
    async fn second_upload_replaces_pending_attachment() {
        let h = harness(ScriptedModel::default()).await;
        let id = SessionId::new();

        h.orchestrator
            .handle_upload(id, Bytes::from_static(b"a"), "first.txt")
            .await
            .unwrap();
        h.orchestrator
            .handle_upload(id, Bytes::from_static(b"b"), "second.txt")
            .await
            .unwrap();

        let pending = h.orchestrator.session(id).await.unwrap().pending_attachment.unwrap();
        assert_eq!(pending.display_name, "second.txt");
    }

    #[tokio::test]
    async fn upload_attachment_alone_is_a_valid_chat() {
        let h = harness(ScriptedModel::default()).await;
        let id = SessionId::new();
        h.orchestrator
            .handle_upload(id, Bytes::from_static(b"x"), "photo.png")
            .await
            .unwrap();

        h.orchestrator.handle_chat(id, "").await.unwrap();
        let session = h.orchestrator.session(id).await.unwrap();
        assert_eq!(texts(&session)[0], "[Attached: photo.png] ");
    }

    #[tokio::test]
    async fn upload_without_filename_is_invalid() {
        let h = harness(ScriptedModel::default()).await;
        let id = SessionId::new();
        let err = h
            .orchestrator
            .handle_upload(id, Bytes::from_static(b"x"), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidUpload(_)));
        assert!(err.is_client_error());
        assert!(h.orchestrator.session(id).await.unwrap().pending_attachment.is_none());
    }

    #[tokio::test]
    async fn upload_that_fails_processing_sets_no_attachment() {
        let model = ScriptedModel::default();
        *model.final_state.lock().unwrap() = Some(FileState::Failed);
        let h = harness(model).await;
        let id = SessionId::new();

        let err = h
            .orchestrator
            .handle_upload(id, Bytes::from_static(b"x"), "broken.pdf")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Remote(ApiError::FileProcessingFailed { .. })
        ));
        assert!(h.orchestrator.session(id).await.unwrap().pending_attachment.is_none());
    }

    #[tokio::test]
    async fn upload_that_never_becomes_ready_times_out() {
        let model = ScriptedModel::default();
        *model.final_state.lock().unwrap() = Some(FileState::Processing);
        let h = harness(model).await;

        let err = h
            .orchestrator
            .handle_upload(SessionId::new(), Bytes::from_static(b"x"), "slow.mp4")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Remote(ApiError::FileNotReady { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn clear_then_ensure_yields_empty_session() {
        let h = harness(ScriptedModel::default()).await;
        let id = SessionId::new();
        h.orchestrator.handle_chat(id, "q1").await.unwrap();
        h.orchestrator
            .handle_upload(id, Bytes::from_static(b"x"), "notes.txt")
            .await
            .unwrap();

        h.orchestrator.clear(id).await.unwrap();
        h.orchestrator.clear(id).await.unwrap();

        let session = h.orchestrator.ensure_session(id).await.unwrap();
        assert!(session.history.is_empty());
        assert!(session.pending_attachment.is_none());
    }

    #[tokio::test]
    async fn concurrent_chats_in_one_session_lose_nothing() {
        let h = harness(ScriptedModel::default()).await;
        let orchestrator = Arc::new(h.orchestrator);
        let id = SessionId::new();

        let mut handles = Vec::new();
        for i in 0..5 {
            let orchestrator = Arc::clone(&orchestrator);
            handles.push(tokio::spawn(async move {
                orchestrator.handle_chat(id, &format!("q{i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = orchestrator.session(id).await.unwrap();
        assert_eq!(session.history.len(), 10);
    }

    #[tokio::test]
    async fn ensure_session_does_not_store_empty_sessions() {
        let h = harness(ScriptedModel::default()).await;
        for _ in 0..50 {
            let session = h.orchestrator.ensure_session(SessionId::new()).await.unwrap();
            assert!(session.is_empty());
        }
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn local_copy_removed_after_successful_upload() {
        let h = harness(ScriptedModel::default()).await;
        h.orchestrator
            .handle_upload(SessionId::new(), Bytes::from_static(b"x"), "notes.txt")
            .await
            .unwrap();
        assert_eq!(stored_uploads(&h.uploads_root), 0);
    }

    #[tokio::test]
    async fn local_copy_removed_after_failed_upload() {
        let model = ScriptedModel::default();
        *model.final_state.lock().unwrap() = Some(FileState::Failed);
        let h = harness(model).await;
        assert!(h
            .orchestrator
            .handle_upload(SessionId::new(), Bytes::from_static(b"x"), "broken.pdf")
            .await
            .is_err());
        assert_eq!(stored_uploads(&h.uploads_root), 0);
    }

    #[tokio::test]
    async fn prune_idle_keeps_recent_sessions() {
        let h = harness(ScriptedModel::default()).await;
        let recent = SessionId::new();
        h.orchestrator.handle_chat(recent, "q1").await.unwrap();

        let mut stale = Session::default();
        stale.history.record_exchange("old", "older");
        stale.updated_at = Utc::now() - chrono::Duration::days(2);
        let stale_id = SessionId::new();
        h.store.put(stale_id, &stale).await.unwrap();

        let removed = h
            .orchestrator
            .prune_idle(Duration::from_secs(24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(h.orchestrator.session(stale_id).await.unwrap().is_empty());
        assert_eq!(h.orchestrator.session(recent).await.unwrap().history.len(), 2);
    }
}
