//! Session data types.

use crate::history::History;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one browser session, carried in the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A remote file reference waiting to be merged into the next user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttachment {
    /// URI the remote model resolves the file by.
    pub remote_file_id: String,
    /// Original upload file name, shown in the logged turn text.
    pub display_name: String,
    pub mime_type: String,
}

/// Server-held state of one browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub history: History,
    #[serde(default)]
    pub pending_attachment: Option<PendingAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            history: History::new(),
            pending_attachment: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Session {
    /// Remove and return the pending attachment, if any.
    pub fn take_attachment(&mut self) -> Option<PendingAttachment> {
        self.pending_attachment.take()
    }

    /// Replace any pending attachment with `attachment`.
    pub fn set_attachment(&mut self, attachment: PendingAttachment) {
        self.pending_attachment = Some(attachment);
    }

    /// True when there is neither history nor a pending attachment.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.pending_attachment.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str) -> PendingAttachment {
        PendingAttachment {
            remote_file_id: format!("https://files.example/{name}"),
            display_name: name.to_string(),
            mime_type: "application/pdf".into(),
        }
    }

    #[test]
    fn default_session_is_empty() {
        let session = Session::default();
        assert!(session.is_empty());
        assert!(session.history.is_empty());
        assert!(session.pending_attachment.is_none());
    }

    #[test]
    fn take_attachment_consumes_it() {
        let mut session = Session::default();
        session.set_attachment(attachment("report.pdf"));
        assert_eq!(
            session.take_attachment().map(|a| a.display_name),
            Some("report.pdf".to_string())
        );
        assert!(session.take_attachment().is_none());
    }

    #[test]
    fn set_attachment_overwrites_previous() {
        let mut session = Session::default();
        session.set_attachment(attachment("a.pdf"));
        session.set_attachment(attachment("b.pdf"));
        assert_eq!(
            session.pending_attachment.as_ref().map(|a| a.display_name.as_str()),
            Some("b.pdf")
        );
    }

    #[test]
    fn session_id_parses_its_display_form() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn session_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }
}
