//! Rebuilding the outgoing transcript from stored history.

use parley_session::{History, PendingAttachment};
use parley_types::{Content, FileData, Part, Role};

/// The transcript to send plus the text to record for the new user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTurn {
    pub contents: Vec<Content>,
    pub logged_text: String,
}

/// History text for a user turn that carried an attachment.
pub fn attachment_label(display_name: &str, user_text: &str) -> String {
    format!("[Attached: {display_name}] {user_text}")
}

/// Build the new user content, merging `attachment` as a leading file part.
pub fn user_content(user_text: &str, attachment: Option<&PendingAttachment>) -> (Content, String) {
    match attachment {
        Some(att) => {
            let content = Content {
                role: Role::User,
                parts: vec![
                    Part::FileData(FileData {
                        mime_type: att.mime_type.clone(),
                        file_uri: att.remote_file_id.clone(),
                    }),
                    Part::Text(user_text.to_string()),
                ],
            };
            (content, attachment_label(&att.display_name, user_text))
        }
        None => (Content::text(Role::User, user_text), user_text.to_string()),
    }
}

/// Replay `history` in order and append the new user turn.
pub fn prepare_turn(
    history: &History,
    user_text: &str,
    attachment: Option<&PendingAttachment>,
) -> PreparedTurn {
    let mut contents = history.to_contents();
    let (content, logged_text) = user_content(user_text, attachment);
    contents.push(content);
    PreparedTurn {
        contents,
        logged_text,
    }
}
