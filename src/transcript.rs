//! Conversation transcript
//!
//! Ordered, role-tagged messages for one session, plus the conversion into
//! Responses API input.

use serde::{Deserialize, Serialize};

use crate::image::ReferenceImage;
use crate::responses::{InputMessage, InputPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The most recent `n` messages
    pub fn window(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Completion input for a conversational turn
    ///
    /// The reference image rides on the newest user message, image part first.
    pub fn to_input(&self, window: usize, image: Option<&ReferenceImage>) -> Vec<InputMessage> {
        let messages = self.window(window);
        let newest_user = messages.iter().rposition(|m| m.role == Role::User);

        messages
            .iter()
            .enumerate()
            .map(|(i, m)| match image {
                Some(img) if Some(i) == newest_user => with_image(m.role.as_str(), &m.content, img),
                _ => InputMessage::text(m.role.as_str(), m.content.clone()),
            })
            .collect()
    }
}

/// A user message carrying the reference image followed by its text
pub fn with_image(role: &str, text: &str, image: &ReferenceImage) -> InputMessage {
    InputMessage::parts(
        role,
        vec![
            InputPart::InputImage {
                image_url: image.data_uri().to_string(),
            },
            InputPart::InputText {
                text: text.to_string(),
            },
        ],
    )
}
