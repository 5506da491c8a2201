use serde::{Deserialize, Serialize};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    User,
    Assistant,
}

/// One role/content entry of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Image supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// `data:<mime>;base64,<payload>`
    DataUri(String),
    /// Bare base64 payload with an optional declared MIME type
    Base64 { data: String, mime_type: Option<String> },
}

impl ImageInput {
    /// Accept either a data URI or a bare base64 payload
    pub fn parse(input: impl Into<String>) -> Self {
        let input = input.into();
        if input.starts_with("data:") {
            Self::DataUri(input)
        } else {
            Self::Base64 {
                data: input,
                mime_type: None,
            }
        }
    }
}

/// Decoded image ready to attach to a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// MIME type sniffed from the image bytes
    pub mime_type: String,
    /// Canonical base64 encoding of the bytes
    pub data: String,
}
