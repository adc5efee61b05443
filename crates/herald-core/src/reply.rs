//! Outbound reply payloads.
//!
//! A [`Reply`] is transport-neutral: plain text, a rich card with fields, or
//! an error notice. Transports decide how each form is rendered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reply sent back for an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Reply {
    /// Plain text.
    Text(String),
    /// A structured card.
    Rich(RichContent),
    /// An error notice produced by the engine.
    Error(ErrorContent),
}

impl Reply {
    /// Creates a plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Creates an error reply.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorContent::new(title, message))
    }

    /// Returns the text content, if this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<String> for Reply {
    fn from(content: String) -> Self {
        Self::Text(content)
    }
}

impl From<&str> for Reply {
    fn from(content: &str) -> Self {
        Self::Text(content.to_string())
    }
}

impl From<RichContent> for Reply {
    fn from(content: RichContent) -> Self {
        Self::Rich(content)
    }
}

impl From<ErrorContent> for Reply {
    fn from(content: ErrorContent) -> Self {
        Self::Error(content)
    }
}

/// Renders a plain-text approximation, suitable for terminals and logs.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Rich(rich) => rich.fmt(f),
            Self::Error(error) => write!(f, "{}: {}", error.title, error.message),
        }
    }
}

// ============================================================================
// Rich content
// ============================================================================

/// A named field inside a [`RichContent`] card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A structured card: optional title and description, ordered fields, footer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// RGB accent colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl RichContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a block field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    /// Appends an inline field.
    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

impl fmt::Display for RichContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(format!("# {title}"));
        }
        if let Some(description) = &self.description {
            lines.push(description.clone());
        }
        for field in &self.fields {
            lines.push(format!("{}: {}", field.name, field.value));
        }
        if let Some(footer) = &self.footer {
            lines.push(format!("-- {footer}"));
        }
        f.write_str(&lines.join("\n"))
    }
}

// ============================================================================
// Error content
// ============================================================================

/// An error notice: a short title plus a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub title: String,
    pub message: String,
}

impl ErrorContent {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}
