//! Inbound interactions.
//!
//! An [`Interaction`] is what a transport hands to the engine: a routing
//! label, the raw options the user typed, and who typed them where.
//!
//! ```rust
//! use herald_core::Interaction;
//!
//! let interaction = Interaction::command("greet", "alice", "general")
//!     .option("name", "Alice")
//!     .in_guild("guild-1");
//!
//! assert_eq!(interaction.label(), "greet");
//! assert_eq!(interaction.option_value("name"), Some("Alice"));
//! assert_eq!(interaction.session_key().user_id, "alice");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Session Key
// ============================================================================

/// Identifies the session an interaction belongs to: the invoking user in the
/// originating channel.
///
/// Runtimes (and therefore controller instances) are scoped to this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    /// The invoking user.
    pub user_id: String,
    /// The channel the interaction originated from.
    pub channel_id: String,
}

impl SessionKey {
    /// Creates a new session key.
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.channel_id)
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// Discriminates ordinary command invocations from help requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// A command invocation routed by label.
    #[default]
    Command,
    /// A help request. The option values name the command help is wanted for.
    Help,
}

/// A single raw option as supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOption {
    /// Option name, matched against parameter names.
    pub name: String,
    /// The untyped value.
    pub value: String,
}

impl RawOption {
    /// Creates a new raw option.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An inbound interaction event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Transport-assigned identifier, used to correlate replies.
    #[serde(default)]
    id: String,
    /// Fully-qualified routing label (space-joined path segments).
    label: String,
    /// Raw options in the order they were supplied.
    #[serde(default)]
    options: Vec<RawOption>,
    user_id: String,
    channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guild_id: Option<String>,
    #[serde(default)]
    kind: InteractionKind,
}

impl Interaction {
    /// Creates a command interaction for `label`.
    pub fn command(
        label: impl Into<String>,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            options: Vec::new(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            kind: InteractionKind::Command,
        }
    }

    /// Creates a help interaction.
    ///
    /// Add options to name the command help is wanted for; with no options the
    /// generic help is rendered.
    pub fn help(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            kind: InteractionKind::Help,
            ..Self::command(String::new(), user_id, channel_id)
        }
    }

    /// Sets the transport-assigned identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Appends a raw option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(RawOption::new(name, value));
        self
    }

    /// Marks the interaction as originating inside a guild.
    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn options(&self) -> &[RawOption] {
        &self.options
    }

    /// Returns the value of the first option named `name`.
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|opt| opt.name == name)
            .map(|opt| opt.value.as_str())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    /// Returns `true` if the interaction originated inside a guild.
    pub fn is_from_guild(&self) -> bool {
        self.guild_id.is_some()
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    pub fn is_help(&self) -> bool {
        self.kind == InteractionKind::Help
    }

    /// Returns the label a help interaction asks about: all option values
    /// joined by single spaces. Empty for generic help.
    pub fn help_target(&self) -> String {
        self.options
            .iter()
            .map(|opt| opt.value.trim())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns the session this interaction belongs to.
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.user_id, &self.channel_id)
    }
}
