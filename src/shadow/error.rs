//! Error type for shadow operations

use thiserror::Error;

/// Errors raised by the store, the apply gateway, the registry and the actor
#[derive(Debug, Error)]
pub enum ShadowError {
    /// A key path collides with an entry of the other shape (group vs leaf)
    #[error("key '{key}' is already used by an entry of another shape")]
    KeyConflict { key: String },

    /// Applied document is not a dictionary
    #[error("invalid shadow document: expected an object, got {found}")]
    InvalidDocument { found: &'static str },

    /// Applied text is not valid JSON
    #[error("invalid json shadow: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown thing '{0}'")]
    UnknownThing(String),

    #[error("thing '{0}' already exists")]
    DuplicateThing(String),

    /// Sensor-only things reject externally supplied states
    #[error("thing '{0}' does not accept state updates")]
    NotWritable(String),

    /// Registry no longer accepts listeners or updates
    #[error("thing registry is closed")]
    RegistryClosed,

    /// Shadow feature disabled by configuration
    #[error("shadow is disabled")]
    Disabled,

    #[error("shadow actor is not running")]
    ActorUnavailable,
}

impl ShadowError {
    /// Name of the JSON kind found where an object was expected
    pub fn json_kind(value: &serde_json::Value) -> &'static str {
        match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        }
    }
}
