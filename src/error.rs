//! Error handling for Songrack
//!
//! Control-side operations return [`SongrackError`]. The render path never
//! does: it degrades to silence instead.

use thiserror::Error;

/// Result type alias for Songrack operations
pub type Result<T> = std::result::Result<T, SongrackError>;

/// Main error type for Songrack operations
#[derive(Error, Debug)]
pub enum SongrackError {
    // Module Errors
    #[error("Unknown module type: {id}")]
    UnknownModule { id: String },

    #[error("Corrupted state for '{module_id}': expected {expected} bytes, got {actual}")]
    CorruptedState {
        module_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Node {node} does not exist in the graph")]
    MissingNode { node: String },

    // Graph Errors
    #[error("Connecting {from} to {to} would create a cycle")]
    WouldCreateCycle { from: String, to: String },

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("The master bus cannot be removed")]
    MasterBusRemoval,

    #[error("The master bus always outputs to the destination")]
    MasterBusRouting,

    #[error("Action cannot be applied: {reason}")]
    InvalidAction { reason: String },

    // History Errors
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    // Device Errors
    #[error("No default output device available")]
    NoDevice,

    #[error("Output device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("Audio stream error: {reason}")]
    Stream { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SongrackError {
    /// Shorthand for an [`SongrackError::IndexOutOfRange`].
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        SongrackError::IndexOutOfRange { what, index, len }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SongrackError::UnknownModule { .. } => "UNKNOWN_MODULE",
            SongrackError::CorruptedState { .. } => "CORRUPTED_STATE",
            SongrackError::MissingNode { .. } => "MISSING_NODE",
            SongrackError::WouldCreateCycle { .. } => "WOULD_CREATE_CYCLE",
            SongrackError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            SongrackError::MasterBusRemoval => "MASTER_BUS_REMOVAL",
            SongrackError::MasterBusRouting => "MASTER_BUS_ROUTING",
            SongrackError::InvalidAction { .. } => "INVALID_ACTION",
            SongrackError::NothingToUndo => "NOTHING_TO_UNDO",
            SongrackError::NothingToRedo => "NOTHING_TO_REDO",
            SongrackError::NoDevice => "NO_DEVICE",
            SongrackError::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            SongrackError::Stream { .. } => "STREAM_ERROR",
            SongrackError::InvalidConfig { .. } => "INVALID_CONFIG",
            SongrackError::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            SongrackError::ConfigSerialize(_) => "CONFIG_SERIALIZE_ERROR",
            SongrackError::Io(_) => "IO_ERROR",
            SongrackError::Wav(_) => "WAV_ERROR",
            SongrackError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            SongrackError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the song and graph unchanged; the caller can
    /// log them and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SongrackError::UnknownModule { .. }
                | SongrackError::CorruptedState { .. }
                | SongrackError::WouldCreateCycle { .. }
                | SongrackError::IndexOutOfRange { .. }
                | SongrackError::MasterBusRemoval
                | SongrackError::MasterBusRouting
                | SongrackError::NothingToUndo
                | SongrackError::NothingToRedo
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SongrackError::UnknownModule { .. } => vec![
                "Run 'songrack-cli modules' to list available module types",
                "The project may have been saved by a newer version",
            ],
            SongrackError::CorruptedState { .. } => vec![
                "The module keeps its previous settings",
                "Re-save the project to rewrite the module state",
            ],
            SongrackError::WouldCreateCycle { .. } => vec![
                "Route the signal to a different bus",
                "A module cannot feed back into its own input chain",
            ],
            SongrackError::NoDevice | SongrackError::DeviceNotFound { .. } => vec![
                "Check that an output device is connected",
                "Use 'songrack-cli render' to write a WAV file instead",
            ],
            SongrackError::Stream { .. } => vec![
                "Try a larger block size in the config",
                "Close other applications that hold the audio device",
            ],
            SongrackError::InvalidConfig { .. } | SongrackError::ConfigParse(_) => vec![
                "Run 'songrack-cli config' to print a valid default config",
            ],
            SongrackError::UnsupportedFormat { .. } => vec!["Export as 16, 24 or 32-bit WAV"],
            _ => vec![],
        }
    }
}
