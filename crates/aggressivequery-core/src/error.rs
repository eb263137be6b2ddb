//! Error types for AggressiveQuery planning.

use std::fmt;

/// The primary error type for all planning operations.
#[derive(Debug)]
pub enum Error {
    /// Entity type or field structurally unrecognized by the schema
    Schema(SchemaError),
    /// Malformed selection path
    InvalidSelection(InvalidSelectionError),
    /// Extension invoked with arguments violating its contract
    ExtensionConfiguration(ExtensionConfigurationError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Entity type is not registered
    EntityNotFound,
    /// Field or relation is not declared on the entity
    FieldNotFound,
    /// Invalid schema definition (dangling target, accessor clash)
    Invalid,
}

/// A selection path that cannot be tokenized.
#[derive(Debug, Clone)]
pub struct InvalidSelectionError {
    /// The offending path, verbatim
    pub path: String,
    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ExtensionConfigurationError {
    /// Name of the extension that rejected its arguments
    pub extension: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SchemaError {
    pub fn entity_not_found(entity: &str) -> Self {
        Self {
            kind: SchemaErrorKind::EntityNotFound,
            message: format!("unknown entity type '{entity}'"),
        }
    }

    pub fn field_not_found(entity: &str, field: &str) -> Self {
        Self {
            kind: SchemaErrorKind::FieldNotFound,
            message: format!("entity '{entity}' has no field '{field}'"),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: SchemaErrorKind::Invalid,
            message: message.into(),
        }
    }
}

impl InvalidSelectionError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl ExtensionConfigurationError {
    pub fn new(extension: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            message: message.into(),
        }
    }
}

impl Error {
    /// Is this a schema lookup failure?
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Is this a rejected selection path?
    pub fn is_invalid_selection(&self) -> bool {
        matches!(self, Error::InvalidSelection(_))
    }

    /// Is this a rejected extension setup?
    pub fn is_extension_configuration(&self) -> bool {
        matches!(self, Error::ExtensionConfiguration(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::InvalidSelection(e) => {
                write!(f, "Invalid selection '{}': {}", e.path, e.message)
            }
            Error::ExtensionConfiguration(e) => {
                write!(f, "Extension '{}' misconfigured: {}", e.extension, e.message)
            }
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for InvalidSelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl fmt::Display for ExtensionConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.extension, self.message)
    }
}

impl std::error::Error for SchemaError {}
impl std::error::Error for InvalidSelectionError {}
impl std::error::Error for ExtensionConfigurationError {}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<InvalidSelectionError> for Error {
    fn from(err: InvalidSelectionError) -> Self {
        Error::InvalidSelection(err)
    }
}

impl From<ExtensionConfigurationError> for Error {
    fn from(err: ExtensionConfigurationError) -> Self {
        Error::ExtensionConfiguration(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, Error>;
