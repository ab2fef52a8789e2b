use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("invalid scope dimension `{input}`: {reason}")]
    InvalidScopeDim { input: String, reason: String },
    #[error("entity body for {table} is not a JSON object")]
    NonObjectBody { table: String },
    #[error("{table} {key} does not read back from its stored body: {reason}")]
    LossyBody {
        table: String,
        key: String,
        reason: String,
    },
}

/// A raw payload (or stored entity body) that does not match the schema it is
/// decoded into.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ContractError> for DecodeError {
    fn from(err: ContractError) -> Self {
        Self::new(err.to_string())
    }
}

/// A tool entity that cannot be turned into a valid domain entity.
#[derive(Debug, Error)]
#[error("{field}: {reason}")]
pub struct MappingError {
    field: &'static str,
    reason: String,
}

impl MappingError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<ContractError> for MappingError {
    fn from(err: ContractError) -> Self {
        Self::new("entity", err.to_string())
    }
}
