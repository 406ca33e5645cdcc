use thiserror::Error;

/// Errors surfaced by the encoder core.
#[derive(Error, Debug)]
pub enum Error {
    /// An unrecognized parameter name was given to `set_parameter`.
    #[error("unknown parameter '{name}', did you mean '{suggestion}'?")]
    UnknownParameter { name: String, suggestion: String },

    /// A recognized parameter received a value it cannot take.
    #[error("invalid value '{value}' for parameter '{name}': {reason}")]
    InvalidParameterValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Parameters are frozen once the encoder is initialized.
    #[error("parameter '{0}' cannot be changed after initialization")]
    ParameterLocked(String),

    /// A configured combination of values cannot be encoded.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The 2-D encoder collaborator failed to open or encode.
    #[error("2D map encoding failed: {0}")]
    MapEncoding(String),

    /// The encoder was stopped or its worker pool is gone.
    #[error("encoder is not running")]
    Stopped,

    /// An internal invariant did not hold; treated as fatal.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl Error {
    /// Configuration errors fail fast at setup and never reach the
    /// output stream; everything else is a runtime error subject to the
    /// `errorsAreFatal` policy.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownParameter { .. }
                | Error::InvalidParameterValue { .. }
                | Error::ParameterLocked(_)
                | Error::Precondition(_)
        )
    }
}
