use thiserror::Error;

/// Single error channel for the gateway, replacing the checked-exception
/// ladders of the source system. Each variant maps to exactly one recovery
/// action: most are reported back to the ATM as an ISO response and leave
/// the socket open; only [`GatewayError::Io`] on the write path closes the
/// connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("frame incomplete: fewer bytes arrived than the length prefix declared")]
    FrameIncomplete,

    #[error("frame malformed: {0}")]
    FrameMalformed(String),

    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("ESB unavailable: {0}")]
    EsbUnavailable(String),

    #[error("ESB returned an error: {0}")]
    EsbError(String),

    #[error("transaction amount exceeds allowed limit")]
    LimitExceeded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short operator-facing summary, truncated the way field 44 requires
    /// (at most 25 characters) for error responses that echo it.
    pub fn short_message(&self) -> String {
        let full = self.to_string();
        full.chars().take(25).collect()
    }
}
