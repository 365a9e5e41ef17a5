use std::fmt;

/// Error kind for broker errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Broker unreachable, metadata call failed, session could not be created.
    Unavailable,
    /// A bounded broker call ran out of time.
    Timeout,
    /// The broker refused a publish.
    Rejected,
    /// A read session call that needs an assignment was made without one.
    NotAssigned,
}

/// Error returned by every broker seam method.
#[derive(Debug)]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::Unavailable, message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::Timeout, message: msg.into() }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::Rejected, message: msg.into() }
    }

    pub fn not_assigned(msg: impl Into<String>) -> Self {
        Self { kind: BrokerErrorKind::NotAssigned, message: msg.into() }
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BrokerError {}
