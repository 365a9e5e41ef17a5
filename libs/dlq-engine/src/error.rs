use dlq_api::error::{BrokerError, BrokerErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    /// Rejected before any broker interaction.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("broker timeout: {0}")]
    Timeout(String),

    /// Malformed transport encoding on an allowed header. During a replay,
    /// `offset` names the offending item and `completed` counts the records
    /// already published before the batch stopped.
    #[error("invalid encoding for header '{header}'{}: {reason}", item_suffix(.offset, .completed))]
    InvalidEncoding {
        header: String,
        reason: String,
        offset: Option<i64>,
        completed: usize,
    },

    /// Cooperative cancellation. `completed` counts records fetched or published before it.
    #[error("cancelled after {completed} record(s)")]
    Cancelled { completed: usize },

    #[error("config error: {0}")]
    Config(String),
}

impl DlqError {
    /// Add context to the error.
    ///
    /// Message-carrying variants get the context prepended; the others are returned as-is.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            DlqError::InvalidRequest(msg) => DlqError::InvalidRequest(format!("{ctx}: {msg}")),
            DlqError::BrokerUnavailable(msg) => DlqError::BrokerUnavailable(format!("{ctx}: {msg}")),
            DlqError::Timeout(msg) => DlqError::Timeout(format!("{ctx}: {msg}")),
            DlqError::Config(msg) => DlqError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }

    /// Attach the failing replay item and the publish count to an encoding error.
    pub fn at_item(self, item_offset: i64, published: usize) -> Self {
        match self {
            DlqError::InvalidEncoding { header, reason, .. } => DlqError::InvalidEncoding {
                header,
                reason,
                offset: Some(item_offset),
                completed: published,
            },
            other => other,
        }
    }

    /// Records fetched or published before the operation stopped, when known.
    pub fn completed(&self) -> Option<usize> {
        match self {
            DlqError::Cancelled { completed } => Some(*completed),
            DlqError::InvalidEncoding {
                offset: Some(_),
                completed,
                ..
            } => Some(*completed),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DlqError::Cancelled { .. })
    }
}

fn item_suffix(offset: &Option<i64>, completed: &usize) -> String {
    match offset {
        Some(offset) => format!(" at item offset {offset} ({completed} record(s) already published)"),
        None => String::new(),
    }
}

impl From<BrokerError> for DlqError {
    fn from(e: BrokerError) -> Self {
        match e.kind {
            BrokerErrorKind::Timeout => DlqError::Timeout(e.message),
            _ => DlqError::BrokerUnavailable(e.to_string()),
        }
    }
}
