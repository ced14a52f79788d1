use std::fmt;

use crate::model::PointId;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidThreshold,
    EmptyInput,
    InconsistentHistory,
    ProviderUnavailable,
    StreamParseError,
    StreamVersionMismatch,
    FixtureLoadFailed,
    SinkWriteFailed,
}

impl ErrorCode {
    pub const ALL: [Self; 9] = [
        Self::ConfigParseError,
        Self::InvalidThreshold,
        Self::EmptyInput,
        Self::InconsistentHistory,
        Self::ProviderUnavailable,
        Self::StreamParseError,
        Self::StreamVersionMismatch,
        Self::FixtureLoadFailed,
        Self::SinkWriteFailed,
    ];

    /// Find the code a message is prefixed with (`"E3001: ..."`).
    #[must_use]
    pub fn from_prefixed(message: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| {
                message
                    .strip_prefix(code.code())
                    .is_some_and(|rest| rest.starts_with(':'))
            })
    }

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidThreshold => "E1002",
            Self::EmptyInput => "E2001",
            Self::InconsistentHistory => "E3001",
            Self::ProviderUnavailable => "E3002",
            Self::StreamParseError => "E4001",
            Self::StreamVersionMismatch => "E4002",
            Self::FixtureLoadFailed => "E4003",
            Self::SinkWriteFailed => "E5001",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in straightedge.toml and retry."),
            Self::InvalidThreshold => {
                Some("Thresholds must be finite and non-negative; see `straightedge config`.")
            }
            Self::EmptyInput => None,
            Self::InconsistentHistory => {
                Some("Check that the history source holds every prior version of edited points.")
            }
            Self::ProviderUnavailable => Some("Retry once the history source is reachable."),
            Self::StreamParseError => Some("Each data line must be one JSON batch object."),
            Self::StreamVersionMismatch => Some("Upgrade straightedge to read this stream."),
            Self::FixtureLoadFailed => Some("Verify the history fixture path and JSON layout."),
            Self::SinkWriteFailed => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while closing a changeset.
///
/// Any of these aborts the enclosing changeset's closing pass; the engine
/// driver reports it and keeps going with the other changesets.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A regression was requested on zero points.
    #[error("regression requested on an empty point set")]
    EmptyInput,

    /// The provider has no record of the version preceding a modified point.
    #[error("history has no version {version} of point {point_id}")]
    InconsistentHistory {
        /// The point whose prior version is missing.
        point_id: PointId,
        /// The version that was requested.
        version: u32,
    },

    /// The provider failed at the I/O level.
    #[error("history provider unavailable: {0}")]
    ProviderUnavailable(#[from] crate::history::ProviderError),
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyInput => ErrorCode::EmptyInput,
            Self::InconsistentHistory { .. } => ErrorCode::InconsistentHistory,
            Self::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl From<crate::regression::EmptyInput> for EngineError {
    fn from(_: crate::regression::EmptyInput) -> Self {
        Self::EmptyInput
    }
}
