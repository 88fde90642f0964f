// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Error types shared by the dashboard core and its drivers

use thiserror::Error;

/// Failure of a single request against the status server
///
/// None of these are fatal: the core turns each of them into a banner (or
/// silently absorbs it) and schedules a retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within its timeout
    #[error("request timed out")]
    RequestTimeout,

    /// Connection refused, reset, DNS failure and friends
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success HTTP status
    #[error("server returned HTTP status {0}")]
    Server(u16),

    /// The body could not be decoded as the expected JSON document
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// The document decoded but lacks a field the dashboard cannot do without
    #[error("payload is missing {0}")]
    MalformedPayload(&'static str),
}

/// How a failed request is presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// [`FetchError::RequestTimeout`]
    Timeout,
    /// [`FetchError::Network`]
    NetworkError,
    /// Anything else the server did wrong, with the HTTP status when known
    Other(Option<u16>),
    /// The server is up but has not produced a usable document yet
    NotReady,
}

impl FetchError {
    /// Classify the error for user-facing presentation
    pub fn class(&self) -> FailureClass {
        match self {
            Self::RequestTimeout => FailureClass::Timeout,
            Self::Network(_) => FailureClass::NetworkError,
            Self::Server(status) => FailureClass::Other(Some(*status)),
            Self::InvalidBody(_) => FailureClass::Other(None),
            Self::MalformedPayload(_) => FailureClass::NotReady,
        }
    }
}

/// A graph gesture that cannot be applied in the current state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The metric is not in the graph catalog
    #[error("metric {0} cannot be graphed")]
    UnknownMetric(String),

    /// Zooming in needs an active range selection
    #[error("no range is selected")]
    NoRange,

    /// No metric has been selected yet
    #[error("no metric is selected")]
    NoMetric,
}

/// A user command that could not be carried out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The graph rejected the gesture
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The entity is not part of the current snapshot
    #[error("no entity with id {0} in the current snapshot")]
    UnknownEntity(i64),
}

/// Invalid dashboard configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The server base URL does not parse or cannot be used as a base
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// A duration that must be positive is zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The initial metric is empty
    #[error("initial metric must not be empty")]
    EmptyMetric,

    /// The configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`crate::DashboardConfig`]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_error_kind() {
        assert_eq!(FetchError::RequestTimeout.class(), FailureClass::Timeout);
        assert_eq!(
            FetchError::Network("connection refused".into()).class(),
            FailureClass::NetworkError
        );
        assert_eq!(FetchError::Server(503).class(), FailureClass::Other(Some(503)));
        assert_eq!(
            FetchError::InvalidBody("expected value".into()).class(),
            FailureClass::Other(None)
        );
        assert_eq!(
            FetchError::MalformedPayload("server.tick_now").class(),
            FailureClass::NotReady
        );
    }

    #[test]
    fn display_includes_status() {
        assert_eq!(
            FetchError::Server(502).to_string(),
            "server returned HTTP status 502"
        );
    }
}
