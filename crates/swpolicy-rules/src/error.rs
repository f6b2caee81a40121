//! Rule construction and matching errors.

use crate::Strategy;

/// Errors raised while building or compiling rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// A pattern matcher does not compile as a regular expression.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A strategy name is not one of the five known strategies.
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    /// A request URL could not be parsed.
    #[error("invalid request url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// A matcher carries no usable value (empty prefix or method).
    #[error("empty {0} matcher")]
    EmptyMatcher(&'static str),

    /// A replay queue was attached to a strategy other than NetworkOnly.
    #[error("replay queue '{queue}' attached to a {strategy} rule; only NetworkOnly rules replay")]
    ReplayRequiresNetworkOnly { queue: String, strategy: Strategy },

    /// Two rules name the same replay queue with different retention.
    #[error("replay queue '{queue}' retention differs: {first_minutes} vs {second_minutes} min")]
    ConflictingReplayQueue {
        queue: String,
        first_minutes: u64,
        second_minutes: u64,
    },
}
