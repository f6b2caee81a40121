//! Serializable request matchers.
//!
//! A [`Matcher`] is a plain description of a predicate over a request. The
//! compiler embeds the description as JSON in the emitted program, where a
//! small interpreter evaluates it; [`CompiledMatcher`] evaluates the same
//! description in Rust with identical semantics. Patterns use ECMAScript
//! `RegExp` syntax without flags, since that is how the worker compiles them.

use regress::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::RuleError;

/// Origin used to resolve relative request URLs.
pub const DEFAULT_ORIGIN: &str = "http://localhost/";

/// Fetch destination of a request (`Request.destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// `fetch()` and XHR requests report an empty destination.
    #[default]
    #[serde(rename = "")]
    Empty,
    Audio,
    Document,
    Embed,
    Font,
    Frame,
    Iframe,
    Image,
    Manifest,
    Object,
    Report,
    Script,
    Style,
    Track,
    Video,
    Worker,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Empty => "",
            Destination::Audio => "audio",
            Destination::Document => "document",
            Destination::Embed => "embed",
            Destination::Font => "font",
            Destination::Frame => "frame",
            Destination::Iframe => "iframe",
            Destination::Image => "image",
            Destination::Manifest => "manifest",
            Destination::Object => "object",
            Destination::Report => "report",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Track => "track",
            Destination::Video => "video",
            Destination::Worker => "worker",
        }
    }

    /// Parse a destination name; the empty string is [`Destination::Empty`].
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase())).ok()
    }
}

/// Which part of the URL a pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTarget {
    /// The full `href`.
    #[default]
    Url,
    /// Only the pathname.
    Path,
}

/// Predicate over an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Matcher {
    /// Request destination is one of the listed values.
    Destination { destinations: Vec<Destination> },

    /// URL pathname starts with a literal prefix.
    PathPrefix { prefix: String },

    /// HTTP method equals the given (upper-case) method.
    Method { method: String },

    /// Full request URL ends with one of the extensions.
    Extensions { extensions: Vec<String> },

    /// ECMAScript regular expression search against the URL or its path.
    Pattern {
        pattern: String,
        #[serde(default)]
        target: PatternTarget,
    },
}

impl Matcher {
    pub fn destinations(destinations: &[Destination]) -> Self {
        Matcher::Destination {
            destinations: destinations.to_vec(),
        }
    }

    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Matcher::PathPrefix {
            prefix: prefix.into(),
        }
    }

    /// Methods are normalized to upper case, as browsers report them.
    pub fn method(method: &str) -> Self {
        Matcher::Method {
            method: method.to_uppercase(),
        }
    }

    pub fn extensions(extensions: &[String]) -> Self {
        Matcher::Extensions {
            extensions: extensions.to_vec(),
        }
    }

    pub fn url_pattern(pattern: impl Into<String>) -> Self {
        Matcher::Pattern {
            pattern: pattern.into(),
            target: PatternTarget::Url,
        }
    }

    pub fn path_pattern(pattern: impl Into<String>) -> Self {
        Matcher::Pattern {
            pattern: pattern.into(),
            target: PatternTarget::Path,
        }
    }

    /// HTTP method the route is registered for.
    ///
    /// Routes only see GET requests unless they match on method explicitly.
    pub fn route_method(&self) -> &str {
        match self {
            Matcher::Method { method } => method,
            _ => "GET",
        }
    }

    /// Short human-readable form used in logs and explain output.
    pub fn describe(&self) -> String {
        match self {
            Matcher::Destination { destinations } => {
                let names: Vec<&str> = destinations.iter().map(|d| d.as_str()).collect();
                format!("destination in [{}]", names.join(", "))
            }
            Matcher::PathPrefix { prefix } => format!("path starts with {}", prefix),
            Matcher::Method { method } => format!("method == {}", method),
            Matcher::Extensions { extensions } => {
                format!("url ends with one of [{}]", extensions.join(", "))
            }
            Matcher::Pattern { pattern, target } => match target {
                PatternTarget::Url => format!("url =~ /{}/", pattern),
                PatternTarget::Path => format!("path =~ /{}/", pattern),
            },
        }
    }
}

/// Request attributes visible to matchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub url: Url,
    pub method: String,
    pub destination: Destination,
}

impl RequestInfo {
    /// Build request info; relative URLs resolve against [`DEFAULT_ORIGIN`].
    pub fn new(url: &str, method: &str, destination: Destination) -> Result<Self, RuleError> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(DEFAULT_ORIGIN)
                .and_then(|base| base.join(url))
                .map_err(|e| RuleError::InvalidUrl {
                    url: url.to_string(),
                    message: e.to_string(),
                })?,
            Err(e) => {
                return Err(RuleError::InvalidUrl {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
        };

        Ok(Self {
            url: parsed,
            method: method.to_uppercase(),
            destination,
        })
    }

    pub fn get(url: &str) -> Result<Self, RuleError> {
        Self::new(url, "GET", Destination::Empty)
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }
}

/// A matcher with its regular expression compiled.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    matcher: Matcher,
    regex: Option<Regex>,
}

impl CompiledMatcher {
    pub fn new(matcher: Matcher) -> Result<Self, RuleError> {
        let regex = match &matcher {
            Matcher::Pattern { pattern, .. } => {
                Some(Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?)
            }
            Matcher::PathPrefix { prefix } if prefix.is_empty() => {
                return Err(RuleError::EmptyMatcher("path_prefix"));
            }
            Matcher::Method { method } if method.is_empty() => {
                return Err(RuleError::EmptyMatcher("method"));
            }
            _ => None,
        };

        Ok(Self { matcher, regex })
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn matches(&self, request: &RequestInfo) -> bool {
        match &self.matcher {
            Matcher::Destination { destinations } => destinations.contains(&request.destination),
            Matcher::PathPrefix { prefix } => request.pathname().starts_with(prefix.as_str()),
            Matcher::Method { method } => &request.method == method,
            Matcher::Extensions { extensions } => extensions
                .iter()
                .any(|ext| request.href().ends_with(ext.as_str())),
            Matcher::Pattern { target, .. } => {
                let Some(regex) = &self.regex else {
                    return false;
                };
                match target {
                    PatternTarget::Url => regex.find(request.href()).is_some(),
                    PatternTarget::Path => regex.find(request.pathname()).is_some(),
                }
            }
        }
    }
}
