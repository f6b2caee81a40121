//! Explain which rule handles a request
//!
//! Uses the same matcher interpreter and dispatch order as the runtime, so
//! the answer here is the answer the worker gives.

use serde::Serialize;
use swpolicy_rules::{
    CachingRule, Destination, Expiration, ReplayQueue, RequestInfo, RuleError, RuleSet, Strategy,
};

/// How the worker would handle the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Precache,
    Rule,
    Passthrough,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedRule {
    /// Position in dispatch order
    pub index: usize,
    pub origin: String,
    pub matcher: String,
    pub strategy: Strategy,
    pub cache_name: Option<String>,
    pub expiration: Option<Expiration>,
    pub network_timeout_seconds: Option<u64>,
    pub replay_queue: Option<ReplayQueue>,
}

impl MatchedRule {
    fn from_rule(index: usize, rule: &CachingRule) -> Self {
        Self {
            index,
            origin: rule.origin.as_str().to_string(),
            matcher: rule.matcher.describe(),
            strategy: rule.strategy,
            cache_name: rule.partition().map(str::to_string),
            expiration: rule.effective_expiration(),
            network_timeout_seconds: rule.network_timeout_seconds,
            replay_queue: rule.replay_queue.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplainOutput {
    /// Resolved request URL
    pub url: String,
    pub method: String,
    pub destination: Destination,
    pub decision: Decision,
    pub matched_rule: Option<MatchedRule>,
    /// Rules evaluated before the decision
    pub rules_checked: usize,
    pub explanation: String,
}

impl ExplainOutput {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        self.explanation.clone()
    }

    fn generate_explanation(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Request: {} {}", self.method, self.url));
        if self.destination != Destination::Empty {
            lines.push(format!("Destination: {}", self.destination.as_str()));
        }
        lines.push(String::new());

        match (&self.decision, &self.matched_rule) {
            (Decision::Precache, _) => {
                lines.push("Decision: PRECACHE".to_string());
                lines.push("Served from the precache, before any runtime rule.".to_string());
            }
            (Decision::Rule, Some(rule)) => {
                lines.push(format!("Decision: RULE {} ({})", rule.index, rule.origin));
                lines.push(String::new());
                lines.push(format!("Matcher: {}", rule.matcher));
                lines.push(format!("Strategy: {}", rule.strategy));
                if let Some(ref name) = rule.cache_name {
                    lines.push(format!("Cache: {}", name));
                }
                if let Some(expiration) = rule.expiration {
                    lines.push(format!("Expiration: {}", describe_expiration(&expiration)));
                }
                if let Some(timeout) = rule.network_timeout_seconds {
                    lines.push(format!("Network timeout: {}s", timeout));
                }
                if let Some(ref queue) = rule.replay_queue {
                    lines.push(format!(
                        "Replay queue: {} (retained {} min)",
                        queue.name, queue.max_retention_minutes
                    ));
                }
            }
            _ => {
                lines.push("Decision: PASSTHROUGH".to_string());
                lines.push(format!(
                    "No rule matched after checking {} rules; the browser fetches normally.",
                    self.rules_checked
                ));
            }
        }

        lines.join("\n")
    }
}

fn describe_expiration(expiration: &Expiration) -> String {
    let entries = expiration
        .max_entries
        .map(|n| format!("{} entries", n))
        .unwrap_or_else(|| "unbounded entries".to_string());
    let age = expiration
        .max_age_seconds
        .map(|s| format!("{}s", s))
        .unwrap_or_else(|| "unbounded age".to_string());
    format!("{}, {}", entries, age)
}

/// Explain how `rule_set` dispatches one request.
pub fn explain(
    rule_set: &RuleSet,
    url: &str,
    method: &str,
    destination: Destination,
) -> Result<ExplainOutput, RuleError> {
    let request = RequestInfo::new(url, method, destination)?;
    let compiled = rule_set.compile()?;

    let precached = request.method == "GET"
        && rule_set.precache.entries().iter().any(|entry| {
            RequestInfo::get(&entry.url)
                .map(|p| p.href() == request.href())
                .unwrap_or(false)
        });

    let (decision, matched_rule, rules_checked) = if precached {
        (Decision::Precache, None, 0)
    } else {
        match compiled.first_match(&request) {
            Some((index, rule)) => (
                Decision::Rule,
                Some(MatchedRule::from_rule(index, rule)),
                index + 1,
            ),
            None => (Decision::Passthrough, None, compiled.len()),
        }
    };

    let mut output = ExplainOutput {
        url: request.href().to_string(),
        method: request.method.clone(),
        destination,
        decision,
        matched_rule,
        rules_checked,
        explanation: String::new(),
    };
    output.explanation = output.generate_explanation();
    Ok(output)
}
