use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use super::cooldown::CooldownTracker;
use super::models::{LogLine, NewAlert};
use super::rules::{Category, LogAlertRule, LogRuleKind};
use super::window::FrequencyWindow;

/// Matcher state derived from a rule's configuration. Kept per rule id and
/// rebuilt only when the rule's kind changes.
enum CompiledMatcher {
    Keyword(Vec<String>),
    Pattern(Regex),
    Frequency(FrequencyWindow),
    /// The pattern failed to compile; the rule never matches.
    Invalid,
}

struct CompiledRule {
    kind: LogRuleKind,
    matcher: CompiledMatcher,
}

impl CompiledRule {
    fn compile(rule: &LogAlertRule) -> Self {
        let matcher = match &rule.kind {
            LogRuleKind::Keyword { terms } => CompiledMatcher::Keyword(
                terms
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            LogRuleKind::Pattern { regex } => match Regex::new(regex) {
                Ok(re) => CompiledMatcher::Pattern(re),
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Log rule has an invalid pattern; it will never match.");
                    CompiledMatcher::Invalid
                }
            },
            LogRuleKind::Frequency { window_seconds, .. } => {
                CompiledMatcher::Frequency(FrequencyWindow::new(*window_seconds))
            }
        };
        Self {
            kind: rule.kind.clone(),
            matcher,
        }
    }
}

/// Scans log lines against keyword, pattern and frequency rules.
pub struct LogPatternMatcher {
    cooldowns: Arc<CooldownTracker>,
    compiled: HashMap<String, CompiledRule>,
}

impl LogPatternMatcher {
    pub fn new(cooldowns: Arc<CooldownTracker>) -> Self {
        Self {
            cooldowns,
            compiled: HashMap::new(),
        }
    }

    /// Evaluates one line. Every matching rule is considered independently;
    /// a line matching nothing is a no-op.
    pub fn evaluate(&mut self, line: &LogLine, rules: &[LogAlertRule]) -> Vec<NewAlert> {
        let mut alerts = Vec::new();
        let mut lowered_message: Option<String> = None;

        for rule in rules.iter().filter(|r| r.enabled) {
            if !rule.applies_to_source(&line.source) {
                continue;
            }

            let compiled = self.compiled_for(rule);
            let candidate = match &mut compiled.matcher {
                CompiledMatcher::Keyword(terms) => {
                    let message = lowered_message.get_or_insert_with(|| line.message.to_lowercase());
                    terms
                        .iter()
                        .find(|term| message.contains(term.as_str()))
                        .map(|term| LogMatch {
                            message: format!(
                                "Keyword \"{term}\" matched in {}: {}",
                                line.source, line.message
                            ),
                            value: 1.0,
                            threshold: 1.0,
                        })
                }
                CompiledMatcher::Pattern(regex) => regex.find(&line.message).map(|found| LogMatch {
                    message: format!(
                        "Pattern /{}/ matched \"{}\" in {}: {}",
                        regex.as_str(),
                        found.as_str(),
                        line.source,
                        line.message
                    ),
                    value: 1.0,
                    threshold: 1.0,
                }),
                CompiledMatcher::Frequency(window) => match &rule.kind {
                    LogRuleKind::Frequency {
                        level, threshold, ..
                    } if *level == line.level => {
                        let count = window.record(line.timestamp);
                        (count >= *threshold as usize).then(|| LogMatch {
                            message: format!(
                                "{count} {level} log lines within {}s (threshold {threshold})",
                                window.window_seconds()
                            ),
                            value: count as f64,
                            threshold: f64::from(*threshold),
                        })
                    }
                    _ => None,
                },
                CompiledMatcher::Invalid => None,
            };

            let Some(matched) = candidate else {
                continue;
            };

            if !self
                .cooldowns
                .try_fire(&rule.id, rule.cooldown_seconds, line.timestamp)
            {
                debug!(
                    rule_id = %rule.id,
                    kind = rule.kind.name(),
                    cooldown_seconds = rule.cooldown_seconds,
                    "Log rule matched but is in cooldown."
                );
                continue;
            }

            alerts.push(NewAlert {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                category: Category::Log,
                severity: rule.severity,
                message: matched.message,
                value: matched.value,
                threshold: matched.threshold,
            });
        }

        self.prune(rules);
        alerts
    }

    /// Number of rules with cached matcher state.
    pub fn tracked_rules(&self) -> usize {
        self.compiled.len()
    }

    fn compiled_for(&mut self, rule: &LogAlertRule) -> &mut CompiledRule {
        let stale = self
            .compiled
            .get(&rule.id)
            .is_some_and(|c| c.kind != rule.kind);
        if stale {
            debug!(rule_id = %rule.id, "Log rule changed, rebuilding matcher state.");
            self.compiled.remove(&rule.id);
        }
        self.compiled
            .entry(rule.id.clone())
            .or_insert_with(|| CompiledRule::compile(rule))
    }

    /// Forgets state of rules that are no longer enabled.
    fn prune(&mut self, rules: &[LogAlertRule]) {
        if self.compiled.is_empty() {
            return;
        }
        let live: HashSet<&str> = rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.id.as_str())
            .collect();
        self.compiled.retain(|id, _| live.contains(id.as_str()));
    }
}

struct LogMatch {
    message: String,
    value: f64,
    threshold: f64,
}
