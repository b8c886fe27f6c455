use std::sync::Arc;

use tracing::debug;

use super::cooldown::CooldownTracker;
use super::models::{MetricsSnapshot, NewAlert};
use super::rules::{AlertRule, Category, ComparisonOperator};

/// Compares metric snapshots against threshold rules.
pub struct MetricEvaluator {
    cooldowns: Arc<CooldownTracker>,
}

impl MetricEvaluator {
    pub fn new(cooldowns: Arc<CooldownTracker>) -> Self {
        Self { cooldowns }
    }

    /// Evaluates every enabled rule independently and returns the ones that fired.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot, rules: &[AlertRule]) -> Vec<NewAlert> {
        rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(|rule| self.evaluate_rule(rule, snapshot))
            .collect()
    }

    fn evaluate_rule(&self, rule: &AlertRule, snapshot: &MetricsSnapshot) -> Option<NewAlert> {
        let condition = &rule.condition;
        let Some(current_value) = snapshot.get(rule.category, &condition.metric) else {
            debug!(
                rule_id = %rule.id,
                category = %rule.category,
                metric = %condition.metric,
                "Metric missing from snapshot, skipping rule."
            );
            return None;
        };

        if !condition.operator.compare(current_value, condition.threshold) {
            return None;
        }

        let now = snapshot.collected_at;
        if !self.cooldowns.try_fire(&rule.id, rule.cooldown_seconds, now) {
            debug!(
                rule_name = %rule.name,
                rule_id = %rule.id,
                cooldown_seconds = rule.cooldown_seconds,
                last_triggered = ?self.cooldowns.last_fired(&rule.id),
                "Rule is in cooldown."
            );
            return None;
        }

        Some(NewAlert {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            category: rule.category,
            severity: rule.severity,
            message: format_metric_message(
                rule.category,
                &condition.metric,
                condition.operator,
                current_value,
                condition.threshold,
            ),
            value: current_value,
            threshold: condition.threshold,
        })
    }
}

pub fn format_metric_message(
    category: Category,
    metric: &str,
    operator: ComparisonOperator,
    value: f64,
    threshold: f64,
) -> String {
    let relation = match operator {
        ComparisonOperator::GreaterThan => "above",
        ComparisonOperator::LessThan => "below",
        ComparisonOperator::GreaterOrEqual => "at or above",
        ComparisonOperator::LessOrEqual => "at or below",
        ComparisonOperator::Equal => "equal to",
    };
    format!("{category} {metric} is {value:.2}, {relation} threshold {threshold}")
}
