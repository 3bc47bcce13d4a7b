//! The multiplexed handler (spec §4.5): a handler whose `Perform`
//! materializes N child jobs and persists them in one transaction,
//! grounded in `Backend::create`'s all-or-nothing insert.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument};
use waylay_core::{Handler, HandlerBuildError, HandlerContext, NewJob};

/// A single fan-out rule (spec §4.5): "a full job-parameter map".
#[derive(Debug, Clone)]
struct Rule {
    priority: Option<i32>,
    queue: Option<String>,
    repeat_count: u32,
    repeat_interval: Option<Duration>,
    max_attempts: Option<i32>,
    run_at: Option<DateTime<Utc>>,
    arguments: Option<Value>,
}

impl Rule {
    fn parse(value: &Value) -> Result<Self, HandlerBuildError> {
        let object = value
            .as_object()
            .ok_or_else(|| HandlerBuildError::new("each multiplexed rule must be a JSON object"))?;

        Ok(Rule {
            priority: object.get("priority").and_then(Value::as_i64).map(|n| n as i32),
            queue: object.get("queue").and_then(Value::as_str).map(str::to_string),
            repeat_count: object
                .get("repeat_count")
                .and_then(Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(1)
                .max(1),
            repeat_interval: object
                .get("repeat_interval")
                .and_then(Value::as_str)
                .and_then(parse_duration_string),
            max_attempts: object.get("max_attempts").and_then(Value::as_i64).map(|n| n as i32),
            run_at: object
                .get("run_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            arguments: object.get("arguments").cloned(),
        })
    }
}

fn parse_duration_string(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (number, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let n: i64 = number.parse().ok()?;
    match unit {
        "s" => Some(Duration::seconds(n)),
        "m" => Some(Duration::minutes(n)),
        "h" => Some(Duration::hours(n)),
        _ => None,
    }
}

/// Merge `outer` into `inner`, outer winning on key conflict (spec §4.5
/// "Argument inheritance"). If `inner` is absent, `outer` is used as-is.
fn merge_arguments(outer: Option<&Value>, inner: Option<Value>) -> Value {
    match (outer, inner) {
        (Some(outer), None) => outer.clone(),
        (None, Some(inner)) => inner,
        (None, None) => Value::Object(Map::new()),
        (Some(outer), Some(inner)) => {
            let mut merged = match inner {
                Value::Object(map) => map,
                other => {
                    // Not an object — outer still wins entirely, there's
                    // nothing sensible to merge into.
                    let _ = other;
                    Map::new()
                }
            };
            if let Some(outer_map) = outer.as_object() {
                for (k, v) in outer_map {
                    merged.insert(k.clone(), v.clone());
                }
            }
            Value::Object(merged)
        }
    }
}

pub struct MultiplexedHandler {
    ctx: HandlerContext,
    rules: Vec<Rule>,
    outer_arguments: Option<Value>,
    group_priority: Option<i32>,
    group_queue: Option<String>,
    group_max_attempts: Option<i32>,
    group_run_at: Option<DateTime<Utc>>,
}

impl MultiplexedHandler {
    /// The registry constructor: builds a boxed trait object for
    /// `HandlerRegistry::register`.
    pub fn build(ctx: &HandlerContext, params: &Value) -> Result<Box<dyn Handler>, HandlerBuildError> {
        Self::from_params(ctx, params).map(|h| Box::new(h) as Box<dyn Handler>)
    }

    /// The concrete constructor, exposed so tests can inspect
    /// `materialize()` directly instead of only through `perform()`'s side
    /// effects.
    fn from_params(ctx: &HandlerContext, params: &Value) -> Result<Self, HandlerBuildError> {
        let object = params
            .as_object()
            .ok_or_else(|| HandlerBuildError::new("multiplexed handler params must be a JSON object"))?;

        let rules_value = object
            .get("rules")
            .ok_or_else(|| HandlerBuildError::new("multiplexed handler requires a `rules` array"))?;
        let rules_array = rules_value
            .as_array()
            .ok_or_else(|| HandlerBuildError::new("`rules` must be a JSON array"))?;
        if rules_array.is_empty() {
            return Err(HandlerBuildError::new("`rules` must not be empty"));
        }

        let rules = rules_array
            .iter()
            .map(Rule::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MultiplexedHandler {
            ctx: ctx.clone(),
            rules,
            outer_arguments: object.get("arguments").cloned(),
            group_priority: object.get("gpriority").and_then(Value::as_i64).map(|n| n as i32),
            group_queue: object.get("gqueue").and_then(Value::as_str).map(str::to_string),
            group_max_attempts: object.get("gmax_attempts").and_then(Value::as_i64).map(|n| n as i32),
            group_run_at: object
                .get("grun_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    fn materialize(&self) -> anyhow::Result<Vec<NewJob>> {
        let mut jobs = Vec::new();

        for rule in &self.rules {
            let priority = rule.priority.or(self.group_priority).unwrap_or(0);
            let queue = rule.queue.clone().or_else(|| self.group_queue.clone());
            let max_attempts = rule.max_attempts.or(self.group_max_attempts);
            let base_run_at = rule.run_at.or(self.group_run_at);

            let mut handler_value = merge_arguments(self.outer_arguments.as_ref(), rule.arguments.clone());
            if !handler_value.is_object() {
                anyhow::bail!("multiplexed rule's merged arguments did not produce a JSON object");
            }
            if handler_value.get("type").and_then(Value::as_str).is_none() {
                anyhow::bail!("multiplexed rule's arguments are missing a `type` key");
            }
            if let Some(max_attempts) = max_attempts {
                handler_value
                    .as_object_mut()
                    .expect("checked is_object above")
                    .insert("max_attempts".to_string(), Value::from(max_attempts));
            }

            let handler_json = serde_json::to_string(&handler_value)?;

            for repeat in 0..rule.repeat_count {
                let run_at = base_run_at.map(|t| {
                    t + rule
                        .repeat_interval
                        .unwrap_or_else(Duration::zero)
                        .checked_mul(repeat as i32)
                        .unwrap_or_else(Duration::zero)
                });
                jobs.push(NewJob {
                    priority,
                    queue: queue.clone(),
                    handler: handler_json.clone(),
                    handler_id: format!("multiplexed-{}-{}", uid_fragment(&handler_json), repeat),
                    run_at,
                });
            }
        }

        Ok(jobs)
    }
}

/// A short, stable-enough fragment of the handler JSON to keep generated
/// `handler_id`s distinguishable across rules without pulling in a hashing
/// crate for it.
fn uid_fragment(handler_json: &str) -> u64 {
    let mut hash: u64 = 1469598103934665603; // FNV-1a offset basis
    for byte in handler_json.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[async_trait::async_trait]
impl Handler for MultiplexedHandler {
    #[instrument(skip(self), fields(rule_count = self.rules.len()))]
    async fn perform(&self) -> anyhow::Result<()> {
        let jobs = self.materialize()?;
        let count = jobs.len();
        self.ctx.backend().create(jobs).await?;
        info!(child_count = count, "multiplexed handler fanned out");
        Ok(())
    }

    fn name(&self) -> String {
        format!("multiplexed({} rules)", self.rules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waylay_core::Backend;

    fn ctx() -> HandlerContext {
        HandlerContext::new(Arc::new(Backend::new_for_test()))
    }

    #[test]
    fn rejects_missing_rules() {
        let err = MultiplexedHandler::build(&ctx(), &serde_json::json!({})).unwrap_err();
        assert!(err.0.contains("rules"));
    }

    #[test]
    fn rejects_empty_rules() {
        let err = MultiplexedHandler::build(&ctx(), &serde_json::json!({"rules": []})).unwrap_err();
        assert!(err.0.contains("empty"));
    }

    #[tokio::test]
    async fn materializes_one_job_per_rule_with_group_defaults() {
        let params = serde_json::json!({
            "gpriority": 2,
            "gqueue": "default",
            "arguments": {"type": "noop", "shared": true},
            "rules": [
                {"priority": 5, "arguments": {"extra": 1}},
                {"queue": "other"},
            ]
        });
        let mux = MultiplexedHandler::from_params(&ctx(), &params).unwrap();
        let jobs = mux.materialize().unwrap();
        assert_eq!(jobs.len(), 2);

        assert_eq!(jobs[0].priority, 5);
        assert_eq!(jobs[0].queue.as_deref(), Some("default"));
        let first_handler: Value = serde_json::from_str(&jobs[0].handler).unwrap();
        assert_eq!(first_handler["type"], "noop");
        assert_eq!(first_handler["shared"], true);
        assert_eq!(first_handler["extra"], 1);

        assert_eq!(jobs[1].priority, 2);
        assert_eq!(jobs[1].queue.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn repeat_count_materializes_multiple_rows_with_offset_run_at() {
        let params = serde_json::json!({
            "arguments": {"type": "noop"},
            "rules": [
                {
                    "repeat_count": 3,
                    "repeat_interval": "10s",
                    "run_at": "2024-01-01T00:00:00Z",
                }
            ]
        });
        let mux = MultiplexedHandler::from_params(&ctx(), &params).unwrap();
        let jobs = mux.materialize().unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].run_at.unwrap().timestamp(), 1704067200);
        assert_eq!(jobs[1].run_at.unwrap().timestamp(), 1704067210);
        assert_eq!(jobs[2].run_at.unwrap().timestamp(), 1704067220);
    }
}
