// src/pipeline/planner.rs

//! Fan-Out Planners.
//!
//! A planner looks at a value a previous stage left in the Session Context
//! and decides, at run time, how many tasks a Parallel stage spawns. The
//! returned list is final: the executor never adds tasks once a stage has
//! started.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::context::result_key;
use crate::pipeline::task::TaskSpec;

/// Default output key prefix: tasks write to `result_0`, `result_1`, ...
pub const DEFAULT_KEY_PREFIX: &str = "result";

/// Materializes the task list of a Parallel stage from a context value.
pub trait FanOutPlanner: Send + Sync {
    /// `source` is the context value at the stage's source key, if any.
    ///
    /// Malformed entries are dropped, never fatal. Every emitted spec must
    /// carry a distinct output key.
    fn plan(&self, source: Option<&Value>) -> Vec<TaskSpec>;
}

/// Something a fan-out task is about (a competitor, a founder, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub additional_info: String,
    /// Explicitly supplied entities win over discovered ones when capping.
    #[serde(default)]
    pub priority: bool,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            additional_info: String::new(),
            priority: false,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = info.into();
        self
    }

    pub fn prioritized(mut self) -> Self {
        self.priority = true;
        self
    }

    /// Parse one list entry; `None` for anything without a usable name.
    fn from_entry(entry: &Value) -> Option<Self> {
        let obj = entry.as_object()?;
        let name = obj.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        let additional_info = obj
            .get("additional_info")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        let priority = obj.get("priority").and_then(Value::as_bool).unwrap_or(false);

        Some(Self {
            name: name.to_string(),
            additional_info,
            priority,
        })
    }
}

/// Keep priority entries first (stable), then cap at `max_width`.
pub fn cap_width(mut entities: Vec<Entity>, max_width: usize) -> Vec<Entity> {
    // `sort_by_key` is stable, so each group keeps its original order.
    entities.sort_by_key(|e| !e.priority);
    entities.truncate(max_width);
    entities
}

/// Plans one task per named entity found in a list.
///
/// Accepts either a bare JSON array or an object holding the array under
/// `field` (default `"competitors"`). A JSON document inside a string is
/// parsed first, since generators sometimes return structured data as text.
#[derive(Debug, Clone)]
pub struct EntityPlanner {
    max_width: usize,
    field: String,
    key_prefix: String,
    task_timeout: Option<Duration>,
}

impl EntityPlanner {
    pub fn new(max_width: usize) -> Self {
        Self {
            max_width,
            field: "competitors".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            task_timeout: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }

    /// All well-formed entities in `source`, in source order, uncapped.
    pub fn usable_entities(&self, source: Option<&Value>) -> Vec<Entity> {
        let Some(source) = source else {
            debug!(field = %self.field, "fan-out source missing; planning nothing");
            return Vec::new();
        };

        let parsed;
        let source = match source {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => {
                    warn!(error = %e, "fan-out source is text but not JSON; planning nothing");
                    return Vec::new();
                }
            },
            other => other,
        };

        let entries = match source {
            Value::Array(items) => items,
            Value::Object(map) => match map.get(&self.field).and_then(Value::as_array) {
                Some(items) => items,
                None => {
                    warn!(field = %self.field, "fan-out source has no list under field");
                    return Vec::new();
                }
            },
            _ => {
                warn!("fan-out source is neither a list nor an object");
                return Vec::new();
            }
        };

        entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let entity = Entity::from_entry(entry);
                if entity.is_none() {
                    warn!(entry = i, "dropping malformed fan-out entry");
                }
                entity
            })
            .collect()
    }
}

impl FanOutPlanner for EntityPlanner {
    fn plan(&self, source: Option<&Value>) -> Vec<TaskSpec> {
        let usable = self.usable_entities(source);
        let usable_count = usable.len();
        let selected = cap_width(usable, self.max_width);

        if usable_count > selected.len() {
            debug!(
                usable = usable_count,
                max_width = self.max_width,
                "fan-out capped; dropping lowest-priority entries"
            );
        }

        selected
            .into_iter()
            .enumerate()
            .map(|(index, entity)| {
                let mut spec = TaskSpec::new(
                    entity.name.clone(),
                    result_key(&self.key_prefix, index),
                )
                .with_input(json!({
                    "name": entity.name,
                    "additional_info": entity.additional_info,
                    "priority": entity.priority,
                }));
                if let Some(timeout) = self.task_timeout {
                    spec = spec.with_timeout(timeout);
                }
                spec
            })
            .collect()
    }
}
