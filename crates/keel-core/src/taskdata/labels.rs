//! Scheduler-private task labels.
//!
//! Labels record what the scheduler needs to recognize a task later: the
//! configuration it was launched against, its pod type and index, its goal
//! state, whether it is a transient placeholder, and its readiness check
//! (which has no field of its own in the wire protocol).

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::proto::{HealthCheck, Label, Labels, TaskInfo};
use crate::spec::GoalState;

use super::TaskDataError;

pub const TARGET_CONFIGURATION_LABEL: &str = "target_configuration";
pub const GOAL_STATE_LABEL: &str = "goal_state";
pub const TASK_TYPE_LABEL: &str = "task_type";
pub const INDEX_LABEL: &str = "index";
pub const TRANSIENT_LABEL: &str = "transient";
pub const READINESS_CHECK_LABEL: &str = "readiness_check";

const LABEL_KIND: &str = "label";
const TRUE_VALUE: &str = "true";

/// Decode labels into an alphabetically ordered map (last duplicate wins).
pub fn to_map(labels: &Labels) -> BTreeMap<String, String> {
    labels
        .labels
        .iter()
        .map(|l| (l.key.clone(), l.value.clone()))
        .collect()
}

/// Encode a map as labels, in map order.
pub fn to_proto(map: &BTreeMap<String, String>) -> Labels {
    Labels {
        labels: map
            .iter()
            .map(|(key, value)| Label {
                key: key.clone(),
                value: value.clone(),
            })
            .collect(),
    }
}

/// Write access to a task's labels.
#[derive(Debug, Clone, Default)]
pub struct LabelWriter {
    map: BTreeMap<String, String>,
}

impl LabelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the labels already present on a task.
    pub fn from_task(task: &TaskInfo) -> Self {
        Self {
            map: to_map(&task.labels),
        }
    }

    pub fn set_target_configuration(mut self, id: Uuid) -> Self {
        self.map.insert(TARGET_CONFIGURATION_LABEL.to_string(), id.to_string());
        self
    }

    pub fn set_goal_state(mut self, goal: GoalState) -> Self {
        self.map.insert(GOAL_STATE_LABEL.to_string(), goal.as_str().to_string());
        self
    }

    pub fn set_type(mut self, pod_type: &str) -> Self {
        self.map.insert(TASK_TYPE_LABEL.to_string(), pod_type.to_string());
        self
    }

    pub fn set_index(mut self, index: u32) -> Self {
        self.map.insert(INDEX_LABEL.to_string(), index.to_string());
        self
    }

    /// Mark the task as a footprint placeholder that must not be started.
    pub fn set_transient(mut self) -> Self {
        self.map.insert(TRANSIENT_LABEL.to_string(), TRUE_VALUE.to_string());
        self
    }

    /// Store a readiness check, JSON-encoded.
    pub fn set_readiness_check(mut self, check: &HealthCheck) -> Self {
        // HealthCheck holds only plain data, serialization cannot fail.
        if let Ok(json) = serde_json::to_string(check) {
            self.map.insert(READINESS_CHECK_LABEL.to_string(), json);
        }
        self
    }

    pub fn to_proto(&self) -> Labels {
        to_proto(&self.map)
    }
}

/// Read access to a task's labels.
#[derive(Debug, Clone)]
pub struct LabelReader {
    task_name: String,
    map: BTreeMap<String, String>,
}

impl LabelReader {
    pub fn new(task: &TaskInfo) -> Self {
        Self {
            task_name: task.name.clone(),
            map: to_map(&task.labels),
        }
    }

    fn get_or_err(&self, key: &str) -> Result<&str, TaskDataError> {
        self.map
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| TaskDataError::Missing {
                task: self.task_name.clone(),
                kind: LABEL_KIND,
                key: key.to_string(),
                current: self.map.clone(),
            })
    }

    fn malformed(&self, key: &str, reason: impl ToString) -> TaskDataError {
        TaskDataError::Malformed {
            task: self.task_name.clone(),
            kind: LABEL_KIND,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Pod type the task belongs to.
    pub fn pod_type(&self) -> Result<String, TaskDataError> {
        self.get_or_err(TASK_TYPE_LABEL).map(str::to_string)
    }

    pub fn index(&self) -> Result<u32, TaskDataError> {
        let raw = self.get_or_err(INDEX_LABEL)?;
        raw.parse::<u32>().map_err(|e| self.malformed(INDEX_LABEL, e))
    }

    pub fn target_configuration(&self) -> Result<Uuid, TaskDataError> {
        let raw = self.get_or_err(TARGET_CONFIGURATION_LABEL)?;
        Uuid::parse_str(raw).map_err(|e| self.malformed(TARGET_CONFIGURATION_LABEL, e))
    }

    pub fn goal_state(&self) -> Result<GoalState, TaskDataError> {
        match self.get_or_err(GOAL_STATE_LABEL)? {
            "RUNNING" => Ok(GoalState::Running),
            "FINISHED" => Ok(GoalState::Finished),
            other => Err(self.malformed(GOAL_STATE_LABEL, format!("unknown goal state {other}"))),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.map.get(TRANSIENT_LABEL).is_some_and(|v| v == TRUE_VALUE)
    }

    /// Readiness check, if one was configured.
    pub fn readiness_check(&self) -> Result<Option<HealthCheck>, TaskDataError> {
        match self.map.get(READINESS_CHECK_LABEL) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| self.malformed(READINESS_CHECK_LABEL, e)),
            None => Ok(None),
        }
    }
}
