//! Declarative pod and task specifications.
//!
//! These are read-only inputs to requirement construction. Optional
//! settings (health checks, discovery, container image, ...) are `Option`
//! fields so that "not configured" is an explicit state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::PORTS_RESOURCE;
use crate::proto::{Range, Value, Visibility};

/// Desired final state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    #[default]
    Running,
    Finished,
}

impl GoalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalState::Running => "RUNNING",
            GoalState::Finished => "FINISHED",
        }
    }
}

/// Extra settings for a port resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name, used to derive the `PORT_<NAME>` variable.
    pub name: String,
    /// Custom environment variable name, used as-is.
    #[serde(default)]
    pub env_key: Option<String>,
}

/// A desired CPU, memory or port resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub value: Value,
    pub role: String,
    pub principal: String,
    /// Present for port resources.
    #[serde(default)]
    pub port: Option<PortSpec>,
}

impl ResourceSpec {
    pub fn scalar(name: &str, value: f64, role: &str, principal: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Value::scalar(value),
            role: role.to_string(),
            principal: principal.to_string(),
            port: None,
        }
    }

    /// A single named port; `port == 0` requests a dynamic port.
    pub fn port(port_name: &str, port: u64, role: &str, principal: &str) -> Self {
        Self {
            name: PORTS_RESOURCE.to_string(),
            value: Value::ranges(vec![Range::single(port)]),
            role: role.to_string(),
            principal: principal.to_string(),
            port: Some(PortSpec {
                name: port_name.to_string(),
                env_key: None,
            }),
        }
    }

    /// Requested port number for port resources (`0` = dynamic).
    pub fn port_number(&self) -> Option<u64> {
        self.port.as_ref()?;
        self.value.as_ranges()?.first().map(|r| r.begin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    /// Carved out of the agent's root disk.
    Root,
    /// A whole dedicated mount disk.
    Mount,
}

/// A desired persistent volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    pub container_path: String,
    /// Size in megabytes.
    pub size: f64,
    pub role: String,
    pub principal: String,
}

/// Resources and volumes shared by every task that names this set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub id: String,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommandSpec {
    pub value: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub command: String,
    pub max_consecutive_failures: u32,
    /// Seconds.
    pub delay: u32,
    pub interval: u32,
    pub timeout: u32,
    pub grace_period: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessCheckSpec {
    pub command: String,
    /// Seconds.
    pub delay: u32,
    pub interval: u32,
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoverySpec {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// A config template rendered into the sandbox before the task starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileSpec {
    pub name: String,
    /// Destination of the rendered file, relative to the sandbox.
    pub relative_path: String,
    #[serde(default)]
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Host port → container port.
    #[serde(default)]
    pub port_mappings: BTreeMap<u32, u32>,
    #[serde(default)]
    pub netgroups: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RLimitSpec {
    pub name: String,
    #[serde(default)]
    pub soft: Option<u64>,
    #[serde(default)]
    pub hard: Option<u64>,
}

/// Constraint on which offers a pod may land on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlacementRule {
    /// Offer hostname must be one of these.
    Hostname { hostnames: Vec<String> },
    /// Offer hostname must not be any of these.
    AvoidHostname { hostnames: Vec<String> },
    /// Offer must carry an attribute with this value.
    Attribute { name: String, value: String },
    And { rules: Vec<PlacementRule> },
    Or { rules: Vec<PlacementRule> },
    Not { rule: Box<PlacementRule> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub goal: GoalState,
    pub resource_set: ResourceSet,
    #[serde(default)]
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub readiness_check: Option<ReadinessCheckSpec>,
    #[serde(default)]
    pub discovery: Option<DiscoverySpec>,
    #[serde(default)]
    pub config_files: Vec<ConfigFileSpec>,
}

/// Declarative description of a pod type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(rename = "type")]
    pub pod_type: String,
    pub count: u32,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub rlimits: Vec<RLimitSpec>,
    #[serde(default)]
    pub uris: Vec<String>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub placement: Option<PlacementRule>,
}

/// One copy (by index) of a pod specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstance {
    pub pod: PodSpec,
    pub index: u32,
}

impl PodInstance {
    pub fn new(pod: PodSpec, index: u32) -> Self {
        Self { pod, index }
    }

    /// `<type>-<index>`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.pod.pod_type, self.index)
    }

    /// `<type>-<index>-<task>`.
    pub fn task_name(&self, task: &TaskSpec) -> String {
        format!("{}-{}", self.name(), task.name)
    }
}

/// What a plan step asks for: which tasks of a pod instance to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInstanceRequirement {
    pub pod_instance: PodInstance,
    pub tasks_to_launch: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl PodInstanceRequirement {
    pub fn new(pod_instance: PodInstance, tasks_to_launch: Vec<String>) -> Self {
        Self {
            pod_instance,
            tasks_to_launch,
            parameters: BTreeMap::new(),
        }
    }

    pub fn launches(&self, task: &TaskSpec) -> bool {
        self.tasks_to_launch.iter().any(|t| t == &task.name)
    }
}
