//! Wire model for the cluster-offer protocol.
//!
//! These types mirror the descriptors exchanged with the cluster master:
//! offered resources, task and executor descriptors, and task statuses.
//! All of them are JSON-serializable so they can be persisted as-is.

use serde::{Deserialize, Serialize};

use crate::{DISK_RESOURCE, PORTS_RESOURCE, UNRESERVED_ROLE};

// ── Resources ─────────────────────────────────────────────────────

/// An inclusive range of values, e.g. a port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// A range holding exactly one value.
    pub fn single(value: u64) -> Self {
        Self { begin: value, end: value }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.begin <= value && value <= self.end
    }
}

/// Value of a resource entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Scalar { value: f64 },
    Ranges { ranges: Vec<Range> },
}

impl Value {
    pub fn scalar(value: f64) -> Self {
        Value::Scalar { value }
    }

    pub fn ranges(ranges: Vec<Range>) -> Self {
        Value::Ranges { ranges }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar { value } => Some(*value),
            Value::Ranges { .. } => None,
        }
    }

    pub fn as_ranges(&self) -> Option<&[Range]> {
        match self {
            Value::Ranges { ranges } => Some(ranges),
            Value::Scalar { .. } => None,
        }
    }
}

/// Reservation metadata attached to a reserved resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub principal: String,
    /// Identifier the orchestrator assigns to a reservation so it can find
    /// it again in later offers.
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// Access mode of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    #[default]
    Rw,
    Ro,
}

/// A volume mounted into the task sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub container_path: String,
    #[serde(default)]
    pub mode: VolumeMode,
}

/// Where a disk resource comes from on the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiskSource {
    Path { root: String },
    Mount { root: String },
}

/// Disk sub-descriptor of a resource entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiskInfo {
    #[serde(default)]
    pub persistence_id: Option<String>,
    #[serde(default)]
    pub volume: Option<Volume>,
    #[serde(default)]
    pub source: Option<DiskSource>,
}

/// A single resource entry of an offer or a task descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: Value,
    pub role: String,
    #[serde(default)]
    pub reservation: Option<ReservationInfo>,
    #[serde(default)]
    pub disk: Option<DiskInfo>,
}

impl Resource {
    /// An unreserved scalar entry, as it appears in offers.
    pub fn unreserved_scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: Value::scalar(value),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    /// An unreserved range entry, as it appears in offers.
    pub fn unreserved_ranges(name: &str, ranges: Vec<Range>) -> Self {
        Self {
            name: name.to_string(),
            value: Value::ranges(ranges),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    pub fn scalar(&self) -> Option<f64> {
        self.value.as_scalar()
    }

    pub fn ranges(&self) -> Option<&[Range]> {
        self.value.as_ranges()
    }

    pub fn is_reserved(&self) -> bool {
        self.role != UNRESERVED_ROLE
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.reservation.as_ref()?.resource_id.as_deref()
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn is_ports(&self) -> bool {
        self.name == PORTS_RESOURCE && self.ranges().is_some()
    }

    pub fn is_disk(&self) -> bool {
        self.name == DISK_RESOURCE
    }

    pub fn persistence_id(&self) -> Option<&str> {
        self.disk.as_ref()?.persistence_id.as_deref()
    }

    pub fn container_path(&self) -> Option<&str> {
        Some(self.disk.as_ref()?.volume.as_ref()?.container_path.as_str())
    }

    pub fn is_mount_disk(&self) -> bool {
        matches!(
            self.disk.as_ref().and_then(|d| d.source.as_ref()),
            Some(DiskSource::Mount { .. })
        )
    }
}

// ── Key/value data ────────────────────────────────────────────────

/// One environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// Environment of a command, as an ordered list of variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Environment {
    pub variables: Vec<Variable>,
}

/// One metadata label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// Metadata labels attached to a task descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Labels {
    pub labels: Vec<Label>,
}

// ── Commands and containers ───────────────────────────────────────

/// An artifact fetched into the sandbox before the command starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandUri {
    pub value: String,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default = "default_extract")]
    pub extract: bool,
}

fn default_extract() -> bool {
    true
}

impl CommandUri {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            output_file: None,
            extract: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommandInfo {
    pub value: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub uris: Vec<CommandUri>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerImage {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpProtocol {
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub ip_address: String,
    pub protocol: IpProtocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u32,
    pub container_port: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RLimit {
    /// Limit name, e.g. `RLMT_NOFILE`.
    pub kind: String,
    #[serde(default)]
    pub soft: Option<u64>,
    #[serde(default)]
    pub hard: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RLimitInfo {
    pub rlimits: Vec<RLimit>,
}

/// Container settings; only the native containerizer is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainerInfo {
    #[serde(default)]
    pub image: Option<DockerImage>,
    #[serde(default)]
    pub network_infos: Vec<NetworkInfo>,
    #[serde(default)]
    pub rlimit_info: Option<RLimitInfo>,
}

// ── Descriptors ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Framework,
    #[default]
    Cluster,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub visibility: Visibility,
}

/// Command-based check descriptor, used for health and readiness checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub delay_seconds: f64,
    pub interval_seconds: f64,
    pub timeout_seconds: f64,
    pub consecutive_failures: u32,
    pub grace_period_seconds: f64,
    pub command: CommandInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub name: String,
    /// Empty until an evaluation assigns one.
    pub executor_id: String,
    pub command: CommandInfo,
    #[serde(default)]
    pub container: Option<ContainerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    /// Empty in drafts; assigned when the task is matched to an offer.
    pub task_id: String,
    /// Empty in drafts; the agent of the matched offer.
    pub agent_id: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub command: Option<CommandInfo>,
    #[serde(default)]
    pub executor: Option<ExecutorInfo>,
    #[serde(default)]
    pub discovery: Option<DiscoveryInfo>,
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub labels: Labels,
}

impl TaskInfo {
    /// A draft descriptor with no ids, resources or labels.
    pub fn draft(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_id: String::new(),
            agent_id: String::new(),
            resources: Vec::new(),
            command: None,
            executor: None,
            discovery: None,
            health_check: None,
            labels: Labels::default(),
        }
    }

    /// Environment of the task command, if any.
    pub fn environment(&self) -> Option<&Environment> {
        self.command.as_ref().map(|c| &c.environment)
    }
}

// ── Offers and statuses ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A bundle of resources on one agent, advertised by the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub agent_id: String,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Executors already running on the agent for this framework.
    #[serde(default)]
    pub executor_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
    Unknown,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "staging" => Ok(TaskState::Staging),
            "starting" => Ok(TaskState::Starting),
            "running" => Ok(TaskState::Running),
            "finished" => Ok(TaskState::Finished),
            "failed" => Ok(TaskState::Failed),
            "killed" => Ok(TaskState::Killed),
            "lost" => Ok(TaskState::Lost),
            "error" => Ok(TaskState::Error),
            "unknown" => Ok(TaskState::Unknown),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// Last observed status of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<String>,
}
