//! keel-core: shared types for the Keel offer-matching core.
//!
//! # Modules
//!
//! - **`proto`**: the cluster-offer wire model (resources, task and
//!   executor descriptors, offers, statuses)
//! - **`spec`**: declarative pod/task specifications
//! - **`ranges`**: inclusive range-set arithmetic used for ports
//! - **`resources`**: resource construction, in-place updates, port coalescing
//! - **`taskdata`**: environment and label codecs for task descriptors
//! - **`config`**: `keel.toml` parsing

pub mod config;
pub mod proto;
pub mod ranges;
pub mod resources;
pub mod spec;
pub mod taskdata;

pub use config::{KeelConfig, SchedulerFlags};
pub use proto::*;
pub use resources::{ResourceError, coalesce_resources};
pub use spec::*;
pub use taskdata::TaskDataError;

/// Resource name used for port ranges.
pub const PORTS_RESOURCE: &str = "ports";

/// Resource name used for disk.
pub const DISK_RESOURCE: &str = "disk";

/// Role of resources that are not reserved.
pub const UNRESERVED_ROLE: &str = "*";
