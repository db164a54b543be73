//! keel-scheduler: turns pod specifications and persisted state into offer
//! requirements.
//!
//! # Components
//!
//! - **`provider`**: `OfferRequirementProvider`: new and existing requirements
//! - **`executor`**: executor reuse and synthesis
//! - **`task`**: draft task descriptors
//! - **`checks`**: health and readiness check descriptors
//! - **`locks`**: per-pod-instance serialization and the `Planner`

pub mod checks;
pub mod error;
pub mod executor;
pub mod locks;
pub mod provider;
pub mod task;

pub use error::{SchedulerError, SchedulerResult};
pub use locks::{Planner, PodInstanceLocks};
pub use provider::{DefaultOfferRequirementProvider, OfferRequirementProvider};
pub use task::CONFIG_TEMPLATE_DOWNLOAD_DIR;
