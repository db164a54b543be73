//! Task data codecs.
//!
//! Task descriptors carry orchestrator state in two key/value channels:
//! command environment variables (visible to the task) and metadata labels
//! (visible only to the scheduler). Both are decoded into alphabetically
//! ordered maps for stable logging and re-encoded on write.

pub mod env;
pub mod labels;
pub mod task_env;

use std::collections::BTreeMap;

use thiserror::Error;

pub use env::{get_env_var, port_env_name, set_env_var, to_env_name};
pub use labels::{LabelReader, LabelWriter};
pub use task_env::TaskEnvWriter;

/// Environment variable carrying the pod instance index.
pub const POD_INSTANCE_INDEX_ENV: &str = "POD_INSTANCE_INDEX";
/// Prefix of port variables: `PORT_<NAME>`.
pub const PORT_NAME_ENV_PREFIX: &str = "PORT_";
/// Prefix of config template variables consumed by the bootstrap helper.
pub const CONFIG_TEMPLATE_ENV_PREFIX: &str = "CONFIG_TEMPLATE_";
/// Environment variable carrying the service name.
pub const FRAMEWORK_NAME_ENV: &str = "FRAMEWORK_NAME";
/// Environment variable carrying the task instance name.
pub const TASK_NAME_ENV: &str = "TASK_NAME";

/// Errors raised while decoding task data.
#[derive(Debug, Error)]
pub enum TaskDataError {
    #[error("task {task} is missing {kind} {key}; current {kind}s are: {current:?}")]
    Missing {
        task: String,
        kind: &'static str,
        key: String,
        current: BTreeMap<String, String>,
    },

    #[error("task {task} has malformed {kind} {key}: {reason}")]
    Malformed {
        task: String,
        kind: &'static str,
        key: String,
        reason: String,
    },
}
