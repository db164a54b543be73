//! Environment written into task commands by the scheduler.

use std::collections::BTreeMap;

use crate::proto::Environment;
use crate::spec::{CommandSpec, PodInstance, TaskSpec};

use super::env::{port_env_name, to_env_name, to_proto};
use super::{
    CONFIG_TEMPLATE_ENV_PREFIX, FRAMEWORK_NAME_ENV, POD_INSTANCE_INDEX_ENV, TASK_NAME_ENV,
};

/// Builds the task environment and the (smaller) health check environment.
///
/// Variables shared by the task and its checks: the command's own
/// environment, pod index, service name, task name and reserved ports.
/// Config template locations and plan parameters go to the task only.
#[derive(Debug, Clone, Default)]
pub struct TaskEnvWriter {
    task_and_health_check: BTreeMap<String, String>,
    task_only: BTreeMap<String, String>,
}

impl TaskEnvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_port(&mut self, port_name: &str, custom_key: Option<&str>, port: u64) -> &mut Self {
        self.task_and_health_check
            .insert(port_env_name(port_name, custom_key), port.to_string());
        self
    }

    pub fn set_env(
        &mut self,
        service_name: &str,
        pod_instance: &PodInstance,
        task: &TaskSpec,
        command: &CommandSpec,
        config_download_dir: &str,
        parameters: &BTreeMap<String, String>,
    ) -> &mut Self {
        let task_name = pod_instance.task_name(task);

        self.task_and_health_check.extend(command.environment.clone());
        self.task_and_health_check
            .insert(POD_INSTANCE_INDEX_ENV.to_string(), pod_instance.index.to_string());
        self.task_and_health_check
            .insert(FRAMEWORK_NAME_ENV.to_string(), service_name.to_string());
        self.task_and_health_check
            .insert(TASK_NAME_ENV.to_string(), task_name.clone());
        // Bare task name as a key, for conditional sections in templates.
        self.task_and_health_check.insert(task_name, "true".to_string());

        for config in &task.config_files {
            // "<where the template was fetched>,<where the render goes>"
            let value = format!(
                "{config_download_dir}{},{}",
                config.name, config.relative_path
            );
            self.task_only.insert(
                format!("{CONFIG_TEMPLATE_ENV_PREFIX}{}", to_env_name(&config.name)),
                value,
            );
        }

        self.set_parameters(parameters)
    }

    pub fn set_parameters(&mut self, parameters: &BTreeMap<String, String>) -> &mut Self {
        self.task_only.extend(parameters.clone());
        self
    }

    /// Full task environment; shared variables win over task-only ones.
    pub fn task_env(&self) -> Environment {
        let mut merged = self.task_only.clone();
        merged.extend(self.task_and_health_check.clone());
        to_proto(&merged)
    }

    pub fn health_check_env(&self) -> Environment {
        to_proto(&self.task_and_health_check)
    }
}
