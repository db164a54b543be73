//! Draft task descriptors built from task specifications.

use std::collections::BTreeMap;

use keel_core::taskdata::{LabelWriter, TaskEnvWriter};
use keel_core::{
    CommandInfo, DiscoveryInfo, DiscoverySpec, PodInstance, Resource, TaskInfo, TaskSpec,
};
use tracing::debug;
use uuid::Uuid;

use crate::checks;

/// Sandbox directory config templates are fetched into.
pub const CONFIG_TEMPLATE_DOWNLOAD_DIR: &str = "config-templates/";

/// Build the draft descriptor for one task of a pod instance.
///
/// Task and agent ids stay empty until an offer is matched. Ports with a
/// fixed number are advertised right away; dynamic ones are filled in
/// during evaluation.
pub fn create_task_info(
    service_name: &str,
    target_configuration: Uuid,
    pod_instance: &PodInstance,
    task: &TaskSpec,
    parameters: &BTreeMap<String, String>,
    resources: Vec<Resource>,
    transient: bool,
) -> TaskInfo {
    let mut info = TaskInfo::draft(pod_instance.task_name(task));
    info.resources = resources;

    let labels = LabelWriter::new()
        .set_target_configuration(target_configuration)
        .set_goal_state(task.goal)
        .set_type(&pod_instance.pod.pod_type)
        .set_index(pod_instance.index);
    info.labels = if transient { labels.set_transient() } else { labels }.to_proto();

    let mut env = TaskEnvWriter::new();
    if let Some(command) = &task.command {
        env.set_env(
            service_name,
            pod_instance,
            task,
            command,
            CONFIG_TEMPLATE_DOWNLOAD_DIR,
            parameters,
        );
        for spec in &task.resource_set.resources {
            if let (Some(port), Some(number)) = (&spec.port, spec.port_number()) {
                if number != 0 {
                    env.set_port(&port.name, port.env_key.as_deref(), number);
                }
            }
        }
        info.command = Some(CommandInfo {
            value: command.value.clone(),
            environment: env.task_env(),
            uris: Vec::new(),
            user: pod_instance.pod.user.clone(),
        });
    }

    info.discovery = task
        .discovery
        .as_ref()
        .map(|d| discovery_info(d, pod_instance.index));

    match &task.health_check {
        Some(spec) => info.health_check = Some(checks::health_check(spec, env.health_check_env())),
        None => debug!(task = %info.name, "no health check defined"),
    }
    match &task.readiness_check {
        Some(spec) => {
            let check = checks::readiness_check(spec, env.health_check_env());
            checks::set_readiness_check(&mut info, &check);
        }
        None => debug!(task = %info.name, "no readiness check defined"),
    }

    info
}

/// `<prefix>-<index>` when a prefix is set; cluster-wide unless configured.
fn discovery_info(spec: &DiscoverySpec, index: u32) -> DiscoveryInfo {
    DiscoveryInfo {
        name: spec.prefix.as_ref().map(|p| format!("{p}-{index}")),
        visibility: spec.visibility.unwrap_or_default(),
    }
}
