//! PodInfoBuilder: the task and executor drafts for one evaluation attempt.
//!
//! Created from an [`OfferRequirement`] when an attempt starts and threaded
//! by `&mut` through every stage, so each stage sees what earlier stages
//! wrote. Never outlives the attempt.

use keel_core::taskdata::{LabelReader, LabelWriter, set_env_var};
use keel_core::{ExecutorInfo, Offer, Range, Resource, TaskInfo, Value, ranges};
use tracing::warn;
use uuid::Uuid;

use crate::requirement::OfferRequirement;

#[derive(Debug, Clone)]
pub struct PodInfoBuilder {
    agent_id: String,
    tasks: Vec<TaskInfo>,
    executor: Option<ExecutorInfo>,
}

impl PodInfoBuilder {
    pub fn new(requirement: &OfferRequirement, offer: &Offer) -> Self {
        let tasks = requirement
            .task_requirements
            .iter()
            .map(|t| {
                let mut task = t.task_info.clone();
                task.task_id = format!("{}__{}", task.name, Uuid::new_v4());
                task.agent_id = offer.agent_id.clone();
                // Ports are re-resolved by the port stages.
                task.resources.retain(|r| !r.is_ports());
                task
            })
            .collect();

        Self {
            agent_id: offer.agent_id.clone(),
            tasks,
            executor: requirement
                .executor_requirement
                .as_ref()
                .map(|e| e.executor_info.clone()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn task(&self, name: &str) -> Option<&TaskInfo> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut TaskInfo> {
        self.tasks.iter_mut().find(|t| t.name == name)
    }

    pub fn executor(&self) -> Option<&ExecutorInfo> {
        self.executor.as_ref()
    }

    pub fn executor_mut(&mut self) -> Option<&mut ExecutorInfo> {
        self.executor.as_mut()
    }

    /// Replace the task's entry for this resource, or append it.
    ///
    /// Volumes are matched by container path, everything else by name.
    pub fn set_resource(&mut self, task: &str, resource: Resource) -> bool {
        let Some(task) = self.task_mut(task) else {
            return false;
        };
        let existing = task.resources.iter_mut().find(|r| match resource.container_path() {
            Some(path) => r.container_path() == Some(path),
            None => !r.has_disk() && r.name == resource.name,
        });
        match existing {
            Some(slot) => *slot = resource,
            None => task.resources.push(resource),
        }
        true
    }

    /// Add one port to the task's single ports entry and advertise it in the
    /// task, health check and readiness check environments.
    pub fn add_port(&mut self, task: &str, template: &Resource, port: u64, env_name: &str) -> bool {
        let Some(task) = self.task_mut(task) else {
            return false;
        };

        match task.resources.iter_mut().find(|r| r.is_ports()) {
            Some(entry) => {
                let merged = ranges::union(entry.ranges().unwrap_or_default(), &[Range::single(port)]);
                entry.value = Value::ranges(merged);
            }
            None => {
                let mut entry = template.clone();
                entry.value = Value::ranges(vec![Range::single(port)]);
                if let Some(reservation) = entry.reservation.as_mut() {
                    reservation.resource_id = None;
                }
                task.resources.push(entry);
            }
        }

        let value = port.to_string();
        set_env_var(task.command.get_or_insert_with(Default::default), env_name, &value);
        if let Some(check) = task.health_check.as_mut() {
            set_env_var(&mut check.command, env_name, &value);
        }
        match LabelReader::new(task).readiness_check() {
            Ok(Some(mut check)) => {
                set_env_var(&mut check.command, env_name, &value);
                task.labels = LabelWriter::from_task(task)
                    .set_readiness_check(&check)
                    .to_proto();
            }
            Ok(None) => {}
            Err(err) => warn!(task = %task.name, error = %err, "readiness check not updated"),
        }
        true
    }

    /// The finished descriptor for a task, with the executor attached.
    pub fn build_task(&self, name: &str) -> Option<TaskInfo> {
        let mut task = self.task(name)?.clone();
        if task.executor.is_none() {
            task.executor = self.executor.clone();
        }
        Some(task)
    }
}
