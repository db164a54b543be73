//! Offer requirement construction.
//!
//! A pod instance is turned into an [`OfferRequirement`] in one of two
//! ways: for a first launch every resource is derived from the pod
//! specification, for a relaunch the reservations recorded on the persisted
//! task descriptors are carried forward and updated in place.

use std::collections::{BTreeMap, HashSet};

use keel_core::resources::{desired_volume, expected_resource, update_resource};
use keel_core::taskdata::{get_env_var, port_env_name};
use keel_core::{
    PodInstance, PodInstanceRequirement, Resource, ResourceSpec, SchedulerFlags, TaskInfo,
    TaskSpec, coalesce_resources,
};
use keel_offer::{
    ExecutorRequirement, OfferRequirement, RequirementKind, ResourceRequirement, TaskRequirement,
};
use keel_state::TaskStore;
use tracing::{debug, error, info};

use crate::error::SchedulerResult;
use crate::executor::{new_executor, pod_tasks, running_executor};
use crate::task::create_task_info;

/// Builds offer requirements for pod instances.
pub trait OfferRequirementProvider {
    /// Requirement for launching tasks of a pod instance for the first time.
    fn new_requirement(&self, requirement: &PodInstanceRequirement) -> SchedulerResult<OfferRequirement>;

    /// Requirement for relaunching tasks that already hold reservations.
    fn existing_requirement(
        &self,
        requirement: &PodInstanceRequirement,
    ) -> SchedulerResult<OfferRequirement>;
}

/// Provider reading prior launches from a [`TaskStore`].
#[derive(Debug, Clone)]
pub struct DefaultOfferRequirementProvider<S> {
    store: S,
    service_name: String,
    flags: SchedulerFlags,
}

impl<S: TaskStore> DefaultOfferRequirementProvider<S> {
    pub fn new(store: S, service_name: impl Into<String>, flags: SchedulerFlags) -> Self {
        Self {
            store,
            service_name: service_name.into(),
            flags,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Running executor of the pod instance, else a fresh descriptor.
    fn executor_requirement(&self, pod_instance: &PodInstance) -> SchedulerResult<ExecutorRequirement> {
        let executor = match running_executor(&self.store, pod_instance)? {
            Some(executor) => executor,
            None => {
                info!(pod = %pod_instance.name(), "no running tasks, creating new executor");
                new_executor(&self.service_name, &self.flags, &pod_instance.pod)
            }
        };
        Ok(ExecutorRequirement::new(executor))
    }

    fn task_info(
        &self,
        requirement: &PodInstanceRequirement,
        task: &TaskSpec,
        resources: Vec<Resource>,
        transient: bool,
    ) -> TaskInfo {
        create_task_info(
            &self.service_name,
            self.flags.target_config_id,
            &requirement.pod_instance,
            task,
            &requirement.parameters,
            resources,
            transient,
        )
    }

    fn new_task_requirement(
        &self,
        requirement: &PodInstanceRequirement,
        task: &TaskSpec,
        transient: bool,
    ) -> TaskRequirement {
        let info = self.task_info(requirement, task, coalesce_resources(new_resources(task)), transient);
        TaskRequirement::new(info, resource_requirements(task, &[], &[], None))
    }
}

impl<S: TaskStore> OfferRequirementProvider for DefaultOfferRequirementProvider<S> {
    fn new_requirement(&self, requirement: &PodInstanceRequirement) -> SchedulerResult<OfferRequirement> {
        let pod_instance = &requirement.pod_instance;
        let pod = &pod_instance.pod;
        info!(
            pod = %pod_instance.name(),
            tasks = ?requirement.tasks_to_launch,
            "building new offer requirement"
        );

        let mut covered: HashSet<&str> = HashSet::new();
        let mut tasks = Vec::new();

        // The first launched task of each resource set owns its reservation.
        for task in pod.tasks.iter().filter(|t| requirement.launches(t)) {
            let resource_set = task.resource_set.id.as_str();
            if covered.insert(resource_set) {
                debug!(task = %task.name, resource_set, "launching task");
                tasks.push(self.new_task_requirement(requirement, task, false));
            } else {
                debug!(task = %task.name, resource_set, "resource set already owned by a launched task");
            }
        }

        // Remaining tasks complete the pod's footprint without being started.
        for task in pod.tasks.iter().filter(|t| !requirement.launches(t)) {
            let resource_set = task.resource_set.id.as_str();
            if covered.insert(resource_set) {
                debug!(task = %task.name, resource_set, "transient task reserving resource set");
                tasks.push(self.new_task_requirement(requirement, task, true));
            } else {
                debug!(task = %task.name, resource_set, "transient placeholder on owned resource set");
                let info = self.task_info(requirement, task, Vec::new(), true);
                tasks.push(TaskRequirement::new(info, Vec::new()));
            }
        }

        let executor = self.executor_requirement(pod_instance)?;
        let offer_requirement =
            OfferRequirement::new(pod_instance.index, tasks, Some(executor), pod.placement.clone())?;
        Ok(offer_requirement)
    }

    fn existing_requirement(
        &self,
        requirement: &PodInstanceRequirement,
    ) -> SchedulerResult<OfferRequirement> {
        let pod_instance = &requirement.pod_instance;
        let pod = &pod_instance.pod;
        info!(
            pod = %pod_instance.name(),
            tasks = ?requirement.tasks_to_launch,
            "building offer requirement from persisted tasks"
        );

        let mut tasks = Vec::new();
        for task in pod.tasks.iter().filter(|t| requirement.launches(t)) {
            let name = pod_instance.task_name(task);

            let (resources, previous, prior) = match self.store.fetch_task(&name)? {
                Some(old) => (updated_resources(task, &old), old.resources.clone(), Some(old)),
                None => match self.sibling_task(pod_instance, task)? {
                    Some(sibling) => {
                        debug!(task = %name, sibling = %sibling.name, "borrowing resources of sibling task");
                        (sibling.resources.clone(), sibling.resources.clone(), Some(sibling))
                    }
                    None => {
                        error!(
                            task = %name,
                            resource_set = %task.resource_set.id,
                            "no persisted task with this resource set"
                        );
                        (Vec::new(), Vec::new(), None)
                    }
                },
            };

            let info = self.task_info(requirement, task, resources, false);
            let resource_requirements =
                resource_requirements(task, &info.resources, &previous, prior.as_ref());
            tasks.push(TaskRequirement::new(info, resource_requirements));
        }

        let executor = self.executor_requirement(pod_instance)?;
        // Placement was satisfied when the reservations were first made.
        let offer_requirement = OfferRequirement::new(pod_instance.index, tasks, Some(executor), None)?;
        Ok(offer_requirement)
    }
}

impl<S: TaskStore> DefaultOfferRequirementProvider<S> {
    /// A persisted task of the same pod instance using the task's resource set.
    fn sibling_task(&self, pod_instance: &PodInstance, task: &TaskSpec) -> SchedulerResult<Option<TaskInfo>> {
        let names: HashSet<String> = pod_instance
            .pod
            .tasks
            .iter()
            .filter(|t| t.resource_set.id == task.resource_set.id)
            .map(|t| pod_instance.task_name(t))
            .collect();
        let sibling = pod_tasks(&self.store, pod_instance)?
            .into_iter()
            .find(|t| names.contains(&t.name));
        Ok(sibling)
    }
}

/// Expected entries for every resource and volume of the task's set.
fn new_resources(task: &TaskSpec) -> Vec<Resource> {
    let set = &task.resource_set;
    set.resources
        .iter()
        .map(expected_resource)
        .chain(set.volumes.iter().map(desired_volume))
        .collect()
}

/// Carry a persisted task's reservations forward to the current spec.
///
/// Disk entries are kept verbatim. Other entries take the desired value
/// but keep their reservation metadata; an entry that cannot be updated is
/// kept unchanged.
fn updated_resources(task: &TaskSpec, old: &TaskInfo) -> Vec<Resource> {
    let (mut resources, others): (Vec<Resource>, Vec<Resource>) =
        old.resources.iter().cloned().partition(Resource::has_disk);
    let old_by_name: BTreeMap<&str, &Resource> =
        others.iter().map(|r| (r.name.as_str(), r)).collect();

    let updated = task
        .resource_set
        .resources
        .iter()
        .map(|spec| match old_by_name.get(spec.name.as_str()) {
            Some(previous) => update_resource(previous, spec).unwrap_or_else(|e| {
                error!(
                    task = %old.name,
                    resource = %spec.name,
                    error = %e,
                    "failed to update resource, keeping previous entry"
                );
                (*previous).clone()
            }),
            None => expected_resource(spec),
        })
        .collect();

    resources.extend(coalesce_resources(updated));
    resources
}

fn by_name<'a>(resources: &'a [Resource], name: &str) -> Option<&'a Resource> {
    resources.iter().find(|r| !r.has_disk() && r.name == name)
}

fn by_container_path<'a>(resources: &'a [Resource], path: &str) -> Option<&'a Resource> {
    resources.iter().find(|r| r.container_path() == Some(path))
}

/// Resource requirements for a task.
///
/// `resources` are the entries the task will carry, `previous` the ones it
/// held before and `prior` the descriptor they came from, whose environment
/// records previously assigned ports.
fn resource_requirements(
    task: &TaskSpec,
    resources: &[Resource],
    previous: &[Resource],
    prior: Option<&TaskInfo>,
) -> Vec<ResourceRequirement> {
    let set = &task.resource_set;
    let mut requirements: Vec<ResourceRequirement> = set
        .resources
        .iter()
        .map(|spec| match &spec.port {
            Some(_) => port_requirement(spec, previous, prior),
            None => ResourceRequirement::scalar(
                by_name(resources, &spec.name)
                    .cloned()
                    .unwrap_or_else(|| expected_resource(spec)),
                by_name(previous, &spec.name).cloned(),
            ),
        })
        .collect();

    requirements.extend(set.volumes.iter().map(|spec| {
        ResourceRequirement::volume(
            spec.volume_type,
            by_container_path(resources, &spec.container_path)
                .cloned()
                .unwrap_or_else(|| desired_volume(spec)),
            by_container_path(previous, &spec.container_path).cloned(),
        )
    }));
    requirements
}

fn port_requirement(spec: &ResourceSpec, previous: &[Resource], prior: Option<&TaskInfo>) -> ResourceRequirement {
    let (name, env_key) = spec
        .port
        .as_ref()
        .map(|p| (p.name.clone(), p.env_key.clone()))
        .unwrap_or_default();
    let env_name = port_env_name(&name, env_key.as_deref());
    let assigned = prior
        .and_then(|t| t.command.as_ref())
        .and_then(|c| get_env_var(c, &env_name))
        .and_then(|v| v.parse::<u64>().ok());

    ResourceRequirement {
        kind: RequirementKind::Port {
            name,
            env_key,
            assigned,
        },
        resource: expected_resource(spec),
        previous: previous.iter().find(|r| r.is_ports()).cloned(),
    }
}
