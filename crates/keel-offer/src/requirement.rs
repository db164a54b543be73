//! Requirement model: what one pod instance needs, independent of any offer.

use keel_core::taskdata::LabelReader;
use keel_core::{ExecutorInfo, PlacementRule, Resource, TaskDataError, TaskInfo, VolumeType};
use tracing::debug;

use crate::error::{OfferError, OfferResult};

/// What kind of resource a requirement asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum RequirementKind {
    /// CPU, memory or any other scalar.
    Scalar,
    /// One named port. The desired port number lives in the resource's
    /// single range, `0` meaning "any port".
    Port {
        name: String,
        env_key: Option<String>,
        /// Port the task was assigned in an earlier launch, if any.
        assigned: Option<u64>,
    },
    /// A persistent volume.
    Volume {
        volume_type: VolumeType,
        container_path: String,
    },
}

/// One desired resource entry, with the entry it replaces for diffing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequirement {
    pub kind: RequirementKind,
    pub resource: Resource,
    pub previous: Option<Resource>,
}

impl ResourceRequirement {
    pub fn scalar(resource: Resource, previous: Option<Resource>) -> Self {
        Self {
            kind: RequirementKind::Scalar,
            resource,
            previous,
        }
    }

    pub fn volume(volume_type: VolumeType, resource: Resource, previous: Option<Resource>) -> Self {
        let container_path = resource.container_path().unwrap_or_default().to_string();
        Self {
            kind: RequirementKind::Volume {
                volume_type,
                container_path,
            },
            resource,
            previous,
        }
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Reservation id of the desired entry; present when the resource was
    /// reserved by an earlier launch.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource.resource_id()
    }

    pub fn persistence_id(&self) -> Option<&str> {
        self.resource.persistence_id()
    }

    /// Scalar amount still to be acquired: desired minus previous, or the
    /// whole desired amount when nothing was held before.
    pub fn delta(&self) -> Option<f64> {
        let desired = self.resource.scalar()?;
        let held = self
            .previous
            .as_ref()
            .and_then(Resource::scalar)
            .unwrap_or(0.0);
        Some(desired - held)
    }

    /// Requested port for port requirements: the fixed port, else the
    /// previously assigned one. `None` means a dynamic port must be found.
    pub fn wanted_port(&self) -> Option<u64> {
        let RequirementKind::Port { assigned, .. } = &self.kind else {
            return None;
        };
        let fixed = self
            .resource
            .ranges()
            .and_then(|r| r.first())
            .map(|r| r.begin)
            .filter(|p| *p != 0);
        fixed.or(*assigned)
    }
}

/// A draft task descriptor together with the resources it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequirement {
    pub task_info: TaskInfo,
    pub resource_requirements: Vec<ResourceRequirement>,
}

impl TaskRequirement {
    pub fn new(task_info: TaskInfo, resource_requirements: Vec<ResourceRequirement>) -> Self {
        Self {
            task_info,
            resource_requirements,
        }
    }

    pub fn name(&self) -> &str {
        &self.task_info.name
    }

    /// Pod type recorded in the task's labels.
    pub fn pod_type(&self) -> Result<String, TaskDataError> {
        LabelReader::new(&self.task_info).pod_type()
    }

    /// Whether this is a footprint placeholder that must not be started.
    pub fn is_transient(&self) -> bool {
        LabelReader::new(&self.task_info).is_transient()
    }
}

/// The executor the pod instance's tasks run under.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorRequirement {
    pub executor_info: ExecutorInfo,
}

impl ExecutorRequirement {
    pub fn new(executor_info: ExecutorInfo) -> Self {
        Self { executor_info }
    }

    /// An executor that has never been launched has no id yet.
    pub fn is_new(&self) -> bool {
        self.executor_info.executor_id.is_empty()
    }
}

/// Everything one pod instance needs from a single offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRequirement {
    pub pod_type: String,
    pub index: u32,
    pub task_requirements: Vec<TaskRequirement>,
    pub executor_requirement: Option<ExecutorRequirement>,
    pub placement: Option<PlacementRule>,
}

impl OfferRequirement {
    /// Build a requirement, checking that every task agrees on its pod type.
    pub fn new(
        index: u32,
        task_requirements: Vec<TaskRequirement>,
        executor_requirement: Option<ExecutorRequirement>,
        placement: Option<PlacementRule>,
    ) -> OfferResult<Self> {
        let mut pod_type: Option<String> = None;
        for task in &task_requirements {
            let task_type = task.pod_type().map_err(|e| {
                OfferError::InvalidRequirement(format!("failed to read pod type: {e}"))
            })?;
            match &pod_type {
                None => pod_type = Some(task_type),
                Some(expected) if *expected != task_type => {
                    return Err(OfferError::InvalidRequirement(format!(
                        "task {} has pod type {task_type}, expected {expected}",
                        task.name()
                    )));
                }
                Some(_) => {}
            }
        }

        let Some(pod_type) = pod_type else {
            return Err(OfferError::InvalidRequirement(
                "no task requirements".to_string(),
            ));
        };

        debug!(
            %pod_type,
            index,
            tasks = task_requirements.len(),
            "offer requirement built"
        );

        Ok(Self {
            pod_type,
            index,
            task_requirements,
            executor_requirement,
            placement,
        })
    }

    /// Task requirements that will actually be started.
    pub fn launched_tasks(&self) -> impl Iterator<Item = &TaskRequirement> {
        self.task_requirements.iter().filter(|t| !t.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::taskdata::LabelWriter;
    use keel_core::{CommandInfo, Range};

    fn task(name: &str, pod_type: &str) -> TaskRequirement {
        let mut info = TaskInfo::draft(name);
        info.labels = LabelWriter::new().set_type(pod_type).set_index(0).to_proto();
        TaskRequirement::new(info, Vec::new())
    }

    fn port_requirement(port: u64, assigned: Option<u64>) -> ResourceRequirement {
        ResourceRequirement {
            kind: RequirementKind::Port {
                name: "http".to_string(),
                env_key: None,
                assigned,
            },
            resource: Resource::unreserved_ranges("ports", vec![Range::single(port)]),
            previous: None,
        }
    }

    #[test]
    fn delta_against_previous() {
        let req = ResourceRequirement::scalar(
            Resource::unreserved_scalar("cpus", 1.0),
            Some(Resource::unreserved_scalar("cpus", 0.5)),
        );
        assert_eq!(req.delta(), Some(0.5));

        let fresh = ResourceRequirement::scalar(Resource::unreserved_scalar("mem", 256.0), None);
        assert_eq!(fresh.delta(), Some(256.0));
    }

    #[test]
    fn wanted_port_prefers_fixed_port() {
        assert_eq!(port_requirement(8080, Some(9000)).wanted_port(), Some(8080));
        assert_eq!(port_requirement(0, Some(9000)).wanted_port(), Some(9000));
        assert_eq!(port_requirement(0, None).wanted_port(), None);
    }

    #[test]
    fn offer_requirement_takes_pod_type_from_tasks() {
        let req = OfferRequirement::new(
            0,
            vec![task("node-0-a", "node"), task("node-0-b", "node")],
            None,
            None,
        )
        .unwrap();
        assert_eq!(req.pod_type, "node");
        assert_eq!(req.launched_tasks().count(), 2);
    }

    #[test]
    fn mismatched_pod_types_are_invalid() {
        let err = OfferRequirement::new(
            0,
            vec![task("node-0-a", "node"), task("web-0-b", "web")],
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, OfferError::InvalidRequirement(_)));
    }

    #[test]
    fn empty_requirement_is_invalid() {
        let err = OfferRequirement::new(0, Vec::new(), None, None).unwrap_err();
        assert_eq!(
            err,
            OfferError::InvalidRequirement("no task requirements".to_string())
        );
    }

    #[test]
    fn undecodable_pod_type_is_invalid() {
        let unlabelled = TaskRequirement::new(TaskInfo::draft("node-0-a"), Vec::new());
        let err = OfferRequirement::new(0, vec![unlabelled], None, None).unwrap_err();
        assert!(matches!(err, OfferError::InvalidRequirement(msg) if msg.contains("task_type")));
    }

    #[test]
    fn executor_without_id_is_new() {
        let exec = ExecutorInfo {
            name: "node".to_string(),
            executor_id: String::new(),
            command: CommandInfo::default(),
            container: None,
        };
        assert!(ExecutorRequirement::new(exec).is_new());
    }
}
