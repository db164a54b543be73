use keel_core::{DISK_RESOURCE, DiskInfo, Resource, VolumeType};
use tracing::{debug, info};
use uuid::Uuid;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;
use crate::recommendation::Recommendation;
use crate::requirement::{RequirementKind, ResourceRequirement};

const NAME: &str = "VolumeStage";

/// Acquires one persistent volume for a task.
///
/// A volume created by an earlier launch must be offered back as-is; its
/// size is never changed. A new root volume is carved from unreserved disk,
/// a new mount volume takes a whole mount disk.
#[derive(Debug, Clone)]
pub struct VolumeStage {
    requirement: ResourceRequirement,
    task_name: String,
}

impl VolumeStage {
    pub fn new(requirement: ResourceRequirement, task_name: &str) -> Self {
        Self {
            requirement,
            task_name: task_name.to_string(),
        }
    }

    fn existing(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder, id: &str) -> EvaluationOutcome {
        if pool.consume_volume(id).is_none() {
            return EvaluationOutcome::fail(
                NAME,
                format!("persistent volume {id} of {} not in offer", self.task_name),
            );
        }
        builder.set_resource(&self.task_name, self.requirement.resource.clone());
        debug!(task = %self.task_name, volume = id, "existing volume claimed");
        EvaluationOutcome::pass(NAME, format!("found persistent volume {id}"))
    }

    fn create(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        volume_type: VolumeType,
        container_path: &str,
    ) -> EvaluationOutcome {
        let size = self.requirement.resource.scalar().unwrap_or(0.0);
        let mut volume = self.requirement.resource.clone();

        match volume_type {
            VolumeType::Root => {
                if !pool.consume_unreserved_scalar(DISK_RESOURCE, size) {
                    return EvaluationOutcome::fail(
                        NAME,
                        format!(
                            "insufficient disk for volume {container_path}: need {size}, {} available",
                            pool.unreserved_scalar(DISK_RESOURCE)
                        ),
                    );
                }
            }
            VolumeType::Mount => {
                let Some(disk) = pool.consume_mount_disk(size) else {
                    return EvaluationOutcome::fail(
                        NAME,
                        format!("no mount disk of at least {size} for volume {container_path}"),
                    );
                };
                volume.value = disk.value.clone();
                let source = disk.disk.and_then(|d| d.source);
                volume.disk.get_or_insert_with(DiskInfo::default).source = source;
            }
        }

        if let Some(reservation) = volume.reservation.as_mut() {
            reservation.resource_id = Some(Uuid::new_v4().to_string());
        }
        let persistence_id = Uuid::new_v4().to_string();
        volume.disk.get_or_insert_with(DiskInfo::default).persistence_id = Some(persistence_id.clone());

        // The reservation covers the raw disk; the volume is created on it.
        let reservation = Resource {
            disk: volume.disk.as_ref().and_then(|d| d.source.clone()).map(|source| DiskInfo {
                source: Some(source),
                ..DiskInfo::default()
            }),
            ..volume.clone()
        };
        let offer_id = pool.offer_id().to_string();
        let recommendations = vec![
            Recommendation::reserve(&offer_id, reservation),
            Recommendation::create(&offer_id, volume.clone()),
        ];

        builder.set_resource(&self.task_name, volume);
        info!(
            task = %self.task_name,
            path = container_path,
            %persistence_id,
            ?volume_type,
            "new persistent volume"
        );
        EvaluationOutcome::pass(NAME, format!("creating volume {persistence_id} at {container_path}"))
            .with_recommendations(recommendations)
    }
}

impl EvaluationStage for VolumeStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let RequirementKind::Volume {
            volume_type,
            container_path,
        } = &self.requirement.kind
        else {
            return EvaluationOutcome::fail(NAME, "not a volume requirement");
        };

        match self.requirement.persistence_id() {
            Some(id) => self.existing(pool, builder, id),
            None => self.create(pool, builder, *volume_type, container_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Operation;
    use crate::stage::test_support::{TASK, attempt, offer};
    use keel_core::resources::desired_volume;
    use keel_core::{DiskSource, ReservationInfo, VolumeSpec};

    fn spec(volume_type: VolumeType, size: f64) -> VolumeSpec {
        VolumeSpec {
            volume_type,
            container_path: "data".to_string(),
            size,
            role: "svc-role".to_string(),
            principal: "svc".to_string(),
        }
    }

    fn requirement(volume_type: VolumeType, resource: Resource) -> ResourceRequirement {
        ResourceRequirement::volume(volume_type, resource, None)
    }

    #[test]
    fn new_root_volume_reserves_and_creates() {
        let offer = offer(vec![Resource::unreserved_scalar("disk", 5000.0)]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = VolumeStage::new(
            requirement(VolumeType::Root, desired_volume(&spec(VolumeType::Root, 1024.0))),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        assert_eq!(outcome.recommendations.len(), 2);
        let Operation::Reserve { resource: reserved } = &outcome.recommendations[0].operation else {
            panic!("expected reserve");
        };
        assert!(reserved.disk.is_none());
        let Operation::Create { resource: created } = &outcome.recommendations[1].operation else {
            panic!("expected create");
        };
        assert!(created.persistence_id().is_some());
        assert_eq!(created.resource_id(), reserved.resource_id());
        assert_eq!(pool.unreserved_scalar("disk"), 5000.0 - 1024.0);

        let task = builder.task(TASK).unwrap();
        assert_eq!(task.resources[0].persistence_id(), created.persistence_id());
    }

    #[test]
    fn new_mount_volume_takes_whole_disk() {
        let mut mount = Resource::unreserved_scalar("disk", 100_000.0);
        mount.disk = Some(DiskInfo {
            source: Some(DiskSource::Mount {
                root: "/mnt/disk1".to_string(),
            }),
            ..DiskInfo::default()
        });
        let offer = offer(vec![mount]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = VolumeStage::new(
            requirement(VolumeType::Mount, desired_volume(&spec(VolumeType::Mount, 2048.0))),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        let Operation::Create { resource } = &outcome.recommendations[1].operation else {
            panic!("expected create");
        };
        assert_eq!(resource.scalar(), Some(100_000.0));
        assert_eq!(
            resource.disk.as_ref().unwrap().source,
            Some(DiskSource::Mount {
                root: "/mnt/disk1".to_string()
            })
        );
    }

    #[test]
    fn existing_volume_must_be_offered() {
        let mut volume = desired_volume(&spec(VolumeType::Root, 1024.0));
        volume.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: Some("disk-id".to_string()),
        });
        volume.disk.as_mut().unwrap().persistence_id = Some("vol-1".to_string());

        let stage = VolumeStage::new(requirement(VolumeType::Root, volume.clone()), TASK);

        let (mut pool, mut builder) = attempt(&offer(vec![volume.clone()]));
        let outcome = stage.evaluate(&mut pool, &mut builder);
        assert!(outcome.passing, "{outcome}");
        assert!(outcome.recommendations.is_empty());
        assert_eq!(builder.task(TASK).unwrap().resources, vec![volume]);

        let (mut pool, mut builder) = attempt(&offer(vec![Resource::unreserved_scalar("disk", 1e6)]));
        let outcome = stage.evaluate(&mut pool, &mut builder);
        assert!(!outcome.passing);
        assert!(outcome.reason.contains("vol-1"));
    }

    #[test]
    fn insufficient_root_disk_fails() {
        let (mut pool, mut builder) = attempt(&offer(vec![Resource::unreserved_scalar("disk", 10.0)]));
        let stage = VolumeStage::new(
            requirement(VolumeType::Root, desired_volume(&spec(VolumeType::Root, 1024.0))),
            TASK,
        );
        assert!(!stage.evaluate(&mut pool, &mut builder).passing);
    }
}
