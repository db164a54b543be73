use keel_core::{Resource, Value};
use tracing::debug;
use uuid::Uuid;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::{EPSILON, ResourcePool};
use crate::recommendation::Recommendation;
use crate::requirement::ResourceRequirement;

const NAME: &str = "ResourceStage";

/// Acquires one scalar resource (CPU, memory, ...) for a task.
///
/// A resource reserved by an earlier launch is claimed by reservation id
/// and only the difference to the desired amount is reserved or released.
/// A new resource is reserved in full under a fresh id.
#[derive(Debug, Clone)]
pub struct ResourceStage {
    requirement: ResourceRequirement,
    task_name: String,
}

impl ResourceStage {
    pub fn new(requirement: ResourceRequirement, task_name: &str) -> Self {
        Self {
            requirement,
            task_name: task_name.to_string(),
        }
    }
}

fn with_amount(resource: &Resource, amount: f64) -> Resource {
    let mut resized = resource.clone();
    resized.value = Value::scalar(amount);
    resized
}

impl EvaluationStage for ResourceStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let name = self.requirement.name();
        let Some(desired) = self.requirement.resource.scalar() else {
            return EvaluationOutcome::fail(NAME, format!("resource {name} is not a scalar"));
        };
        let offer_id = pool.offer_id().to_string();
        let mut recommendations = Vec::new();

        let (resource, reason) = match self.requirement.resource_id() {
            Some(id) => {
                let Some(reserved) = pool.consume_reserved(id) else {
                    return EvaluationOutcome::fail(
                        NAME,
                        format!("reservation {id} of {name} for {} not in offer", self.task_name),
                    );
                };
                let delta = desired - reserved.scalar().unwrap_or(0.0);
                if delta > EPSILON {
                    if !pool.consume_unreserved_scalar(name, delta) {
                        return EvaluationOutcome::fail(
                            NAME,
                            format!(
                                "insufficient {name} to grow reservation {id} by {delta}: {} available",
                                pool.unreserved_scalar(name)
                            ),
                        );
                    }
                    recommendations.push(Recommendation::reserve(
                        &offer_id,
                        with_amount(&self.requirement.resource, delta),
                    ));
                } else if delta < -EPSILON {
                    recommendations.push(Recommendation::unreserve(
                        &offer_id,
                        with_amount(&reserved, -delta),
                    ));
                }
                debug!(task = %self.task_name, %name, id, delta, "existing reservation claimed");
                (
                    self.requirement.resource.clone(),
                    format!("claimed reservation {id} of {name}, adjusted by {delta}"),
                )
            }
            None => {
                if !pool.consume_unreserved_scalar(name, desired) {
                    return EvaluationOutcome::fail(
                        NAME,
                        format!(
                            "insufficient {name} for {}: need {desired}, {} available",
                            self.task_name,
                            pool.unreserved_scalar(name)
                        ),
                    );
                }
                let mut resource = self.requirement.resource.clone();
                let id = Uuid::new_v4().to_string();
                if let Some(reservation) = resource.reservation.as_mut() {
                    reservation.resource_id = Some(id.clone());
                }
                recommendations.push(Recommendation::reserve(&offer_id, resource.clone()));
                debug!(task = %self.task_name, %name, %id, desired, "new reservation");
                (resource, format!("reserved {desired} {name} as {id}"))
            }
        };

        builder.set_resource(&self.task_name, resource);
        EvaluationOutcome::pass(NAME, reason).with_recommendations(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Operation;
    use crate::stage::test_support::{TASK, attempt, offer};
    use keel_core::ReservationInfo;

    fn reserved_cpus(amount: f64, id: Option<&str>) -> Resource {
        let mut cpus = Resource::unreserved_scalar("cpus", amount);
        cpus.role = "svc-role".to_string();
        cpus.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: id.map(str::to_string),
        });
        cpus
    }

    #[test]
    fn new_resource_is_reserved_with_fresh_id() {
        let offer = offer(vec![Resource::unreserved_scalar("cpus", 2.0)]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(
            ResourceRequirement::scalar(reserved_cpus(1.5, None), None),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        let Operation::Reserve { resource } = &outcome.recommendations[0].operation else {
            panic!("expected reserve");
        };
        assert_eq!(resource.scalar(), Some(1.5));
        assert!(resource.resource_id().is_some());
        assert!((pool.unreserved_scalar("cpus") - 0.5).abs() < EPSILON);

        let task = builder.task(TASK).unwrap();
        assert_eq!(task.resources[0].resource_id(), resource.resource_id());
    }

    #[test]
    fn insufficient_capacity_fails() {
        let offer = offer(vec![Resource::unreserved_scalar("cpus", 0.5)]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(ResourceRequirement::scalar(reserved_cpus(1.0, None), None), TASK);

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(!outcome.passing);
        assert!(outcome.recommendations.is_empty());
        assert!(outcome.reason.contains("insufficient cpus"), "{}", outcome.reason);
    }

    #[test]
    fn growing_a_reservation_reserves_the_delta() {
        let offer = offer(vec![
            reserved_cpus(0.5, Some("cpu-id")),
            Resource::unreserved_scalar("cpus", 4.0),
        ]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(
            ResourceRequirement::scalar(
                reserved_cpus(1.0, Some("cpu-id")),
                Some(reserved_cpus(0.5, Some("cpu-id"))),
            ),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        assert_eq!(outcome.recommendations.len(), 1);
        let Operation::Reserve { resource } = &outcome.recommendations[0].operation else {
            panic!("expected reserve");
        };
        assert_eq!(resource.scalar(), Some(0.5));
        assert_eq!(resource.resource_id(), Some("cpu-id"));
    }

    #[test]
    fn shrinking_a_reservation_unreserves_the_difference() {
        let offer = offer(vec![reserved_cpus(2.0, Some("cpu-id"))]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(
            ResourceRequirement::scalar(reserved_cpus(0.5, Some("cpu-id")), None),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);

        assert!(outcome.passing);
        let Operation::Unreserve { resource } = &outcome.recommendations[0].operation else {
            panic!("expected unreserve");
        };
        assert_eq!(resource.scalar(), Some(1.5));
    }

    #[test]
    fn unchanged_reservation_needs_no_operation() {
        let offer = offer(vec![reserved_cpus(1.0, Some("cpu-id"))]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(
            ResourceRequirement::scalar(reserved_cpus(1.0, Some("cpu-id")), None),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);
        assert!(outcome.passing);
        assert!(outcome.recommendations.is_empty());
    }

    #[test]
    fn missing_reservation_fails() {
        let offer = offer(vec![Resource::unreserved_scalar("cpus", 8.0)]);
        let (mut pool, mut builder) = attempt(&offer);
        let stage = ResourceStage::new(
            ResourceRequirement::scalar(reserved_cpus(1.0, Some("cpu-id")), None),
            TASK,
        );

        let outcome = stage.evaluate(&mut pool, &mut builder);
        assert!(!outcome.passing);
        assert!(outcome.reason.contains("cpu-id"));
    }
}
