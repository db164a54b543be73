use keel_core::taskdata::port_env_name;
use keel_core::{Range, Value};
use tracing::debug;
use uuid::Uuid;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;
use crate::recommendation::Recommendation;
use crate::requirement::{RequirementKind, ResourceRequirement};

const NAME: &str = "PortStage";

/// Resolves one named port for a task.
///
/// Fixed ports and ports assigned by an earlier launch are claimed from
/// the service's reserved ranges first, then from unreserved ranges.
/// Dynamic ports take the lowest unreserved value in the offer.
#[derive(Debug, Clone)]
pub struct PortStage {
    requirement: ResourceRequirement,
    task_name: String,
}

impl PortStage {
    pub fn new(requirement: ResourceRequirement, task_name: &str) -> Self {
        Self {
            requirement,
            task_name: task_name.to_string(),
        }
    }
}

impl EvaluationStage for PortStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let RequirementKind::Port {
            name: port_name,
            env_key,
            ..
        } = &self.requirement.kind
        else {
            return EvaluationOutcome::fail(NAME, "not a port requirement");
        };
        let resource_name = self.requirement.name();

        let (port, reserve) = match self.requirement.wanted_port() {
            Some(port) if pool.consume_reserved_value(resource_name, port) => (port, false),
            Some(port) if pool.consume_unreserved_value(resource_name, port) => (port, true),
            Some(port) => {
                return EvaluationOutcome::fail(
                    NAME,
                    format!("port {port} ({port_name}) of {} is not available", self.task_name),
                );
            }
            None => match pool.first_unreserved_value(resource_name) {
                Some(port) if pool.consume_unreserved_value(resource_name, port) => (port, true),
                _ => {
                    return EvaluationOutcome::fail(
                        NAME,
                        format!("no port available for dynamic port {port_name} of {}", self.task_name),
                    );
                }
            },
        };

        let mut recommendations = Vec::new();
        if reserve {
            let mut resource = self.requirement.resource.clone();
            resource.value = Value::ranges(vec![Range::single(port)]);
            if let Some(reservation) = resource.reservation.as_mut() {
                reservation.resource_id = Some(Uuid::new_v4().to_string());
            }
            recommendations.push(Recommendation::reserve(pool.offer_id(), resource));
        }

        let env_name = port_env_name(port_name, env_key.as_deref());
        builder.add_port(&self.task_name, &self.requirement.resource, port, &env_name);
        debug!(task = %self.task_name, port_name = %port_name, port, reserve, "port resolved");

        let verb = if reserve { "reserved" } else { "claimed reserved" };
        EvaluationOutcome::pass(NAME, format!("{verb} port {port} for {port_name} ({env_name})"))
            .with_recommendations(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Operation;
    use crate::stage::test_support::{TASK, attempt, offer};
    use keel_core::taskdata::get_env_var;
    use keel_core::{ReservationInfo, Resource};

    fn port_requirement(port: u64, assigned: Option<u64>) -> ResourceRequirement {
        let mut resource = Resource::unreserved_ranges("ports", vec![Range::single(port)]);
        resource.role = "svc-role".to_string();
        resource.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: None,
        });
        ResourceRequirement {
            kind: RequirementKind::Port {
                name: "http".to_string(),
                env_key: None,
                assigned,
            },
            resource,
            previous: None,
        }
    }

    fn reserved_ports(ranges: Vec<Range>) -> Resource {
        let mut ports = Resource::unreserved_ranges("ports", ranges);
        ports.role = "svc-role".to_string();
        ports.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: None,
        });
        ports
    }

    #[test]
    fn fixed_port_is_reserved_from_unreserved_ranges() {
        let offer = offer(vec![Resource::unreserved_ranges("ports", vec![Range::new(8000, 9000)])]);
        let (mut pool, mut builder) = attempt(&offer);

        let outcome = PortStage::new(port_requirement(8080, None), TASK).evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        let Operation::Reserve { resource } = &outcome.recommendations[0].operation else {
            panic!("expected reserve");
        };
        assert_eq!(resource.ranges().unwrap(), &[Range::single(8080)]);
        let task = builder.build_task(TASK).unwrap();
        assert_eq!(get_env_var(task.command.as_ref().unwrap(), "PORT_HTTP"), Some("8080"));
    }

    #[test]
    fn previously_reserved_port_is_claimed_without_reserving() {
        let offer = offer(vec![reserved_ports(vec![Range::single(31000)])]);
        let (mut pool, mut builder) = attempt(&offer);

        let outcome =
            PortStage::new(port_requirement(0, Some(31000)), TASK).evaluate(&mut pool, &mut builder);

        assert!(outcome.passing, "{outcome}");
        assert!(outcome.recommendations.is_empty());
        let task = builder.build_task(TASK).unwrap();
        assert!(task.resources.iter().any(|r| r.is_ports()));
    }

    #[test]
    fn dynamic_port_takes_lowest_free_value() {
        let offer = offer(vec![Resource::unreserved_ranges("ports", vec![Range::new(31000, 31001)])]);
        let (mut pool, mut builder) = attempt(&offer);

        let first = PortStage::new(port_requirement(0, None), TASK).evaluate(&mut pool, &mut builder);
        let second = PortStage::new(port_requirement(0, None), TASK).evaluate(&mut pool, &mut builder);
        let third = PortStage::new(port_requirement(0, None), TASK).evaluate(&mut pool, &mut builder);

        assert!(first.reason.contains("31000"));
        assert!(second.reason.contains("31001"));
        assert!(!third.passing);
    }

    #[test]
    fn unavailable_fixed_port_fails() {
        let offer = offer(vec![Resource::unreserved_ranges("ports", vec![Range::new(1000, 2000)])]);
        let (mut pool, mut builder) = attempt(&offer);

        let outcome = PortStage::new(port_requirement(8080, None), TASK).evaluate(&mut pool, &mut builder);
        assert!(!outcome.passing);
        assert!(outcome.reason.contains("8080"));
    }
}
