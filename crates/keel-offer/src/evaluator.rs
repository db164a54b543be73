//! OfferEvaluator: builds the stage pipeline and finds the first fitting offer.

use keel_core::Offer;
use tracing::{debug, info};

use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;
use crate::recommendation::Recommendation;
use crate::requirement::{OfferRequirement, RequirementKind};
use crate::stage::{
    EvaluationStage, ExecutorStage, LaunchStage, MultiEvaluationStage, PlacementStage, PortStage,
    ResourceStage, VolumeStage,
};

/// Result of evaluating one requirement against a batch of offers.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    /// Outcome for the first offer that fit, if any.
    pub accepted: Option<EvaluationOutcome>,
    /// Outcomes of the offers tried before it, in order.
    pub rejected: Vec<EvaluationOutcome>,
}

impl EvaluationReport {
    /// Operations to issue for the accepted offer; empty when nothing fit.
    pub fn recommendations(&self) -> &[Recommendation] {
        self.accepted
            .as_ref()
            .map(|o| o.recommendations.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OfferEvaluator;

impl OfferEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Stage pipeline for a requirement.
    ///
    /// Placement, then the executor, then per task: scalars and volumes in
    /// requirement order, all of its ports as one composite, and its launch.
    pub fn pipeline(&self, requirement: &OfferRequirement) -> MultiEvaluationStage {
        let mut stages: Vec<Box<dyn EvaluationStage>> = Vec::new();

        if let Some(rule) = &requirement.placement {
            stages.push(Box::new(PlacementStage::new(rule.clone())));
        }
        if requirement.executor_requirement.is_some() {
            stages.push(Box::new(ExecutorStage::new()));
        }

        for task in &requirement.task_requirements {
            let name = task.name();
            let mut ports: Vec<Box<dyn EvaluationStage>> = Vec::new();
            for resource in &task.resource_requirements {
                match resource.kind {
                    RequirementKind::Scalar => {
                        stages.push(Box::new(ResourceStage::new(resource.clone(), name)));
                    }
                    RequirementKind::Volume { .. } => {
                        stages.push(Box::new(VolumeStage::new(resource.clone(), name)));
                    }
                    RequirementKind::Port { .. } => {
                        ports.push(Box::new(PortStage::new(resource.clone(), name)));
                    }
                }
            }
            if !ports.is_empty() {
                stages.push(Box::new(MultiEvaluationStage::new(format!("{name} ports"), ports)));
            }
            stages.push(Box::new(LaunchStage::new(name, task.is_transient())));
        }

        MultiEvaluationStage::new(
            format!("{}-{}", requirement.pod_type, requirement.index),
            stages,
        )
    }

    /// Evaluate a requirement against one offer, with a fresh pool and draft.
    pub fn evaluate_offer(&self, requirement: &OfferRequirement, offer: &Offer) -> EvaluationOutcome {
        let pipeline = self.pipeline(requirement);
        let mut pool = ResourcePool::new(offer);
        let mut builder = PodInfoBuilder::new(requirement, offer);
        pipeline.evaluate(&mut pool, &mut builder)
    }

    /// Try offers in order until one fits.
    pub fn evaluate(&self, requirement: &OfferRequirement, offers: &[Offer]) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        for offer in offers {
            let outcome = self.evaluate_offer(requirement, offer);
            if outcome.passing {
                info!(
                    pod = %requirement.pod_type,
                    index = requirement.index,
                    offer = %offer.id,
                    operations = outcome.recommendations.len(),
                    "offer accepted"
                );
                report.accepted = Some(outcome);
                break;
            }
            debug!(offer = %offer.id, failures = outcome.failures().len(), "offer rejected");
            report.rejected.push(outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Operation;
    use crate::requirement::{ResourceRequirement, TaskRequirement};
    use crate::stage::ALL_PASSED_REASON;
    use keel_core::taskdata::LabelWriter;
    use keel_core::{Attribute, PlacementRule, Range, ReservationInfo, Resource, TaskInfo};

    fn reserved(mut resource: Resource) -> Resource {
        resource.role = "svc-role".to_string();
        resource.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: None,
        });
        resource
    }

    fn port(name: &str, value: u64) -> ResourceRequirement {
        ResourceRequirement {
            kind: RequirementKind::Port {
                name: name.to_string(),
                env_key: None,
                assigned: None,
            },
            resource: reserved(Resource::unreserved_ranges("ports", vec![Range::single(value)])),
            previous: None,
        }
    }

    fn task(name: &str, transient: bool, resources: Vec<ResourceRequirement>) -> TaskRequirement {
        let mut info = TaskInfo::draft(name);
        let labels = LabelWriter::new().set_type("web").set_index(0);
        info.labels = if transient { labels.set_transient() } else { labels }.to_proto();
        TaskRequirement::new(info, resources)
    }

    fn requirement(placement: Option<PlacementRule>) -> OfferRequirement {
        let cpus = ResourceRequirement::scalar(reserved(Resource::unreserved_scalar("cpus", 1.0)), None);
        OfferRequirement::new(
            0,
            vec![
                task("web-0-server", false, vec![cpus, port("http", 8080), port("admin", 0)]),
                task(
                    "web-0-sidecar",
                    true,
                    vec![ResourceRequirement::scalar(
                        reserved(Resource::unreserved_scalar("mem", 64.0)),
                        None,
                    )],
                ),
            ],
            None,
            placement,
        )
        .unwrap()
    }

    fn offer(id: &str, cpus: f64, zone: &str) -> Offer {
        Offer {
            id: id.to_string(),
            agent_id: format!("{id}-agent"),
            hostname: format!("{id}-host"),
            resources: vec![
                Resource::unreserved_scalar("cpus", cpus),
                Resource::unreserved_scalar("mem", 1024.0),
                Resource::unreserved_ranges("ports", vec![Range::new(8000, 8100)]),
            ],
            attributes: vec![Attribute {
                name: "zone".to_string(),
                value: zone.to_string(),
            }],
            executor_ids: Vec::new(),
        }
    }

    #[test]
    fn pipeline_shape() {
        let evaluator = OfferEvaluator::new();
        let rule = PlacementRule::Attribute {
            name: "zone".to_string(),
            value: "a".to_string(),
        };
        let pipeline = evaluator.pipeline(&requirement(Some(rule)));

        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "PlacementStage",
                "ResourceStage",
                "web-0-server ports",
                "LaunchStage",
                "ResourceStage",
                "LaunchStage",
            ]
        );
        assert_eq!(pipeline.name(), "web-0");
    }

    #[test]
    fn first_fitting_offer_is_accepted() {
        let evaluator = OfferEvaluator::new();
        let offers = vec![offer("small", 0.5, "a"), offer("big", 4.0, "a"), offer("other", 4.0, "a")];

        let report = evaluator.evaluate(&requirement(None), &offers);

        assert_eq!(report.rejected.len(), 1);
        let accepted = report.accepted.as_ref().unwrap();
        assert_eq!(accepted.reason, ALL_PASSED_REASON);
        assert!(report.recommendations().iter().all(|r| r.offer_id == "big"));

        let port_reserves: Vec<&Resource> = report
            .recommendations()
            .iter()
            .filter_map(|r| match &r.operation {
                Operation::Reserve { resource } if resource.is_ports() => Some(resource),
                _ => None,
            })
            .collect();
        assert_eq!(port_reserves.len(), 1);
        assert_eq!(
            port_reserves[0].ranges().unwrap(),
            &[Range::single(8000), Range::single(8080)]
        );

        let launches: Vec<(String, bool)> = report
            .recommendations()
            .iter()
            .filter_map(|r| match &r.operation {
                Operation::Launch { task, transient } => Some((task.name.clone(), *transient)),
                _ => None,
            })
            .collect();
        assert_eq!(
            launches,
            vec![
                ("web-0-server".to_string(), false),
                ("web-0-sidecar".to_string(), true)
            ]
        );
    }

    #[test]
    fn launched_task_carries_single_ports_entry() {
        let evaluator = OfferEvaluator::new();
        let outcome = evaluator.evaluate_offer(&requirement(None), &offer("big", 4.0, "a"));

        let server = outcome
            .recommendations
            .iter()
            .find_map(|r| match &r.operation {
                Operation::Launch { task, .. } if task.name == "web-0-server" => Some(task),
                _ => None,
            })
            .unwrap();
        let ports: Vec<&Resource> = server.resources.iter().filter(|r| r.is_ports()).collect();
        assert_eq!(ports.len(), 1);
        assert_eq!(
            ports[0].ranges().unwrap(),
            &[Range::single(8000), Range::single(8080)]
        );
        assert_eq!(server.agent_id, "big-agent");
    }

    #[test]
    fn placement_rule_rejects_offers() {
        let evaluator = OfferEvaluator::new();
        let rule = PlacementRule::Attribute {
            name: "zone".to_string(),
            value: "b".to_string(),
        };
        let report = evaluator.evaluate(&requirement(Some(rule)), &[offer("big", 4.0, "a")]);

        assert!(report.accepted.is_none());
        assert!(report.recommendations().is_empty());
        assert_eq!(report.rejected[0].failures()[0].source, "PlacementStage");
    }
}
