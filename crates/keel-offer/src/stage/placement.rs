use keel_core::PlacementRule;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::placement;
use crate::pool::ResourcePool;

const NAME: &str = "PlacementStage";

/// Rejects offers whose host does not satisfy the pod's placement rule.
#[derive(Debug, Clone)]
pub struct PlacementStage {
    rule: PlacementRule,
}

impl PlacementStage {
    pub fn new(rule: PlacementRule) -> Self {
        Self { rule }
    }
}

impl EvaluationStage for PlacementStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, _builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let offer = pool.offer();
        let rule = placement::describe(&self.rule);
        if placement::matches(&self.rule, offer) {
            EvaluationOutcome::pass(NAME, format!("host {} matches {rule}", offer.hostname))
        } else {
            EvaluationOutcome::fail(NAME, format!("host {} does not match {rule}", offer.hostname))
        }
    }
}
