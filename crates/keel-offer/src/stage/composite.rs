use tracing::debug;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;
use crate::recommendation::coalesce_recommendations;

pub const ALL_PASSED_REASON: &str = "All child stages passed";
pub const SOME_FAILED_REASON: &str = "Failed to pass all child stages";

/// Runs child stages in order against the same pool and draft.
///
/// There is no backtracking: claims made by a child stay made even when a
/// later child fails. Passes iff every child passes. Children keep their
/// own verdicts and reasons; their recommendations move up to this
/// outcome, with port reservations coalesced.
#[derive(Debug)]
pub struct MultiEvaluationStage {
    name: String,
    stages: Vec<Box<dyn EvaluationStage>>,
}

impl MultiEvaluationStage {
    pub fn new(name: impl Into<String>, stages: Vec<Box<dyn EvaluationStage>>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    pub fn stages(&self) -> &[Box<dyn EvaluationStage>] {
        &self.stages
    }
}

impl EvaluationStage for MultiEvaluationStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let mut passing = true;
        let mut children = Vec::with_capacity(self.stages.len());
        let mut recommendations = Vec::new();

        for stage in &self.stages {
            let mut child = stage.evaluate(pool, builder);
            debug!(
                stage = stage.name(),
                passing = child.passing,
                reason = %child.reason,
                "stage evaluated"
            );
            passing &= child.passing;
            recommendations.append(&mut child.recommendations);
            children.push(child);
        }

        let outcome = if passing {
            EvaluationOutcome::pass(&self.name, ALL_PASSED_REASON)
        } else {
            EvaluationOutcome::fail(&self.name, SOME_FAILED_REASON)
        };
        outcome
            .with_children(children)
            .with_recommendations(coalesce_recommendations(recommendations))
    }
}
