use tracing::{debug, info};
use uuid::Uuid;

use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;

const NAME: &str = "ExecutorStage";

/// Binds the pod's executor to the offer.
///
/// A reused executor must already be running on the offered agent. A new
/// executor gets its id here, so every attempt produces a distinct one.
#[derive(Debug, Clone, Default)]
pub struct ExecutorStage;

impl ExecutorStage {
    pub fn new() -> Self {
        Self
    }
}

impl EvaluationStage for ExecutorStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let Some(executor) = builder.executor_mut() else {
            return EvaluationOutcome::pass(NAME, "no executor required");
        };

        if executor.executor_id.is_empty() {
            executor.executor_id = format!("{}__{}", executor.name, Uuid::new_v4());
            debug!(executor_id = %executor.executor_id, "assigned new executor id");
            return EvaluationOutcome::pass(
                NAME,
                format!("new executor {}", executor.executor_id),
            );
        }

        let offer = pool.offer();
        if offer.executor_ids.iter().any(|id| *id == executor.executor_id) {
            info!(executor_id = %executor.executor_id, agent = %offer.agent_id, "reusing running executor");
            EvaluationOutcome::pass(
                NAME,
                format!("executor {} is running on agent {}", executor.executor_id, offer.agent_id),
            )
        } else {
            EvaluationOutcome::fail(
                NAME,
                format!(
                    "executor {} is not running on agent {}",
                    executor.executor_id, offer.agent_id
                ),
            )
        }
    }
}
