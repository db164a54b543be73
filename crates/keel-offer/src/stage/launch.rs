use super::EvaluationStage;
use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;
use crate::recommendation::Recommendation;

const NAME: &str = "LaunchStage";

/// Emits the launch operation for a finished task draft.
#[derive(Debug, Clone)]
pub struct LaunchStage {
    task_name: String,
    transient: bool,
}

impl LaunchStage {
    pub fn new(task_name: &str, transient: bool) -> Self {
        Self {
            task_name: task_name.to_string(),
            transient,
        }
    }
}

impl EvaluationStage for LaunchStage {
    fn name(&self) -> &str {
        NAME
    }

    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome {
        let Some(task) = builder.build_task(&self.task_name) else {
            return EvaluationOutcome::fail(NAME, format!("no draft for task {}", self.task_name));
        };
        let reason = if self.transient {
            format!("footprint of {} (not started)", self.task_name)
        } else {
            format!("launching {}", self.task_name)
        };
        EvaluationOutcome::pass(NAME, reason).with_recommendations(vec![Recommendation::launch(
            pool.offer_id(),
            task,
            self.transient,
        )])
    }
}
