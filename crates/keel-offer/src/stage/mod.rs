//! Evaluation stages.
//!
//! Each stage checks one concern of a requirement against the pool,
//! claims what it needs and records the result in the draft. A
//! [`MultiEvaluationStage`] runs a list of stages as one.

mod composite;
mod executor;
mod launch;
mod placement;
mod port;
mod scalar;
mod volume;

use crate::builder::PodInfoBuilder;
use crate::outcome::EvaluationOutcome;
use crate::pool::ResourcePool;

pub use composite::{ALL_PASSED_REASON, MultiEvaluationStage, SOME_FAILED_REASON};
pub use executor::ExecutorStage;
pub use launch::LaunchStage;
pub use placement::PlacementStage;
pub use port::PortStage;
pub use scalar::ResourceStage;
pub use volume::VolumeStage;

pub trait EvaluationStage {
    fn name(&self) -> &str;

    /// Check this stage's concern against the pool, claiming resources and
    /// annotating the draft on success.
    fn evaluate(&self, pool: &mut ResourcePool, builder: &mut PodInfoBuilder) -> EvaluationOutcome;
}

impl std::fmt::Debug for dyn EvaluationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use keel_core::taskdata::LabelWriter;
    use keel_core::{CommandInfo, Offer, Resource, TaskInfo};

    use crate::builder::PodInfoBuilder;
    use crate::pool::ResourcePool;
    use crate::requirement::{OfferRequirement, TaskRequirement};

    pub const TASK: &str = "node-0-server";

    pub fn offer(resources: Vec<Resource>) -> Offer {
        Offer {
            id: "offer-1".to_string(),
            agent_id: "agent-1".to_string(),
            hostname: "host-1".to_string(),
            resources,
            attributes: Vec::new(),
            executor_ids: Vec::new(),
        }
    }

    pub fn draft_task() -> TaskInfo {
        let mut task = TaskInfo::draft(TASK);
        task.labels = LabelWriter::new().set_type("node").set_index(0).to_proto();
        task.command = Some(CommandInfo {
            value: "./server".to_string(),
            ..CommandInfo::default()
        });
        task
    }

    /// Pool and draft for a one-task requirement against `offer`.
    pub fn attempt(offer: &Offer) -> (ResourcePool, PodInfoBuilder) {
        let requirement =
            OfferRequirement::new(0, vec![TaskRequirement::new(draft_task(), Vec::new())], None, None)
                .unwrap();
        (ResourcePool::new(offer), PodInfoBuilder::new(&requirement, offer))
    }
}
