//! keel-offer: matching offer requirements against cluster offers.
//!
//! An [`OfferRequirement`] describes what one pod instance needs. For each
//! candidate offer a fresh [`ResourcePool`] and [`PodInfoBuilder`] are
//! created and threaded through a pipeline of evaluation stages; the
//! resulting [`EvaluationOutcome`] tree says whether the offer fits and
//! which operations the outer loop should issue.
//!
//! # Components
//!
//! - **`requirement`**: task, executor and offer requirements
//! - **`pool`**: per-attempt view of one offer's unclaimed resources
//! - **`builder`**: task and executor drafts mutated by stages
//! - **`stage`**: evaluation stages and the composite stage
//! - **`recommendation`**: reserve/unreserve/create/launch operations
//! - **`outcome`**: pass/fail trees for diagnostics
//! - **`evaluator`**: pipeline construction and the first-fit offer loop

pub mod builder;
pub mod error;
pub mod evaluator;
pub mod outcome;
pub mod placement;
pub mod pool;
pub mod recommendation;
pub mod requirement;
pub mod stage;

pub use builder::PodInfoBuilder;
pub use error::{OfferError, OfferResult};
pub use evaluator::{EvaluationReport, OfferEvaluator};
pub use outcome::EvaluationOutcome;
pub use pool::ResourcePool;
pub use recommendation::{Operation, Recommendation, coalesce_recommendations};
pub use requirement::{
    ExecutorRequirement, OfferRequirement, RequirementKind, ResourceRequirement, TaskRequirement,
};
pub use stage::{EvaluationStage, MultiEvaluationStage};
