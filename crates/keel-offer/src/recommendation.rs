//! Operations proposed by a passing evaluation, bound to the offer they use.

use keel_core::resources::merge_ranges;
use keel_core::{Resource, TaskInfo};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Reserve { resource: Resource },
    Unreserve { resource: Resource },
    /// Create a persistent volume on a reserved disk.
    Create { resource: Resource },
    Launch { task: TaskInfo, transient: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub offer_id: String,
    #[serde(flatten)]
    pub operation: Operation,
}

impl Recommendation {
    pub fn reserve(offer_id: &str, resource: Resource) -> Self {
        Self::new(offer_id, Operation::Reserve { resource })
    }

    pub fn unreserve(offer_id: &str, resource: Resource) -> Self {
        Self::new(offer_id, Operation::Unreserve { resource })
    }

    pub fn create(offer_id: &str, resource: Resource) -> Self {
        Self::new(offer_id, Operation::Create { resource })
    }

    pub fn launch(offer_id: &str, task: TaskInfo, transient: bool) -> Self {
        Self::new(offer_id, Operation::Launch { task, transient })
    }

    fn new(offer_id: &str, operation: Operation) -> Self {
        Self {
            offer_id: offer_id.to_string(),
            operation,
        }
    }

    fn reserved_ports(&self) -> Option<&Resource> {
        match &self.operation {
            Operation::Reserve { resource } if resource.is_ports() => Some(resource),
            _ => None,
        }
    }
}

/// Merge every ports `Reserve` into one.
///
/// The merged reservation keeps the first one's offer and metadata, holds
/// the union of all reserved ranges, and takes the position of the first.
/// Everything else passes through in order.
pub fn coalesce_recommendations(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut result: Vec<Recommendation> = Vec::with_capacity(recommendations.len());
    let mut ports_at: Option<usize> = None;

    for recommendation in recommendations {
        let Some(extra) = recommendation.reserved_ports() else {
            result.push(recommendation);
            continue;
        };
        match ports_at {
            None => {
                ports_at = Some(result.len());
                result.push(recommendation);
            }
            Some(index) => {
                let Operation::Reserve { resource } = &mut result[index].operation else {
                    continue;
                };
                match merge_ranges(resource, extra) {
                    Ok(merged) => *resource = merged,
                    Err(err) => {
                        warn!(error = %err, "ports reservation not merged");
                        result.push(recommendation);
                    }
                }
            }
        }
    }
    result
}
