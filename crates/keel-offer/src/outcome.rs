//! Evaluation outcomes: pass/fail trees with recommendations.

use std::fmt;

use serde::Serialize;

use crate::recommendation::Recommendation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub passing: bool,
    /// Name of the stage that produced this outcome.
    pub source: String,
    pub reason: String,
    pub children: Vec<EvaluationOutcome>,
    pub recommendations: Vec<Recommendation>,
}

impl EvaluationOutcome {
    pub fn pass(source: &str, reason: impl Into<String>) -> Self {
        Self {
            passing: true,
            source: source.to_string(),
            reason: reason.into(),
            children: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn fail(source: &str, reason: impl Into<String>) -> Self {
        Self {
            passing: false,
            ..Self::pass(source, reason)
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<Recommendation>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn with_children(mut self, children: Vec<EvaluationOutcome>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first list of failing leaf outcomes.
    pub fn failures(&self) -> Vec<&EvaluationOutcome> {
        if self.passing {
            return Vec::new();
        }
        if self.children.is_empty() {
            return vec![self];
        }
        self.children.iter().flat_map(|c| c.failures()).collect()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let verdict = if self.passing { "PASS" } else { "FAIL" };
        writeln!(
            f,
            "{:indent$}{verdict}({}): {}",
            "",
            self.source,
            self.reason,
            indent = depth * 2
        )?;
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}
