//! Health and readiness check descriptors.
//!
//! Readiness checks have no field of their own on a task descriptor; they
//! travel JSON-encoded in the `readiness_check` label.

use keel_core::taskdata::LabelWriter;
use keel_core::{CommandInfo, Environment, HealthCheck, HealthCheckSpec, ReadinessCheckSpec, TaskInfo};

pub fn health_check(spec: &HealthCheckSpec, environment: Environment) -> HealthCheck {
    HealthCheck {
        delay_seconds: f64::from(spec.delay),
        interval_seconds: f64::from(spec.interval),
        timeout_seconds: f64::from(spec.timeout),
        consecutive_failures: spec.max_consecutive_failures,
        grace_period_seconds: f64::from(spec.grace_period),
        command: command(&spec.command, environment),
    }
}

/// Readiness checks never count failures and have no grace period.
pub fn readiness_check(spec: &ReadinessCheckSpec, environment: Environment) -> HealthCheck {
    HealthCheck {
        delay_seconds: f64::from(spec.delay),
        interval_seconds: f64::from(spec.interval),
        timeout_seconds: f64::from(spec.timeout),
        consecutive_failures: 0,
        grace_period_seconds: 0.0,
        command: command(&spec.command, environment),
    }
}

fn command(value: &str, environment: Environment) -> CommandInfo {
    CommandInfo {
        value: value.to_string(),
        environment,
        ..CommandInfo::default()
    }
}

/// Attach a readiness check to a task through its labels.
pub fn set_readiness_check(task: &mut TaskInfo, check: &HealthCheck) {
    task.labels = LabelWriter::from_task(task)
        .set_readiness_check(check)
        .to_proto();
}
