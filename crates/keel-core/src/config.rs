//! keel.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeelConfig {
    pub service: ServiceConfig,
    pub scheduler: SchedulerFlags,
    pub state: Option<StateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

/// Flags the scheduler needs to synthesize executors and task descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerFlags {
    /// Identifier of the specification version tasks are launched against.
    pub target_config_id: Uuid,
    /// Bundled native library fetched into every executor sandbox.
    pub libmesos_uri: String,
    /// Bundled runtime fetched into every executor sandbox.
    pub java_uri: String,
    /// Domain under which the service's artifact API is reachable.
    #[serde(default = "default_api_domain")]
    pub api_domain: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_domain() -> String {
    "marathon.mesos".to_string()
}

fn default_api_port() -> u16 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub data_dir: Option<PathBuf>,
}

impl SchedulerFlags {
    /// Flags with the default artifact API location.
    pub fn new(target_config_id: Uuid, libmesos_uri: &str, java_uri: &str) -> Self {
        Self {
            target_config_id,
            libmesos_uri: libmesos_uri.to_string(),
            java_uri: java_uri.to_string(),
            api_domain: default_api_domain(),
            api_port: default_api_port(),
        }
    }
}

impl KeelConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KeelConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Data directory for the state store, defaulting to `./keel-state`.
    pub fn data_dir(&self) -> PathBuf {
        self.state
            .as_ref()
            .and_then(|s| s.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from("keel-state"))
    }

    /// Scaffold a minimal keel.toml for the given service.
    pub fn scaffold(service_name: &str) -> Self {
        KeelConfig {
            service: ServiceConfig {
                name: service_name.to_string(),
            },
            scheduler: SchedulerFlags::new(
                Uuid::new_v4(),
                "https://downloads.example.com/libmesos-bundle.tar.gz",
                "https://downloads.example.com/jre.tar.gz",
            ),
            state: Some(StateConfig {
                data_dir: Some(PathBuf::from("keel-state")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = KeelConfig::scaffold("kafka");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("name = \"kafka\""));
        assert!(toml_str.contains("target_config_id"));
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[service]
name = "hello"

[scheduler]
target_config_id = "6f1c2f4e-2b1a-4a51-9a51-3c8f0d2f7a10"
libmesos_uri = "https://example.com/libmesos.tar.gz"
java_uri = "https://example.com/jre.tar.gz"
"#;
        let config: KeelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.name, "hello");
        assert_eq!(config.scheduler.api_domain, "marathon.mesos");
        assert_eq!(config.scheduler.api_port, 80);
        assert_eq!(config.data_dir(), PathBuf::from("keel-state"));
    }

    #[test]
    fn test_scaffold_round_trips() {
        let config = KeelConfig::scaffold("hello");
        let parsed: KeelConfig = toml::from_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed.scheduler, config.scheduler);
    }
}
