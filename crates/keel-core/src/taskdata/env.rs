//! Environment variable codec.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::proto::{CommandInfo, Environment, Variable};

use super::PORT_NAME_ENV_PREFIX;

static ENV_INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9_]").expect("static regex"));

/// Decode an environment into an alphabetically ordered map.
///
/// When a name appears more than once the last occurrence wins.
pub fn to_map(environment: &Environment) -> BTreeMap<String, String> {
    environment
        .variables
        .iter()
        .map(|v| (v.name.clone(), v.value.clone()))
        .collect()
}

/// Encode a map as an environment, in map order.
pub fn to_proto(map: &BTreeMap<String, String>) -> Environment {
    Environment {
        variables: map
            .iter()
            .map(|(name, value)| Variable {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    }
}

/// Add or replace one variable of a command's environment.
pub fn set_env_var(command: &mut CommandInfo, key: &str, value: &str) {
    let mut map = to_map(&command.environment);
    map.insert(key.to_string(), value.to_string());
    command.environment = to_proto(&map);
}

/// Value of `key` in a command's environment; the last duplicate wins, as
/// in [`to_map`].
pub fn get_env_var<'a>(command: &'a CommandInfo, key: &str) -> Option<&'a str> {
    command
        .environment
        .variables
        .iter()
        .rev()
        .find(|v| v.name == key)
        .map(|v| v.value.as_str())
}

/// Conventional environment variable name: uppercase, with anything other
/// than letters, digits and underscores replaced by `_`.
///
/// `hello.There999!` becomes `HELLO_THERE999_`.
pub fn to_env_name(s: &str) -> String {
    ENV_INVALID_CHARS
        .replace_all(&s.to_uppercase(), "_")
        .into_owned()
}

/// Variable advertising a reserved port: the custom key if given, else
/// `PORT_<name>`, normalized with [`to_env_name`].
pub fn port_env_name(port_name: &str, custom_key: Option<&str>) -> String {
    let draft = match custom_key {
        Some(key) => key.to_string(),
        None => format!("{PORT_NAME_ENV_PREFIX}{port_name}"),
    };
    to_env_name(&draft)
}
