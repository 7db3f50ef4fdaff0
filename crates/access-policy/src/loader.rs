use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_yml::Value;

use crate::schema::{keys, PolicyConfig};

/// Load a [`PolicyConfig`] from a YAML file on disk.
///
/// Validates the config after deserialization. Patterns are compiled later,
/// by [`PolicyEngine::new`](crate::PolicyEngine::new).
pub fn load_policy(path: impl AsRef<Path>) -> Result<PolicyConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file: {}", path.display()))?;
    load_policy_from_str(&contents)
        .with_context(|| format!("failed to parse policy file: {}", path.display()))
}

/// Parse and validate a [`PolicyConfig`] from a YAML string.
///
/// Two shapes are accepted: the structured policy document, or a flat
/// mapping of `ckan.restricted.*` option keys as they appear in a CKAN ini
/// file.
pub fn load_policy_from_str(yaml: &str) -> Result<PolicyConfig> {
    let value: Value = serde_yml::from_str(yaml).context("YAML deserialization failed")?;

    if is_flat_options(&value) {
        return load_flat_options(&value);
    }

    let config: PolicyConfig =
        serde_yml::from_value(value).context("YAML deserialization failed")?;
    config.validate()?;
    Ok(config)
}

fn is_flat_options(value: &Value) -> bool {
    value.as_mapping().is_some_and(|map| {
        map.keys()
            .filter_map(Value::as_str)
            .any(|k| k.starts_with(keys::PREFIX))
    })
}

fn load_flat_options(value: &Value) -> Result<PolicyConfig> {
    let Some(map) = value.as_mapping() else {
        bail!("expected a mapping of option keys");
    };

    let mut options = Vec::with_capacity(map.len());
    for (key, value) in map {
        let Some(key) = key.as_str() else {
            continue;
        };
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            Value::Sequence(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            _ => bail!("unsupported value for option {key}"),
        };
        options.push((key, value));
    }

    PolicyConfig::from_ckan_options(options).context("invalid ckan.restricted options")
}
