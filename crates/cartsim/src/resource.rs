//! Resource and instrumentation scope metadata shared by every signal.

use crate::config::GeneratorConfig;
use crate::otlp::{AnyValue, KeyValue};

pub const TRACES_SCOPE: &str = "cartsim-traces";
pub const LOGS_SCOPE: &str = "cartsim-logs";

pub const SDK_NAME: &str = "cartsim";
pub const SDK_LANGUAGE: &str = "rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub service_name: String,
    pub service_version: String,
}

impl ResourceInfo {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(&config.service_name, &config.service_version)
    }

    /// Resource attributes in OTLP form.
    pub fn attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::string("service.name", &self.service_name),
            KeyValue::string("service.version", &self.service_version),
            KeyValue::string("telemetry.sdk.name", SDK_NAME),
            KeyValue::string("telemetry.sdk.language", SDK_LANGUAGE),
            KeyValue::string("telemetry.sdk.version", SDK_VERSION),
        ]
    }

    pub fn get(&self, key: &str) -> Option<AnyValue> {
        self.attributes()
            .into_iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value)
    }
}

impl Default for ResourceInfo {
    fn default() -> Self {
        Self::from_config(&GeneratorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resource() {
        let resource = ResourceInfo::default();
        assert_eq!(resource.service_name, "cartsim");
        assert_eq!(
            resource.get("service.version").and_then(|v| v.as_str().map(String::from)),
            Some("0.0.1".to_string())
        );
        assert_eq!(resource.attributes().len(), 5);
    }
}
