//! Generator configuration
//!
//! Populated from command-line flags; there is no configuration file.

use crate::exporter::{ConsoleFormat, ExporterKind};
use cartsim_core::DurationModel;
use clap::ValueEnum;
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318/v1/traces";
pub const DEFAULT_ZIPKIN_ENDPOINT: &str = "http://localhost:9411/api/v2/spans";
pub const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:9464";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Logs,
    Metrics,
}

/// HTTP exporter worker settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpExportConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub channel_capacity: usize,
    pub timeout_ms: u64,
}

impl Default for HttpExportConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush_interval_ms: 1000,
            max_retries: 3,
            retry_base_delay_ms: 100,
            channel_capacity: 10_000,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorConfig {
    pub service_name: String,
    pub service_version: String,
    pub signals: Vec<Signal>,
    pub trace_interval_ms: u64,
    /// Stop after this many trace cycles; `None` runs until interrupted.
    pub cycles: Option<u64>,
    pub log_interval_ms: u64,
    /// Each log tick emits a uniform count in `[0, max_logs_per_tick)`.
    pub max_logs_per_tick: u32,
    pub metric_interval_ms: u64,
    pub exporters: Vec<ExporterKind>,
    pub console_format: ConsoleFormat,
    pub otlp_endpoint: String,
    pub zipkin_endpoint: String,
    pub http: HttpExportConfig,
    pub metrics_listen: String,
    pub seed: Option<u64>,
    #[serde(skip)]
    pub duration_model: DurationModel,
    pub log_level: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            service_name: "cartsim".to_string(),
            service_version: "0.0.1".to_string(),
            signals: vec![Signal::Traces, Signal::Logs, Signal::Metrics],
            trace_interval_ms: 5000,
            cycles: None,
            log_interval_ms: 5000,
            max_logs_per_tick: 10,
            metric_interval_ms: 1000,
            exporters: vec![ExporterKind::Console],
            console_format: ConsoleFormat::Json,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            zipkin_endpoint: DEFAULT_ZIPKIN_ENDPOINT.to_string(),
            http: HttpExportConfig::default(),
            metrics_listen: DEFAULT_METRICS_LISTEN.to_string(),
            seed: None,
            duration_model: DurationModel::Uniform,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },
    #[error("no signals enabled")]
    NoSignals,
    #[error("traces enabled without any exporter")]
    NoExporters,
    #[error("invalid endpoint {endpoint}: expected http:// or https:// URL")]
    InvalidEndpoint { endpoint: String },
    #[error("invalid metrics listen address {addr}")]
    InvalidListenAddr { addr: String },
    #[error("invalid duration {input}: expected <n>ms, <n>s, <n>m or <n>h")]
    InvalidDuration { input: String },
    #[error("lognormal sigma must be finite and positive, got {sigma}")]
    InvalidSigma { sigma: f64 },
}

impl GeneratorConfig {
    pub fn enabled(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signals.is_empty() {
            return Err(ConfigError::NoSignals);
        }

        let intervals = [
            ("trace_interval_ms", self.trace_interval_ms, Signal::Traces),
            ("log_interval_ms", self.log_interval_ms, Signal::Logs),
            ("metric_interval_ms", self.metric_interval_ms, Signal::Metrics),
        ];
        for (name, value, signal) in intervals {
            if self.enabled(signal) && value == 0 {
                return Err(ConfigError::ZeroValue { name });
            }
        }

        if self.enabled(Signal::Traces) {
            if self.exporters.is_empty() {
                return Err(ConfigError::NoExporters);
            }
            if self.cycles == Some(0) {
                return Err(ConfigError::ZeroValue { name: "cycles" });
            }
            if self.exporters.contains(&ExporterKind::Otlp) {
                check_endpoint(&self.otlp_endpoint)?;
            }
            if self.exporters.contains(&ExporterKind::Zipkin) {
                check_endpoint(&self.zipkin_endpoint)?;
            }
            if self.exporters.iter().any(|e| e.is_http()) {
                if self.http.batch_size == 0 {
                    return Err(ConfigError::ZeroValue { name: "batch_size" });
                }
                if self.http.channel_capacity == 0 {
                    return Err(ConfigError::ZeroValue {
                        name: "channel_capacity",
                    });
                }
                if self.http.flush_interval_ms == 0 {
                    return Err(ConfigError::ZeroValue {
                        name: "flush_interval_ms",
                    });
                }
            }
        }

        if self.enabled(Signal::Logs) && self.max_logs_per_tick == 0 {
            return Err(ConfigError::ZeroValue {
                name: "max_logs_per_tick",
            });
        }

        if self.enabled(Signal::Metrics) {
            self.metrics_addr()?;
        }

        if let DurationModel::LogNormal { sigma } = self.duration_model {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(ConfigError::InvalidSigma { sigma });
            }
        }

        Ok(())
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics_listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr {
                addr: self.metrics_listen.clone(),
            })
    }
}

fn check_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let valid = ["http://", "https://"]
        .iter()
        .any(|scheme| endpoint.len() > scheme.len() && endpoint.starts_with(scheme));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
        })
    }
}

/// Parse `250ms`, `5s`, `2m`, `1h` or a bare number of seconds into
/// milliseconds.
pub fn parse_duration_ms(input: &str) -> Result<u64, ConfigError> {
    let s = input.trim();
    let invalid = || ConfigError::InvalidDuration {
        input: input.to_string(),
    };

    let (digits, factor) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        (s, 1_000)
    };

    digits
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid())?
        .checked_mul(factor)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GeneratorConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.trace_interval_ms, 5000);
        assert_eq!(config.metrics_addr().unwrap().port(), 9464);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = GeneratorConfig {
            trace_interval_ms: 0,
            ..GeneratorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue {
                name: "trace_interval_ms"
            })
        );

        // Disabled signals are not checked
        let config = GeneratorConfig {
            log_interval_ms: 0,
            signals: vec![Signal::Traces],
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_endpoint_and_listen_checks() {
        let config = GeneratorConfig {
            exporters: vec![ExporterKind::Otlp],
            otlp_endpoint: "localhost:4318".to_string(),
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = GeneratorConfig {
            metrics_listen: "not-an-addr".to_string(),
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr { .. })
        ));
    }

    #[test]
    fn test_empty_signals_and_exporters() {
        let config = GeneratorConfig {
            signals: Vec::new(),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSignals));

        let config = GeneratorConfig {
            exporters: Vec::new(),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoExporters));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("250ms"), Ok(250));
        assert_eq!(parse_duration_ms("5s"), Ok(5_000));
        assert_eq!(parse_duration_ms("2m"), Ok(120_000));
        assert_eq!(parse_duration_ms("1h"), Ok(3_600_000));
        assert_eq!(parse_duration_ms("30"), Ok(30_000));
        assert!(parse_duration_ms("fast").is_err());
        assert!(parse_duration_ms("-1s").is_err());
    }
}
