//! cartsim - synthetic shopping-cart telemetry generator
//!
//! Wires the [`cartsim_core`] trace engine to real outputs and adds the two
//! other signals of the demo shop:
//!
//! - **traces**: one "Shopping Cart" cycle per interval, exported to the
//!   console, an OTLP/HTTP collector or Zipkin
//! - **logs**: random login records as OTLP/JSON on stdout
//! - **metrics**: prometheus exposition on `/metrics`
//!
//! [`scheduler::Scheduler`] drives all three on independent intervals.

pub mod config;
pub mod exporter;
pub mod logs;
pub mod metrics;
pub mod otlp;
pub mod resource;
pub mod scheduler;
pub mod telemetry;

pub use config::{ConfigError, GeneratorConfig, HttpExportConfig, Signal};
pub use exporter::{
    ConsoleExporter, ConsoleFormat, ExportError, ExporterKind, Exporters, HttpExporter,
};
pub use logs::LogGenerator;
pub use metrics::{MetricsError, ShopMetrics};
pub use resource::ResourceInfo;
pub use scheduler::{RunSummary, Scheduler};
pub use telemetry::init_tracing;
