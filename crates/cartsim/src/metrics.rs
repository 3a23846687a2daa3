//! Metrics generator
//!
//! Three shop metrics on a dedicated prometheus registry, served as text
//! exposition by axum:
//!
//! - `redis_number_of_save_cards`: counter, +10 per tick
//! - `amazon_sqs_number_of_emails_to_send`: up/down gauge, +20 or -10 per tick
//! - `mysql_order_inserts`: gauge sampled at scrape time

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const SAVE_CARDS: &str = "redis_number_of_save_cards";
pub const EMAILS_TO_SEND: &str = "amazon_sqs_number_of_emails_to_send";
pub const ORDER_INSERTS: &str = "mysql_order_inserts";

const REDIS_LABELS: [&str; 4] = [
    "cartsim_pid",
    "cartsim_environment",
    "db_redis_database_index",
    "db_system",
];
const SQS_LABELS: [&str; 5] = [
    "cartsim_pid",
    "cartsim_environment",
    "messaging_system",
    "messaging_destination",
    "messaging_protocol",
];
const MYSQL_LABELS: [&str; 3] = ["db_system", "db_sql_table", "cartsim_runtime"];

const ENVIRONMENT: &str = "staging";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("exposition is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("metrics server failed: {0}")]
    Serve(#[source] std::io::Error),
}

pub struct ShopMetrics {
    registry: Registry,
    save_cards: IntCounterVec,
    emails_to_send: IntGaugeVec,
    order_inserts: IntGaugeVec,
    pid: String,
    rng: Mutex<StdRng>,
}

impl ShopMetrics {
    pub fn new(seed: Option<u64>) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let save_cards = IntCounterVec::new(
            Opts::new(SAVE_CARDS, "Number of Saved Cards to Redis"),
            &REDIS_LABELS,
        )?;
        let emails_to_send = IntGaugeVec::new(
            Opts::new(EMAILS_TO_SEND, "Number of Emails for SQS Queue to Process"),
            &SQS_LABELS,
        )?;
        let order_inserts = IntGaugeVec::new(
            Opts::new(ORDER_INSERTS, "MySQL order inserts observed at scrape time"),
            &MYSQL_LABELS,
        )?;

        registry.register(Box::new(save_cards.clone()))?;
        registry.register(Box::new(emails_to_send.clone()))?;
        registry.register(Box::new(order_inserts.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            registry,
            save_cards,
            emails_to_send,
            order_inserts,
            pid: std::process::id().to_string(),
            rng: Mutex::new(rng),
        })
    }

    /// Advance the synchronous instruments by one tick.
    pub fn record_tick(&self) {
        self.save_cards
            .with_label_values(&[self.pid.as_str(), ENVIRONMENT, "0", "redis"])
            .inc_by(10);

        let delta = if self.rng().random_bool(0.5) { 20 } else { -10 };
        self.emails_to_send
            .with_label_values(&[
                self.pid.as_str(),
                ENVIRONMENT,
                "AmazonSQS",
                "emailsToSend",
                "MQTT",
            ])
            .add(delta);
    }

    /// Observe the scrape-time gauge, then encode the registry.
    pub fn render(&self) -> Result<String, MetricsError> {
        let inserts = self.rng().random_range(0..10);
        self.order_inserts
            .with_label_values(&["MYSQL", "orders", "AWS RDS"])
            .set(inserts);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn metrics_handler(State(metrics): State<Arc<ShopMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            error!(error = %err, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub fn router(metrics: Arc<ShopMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(metrics)
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    metrics: Arc<ShopMetrics>,
    cancel: CancellationToken,
) -> Result<(), MetricsError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics endpoint listening");
    }
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(MetricsError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(exposition: &str, name: &str) -> i64 {
        exposition
            .lines()
            .find(|line| line.starts_with(name) && line.contains('{'))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
            .unwrap()
    }

    #[test]
    fn test_exposition_contains_shop_metrics() {
        let metrics = ShopMetrics::new(Some(1)).unwrap();
        metrics.record_tick();
        let text = metrics.render().unwrap();

        assert!(text.contains(SAVE_CARDS));
        assert!(text.contains(EMAILS_TO_SEND));
        assert!(text.contains(ORDER_INSERTS));
        assert!(text.contains("db_system=\"redis\""));
        assert!(text.contains("messaging_destination=\"emailsToSend\""));
        assert!(text.contains("cartsim_runtime=\"AWS RDS\""));
    }

    #[test]
    fn test_tick_arithmetic() {
        let metrics = ShopMetrics::new(Some(42)).unwrap();
        for _ in 0..25 {
            metrics.record_tick();
        }
        let text = metrics.render().unwrap();

        assert_eq!(sample(&text, SAVE_CARDS), 250);

        // Every tick moves the gauge by +20 or -10
        let emails = sample(&text, EMAILS_TO_SEND);
        assert_eq!((emails + 250) % 30, 0);
        assert!((-250..=500).contains(&emails));

        let inserts = sample(&text, ORDER_INSERTS);
        assert!((0..10).contains(&inserts));
    }

    #[tokio::test]
    async fn test_http_endpoints() {
        let metrics = Arc::new(ShopMetrics::new(Some(5)).unwrap());
        metrics.record_tick();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_on(listener, metrics, cancel.clone()));

        let body = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains(SAVE_CARDS));

        let health = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(health, "OK");

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
