//! Log generator
//!
//! Each tick emits a random number of login records as one OTLP/JSON
//! `LogsData` document.

use crate::exporter::ExportError;
use crate::otlp::{AnyValue, KeyValue, LogRecord, LogsData};
use crate::resource::ResourceInfo;
use cartsim_core::{Timestamp, fake};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::sync::Mutex;
use tracing::debug;

pub const SEVERITY_INFO: u32 = 9;
pub const AUTH_STRATEGY: &str = "OIDC";

pub struct LogGenerator {
    resource: ResourceInfo,
    max_per_tick: u32,
    rng: Mutex<StdRng>,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl LogGenerator {
    pub fn stdout(resource: ResourceInfo, max_per_tick: u32, seed: Option<u64>) -> Self {
        Self::with_writer(resource, max_per_tick, seed, Box::new(std::io::stdout()))
    }

    pub fn with_writer(
        resource: ResourceInfo,
        max_per_tick: u32,
        seed: Option<u64>,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            resource,
            max_per_tick,
            rng: Mutex::new(rng),
            writer: Mutex::new(writer),
        }
    }

    /// Records for one tick: a uniform count in `[0, max_per_tick)`.
    pub fn generate(&self) -> Vec<LogRecord> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = if self.max_per_tick == 0 {
            0
        } else {
            rng.random_range(0..self.max_per_tick)
        };
        (0..count).map(|_| login_record(&mut *rng)).collect()
    }

    /// Generate and write one tick. Returns the number of records written.
    pub fn tick(&self) -> Result<usize, ExportError> {
        let records = self.generate();
        let count = records.len();
        if count == 0 {
            return Ok(0);
        }

        let data = LogsData::from_records(&self.resource, records);
        let rendered = serde_json::to_string(&data)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{rendered}")?;
        writer.flush()?;

        debug!(count, "Emitted log records");
        Ok(count)
    }
}

fn login_record<R: Rng + ?Sized>(rng: &mut R) -> LogRecord {
    let user = fake::user_name(rng);
    let ip = fake::ipv4(rng);
    let now = Timestamp::now().unix_nanos().to_string();

    LogRecord {
        time_unix_nano: now.clone(),
        observed_time_unix_nano: now,
        severity_number: SEVERITY_INFO,
        severity_text: "INFO".to_string(),
        body: AnyValue::string(format!(
            "A user with username: {user} logged in from with IP {ip}"
        )),
        attributes: vec![
            KeyValue::string("enduser.id", user),
            KeyValue::string("cartsim.auth_strategy", AUTH_STRATEGY),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_count_stays_below_max() {
        let generator = LogGenerator::with_writer(
            ResourceInfo::default(),
            10,
            Some(7),
            Box::new(std::io::sink()),
        );
        let mut seen_zero = false;
        for _ in 0..500 {
            let n = generator.generate().len();
            assert!(n < 10);
            seen_zero |= n == 0;
        }
        assert!(seen_zero);
    }

    #[test]
    fn test_record_shape() {
        let generator = LogGenerator::with_writer(
            ResourceInfo::default(),
            2,
            Some(1),
            Box::new(std::io::sink()),
        );
        let record = std::iter::repeat_with(|| generator.generate())
            .flatten()
            .next()
            .unwrap();

        assert_eq!(record.severity_number, 9);
        assert_eq!(record.severity_text, "INFO");
        let user = record.get_attribute("enduser.id").and_then(AnyValue::as_str).unwrap();
        let body = record.body.as_str().unwrap();
        assert!(body.starts_with(&format!("A user with username: {user} logged in from with IP ")));
        assert_eq!(
            record.get_attribute("cartsim.auth_strategy").and_then(AnyValue::as_str),
            Some("OIDC")
        );
        assert_eq!(record.time_unix_nano, record.observed_time_unix_nano);
    }

    #[test]
    fn test_tick_writes_logs_document() {
        let buffer = SharedBuffer::default();
        let generator = LogGenerator::with_writer(
            ResourceInfo::default(),
            10,
            Some(3),
            Box::new(buffer.clone()),
        );

        let written: usize = (0..20).map(|_| generator.tick().unwrap()).sum();
        assert!(written > 0);

        let contents = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let records: usize = contents
            .lines()
            .map(|line| {
                let data: LogsData = serde_json::from_str(line).unwrap();
                assert_eq!(data.resource_logs[0].scope_logs[0].scope.name, "cartsim-logs");
                data.resource_logs[0].scope_logs[0].log_records.len()
            })
            .sum();
        assert_eq!(records, written);
    }
}
