//! Operation Catalog
//!
//! Static table of the simulated backend calls of a checkout request. The
//! canonical catalog is built once per process and never mutated; custom
//! catalogs can be built for tests and benchmarks.

use crate::error::{Result, SimError};
use crate::fake;
use crate::span::{AttributeValue, KeyValue, SpanKind};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Attribute value source, rendered fresh for every span.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Str(&'static str),
    Bool(bool),
    /// A generated end-user name.
    UserName,
}

impl Serialize for TemplateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TemplateValue::Str(s) => serializer.serialize_str(s),
            TemplateValue::Bool(b) => serializer.serialize_bool(*b),
            TemplateValue::UserName => serializer.serialize_str("<user-name>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeTemplate {
    pub key: &'static str,
    pub value: TemplateValue,
}

impl AttributeTemplate {
    pub const fn str(key: &'static str, value: &'static str) -> Self {
        Self {
            key,
            value: TemplateValue::Str(value),
        }
    }

    pub const fn bool(key: &'static str, value: bool) -> Self {
        Self {
            key,
            value: TemplateValue::Bool(value),
        }
    }

    pub const fn user_name(key: &'static str) -> Self {
        Self {
            key,
            value: TemplateValue::UserName,
        }
    }

    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> KeyValue {
        let value = match &self.value {
            TemplateValue::Str(s) => AttributeValue::from(*s),
            TemplateValue::Bool(b) => AttributeValue::Bool(*b),
            TemplateValue::UserName => AttributeValue::String(fake::user_name(rng)),
        };
        KeyValue::new(self.key, value)
    }
}

/// One simulated backend call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDefinition {
    pub id: usize,
    pub name: &'static str,
    pub kind: SpanKind,
    /// Probability of an OK outcome, in `[0, 1]`.
    pub reliability: f64,
    /// Upper bound of the uniform duration draw.
    pub typical_duration_ms: u64,
    pub attributes: Vec<AttributeTemplate>,
}

impl OperationDefinition {
    pub fn render_attributes<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<KeyValue> {
        self.attributes.iter().map(|t| t.render(rng)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    operations: Vec<OperationDefinition>,
}

impl Catalog {
    /// Build a catalog. Operation ids must equal their position; a
    /// misplaced id is reported as `UnknownOperation`.
    pub fn new(operations: Vec<OperationDefinition>) -> Result<Self> {
        for (position, op) in operations.iter().enumerate() {
            if op.id != position {
                return Err(SimError::UnknownOperation(op.id));
            }
            if !(0.0..=1.0).contains(&op.reliability) {
                return Err(SimError::InvalidReliability {
                    id: op.id,
                    reliability: op.reliability,
                });
            }
        }
        Ok(Self { operations })
    }

    /// The six checkout operations.
    pub fn shopping_cart() -> Self {
        Self {
            operations: shopping_cart_operations(),
        }
    }

    pub fn lookup(&self, id: usize) -> Result<&OperationDefinition> {
        self.operations
            .get(id)
            .ok_or(SimError::UnknownOperation(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.operations.iter().map(|op| op.id)
    }

    pub fn operations(&self) -> &[OperationDefinition] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Longest possible simulated call in this catalog.
    pub fn max_typical_duration_ms(&self) -> u64 {
        self.operations
            .iter()
            .map(|op| op.typical_duration_ms)
            .max()
            .unwrap_or(0)
    }

    /// Copy of this catalog with every typical duration replaced.
    pub fn with_typical_duration_ms(&self, typical_duration_ms: u64) -> Self {
        let operations = self
            .operations
            .iter()
            .cloned()
            .map(|op| OperationDefinition {
                typical_duration_ms,
                ..op
            })
            .collect();
        Self { operations }
    }
}

static SHOPPING_CART: Lazy<Arc<Catalog>> = Lazy::new(|| Arc::new(Catalog::shopping_cart()));

/// Process-wide canonical catalog.
pub fn global() -> Arc<Catalog> {
    Arc::clone(&SHOPPING_CART)
}

const DEFAULT_TYPICAL_DURATION_MS: u64 = 1000;

fn shopping_cart_operations() -> Vec<OperationDefinition> {
    vec![
        OperationDefinition {
            id: 0,
            name: "NODEJS PASSPORT VALIDATE USER TOKEN",
            kind: SpanKind::Internal,
            reliability: 0.99,
            typical_duration_ms: 200,
            attributes: vec![
                AttributeTemplate::user_name("enduser.id"),
                AttributeTemplate::str("cartsim.auth_strategy", "OIDC"),
            ],
        },
        OperationDefinition {
            id: 1,
            name: "REDIS SAVE SHOPPING CART",
            kind: SpanKind::Client,
            reliability: 0.99,
            typical_duration_ms: DEFAULT_TYPICAL_DURATION_MS,
            attributes: vec![
                AttributeTemplate::str("db.system", "redis"),
                AttributeTemplate::str("db.redis.database_index", "0"),
                AttributeTemplate::bool("cartsim.cluster", true),
                AttributeTemplate::str("cartsim.runtime", "AWS EKS"),
            ],
        },
        OperationDefinition {
            id: 2,
            name: "VALIDATE CREDIT CARD EXTERNAL SERVICE",
            kind: SpanKind::Client,
            reliability: 0.1,
            typical_duration_ms: DEFAULT_TYPICAL_DURATION_MS,
            attributes: vec![
                AttributeTemplate::str("http.url", "http://www.3rdpartyverifier.com"),
                AttributeTemplate::str("http.method", "POST"),
                AttributeTemplate::bool("cartsim.third_party", true),
            ],
        },
        OperationDefinition {
            id: 3,
            name: "MYSQL INSERT INTO ORDERS",
            kind: SpanKind::Client,
            reliability: 0.1,
            typical_duration_ms: DEFAULT_TYPICAL_DURATION_MS,
            attributes: vec![
                AttributeTemplate::str("db.system", "MYSQL"),
                AttributeTemplate::str("db.sql.table", "orders"),
                AttributeTemplate::str("cartsim.runtime", "AWS RDS"),
            ],
        },
        OperationDefinition {
            id: 4,
            name: "AMAZON SQS SEND EMAIL WITH ORDER STATUS",
            kind: SpanKind::Producer,
            reliability: 0.9,
            typical_duration_ms: DEFAULT_TYPICAL_DURATION_MS,
            attributes: vec![
                AttributeTemplate::str("messaging.system", "AmazonSQS"),
                AttributeTemplate::str("messaging.destination", "emailsToSend"),
                AttributeTemplate::str("messaging.protocol", "MQTT"),
            ],
        },
        OperationDefinition {
            id: 5,
            name: "RABBITMQ UPDATE STOCK ALLOCATIONS",
            kind: SpanKind::Producer,
            reliability: 0.9,
            typical_duration_ms: 500,
            attributes: vec![
                AttributeTemplate::str("messaging.system", "RabbitMQ"),
                AttributeTemplate::str("messaging.destination", "stockAllocationUpdates"),
                AttributeTemplate::str("messaging.protocol", "AMQP"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_canonical_entries_are_well_formed() {
        let catalog = Catalog::shopping_cart();
        assert_eq!(catalog.len(), 6);

        for id in 0..6 {
            let op = catalog.lookup(id).unwrap();
            assert_eq!(op.id, id);
            assert!((0.0..=1.0).contains(&op.reliability));
            assert!(!op.attributes.is_empty());
        }
    }

    #[test]
    fn test_reliability_tiers() {
        let catalog = global();
        let tiers: Vec<f64> = catalog.operations().iter().map(|op| op.reliability).collect();
        assert_eq!(tiers, vec![0.99, 0.99, 0.1, 0.1, 0.9, 0.9]);
        assert_eq!(catalog.max_typical_duration_ms(), 1000);
    }

    #[test]
    fn test_lookup_unknown_id() {
        let catalog = Catalog::shopping_cart();
        assert_eq!(catalog.lookup(6), Err(SimError::UnknownOperation(6)));
        assert_eq!(catalog.lookup(99), Err(SimError::UnknownOperation(99)));
    }

    #[test]
    fn test_user_name_rendered_per_span() {
        let catalog = Catalog::shopping_cart();
        let op = catalog.lookup(0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let attrs = op.render_attributes(&mut rng);
        assert_eq!(attrs[0].key, "enduser.id");
        assert!(attrs[0].value.as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(attrs[1], KeyValue::new("cartsim.auth_strategy", "OIDC"));
    }

    #[test]
    fn test_invalid_reliability_rejected() {
        let mut ops = Catalog::shopping_cart().operations().to_vec();
        ops[3].reliability = 1.5;

        assert_eq!(
            Catalog::new(ops),
            Err(SimError::InvalidReliability {
                id: 3,
                reliability: 1.5
            })
        );
    }

    #[test]
    fn test_duration_override() {
        let catalog = Catalog::shopping_cart().with_typical_duration_ms(0);
        assert!(catalog.operations().iter().all(|op| op.typical_duration_ms == 0));
        assert_eq!(catalog.lookup(2).unwrap().reliability, 0.1);
    }
}
