//! Dummy data for generated attributes and log bodies.

use rand::prelude::*;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bruno", "Chloe", "Dmitri", "Elena", "Felix", "Grace", "Hiro", "Ines", "Jonas",
    "Kiley", "Liam", "Maya", "Nico", "Olivia", "Priya", "Quinn", "Rosa", "Sam", "Tariq",
];

const LAST_NAMES: &[&str] = &[
    "Anders", "Baker", "Castillo", "Dubois", "Evans", "Fischer", "Garcia", "Harris", "Ito",
    "Jensen", "Kowalski", "Lopez", "Moreau", "Nakamura", "Okafor", "Petrov", "Rossi", "Silva",
];

/// Username shaped like `Kiley_Harris42`, `maya.rossi` or `Tariq7`.
pub fn user_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("user");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("name");

    match rng.random_range(0..3) {
        0 => format!("{}_{}{}", first, last, rng.random_range(0..100)),
        1 => format!("{}.{}", first.to_lowercase(), last.to_lowercase()),
        _ => format!("{}{}", first, rng.random_range(0..1000)),
    }
}

/// Dotted-quad IPv4 address.
pub fn ipv4<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.random_range(1..255),
        rng.random_range(0..256),
        rng.random_range(0..256),
        rng.random_range(1..255)
    )
}
