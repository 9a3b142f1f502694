//! Compact, time-ordered IDs for history rows.
//!
//! Format: a 4-character time bucket (base-36, ~56s per bucket, ~3-year
//! horizon from [`EPOCH`]) followed by a random suffix. The recorder treats
//! this as advisory — a database-assigned key works just as well — but a
//! short sortable ID keeps history rows compact.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BUCKET_SECONDS: i64 = 56;
const MAX_SHORT_RETRIES: usize = 10;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn encode_base36(mut value: u64, width: usize) -> String {
    let mut chars = vec![b'0'; width];
    for slot in chars.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8(chars).expect("base36 alphabet is ASCII")
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..36)] as char)
        .collect()
}

fn time_bucket(now: DateTime<Utc>) -> u64 {
    let elapsed = (now - epoch()).num_seconds().max(0);
    (elapsed / BUCKET_SECONDS) as u64
}

/// Decodes the time bucket out of an ID produced by [`CompactIdGenerator`],
/// for the "ID time is within one bucket of generation" property.
pub fn bucket_of(id: &str) -> Option<u64> {
    if id.len() < 4 {
        return None;
    }
    let prefix = &id[..4];
    let mut value: u64 = 0;
    for c in prefix.bytes() {
        let digit = ALPHABET.iter().position(|&a| a == c)? as u64;
        value = value * 36 + digit;
    }
    Some(value)
}

/// Generates compact IDs and remembers recently-issued ones to avoid
/// collisions within the same process.
pub struct CompactIdGenerator {
    recent: Mutex<HashSet<String>>,
}

impl Default for CompactIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactIdGenerator {
    pub fn new() -> Self {
        Self {
            recent: Mutex::new(HashSet::new()),
        }
    }

    /// Seeds the recently-seen set directly; used by tests that need to
    /// force the collision/fallback path deterministically.
    #[cfg(test)]
    pub fn seed_recent(&self, ids: impl IntoIterator<Item = String>) {
        self.recent.lock().unwrap().extend(ids);
    }

    pub fn generate(&self) -> String {
        self.generate_at(Utc::now())
    }

    fn generate_at(&self, now: DateTime<Utc>) -> String {
        let bucket = encode_base36(time_bucket(now), 4);
        let mut recent = self.recent.lock().unwrap();

        let short = format!("{bucket}{}", random_suffix(3));
        if recent.insert(short.clone()) {
            return short;
        }

        for _ in 0..MAX_SHORT_RETRIES {
            let longer = format!("{bucket}{}", random_suffix(5));
            if recent.insert(longer.clone()) {
                return longer;
            }
        }

        // Last resort: a UUID, which the recorder also accepts.
        uuid::Uuid::new_v4().to_string()
    }
}
