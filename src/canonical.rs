//! Canonical serialization for deterministic fingerprints.
//!
//! Plans, schema registries and configs are fingerprinted so callers can
//! compare results across runs without diffing whole structures.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - No HashMap in hashed data: use BTreeMap / serde_json::Map (sorted)
//! - Floats are quantized to i64 before hashing

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Quantize a float to an i64 for deterministic hashing.
pub fn quantize(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

/// Serialize a value to canonical JSON bytes.
///
/// Serialization of kernel types cannot fail (no non-string map keys);
/// a failure yields empty bytes rather than a panic.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        name: String,
        cost: i64,
    }

    #[test]
    fn test_determinism() {
        let s = Sample {
            name: "closing".to_string(),
            cost: quantize(1.25),
        };
        assert_eq!(canonical_hash(&s), canonical_hash(&s));
        assert_eq!(canonical_hash_hex(&s).len(), 16);
    }

    #[test]
    fn test_quantize_absorbs_float_noise() {
        assert_eq!(quantize(0.1 + 0.2), quantize(0.3));
        assert_ne!(quantize(0.3), quantize(0.31));
    }
}
