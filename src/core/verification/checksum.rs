//! Warehouse fingerprints
//!
//! A fingerprint is the SHA-256 of the canonical JSON of a normalized
//! [`WarehouseDelta`]. Two warehouses with the same rows have the same
//! fingerprint regardless of the order rows were produced or read in.

use crate::domain::warehouse::WarehouseDelta;
use crate::domain::{ClinistarError, Result};
use sha2::{Digest, Sha256};

/// Calculate the SHA-256 fingerprint of a warehouse delta
///
/// # Returns
///
/// Returns a hex-encoded SHA-256 string (64 characters).
///
/// # Examples
///
/// ```
/// use clinistar::core::verification::checksum::fingerprint;
/// use clinistar::domain::WarehouseDelta;
///
/// let fp = fingerprint(&WarehouseDelta::default()).unwrap();
/// assert_eq!(fp.len(), 64);
/// ```
pub fn fingerprint(delta: &WarehouseDelta) -> Result<String> {
    let mut normalized = delta.clone();
    normalized.normalize();

    let data = serde_json::to_vec(&normalized)
        .map_err(|e| ClinistarError::Serialization(e.to_string()))?;

    Ok(fingerprint_bytes(&data))
}

/// Calculate the SHA-256 of raw bytes, hex-encoded
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Short form for run log notes
pub fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::PatientId;
    use crate::domain::warehouse::PatientDim;

    fn patient(id: &str) -> PatientDim {
        PatientDim {
            patient_id: PatientId::new(id).unwrap(),
            birth_year: Some(1980),
            sex: Some("M".to_string()),
        }
    }

    #[test]
    fn test_fingerprint_ignores_row_order() {
        let a = WarehouseDelta {
            patients: vec![patient("P1"), patient("P2")],
            ..WarehouseDelta::default()
        };
        let b = WarehouseDelta {
            patients: vec![patient("P2"), patient("P1")],
            ..WarehouseDelta::default()
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = WarehouseDelta {
            patients: vec![patient("P1")],
            ..WarehouseDelta::default()
        };
        let mut b = a.clone();
        b.patients[0].birth_year = Some(1981);
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_bytes() {
        let checksum = fingerprint_bytes(b"Hello, World!");
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(short(&checksum).len(), 12);
    }
}
