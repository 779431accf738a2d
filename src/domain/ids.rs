//! Domain identifier types with validation
//!
//! Newtype wrappers for the natural (business) keys of the warehouse. Each
//! type keeps keys of different entities from being mixed up, and rejects
//! empty keys at the staging boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! natural_key {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", $label, ", trimming surrounding whitespace")]
            pub fn new(id: impl Into<String>) -> Result<Self, String> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(Self(trimmed.to_string()))
            }

            #[doc = concat!("Returns the ", $label, " as a string slice")]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes self and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

natural_key!(
    /// Patient identifier (e.g. `PAT00042`, or a FHIR Patient.id)
    PatientId,
    "Patient ID"
);

natural_key!(
    /// Provider identifier (e.g. `PRV0007`, or a FHIR participant display name)
    ProviderId,
    "Provider ID"
);

natural_key!(
    /// Department identifier (e.g. `ICU`, or a FHIR location display name)
    DepartmentId,
    "Department ID"
);

natural_key!(
    /// Encounter identifier (e.g. `ENC000123`)
    EncounterId,
    "Encounter ID"
);

/// Run log identifier
///
/// Assigned by the store on `begin_run`; unique and monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(i64);

impl RunId {
    /// Wraps a store-assigned run id
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
