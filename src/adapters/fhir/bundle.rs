//! FHIR bundle extraction
//!
//! Flattens the Patient, Encounter, Observation and ChargeItem resources of
//! a `Bundle` into `stg_fhir_*` rows. Every value is kept as text; typing
//! happens when staging is decoded.

use crate::core::staging::tables::{column_bag, StagingRows, StagingTable};
use crate::domain::{ClinistarError, Result};
use serde_json::Value;

/// Reduces a reference such as `Patient/patient-001` to `patient-001`
pub fn ref_id(reference: Option<&str>) -> Option<String> {
    let reference = reference.filter(|r| !r.is_empty())?;
    Some(
        reference
            .rsplit('/')
            .next()
            .unwrap_or(reference)
            .to_string(),
    )
}

/// Scalar JSON value as text
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text(resource: &Value, pointer: &str) -> Option<String> {
    scalar(resource.pointer(pointer))
}

/// `(system, code, display)` of the first coding under `pointer`
fn first_coding(resource: &Value, pointer: &str) -> (Option<String>, Option<String>, Option<String>) {
    match resource.pointer(pointer).and_then(|c| c.as_array()).and_then(|a| a.first()) {
        Some(coding) if coding.is_object() => (
            text(coding, "/system"),
            text(coding, "/code"),
            text(coding, "/display"),
        ),
        _ => (None, None, None),
    }
}

fn patient_name(resource: &Value) -> Option<String> {
    let name = resource.pointer("/name/0")?;
    let given: Vec<&str> = name
        .get("given")
        .and_then(|g| g.as_array())
        .map(|g| g.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let given = given.join(" ");
    let parts: Vec<&str> = [Some(given.as_str()), name.get("family").and_then(Value::as_str)]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Appends the rows of one bundle to `rows`
///
/// Resources of other types (Practitioner, Organization, ...) are ignored.
///
/// # Errors
///
/// Returns `ClinistarError::Fhir` if the document is not a `Bundle` or has
/// no entries.
pub fn stage_bundle(bundle: &Value, source_file: &str, rows: &mut StagingRows) -> Result<()> {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(ClinistarError::Fhir(format!(
            "{source_file}: JSON was not a FHIR Bundle (resourceType != 'Bundle')"
        )));
    }

    let entries = match bundle.get("entry").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries,
        _ => {
            return Err(ClinistarError::Fhir(format!(
                "{source_file}: Bundle.entry is empty or invalid"
            )))
        }
    };

    let source = Some(source_file.to_string());

    for resource in entries.iter().filter_map(|e| e.get("resource")) {
        if !resource.is_object() {
            continue;
        }

        match resource.get("resourceType").and_then(Value::as_str) {
            Some("Patient") => rows.push(
                StagingTable::FhirPatient,
                column_bag([
                    ("patient_id", text(resource, "/id")),
                    ("mrn", text(resource, "/identifier/0/value")),
                    ("name", patient_name(resource)),
                    ("gender", text(resource, "/gender")),
                    ("birth_date", text(resource, "/birthDate")),
                    ("source_file", source.clone()),
                ]),
            ),
            Some("Encounter") => rows.push(
                StagingTable::FhirEncounter,
                column_bag([
                    ("encounter_id", text(resource, "/id")),
                    (
                        "patient_id",
                        ref_id(resource.pointer("/subject/reference").and_then(Value::as_str)),
                    ),
                    ("status", text(resource, "/status")),
                    ("class_system", text(resource, "/class/system")),
                    ("class_code", text(resource, "/class/code")),
                    ("class_display", text(resource, "/class/display")),
                    ("start_ts", text(resource, "/period/start")),
                    ("end_ts", text(resource, "/period/end")),
                    ("department", text(resource, "/location/0/location/display")),
                    ("provider_name", text(resource, "/participant/0/individual/display")),
                    ("source_file", source.clone()),
                ]),
            ),
            Some("Observation") => {
                let (system, code, display) = first_coding(resource, "/code/coding");
                rows.push(
                    StagingTable::FhirObservation,
                    column_bag([
                        ("observation_id", text(resource, "/id")),
                        (
                            "patient_id",
                            ref_id(resource.pointer("/subject/reference").and_then(Value::as_str)),
                        ),
                        (
                            "encounter_id",
                            ref_id(resource.pointer("/encounter/reference").and_then(Value::as_str)),
                        ),
                        ("loinc_system", system),
                        ("loinc_code", code),
                        ("loinc_display", display.or_else(|| text(resource, "/code/text"))),
                        ("effective_ts", text(resource, "/effectiveDateTime")),
                        ("value", text(resource, "/valueQuantity/value")),
                        ("unit", text(resource, "/valueQuantity/unit")),
                        ("source_file", source.clone()),
                    ]),
                );
            }
            Some("ChargeItem") => {
                let (system, code, display) = first_coding(resource, "/code/coding");
                rows.push(
                    StagingTable::FhirChargeItem,
                    column_bag([
                        ("chargeitem_id", text(resource, "/id")),
                        (
                            "patient_id",
                            ref_id(resource.pointer("/subject/reference").and_then(Value::as_str)),
                        ),
                        (
                            "encounter_id",
                            ref_id(resource.pointer("/context/reference").and_then(Value::as_str)),
                        ),
                        ("cpt_system", system),
                        ("cpt_code", code),
                        ("cpt_display", display.or_else(|| text(resource, "/code/text"))),
                        ("occurrence_ts", text(resource, "/occurrenceDateTime")),
                        ("quantity", text(resource, "/quantity/value")),
                        ("amount", text(resource, "/priceOverride/value")),
                        ("currency", text(resource, "/priceOverride/currency")),
                        ("source_file", source.clone()),
                    ]),
                );
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_id() {
        assert_eq!(ref_id(Some("Patient/p-1")), Some("p-1".to_string()));
        assert_eq!(ref_id(Some("p-1")), Some("p-1".to_string()));
        assert_eq!(ref_id(Some("")), None);
        assert_eq!(ref_id(None), None);
    }

    #[test]
    fn test_rejects_non_bundle_and_empty_bundle() {
        let mut rows = StagingRows::default();
        let err = stage_bundle(&json!({"resourceType": "Patient"}), "a.json", &mut rows);
        assert!(matches!(err, Err(ClinistarError::Fhir(_))));

        let err = stage_bundle(&json!({"resourceType": "Bundle", "entry": []}), "b.json", &mut rows);
        assert!(matches!(err, Err(ClinistarError::Fhir(_))));
    }

    #[test]
    fn test_extracts_resources() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {
                    "resourceType": "Patient", "id": "p-1",
                    "identifier": [{"value": "MRN-9"}],
                    "name": [{"given": ["Ada", "M"], "family": "Lovelace"}],
                    "gender": "female", "birthDate": "1980-12-10"
                }},
                {"resource": {
                    "resourceType": "Encounter", "id": "e-1",
                    "subject": {"reference": "Patient/p-1"},
                    "class": {"code": "IMP", "display": "inpatient"},
                    "period": {"start": "2024-01-01T08:00:00Z", "end": "2024-01-04T10:00:00Z"},
                    "location": [{"location": {"display": "Cardiology"}}],
                    "participant": [{"individual": {"display": "Dr. Who"}}]
                }},
                {"resource": {
                    "resourceType": "Observation", "id": "o-1",
                    "encounter": {"reference": "Encounter/e-1"},
                    "code": {"text": "Heart rate"},
                    "valueQuantity": {"value": 72, "unit": "bpm"}
                }},
                {"resource": {
                    "resourceType": "ChargeItem", "id": "c-1",
                    "context": {"reference": "Encounter/e-1"},
                    "code": {"coding": [{"system": "cpt", "code": "99213"}]},
                    "priceOverride": {"value": 125.5, "currency": "USD"}
                }},
                {"resource": {"resourceType": "Practitioner", "id": "pr-1"}}
            ]
        });

        let mut rows = StagingRows::default();
        stage_bundle(&bundle, "bundle.json", &mut rows).unwrap();

        let patient = &rows.rows(StagingTable::FhirPatient)[0];
        assert_eq!(patient["name"].as_deref(), Some("Ada M Lovelace"));
        assert_eq!(patient["mrn"].as_deref(), Some("MRN-9"));
        assert_eq!(patient["source_file"].as_deref(), Some("bundle.json"));

        let encounter = &rows.rows(StagingTable::FhirEncounter)[0];
        assert_eq!(encounter["patient_id"].as_deref(), Some("p-1"));
        assert_eq!(encounter["department"].as_deref(), Some("Cardiology"));
        assert_eq!(encounter["provider_name"].as_deref(), Some("Dr. Who"));
        assert_eq!(encounter["class_system"], None);

        let observation = &rows.rows(StagingTable::FhirObservation)[0];
        assert_eq!(observation["loinc_display"].as_deref(), Some("Heart rate"));
        assert_eq!(observation["value"].as_deref(), Some("72"));

        let charge = &rows.rows(StagingTable::FhirChargeItem)[0];
        assert_eq!(charge["encounter_id"].as_deref(), Some("e-1"));
        assert_eq!(charge["amount"].as_deref(), Some("125.5"));
        assert_eq!(rows.total_rows(), 4);
    }
}
