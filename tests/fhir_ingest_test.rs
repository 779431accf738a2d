//! FHIR bundle ingestion followed by a FHIR-sourced build

use clinistar::adapters::database::StoreHandles;
use clinistar::adapters::fhir::FhirIngestor;
use clinistar::adapters::memory::MemoryStore;
use clinistar::config::StagingSourceMode;
use clinistar::core::pipeline::{BuildOutcome, BuildPipeline, PipelineOptions};
use clinistar::core::runlog::{RunLogger, RunStatus};
use clinistar::core::staging::StagingTable;
use clinistar::domain::Amount;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn bundle(patient_id: &str, encounter_id: &str, start: &str, end: &str, price: f64) -> serde_json::Value {
    json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [
            {
                "resource": {
                    "resourceType": "Patient",
                    "id": patient_id,
                    "identifier": [{ "value": format!("MRN-{patient_id}") }],
                    "name": [{ "given": ["Ada"], "family": "Lovelace" }],
                    "gender": "female",
                    "birthDate": "1980-04-12"
                }
            },
            {
                "resource": {
                    "resourceType": "Encounter",
                    "id": encounter_id,
                    "status": "finished",
                    "class": {
                        "system": "http://terminology.hl7.org/CodeSystem/v3-ActCode",
                        "code": "IMP",
                        "display": "inpatient encounter"
                    },
                    "subject": { "reference": format!("Patient/{patient_id}") },
                    "period": { "start": start, "end": end },
                    "location": [{ "location": { "display": "Cardiology" } }],
                    "participant": [{ "individual": { "display": "Dr. Grace Hopper" } }]
                }
            },
            {
                "resource": {
                    "resourceType": "Observation",
                    "id": format!("obs-{encounter_id}"),
                    "subject": { "reference": format!("Patient/{patient_id}") },
                    "encounter": { "reference": format!("Encounter/{encounter_id}") },
                    "code": { "coding": [{ "system": "http://loinc.org", "code": "2345-7", "display": "Glucose" }] },
                    "effectiveDateTime": start,
                    "valueQuantity": { "value": 98.5, "unit": "mg/dL" }
                }
            },
            {
                "resource": {
                    "resourceType": "ChargeItem",
                    "id": format!("ci-{encounter_id}"),
                    "subject": { "reference": format!("Patient/{patient_id}") },
                    "context": { "reference": format!("Encounter/{encounter_id}") },
                    "code": { "coding": [{ "system": "http://www.ama-assn.org/go/cpt", "code": "99223" }] },
                    "occurrenceDateTime": start,
                    "quantity": { "value": 1 },
                    "priceOverride": { "value": price, "currency": "USD" }
                }
            }
        ]
    })
}

fn write_bundles(dir: &TempDir) {
    fs::write(
        dir.path().join("a.json"),
        bundle("p1", "enc-1", "2024-05-01T08:00:00Z", "2024-05-03T12:00:00Z", 1250.5).to_string(),
    )
    .unwrap();
    fs::write(
        dir.path().join("b.json"),
        bundle("p2", "enc-2", "2024-05-02T09:00:00Z", "2024-05-02T15:00:00Z", 300.0).to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_stage_then_build_from_fhir() {
    let dir = TempDir::new().unwrap();
    write_bundles(&dir);

    let store = MemoryStore::new();
    let stores = StoreHandles::shared(Arc::new(store.clone()));

    let ingestor = FhirIngestor::new(stores.staging.clone(), RunLogger::new(stores.run_log.clone()));
    let report = ingestor.stage_directory(dir.path()).await.unwrap();
    assert_eq!(
        report.notes(),
        "FHIR staged: patient=2, encounter=2, obs=2, chargeitem=2"
    );

    let staging = store.staging().await;
    assert_eq!(staging.count(StagingTable::FhirPatient), 2);
    assert!(staging
        .rows(StagingTable::FhirEncounter)
        .iter()
        .all(|row| row.get("source_file").and_then(|v| v.as_deref()).is_some()));

    let options = PipelineOptions {
        source: StagingSourceMode::Fhir,
        ..PipelineOptions::default()
    };
    let pipeline = BuildPipeline::new(stores.staging, stores.run_log, stores.warehouse, options);
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.outcome, BuildOutcome::Committed);

    let warehouse = store.committed().await;
    assert_eq!(warehouse.facts.len(), 2);
    assert_eq!(warehouse.departments.len(), 1);
    assert_eq!(warehouse.providers.len(), 1);
    assert_eq!(warehouse.departments[0].department_id.as_str(), "Cardiology");
    assert_eq!(warehouse.providers[0].provider_id.as_str(), "Dr. Grace Hopper");

    let patient = warehouse
        .patients
        .iter()
        .find(|p| p.patient_id.as_str() == "p1")
        .unwrap();
    assert_eq!(patient.birth_year, Some(1980));
    assert_eq!(patient.sex.as_deref(), Some("F"));

    let fact = warehouse
        .facts
        .iter()
        .find(|f| f.encounter_id.as_str() == "enc-1")
        .unwrap();
    assert_eq!(fact.length_of_stay_days, 2);
    assert_eq!(fact.total_charges, Amount::from_cents(125050));
    assert_eq!(fact.encounter_type.as_deref(), Some("IMP"));

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].notes.as_deref(), Some(report.notes().as_str()));
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
}

#[tokio::test]
async fn test_restaging_replaces_previous_rows() {
    let dir = TempDir::new().unwrap();
    write_bundles(&dir);

    let store = MemoryStore::new();
    let stores = StoreHandles::shared(Arc::new(store.clone()));
    let ingestor = FhirIngestor::new(stores.staging, RunLogger::new(stores.run_log));

    ingestor.stage_directory(dir.path()).await.unwrap();
    fs::remove_file(dir.path().join("b.json")).unwrap();
    ingestor.stage_directory(dir.path()).await.unwrap();

    let staging = store.staging().await;
    assert_eq!(staging.count(StagingTable::FhirPatient), 1);
    assert_eq!(staging.count(StagingTable::FhirChargeItem), 1);
}

#[tokio::test]
async fn test_bad_directory_leaves_no_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    let store = MemoryStore::new();
    let stores = StoreHandles::shared(Arc::new(store.clone()));
    let ingestor = FhirIngestor::new(stores.staging, RunLogger::new(stores.run_log));

    assert!(ingestor.stage_directory(dir.path()).await.is_err());
    assert!(store.runs().await.is_empty());
    assert_eq!(store.staging().await.total_rows(), 0);
}
