//! Dimension sources
//!
//! Providers and departments come from explicit staged records first and are
//! then derived from encounter rows. The validator and the builder walk the
//! same candidate sequence, so "first occurrence" means the same row to both.

use crate::domain::ids::{DepartmentId, ProviderId};
use crate::domain::records::StagedBatch;

/// Where a dimension candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// An explicit provider/department record
    Staged,
    /// Derived from an encounter row
    Encounter,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderCandidate<'a> {
    pub provider_id: &'a ProviderId,
    /// `None` when derived from an encounter (the name defaults to the id)
    pub provider_name: Option<&'a str>,
    pub department_id: &'a DepartmentId,
    pub origin: CandidateOrigin,
}

#[derive(Debug, Clone, Copy)]
pub struct DepartmentCandidate<'a> {
    pub department_id: &'a DepartmentId,
    /// `None` when derived from an encounter (the name defaults to the id)
    pub department_name: Option<&'a str>,
    pub origin: CandidateOrigin,
}

/// Provider candidates in first-occurrence order
pub fn provider_candidates(batch: &StagedBatch) -> impl Iterator<Item = ProviderCandidate<'_>> {
    let staged = batch.providers().map(|p| ProviderCandidate {
        provider_id: &p.provider_id,
        provider_name: Some(p.provider_name.as_str()),
        department_id: &p.department_id,
        origin: CandidateOrigin::Staged,
    });
    let derived = batch.encounters().map(|e| ProviderCandidate {
        provider_id: &e.provider_id,
        provider_name: None,
        department_id: &e.department_id,
        origin: CandidateOrigin::Encounter,
    });
    staged.chain(derived)
}

/// Department candidates in first-occurrence order
pub fn department_candidates(
    batch: &StagedBatch,
) -> impl Iterator<Item = DepartmentCandidate<'_>> {
    let staged = batch.departments().map(|d| DepartmentCandidate {
        department_id: &d.department_id,
        department_name: Some(d.department_name.as_str()),
        origin: CandidateOrigin::Staged,
    });
    let derived = batch.encounters().map(|e| DepartmentCandidate {
        department_id: &e.department_id,
        department_name: None,
        origin: CandidateOrigin::Encounter,
    });
    staged.chain(derived)
}
