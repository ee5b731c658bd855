//! Candidate Index.
//!
//! For every assembly instance, queries the candidate source for scored
//! implementations and attaches each one's feasible-container map. An
//! instance with no feasible container anywhere is rejected here, before
//! any search work is spent.

use heddle_core::{Assembly, CMap, Candidate, CandidateSource};
use tracing::debug;

use crate::error::{PlanError, PlanResult, RejectReason, Rejection, RejectionList};

/// One candidate with its feasible-container map.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub feasible: CMap,
}

/// All usable candidates for one instance, in declared preference order.
#[derive(Debug, Clone)]
pub struct InstanceCandidates {
    pub instance: usize,
    pub candidates: Vec<ScoredCandidate>,
    /// Candidates dropped at indexing time, kept for diagnostics.
    pub rejected: Vec<Rejection>,
}

/// Per-instance candidate lists, parallel to `assembly.instances`.
#[derive(Debug, Clone)]
pub struct CandidateIndex {
    pub per_instance: Vec<InstanceCandidates>,
}

impl CandidateIndex {
    /// Build the index by querying `source` for every instance.
    ///
    /// Fails with `InfeasibleInstance` as soon as one instance has zero
    /// candidates with any feasible container.
    pub fn build(
        assembly: &Assembly,
        source: &dyn CandidateSource,
        container_filter: Option<&str>,
    ) -> PlanResult<Self> {
        let mut per_instance = Vec::with_capacity(assembly.instances.len());

        for (idx, decl) in assembly.instances.iter().enumerate() {
            let found = source.find_candidates(&decl.spec);
            let mut candidates = Vec::with_capacity(found.len());
            let mut rejected = Vec::new();

            for candidate in found {
                let feasible =
                    source.find_feasible_containers(&candidate.implementation, container_filter);
                if feasible.is_empty() {
                    debug!(
                        instance = %decl.name,
                        implementation = %candidate.implementation.qualified_name(),
                        "candidate has no feasible container"
                    );
                    rejected.push(Rejection {
                        instance: decl.name.clone(),
                        implementation: candidate.implementation.qualified_name(),
                        reason: RejectReason::NoFeasibleContainer,
                    });
                    continue;
                }
                candidates.push(ScoredCandidate { candidate, feasible });
            }

            if candidates.is_empty() {
                return Err(PlanError::InfeasibleInstance {
                    instance: decl.name.clone(),
                    rejections: RejectionList(rejected),
                });
            }

            debug!(
                instance = %decl.name,
                candidates = candidates.len(),
                rejected = rejected.len(),
                "indexed candidates"
            );
            per_instance.push(InstanceCandidates {
                instance: idx,
                candidates,
                rejected,
            });
        }

        Ok(Self { per_instance })
    }

    /// All indexing-time rejections across instances, for error reporting.
    pub fn all_rejections(&self) -> Vec<Rejection> {
        self.per_instance
            .iter()
            .flat_map(|ic| ic.rejected.iter().cloned())
            .collect()
    }
}
