//! Explicit deployment import.
//!
//! A saved deployment report names every instance's implementation,
//! artifact and containers textually. Importing re-resolves those names
//! through the candidate source and rebuilds the per-instance deployments
//! directly, bypassing search and policy mapping. Feasibility is still
//! verified: a recorded container the implementation can no longer run on
//! is a hard error, not a silent re-placement.

use heddle_core::{Assembly, CandidateSource, Deployment, DeploymentReport};
use tracing::{debug, info};

use crate::error::{PlanError, PlanResult};

/// Rebuild deployments from a saved report.
///
/// Returns one `Deployment` per assembly instance, in assembly order.
pub fn import_deployment(
    assembly: &Assembly,
    report: &DeploymentReport,
    source: &dyn CandidateSource,
    container_filter: Option<&str>,
) -> PlanResult<Vec<Deployment>> {
    let mut deployments = Vec::with_capacity(assembly.instances.len());

    for decl in &assembly.instances {
        let entry = report
            .instances
            .iter()
            .find(|r| r.instance == decl.name)
            .ok_or_else(|| PlanError::ImportUnknownInstance {
                instance: decl.name.clone(),
            })?;

        let candidate = source
            .find_candidates(&decl.spec)
            .into_iter()
            .find(|c| {
                c.implementation.package == entry.package
                    && c.implementation.name == entry.implementation
                    && c.implementation.artifact == entry.artifact
            })
            .ok_or_else(|| PlanError::ImportUnresolved {
                instance: decl.name.clone(),
                implementation: entry.implementation.clone(),
                artifact: entry.artifact.clone(),
            })?;

        let feasible = source.find_feasible_containers(&candidate.implementation, container_filter);
        for &container in &entry.containers {
            if !feasible.contains(container) {
                return Err(PlanError::ImportInfeasible {
                    instance: decl.name.clone(),
                    container,
                });
            }
        }

        debug!(
            instance = %decl.name,
            implementation = %candidate.implementation.qualified_name(),
            containers = ?entry.containers,
            "imported placement"
        );
        deployments.push(Deployment {
            scale: entry.scale,
            containers: entry.containers.clone(),
            implementations: vec![candidate.implementation.clone(); entry.containers.len()],
            feasible,
            is_static: candidate.is_static,
            score: candidate.score,
        });
    }

    info!(
        assembly = %assembly.name,
        instances = deployments.len(),
        "explicit deployment imported"
    );
    Ok(deployments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heddle_core::{CMap, Candidate, Implementation, InstanceDecl};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    struct TableSource {
        candidates: HashMap<String, Vec<Candidate>>,
        feasible: HashMap<String, CMap>,
    }

    impl CandidateSource for TableSource {
        fn find_candidates(&self, spec: &str) -> Vec<Candidate> {
            self.candidates.get(spec).cloned().unwrap_or_default()
        }

        fn find_feasible_containers(
            &self,
            implementation: &Implementation,
            _filter: Option<&str>,
        ) -> CMap {
            self.feasible
                .get(&implementation.name)
                .copied()
                .unwrap_or(CMap::EMPTY)
        }
    }

    fn imp(name: &str) -> Arc<Implementation> {
        Arc::new(Implementation {
            package: "dsp".to_string(),
            name: name.to_string(),
            artifact: "dsp.art".to_string(),
            slot: 0,
            ports: Vec::new(),
            properties: Vec::new(),
            slaves: Vec::new(),
        })
    }

    fn sample_assembly() -> Assembly {
        Assembly {
            name: "rx".to_string(),
            instances: vec![InstanceDecl {
                name: "filter".to_string(),
                spec: "dsp.filter".to_string(),
                scale: 1,
                slave_of: None,
                params: BTreeMap::new(),
            }],
            connections: Vec::new(),
        }
    }

    fn sample_source() -> TableSource {
        TableSource {
            candidates: HashMap::from([(
                "dsp.filter".to_string(),
                vec![Candidate { implementation: imp("fir"), score: 6, is_static: false }],
            )]),
            feasible: HashMap::from([("fir".to_string(), CMap::from_ordinals([0, 2]).unwrap())]),
        }
    }

    fn report_for(containers: Vec<u32>) -> DeploymentReport {
        DeploymentReport {
            assembly: "rx".to_string(),
            total_score: 6,
            instances: vec![heddle_core::InstanceReport {
                instance: "filter".to_string(),
                spec: "dsp.filter".to_string(),
                package: "dsp".to_string(),
                implementation: "fir".to_string(),
                artifact: "dsp.art".to_string(),
                containers: containers.clone(),
                scale: containers.len() as u32,
                score: 6,
                is_static: false,
            }],
        }
    }

    #[test]
    fn import_rebuilds_recorded_placement() {
        let deployments = import_deployment(
            &sample_assembly(),
            &report_for(vec![2]),
            &sample_source(),
            None,
        )
        .unwrap();

        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].containers, vec![2]);
        assert_eq!(deployments[0].implementation().name, "fir");
        assert_eq!(deployments[0].score, 6);
    }

    #[test]
    fn import_rejects_unknown_instance() {
        let mut report = report_for(vec![0]);
        report.instances[0].instance = "other".to_string();

        let err = import_deployment(&sample_assembly(), &report, &sample_source(), None)
            .unwrap_err();
        assert!(matches!(err, PlanError::ImportUnknownInstance { .. }));
    }

    #[test]
    fn import_rejects_vanished_implementation() {
        let mut report = report_for(vec![0]);
        report.instances[0].implementation = "iir".to_string();

        let err = import_deployment(&sample_assembly(), &report, &sample_source(), None)
            .unwrap_err();
        assert!(matches!(err, PlanError::ImportUnresolved { .. }));
    }

    #[test]
    fn import_rejects_infeasible_container() {
        let err = import_deployment(
            &sample_assembly(),
            &report_for(vec![1]), // fir only runs on 0 and 2
            &sample_source(),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::ImportInfeasible { container: 1, .. }
        ));
    }
}
