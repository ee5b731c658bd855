//! Deployment report.
//!
//! A textual record of what the planner decided: instance → containers,
//! implementation, artifact, score. Serialized as JSON for operator
//! diagnostics, and re-importable as an explicit deployment on a later run
//! (bypassing candidate indexing, search and policy mapping).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cmap::Ordinal;
use crate::model::{Assembly, Deployment};

/// The resolved placement of one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    pub instance: String,
    pub spec: String,
    pub package: String,
    pub implementation: String,
    pub artifact: String,
    /// One container ordinal per member.
    pub containers: Vec<Ordinal>,
    pub scale: u32,
    pub score: u32,
    #[serde(default)]
    pub is_static: bool,
}

/// The full planner outcome for one assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub assembly: String,
    pub total_score: u64,
    pub instances: Vec<InstanceReport>,
}

impl DeploymentReport {
    /// Build a report from the finalized per-instance deployments.
    ///
    /// `deployments` must be parallel to `assembly.instances`.
    pub fn from_deployments(assembly: &Assembly, deployments: &[Deployment]) -> Self {
        let instances = assembly
            .instances
            .iter()
            .zip(deployments)
            .map(|(decl, dep)| {
                let imp = dep.implementation();
                InstanceReport {
                    instance: decl.name.clone(),
                    spec: decl.spec.clone(),
                    package: imp.package.clone(),
                    implementation: imp.name.clone(),
                    artifact: imp.artifact.clone(),
                    containers: dep.containers.clone(),
                    scale: dep.scale,
                    score: dep.score,
                    is_static: dep.is_static,
                }
            })
            .collect();

        Self {
            assembly: assembly.name.clone(),
            total_score: deployments.iter().map(|d| u64::from(d.score)).sum(),
            instances,
        }
    }

    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let report: DeploymentReport = serde_json::from_str(&content)?;
        Ok(report)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
