//! heddle.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Container-assignment policy for instances left free by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Prefer a fresh feasible container; rotate over used ones otherwise.
    #[default]
    RoundRobin,
    /// Round-robin until `n` containers are in use, then reuse.
    MaxProcessors(u32),
    /// Always reuse an already-used feasible container when possible.
    MinProcessors,
}

/// Iteration caps for the fixed-point loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Backstop for the buffer-size propagation scan.
    pub sizing_iterations: u32,
    /// Backstop for the launcher convergence loop.
    pub convergence_sweeps: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            sizing_iterations: 64,
            convergence_sweeps: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeddleConfig {
    pub placement: Option<PlacementConfig>,
    pub discovery: Option<DiscoveryConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlacementConfig {
    /// `round-robin` (default), `max-processors`, or `min-processors`.
    pub policy: Option<String>,
    /// Container budget for the `max-processors` policy.
    pub max_processors: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// Container-name filter handed to candidate discovery.
    pub container_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitsConfig {
    pub sizing_iterations: Option<u32>,
    pub convergence_sweeps: Option<u32>,
}

impl HeddleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HeddleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the placement policy, rejecting unknown names.
    pub fn placement_policy(&self) -> anyhow::Result<PlacementPolicy> {
        let Some(placement) = &self.placement else {
            return Ok(PlacementPolicy::default());
        };
        match placement.policy.as_deref() {
            None | Some("round-robin") => Ok(PlacementPolicy::RoundRobin),
            Some("min-processors") => Ok(PlacementPolicy::MinProcessors),
            Some("max-processors") => {
                let n = placement.max_processors.ok_or_else(|| {
                    anyhow::anyhow!("placement.max_processors required for max-processors policy")
                })?;
                Ok(PlacementPolicy::MaxProcessors(n))
            }
            Some(other) => Err(anyhow::anyhow!("unknown placement policy: {other}")),
        }
    }

    /// Container filter for candidate discovery, if configured.
    pub fn container_filter(&self) -> Option<&str> {
        self.discovery.as_ref()?.container_filter.as_deref()
    }

    /// Resolve iteration caps, falling back to defaults.
    pub fn limits(&self) -> Limits {
        let defaults = Limits::default();
        let Some(limits) = &self.limits else {
            return defaults;
        };
        Limits {
            sizing_iterations: limits.sizing_iterations.unwrap_or(defaults.sizing_iterations),
            convergence_sweeps: limits
                .convergence_sweeps
                .unwrap_or(defaults.convergence_sweeps),
        }
    }
}
