//! Collaborator interfaces the planner consumes.
//!
//! Candidate discovery, connectivity checking, collocation, buffer sizing
//! and transport selection are provided by external subsystems (the
//! component-library resolver, port machinery, transfer layer). The planner
//! only depends on these traits; tests supply table-driven fakes.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cmap::CMap;
use crate::model::{Candidate, Implementation, PortSpec};

/// Produces candidate implementations for a component spec, and the
/// containers each implementation can run on.
pub trait CandidateSource {
    /// Candidates for `spec`, in declared (preference) order.
    fn find_candidates(&self, spec: &str) -> Vec<Candidate>;

    /// Containers `implementation` can run on, optionally restricted by a
    /// container-name filter from configuration.
    fn find_feasible_containers(
        &self,
        implementation: &Implementation,
        container_filter: Option<&str>,
    ) -> CMap;
}

/// External connectivity-compatibility check between two implementations
/// across one assembly connection.
pub trait ConnectivityCheck {
    fn is_connection_compatible(
        &self,
        from: &Implementation,
        to: &Implementation,
        port: &str,
    ) -> bool;
}

/// Result of applying a collocation policy to a scaled instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collocation {
    /// Possibly adjusted member count.
    pub scale: u32,
    /// Consecutive members grouped per container.
    pub group_size: u32,
    /// Number of distinct containers to use.
    pub containers_used: u32,
}

/// Error from a collocation policy that cannot satisfy the request.
#[derive(Debug, Clone, Error)]
#[error("collocation rejected scale {requested} over {feasible} feasible containers: {reason}")]
pub struct CollocationError {
    pub requested: u32,
    pub feasible: u32,
    pub reason: String,
}

/// Policy controlling how many scaled-instance members share a container.
pub trait CollocationPolicy {
    fn apply(
        &self,
        requested_scale: u32,
        feasible_containers: u32,
    ) -> Result<Collocation, CollocationError>;
}

/// External buffer-size determination for one connection.
///
/// A side is `None` when the connection ends at an external endpoint.
/// `in_hint`/`out_hint` carry the resolved size of a dependency connection
/// when the corresponding port declared a cross-port size source.
pub trait BufferSizer {
    #[allow(clippy::too_many_arguments)]
    fn determine_buffer_size(
        &self,
        in_port: Option<&PortSpec>,
        in_params: &BTreeMap<String, String>,
        in_hint: Option<usize>,
        out_port: Option<&PortSpec>,
        out_params: &BTreeMap<String, String>,
        out_hint: Option<usize>,
    ) -> usize;
}

/// External transport selection for a cross-container connection.
pub trait TransportSelector {
    /// Pick one mutually supported transport, or `None` when the two
    /// capability lists have no workable overlap.
    fn determine_transport(
        &self,
        in_transports: &[String],
        out_transports: &[String],
        in_params: &BTreeMap<String, String>,
        out_params: &BTreeMap<String, String>,
        conn_params: &BTreeMap<String, String>,
    ) -> Option<String>;
}

/// A collocation policy that packs members evenly across the feasible
/// containers, capped at `max_per_container` members each.
#[derive(Debug, Clone, Copy)]
pub struct EvenCollocation {
    pub max_per_container: u32,
}

impl Default for EvenCollocation {
    fn default() -> Self {
        Self { max_per_container: 1 }
    }
}

impl CollocationPolicy for EvenCollocation {
    fn apply(
        &self,
        requested_scale: u32,
        feasible_containers: u32,
    ) -> Result<Collocation, CollocationError> {
        if feasible_containers == 0 {
            return Err(CollocationError {
                requested: requested_scale,
                feasible: 0,
                reason: "no feasible containers".to_string(),
            });
        }
        let per_container = self.max_per_container.max(1);
        let capacity = feasible_containers.saturating_mul(per_container);
        if requested_scale > capacity {
            return Err(CollocationError {
                requested: requested_scale,
                feasible: feasible_containers,
                reason: format!("capacity {capacity} at {per_container} members per container"),
            });
        }
        let containers_used = requested_scale.div_ceil(per_container).max(1);
        let group_size = requested_scale.div_ceil(containers_used);
        Ok(Collocation {
            scale: requested_scale,
            group_size,
            containers_used,
        })
    }
}
