//! heddle-planner — deployment planning for component assemblies.
//!
//! Turns an assembly (instances + connections) and a candidate source into
//! one `Deployment` per instance:
//!
//! - Candidate Index: per instance, the scored (implementation,
//!   feasible-container map) pairs
//! - Deployment Search: exhaustive backtracking over candidates and
//!   containers, maximizing total score under connectivity, master/slave
//!   and artifact-exclusivity constraints
//! - Container Policy Mapper: concrete container assignment for instances
//!   the search left free, under a configured placement policy
//! - Explicit import: a saved deployment report re-resolved without search
//!
//! # Architecture
//!
//! ```text
//! CandidateIndex ──► DeploymentSearch ──► PolicyMapper ──► Vec<Deployment>
//!        ▲                                                       ▲
//!        └── CandidateSource (library resolver)   DeploymentReport (import)
//! ```

pub mod candidates;
pub mod error;
pub mod import;
pub mod policy;
pub mod search;

pub use candidates::{CandidateIndex, InstanceCandidates, ScoredCandidate};
pub use error::{PlanError, PlanResult, RejectReason, Rejection, RejectionList};
pub use import::import_deployment;
pub use policy::{ContainerMap, PolicyMapper};
pub use search::{DeploymentSearch, SearchResult};
