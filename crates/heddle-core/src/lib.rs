//! heddle-core — shared data model for the heddle deployment planner.
//!
//! Everything the planner and launch crates agree on lives here:
//!
//! - `CMap`: a bit set over container ordinals
//! - The assembly data model (instances, connections, candidates,
//!   implementations, deployments, bookings, crews)
//! - Collaborator interfaces (candidate discovery, connectivity checks,
//!   collocation, buffer sizing, transport selection)
//! - `heddle.toml` configuration
//! - The deployment report (export + explicit re-import)
//!
//! # Architecture
//!
//! ```text
//! heddle-core
//!   ├── model    (Instance, Candidate, Implementation, Deployment, Booking)
//!   ├── cmap     (container ordinal bit set)
//!   ├── traits   (interfaces the planner consumes from collaborators)
//!   ├── config   (heddle.toml: placement policy, discovery filter, limits)
//!   └── report   (instance → container/implementation/artifact, re-importable)
//! ```

pub mod cmap;
pub mod config;
pub mod model;
pub mod report;
pub mod traits;

pub use cmap::{CMap, CMapError, Ordinal, CMAP_WIDTH};
pub use config::{HeddleConfig, Limits, PlacementPolicy};
pub use model::*;
pub use report::{DeploymentReport, InstanceReport};
pub use traits::{
    BufferSizer, CandidateSource, Collocation, CollocationError, CollocationPolicy,
    ConnectivityCheck, EvenCollocation, TransportSelector,
};
