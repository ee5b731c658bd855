//! heddle-launch — from resolved deployments to running workers.
//!
//! Consumes the planner's per-instance deployments and drives everything
//! that happens after placement:
//!
//! - Launch Plan Builder: flatten instances into members, resolve
//!   master/slave links, expand connections (fan cross-products,
//!   externals, intra-crew loopback meshes)
//! - Negotiation: per-connection buffer sizes (bounded fixed point) and
//!   transports (cross-container only)
//! - Launch Coordinator: per-container app handles, local-then-remote
//!   launch, convergence sweeps, all-or-nothing teardown
//!
//! # Architecture
//!
//! ```text
//! Vec<Deployment> ──► LaunchPlan (members, connections, crews)
//!                         │  negotiate_buffers / negotiate_transports
//!                         ▼
//!                  LaunchCoordinator ──► Launcher (local/remote)
//!                         │                  └── work() until quiescent
//!                         └── ContainerRuntime (one app per container)
//! ```

pub mod coordinator;
pub mod error;
pub mod negotiate;
pub mod plan;
pub mod properties;

pub use coordinator::{
    ContainerApp, ContainerRuntime, LaunchCoordinator, LaunchOutcome, LaunchPhase, Launcher,
    LauncherBinding,
};
pub use error::{LaunchError, LaunchResult};
pub use plan::{LaunchConnection, LaunchMember, LaunchPlan, LaunchPort};
pub use properties::{PropertySlot, PropertyTable};
