//! Launch Coordinator.
//!
//! Drives the two-phase distributed launch: per-container application
//! handles first, then every local launcher's launch call (in-process
//! connections settle without a round trip), then the remote launchers,
//! then repeated `work` sweeps until no launcher reports pending
//! negotiation. Any failure tears down everything constructed so far
//! before the error is re-signaled; there is no partial success and no
//! retry at this layer.

use heddle_core::{CMap, Limits, Ordinal};
use tracing::{debug, info, warn};

use crate::error::{LaunchError, LaunchResult};
use crate::plan::{LaunchConnection, LaunchMember};

/// A per-container application handle created at launch time.
pub trait ContainerApp {
    /// Release container-side resources for this application.
    fn shutdown(&mut self);
}

/// Creates per-container application handles. Implemented by the container
/// driver registry.
pub trait ContainerRuntime {
    fn create_app(&self, container: Ordinal, app_name: &str) -> anyhow::Result<Box<dyn ContainerApp>>;
}

/// The collaborator that actually starts workers and negotiates live
/// connections for one or more containers.
pub trait Launcher {
    fn name(&self) -> &str;

    /// Local launchers run before remote ones.
    fn is_local(&self) -> bool;

    /// Start every member this launcher owns and begin connection
    /// negotiation. May block on I/O.
    fn launch(
        &mut self,
        members: &mut [LaunchMember],
        connections: &mut [LaunchConnection],
    ) -> anyhow::Result<()>;

    /// One incremental negotiation round. Returns true while more work is
    /// pending (e.g. waiting on a peer launcher's endpoint exchange).
    fn work(
        &mut self,
        members: &mut [LaunchMember],
        connections: &mut [LaunchConnection],
    ) -> anyhow::Result<bool>;

    /// Release any reservation this launcher holds for the application.
    fn app_shutdown(&mut self);
}

/// A launcher together with the containers it owns.
pub struct LauncherBinding {
    pub launcher: Box<dyn Launcher>,
    pub containers: CMap,
}

/// Coordinator state machine. `Failed` is reachable from every state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPhase {
    Planned,
    LocalLaunching,
    RemoteLaunching,
    Converging,
    Ready,
    Failed { reason: String },
}

/// Everything the launch constructed, returned on success.
pub struct LaunchOutcome {
    /// One application handle per used container, in first-use order.
    pub apps: Vec<(Ordinal, Box<dyn ContainerApp>)>,
    /// Convergence sweeps performed before quiescence.
    pub sweeps: u32,
}

impl std::fmt::Debug for LaunchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchOutcome")
            .field(
                "apps",
                &self.apps.iter().map(|(ord, _)| *ord).collect::<Vec<_>>(),
            )
            .field("sweeps", &self.sweeps)
            .finish()
    }
}

/// Brings every member to running and every connection to connected
/// across all involved launchers.
pub struct LaunchCoordinator<'a> {
    runtime: &'a dyn ContainerRuntime,
    limits: Limits,
    phase: LaunchPhase,
}

impl<'a> LaunchCoordinator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, limits: Limits) -> Self {
        Self {
            runtime,
            limits,
            phase: LaunchPhase::Planned,
        }
    }

    pub fn phase(&self) -> &LaunchPhase {
        &self.phase
    }

    /// Run the launch protocol to quiescence.
    ///
    /// `used` is the set of containers the plan occupies; bindings whose
    /// containers do not intersect it are never touched. On any error all
    /// application handles are shut down and every touched launcher is
    /// notified before the error returns.
    pub fn run(
        &mut self,
        app_name: &str,
        used: &CMap,
        members: &mut [LaunchMember],
        connections: &mut [LaunchConnection],
        bindings: &mut [LauncherBinding],
    ) -> LaunchResult<LaunchOutcome> {
        self.phase = LaunchPhase::Planned;
        let mut apps: Vec<(Ordinal, Box<dyn ContainerApp>)> = Vec::new();
        let mut touched: Vec<usize> = Vec::new();

        match self.try_run(app_name, used, members, connections, bindings, &mut apps, &mut touched)
        {
            Ok(sweeps) => {
                self.phase = LaunchPhase::Ready;
                info!(app = app_name, sweeps, "launch converged");
                Ok(LaunchOutcome { apps, sweeps })
            }
            Err(err) => {
                warn!(app = app_name, error = %err, "launch failed, tearing down");
                for (ordinal, app) in apps.iter_mut() {
                    debug!(container = *ordinal, "shutting down application handle");
                    app.shutdown();
                }
                for &index in &touched {
                    bindings[index].launcher.app_shutdown();
                }
                self.phase = LaunchPhase::Failed { reason: err.to_string() };
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_run(
        &mut self,
        app_name: &str,
        used: &CMap,
        members: &mut [LaunchMember],
        connections: &mut [LaunchConnection],
        bindings: &mut [LauncherBinding],
        apps: &mut Vec<(Ordinal, Box<dyn ContainerApp>)>,
        touched: &mut Vec<usize>,
    ) -> LaunchResult<u32> {
        // One application handle per used container.
        for ordinal in used.iter() {
            let app = self
                .runtime
                .create_app(ordinal, app_name)
                .map_err(|source| LaunchError::AppCreation { container: ordinal, source })?;
            apps.push((ordinal, app));
        }

        // Partition by owning launcher; untouched launchers own no used
        // container.
        let involved: Vec<usize> = (0..bindings.len())
            .filter(|&i| bindings[i].containers.intersects(used))
            .collect();
        let (locals, remotes): (Vec<usize>, Vec<usize>) = involved
            .iter()
            .copied()
            .partition(|&i| bindings[i].launcher.is_local());

        // Local first, so in-process connections settle without a round
        // trip.
        self.phase = LaunchPhase::LocalLaunching;
        for &index in &locals {
            touched.push(index);
            let launcher = &mut bindings[index].launcher;
            debug!(launcher = launcher.name(), "local launch");
            launcher
                .launch(members, connections)
                .map_err(|source| LaunchError::LauncherFailed {
                    launcher: launcher.name().to_string(),
                    source,
                })?;
        }

        self.phase = LaunchPhase::RemoteLaunching;
        for &index in &remotes {
            touched.push(index);
            let launcher = &mut bindings[index].launcher;
            debug!(launcher = launcher.name(), "remote launch");
            launcher
                .launch(members, connections)
                .map_err(|source| LaunchError::LauncherFailed {
                    launcher: launcher.name().to_string(),
                    source,
                })?;
        }

        // Converge: sweep every launcher until a full sweep reports no
        // pending work, bounded by the configured cap.
        self.phase = LaunchPhase::Converging;
        let mut sweeps = 0u32;
        loop {
            if sweeps >= self.limits.convergence_sweeps {
                return Err(LaunchError::ConvergenceOverrun { sweeps });
            }
            sweeps += 1;

            let mut pending = false;
            for &index in touched.iter() {
                let launcher = &mut bindings[index].launcher;
                let more = launcher
                    .work(members, connections)
                    .map_err(|source| LaunchError::LauncherFailed {
                        launcher: launcher.name().to_string(),
                        source,
                    })?;
                pending = pending || more;
            }
            debug!(sweeps, pending, "convergence sweep");
            if !pending {
                return Ok(sweeps);
            }
        }
    }
}
