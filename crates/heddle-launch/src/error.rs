//! Launch error types.

use heddle_core::Ordinal;
use thiserror::Error;

/// Errors from plan building, negotiation, and the launch protocol.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("member {member} references unknown port {port}")]
    UnknownPort { member: String, port: String },

    #[error("container {ordinal} was never recorded in the used-container map")]
    UnmappedContainer { ordinal: Ordinal },

    #[error(
        "slave {slave} does not satisfy master {master}: expected worker {expected}, got {actual}"
    )]
    SlaveLinkMismatch {
        master: String,
        slave: String,
        expected: String,
        actual: String,
    },

    #[error(
        "port {port} on member {member} declares buffer-size source {size_source}, \
         but no connection attaches to that port"
    )]
    MissingSizeSource {
        member: String,
        port: String,
        size_source: String,
    },

    #[error(
        "buffer-size negotiation made no progress with {} connection(s) unsized: {}",
        remaining.len(),
        remaining.join(", ")
    )]
    NegotiationDeadlock { remaining: Vec<String> },

    #[error("buffer-size negotiation exceeded {iterations} iterations")]
    NegotiationOverrun { iterations: u32 },

    #[error("no transport shared between containers {out_container} and {in_container}")]
    NoCommonTransport {
        out_container: String,
        in_container: String,
    },

    #[error("failed to create application handle on container {container}")]
    AppCreation {
        container: Ordinal,
        #[source]
        source: anyhow::Error,
    },

    #[error("launcher {launcher} failed")]
    LauncherFailed {
        launcher: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("launch convergence did not settle within {sweeps} sweeps")]
    ConvergenceOverrun { sweeps: u32 },
}

pub type LaunchResult<T> = Result<T, LaunchError>;
