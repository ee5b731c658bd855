//! Planner error types and rejection diagnostics.

use heddle_core::{CMapError, CollocationError, Ordinal};
use thiserror::Error;

/// Why a candidate or container was rejected during indexing or search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No container can host any candidate of the instance.
    NoFeasibleContainer,
    /// The external connectivity check refused the pairing.
    Connectivity { neighbor: String, port: String },
    /// A master/slave worker-type name did not match at the recorded
    /// position.
    SlaveMismatch {
        master: String,
        expected: String,
        actual: String,
    },
    /// The container is booked to a different artifact.
    ArtifactConflict { container: Ordinal, bound: String },
    /// The pre-placed worker slot is already claimed on that container.
    SlotConflict { container: Ordinal, slot: u32 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoFeasibleContainer => write!(f, "no feasible container"),
            RejectReason::Connectivity { neighbor, port } => {
                write!(f, "incompatible with {neighbor} on port {port}")
            }
            RejectReason::SlaveMismatch {
                master,
                expected,
                actual,
            } => write!(
                f,
                "slave of {master} expects worker {expected}, candidate is {actual}"
            ),
            RejectReason::ArtifactConflict { container, bound } => {
                write!(f, "container {container} already bound to artifact {bound}")
            }
            RejectReason::SlotConflict { container, slot } => {
                write!(f, "slot {slot} already claimed on container {container}")
            }
        }
    }
}

/// One rejected candidate, with the instance and implementation involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub instance: String,
    pub implementation: String,
    pub reason: RejectReason,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.instance, self.implementation, self.reason)
    }
}

/// A printable list of rejections carried inside errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectionList(pub Vec<Rejection>);

impl std::fmt::Display for RejectionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "none recorded");
        }
        for (i, rejection) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{rejection}")?;
        }
        Ok(())
    }
}

/// Errors from candidate indexing, search, policy mapping, and import.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("instance {instance} has no candidate with a feasible container: {rejections}")]
    InfeasibleInstance {
        instance: String,
        rejections: RejectionList,
    },

    #[error("no feasible deployment under the given constraints: {rejections}")]
    NoFeasibleDeployment { rejections: RejectionList },

    #[error("collocation failed: {0}")]
    Collocation(#[from] CollocationError),

    #[error(transparent)]
    CMap(#[from] CMapError),

    #[error("deployment report names unknown instance: {instance}")]
    ImportUnknownInstance { instance: String },

    #[error(
        "deployment report for instance {instance} names implementation \
         {implementation} in artifact {artifact}, which the library no longer offers"
    )]
    ImportUnresolved {
        instance: String,
        implementation: String,
        artifact: String,
    },

    #[error("imported container {container} is not feasible for instance {instance}")]
    ImportInfeasible {
        instance: String,
        container: Ordinal,
    },
}

pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_list_formats_each_entry() {
        let list = RejectionList(vec![
            Rejection {
                instance: "src".to_string(),
                implementation: "dsp.gen".to_string(),
                reason: RejectReason::NoFeasibleContainer,
            },
            Rejection {
                instance: "sink".to_string(),
                implementation: "dsp.cap".to_string(),
                reason: RejectReason::SlotConflict {
                    container: 2,
                    slot: 1,
                },
            },
        ]);

        let text = list.to_string();
        assert!(text.contains("src (dsp.gen): no feasible container"));
        assert!(text.contains("slot 1 already claimed on container 2"));
    }

    #[test]
    fn empty_rejection_list_is_explicit() {
        assert_eq!(RejectionList::default().to_string(), "none recorded");
    }

    #[test]
    fn infeasible_instance_message_names_instance() {
        let err = PlanError::InfeasibleInstance {
            instance: "filter".to_string(),
            rejections: RejectionList::default(),
        };
        assert!(err.to_string().contains("filter"));
    }
}
