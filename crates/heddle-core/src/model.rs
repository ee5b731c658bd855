//! Assembly data model.
//!
//! An assembly is a declarative graph of component instances and the
//! connections between their ports. The planner resolves every instance to
//! a `Deployment`: one implementation and one container per member, chosen
//! from the scored `Candidate` list the library resolver produced.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cmap::{CMap, Ordinal};

/// Execution model of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerModel {
    /// A software process.
    Software,
    /// An FPGA fabric.
    Fpga,
    /// A simulator target.
    Simulator,
}

/// An execution context enumerated once by the external registry.
///
/// Containers are referenced everywhere else only by `ordinal`, carried in
/// a [`CMap`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub ordinal: Ordinal,
    pub name: String,
    pub model: ContainerModel,
    /// Transport names this container can terminate, preference-ordered.
    pub transports: Vec<String>,
    /// Ports hosted here are reachable in-process; such connections skip
    /// transport negotiation.
    pub in_process: bool,
    /// The base container is the only one allowed to host proxy masters.
    pub is_base: bool,
}

/// Direction of a worker port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// A port declared by an implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub direction: PortDirection,
    /// Optional ports may stay unconnected.
    #[serde(default)]
    pub optional: bool,
    /// Name of the paired loopback port on the same worker, if this port
    /// is one half of an internal pair.
    #[serde(default)]
    pub internal_pair: Option<String>,
    /// Name of the port on the same member whose connection determines this
    /// port's buffer size. Sizing for this port's connection waits until
    /// that connection has been sized.
    #[serde(default)]
    pub size_source: Option<String>,
    /// Declared buffer parameters consumed by the external sizing function.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A property declared by an implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub ordinal: u32,
}

/// An installed worker variant.
///
/// Worker-type names may carry a build-configuration qualifier after `@`
/// (e.g. `biquad@fixed16`); master/slave matching uses the stripped name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub package: String,
    pub name: String,
    /// Owning artifact image.
    pub artifact: String,
    /// Slot ordinal identifying this implementation within its artifact.
    pub slot: u32,
    pub ports: Vec<PortSpec>,
    pub properties: Vec<PropertySpec>,
    /// Declared slave worker-type names, in proxy-port order. Non-empty
    /// only for a master (proxy) worker.
    #[serde(default)]
    pub slaves: Vec<String>,
}

impl Implementation {
    /// `package.name` including any configuration qualifier.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    /// Worker-type name with any configuration qualifier stripped.
    pub fn base_name(&self) -> &str {
        self.name.split('@').next().unwrap_or(&self.name)
    }

    /// Worker identity used to group candidates of a scaled instance.
    pub fn identity(&self) -> (String, String) {
        (self.package.clone(), self.base_name().to_string())
    }

    pub fn is_master(&self) -> bool {
        !self.slaves.is_empty()
    }

    pub fn find_port(&self, name: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// A scored (implementation, artifact) option for one instance's spec.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub implementation: Arc<Implementation>,
    /// Opaque non-negative score; higher is preferred.
    pub score: u32,
    /// Bound to a fixed pre-placed slot inside its artifact image; cannot
    /// be freely relocated and books the hosting container.
    pub is_static: bool,
}

/// One assembly-declared component occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub name: String,
    /// Component spec name handed to candidate discovery.
    pub spec: String,
    /// Member count; 1 = unscaled.
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Set when this instance is the slave of another instance:
    /// (master instance index, position in the master's declared slave list).
    #[serde(default)]
    pub slave_of: Option<(usize, usize)>,
    /// Instance-level parameter overrides (sizing, transport).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_scale() -> u32 {
    1
}

/// One side of an assembly connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointDecl {
    /// A port on an assembly instance.
    Port { instance: usize, port: String },
    /// An external endpoint with no instance on this side.
    External { name: String },
}

impl EndpointDecl {
    pub fn instance(&self) -> Option<usize> {
        match self {
            EndpointDecl::Port { instance, .. } => Some(*instance),
            EndpointDecl::External { .. } => None,
        }
    }
}

/// An assembly-level connection from an output endpoint to an input one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDecl {
    /// Output side.
    pub from: EndpointDecl,
    /// Input side.
    pub to: EndpointDecl,
    /// Connection-level parameter overrides.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// The declarative graph handed to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub instances: Vec<InstanceDecl>,
    pub connections: Vec<ConnectionDecl>,
}

impl Assembly {
    /// Indices of instances connected to `instance` by at least one
    /// assembly connection.
    pub fn neighbors(&self, instance: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for conn in &self.connections {
            match (conn.from.instance(), conn.to.instance()) {
                (Some(a), Some(b)) if a == instance && !out.contains(&b) => out.push(b),
                (Some(a), Some(b)) if b == instance && !out.contains(&a) => out.push(a),
                _ => {}
            }
        }
        out
    }
}

/// The resolved outcome for one instance.
///
/// Mutated only during search; snapshotted wholesale into the best-known
/// assignment when a full assignment strictly beats the previous best.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Member count; 1 = unscaled.
    pub scale: u32,
    /// One container ordinal per member.
    pub containers: Vec<Ordinal>,
    /// One implementation per member.
    pub implementations: Vec<Arc<Implementation>>,
    /// Feasible-container map of the winning candidate.
    pub feasible: CMap,
    /// The winning candidate occupied a fixed pre-placed slot.
    pub is_static: bool,
    /// The winning candidate's score contribution.
    pub score: u32,
}

impl Deployment {
    /// An unscaled deployment on a single container.
    pub fn unscaled(
        container: Ordinal,
        implementation: Arc<Implementation>,
        feasible: CMap,
        is_static: bool,
        score: u32,
    ) -> Self {
        Self {
            scale: 1,
            containers: vec![container],
            implementations: vec![implementation],
            feasible,
            is_static,
            score,
        }
    }

    pub fn implementation(&self) -> &Arc<Implementation> {
        &self.implementations[0]
    }
}

/// Per-container exclusivity record.
///
/// A container bound by a static candidate to one artifact may not later be
/// bound to a different artifact, and no pre-placed worker slot may be
/// claimed twice. Scoped to the search: callers snapshot the value before
/// mutating and restore the snapshot on backtrack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Booking {
    /// Artifact this container is bound to, if any.
    pub artifact: Option<String>,
    /// Bitmask of implementation slot ordinals already claimed.
    pub used_slots: u64,
}

impl Booking {
    /// Whether a static candidate in `artifact` at `slot` may book here.
    pub fn admits(&self, artifact: &str, slot: u32) -> bool {
        if let Some(bound) = &self.artifact
            && bound != artifact
        {
            return false;
        }
        slot >= 64 || self.used_slots & (1u64 << slot) == 0
    }

    /// Record a static candidate's claim.
    pub fn claim(&mut self, artifact: &str, slot: u32) {
        self.artifact = Some(artifact.to_string());
        if slot < 64 {
            self.used_slots |= 1u64 << slot;
        }
    }
}

/// A runtime property value slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    #[default]
    Unset,
    Bool(bool),
    Long(i64),
    ULong(u64),
    Double(f64),
    String(String),
}

/// Shared state for all members of a scaled instance.
#[derive(Debug, Clone)]
pub struct Crew {
    pub instance: usize,
    pub size: u32,
    /// Shared property-value buffers, indexed by property ordinal position
    /// in the implementation's declared property list.
    pub properties: Vec<PropertyValue>,
}

impl Crew {
    pub fn new(instance: usize, size: u32, property_count: usize) -> Self {
        Self {
            instance,
            size,
            properties: vec![PropertyValue::Unset; property_count],
        }
    }
}
