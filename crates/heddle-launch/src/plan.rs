//! Launch Plan Builder.
//!
//! Flattens the resolved deployments into concrete launch members (one per
//! crew member), resolves master/slave links between members, and expands
//! assembly-level connections into per-member launch connections,
//! including fan-out/fan-in cross-products and intra-crew loopback meshes.
//! The result is the flat worker list handed to per-container launchers.

use std::collections::BTreeMap;
use std::sync::Arc;

use heddle_core::{
    Assembly, Crew, Deployment, EndpointDecl, Implementation, Ordinal, PortDirection,
    PropertyValue,
};
use heddle_planner::ContainerMap;
use tracing::{debug, info};

use crate::error::{LaunchError, LaunchResult};
use crate::properties::PropertyTable;

/// One end of a launch connection: a port on a concrete member.
#[derive(Debug, Clone)]
pub struct LaunchPort {
    pub member: usize,
    pub port: String,
    /// Parameter overrides visible to sizing and transport selection:
    /// instance-level values overlaid by port-level declarations.
    pub params: BTreeMap<String, String>,
}

/// A connection between an input and output launch port, or between one
/// port and an external placeholder.
#[derive(Debug, Clone)]
pub struct LaunchConnection {
    /// Output side.
    pub out: Option<LaunchPort>,
    /// Input side.
    pub inp: Option<LaunchPort>,
    /// External endpoint name when one side has no member.
    pub external: Option<String>,
    pub params: BTreeMap<String, String>,
    /// Negotiated buffer size, once resolved.
    pub buffer_size: Option<usize>,
    /// Negotiated transport, for cross-container connections.
    pub transport: Option<String>,
    /// Connection whose resolved size the input port waits for.
    pub in_size_dep: Option<usize>,
    /// Connection whose resolved size the output port waits for.
    pub out_size_dep: Option<usize>,
}

impl LaunchConnection {
    fn new(
        out: Option<LaunchPort>,
        inp: Option<LaunchPort>,
        external: Option<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            out,
            inp,
            external,
            params,
            buffer_size: None,
            transport: None,
            in_size_dep: None,
            out_size_dep: None,
        }
    }

    /// Human-readable endpoint summary for diagnostics.
    pub fn describe(&self, members: &[LaunchMember]) -> String {
        let side = |port: &Option<LaunchPort>| {
            port.as_ref()
                .map(|p| format!("{}.{}", members[p.member].name, p.port))
                .or_else(|| self.external.clone())
                .unwrap_or_else(|| "?".to_string())
        };
        format!("{}->{}", side(&self.out), side(&self.inp))
    }
}

/// One concrete worker occurrence after flattening by scale.
#[derive(Debug, Clone)]
pub struct LaunchMember {
    pub name: String,
    pub instance: usize,
    pub member_index: u32,
    pub implementation: Arc<Implementation>,
    /// Index into the plan's crew table.
    pub crew: usize,
    pub container: Ordinal,
    /// Dense slot from the used-container map.
    pub container_slot: usize,
    /// Member index of the resolved master, if this member is a slave.
    pub master: Option<usize>,
    /// Member indices of resolved slaves, in resolution order.
    pub slaves: Vec<usize>,
    /// Set by launchers as the member reaches its running state.
    pub done: bool,
}

/// The flat launch plan handed to the coordinator.
#[derive(Debug)]
pub struct LaunchPlan {
    pub members: Vec<LaunchMember>,
    pub connections: Vec<LaunchConnection>,
    pub crews: Vec<Crew>,
    /// First member index per instance, parallel to `assembly.instances`.
    pub first_member: Vec<usize>,
    properties: PropertyTable,
}

impl LaunchPlan {
    /// Flatten `deployments` into members and expand every assembly
    /// connection. `deployments` must be parallel to `assembly.instances`
    /// and already policy-mapped.
    pub fn build(
        assembly: &Assembly,
        deployments: &[Deployment],
        container_map: &ContainerMap,
    ) -> LaunchResult<Self> {
        let mut members: Vec<LaunchMember> = Vec::new();
        let mut crews = Vec::new();
        let mut first_member = Vec::new();

        for (idx, (decl, dep)) in assembly.instances.iter().zip(deployments).enumerate() {
            first_member.push(members.len());
            let crew = crews.len();
            crews.push(Crew::new(idx, dep.scale, dep.implementation().properties.len()));

            for member_index in 0..dep.scale {
                let implementation = dep.implementations[member_index as usize].clone();
                let container = dep.containers[member_index as usize];
                let container_slot = container_map
                    .slot_of(container)
                    .ok_or(LaunchError::UnmappedContainer { ordinal: container })?;
                let name = if dep.scale == 1 {
                    decl.name.clone()
                } else {
                    format!("{}.{member_index}", decl.name)
                };
                members.push(LaunchMember {
                    name,
                    instance: idx,
                    member_index,
                    implementation,
                    crew,
                    container,
                    container_slot,
                    master: None,
                    slaves: Vec::new(),
                    done: false,
                });
            }
        }

        resolve_slave_links(assembly, deployments, &first_member, &mut members)?;

        let mut connections = Vec::new();
        let member_range = |instance: usize| {
            let start = first_member[instance];
            start..start + deployments[instance].scale as usize
        };

        for conn in &assembly.connections {
            match (&conn.from, &conn.to) {
                (
                    EndpointDecl::Port { instance: oi, port: op },
                    EndpointDecl::Port { instance: ii, port: ip },
                ) => {
                    // Full output-crew × input-crew cross-product.
                    for om in member_range(*oi) {
                        for im in member_range(*ii) {
                            connections.push(LaunchConnection::new(
                                Some(launch_port(assembly, &members, om, op)?),
                                Some(launch_port(assembly, &members, im, ip)?),
                                None,
                                conn.params.clone(),
                            ));
                        }
                    }
                }
                (EndpointDecl::Port { instance, port }, EndpointDecl::External { name }) => {
                    for m in member_range(*instance) {
                        connections.push(LaunchConnection::new(
                            Some(launch_port(assembly, &members, m, port)?),
                            None,
                            Some(name.clone()),
                            conn.params.clone(),
                        ));
                    }
                }
                (EndpointDecl::External { name }, EndpointDecl::Port { instance, port }) => {
                    for m in member_range(*instance) {
                        connections.push(LaunchConnection::new(
                            None,
                            Some(launch_port(assembly, &members, m, port)?),
                            Some(name.clone()),
                            conn.params.clone(),
                        ));
                    }
                }
                (EndpointDecl::External { .. }, EndpointDecl::External { .. }) => {
                    debug!("skipping connection with no instance on either side");
                }
            }
        }

        // Intra-crew loopback meshes for mutually-internal port pairs.
        for (idx, dep) in deployments.iter().enumerate() {
            for port in &dep.implementation().ports {
                let Some(pair) = &port.internal_pair else { continue };
                if port.direction != PortDirection::Output {
                    continue;
                }
                if port.optional && dep.scale == 1 {
                    continue;
                }
                for om in member_range(idx) {
                    for im in member_range(idx) {
                        connections.push(LaunchConnection::new(
                            Some(launch_port(assembly, &members, om, &port.name)?),
                            Some(launch_port(assembly, &members, im, pair)?),
                            None,
                            BTreeMap::new(),
                        ));
                    }
                }
            }
        }

        let properties = PropertyTable::build(deployments);
        info!(
            assembly = %assembly.name,
            members = members.len(),
            connections = connections.len(),
            "launch plan built"
        );

        Ok(Self {
            members,
            connections,
            crews,
            first_member,
            properties,
        })
    }

    /// Members realizing `instance`, in member-index order.
    pub fn members_of(&self, instance: usize) -> &[LaunchMember] {
        let start = self.first_member[instance];
        let crew = &self.crews[self.members[start].crew];
        &self.members[start..start + crew.size as usize]
    }

    /// Read a property value by (instance, property ordinal).
    pub fn property_value(&self, instance: usize, ordinal: u32) -> Option<&PropertyValue> {
        let slot = self.properties.resolve(instance, ordinal)?;
        self.crews[slot.crew].properties.get(slot.index)
    }

    /// Write a property value by (instance, property ordinal).
    ///
    /// Returns false when the pair resolves to no slot.
    pub fn set_property(&mut self, instance: usize, ordinal: u32, value: PropertyValue) -> bool {
        let Some(slot) = self.properties.resolve(instance, ordinal) else {
            return false;
        };
        match self.crews[slot.crew].properties.get_mut(slot.index) {
            Some(entry) => {
                *entry = value;
                true
            }
            None => false,
        }
    }
}

/// Resolve master/slave member links: each slave's worker-type name
/// (configuration qualifier stripped) must match the master's declared
/// slave list at the recorded position.
fn resolve_slave_links(
    assembly: &Assembly,
    deployments: &[Deployment],
    first_member: &[usize],
    members: &mut [LaunchMember],
) -> LaunchResult<()> {
    for (idx, decl) in assembly.instances.iter().enumerate() {
        let Some((master_idx, pos)) = decl.slave_of else {
            continue;
        };
        let master_member = first_member[master_idx];
        let expected = members[master_member]
            .implementation
            .slaves
            .get(pos)
            .cloned()
            .unwrap_or_default();

        let start = first_member[idx];
        let count = deployments[idx].scale as usize;
        for m in start..start + count {
            let actual = members[m].implementation.base_name().to_string();
            if expected != actual {
                return Err(LaunchError::SlaveLinkMismatch {
                    master: assembly.instances[master_idx].name.clone(),
                    slave: members[m].name.clone(),
                    expected,
                    actual,
                });
            }
            members[m].master = Some(master_member);
            members[master_member].slaves.push(m);
        }
    }
    Ok(())
}

/// Build a launch port, validating the port exists on the member's
/// implementation.
fn launch_port(
    assembly: &Assembly,
    members: &[LaunchMember],
    member: usize,
    port: &str,
) -> LaunchResult<LaunchPort> {
    let m = &members[member];
    let spec = m
        .implementation
        .find_port(port)
        .ok_or_else(|| LaunchError::UnknownPort {
            member: m.name.clone(),
            port: port.to_string(),
        })?;

    let mut params = assembly.instances[m.instance].params.clone();
    for (key, value) in &spec.params {
        params.insert(key.clone(), value.clone());
    }
    Ok(LaunchPort {
        member,
        port: spec.name.clone(),
        params,
    })
}
