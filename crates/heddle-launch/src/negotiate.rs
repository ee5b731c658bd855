//! Connection negotiation.
//!
//! Buffer sizes resolve as a bounded fixed point: connections without a
//! cross-port size dependency are sized immediately, the rest wait until
//! every connection they depend on is sized, and a full scan with no
//! progress means a circular reference and fails explicitly rather than
//! spinning. Transports are negotiated only for cross-container
//! connections where neither side is in-process.

use std::collections::BTreeMap;

use heddle_core::{BufferSizer, Container, Limits, PortSpec, TransportSelector};
use tracing::{debug, info};

use crate::error::{LaunchError, LaunchResult};
use crate::plan::{LaunchConnection, LaunchPlan, LaunchPort};

impl LaunchPlan {
    /// Resolve every connection's buffer size.
    ///
    /// Pass 1 wires up cross-port size dependencies (a port naming a
    /// source with no attached connection is a fatal configuration error)
    /// and sizes the dependency-free connections. Pass 2 sweeps the
    /// remainder until done, deadlocked, or past the iteration cap.
    pub fn negotiate_buffers(
        &mut self,
        sizer: &dyn BufferSizer,
        limits: &Limits,
    ) -> LaunchResult<()> {
        let mut deps = Vec::with_capacity(self.connections.len());
        for conn in &self.connections {
            let in_dep = self.size_dep_for(conn.inp.as_ref())?;
            let out_dep = self.size_dep_for(conn.out.as_ref())?;
            deps.push((in_dep, out_dep));
        }
        for (i, (in_dep, out_dep)) in deps.into_iter().enumerate() {
            self.connections[i].in_size_dep = in_dep;
            self.connections[i].out_size_dep = out_dep;
        }

        let mut immediate = Vec::new();
        for (i, conn) in self.connections.iter().enumerate() {
            if conn.in_size_dep.is_none() && conn.out_size_dep.is_none() {
                immediate.push((i, self.size_connection(conn, None, None, sizer)));
            }
        }
        let sized_immediately = immediate.len();
        for (i, size) in immediate {
            self.connections[i].buffer_size = Some(size);
        }
        debug!(sized = sized_immediately, total = self.connections.len(), "sized dependency-free connections");

        let mut iterations = 0u32;
        loop {
            if self.connections.iter().all(|c| c.buffer_size.is_some()) {
                info!(connections = self.connections.len(), iterations, "buffer sizes settled");
                return Ok(());
            }
            if iterations >= limits.sizing_iterations {
                return Err(LaunchError::NegotiationOverrun { iterations });
            }
            iterations += 1;

            // Resolutions apply after the scan, so a dependency sized in
            // this sweep becomes visible in the next one.
            let mut resolved = Vec::new();
            for (i, conn) in self.connections.iter().enumerate() {
                if conn.buffer_size.is_some() {
                    continue;
                }
                let in_hint = conn.in_size_dep.map(|d| self.connections[d].buffer_size);
                let out_hint = conn.out_size_dep.map(|d| self.connections[d].buffer_size);
                if in_hint == Some(None) || out_hint == Some(None) {
                    continue; // a dependency is still unsized
                }
                let size =
                    self.size_connection(conn, in_hint.flatten(), out_hint.flatten(), sizer);
                resolved.push((i, size));
            }

            if resolved.is_empty() {
                let remaining: Vec<String> = self
                    .connections
                    .iter()
                    .filter(|c| c.buffer_size.is_none())
                    .map(|c| c.describe(&self.members))
                    .collect();
                return Err(LaunchError::NegotiationDeadlock { remaining });
            }
            for (i, size) in resolved {
                self.connections[i].buffer_size = Some(size);
            }
        }
    }

    /// Pick a transport for every cross-container connection whose two
    /// containers both host ports out-of-process.
    pub fn negotiate_transports(
        &mut self,
        containers: &[Container],
        selector: &dyn TransportSelector,
    ) -> LaunchResult<()> {
        let mut picks = Vec::new();
        for (i, conn) in self.connections.iter().enumerate() {
            let (Some(out), Some(inp)) = (&conn.out, &conn.inp) else {
                continue;
            };
            let out_ordinal = self.members[out.member].container;
            let in_ordinal = self.members[inp.member].container;
            if out_ordinal == in_ordinal {
                continue; // collocated, nothing to negotiate
            }
            let (Some(out_container), Some(in_container)) = (
                containers.get(out_ordinal as usize),
                containers.get(in_ordinal as usize),
            ) else {
                continue;
            };
            if out_container.in_process || in_container.in_process {
                continue;
            }

            match selector.determine_transport(
                &in_container.transports,
                &out_container.transports,
                &inp.params,
                &out.params,
                &conn.params,
            ) {
                Some(transport) => {
                    debug!(
                        connection = %conn.describe(&self.members),
                        transport = %transport,
                        "transport selected"
                    );
                    picks.push((i, transport));
                }
                None => {
                    return Err(LaunchError::NoCommonTransport {
                        out_container: out_container.name.clone(),
                        in_container: in_container.name.clone(),
                    });
                }
            }
        }
        for (i, transport) in picks {
            self.connections[i].transport = Some(transport);
        }
        Ok(())
    }

    /// Dependency of one connection side: the connection feeding or
    /// draining the size-source port on the same member.
    fn size_dep_for(&self, port: Option<&LaunchPort>) -> LaunchResult<Option<usize>> {
        let Some(port) = port else {
            return Ok(None);
        };
        let spec = self.port_spec(port)?;
        let Some(source) = &spec.size_source else {
            return Ok(None);
        };

        let attached = |p: &LaunchPort| p.member == port.member && p.port == *source;
        let dep = self.connections.iter().position(|c| {
            c.out.as_ref().is_some_and(&attached) || c.inp.as_ref().is_some_and(&attached)
        });
        match dep {
            Some(index) => Ok(Some(index)),
            None => Err(LaunchError::MissingSizeSource {
                member: self.members[port.member].name.clone(),
                port: port.port.clone(),
                size_source: source.clone(),
            }),
        }
    }

    fn size_connection(
        &self,
        conn: &LaunchConnection,
        in_hint: Option<usize>,
        out_hint: Option<usize>,
        sizer: &dyn BufferSizer,
    ) -> usize {
        let empty = BTreeMap::new();
        let in_spec = conn
            .inp
            .as_ref()
            .and_then(|p| self.members[p.member].implementation.find_port(&p.port));
        let out_spec = conn
            .out
            .as_ref()
            .and_then(|p| self.members[p.member].implementation.find_port(&p.port));
        let in_params = conn.inp.as_ref().map_or(&empty, |p| &p.params);
        let out_params = conn.out.as_ref().map_or(&empty, |p| &p.params);

        sizer.determine_buffer_size(in_spec, in_params, in_hint, out_spec, out_params, out_hint)
    }

    fn port_spec(&self, port: &LaunchPort) -> LaunchResult<&PortSpec> {
        self.members[port.member]
            .implementation
            .find_port(&port.port)
            .ok_or_else(|| LaunchError::UnknownPort {
                member: self.members[port.member].name.clone(),
                port: port.port.clone(),
            })
    }
}
