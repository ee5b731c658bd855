//! Deployment Search.
//!
//! Exhaustive depth-first search over instance index, left to right. For
//! every instance it tries each candidate in declared order and each
//! feasible container, rejecting on hard constraints only (connectivity,
//! master/slave pairing, artifact exclusivity); there is no pruning or
//! branch-and-bound. A completed assignment replaces the best-known one
//! only when its total score is strictly greater, so among equally scoring
//! assignments the first one found in enumeration order wins.
//!
//! Booking mutations are rolled back with value-copy snapshots pushed onto
//! an explicit stack before each recursion and restored unconditionally
//! after it returns, including on the error path.

use heddle_core::{
    Assembly, Booking, CMap, CollocationPolicy, ConnectivityCheck, Container, Deployment,
    EndpointDecl, Ordinal,
};
use tracing::{debug, info, trace};

use crate::candidates::{CandidateIndex, ScoredCandidate};
use crate::error::{PlanError, PlanResult, RejectReason, Rejection, RejectionList};

/// A complete constraint-satisfying assignment and its total score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: u64,
    /// One deployment per instance, parallel to `assembly.instances`.
    pub assignment: Vec<Deployment>,
}

/// Mutable state threaded through the recursion.
///
/// Owned by one `run` call; the search is re-entrant across calls.
struct SearchCtx {
    current: Vec<Option<Deployment>>,
    /// Indexed by container ordinal.
    bookings: Vec<Booking>,
    /// Snapshots pushed before a static candidate mutates a booking.
    booking_stack: Vec<(Ordinal, Booking)>,
    best: Option<SearchResult>,
    rejections: Vec<Rejection>,
}

/// The exhaustive container/implementation placement search.
///
/// `containers` is the registry's enumeration; ordinals are dense indices
/// into it.
pub struct DeploymentSearch<'a> {
    assembly: &'a Assembly,
    index: &'a CandidateIndex,
    containers: &'a [Container],
    connectivity: &'a dyn ConnectivityCheck,
    collocation: &'a dyn CollocationPolicy,
}

impl<'a> DeploymentSearch<'a> {
    pub fn new(
        assembly: &'a Assembly,
        index: &'a CandidateIndex,
        containers: &'a [Container],
        connectivity: &'a dyn ConnectivityCheck,
        collocation: &'a dyn CollocationPolicy,
    ) -> Self {
        debug_assert!(
            containers.iter().enumerate().all(|(i, c)| c.ordinal as usize == i),
            "container ordinals must be dense registry indices"
        );
        Self {
            assembly,
            index,
            containers,
            connectivity,
            collocation,
        }
    }

    /// Run the search to completion.
    ///
    /// Returns the maximum-score assignment, or `NoFeasibleDeployment`
    /// (with every recorded rejection) when no constraint-satisfying
    /// assignment with a positive score exists.
    pub fn run(&self) -> PlanResult<SearchResult> {
        let mut ctx = SearchCtx {
            current: vec![None; self.assembly.instances.len()],
            bookings: vec![Booking::default(); self.containers.len()],
            booking_stack: Vec::new(),
            best: None,
            rejections: self.index.all_rejections(),
        };

        self.descend(&mut ctx, 0)?;

        match ctx.best {
            Some(best) if best.score > 0 => {
                info!(
                    assembly = %self.assembly.name,
                    score = best.score,
                    "search complete"
                );
                Ok(best)
            }
            _ => Err(PlanError::NoFeasibleDeployment {
                rejections: RejectionList(ctx.rejections),
            }),
        }
    }

    fn descend(&self, ctx: &mut SearchCtx, idx: usize) -> PlanResult<()> {
        if idx == self.assembly.instances.len() {
            self.complete(ctx);
            return Ok(());
        }
        if self.assembly.instances[idx].scale > 1 {
            self.descend_scaled(ctx, idx)
        } else {
            self.descend_unscaled(ctx, idx)
        }
    }

    fn descend_unscaled(&self, ctx: &mut SearchCtx, idx: usize) -> PlanResult<()> {
        for sc in &self.index.per_instance[idx].candidates {
            if !self.connections_ok(ctx, idx, sc) {
                continue;
            }
            let is_master = sc.candidate.implementation.is_master();
            for ordinal in sc.feasible.iter() {
                let Some(container) = self.containers.get(ordinal as usize) else {
                    continue;
                };
                // Proxy masters run only on the base container.
                if is_master && !container.is_base {
                    trace!(
                        instance = %self.assembly.instances[idx].name,
                        container = ordinal,
                        "skipping non-base container for master"
                    );
                    continue;
                }
                if !self.booking_ok(ctx, idx, ordinal, sc) {
                    continue;
                }
                self.deploy_instance(ctx, idx, sc, ordinal)?;
            }
        }
        Ok(())
    }

    /// Scaled instances: group candidates by worker identity, union the
    /// feasible maps, let the collocation policy size the groups, then
    /// spread consecutive members over the feasible containers.
    fn descend_scaled(&self, ctx: &mut SearchCtx, idx: usize) -> PlanResult<()> {
        let decl = &self.assembly.instances[idx];

        let mut groups: Vec<((String, String), Vec<&ScoredCandidate>)> = Vec::new();
        for sc in &self.index.per_instance[idx].candidates {
            let identity = sc.candidate.implementation.identity();
            match groups.iter_mut().find(|(id, _)| *id == identity) {
                Some((_, members)) => members.push(sc),
                None => groups.push((identity, vec![sc])),
            }
        }

        for (_, group) in &groups {
            if !self.connections_ok(ctx, idx, group[0]) {
                continue;
            }

            let feasible = group
                .iter()
                .fold(CMap::EMPTY, |acc, sc| acc.union(&sc.feasible));
            let collocation = self.collocation.apply(decl.scale, feasible.len())?;

            let ordinals: Vec<Ordinal> = feasible
                .iter()
                .take(collocation.containers_used as usize)
                .collect();
            let group_size = collocation.group_size.max(1);

            let mut containers = Vec::with_capacity(collocation.scale as usize);
            let mut implementations = Vec::with_capacity(collocation.scale as usize);
            let mut placeable = true;
            for member in 0..collocation.scale {
                let Some(&ordinal) = ordinals.get((member / group_size) as usize) else {
                    placeable = false;
                    break;
                };
                // Each member needs an implementation feasible on its container.
                let Some(implementation) = group
                    .iter()
                    .find(|sc| sc.feasible.contains(ordinal))
                    .map(|sc| sc.candidate.implementation.clone())
                else {
                    placeable = false;
                    break;
                };
                containers.push(ordinal);
                implementations.push(implementation);
            }
            if !placeable {
                continue;
            }

            let score = group.iter().map(|sc| sc.candidate.score).max().unwrap_or(0);
            debug!(
                instance = %decl.name,
                scale = collocation.scale,
                containers_used = collocation.containers_used,
                group_size,
                "placed scaled instance"
            );

            ctx.current[idx] = Some(Deployment {
                scale: collocation.scale,
                containers,
                implementations,
                feasible,
                is_static: false,
                score,
            });
            let result = self.descend(ctx, idx + 1);
            ctx.current[idx] = None;
            result?;
        }
        Ok(())
    }

    /// Check `sc` against every already-assigned lower-index instance:
    /// external connectivity on shared connections, and master/slave
    /// worker-type pairing at the recorded slave-list position.
    fn connections_ok(&self, ctx: &mut SearchCtx, idx: usize, sc: &ScoredCandidate) -> bool {
        let decl = &self.assembly.instances[idx];
        let imp = &sc.candidate.implementation;

        for conn in &self.assembly.connections {
            let (Some(from), Some(to)) = (conn.from.instance(), conn.to.instance()) else {
                continue;
            };
            let (this_is_from, other) = if from == idx && to < idx {
                (true, to)
            } else if to == idx && from < idx {
                (false, from)
            } else {
                continue;
            };
            let Some(other_dep) = &ctx.current[other] else {
                continue;
            };
            let other_imp = other_dep.implementation().clone();
            let EndpointDecl::Port { port, .. } = &conn.from else {
                continue;
            };

            let ok = if this_is_from {
                self.connectivity.is_connection_compatible(imp, &other_imp, port)
            } else {
                self.connectivity.is_connection_compatible(&other_imp, imp, port)
            };
            if !ok {
                let neighbor = self.assembly.instances[other].name.clone();
                debug!(
                    instance = %decl.name,
                    implementation = %imp.qualified_name(),
                    neighbor = %neighbor,
                    port = %port,
                    "connectivity check rejected candidate"
                );
                ctx.rejections.push(Rejection {
                    instance: decl.name.clone(),
                    implementation: imp.qualified_name(),
                    reason: RejectReason::Connectivity {
                        neighbor,
                        port: port.clone(),
                    },
                });
                return false;
            }
        }

        // This instance is the declared slave of an already-assigned master.
        if let Some((master, pos)) = decl.slave_of
            && master < idx
            && let Some(master_dep) = &ctx.current[master]
        {
            let expected = master_dep
                .implementation()
                .slaves
                .get(pos)
                .cloned()
                .unwrap_or_default();
            if expected != imp.base_name() {
                ctx.rejections.push(Rejection {
                    instance: decl.name.clone(),
                    implementation: imp.qualified_name(),
                    reason: RejectReason::SlaveMismatch {
                        master: self.assembly.instances[master].name.clone(),
                        expected,
                        actual: imp.base_name().to_string(),
                    },
                });
                return false;
            }
        }

        // An already-assigned lower instance is a declared slave of this one.
        for (other, other_decl) in self.assembly.instances.iter().enumerate().take(idx) {
            if let Some((master, pos)) = other_decl.slave_of
                && master == idx
                && let Some(other_dep) = &ctx.current[other]
            {
                let actual = other_dep.implementation().base_name().to_string();
                let expected = imp.slaves.get(pos).cloned().unwrap_or_default();
                if expected != actual {
                    ctx.rejections.push(Rejection {
                        instance: decl.name.clone(),
                        implementation: imp.qualified_name(),
                        reason: RejectReason::SlaveMismatch {
                            master: decl.name.clone(),
                            expected,
                            actual,
                        },
                    });
                    return false;
                }
            }
        }

        true
    }

    /// Exclusivity: a container booked to one artifact rejects candidates
    /// from any other artifact, and a claimed pre-placed slot rejects a
    /// second claim.
    fn booking_ok(
        &self,
        ctx: &mut SearchCtx,
        idx: usize,
        ordinal: Ordinal,
        sc: &ScoredCandidate,
    ) -> bool {
        let imp = &sc.candidate.implementation;
        let booking = &ctx.bookings[ordinal as usize];

        if let Some(bound) = &booking.artifact
            && *bound != imp.artifact
        {
            let bound = bound.clone();
            ctx.rejections.push(Rejection {
                instance: self.assembly.instances[idx].name.clone(),
                implementation: imp.qualified_name(),
                reason: RejectReason::ArtifactConflict {
                    container: ordinal,
                    bound,
                },
            });
            return false;
        }

        if imp.slot < 64 && ctx.bookings[ordinal as usize].used_slots & (1u64 << imp.slot) != 0 {
            ctx.rejections.push(Rejection {
                instance: self.assembly.instances[idx].name.clone(),
                implementation: imp.qualified_name(),
                reason: RejectReason::SlotConflict {
                    container: ordinal,
                    slot: imp.slot,
                },
            });
            return false;
        }

        true
    }

    /// Commit one choice and recurse. A static candidate books its
    /// container for the duration of the subtree; the prior booking value
    /// is restored whether or not the subtree succeeded.
    fn deploy_instance(
        &self,
        ctx: &mut SearchCtx,
        idx: usize,
        sc: &ScoredCandidate,
        ordinal: Ordinal,
    ) -> PlanResult<()> {
        let imp = sc.candidate.implementation.clone();
        trace!(
            instance = %self.assembly.instances[idx].name,
            implementation = %imp.qualified_name(),
            container = ordinal,
            "trying placement"
        );

        ctx.current[idx] = Some(Deployment::unscaled(
            ordinal,
            imp.clone(),
            sc.feasible,
            sc.candidate.is_static,
            sc.candidate.score,
        ));

        let booked = sc.candidate.is_static;
        if booked {
            let prev = ctx.bookings[ordinal as usize].clone();
            ctx.booking_stack.push((ordinal, prev));
            ctx.bookings[ordinal as usize].claim(&imp.artifact, imp.slot);
        }

        let result = self.descend(ctx, idx + 1);

        if booked {
            if let Some((o, prev)) = ctx.booking_stack.pop() {
                ctx.bookings[o as usize] = prev;
            }
        }
        ctx.current[idx] = None;
        result
    }

    /// A full assignment is complete; keep it only if strictly better.
    fn complete(&self, ctx: &mut SearchCtx) {
        let score: u64 = ctx.current.iter().flatten().map(|d| u64::from(d.score)).sum();
        let improved = ctx.best.as_ref().is_none_or(|best| score > best.score);
        if !improved {
            trace!(score, "complete assignment does not beat best");
            return;
        }
        info!(assembly = %self.assembly.name, score, "new best deployment");
        ctx.best = Some(SearchResult {
            score,
            assignment: ctx.current.iter().flatten().cloned().collect(),
        });
    }
}
