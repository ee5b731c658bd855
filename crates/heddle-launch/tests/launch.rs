//! End-to-end: candidate index → search → policy mapping → launch plan →
//! negotiation → coordinated launch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use heddle_core::{
    Assembly, BufferSizer, CMap, Candidate, CandidateSource, ConnectionDecl, ConnectivityCheck,
    Container, ContainerModel, EndpointDecl, EvenCollocation, Implementation, InstanceDecl,
    Limits, Ordinal, PlacementPolicy, PortDirection, PortSpec, TransportSelector,
};
use heddle_launch::{
    ContainerApp, ContainerRuntime, LaunchConnection, LaunchCoordinator, LaunchMember,
    LaunchPhase, LaunchPlan, Launcher, LauncherBinding,
};
use heddle_planner::{CandidateIndex, DeploymentSearch, PolicyMapper};

struct TableSource {
    candidates: HashMap<String, Vec<Candidate>>,
    feasible: HashMap<String, CMap>,
}

impl CandidateSource for TableSource {
    fn find_candidates(&self, spec: &str) -> Vec<Candidate> {
        self.candidates.get(spec).cloned().unwrap_or_default()
    }

    fn find_feasible_containers(
        &self,
        implementation: &Implementation,
        _filter: Option<&str>,
    ) -> CMap {
        self.feasible
            .get(&implementation.name)
            .copied()
            .unwrap_or(CMap::EMPTY)
    }
}

struct AlwaysCompatible;

impl ConnectivityCheck for AlwaysCompatible {
    fn is_connection_compatible(
        &self,
        _from: &Implementation,
        _to: &Implementation,
        _port: &str,
    ) -> bool {
        true
    }
}

struct DefaultSizer;

impl BufferSizer for DefaultSizer {
    fn determine_buffer_size(
        &self,
        _in_port: Option<&PortSpec>,
        _in_params: &BTreeMap<String, String>,
        in_hint: Option<usize>,
        _out_port: Option<&PortSpec>,
        _out_params: &BTreeMap<String, String>,
        out_hint: Option<usize>,
    ) -> usize {
        in_hint.or(out_hint).unwrap_or(4096)
    }
}

struct FirstCommonSelector;

impl TransportSelector for FirstCommonSelector {
    fn determine_transport(
        &self,
        in_transports: &[String],
        out_transports: &[String],
        _in_params: &BTreeMap<String, String>,
        _out_params: &BTreeMap<String, String>,
        _conn_params: &BTreeMap<String, String>,
    ) -> Option<String> {
        out_transports
            .iter()
            .find(|t| in_transports.contains(t))
            .cloned()
    }
}

struct NullApp;

impl ContainerApp for NullApp {
    fn shutdown(&mut self) {}
}

struct NullRuntime;

impl ContainerRuntime for NullRuntime {
    fn create_app(
        &self,
        _container: Ordinal,
        _app_name: &str,
    ) -> anyhow::Result<Box<dyn ContainerApp>> {
        Ok(Box::new(NullApp))
    }
}

/// Marks every owned member done on launch; quiesces immediately.
struct MarkingLauncher {
    name: String,
    local: bool,
    containers: CMap,
    launched_members: Arc<AtomicU32>,
}

impl Launcher for MarkingLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn launch(
        &mut self,
        members: &mut [LaunchMember],
        _connections: &mut [LaunchConnection],
    ) -> anyhow::Result<()> {
        for member in members.iter_mut() {
            if self.containers.contains(member.container) {
                member.done = true;
                self.launched_members.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn work(
        &mut self,
        _members: &mut [LaunchMember],
        _connections: &mut [LaunchConnection],
    ) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn app_shutdown(&mut self) {}
}

fn imp(name: &str, ports: Vec<PortSpec>) -> Arc<Implementation> {
    Arc::new(Implementation {
        package: "dsp".to_string(),
        name: name.to_string(),
        artifact: "dsp.art".to_string(),
        slot: 0,
        ports,
        properties: Vec::new(),
        slaves: Vec::new(),
    })
}

fn port(name: &str, direction: PortDirection) -> PortSpec {
    PortSpec {
        name: name.to_string(),
        direction,
        optional: false,
        internal_pair: None,
        size_source: None,
        params: BTreeMap::new(),
    }
}

fn containers() -> Vec<Container> {
    vec![
        Container {
            ordinal: 0,
            name: "rcc0".to_string(),
            model: ContainerModel::Software,
            transports: vec!["shm".to_string(), "rdma".to_string()],
            in_process: false,
            is_base: true,
        },
        Container {
            ordinal: 1,
            name: "hdl0".to_string(),
            model: ContainerModel::Fpga,
            transports: vec!["rdma".to_string()],
            in_process: false,
            is_base: false,
        },
    ]
}

#[test]
fn full_pipeline_plans_negotiates_and_launches() {
    let assembly = Assembly {
        name: "rx".to_string(),
        instances: vec![
            InstanceDecl {
                name: "src".to_string(),
                spec: "dsp.src".to_string(),
                scale: 1,
                slave_of: None,
                params: BTreeMap::new(),
            },
            InstanceDecl {
                name: "sink".to_string(),
                spec: "dsp.sink".to_string(),
                scale: 1,
                slave_of: None,
                params: BTreeMap::new(),
            },
        ],
        connections: vec![ConnectionDecl {
            from: EndpointDecl::Port { instance: 0, port: "out".to_string() },
            to: EndpointDecl::Port { instance: 1, port: "in".to_string() },
            params: BTreeMap::new(),
        }],
    };

    // The source runs in software, the sink only on the FPGA container.
    let source = TableSource {
        candidates: HashMap::from([
            (
                "dsp.src".to_string(),
                vec![Candidate {
                    implementation: imp("gen", vec![port("out", PortDirection::Output)]),
                    score: 4,
                    is_static: false,
                }],
            ),
            (
                "dsp.sink".to_string(),
                vec![Candidate {
                    implementation: imp("cap", vec![port("in", PortDirection::Input)]),
                    score: 7,
                    is_static: false,
                }],
            ),
        ]),
        feasible: HashMap::from([
            ("gen".to_string(), CMap::from_ordinals([0]).unwrap()),
            ("cap".to_string(), CMap::from_ordinals([1]).unwrap()),
        ]),
    };

    let cs = containers();
    let index = CandidateIndex::build(&assembly, &source, None).unwrap();
    let result = DeploymentSearch::new(
        &assembly,
        &index,
        &cs,
        &AlwaysCompatible,
        &EvenCollocation::default(),
    )
    .run()
    .unwrap();
    assert_eq!(result.score, 11);

    let mut assignment = result.assignment;
    let mut mapper = PolicyMapper::new(PlacementPolicy::RoundRobin);
    mapper.map_deployments(&assembly, &mut assignment).unwrap();

    let mut plan = LaunchPlan::build(&assembly, &assignment, mapper.container_map()).unwrap();
    let limits = Limits::default();
    plan.negotiate_buffers(&DefaultSizer, &limits).unwrap();
    plan.negotiate_transports(&cs, &FirstCommonSelector).unwrap();

    // Cross-container connection: sized and carried over rdma, the only
    // transport both containers support.
    assert_eq!(plan.connections.len(), 1);
    assert_eq!(plan.connections[0].buffer_size, Some(4096));
    assert_eq!(plan.connections[0].transport.as_deref(), Some("rdma"));

    let launched = Arc::new(AtomicU32::new(0));
    let mut bindings = vec![
        LauncherBinding {
            launcher: Box::new(MarkingLauncher {
                name: "local".to_string(),
                local: true,
                containers: CMap::from_ordinals([0]).unwrap(),
                launched_members: launched.clone(),
            }),
            containers: CMap::from_ordinals([0]).unwrap(),
        },
        LauncherBinding {
            launcher: Box::new(MarkingLauncher {
                name: "remote".to_string(),
                local: false,
                containers: CMap::from_ordinals([1]).unwrap(),
                launched_members: launched.clone(),
            }),
            containers: CMap::from_ordinals([1]).unwrap(),
        },
    ];

    let runtime = NullRuntime;
    let mut coordinator = LaunchCoordinator::new(&runtime, limits);
    let outcome = coordinator
        .run(
            "rx",
            mapper.container_map().used(),
            &mut plan.members,
            &mut plan.connections,
            &mut bindings,
        )
        .unwrap();

    assert_eq!(*coordinator.phase(), LaunchPhase::Ready);
    assert_eq!(outcome.apps.len(), 2);
    assert_eq!(launched.load(Ordering::Relaxed), 2);
    assert!(plan.members.iter().all(|m| m.done));
}
