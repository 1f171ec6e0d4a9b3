// description.rs — JSON network description (load / emit)
//
// The interchange form handed over by a frontend: a flat list of processes
// (with an optional `parent` composite), connections written as
// `"owner.port"` references, and the graph boundary ports.
//
// Preconditions: none.
// Postconditions: `load_network` returns a network whose processes, ports,
//                 connections and boundary exactly mirror the description;
//                 `describe` is its inverse up to port-key numbering.
// Failure modes: malformed JSON or payload → `E0100`; references to unknown
//                processes or ports → `E0101`. All findings are collected
//                before failing.
// Side effects: none.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diag::{codes, has_errors, Diagnostic};
use crate::error::Result;
use crate::function::{DataType, Function};
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::process::{Composite, Direction, Hierarchy, PortKey, ProcessKind};

// ── Description types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub processes: Vec<ProcessDescription>,
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescription {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    #[serde(flatten)]
    pub kind: KindDescription,
    #[serde(default, rename = "in", skip_serializing_if = "Vec::is_empty")]
    pub in_ports: Vec<PortDescription>,
    #[serde(default, rename = "out", skip_serializing_if = "Vec::is_empty")]
    pub out_ports: Vec<PortDescription>,
}

/// Kind tag plus payload. Composite children are implied by `parent` links;
/// `inputs`/`outputs` name the InPort/OutPort helpers in port order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindDescription {
    Map {
        function: Function,
    },
    CoalescedMap {
        functions: Vec<Function>,
    },
    ParallelMap {
        branches: usize,
        functions: Vec<Function>,
    },
    Comb {
        function: Function,
    },
    Unzip,
    Zip,
    Delay {
        #[serde(default)]
        initial: String,
    },
    #[serde(rename = "fanout")]
    FanOut,
    #[serde(rename = "inport")]
    InPort,
    #[serde(rename = "outport")]
    OutPort,
    Composite {
        #[serde(default)]
        inputs: Vec<Id>,
        #[serde(default)]
        outputs: Vec<Id>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescription {
    pub name: Id,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub from: String,
    pub to: String,
}

impl KindDescription {
    fn to_kind(&self) -> ProcessKind {
        match self {
            KindDescription::Map { function } => ProcessKind::Map {
                function: function.clone(),
            },
            KindDescription::CoalescedMap { functions } => ProcessKind::CoalescedMap {
                functions: functions.clone(),
            },
            KindDescription::ParallelMap {
                branches,
                functions,
            } => ProcessKind::ParallelMap {
                branches: *branches,
                functions: functions.clone(),
            },
            KindDescription::Comb { function } => ProcessKind::Comb {
                function: function.clone(),
            },
            KindDescription::Unzip => ProcessKind::Unzip,
            KindDescription::Zip => ProcessKind::Zip,
            KindDescription::Delay { initial } => ProcessKind::Delay {
                initial: initial.clone(),
            },
            KindDescription::FanOut => ProcessKind::FanOut,
            KindDescription::InPort => ProcessKind::InPort,
            KindDescription::OutPort => ProcessKind::OutPort,
            // Helper lists are filled once every child exists.
            KindDescription::Composite { .. } => ProcessKind::Composite(Composite::default()),
        }
    }

    fn from_kind(kind: &ProcessKind) -> Self {
        match kind {
            ProcessKind::Map { function } => KindDescription::Map {
                function: function.clone(),
            },
            ProcessKind::CoalescedMap { functions } => KindDescription::CoalescedMap {
                functions: functions.clone(),
            },
            ProcessKind::ParallelMap {
                branches,
                functions,
            } => KindDescription::ParallelMap {
                branches: *branches,
                functions: functions.clone(),
            },
            ProcessKind::Comb { function } => KindDescription::Comb {
                function: function.clone(),
            },
            ProcessKind::Unzip => KindDescription::Unzip,
            ProcessKind::Zip => KindDescription::Zip,
            ProcessKind::Delay { initial } => KindDescription::Delay {
                initial: initial.clone(),
            },
            ProcessKind::FanOut => KindDescription::FanOut,
            ProcessKind::InPort => KindDescription::InPort,
            ProcessKind::OutPort => KindDescription::OutPort,
            ProcessKind::Composite(c) => KindDescription::Composite {
                inputs: c.inputs.clone(),
                outputs: c.outputs.clone(),
            },
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────────────

/// Parse JSON text into a description.
pub fn parse_description(text: &str) -> std::result::Result<NetworkDescription, Vec<Diagnostic>> {
    serde_json::from_str(text).map_err(|e| {
        vec![Diagnostic::error(None, format!("invalid network description: {e}"))
            .with_code(codes::E0100)
            .with_hint("expected an object with `processes`, `connections`, `inputs` and `outputs`")]
    })
}

/// Parse and build a network in one step.
pub fn load_network(text: &str) -> std::result::Result<ProcessNetwork, Vec<Diagnostic>> {
    build_network(&parse_description(text)?)
}

/// Build a network from a parsed description.
pub fn build_network(desc: &NetworkDescription) -> std::result::Result<ProcessNetwork, Vec<Diagnostic>> {
    let mut ctx = LoadCtx {
        net: ProcessNetwork::new(),
        diagnostics: Vec::new(),
    };
    ctx.add_processes(desc);
    ctx.fill_composites(desc);
    ctx.add_connections(desc);
    ctx.add_boundary(desc);

    if has_errors(&ctx.diagnostics) {
        return Err(ctx.diagnostics);
    }
    debug!(processes = ctx.net.len(), "loaded network description");
    Ok(ctx.net)
}

struct LoadCtx {
    net: ProcessNetwork,
    diagnostics: Vec<Diagnostic>,
}

impl LoadCtx {
    fn malformed(&mut self, subject: Option<&Id>, message: String) {
        self.diagnostics
            .push(Diagnostic::error(subject.cloned(), message).with_code(codes::E0100));
    }

    fn unknown(&mut self, subject: Option<&Id>, message: String) {
        self.diagnostics
            .push(Diagnostic::error(subject.cloned(), message).with_code(codes::E0101));
    }

    /// Path from the root to the parent of `id`, or `None` on a broken chain.
    fn hierarchy_of(
        &mut self,
        desc: &ProcessDescription,
        by_id: &HashMap<&Id, &ProcessDescription>,
    ) -> Option<Hierarchy> {
        let mut path = Vec::new();
        let mut parent = desc.parent.as_ref();
        while let Some(p) = parent {
            if path.len() > by_id.len() || *p == desc.id || path.contains(p) {
                self.malformed(Some(&desc.id), format!("parent chain of '{}' is cyclic", desc.id));
                return None;
            }
            let Some(parent_desc) = by_id.get(p) else {
                self.unknown(Some(&desc.id), format!("parent '{}' of '{}' does not exist", p, desc.id));
                return None;
            };
            path.push(p.clone());
            parent = parent_desc.parent.as_ref();
        }
        path.reverse();
        Some(Hierarchy(path))
    }

    fn add_processes(&mut self, desc: &NetworkDescription) {
        let by_id: HashMap<&Id, &ProcessDescription> =
            desc.processes.iter().map(|p| (&p.id, p)).collect();

        let mut placed = Vec::with_capacity(desc.processes.len());
        for p in &desc.processes {
            if let Some(h) = self.hierarchy_of(p, &by_id) {
                placed.push((h, p));
            }
        }
        // Parents before children.
        placed.sort_by_key(|(h, _)| h.depth());

        for (hierarchy, p) in placed {
            if let Err(e) = self.net.add_process_in(p.id.clone(), p.kind.to_kind(), hierarchy) {
                self.malformed(Some(&p.id), e.to_string());
                continue;
            }
            for (ports, direction) in [(&p.in_ports, Direction::In), (&p.out_ports, Direction::Out)] {
                for port in ports {
                    if let Err(e) =
                        self.net
                            .add_port(&p.id, port.name.clone(), direction, port.data_type.clone())
                    {
                        self.malformed(Some(&p.id), e.to_string());
                    }
                }
            }
        }
    }

    fn fill_composites(&mut self, desc: &NetworkDescription) {
        for p in &desc.processes {
            let KindDescription::Composite { inputs, outputs } = &p.kind else {
                continue;
            };
            if !self.net.contains(&p.id) {
                continue;
            }
            for helper in inputs.iter().chain(outputs) {
                if !self.net.contains(helper) {
                    self.unknown(
                        Some(&p.id),
                        format!("boundary helper '{}' of composite '{}' does not exist", helper, p.id),
                    );
                }
            }
            if let Ok(process) = self.net.process_mut(&p.id) {
                if let ProcessKind::Composite(c) = &mut process.kind {
                    c.inputs = inputs.clone();
                    c.outputs = outputs.clone();
                }
            }
        }
    }

    /// Resolve `"owner.port"` to a port of the given direction.
    fn resolve(&mut self, reference: &str, direction: Direction) -> Option<PortKey> {
        let Some((owner, name)) = reference.rsplit_once('.') else {
            self.malformed(
                None,
                format!("port reference '{reference}' must have the form 'process.port'"),
            );
            return None;
        };
        let owner = Id::new(owner);
        if !self.net.contains(&owner) {
            self.unknown(None, format!("port reference '{reference}' names unknown process '{owner}'"));
            return None;
        }
        let process = self.net.process(&owner).ok()?;
        let keys = match direction {
            Direction::In => &process.in_ports,
            Direction::Out => &process.out_ports,
        };
        let found = keys
            .iter()
            .copied()
            .find(|&k| self.net.port(k).is_ok_and(|port| port.name.as_str() == name));
        if found.is_none() {
            self.unknown(
                Some(&owner),
                format!("'{owner}' has no {direction} port named '{name}'"),
            );
        }
        found
    }

    fn add_connections(&mut self, desc: &NetworkDescription) {
        for c in &desc.connections {
            let from = self.resolve(&c.from, Direction::Out);
            let to = self.resolve(&c.to, Direction::In);
            if let (Some(from), Some(to)) = (from, to) {
                if let Err(e) = self.net.connect(from, to) {
                    self.malformed(None, format!("cannot connect '{}' to '{}': {}", c.from, c.to, e));
                }
            }
        }
    }

    fn add_boundary(&mut self, desc: &NetworkDescription) {
        for reference in &desc.inputs {
            if let Some(key) = self.resolve(reference, Direction::In) {
                if let Err(e) = self.net.add_input(key) {
                    self.malformed(None, e.to_string());
                }
            }
        }
        for reference in &desc.outputs {
            if let Some(key) = self.resolve(reference, Direction::Out) {
                if let Err(e) = self.net.add_output(key) {
                    self.malformed(None, e.to_string());
                }
            }
        }
    }
}

// ── Emitting ────────────────────────────────────────────────────────────────

/// Describe the network in interchange form.
pub fn describe(net: &ProcessNetwork) -> Result<NetworkDescription> {
    let mut desc = NetworkDescription::default();
    for process in net.processes() {
        let ports = |keys: &[PortKey]| -> Result<Vec<PortDescription>> {
            keys.iter()
                .map(|&k| {
                    let port = net.port(k)?;
                    Ok(PortDescription {
                        name: port.name.clone(),
                        data_type: port.data_type.clone(),
                    })
                })
                .collect()
        };
        desc.processes.push(ProcessDescription {
            id: process.id.clone(),
            parent: process.hierarchy.parent().cloned(),
            kind: KindDescription::from_kind(&process.kind),
            in_ports: ports(&process.in_ports)?,
            out_ports: ports(&process.out_ports)?,
        });
        for &key in &process.out_ports {
            if let Some(peer) = net.connected(key)? {
                desc.connections.push(ConnectionDescription {
                    from: net.port_label(key),
                    to: net.port_label(peer),
                });
            }
        }
    }
    desc.inputs = net.inputs().iter().map(|&k| net.port_label(k)).collect();
    desc.outputs = net.outputs().iter().map(|&k| net.port_label(k)).collect();
    Ok(desc)
}
