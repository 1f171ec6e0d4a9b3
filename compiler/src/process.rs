// process.rs — Process kinds, ports, and hierarchy paths
//
// Every process is a closed tagged variant over its kind. Shape queries
// ("is map-shaped", "is a zip") and kind-aware equality are exhaustive
// matches, so adding a kind forces every matcher to be revisited.
//
// Ports are not owned by value here: a process holds ordered PortKeys into
// the network's port arena (see network.rs).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::function::{DataType, Function};
use crate::id::Id;

// ── Ports ───────────────────────────────────────────────────────────────────

/// Stable handle of a port in the network's port arena. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortKey(pub u32);

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// A typed, directional connection point owned by exactly one process.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: Id,
    pub owner: Id,
    pub direction: Direction,
    pub data_type: Option<DataType>,
    pub connection: Option<PortKey>,
}

impl Port {
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

// ── Hierarchy ───────────────────────────────────────────────────────────────

/// Path of composite Ids from the root down to (excluding) the process.
///
/// A top-level process has an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Hierarchy(pub Vec<Id>);

impl Hierarchy {
    pub fn root() -> Self {
        Hierarchy(Vec::new())
    }

    /// Path of a child created inside `parent`, whose own path is `self`.
    pub fn child_of(&self, parent: &Id) -> Self {
        let mut path = self.0.clone();
        path.push(parent.clone());
        Hierarchy(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn parent(&self) -> Option<&Id> {
        self.0.last()
    }

    /// True if `self` (a process path) is directly inside `parent`.
    pub fn is_child_of(&self, parent: &Id) -> bool {
        self.parent() == Some(parent)
    }

    /// True if two processes share the same parent.
    pub fn is_sibling_of(&self, other: &Hierarchy) -> bool {
        self == other
    }

    /// True if the process at `own_id` with path `self` is the direct parent
    /// of a process whose path is `child`.
    pub fn is_parent_of(&self, own_id: &Id, child: &Hierarchy) -> bool {
        child.depth() == self.depth() + 1
            && child.0[..self.depth()] == self.0[..]
            && child.parent() == Some(own_id)
    }

    /// Drop `composite` from the path (used when a composite is inlined).
    pub fn without(&self, composite: &Id) -> Self {
        Hierarchy(self.0.iter().filter(|id| *id != composite).cloned().collect())
    }
}

// ── Process kinds ───────────────────────────────────────────────────────────

/// Child bookkeeping of a composite process.
///
/// `inputs[i]` is the InPort child standing for composite in-port `i` on the
/// inside; `outputs[i]` likewise for out-port `i` and its OutPort child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    pub children: Vec<Id>,
    pub inputs: Vec<Id>,
    pub outputs: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessKind {
    Map { function: Function },
    CoalescedMap { functions: Vec<Function> },
    ParallelMap { branches: usize, functions: Vec<Function> },
    /// Generic N-ary combinator applying one function to N inputs.
    Comb { function: Function },
    Unzip,
    Zip,
    Delay { initial: String },
    FanOut,
    InPort,
    OutPort,
    Composite(Composite),
}

impl ProcessKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ProcessKind::Map { .. } => "map",
            ProcessKind::CoalescedMap { .. } => "coalesced_map",
            ProcessKind::ParallelMap { .. } => "parallel_map",
            ProcessKind::Comb { .. } => "comb",
            ProcessKind::Unzip => "unzip",
            ProcessKind::Zip => "zip",
            ProcessKind::Delay { .. } => "delay",
            ProcessKind::FanOut => "fanout",
            ProcessKind::InPort => "inport",
            ProcessKind::OutPort => "outport",
            ProcessKind::Composite(_) => "composite",
        }
    }
}

/// A node of the process network.
#[derive(Debug, Clone)]
pub struct Process {
    pub id: Id,
    pub hierarchy: Hierarchy,
    pub kind: ProcessKind,
    pub in_ports: Vec<PortKey>,
    pub out_ports: Vec<PortKey>,
}

impl Process {
    pub fn new(id: Id, kind: ProcessKind) -> Self {
        Process {
            id,
            hierarchy: Hierarchy::root(),
            kind,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
        }
    }

    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, ProcessKind::Composite(_))
    }

    pub fn is_map_shaped(&self) -> bool {
        match self.kind {
            ProcessKind::Map { .. }
            | ProcessKind::CoalescedMap { .. }
            | ProcessKind::ParallelMap { .. } => true,
            ProcessKind::Comb { .. }
            | ProcessKind::Unzip
            | ProcessKind::Zip
            | ProcessKind::Delay { .. }
            | ProcessKind::FanOut
            | ProcessKind::InPort
            | ProcessKind::OutPort
            | ProcessKind::Composite(_) => false,
        }
    }

    pub fn is_zip(&self) -> bool {
        matches!(self.kind, ProcessKind::Zip)
    }

    pub fn is_unzip(&self) -> bool {
        matches!(self.kind, ProcessKind::Unzip)
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, ProcessKind::Delay { .. })
    }

    pub fn is_parallel_map(&self) -> bool {
        matches!(self.kind, ProcessKind::ParallelMap { .. })
    }

    /// Functions applied by this process, in application order.
    pub fn functions(&self) -> &[Function] {
        match &self.kind {
            ProcessKind::Map { function } | ProcessKind::Comb { function } => {
                std::slice::from_ref(function)
            }
            ProcessKind::CoalescedMap { functions }
            | ProcessKind::ParallelMap { functions, .. } => functions,
            ProcessKind::Unzip
            | ProcessKind::Zip
            | ProcessKind::Delay { .. }
            | ProcessKind::FanOut
            | ProcessKind::InPort
            | ProcessKind::OutPort
            | ProcessKind::Composite(_) => &[],
        }
    }

    pub fn composite(&self) -> Option<&Composite> {
        match &self.kind {
            ProcessKind::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Check port arity and payload against the kind.
    ///
    /// Returns a description of the first violation found.
    pub fn check(&self) -> Option<String> {
        let (n_in, n_out) = (self.in_ports.len(), self.out_ports.len());
        let exact = |want_in: usize, want_out: usize| {
            (n_in != want_in || n_out != want_out).then(|| {
                format!(
                    "{} expects {} in-port(s) and {} out-port(s), found {} and {}",
                    self.kind.tag(),
                    want_in,
                    want_out,
                    n_in,
                    n_out
                )
            })
        };
        match &self.kind {
            ProcessKind::Map { .. } | ProcessKind::Delay { .. } => exact(1, 1),
            ProcessKind::CoalescedMap { functions } => {
                if functions.is_empty() {
                    return Some("coalesced_map carries no functions".to_string());
                }
                exact(1, 1)
            }
            ProcessKind::ParallelMap {
                branches,
                functions,
            } => {
                if *branches == 0 {
                    return Some("parallel_map declares zero branches".to_string());
                }
                if functions.is_empty() {
                    return Some("parallel_map carries no functions".to_string());
                }
                exact(1, 1)
            }
            ProcessKind::Comb { .. } | ProcessKind::Zip => {
                if n_in == 0 || n_out != 1 {
                    return Some(format!(
                        "{} expects at least 1 in-port and exactly 1 out-port, found {} and {}",
                        self.kind.tag(),
                        n_in,
                        n_out
                    ));
                }
                None
            }
            ProcessKind::Unzip | ProcessKind::FanOut => {
                if n_in != 1 || n_out == 0 {
                    return Some(format!(
                        "{} expects exactly 1 in-port and at least 1 out-port, found {} and {}",
                        self.kind.tag(),
                        n_in,
                        n_out
                    ));
                }
                None
            }
            ProcessKind::InPort => exact(0, 1),
            ProcessKind::OutPort => exact(1, 0),
            ProcessKind::Composite(c) => {
                if c.inputs.len() != n_in || c.outputs.len() != n_out {
                    return Some(format!(
                        "composite has {} in-port(s) and {} out-port(s) but {} inport and {} outport children",
                        n_in,
                        n_out,
                        c.inputs.len(),
                        c.outputs.len()
                    ));
                }
                None
            }
        }
    }
}

/// Kind-aware equality of the computation two processes perform.
///
/// Same kind tag and equal payload; identity, ports and hierarchy are ignored.
pub fn same_computation(a: &Process, b: &Process) -> bool {
    match (&a.kind, &b.kind) {
        (ProcessKind::Map { function: fa }, ProcessKind::Map { function: fb }) => fa == fb,
        (ProcessKind::Comb { function: fa }, ProcessKind::Comb { function: fb }) => fa == fb,
        (
            ProcessKind::CoalescedMap { functions: fa },
            ProcessKind::CoalescedMap { functions: fb },
        ) => fa == fb,
        (
            ProcessKind::ParallelMap {
                branches: ba,
                functions: fa,
            },
            ProcessKind::ParallelMap {
                branches: bb,
                functions: fb,
            },
        ) => ba == bb && fa == fb,
        (ProcessKind::Delay { initial: ia }, ProcessKind::Delay { initial: ib }) => ia == ib,
        (ProcessKind::Unzip, ProcessKind::Unzip)
        | (ProcessKind::Zip, ProcessKind::Zip)
        | (ProcessKind::FanOut, ProcessKind::FanOut)
        | (ProcessKind::InPort, ProcessKind::InPort)
        | (ProcessKind::OutPort, ProcessKind::OutPort) => true,
        // Composites are never compared structurally.
        _ => false,
    }
}
