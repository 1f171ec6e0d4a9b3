// network.rs — Process network container and graph surgery primitives
//
// Owns every process and port of one synchronous dataflow network. Processes
// live in an Id-keyed ordered map; ports live in an index arena addressed by
// PortKey. A connection is stored on both port slots, so "get connected
// port" is O(1) and removing a process can never leave a peer pointing at a
// freed slot: freed slots become `None` and are never reused.
//
// Preconditions: none; networks are built incrementally by a frontend
//                (description.rs) or by the rewriter.
// Postconditions: Ids unique, connections symmetric, boundary ports alias
//                 live ports.
// Failure modes: inconsistent surgery → `NetworkError` (fatal).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use sha2::{Digest, Sha256};

use crate::diag::{codes, Diagnostic};
use crate::error::{NetworkError, Result};
use crate::function::DataType;
use crate::id::{Id, IdGenerator};
use crate::process::{Direction, Hierarchy, Port, PortKey, Process, ProcessKind};

/// The complete dataflow graph under transformation.
#[derive(Debug, Clone, Default)]
pub struct ProcessNetwork {
    processes: BTreeMap<Id, Process>,
    ports: Vec<Option<Port>>,
    inputs: Vec<PortKey>,
    outputs: Vec<PortKey>,
    ids: IdGenerator,
}

impl ProcessNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Processes ───────────────────────────────────────────────────────

    /// Insert a top-level process. Duplicate Ids are an internal error.
    pub fn add_process(&mut self, id: impl Into<Id>, kind: ProcessKind) -> Result<Id> {
        self.add_process_in(id, kind, Hierarchy::root())
    }

    /// Insert a process at the given hierarchy path. If the path names a
    /// composite parent, the process is registered as its child.
    pub fn add_process_in(
        &mut self,
        id: impl Into<Id>,
        kind: ProcessKind,
        hierarchy: Hierarchy,
    ) -> Result<Id> {
        let id = id.into();
        if self.processes.contains_key(&id) {
            return Err(NetworkError::DuplicateId { id });
        }
        if let Some(parent) = hierarchy.parent() {
            match self.processes.get_mut(parent).map(|p| &mut p.kind) {
                Some(ProcessKind::Composite(c)) => c.children.push(id.clone()),
                Some(_) => {
                    return Err(NetworkError::MalformedComposite {
                        id: parent.clone(),
                        reason: format!("'{}' is placed inside a leaf process", id),
                    })
                }
                None => {
                    return Err(NetworkError::UnknownProcess { id: parent.clone() });
                }
            }
        }
        self.ids.reserve(&id);
        let process = Process::new(id.clone(), kind).with_hierarchy(hierarchy);
        self.processes.insert(id.clone(), process);
        Ok(id)
    }

    /// Insert a process under a freshly generated Id.
    pub fn add_fresh_process(
        &mut self,
        prefix: &str,
        kind: ProcessKind,
        hierarchy: Hierarchy,
    ) -> Result<Id> {
        let id = self.ids.fresh(prefix);
        self.add_process_in(id, kind, hierarchy)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.processes.contains_key(id)
    }

    pub fn get(&self, id: &Id) -> Option<&Process> {
        self.processes.get(id)
    }

    pub fn process(&self, id: &Id) -> Result<&Process> {
        self.processes
            .get(id)
            .ok_or_else(|| NetworkError::UnknownProcess { id: id.clone() })
    }

    pub fn process_mut(&mut self, id: &Id) -> Result<&mut Process> {
        self.processes
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownProcess { id: id.clone() })
    }

    /// All processes in Id order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    /// All process Ids in order.
    pub fn ids(&self) -> Vec<Id> {
        self.processes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Remove a process, disconnecting and freeing all of its ports.
    ///
    /// Fails if one of its ports is still a graph-level boundary port; the
    /// caller must retarget the boundary first.
    pub fn remove_process(&mut self, id: &Id) -> Result<Process> {
        let process = self.process(id)?;
        let keys: Vec<PortKey> = process
            .in_ports
            .iter()
            .chain(&process.out_ports)
            .copied()
            .collect();
        if let Some(&key) = keys.iter().find(|k| self.is_boundary(**k)) {
            return Err(NetworkError::DanglingBoundaryPort {
                key,
                process: id.clone(),
            });
        }
        for key in keys {
            self.disconnect(key)?;
            self.ports[key.0 as usize] = None;
        }
        let process = self
            .processes
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownProcess { id: id.clone() })?;
        if let Some(parent) = process.hierarchy.parent() {
            if let Some(ProcessKind::Composite(c)) = self.processes.get_mut(parent).map(|p| &mut p.kind) {
                c.children.retain(|child| child != id);
            }
        }
        Ok(process)
    }

    // ── Ports ───────────────────────────────────────────────────────────

    /// Append a port to `owner`. Port names are unique per direction.
    pub fn add_port(
        &mut self,
        owner: &Id,
        name: impl Into<Id>,
        direction: Direction,
        data_type: Option<DataType>,
    ) -> Result<PortKey> {
        let name = name.into();
        let existing = {
            let process = self.process(owner)?;
            let list = match direction {
                Direction::In => &process.in_ports,
                Direction::Out => &process.out_ports,
            };
            list.iter()
                .filter_map(|k| self.ports.get(k.0 as usize).and_then(Option::as_ref))
                .any(|p| p.name == name)
        };
        if existing {
            return Err(NetworkError::DuplicatePort {
                process: owner.clone(),
                port: name,
                direction,
            });
        }

        let key = PortKey(self.ports.len() as u32);
        self.ports.push(Some(Port {
            name,
            owner: owner.clone(),
            direction,
            data_type,
            connection: None,
        }));
        let process = self.process_mut(owner)?;
        match direction {
            Direction::In => process.in_ports.push(key),
            Direction::Out => process.out_ports.push(key),
        }
        Ok(key)
    }

    pub fn port(&self, key: PortKey) -> Result<&Port> {
        self.ports
            .get(key.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(NetworkError::UnknownPort { key })
    }

    fn port_mut(&mut self, key: PortKey) -> Result<&mut Port> {
        self.ports
            .get_mut(key.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(NetworkError::UnknownPort { key })
    }

    pub fn owner(&self, key: PortKey) -> Result<&Id> {
        Ok(&self.port(key)?.owner)
    }

    /// The port on the other side of `key`'s connection, if any.
    pub fn connected(&self, key: PortKey) -> Result<Option<PortKey>> {
        Ok(self.port(key)?.connection)
    }

    /// Connect an out-port to an in-port. Both must be free.
    pub fn connect(&mut self, out: PortKey, inp: PortKey) -> Result<()> {
        let (a, b) = (self.port(out)?, self.port(inp)?);
        if a.direction != Direction::Out || b.direction != Direction::In {
            return Err(NetworkError::DirectionMismatch { from: out, to: inp });
        }
        if a.is_connected() {
            return Err(NetworkError::PortInUse { key: out });
        }
        if b.is_connected() {
            return Err(NetworkError::PortInUse { key: inp });
        }
        self.port_mut(out)?.connection = Some(inp);
        self.port_mut(inp)?.connection = Some(out);
        Ok(())
    }

    /// Break the connection of `key` (both sides). Returns the former peer.
    pub fn disconnect(&mut self, key: PortKey) -> Result<Option<PortKey>> {
        let peer = self.port_mut(key)?.connection.take();
        if let Some(peer) = peer {
            self.port_mut(peer)?.connection = None;
        }
        Ok(peer)
    }

    /// Key of the `index`-th port of `id` in the given direction.
    pub fn port_at(&self, id: &Id, direction: Direction, index: usize) -> Result<PortKey> {
        let process = self.process(id)?;
        let list = match direction {
            Direction::In => &process.in_ports,
            Direction::Out => &process.out_ports,
        };
        list.get(index)
            .copied()
            .ok_or_else(|| NetworkError::MissingPortIndex {
                id: id.clone(),
                direction,
                index,
            })
    }

    /// Process feeding the `index`-th in-port of `id`, if connected.
    pub fn predecessor(&self, id: &Id, index: usize) -> Result<Option<Id>> {
        self.peer_owner(self.port_at(id, Direction::In, index)?)
    }

    /// Process fed by the `index`-th out-port of `id`, if connected.
    pub fn successor(&self, id: &Id, index: usize) -> Result<Option<Id>> {
        self.peer_owner(self.port_at(id, Direction::Out, index)?)
    }

    /// Owners behind every connected in-port of `id`, in port order.
    pub fn predecessors(&self, id: &Id) -> Result<Vec<Id>> {
        let ports = self.process(id)?.in_ports.clone();
        let mut out = Vec::with_capacity(ports.len());
        for key in ports {
            if let Some(owner) = self.peer_owner(key)? {
                out.push(owner);
            }
        }
        Ok(out)
    }

    /// Owners behind every connected out-port of `id`, in port order.
    pub fn successors(&self, id: &Id) -> Result<Vec<Id>> {
        let ports = self.process(id)?.out_ports.clone();
        let mut out = Vec::with_capacity(ports.len());
        for key in ports {
            if let Some(owner) = self.peer_owner(key)? {
                out.push(owner);
            }
        }
        Ok(out)
    }

    fn peer_owner(&self, key: PortKey) -> Result<Option<Id>> {
        match self.connected(key)? {
            Some(peer) => Ok(Some(self.owner(peer)?.clone())),
            None => Ok(None),
        }
    }

    // ── Graph boundary ──────────────────────────────────────────────────

    pub fn inputs(&self) -> &[PortKey] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortKey] {
        &self.outputs
    }

    pub fn add_input(&mut self, key: PortKey) -> Result<()> {
        self.port(key)?;
        self.inputs.push(key);
        Ok(())
    }

    pub fn add_output(&mut self, key: PortKey) -> Result<()> {
        self.port(key)?;
        self.outputs.push(key);
        Ok(())
    }

    pub fn is_boundary(&self, key: PortKey) -> bool {
        self.inputs.contains(&key) || self.outputs.contains(&key)
    }

    /// Retarget every boundary reference to `old` onto `new`.
    /// Returns true if anything was retargeted.
    pub fn replace_boundary_port(&mut self, old: PortKey, new: PortKey) -> bool {
        let mut replaced = false;
        for key in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            if *key == old {
                *key = new;
                replaced = true;
            }
        }
        replaced
    }

    /// Owners of the graph-level output ports, in boundary order.
    pub fn output_processes(&self) -> Result<Vec<Id>> {
        self.outputs
            .iter()
            .map(|&k| self.owner(k).cloned())
            .collect()
    }

    // ── Validation ──────────────────────────────────────────────────────

    /// Structural validation of a network that is about to be rewritten
    /// and scheduled.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        for process in self.processes.values() {
            if !process.is_leaf() {
                diags.push(
                    Diagnostic::error(
                        Some(process.id.clone()),
                        "composite process remains in a network that must be flat",
                    )
                    .with_code(codes::E0201),
                );
                continue;
            }
            if let Some(problem) = process.check() {
                diags.push(Diagnostic::error(Some(process.id.clone()), problem).with_code(codes::E0200));
            }
        }

        for (label, keys) in [("input", &self.inputs), ("output", &self.outputs)] {
            for &key in keys {
                match self.port(key) {
                    Err(_) => diags.push(
                        Diagnostic::error(None, format!("graph {label} {key} does not exist"))
                            .with_code(codes::E0202),
                    ),
                    Ok(port) if port.is_connected() => diags.push(
                        Diagnostic::error(
                            Some(port.owner.clone()),
                            format!("graph {label} port '{}' is connected inside the network", port.name),
                        )
                        .with_code(codes::E0202),
                    ),
                    Ok(_) => {}
                }
            }
        }

        match self.undelayed_cycles() {
            Ok(cycles) => {
                for cycle in cycles {
                    let path: Vec<String> = cycle.iter().map(Id::to_string).collect();
                    diags.push(
                        Diagnostic::error(
                            Some(cycle[0].clone()),
                            format!("feedback cycle without a delay: {}", path.join(" -> ")),
                        )
                        .with_code(codes::E0400)
                        .with_hint("every feedback loop must pass through a delay process"),
                    );
                }
            }
            Err(e) => diags.push(cycle_search_failed(&e)),
        }

        match self.multi_delay_cycles() {
            Ok(cycles) => {
                for cycle in cycles {
                    let path: Vec<String> = cycle.iter().map(Id::to_string).collect();
                    diags.push(
                        Diagnostic::error(
                            Some(cycle[0].clone()),
                            format!("feedback loop through more than one delay: {}", path.join(" -> ")),
                        )
                        .with_code(codes::E0401)
                        .with_hint("every feedback loop must pass through exactly one delay process"),
                    );
                }
            }
            Err(e) => diags.push(cycle_search_failed(&e)),
        }

        diags
    }

    /// Successor lists for every process. With `cut_delays`, edges leaving
    /// a Delay are dropped: they are not dependencies within one tick.
    fn adjacency(&self, cut_delays: bool) -> Result<HashMap<&Id, Vec<Id>>> {
        let mut adj = HashMap::with_capacity(self.processes.len());
        for process in self.processes.values() {
            let next = if cut_delays && process.is_delay() {
                Vec::new()
            } else {
                self.successors(&process.id)?
            };
            adj.insert(&process.id, next);
        }
        Ok(adj)
    }

    fn is_delay_id(&self, id: &Id) -> bool {
        self.processes.get(id).is_some_and(Process::is_delay)
    }

    /// Cycles that do not pass through any Delay process.
    pub fn undelayed_cycles(&self) -> Result<Vec<Vec<Id>>> {
        let adj = self.adjacency(true)?;

        let mut cycles = Vec::new();
        let mut state: HashMap<Id, u8> = HashMap::new(); // 0 = unvisited, 1 = in progress, 2 = done
        let mut path = Vec::new();
        for id in self.processes.keys() {
            if state.get(id).copied().unwrap_or(0) == 0 {
                dfs_cycle(id, &adj, &mut state, &mut path, &mut cycles);
            }
        }
        Ok(cycles)
    }

    /// Feedback loops that pass through more than one Delay process, one
    /// per set of processes, each starting at its lowest-Id Delay.
    ///
    /// Loops sharing processes are told apart: two single-delay loops
    /// through a common Map are fine, a single loop through two Delays is
    /// not.
    pub fn multi_delay_cycles(&self) -> Result<Vec<Vec<Id>>> {
        let adj = self.adjacency(false)?;
        let mut reverse: HashMap<&Id, Vec<&Id>> = HashMap::new();
        for (&from, nexts) in &adj {
            for next in nexts {
                if let Some((key, _)) = self.processes.get_key_value(next) {
                    reverse.entry(key).or_default().push(from);
                }
            }
        }

        let mut seen: BTreeSet<Vec<Id>> = BTreeSet::new();
        let mut cycles = Vec::new();
        for delay in self.processes.values().filter(|p| p.is_delay()) {
            // Only processes that lead back to this delay can lie on a loop
            // through it.
            let mut reach: HashSet<&Id> = HashSet::new();
            let mut stack = vec![&delay.id];
            while let Some(id) = stack.pop() {
                for &prev in reverse.get(id).into_iter().flatten() {
                    if reach.insert(prev) {
                        stack.push(prev);
                    }
                }
            }
            if !reach.contains(&delay.id) {
                continue;
            }

            let mut path = vec![delay.id.clone()];
            if let Some(cycle) = self.delayed_loop(&delay.id, &delay.id, &adj, &reach, &mut path) {
                let mut members = cycle.clone();
                members.sort();
                if seen.insert(members) {
                    cycles.push(cycle);
                }
            }
        }
        Ok(cycles)
    }

    /// Depth-first search over simple paths from `node` back to `target`,
    /// returning the first closed path that holds more than one Delay.
    fn delayed_loop(
        &self,
        node: &Id,
        target: &Id,
        adj: &HashMap<&Id, Vec<Id>>,
        reach: &HashSet<&Id>,
        path: &mut Vec<Id>,
    ) -> Option<Vec<Id>> {
        for next in adj.get(node).into_iter().flatten() {
            if next == target {
                let delays = path.iter().filter(|id| self.is_delay_id(id)).count();
                if delays > 1 {
                    return Some(path.clone());
                }
            } else if reach.contains(next) && !path.contains(next) {
                path.push(next.clone());
                if let Some(found) = self.delayed_loop(next, target, adj, reach, path) {
                    return Some(found);
                }
                path.pop();
            }
        }
        None
    }

    // ── Identity ────────────────────────────────────────────────────────

    pub fn fresh_id(&mut self, prefix: &str) -> Id {
        self.ids.fresh(prefix)
    }

    /// SHA-256 over the canonical JSON description: every function body
    /// and port type is covered, port keys are not, so two structurally
    /// identical networks share a fingerprint.
    pub fn fingerprint(&self) -> Result<[u8; 32]> {
        let desc = crate::description::describe(self)?;
        let bytes = serde_json::to_vec(&desc).map_err(|e| NetworkError::Serialize {
            reason: e.to_string(),
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Ok(hash)
    }

    pub fn fingerprint_hex(&self) -> Result<String> {
        use std::fmt::Write;
        let mut s = String::with_capacity(64);
        for b in self.fingerprint()? {
            let _ = write!(s, "{:02x}", b);
        }
        Ok(s)
    }

    /// `owner.port` label of a port, for display.
    pub fn port_label(&self, key: PortKey) -> String {
        match self.port(key) {
            Ok(p) => format!("{}.{}", p.owner, p.name),
            Err(_) => format!("<dangling {key}>"),
        }
    }
}

fn cycle_search_failed(err: &NetworkError) -> Diagnostic {
    Diagnostic::error(None, format!("cycle search failed: {err}")).with_code(codes::E0900)
}

fn dfs_cycle(
    node: &Id,
    adj: &HashMap<&Id, Vec<Id>>,
    state: &mut HashMap<Id, u8>,
    path: &mut Vec<Id>,
    cycles: &mut Vec<Vec<Id>>,
) {
    state.insert(node.clone(), 1);
    path.push(node.clone());

    if let Some(neighbors) = adj.get(node) {
        for next in neighbors {
            match state.get(next).copied().unwrap_or(0) {
                0 => dfs_cycle(next, adj, state, path, cycles),
                1 => {
                    if let Some(pos) = path.iter().position(|n| n == next) {
                        cycles.push(path[pos..].to_vec());
                    }
                }
                _ => {}
            }
        }
    }

    path.pop();
    state.insert(node.clone(), 2);
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for ProcessNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ProcessNetwork ({} processes, {} inputs, {} outputs)",
            self.processes.len(),
            self.inputs.len(),
            self.outputs.len()
        )?;
        for process in self.processes.values() {
            write!(f, "  {}: {}", process.id, process.kind.tag())?;
            match &process.kind {
                ProcessKind::ParallelMap { branches, .. } => write!(f, " x{}", branches)?,
                ProcessKind::Delay { initial } => write!(f, " init={}", initial)?,
                _ => {}
            }
            let functions = process.functions();
            if !functions.is_empty() {
                let names: Vec<&str> = functions.iter().map(|fun| fun.name.as_str()).collect();
                write!(f, " [{}]", names.join(", "))?;
            }
            if process.hierarchy.depth() > 0 {
                let path: Vec<&str> = process.hierarchy.0.iter().map(Id::as_str).collect();
                write!(f, " in {}", path.join("/"))?;
            }
            writeln!(f)?;
            for &key in &process.out_ports {
                if let Ok(Some(peer)) = self.connected(key) {
                    writeln!(f, "    {} -> {}", self.port_label(key), self.port_label(peer))?;
                }
            }
        }
        for &key in &self.inputs {
            writeln!(f, "  input {}", self.port_label(key))?;
        }
        for &key in &self.outputs {
            writeln!(f, "  output {}", self.port_label(key))?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
