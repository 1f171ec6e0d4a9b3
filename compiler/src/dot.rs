// dot.rs — Graphviz DOT output for process networks
//
// Transforms a ProcessNetwork into DOT format suitable for rendering
// with `dot`, `neato`, or other Graphviz layout engines.
//
// Preconditions: none; composites are drawn as clusters around their children.
// Postconditions: returns a valid DOT string representing the network.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use crate::error::Result;
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::process::{Process, ProcessKind};

/// Emit the process network as a Graphviz DOT string.
pub fn emit_dot(net: &ProcessNetwork) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph syncflow {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    // Children grouped under their direct parent; `None` is the top level.
    let mut by_parent: BTreeMap<Option<&Id>, Vec<&Process>> = BTreeMap::new();
    for p in net.processes() {
        by_parent.entry(p.hierarchy.parent()).or_default().push(p);
    }
    writeln!(buf).unwrap();
    write_level(&mut buf, &by_parent, None, "    ");

    // Edges
    let cycle_edges = match cycle_edges(net) {
        Ok(edges) => edges,
        Err(e) => {
            writeln!(buf, "    // cycle detection failed: {e}").unwrap();
            HashSet::new()
        }
    };
    writeln!(buf).unwrap();
    for p in net.processes() {
        let src = dot_node_id(&p.id);
        let multi_out = p.out_ports.len() > 1;
        for &key in &p.out_ports {
            let Ok(Some(peer)) = net.connected(key) else {
                continue;
            };
            let (Ok(out_port), Ok(in_port)) = (net.port(key), net.port(peer)) else {
                continue;
            };
            let Some(target) = net.get(&in_port.owner) else {
                continue;
            };
            let tgt = dot_node_id(&target.id);

            let mut attrs = Vec::new();
            if multi_out {
                attrs.push(format!("taillabel=\"{}\"", out_port.name));
            }
            if target.in_ports.len() > 1 {
                attrs.push(format!("headlabel=\"{}\"", in_port.name));
            }
            if p.is_delay() {
                attrs.push("style=dashed".to_string());
            }
            if cycle_edges.contains(&(p.id.clone(), target.id.clone())) {
                attrs.push("style=bold, color=red".to_string());
            }
            if attrs.is_empty() {
                writeln!(buf, "    {src} -> {tgt};").unwrap();
            } else {
                writeln!(buf, "    {src} -> {tgt} [{}];", attrs.join(", ")).unwrap();
            }
        }
    }

    // Graph boundary
    if !net.inputs().is_empty() || !net.outputs().is_empty() {
        writeln!(buf).unwrap();
        writeln!(buf, "    // Graph boundary").unwrap();
    }
    for (i, &key) in net.inputs().iter().enumerate() {
        if let Ok(port) = net.port(key) {
            writeln!(buf, "    input_{i} [shape=plaintext, label=\"{}\"];", net.port_label(key)).unwrap();
            writeln!(buf, "    input_{i} -> {};", dot_node_id(&port.owner)).unwrap();
        }
    }
    for (i, &key) in net.outputs().iter().enumerate() {
        if let Ok(port) = net.port(key) {
            writeln!(buf, "    output_{i} [shape=plaintext, label=\"{}\"];", net.port_label(key)).unwrap();
            writeln!(buf, "    {} -> output_{i};", dot_node_id(&port.owner)).unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn dot_node_id(id: &Id) -> String {
    format!("p_{}", sanitize(id.as_str()))
}

/// Return the node label for a process.
fn node_label(p: &Process) -> String {
    match &p.kind {
        ProcessKind::Map { function } | ProcessKind::Comb { function } => {
            format!("{}\\n{}", p.id, function.name)
        }
        ProcessKind::CoalescedMap { functions } => {
            let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
            format!("{}\\n{}", p.id, names.join(" . "))
        }
        ProcessKind::ParallelMap {
            branches,
            functions,
        } => {
            let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
            format!("{}\\n{} x{}", p.id, names.join(" . "), branches)
        }
        ProcessKind::Delay { initial } => format!("{}\\ninit {}", p.id, initial),
        _ => p.id.to_string(),
    }
}

/// Return DOT attributes string for a process.
fn node_attrs(p: &Process) -> String {
    let (shape, color) = match &p.kind {
        ProcessKind::Map { .. } => ("box", "lightblue"),
        ProcessKind::CoalescedMap { .. } => ("box3d", "lightblue"),
        ProcessKind::ParallelMap { .. } => ("box3d", "palegreen"),
        ProcessKind::Comb { .. } => ("box", "lightcyan"),
        ProcessKind::Unzip => ("invtrapezium", "lightyellow"),
        ProcessKind::Zip => ("trapezium", "lightyellow"),
        ProcessKind::Delay { .. } => ("square", "lightsalmon"),
        ProcessKind::FanOut => ("diamond", "white"),
        ProcessKind::InPort | ProcessKind::OutPort => ("circle", "gray90"),
        ProcessKind::Composite(_) => ("folder", "gray80"),
    };
    let label = node_label(p);
    format!("shape={shape}, style=filled, fillcolor={color}, label=\"{label}\"")
}

/// Write the processes of one hierarchy level; composites open a cluster
/// holding their children.
fn write_level(
    buf: &mut String,
    by_parent: &BTreeMap<Option<&Id>, Vec<&Process>>,
    parent: Option<&Id>,
    indent: &str,
) {
    let Some(processes) = by_parent.get(&parent) else {
        return;
    };
    for p in processes {
        writeln!(buf, "{indent}{} [{}];", dot_node_id(&p.id), node_attrs(p)).unwrap();
        if p.composite().is_some() {
            let inner = format!("{indent}    ");
            writeln!(buf, "{indent}subgraph cluster_{} {{", sanitize(p.id.as_str())).unwrap();
            writeln!(buf, "{inner}label=\"{}\";", p.id).unwrap();
            writeln!(buf, "{inner}style=rounded;").unwrap();
            writeln!(buf, "{inner}color=gray50;").unwrap();
            write_level(buf, by_parent, Some(&p.id), &inner);
            writeln!(buf, "{indent}}}").unwrap();
        }
    }
}

/// Edges on feedback cycles that lack a Delay.
fn cycle_edges(net: &ProcessNetwork) -> Result<HashSet<(Id, Id)>> {
    let mut edges = HashSet::new();
    for cycle in net.undelayed_cycles()? {
        for window in cycle.windows(2) {
            edges.insert((window[0].clone(), window[1].clone()));
        }
        // Close the cycle: last -> first
        if let (Some(last), Some(first)) = (cycle.last(), cycle.first()) {
            edges.insert((last.clone(), first.clone()));
        }
    }
    Ok(edges)
}
