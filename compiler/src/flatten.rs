// flatten.rs — Composite inlining
//
// Replaces every composite process by its children. Composite port `i` is
// represented on the inside by the InPort/OutPort child recorded at index
// `i` of the composite; inlining splices the outside connection straight to
// whatever that helper is connected to, then drops the helper and the
// composite. Innermost composites go first, so a composite being inlined
// never contains another composite.
//
// Preconditions: composites are well-formed (`Process::check` holds).
// Postconditions: network contains only leaf processes; connectivity and
//                 boundary ports are preserved modulo the helper processes.
// Failure modes: malformed composite bookkeeping → `NetworkError`. A fed
//                composite input that nothing inside reads is not an error:
//                the upstream port is left open and a note is reported.
// Side effects: mutates the network.

use tracing::debug;

use crate::diag::Diagnostic;
use crate::error::{NetworkError, Result};
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::process::{Direction, ProcessKind};
use crate::rewrite::RewriteReport;

/// Inline all composites. `applied` counts the composites removed.
pub fn flatten(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    let mut report = RewriteReport::default();
    while let Some(id) = innermost_composite(net) {
        inline_composite(net, &id, &mut report)?;
        report.applied += 1;
    }
    Ok(report)
}

/// Error out if any composite remains.
pub fn ensure_flat(net: &ProcessNetwork) -> Result<()> {
    match net.processes().find(|p| !p.is_leaf()) {
        Some(p) => Err(NetworkError::NotFlat { id: p.id.clone() }),
        None => Ok(()),
    }
}

/// Deepest composite; ties broken by smallest Id.
fn innermost_composite(net: &ProcessNetwork) -> Option<Id> {
    let mut best: Option<(usize, &Id)> = None;
    for p in net.processes().filter(|p| !p.is_leaf()) {
        let depth = p.hierarchy.depth();
        if best.map_or(true, |(d, _)| depth > d) {
            best = Some((depth, &p.id));
        }
    }
    best.map(|(_, id)| id.clone())
}

fn malformed(id: &Id, reason: String) -> NetworkError {
    NetworkError::MalformedComposite {
        id: id.clone(),
        reason,
    }
}

fn inline_composite(net: &mut ProcessNetwork, id: &Id, report: &mut RewriteReport) -> Result<()> {
    let process = net.process(id)?;
    let composite = process
        .composite()
        .cloned()
        .ok_or_else(|| NetworkError::NotFlat { id: id.clone() })?;
    let hierarchy = process.hierarchy.clone();
    let outer_ins = process.in_ports.clone();
    let outer_outs = process.out_ports.clone();
    if outer_ins.len() != composite.inputs.len() || outer_outs.len() != composite.outputs.len() {
        return Err(malformed(
            id,
            "port count differs from boundary helper count".to_string(),
        ));
    }

    for (i, &outer) in outer_ins.iter().enumerate() {
        let helper = &composite.inputs[i];
        if !matches!(net.process(helper)?.kind, ProcessKind::InPort) {
            return Err(malformed(id, format!("input {i} helper '{helper}' is not an inport")));
        }
        let inner = net.port_at(helper, Direction::Out, 0)?;
        let upstream = net.disconnect(outer)?;
        let downstream = net.disconnect(inner)?;
        match (upstream, downstream) {
            (Some(u), Some(d)) => net.connect(u, d)?,
            (None, Some(d)) => {
                net.replace_boundary_port(outer, d);
            }
            (_, None) if net.is_boundary(outer) => {
                return Err(malformed(id, format!("graph input routed to unused input {i}")));
            }
            (Some(u), None) => {
                let label = net.port_label(u);
                debug!(composite = %id, input = i, port = %label, "composite input reads nothing");
                report.diagnostics.push(Diagnostic::note(
                    Some(id.clone()),
                    format!("input {i} of composite '{id}' is not read inside; {label} is left unconnected"),
                ));
            }
            (None, None) => {}
        }
        net.remove_process(helper)?;
    }

    for (i, &outer) in outer_outs.iter().enumerate() {
        let helper = &composite.outputs[i];
        if !matches!(net.process(helper)?.kind, ProcessKind::OutPort) {
            return Err(malformed(id, format!("output {i} helper '{helper}' is not an outport")));
        }
        let inner = net.port_at(helper, Direction::In, 0)?;
        let producer = net.disconnect(inner)?;
        let downstream = net.disconnect(outer)?;
        match (producer, downstream) {
            (Some(p), Some(d)) => net.connect(p, d)?,
            (Some(p), None) => {
                net.replace_boundary_port(outer, p);
            }
            (None, _) if net.is_boundary(outer) => {
                return Err(malformed(id, format!("graph output reads undriven output {i}")));
            }
            (None, _) => {}
        }
        net.remove_process(helper)?;
    }

    // Helpers were removed from the child list by `remove_process`.
    let children = net.process(id)?.composite().map(|c| c.children.clone()).unwrap_or_default();
    for child in &children {
        let p = net.process_mut(child)?;
        p.hierarchy = p.hierarchy.without(id);
    }
    if let Some(parent) = hierarchy.parent() {
        if let ProcessKind::Composite(c) = &mut net.process_mut(parent)?.kind {
            c.children.extend(children.iter().cloned());
        }
    }
    net.remove_process(id)?;
    debug!(composite = %id, children = children.len(), "inlined composite");
    Ok(())
}
