// rewrite.rs — Structural rewrites of the process network
//
// Every transformation is built on two primitives:
//   - `redirect` moves the outside-facing ports of a region onto its
//     replacement, keeping remote connections and boundary aliases;
//   - `destroy_chain` deletes the superseded region by forward
//     reachability, which `redirect` has already cut at the region's edges.
//
// Preconditions: flat network (see flatten.rs).
// Postconditions: each transformation is idempotent on its own output.
// Failure modes: inconsistent surgery or a section in an unexpected shape
//                → `NetworkError` (pass aborts). Candidates that simply do
//                not qualify are skipped and reported as notes.
// Side effects: mutates the network; emits tracing events.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::diag::{codes, Diagnostic};
use crate::error::{NetworkError, Result};
use crate::flatten::ensure_flat;
use crate::function::{DataType, Function};
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::parallel::{branch_chains, data_parallel_length};
use crate::process::{Direction, ProcessKind};
use crate::section::{find_contained_sections, ContainedSection};

/// Outcome of one transformation over the whole network.
#[derive(Debug, Default, Clone)]
pub struct RewriteReport {
    /// Number of rewrites applied.
    pub applied: usize,
    /// Notes for candidates that were considered and skipped.
    pub diagnostics: Vec<Diagnostic>,
}

impl RewriteReport {
    fn skip(&mut self, diag: Diagnostic) {
        debug!(message = %diag.message, "skipped rewrite candidate");
        self.diagnostics.push(diag);
    }
}

// ── Primitives ──────────────────────────────────────────────────────────────

/// Move every in-port of `old_start` onto `new_start` and every out-port of
/// `old_end` onto `new_end`.
///
/// Port names and types are kept, remote connections are re-attached to the
/// new ports, and graph boundary entries are retargeted. The old ports are
/// left disconnected on their (about to be destroyed) owners.
pub fn redirect(
    net: &mut ProcessNetwork,
    old_start: &Id,
    old_end: &Id,
    new_start: &Id,
    new_end: &Id,
) -> Result<()> {
    let ins = net.process(old_start)?.in_ports.clone();
    for key in ins {
        let port = net.port(key)?;
        let (name, ty) = (port.name.clone(), port.data_type.clone());
        let moved = net.add_port(new_start, name, Direction::In, ty)?;
        if let Some(remote) = net.disconnect(key)? {
            net.connect(remote, moved)?;
        }
        net.replace_boundary_port(key, moved);
    }

    let outs = net.process(old_end)?.out_ports.clone();
    for key in outs {
        let port = net.port(key)?;
        let (name, ty) = (port.name.clone(), port.data_type.clone());
        let moved = net.add_port(new_end, name, Direction::Out, ty)?;
        if let Some(remote) = net.disconnect(key)? {
            net.connect(moved, remote)?;
        }
        net.replace_boundary_port(key, moved);
    }
    Ok(())
}

/// Delete `start` and everything reachable forward from it.
/// Returns the number of processes removed.
pub fn destroy_chain(net: &mut ProcessNetwork, start: &Id) -> Result<usize> {
    let mut removed = 0;
    let mut stack = vec![start.clone()];
    while let Some(id) = stack.pop() {
        if !net.contains(&id) {
            continue;
        }
        let next = net.successors(&id)?;
        net.remove_process(&id)?;
        removed += 1;
        stack.extend(next.into_iter().rev());
    }
    Ok(removed)
}

// ── Transformations ─────────────────────────────────────────────────────────

/// Remove Zip/Unzip processes with exactly one input and one output.
pub fn remove_redundant(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    let candidates: Vec<Id> = net
        .processes()
        .filter(|p| (p.is_zip() || p.is_unzip()) && p.in_ports.len() == 1 && p.out_ports.len() == 1)
        .map(|p| p.id.clone())
        .collect();

    for id in candidates {
        let inp = net.port_at(&id, Direction::In, 0)?;
        let out = net.port_at(&id, Direction::Out, 0)?;
        let pred = net.disconnect(inp)?;
        let succ = net.disconnect(out)?;
        match (pred, succ) {
            (Some(p), Some(s)) => net.connect(p, s)?,
            (Some(p), None) => {
                net.replace_boundary_port(out, p);
            }
            (None, Some(s)) => {
                net.replace_boundary_port(inp, s);
            }
            (None, None) if net.is_boundary(inp) || net.is_boundary(out) => {
                report.skip(
                    Diagnostic::note(Some(id.clone()), "redundant process is the whole graph boundary; kept"),
                );
                continue;
            }
            (None, None) => {}
        }
        net.remove_process(&id)?;
        report.applied += 1;
    }
    info!(removed = report.applied, "remove_redundant");
    Ok(report)
}

/// Relabel single-input Comb processes as Maps with the same function.
pub fn convert_single_input_comb_to_map(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    let candidates: Vec<(Id, Function)> = net
        .processes()
        .filter_map(|p| match &p.kind {
            ProcessKind::Comb { function } if p.in_ports.len() == 1 => {
                Some((p.id.clone(), function.clone()))
            }
            _ => None,
        })
        .collect();
    for (id, function) in candidates {
        net.process_mut(&id)?.kind = ProcessKind::Map { function };
        report.applied += 1;
    }
    info!(converted = report.applied, "convert_single_input_comb_to_map");
    Ok(report)
}

/// Sections that qualify for the data-parallel rewrites, with their chain
/// length. Non-qualifying sections are reported on `report`.
fn data_parallel_sections(
    net: &ProcessNetwork,
    report: &mut RewriteReport,
) -> Result<Vec<(ContainedSection, usize)>> {
    let mut out = Vec::new();
    for section in find_contained_sections(net)? {
        match data_parallel_length(net, &section)? {
            Some(length) => out.push((section, length)),
            None => report.skip(
                Diagnostic::note(
                    Some(section.end.clone()),
                    format!("section {} is not data-parallel", section),
                )
                .with_code(codes::N0300)
                .with_related(section.start.clone(), "section starts here"),
            ),
        }
    }
    Ok(out)
}

fn chain_functions(net: &ProcessNetwork, chain: &[Id]) -> Result<Vec<Function>> {
    let mut functions = Vec::new();
    for id in chain {
        functions.extend_from_slice(net.process(id)?.functions());
    }
    Ok(functions)
}

/// Replace every branch chain of length > 1 in a data-parallel section by a
/// single CoalescedMap holding the chain's functions in order.
pub fn coalesce_data_parallel(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    for (section, length) in data_parallel_sections(net, &mut report)? {
        if length <= 1 {
            continue;
        }
        for chain in branch_chains(net, &section)? {
            let (first, last) = (&chain[0], &chain[chain.len() - 1]);
            let functions = chain_functions(net, &chain)?;
            let hierarchy = net.process(first)?.hierarchy.clone();
            let coalesced =
                net.add_fresh_process("_coalesced", ProcessKind::CoalescedMap { functions }, hierarchy)?;
            redirect(net, first, last, &coalesced, &coalesced)?;
            destroy_chain(net, first)?;
        }
        debug!(section = %section, length, "coalesced data-parallel section");
        report.applied += 1;
    }
    info!(sections = report.applied, "coalesce_data_parallel");
    Ok(report)
}

/// Array type carrying `n` elements of `element`, if known.
fn array_of(element: Option<&DataType>, n: usize) -> Option<DataType> {
    element.map(|t| DataType::array(t.name.clone(), Some(n)))
}

/// Split every data-parallel section with chain length > 1 into aligned
/// single-process segments by inserting a Zip→Unzip pair between adjacent
/// chain positions.
pub fn split_segments(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    for (section, length) in data_parallel_sections(net, &mut report)? {
        if length <= 1 {
            continue;
        }
        let chains = branch_chains(net, &section)?;
        let hierarchy = net.process(&section.start)?.hierarchy.clone();
        let n = chains.len();

        for pos in 0..length - 1 {
            let sample = net.port_at(&chains[0][pos], Direction::Out, 0)?;
            let ty = array_of(net.port(sample)?.data_type.as_ref(), n);
            let zip = net.add_fresh_process("_zip", ProcessKind::Zip, hierarchy.clone())?;
            let unzip = net.add_fresh_process("_unzip", ProcessKind::Unzip, hierarchy.clone())?;
            let zip_out = net.add_port(&zip, "out", Direction::Out, ty.clone())?;
            let unzip_in = net.add_port(&unzip, "in", Direction::In, ty)?;
            net.connect(zip_out, unzip_in)?;

            for (b, chain) in chains.iter().enumerate() {
                let from = net.port_at(&chain[pos], Direction::Out, 0)?;
                let to = net
                    .disconnect(from)?
                    .ok_or(NetworkError::UnknownPort { key: from })?;
                let from_ty = net.port(from)?.data_type.clone();
                let to_ty = net.port(to)?.data_type.clone();
                let zip_in = net.add_port(&zip, format!("in{b}"), Direction::In, from_ty)?;
                let unzip_out = net.add_port(&unzip, format!("out{b}"), Direction::Out, to_ty)?;
                net.connect(from, zip_in)?;
                net.connect(unzip_out, to)?;
            }
        }
        debug!(section = %section, segments = length, "split data-parallel section");
        report.applied += 1;
    }
    info!(sections = report.applied, "split_segments");
    Ok(report)
}

/// Replace every data-parallel Unzip → (one map per branch) → Zip section by
/// one ParallelMap.
///
/// Sections must already be reduced to one interior process per branch
/// (by `split_segments` or `coalesce_data_parallel`); anything longer is an
/// internal error.
pub fn fuse_unzip_map_zip(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    for (section, length) in data_parallel_sections(net, &mut report)? {
        if length != 1 {
            return Err(NetworkError::UnexpectedChainLength {
                start: section.start.clone(),
                end: section.end.clone(),
                length,
            });
        }
        let chains = branch_chains(net, &section)?;
        let functions = net.process(&chains[0][0])?.functions().to_vec();
        let hierarchy = net.process(&section.start)?.hierarchy.clone();
        let fused = net.add_fresh_process(
            "_parallel",
            ProcessKind::ParallelMap {
                branches: chains.len(),
                functions,
            },
            hierarchy,
        )?;
        redirect(net, &section.start, &section.end, &fused, &fused)?;
        destroy_chain(net, &section.start)?;
        debug!(section = %section, fused = %fused, branches = chains.len(), "fused section");
        report.applied += 1;
    }
    info!(sections = report.applied, "fuse_unzip_map_zip");
    Ok(report)
}

/// Merge directly chained ParallelMaps into one.
///
/// A chain is merged only if every element declares the same branch count
/// and each element's input type equals the previous element's output type.
pub fn coalesce_parallel_map_chains(net: &mut ProcessNetwork) -> Result<RewriteReport> {
    ensure_flat(net)?;
    let mut report = RewriteReport::default();
    let mut seen: HashSet<Id> = HashSet::new();

    for id in net.ids() {
        if seen.contains(&id) || !net.get(&id).is_some_and(|p| p.is_parallel_map()) {
            continue;
        }
        if let Some(pred) = net.predecessor(&id, 0)? {
            if net.process(&pred)?.is_parallel_map() {
                // Not a chain head; handled from its head.
                continue;
            }
        }

        let mut chain = vec![id.clone()];
        while let Some(next) = net.successor(&chain[chain.len() - 1], 0)? {
            if chain.contains(&next) || !net.process(&next)?.is_parallel_map() {
                break;
            }
            chain.push(next);
        }
        seen.extend(chain.iter().cloned());
        if chain.len() < 2 {
            continue;
        }

        if let Some(reason) = chain_mismatch(net, &chain)? {
            report.skip(
                Diagnostic::note(Some(id.clone()), format!("parallel map chain not coalesced: {reason}"))
                    .with_code(codes::N0301),
            );
            continue;
        }

        let (first, last) = (&chain[0], &chain[chain.len() - 1]);
        let ProcessKind::ParallelMap { branches, .. } = net.process(first)?.kind else {
            continue;
        };
        let functions = chain_functions(net, &chain)?;
        let hierarchy = net.process(first)?.hierarchy.clone();
        let merged = net.add_fresh_process(
            "_parallel",
            ProcessKind::ParallelMap {
                branches,
                functions,
            },
            hierarchy,
        )?;
        redirect(net, first, last, &merged, &merged)?;
        destroy_chain(net, first)?;
        debug!(merged = %merged, length = chain.len(), "coalesced parallel map chain");
        report.applied += 1;
    }
    info!(chains = report.applied, "coalesce_parallel_map_chains");
    Ok(report)
}

/// First reason a ParallelMap chain cannot be merged, if any.
fn chain_mismatch(net: &ProcessNetwork, chain: &[Id]) -> Result<Option<String>> {
    for pair in chain.windows(2) {
        let (prev, next) = (net.process(&pair[0])?, net.process(&pair[1])?);
        let (bp, bn) = match (&prev.kind, &next.kind) {
            (ProcessKind::ParallelMap { branches: a, .. }, ProcessKind::ParallelMap { branches: b, .. }) => {
                (*a, *b)
            }
            _ => return Ok(Some(format!("'{}' is not a parallel map", next.id))),
        };
        if bp != bn {
            return Ok(Some(format!(
                "'{}' has {} branches but '{}' has {}",
                prev.id, bp, next.id, bn
            )));
        }
        let produced = prev.functions().last().map(Function::output_type);
        let consumed = next.functions().first().and_then(Function::input_type);
        if produced != consumed {
            return Ok(Some(format!(
                "'{}' produces {} but '{}' consumes {}",
                prev.id,
                produced.map_or("nothing".to_string(), ToString::to_string),
                next.id,
                consumed.map_or("nothing".to_string(), ToString::to_string),
            )));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagLevel;
    use crate::process::Hierarchy;
    use crate::section::tests::{add_map, int, link, parallel_region};

    fn count_kind(net: &ProcessNetwork, tag: &str) -> usize {
        net.processes().filter(|p| p.kind.tag() == tag).count()
    }

    fn boundary_counts(net: &ProcessNetwork) -> (usize, usize) {
        (net.inputs().len(), net.outputs().len())
    }

    // ── Primitives ──────────────────────────────────────────────────────

    #[test]
    fn redirect_then_destroy_conserves_boundary() {
        // a -> b, input at a, output at b; replace the whole chain with c.
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "a", "x");
        let b = add_map(&mut net, "b", "x");
        link(&mut net, &a, 0, &b, 0);
        let a_in = net.port_at(&a, Direction::In, 0).unwrap();
        let b_out = net.port_at(&b, Direction::Out, 0).unwrap();
        net.add_input(a_in).unwrap();
        net.add_output(b_out).unwrap();
        let before = boundary_counts(&net);

        let c = net
            .add_process(
                "c",
                ProcessKind::CoalescedMap {
                    functions: vec![Function::unary("f", int(), "x")],
                },
            )
            .unwrap();
        redirect(&mut net, &a, &b, &c, &c).unwrap();
        assert_eq!(destroy_chain(&mut net, &a).unwrap(), 2);

        assert_eq!(boundary_counts(&net), before);
        assert_eq!(net.len(), 1);
        let c_in = net.port_at(&c, Direction::In, 0).unwrap();
        let c_out = net.port_at(&c, Direction::Out, 0).unwrap();
        assert_eq!(net.inputs(), &[c_in]);
        assert_eq!(net.outputs(), &[c_out]);
        assert_eq!(net.port(c_in).unwrap().name, Id::new("in"));
        assert!(net.validate().is_empty());
    }

    #[test]
    fn redirect_keeps_remote_connections() {
        let mut net = parallel_region(2, 1, |_, _| "x".to_string());
        let c = net
            .add_process(
                "pm",
                ProcessKind::ParallelMap {
                    branches: 2,
                    functions: vec![Function::unary("f", int(), "x")],
                },
            )
            .unwrap();
        let (unzip, zip) = (Id::new("unzip"), Id::new("zip"));
        redirect(&mut net, &unzip, &zip, &c, &c).unwrap();
        destroy_chain(&mut net, &unzip).unwrap();
        assert_eq!(net.predecessor(&c, 0).unwrap(), Some(Id::new("src")));
        assert_eq!(net.successor(&c, 0).unwrap(), Some(Id::new("dst")));
        assert_eq!(net.len(), 3);
    }

    #[test]
    fn destroy_chain_skips_removed_nodes() {
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "a", "x");
        assert_eq!(destroy_chain(&mut net, &a).unwrap(), 1);
        assert_eq!(destroy_chain(&mut net, &a).unwrap(), 0);
    }

    // ── remove_redundant ────────────────────────────────────────────────

    fn with_redundant_zip() -> ProcessNetwork {
        // a -> zip(1) -> b
        let mut net = ProcessNetwork::new();
        let a = add_map(&mut net, "a", "x");
        let b = add_map(&mut net, "b", "x");
        let zip = net.add_process("zip", ProcessKind::Zip).unwrap();
        net.add_port(&zip, "in0", Direction::In, None).unwrap();
        net.add_port(&zip, "out", Direction::Out, None).unwrap();
        link(&mut net, &a, 0, &zip, 0);
        link(&mut net, &zip, 0, &b, 0);
        let a_in = net.port_at(&a, Direction::In, 0).unwrap();
        let b_out = net.port_at(&b, Direction::Out, 0).unwrap();
        net.add_input(a_in).unwrap();
        net.add_output(b_out).unwrap();
        net
    }

    #[test]
    fn redundant_zip_is_spliced_out() {
        let mut net = with_redundant_zip();
        let report = remove_redundant(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        assert!(!net.contains(&Id::new("zip")));
        assert_eq!(net.successor(&Id::new("a"), 0).unwrap(), Some(Id::new("b")));
    }

    #[test]
    fn remove_redundant_is_idempotent() {
        let mut net = with_redundant_zip();
        remove_redundant(&mut net).unwrap();
        let once = net.fingerprint().unwrap();
        let report = remove_redundant(&mut net).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(net.fingerprint().unwrap(), once);
    }

    #[test]
    fn redundant_boundary_unzip_retargets_input() {
        // unzip(1) -> b, graph input on the unzip.
        let mut net = ProcessNetwork::new();
        let b = add_map(&mut net, "b", "x");
        let unzip = net.add_process("unzip", ProcessKind::Unzip).unwrap();
        let u_in = net.add_port(&unzip, "in", Direction::In, None).unwrap();
        net.add_port(&unzip, "out0", Direction::Out, None).unwrap();
        link(&mut net, &unzip, 0, &b, 0);
        net.add_input(u_in).unwrap();
        let b_out = net.port_at(&b, Direction::Out, 0).unwrap();
        net.add_output(b_out).unwrap();

        remove_redundant(&mut net).unwrap();
        let b_in = net.port_at(&b, Direction::In, 0).unwrap();
        assert_eq!(net.inputs(), &[b_in]);
        assert!(net.validate().is_empty());
    }

    #[test]
    fn lone_boundary_zip_is_kept() {
        let mut net = ProcessNetwork::new();
        let zip = net.add_process("zip", ProcessKind::Zip).unwrap();
        let i = net.add_port(&zip, "in0", Direction::In, None).unwrap();
        let o = net.add_port(&zip, "out", Direction::Out, None).unwrap();
        net.add_input(i).unwrap();
        net.add_output(o).unwrap();
        let report = remove_redundant(&mut net).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(net.contains(&zip));
    }

    // ── comb to map ─────────────────────────────────────────────────────

    #[test]
    fn single_input_comb_becomes_map() {
        let mut net = ProcessNetwork::new();
        let f = Function::unary("g", int(), "x");
        let one = net
            .add_process("one", ProcessKind::Comb { function: f.clone() })
            .unwrap();
        net.add_port(&one, "in0", Direction::In, None).unwrap();
        net.add_port(&one, "out", Direction::Out, None).unwrap();
        let two = net
            .add_process("two", ProcessKind::Comb { function: f.clone() })
            .unwrap();
        net.add_port(&two, "in0", Direction::In, None).unwrap();
        net.add_port(&two, "in1", Direction::In, None).unwrap();
        net.add_port(&two, "out", Direction::Out, None).unwrap();

        let report = convert_single_input_comb_to_map(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(net.process(&one).unwrap().kind, ProcessKind::Map { function: f });
        assert_eq!(net.process(&two).unwrap().kind.tag(), "comb");
    }

    // ── data-parallel rewrites ──────────────────────────────────────────

    #[test]
    fn coalescing_reduces_region_to_one_map_per_branch() {
        let mut net = parallel_region(2, 2, |_, pos| format!("return x + {pos};"));
        // unzip + zip + 2*2 maps, plus src and dst around the region.
        assert_eq!(net.len(), 6 + 2);
        let report = coalesce_data_parallel(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(net.len(), 4 + 2);
        assert_eq!(count_kind(&net, "coalesced_map"), 2);
        for p in net.processes().filter(|p| p.kind.tag() == "coalesced_map") {
            let bodies: Vec<&str> = p.functions().iter().map(|f| f.body.as_str()).collect();
            assert_eq!(bodies, vec!["return x + 0;", "return x + 1;"]);
        }
        assert!(net.validate().is_empty());
    }

    #[test]
    fn coalescing_skips_non_parallel_sections() {
        let mut net = parallel_region(2, 2, |b, _| format!("return x + {b};"));
        let report = coalesce_data_parallel(&mut net).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].level, DiagLevel::Note);
        assert_eq!(report.diagnostics[0].code, Some(codes::N0300));
        assert_eq!(net.len(), 8);
    }

    #[test]
    fn coalescing_is_idempotent() {
        let mut net = parallel_region(3, 3, |_, _| "x".to_string());
        coalesce_data_parallel(&mut net).unwrap();
        let once = net.fingerprint().unwrap();
        assert_eq!(coalesce_data_parallel(&mut net).unwrap().applied, 0);
        assert_eq!(net.fingerprint().unwrap(), once);
    }

    #[test]
    fn split_produces_aligned_segments() {
        let mut net = parallel_region(2, 3, |_, pos| format!("x{pos}"));
        let report = split_segments(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        // Two inserted zip/unzip pairs.
        assert_eq!(count_kind(&net, "zip"), 3);
        assert_eq!(count_kind(&net, "unzip"), 3);
        let sections = find_contained_sections(&net).unwrap();
        assert_eq!(sections.len(), 3);
        for s in &sections {
            assert_eq!(data_parallel_length(&net, s).unwrap(), Some(1));
        }
        assert!(net.validate().is_empty());
    }

    #[test]
    fn split_then_fuse_collapses_to_parallel_map() {
        let mut net = parallel_region(2, 1, |_, _| "return x * 2;".to_string());
        split_segments(&mut net).unwrap();
        let report = fuse_unzip_map_zip(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(net.len(), 3);
        let pm = net.processes().find(|p| p.is_parallel_map()).unwrap();
        assert!(matches!(pm.kind, ProcessKind::ParallelMap { branches: 2, .. }));
        assert_eq!(net.predecessor(&pm.id, 0).unwrap(), Some(Id::new("src")));
        assert_eq!(net.successor(&pm.id, 0).unwrap(), Some(Id::new("dst")));
    }

    #[test]
    fn split_fuse_and_chain_coalescing_yield_single_parallel_map() {
        let mut net = parallel_region(2, 2, |_, pos| format!("return x + {pos};"));
        split_segments(&mut net).unwrap();
        assert_eq!(fuse_unzip_map_zip(&mut net).unwrap().applied, 2);
        assert_eq!(count_kind(&net, "parallel_map"), 2);
        assert_eq!(coalesce_parallel_map_chains(&mut net).unwrap().applied, 1);

        assert_eq!(net.len(), 3);
        let pm = net.processes().find(|p| p.is_parallel_map()).unwrap();
        match &pm.kind {
            ProcessKind::ParallelMap {
                branches,
                functions,
            } => {
                assert_eq!(*branches, 2);
                assert_eq!(functions.len(), 2);
            }
            _ => unreachable!(),
        }
        assert!(net.validate().is_empty());
    }

    #[test]
    fn coalesce_then_fuse_carries_all_functions() {
        let mut net = parallel_region(3, 2, |_, pos| format!("x{pos}"));
        coalesce_data_parallel(&mut net).unwrap();
        fuse_unzip_map_zip(&mut net).unwrap();
        let pm = net.processes().find(|p| p.is_parallel_map()).unwrap();
        assert_eq!(pm.functions().len(), 2);
        assert!(matches!(pm.kind, ProcessKind::ParallelMap { branches: 3, .. }));
    }

    #[test]
    fn fuse_rejects_unsplit_sections() {
        let mut net = parallel_region(2, 2, |_, _| "x".to_string());
        let err = fuse_unzip_map_zip(&mut net).unwrap_err();
        assert_eq!(
            err,
            NetworkError::UnexpectedChainLength {
                start: Id::new("unzip"),
                end: Id::new("zip"),
                length: 2,
            }
        );
    }

    // ── ParallelMap chains ──────────────────────────────────────────────

    fn add_pm(net: &mut ProcessNetwork, id: &str, branches: usize, from: &str, to: &str) -> Id {
        let f = Function {
            name: id.to_string(),
            params: vec![crate::function::Param {
                name: "x".to_string(),
                data_type: DataType::scalar(from),
                is_const: false,
            }],
            return_type: DataType::scalar(to),
            body: String::new(),
        };
        let id = net
            .add_process_in(
                id,
                ProcessKind::ParallelMap {
                    branches,
                    functions: vec![f],
                },
                Hierarchy::root(),
            )
            .unwrap();
        net.add_port(&id, "in", Direction::In, None).unwrap();
        net.add_port(&id, "out", Direction::Out, None).unwrap();
        id
    }

    fn pm_chain(specs: &[(&str, usize, &str, &str)]) -> ProcessNetwork {
        let mut net = ProcessNetwork::new();
        let mut prev: Option<Id> = None;
        for (id, branches, from, to) in specs {
            let id = add_pm(&mut net, id, *branches, from, to);
            match &prev {
                Some(p) => link(&mut net, p, 0, &id, 0),
                None => {
                    let i = net.port_at(&id, Direction::In, 0).unwrap();
                    net.add_input(i).unwrap();
                }
            }
            prev = Some(id);
        }
        let last = prev.unwrap();
        let o = net.port_at(&last, Direction::Out, 0).unwrap();
        net.add_output(o).unwrap();
        net
    }

    #[test]
    fn matching_parallel_maps_are_merged() {
        let mut net = pm_chain(&[("p1", 4, "int", "float"), ("p2", 4, "float", "float"), ("p3", 4, "float", "int")]);
        let report = coalesce_parallel_map_chains(&mut net).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(net.len(), 1);
        let pm = net.processes().next().unwrap();
        let names: Vec<&str> = pm.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "p3"]);
        assert_eq!(boundary_counts(&net), (1, 1));
    }

    #[test]
    fn branch_count_mismatch_skips_chain() {
        let mut net = pm_chain(&[("p1", 4, "int", "int"), ("p2", 2, "int", "int")]);
        let report = coalesce_parallel_map_chains(&mut net).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.diagnostics[0].code, Some(codes::N0301));
        assert_eq!(net.len(), 2);
    }

    #[test]
    fn type_mismatch_skips_chain() {
        let mut net = pm_chain(&[("p1", 4, "int", "float"), ("p2", 4, "int", "int")]);
        let report = coalesce_parallel_map_chains(&mut net).unwrap();
        assert_eq!(report.applied, 0);
        assert!(report.diagnostics[0].message.contains("produces float"));
        assert_eq!(net.len(), 2);
    }
}
