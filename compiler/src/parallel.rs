// parallel.rs — Data-parallelism check for contained sections
//
// A contained section is data-parallel when its branches are the same
// computation replicated: every branch is a chain of map-shaped processes,
// all chains have the same length, and the processes at each position are
// pairwise equal in kind and function.

use tracing::debug;

use crate::error::Result;
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::process::same_computation;
use crate::section::ContainedSection;

/// Interior chain of every branch of `section`, one per out-port of `start`.
///
/// Each chain follows the first out-port of every interior process until it
/// reaches `end`. A chain that runs into an unconnected port stops there;
/// such a chain can never satisfy the equality requirements below.
pub fn branch_chains(net: &ProcessNetwork, section: &ContainedSection) -> Result<Vec<Vec<Id>>> {
    let start = net.process(&section.start)?;
    let mut chains = Vec::with_capacity(start.out_ports.len());
    for &key in &start.out_ports {
        let mut chain = Vec::new();
        let mut next = match net.connected(key)? {
            Some(peer) => Some(net.owner(peer)?.clone()),
            None => None,
        };
        while let Some(id) = next {
            if id == section.end || chain.contains(&id) {
                break;
            }
            next = if net.process(&id)?.out_ports.is_empty() {
                None
            } else {
                net.successor(&id, 0)?
            };
            chain.push(id);
        }
        chains.push(chain);
    }
    Ok(chains)
}

/// Common chain length of a data-parallel section, or `None` if the
/// section is not data-parallel.
pub fn data_parallel_length(net: &ProcessNetwork, section: &ContainedSection) -> Result<Option<usize>> {
    let chains = branch_chains(net, section)?;
    let Some(first) = chains.first() else {
        return Ok(None);
    };
    let length = first.len();
    if length == 0 {
        debug!(section = %section, "first branch has no interior processes");
        return Ok(None);
    }
    if chains.iter().any(|c| c.len() != length) {
        debug!(section = %section, "branches have different lengths");
        return Ok(None);
    }
    for chain in &chains {
        for id in chain {
            if !net.process(id)?.is_map_shaped() {
                debug!(section = %section, process = %id, "branch contains a non-map process");
                return Ok(None);
            }
        }
    }
    for pos in 0..length {
        let reference = net.process(&first[pos])?;
        for chain in &chains[1..] {
            if !same_computation(reference, net.process(&chain[pos])?) {
                debug!(section = %section, position = pos, "branches differ");
                return Ok(None);
            }
        }
    }
    Ok(Some(length))
}

/// Decide whether `section` is data-parallel.
pub fn is_data_parallel(net: &ProcessNetwork, section: &ContainedSection) -> Result<bool> {
    Ok(data_parallel_length(net, section)?.is_some())
}
