// section.rs — Contained-section discovery
//
// A contained section is the region between an Unzip (`start`) and a Zip
// (`end`) in which every path leaving `start` ends at `end` and every path
// entering `end` comes from `start`. The finder walks backward from the
// graph outputs with one global visited set; at each Zip it looks upstream
// (with a separate local visited set) for the nearest Unzip and checks
// containment in both directions.
//
// Preconditions: flat network.
// Postconditions: returned sections are maximal (no section is nested in
//                 another returned one) and listed in discovery order.
// Failure modes: missing references → `NetworkError`. A Zip without a
//                matching Unzip is simply not reported.
// Side effects: none.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::id::Id;
use crate::network::ProcessNetwork;
use crate::process::Direction;

/// Boundary processes of a discovered region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainedSection {
    pub start: Id,
    pub end: Id,
}

impl fmt::Display for ContainedSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Find every maximal contained section of the network.
pub fn find_contained_sections(net: &ProcessNetwork) -> Result<Vec<ContainedSection>> {
    let mut visited = HashSet::new();
    let mut sections = Vec::new();
    for id in net.output_processes()? {
        search_upward(net, &id, &mut visited, &mut sections)?;
    }
    Ok(sections)
}

fn search_upward(
    net: &ProcessNetwork,
    id: &Id,
    visited: &mut HashSet<Id>,
    sections: &mut Vec<ContainedSection>,
) -> Result<()> {
    if !visited.insert(id.clone()) {
        return Ok(());
    }

    let mut current = id.clone();
    if net.process(id)?.is_zip() {
        match find_nearest_unzip(net, id, &mut HashSet::new())? {
            Some(start) if is_contained_section(net, &start, id)? => {
                debug!(start = %start, end = %id, "found contained section");
                sections.push(ContainedSection {
                    start: start.clone(),
                    end: id.clone(),
                });
                // The interior is reachable only through `start`.
                visited.insert(start.clone());
                current = start;
            }
            Some(start) => {
                debug!(start = %start, end = %id, "candidate section is not contained");
            }
            None => {
                debug!(end = %id, "no unzip upstream of zip");
            }
        }
    }

    for pred in net.predecessors(&current)? {
        search_upward(net, &pred, visited, sections)?;
    }
    Ok(())
}

/// Nearest Unzip upstream of `id`, exploring in-ports left to right.
pub fn find_nearest_unzip(
    net: &ProcessNetwork,
    id: &Id,
    visited: &mut HashSet<Id>,
) -> Result<Option<Id>> {
    if !visited.insert(id.clone()) {
        return Ok(None);
    }
    if net.process(id)?.is_unzip() {
        return Ok(Some(id.clone()));
    }
    for pred in net.predecessors(id)? {
        if let Some(found) = find_nearest_unzip(net, &pred, visited)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Bidirectional containment check between `start` and `end`.
pub fn is_contained_section(net: &ProcessNetwork, start: &Id, end: &Id) -> Result<bool> {
    Ok(confined(net, start, end, Direction::Out, &mut HashSet::new())?
        && confined(net, end, start, Direction::In, &mut HashSet::new())?)
}

/// True if every path from `current` along `direction` reaches `target`.
/// An unconnected port ends the check with `false`.
fn confined(
    net: &ProcessNetwork,
    current: &Id,
    target: &Id,
    direction: Direction,
    visited: &mut HashSet<Id>,
) -> Result<bool> {
    if current == target {
        return Ok(true);
    }
    if !visited.insert(current.clone()) {
        return Ok(true);
    }
    let process = net.process(current)?;
    let ports = match direction {
        Direction::Out => &process.out_ports,
        Direction::In => &process.in_ports,
    };
    if ports.is_empty() {
        return Ok(false);
    }
    for &key in ports {
        let peer = match net.connected(key)? {
            Some(peer) => peer,
            None => return Ok(false),
        };
        let next = net.owner(peer)?.clone();
        if !confined(net, &next, target, direction, visited)? {
            return Ok(false);
        }
    }
    Ok(true)
}
