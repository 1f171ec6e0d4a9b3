// pass.rs — Pass descriptor module: metadata, dependency resolution, options
//
// Declares the middle-end's passes (loading the description is outside the
// runner), their dependency edges, and the options that select between the
// data-parallel strategies. Used by the pipeline runner to compute the
// ordered pass subset for each --emit target.

use std::collections::HashSet;

// ── Pass identifiers ───────────────────────────────────────────────────────

/// Identifies each middle-end pass. Loading happens before the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Flatten,
    Validate,
    RemoveRedundant,
    CombToMap,
    CoalesceDataParallel,
    SplitSegments,
    FuseUnzipMapZip,
    CoalesceParallelMaps,
    Schedule,
}

// ── Options ────────────────────────────────────────────────────────────────

/// How data-parallel sections are reduced to one interior process per branch
/// before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelStrategy {
    /// Collapse each branch chain into one CoalescedMap.
    #[default]
    Coalesce,
    /// Cut the section into aligned single-process segments.
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub strategy: ParallelStrategy,
    /// Run the data-parallel passes at all (false for a sequential target).
    pub data_parallel: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            strategy: ParallelStrategy::Coalesce,
            data_parallel: true,
        }
    }
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Postconditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Flatten => PassDescriptor {
            name: "flatten",
            invariants: "no composite processes remain",
        },
        PassId::Validate => PassDescriptor {
            name: "validate",
            invariants: "port arity matches kind, boundary ports free, every cycle has a delay",
        },
        PassId::RemoveRedundant => PassDescriptor {
            name: "remove_redundant",
            invariants: "no zip/unzip with a single in- and out-port",
        },
        PassId::CombToMap => PassDescriptor {
            name: "comb_to_map",
            invariants: "no single-input comb",
        },
        PassId::CoalesceDataParallel => PassDescriptor {
            name: "coalesce_data_parallel",
            invariants: "every data-parallel section has chain length 1",
        },
        PassId::SplitSegments => PassDescriptor {
            name: "split_segments",
            invariants: "every data-parallel section has chain length 1",
        },
        PassId::FuseUnzipMapZip => PassDescriptor {
            name: "fuse_unzip_map_zip",
            invariants: "no data-parallel section remains",
        },
        PassId::CoalesceParallelMaps => PassDescriptor {
            name: "coalesce_parallel_maps",
            invariants: "no two compatible parallel maps are directly chained",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            invariants: "reachable processes appear once, producers precede non-delay consumers",
        },
    }
}

/// Passes whose output `id` consumes, under the given options.
pub fn dependencies(id: PassId, options: &PipelineOptions) -> Vec<PassId> {
    match id {
        PassId::Flatten => vec![],
        PassId::Validate => vec![PassId::Flatten],
        PassId::RemoveRedundant => vec![PassId::Validate],
        PassId::CombToMap => vec![PassId::RemoveRedundant],
        PassId::CoalesceDataParallel | PassId::SplitSegments => vec![PassId::CombToMap],
        PassId::FuseUnzipMapZip => match options.strategy {
            ParallelStrategy::Coalesce => vec![PassId::CoalesceDataParallel],
            ParallelStrategy::Split => vec![PassId::SplitSegments],
        },
        PassId::CoalesceParallelMaps => vec![PassId::FuseUnzipMapZip],
        PassId::Schedule => vec![last_rewrite(options)],
    }
}

/// The last structural rewrite under the given options; running up to it
/// yields the fully rewritten network.
pub fn last_rewrite(options: &PipelineOptions) -> PassId {
    if options.data_parallel {
        PassId::CoalesceParallelMaps
    } else {
        PassId::CombToMap
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 9] = [
    PassId::Flatten,
    PassId::Validate,
    PassId::RemoveRedundant,
    PassId::CombToMap,
    PassId::CoalesceDataParallel,
    PassId::SplitSegments,
    PassId::FuseUnzipMapZip,
    PassId::CoalesceParallelMaps,
    PassId::Schedule,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId, options: &PipelineOptions) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, options, &mut visited, &mut order);
    order
}

fn visit(id: PassId, options: &PipelineOptions, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for dep in dependencies(id, options) {
        visit(dep, options, visited, order);
    }
    order.push(id);
}

// ── Stage certificates ─────────────────────────────────────────────────────

/// Machine-checkable postconditions of a pass.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the obligations that do not hold.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
