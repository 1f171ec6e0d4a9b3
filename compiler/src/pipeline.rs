// pipeline.rs — Compilation state and pass orchestration
//
// Holds the network under transformation plus the pass artifacts, and runs
// the minimal set of passes for a given terminal PassId.
//
// Preconditions: the network has been loaded (see description.rs).
// Postconditions: all passes in `required_passes(terminal)` have run, or
//                 `has_error` is set.
// Failure modes: any pass emitting error-level diagnostics; an internal
//                `NetworkError` (reported as `E0900`); schedule cert failure.
// Side effects: calls on_pass_complete callback after each pass for immediate display.

use std::time::Instant;

use tracing::{debug, error};

use crate::diag::{codes, has_errors, Diagnostic};
use crate::error::NetworkError;
use crate::network::ProcessNetwork;
use crate::pass::{descriptor, required_passes, PassId, PipelineOptions, StageCert};
use crate::rewrite::{self, RewriteReport};
use crate::schedule::Schedule;

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds and cache-key use.
///
/// `source_hash`: SHA-256 of the raw description text.
/// `network_fingerprint`: `ProcessNetwork::fingerprint()` of the network the
/// emitted artifacts were produced from.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub network_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the network fingerprint (64 characters).
    pub fn network_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.network_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"network_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.network_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Compute provenance from the description text and a network.
pub fn compute_provenance(source: &str, network: &ProcessNetwork) -> Result<Provenance, NetworkError> {
    use sha2::{Digest, Sha256};

    let source_hash = {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    };

    Ok(Provenance {
        source_hash,
        network_fingerprint: network.fingerprint()?,
        compiler_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Holds the network, pass artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub source: String,
    pub network: ProcessNetwork,
    /// Rewrites applied per pass, in execution order.
    pub applied: Vec<(PassId, usize)>,
    pub schedule: Option<Schedule>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(source: String, network: ProcessNetwork) -> Self {
        Self {
            source,
            network,
            applied: Vec::new(),
            schedule: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }

    /// Load a JSON description into a fresh state.
    pub fn load(source: String) -> Result<Self, Vec<Diagnostic>> {
        let network = crate::description::load_network(&source)?;
        Ok(Self::new(source, network))
    }

    /// Number of rewrites `pass` applied, if it ran.
    pub fn applied_by(&self, pass: PassId) -> Option<usize> {
        self.applied
            .iter()
            .find(|(p, _)| *p == pass)
            .map(|(_, n)| *n)
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// An internal-consistency failure, surfaced as a diagnostic.
fn internal_error(pass_id: PassId, err: &NetworkError) -> Diagnostic {
    error!(pass = descriptor(pass_id).name, %err, "internal consistency error");
    Diagnostic::error(
        None,
        format!("internal error in pass '{}': {}", descriptor(pass_id).name, err),
    )
    .with_code(codes::E0900)
    .with_hint("this indicates a defect in the middle-end, not in the input network")
}

/// Per-pass post-processing: callback, accumulate, verbose, error check.
/// Returns Err if error diagnostics found.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: std::time::Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "syncflow: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// Run one structural pass over the network.
fn run_network_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
    pass: impl FnOnce(&mut ProcessNetwork) -> Result<RewriteReport, NetworkError>,
) -> Result<(), PipelineError> {
    let t = Instant::now();
    let result = pass(&mut state.network);
    let elapsed = t.elapsed();
    let diags = match result {
        Ok(report) => {
            debug!(pass = descriptor(pass_id).name, applied = report.applied, "pass finished");
            state.applied.push((pass_id, report.applied));
            report.diagnostics
        }
        Err(e) => vec![internal_error(pass_id, &e)],
    };
    finish_pass(state, pass_id, diags, elapsed, verbose, on_pass_complete)
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → verbose → error check.
///
/// Postconditions: passes in `required_passes(terminal, options)` have run and
///   `state.provenance` describes the resulting network, or `state.has_error`
///   is true.
/// Failure modes: any pass producing error-level diagnostics; schedule cert failure.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &PipelineOptions,
    verbose: bool,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let passes = required_passes(terminal, options);
    let cb = &mut on_pass_complete;

    for &pass_id in &passes {
        match pass_id {
            PassId::Flatten => run_network_pass(state, pass_id, verbose, cb, crate::flatten::flatten)?,
            PassId::Validate => {
                let t = Instant::now();
                let diags = state.network.validate();
                finish_pass(state, pass_id, diags, t.elapsed(), verbose, cb)?;
            }
            PassId::RemoveRedundant => {
                run_network_pass(state, pass_id, verbose, cb, rewrite::remove_redundant)?
            }
            PassId::CombToMap => run_network_pass(
                state,
                pass_id,
                verbose,
                cb,
                rewrite::convert_single_input_comb_to_map,
            )?,
            PassId::CoalesceDataParallel => {
                run_network_pass(state, pass_id, verbose, cb, rewrite::coalesce_data_parallel)?
            }
            PassId::SplitSegments => {
                run_network_pass(state, pass_id, verbose, cb, rewrite::split_segments)?
            }
            PassId::FuseUnzipMapZip => {
                run_network_pass(state, pass_id, verbose, cb, rewrite::fuse_unzip_map_zip)?
            }
            PassId::CoalesceParallelMaps => run_network_pass(
                state,
                pass_id,
                verbose,
                cb,
                rewrite::coalesce_parallel_map_chains,
            )?,
            PassId::Schedule => run_schedule(state, verbose, cb)?,
        }
    }

    match compute_provenance(&state.source, &state.network) {
        Ok(provenance) => state.provenance = Some(provenance),
        Err(e) => {
            let diags = vec![internal_error(terminal, &e)];
            cb(terminal, &diags);
            state.diagnostics.extend(diags);
            state.has_error = true;
            return Err(PipelineError {
                failing_pass: terminal,
            });
        }
    }
    Ok(())
}

fn run_schedule(
    state: &mut CompilationState,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let t = Instant::now();
    let result = crate::schedule::find_schedule(&state.network);
    let elapsed = t.elapsed();
    let diags = match result {
        Ok(result) => {
            let mut diags = result.diagnostics;
            // Verify schedule postconditions (S1-S2) before finish_pass so
            // cert failure diagnostics go through the callback.
            let cert = crate::schedule::verify_schedule(&state.network, &result.schedule);
            if !cert.all_pass() {
                diags.push(
                    Diagnostic::error(
                        None,
                        format!("schedule verification failed: {}", cert.failed().join(", ")),
                    )
                    .with_code(codes::E0602),
                );
            }
            state.schedule = Some(result.schedule);
            diags
        }
        Err(e) => vec![internal_error(PassId::Schedule, &e)],
    };
    finish_pass(state, PassId::Schedule, diags, elapsed, verbose, on_pass_complete)
}
