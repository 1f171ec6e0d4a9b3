use clap::Parser;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use syncflow::diag::Diagnostic;
use syncflow::pass::{last_rewrite, ParallelStrategy, PassId, PipelineOptions};
use syncflow::pipeline::{run_pipeline, CompilationState};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    /// Sequential process schedule
    Schedule,
    /// Rewritten network as a JSON description
    Network,
    /// Rewritten network as Graphviz DOT
    Dot,
    /// Contained sections and their data-parallel length
    Sections,
    /// Provenance metadata
    BuildInfo,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StrategyArg {
    Coalesce,
    Split,
}

#[derive(Parser, Debug)]
#[command(
    name = "syncflow",
    version,
    about = "Synchronous dataflow middle-end: rewrites process networks and finds sequential schedules"
)]
struct Cli {
    /// Input network description (JSON)
    source: PathBuf,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Schedule)]
    emit: EmitStage,

    /// How data-parallel sections are reduced before fusion
    #[arg(long, value_enum, default_value_t = StrategyArg::Coalesce)]
    strategy: StrategyArg,

    /// Skip the data-parallel passes (sequential target)
    #[arg(long)]
    no_parallel: bool,

    /// Print passes and timing
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "syncflow=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_diagnostics(diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("syncflow: {}", diag);
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        eprintln!("syncflow: source = {}", cli.source.display());
        eprintln!("syncflow: emit   = {:?}", cli.emit);
    }

    let options = PipelineOptions {
        strategy: match cli.strategy {
            StrategyArg::Coalesce => ParallelStrategy::Coalesce,
            StrategyArg::Split => ParallelStrategy::Split,
        },
        data_parallel: !cli.no_parallel,
    };

    // ── Read and load the description ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("syncflow: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let mut state = match CompilationState::load(source) {
        Ok(state) => state,
        Err(diags) => {
            print_diagnostics(&diags);
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("syncflow: loaded {} processes", state.network.len());
    }

    // ── Run passes ──
    let terminal = match cli.emit {
        EmitStage::Schedule | EmitStage::BuildInfo => PassId::Schedule,
        EmitStage::Network | EmitStage::Dot => last_rewrite(&options),
        EmitStage::Sections => PassId::CombToMap,
    };
    if run_pipeline(&mut state, terminal, &options, cli.verbose, |_, diags| {
        print_diagnostics(diags)
    })
    .is_err()
    {
        std::process::exit(1);
    }

    // ── Emit ──
    let output = match render(&state, cli.emit) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("syncflow: error: {}", msg);
            std::process::exit(1);
        }
    };

    let written = match &cli.output {
        Some(path) => std::fs::write(path, output.as_bytes()),
        None => std::io::stdout().write_all(output.as_bytes()),
    };
    if let Err(e) = written {
        eprintln!("syncflow: error: writing output: {}", e);
        std::process::exit(2);
    }
}

fn render(state: &CompilationState, emit: EmitStage) -> Result<String, String> {
    match emit {
        EmitStage::Schedule => state
            .schedule
            .as_ref()
            .map(ToString::to_string)
            .ok_or_else(|| "no schedule was produced".to_string()),
        EmitStage::Network => {
            let desc = syncflow::description::describe(&state.network).map_err(|e| e.to_string())?;
            let mut text = serde_json::to_string_pretty(&desc).map_err(|e| e.to_string())?;
            text.push('\n');
            Ok(text)
        }
        EmitStage::Dot => Ok(syncflow::dot::emit_dot(&state.network)),
        EmitStage::Sections => render_sections(state).map_err(|e| e.to_string()),
        EmitStage::BuildInfo => state
            .provenance
            .as_ref()
            .map(|p| p.to_json())
            .ok_or_else(|| "no provenance was recorded".to_string()),
    }
}

fn render_sections(state: &CompilationState) -> syncflow::error::Result<String> {
    let net = &state.network;
    let mut buf = String::new();
    for section in syncflow::section::find_contained_sections(net)? {
        match syncflow::parallel::data_parallel_length(net, &section)? {
            Some(length) => {
                let _ = writeln!(buf, "{section}: data-parallel, length {length}");
            }
            None => {
                let _ = writeln!(buf, "{section}: not data-parallel");
            }
        }
    }
    Ok(buf)
}
