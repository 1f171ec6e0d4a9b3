use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::path::Path;
use syncflow::description::*;
use syncflow::function::{DataType, Function};
use syncflow::id::Id;
use syncflow::network::ProcessNetwork;
use syncflow::pass::{ParallelStrategy, PassId, PipelineOptions};
use syncflow::pipeline::{run_pipeline, CompilationState};
use syncflow::*;

// KPI-aligned benchmark scenarios.
// Fixture networks are shared with the integration tests.

fn scenarios() -> Vec<(&'static str, String)> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
    ["parallel_region", "accumulator"]
        .into_iter()
        .map(|name| {
            let path = dir.join(format!("{name}.json"));
            let text = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
            (name, text)
        })
        .collect()
}

fn port(name: &str) -> PortDescription {
    PortDescription {
        name: Id::new(name),
        data_type: Some(DataType::scalar("int")),
    }
}

fn map(id: String, body: String) -> ProcessDescription {
    ProcessDescription {
        id: Id::new(id),
        parent: None,
        kind: KindDescription::Map {
            function: Function::unary("f", DataType::scalar("int"), body),
        },
        in_ports: vec![port("in")],
        out_ports: vec![port("out")],
    }
}

fn connect(from: String, to: String) -> ConnectionDescription {
    ConnectionDescription { from, to }
}

/// Region-scaling generator: src → unzip(branches) → chains of `length`
/// maps → zip → dst. Every branch computes the same thing, so the region is
/// data-parallel.
fn generate_region(branches: usize, length: usize) -> NetworkDescription {
    let mut desc = NetworkDescription::default();
    desc.processes.push(map("src".into(), "x".into()));
    desc.processes.push(map("dst".into(), "x".into()));
    desc.processes.push(ProcessDescription {
        id: Id::new("unzip"),
        parent: None,
        kind: KindDescription::Unzip,
        in_ports: vec![port("in")],
        out_ports: (0..branches).map(|b| port(&format!("out{b}"))).collect(),
    });
    desc.processes.push(ProcessDescription {
        id: Id::new("zip"),
        parent: None,
        kind: KindDescription::Zip,
        in_ports: (0..branches).map(|b| port(&format!("in{b}"))).collect(),
        out_ports: vec![port("out")],
    });
    desc.connections.push(connect("src.out".into(), "unzip.in".into()));
    desc.connections.push(connect("zip.out".into(), "dst.in".into()));

    for b in 0..branches {
        let mut prev = format!("unzip.out{b}");
        for pos in 0..length {
            let id = format!("m{b}_{pos}");
            desc.processes.push(map(id.clone(), format!("x + {pos}")));
            desc.connections.push(connect(prev, format!("{id}.in")));
            prev = format!("{id}.out");
        }
        desc.connections.push(connect(prev, format!("zip.in{b}")));
    }
    desc.inputs.push("src.in".into());
    desc.outputs.push("dst.out".into());
    desc
}

fn load(text: &str) -> CompilationState {
    CompilationState::load(text.to_string()).expect("benchmark scenario must load")
}

fn compile_full(state: &mut CompilationState, options: &PipelineOptions) {
    assert!(run_pipeline(state, PassId::Schedule, options, false, |_, _| {}).is_ok());
    black_box(&state.schedule);
}

// KPI: description load latency (parse JSON -> build network).
fn bench_kpi_load_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/load_latency");

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| {
                let net = load_network(black_box(source));
                black_box(&net);
            });
        });
    }

    group.finish();
}

// KPI: full pipeline latency (flatten -> validate -> rewrites -> schedule).
fn bench_kpi_full_pipeline_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_pipeline_latency");
    let options = PipelineOptions::default();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter_batched(
                || load(source),
                |mut state| compile_full(&mut state, &options),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// KPI: pass-level latency on a non-trivial region.
fn bench_kpi_pass_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/pass_latency");
    let net: ProcessNetwork = build_network(&generate_region(16, 8)).expect("generated region loads");

    group.bench_function("sections", |b| {
        b.iter(|| black_box(section::find_contained_sections(black_box(&net)).unwrap()));
    });

    group.bench_function("coalesce_data_parallel", |b| {
        b.iter_batched(
            || net.clone(),
            |mut net| black_box(rewrite::coalesce_data_parallel(&mut net).unwrap()),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("split_and_fuse", |b| {
        b.iter_batched(
            || net.clone(),
            |mut net| {
                rewrite::split_segments(&mut net).unwrap();
                rewrite::fuse_unzip_map_zip(&mut net).unwrap();
                black_box(rewrite::coalesce_parallel_map_chains(&mut net).unwrap())
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("schedule", |b| {
        b.iter(|| black_box(schedule::find_schedule(black_box(&net)).unwrap()));
    });

    group.finish();
}

// KPI: full pipeline scaling with region width, for both strategies.
fn bench_kpi_region_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/region_scaling");

    for branches in [4usize, 16, 64] {
        let source = serde_json::to_string(&generate_region(branches, 8)).expect("serializable");
        for (label, strategy) in [
            ("coalesce", ParallelStrategy::Coalesce),
            ("split", ParallelStrategy::Split),
        ] {
            let options = PipelineOptions {
                strategy,
                data_parallel: true,
            };
            group.bench_with_input(
                BenchmarkId::new(label, branches),
                &source,
                |b, source| {
                    b.iter_batched(
                        || load(source),
                        |mut state| compile_full(&mut state, &options),
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_kpi_load_latency,
    bench_kpi_full_pipeline_latency,
    bench_kpi_pass_latency,
    bench_kpi_region_scaling,
);
criterion_main!(benches);
