//! Benchmarks for log-line processing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sling_wrapper::observability::{NoopTracer, Tracer};
use sling_wrapper::sync::process_log_line;

fn log_line_benchmark(c: &mut Criterion) {
    let span = NoopTracer.start_span("bench");
    let rows_line = r#"{"level":"info","message":"rows","rows":5}"#;
    let error_line = r#"{"level":"error","message":"write failed","error":"connection reset"}"#;

    c.bench_function("process_log_line/rows", |b| {
        b.iter(|| process_log_line(black_box(rows_line), &span))
    });
    c.bench_function("process_log_line/error", |b| {
        b.iter(|| process_log_line(black_box(error_line), &span))
    });
    c.bench_function("process_log_line/invalid", |b| {
        b.iter(|| process_log_line(black_box("not json"), &span))
    });
}

criterion_group!(benches, log_line_benchmark);
criterion_main!(benches);
