//! Benchmarks for proto lookup and message dispatch (§10 "Test tooling").
//!
//! Two groups: raw slot-chain traversal through the public `Object`/`get_slot`
//! API (no parsing, no evaluator), and end-to-end message dispatch through a
//! tight loop driven by `Vm`/`run_source`, mirroring the non-foldable-body
//! shape the grounding crate's own arithmetic benchmark uses to avoid a
//! constant-folding short-circuit skewing the measurement.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use loom::{Object, Symbol, Vm, get_slot};

/// A chain of `depth` plain objects, each protoing the previous one, with a
/// single slot set only on the root. Looking it up from the tip walks the
/// whole chain.
fn proto_chain(depth: usize) -> loom::ObjectRef {
    let root = Object::plain([]);
    root.set_slot(Symbol::from("target"), root.clone());
    let mut tip = root;
    for _ in 1..depth {
        let next = Object::plain([tip.clone()]);
        tip = next;
    }
    tip
}

fn bench_proto_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("proto_lookup");
    for depth in [1usize, 8, 64] {
        let tip = proto_chain(depth);
        group.bench_function(format!("depth_{depth}"), |b| {
            b.iter(|| {
                let found = get_slot(&tip, "target");
                black_box(found.is_some())
            });
        });
    }
    group.finish();
}

/// Runs a non-foldable loop body through the full parse/evaluate pipeline:
/// two locals added on every iteration, so the measured time reflects
/// runtime message dispatch rather than a single constant return.
const ADD_TWO_LOOP_1000: &str = "
x := 1
y := 2
total := 0
for(i, 0, 999, total = total + (x + y))
total
";

fn bench_message_dispatch(c: &mut Criterion) {
    c.bench_function("add_two_loop_1000", |b| {
        let vm = Vm::new().leak();
        let (result, _stop) = loom::repl::run_source(vm, ADD_TWO_LOOP_1000, "bench").unwrap();
        assert_eq!(result.with_tag(|t| t.as_number()), Some(3000.0));
        vm.scheduler.wait_for_quiescence();

        b.iter(|| {
            let vm = Vm::new().leak();
            let (result, _stop) = loom::repl::run_source(vm, ADD_TWO_LOOP_1000, "bench").unwrap();
            black_box(result.with_tag(|t| t.as_number()));
            vm.scheduler.wait_for_quiescence();
        });
    });
}

criterion_group!(benches, bench_proto_lookup, bench_message_dispatch);
criterion_main!(benches);
