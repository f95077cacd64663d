use criterion::{criterion_group, criterion_main, Criterion};
use wasmhost_types::{pack_arguments, unpack_arguments, Action, ActionResult, Address, Amount};

fn bench_arguments(c: &mut Criterion) {
    let args: Vec<Vec<u8>> = (0..8).map(|i| vec![i as u8; 64]).collect();
    let packed = pack_arguments(&args);

    c.bench_function("pack_arguments_8x64", |bencher| bencher.iter(|| pack_arguments(&args)));
    c.bench_function("unpack_arguments_8x64", |bencher| {
        bencher.iter(|| unpack_arguments(&packed))
    });
}

fn nested_result(depth: usize) -> ActionResult {
    let mut node = ActionResult::leaf(
        Action::call("transfer", vec![0xab; 256], Amount::from(1_000u64), 100_000),
        true,
        "",
        2_500,
    );
    if depth > 0 {
        node.sub_action_results = vec![nested_result(depth - 1), nested_result(depth - 1)];
    }
    node
}

fn bench_action_result(c: &mut Criterion) {
    let tree = nested_result(4);
    let bytes = tree.to_bytes();

    c.bench_function("action_result_encode_31_nodes", |bencher| bencher.iter(|| tree.to_bytes()));
    c.bench_function("action_result_decode_31_nodes", |bencher| {
        bencher.iter(|| ActionResult::from_bytes(&bytes))
    });
    c.bench_function("action_result_truncate_31_nodes", |bencher| {
        bencher.iter(|| {
            let mut copy = tree.clone();
            copy.truncate_args(100);
            copy
        })
    });
}

fn bench_address(c: &mut Criterion) {
    let code = vec![0u8; 16 * 1024];
    c.bench_function("derive_contract_16kb", |bencher| {
        bencher.iter(|| Address::derive_contract(&code, b"args", b"nonce"))
    });
}

criterion_group!(benches, bench_arguments, bench_action_result, bench_address);
criterion_main!(benches);
