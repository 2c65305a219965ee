use criterion::{Criterion, black_box, criterion_group, criterion_main};

use arena_mlp::batch::create_batches;
use arena_mlp::{Arena, CostFunction, Dataset, Lfsr113, Matrix, Network};

const LAYERS: [usize; 3] = [784, 100, 10];
const BATCH: usize = 10;

fn synthetic_dataset(len: usize) -> Dataset {
    let inputs = (0..len * LAYERS[0]).map(|i| (i % 255) as f32 / 255.0).collect();
    let mut targets = vec![0.0_f32; len * LAYERS[2]];
    for i in 0..len {
        targets[i * LAYERS[2] + i % LAYERS[2]] = 1.0;
    }
    Dataset::from_flat(inputs, targets, LAYERS[0], LAYERS[2]).unwrap()
}

fn setup() -> (Arena, Lfsr113, Network) {
    let mut arena = Arena::with_megabytes(64);
    let mut rng = Lfsr113::default();
    let network = Network::new(&mut arena, &mut rng, &LAYERS, CostFunction::CrossEntropy).unwrap();
    (arena, rng, network)
}

fn feed_forward_bench(c: &mut Criterion) {
    let (mut arena, mut rng, network) = setup();
    let inputs = Matrix::random_gaussian(&mut arena, &mut rng, LAYERS[0], BATCH, 0.0, 1.0);

    c.bench_function("feed_forward_batch_784_100_10_x10", |b| {
        b.iter(|| {
            arena.with_scope(|arena| {
                let trace = network.feed_forward_batch(arena, black_box(inputs));
                black_box(arena.values(trace.output())[0]);
            })
        })
    });
}

fn gradient_step_bench(c: &mut Criterion) {
    let (mut arena, mut rng, network) = setup();
    let inputs = Matrix::random_gaussian(&mut arena, &mut rng, LAYERS[0], BATCH, 0.0, 1.0);
    let targets = Matrix::zeroed(&mut arena, LAYERS[2], BATCH);

    c.bench_function("gradient_descent_batch_784_100_10_x10", |b| {
        b.iter(|| {
            network.gradient_descent_batch(
                &mut arena,
                black_box(inputs),
                black_box(targets),
                0.1,
                5.0,
                50_000,
            );
        })
    });
}

fn create_batches_bench(c: &mut Criterion) {
    let (mut arena, mut rng, _network) = setup();
    let data = synthetic_dataset(1000);

    c.bench_function("create_batches_1000_x10", |b| {
        b.iter(|| {
            arena.with_scope(|arena| {
                let batches = create_batches(arena, &mut rng, black_box(&data), BATCH);
                black_box(batches.len());
            })
        })
    });
}

criterion_group!(
    benches,
    feed_forward_bench,
    gradient_step_bench,
    create_batches_bench
);
criterion_main!(benches);
