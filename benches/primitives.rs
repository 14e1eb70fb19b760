use std::hint::black_box;

use bgw_tune::{
    share::{Modulus, recombine, split},
    triples::TripleAuthority,
};
use criterion::{BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

pub fn primitives_benchmark(c: &mut Criterion) {
    let m = Modulus::new((1 << 61) - 1).expect("valid modulus");
    let mut g = c.benchmark_group("primitives");
    for parties in [3, 10, 100] {
        g.throughput(criterion::Throughput::Elements(parties as u64));
        g.bench_with_input(
            BenchmarkId::new("split and recombine", parties),
            &parties,
            |b, &parties| {
                let mut rng = ChaCha20Rng::seed_from_u64(42);
                b.iter(|| {
                    let shares = split(&mut rng, black_box(1234), parties, m);
                    recombine(&shares, m)
                })
            },
        );
    }

    let gates = 1_000;
    g.throughput(criterion::Throughput::Elements(gates as u64));
    g.bench_function(format!("{gates} Beaver triples for 3 parties"), |b| {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        b.iter(|| {
            let authority = TripleAuthority::new(3, m, &mut rng);
            for gate in 0..gates {
                for party in 0..3 {
                    black_box(authority.get_triple_share(gate, party).expect("valid party"));
                }
            }
        })
    });
}
