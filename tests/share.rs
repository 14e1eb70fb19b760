use bgw_tune::share::{
    MaskedDifference, Modulus, TripleShare, add, combine_mult, mul, recombine, scale, split,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn modulus() -> impl Strategy<Value = Modulus> {
    (2..=u64::MAX).prop_map(|m| Modulus::new(m).unwrap())
}

proptest! {
    #[test]
    fn split_then_recombine(seed: u64, m in modulus(), n in 2..8usize, secret: u64) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let secret = secret % m.get();
        let shares = split(&mut rng, secret, n, m);
        prop_assert_eq!(shares.len(), n);
        prop_assert!(shares.iter().all(|&s| s < m.get()));
        prop_assert_eq!(recombine(&shares, m), secret);
    }

    #[test]
    fn sharing_is_linear(seed: u64, m in modulus(), n in 2..6usize, a: u64, b: u64, c: i64) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (a, b) = (a % m.get(), b % m.get());
        let shares_a = split(&mut rng, a, n, m);
        let shares_b = split(&mut rng, b, n, m);

        let sum: Vec<u64> = shares_a
            .iter()
            .zip(&shares_b)
            .map(|(&x, &y)| add(x, y, m))
            .collect();
        prop_assert_eq!(recombine(&sum, m), add(a, b, m));

        let scaled: Vec<u64> = shares_a.iter().map(|&x| scale(c, x, m)).collect();
        prop_assert_eq!(recombine(&scaled, m), scale(c, a, m));
    }

    #[test]
    fn beaver_multiplication(seed: u64, m in modulus(), n in 2..6usize, a: u64, b: u64) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (a, b) = (a % m.get(), b % m.get());
        let (x, y) = (m.random(&mut rng), m.random(&mut rng));
        let xs = split(&mut rng, x, n, m);
        let ys = split(&mut rng, y, n, m);
        let zs = split(&mut rng, mul(x, y, m), n, m);
        let triples: Vec<TripleShare> = (0..n)
            .map(|p| TripleShare { x: xs[p], y: ys[p], z: zs[p] })
            .collect();
        let a_shares = split(&mut rng, a, n, m);
        let b_shares = split(&mut rng, b, n, m);

        let local: Vec<MaskedDifference> = (0..n)
            .map(|p| MaskedDifference::local(a_shares[p], b_shares[p], triples[p], m))
            .collect();
        let opened = MaskedDifference::open(local, m);
        let product: Vec<u64> = (0..n)
            .map(|p| combine_mult(p == 0, triples[p], opened, m))
            .collect();
        prop_assert_eq!(recombine(&product, m), mul(a, b, m));
    }
}

#[test]
fn single_shares_do_not_depend_on_the_secret() {
    let m = Modulus::new(7).unwrap();
    let samples = 7_000;
    for secret in [0, 5] {
        let mut rng = ChaCha20Rng::seed_from_u64(secret);
        for party in 0..3 {
            let mut buckets = [0usize; 7];
            for _ in 0..samples {
                let shares = split(&mut rng, secret, 3, m);
                buckets[shares[party] as usize] += 1;
            }
            for count in buckets {
                assert!(
                    (800..1200).contains(&count),
                    "share {party} of {secret} is biased: {buckets:?}"
                );
            }
        }
    }
}

#[test]
fn any_two_of_three_shares_do_not_depend_on_the_secret() {
    let m = Modulus::new(5).unwrap();
    let samples = 25_000;
    for secret in [0, 3] {
        let mut rng = ChaCha20Rng::seed_from_u64(100 + secret);
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let mut cells = [[0usize; 5]; 5];
            for _ in 0..samples {
                let shares = split(&mut rng, secret, 3, m);
                cells[shares[i] as usize][shares[j] as usize] += 1;
            }
            for count in cells.iter().flatten() {
                assert!(
                    (850..1150).contains(count),
                    "shares {i} and {j} of {secret} are correlated: {cells:?}"
                );
            }
        }
    }
}
