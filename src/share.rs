//! Additive secret sharing over the integers modulo `m`.
//!
//! All functions in this module are pure and party-local. The only interactive operation of the
//! protocol, opening the masked differences of a multiplication, is done by the caller, which
//! then hands the opened values to [`combine_mult`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A single party's additive share of a secret, always reduced into `[0, m)`.
pub type Share = u64;

/// The modulus `m` of the ring that all shares live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Modulus(u64);

impl Modulus {
    /// Creates a modulus, which must be at least 2.
    pub fn new(m: u64) -> Result<Self, ConfigError> {
        if m < 2 {
            Err(ConfigError::InvalidModulus(m))
        } else {
            Ok(Self(m))
        }
    }

    /// The value of the modulus.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Reduces an arbitrary (possibly negative) integer into `[0, m)`.
    pub fn reduce(self, value: i128) -> Share {
        value.rem_euclid(i128::from(self.0)) as Share
    }

    /// Draws a uniformly distributed element of `[0, m)`.
    pub fn random<R: Rng + ?Sized>(self, rng: &mut R) -> Share {
        rng.random_range(0..self.0)
    }

    fn wide(self, value: u128) -> Share {
        (value % u128::from(self.0)) as Share
    }
}

impl TryFrom<u64> for Modulus {
    type Error = ConfigError;

    fn try_from(m: u64) -> Result<Self, Self::Error> {
        Self::new(m)
    }
}

impl From<Modulus> for u64 {
    fn from(m: Modulus) -> Self {
        m.0
    }
}

/// One party's share of a Beaver triple `(x, y, z = x * y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleShare {
    /// The share of `x`.
    pub x: Share,
    /// The share of `y`.
    pub y: Share,
    /// The share of `z = x * y mod m`.
    pub z: Share,
}

/// The masked differences `D = A - x` and `E = B - y` of a multiplication `A * B`.
///
/// Each party computes a local contribution from its shares. Only the sum of all contributions
/// (the opened value) may be used in [`combine_mult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedDifference {
    /// `A - x`.
    pub d: Share,
    /// `B - y`.
    pub e: Share,
}

impl MaskedDifference {
    /// Masks the shares of the two factors with the triple share.
    pub fn local(a: Share, b: Share, triple: TripleShare, m: Modulus) -> Self {
        Self {
            d: sub(a, triple.x, m),
            e: sub(b, triple.y, m),
        }
    }

    /// Opens the masked differences by summing the contributions of all parties.
    pub fn open(contributions: impl IntoIterator<Item = Self>, m: Modulus) -> Self {
        contributions
            .into_iter()
            .fold(Self { d: 0, e: 0 }, |acc, c| Self {
                d: add(acc.d, c.d, m),
                e: add(acc.e, c.e, m),
            })
    }
}

/// Splits `secret` into `n` additive shares.
///
/// The first `n - 1` shares are drawn uniformly from `[0, m)`, so any proper subset of the shares
/// is independent of the secret.
pub fn split<R: Rng + ?Sized>(rng: &mut R, secret: Share, n: usize, m: Modulus) -> Vec<Share> {
    debug_assert!(n > 0, "a secret must be split into at least one share");
    let mut shares: Vec<Share> = (1..n).map(|_| m.random(rng)).collect();
    let last = sub(m.wide(u128::from(secret)), recombine(&shares, m), m);
    shares.push(last);
    shares
}

/// Reconstructs the secret from all of its shares.
pub fn recombine(shares: &[Share], m: Modulus) -> Share {
    shares.iter().fold(0, |acc, &s| add(acc, s, m))
}

/// `(a + b) mod m`.
pub fn add(a: Share, b: Share, m: Modulus) -> Share {
    m.wide(u128::from(a) + u128::from(b))
}

/// `(a - b) mod m`.
pub fn sub(a: Share, b: Share, m: Modulus) -> Share {
    let m_wide = u128::from(m.get());
    m.wide(u128::from(a) % m_wide + m_wide - u128::from(b) % m_wide)
}

/// `(c * a) mod m` for a public (possibly negative) constant `c`.
pub fn scale(c: i64, a: Share, m: Modulus) -> Share {
    mul(m.reduce(i128::from(c)), a, m)
}

/// `(a * b) mod m`.
pub fn mul(a: Share, b: Share, m: Modulus) -> Share {
    m.wide(u128::from(a) * u128::from(b))
}

/// Computes a party's share of `A * B` from its Beaver triple share and the opened differences.
///
/// Returns `D * y + E * x + z (+ D * E)`, where only the designated party adds the public cross
/// term `D * E`. Summed over all parties this is `A * B mod m`.
pub fn combine_mult(
    is_designated: bool,
    triple: TripleShare,
    opened: MaskedDifference,
    m: Modulus,
) -> Share {
    let MaskedDifference { d, e } = opened;
    let mut share = add(mul(d, triple.y, m), mul(e, triple.x, m), m);
    share = add(share, triple.z, m);
    if is_designated {
        share = add(share, mul(d, e, m), m);
    }
    share
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn modulus_must_exceed_one() {
        assert_eq!(Modulus::new(0), Err(ConfigError::InvalidModulus(0)));
        assert_eq!(Modulus::new(1), Err(ConfigError::InvalidModulus(1)));
        assert_eq!(Modulus::new(2).map(Modulus::get), Ok(2));
    }

    #[test]
    fn negative_constants_wrap() {
        let m = Modulus::new(1024).unwrap();
        assert_eq!(m.reduce(-2), 1022);
        assert_eq!(scale(-2, 3, m), 1018);
        assert_eq!(sub(3, 5, m), 1022);
    }

    #[test]
    fn no_overflow_near_u64_max() {
        let m = Modulus::new(u64::MAX).unwrap();
        let a = u64::MAX - 1;
        assert_eq!(add(a, a, m), u64::MAX - 2);
        assert_eq!(mul(a, a, m), 1);
        assert_eq!(sub(0, 1, m), u64::MAX - 1);
    }

    #[test]
    fn beaver_multiplication_with_opened_differences() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let m = Modulus::new(1009).unwrap();
        let n = 4;
        let (a, b) = (123, 456);
        let (x, y) = (m.random(&mut rng), m.random(&mut rng));
        let a_shares = split(&mut rng, a, n, m);
        let b_shares = split(&mut rng, b, n, m);
        let x_shares = split(&mut rng, x, n, m);
        let y_shares = split(&mut rng, y, n, m);
        let z_shares = split(&mut rng, mul(x, y, m), n, m);
        let triples: Vec<TripleShare> = (0..n)
            .map(|i| TripleShare {
                x: x_shares[i],
                y: y_shares[i],
                z: z_shares[i],
            })
            .collect();
        let opened = MaskedDifference::open(
            (0..n).map(|i| MaskedDifference::local(a_shares[i], b_shares[i], triples[i], m)),
            m,
        );
        assert_eq!(opened.d, sub(a, x, m));
        assert_eq!(opened.e, sub(b, y, m));
        let product: Vec<Share> = (0..n)
            .map(|i| combine_mult(i == 0, triples[i], opened, m))
            .collect();
        assert_eq!(recombine(&product, m), mul(a, b, m));
    }
}
