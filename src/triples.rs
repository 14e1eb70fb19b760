//! The triple authority as a (semi-)trusted party, providing Beaver triples.
//!
//! The [`TripleAuthority`] generates exactly one triple per multiplication gate, the first time
//! any party asks for it, and hands every party only its own share. It can be used directly by
//! parties in the same process, or run as a separate participant of the protocol with
//! [`dealer`], in which case the parties receive their shares as [`DealtTriples`].

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument, trace};

use crate::{
    channel::{self, Channel, recv_from, send_to},
    circuit::{PartyId, WireId},
    party::AccessError,
    share::{Modulus, Share, TripleShare, mul, recombine, split},
};

/// A provider of Beaver triple shares, keyed by multiplication gate.
pub trait TripleSource: Send + Sync {
    /// `party`'s share of the Beaver triple for `gate`.
    fn triple_share(&self, gate: WireId, party: PartyId) -> Result<TripleShare, AccessError>;
}

/// The shares of all parties of a single Beaver triple.
#[derive(Debug, Clone)]
struct BeaverTriple {
    x: Vec<Share>,
    y: Vec<Share>,
    z: Vec<Share>,
}

impl BeaverTriple {
    fn generate(rng: &mut ChaCha20Rng, parties: usize, modulus: Modulus) -> Self {
        let x = modulus.random(rng);
        let y = modulus.random(rng);
        let z = mul(x, y, modulus);
        let triple = Self {
            x: split(rng, x, parties, modulus),
            y: split(rng, y, parties, modulus),
            z: split(rng, z, parties, modulus),
        };
        assert_eq!(
            recombine(&triple.z, modulus),
            mul(
                recombine(&triple.x, modulus),
                recombine(&triple.y, modulus),
                modulus
            ),
            "Beaver triple must satisfy z = x * y"
        );
        triple
    }

    fn share_of(&self, party: PartyId) -> TripleShare {
        TripleShare {
            x: self.x[party],
            y: self.y[party],
            z: self.z[party],
        }
    }
}

#[derive(Debug)]
struct AuthorityState {
    rng: ChaCha20Rng,
    triples: HashMap<WireId, BeaverTriple>,
}

/// A trusted third party that generates and memoizes one Beaver triple per gate.
#[derive(Debug)]
pub struct TripleAuthority {
    parties: usize,
    modulus: Modulus,
    state: Mutex<AuthorityState>,
}

impl TripleAuthority {
    /// Creates an authority for `parties` parties, seeding its generator from `rng`.
    pub fn new(parties: usize, modulus: Modulus, rng: &mut impl RngCore) -> Self {
        Self {
            parties,
            modulus,
            state: Mutex::new(AuthorityState {
                rng: ChaCha20Rng::from_rng(rng),
                triples: HashMap::new(),
            }),
        }
    }

    /// The number of parties the triples are shared among.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The modulus the triples are shared under.
    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    /// Returns `party`'s share of the Beaver triple for `gate`, generating the triple on first use.
    ///
    /// Generation happens while holding the lock, so concurrent first requests for the same gate
    /// always observe the same triple.
    pub fn get_triple_share(&self, gate: WireId, party: PartyId) -> Result<TripleShare, AccessError> {
        if party >= self.parties {
            return Err(AccessError::UnknownParty {
                party,
                parties: self.parties,
            });
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let AuthorityState { rng, triples } = &mut *state;
        let triple = triples.entry(gate).or_insert_with(|| {
            trace!(gate, "generating Beaver triple");
            BeaverTriple::generate(rng, self.parties, self.modulus)
        });
        Ok(triple.share_of(party))
    }

    /// The number of triples generated so far.
    pub fn generated(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .triples
            .len()
    }
}

impl TripleSource for TripleAuthority {
    fn triple_share(&self, gate: WireId, party: PartyId) -> Result<TripleShare, AccessError> {
        self.get_triple_share(gate, party)
    }
}

/// The triple shares that the [`dealer`] sent to a single party.
#[derive(Debug, Clone)]
pub struct DealtTriples {
    party: PartyId,
    shares: HashMap<WireId, TripleShare>,
}

impl DealtTriples {
    /// Wraps the shares of `party`, one per gate.
    pub fn new(party: PartyId, shares: impl IntoIterator<Item = (WireId, TripleShare)>) -> Self {
        Self {
            party,
            shares: shares.into_iter().collect(),
        }
    }
}

impl TripleSource for DealtTriples {
    fn triple_share(&self, gate: WireId, party: PartyId) -> Result<TripleShare, AccessError> {
        if party != self.party {
            return Err(AccessError::WrongRequester {
                owner: self.party,
                requester: party,
            });
        }
        self.shares
            .get(&gate)
            .copied()
            .ok_or(AccessError::NoTriple(gate))
    }
}

/// The answer of the dealer to a request for triples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum DealerMsg {
    /// One triple share per requested gate, in the order of the request.
    Triples(Vec<TripleShare>),
    /// The dealer refused to deal triples.
    Abort(String),
}

/// Errors that can occur while running the triple authority as a dealer.
#[derive(Debug, thiserror::Error)]
pub enum DealerError {
    /// The parties asked for triples for different gates.
    #[error("party {party} requested triples for gates {actual:?}, but party 0 for {expected:?}")]
    GateMismatch {
        /// The first party whose request differs.
        party: PartyId,
        /// The gates requested by party 0.
        expected: Vec<WireId>,
        /// The gates requested by `party`.
        actual: Vec<WireId>,
    },
    /// A triple share could not be handed out.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// An error occurred while trying to communicate over the channel.
    #[error(transparent)]
    Channel(#[from] channel::Error),
}

/// Runs the triple authority as a dealer, communicating with all parties.
///
/// Every party sends the ids of the multiplication gates it needs triples for. If all parties
/// agree, each of them receives its shares of those triples, otherwise all of them are told to
/// abort.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn dealer(
    channel: &mut impl Channel,
    authority: &TripleAuthority,
) -> Result<(), DealerError> {
    let parties = authority.parties();
    debug!("dealer with {parties} parties");
    let mut requests: Vec<Vec<WireId>> = Vec::with_capacity(parties);
    for p in 0..parties {
        requests.push(recv_from(channel, p, "triple request").await?);
    }

    if let Some((party, actual)) = requests
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, gates)| **gates != requests[0])
    {
        let e = DealerError::GateMismatch {
            party,
            expected: requests[0].clone(),
            actual: actual.clone(),
        };
        for p in 0..parties {
            send_to(channel, p, "triple shares", &DealerMsg::Abort(e.to_string())).await?;
        }
        return Err(e);
    }

    let gates = &requests[0];
    for p in 0..parties {
        let shares = gates
            .iter()
            .map(|&gate| authority.get_triple_share(gate, p))
            .collect::<Result<Vec<_>, _>>()?;
        send_to(channel, p, "triple shares", &DealerMsg::Triples(shares)).await?;
    }
    debug!("dealer sent {} triples to all parties", gates.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn one_triple_per_gate() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let m = Modulus::new(1031).unwrap();
        let authority = TripleAuthority::new(3, m, &mut rng);
        assert_eq!(authority.parties(), 3);
        assert_eq!(authority.modulus(), m);

        let first: Vec<TripleShare> = (0..3)
            .map(|p| authority.get_triple_share(5, p).unwrap())
            .collect();
        let again: Vec<TripleShare> = (0..3)
            .rev()
            .map(|p| authority.get_triple_share(5, p).unwrap())
            .rev()
            .collect();
        assert_eq!(first, again);
        assert_eq!(authority.generated(), 1);

        let x = recombine(&first.iter().map(|t| t.x).collect::<Vec<_>>(), m);
        let y = recombine(&first.iter().map(|t| t.y).collect::<Vec<_>>(), m);
        let z = recombine(&first.iter().map(|t| t.z).collect::<Vec<_>>(), m);
        assert_eq!(z, mul(x, y, m));

        authority.get_triple_share(7, 0).unwrap();
        assert_eq!(authority.generated(), 2);
        assert_eq!(
            authority.get_triple_share(5, 3),
            Err(AccessError::UnknownParty {
                party: 3,
                parties: 3
            })
        );
    }

    #[test]
    fn concurrent_first_requests_share_one_triple() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let m = Modulus::new(65_537).unwrap();
        let authority = Arc::new(TripleAuthority::new(4, m, &mut rng));
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let authority = Arc::clone(&authority);
                std::thread::spawn(move || {
                    (0..16)
                        .map(|gate| authority.get_triple_share(gate, p).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let shares: Vec<Vec<TripleShare>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(authority.generated(), 16);
        for gate in 0..16 {
            let x = recombine(&shares.iter().map(|s| s[gate].x).collect::<Vec<_>>(), m);
            let y = recombine(&shares.iter().map(|s| s[gate].y).collect::<Vec<_>>(), m);
            let z = recombine(&shares.iter().map(|s| s[gate].z).collect::<Vec<_>>(), m);
            assert_eq!(z, mul(x, y, m));
        }
    }

    #[test]
    fn dealt_triples_belong_to_one_party() {
        let share = TripleShare { x: 1, y: 2, z: 3 };
        let dealt = DealtTriples::new(1, [(4, share)]);
        assert_eq!(dealt.triple_share(4, 1), Ok(share));
        assert_eq!(dealt.triple_share(5, 1), Err(AccessError::NoTriple(5)));
        assert_eq!(
            dealt.triple_share(4, 0),
            Err(AccessError::WrongRequester {
                owner: 1,
                requester: 0
            })
        );
    }
}
