//! The BGW protocol for a single party, with communication via channels.
//!
//! Each party runs [`mpc`] with its own [`Channel`]. The channel connects `parties + 1`
//! participants: the computing parties `0..parties` and the triple dealer, which has the index
//! `parties` and runs [`crate::triples::dealer`].
//!
//! # Protocol Workflow
//!
//! 1. Preprocessing: every party asks the dealer for its shares of one Beaver triple per
//!    multiplication gate.
//! 2. Input sharing: every party splits its private inputs and sends each peer its share.
//! 3. Evaluation: linear gates are evaluated locally. At every multiplication gate, each party
//!    broadcasts its masked differences and waits for those of all other parties (a barrier),
//!    after which the opened differences let it complete the multiplication locally.
//! 4. Output: every party broadcasts its shares of the output wires and reconstructs them.
//!
//! [`simulate_mpc`] runs the dealer and all parties as tasks of a single runtime, connected by
//! [`SimpleChannel`]s.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::future::join_all;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tokio::runtime::Builder;
use tracing::{Level, debug, instrument, warn};

use crate::{
    channel::{self, Channel, SimpleChannel, recv_from, recv_vec_from, send_to},
    circuit::{Circuit, CircuitError, Gate, PartyId, WireId},
    config::{Config, ConfigError},
    party::{AccessError, Party, PartyError, Peers},
    share::{MaskedDifference, Share, add},
    triples::{DealerError, DealerMsg, DealtTriples, TripleAuthority, TripleSource, dealer},
};

/// A custom error type for MPC computation and communication.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The parameters are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The circuit is malformed.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// The local state machine of the party failed.
    #[error(transparent)]
    Party(#[from] PartyError),
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The triple dealer failed.
    #[error("triple dealer failed: {0}")]
    Dealer(#[from] DealerError),
    /// The other participants did not follow the protocol.
    #[error("MPC error: {0}")]
    Mpc(#[from] MpcError),
    /// The runtime for a simulation could not be started.
    #[error("could not start the runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<AccessError> for Error {
    fn from(e: AccessError) -> Self {
        Self::Party(e.into())
    }
}

/// A custom error type for all steps of the main MPC protocol.
#[derive(Debug, thiserror::Error)]
pub enum MpcError {
    /// The dealer refused to deal triples.
    #[error("the dealer aborted: {0}")]
    DealerAborted(String),
    /// The dealer sent a different number of triple shares than requested.
    #[error("requested {expected} triples, but received {actual}")]
    MissingTriples {
        /// The number of multiplication gates.
        expected: usize,
        /// The number of triple shares received.
        actual: usize,
    },
    /// A party sent a share for a wire it has no business sending a share for.
    #[error("party {from} sent an unexpected share for wire {wire}")]
    UnexpectedShare {
        /// The sending party.
        from: PartyId,
        /// The wire of the share.
        wire: WireId,
    },
    /// A party broadcast masked differences for a different multiplication gate.
    #[error("party {party} opened gate {actual}, but gate {expected} was expected")]
    OutOfSync {
        /// The sending party.
        party: PartyId,
        /// The gate this party paused at.
        expected: WireId,
        /// The gate the other party paused at.
        actual: WireId,
    },
    /// Two parties reconstructed different outputs.
    #[error("party {0} reconstructed different outputs than party 0")]
    InconsistentOutputs(PartyId),
    /// No channel was created for a participant of the simulation.
    #[error("there is no channel for participant {0}")]
    MissingChannel(PartyId),
    /// A simulated participant could not be joined.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

/// The masked differences of a party for a single multiplication gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Opening {
    gate: WireId,
    diff: MaskedDifference,
}

/// Everything a party has received from its peers so far.
#[derive(Debug)]
struct Inbox {
    me: PartyId,
    input_shares: HashMap<WireId, (PartyId, Share)>,
    openings: HashMap<(PartyId, WireId), MaskedDifference>,
}

impl Inbox {
    fn new(me: PartyId) -> Self {
        Self {
            me,
            input_shares: HashMap::new(),
            openings: HashMap::new(),
        }
    }

    fn check_requester(&self, requester: PartyId) -> Result<(), AccessError> {
        if requester == self.me {
            Ok(())
        } else {
            Err(AccessError::WrongRequester {
                owner: self.me,
                requester,
            })
        }
    }
}

impl Peers for Inbox {
    fn input_share(
        &self,
        owner: PartyId,
        wire: WireId,
        requester: PartyId,
    ) -> Result<Share, AccessError> {
        self.check_requester(requester)?;
        match self.input_shares.get(&wire) {
            Some(&(from, share)) if from == owner => Ok(share),
            Some(_) => Err(AccessError::NotOwner { wire, party: owner }),
            None => Err(AccessError::NotAvailable { wire, party: owner }),
        }
    }

    fn masked_difference(
        &self,
        peer: PartyId,
        gate: WireId,
        requester: PartyId,
    ) -> Result<MaskedDifference, AccessError> {
        self.check_requester(requester)?;
        self.openings
            .get(&(peer, gate))
            .copied()
            .ok_or(AccessError::NotAvailable {
                wire: gate,
                party: peer,
            })
    }
}

/// Executes the MPC protocol for party `p_own` and returns the revealed outputs.
///
/// The dealer must be reachable as participant `config.parties` of the channel.
#[instrument(level = Level::DEBUG, skip_all, fields(party = p_own), err)]
pub async fn mpc(
    channel: &mut impl Channel,
    circuit: &Circuit,
    inputs: &BTreeMap<WireId, i64>,
    p_own: PartyId,
    config: &Config,
    rng: &mut (impl RngCore + Send),
) -> Result<BTreeMap<WireId, Share>, Error> {
    config.validate()?;
    circuit.validate_parties(config.parties)?;
    let parties = config.parties;
    if p_own >= parties {
        return Err(AccessError::UnknownParty {
            party: p_own,
            parties,
        }
        .into());
    }
    let p_dealer = parties;
    let peers: Vec<PartyId> = (0..parties).filter(|&p| p != p_own).collect();
    let circuit = Arc::new(circuit.clone());

    // preprocessing:

    let gates: Vec<WireId> = circuit.mult_gates().collect();
    send_to(channel, p_dealer, "triple request", &gates).await?;
    let shares = match recv_from(channel, p_dealer, "triple shares").await? {
        DealerMsg::Triples(shares) => shares,
        DealerMsg::Abort(reason) => return Err(MpcError::DealerAborted(reason).into()),
    };
    if shares.len() != gates.len() {
        return Err(MpcError::MissingTriples {
            expected: gates.len(),
            actual: shares.len(),
        }
        .into());
    }
    let triples: Arc<dyn TripleSource> =
        Arc::new(DealtTriples::new(p_own, gates.iter().copied().zip(shares)));
    debug!("received {} triple shares", gates.len());

    // input sharing:

    let mut party = Party::new(
        p_own,
        config,
        Arc::clone(&circuit),
        triples,
        inputs.clone(),
        rng,
    )?;
    party.local_setup()?;
    let own_inputs: Vec<WireId> = circuit.inputs_of(p_own).collect();
    for &q in &peers {
        let shares = own_inputs
            .iter()
            .map(|&wire| party.peer_input_share(wire, q).map(|share| (wire, share)))
            .collect::<Result<Vec<_>, _>>()?;
        send_to(channel, q, "input shares", &shares).await?;
    }
    let mut inbox = Inbox::new(p_own);
    for &q in &peers {
        let expected = circuit.inputs_of(q).count();
        let shares: Vec<(WireId, Share)> =
            recv_vec_from(channel, q, "input shares", expected).await?;
        for (wire, share) in shares {
            if circuit.get(wire).map(|w| w.gate) != Some(Gate::Input(q)) {
                return Err(MpcError::UnexpectedShare { from: q, wire }.into());
            }
            inbox.input_shares.insert(wire, (q, share));
        }
    }
    party.interactive_setup(&inbox)?;

    // evaluation:

    let mut from = 0;
    while let Some(gate) = party.evaluate_until_mult(from)? {
        for &q in &peers {
            let diff = party.peer_masked_difference(gate, q)?;
            send_to(channel, q, "masked differences", &Opening { gate, diff }).await?;
        }
        for &q in &peers {
            let Opening { gate: actual, diff } =
                recv_from(channel, q, "masked differences").await?;
            if actual != gate {
                return Err(MpcError::OutOfSync {
                    party: q,
                    expected: gate,
                    actual,
                }
                .into());
            }
            inbox.openings.insert((q, gate), diff);
        }
        party.interactive_setup(&inbox)?;
        from = gate + 1;
    }
    debug!("evaluated all wires");

    // output:

    let m = config.modulus;
    let mut outputs = party.public_outputs()?;
    let own_outputs: Vec<(WireId, Share)> = outputs.iter().map(|(&w, &s)| (w, s)).collect();
    for &q in &peers {
        send_to(channel, q, "output shares", &own_outputs).await?;
    }
    for &q in &peers {
        let shares: Vec<(WireId, Share)> =
            recv_vec_from(channel, q, "output shares", own_outputs.len()).await?;
        for (wire, share) in shares {
            let Some(sum) = outputs.get_mut(&wire) else {
                return Err(MpcError::UnexpectedShare { from: q, wire }.into());
            };
            *sum = add(*sum, share, m);
        }
    }
    Ok(outputs)
}

/// Simulates the multi party computation with the given inputs and fresh randomness.
///
/// `inputs[p]` are the private inputs of party `p`.
pub fn simulate_mpc(
    circuit: &Circuit,
    inputs: &[BTreeMap<WireId, i64>],
    config: &Config,
) -> Result<BTreeMap<WireId, Share>, Error> {
    simulate_mpc_with_rng(circuit, inputs, config, &mut rand::rng())
}

/// Simulates the multi party computation, deriving all randomness from `rng`.
pub fn simulate_mpc_with_rng(
    circuit: &Circuit,
    inputs: &[BTreeMap<WireId, i64>],
    config: &Config,
    rng: &mut impl RngCore,
) -> Result<BTreeMap<WireId, Share>, Error> {
    config.validate()?;
    if inputs.len() != config.parties {
        return Err(ConfigError::WrongNumberOfInputs {
            expected: config.parties,
            actual: inputs.len(),
        }
        .into());
    }
    circuit.validate_parties(config.parties)?;
    for (party, inputs) in inputs.iter().enumerate() {
        Party::validate_inputs(party, circuit, inputs)?;
    }
    config.check_adequacy(circuit, inputs)?;

    let mut channels =
        SimpleChannel::channels_with_timeout(config.parties + 1, config.round_timeout);
    let mut dealer_channel = channels
        .pop()
        .ok_or(MpcError::MissingChannel(config.parties))?;
    let authority = TripleAuthority::new(config.parties, config.modulus, rng);
    let rngs: Vec<ChaCha20Rng> = (0..config.parties)
        .map(|_| ChaCha20Rng::from_rng(rng))
        .collect();

    let runtime = Builder::new_current_thread().enable_time().build()?;
    runtime.block_on(async {
        let dealer_task =
            tokio::spawn(async move { dealer(&mut dealer_channel, &authority).await });

        let mut tasks = Vec::with_capacity(config.parties);
        for (p, ((mut channel, mut rng), inputs)) in
            channels.into_iter().zip(rngs).zip(inputs.iter().cloned()).enumerate()
        {
            let circuit = circuit.clone();
            let config = config.clone();
            tasks.push(tokio::spawn(async move {
                mpc(&mut channel, &circuit, &inputs, p, &config, &mut rng).await
            }));
        }

        let joined = join_all(tasks).await;
        dealer_task
            .await
            .map_err(|e| MpcError::TaskFailed(format!("dealer: {e}")))??;

        let mut results = Vec::with_capacity(joined.len());
        for (p, result) in joined.into_iter().enumerate() {
            let result = result.map_err(|e| MpcError::TaskFailed(format!("party {p}: {e}")))?;
            if let Err(e) = &result {
                warn!("party {p} failed: {e}");
            }
            results.push(result);
        }

        let mut results = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        if let Some(p) = results.iter().position(|outputs| *outputs != results[0]) {
            return Err(MpcError::InconsistentOutputs(p).into());
        }
        Ok::<_, Error>(results.swap_remove(0))
    })
}
