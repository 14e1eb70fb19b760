//! Synchronous, in-process execution of the protocol for all parties at once.
//!
//! The [`Orchestrator`] owns every [`Party`] and drives them through the setup and evaluation
//! rounds in lock-step. Between two rounds, every party runs [`Party::interactive_setup`], which
//! is where the masked differences of the multiplication gate all parties paused at are opened.

use std::{collections::BTreeMap, sync::Arc};

use rand::RngCore;
use tracing::{debug, info};

use crate::{
    circuit::{Circuit, CircuitError, PartyId, WireId},
    config::{Config, ConfigError},
    party::{AccessError, Party, PartyError, Peers},
    share::{MaskedDifference, Share, add},
    triples::{TripleAuthority, TripleSource},
};

/// Errors that can occur while running a circuit in-process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The parameters are invalid or the modulus is too small.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The circuit is malformed.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// A party failed.
    #[error("party {party} failed: {source}")]
    Party {
        /// The failing party.
        party: PartyId,
        /// What went wrong.
        source: PartyError,
    },
    /// The parties stopped at different wires.
    #[error("parties are out of sync in round {round}: {stops:?}")]
    OutOfSync {
        /// The evaluation round.
        round: usize,
        /// Where each party stopped.
        stops: Vec<Option<WireId>>,
    },
}

/// Runs `circuit` for all parties with fresh randomness and returns the revealed outputs.
///
/// `inputs[p]` are the private inputs of party `p`.
pub fn run_circuit(
    config: Config,
    circuit: Circuit,
    inputs: Vec<BTreeMap<WireId, i64>>,
) -> Result<BTreeMap<WireId, Share>, Error> {
    Orchestrator::new(config, circuit, inputs, &mut rand::rng())?.run()
}

/// Drives all parties through synchronized setup and evaluation rounds.
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    circuit: Arc<Circuit>,
    authority: Arc<TripleAuthority>,
    parties: Vec<Party>,
}

impl Orchestrator {
    /// Creates one party per input map, all bound to the same circuit and triple authority.
    ///
    /// All randomness is derived from `rng`, so a seeded generator makes the run reproducible.
    pub fn new(
        config: Config,
        circuit: Circuit,
        inputs: Vec<BTreeMap<WireId, i64>>,
        rng: &mut impl RngCore,
    ) -> Result<Self, Error> {
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
            Party::validate_inputs(party, &circuit, inputs)
                .map_err(|source| Error::Party { party, source })?;
        }
        config.check_adequacy(&circuit, &inputs)?;

        let circuit = Arc::new(circuit);
        let authority = Arc::new(TripleAuthority::new(config.parties, config.modulus, rng));
        let triples: Arc<dyn TripleSource> = authority.clone();
        let parties = inputs
            .into_iter()
            .enumerate()
            .map(|(party, inputs)| {
                Party::new(
                    party,
                    &config,
                    Arc::clone(&circuit),
                    Arc::clone(&triples),
                    inputs,
                    rng,
                )
                .map_err(|source| Error::Party { party, source })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            config,
            circuit,
            authority,
            parties,
        })
    }

    /// The triple authority shared by all parties.
    pub fn authority(&self) -> Arc<TripleAuthority> {
        Arc::clone(&self.authority)
    }

    /// Runs the protocol to completion and reconstructs all output wires.
    pub fn run(mut self) -> Result<BTreeMap<WireId, Share>, Error> {
        info!(
            parties = self.config.parties,
            wires = self.circuit.len(),
            "running circuit"
        );
        for party in self.parties.iter_mut() {
            party
                .local_setup()
                .map_err(|source| Error::Party {
                    party: party.id(),
                    source,
                })?;
        }
        self.interactive_round()?;

        let mut next = vec![0; self.parties.len()];
        let mut round = 0;
        loop {
            let stops = self
                .parties
                .iter_mut()
                .zip(&next)
                .map(|(party, &from)| {
                    party.evaluate_until_mult(from).map_err(|source| Error::Party {
                        party: party.id(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let Some(&first) = stops.first() else {
                break;
            };
            if stops.iter().any(|&stop| stop != first) {
                return Err(Error::OutOfSync { round, stops });
            }
            let Some(gate) = first else {
                break;
            };
            debug!(round, gate, "all parties paused at multiplication");
            next.iter_mut().for_each(|n| *n = gate + 1);
            self.interactive_round()?;
            round += 1;
        }
        info!(rounds = round, "evaluated circuit");
        self.reveal()
    }

    fn interactive_round(&mut self) -> Result<(), Error> {
        for i in 0..self.parties.len() {
            let (before, rest) = self.parties.split_at_mut(i);
            let Some((party, after)) = rest.split_first_mut() else {
                break;
            };
            let peers = PeerView {
                before,
                after,
                me: i,
            };
            party
                .interactive_setup(&peers)
                .map_err(|source| Error::Party { party: i, source })?;
        }
        Ok(())
    }

    fn reveal(&self) -> Result<BTreeMap<WireId, Share>, Error> {
        let m = self.config.modulus;
        let mut outputs: BTreeMap<WireId, Share> =
            self.circuit.output_wires().map(|w| (w, 0)).collect();
        for party in &self.parties {
            let shares = party.public_outputs().map_err(|source| Error::Party {
                party: party.id(),
                source,
            })?;
            for (wire, share) in shares {
                let sum = outputs.entry(wire).or_default();
                *sum = add(*sum, share, m);
            }
        }
        Ok(outputs)
    }
}

/// All parties except the one currently running its interactive setup.
struct PeerView<'a> {
    before: &'a [Party],
    after: &'a [Party],
    me: PartyId,
}

impl PeerView<'_> {
    fn peer(&self, id: PartyId) -> Result<&Party, AccessError> {
        let parties = self.before.len() + 1 + self.after.len();
        let peer = if id < self.me {
            self.before.get(id)
        } else if id > self.me {
            self.after.get(id - self.me - 1)
        } else {
            None
        };
        peer.ok_or(AccessError::UnknownParty { party: id, parties })
    }
}

impl Peers for PeerView<'_> {
    fn input_share(
        &self,
        owner: PartyId,
        wire: WireId,
        requester: PartyId,
    ) -> Result<Share, AccessError> {
        self.peer(owner)?.peer_input_share(wire, requester)
    }

    fn masked_difference(
        &self,
        peer: PartyId,
        gate: WireId,
        requester: PartyId,
    ) -> Result<MaskedDifference, AccessError> {
        self.peer(peer)?.peer_masked_difference(gate, requester)
    }
}
