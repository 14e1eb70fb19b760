//! A single party of the BGW protocol and the state machine driving its evaluation.
//!
//! A [`Party`] holds its private inputs and everything it knows about the shares of each wire.
//! It never talks to other parties directly: shares owned by other parties are pulled through
//! the [`Peers`] trait, and shares of Beaver triples through a [`TripleSource`]. This keeps the
//! state machine independent of whether the parties live in the same process (see
//! [`crate::orchestrator`]) or communicate over channels (see [`crate::protocol`]).
//!
//! The life cycle of a party is:
//!
//! 1. [`Party::local_setup`] splits the party's private inputs into shares.
//! 2. [`Party::interactive_setup`] fetches Beaver triple shares and the shares that other parties
//!    created for this party.
//! 3. [`Party::evaluate_until_mult`] evaluates the circuit up to the next multiplication gate,
//!    where it pauses after computing its contribution to the masked differences.
//! 4. [`Party::interactive_setup`] again, which now also opens the masked differences of the
//!    paused gate by pulling the contributions of all peers.
//! 5. Back to step 3 until [`Party::evaluate_until_mult`] returns `None`, after which
//!    [`Party::public_outputs`] returns this party's shares of all output wires.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, trace};

use crate::{
    circuit::{Circuit, CircuitError, Gate, PartyId, WireId},
    config::{Config, ConfigError},
    share::{MaskedDifference, Modulus, Share, TripleShare, add, combine_mult, scale, split},
    triples::TripleSource,
};

/// The party that adds the public cross term `D * E` when completing a multiplication.
pub const DESIGNATED_PARTY: PartyId = 0;

/// A party tried to access a share that it must not (or cannot yet) see.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The party id is out of range.
    #[error("party {party} does not exist, there are only {parties} parties")]
    UnknownParty {
        /// The requested party.
        party: PartyId,
        /// The number of parties.
        parties: usize,
    },
    /// The wire id is out of range.
    #[error("wire {0} does not exist")]
    UnknownWire(WireId),
    /// The requested input wire is not owned by the party that was asked for it.
    #[error("party {party} does not own input wire {wire}")]
    NotOwner {
        /// The requested wire.
        wire: WireId,
        /// The party that was asked.
        party: PartyId,
    },
    /// The requested wire is not a multiplication gate.
    #[error("wire {0} is not a multiplication gate")]
    NotAMultiplication(WireId),
    /// The share exists in principle, but has not been computed yet.
    #[error("party {party} has no share of wire {wire} yet")]
    NotAvailable {
        /// The requested wire.
        wire: WireId,
        /// The party that was asked.
        party: PartyId,
    },
    /// No Beaver triple has been dealt for the gate.
    #[error("no Beaver triple was dealt for gate {0}")]
    NoTriple(WireId),
    /// A party asked for triple shares that were dealt to another party.
    #[error("triple shares of party {owner} were requested by party {requester}")]
    WrongRequester {
        /// The party the shares belong to.
        owner: PartyId,
        /// The party that asked for them.
        requester: PartyId,
    },
}

/// Errors that can occur while a party sets up or evaluates the circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartyError {
    /// A share could not be accessed.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// The circuit or the inputs are malformed.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// The parameters are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A private input was provided for a wire that is not an input wire of this party.
    #[error("party {party} provided an input for wire {wire}, which it does not own")]
    InputNotOwned {
        /// The party providing the input.
        party: PartyId,
        /// The wire the input was provided for.
        wire: WireId,
    },
    /// An operation was called in the wrong phase.
    #[error("cannot {operation} in phase {phase:?}")]
    InvalidPhase {
        /// The operation that was called.
        operation: &'static str,
        /// The phase the party was in.
        phase: Phase,
    },
    /// Evaluation did not resume where it previously stopped.
    #[error("evaluation must resume at wire {expected}, not at wire {actual}")]
    CursorMismatch {
        /// The next wire to evaluate.
        expected: WireId,
        /// The wire evaluation was asked to resume at.
        actual: WireId,
    },
    /// The masked differences of a multiplication gate were not opened before resuming.
    #[error("the masked differences of gate {0} have not been opened")]
    UnopenedGate(WireId),
    /// The party's own share of a wire is missing.
    #[error("the share of wire {0} is missing")]
    MissingShare(WireId),
}

/// The phases of a [`Party`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, but the inputs have not been shared yet.
    Uninitialized,
    /// The private inputs have been split into shares.
    LocalSetupDone,
    /// Triple shares and input shares of other parties have been fetched.
    InteractiveSetupDone,
    /// Paused at the multiplication gate `cursor` until its masked differences are opened.
    Evaluating {
        /// The paused multiplication gate.
        cursor: WireId,
    },
    /// All wires have been evaluated.
    Done,
}

/// Read access to the shares held by the other parties.
pub trait Peers {
    /// The share of `owner`'s input on `wire` that `owner` created for `requester`.
    fn input_share(
        &self,
        owner: PartyId,
        wire: WireId,
        requester: PartyId,
    ) -> Result<Share, AccessError>;

    /// `peer`'s contribution to the masked differences of the multiplication `gate`.
    fn masked_difference(
        &self,
        peer: PartyId,
        gate: WireId,
        requester: PartyId,
    ) -> Result<MaskedDifference, AccessError>;
}

#[derive(Debug, Clone, Copy)]
struct MultState {
    local: MaskedDifference,
    opened: Option<MaskedDifference>,
}

/// One party of the computation.
#[derive(Clone)]
pub struct Party {
    id: PartyId,
    parties: usize,
    modulus: Modulus,
    circuit: Arc<Circuit>,
    triples: Arc<dyn TripleSource>,
    inputs: BTreeMap<WireId, Share>,
    rng: ChaCha20Rng,
    phase: Phase,
    /// For every wire, this party's knowledge of the shares of all parties.
    shares: Vec<Vec<Option<Share>>>,
    triple_shares: HashMap<WireId, TripleShare>,
    mults: HashMap<WireId, MultState>,
    pending: Option<WireId>,
    next_wire: WireId,
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party")
            .field("id", &self.id)
            .field("parties", &self.parties)
            .field("phase", &self.phase)
            .field("next_wire", &self.next_wire)
            .finish_non_exhaustive()
    }
}

impl Party {
    /// Creates party `id`, which owns the private `inputs` (wire id to value).
    ///
    /// The party draws all randomness for splitting its inputs from a generator seeded by `rng`.
    pub fn new(
        id: PartyId,
        config: &Config,
        circuit: Arc<Circuit>,
        triples: Arc<dyn TripleSource>,
        inputs: BTreeMap<WireId, i64>,
        rng: &mut impl RngCore,
    ) -> Result<Self, PartyError> {
        config.validate()?;
        if id >= config.parties {
            return Err(AccessError::UnknownParty {
                party: id,
                parties: config.parties,
            }
            .into());
        }
        circuit.validate_parties(config.parties)?;
        Self::validate_inputs(id, &circuit, &inputs)?;
        let modulus = config.modulus;
        let inputs = inputs
            .into_iter()
            .map(|(w, v)| (w, modulus.reduce(i128::from(v))))
            .collect();
        Ok(Self {
            id,
            parties: config.parties,
            modulus,
            circuit,
            triples,
            inputs,
            rng: ChaCha20Rng::from_rng(rng),
            phase: Phase::Uninitialized,
            shares: vec![],
            triple_shares: HashMap::new(),
            mults: HashMap::new(),
            pending: None,
            next_wire: 0,
        })
    }

    /// Checks that `inputs` holds a value for exactly the input wires that `id` owns.
    pub fn validate_inputs(
        id: PartyId,
        circuit: &Circuit,
        inputs: &BTreeMap<WireId, i64>,
    ) -> Result<(), PartyError> {
        if let Some(&wire) = inputs
            .keys()
            .find(|&&w| circuit.get(w).map(|w| w.gate) != Some(Gate::Input(id)))
        {
            return Err(PartyError::InputNotOwned { party: id, wire });
        }
        if let Some(wire) = circuit.inputs_of(id).find(|w| !inputs.contains_key(w)) {
            return Err(CircuitError::MissingInput(wire).into());
        }
        Ok(())
    }

    /// The id of this party.
    pub fn id(&self) -> PartyId {
        self.id
    }

    /// The current phase of this party.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The wire at which evaluation has to resume.
    pub fn next_wire(&self) -> WireId {
        self.next_wire
    }

    /// Splits every private input into one share per party.
    ///
    /// The party keeps its own share; the others are handed out via [`Party::peer_input_share`].
    pub fn local_setup(&mut self) -> Result<(), PartyError> {
        if self.phase != Phase::Uninitialized {
            return Err(self.invalid_phase("run the local setup"));
        }
        self.shares = vec![vec![None; self.parties]; self.circuit.len()];
        for (&wire, &value) in &self.inputs {
            let shares = split(&mut self.rng, value, self.parties, self.modulus);
            self.shares[wire] = shares.into_iter().map(Some).collect();
        }
        debug!(
            party = self.id,
            "split {} private inputs into {} shares each",
            self.inputs.len(),
            self.parties
        );
        self.phase = Phase::LocalSetupDone;
        Ok(())
    }

    /// Fetches everything this party needs from others before it can continue evaluating.
    ///
    /// This pulls the triple share of every multiplication gate, this party's share of every input
    /// owned by another party and, if evaluation is paused at a multiplication gate, the
    /// contributions of all peers to its masked differences, which are then opened. Entries that
    /// have already been resolved are left untouched, so calling this repeatedly is harmless.
    pub fn interactive_setup(&mut self, peers: &impl Peers) -> Result<(), PartyError> {
        if self.phase == Phase::Uninitialized {
            return Err(self.invalid_phase("run the interactive setup"));
        }
        let circuit = Arc::clone(&self.circuit);
        for (wire, w) in circuit.wires().iter().enumerate() {
            match w.gate {
                Gate::Mult(_, _) if !self.triple_shares.contains_key(&wire) => {
                    let triple = self.triples.triple_share(wire, self.id)?;
                    self.triple_shares.insert(wire, triple);
                }
                Gate::Input(owner) if owner != self.id && self.shares[wire][self.id].is_none() => {
                    let share = peers.input_share(owner, wire, self.id)?;
                    self.shares[wire][self.id] = Some(share);
                }
                _ => {}
            }
        }
        if let Some(gate) = self.pending {
            self.open(gate, peers)?;
        }
        if self.phase != Phase::Done {
            self.phase = Phase::InteractiveSetupDone;
        }
        Ok(())
    }

    /// Evaluates the circuit starting at wire `from` until the next multiplication gate.
    ///
    /// If evaluation was paused at a multiplication gate, that gate is completed first, which
    /// requires its masked differences to have been opened by [`Party::interactive_setup`].
    /// Returns the id of the multiplication gate evaluation paused at, or `None` once all wires
    /// have been evaluated. `from` must be the wire after the previously returned gate (or `0`).
    pub fn evaluate_until_mult(&mut self, from: WireId) -> Result<Option<WireId>, PartyError> {
        if matches!(self.phase, Phase::Uninitialized | Phase::LocalSetupDone) {
            return Err(self.invalid_phase("evaluate the circuit"));
        }
        if from != self.next_wire {
            return Err(PartyError::CursorMismatch {
                expected: self.next_wire,
                actual: from,
            });
        }
        if self.phase == Phase::Done {
            return Ok(None);
        }
        if let Some(gate) = self.pending {
            self.complete_mult(gate)?;
            self.pending = None;
        }
        let m = self.modulus;
        let circuit = Arc::clone(&self.circuit);
        for (wire, w) in circuit.wires().iter().enumerate().skip(from) {
            let share = match w.gate {
                Gate::Input(_) => self.own_share(wire)?,
                Gate::Add(a, b) => add(self.own_share(a)?, self.own_share(b)?, m),
                Gate::ConstMult(c, a) => scale(c, self.own_share(a)?, m),
                Gate::Mult(a, b) => {
                    let triple = *self
                        .triple_shares
                        .get(&wire)
                        .ok_or(AccessError::NoTriple(wire))?;
                    let local =
                        MaskedDifference::local(self.own_share(a)?, self.own_share(b)?, triple, m);
                    self.mults.insert(wire, MultState { local, opened: None });
                    self.pending = Some(wire);
                    self.next_wire = wire + 1;
                    self.phase = Phase::Evaluating { cursor: wire };
                    trace!(party = self.id, gate = wire, "paused at multiplication");
                    return Ok(Some(wire));
                }
            };
            self.shares[wire][self.id] = Some(share);
            self.next_wire = wire + 1;
        }
        debug!(party = self.id, "evaluated all {} wires", circuit.len());
        self.phase = Phase::Done;
        Ok(None)
    }

    /// The share of this party's input on `wire` that it created for `requester`.
    pub fn peer_input_share(&self, wire: WireId, requester: PartyId) -> Result<Share, AccessError> {
        self.check_requester(requester)?;
        let w = self.circuit.get(wire).ok_or(AccessError::UnknownWire(wire))?;
        if w.gate != Gate::Input(self.id) {
            return Err(AccessError::NotOwner {
                wire,
                party: self.id,
            });
        }
        self.shares
            .get(wire)
            .and_then(|shares| shares[requester])
            .ok_or(AccessError::NotAvailable {
                wire,
                party: self.id,
            })
    }

    /// This party's contribution to the masked differences of the multiplication `gate`.
    ///
    /// The contribution does not reveal anything about the factors, because they are masked with
    /// the uniformly random triple shares.
    pub fn peer_masked_difference(
        &self,
        gate: WireId,
        requester: PartyId,
    ) -> Result<MaskedDifference, AccessError> {
        self.check_requester(requester)?;
        let w = self.circuit.get(gate).ok_or(AccessError::UnknownWire(gate))?;
        if !matches!(w.gate, Gate::Mult(_, _)) {
            return Err(AccessError::NotAMultiplication(gate));
        }
        self.mults
            .get(&gate)
            .map(|state| state.local)
            .ok_or(AccessError::NotAvailable {
                wire: gate,
                party: self.id,
            })
    }

    /// This party's shares of all output wires.
    pub fn public_outputs(&self) -> Result<BTreeMap<WireId, Share>, PartyError> {
        if self.phase != Phase::Done {
            return Err(self.invalid_phase("reveal the outputs"));
        }
        self.circuit
            .output_wires()
            .map(|wire| self.own_share(wire).map(|share| (wire, share)))
            .collect()
    }

    fn open(&mut self, gate: WireId, peers: &impl Peers) -> Result<(), PartyError> {
        let state = *self.mults.get(&gate).ok_or(PartyError::UnopenedGate(gate))?;
        if state.opened.is_some() {
            return Ok(());
        }
        let mut contributions = Vec::with_capacity(self.parties);
        for peer in 0..self.parties {
            if peer == self.id {
                contributions.push(state.local);
            } else {
                contributions.push(peers.masked_difference(peer, gate, self.id)?);
            }
        }
        let opened = MaskedDifference::open(contributions, self.modulus);
        trace!(party = self.id, gate, "opened masked differences");
        if let Some(state) = self.mults.get_mut(&gate) {
            state.opened = Some(opened);
        }
        Ok(())
    }

    fn complete_mult(&mut self, gate: WireId) -> Result<(), PartyError> {
        let opened = self
            .mults
            .get(&gate)
            .and_then(|state| state.opened)
            .ok_or(PartyError::UnopenedGate(gate))?;
        let triple = *self
            .triple_shares
            .get(&gate)
            .ok_or(AccessError::NoTriple(gate))?;
        let share = combine_mult(self.id == DESIGNATED_PARTY, triple, opened, self.modulus);
        self.shares[gate][self.id] = Some(share);
        Ok(())
    }

    fn own_share(&self, wire: WireId) -> Result<Share, PartyError> {
        self.shares
            .get(wire)
            .and_then(|shares| shares[self.id])
            .ok_or(PartyError::MissingShare(wire))
    }

    fn check_requester(&self, requester: PartyId) -> Result<(), AccessError> {
        if requester < self.parties {
            Ok(())
        } else {
            Err(AccessError::UnknownParty {
                party: requester,
                parties: self.parties,
            })
        }
    }

    fn invalid_phase(&self, operation: &'static str) -> PartyError {
        PartyError::InvalidPhase {
            operation,
            phase: self.phase,
        }
    }
}
