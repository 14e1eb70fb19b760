//! Arithmetic circuits as a forward-referencing sequence of wires.
//!
//! A [`Circuit`] is an ordered list of [`Wire`]s. Each wire is identified by its index and may
//! only reference wires with a strictly lower index, so that a single pass in ascending order is
//! enough to evaluate the whole circuit. The invariant is checked whenever a circuit is built,
//! including when it is deserialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The index of a wire in its circuit.
pub type WireId = usize;

/// The index of a party taking part in the computation (`0..parties`).
pub type PartyId = usize;

/// Errors caused by a malformed circuit or by inputs that do not fit the circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError {
    /// A wire references a wire that does not come strictly before it.
    #[error("wire {wire} references wire {predecessor}, which does not precede it")]
    ForwardReference {
        /// The offending wire.
        wire: WireId,
        /// The referenced wire.
        predecessor: WireId,
    },
    /// An input wire is owned by a party that does not take part in the computation.
    #[error("input wire {wire} is owned by party {owner}, but there are only {parties} parties")]
    UnknownOwner {
        /// The input wire.
        wire: WireId,
        /// The owner specified in the circuit.
        owner: PartyId,
        /// The number of parties.
        parties: usize,
    },
    /// No value was provided for an input wire.
    #[error("no value provided for input wire {0}")]
    MissingInput(WireId),
    /// A value was provided for a wire that is not an input wire of the circuit.
    #[error("wire {0} is not an input wire")]
    NotAnInputWire(WireId),
    /// The plaintext value of a wire does not fit into an `i128`.
    #[error("plaintext value of wire {0} overflows")]
    Overflow(WireId),
}

/// The operation that produces the value of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    /// The private input of the given party.
    Input(PartyId),
    /// `A + B`.
    Add(WireId, WireId),
    /// `c * A` for a public constant `c`.
    ConstMult(i64, WireId),
    /// `A * B`, which requires an interactive multiplication using a Beaver triple.
    Mult(WireId, WireId),
}

impl Gate {
    /// The wires whose values this gate consumes.
    pub fn predecessors(&self) -> Vec<WireId> {
        match *self {
            Gate::Input(_) => vec![],
            Gate::ConstMult(_, a) => vec![a],
            Gate::Add(a, b) | Gate::Mult(a, b) => vec![a, b],
        }
    }
}

/// A single value-producing node of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wire {
    /// The gate computing the value of this wire.
    pub gate: Gate,
    /// Whether the value of this wire is revealed to all parties after the computation.
    pub is_output: bool,
}

impl Wire {
    /// A private input of `owner`.
    pub fn input(owner: PartyId) -> Self {
        Self::private(Gate::Input(owner))
    }

    /// The sum of wires `a` and `b`.
    pub fn add(a: WireId, b: WireId) -> Self {
        Self::private(Gate::Add(a, b))
    }

    /// The product of wire `a` with the public constant `c`.
    pub fn const_mult(c: i64, a: WireId) -> Self {
        Self::private(Gate::ConstMult(c, a))
    }

    /// The product of wires `a` and `b`.
    pub fn mult(a: WireId, b: WireId) -> Self {
        Self::private(Gate::Mult(a, b))
    }

    /// Marks the wire as an output wire.
    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    fn private(gate: Gate) -> Self {
        Self {
            gate,
            is_output: false,
        }
    }
}

/// A validated arithmetic circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Wire>", into = "Vec<Wire>")]
pub struct Circuit {
    wires: Vec<Wire>,
}

impl Circuit {
    /// Builds a circuit, checking that every wire only references earlier wires.
    pub fn new(wires: Vec<Wire>) -> Result<Self, CircuitError> {
        for (wire, w) in wires.iter().enumerate() {
            if let Some(&predecessor) = w.gate.predecessors().iter().find(|&&p| p >= wire) {
                return Err(CircuitError::ForwardReference { wire, predecessor });
            }
        }
        Ok(Self { wires })
    }

    /// Checks that every input wire is owned by one of `parties` parties.
    pub fn validate_parties(&self, parties: usize) -> Result<(), CircuitError> {
        for (wire, w) in self.wires.iter().enumerate() {
            if let Gate::Input(owner) = w.gate {
                if owner >= parties {
                    return Err(CircuitError::UnknownOwner {
                        wire,
                        owner,
                        parties,
                    });
                }
            }
        }
        Ok(())
    }

    /// All wires, in evaluation order.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// The wire with the given index, if it exists.
    pub fn get(&self, wire: WireId) -> Option<&Wire> {
        self.wires.get(wire)
    }

    /// The number of wires.
    pub fn len(&self) -> usize {
        self.wires.len()
    }

    /// Returns `true` if the circuit has no wires.
    pub fn is_empty(&self) -> bool {
        self.wires.is_empty()
    }

    /// The ids of all multiplication wires, in ascending order.
    pub fn mult_gates(&self) -> impl Iterator<Item = WireId> + '_ {
        self.wires
            .iter()
            .enumerate()
            .filter(|(_, w)| matches!(w.gate, Gate::Mult(_, _)))
            .map(|(id, _)| id)
    }

    /// The ids of all output wires, in ascending order.
    pub fn output_wires(&self) -> impl Iterator<Item = WireId> + '_ {
        self.wires
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_output)
            .map(|(id, _)| id)
    }

    /// The ids of all input wires owned by `party`, in ascending order.
    pub fn inputs_of(&self, party: PartyId) -> impl Iterator<Item = WireId> + '_ {
        self.wires
            .iter()
            .enumerate()
            .filter(move |(_, w)| w.gate == Gate::Input(party))
            .map(|(id, _)| id)
    }

    /// Evaluates the circuit in the clear over the integers.
    ///
    /// `inputs` must contain a value for every input wire (regardless of its owner) and nothing
    /// else. Returns the value of every wire.
    pub fn eval_plaintext(&self, inputs: &BTreeMap<WireId, i64>) -> Result<Vec<i128>, CircuitError> {
        if let Some(&wire) = inputs
            .keys()
            .find(|&&w| !matches!(self.get(w), Some(Wire { gate: Gate::Input(_), .. })))
        {
            return Err(CircuitError::NotAnInputWire(wire));
        }
        let mut values: Vec<i128> = Vec::with_capacity(self.len());
        for (wire, w) in self.wires.iter().enumerate() {
            let value = match w.gate {
                Gate::Input(_) => {
                    let Some(&v) = inputs.get(&wire) else {
                        return Err(CircuitError::MissingInput(wire));
                    };
                    Some(i128::from(v))
                }
                Gate::Add(a, b) => values[a].checked_add(values[b]),
                Gate::ConstMult(c, a) => i128::from(c).checked_mul(values[a]),
                Gate::Mult(a, b) => values[a].checked_mul(values[b]),
            };
            values.push(value.ok_or(CircuitError::Overflow(wire))?);
        }
        Ok(values)
    }
}

impl TryFrom<Vec<Wire>> for Circuit {
    type Error = CircuitError;

    fn try_from(wires: Vec<Wire>) -> Result<Self, Self::Error> {
        Self::new(wires)
    }
}

impl From<Circuit> for Vec<Wire> {
    fn from(circuit: Circuit) -> Self {
        circuit.wires
    }
}
