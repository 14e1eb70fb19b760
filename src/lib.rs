//! A Rust implementation of secure multi-party computation (MPC) over arithmetic circuits, based on
//! additive secret sharing and Beaver triples in the style of BGW.
//!
//! N mutually distrustful parties jointly evaluate an arithmetic circuit over their private
//! inputs. Every value is additively shared modulo `m`, so that any proper subset of the shares is
//! independent of the value. Additions and multiplications with public constants are computed
//! locally by each party, multiplications use one Beaver triple per gate supplied by a
//! semi-trusted triple authority. Only wires marked as outputs are ever revealed.
//!
//! ## Main Components
//!
//! The crate is structured into several modules:
//!
//! * [`circuit`]: The static description of wires and their dependencies.
//! * [`share`]: Share arithmetic over the integers modulo `m`.
//! * [`triples`]: The triple authority, which generates one Beaver triple per multiplication gate.
//! * [`party`]: The per-party state machine that drives local and interactive setup and
//!   evaluation.
//! * [`orchestrator`]: Runs all parties in-process in synchronized rounds.
//! * [`protocol`]: The [`protocol::mpc`] function which executes the protocol for a single party
//!   over a [`channel::Channel`].
//! * [`channel`]: Communication abstractions for exchanging data between parties.
//! * [`config`]: Parameters shared by all parties.
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use bgw_tune::{
//!     circuit::{Circuit, Wire},
//!     config::Config,
//!     orchestrator::run_circuit,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // (a + b) * (6 * c), with a, b and c owned by parties 0, 1 and 2:
//! let circuit = Circuit::new(vec![
//!     Wire::input(0),
//!     Wire::input(1),
//!     Wire::input(2),
//!     Wire::add(0, 1),
//!     Wire::const_mult(6, 2),
//!     Wire::mult(3, 4).output(),
//! ])?;
//! let inputs = vec![
//!     BTreeMap::from([(0, 9)]),
//!     BTreeMap::from([(1, 5)]),
//!     BTreeMap::from([(2, 3)]),
//! ];
//! let outputs = run_circuit(Config::new(3, 1024)?, circuit, inputs)?;
//! assert_eq!(outputs, BTreeMap::from([(5, 252)]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! The protocol is secure against honest-but-curious parties: parties follow the protocol, but
//! should learn nothing beyond their own inputs and the revealed outputs. The triple authority is
//! trusted not to leak shares or collude with any party.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod circuit;
pub mod config;
pub mod orchestrator;
pub mod party;
pub mod protocol;
pub mod share;
pub mod triples;
