//! Parameters that all parties of a computation must agree on.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    circuit::{Circuit, CircuitError, WireId},
    share::Modulus,
};

/// How long a party waits for a single message before aborting the protocol.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Errors caused by invalid or inadequate parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The modulus must be at least 2.
    #[error("invalid modulus {0}, must be at least 2")]
    InvalidModulus(u64),
    /// At least two parties are required.
    #[error("at least 2 parties are required, but {0} were configured")]
    TooFewParties(usize),
    /// The number of input maps does not match the number of parties.
    #[error("expected inputs for {expected} parties, but got {actual}")]
    WrongNumberOfInputs {
        /// The configured number of parties.
        expected: usize,
        /// The number of input maps provided.
        actual: usize,
    },
    /// The modulus is too small for a value occurring during the computation.
    #[error("modulus {modulus} is too small for wire {wire}, which reaches magnitude {magnitude}")]
    ModulusTooSmall {
        /// The first wire whose value would wrap around.
        wire: WireId,
        /// The absolute value of that wire.
        magnitude: u128,
        /// The configured modulus.
        modulus: u64,
    },
    /// The circuit could not be evaluated in the clear while checking the modulus.
    #[error("could not check the modulus: {0}")]
    Plaintext(#[from] CircuitError),
}

fn default_check_modulus() -> bool {
    true
}

fn default_round_timeout() -> Duration {
    DEFAULT_ROUND_TIMEOUT
}

/// The public parameters of a computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The number of computing parties.
    pub parties: usize,
    /// The modulus of the ring all values are shared in.
    pub modulus: Modulus,
    /// Whether to reject computations whose intermediate values do not fit into the modulus.
    ///
    /// The check evaluates the circuit in the clear and is therefore only possible where all
    /// inputs are known, i.e. in simulations.
    #[serde(default = "default_check_modulus")]
    pub check_modulus: bool,
    /// How long to wait for any single message of another party.
    #[serde(default = "default_round_timeout")]
    pub round_timeout: Duration,
}

impl Config {
    /// Creates a config with the modulus check enabled and the default round timeout.
    pub fn new(parties: usize, modulus: u64) -> Result<Self, ConfigError> {
        let config = Self {
            parties,
            modulus: Modulus::new(modulus)?,
            check_modulus: default_check_modulus(),
            round_timeout: DEFAULT_ROUND_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Enables or disables the modulus adequacy check.
    pub fn with_check_modulus(mut self, check_modulus: bool) -> Self {
        self.check_modulus = check_modulus;
        self
    }

    /// Sets the timeout for receiving a single message.
    pub fn with_round_timeout(mut self, round_timeout: Duration) -> Self {
        self.round_timeout = round_timeout;
        self
    }

    /// Checks the parameters, which is necessary after deserializing a config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parties < 2 {
            return Err(ConfigError::TooFewParties(self.parties));
        }
        Ok(())
    }

    /// Checks that no wire of the circuit reaches a magnitude of `m` or more for the given inputs.
    ///
    /// Does nothing if [`Config::check_modulus`] is disabled.
    pub fn check_adequacy(
        &self,
        circuit: &Circuit,
        inputs: &[BTreeMap<WireId, i64>],
    ) -> Result<(), ConfigError> {
        if !self.check_modulus {
            return Ok(());
        }
        let inputs: BTreeMap<WireId, i64> = inputs
            .iter()
            .flat_map(|inputs| inputs.iter().map(|(&w, &v)| (w, v)))
            .collect();
        let modulus = self.modulus.get();
        for (wire, value) in circuit.eval_plaintext(&inputs)?.into_iter().enumerate() {
            let magnitude = value.unsigned_abs();
            if magnitude >= u128::from(modulus) {
                return Err(ConfigError::ModulusTooSmall {
                    wire,
                    magnitude,
                    modulus,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Wire;

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(Config::new(1, 1024), Err(ConfigError::TooFewParties(1)));
        assert_eq!(Config::new(3, 1), Err(ConfigError::InvalidModulus(1)));
        assert!(Config::new(2, 2).is_ok());
    }

    #[test]
    fn modulus_adequacy() {
        let circuit = Circuit::new(vec![
            Wire::input(0),
            Wire::input(1),
            Wire::mult(0, 1).output(),
        ])
        .unwrap();
        let inputs = [BTreeMap::from([(0, 40)]), BTreeMap::from([(1, 30)])];

        let config = Config::new(2, 1024).unwrap();
        assert_eq!(
            config.check_adequacy(&circuit, &inputs),
            Err(ConfigError::ModulusTooSmall {
                wire: 2,
                magnitude: 1200,
                modulus: 1024
            })
        );
        assert!(
            config
                .clone()
                .with_check_modulus(false)
                .check_adequacy(&circuit, &inputs)
                .is_ok()
        );
        assert!(
            Config::new(2, 1201)
                .unwrap()
                .check_adequacy(&circuit, &inputs)
                .is_ok()
        );
    }

    #[test]
    fn deserializing_rejects_invalid_modulus() {
        let config = Config::new(3, 1024).unwrap();
        let bytes = bincode::serialize(&config).unwrap();
        let decoded: Config = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, config);

        let bytes = bincode::serialize(&(3usize, 1u64, true, DEFAULT_ROUND_TIMEOUT)).unwrap();
        assert!(bincode::deserialize::<Config>(&bytes).is_err());
    }
}
