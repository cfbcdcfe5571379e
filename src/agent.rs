//! Registration of drivers with an external agent control environment.
//!
//! The environment may reject a driver. Rejections are reported as a
//! [RegistrationOutcome] and never abort the simulation; what happens to the
//! vehicle is decided by the simulation's [FailurePolicy].

use crate::error::RegistrationError;
use crate::vehicle::{Driver, DriverId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The identity a driver is published under. A stable function of the
/// driver's ID, so it is never reused within a simulation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentIdentity(String);

impl AgentIdentity {
    /// Derives the identity of the given driver.
    pub fn for_driver(id: DriverId) -> Self {
        Self(format!("driver-{}", id))
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external environment in which drivers are bound to controlling agents.
pub trait AgentEnvironment {
    /// Binds the driver to an agent with the given identity and behaviour.
    /// Must return within the calling tick.
    fn register_entity(
        &mut self,
        identity: &AgentIdentity,
        role: &str,
        driver: &Driver,
    ) -> Result<(), RegistrationError>;
}

/// What happens to a vehicle whose driver could not be registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The vehicle enters the lane without agent control.
    #[default]
    FailOpen,
    /// The vehicle stays at the head of its queue and registration is
    /// retried on the next release attempt.
    Hold,
}

/// The result of a registration attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered(AgentIdentity),
    Rejected {
        identity: AgentIdentity,
        error: RegistrationError,
    },
}

impl RegistrationOutcome {
    /// Whether the driver was registered.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// The identity the registration was attempted under.
    pub fn identity(&self) -> &AgentIdentity {
        match self {
            Self::Registered(identity) => identity,
            Self::Rejected { identity, .. } => identity,
        }
    }
}

/// A record of a registration attempt. Retries of a rejected driver that
/// fail the same way are folded into the record of the first rejection.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationRecord {
    /// The simulation time of the first attempt in s.
    pub time: f64,
    /// The simulation time of the latest attempt in s.
    pub last_time: f64,
    /// The number of attempts this record stands for.
    pub attempts: u32,
    /// The role the driver was registered under.
    pub role: String,
    /// The outcome.
    pub outcome: RegistrationOutcome,
}

/// Publishes drivers to an [AgentEnvironment], absorbing its failures.
pub struct AgentGateway {
    env: Box<dyn AgentEnvironment>,
    policy: FailurePolicy,
    history: Vec<RegistrationRecord>,
    /// The history index of each identity's latest rejection, until it is registered.
    rejections: HashMap<AgentIdentity, usize>,
    rejected: usize,
}

impl Default for AgentGateway {
    fn default() -> Self {
        Self::new(LocalEnvironment::unbounded(), FailurePolicy::default())
    }
}

impl AgentGateway {
    /// Creates a gateway to the given environment.
    pub fn new(env: impl AgentEnvironment + 'static, policy: FailurePolicy) -> Self {
        Self {
            env: Box::new(env),
            policy,
            history: vec![],
            rejections: HashMap::new(),
            rejected: 0,
        }
    }

    /// The policy applied when registration fails.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Sets the policy applied when registration fails.
    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    /// Asks the environment to bind the driver to behaviour `role`.
    /// Never fails; a rejection is returned as [RegistrationOutcome::Rejected].
    pub fn register(&mut self, driver: &Driver, role: &str, time: f64) -> RegistrationOutcome {
        let identity = AgentIdentity::for_driver(driver.id());
        let outcome = match self.env.register_entity(&identity, role, driver) {
            Ok(()) => RegistrationOutcome::Registered(identity),
            Err(error) => RegistrationOutcome::Rejected { identity, error },
        };

        if outcome.is_registered() {
            self.rejections.remove(outcome.identity());
        } else {
            self.rejected += 1;
            if let Some(&idx) = self.rejections.get(outcome.identity()) {
                let record = &mut self.history[idx];
                if record.role == role && record.outcome == outcome {
                    record.attempts = record.attempts.saturating_add(1);
                    record.last_time = time;
                    return outcome;
                }
            }
            self.rejections.insert(outcome.identity().clone(), self.history.len());
        }
        self.history.push(RegistrationRecord {
            time,
            last_time: time,
            attempts: 1,
            role: role.to_owned(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// The registration attempts so far, in order, with repeated identical
    /// rejections of a driver folded into one record.
    pub fn history(&self) -> &[RegistrationRecord] {
        &self.history
    }

    /// The identities registered successfully, in order.
    pub fn registered_identities(&self) -> impl Iterator<Item = &AgentIdentity> + '_ {
        self.history
            .iter()
            .filter(|r| r.outcome.is_registered())
            .map(|r| r.outcome.identity())
    }

    /// The number of rejected registration attempts, retries included.
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }
}

/// An in-process agent environment, optionally limited to a number of agents.
#[derive(Clone, Debug, Default)]
pub struct LocalEnvironment {
    capacity: Option<usize>,
    agents: HashSet<AgentIdentity>,
}

impl LocalEnvironment {
    /// An environment without a capacity limit.
    pub fn unbounded() -> Self {
        Default::default()
    }

    /// An environment which accepts at most `capacity` agents.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            agents: HashSet::new(),
        }
    }

    /// Whether an agent with the given identity exists.
    pub fn contains(&self, identity: &AgentIdentity) -> bool {
        self.agents.contains(identity)
    }

    /// The number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentEnvironment for LocalEnvironment {
    fn register_entity(
        &mut self,
        identity: &AgentIdentity,
        _role: &str,
        _driver: &Driver,
    ) -> Result<(), RegistrationError> {
        if self.agents.contains(identity) {
            return Err(RegistrationError::DuplicateIdentity(identity.to_string()));
        }
        if let Some(capacity) = self.capacity {
            if self.agents.len() >= capacity {
                return Err(RegistrationError::CapacityExceeded(capacity));
            }
        }
        self.agents.insert(identity.clone());
        Ok(())
    }
}
