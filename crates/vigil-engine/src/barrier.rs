//! Reusable rendezvous barrier with a dynamic party set.
//!
//! [`PhaseBarrier`] is the synchronization point between the tick driver
//! and the per-session view workers. Every registered party must arrive
//! before the current phase completes and all waiters are released; the
//! phase number then advances and the barrier is immediately reusable.
//!
//! Parties are tracked by identity rather than by count. Deregistering a
//! party that has already arrived at the in-flight phase withdraws its
//! arrival and wakes it with [`BarrierError::Deregistered`], so the
//! number of expected arrivals can never drift from the party set.
//!
//! The driver is the permanent party [`PartyId::DRIVER`].

use std::collections::HashSet;
use std::fmt;
use std::sync::{Condvar, Mutex};

use vigil_core::BarrierError;

use crate::sync::lock;

/// Identity of a barrier participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartyId(pub u64);

impl PartyId {
    /// The tick driver. Registered at construction, never removed.
    pub const DRIVER: PartyId = PartyId(0);
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct BarrierState {
    phase: u64,
    parties: HashSet<PartyId>,
    arrived: HashSet<PartyId>,
    /// Parties removed while waiting; they wake with `Deregistered`.
    evicted: HashSet<PartyId>,
    terminated: bool,
}

impl BarrierState {
    fn try_advance(&mut self) -> bool {
        if self.arrived.len() < self.parties.len() {
            return false;
        }
        self.phase += 1;
        self.arrived.clear();
        true
    }
}

/// Rendezvous point for a dynamically sized set of parties.
#[derive(Debug)]
pub struct PhaseBarrier {
    state: Mutex<BarrierState>,
    advanced: Condvar,
}

impl PhaseBarrier {
    /// Create a barrier at phase 0 whose only party is the driver.
    pub fn new() -> Self {
        let mut parties = HashSet::new();
        parties.insert(PartyId::DRIVER);
        Self {
            state: Mutex::new(BarrierState {
                phase: 0,
                parties,
                arrived: HashSet::new(),
                evicted: HashSet::new(),
                terminated: false,
            }),
            advanced: Condvar::new(),
        }
    }

    /// Add a party. It is expected at every phase completed after this
    /// call returns.
    pub fn register(&self, party: PartyId) -> Result<(), BarrierError> {
        let mut st = lock(&self.state);
        if st.terminated {
            return Err(BarrierError::Terminated);
        }
        if !st.parties.insert(party) {
            return Err(BarrierError::AlreadyRegistered { party: party.0 });
        }
        Ok(())
    }

    /// Remove a party, withdrawing its arrival at the in-flight phase if
    /// it already arrived. Completes the phase if every remaining party
    /// has arrived.
    pub fn deregister(&self, party: PartyId) -> Result<(), BarrierError> {
        if party == PartyId::DRIVER {
            return Err(BarrierError::UnknownParty { party: party.0 });
        }
        let mut st = lock(&self.state);
        if !st.parties.remove(&party) {
            return Err(BarrierError::UnknownParty { party: party.0 });
        }
        if st.arrived.remove(&party) {
            st.evicted.insert(party);
        }
        st.try_advance();
        drop(st);
        self.advanced.notify_all();
        Ok(())
    }

    /// Arrive at the current phase and block until every registered party
    /// has arrived. Returns the number of the phase that completed.
    pub fn arrive_and_await(&self, party: PartyId) -> Result<u64, BarrierError> {
        let mut st = lock(&self.state);
        if st.terminated {
            return Err(BarrierError::Terminated);
        }
        if !st.parties.contains(&party) {
            return Err(BarrierError::UnknownParty { party: party.0 });
        }
        let phase = st.phase;
        st.arrived.insert(party);
        if st.try_advance() {
            drop(st);
            self.advanced.notify_all();
            return Ok(phase);
        }
        loop {
            st = self
                .advanced
                .wait(st)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if st.evicted.remove(&party) {
                return Err(BarrierError::Deregistered { party: party.0 });
            }
            if st.phase != phase {
                return Ok(phase);
            }
            if st.terminated {
                return Err(BarrierError::Terminated);
            }
        }
    }

    /// Release every waiter with [`BarrierError::Terminated`] and refuse
    /// all further arrivals and registrations.
    pub fn terminate(&self) {
        lock(&self.state).terminated = true;
        self.advanced.notify_all();
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        lock(&self.state).terminated
    }

    /// Current phase number.
    pub fn phase(&self) -> u64 {
        lock(&self.state).phase
    }

    /// Number of registered parties, driver included.
    pub fn party_count(&self) -> usize {
        lock(&self.state).parties.len()
    }

    /// Number of parties that arrived at the in-flight phase.
    pub fn arrived_count(&self) -> usize {
        lock(&self.state).arrived.len()
    }

    /// Whether `party` is registered.
    pub fn is_registered(&self, party: PartyId) -> bool {
        lock(&self.state).parties.contains(&party)
    }
}

impl Default for PhaseBarrier {
    fn default() -> Self {
        Self::new()
    }
}
