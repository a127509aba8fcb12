//! Per-machine exclusion and best-effort state bookkeeping.
//!
//! Two resize workflows for the same machine must never interleave, while
//! independent machines resize fully in parallel. The registry hands out
//! scoped guards backed by a per-machine async mutex; the guard releases on
//! every exit path, including panics and early returns.
//!
//! Each machine slot also carries a recorded lifecycle state the workflow
//! mutates as it progresses. External status queries read it through
//! [`MachineRegistry::recorded_state`]; the workflow itself never does — it
//! always re-polls the provider's authoritative state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::provider::MachineState;

#[derive(Clone)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    state: Arc<Mutex<MachineState>>,
}

/// Registry of per-machine locks and recorded lifecycle states.
#[derive(Default)]
pub struct MachineRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MachineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive guard for a machine, waiting if another
    /// workflow currently holds it. The recorded state is initialised to
    /// `initial` once the guard is held.
    pub async fn acquire(&self, machine_id: &str, initial: MachineState) -> MachineGuard {
        let slot = self.slot(machine_id);
        let permit = Arc::clone(&slot.lock).lock_owned().await;
        let guard = MachineGuard {
            machine_id: machine_id.to_owned(),
            state: Arc::clone(&slot.state),
            _permit: permit,
        };
        guard.record_state(initial);
        guard
    }

    /// Returns the last state a workflow recorded for a machine, if any
    /// workflow ever touched it.
    #[must_use]
    pub fn recorded_state(&self, machine_id: &str) -> Option<MachineState> {
        let slots = self.slots.lock().ok()?;
        let slot = slots.get(machine_id)?;
        slot.state.lock().ok().map(|state| *state)
    }

    fn slot(&self, machine_id: &str) -> Slot {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slots
            .entry(machine_id.to_owned())
            .or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                state: Arc::new(Mutex::new(MachineState::Unknown)),
            })
            .clone()
    }
}

/// Scoped exclusive hold on a machine.
///
/// Dropping the guard releases the machine for the next workflow.
pub struct MachineGuard {
    machine_id: String,
    state: Arc<Mutex<MachineState>>,
    _permit: OwnedMutexGuard<()>,
}

impl MachineGuard {
    /// Identifier of the held machine.
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Records a lifecycle state for external status queries. Best-effort
    /// bookkeeping only; never consulted for workflow correctness.
    pub fn record_state(&self, state: MachineState) {
        if let Ok(mut recorded) = self.state.lock() {
            *recorded = state;
        }
    }

    /// Returns the last recorded state.
    #[must_use]
    pub fn recorded_state(&self) -> MachineState {
        self.state
            .lock()
            .map_or(MachineState::Unknown, |state| *state)
    }
}
