//! Shared harness for driving the orchestrator in tests.

use std::sync::Arc;
use std::time::Duration;

use voluma::{
    Finalizer, MachineState, Poller, ResizeOrchestrator, ResizePolicy, ResizeRequest,
};

use super::test_doubles::{MACHINE_ID, ScriptedDomains, ScriptedProbe, ScriptedProvider};

pub const CEILING_GB: u32 = 100;

pub type TestOrchestrator = ResizeOrchestrator<ScriptedProvider, ScriptedDomains, ScriptedProbe>;

/// Builds an orchestrator over the doubles with millisecond poll budgets.
pub fn orchestrator(
    provider: &ScriptedProvider,
    domains: &ScriptedDomains,
    probe: &ScriptedProbe,
) -> TestOrchestrator {
    ResizeOrchestrator::new(
        Arc::new(provider.clone()),
        Finalizer::new(domains.clone(), probe.clone()).with_probe_timeout(Duration::from_millis(50)),
        ResizePolicy::new(CEILING_GB, "b_ssd"),
    )
    .with_poller(Poller::new(
        Duration::from_millis(1),
        Duration::from_millis(100),
    ))
}

/// A request for a machine recorded as running.
pub fn running_request(desired_gb: u32) -> ResizeRequest {
    request_with_state(desired_gb, MachineState::Running)
}

/// A request for a machine recorded as already stopped.
pub fn stopped_request(desired_gb: u32) -> ResizeRequest {
    request_with_state(desired_gb, MachineState::Stopped)
}

fn request_with_state(desired_gb: u32, state: MachineState) -> ResizeRequest {
    ResizeRequest::builder()
        .machine_id(MACHINE_ID)
        .desired_size_gb(desired_gb)
        .current_state(state)
        .domain_name("box.example.com")
        .username("alice")
        .build()
        .unwrap_or_else(|err| panic!("request build: {err}"))
}
