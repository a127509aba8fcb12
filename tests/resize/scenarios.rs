//! End-to-end workflow scenarios: success, validation, and compensation.

use voluma::ResizeError;

use super::test_doubles::{
    Call, DEVICE_PATH, MACHINE_ID, NEW_VOLUME_ID, OLD_VOLUME_ID, SNAPSHOT_ID, ScriptedDomains,
    ScriptedProbe, ScriptedProvider, instance_ip, wait_for_call,
};
use super::test_helpers::{orchestrator, running_request, stopped_request};

fn doubles() -> (ScriptedProvider, ScriptedDomains, ScriptedProbe) {
    (
        ScriptedProvider::new(),
        ScriptedDomains::default(),
        ScriptedProbe::default(),
    )
}

fn delete_volume_calls(provider: &ScriptedProvider) -> Vec<String> {
    provider
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::DeleteVolume(id) => Some(id),
            _ => None,
        })
        .collect()
}

fn attach_calls(provider: &ScriptedProvider) -> Vec<String> {
    provider
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Attach { volume_id, .. } => Some(volume_id),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn full_success_path_swaps_volumes_and_reports_artifact() {
    let (provider, domains, probe) = doubles();
    let driver = orchestrator(&provider, &domains, &probe);

    let artifact = driver
        .execute(&running_request(40))
        .await
        .unwrap_or_else(|err| panic!("resize should succeed: {err}"));

    assert_eq!(artifact.instance_id, MACHINE_ID);
    assert_eq!(artifact.ip, instance_ip());
    assert_eq!(artifact.domain_name, "box.example.com");

    // The old volume delete is fire-and-forget; wait for it to land.
    wait_for_call(&provider, &Call::DeleteVolume(OLD_VOLUME_ID.to_owned())).await;

    let deletes = delete_volume_calls(&provider);
    assert_eq!(deletes, vec![OLD_VOLUME_ID.to_owned()], "only the old volume is deleted");
    let snapshot_deletes: Vec<Call> = provider
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::DeleteSnapshot(_)))
        .collect();
    assert_eq!(
        snapshot_deletes,
        vec![Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())],
        "the snapshot is deleted exactly once"
    );
    assert_eq!(
        attach_calls(&provider),
        vec![NEW_VOLUME_ID.to_owned()],
        "no reattach of the old volume on success"
    );
    assert!(provider.calls().contains(&Call::Stop));
    assert!(provider.calls().contains(&Call::Tag {
        key: String::from("voluma-domain"),
        value: String::from("box.example.com"),
    }));
    assert_eq!(
        domains.updates(),
        vec![(
            instance_ip(),
            String::from("box.example.com"),
            String::from("alice")
        )]
    );
    assert_eq!(probe.pings(), 1);
}

#[tokio::test]
async fn shrinking_fails_validation_with_zero_mutations() {
    let (provider, domains, probe) = doubles();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(10))
        .await
        .expect_err("shrink must be rejected");

    assert!(
        matches!(err, ResizeError::SizeNotIncreasing { desired_gb: 10, current_gb: 20 }),
        "unexpected error: {err}"
    );
    assert!(err.is_validation());
    assert_eq!(provider.mutation_count(), 0, "no provider mutations on validation failure");
}

#[tokio::test]
async fn exceeding_the_ceiling_fails_validation_with_zero_mutations() {
    let (provider, domains, probe) = doubles();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(150))
        .await
        .expect_err("oversize must be rejected");

    assert!(
        matches!(err, ResizeError::SizeOverCeiling { desired_gb: 150, max_gb: 100 }),
        "unexpected error: {err}"
    );
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn missing_block_device_fails_validation() {
    let (provider, domains, probe) = doubles();
    provider.no_block_devices();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("no block device must be rejected");

    assert!(matches!(err, ResizeError::NoBlockDevice { .. }));
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn already_stopped_machine_skips_the_stop_call() {
    let (provider, domains, probe) = doubles();
    let driver = orchestrator(&provider, &domains, &probe);

    driver
        .execute(&stopped_request(40))
        .await
        .unwrap_or_else(|err| panic!("resize should succeed: {err}"));

    assert!(
        !provider.calls().contains(&Call::Stop),
        "stop must not be issued for an already-stopped machine"
    );
}

#[tokio::test]
async fn volume_creation_failure_deletes_snapshot_and_keeps_old_attached() {
    let (provider, domains, probe) = doubles();
    provider.fail_on("create_volume");
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("volume creation failure must surface");

    assert!(
        matches!(err, ResizeError::Provider { step: "create volume", .. }),
        "unexpected error: {err}"
    );
    assert!(provider
        .calls()
        .contains(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())));
    assert!(delete_volume_calls(&provider).is_empty(), "no volume to delete");
    assert!(!provider.calls().contains(&Call::Detach(OLD_VOLUME_ID.to_owned())));
    assert!(attach_calls(&provider).is_empty(), "no reattach needed");
    assert!(provider.old_volume_attached());
}

#[tokio::test]
async fn attach_failure_restores_old_volume_in_reverse_order() {
    let (provider, domains, probe) = doubles();
    provider.fail_on("attach");
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("attach failure must surface");

    assert!(
        matches!(err, ResizeError::Provider { step: "attach new volume", .. }),
        "unexpected error: {err}"
    );

    let calls = provider.calls();
    let position = |call: &Call| {
        calls
            .iter()
            .position(|seen| seen == call)
            .unwrap_or_else(|| panic!("missing call {call:?} in {calls:?}"))
    };

    // Compensation runs newest-first: restore the slot, drop the
    // replacement, then drop the snapshot.
    let restore = position(&Call::Attach {
        volume_id: OLD_VOLUME_ID.to_owned(),
        instance_id: MACHINE_ID.to_owned(),
        device_path: DEVICE_PATH.to_owned(),
    });
    let drop_new = position(&Call::DeleteVolume(NEW_VOLUME_ID.to_owned()));
    let drop_snapshot = position(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned()));
    assert!(restore < drop_new, "old volume restored before replacement delete");
    assert!(drop_new < drop_snapshot, "snapshot deleted last");

    assert!(
        !delete_volume_calls(&provider).contains(&OLD_VOLUME_ID.to_owned()),
        "old volume must never be deleted on failure"
    );
    assert!(provider.old_volume_attached());
}

#[tokio::test]
async fn attach_poll_timeout_takes_the_same_compensation_path() {
    let (provider, domains, probe) = doubles();
    provider.attach_never_completes();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("attach poll must time out");

    assert!(
        matches!(err, ResizeError::PollTimeout { ref action, .. } if action == "volume attachment"),
        "unexpected error: {err}"
    );
    assert!(provider.calls().contains(&Call::Attach {
        volume_id: OLD_VOLUME_ID.to_owned(),
        instance_id: MACHINE_ID.to_owned(),
        device_path: DEVICE_PATH.to_owned(),
    }));
    assert!(delete_volume_calls(&provider).contains(&NEW_VOLUME_ID.to_owned()));
    assert!(provider
        .calls()
        .contains(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())));
    assert!(provider.old_volume_attached());
}

#[tokio::test]
async fn snapshot_poll_timeout_unwinds_before_volume_creation() {
    let (provider, domains, probe) = doubles();
    provider.snapshot_never_completes();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("snapshot poll must time out");

    assert!(
        matches!(err, ResizeError::PollTimeout { ref action, .. } if action == "snapshot completion"),
        "unexpected error: {err}"
    );
    assert!(!provider.calls().contains(&Call::CreateVolume));
    assert!(provider
        .calls()
        .contains(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())));
    assert!(provider.old_volume_attached());
}

#[tokio::test]
async fn start_failure_triggers_full_rollback() {
    let (provider, domains, probe) = doubles();
    provider.fail_on("start");
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("start failure must surface");

    assert!(
        matches!(err, ResizeError::Provider { step: "start instance", .. }),
        "unexpected error: {err}"
    );
    assert!(attach_calls(&provider).contains(&OLD_VOLUME_ID.to_owned()));
    assert!(delete_volume_calls(&provider).contains(&NEW_VOLUME_ID.to_owned()));
    assert!(provider
        .calls()
        .contains(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())));
    assert!(domains.updates().is_empty(), "no domain update on rollback");
}

#[tokio::test]
async fn domain_failure_after_commit_keeps_the_new_volume() {
    let (provider, domains, probe) = doubles();
    domains.fail();
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("domain failure must surface");

    assert!(matches!(err, ResizeError::Domain { .. }), "unexpected error: {err}");
    assert!(err.is_post_commit());

    // Storage already committed: success-path cleanup still runs.
    wait_for_call(&provider, &Call::DeleteVolume(OLD_VOLUME_ID.to_owned())).await;
    assert!(provider
        .calls()
        .contains(&Call::DeleteSnapshot(SNAPSHOT_ID.to_owned())));
    assert!(
        !attach_calls(&provider).contains(&OLD_VOLUME_ID.to_owned()),
        "no reattach after commit"
    );
}

#[tokio::test]
async fn tag_failure_surfaces_after_commit_without_rollback() {
    let (provider, domains, probe) = doubles();
    provider.fail_on("tag");
    let driver = orchestrator(&provider, &domains, &probe);

    let err = driver
        .execute(&running_request(40))
        .await
        .expect_err("tag failure must surface");

    assert!(matches!(err, ResizeError::Tag { .. }), "unexpected error: {err}");
    wait_for_call(&provider, &Call::DeleteVolume(OLD_VOLUME_ID.to_owned())).await;
    assert!(
        !attach_calls(&provider).contains(&OLD_VOLUME_ID.to_owned()),
        "no reattach after commit"
    );
}

#[tokio::test]
async fn probe_connect_failure_is_swallowed() {
    let (provider, domains, probe) = doubles();
    probe.fail_connect();
    let driver = orchestrator(&provider, &domains, &probe);

    let artifact = driver
        .execute(&running_request(40))
        .await
        .unwrap_or_else(|err| panic!("probe failure must not fail the resize: {err}"));

    assert_eq!(artifact.instance_id, MACHINE_ID);
    assert_eq!(probe.pings(), 0);
}

#[tokio::test]
async fn probe_ping_failure_is_swallowed() {
    let (provider, domains, probe) = doubles();
    probe.fail_ping();
    let driver = orchestrator(&provider, &domains, &probe);

    let artifact = driver
        .execute(&running_request(40))
        .await
        .unwrap_or_else(|err| panic!("ping failure must not fail the resize: {err}"));

    assert_eq!(artifact.domain_name, "box.example.com");
}

#[tokio::test]
async fn success_records_running_state_in_the_registry() {
    let (provider, domains, probe) = doubles();
    let driver = orchestrator(&provider, &domains, &probe);

    driver
        .execute(&running_request(40))
        .await
        .unwrap_or_else(|err| panic!("resize should succeed: {err}"));

    assert_eq!(
        driver.registry().recorded_state(MACHINE_ID),
        Some(voluma::MachineState::Running)
    );
}
