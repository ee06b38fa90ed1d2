use std::sync::Arc;

use ledgerbox_core::{
    ContainerId, Fixture, FixtureError, FixtureOptions, FixtureState, NetworkResolutionError,
    PortResolutionError, PullPolicy,
};
use ledgerbox_testing::{
    test_defaults, test_options, Call, HostBinding, ScriptedProbe, TestFault, ToyRuntime,
    TEST_OPS_API_PORT,
};

type ToyFixture = Fixture<ToyRuntime, ScriptedProbe>;

fn fixture_with(runtime: &ToyRuntime, probe: &ScriptedProbe, options: FixtureOptions) -> ToyFixture {
    Fixture::new(
        Arc::new(runtime.clone()),
        probe.clone(),
        options,
        &test_defaults(),
    )
    .unwrap()
}

fn fixture(runtime: &ToyRuntime) -> ToyFixture {
    fixture_with(runtime, &ScriptedProbe::healthy(), test_options())
}

#[test]
fn invalid_config_fails_before_any_runtime_call() {
    let runtime = ToyRuntime::new();

    let options = FixtureOptions {
        image_version: Some("nope".into()),
        ..test_options()
    };

    let result = Fixture::new(
        Arc::new(runtime.clone()),
        ScriptedProbe::healthy(),
        options,
        &test_defaults(),
    );

    assert!(matches!(
        result,
        Err(FixtureError::InvalidConfig {
            field: "image_version",
            ..
        })
    ));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn full_lifecycle_scenario() {
    let runtime = ToyRuntime::new();
    let probe = ScriptedProbe::warming_up(3);
    let mut fixture = fixture_with(&runtime, &probe, test_options());

    assert_eq!(fixture.state(), FixtureState::Uninitialized);

    let id = fixture.start().await.unwrap().id().clone();
    assert_eq!(fixture.state(), FixtureState::Running);
    assert_eq!(runtime.running_containers(), vec![id.clone()]);

    let ip = fixture.container_ip_address().await.unwrap();
    let octets: Vec<u8> = ip.split('.').map(|x| x.parse().unwrap()).collect();
    assert_eq!(octets.len(), 4);

    let port = fixture.public_port(TEST_OPS_API_PORT as u16).await.unwrap();
    assert_ne!(port, TEST_OPS_API_PORT as u16);
    assert!(port >= 1);

    let health = fixture.health_url().await.unwrap();
    assert_eq!(health, format!("http://127.0.0.1:{port}/version"));
    assert_eq!(probe.attempts(), 4);
    assert!(probe.probed_urls().iter().all(|x| x == &health));

    fixture.stop().await.unwrap();
    assert_eq!(fixture.state(), FixtureState::Stopped);
    assert!(runtime.running_containers().is_empty());

    fixture.destroy().await.unwrap();
    assert_eq!(fixture.state(), FixtureState::Destroyed);
    assert!(runtime.container_ids().is_empty());

    let err = fixture.public_port(TEST_OPS_API_PORT as u16).await.unwrap_err();
    assert!(matches!(err, FixtureError::NotRunning { .. }));
}

#[tokio::test]
async fn image_pulled_when_absent() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    fixture.start().await.unwrap();

    let image = fixture.image_reference();
    assert_eq!(image, "fixture-node:1.4.8");
    assert_eq!(runtime.count_calls(|c| *c == Call::Pull(image.clone())), 1);
    assert_eq!(fixture.container_image_reference().await.unwrap(), image);
}

#[tokio::test]
async fn present_image_is_not_pulled_again() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    runtime.preload_image(&fixture.config().image);

    fixture.start().await.unwrap();

    assert_eq!(runtime.count_calls(|c| matches!(c, Call::Pull(_))), 0);
}

#[tokio::test]
async fn always_policy_pulls_even_when_present() {
    let runtime = ToyRuntime::new();
    let options = FixtureOptions {
        pull_policy: Some(PullPolicy::Always),
        ..test_options()
    };
    let mut fixture = fixture_with(&runtime, &ScriptedProbe::healthy(), options);
    runtime.preload_image(&fixture.config().image);

    fixture.start().await.unwrap();

    assert_eq!(runtime.count_calls(|c| matches!(c, Call::ImageExists(_))), 0);
    assert_eq!(runtime.count_calls(|c| matches!(c, Call::Pull(_))), 1);
}

#[tokio::test]
async fn launch_publishes_all_declared_ports() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    let id = fixture.start().await.unwrap().id().clone();
    let spec = runtime.launch_spec(&id).unwrap();

    assert!(spec.publish_all_ports);
    assert_eq!(spec.exposed_ports, vec![8545, 8546, 9443]);
    assert_eq!(
        spec.labels.get("ledgerbox.fixture").map(String::as_str),
        Some("fixture-node:1.4.8")
    );
}

#[tokio::test]
async fn stop_and_destroy_without_start() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    let err = fixture.stop().await.unwrap_err();
    assert!(matches!(err, FixtureError::NotRunning { .. }));

    let err = fixture.destroy().await.unwrap_err();
    assert!(matches!(err, FixtureError::NothingToDestroy { .. }));

    assert!(runtime.calls().is_empty());
    assert_eq!(fixture.state(), FixtureState::Uninitialized);
}

#[tokio::test]
async fn restart_replaces_the_container() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    let first = fixture.start().await.unwrap().id().clone();
    let second = fixture.start().await.unwrap().id().clone();

    assert_ne!(first, second);
    assert_eq!(fixture.state(), FixtureState::Running);
    assert_eq!(runtime.container_ids(), vec![second.clone()]);
    assert_eq!(runtime.running_containers(), vec![second]);

    let calls = runtime.calls();
    let stop = calls.iter().position(|c| *c == Call::Stop(first.clone()));
    let remove = calls
        .iter()
        .position(|c| *c == Call::Remove(first.clone(), false));

    assert!(stop.is_some());
    assert!(remove.is_some());
    assert!(stop < remove);

    // restart does not go through the pull stage again
    assert_eq!(runtime.count_calls(|c| matches!(c, Call::ImageExists(_))), 1);
}

async fn restart_with_failing_teardown(fault: TestFault) {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    let first = fixture.start().await.unwrap().id().clone();

    runtime.set_fault(fault);
    let err = fixture.start().await.unwrap_err();

    assert!(matches!(err, FixtureError::Runtime { .. }), "{err:?}");
    assert_eq!(fixture.state(), FixtureState::Failed);
    assert_eq!(runtime.container_ids(), vec![first.clone()]);
    assert_eq!(runtime.count_calls(|c| matches!(c, Call::Create(_))), 1);

    runtime.set_fault(TestFault::None);
    fixture.destroy().await.unwrap();

    assert!(runtime.container_ids().is_empty());
    assert_eq!(fixture.state(), FixtureState::Failed);
    assert!(runtime.calls().contains(&Call::Remove(first, true)));
}

#[tokio::test]
async fn restart_keeps_old_container_when_stop_fails() {
    restart_with_failing_teardown(TestFault::StopError).await;
}

#[tokio::test]
async fn restart_keeps_old_container_when_remove_fails() {
    restart_with_failing_teardown(TestFault::RemoveError).await;
}

#[tokio::test]
async fn start_after_stop_removes_the_stopped_container() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);

    let first = fixture.start().await.unwrap().id().clone();
    fixture.stop().await.unwrap();

    let second = fixture.start().await.unwrap().id().clone();

    assert_ne!(first, second);
    assert_eq!(runtime.container_ids(), vec![second]);
}

#[tokio::test]
async fn pull_failure_stops_before_launch() {
    let runtime = ToyRuntime::with_fault(TestFault::PullError);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    assert!(matches!(err, FixtureError::PullFailed { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);
    assert_eq!(runtime.count_calls(|c| matches!(c, Call::Create(_))), 0);
}

#[tokio::test]
async fn create_failure_leaves_nothing_to_destroy() {
    let runtime = ToyRuntime::with_fault(TestFault::CreateError);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();
    assert!(matches!(err, FixtureError::LaunchFailed { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);

    let err = fixture.destroy().await.unwrap_err();
    assert!(matches!(err, FixtureError::NothingToDestroy { .. }));
}

#[tokio::test]
async fn exit_before_running_is_a_launch_failure() {
    let runtime = ToyRuntime::with_fault(TestFault::ExitBeforeRunning);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    match err {
        FixtureError::LaunchFailed { source, .. } => assert!(source.is_some()),
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(fixture.state(), FixtureState::Failed);
    assert_eq!(runtime.container_ids().len(), 1);

    // the half-launched container is left for the caller to clean up
    runtime.set_fault(TestFault::None);
    fixture.destroy().await.unwrap();

    assert!(runtime.container_ids().is_empty());
    assert_eq!(fixture.state(), FixtureState::Failed);
}

#[tokio::test]
async fn dropped_start_signal_is_a_launch_failure() {
    let runtime = ToyRuntime::with_fault(TestFault::DropStartSignal);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::LaunchFailed { source: None, .. }
    ));
}

#[tokio::test]
async fn rejected_start_is_a_launch_failure() {
    let runtime = ToyRuntime::with_fault(TestFault::StartRejected);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    assert!(matches!(err, FixtureError::LaunchFailed { .. }));
    assert_eq!(runtime.count_calls(|c| matches!(c, Call::Start(_))), 1);
}

#[tokio::test]
async fn loopback_binding_fails_the_start() {
    let runtime = ToyRuntime::new();
    runtime.set_binding(HostBinding::Loopback);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::Port {
            source: PortResolutionError::PortBoundToLoopbackOnly { port: 9443, .. },
            ..
        }
    ));
    assert_eq!(fixture.state(), FixtureState::Failed);
}

#[tokio::test]
async fn unpublished_port_fails_the_start() {
    let runtime = ToyRuntime::new();
    runtime.set_binding(HostBinding::Unpublished);
    let mut fixture = fixture(&runtime);

    let err = fixture.start().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::Port {
            source: PortResolutionError::PortNotPublished { port: 9443, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn undeclared_port_is_not_mapped() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    fixture.start().await.unwrap();

    let err = fixture.public_port(7050).await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::Port {
            source: PortResolutionError::PortNotMapped { port: 7050, .. },
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn unhealthy_fixture_times_out_and_can_be_destroyed() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture_with(&runtime, &ScriptedProbe::never_healthy(), test_options());

    let err = fixture.start().await.unwrap_err();

    match err {
        FixtureError::HealthCheckTimeout { last_error, .. } => {
            assert_eq!(last_error, "unexpected status 503")
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(fixture.state(), FixtureState::Failed);
    assert_eq!(runtime.running_containers().len(), 1);

    let err = fixture.stop().await.unwrap_err();
    assert!(matches!(err, FixtureError::NotRunning { .. }));

    fixture.destroy().await.unwrap();
    assert!(runtime.container_ids().is_empty());

    let err = fixture.start().await.unwrap_err();
    assert!(matches!(err, FixtureError::InvalidState { .. }));
}

#[tokio::test]
async fn no_network_means_no_ip() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    fixture.start().await.unwrap();

    runtime.set_fault(TestFault::NoNetworks);

    let err = fixture.container_ip_address().await.unwrap_err();

    assert!(matches!(
        err,
        FixtureError::Network {
            source: NetworkResolutionError::NotConnectedToAnyNetwork(_),
            ..
        }
    ));
}

#[tokio::test]
async fn introspection_errors_are_not_cached() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    fixture.start().await.unwrap();

    runtime.set_fault(TestFault::ListError);
    assert!(fixture.ops_api_public_port().await.is_err());

    runtime.set_fault(TestFault::None);
    assert!(fixture.ops_api_public_port().await.is_ok());

    let lists = runtime.count_calls(|c| matches!(c, Call::List(_)));
    assert!(lists >= 3);
}

#[tokio::test]
async fn service_urls_resolve_named_ports() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    fixture.start().await.unwrap();

    let rpc = fixture.service_url("rpc").await.unwrap();
    let port = fixture.public_port(8545).await.unwrap();
    assert_eq!(rpc, format!("http://127.0.0.1:{port}"));

    let err = fixture.service_url("grpc").await.unwrap_err();
    assert!(matches!(err, FixtureError::UnknownService { .. }));
}

#[tokio::test]
async fn stop_failure_marks_fixture_failed() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    fixture.start().await.unwrap();

    runtime.set_fault(TestFault::StopError);

    let err = fixture.stop().await.unwrap_err();
    assert!(matches!(err, FixtureError::Runtime { .. }));
    assert_eq!(fixture.state(), FixtureState::Failed);
    assert!(fixture.handle().is_err());
}

#[tokio::test]
async fn destroy_running_fixture_forces_removal() {
    let runtime = ToyRuntime::new();
    let mut fixture = fixture(&runtime);
    let id = fixture.start().await.unwrap().id().clone();

    fixture.destroy().await.unwrap();

    assert_eq!(runtime.count_calls(|c| *c == Call::Remove(id.clone(), true)), 1);
    assert_eq!(fixture.state(), FixtureState::Destroyed);

    let err = fixture.destroy().await.unwrap_err();
    assert!(matches!(err, FixtureError::NothingToDestroy { .. }));
}

#[tokio::test]
async fn concurrent_fixtures_get_distinct_ports() {
    let runtime = ToyRuntime::new();
    let mut a = fixture(&runtime);
    let mut b = fixture(&runtime);

    let (ra, rb) = tokio::join!(a.start(), b.start());
    let ida: ContainerId = ra.unwrap().id().clone();
    let idb: ContainerId = rb.unwrap().id().clone();
    assert_ne!(ida, idb);

    let pa = a.ops_api_public_port().await.unwrap();
    let pb = b.ops_api_public_port().await.unwrap();
    assert_ne!(pa, pb);

    a.destroy().await.unwrap();
    assert_eq!(runtime.container_ids(), vec![idb]);

    b.destroy().await.unwrap();
}
