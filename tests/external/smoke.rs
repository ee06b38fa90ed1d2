//! End-to-end scenario against a real Docker daemon and the default ledger
//! image. Ignored by default: run with `cargo test --test smoke -- --ignored`.

use ledgerbox::{
    core::{FixtureDefaults, FixtureError, FixtureOptions, FixtureState},
    fixture::connect_fixture,
};

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a docker daemon and pulls a large image"]
async fn default_ledger_comes_up_and_goes_away() {
    setup_tracing();

    let defaults = FixtureDefaults::default();
    let mut fixture = connect_fixture(FixtureOptions::default(), &defaults)
        .await
        .unwrap();

    fixture.start().await.unwrap();
    assert_eq!(fixture.state(), FixtureState::Running);

    let ops = fixture.ops_api_public_port().await.unwrap();
    assert!(ops > 0);

    let ip = fixture.container_ip_address().await.unwrap();
    assert!(ip.parse::<std::net::IpAddr>().is_ok(), "{ip}");

    let image = fixture.container_image_reference().await.unwrap();
    assert_eq!(image, fixture.image_reference());

    let health = fixture.health_url().await.unwrap();
    let status = reqwest::get(&health).await.unwrap().status();
    assert!(status.is_success());

    fixture.stop().await.unwrap();
    assert_eq!(fixture.state(), FixtureState::Stopped);

    fixture.destroy().await.unwrap();
    assert_eq!(fixture.state(), FixtureState::Destroyed);

    assert!(matches!(
        fixture.destroy().await,
        Err(FixtureError::NothingToDestroy { .. })
    ));
}

#[tokio::test]
async fn invalid_version_never_reaches_the_daemon() {
    let options = FixtureOptions {
        image_version: Some("1.4".into()),
        ..Default::default()
    };

    let err = connect_fixture(options, &FixtureDefaults::default())
        .await
        .err()
        .unwrap();

    assert!(err.to_string().contains("image_version"), "{err}");
}
