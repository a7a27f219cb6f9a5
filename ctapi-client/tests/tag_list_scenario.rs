//! End-to-end scenarios against the in-memory simulator.

use ctapi_client::{
    CtApiClient, CtError, OpenFlags, Session, SessionConfig, SimConnector, TagHandle,
    TagListProvider, read_tags,
};
use std::collections::HashSet;
use std::time::Duration;

const TAGS: [&str; 4] = [
    "TopMilk_AC01_PV",
    "TopMilk_AC02_PV",
    "TopMilk_LS21_PV",
    "TopMilk_LS07_PV",
];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn plant() -> SimConnector {
    SimConnector::new()
        .with_credentials("view", "view")
        .with_tag(TAGS[0], 12.5)
        .with_tag(TAGS[1], 13.75)
        .with_tag(TAGS[2], 48.0)
        .with_tag(TAGS[3], 0.5)
}

fn config() -> SessionConfig {
    SessionConfig::new("localhost")
        .with_credentials("view", "view")
        .with_flags(
            OpenFlags::READ_ONLY | OpenFlags::BATCH | OpenFlags::EXTENDED | OpenFlags::RECONNECT,
        )
}

#[test]
fn add_read_delete_scenario() {
    init_tracing();
    let sim = plant();
    let session = Session::open(&sim, &config().connect_params()).unwrap();
    let mut list = session.new_list().unwrap();

    let handles: Vec<TagHandle> = TAGS.iter().map(|tag| list.add(tag).unwrap()).collect();
    let unique: HashSet<TagHandle> = handles.iter().copied().collect();
    assert_eq!(unique.len(), TAGS.len());

    list.read().unwrap();
    let values: Vec<f64> = handles
        .iter()
        .map(|h| list.get_float_value(*h).unwrap())
        .collect();
    assert_eq!(values, vec![12.5, 13.75, 48.0, 0.5]);
    assert!(values.iter().all(|v| v.is_finite()));

    assert!(list.delete(handles[0]).unwrap());
    assert!(matches!(
        list.get_float_value(handles[0]),
        Err(CtError::UnknownHandle(h)) if h == handles[0]
    ));
    for (handle, expected) in handles[1..].iter().zip(&values[1..]) {
        assert_eq!(list.get_float_value(*handle).unwrap(), *expected);
    }

    // Deleting again is "nothing to remove", not an error.
    assert!(!list.delete(handles[0]).unwrap());

    drop(list);
    session.close().unwrap();
    assert_eq!(sim.opened_sessions(), 1);
    assert_eq!(sim.closed_sessions(), 1);
}

#[test]
fn refresh_failure_leaves_snapshot_untouched() {
    init_tracing();
    let sim = plant();
    let session = Session::open(&sim, &config().connect_params()).unwrap();
    let mut list = session.new_list().unwrap();
    let handles: Vec<TagHandle> = TAGS.iter().map(|tag| list.add(tag).unwrap()).collect();
    list.read().unwrap();
    let before: Vec<f64> = handles
        .iter()
        .map(|h| list.get_float_value(*h).unwrap())
        .collect();

    for tag in TAGS {
        sim.set_value(tag, -1.0);
    }
    sim.fail_next_refreshes(1);
    assert!(matches!(list.read(), Err(CtError::Refresh(_))));

    let after: Vec<f64> = handles
        .iter()
        .map(|h| list.get_float_value(*h).unwrap())
        .collect();
    assert_eq!(before, after);

    list.read().unwrap();
    assert_eq!(list.get_float_value(handles[2]).unwrap(), -1.0);
}

#[test]
fn fetch_failure_for_one_tag_updates_none() {
    let sim = plant();
    let session = Session::open(&sim, &config().connect_params()).unwrap();
    let mut list = session.new_list().unwrap();
    let a = list.add(TAGS[0]).unwrap();
    let d = list.add(TAGS[3]).unwrap();
    list.read().unwrap();

    sim.set_value(TAGS[0], 99.0);
    sim.fail_fetch(TAGS[3], true);
    let err = list.read().unwrap_err();
    assert!(err.to_string().contains(TAGS[3]), "{err}");
    assert_eq!(list.get_float_value(a).unwrap(), 12.5);
    assert_eq!(list.get_float_value(d).unwrap(), 0.5);
}

#[test]
fn unknown_tag_is_subscription_error_with_hint() {
    let sim = plant();
    let session = Session::open(&sim, &config().connect_params()).unwrap();
    let mut list = session.new_list().unwrap();
    let err = list.add("NoSuchTag").unwrap_err();
    match err {
        CtError::Subscription { tag, reason } => {
            assert_eq!(tag, "NoSuchTag");
            assert!(reason.contains("Tag not found"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(list.is_empty());
}

#[test]
fn bad_credentials_fail_to_connect() {
    let sim = plant();
    let params = SessionConfig::new("localhost")
        .with_credentials("view", "wrong")
        .connect_params();
    let err = Session::open(&sim, &params).unwrap_err();
    assert!(matches!(err, CtError::Connection(ref msg) if msg.contains("Logon failure")));
    assert_eq!(sim.opened_sessions(), 0);
}

#[tokio::test]
async fn async_client_scenario() {
    init_tracing();
    let sim = plant();
    let client = CtApiClient::connect(sim.clone(), config()).await.unwrap();

    let values = read_tags(&client, &TAGS).await.unwrap();
    assert_eq!(values.len(), 4);
    assert_eq!(values[1].tag, TAGS[1]);
    assert_eq!(values[1].value, 13.75);

    let a = values[0].handle;
    assert!(client.delete_tag(a).await.unwrap());
    assert!(matches!(
        client.get_float_value(a).await,
        Err(CtError::UnknownHandle(_))
    ));
    assert_eq!(client.tags().await.unwrap().len(), 3);
    assert!(client.delete_tag_by_name(TAGS[1]).await.unwrap());
    assert_eq!(client.values().await.unwrap().len(), 2);

    client.close().await.unwrap();
    assert!(client.is_closed());
    assert!(matches!(client.read().await, Err(CtError::SessionClosed)));
    assert_eq!(sim.closed_sessions(), 1);
}

#[tokio::test]
async fn async_client_is_shareable_between_tasks() {
    let sim = plant();
    let client = std::sync::Arc::new(CtApiClient::connect(sim, config()).await.unwrap());

    let mut tasks = Vec::new();
    for tag in TAGS {
        let client = std::sync::Arc::clone(&client);
        tasks.push(tokio::spawn(async move { client.add_tag(tag).await }));
    }
    let mut handles = HashSet::new();
    for task in tasks {
        handles.insert(task.await.unwrap().unwrap());
    }
    assert_eq!(handles.len(), 4);

    client.read().await.unwrap();
    for handle in handles {
        assert!(client.get_float_value(handle).await.is_ok());
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn async_client_connect_failure() {
    let sim = plant();
    sim.fail_open(Some(1722));
    let err = CtApiClient::connect(sim, config()).await.err().unwrap();
    assert!(matches!(err, CtError::Connection(ref msg) if msg.contains("RPC server unavailable")));
}

#[tokio::test]
async fn async_read_times_out() {
    let sim = plant();
    sim.set_refresh_delay(Duration::from_millis(400));
    let client = CtApiClient::connect(
        sim,
        config().with_request_timeout(Duration::from_millis(150)),
    )
    .await
    .unwrap();
    let first = client.add_tag(TAGS[0]).await.unwrap();

    let (read, add) = tokio::join!(client.read(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.add_tag(TAGS[1]).await
    });
    assert!(matches!(
        read,
        Err(CtError::Timeout {
            operation: "read",
            ..
        })
    ));
    assert!(matches!(
        add,
        Err(CtError::Timeout {
            operation: "add",
            ..
        })
    ));

    // Neither request may leave a trace once the worker catches up.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        client.tags().await.unwrap(),
        vec![(TAGS[0].to_string(), first)]
    );
    assert!(matches!(
        client.get_float_value(first).await,
        Err(CtError::NotRefreshed(_))
    ));
    client.close().await.unwrap();
}

#[test]
fn tag_removed_on_server_fails_refresh() {
    init_tracing();
    let sim = plant();
    let session = Session::open(&sim, &config().connect_params()).unwrap();
    let mut list = session.new_list().unwrap();
    let handle = list.add(TAGS[2]).unwrap();
    list.read().unwrap();
    let refreshed_at = list.last_refresh();

    sim.remove_tag(TAGS[2]);
    let err = list.read().unwrap_err();
    assert!(matches!(err, CtError::Refresh(ref msg) if msg.contains(TAGS[2])));
    assert_eq!(list.refresh_generation(), 1);
    assert_eq!(list.last_refresh(), refreshed_at);
    assert_eq!(list.get_float_value(handle).unwrap(), 48.0);
}
