//! End-to-end connection tests over the in-memory pipe.
//!
//! Every test runs on paused tokio time, so timers fire in simulated time and
//! the scenarios are deterministic.

#![cfg(feature = "sandbox")]

mod common;

use std::time::Duration;

use dccp_protocol::cc::{CongestionControl, FixedRate, FixedRateReceiver};
use dccp_protocol::conn::{Conn, ConnConfigBuilder, ConnState, Waiter};
use dccp_protocol::core::ConnError;
use dccp_protocol::header::ResetCode;

use common::*;

#[tokio::test(start_paused = true)]
async fn handshake_both_sides_open() {
    init_tracing();
    let (client, server) = fixed_pair(config("client"), config("server"));

    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);
    assert!(wait_for_state(&server, ConnState::Open, Duration::from_secs(5)).await);
    assert_eq!(client.reset_code(), None);
    assert_eq!(server.reset_code(), None);
}

#[tokio::test(start_paused = true)]
async fn data_arrives_intact() {
    init_tracing();
    let (client, server) = fixed_pair(config("client"), config("server"));
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);

    let segments: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 100 + i as usize]).collect();
    for segment in &segments {
        client.write_segment(segment).await.unwrap();
    }
    for segment in &segments {
        let got = tokio::time::timeout(Duration::from_secs(5), server.read_segment())
            .await
            .expect("segment not delivered")
            .unwrap();
        assert_eq!(&got, segment);
    }

    // And the other way round.
    server.write_segment(b"pong").await.unwrap();
    let got = client.read_segment().await.unwrap();
    assert_eq!(got, b"pong");
}

#[tokio::test(start_paused = true)]
async fn write_before_open_is_refused() {
    let (client, _server) = fixed_pair(config("client"), config("server"));
    assert!(matches!(
        client.write_segment(b"early").await,
        Err(ConnError::NotOpen(ConnState::Request))
    ));
}

#[tokio::test(start_paused = true)]
async fn oversized_segment_is_refused() {
    let (client, _server) = fixed_pair(config("client"), config("server"));
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);

    let max = client.max_segment_size();
    assert_eq!(max, 1448);
    match client.write_segment(&vec![0; max + 1]).await {
        Err(ConnError::TooBig { len, max: limit }) => {
            assert_eq!(len, max + 1);
            assert_eq!(limit, max);
        }
        other => panic!("expected TooBig, got {other:?}"),
    }
    client.write_segment(&vec![0; max]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn server_close_ends_both() {
    init_tracing();
    let time_wait = Duration::from_secs(2);
    let (client, server) = fixed_pair(
        ConnConfigBuilder::new()
            .name("client")
            .service_code(7)
            .time_wait(time_wait)
            .build(),
        config("server"),
    );
    assert!(wait_for_state(&server, ConnState::Open, Duration::from_secs(5)).await);
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);

    server.close().unwrap();
    assert_eq!(server.state(), ConnState::CloseReq);
    // Closing twice is a no-op.
    server.close().unwrap();

    assert!(matches!(client.read_segment().await, Err(ConnError::Eof)));
    assert!(wait_for_state(&server, ConnState::Closed, Duration::from_secs(5)).await);
    assert!(wait_for_state(&client, ConnState::TimeWait, Duration::from_secs(5)).await);
    assert_eq!(client.reset_code(), Some(ResetCode::Closed));

    tokio::time::timeout(
        Duration::from_secs(10),
        Waiter::all([client.waiter(), server.waiter()]),
    )
    .await
    .expect("loops still running after TIMEWAIT");
    assert_eq!(client.state(), ConnState::Closed);
    assert!(matches!(server.close(), Err(ConnError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn client_close_goes_through_timewait() {
    let (client, server) = fixed_pair(
        config("client"),
        ConnConfigBuilder::new()
            .name("server")
            .time_wait(Duration::from_secs(1))
            .build(),
    );
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);
    assert!(wait_for_state(&server, ConnState::Open, Duration::from_secs(5)).await);

    client.close().unwrap();
    assert_eq!(client.state(), ConnState::Closing);

    // The server answers Close with Reset and holds TIMEWAIT; the client
    // takes the Reset into its own TIMEWAIT.
    assert!(wait_for_state(&server, ConnState::TimeWait, Duration::from_secs(5)).await);
    assert!(wait_for_state(&client, ConnState::TimeWait, Duration::from_secs(5)).await);
    assert!(wait_for_state(&server, ConnState::Closed, Duration::from_secs(5)).await);
    assert!(matches!(server.read_segment().await, Err(ConnError::Eof)));
}

#[tokio::test(start_paused = true)]
async fn idle_connection_stays_open() {
    let (client, server) = fixed_pair(config("client"), config("server"));
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);
    assert!(wait_for_state(&server, ConnState::Open, Duration::from_secs(5)).await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(client.state(), ConnState::Open);
    assert_eq!(server.state(), ConnState::Open);
}

#[tokio::test(start_paused = true)]
async fn abort_is_idempotent() {
    let (client, server) = fixed_pair(config("client"), config("server"));
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);

    client.abort();
    client.abort();
    server.abort();
    server.abort();

    assert_eq!(client.state(), ConnState::Closed);
    assert_eq!(server.state(), ConnState::Closed);
    assert_eq!(client.reset_code(), Some(ResetCode::Aborted));

    tokio::time::timeout(
        Duration::from_secs(1),
        Waiter::all([client.waiter(), server.waiter()]),
    )
    .await
    .expect("loops still running after abort");
    assert!(matches!(
        client.write_segment(b"late").await,
        Err(ConnError::Closed)
    ));
    assert!(matches!(client.read_segment().await, Err(ConnError::Eof)));
}

#[tokio::test(start_paused = true)]
async fn congestion_reset_aborts() {
    init_tracing();
    let (client, client_script, server, server_script) = scripted_pair();
    assert!(wait_for_state(&client, ConnState::Open, Duration::from_secs(5)).await);
    assert!(wait_for_state(&server, ConnState::Open, Duration::from_secs(5)).await);

    client_script.trigger_reset(ResetCode::AggressionPenalty);
    assert!(wait_for_state(&client, ConnState::Closed, Duration::from_secs(1)).await);
    assert_eq!(client.reset_code(), Some(ResetCode::AggressionPenalty));
    tokio::time::timeout(Duration::from_secs(1), client.wait())
        .await
        .expect("client loops still running");
    assert_eq!(client_script.closes(), 1);

    // The peer hears the Reset and records its code.
    assert!(wait_for_state(&server, ConnState::TimeWait, Duration::from_secs(1)).await);
    assert_eq!(server.reset_code(), Some(ResetCode::AggressionPenalty));
    assert_eq!(server_script.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_period_is_clamped() {
    let (_client_end, server_end) = dccp_protocol::transport::pipe();
    let (scc, script) = ScriptedSender::new(Duration::from_secs(10));
    let server = Conn::new_server(server_end, scc, FixedRateReceiver, config("server"));

    // A 10 s RTT still ticks every 200 ms; the read timeout (50 s) never fires.
    tokio::time::sleep(Duration::from_millis(1990)).await;
    let polls = script.idle_polls();
    assert!((10..=11).contains(&polls), "{polls} idle polls in 2 s");
    assert_eq!(server.rtt(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn dropping_conn_stops_loops() {
    let (client, _server) = fixed_pair(config("client"), config("server"));
    let waiter = client.waiter();
    drop(client);
    tokio::time::timeout(Duration::from_secs(1), waiter.wait())
        .await
        .expect("loops still running after drop");
}

#[tokio::test(start_paused = true)]
async fn client_gives_up_without_server() {
    let (client_end, _server_end) = dccp_protocol::transport::pipe();
    let cc = FixedRate::default();
    let client = Conn::new_client(
        client_end,
        cc.new_sender(),
        cc.new_receiver(),
        ConnConfigBuilder::new().name("client").max_retransmits(3).build(),
    );

    // Request retransmits at 1, 3 and 7 s; the budget runs out at 15 s.
    assert!(!wait_for_state(&client, ConnState::Closed, Duration::from_secs(14)).await);
    assert!(wait_for_state(&client, ConnState::Closed, Duration::from_secs(2)).await);
    assert_eq!(client.reset_code(), None);
}
