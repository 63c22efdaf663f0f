//! Integration tests for the broadcasting client
//!
//! A fake simulator on a loopback UDP socket plays the other side of the
//! handshake and feeds frames to the client.

mod common;

use common::*;
use rc_client::{AppState, ClientConfig, ClientError, ConnectionState};
use rc_core::Event;
use rc_protocol::codec::REGISTER_COMMAND_APPLICATION;
use rc_protocol::Command;
use rc_core::listener_fn;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(2);

struct FakeSimulator {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl FakeSimulator {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            peer: None,
        }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    async fn recv(&mut self) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let (len, peer) = timeout(WAIT, self.socket.recv_from(&mut buf))
            .await
            .expect("no datagram from client")
            .unwrap();
        self.peer = Some(peer);
        buf.truncate(len);
        buf
    }

    /// Skip anything left from an earlier connection
    async fn recv_register(&mut self) -> Vec<u8> {
        loop {
            let frame = self.recv().await;
            if frame[0] == REGISTER_COMMAND_APPLICATION {
                return frame;
            }
        }
    }

    async fn send(&self, frame: &[u8]) {
        let peer = self.peer.expect("client has not sent anything yet");
        self.socket.send_to(frame, peer).await.unwrap();
    }

    /// Answer the next registration with `connection_id`
    async fn accept(&mut self, connection_id: i32) -> Vec<u8> {
        let register = self.recv_register().await;
        self.send(&registration_result(connection_id, true, "")).await;
        register
    }
}

fn config(port: u16, handshake_timeout_ms: u64) -> ClientConfig {
    ClientConfig {
        port,
        handshake_timeout_ms,
        ..ClientConfig::default()
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn connected(sim: &mut FakeSimulator, connection_id: i32) -> (AppState, Recorder) {
    let state = AppState::new(config(sim.port(), 2000));
    let recorder = Recorder::attach(&state.bus);
    let (result, _) = tokio::join!(state.client.connect(), sim.accept(connection_id));
    result.unwrap();

    // Entry list and track data are requested right away
    assert_eq!(
        sim.recv().await,
        Command::RequestEntryList.encode(connection_id).unwrap()
    );
    assert_eq!(
        sim.recv().await,
        Command::RequestTrackData.encode(connection_id).unwrap()
    );
    (state, recorder)
}

// ==================== Handshake ====================

#[tokio::test]
async fn test_handshake_success() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 2000));
    let recorder = Recorder::attach(&state.bus);

    let (result, register) = tokio::join!(state.client.connect(), sim.accept(77));
    result.unwrap();

    let expected = Command::Register {
        display_name: "Race Control".to_string(),
        connection_password: "asd".to_string(),
        update_interval_ms: 250,
        command_password: String::new(),
    }
    .encode(0)
    .unwrap();
    assert_eq!(register, expected);
    assert_eq!(state.client.state(), ConnectionState::Connected);
    assert_eq!(state.client.connection_id(), Some(77));
    assert_eq!(
        recorder.events(),
        vec![Event::ConnectionOpened {
            connection_id: 77,
            read_only: false,
            update_interval_ms: 250,
        }]
    );

    state.client.shutdown().await;
}

#[tokio::test]
async fn test_handshake_rejected() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 2000));
    let recorder = Recorder::attach(&state.bus);

    let reject = async {
        sim.recv_register().await;
        sim.send(&registration_result(-1, false, "Wrong password"))
            .await;
    };
    let (result, _) = tokio::join!(state.client.connect(), reject);

    match result {
        Err(ClientError::HandshakeRejected { message }) => assert_eq!(message, "Wrong password"),
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        recorder.events().as_slice(),
        [Event::ConnectionFailed { reason }] if reason.contains("Wrong password")
    ));
}

#[tokio::test]
async fn test_handshake_timeout() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 200));
    let recorder = Recorder::attach(&state.bus);

    let (result, _) = tokio::join!(state.client.connect(), sim.recv_register());

    assert!(matches!(result, Err(ClientError::HandshakeTimeout(_))));
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.names(), vec!["ConnectionFailed"]);
}

#[tokio::test]
async fn test_frames_before_registration_are_ignored() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 2000));

    let handshake = async {
        sim.recv_register().await;
        sim.send(&[0xFF]).await;
        sim.send(&realtime_update(RACE, 0, 1000.0)).await;
        sim.send(&registration_result(5, true, "")).await;
    };
    let (result, _) = tokio::join!(state.client.connect(), handshake);

    result.unwrap();
    assert_eq!(state.client.connection_id(), Some(5));
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_during_handshake_cancels_connect() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 5000));
    let recorder = Recorder::attach(&state.bus);

    // The simulator never answers the registration
    let abort = async {
        sim.recv_register().await;
        assert_eq!(state.client.state(), ConnectionState::Connecting);
        state.client.disconnect();
    };
    let started = Instant::now();
    let (result, _) = timeout(WAIT, async { tokio::join!(state.client.connect(), abort) })
        .await
        .expect("connect was not cancelled");

    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.names(), vec!["ConnectionFailed"]);
    timeout(WAIT, state.client.wait_closed()).await.unwrap();

    // The client is usable again
    let (result, _) = tokio::join!(state.client.connect(), sim.accept(8));
    result.unwrap();
    assert_eq!(state.client.connection_id(), Some(8));
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_from_connection_opened_listener() {
    let mut sim = FakeSimulator::bind().await;
    let state = AppState::new(config(sim.port(), 2000));
    let recorder = Recorder::attach(&state.bus);

    let client = Arc::downgrade(&state.client);
    state.bus.register(listener_fn(move |event: &Event, _: &mut rc_core::Publisher| {
        if let (Event::ConnectionOpened { .. }, Some(client)) = (event, client.upgrade()) {
            client.disconnect();
        }
    }));

    let (result, _) = tokio::join!(state.client.connect(), sim.accept(31));
    result.unwrap();
    timeout(WAIT, state.client.wait_closed()).await.unwrap();

    assert_eq!(sim.recv().await, Command::Unregister.encode(31).unwrap());
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.names(), vec!["ConnectionOpened", "ConnectionClosed"]);
}

#[tokio::test]
async fn test_connect_twice_fails() {
    let mut sim = FakeSimulator::bind().await;
    let (state, _recorder) = connected(&mut sim, 3).await;

    assert!(matches!(
        state.client.connect().await,
        Err(ClientError::AlreadyConnected)
    ));
    state.client.shutdown().await;
}

// ==================== Receiving ====================

#[tokio::test]
async fn test_frames_update_model_and_publish() {
    let mut sim = FakeSimulator::bind().await;
    let (state, recorder) = connected(&mut sim, 9).await;

    sim.send(&realtime_update(RACE, 0, 12_000.0)).await;
    sim.send(&entry_list_car(4, 44)).await;
    sim.send(&track_data(9, "Monza", 5793)).await;

    let events = recorder.clone();
    wait_for(|| events.events().len() >= 8).await;

    let view = state.model.read();
    assert_eq!(view.session_info().session_time_ms(), 12_000);
    assert_eq!(view.car(4).unwrap().car_number, 44);
    drop(view);

    let names = recorder.names();
    assert_eq!(
        names,
        vec![
            "ConnectionOpened",
            "SessionChanged",
            "RealtimeUpdate",
            "AfterPacketReceived",
            "CarConnected",
            "AfterPacketReceived",
            "TrackData",
            "AfterPacketReceived",
        ]
    );
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_receiving() {
    let mut sim = FakeSimulator::bind().await;
    let (state, recorder) = connected(&mut sim, 9).await;

    let truncated = entry_list_car(4, 44);
    sim.send(&truncated[..5]).await;
    sim.send(&entry_list_car(4, 44)).await;

    let events = recorder.clone();
    wait_for(|| events.names().contains(&"CarConnected")).await;
    assert!(state.model.read().contains_car(4));
    assert_eq!(state.client.state(), ConnectionState::Connected);
    assert_eq!(
        recorder
            .events()
            .iter()
            .filter(|event| matches!(event, Event::CarConnected(_)))
            .count(),
        1
    );
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_unknown_car_requests_entry_list() {
    let mut sim = FakeSimulator::bind().await;
    let (state, _recorder) = connected(&mut sim, 9).await;

    sim.send(&realtime_car_update(8, 0.5)).await;
    assert_eq!(
        sim.recv().await,
        Command::RequestEntryList.encode(9).unwrap()
    );
    state.client.shutdown().await;
}

// ==================== Commands and shutdown ====================

#[tokio::test]
async fn test_commands_are_sent_with_connection_id() {
    let mut sim = FakeSimulator::bind().await;
    let (state, _recorder) = connected(&mut sim, 21).await;

    state.client.send_command(Command::focus_car(3));
    state
        .client
        .send_command(Command::ChangeHudPage("Blank".to_string()));

    assert_eq!(sim.recv().await, Command::focus_car(3).encode(21).unwrap());
    assert_eq!(
        sim.recv().await,
        Command::ChangeHudPage("Blank".to_string()).encode(21).unwrap()
    );
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_unregisters() {
    let mut sim = FakeSimulator::bind().await;
    let (state, recorder) = connected(&mut sim, 12).await;

    state.client.shutdown().await;

    assert_eq!(sim.recv().await, Command::Unregister.encode(12).unwrap());
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
    assert_eq!(state.client.connection_id(), None);
    assert_eq!(recorder.events().last(), Some(&Event::ConnectionClosed));

    // Nothing is queued once closed
    state.client.send_command(Command::RequestTrackData);
}

#[tokio::test]
async fn test_reconnect_resets_model() {
    let mut sim = FakeSimulator::bind().await;
    let (state, _recorder) = connected(&mut sim, 1).await;

    sim.send(&entry_list_car(4, 44)).await;
    let model = state.model.clone();
    wait_for(|| model.read().contains_car(4)).await;

    state.client.shutdown().await;
    assert!(model.read().contains_car(4));

    let (result, _) = tokio::join!(state.client.connect(), sim.accept(2));
    result.unwrap();
    assert_eq!(model.read().car_count(), 0);
    assert_eq!(state.client.connection_id(), Some(2));
    state.client.shutdown().await;
}

#[tokio::test]
async fn test_wait_closed_without_connection_returns() {
    let state = AppState::new(ClientConfig::default());
    timeout(WAIT, state.client.wait_closed()).await.unwrap();
    state.client.shutdown().await;
    assert_eq!(state.client.state(), ConnectionState::Disconnected);
}
