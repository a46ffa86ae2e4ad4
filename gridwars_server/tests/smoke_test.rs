// Integration smoke test for the game server.
//
// Plays the part of the switch: binds a listener on localhost, lets the game
// server connect to it, and drives the line protocol by hand. Covers
// registration, the login and validation handshake, the heartbeat, the
// reconnect after a dropped connection, a bridge call answered through the
// mailbox, and a prompt shutdown while the switch is unreachable.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use gridwars_protocol::SessionId;
use gridwars_server::upstream::ConnectionState;
use gridwars_server::{ServerConfig, start_server};

/// Config pointing at the fake switch, with fast timers.
fn config_for(listener: &TcpListener) -> ServerConfig {
    ServerConfig {
        switch_addr: listener.local_addr().unwrap().to_string(),
        service_name: "SMOKE".into(),
        service_key: "42".into(),
        challenge_interval_ms: 60_000,
        purge_interval_ms: 100,
        heartbeat_interval_ms: 60_000,
        reconnect_backoff_ms: 100,
        ..ServerConfig::default()
    }
}

/// Accept the game server's connection and split it.
fn accept(listener: &TcpListener) -> (BufReader<TcpStream>, BufWriter<TcpStream>) {
    let (stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (reader, BufWriter::new(stream))
}

fn read_raw(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    let n = reader.read_line(&mut line).unwrap();
    assert!(n > 0, "game server closed the connection");
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Next line that is not a heartbeat.
fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    loop {
        let line = read_raw(reader);
        if line != "SERVER_PING<<null" {
            return line;
        }
    }
}

fn send(writer: &mut BufWriter<TcpStream>, line: &str) {
    writer.write_all(line.as_bytes()).unwrap();
    writer.write_all(b"\n").unwrap();
    writer.flush().unwrap();
}

#[test]
fn login_handshake_and_bridge_mailbox() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let handle = start_server(config_for(&listener)).unwrap();
    let (mut reader, mut writer) = accept(&listener);

    assert_eq!(read_line(&mut reader), "REGISTER<<SMOKE:42");

    send(&mut writer, "LOGIN_INFORM<<1:mode=1");
    assert_eq!(
        read_line(&mut reader),
        "SERVER_MESSAGE<<1:0:GameServer Confirmed Connection"
    );
    assert_eq!(read_line(&mut reader), "GAME_INITIALIZE<<1:5000:1");

    send(&mut writer, "GAME_INITIALIZE<<1:1");
    assert_eq!(read_line(&mut reader), "ACTION_REQUEST<<1:5000:-1");

    send(&mut writer, "ACTION_REPLY<<1:null:4");
    let request = read_line(&mut reader);
    assert!(
        request.starts_with("ACTION_REQUEST<<1:5000:"),
        "unexpected line {request}"
    );

    // The bot is busy with its validation match.
    let bridge = handle.bridge();
    bridge.enqueue_match_request(SessionId(1)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut mail = String::new();
    while mail.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        mail = bridge.poll_mailbox(SessionId(-1));
    }
    assert_eq!(mail, "SERVER_MESSAGE<<Bot 1 is Busy!&&");

    handle.stop();
}

#[test]
fn heartbeat_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ServerConfig {
        heartbeat_interval_ms: 100,
        ..config_for(&listener)
    };
    let handle = start_server(config).unwrap();

    let (mut reader, writer) = accept(&listener);
    assert_eq!(read_raw(&mut reader), "REGISTER<<SMOKE:42");
    assert_eq!(read_raw(&mut reader), "SERVER_PING<<null");

    // Drop the connection; the server should come back and register again.
    drop(reader);
    drop(writer);

    let (mut reader, _writer) = accept(&listener);
    assert_eq!(read_raw(&mut reader), "REGISTER<<SMOKE:42");

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.connection_state() != ConnectionState::Streaming && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handle.connection_state(), ConnectionState::Streaming);

    handle.stop();
}

#[test]
fn stop_is_prompt_when_switch_is_unreachable() {
    let config = ServerConfig {
        // Non-routable: connect attempts hang until they time out.
        switch_addr: "10.255.255.1:9".into(),
        reconnect_backoff_ms: 200,
        challenge_interval_ms: 60_000,
        purge_interval_ms: 100,
        ..ServerConfig::default()
    };
    let handle = start_server(config).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    handle.stop();
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "stop took {:?}",
        started.elapsed()
    );
}
