#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use wsbridge_net::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
limits:
  max_frame_byte: 1024 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.listen, "0.0.0.0:9001");
    assert_eq!(cfg.server.path, "/ws");
    assert!(!cfg.server.close_on_stop);
    assert!(cfg.tcp.nodelay);
    assert!(cfg.tcp.keepalive);

    let conn = cfg.connection();
    assert_eq!(conn.max_header_bytes, 8192);
    assert_eq!(conn.send_queue, 1024);
    assert_eq!(conn.handshake_timeout, Duration::from_secs(10));
    assert_eq!(conn.close_timeout, Duration::from_secs(5));
}

#[test]
fn full_config_round_trips_into_connection_settings() {
    let ok = r#"
version: 1
limits:
  max_header_bytes: 4096
  max_frame_bytes: 65536
  max_message_bytes: 1048576
  send_queue: 16
timeouts:
  connect_ms: 2000
  handshake_ms: 3000
  close_ms: 500
server:
  listen: "127.0.0.1:9001"
  path: "/chat"
  close_on_stop: true
tcp:
  nodelay: false
  keepalive: false
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert!(cfg.server.close_on_stop);
    assert_eq!(cfg.server.path, "/chat");
    assert!(!cfg.tcp.nodelay);
    assert!(!cfg.tcp.keepalive);

    let conn = cfg.connection();
    assert_eq!(conn.max_frame_bytes, 65536);
    assert_eq!(conn.max_message_bytes, 1048576);
    assert_eq!(conn.connect_timeout, Duration::from_millis(2000));
    assert_eq!(conn.handshake_timeout, Duration::from_millis(3000));
    assert_eq!(conn.close_timeout, Duration::from_millis(500));
    assert_eq!(conn.send_queue, 16);
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn rejects_frame_cap_above_message_cap() {
    let bad = r#"
version: 1
limits:
  max_frame_bytes: 2048
  max_message_bytes: 1024
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn rejects_empty_send_queue() {
    let bad = r#"
version: 1
limits:
  send_queue: 0
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("send_queue"));
}

#[test]
fn old_client_section_is_rejected() {
    let bad = r#"
version: 1
client:
  tcp_nodelay: true
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn rejects_out_of_range_timeout() {
    let bad = r#"
version: 1
timeouts:
  close_ms: 10
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn rejects_relative_path() {
    let bad = r#"
version: 1
server:
  path: "ws"
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn missing_file_is_config_error() {
    let err = config::load_from_file("/nonexistent/wsbridge.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}
