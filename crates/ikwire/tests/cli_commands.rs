#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ikwire::peer::Client;

struct ServeProcess {
    child: Child,
    addr: String,
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral port should bind");
    listener
        .local_addr()
        .expect("listener should have an address")
        .to_string()
}

fn start_server() -> ServeProcess {
    let addr = free_addr();
    let child = Command::new(env!("CARGO_BIN_EXE_ikwire"))
        .args(["--log-level", "error", "serve", &addr])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    let start = Instant::now();
    loop {
        if Client::new(addr.as_str()).send("echo", b"").is_ok() {
            break;
        }
        if start.elapsed() >= Duration::from_secs(5) {
            panic!("server did not come up on {addr}");
        }
        thread::sleep(Duration::from_millis(25));
    }

    ServeProcess { child, addr }
}

fn ikwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ikwire"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("ikwire should run")
}

fn temp_file(tag: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "ikwire-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

#[test]
fn send_prints_echo_reply_as_json() {
    let server = start_server();
    let output = ikwire(&[
        "--format", "json", "send", &server.addr, "--event", "echo", "--data", "hello",
    ]);

    assert!(output.status.success());
    let line = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).expect("stdout should be one JSON object");
    assert_eq!(value["event"], "echo");
    assert_eq!(value["payload"], "hello");
    assert_eq!(value["payload_size"], 5);
}

#[test]
fn send_raw_prints_payload_only() {
    let server = start_server();
    let output = ikwire(&[
        "--format", "raw", "send", &server.addr, "--event", "echo", "--json", "{\"a\":1}",
    ]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"{\"a\":1}");
}

#[test]
fn unregistered_event_exits_with_failure() {
    let server = start_server();
    let output = ikwire(&["send", &server.addr, "--event", "doesnotexist"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not registered"));
}

#[test]
fn subscribe_prints_ticks_in_order() {
    let server = start_server();
    let output = ikwire(&[
        "--format",
        "pretty",
        "subscribe",
        &server.addr,
        "--event",
        "ticker",
        "--data",
        "3",
        "--count",
        "3",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payloads: Vec<&str> = stdout
        .lines()
        .map(|line| line.rsplit("payload=").next().unwrap_or_default())
        .collect();
    assert_eq!(payloads, ["0", "1", "2"]);
    assert!(stdout.lines().all(|line| line.starts_with("event=tick ")));
}

#[test]
fn stream_uploads_file_in_chunks() {
    let server = start_server();
    let file = temp_file("stream", b"0123456789");
    let file_arg = file.to_string_lossy().into_owned();

    let output = ikwire(&[
        "--format",
        "json",
        "stream",
        &server.addr,
        "--event",
        "stdout-stream",
        "--file",
        &file_arg,
        "--chunk-size",
        "4",
    ]);
    let _ = std::fs::remove_file(&file);

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["chunks"], 3);
    assert_eq!(value["bytes"], 10);
}

#[test]
fn stream_raw_prints_each_chunk_reply() {
    let server = start_server();
    let file = temp_file("stream-raw", &[b'x'; 6]);
    let file_arg = file.to_string_lossy().into_owned();

    let output = ikwire(&[
        "--format",
        "raw",
        "stream",
        &server.addr,
        "--event",
        "stdout-stream",
        "--file",
        &file_arg,
        "--chunk-size",
        "4",
    ]);
    let _ = std::fs::remove_file(&file);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "WROTE 4 BYTESWROTE 2 BYTES"
    );
}

#[test]
fn refused_connection_exits_with_transport_code() {
    let addr = free_addr();
    let output = ikwire(&["send", &addr, "--event", "echo"]);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("send failed"));
}

#[test]
fn zero_chunk_size_is_usage_error() {
    let output = ikwire(&["stream", "127.0.0.1:1", "--event", "echo", "--chunk-size", "0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = ikwire(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("ikwire {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn extended_version_includes_protocol() {
    let output = ikwire(&["version", "--extended"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("protocol_version: 2"));
}
