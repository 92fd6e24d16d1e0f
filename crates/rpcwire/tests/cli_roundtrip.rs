#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

use bytes::BytesMut;
use rpcwire::frame::{encode_message, StandardLayout};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rpcwire-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn rpcwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpcwire"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("rpcwire should run")
}

fn capture(messages: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for (routing, payload) in messages {
        encode_message(&StandardLayout, routing, payload, &mut buf).expect("encode");
    }
    buf.to_vec()
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn encode_then_decode_in_small_chunks() {
    let dir = unique_temp_dir("roundtrip");
    let path = dir.join("capture.bin");
    let path_str = path.to_str().expect("utf8 path");

    let encoded = rpcwire(&[
        "encode",
        "--routing",
        "svc.echo",
        "--data",
        "hello, rpcwire",
        "--repeat",
        "3",
        "--output",
        path_str,
    ]);
    assert!(encoded.status.success(), "{encoded:?}");

    let decoded = rpcwire(&["--format", "json", "decode", path_str, "--chunk-size", "5"]);
    assert!(decoded.status.success(), "{decoded:?}");

    let lines = json_lines(&decoded);
    assert_eq!(lines.len(), 3);
    for (index, line) in lines.iter().enumerate() {
        assert_eq!(line["index"], index);
        assert_eq!(line["routing"], "svc.echo");
        assert_eq!(line["payload"], "hello, rpcwire");
        assert_eq!(line["payload_size"], 14);
        assert_eq!(line["assembled"], true);
        assert_eq!(line["remote"], "capture");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn whole_capture_in_one_receive_is_not_assembled() {
    let dir = unique_temp_dir("single");
    let path = dir.join("capture.bin");
    std::fs::write(&path, capture(&[(b"", b"one"), (b"r", b"two")])).expect("write capture");

    let decoded = rpcwire(&[
        "--format",
        "json",
        "decode",
        path.to_str().expect("utf8 path"),
        "--peer",
        "node-9",
    ]);
    assert!(decoded.status.success(), "{decoded:?}");

    let lines = json_lines(&decoded);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["payload"], "two");
    assert!(lines.iter().all(|line| line["assembled"] == false));
    assert!(lines.iter().all(|line| line["remote"] == "node-9"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupted_capture_exits_60() {
    let dir = unique_temp_dir("corrupt");
    let path = dir.join("capture.bin");
    let mut bytes = capture(&[(b"", b"payload")]);
    bytes[4] ^= 0xFF;
    std::fs::write(&path, bytes).expect("write capture");

    let decoded = rpcwire(&["decode", path.to_str().expect("utf8 path")]);
    assert_eq!(decoded.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&decoded.stderr).contains("size check mismatch"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn truncated_capture_exits_60() {
    let dir = unique_temp_dir("truncated");
    let path = dir.join("capture.bin");
    let bytes = capture(&[(b"", b"payload")]);
    std::fs::write(&path, &bytes[..bytes.len() - 2]).expect("write capture");

    let decoded = rpcwire(&["decode", path.to_str().expect("utf8 path")]);
    assert_eq!(decoded.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&decoded.stderr).contains("mid-message"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oversized_message_exits_60() {
    let dir = unique_temp_dir("oversized");
    let path = dir.join("capture.bin");
    std::fs::write(&path, capture(&[(b"", &[0u8; 100])])).expect("write capture");

    let decoded = rpcwire(&[
        "decode",
        path.to_str().expect("utf8 path"),
        "--max-message-size",
        "64",
    ]);
    assert_eq!(decoded.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn encode_hex_payload_to_stdout() {
    let encoded = rpcwire(&["encode", "--hex", "deadbeef"]);
    assert!(encoded.status.success());
    assert_eq!(encoded.stdout, capture(&[(b"", &[0xDE, 0xAD, 0xBE, 0xEF])]));
}

#[test]
fn encode_without_payload_is_usage_error() {
    let encoded = rpcwire(&["encode"]);
    assert_eq!(encoded.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = rpcwire(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("rpcwire {}", env!("CARGO_PKG_VERSION"))
    );
}
