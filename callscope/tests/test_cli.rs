use std::process::Command;

fn callscope(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_callscope"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run callscope")
}

#[test]
fn test_trace_json_lists_resolved_frames() {
    let output = callscope(&["--format", "json", "trace", "--depth", "16"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let frames: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let frames = frames.as_array().expect("expected a JSON array");
    assert!(!frames.is_empty() && frames.len() <= 16);
    for frame in frames {
        assert!(frame["addr"].as_str().is_some_and(|addr| addr.starts_with("0x")));
        let entries = frame["entries"].as_array().unwrap();
        assert!(!entries.is_empty() && entries.len() <= 16);
    }
}

#[test]
fn test_fast_trace_prints_one_line_per_frame() {
    let output = callscope(&["trace", "--fast", "--depth", "8"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(!lines.is_empty() && lines.len() <= 8);
    assert!(lines[0].starts_with("#0 "));
}

#[test]
fn test_kernel_address_resolves_to_marker() {
    let output = callscope(&["--format", "json", "resolve", "0xffffffff81000000"]);
    assert!(output.status.success());

    let frames: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(frames[0]["entries"][0]["name"], "[kernel]");
    assert_eq!(frames[0]["entries"][0]["file"], "[kernel]");
    assert_eq!(frames[0]["entries"][0]["line"], 0);
}

#[test]
fn test_invalid_address_is_usage_error() {
    let output = callscope(&["resolve", "not-an-address"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_resolve_without_addresses_is_usage_error() {
    let output = callscope(&["resolve"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}
