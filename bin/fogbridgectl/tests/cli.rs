//! ---
//! fb_section: "05-external-interfaces"
//! fb_subsection: "tests"
//! fb_type: "source"
//! fb_scope: "test"
//! fb_description: "Command-line behaviour of fogbridgectl."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
use std::fs;

use assert_cmd::Command;
use serde_json::{json, Value};

fn ctl() -> Command {
    let mut cmd = Command::cargo_bin("fogbridgectl").expect("binary built");
    cmd.env_remove("FOGBRIDGE_CONFIG")
        .env_remove("FOGBRIDGE_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_lines(cmd: &mut Command) -> Vec<Value> {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output)
        .expect("utf8 stdout")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn keys_prints_binding_table() {
    let output = ctl()
        .args(["keys", "--device", "dev1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("device.dev1.data.update"));
    assert!(text.contains("thingd-list-reply-dev1"));
    assert!(text.contains("thingd-fogOut-dev1"));
}

#[test]
fn keys_without_device_fails() {
    ctl().arg("keys").assert().failure();
}

#[test]
fn encode_register_prints_envelope() {
    let lines = stdout_lines(ctl().args([
        "encode", "register", "--device", "dev1", "--name", "lamp",
    ]));
    assert_eq!(lines.len(), 1);
    let envelope = &lines[0];
    assert_eq!(envelope["exchange"], "device");
    assert_eq!(envelope["routing_key"], "device.register");
    assert_eq!(envelope["mode"], "direct");
    assert_eq!(envelope["expiration_ms"], 2000);
    assert_eq!(envelope["body"], json!({"id": "dev1", "name": "lamp"}));
}

#[test]
fn encode_list_sets_reply_key() {
    let lines = stdout_lines(ctl().args(["encode", "list", "--device", "dev1"]));
    assert_eq!(lines[0]["mode"], "direct_rpc");
    assert_eq!(lines[0]["reply_to"], "thingd-list-reply-dev1");
    assert_eq!(lines[0]["correlation_id"], "default-corrId");
    assert_eq!(lines[0]["body"], json!({}));
}

#[test]
fn encode_publish_raw_value() {
    let lines = stdout_lines(ctl().args([
        "encode",
        "publish",
        "--device",
        "dev1",
        "--sensor",
        "5",
        "--value-type",
        "raw",
        "--value",
        "01020304",
        "--len",
        "2",
    ]));
    assert_eq!(lines[0]["exchange"], "data.sent");
    assert_eq!(lines[0]["routing_key"], Value::Null);
    assert_eq!(
        lines[0]["body"],
        json!({"id": "dev1", "data": [{"sensorId": 5, "value": "AQI="}]})
    );
}

#[test]
fn encode_config_with_thresholds() {
    let lines = stdout_lines(ctl().args([
        "encode",
        "config",
        "--device",
        "dev1",
        "--sensor",
        "1",
        "--value-type",
        "int",
        "--name",
        "Temp",
        "--change",
        "--upper",
        "30",
    ]));
    let entry = &lines[0]["body"]["config"][0];
    assert_eq!(entry["schema"]["valueType"], 1);
    assert_eq!(entry["event"]["change"], true);
    assert_eq!(entry["event"]["upperThreshold"], 30);
    assert!(entry["event"].get("timeSec").is_none());
}

#[test]
fn encode_uses_config_file_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("bridge.toml");
    let logs = dir.path().join("logs");
    fs::write(
        &config,
        format!(
            "[broker]\nurl = \"amqp://localhost\"\nuser_token = \"tok\"\n\
             [device]\nid = \"cfg-dev\"\nname = \"from-config\"\n\
             [logging]\ndirectory = {:?}\npriority = \"error\"\n",
            logs.display().to_string()
        ),
    )
    .expect("write config");

    let lines = stdout_lines(ctl().args([
        "--config",
        config.to_str().expect("utf8 path"),
        "encode",
        "register",
    ]));
    assert_eq!(lines[0]["headers"]["Authorization"], "tok");
    assert_eq!(
        lines[0]["body"],
        json!({"id": "cfg-dev", "name": "from-config"})
    );
}

#[test]
fn replay_reports_events_and_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("deliveries.ndjson");
    let records = [
        json!({"routing_key": "device.dev1.data.update",
               "body": {"id": "dev1", "data": [{"sensorId": 3, "value": true}]}}),
        json!({"routing_key": "device.other.data.update", "body": {}}),
        json!({"routing_key": "device.registered", "body": "{not json"}),
        json!({"routing_key": "thingd-auth-reply-dev1",
               "body": {"id": "dev1", "error": "bad token"}}),
    ];
    let contents: Vec<String> = records.iter().map(Value::to_string).collect();
    fs::write(&file, contents.join("\n")).expect("write records");

    let lines = stdout_lines(ctl().args([
        "--log-level",
        "error",
        "replay",
        "--device",
        "dev1",
        "--file",
        file.to_str().expect("utf8 path"),
    ]));
    assert_eq!(lines.len(), 5);

    assert_eq!(lines[0]["consumed"], true);
    assert_eq!(lines[0]["event"]["body"]["kind"], "update");
    assert_eq!(lines[0]["event"]["body"]["data"][0]["sensor_id"], 3);

    assert_eq!(lines[1]["consumed"], true);
    assert_eq!(lines[1]["event"], Value::Null);

    assert_eq!(lines[2]["consumed"], true);
    assert_eq!(lines[2]["event"], Value::Null);

    assert_eq!(lines[3]["event"]["error"], "bad token");

    let summary = &lines[4]["summary"];
    assert_eq!(summary["received"], 4);
    assert_eq!(summary["handled"], 2);
    assert_eq!(summary["unknown"], 1);
    assert_eq!(summary["decode_failures"], 1);
}

#[test]
fn replay_reject_leaves_decoded_messages_unconsumed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("one.ndjson");
    fs::write(
        &file,
        json!({"routing_key": "device.unregistered", "body": {"id": "dev1"}}).to_string(),
    )
    .expect("write record");

    let lines = stdout_lines(ctl().args([
        "replay",
        "--device",
        "dev1",
        "--reject",
        "--file",
        file.to_str().expect("utf8 path"),
    ]));
    assert_eq!(lines[0]["consumed"], false);
}

#[test]
fn replay_rejects_malformed_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("bad.ndjson");
    fs::write(&file, "{\"body\": {}}\n").expect("write record");
    ctl()
        .args(["replay", "--device", "dev1", "--file"])
        .arg(&file)
        .assert()
        .failure();
}

#[test]
fn replay_debug_logs_stay_off_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("one.ndjson");
    fs::write(
        &file,
        json!({"routing_key": "device.registered", "body": {"id": "dev1", "token": "t"}})
            .to_string(),
    )
    .expect("write record");

    let output = ctl()
        .args(["--log-level", "debug", "replay", "--device", "dev1", "--file"])
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .clone();
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert_eq!(stdout.lines().count(), 2);
    for line in stdout.lines() {
        serde_json::from_str::<Value>(line).expect("json line");
    }
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("replaying line 1"));
    assert!(stderr.contains("dev1"));
}
