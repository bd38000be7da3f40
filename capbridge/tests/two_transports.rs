//! Both transports against one runtime: wasm guests through the host bridge,
//! remote callers through the HTTP tool-call server.

use std::net::SocketAddr;

use capbridge::Runtime;
use capbridge::config::BridgeConfig;
use capbridge::rpc::{ClientError, ToolCallClient};
use serde_json::json;

fn runtime() -> Runtime {
    let mut config = BridgeConfig::default();
    config.server.listen = SocketAddr::from(([127, 0, 0, 1], 0));
    config.sandbox.fuel = Some(1_000_000);
    Runtime::new(&config).expect("runtime")
}

const WRITER: &str = r#"
    (module
      (import "env" "state_set" (func $set (param i32 i32 i32 i32) (result i32)))
      (import "env" "log" (func $log (param i32 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "x")
      (data (i32.const 8) "42")
      (data (i32.const 16) "guest wrote x")
      (func (export "run") (result i32)
        (if (i32.eqz (call $set (i32.const 0) (i32.const 1) (i32.const 8) (i32.const 2)))
          (then (return (i32.const 1))))
        (if (i32.eqz (call $log (i32.const 16) (i32.const 13)))
          (then (return (i32.const 2))))
        (i32.const 0)))
"#;

// Reads "greeting" into a 16-byte buffer at 64 and checks the payload is the
// JSON string "hello".
const READER: &str = r#"
    (module
      (import "env" "state_get" (func $get (param i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "greeting")
      (data (i32.const 64) "\10\00\00\00\00\00\00\00")
      (data (i32.const 128) "\22hello\22")
      (func (export "run") (result i32)
        (local $i i32)
        (if (i32.eqz (call $get (i32.const 0) (i32.const 8) (i32.const 64)))
          (then (return (i32.const 1))))
        (if (i32.ne (i32.load (i32.const 68)) (i32.const 7))
          (then (return (i32.const 2))))
        (block $done
          (loop $compare
            (br_if $done (i32.eq (local.get $i) (i32.const 7)))
            (if (i32.ne
                  (i32.load8_u (i32.add (i32.const 72) (local.get $i)))
                  (i32.load8_u (i32.add (i32.const 128) (local.get $i))))
              (then (return (i32.const 3))))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br $compare)))
        (i32.const 0)))
"#;

#[tokio::test]
async fn guest_writes_are_visible_to_tool_callers() {
    let runtime = runtime();
    let server = runtime.serve().expect("server");
    let client = ToolCallClient::new(&server.endpoint()).expect("client");

    let outcome = runtime
        .sandbox()
        .expect("sandbox")
        .run(WRITER.as_bytes(), "run")
        .expect("guest run");
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.fuel_consumed.is_some());

    let value = client
        .call_tool("state_get", json!({ "key": "x" }))
        .await
        .expect("state_get");
    assert_eq!(value, json!("42"));
    assert_eq!(runtime.log().recent(1)[0].message, "guest wrote x");

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn tool_caller_writes_are_visible_to_guests() {
    let runtime = runtime();
    let server = runtime.serve().expect("server");
    let client = ToolCallClient::new(&server.endpoint()).expect("client");

    let value = client
        .call_tool("state_set", json!({ "key": "greeting", "value": "hello" }))
        .await
        .expect("state_set");
    assert_eq!(value, serde_json::Value::Null);

    let outcome = runtime
        .sandbox()
        .expect("sandbox")
        .run(READER.as_bytes(), "run")
        .expect("guest run");
    assert_eq!(outcome.exit_code, 0);

    server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn both_transports_list_the_same_catalog() {
    let runtime = runtime();
    let server = runtime.serve().expect("server");
    let client = ToolCallClient::new(&server.endpoint()).expect("client");

    let remote = client.list_tools().await.expect("tools/list");
    assert_eq!(remote, runtime.registry().catalog());

    let names: Vec<_> = remote.entries().iter().map(|e| e.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);

    let err = client
        .call_tool("state_set", json!({ "key": "", "value": "v" }))
        .await
        .expect_err("empty key");
    assert!(matches!(err, ClientError::Rpc { code: -32602, .. }));

    server.shutdown().await.expect("shutdown");
}
