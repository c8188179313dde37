use {
    crate::common::{guest_ctx, TestResult},
    wasi_http_bridge_lib::Policy,
};

/// `request` is linked so guests instantiate, but always answers with the zero handle.
#[tokio::test(flavor = "multi_thread")]
async fn one_shot_request_is_unsupported() -> TestResult {
    let wat = r#"
        (module
          (import "default-outgoing-HTTP" "request"
            (func $request
              (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (func (export "_start")
            (if (i32.ne
                  (call $request
                    (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
                    (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
                    (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0))
                  (i32.const 0))
              (then unreachable))))
    "#;
    guest_ctx(wat, Policy::permit_all())
        .run_main("request", &[])
        .await?;
    Ok(())
}

/// Pointers past the end of memory fail the hostcall, not the guest.
#[tokio::test(flavor = "multi_thread")]
async fn out_of_bounds_arguments_do_not_trap() -> TestResult {
    let wat = r#"
        (module
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "[constructor]fields"
            (func $new_fields (param i32 i32) (result i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "new-outgoing-request"
            (func $new_request
              (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "outgoing-request-write"
            (func $request_write (param i32 i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "log-it"
            (func $log (param i32 i32)))
          (memory (export "memory") 1)
          (func (export "_start")
            (local $fields i32)
            ;; A field list running off the end of memory.
            (if (call $new_fields (i32.const 65530) (i32.const 4)) (then unreachable))
            (local.set $fields (call $new_fields (i32.const 0) (i32.const 0)))
            (if (i32.eqz (local.get $fields)) (then unreachable))
            ;; An authority string running off the end of memory.
            (if (call $new_request
                  (i32.const 0) (i32.const 0) (i32.const 0)
                  (i32.const 0) (i32.const 0) (i32.const 0)
                  (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
                  (i32.const 1) (i32.const 65000) (i32.const 1000)
                  (local.get $fields))
              (then unreachable))
            ;; An unknown request handle reports the error arm.
            (call $request_write (i32.const 77) (i32.const 0))
            (if (i32.ne (i32.load (i32.const 0)) (i32.const 1)) (then unreachable))
            ;; Logging from a bad pointer is dropped.
            (call $log (i32.const 65535) (i32.const 2))))
    "#;
    guest_ctx(wat, Policy::permit_all())
        .run_main("bounds", &[])
        .await?;
    Ok(())
}

/// Dropping stale or reserved handles is a no-op.
#[tokio::test(flavor = "multi_thread")]
async fn stale_drops_are_ignored() -> TestResult {
    let wat = r#"
        (module
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "[constructor]fields"
            (func $new_fields (param i32 i32) (result i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "drop-fields"
            (func $drop_fields (param i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "drop-outgoing-request"
            (func $drop_request (param i32)))
          (import "wasi:io/streams@0.2.0-rc-2023-10-18" "drop-input-stream"
            (func $drop_input_stream (param i32)))
          (memory (export "memory") 1)
          (func (export "_start")
            (local $fields i32)
            (local.set $fields (call $new_fields (i32.const 0) (i32.const 0)))
            (call $drop_fields (local.get $fields))
            (call $drop_fields (local.get $fields))
            (call $drop_fields (i32.const 0))
            (call $drop_request (i32.const -1))
            (call $drop_input_stream (i32.const 12345))
            ;; Handles are never reused.
            (if (i32.eq (call $new_fields (i32.const 0) (i32.const 0)) (local.get $fields))
              (then unreachable))))
    "#;
    guest_ctx(wat, Policy::permit_all())
        .run_main("drops", &[])
        .await?;
    Ok(())
}

/// Result areas are written whole or not at all, and dead requests report no method.
#[tokio::test(flavor = "multi_thread")]
async fn failed_results_leave_guest_memory_alone() -> TestResult {
    let wat = r#"
        (module
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "[method]incoming-request.method"
            (func $method (param i32 i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "[constructor]fields"
            (func $new_fields (param i32 i32) (result i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "new-outgoing-request"
            (func $new_request
              (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "outgoing-request-write"
            (func $request_write (param i32 i32)))
          (import "wasi:http/types@0.2.0-rc-2023-10-18" "[method]outgoing-body.write"
            (func $body_write (param i32 i32)))
          (import "wasi:io/streams@0.2.0-rc-2023-10-18" "check-write"
            (func $check_write (param i32 i32)))
          (import "wasi:io/streams@0.2.0-rc-2023-10-18" "write"
            (func $write (param i32 i32 i32 i32)))
          (memory (export "memory") 1)
          (func (export "_start")
            (local $stream i32)
            ;; An unknown request has no method, not GET.
            (call $method (i32.const 77) (i32.const 0))
            (if (i32.ne (i32.load (i32.const 0)) (i32.const -1)) (then unreachable))
            ;; Open an output stream on a fresh request body.
            (call $request_write
              (call $new_request
                (i32.const 0) (i32.const 0) (i32.const 0)
                (i32.const 0) (i32.const 0) (i32.const 0)
                (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
                (i32.const 0) (i32.const 0) (i32.const 0)
                (call $new_fields (i32.const 0) (i32.const 0)))
              (i32.const 0))
            (if (i32.load (i32.const 0)) (then unreachable))
            (call $body_write (i32.load (i32.const 4)) (i32.const 0))
            (if (i32.load (i32.const 0)) (then unreachable))
            (local.set $stream (i32.load (i32.const 4)))
            ;; The tag fits, but the count would run off the end of memory.
            (i32.store (i32.const 65528) (i32.const 0x55555555))
            (call $check_write (local.get $stream) (i32.const 65528))
            (if (i32.ne (i32.load (i32.const 65528)) (i32.const 0x55555555)) (then unreachable))
            (call $write (local.get $stream) (i32.const 0) (i32.const 0) (i32.const 65528))
            (if (i32.ne (i32.load (i32.const 65528)) (i32.const 0x55555555)) (then unreachable))
            ;; A result area that fits gets both words.
            (call $check_write (local.get $stream) (i32.const 64))
            (if (i32.load (i32.const 64)) (then unreachable))
            (if (i64.eqz (i64.load (i32.const 72))) (then unreachable))))
    "#;
    guest_ctx(wat, Policy::permit_all())
        .run_main("results", &[])
        .await?;
    Ok(())
}
