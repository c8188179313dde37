//! Common values and types used by test fixtures

use {
    hyper::{
        header::HeaderMap,
        service::{make_service_fn, service_fn},
        Body, Request, Response, Server,
    },
    std::{
        convert::Infallible,
        fmt::Write,
        net::SocketAddr,
        sync::{Arc, Mutex},
    },
    wasi_http_bridge_lib::{ExecuteCtx, Policy},
};

/// A catch-all error, so we can easily use `?` in test cases.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Handy alias for the return type of async Tokio tests
pub type TestResult = Result<(), Error>;

/// The body every [`TestServer`] response carries.
pub const RESPONSE_BODY: &[u8] = b"Response";

/// Method tags understood by `new-outgoing-request`.
pub const GET: u32 = 0;
pub const POST: u32 = 2;
pub const PUT: u32 = 3;
pub const DELETE: u32 = 4;

/// A request as the test server saw it.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A local HTTP server that records every request and answers `200 OK` with [`RESPONSE_BODY`].
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let make_service = make_service_fn(move |_| {
            let recorded = recorded.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let recorded = recorded.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = hyper::body::to_bytes(body).await?;
                        recorded.lock().unwrap().push(Recorded {
                            method: parts.method.to_string(),
                            path_and_query: parts
                                .uri
                                .path_and_query()
                                .map(|p| p.to_string())
                                .unwrap_or_default(),
                            headers: parts.headers,
                            body: body.to_vec(),
                        });
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .header("x-served-by", "test-server")
                                .body(Body::from(RESPONSE_BODY))
                                .unwrap(),
                        )
                    }
                }))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);
        Self { addr, requests }
    }

    /// The `host:port` the server listens on.
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Build an execution context for a guest in text format.
pub fn guest_ctx(wat: &str, policy: Policy) -> ExecuteCtx {
    ExecuteCtx::from_module_bytes(wat)
        .expect("guest compiles and links")
        .with_policy(policy)
}

/// Escape arbitrary bytes as a WAT string literal body.
fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        write!(s, "\\{:02x}", b).unwrap();
        s
    })
}

/// What an outgoing guest asserts about the result of `handle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    /// A `200` response whose body is [`RESPONSE_BODY`].
    Response,
    /// The reserved handle `0`.
    Refused,
}

/// A guest that sends one request with an `x-test: bridge` header, and traps if the result of
/// `handle` is not what `expect` says.
pub struct OutgoingGuest<'a> {
    pub method_tag: u32,
    pub authority: &'a str,
    pub path: &'a str,
    pub body: &'a [u8],
    pub expect: Expect,
}

const AUTHORITY_AT: u32 = 1024;
const PATH_AT: u32 = 1280;
const BODY_AT: u32 = 1536;
const HEADER_AT: u32 = 1792;
const FIELDS_AT: u32 = 2048;
const RESULT_AT: u32 = 512;
const HEAP_AT: u32 = 4096;

impl OutgoingGuest<'_> {
    pub fn to_wat(&self) -> String {
        let mut field_elem = Vec::new();
        for word in [HEADER_AT, 6, HEADER_AT + 8, 6] {
            field_elem.extend_from_slice(&u32::to_le_bytes(word));
        }

        let send_body = if self.body.is_empty() {
            String::new()
        } else {
            format!(
                r#"
            (call $request_write (local.get $req) (i32.const {r}))
            (if (i32.load (i32.const {r})) (then unreachable))
            (local.set $body (i32.load (i32.const {r4})))
            (call $body_write (local.get $body) (i32.const {r}))
            (if (i32.load (i32.const {r})) (then unreachable))
            (local.set $stream (i32.load (i32.const {r4})))
            (call $stream_write (local.get $stream) (i32.const {body_at}) (i32.const {body_len}) (i32.const {r}))
            (if (i32.load (i32.const {r})) (then unreachable))
            (if (i64.ne (i64.load (i32.const {r8})) (i64.const {body_len})) (then unreachable))
            (call $drop_output_stream (local.get $stream))
            (if (i32.ne (call $finish (local.get $body)) (i32.const 1)) (then unreachable))"#,
                r = RESULT_AT,
                r4 = RESULT_AT + 4,
                r8 = RESULT_AT + 8,
                body_at = BODY_AT,
                body_len = self.body.len(),
            )
        };

        let check = match self.expect {
            Expect::Refused => "(if (local.get $resp) (then unreachable))".to_owned(),
            Expect::Response => format!(
                r#"
            (if (i32.eqz (local.get $resp)) (then unreachable))
            (if (i32.ne (call $status (local.get $resp)) (i32.const 200)) (then unreachable))
            (call $fields_entries (call $response_headers (local.get $resp)) (i32.const {r}))
            (if (i32.eqz (i32.load (i32.const {r4}))) (then unreachable))
            (call $consume (local.get $resp) (i32.const {r}))
            (if (i32.load (i32.const {r})) (then unreachable))
            (local.set $in (i32.load (i32.const {r4})))
            (call $read (local.get $in) (i64.const 1024) (i32.const {r}))
            (if (i32.load (i32.const {r})) (then unreachable))
            (if (i32.ne (i32.load (i32.const {r8})) (i32.const {len})) (then unreachable))
            (if (i32.ne (i32.load (i32.const {r12})) (i32.const 1)) (then unreachable))
            (call $log (i32.load (i32.const {r4})) (i32.load (i32.const {r8})))
            (call $drop_input_stream (local.get $in))
            (call $drop_response (local.get $resp))"#,
                r = RESULT_AT,
                r4 = RESULT_AT + 4,
                r8 = RESULT_AT + 8,
                r12 = RESULT_AT + 12,
                len = RESPONSE_BODY.len(),
            ),
        };

        format!(
            r#"
(module
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "[constructor]fields"
    (func $new_fields (param i32 i32) (result i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "new-outgoing-request"
    (func $new_request (param i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "outgoing-request-write"
    (func $request_write (param i32 i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "[method]outgoing-body.write"
    (func $body_write (param i32 i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "[static]outgoing-body.finish"
    (func $finish (param i32) (result i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "incoming-response-status"
    (func $status (param i32) (result i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "incoming-response-headers"
    (func $response_headers (param i32) (result i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "fields-entries"
    (func $fields_entries (param i32 i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "incoming-response-consume"
    (func $consume (param i32 i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "drop-incoming-response"
    (func $drop_response (param i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "drop-fields"
    (func $drop_fields (param i32)))
  (import "wasi:http/types@0.2.0-rc-2023-10-18" "log-it"
    (func $log (param i32 i32)))
  (import "wasi:io/streams@0.2.0-rc-2023-10-18" "write"
    (func $stream_write (param i32 i32 i32 i32)))
  (import "wasi:io/streams@0.2.0-rc-2023-10-18" "read"
    (func $read (param i32 i64 i32)))
  (import "wasi:io/streams@0.2.0-rc-2023-10-18" "drop-output-stream"
    (func $drop_output_stream (param i32)))
  (import "wasi:io/streams@0.2.0-rc-2023-10-18" "drop-input-stream"
    (func $drop_input_stream (param i32)))
  (import "default-outgoing-HTTP" "handle"
    (func $handle (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))

  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const {heap_at}))

  (data (i32.const {authority_at}) "{authority}")
  (data (i32.const {path_at}) "{path}")
  (data (i32.const {body_at}) "{body}")
  (data (i32.const {header_at}) "x-test\00\00bridge")
  (data (i32.const {fields_at}) "{field_elem}")

  (func (export "cabi_realloc") (param i32 i32) (param $align i32) (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr
      (i32.and
        (i32.add (global.get $heap) (i32.sub (local.get $align) (i32.const 1)))
        (i32.sub (i32.const 0) (local.get $align))))
    (global.set $heap (i32.add (local.get $ptr) (local.get $size)))
    (local.get $ptr))

  (func (export "_start")
    (local $fields i32) (local $req i32) (local $body i32) (local $stream i32)
    (local $resp i32) (local $in i32)
    (local.set $fields (call $new_fields (i32.const {fields_at}) (i32.const 1)))
    (if (i32.eqz (local.get $fields)) (then unreachable))
    (local.set $req
      (call $new_request
        (i32.const {method_tag}) (i32.const 0) (i32.const 0)
        (i32.const 1) (i32.const {path_at}) (i32.const {path_len})
        (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0)
        (i32.const 1) (i32.const {authority_at}) (i32.const {authority_len})
        (local.get $fields)))
    (if (i32.eqz (local.get $req)) (then unreachable))
    (call $drop_fields (local.get $fields)){send_body}
    (local.set $resp
      (call $handle (local.get $req)
        (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
        (i32.const 0) (i32.const 0) (i32.const 0)))
    {check}))
"#,
            heap_at = HEAP_AT,
            authority_at = AUTHORITY_AT,
            authority = wat_bytes(self.authority.as_bytes()),
            authority_len = self.authority.len(),
            path_at = PATH_AT,
            path = wat_bytes(self.path.as_bytes()),
            path_len = self.path.len(),
            body_at = BODY_AT,
            body = wat_bytes(self.body),
            header_at = HEADER_AT,
            fields_at = FIELDS_AT,
            field_elem = wat_bytes(&field_elem),
            method_tag = self.method_tag,
        )
    }
}
