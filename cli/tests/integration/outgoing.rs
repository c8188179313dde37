use {
    crate::common::{
        guest_ctx, Expect, OutgoingGuest, TestResult, TestServer, GET, POST, PUT,
    },
    wasi_http_bridge_lib::Policy,
};

/// Run a guest that sends one request to `server`, and return what the server saw.
async fn send(server: &TestServer, method_tag: u32, path: &str, body: &[u8]) -> TestResult {
    let authority = server.authority();
    let wat = OutgoingGuest {
        method_tag,
        authority: &authority,
        path,
        body,
        expect: Expect::Response,
    }
    .to_wat();
    guest_ctx(&wat, Policy::permit_all())
        .run_main("outgoing", &[])
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn get_with_query_and_empty_body() -> TestResult {
    let server = TestServer::start().await;
    send(&server, GET, "/get?some=arg&goes=here", b"").await?;

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path_and_query, "/get?some=arg&goes=here");
    assert_eq!(requests[0].headers["x-test"], "bridge");
    assert!(requests[0].body.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn post_carries_the_body() -> TestResult {
    let server = TestServer::start().await;
    send(&server, POST, "/post", br#"{"foo": "bar"}"#).await?;

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path_and_query, "/post");
    assert_eq!(requests[0].body, br#"{"foo": "bar"}"#);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn put_carries_the_body() -> TestResult {
    let server = TestServer::start().await;
    send(&server, PUT, "/put", br#"{"baz": "blah"}"#).await?;

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].body, br#"{"baz": "blah"}"#);
    assert_eq!(requests[0].headers["x-test"], "bridge");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_hosts_yield_the_zero_handle() -> TestResult {
    // Bind and drop a listener to find a port nobody is listening on.
    let authority = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.to_string()
    };
    let wat = OutgoingGuest {
        method_tag: GET,
        authority: &authority,
        path: "/",
        body: b"",
        expect: Expect::Refused,
    }
    .to_wat();
    guest_ctx(&wat, Policy::permit_all())
        .run_main("outgoing", &[])
        .await?;
    Ok(())
}
