use {
    crate::common::{guest_ctx, Expect, OutgoingGuest, TestResult, TestServer, DELETE, GET, POST},
    wasi_http_bridge_lib::{BridgeConfig, Policy},
};

async fn run(server: &TestServer, method_tag: u32, policy: Policy, expect: Expect) -> TestResult {
    let authority = server.authority();
    let wat = OutgoingGuest {
        method_tag,
        authority: &authority,
        path: "/",
        body: b"",
        expect,
    }
    .to_wat();
    guest_ctx(&wat, policy).run_main("policy", &[]).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn hosts_outside_the_allow_list_are_refused() -> TestResult {
    let server = TestServer::start().await;
    let policy = Policy::permit_all().with_allowed_hosts(vec!["github.com:443".to_owned()]);
    run(&server, GET, policy, Expect::Refused).await?;
    assert!(server.requests().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn listed_hosts_are_allowed() -> TestResult {
    let server = TestServer::start().await;
    let policy = Policy::permit_all().with_allowed_hosts(vec![server.authority()]);
    run(&server, GET, policy, Expect::Response).await?;
    assert_eq!(server.requests().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn methods_outside_the_allow_list_are_refused() -> TestResult {
    let server = TestServer::start().await;
    let policy =
        Policy::permit_all().with_allowed_methods(vec!["GET".to_owned(), "DELETE".to_owned()]);
    run(&server, POST, policy.clone(), Expect::Refused).await?;
    assert!(server.requests().is_empty());

    run(&server, DELETE, policy, Expect::Response).await?;
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "DELETE");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn configuration_files_set_the_policy() -> TestResult {
    let server = TestServer::start().await;
    let config = format!(
        "[http]\nallowed_hosts = [\"{}\"]\nallowed_methods = [\"GET\"]\ntimeout_ms = 5000\n",
        server.authority()
    )
    .parse::<BridgeConfig>()?;
    let authority = server.authority();
    let wat = OutgoingGuest {
        method_tag: GET,
        authority: &authority,
        path: "/configured",
        body: b"",
        expect: Expect::Response,
    }
    .to_wat();
    guest_ctx(&wat, Policy::permit_all())
        .with_config(&config)
        .run_main("policy", &[])
        .await?;
    assert_eq!(server.requests()[0].path_and_query, "/configured");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn paths_cannot_reach_unlisted_hosts() -> TestResult {
    let allowed = TestServer::start().await;
    let unlisted = TestServer::start().await;
    let policy = Policy::permit_all().with_allowed_hosts(vec![allowed.authority()]);
    let authority = allowed.authority();
    let path = format!("@{}/secret", unlisted.authority());
    let wat = OutgoingGuest {
        method_tag: GET,
        authority: &authority,
        path: &path,
        body: b"",
        expect: Expect::Refused,
    }
    .to_wat();
    guest_ctx(&wat, policy).run_main("policy", &[]).await?;
    assert!(allowed.requests().is_empty());
    assert!(unlisted.requests().is_empty());
    Ok(())
}
