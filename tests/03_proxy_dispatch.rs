mod support;

use serde_json::Value;

use support::Echo;

async fn two_backend_gateway() -> support::TestGateway {
    let a = support::spawn_backend("a").await;
    let b = support::spawn_backend("b").await;

    let routes = format!(
        r#"
        [[routes]]
        name = "messaging"
        paths = ["/v1/channels", "/v1/messages/"]
        targets = "{a},{b}"
        "#
    );

    support::spawn_gateway(Some(&routes)).await
}

async fn echo(resp: reqwest::Response) -> Echo {
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn requests_rotate_across_targets() {
    let gw = two_backend_gateway().await;
    let client = reqwest::Client::new();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let resp = client
            .get(gw.url("/v1/channels?before=10"))
            .send()
            .await
            .unwrap();
        let echo = echo(resp).await;
        assert_eq!(echo.method, "GET");
        assert_eq!(echo.path, "/v1/channels");
        assert_eq!(echo.query.as_deref(), Some("before=10"));
        seen.push(echo.backend);
    }

    assert_eq!(seen, ["a", "b", "a", "b"]);
}

#[tokio::test]
async fn trailing_slash_route_claims_subpaths() {
    let gw = two_backend_gateway().await;

    let resp = reqwest::get(gw.url("/v1/messages/42")).await.unwrap();
    let echo = echo(resp).await;
    assert_eq!(echo.path, "/v1/messages/42");
}

#[tokio::test]
async fn forged_identity_is_stripped_for_anonymous_callers() {
    let gw = two_backend_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(gw.url("/v1/channels"))
        .header("x-user", r#"{"id":999}"#)
        .send()
        .await
        .unwrap();
    let echo = echo(resp).await;

    assert!(echo.x_user.is_none());
    assert_eq!(echo.x_forwarded_for.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn authenticated_requests_carry_the_profile() {
    let gw = two_backend_gateway().await;
    let client = reqwest::Client::new();
    let bearer = gw.bearer(&client).await;

    let resp = client
        .get(gw.url("/v1/channels"))
        .header("authorization", &bearer)
        .header("x-user", r#"{"id":999}"#)
        .send()
        .await
        .unwrap();
    let echo = echo(resp).await;

    let user: Value = serde_json::from_str(echo.x_user.as_deref().unwrap()).unwrap();
    assert_eq!(user["id"], 1);
    assert_eq!(user["userName"], "swu");
    assert!(user.get("email").is_none());
}

#[tokio::test]
async fn request_bodies_are_forwarded() {
    let gw = two_backend_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(gw.url("/v1/channels"))
        .header("content-type", "application/json")
        .body(r#"{"name":"general"}"#)
        .send()
        .await
        .unwrap();
    let echo = echo(resp).await;

    assert_eq!(echo.method, "POST");
    assert_eq!(echo.body, r#"{"name":"general"}"#);
}

#[tokio::test]
async fn unreachable_target_is_bad_gateway() {
    let routes = r#"
        [[routes]]
        name = "dead"
        paths = ["/v1/dead"]
        targets = ["127.0.0.1:1"]
    "#;
    let gw = support::spawn_gateway(Some(routes)).await;

    let resp = reqwest::get(gw.url("/v1/dead")).await.unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn unrouted_paths_are_not_found() {
    let gw = two_backend_gateway().await;

    let resp = reqwest::get(gw.url("/v1/unknown")).await.unwrap();
    assert_eq!(resp.status(), 404);

    let health: Value = reqwest::get(gw.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["pools"][0]["name"], "messaging");
    assert_eq!(health["pools"][0]["targets"].as_array().unwrap().len(), 2);
}
