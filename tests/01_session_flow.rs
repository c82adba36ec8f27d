mod support;

use serde_json::Value;

#[tokio::test]
async fn sign_in_returns_profile_and_bearer_token() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();

    let (status, authorization, body) = gw
        .sign_in(&client, support::EMAIL, support::PASSWORD)
        .await;

    assert_eq!(status, 201);
    let authorization = authorization.expect("authorization header");
    assert!(authorization.starts_with("Bearer "));
    assert!(authorization.len() > "Bearer ".len() + 32);

    let profile: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(profile["id"], 1);
    assert_eq!(profile["userName"], "swu");
    assert_eq!(profile["firstName"], "Stanley");
    assert_eq!(profile["lastName"], "Wu");
    assert!(
        profile["photoURL"]
            .as_str()
            .unwrap()
            .starts_with("https://www.gravatar.com/avatar/")
    );
    assert!(profile.get("email").is_none());
    assert!(profile.get("passHash").is_none());
}

#[tokio::test]
async fn sign_out_ends_the_session() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();
    let bearer = gw.bearer(&client).await;

    let me = client
        .get(gw.url("/v1/users/me"))
        .header("authorization", &bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 200);
    let profile: Value = me.json().await.unwrap();
    assert_eq!(profile["userName"], "swu");

    let out = client
        .delete(gw.url("/v1/sessions/mine"))
        .header("authorization", &bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(out.status(), 200);
    assert_eq!(out.text().await.unwrap(), "Signed out");

    let me = client
        .get(gw.url("/v1/users/me"))
        .header("authorization", &bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 401);
}

#[tokio::test]
async fn users_are_looked_up_by_id_when_signed_in() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();
    let bearer = gw.bearer(&client).await;

    let get = |path: &str, bearer: Option<&str>| {
        let mut req = client.get(gw.url(path));
        if let Some(b) = bearer {
            req = req.header("authorization", b);
        }
        req.send()
    };

    let own: Value = get("/v1/users/1", Some(&bearer)).await.unwrap().json().await.unwrap();
    assert_eq!(own["userName"], "swu");

    let other = get("/v1/users/2", Some(&bearer)).await.unwrap();
    assert_eq!(other.status(), 200);
    let other: Value = other.json().await.unwrap();
    assert_eq!(other["id"], 2);
    assert_eq!(other["userName"], "ada");
    assert!(other.get("email").is_none());

    let unknown = get("/v1/users/99", Some(&bearer)).await.unwrap();
    assert_eq!(unknown.status(), 404);

    let garbage = get("/v1/users/abc", Some(&bearer)).await.unwrap();
    assert_eq!(garbage.status(), 400);

    let anonymous = get("/v1/users/2", None).await.unwrap();
    assert_eq!(anonymous.status(), 401);
}

#[tokio::test]
async fn bad_credentials_are_opaque() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();

    for (email, password) in [
        (support::EMAIL, "1234567"),
        ("nobody@example.com", support::PASSWORD),
    ] {
        let (status, authorization, body) = gw.sign_in(&client, email, password).await;
        assert_eq!(status, 401, "{email}");
        assert!(authorization.is_none());
        assert_eq!(body, "invalid credentials");
    }
}

#[tokio::test]
async fn sign_in_rejects_non_json_and_malformed_bodies() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(gw.url("/v1/sessions"))
        .header("content-type", "text/plain")
        .body("email=stanley@gmail.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);
    assert_eq!(resp.text().await.unwrap(), "Request body must be in JSON");

    let resp = client
        .post(gw.url("/v1/sessions"))
        .header("content-type", "application/json")
        .body("{\"email\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.get(gw.url("/v1/sessions")).send().await.unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn sign_out_requires_mine_and_a_session() {
    let gw = support::spawn_gateway(None).await;
    let client = reqwest::Client::new();
    let bearer = gw.bearer(&client).await;

    let resp = client
        .delete(gw.url("/v1/sessions/theirs"))
        .header("authorization", &bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(
        resp.text().await.unwrap(),
        "Last element of URL must be mine, got theirs"
    );

    let resp = client
        .delete(gw.url("/v1/sessions/mine"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .delete(gw.url("/v1/sessions/mine"))
        .header("authorization", "Bearer not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn health_reports_ok() {
    let gw = support::spawn_gateway(None).await;
    let resp = reqwest::get(gw.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["status"], "ok");
    assert_eq!(report["connections"], 0);
}
