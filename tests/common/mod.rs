#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

pub const OPERATOR_EMAIL: &str = "ops@scenehub.test";
pub const PASSWORD: &str = "correct horse battery";

/// Server process on its own port with the in-memory store. Killed on drop.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn(extra_env: &[(&str, String)]) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_scenehub-api"));
        cmd.env("SCENEHUB_API_PORT", port.to_string())
            .env("SCENEHUB_STORE", "memory")
            .env("APP_ENV", "development")
            .env("JWT_SECRET", "integration-test-secret")
            .env("PASSWORD_ITERATIONS", "1000")
            .env("PRIVILEGED_OPERATORS", OPERATOR_EMAIL)
            .env("PUBLIC_BASE_URL", "https://scenes.test")
            // Unroutable unless a test brings its own ion stub
            .env("CESIUM_ION_API_URL", "http://127.0.0.1:9")
            .env("INTEGRATION_REQUEST_TIMEOUT_SECS", "2")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub async fn start_server() -> Result<TestServer> {
    start_server_with(&[]).await
}

pub async fn start_server_with(extra_env: &[(&str, String)]) -> Result<TestServer> {
    let server = TestServer::spawn(extra_env)?;
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// Signed-up user with a session token and personal workspace
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
    pub workspace_id: String,
}

pub async fn signup(server: &TestServer, email: &str) -> Result<TestUser> {
    let res = reqwest::Client::new()
        .post(server.url("/auth/signup"))
        .json(&json!({ "email": email, "name": email.split('@').next(), "password": PASSWORD }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::CREATED, "signup failed: {}", res.status());

    let body: Value = res.json().await?;
    let data = &body["data"];
    Ok(TestUser {
        id: data["user"]["id"].as_str().context("user id")?.to_string(),
        email: data["user"]["email"].as_str().context("email")?.to_string(),
        token: data["token"].as_str().context("token")?.to_string(),
        workspace_id: data["workspace"]["id"].as_str().context("workspace id")?.to_string(),
    })
}

/// Authenticated JSON request; returns status and parsed body (`Null` when empty)
pub async fn call(
    server: &TestServer,
    user: &TestUser,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut req = reqwest::Client::new()
        .request(method, server.url(path))
        .bearer_auth(&user.token);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let res = req.send().await?;
    let status = res.status();
    let text = res.text().await?;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).with_context(|| format!("non-JSON body: {}", text))?
    };
    Ok((status, value))
}

/// Invite `invitee` into `org_id` and accept it
pub async fn add_member(
    server: &TestServer,
    owner: &TestUser,
    org_id: &str,
    invitee: &TestUser,
    role: &str,
) -> Result<()> {
    let (status, body) = call(
        server,
        owner,
        Method::POST,
        &format!("/api/organizations/{}/invites", org_id),
        Some(json!({ "email": invitee.email, "role": role })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "invite failed: {} {}", status, body);
    let token = body["data"]["token"].as_str().context("invite token")?;

    let (status, body) = call(
        server,
        invitee,
        Method::POST,
        "/api/invites/accept",
        Some(json!({ "token": token })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "accept failed: {} {}", status, body);
    Ok(())
}

/// Activity is written in the background; poll until `pred` holds
pub async fn wait_for_activity<F>(
    server: &TestServer,
    user: &TestUser,
    org_id: &str,
    query: &str,
    pred: F,
) -> Result<Value>
where
    F: Fn(&Value) -> bool,
{
    let path = format!("/api/organizations/{}/activity{}", org_id, query);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (status, body) = call(server, user, Method::GET, &path, None).await?;
        anyhow::ensure!(status == StatusCode::OK, "activity failed: {}", status);
        if pred(&body["data"]) {
            return Ok(body["data"].clone());
        }
        if Instant::now() > deadline {
            anyhow::bail!("activity condition not met: {}", body);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
