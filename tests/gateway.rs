//! Router-level tests: real handlers and engine, fake tool runner.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use labstx::config::Config;
use labstx::engine::{CommandOutput, Invocation, InvokeError, Orchestrator, SessionRegistry, ToolRunner};
use labstx::git::GitRepo;
use labstx::github::AuthCookie;
use labstx::{router, AppState};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Answers `check` and `console` like the real CLI would and records stdin.
#[derive(Default)]
struct ScriptedRunner {
    scripts: Mutex<Vec<String>>,
    invocations: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        workdir: &Path,
    ) -> Result<CommandOutput, InvokeError> {
        self.invocations.lock().push(invocation.args.clone());
        let stdin = invocation.stdin.clone().unwrap_or_default();
        self.scripts.lock().push(stdin.clone());

        let ok = |stdout: String| {
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(0),
            })
        };

        match invocation.args.first().map(String::as_str) {
            Some("check") => {
                let source = std::fs::read_dir(workdir.join("contracts"))
                    .into_iter()
                    .flatten()
                    .flatten()
                    .filter_map(|e| std::fs::read_to_string(e.path()).ok())
                    .collect::<String>();
                if source.contains("oops") {
                    Ok(CommandOutput {
                        stdout: "error: use of unresolved function 'oops'\n".into(),
                        stderr: String::new(),
                        exit_code: Some(1),
                    })
                } else {
                    ok("✔ 1 contract checked\n".into())
                }
            }
            Some("console") => {
                let mut out = String::from("Clarinet console\n");
                for line in stdin.lines() {
                    if line == "::get_assets" {
                        out.push_str("Asset balance STX: 100000000000000\n");
                    } else {
                        out.push_str(&format!(">> {line}\n"));
                        out.push_str(if line == "(+ 2 2)" { "4\n" } else { "u1\n" });
                    }
                }
                ok(out)
            }
            _ => ok(format!("ran {}\n", invocation.args.join(" "))),
        }
    }
}

struct Harness {
    app: axum::Router,
    runner: Arc<ScriptedRunner>,
    _scratch: TempDir,
}

fn harness() -> Harness {
    harness_with(Config::default())
}

fn harness_with(config: Config) -> Harness {
    let scratch = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::default());
    let orchestrator = Arc::new(Orchestrator::new(runner.clone(), "clarinet", scratch.path()));
    let sessions = Arc::new(SessionRegistry::new(None));
    let git = Arc::new(GitRepo::new(runner.clone(), scratch.path()));
    let state = AppState::new(config, orchestrator, sessions, git).unwrap();
    Harness {
        app: router(state),
        runner,
        _scratch: scratch,
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, session: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        builder = builder.header("x-session-id", id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_reports_engine() {
    let h = harness();
    let req = Request::get("/ide-api/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "engine": "Clarinet CLI" }));
}

#[tokio::test]
async fn check_clean_contract_is_200() {
    let h = harness();
    let req = post(
        "/ide-api/clarity/check",
        None,
        json!({ "name": "counter", "code": "(define-data-var n uint u0)" }),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn check_failure_is_422_with_errors() {
    let h = harness();
    let req = post(
        "/ide-api/clarity/check",
        None,
        json!({ "name": "broken", "code": "(oops)" }),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["errors"],
        json!(["error: use of unresolved function 'oops'"])
    );
}

#[tokio::test]
async fn check_rejects_path_like_names() {
    let h = harness();
    let req = post(
        "/ide-api/clarity/check",
        None,
        json!({ "name": "../escape", "code": "(ok true)" }),
    );
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(h.runner.invocations.lock().is_empty());
}

#[tokio::test]
async fn execute_replays_history_per_session() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        post("/ide-api/clarity/execute", Some("a"), json!({ "snippet": "(+ 1 2)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["events"], json!([]));

    let (_, body) = send(
        &h.app,
        post("/ide-api/clarity/execute", Some("a"), json!({ "snippet": "(+ 2 2)" })),
    )
    .await;
    assert_eq!(body["result"], "4");

    send(
        &h.app,
        post("/ide-api/clarity/execute", Some("b"), json!({ "snippet": "(+ 2 2)" })),
    )
    .await;

    let scripts = h.runner.scripts.lock().clone();
    assert_eq!(scripts[1], "(+ 1 2)\n(+ 2 2)\n::get_assets\n");
    assert_eq!(scripts[2], "(+ 2 2)\n::get_assets\n");
}

#[tokio::test]
async fn malformed_session_header_is_rejected() {
    let h = harness();
    let long_id = "x".repeat(65);
    for id in [long_id.as_str(), "a/b", "two words"] {
        let (status, body) = send(
            &h.app,
            post("/ide-api/clarity/execute", Some(id), json!({ "snippet": "(+ 1 2)" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
    assert!(h.runner.invocations.lock().is_empty());
}

#[tokio::test]
async fn empty_snippet_is_400() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        post("/ide-api/clarity/execute", None, json!({ "snippet": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn state_lists_asset_balances() {
    let h = harness();
    let (status, body) = send(&h.app, post("/ide-api/clarity/state", None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blockHeight"], 1);
    assert_eq!(body["deployer"], "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM");
    assert_eq!(
        body["state"],
        json!([{ "name": "STX", "type": "asset", "value": "100000000000000" }])
    );
}

#[tokio::test]
async fn terminal_only_runs_clarinet() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        post("/ide-api/clarity/terminal", None, json!({ "command": "rm -rf /" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["output"], "Only clarinet commands are allowed.");
    assert!(h.runner.invocations.lock().is_empty());

    let (_, body) = send(
        &h.app,
        post(
            "/ide-api/clarity/terminal",
            None,
            json!({ "command": "clarinet contracts list" }),
        ),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "ran contracts list\n");
}

#[tokio::test]
async fn reset_clears_session_history() {
    let h = harness();
    send(
        &h.app,
        post("/ide-api/clarity/execute", None, json!({ "snippet": "(+ 1 2)" })),
    )
    .await;
    let (_, body) = send(&h.app, post("/ide-api/clarity/reset", None, json!({}))).await;
    assert_eq!(body["success"], true);
    send(
        &h.app,
        post("/ide-api/clarity/execute", None, json!({ "snippet": "(+ 2 2)" })),
    )
    .await;

    let scripts = h.runner.scripts.lock().clone();
    assert_eq!(scripts.last().unwrap(), "(+ 2 2)\n::get_assets\n");
}

#[tokio::test]
async fn github_user_reads_cookie() {
    let h = harness();

    let req = Request::get("/ide-api/github/user").body(Body::empty()).unwrap();
    let (_, body) = send(&h.app, req).await;
    assert_eq!(body, json!({ "authenticated": false }));

    let cookie = AuthCookie {
        token: "gho_test".into(),
        user: labstx::github::GithubUser {
            login: "octo".into(),
            avatar_url: None,
            name: None,
            id: 7,
        },
    }
    .encode()
    .unwrap();
    let req = Request::get("/ide-api/github/user")
        .header(header::COOKIE, format!("theme=dark; github_auth={cookie}"))
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&h.app, req).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["login"], "octo");
}

#[tokio::test]
async fn repos_require_auth() {
    let h = harness();
    let req = Request::get("/ide-api/github/repos").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Not authenticated");
}

#[tokio::test]
async fn oauth_start_without_client_id_is_500() {
    let h = harness();
    let req = Request::get("/ide-api/auth/github").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn logout_clears_cookie_and_redirects() {
    let h = harness();
    let req = Request::get("/ide-api/auth/logout").body(Body::empty()).unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://localhost:3000/");
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("github_auth=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn git_status_uses_porcelain() {
    let h = harness();
    let req = Request::get("/ide-api/git/status").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        *h.runner.invocations.lock(),
        vec![
            vec!["status".to_string(), "--porcelain".to_string()],
            vec!["branch".to_string(), "--show-current".to_string()],
        ]
    );
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness();
    let req = Request::get("/ide-api/nope").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn compile_forwards_body_and_wasm_headers() {
    use wiremock::matchers::{body_string, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compile"))
        .and(header_is("content-type", "text/plain"))
        .and(body_string("(define-public (hi) (ok u1))"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Compilation-Time", "12")
                .insert_header("X-WASM-Size", "4")
                .set_body_bytes(vec![0u8, 0x61, 0x73, 0x6d]),
        )
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.compiler.service_url = server.uri();
    let h = harness_with(config);

    let req = Request::post("/ide-api/compile")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("(define-public (hi) (ok u1))"))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/wasm");
    assert_eq!(resp.headers()["x-compilation-time"], "12");
    assert_eq!(resp.headers()["x-wasm-size"], "4");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], &[0u8, 0x61, 0x73, 0x6d]);
}

#[tokio::test]
async fn compile_passes_upstream_errors_through() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compile"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unexpected token"))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.compiler.service_url = format!("{}/", server.uri());
    let h = harness_with(config);

    let req = Request::post("/ide-api/compile")
        .body(Body::from("("))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"unexpected token");
}
