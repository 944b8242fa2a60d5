//! GitHub Actions client against a mock API.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stagehand_core::ci::{BlockingWorkflows, GitHubActionsClient, RunStatus, WorkflowTrigger};
use stagehand_core::config::CiConfig;

const RUNS: &str = "/repos/acme/shop/actions/workflows/stagehand.yml/runs";
const DISPATCH: &str = "/repos/acme/shop/actions/workflows/stagehand.yml/dispatches";

fn ci_for(server: &MockServer) -> CiConfig {
    let mut ci = CiConfig::new("acme/shop");
    ci.api_url = Url::parse(&server.uri()).unwrap();
    ci
}

fn client(server: &MockServer) -> GitHubActionsClient {
    GitHubActionsClient::new(&ci_for(server), "ghp_test")
        .unwrap()
        .with_discovery(3, Duration::ZERO)
}

fn run(id: u64, status: &str, conclusion: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "html_url": format!("https://github.com/acme/shop/actions/runs/{id}"),
        "status": status,
        "conclusion": conclusion,
    })
}

fn inputs() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("stage".to_string(), "staging".to_string()),
        ("action".to_string(), "fix".to_string()),
    ])
}

/// Run list before the dispatch, then with the new run on top.
async fn mount_dispatch_flow(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(RUNS))
        .and(query_param("event", "workflow_dispatch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [run(100, "completed", Some("success"))]
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(DISPATCH))
        .and(header("authorization", "Bearer ghp_test"))
        .and(body_partial_json(json!({
            "ref": "main",
            "inputs": { "stage": "staging", "action": "fix" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(RUNS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [run(101, "queued", None), run(100, "completed", Some("success"))]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn trigger_dispatches_and_finds_the_new_run() {
    let server = MockServer::start().await;
    mount_dispatch_flow(&server).await;

    let run = client(&server).trigger("stagehand.yml", &inputs()).await.unwrap();

    assert_eq!(run.id, 101);
    assert_eq!(run.url, "https://github.com/acme/shop/actions/runs/101");
}

#[tokio::test]
async fn trigger_gives_up_when_no_run_appears() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RUNS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workflow_runs": [run(100, "completed", Some("success"))]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DISPATCH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let err = client(&server)
        .trigger("stagehand.yml", &inputs())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no new run appeared"), "{err}");
}

#[tokio::test]
async fn dispatch_rejection_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DISPATCH))
        .respond_with(
            ResponseTemplate::new(422).set_body_string("Unexpected inputs provided: [\"action\"]"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .dispatch("stagehand.yml", &inputs())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("422"), "{message}");
    assert!(message.contains("Unexpected inputs"), "{message}");
}

#[tokio::test]
async fn run_status_maps_github_states() {
    let server = MockServer::start().await;
    for (id, status, conclusion) in [
        (1, "queued", None),
        (2, "in_progress", None),
        (3, "completed", Some("success")),
        (4, "completed", Some("cancelled")),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/shop/actions/runs/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(run(id, status, conclusion)))
            .mount(&server)
            .await;
    }

    let client = client(&server);
    assert_eq!(client.run_status(1).await.unwrap(), RunStatus::Queued);
    assert_eq!(client.run_status(2).await.unwrap(), RunStatus::InProgress);
    assert_eq!(client.run_status(3).await.unwrap(), RunStatus::Succeeded);
    assert_eq!(
        client.run_status(4).await.unwrap(),
        RunStatus::Failed {
            conclusion: "cancelled".to_string()
        }
    );
}

#[tokio::test]
async fn http_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/shop/actions/runs/7"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).run_status(7).await.unwrap_err();
    assert!(err.to_string().contains("HTTP 401"), "{err}");
}

#[test]
fn blocking_wrapper_drives_the_async_client() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        mount_dispatch_flow(&server).await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/shop/actions/runs/101"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(run(101, "completed", Some("failure"))),
            )
            .mount(&server)
            .await;
        server
    });

    let workflows = BlockingWorkflows::new(client(&server)).unwrap();
    let run = workflows.trigger("stagehand.yml", &inputs()).unwrap();
    assert_eq!(run.id, 101);
    assert_eq!(
        workflows.poll_status(&run).unwrap(),
        RunStatus::Failed {
            conclusion: "failure".to_string()
        }
    );

    runtime.block_on(async move { drop(server) });
}
