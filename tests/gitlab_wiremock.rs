//! GitLab adapter tests against a wiremock server, resolved as a
//! self-hosted instance mapped in configuration.

use std::sync::Arc;

use pac_forge::auth::StaticCredentials;
use pac_forge::config::Config;
use pac_forge::forge::{
    ErrorKind, GitProvider, MergeRequestData, ProviderResolver, ReconcileOutcome, RepositoryFile,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const URL: &str = "https://gitlab.example.com/platform/ci/service";
const PROJECT: &str = "/projects/platform%2Fci%2Fservice";

fn provider(server: &MockServer) -> Box<dyn GitProvider> {
    let config = Config::from_toml_str(&format!(
        r#"
        [[hosts]]
        host = "gitlab.example.com"
        kind = "gitlab"
        api_base = "{}"
        "#,
        server.uri()
    ))
    .unwrap();
    let creds = StaticCredentials::new().with_token("gitlab.example.com", "glpat-test");
    let provider = ProviderResolver::new(config, Arc::new(creds))
        .unwrap()
        .resolve(URL)
        .unwrap();
    assert_eq!(provider.name(), "gitlab");
    provider
}

fn at(suffix: &str) -> String {
    format!("{}{}", PROJECT, suffix)
}

fn data() -> MergeRequestData {
    MergeRequestData {
        branch_name: "pac-config".into(),
        commit_message: "Add Pipelines as Code configuration".into(),
        title: "Configure Pipelines as Code".into(),
        text: "Adds .tekton/push.yaml".into(),
        author_name: "PaC Bot".into(),
        author_email: "pac-bot@example.com".into(),
        files: vec![RepositoryFile::new(".tekton/push.yaml", "kind: PipelineRun")],
        ..Default::default()
    }
}

fn merge_request(iid: i64) -> serde_json::Value {
    json!({
        "iid": iid,
        "web_url": format!("https://gitlab.example.com/platform/ci/service/-/merge_requests/{}", iid),
        "title": "Configure Pipelines as Code",
        "created_at": "2026-10-01T12:00:00Z",
        "source_branch": "pac-config-main",
        "target_branch": "main",
        "source_project_id": 42,
        "target_project_id": 42
    })
}

/// An open merge request from a fork project reusing our branch name.
fn fork_merge_request(iid: i64) -> serde_json::Value {
    json!({
        "iid": iid,
        "web_url": format!("https://gitlab.example.com/platform/ci/service/-/merge_requests/{}", iid),
        "title": "fork mr",
        "created_at": "2026-09-01T12:00:00Z",
        "source_branch": "pac-config-main",
        "target_branch": "main",
        "source_project_id": 77,
        "target_project_id": 42
    })
}

async fn mount_project(server: &MockServer, base_sha: &str) {
    Mock::given(method("GET"))
        .and(path(PROJECT))
        .and(header("authorization", "Bearer glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "default_branch": "main"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/repository/branches/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "main",
            "commit": { "id": base_sha }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn empty_project_has_no_default_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "default_branch": null
        })))
        .mount(&server)
        .await;

    let err = provider(&server).default_branch(URL).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn reads_raw_file_by_encoded_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(at("/repository/files/.tekton%2Fpush.yaml/raw")))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_string("kind: PipelineRun"))
        .mount(&server)
        .await;

    let content = provider(&server)
        .read_file(URL, "main", ".tekton/push.yaml")
        .await
        .unwrap();
    assert_eq!(content, b"kind: PipelineRun".to_vec());
}

#[tokio::test]
async fn ensure_opens_merge_request_with_single_commit() {
    let server = MockServer::start().await;
    mount_project(&server, "base000").await;

    Mock::given(method("GET"))
        .and(path(at("/repository/files/.tekton%2Fpush.yaml/raw")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/merge_requests")))
        .and(query_param("state", "opened"))
        .and(query_param("target_branch", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(at("/repository/branches/pac-config-main")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/repository/commits")))
        .and(body_partial_json(json!({
            "branch": "pac-config-main",
            "start_sha": "base000",
            "force": true,
            "author_email": "pac-bot@example.com",
            "actions": [{
                "action": "create",
                "file_path": ".tekton/push.yaml",
                "content": "a2luZDogUGlwZWxpbmVSdW4=",
                "encoding": "base64"
            }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "commit111",
            "parent_ids": ["base000"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/merge_requests")))
        .and(body_partial_json(json!({
            "source_branch": "pac-config-main",
            "target_branch": "main",
            "remove_source_branch": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(merge_request(3)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = provider(&server)
        .ensure_config_merge_request(URL, &data())
        .await
        .unwrap();
    match outcome {
        ReconcileOutcome::Created(mr) => {
            assert_eq!(mr.id, 3);
            assert!(mr.web_url.ends_with("/-/merge_requests/3"));
        }
        other => panic!("expected Created, got {other:?}"),
    }
}

#[tokio::test]
async fn fork_merge_request_does_not_count_as_proposal() {
    let server = MockServer::start().await;
    mount_project(&server, "base000").await;

    Mock::given(method("GET"))
        .and(path(at("/repository/files/.tekton%2Fpush.yaml/raw")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fork_merge_request(5)])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(at("/repository/branches/pac-config-main")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/repository/commits")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "commit111",
            "parent_ids": ["base000"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(201).set_body_json(merge_request(6)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = provider(&server)
        .ensure_config_merge_request(URL, &data())
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Created(ref mr) if mr.id == 6));
}

#[tokio::test]
async fn stale_proposal_is_force_updated() {
    let server = MockServer::start().await;
    mount_project(&server, "base222").await;

    Mock::given(method("GET"))
        .and(path(at("/repository/files/.tekton%2Fpush.yaml/raw")))
        .and(query_param("ref", "base222"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([merge_request(3)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/repository/branches/pac-config-main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "pac-config-main",
            "commit": { "id": "tip111" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/repository/commits/tip111")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tip111",
            "parent_ids": ["base000"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/repository/commits")))
        .and(body_partial_json(json!({
            "branch": "pac-config-main",
            "start_sha": "base222",
            "force": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "tip333",
            "parent_ids": ["base222"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(409))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = provider(&server)
        .ensure_config_merge_request(URL, &data())
        .await
        .unwrap();
    match outcome {
        ReconcileOutcome::Updated(mr) => assert_eq!(mr.id, 3),
        other => panic!("expected Updated, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_proposes_delete_action() {
    let server = MockServer::start().await;
    mount_project(&server, "base000").await;

    Mock::given(method("GET"))
        .and(path(at("/repository/files/.tekton%2Fpush.yaml/raw")))
        .respond_with(ResponseTemplate::new(200).set_body_string("kind: PipelineRun"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(at("/repository/branches/pac-config-main")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/repository/commits")))
        .and(body_partial_json(json!({
            "actions": [{ "action": "delete", "file_path": ".tekton/push.yaml" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "commit111",
            "parent_ids": ["base000"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/merge_requests")))
        .respond_with(ResponseTemplate::new(201).set_body_json(merge_request(4)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = provider(&server)
        .remove_config_merge_request(URL, &data())
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Created(ref mr) if mr.id == 4));
}

#[tokio::test]
async fn webhook_create_sends_secret_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(at("/hooks")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(at("/hooks")))
        .and(body_partial_json(json!({
            "url": "https://pac.example.com/hook",
            "token": "s3cret",
            "push_events": true,
            "merge_requests_events": true,
            "note_events": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server)
        .create_webhook(URL, "https://pac.example.com/hook", "s3cret")
        .await
        .unwrap();
}

#[tokio::test]
async fn webhook_delete_on_missing_project_is_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(at("/hooks")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "404 Project Not Found"
        })))
        .mount(&server)
        .await;

    provider(&server)
        .delete_webhook(URL, "https://pac.example.com/hook")
        .await
        .unwrap();
}

#[tokio::test]
async fn private_project_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECT))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(!provider(&server).is_public(URL).await.unwrap());
}

#[tokio::test]
async fn browse_and_app_capabilities() {
    let server = MockServer::start().await;
    let provider = provider(&server);

    assert_eq!(
        provider.browse_at_sha_url(URL, "abc123"),
        "https://gitlab.example.com/platform/ci/service/-/tree/abc123"
    );
    assert_eq!(
        provider.app_identity().await.unwrap_err().kind(),
        ErrorKind::UnsupportedCapability
    );
}
