//! Integration tests for webhook management and repository introspection
//! through the `GitProvider` interface over `MockHost`.

use pac_forge::cancel::{with_cancellation, with_deadline};
use pac_forge::forge::mock::{FailOn, MockHost, MockOperation};
use pac_forge::forge::{AppIdentity, ErrorKind, GitProvider, ProviderClient, ProviderError};
use tokio_util::sync::CancellationToken;

const REPO: &str = "owner/repo";
const URL: &str = "https://github.com/owner/repo";
const HOOK: &str = "https://pac.example.com/hook";

fn setup() -> (MockHost, ProviderClient<MockHost>) {
    let host = MockHost::new().with_repo(REPO, "main", &[(".tekton/push.yaml", "kind: PipelineRun")]);
    let provider = ProviderClient::new(host.clone());
    (host, provider)
}

mod webhooks {
    use super::*;

    #[tokio::test]
    async fn create_twice_registers_one_hook() {
        let (host, provider) = setup();

        provider.create_webhook(URL, HOOK, "s3cret").await.unwrap();
        provider.create_webhook(URL, HOOK, "s3cret").await.unwrap();

        assert_eq!(host.webhooks(REPO).len(), 1);
        let creates = host
            .writes()
            .into_iter()
            .filter(|op| matches!(op, MockOperation::CreateWebhook { .. }))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn trailing_slash_is_same_target() {
        let (host, provider) = setup();
        host.add_webhook(REPO, "https://pac.example.com/hook/");

        provider.create_webhook(URL, HOOK, "s3cret").await.unwrap();
        assert_eq!(host.webhooks(REPO).len(), 1);
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn other_targets_are_kept() {
        let (host, provider) = setup();
        host.add_webhook(REPO, "https://ci.example.com/hook");

        provider.create_webhook(URL, HOOK, "s3cret").await.unwrap();
        provider.delete_webhook(URL, HOOK).await.unwrap();

        let remaining = host.webhooks(REPO);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url, "https://ci.example.com/hook");
    }

    #[tokio::test]
    async fn delete_removes_every_match() {
        let (host, provider) = setup();
        host.add_webhook(REPO, HOOK);
        host.add_webhook(REPO, "https://pac.example.com/hook/");

        provider.delete_webhook(URL, HOOK).await.unwrap();
        assert!(host.webhooks(REPO).is_empty());
    }

    #[tokio::test]
    async fn delete_absent_is_ok() {
        let (host, provider) = setup();
        provider.delete_webhook(URL, HOOK).await.unwrap();
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn delete_on_missing_repository_is_ok() {
        let provider = ProviderClient::new(MockHost::new());
        provider
            .delete_webhook("https://github.com/gone/away", HOOK)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_tolerates_concurrent_removal() {
        let host = MockHost::new()
            .with_repo(REPO, "main", &[])
            .fail_on(FailOn::DeleteWebhook(ProviderError::NotFound("webhook 1".into())));
        host.add_webhook(REPO, HOOK);
        let provider = ProviderClient::new(host.clone());

        provider.delete_webhook(URL, HOOK).await.unwrap();
    }

    #[tokio::test]
    async fn delete_surfaces_other_failures() {
        let host = MockHost::new()
            .with_repo(REPO, "main", &[])
            .fail_on(FailOn::DeleteWebhook(ProviderError::Forbidden("admin required".into())));
        host.add_webhook(REPO, HOOK);
        let provider = ProviderClient::new(host.clone());

        let err = provider.delete_webhook(URL, HOOK).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let (host, provider) = setup();
        let err = provider.create_webhook(URL, "  ", "s").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(host.operations().is_empty());
    }

    #[tokio::test]
    async fn create_on_missing_repository_is_not_found() {
        let provider = ProviderClient::new(MockHost::new());
        let err = provider
            .create_webhook("https://github.com/gone/away", HOOK, "s")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod introspection {
    use super::*;

    #[tokio::test]
    async fn default_branch_and_head() {
        let (host, provider) = setup();
        assert_eq!(provider.default_branch(URL).await.unwrap(), "main");
        assert_eq!(
            provider.branch_head_sha(URL, "main").await.unwrap(),
            host.branch_head(REPO, "main").unwrap()
        );
    }

    #[tokio::test]
    async fn default_branch_of_missing_repository() {
        let provider = ProviderClient::new(MockHost::new());
        let err = provider
            .default_branch("https://github.com/gone/away")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn default_branch_of_bad_url() {
        let (_, provider) = setup();
        let err = provider.default_branch("github.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRepositoryUrl);
    }

    #[tokio::test]
    async fn missing_branch_head_is_not_found() {
        let (_, provider) = setup();
        let err = provider.branch_head_sha(URL, "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn read_and_probe_files() {
        let (_, provider) = setup();

        assert_eq!(
            provider
                .read_file(URL, "main", ".tekton/push.yaml")
                .await
                .unwrap(),
            b"kind: PipelineRun".to_vec()
        );
        assert!(provider
            .file_exists(URL, "main", ".tekton/push.yaml")
            .await
            .unwrap());
        assert!(!provider
            .file_exists(URL, "main", ".tekton/pull.yaml")
            .await
            .unwrap());

        let err = provider
            .read_file(URL, "main", ".tekton/pull.yaml")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn visibility() {
        let (host, provider) = setup();
        assert!(!provider.is_public(URL).await.unwrap());
        host.set_public(REPO, true);
        assert!(provider.is_public(URL).await.unwrap());
    }

    #[tokio::test]
    async fn browse_url_is_built_locally() {
        let (host, provider) = setup();
        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(
            provider.browse_at_sha_url(URL, sha),
            format!("{}/tree/{}", URL, sha)
        );
        assert!(host.operations().is_empty());
    }

    #[tokio::test]
    async fn delete_branch_reports_existence() {
        let (host, provider) = setup();
        host.advance_branch(REPO, "topic", &[("x", Some("1"))]);

        assert!(provider.delete_branch(URL, "topic").await.unwrap());
        assert!(!provider.delete_branch(URL, "topic").await.unwrap());
        assert!(!host.branches(REPO).contains(&"topic".to_string()));
    }

    #[tokio::test]
    async fn default_branch_cannot_be_deleted() {
        let (_, provider) = setup();
        let err = provider.delete_branch(URL, "main").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn app_identity_and_user() {
        let host = MockHost::new()
            .with_app(AppIdentity {
                name: "Pipelines as Code".into(),
                id: "12345".into(),
                slug: "pipelines-as-code".into(),
            })
            .with_user("pipelines-as-code[bot]", 98765);
        let provider = ProviderClient::new(host);

        let app = provider.app_identity().await.unwrap();
        assert_eq!(app.slug, "pipelines-as-code");
        assert_eq!(
            provider
                .app_user_id(&format!("{}[bot]", app.slug))
                .await
                .unwrap(),
            98765
        );
        assert_eq!(
            provider.app_user_id("stranger").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn app_identity_unsupported_without_app() {
        let provider = ProviderClient::new(MockHost::new());
        assert_eq!(
            provider.app_identity().await.unwrap_err().kind(),
            ErrorKind::UnsupportedCapability
        );
    }
}

mod cancellation {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_before_start() {
        let (host, provider) = setup();
        let token = CancellationToken::new();
        token.cancel();

        let err = with_cancellation(&token, provider.create_webhook(URL, HOOK, "s"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(host.webhooks(REPO).is_empty());
    }

    #[tokio::test]
    async fn completes_within_deadline() {
        let (_, provider) = setup();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let branch = with_deadline(deadline, provider.default_branch(URL))
            .await
            .unwrap();
        assert_eq!(branch, "main");
    }
}
