use datalake_etl::adapters::adls::AdlsClient;
use datalake_etl::adapters::azure_auth::{AzureCredentials, AzureTokenProvider};
use datalake_etl::adapters::http::HttpRetry;
use datalake_etl::adapters::key_vault::{resolve_credentials, KeyVaultClient};
use datalake_etl::adapters::storage::AdlsStorage;
use datalake_etl::app::tasks::{
    run_task, AzureDataLakeDownload, AzureDataLakeToDf, AzureDataLakeUpload, TaskPolicy,
};
use datalake_etl::core::Storage;
use datalake_etl::EtlError;
use httpmock::prelude::*;
use httpmock::Method::{HEAD, PATCH};
use httpmock::Mock;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn credentials() -> AzureCredentials {
    AzureCredentials {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        account_name: Some("lake".to_string()),
    }
}

fn tokens(server: &MockServer) -> AzureTokenProvider {
    AzureTokenProvider::new(Client::new(), credentials())
        .with_authority_host(server.base_url())
        .with_retry(HttpRetry::none())
}

fn token_mock(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .body_contains("grant_type=client_credentials")
            .body_contains("client_id=client");
        then.status(200)
            .json_body(json!({"access_token": "lake-token", "expires_in": 3600}));
    })
}

fn adls(server: &MockServer) -> AdlsClient {
    AdlsClient::new(Client::new(), server.base_url(), "raw", tokens(server))
        .with_retry(HttpRetry::none())
}

fn policy() -> TaskPolicy {
    TaskPolicy {
        max_retries: 0,
        retry_delay: Duration::ZERO,
        timeout: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn test_token_is_cached_per_scope() {
    let server = MockServer::start();
    let token = token_mock(&server);
    let provider = tokens(&server);

    assert_eq!(
        provider.token("https://storage.azure.com/.default").await.unwrap(),
        "lake-token"
    );
    provider
        .token("https://storage.azure.com/.default")
        .await
        .unwrap();

    token.assert_hits(1);
}

#[tokio::test]
async fn test_rejected_service_principal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/tenant/oauth2/v2.0/token");
        then.status(401)
            .json_body(json!({"error": "invalid_client"}));
    });

    let err = tokens(&server)
        .token("https://vault.azure.net/.default")
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::CredentialError { .. }));
}

#[tokio::test]
async fn test_upload_creates_appends_and_flushes() {
    let server = MockServer::start();
    token_mock(&server);
    let create = server.mock(|when, then| {
        when.method(PUT)
            .path("/raw/vidclub/jobs.csv")
            .query_param("resource", "file")
            .header("authorization", "Bearer lake-token")
            .header("x-ms-version", "2021-06-08");
        then.status(201);
    });
    let append = server.mock(|when, then| {
        when.method(PATCH)
            .path("/raw/vidclub/jobs.csv")
            .query_param("action", "append")
            .query_param("position", "0")
            .body("id\n1\n");
        then.status(202);
    });
    let flush = server.mock(|when, then| {
        when.method(PATCH)
            .path("/raw/vidclub/jobs.csv")
            .query_param("action", "flush")
            .query_param("position", "5");
        then.status(200);
    });

    adls(&server)
        .upload("vidclub/jobs.csv", b"id\n1\n".to_vec(), true)
        .await
        .unwrap();

    create.assert();
    append.assert();
    flush.assert();
}

#[tokio::test]
async fn test_upload_without_overwrite_conflicts() {
    let server = MockServer::start();
    token_mock(&server);
    server.mock(|when, then| {
        when.method(PUT)
            .path("/raw/vidclub/jobs.csv")
            .header("if-none-match", "*");
        then.status(409)
            .json_body(json!({"error": {"code": "PathAlreadyExists"}}));
    });

    let err = adls(&server)
        .upload("vidclub/jobs.csv", b"x".to_vec(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_download_exists_and_list() {
    let server = MockServer::start();
    token_mock(&server);
    server.mock(|when, then| {
        when.method(GET).path("/raw/vidclub/jobs.csv");
        then.status(200).body("id,name\n1,a\n");
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/raw/vidclub/jobs.csv");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/raw/vidclub/missing.csv");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/raw")
            .query_param("resource", "filesystem")
            .query_param("directory", "vidclub");
        then.status(200).json_body(json!({
            "paths": [
                {"name": "vidclub/jobs.csv", "contentLength": "12"},
                {"name": "vidclub/archive", "isDirectory": "true"}
            ]
        }));
    });

    let client = adls(&server);
    assert_eq!(
        client.download("vidclub/jobs.csv").await.unwrap(),
        b"id,name\n1,a\n"
    );
    assert!(client.exists("vidclub/jobs.csv").await.unwrap());
    assert!(!client.exists("vidclub/missing.csv").await.unwrap());

    let entries = client.list("vidclub").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].is_directory());
    assert_eq!(entries[0].content_length.as_deref(), Some("12"));
    assert!(entries[1].is_directory());
}

fn without_continuation(req: &HttpMockRequest) -> bool {
    !req.query_params
        .as_ref()
        .map(|params| params.iter().any(|(name, _)| name == "continuation"))
        .unwrap_or(false)
}

#[tokio::test]
async fn test_list_follows_continuation() {
    let server = MockServer::start();
    token_mock(&server);
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/raw")
            .query_param("resource", "filesystem")
            .matches(without_continuation);
        then.status(200)
            .header("x-ms-continuation", "TOKEN2")
            .json_body(json!({"paths": [{"name": "vidclub/a.csv"}]}));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/raw")
            .query_param("continuation", "TOKEN2");
        then.status(200)
            .json_body(json!({"paths": [{"name": "vidclub/b.csv"}, {"name": "vidclub/c.csv"}]}));
    });

    let entries = adls(&server).list("vidclub").await.unwrap();

    first.assert();
    second.assert();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["vidclub/a.csv", "vidclub/b.csv", "vidclub/c.csv"]);
}

#[tokio::test]
async fn test_failed_upload_removes_partial_file_before_retry() {
    let server = MockServer::start();
    token_mock(&server);
    let create = server.mock(|when, then| {
        when.method(PUT)
            .path("/raw/in/data.tsv")
            .header("if-none-match", "*");
        then.status(201);
    });
    server.mock(|when, then| {
        when.method(PATCH)
            .path("/raw/in/data.tsv")
            .query_param("action", "append");
        then.status(503).body("busy");
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/raw/in/data.tsv");
        then.status(200);
    });

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("data.tsv");
    std::fs::write(&local, "a\tb\n1\t2\n").unwrap();

    let retrying = TaskPolicy {
        max_retries: 1,
        ..policy()
    };
    let upload = AzureDataLakeUpload::new(adls(&server), &local, "in/data.tsv", false, retrying);
    let err = run_task(&upload).await.unwrap_err();

    assert!(matches!(err, EtlError::ApiError { status: 503, .. }));
    create.assert_hits(2);
    delete.assert_hits(2);
}

#[tokio::test]
async fn test_download_missing_file() {
    let server = MockServer::start();
    token_mock(&server);
    server.mock(|when, then| {
        when.method(GET).path("/raw/nope.csv");
        then.status(404);
    });

    let err = adls(&server).download("nope.csv").await.unwrap_err();
    assert!(matches!(err, EtlError::NotFound { .. }));
}

#[tokio::test]
async fn test_upload_and_download_tasks() {
    let server = MockServer::start();
    token_mock(&server);
    server.mock(|when, then| {
        when.method(PUT).path("/raw/in/data.tsv");
        then.status(201);
    });
    server.mock(|when, then| {
        when.method(PATCH).path("/raw/in/data.tsv");
        then.status(202);
    });
    server.mock(|when, then| {
        when.method(GET).path("/raw/in/data.tsv");
        then.status(200).body("a\tb\n1\t2\n");
    });

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("data.tsv");
    std::fs::write(&local, "a\tb\n1\t2\n").unwrap();

    let upload = AzureDataLakeUpload::new(adls(&server), &local, "in/data.tsv", true, policy());
    let url = run_task(&upload).await.unwrap();
    assert_eq!(url, format!("{}/raw/in/data.tsv", server.base_url()));

    let target = dir.path().join("copies/data.tsv");
    let download =
        AzureDataLakeDownload::new(adls(&server), "in/data.tsv", &target, false, policy());
    run_task(&download).await.unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "a\tb\n1\t2\n");

    let again = AzureDataLakeDownload::new(adls(&server), "in/data.tsv", &target, false, policy());
    assert!(matches!(
        run_task(&again).await,
        Err(EtlError::AlreadyExists { .. })
    ));

    let to_df = AzureDataLakeToDf::new(adls(&server), "in/data.tsv", policy());
    let frame = run_task(&to_df).await.unwrap();
    assert_eq!(frame.columns, vec!["a", "b"]);
    assert_eq!(frame.rows[0].get("b"), Some(&json!("2")));
}

#[tokio::test]
async fn test_adls_storage_prefixes_base_dir() {
    let server = MockServer::start();
    token_mock(&server);
    let put = server.mock(|when, then| {
        when.method(PUT).path("/raw/landing/vidclub/jobs.tsv");
        then.status(201);
    });
    server.mock(|when, then| {
        when.method(PATCH).path("/raw/landing/vidclub/jobs.tsv");
        then.status(200);
    });

    let storage = AdlsStorage::new(adls(&server), "/landing/", true);
    storage
        .write_file("vidclub/jobs.tsv", b"id\n1\n")
        .await
        .unwrap();

    put.assert();
    assert_eq!(
        storage.location("vidclub/jobs.tsv"),
        format!("{}/raw/landing/vidclub/jobs.tsv", server.base_url())
    );
}

#[tokio::test]
async fn test_service_principal_from_key_vault() {
    let server = MockServer::start();
    token_mock(&server);
    server.mock(|when, then| {
        when.method(GET).path("/vault/secrets/lake-sp");
        then.status(200).json_body(json!({
            "value": "{\"AZURE_TENANT_ID\": \"t2\", \"AZURE_CLIENT_ID\": \"c2\", \"AZURE_CLIENT_SECRET\": \"s2\", \"ACCOUNT_NAME\": \"lake2\"}"
        }));
    });

    let vault = KeyVaultClient::new(Client::new(), server.url("/vault"), tokens(&server))
        .with_retry(HttpRetry::none());
    let sp: AzureCredentials = resolve_credentials(&vault, "lake-sp").await.unwrap();

    assert_eq!(sp.tenant_id, "t2");
    assert_eq!(sp.account_name.as_deref(), Some("lake2"));
    assert!(!format!("{:?}", sp).contains("s2"));
}
