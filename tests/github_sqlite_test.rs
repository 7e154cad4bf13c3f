use datalake_etl::adapters::github::GitHubClient;
use datalake_etl::adapters::http::HttpRetry;
use datalake_etl::adapters::sqlite::{IfExists, SqliteLoader};
use datalake_etl::app::tasks::{run_task, DownloadGitHubFile, FileFormat, SqliteInsert, TaskPolicy};
use datalake_etl::{EtlError, IfEmpty};
use httpmock::prelude::*;
use reqwest::Client;
use sqlx::Row;
use std::time::Duration;
use tempfile::TempDir;

fn policy() -> TaskPolicy {
    TaskPolicy {
        max_retries: 1,
        retry_delay: Duration::from_millis(5),
        timeout: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn test_download_github_file_to_disk() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/octo/pipelines/contents/sql/jobs.sql")
            .query_param("ref", "main");
        then.status(200).body("SELECT * FROM jobs;\n");
    });

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested/jobs.sql");
    let client = GitHubClient::new(Client::new(), None)
        .with_api_url(server.base_url())
        .with_retry(HttpRetry::none());
    let task = DownloadGitHubFile::new(
        client,
        "octo/pipelines",
        "/sql/jobs.sql",
        "main",
        &target,
        policy(),
    );

    let saved = run_task(&task).await.unwrap();

    mock.assert();
    assert_eq!(saved, target);
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "SELECT * FROM jobs;\n"
    );
}

#[tokio::test]
async fn test_github_server_errors_are_retried_by_the_task() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/octo/pipelines/contents/a.txt");
        then.status(502);
    });

    let dir = TempDir::new().unwrap();
    let client = GitHubClient::new(Client::new(), None)
        .with_api_url(server.base_url())
        .with_retry(HttpRetry::none());
    let task = DownloadGitHubFile::new(
        client,
        "octo/pipelines",
        "a.txt",
        "main",
        dir.path().join("a.txt"),
        policy(),
    );

    let err = run_task(&task).await.unwrap_err();

    assert!(matches!(err, EtlError::ApiError { status: 502, .. }));
    mock.assert_hits(2);
}

#[tokio::test]
async fn test_load_csv_file_into_sqlite() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("jobs.csv");
    std::fs::write(&input, "id,title\n1,Barista\n2,\"Chef, senior\"\n").unwrap();
    let database = dir.path().join("etl.db").to_string_lossy().to_string();

    let data = std::fs::read(&input).unwrap();
    let frame = FileFormat::from_path(&input.to_string_lossy())
        .unwrap()
        .parse(&data, None)
        .unwrap();

    let task = SqliteInsert::new(
        database.clone(),
        "jobs",
        frame.clone(),
        IfExists::Replace,
        IfEmpty::Warn,
        policy(),
    );
    assert_eq!(run_task(&task).await.unwrap(), 2);

    let append = SqliteInsert::new(
        database.clone(),
        "jobs",
        frame,
        IfExists::Append,
        IfEmpty::Warn,
        policy(),
    );
    assert_eq!(run_task(&append).await.unwrap(), 2);

    let loader = SqliteLoader::connect(&database).await.unwrap();
    let row = sqlx::query("SELECT COUNT(*) AS n, MAX(title) AS last FROM jobs")
        .fetch_one(loader.pool())
        .await
        .unwrap();
    let count: i64 = row.try_get("n").unwrap();
    let last: String = row.try_get("last").unwrap();
    assert_eq!(count, 4);
    assert_eq!(last, "Chef, senior");
}

#[tokio::test]
async fn test_load_json_lines_into_sqlite() {
    let dir = TempDir::new().unwrap();
    let frame = FileFormat::from_path("events.jsonl")
        .unwrap()
        .parse(b"{\"id\": 1, \"tags\": [\"a\"]}\n{\"id\": 2, \"tags\": null}\n", None)
        .unwrap();

    let loader = SqliteLoader::connect(&dir.path().join("events.db").to_string_lossy())
        .await
        .unwrap();
    loader
        .load_frame("events", &frame, IfExists::Fail, IfEmpty::Fail)
        .await
        .unwrap();

    let rows = sqlx::query("SELECT tags FROM events ORDER BY id")
        .fetch_all(loader.pool())
        .await
        .unwrap();
    let first: Option<String> = rows[0].try_get("tags").unwrap();
    let second: Option<String> = rows[1].try_get("tags").unwrap();
    assert_eq!(first.as_deref(), Some("[\"a\"]"));
    assert!(second.is_none());
}
