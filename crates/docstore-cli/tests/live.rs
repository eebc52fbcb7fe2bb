//! CLI integration tests against a real MongoDB server.
//!
//! These tests are opt-in and require an environment variable:
//! - DOCSTORE_TEST_MONGODB_URL: a connection string for a disposable server
//!
//! Tests are skipped if it is not set. They work in the `docstore_test`
//! database and drop what they create.

mod common;

use serde_json::Value;
use tempfile::TempDir;

use common::{get_test_url, run_cli_success};

const TEST_DATABASE: &str = "docstore_test";
const TEST_COLLECTION: &str = "cli_memory";

#[test]
fn test_memory_lifecycle() {
    let Some(url) = get_test_url() else {
        eprintln!("Skipping test_memory_lifecycle: DOCSTORE_TEST_MONGODB_URL not set");
        return;
    };
    let home = TempDir::new().unwrap();
    let cli = |args: &[&str]| {
        let mut full = vec![
            "--url",
            url.as_str(),
            "--database",
            TEST_DATABASE,
        ];
        full.extend_from_slice(args);
        run_cli_success(&full, home.path())
    };

    cli(&["memory", "--collection", TEST_COLLECTION, "drop"]);

    cli(&[
        "memory",
        "--collection",
        TEST_COLLECTION,
        "upsert",
        "--id",
        "m1",
        "--user",
        "alice",
        r#"{"likes": "tea"}"#,
    ]);

    let exists = cli(&["memory", "--collection", TEST_COLLECTION, "exists", "m1"]);
    assert_eq!(exists.trim(), "true");

    let listed = cli(&["memory", "--collection", TEST_COLLECTION, "list", "--user", "alice"]);
    let records: Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(records[0]["memory"]["likes"], "tea");

    let sketch = cli(&["describe", TEST_COLLECTION]);
    let catalog: Value = serde_json::from_str(&sketch).unwrap();
    assert_eq!(catalog[TEST_COLLECTION]["memory"], "object");

    let query = format!(
        r#"{{"collection_name": "{}", "distinct": "user_id"}}"#,
        TEST_COLLECTION
    );
    let values: Value = serde_json::from_str(&cli(&["query", &query])).unwrap();
    assert_eq!(values, serde_json::json!(["alice"]));

    cli(&["memory", "--collection", TEST_COLLECTION, "clear"]);
    let listed = cli(&["memory", "--collection", TEST_COLLECTION, "list"]);
    assert_eq!(listed.trim(), "[]");

    cli(&["memory", "--collection", TEST_COLLECTION, "drop"]);
    let exists = cli(&["memory", "--collection", TEST_COLLECTION, "table-exists"]);
    assert_eq!(exists.trim(), "false");
}
