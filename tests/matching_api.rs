//! Integration tests for the matching REST surface.
//!
//! Each test spins up an Axum server on a random port backed by an in-memory
//! database, and drives it over HTTP with reqwest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use circles::config::MatchingConfig;
use circles::matching::{MatchingEngine, matching_routes};
use circles::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn start_server() -> (String, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let engine = Arc::new(MatchingEngine::new(Arc::clone(&db), MatchingConfig::default()));
    let app = matching_routes(engine, true);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), db)
}

/// Birth year/month for a child `age` months old today.
fn born_months_ago(age: i32) -> (i32, u32) {
    let today = Utc::now().date_naive();
    let idx = today.year() * 12 + today.month() as i32 - age - 1;
    (idx / 12, (idx % 12 + 1) as u32)
}

async fn put_user(client: &reqwest::Client, base: &str, id: &str, city: &str, state: &str, age: i32) {
    let (year, month) = born_months_ago(age);
    let resp = client
        .put(format!("{base}/api/users/{id}"))
        .json(&json!({
            "name": format!("{id} Dad"),
            "location": {"city": city, "state_code": state},
            "children": [{"type": "existing", "birth_month": month, "birth_year": year}],
            "matching_eligible": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (base, _db) = start_server().await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn run_then_inspect_groups_and_stats() {
    timeout(TEST_TIMEOUT, async {
        let (base, _db) = start_server().await;
        let client = reqwest::Client::new();

        for (i, age) in [10, 11, 12, 13, 14].iter().enumerate() {
            put_user(&client, &base, &format!("a{i}"), "Austin", "TX", *age).await;
        }
        put_user(&client, &base, "miami", "Miami", "FL", 12).await;

        let resp = client
            .post(format!("{base}/api/matching/run"))
            .json(&json!({"city": "Austin", "state_code": "TX", "test_mode": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let run: Value = resp.json().await.unwrap();
        assert_eq!(run["groups_created"], 1);
        assert_eq!(run["users_matched"], 5);
        assert_eq!(run["users_unmatched"], 0);
        assert_eq!(run["groups"][0]["name"], "Austin Infant Dads - Group 1");
        let group_id = run["groups"][0]["id"].as_str().unwrap().to_string();

        let group: Value = client
            .get(format!("{base}/api/groups/{group_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(group["status"], "pending");
        assert_eq!(group["test_mode"], true);
        assert_eq!(group["member_ids"].as_array().unwrap().len(), 5);

        let stats: Value = client
            .get(format!("{base}/api/matching/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["total_users"], 6);
        assert_eq!(stats["matched_users"], 5);
        assert_eq!(stats["by_location"]["Miami, FL"]["unmatched"], 1);
        assert_eq!(stats["by_location"]["Austin, TX"]["by_life_stage"]["Infant"], 5);

        // Re-running over the same data forms nothing new.
        let again: Value = client
            .post(format!("{base}/api/matching/run"))
            .json(&json!({}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["groups_created"], 0);

        let groups: Value = client
            .get(format!("{base}/api/groups"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(groups.as_array().unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn partial_location_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        let client = reqwest::Client::new();
        for i in 0..4 {
            put_user(&client, &base, &format!("u{i}"), "Austin", "TX", 10 + i).await;
        }

        let resp = client
            .post(format!("{base}/api/matching/run"))
            .json(&json!({"state_code": "TX"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(db.list_groups().await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sweep_matches_every_ready_location() {
    timeout(TEST_TIMEOUT, async {
        let (base, _db) = start_server().await;
        let client = reqwest::Client::new();
        for i in 0..4 {
            put_user(&client, &base, &format!("a{i}"), "Austin", "TX", 24 + i).await;
            put_user(&client, &base, &format!("d{i}"), "Denver", "CO", 2 + i / 2).await;
        }

        let body: Value = client
            .post(format!("{base}/api/matching/sweep"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let runs = body["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r["result"]["groups_created"] == 1));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn deactivate_and_unassign() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        let client = reqwest::Client::new();
        for i in 0..4 {
            put_user(&client, &base, &format!("u{i}"), "Austin", "TX", 10 + i).await;
        }
        let run: Value = client
            .post(format!("{base}/api/matching/run"))
            .json(&json!({"test_mode": false}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let group_id = run["groups"][0]["id"].as_str().unwrap().to_string();

        let resp = client
            .post(format!("{base}/api/groups/{group_id}/deactivate"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let group: Value = client
            .get(format!("{base}/api/groups/{group_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(group["status"], "inactive");

        let body: Value = client
            .delete(format!("{base}/api/users/u2/group"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["cleared"], true);
        let user = db.get_user("u2").await.unwrap().unwrap();
        assert!(user.group_id.is_none());
        assert!(user.matched_at.is_none());

        // Group membership history is left as committed.
        let group = db
            .get_group(group_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(group.member_ids.contains(&"u2".to_string()));

        // A re-onboarding hand-off never reassigns an existing match.
        put_user(&client, &base, "u1", "Austin", "TX", 11).await;
        let u1 = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(u1.group_id.map(|id| id.to_string()), Some(group_id));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn onboarding_hand_off_validation() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        let client = reqwest::Client::new();

        // Eligible without any child data.
        let resp = client
            .put(format!("{base}/api/users/u1"))
            .json(&json!({
                "location": {"city": "Austin", "state_code": "TX"},
                "matching_eligible": true
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(db.get_user("u1").await.unwrap().is_none());

        // Group fields in the body are ignored.
        let body: Value = client
            .put(format!("{base}/api/users/u2"))
            .json(&json!({
                "name": "Sam",
                "location": {"city": "Austin", "state_code": "TX"},
                "children": [{"type": "expecting", "birth_month": 8, "birth_year": 2025}],
                "matching_eligible": true,
                "group_id": "9b2f3c1e-0000-4000-8000-000000000000"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["id"], "u2");
        assert!(body["group_id"].is_null());
        assert_eq!(body["matching_eligible"], true);

        // Child dates outside the calendar are refused.
        for child in [
            json!({"type": "existing", "birth_month": 13, "birth_year": 2024}),
            json!({"type": "existing", "birth_month": 0, "birth_year": 2024}),
            json!({"type": "expecting", "birth_month": 1, "birth_year": 2_000_000_000}),
        ] {
            let resp = client
                .put(format!("{base}/api/users/u3"))
                .json(&json!({
                    "location": {"city": "Austin", "state_code": "TX"},
                    "children": [child],
                    "matching_eligible": true
                }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
        }
        assert!(db.get_user("u3").await.unwrap().is_none());

        // Stats still answer with a stored user present.
        let resp = client
            .get(format!("{base}/api/matching/stats"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn not_found_and_bad_ids() {
    timeout(TEST_TIMEOUT, async {
        let (base, _db) = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{base}/api/groups/not-a-uuid"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .get(format!("{base}/api/groups/{}", uuid::Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .post(format!("{base}/api/groups/{}/deactivate", uuid::Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .delete(format!("{base}/api/users/ghost/group"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "User not found");
    })
    .await
    .expect("test timed out");
}
