//! Integration tests for the control API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Each test gets its own temporary database and
//! backup directory, and hardware that records pulses and pauses instead
//! of driving a servo or sleeping.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use points_core::{
    Hardware, MockPwm, Pacer, PointCollection, PointId, RecordingPacer, ServoPulse,
    position_to_pulse,
};
use points_server::{AppState, build_router};
use points_store::PointStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "yardmaster:let-me-in";

struct Harness {
    dir: TempDir,
    database: PathBuf,
    router: Router,
    pwm: Arc<MockPwm>,
    id: PointId,
}

impl Harness {
    fn database(&self) -> &Path {
        &self.database
    }

    fn backups(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    async fn send(&self, method: &str, uri: &str) -> (StatusCode, Value) {
        self.send_with(method, uri, Some(SECRET), Body::empty()).await
    }

    async fn send_with(
        &self,
        method: &str,
        uri: &str,
        credential: Option<&str>,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(credential) = credential {
            let encoded = STANDARD.encode(credential);
            builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

/// One point on channel 4, calibrated to the full travel.
fn harness() -> Harness {
    harness_with_database("points.json")
}

/// Like [`harness`], with the database at `relative` inside the temp dir.
fn harness_with_database(relative: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let backups = dir.path().join("backups");
    fs::create_dir(&backups).unwrap();
    let database = dir.path().join(relative);
    let store = PointStore::open(&database, backups).unwrap();

    let pwm = Arc::new(MockPwm::new());
    let hardware = Hardware::new(
        Arc::clone(&pwm) as Arc<dyn ServoPulse>,
        Arc::new(RecordingPacer::new()) as Arc<dyn Pacer>,
    );
    let mut points = PointCollection::new(hardware);
    let id = points.add(Some(4), Some("Junction")).unwrap().id().clone();
    let point = points.get_mut(&id).unwrap();
    point.set_left(-1.0).unwrap();
    point.set_right(1.0).unwrap();

    let state = Arc::new(AppState::new(points, store, SECRET));
    Harness {
        dir,
        database,
        router: build_router(state),
        pwm,
        id,
    }
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn missing_credential_is_rejected_before_any_state_change() {
    let h = harness();
    let uri = format!("/point/{}/enable", h.id);
    let (status, body) = h.send_with("PUT", &uri, None, Body::empty()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert!(!h.database().exists());

    let (_, points) = h.send("GET", "/points").await;
    assert_eq!(points[h.id.to_string()]["enabled"], false);
}

#[tokio::test]
async fn wrong_credential_is_rejected() {
    let h = harness();
    let (status, _) = h
        .send_with("GET", "/points", Some("yardmaster:guess"), Body::empty())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_paths_also_require_credential() {
    let h = harness();
    let (status, _) = h
        .send_with("GET", "/no/such/thing", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.send("GET", "/no/such/thing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_method_is_not_found() {
    let h = harness();
    let (status, _) = h.send("POST", "/points").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =========================================================================
// Reads
// =========================================================================

#[tokio::test]
async fn list_points_returns_snapshot() {
    let h = harness();
    let (status, body) = h.send("GET", "/points").await;

    assert_eq!(status, StatusCode::OK);
    let point = &body[h.id.to_string()];
    assert_eq!(point["port"], 4);
    assert_eq!(point["name"], "Junction");
    assert_eq!(point["deltaT"], json!(0.02));
    assert_eq!(point["pointType"], "left");
}

#[tokio::test]
async fn get_point_advertises_free_channels() {
    let h = harness();
    let (status, body) = h.send("GET", &format!("/point/{}", h.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["id"], h.id.to_string());
    let free = body["freeports"].as_array().unwrap();
    assert_eq!(free.len(), 15);
    assert!(!free.contains(&json!(4)));
}

#[tokio::test]
async fn get_unknown_point_is_not_found() {
    let h = harness();
    let (status, _) = h.send("GET", &format!("/point/{}", PointId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.send("GET", "/point/no-such-point").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_info_reports_usage() {
    let h = harness();
    let (status, body) = h.send("GET", "/server/info").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["points"], 1);
    assert_eq!(body["free_channels"].as_array().unwrap().len(), 15);
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn command_mutates_and_persists() {
    let h = harness();
    let (status, body) = h.send("PUT", &format!("/point/{}/enable", h.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["enabled"], true);
    assert_eq!(body["freeports"].as_array().unwrap().len(), 15);

    let stored: Value = serde_json::from_str(&fs::read_to_string(h.database()).unwrap()).unwrap();
    assert_eq!(stored[h.id.to_string()]["enabled"], true);
}

#[tokio::test]
async fn aliases_resolve_to_allow_listed_commands() {
    let h = harness();
    h.send("PUT", &format!("/point/{}/enable", h.id)).await;

    let (status, body) = h.send("PUT", &format!("/point/{}/left", h.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["current"], json!(-1.0));
    assert_eq!(h.pwm.last_pulse(4), Some(0));

    let (status, body) = h.send("PUT", &format!("/point/{}/speed/0.5", h.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["speed"], json!(0.5));

    let (status, body) = h.send("PUT", &format!("/point/{}/right", h.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["current"], json!(1.0));
    assert_eq!(h.pwm.last_pulse(4), Some(position_to_pulse(1.0)));
}

#[tokio::test]
async fn text_commands_take_decoded_arguments() {
    let h = harness();
    let (status, body) = h
        .send("PUT", &format!("/point/{}/setname/North%20Yard", h.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["name"], "North Yard");

    let (status, body) = h
        .send("PUT", &format!("/point/{}/setpointtype/wye", h.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["pointType"], "wye");
}

#[tokio::test]
async fn bad_arguments_are_not_found_and_change_nothing() {
    let h = harness();
    let (_, before) = h.send("GET", "/points").await;

    for uri in [
        format!("/point/{}/setleft/abc", h.id),
        format!("/point/{}/setleft/2", h.id),
        format!("/point/{}/setleft", h.id),
        format!("/point/{}/setdefault/sideways", h.id),
        format!("/point/{}/explode", h.id),
        format!("/point/{}/restore_raw", h.id),
        format!("/point/{}//0.5", h.id),
        format!("/point/{}/enable", PointId::new()),
    ] {
        let (status, body) = h.send("PUT", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body["error"].is_string());
    }

    let (_, after) = h.send("GET", "/points").await;
    assert_eq!(before, after);
    assert!(!h.database().exists());
}

#[tokio::test]
async fn setport_to_used_channel_conflicts() {
    let h = harness();
    let (status, _) = h.send("POST", "/points/add?channel=6").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.send("PUT", &format!("/point/{}/setport/6", h.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h.send("PUT", &format!("/point/{}/port/9", h.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["port"], 9);
}

#[tokio::test]
async fn save_overwrites_fields_from_body() {
    let h = harness();
    let body = Body::from(r#"{"_left": -0.7, "description": "raw\ttext"}"#);
    let (status, response) = h
        .send_with("PUT", &format!("/point/{}/save", h.id), Some(SECRET), body)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["point"]["left"], json!(-0.7));
    assert_eq!(response["point"]["description"], "raw\ttext");
}

#[tokio::test]
async fn failed_database_write_is_reported_and_state_kept() {
    let h = harness_with_database("missing/points.json");
    let (status, body) = h.send("PUT", &format!("/point/{}/enable", h.id)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
    assert!(body["error"].as_str().unwrap().contains("points.json"));
    assert!(!h.database().exists());

    // Memory is the source of truth; the server keeps serving.
    let (status, points) = h.send("GET", "/points").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(points[h.id.to_string()]["enabled"], true);
}

// =========================================================================
// Adding and removing points
// =========================================================================

#[tokio::test]
async fn add_point_uses_requested_or_lowest_channel() {
    let h = harness();
    let (status, body) = h.send("POST", "/points/add?channel=7&name=Yard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["port"], 7);
    assert_eq!(body["point"]["name"], "Yard");

    let (status, body) = h.send("POST", "/points/add").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point"]["port"], 0);
    assert_eq!(body["freeports"].as_array().unwrap().len(), 13);
}

#[tokio::test]
async fn add_point_rejects_bad_or_taken_channels() {
    let h = harness();
    let (status, _) = h.send("POST", "/points/add?channel=4").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = h.send("POST", "/points/add?channel=99").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.send("POST", "/points/add?channel=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_point_without_free_channel_conflicts() {
    let h = harness();
    for _ in 0..15 {
        let (status, _) = h.send("POST", "/points/add").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = h.send("POST", "/points/add").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_point_returns_remaining_collection() {
    let h = harness();
    let (_, added) = h.send("POST", "/points/add").await;
    let other = added["point"]["id"].as_str().unwrap().to_owned();

    let (status, body) = h.send("DELETE", &format!("/point/{other}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().unwrap().len(), 1);
    assert!(body.get(h.id.to_string()).is_some());
}

#[tokio::test]
async fn delete_last_point_is_forbidden() {
    let h = harness();
    let (status, _) = h.send("DELETE", &format!("/point/{}", h.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.send("DELETE", &format!("/point/{}", PointId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =========================================================================
// Backup and restore
// =========================================================================

#[tokio::test]
async fn backup_then_restore_reproduces_state() {
    let h = harness();
    let (_, original) = h.send("GET", "/points").await;

    let (status, body) = h.send("PUT", "/server/backup").await;
    assert_eq!(status, StatusCode::OK);
    let backup = body["backup"].as_str().unwrap().to_owned();

    h.send("PUT", &format!("/point/{}/setname/Changed", h.id)).await;
    h.send("POST", "/points/add").await;

    let (status, body) = h.send("PUT", &format!("/server/restore/{backup}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restored"], backup.as_str());
    assert_eq!(body["points"], original);

    let (_, now) = h.send("GET", "/points").await;
    assert_eq!(now, original);

    let (_, listed) = h.send("GET", "/server/backups").await;
    let listed = listed.as_object().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains_key(&backup));
    assert!(listed.contains_key(body["safety_backup"].as_str().unwrap()));
}

#[tokio::test]
async fn restore_unknown_backup_is_not_found() {
    let h = harness();
    for name in ["0123456789abcdef0123456789abcdef", "..%2Fpoints.json", "nope"] {
        let (status, _) = h.send("PUT", &format!("/server/restore/{name}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{name}");
    }
    let (_, listed) = h.send("GET", "/server/backups").await;
    assert!(listed.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn restore_of_corrupt_backup_fails_and_keeps_state() {
    let h = harness();
    let name = "0123456789abcdef0123456789abcdef";
    fs::write(h.backups().join(name), "{\"half\": ").unwrap();
    let (_, before) = h.send("GET", "/points").await;

    let (status, body) = h.send("PUT", &format!("/server/restore/{name}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let (_, after) = h.send("GET", "/points").await;
    assert_eq!(before, after);
    assert!(!h.database().exists());
}
