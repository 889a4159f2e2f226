//! Project management and project cache integration tests.

mod common;

use common::TestApp;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
#[serial]
async fn admin_creates_project_with_defaults() {
    let app = spawn_app!();
    let name = TestApp::unique_name("alpha");

    let response = app
        .post(
            "/projects/create",
            &app.admin.access_token,
            json!({ "name": name, "description": "First project" }),
        )
        .await;

    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["name"], name);
    assert_eq!(body["description"], "First project");
    assert_eq!(body["status"], "active");
    assert_eq!(body["created_by"], app.admin.id.to_string());
}

#[tokio::test]
#[serial]
async fn non_admin_cannot_create_project() {
    let app = spawn_app!();
    let user = app.create_user(false).await;

    let response = app
        .post(
            "/projects/create",
            &user.access_token,
            json!({ "name": "Not allowed" }),
        )
        .await;

    assert_status!(response, 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ADMIN_REQUIRED");
}

#[tokio::test]
#[serial]
async fn duplicate_project_name_is_forbidden() {
    let app = spawn_app!();
    let name = TestApp::unique_name("dup");
    app.create_project(&name).await;

    let response = app
        .post(
            "/projects/create",
            &app.admin.access_token,
            json!({ "name": name }),
        )
        .await;

    assert_status!(response, 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "PROJECT_EXISTS");
}

#[tokio::test]
#[serial]
async fn overlong_description_is_rejected() {
    let app = spawn_app!();

    let response = app
        .post(
            "/projects/create",
            &app.admin.access_token,
            json!({ "name": "Verbose", "description": "x".repeat(101) }),
        )
        .await;

    assert_status!(response, 400);
}

// ============================================================================
// Cached reads
// ============================================================================

#[tokio::test]
#[serial]
async fn project_detail_is_served_from_cache_on_repeat() {
    let app = spawn_app!();
    let user = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("cached")).await;
    let path = format!("/projects/{}", project_id);

    let first = app.get(&path, &user.access_token).await;
    assert_status!(first, 200);
    assert_eq!(first.headers().get("x-cache").unwrap(), "miss");
    let first_body = first.text().await.unwrap();

    let second = app.get(&path, &user.access_token).await;
    assert_status!(second, 200);
    assert_eq!(second.headers().get("x-cache").unwrap(), "hit");
    assert_eq!(second.text().await.unwrap(), first_body);
}

#[tokio::test]
#[serial]
async fn cached_project_stays_stale_after_update() {
    let app = spawn_app!();
    let original = TestApp::unique_name("before");
    let project_id = app.create_project(&original).await;
    let path = format!("/projects/{}", project_id);

    let response = app.get(&path, &app.admin.access_token).await;
    assert_status!(response, 200);

    let renamed = TestApp::unique_name("after");
    let response = app
        .put(&path, &app.admin.access_token, json!({ "name": renamed }))
        .await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], renamed);

    let response = app.get(&path, &app.admin.access_token).await;
    assert_eq!(response.headers().get("x-cache").unwrap(), "hit");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], original);
}

#[tokio::test]
#[serial]
async fn project_list_is_cached_without_store_reads() {
    let app = spawn_app!();
    let project_id = app.create_project(&TestApp::unique_name("listed")).await;

    let first = app.get("/projects/all", &app.admin.access_token).await;
    assert_status!(first, 200);
    assert_eq!(first.headers().get("x-cache").unwrap(), "miss");
    let first_body = first.text().await.unwrap();

    app.rename_project_in_store(project_id, "renamed behind the cache");

    let second = app.get("/projects/all", &app.admin.access_token).await;
    assert_eq!(second.headers().get("x-cache").unwrap(), "hit");
    assert_eq!(second.text().await.unwrap(), first_body);
}

#[tokio::test]
#[serial]
async fn missing_project_is_not_cached() {
    let app = spawn_app!();
    let path = format!("/projects/{}", Uuid::new_v4());

    for _ in 0..2 {
        let response = app.get(&path, &app.admin.access_token).await;
        assert_status!(response, 404);
        assert!(response.headers().get("x-cache").is_none());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "PROJECT_NOT_FOUND");
    }
}

// ============================================================================
// Update and delete
// ============================================================================

#[tokio::test]
#[serial]
async fn update_is_partial_and_checks_name_collisions() {
    let app = spawn_app!();
    let taken = TestApp::unique_name("taken");
    app.create_project(&taken).await;
    let project_id = app.create_project(&TestApp::unique_name("mine")).await;
    let path = format!("/projects/{}", project_id);

    let response = app
        .put(&path, &app.admin.access_token, json!({ "status": "on-hold" }))
        .await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "on-hold");
    assert_eq!(body["description"], "Test project");

    let response = app
        .put(&path, &app.admin.access_token, json!({ "name": taken }))
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn update_and_delete_of_missing_project_return_not_found() {
    let app = spawn_app!();
    let path = format!("/projects/{}", Uuid::new_v4());

    let response = app
        .put(&path, &app.admin.access_token, json!({ "name": "ghost" }))
        .await;
    assert_status!(response, 404);

    let response = app.delete(&path, &app.admin.access_token).await;
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn delete_project_removes_tasks_and_memberships() {
    let app = spawn_app!();
    let member = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("doomed")).await;
    app.add_member(project_id, &member).await;
    app.create_task(project_id, "Short lived", &member).await;

    let response = app
        .delete(&format!("/projects/{}", project_id), &app.admin.access_token)
        .await;
    assert_status!(response, 204);

    let response = app
        .delete(&format!("/users/delete/{}", member.id), &app.admin.access_token)
        .await;
    assert_status!(response, 204);
}

#[tokio::test]
#[serial]
async fn non_admin_cannot_update_or_delete_project() {
    let app = spawn_app!();
    let leader = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("guarded")).await;
    app.assign_leader(project_id, &leader).await;
    let path = format!("/projects/{}", project_id);

    let response = app
        .put(&path, &leader.access_token, json!({ "name": "hijacked" }))
        .await;
    assert_status!(response, 403);

    let response = app.delete(&path, &leader.access_token).await;
    assert_status!(response, 403);
}

// ============================================================================
// Leaders
// ============================================================================

#[tokio::test]
#[serial]
async fn assign_leader_creates_leader_membership() {
    let app = spawn_app!();
    let user = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("led")).await;

    let response = app
        .post(
            &format!("/projects/{}/members/assign-leader", project_id),
            &app.admin.access_token,
            json!({ "user_id": user.id }),
        )
        .await;

    assert_status!(response, 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "leader");
    assert_eq!(body["user_id"], user.id.to_string());
    assert_eq!(body["project_id"], project_id.to_string());
}

#[tokio::test]
#[serial]
async fn assign_leader_validates_targets_and_caller() {
    let app = spawn_app!();
    let user = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("checks")).await;

    let response = app
        .post(
            &format!("/projects/{}/members/assign-leader", Uuid::new_v4()),
            &app.admin.access_token,
            json!({ "user_id": user.id }),
        )
        .await;
    assert_status!(response, 404);

    let response = app
        .post(
            &format!("/projects/{}/members/assign-leader", project_id),
            &app.admin.access_token,
            json!({ "user_id": Uuid::new_v4() }),
        )
        .await;
    assert_status!(response, 404);

    let response = app
        .post(
            &format!("/projects/{}/members/assign-leader", project_id),
            &user.access_token,
            json!({ "user_id": user.id }),
        )
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn member_promoted_to_leader_gains_leader_rights() {
    let app = spawn_app!();
    let user = app.create_user(false).await;
    let other = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("promo")).await;
    app.add_member(project_id, &user).await;
    app.assign_leader(project_id, &user).await;

    let response = app
        .post(
            &format!("/projects/{}/add-member", project_id),
            &user.access_token,
            json!({ "user_id": other.id }),
        )
        .await;

    assert_status!(response, 201);
}
