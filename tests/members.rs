//! Project membership integration tests.

mod common;

use common::TestApp;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn leader_adds_member_with_default_role() {
    let app = spawn_app!();
    let leader = app.create_user(false).await;
    let newcomer = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("team")).await;
    app.assign_leader(project_id, &leader).await;

    let response = app
        .post(
            &format!("/projects/{}/add-member", project_id),
            &leader.access_token,
            json!({ "user_id": newcomer.id }),
        )
        .await;

    assert_status!(response, 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "member");
    assert_eq!(body["username"], newcomer.username);
}

#[tokio::test]
#[serial]
async fn plain_member_cannot_manage_members() {
    let app = spawn_app!();
    let member = app.create_user(false).await;
    let other = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("flat")).await;
    app.add_member(project_id, &member).await;
    app.add_member(project_id, &other).await;

    let response = app
        .post(
            &format!("/projects/{}/add-member", project_id),
            &member.access_token,
            json!({ "user_id": Uuid::new_v4() }),
        )
        .await;
    assert_status!(response, 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "LEADER_REQUIRED");

    let response = app
        .delete(
            &format!("/projects/{}/remove-member/{}", project_id, other.id),
            &member.access_token,
        )
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn adding_existing_member_conflicts() {
    let app = spawn_app!();
    let member = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("twice")).await;
    app.add_member(project_id, &member).await;

    let response = app
        .post(
            &format!("/projects/{}/add-member", project_id),
            &app.admin.access_token,
            json!({ "user_id": member.id }),
        )
        .await;

    assert_status!(response, 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ALREADY_MEMBER");
}

#[tokio::test]
#[serial]
async fn adding_to_missing_project_or_user_returns_not_found() {
    let app = spawn_app!();
    let user = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("lookup")).await;

    let response = app
        .post(
            &format!("/projects/{}/add-member", Uuid::new_v4()),
            &app.admin.access_token,
            json!({ "user_id": user.id }),
        )
        .await;
    assert_status!(response, 404);

    let response = app
        .post(
            &format!("/projects/{}/add-member", project_id),
            &app.admin.access_token,
            json!({ "user_id": Uuid::new_v4() }),
        )
        .await;
    assert_status!(response, 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn members_list_is_visible_to_members_only() {
    let app = spawn_app!();
    let member = app.create_user(false).await;
    let outsider = app.create_user(false).await;
    let leader = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("roster")).await;
    app.assign_leader(project_id, &leader).await;
    app.add_member(project_id, &member).await;
    let path = format!("/projects/{}/members", project_id);

    let response = app.get(&path, &member.access_token).await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pagination"]["total_count"], 2);
    let roles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert!(roles.contains(&"leader"));
    assert!(roles.contains(&"member"));

    let response = app.get(&path, &outsider.access_token).await;
    assert_status!(response, 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_A_MEMBER");

    let response = app.get(&path, &app.admin.access_token).await;
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn removing_member_unassigns_their_tasks() {
    let app = spawn_app!();
    let leader = app.create_user(false).await;
    let member = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("churn")).await;
    app.assign_leader(project_id, &leader).await;
    app.add_member(project_id, &member).await;
    let task_id = app.create_task(project_id, "Orphaned soon", &member).await;

    let response = app
        .delete(
            &format!("/projects/{}/remove-member/{}", project_id, member.id),
            &leader.access_token,
        )
        .await;
    assert_status!(response, 204);

    let response = app
        .get(
            &format!("/projects/{}/tasks/{}", project_id, task_id),
            &leader.access_token,
        )
        .await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["assigned_to"].is_null());
    assert!(body["assigned_to_user"].is_null());
}

#[tokio::test]
#[serial]
async fn removing_non_member_returns_not_found() {
    let app = spawn_app!();
    let stranger = app.create_user(false).await;
    let project_id = app.create_project(&TestApp::unique_name("empty")).await;

    let response = app
        .delete(
            &format!("/projects/{}/remove-member/{}", project_id, stranger.id),
            &app.admin.access_token,
        )
        .await;

    assert_status!(response, 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MEMBERSHIP_NOT_FOUND");
}
