mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::json;

use common::{add_member, call, signup};

#[tokio::test]
async fn team_organization_lifecycle() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "owner@example.com").await?;

    let (status, body) = call(
        &server,
        &owner,
        Method::POST,
        "/api/organizations",
        Some(json!({ "name": "Harbor Survey", "slug": "harbor-survey" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "harbor-survey");
    assert_eq!(body["data"]["isPersonal"], false);
    let org_id = body["data"]["id"].as_str().unwrap_or_default().to_string();

    // Same slug again
    let (status, _) = call(
        &server,
        &owner,
        Method::POST,
        "/api/organizations",
        Some(json!({ "name": "Other", "slug": "harbor-survey" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&server, &owner, Method::GET, "/api/organizations/list", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    let (status, body) = call(
        &server,
        &owner,
        Method::PATCH,
        &format!("/api/organizations/{}", org_id),
        Some(json!({ "name": "Harbor Survey Ltd" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Harbor Survey Ltd");
    Ok(())
}

#[tokio::test]
async fn invalid_slug_is_rejected() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "slugs@example.com").await?;

    let (status, body) = call(
        &server,
        &owner,
        Method::POST,
        "/api/organizations",
        Some(json!({ "name": "Bad", "slug": "Not_Valid!" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn outsiders_cannot_see_an_organization() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "alice@example.com").await?;
    let outsider = signup(&server, "mallory@example.com").await?;

    let (status, body) = call(
        &server,
        &outsider,
        Method::GET,
        &format!("/api/organizations/{}/members", owner.workspace_id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn invite_accept_and_membership_revocation() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "lead@example.com").await?;
    let member = signup(&server, "crew@example.com").await?;
    let org = &owner.workspace_id;

    add_member(&server, &owner, org, &member, "member").await?;

    let (status, body) = call(&server, &member, Method::GET, &format!("/api/organizations/{}/members", org), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    // Plain members cannot invite
    let (status, _) = call(
        &server,
        &member,
        Method::POST,
        &format!("/api/organizations/{}/invites", org),
        Some(json!({ "email": "someone@example.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &server,
        &owner,
        Method::DELETE,
        &format!("/api/organizations/{}/members/{}", org, member.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Removal takes effect on the very next request
    let (status, _) = call(&server, &member, Method::GET, &format!("/api/organizations/{}", org), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn invite_must_match_session_email() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "host@example.com").await?;
    let other = signup(&server, "guest@example.com").await?;

    let (status, body) = call(
        &server,
        &owner,
        Method::POST,
        &format!("/api/organizations/{}/invites", owner.workspace_id),
        Some(json!({ "email": "someone-else@example.com", "role": "member" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["data"]["token"].as_str().unwrap_or_default().to_string();
    assert!(body["data"].get("tokenHash").is_none());

    let (status, _) = call(&server, &other, Method::POST, "/api/invites/accept", Some(json!({ "token": token }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &server,
        &other,
        Method::POST,
        "/api/invites/accept",
        Some(json!({ "token": "0".repeat(64) })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn last_owner_is_protected() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "solo@example.com").await?;
    let org = &owner.workspace_id;

    let (status, _) = call(
        &server,
        &owner,
        Method::PATCH,
        &format!("/api/organizations/{}/members/{}", org, owner.id),
        Some(json!({ "role": "admin" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &server,
        &owner,
        Method::DELETE,
        &format!("/api/organizations/{}/members/{}", org, owner.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // With a second owner the first may step down
    let second = signup(&server, "deputy@example.com").await?;
    add_member(&server, &owner, org, &second, "owner").await?;
    let (status, body) = call(
        &server,
        &owner,
        Method::PATCH,
        &format!("/api/organizations/{}/members/{}", org, owner.id),
        Some(json!({ "role": "admin" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "admin");
    Ok(())
}

#[tokio::test]
async fn admins_cannot_touch_owners() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "boss@example.com").await?;
    let admin = signup(&server, "manager@example.com").await?;
    let org = &owner.workspace_id;
    add_member(&server, &owner, org, &admin, "admin").await?;

    let (status, _) = call(
        &server,
        &admin,
        Method::DELETE,
        &format!("/api/organizations/{}/members/{}", org, owner.id),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &server,
        &admin,
        Method::POST,
        &format!("/api/organizations/{}/invites", org),
        Some(json!({ "email": "new-owner@example.com", "role": "owner" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn pending_invites_count_as_seats() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "seats@example.com").await?;
    let path = format!("/api/organizations/{}/invites", owner.workspace_id);

    // Free plan: 3 seats, the owner holds one
    for n in 0..2 {
        let (status, _) = call(
            &server,
            &owner,
            Method::POST,
            &path,
            Some(json!({ "email": format!("seat{}@example.com", n) })),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call(&server, &owner, Method::POST, &path, Some(json!({ "email": "seat9@example.com" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "LIMIT_EXCEEDED");
    assert_eq!(body["dimension"], "seats");

    let (_, body) = call(&server, &owner, Method::GET, &path, None).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn license_and_delete_are_operator_only() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "customer@example.com").await?;
    let operator = signup(&server, common::OPERATOR_EMAIL).await?;
    let org = &owner.workspace_id;

    let (status, _) = call(
        &server,
        &owner,
        Method::PATCH,
        &format!("/api/organizations/{}/license", org),
        Some(json!({ "planCode": "team" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &server,
        &operator,
        Method::PATCH,
        &format!("/api/organizations/{}/license", org),
        Some(json!({ "planCode": "team", "subscriptionStatus": "active" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["planCode"], "team");

    let (status, _) = call(
        &server,
        &operator,
        Method::PATCH,
        &format!("/api/organizations/{}/license", org),
        Some(json!({ "planCode": "platinum" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(&server, &owner, Method::GET, &format!("/api/organizations/{}/usage", org), None).await?;
    assert_eq!(body["data"]["planCode"], "team");

    let (status, _) = call(&server, &operator, Method::DELETE, &format!("/api/organizations/{}", org), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&server, &owner, Method::GET, "/api/organizations/list", None).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn owners_delete_their_organization_members_cannot() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "founder@example.com").await?;
    let member = signup(&server, "staff@example.com").await?;
    let org = owner.workspace_id.clone();
    add_member(&server, &owner, &org, &member, "admin").await?;

    let (status, body) = call(&server, &member, Method::DELETE, &format!("/api/organizations/{}", org), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = call(&server, &owner, Method::DELETE, &format!("/api/organizations/{}", org), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&server, &member, Method::GET, &format!("/api/organizations/{}", org), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn reinviting_a_pending_email_conflicts() -> Result<()> {
    let server = common::start_server().await?;
    let owner = signup(&server, "twice@example.com").await?;
    let path = format!("/api/organizations/{}/invites", owner.workspace_id);

    let (status, _) = call(&server, &owner, Method::POST, &path, Some(json!({ "email": "pal@example.com" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&server, &owner, Method::POST, &path, Some(json!({ "email": "PAL@example.com" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&server, &owner, Method::GET, &path, None).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}
