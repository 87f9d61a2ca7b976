//! Signup, login and the session profile.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::auth::{self, AuthError};
use crate::database::models::user::normalize_email;
use crate::database::models::{NewOrganization, NewUser, Organization, OrganizationWithRole, User};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::activity::ActivityEvent;
use crate::services::organizations::{self, is_plausible_email};
use crate::types::{ActivityAction, EntityType};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const FREE_PLAN: &str = "free";

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token plus who it belongs to. Signup also returns the new workspace.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_in: u64,
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Organization>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: AuthUser,
    pub is_operator: bool,
    pub organizations: Vec<OrganizationWithRole>,
}

fn session(state: &AppState, user: User, workspace: Option<Organization>) -> Result<Session, ApiError> {
    let token = auth::issue_session(&state.config.security, user.id, &user.email)?;
    Ok(Session {
        token,
        expires_in: state.config.security.session_expiry_hours * 3600,
        user,
        workspace,
    })
}

/// Creates the account and its personal workspace in one step
pub async fn signup(state: &AppState, input: SignupRequest) -> Result<Session, ApiError> {
    let email = normalize_email(&input.email);
    if !is_plausible_email(&email) {
        return Err(ApiError::invalid_field("email", "must be a valid email address"));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_field(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    let local_part = email.split('@').next().unwrap_or_default().to_string();
    let name = input
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or(local_part);

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let iterations = state.config.security.password_iterations;
    let password = input.password;
    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password, iterations))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Password hashing failed: {}", e)))??;

    let workspace = NewOrganization {
        name: format!("{}'s Workspace", name),
        slug: organizations::personal_slug(&email)?,
        is_personal: true,
        plan_code: FREE_PLAN.to_string(),
    };
    let (user, organization) = state
        .store
        .create_user_with_workspace(
            NewUser {
                email,
                name,
                password_hash: Some(password_hash),
            },
            workspace,
        )
        .await?;

    info!("New account {} with workspace {}", user.id, organization.slug);
    state.activity.record(
        ActivityEvent::new(
            organization.id,
            user.id,
            EntityType::Organization,
            organization.id,
            ActivityAction::Created,
        )
        .message(format!("Created {}", organization.name)),
    );

    session(state, user, Some(organization))
}

/// Unknown email and wrong password are indistinguishable to the caller
pub async fn login(state: &AppState, input: LoginRequest) -> Result<Session, ApiError> {
    let email = normalize_email(&input.email);
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    let stored = user.password_hash.clone().ok_or(AuthError::InvalidCredentials)?;

    let password = input.password;
    let verified = tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Password check failed: {}", e)))?;
    if !verified {
        return Err(AuthError::InvalidCredentials.into());
    }

    session(state, user, None)
}

pub async fn profile(state: &AppState, user: &AuthUser) -> Result<Profile, ApiError> {
    Ok(Profile {
        user: user.clone(),
        is_operator: state.is_operator(&user.email),
        organizations: state.store.list_organizations_for_user(user.id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::Plan;
    use crate::database::MemoryStore;
    use crate::integrations::IonClient;
    use std::sync::Arc;

    fn state() -> AppState {
        let mut config = AppConfig::from_env();
        config.security.password_iterations = 1_000;
        config.security.jwt_secret = "unit-test-secret".into();
        let store = Arc::new(MemoryStore::with_plans(Plan::default_catalog()));
        let ion = IonClient::new("http://127.0.0.1:9", 1).unwrap();
        AppState::new(store, config, Arc::new(ion))
    }

    fn signup_request(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            name: Some("Ada".into()),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn signup_creates_personal_workspace() {
        let state = state();
        let session = signup(&state, signup_request("Ada@Example.com", "correct horse")).await.unwrap();
        assert_eq!(session.user.email, "ada@example.com");

        let workspace = session.workspace.unwrap();
        assert!(workspace.is_personal);
        assert_eq!(workspace.plan_code, FREE_PLAN);
        assert!(workspace.slug.starts_with("ada-"));
        assert_eq!(workspace.name, "Ada's Workspace");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_regardless_of_case() {
        let state = state();
        signup(&state, signup_request("ada@example.com", "correct horse")).await.unwrap();
        let err = signup(&state, signup_request("ADA@example.com", "correct horse"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let err = signup(&state(), signup_request("ada@example.com", "short")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let state = state();
        signup(&state, signup_request("ada@example.com", "correct horse")).await.unwrap();

        let wrong_password = login(
            &state,
            LoginRequest {
                email: "ada@example.com".into(),
                password: "battery staple".into(),
            },
        )
        .await
        .unwrap_err();
        let unknown = login(
            &state,
            LoginRequest {
                email: "nobody@example.com".into(),
                password: "correct horse".into(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(wrong_password.status_code(), 401);
        assert_eq!(wrong_password.to_json(), unknown.to_json());

        let ok = login(
            &state,
            LoginRequest {
                email: " ADA@example.com".into(),
                password: "correct horse".into(),
            },
        )
        .await
        .unwrap();
        assert!(ok.workspace.is_none());
    }
}
