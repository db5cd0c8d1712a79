use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::NewUser,
    },
    error::{ApiError, FieldError},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

fn validate_register(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if req.first_name.trim().is_empty() {
        errors.push(FieldError::new("firstName", "First name is required"));
    }
    if req.last_name.trim().is_empty() {
        errors.push(FieldError::new("lastName", "Last name is required"));
    }
    if !is_valid_email(req.email.trim()) {
        errors.push(FieldError::new("email", "Enter a valid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 6 characters",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn validate_login(req: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if !is_valid_email(req.email.trim()) {
        errors.push(FieldError::new("email", "Enter a valid email"));
    }
    if req.password.is_none() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Create a new identity. No session is issued; the caller logs in separately.
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<(), ApiError> {
    validate_register(&req)?;
    let email = req.email.trim().to_string();

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists"));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let created = state
        .users
        .create(NewUser {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email,
            password_hash,
        })
        .await?;

    match created {
        Some(user) => {
            info!(user_id = %user.id, email = %user.email, "user registered");
            Ok(())
        }
        None => {
            warn!("email registered concurrently");
            Err(ApiError::Conflict("User already exists"))
        }
    }
}

/// Check credentials and return a signed session token.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<String, ApiError> {
    validate_login(&req)?;
    let email = req.email.trim();
    let password = req.password.unwrap_or_default();

    let Some(user) = state.users.find_by_email(email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.jwt.sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(token)
}
