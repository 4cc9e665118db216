// src/auth.rs
use std::future::{Ready, ready};

use actix_web::{
    FromRequest, HttpRequest, HttpResponse, dev::Payload, http::header::AUTHORIZATION, post, web,
};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{Claims, LoginRequest, RegisterRequest, User};
use crate::repo::{Store, UnitOfWork, UserRepository};

const TOKEN_TTL_HOURS: i64 = 24;
const MIN_PASSWORD_LEN: usize = 6;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(login);
    cfg.service(register);
}

/// The caller identified by the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(get_user_id_from_request(req).map(AuthUser))
    }
}

pub fn get_user_id_from_request(req: &HttpRequest) -> AppResult<Uuid> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("config not registered".to_string()))?;
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::Unauthorized("Invalid token".to_string())
    })?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
}

pub fn issue_token(secret: &str, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

#[post("/auth/login")]
pub async fn login(
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let mut uow = store.begin().await?;
    let user = uow.find_user_by_email(&req.email).await?;
    drop(uow);

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
    let user = user.ok_or_else(invalid)?;
    if !verify(&req.password, &user.password_hash).unwrap_or(false) {
        return Err(invalid());
    }

    let token = issue_token(&config.jwt_secret, user.id)
        .map_err(|e| AppError::Internal(format!("token generation failed: {e}")))?;
    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user_id": user.id,
    })))
}

#[post("/auth/register")]
pub async fn register(
    store: web::Data<dyn Store>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash(&req.password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let new_user = User {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email: req.email,
        password_hash,
        created_at: Utc::now(),
    };

    let mut uow = store.begin().await?;
    match uow.insert_user(&new_user).await {
        Ok(()) => {}
        Err(StoreError::UniqueViolation(_)) => {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    uow.commit().await?;

    tracing::info!("Registered user {}", new_user.id);
    Ok(HttpResponse::Created().json(json!({
        "message": "User created successfully",
        "user_id": new_user.id,
    })))
}
