use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::UserId;
use crate::store::{StoreError, UserStore};

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user_id as string)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid registration input: {0}")]
    InvalidInput(&'static str),

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AuthError::EmailTaken,
            other => AuthError::Storage(other.to_string()),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String) -> Self {
        Self { users, jwt_secret }
    }

    /// Register a new user. The password is stored as a PHC-format argon2
    /// hash; the plaintext never reaches the store.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserId, AuthError> {
        if req.email.is_empty() || !req.email.contains('@') {
            return Err(AuthError::InvalidInput("malformed email"));
        }
        if req.password.len() < 8 {
            return Err(AuthError::InvalidInput("password must be at least 8 chars"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| AuthError::Storage(format!("hashing failed: {}", e)))?
            .to_string();

        let user_id = self.users.create_user(&req.email, &password_hash).await?;
        Ok(user_id)
    }

    /// Verify credentials and issue a JWT (HS256, 24h expiry).
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .users
            .user_by_email(&req.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let expiration = Utc::now()
            .checked_add_signed(Duration::hours(24))
            .ok_or(AuthError::InvalidToken)?
            .timestamp();

        let claims = Claims {
            sub: user.user_id.to_string(),
            exp: expiration as usize,
            iat: Utc::now().timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Storage(format!("token generation failed: {}", e)))?;

        Ok(AuthResponse {
            token,
            user_id: user.user_id,
            email: user.email,
        })
    }

    /// Verify a JWT and return its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        let token_data =
            decode::<Claims>(token, &decoding_key, &validation).map_err(|_| AuthError::InvalidToken)?;
        Ok(token_data.claims)
    }
}
