use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{trees, AuthPayload, Role, User};
use crate::storage::Storage;

/// Returned on sign-in.
#[derive(Serialize, Debug, Clone)]
pub struct Session {
    pub token: String,
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// Email/password accounts stored in the `users` tree, with JWT sessions.
#[derive(Clone)]
pub struct Auth {
    storage: Storage,
    secret: Vec<u8>,
    token_ttl_secs: u64,
    bcrypt_cost: u32,
}

impl Auth {
    pub fn new(storage: Storage, secret: &str, token_ttl_secs: u64, bcrypt_cost: u32) -> Self {
        Self {
            storage,
            secret: secret.as_bytes().to_vec(),
            token_ttl_secs,
            bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        Ok(hash(password, self.bcrypt_cost)?)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<(String, User)>, AuthError> {
        // The email index is the source of truth for which account owns an address
        let Some(uid) = self.storage.lookup_unique(trees::USERS_BY_EMAIL, &normalize_email(email))? else {
            return Ok(None);
        };
        let user = self.storage.get::<User>(trees::USERS, &uid)?;
        Ok(user.map(|r| (r.id, r.data)))
    }

    fn register(&self, email: &str, password: &str, role: Role) -> Result<String, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        // Hash first so the email claim below is never held across bcrypt
        let password_hash = self.hash_password(password)?;
        let uid = Uuid::new_v4().to_string();

        // Claim the address atomically; concurrent sign-ups for the same email
        // race on this compare-and-swap and exactly one wins
        if !self.storage.claim_unique(trees::USERS_BY_EMAIL, &email, &uid)? {
            tracing::warn!(email = %email, "sign-up rejected, email already registered");
            return Err(AuthError::EmailTaken(email));
        }

        let user = User {
            email: email.clone(),
            password_hash,
            role,
        };
        if let Err(e) = self.storage.put(trees::USERS, &uid, user) {
            // Don't leave the address claimed by an account that was never written
            self.storage.release_unique(trees::USERS_BY_EMAIL, &email, &uid)?;
            return Err(e.into());
        }
        tracing::info!(uid = %uid, email = %email, ?role, "account created");
        Ok(uid)
    }

    /// Public sign-up. New accounts are always customers.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<String, AuthError> {
        self.register(email, password, Role::Customer)
    }

    /// Operator-only path for creating back-office accounts.
    pub fn create_admin(&self, email: &str, password: &str) -> Result<String, AuthError> {
        self.register(email, password, Role::Admin)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let (uid, user) = self
            .find_by_email(email)?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify(password, &user.password_hash).unwrap_or(false) {
            tracing::warn!(email = %user.email, "sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.create_jwt(&uid, &user.email, user.role)?;
        Ok(Session {
            token,
            uid,
            email: user.email,
            role: user.role,
        })
    }

    pub fn create_jwt(&self, uid: &str, email: &str, role: Role) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let claims = AuthPayload {
            sub: uid.to_owned(),
            email: email.to_owned(),
            role,
            exp: (now + self.token_ttl_secs) as usize,
        };
        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))?)
    }

    pub fn validate_jwt(&self, token: &str) -> Result<AuthPayload, AuthError> {
        let token_data = decode::<AuthPayload>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(token_data.claims)
    }

    /// Parse an `Authorization` header value and validate the bearer token.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthPayload, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        self.validate_jwt(token)
    }

    /// Role check happens here on the server, never only in the client.
    pub fn require_admin(claims: &AuthPayload) -> Result<(), AuthError> {
        match claims.role {
            Role::Admin => Ok(()),
            Role::Customer => Err(AuthError::Forbidden),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
