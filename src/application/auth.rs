//! Cookie-session identity: signup, login, logout, session resolution.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{NewUser, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};

const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;

const USERNAME_REQUIRED: &str = "Enter a username.";
const USERNAME_TOO_LONG: &str = "Username is too long.";
const USERNAME_TAKEN: &str = "This username is already taken.";
const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupErrors {
    pub username: Option<&'static str>,
    pub password: Option<&'static str>,
}

impl SignupErrors {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

#[derive(Debug)]
pub enum SignupOutcome {
    Created {
        user: UserRecord,
        session: SessionRecord,
    },
    Invalid(SignupErrors),
}

#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn {
        user: UserRecord,
        session: SessionRecord,
    },
    InvalidCredentials,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<SignupOutcome, AuthError> {
        let username = username.trim();
        let mut errors = SignupErrors::default();

        if username.is_empty() {
            errors.username = Some(USERNAME_REQUIRED);
        } else if username.len() > USERNAME_MAX_LEN {
            errors.username = Some(USERNAME_TOO_LONG);
        }

        if password.len() < PASSWORD_MIN_LEN {
            errors.password = Some(PASSWORD_TOO_SHORT);
        }

        if !errors.is_empty() {
            return Ok(SignupOutcome::Invalid(errors));
        }

        let password_hash = hash_password(password)?;
        let user = match self
            .users
            .insert_user(NewUser {
                username: username.to_string(),
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => {
                return Ok(SignupOutcome::Invalid(SignupErrors {
                    username: Some(USERNAME_TAKEN),
                    password: None,
                }));
            }
            Err(err) => return Err(err.into()),
        };

        let session = self.open_session(user.id).await?;
        Ok(SignupOutcome::Created { user, session })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some((user, stored_hash)) = self.users.load_credentials(username.trim()).await? else {
            return Ok(LoginOutcome::InvalidCredentials);
        };

        if !verify_password(password, &stored_hash) {
            return Ok(LoginOutcome::InvalidCredentials);
        }

        let session = self.open_session(user.id).await?;
        Ok(LoginOutcome::LoggedIn { user, session })
    }

    pub async fn logout(&self, token: Uuid) -> Result<(), AuthError> {
        self.sessions.delete_session(token).await?;
        Ok(())
    }

    /// Resolve a session token to its user; expired or unknown tokens
    /// resolve to `None`.
    pub async fn resolve(&self, token: Uuid) -> Result<Option<UserRecord>, AuthError> {
        let viewer = self
            .sessions
            .find_viewer(token, OffsetDateTime::now_utc())
            .await?;
        Ok(viewer)
    }

    async fn open_session(&self, user_id: i64) -> Result<SessionRecord, AuthError> {
        let now = OffsetDateTime::now_utc();
        let session = SessionRecord {
            token: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        self.sessions.insert_session(session.clone()).await?;
        Ok(session)
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
