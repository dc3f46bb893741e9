use crate::core::error::AuthError;
use crate::core::io::Storage;
use crate::core::model::{Session, User};
use crate::core::ServiceBounds;
use crate::utils::id::random_hex;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::sync::Arc;

pub const MIN_PASSWORD_CHARS: usize = 6;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait AuthProvider: ServiceBounds + Debug {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    /// `None` when the new account has to be confirmed before signing in.
    async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Option<Session>, AuthError>;
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;
}

// --- Validation ---

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::PasswordTooShort {
            min: MIN_PASSWORD_CHARS,
        });
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), AuthError> {
    if name.trim().is_empty() {
        return Err(AuthError::MissingName);
    }
    Ok(())
}

// --- Context ---

/// Who is signed in, passed explicitly to whatever needs it. Failures are
/// kept in `last_error` for display; nothing here returns an error.
#[derive(Debug, Clone)]
pub struct AuthContext {
    provider: Arc<dyn AuthProvider>,
    session: Option<Session>,
    last_error: Option<AuthError>,
    last_notice: Option<String>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            session: None,
            last_error: None,
            last_notice: None,
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    pub fn last_notice(&self) -> Option<&str> {
        self.last_notice.as_deref()
    }

    pub fn can_save(&self) -> bool {
        self.session.is_some()
    }

    pub async fn login(&mut self, email: &str, password: &str) -> bool {
        self.clear_messages();
        let result = match validate_email(email).and_then(|_| validate_password(password)) {
            Ok(()) => self.provider.sign_in(email.trim(), password).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(session) => {
                info!("Signed in as {}", session.user.email);
                self.last_notice = Some(format!("Welcome back, {}!", session.user.display_name()));
                self.session = Some(session);
                true
            }
            Err(e) => self.fail("Login failed", e),
        }
    }

    pub async fn signup(&mut self, email: &str, name: &str, password: &str) -> bool {
        self.clear_messages();
        let valid = validate_email(email)
            .and_then(|_| validate_name(name))
            .and_then(|_| validate_password(password));
        let result = match valid {
            Ok(()) => self.provider.sign_up(email.trim(), name.trim(), password).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Some(session)) => {
                info!("Account created and signed in: {}", session.user.email);
                self.last_notice = Some("Account created".to_string());
                self.session = Some(session);
                true
            }
            Ok(None) => {
                info!("Account created, awaiting confirmation: {}", email.trim());
                self.last_notice =
                    Some("Please check your email for the confirmation link.".to_string());
                true
            }
            Err(e) => self.fail("Signup failed", e),
        }
    }

    /// Always ends signed out locally, even if the provider call fails.
    pub async fn logout(&mut self) {
        self.clear_messages();
        let Some(session) = self.session.take() else {
            return;
        };
        match self.provider.sign_out(&session).await {
            Ok(()) => {
                info!("Signed out {}", session.user.email);
                self.last_notice = Some("You have been successfully logged out.".to_string());
            }
            Err(e) => {
                self.fail("Logout failed", e);
            }
        }
    }

    fn clear_messages(&mut self) {
        self.last_error = None;
        self.last_notice = None;
    }

    fn fail(&mut self, what: &str, e: AuthError) -> bool {
        match &e {
            AuthError::Transport(_) => error!("{}: {}", what, e),
            _ => warn!("{}: {}", what, e),
        }
        self.last_error = Some(e);
        false
    }
}

// --- Local accounts ---

#[derive(Serialize, Deserialize)]
struct LocalAccount {
    user: User,
    salt: String,
    password_hash: String,
}

#[derive(Clone)]
pub struct LocalAuthProvider {
    storage: Arc<dyn Storage>,
    folder: String,
}

impl Debug for LocalAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAuthProvider")
            .field("folder", &self.folder)
            .finish()
    }
}

impl LocalAuthProvider {
    pub fn new(storage: Arc<dyn Storage>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    fn account_path(&self, email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(email.trim().to_lowercase().as_bytes());
        format!("{}/accounts/{:x}.json", self.folder, hasher.finalize())
    }

    async fn load(&self, email: &str) -> Result<Option<LocalAccount>, AuthError> {
        let path = self.account_path(email);
        if !self.storage.exists(&path).await.map_err(storage_error)? {
            return Ok(None);
        }
        let bytes = self.storage.read(&path).await.map_err(storage_error)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AuthError::Transport(format!("corrupt account file {}: {}", path, e)))
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn storage_error(e: anyhow::Error) -> AuthError {
    AuthError::Transport(format!("{:#}", e))
}

fn new_session(user: User) -> Session {
    Session {
        user,
        access_token: random_hex(32),
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        match self.load(email).await? {
            Some(account) if hash_password(&account.salt, password) == account.password_hash => {
                Ok(new_session(account.user))
            }
            _ => Err(AuthError::Rejected("Invalid login credentials".to_string())),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Option<Session>, AuthError> {
        if self.load(email).await?.is_some() {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }

        let salt = random_hex(16);
        let account = LocalAccount {
            user: User {
                id: random_hex(16),
                email: email.trim().to_string(),
                name: Some(name.trim().to_string()),
            },
            password_hash: hash_password(&salt, password),
            salt,
        };
        let json = serde_json::to_vec_pretty(&account)
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        self.storage
            .write(&self.account_path(email), &json)
            .await
            .map_err(storage_error)?;
        Ok(Some(new_session(account.user)))
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }
}
