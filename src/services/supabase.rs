use crate::core::config::SupabaseConfig;
use crate::core::error::{AuthError, PersistenceError};
use crate::core::model::{Session, StoryRecord, User};
use crate::services::auth::AuthProvider;
use crate::services::persistence::StoryStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

// --- Wire types ---

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    name: &'a str,
}

#[derive(Deserialize, Debug)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Debug, Default)]
struct UserMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

/// Token grant and sign-up reply. A sign-up that still needs email
/// confirmation carries the user fields at the top level and no token.
#[derive(Deserialize, Debug)]
struct GoTrueSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<GoTrueUser>,
}

#[derive(Deserialize, Debug, Default)]
struct ApiError {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<GoTrueUser> for User {
    fn from(u: GoTrueUser) -> Self {
        User {
            id: u.id,
            email: u.email.unwrap_or_default(),
            name: u.user_metadata.name.or(u.user_metadata.full_name),
        }
    }
}

fn parse_session(body: &str) -> Result<Option<Session>, AuthError> {
    let reply: GoTrueSession = serde_json::from_str(body)
        .map_err(|e| AuthError::Transport(format!("unexpected auth reply: {}", e)))?;
    match (reply.access_token, reply.user) {
        (Some(access_token), Some(user)) => Ok(Some(Session {
            user: user.into(),
            access_token,
        })),
        _ => Ok(None),
    }
}

fn error_message(body: &str) -> String {
    let parsed: ApiError = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string())
}

// --- Client ---

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.config.url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path)
    }

    fn table_url(&self) -> Result<Url, PersistenceError> {
        self.endpoint(&format!("rest/v1/{}", self.config.stories_table))
            .map_err(|e| PersistenceError::Transport(e.to_string()))
    }

    async fn auth_post(
        &self,
        path: &str,
        body: &impl Serialize,
        bearer: Option<&str>,
    ) -> Result<String, AuthError> {
        let url = self
            .endpoint(path)
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        debug!("POST {}", url);
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.config.anon_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(AuthError::Rejected(error_message(&text)));
        }
        Ok(text)
    }
}

async fn rest_reply(resp: reqwest::Response) -> Result<String, PersistenceError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        warn!("Supabase REST returned {}: {}", status, text);
        return Err(PersistenceError::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }
    Ok(text)
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl AuthProvider for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let body = self
            .auth_post(
                "auth/v1/token?grant_type=password",
                &PasswordGrant { email, password },
                None,
            )
            .await?;
        parse_session(&body)?
            .ok_or_else(|| AuthError::Transport("token grant returned no session".to_string()))
    }

    async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Option<Session>, AuthError> {
        let body = self
            .auth_post(
                "auth/v1/signup",
                &SignUpRequest {
                    email,
                    password,
                    data: SignUpMetadata { name },
                },
                None,
            )
            .await?;
        parse_session(&body)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.auth_post(
            "auth/v1/logout",
            &serde_json::json!({}),
            Some(&session.access_token),
        )
        .await?;
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryStore for SupabaseClient {
    async fn insert(
        &self,
        session: &Session,
        record: StoryRecord,
    ) -> Result<StoryRecord, PersistenceError> {
        let resp = self
            .client
            .post(self.table_url()?)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;
        let text = rest_reply(resp).await?;

        let mut rows: Vec<StoryRecord> = serde_json::from_str(&text)
            .map_err(|e| PersistenceError::Transport(format!("unexpected insert reply: {}", e)))?;
        Ok(if rows.is_empty() { record } else { rows.remove(0) })
    }

    async fn list(&self, session: &Session) -> Result<Vec<StoryRecord>, PersistenceError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", session.user.id));

        let resp = self
            .client
            .get(url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        let text = rest_reply(resp).await?;
        serde_json::from_str(&text)
            .map_err(|e| PersistenceError::Transport(format!("unexpected list reply: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> SupabaseClient {
        SupabaseClient::new(SupabaseConfig {
            url: Url::parse(url).unwrap(),
            anon_key: "anon".to_string(),
            stories_table: "stories".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints() {
        let c = client("https://abc.supabase.co");
        assert_eq!(
            c.endpoint("auth/v1/token?grant_type=password").unwrap().as_str(),
            "https://abc.supabase.co/auth/v1/token?grant_type=password"
        );
        let c = client("https://example.com/proxy");
        assert_eq!(
            c.table_url().unwrap().as_str(),
            "https://example.com/proxy/rest/v1/stories"
        );
    }

    #[test]
    fn test_parse_session() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "user": {"id": "u1", "email": "reader@example.com", "user_metadata": {"name": "Ada"}}
        }"#;
        let session = parse_session(body).unwrap().unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.user.display_name(), "Ada");
    }

    #[test]
    fn test_unconfirmed_signup_has_no_session() {
        let body = r#"{"id": "u1", "email": "reader@example.com", "confirmation_sent_at": "2024-01-01"}"#;
        assert_eq!(parse_session(body).unwrap(), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(
            error_message(r#"{"code":"42501","message":"new row violates row-level security policy"}"#),
            "new row violates row-level security policy"
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
