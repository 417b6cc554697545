use crate::auth::{AuthProvider, AuthRejected, Session};
use crate::config::Settings;
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Password sign-in against the hosted auth REST API.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuth {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_store_url()?.to_string();
        let api_key = settings.require_store_key()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build auth http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn token_grant<B: Serialize + ?Sized>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> anyhow::Result<Session> {
        let res = self
            .http
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .headers(self.headers(None)?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("auth {grant_type} grant request failed"))?;

        let status = res.status();
        let text = res.text().await.context("failed to read auth response")?;
        if !status.is_success() {
            return Err(AuthRejected {
                status: status.as_u16(),
                message: error_message(&text),
            }
            .into());
        }

        let token = serde_json::from_str::<TokenResponse>(&text)
            .context("failed to decode auth token response")?;
        token.into_session(Utc::now())
    }

    fn headers(&self, bearer: Option<&str>) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key)?);
        let bearer = bearer.unwrap_or(&self.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))?,
        );
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await?;
        tracing::info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn refresh(&self, session: &Session) -> anyhow::Result<Session> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(AuthRejected {
                status: 401,
                message: "session has no refresh token".to_string(),
            }
            .into());
        };
        let mut fresh = self
            .token_grant("refresh_token", &RefreshGrant { refresh_token })
            .await?;
        if fresh.email.is_none() {
            fresh.email = session.email.clone();
        }
        tracing::info!(user_id = %fresh.user_id, expires_at = %fresh.expires_at, "session refreshed");
        Ok(fresh)
    }

    async fn sign_out(&self, session: &Session) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url("logout"))
            .headers(self.headers(Some(&session.access_token))?)
            .send()
            .await
            .context("auth sign-out request failed")?;

        let status = res.status();
        // An already-invalid token means the session is gone anyway.
        if !status.is_success() && status.as_u16() != 401 && status.as_u16() != 403 {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("auth sign-out HTTP {status}: {}", error_message(&text));
        }
        tracing::info!(user_id = %session.user_id, "signed out");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> anyhow::Result<Session> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(ts), _) => Utc
                .timestamp_opt(ts, 0)
                .single()
                .with_context(|| format!("invalid expires_at: {ts}"))?,
            (None, Some(secs)) => now + ChronoDuration::seconds(secs),
            (None, None) => anyhow::bail!("auth token response has no expiry"),
        };

        Ok(Session {
            user_id: self.user.id,
            email: self.user.email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        })
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error_description: Option<String>,
        #[serde(default)]
        msg: Option<String>,
        #[serde(default)]
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error_description.or(b.msg).or(b.message))
        .unwrap_or_else(|| body.trim().to_string())
}
