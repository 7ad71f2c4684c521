//! Upload sinks for study data.
//!
//! Objects are written with plain overwrite semantics: uploading the same
//! name twice replaces the earlier copy.

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::config::ServiceAccount;
use crate::constants::{GOOGLE_TOKEN_URI, STORAGE_API_BASE, STORAGE_SCOPE};
use crate::session::ParticipantId;
use crate::styles::StyleDescriptor;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// `{style}_P{pid}.csv`
pub fn transcript_object_name(style: &StyleDescriptor, participant: &ParticipantId) -> String {
    format!("{}_P{}.csv", style.name, participant)
}

/// `EvalRatings_{style}_P{pid}.csv`
pub fn ratings_object_name(style: &StyleDescriptor, participant: &ParticipantId) -> String {
    format!("EvalRatings_{}_P{}.csv", style.name, participant)
}

#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, name: &str, content_type: &str, body: Vec<u8>) -> Result<()>;

    /// Where objects end up, for log lines.
    fn describe(&self) -> String;
}

/// Writes objects as files under a directory.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    root: PathBuf,
}

impl LocalDirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl UploadSink for LocalDirSink {
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn upload(&self, name: &str, _content_type: &str, body: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context(format!("Failed to create output directory {}", self.root.display()))?;
        let path = self.root.join(name);
        tokio::fs::write(&path, body)
            .await
            .context(format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Google Cloud Storage bucket accessed through the JSON API with a service account.
pub struct GcsBucket {
    http: Client,
    bucket: String,
    account: ServiceAccount,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl GcsBucket {
    pub fn new(http: Client, bucket: impl Into<String>, account: ServiceAccount) -> Self {
        Self {
            http,
            bucket: bucket.into(),
            account,
            api_base: STORAGE_API_BASE.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Point uploads at a different storage endpoint (emulators, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn token_uri(&self) -> &str {
        self.account.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI)
    }

    fn signed_assertion(&self) -> Result<String> {
        let iat = jsonwebtoken::get_current_timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: STORAGE_SCOPE,
            aud: self.token_uri(),
            iat,
            exp: iat + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.account.private_key_id.clone());
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM key")?;
        jsonwebtoken::encode(&header, &claims, &key).context("Failed to sign token assertion")
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.signed_assertion()?;
        let token_uri = self.token_uri().to_string();
        debug!(%token_uri, "Requesting storage access token");
        let response = self
            .http
            .post(&token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context(format!("Failed to reach token endpoint {}", token_uri))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(%status, %error_body, "Token exchange failed");
            return Err(anyhow::anyhow!(
                "Token exchange failed with status {}: {}",
                status,
                error_body
            ));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")?;
        // Refresh a minute early.
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl UploadSink for GcsBucket {
    #[instrument(skip(self, body), fields(bucket = %self.bucket, bytes = body.len()))]
    async fn upload(&self, name: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.api_base.trim_end_matches('/'),
            self.bucket
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .context(format!("Failed to upload {} to bucket {}", name, self.bucket))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(%status, %error_body, "Object upload failed");
            return Err(anyhow::anyhow!(
                "Upload of {} failed with status {}: {}",
                name,
                status,
                error_body
            ));
        }

        info!("Uploaded {} to gs://{}", name, self.bucket);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}
