//! Hosted REST backend.
//!
//! Talks to a hosted data service exposing tables over HTTP with
//! PostgREST-style filters (`?user_id=eq.<id>&order=added_at.desc`).
//!
//! Auth: `apikey: <key>` and `Authorization: Bearer <key>` on every request.
//! The key never leaves the `SecretString` except to build headers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{SlipRemote, TierSource};
use crate::types::{PickslipError, RemoteSlipRow, SubscriptionRow};

const BACKEND_NAME: &str = "rest";
const SLIP_TABLE: &str = "bet_slip";
const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

/// REST client for the hosted data backend.
pub struct RestBackend {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("PICKSLIP/0.1.0")
            .build()
            .context("Failed to build HTTP client for REST backend")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn user_filter(user_id: &str) -> String {
        format!("user_id=eq.{}", urlencoding::encode(user_id))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        req.header("apikey", key.as_str()).bearer_auth(key)
    }

    async fn check(resp: Response, what: &str) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(PickslipError::RemoteStore {
            backend: BACKEND_NAME.to_string(),
            message: format!("{what} failed with {status}: {body}"),
        }
        .into())
    }
}

#[async_trait]
impl SlipRemote for RestBackend {
    async fn load_slip(&self, user_id: &str) -> Result<Vec<RemoteSlipRow>> {
        let url = format!(
            "{}?select=*&{}&order=added_at.desc",
            self.table_url(SLIP_TABLE),
            Self::user_filter(user_id),
        );
        debug!(url = %url, "Loading slip from REST backend");

        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .context("Slip load request failed")?;
        let resp = Self::check(resp, "slip load").await?;

        resp.json()
            .await
            .context("Failed to parse slip rows from REST backend")
    }

    /// Not atomic: a DELETE followed by a bulk POST. If the insert fails
    /// after the delete succeeded, the remote slip stays empty until the next
    /// flush; the local cache still holds the items.
    async fn replace_slip(&self, user_id: &str, rows: &[RemoteSlipRow]) -> Result<()> {
        let delete_url = format!("{}?{}", self.table_url(SLIP_TABLE), Self::user_filter(user_id));
        let resp = self
            .authed(self.http.delete(&delete_url))
            .send()
            .await
            .context("Slip delete request failed")?;
        Self::check(resp, "slip delete").await?;

        if rows.is_empty() {
            debug!(user_id, "Remote slip cleared");
            return Ok(());
        }

        let resp = self
            .authed(self.http.post(self.table_url(SLIP_TABLE)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .context("Slip insert request failed")?;
        Self::check(resp, "slip insert").await?;

        debug!(user_id, rows = rows.len(), "Remote slip replaced");
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[async_trait]
impl TierSource for RestBackend {
    async fn fetch_subscriptions(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        let url = format!(
            "{}?select=tier,status,current_period_end,created_at&{}&status=eq.active&order=created_at.desc",
            self.table_url(SUBSCRIPTIONS_TABLE),
            Self::user_filter(user_id),
        );

        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| PickslipError::TierSource {
                backend: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })?;
        let resp = Self::check(resp, "subscription lookup").await?;

        resp.json()
            .await
            .context("Failed to parse subscription rows from REST backend")
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}
