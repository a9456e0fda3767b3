//! Account page REST client (reqwest-based).
//!
//! Implements [`EntitySource`] against the VSC account page API. All
//! `modified/<timestamp>` filters take the watermark in its
//! `YYYYMMDDHHMMSSZ` form.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::DATE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vsc_core::{Account, Entity, EntityKind, EntityStatus, Group, QuotaRecord, VscId, Watermark};

use crate::error::{SourceError, SourceResult};
use crate::models::{
    AccountPayload, GroupPayload, MemberPayload, PubkeyPayload, StatusUpdate, UserGroupPayload,
    UserQuotaPayload, VoQuotaPayload,
};
use crate::source::{ChangeFilter, EntitySource};

/// Account page client.
#[derive(Debug, Clone)]
pub struct AccountPageClient {
    /// Base URL, e.g. `https://account.vscentrum.be/django`.
    base_url: String,
    /// Bearer token.
    token: Option<String>,
    http_client: Client,
}

impl AccountPageClient {
    /// Create a new client.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> SourceResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vsc-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, token, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: &str, token: Option<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http_client,
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> SourceResult<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.authorize(self.http_client.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> SourceResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| SourceError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn error_from_response(response: reqwest::Response) -> SourceError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::NOT_FOUND => SourceError::NotFound(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SourceError::AuthError(format!("HTTP {status}: {body}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(retry_after_secs = ?retry_after, "Account page rate limited");
                SourceError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => SourceError::ApiError {
                status: status.as_u16(),
                detail: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            },
        }
    }

    async fn fetch_usergroup(&self, id: &VscId) -> SourceResult<UserGroupPayload> {
        self.get(&format!("api/account/{id}/usergroup/")).await
    }
}

/// Decode a change listing element by element.
///
/// An element that does not decode is logged with its raw id and skipped, so
/// one malformed record never hides the rest of the listing.
fn decode_each<P: DeserializeOwned>(listing: &str, values: Vec<Value>, id_field: &str) -> Vec<P> {
    values
        .into_iter()
        .filter_map(|value| {
            let raw_id = value
                .get(id_field)
                .and_then(Value::as_str)
                .unwrap_or("<missing>")
                .to_string();
            match serde_json::from_value(value) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    error!(listing, entity_id = %raw_id, error = %e, "Skipping undecodable record");
                    None
                }
            }
        })
        .collect()
}

/// Keep a converted listing element, or log and drop it.
fn keep_valid<T>(listing: &str, raw_id: &str, converted: SourceResult<T>) -> Option<T> {
    match converted {
        Ok(record) => Some(record),
        Err(e) => {
            error!(listing, entity_id = %raw_id, error = %e, "Skipping invalid record");
            None
        }
    }
}

#[async_trait]
impl EntitySource for AccountPageClient {
    async fn server_time(&self) -> SourceResult<DateTime<Utc>> {
        let response = self.authorize(self.http_client.get(self.url("api/"))).send().await?;
        let header = response
            .headers()
            .get(DATE)
            .ok_or_else(|| SourceError::ServerTime("no Date header".to_string()))?
            .to_str()
            .map_err(|e| SourceError::ServerTime(e.to_string()))?;
        let now = DateTime::parse_from_rfc2822(header)
            .map_err(|e| SourceError::ServerTime(format!("'{header}': {e}")))?
            .with_timezone(&Utc);
        debug!(server_time = %now, "Account page clock");
        Ok(now)
    }

    async fn fetch_changed(
        &self,
        kind: EntityKind,
        since: &Watermark,
        filter: &ChangeFilter,
    ) -> SourceResult<Vec<Entity>> {
        let (listing, values): (String, Vec<Value>) = match kind {
            EntityKind::User => {
                let listing = format!("api/account/modified/{since}/");
                let values: Vec<Value> = self.get(&listing).await?;
                (listing, values)
            }
            EntityKind::Project => {
                let listing = format!("api/group/modified/{since}/");
                let values: Vec<Value> = self.get(&listing).await?;
                (listing, values)
            }
        };
        let total = values.len();

        // Filter on the raw fields first so records outside the selection are
        // never converted.
        let selected: Vec<Entity> = match kind {
            EntityKind::User => decode_each::<AccountPayload>(&listing, values, "vsc_id")
                .into_iter()
                .filter(|p| filter.accepts(&p.vsc_id, p.institute()))
                .filter_map(|p| {
                    let raw_id = p.vsc_id.clone();
                    keep_valid(&listing, &raw_id, p.into_account(None).map(Entity::User))
                })
                .collect(),
            EntityKind::Project => decode_each::<GroupPayload>(&listing, values, "vsc_id")
                .into_iter()
                .filter(|p| filter.accepts(&p.vsc_id, p.institute()))
                .filter_map(|p| {
                    let raw_id = p.vsc_id.clone();
                    keep_valid(&listing, &raw_id, p.into_group().map(Entity::Project))
                })
                .collect(),
        };
        info!(
            kind = %kind,
            since = %since,
            total,
            selected = selected.len(),
            "Fetched changed entities"
        );
        Ok(selected)
    }

    async fn fetch_account(&self, id: &VscId) -> SourceResult<Account> {
        let payload: AccountPayload = self.get(&format!("api/account/{id}/")).await?;
        let usergroup = self.fetch_usergroup(id).await?;
        payload.into_account(Some(usergroup.vsc_id_number))
    }

    async fn fetch_group(&self, id: &VscId) -> SourceResult<Group> {
        let payload: GroupPayload = self.get(&format!("api/vo/{id}/")).await?;
        payload.into_group()
    }

    async fn fetch_quota_changes(
        &self,
        kind: EntityKind,
        storage: &str,
        since: &Watermark,
    ) -> SourceResult<Vec<QuotaRecord>> {
        let records: Vec<QuotaRecord> = match kind {
            EntityKind::User => {
                let listing = format!("api/quota/user/storage/{storage}/modified/{since}/");
                let values: Vec<Value> = self.get(&listing).await?;
                decode_each::<UserQuotaPayload>(&listing, values, "user")
                    .into_iter()
                    .filter_map(|p| {
                        let raw_id = p.user.clone();
                        keep_valid(&listing, &raw_id, p.into_record())
                    })
                    .collect()
            }
            EntityKind::Project => {
                let listing = format!("api/quota/vo/storage/{storage}/modified/{since}/");
                let values: Vec<Value> = self.get(&listing).await?;
                decode_each::<VoQuotaPayload>(&listing, values, "virtual_organisation")
                    .into_iter()
                    .filter_map(|p| {
                        let raw_id = p.virtual_organisation.clone();
                        keep_valid(&listing, &raw_id, p.into_record())
                    })
                    .collect()
            }
        };
        info!(kind = %kind, storage, since = %since, count = records.len(), "Fetched quota changes");
        Ok(records)
    }

    async fn fetch_modified_members(
        &self,
        project: &VscId,
        since: &Watermark,
    ) -> SourceResult<Vec<VscId>> {
        let payloads: Vec<MemberPayload> = self
            .get(&format!("api/vo/{project}/member/modified/{since}/"))
            .await?;
        payloads
            .into_iter()
            .map(|m| VscId::new(m.vsc_id).map_err(Into::into))
            .collect()
    }

    async fn fetch_account_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>> {
        let payloads: Vec<UserQuotaPayload> = self.get(&format!("api/account/{id}/quota/")).await?;
        payloads
            .into_iter()
            .map(UserQuotaPayload::into_record)
            .collect()
    }

    async fn fetch_group_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>> {
        let payloads: Vec<VoQuotaPayload> = self.get(&format!("api/vo/{id}/quota/")).await?;
        payloads.into_iter().map(VoQuotaPayload::into_record).collect()
    }

    async fn fetch_pubkeys(&self, id: &VscId) -> SourceResult<Vec<String>> {
        let payloads: Vec<PubkeyPayload> = self.get(&format!("api/account/{id}/pubkey/")).await?;
        Ok(payloads
            .into_iter()
            .filter(|key| !key.deleted)
            .map(|key| key.pubkey)
            .collect())
    }

    async fn push_status(&self, id: &VscId, status: EntityStatus) -> SourceResult<()> {
        let url = self.url(&format!("api/account/{id}/"));
        let body = StatusUpdate {
            status: status.as_str(),
        };
        let response = self
            .authorize(self.http_client.patch(&url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        info!(entity_id = %id, status = %status, "Pushed account status");
        Ok(())
    }
}
