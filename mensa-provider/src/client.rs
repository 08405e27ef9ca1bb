use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::catalog::{parse_feed, Catalog};

/// One network round trip: fetch the current catalog of reservable slots,
/// or fail. The sync loop holds this behind a trait so tests can script
/// snapshots.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Catalog, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Read-only provider connection settings, built once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Proxy URL the portal is reached through, if any.
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Portal identifier of the dining hall whose program is fetched.
    pub self_id: u32,
    /// The portal serves an incomplete TLS chain from inside the campus
    /// network; off by default.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_seconds() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Credentialed HTTP client for the institutional portal: password-grant
/// token fetch, then the weekly program feed for the current and the
/// following week.
pub struct ProviderClient {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl ProviderClient {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(settings.timeout_seconds))
            .danger_accept_invalid_certs(settings.accept_invalid_certs);
        if let Some(proxy) = &settings.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let http = builder.build()?;
        Ok(Self { http, settings })
    }

    async fn authenticate(&self) -> Result<String, ProviderError> {
        let url = format!("{}/oauth/token", self.settings.base_url);
        let form = [
            ("username", self.settings.username.as_str()),
            ("password", self.settings.password.as_str()),
            ("grant_type", "password"),
            ("scope", "read+write"),
        ];

        let response = self.http.post(&url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        tokens
            .access_token
            .ok_or_else(|| ProviderError::Auth("no access token in response".to_string()))
    }

    async fn fetch_week(
        &self,
        token: &str,
        week_start: NaiveDate,
        today: NaiveDate,
    ) -> Result<Option<Vec<crate::catalog::CatalogEntry>>, ProviderError> {
        let url = format!(
            "{}/rest/programs/v2?selfId={}&weekStartDate={} 00:00:00",
            self.settings.base_url,
            self.settings.self_id,
            week_start.format("%Y-%m-%d")
        );
        debug!(%week_start, "fetching weekly program feed");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            // one week missing is not a failed sync, the portal often has
            // no program published for the following week yet
            warn!(%week_start, status = %response.status(), "weekly feed unavailable");
            return Ok(None);
        }

        let feed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_feed(feed, today).map(Some)
    }
}

#[async_trait]
impl CatalogSource for ProviderClient {
    async fn fetch_catalog(&self) -> Result<Catalog, ProviderError> {
        let token = self.authenticate().await?;
        let today = Utc::now().date_naive();
        let this_week = week_start(today);

        let mut entries = Vec::new();
        for start in [this_week, this_week + Duration::days(7)] {
            if let Some(week_entries) = self.fetch_week(&token, start, today).await? {
                entries.extend(week_entries);
            }
        }
        info!(count = entries.len(), "fetched provider catalog");
        Ok(Catalog { entries })
    }
}

/// The portal's week starts on Saturday.
fn week_start(today: NaiveDate) -> NaiveDate {
    let days_since_saturday = (today.weekday().num_days_from_monday() + 2) % 7;
    today - Duration::days(days_since_saturday as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_saturday() {
        // 2026-08-01 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(week_start(saturday), saturday);
        assert_eq!(week_start(saturday + Duration::days(1)), saturday);
        assert_eq!(week_start(saturday + Duration::days(6)), saturday);
        assert_eq!(
            week_start(saturday + Duration::days(7)),
            saturday + Duration::days(7)
        );
    }
}
