//! Calendar server client
//!
//! Calendars aggregate many client digests into one blockchain
//! commitment and later serve the merkle path from each digest to it.
//! The wire protocol is plain HTTPS: raw digest bytes up, raw proof
//! bytes down.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use log::debug;

use crate::ots::Timestamp;

/// Aggregation endpoints used for stamping when none are configured
pub const DEFAULT_AGGREGATORS: &[&str] = &[
    "https://a.pool.opentimestamps.org",
    "https://b.pool.opentimestamps.org",
    "https://a.pool.eternitywall.com",
    "https://ots.btc.catallaxy.com",
];

/// Calendars trusted for upgrades when no whitelist is configured
pub const DEFAULT_CALENDAR_WHITELIST: &[&str] = &[
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
    "https://btc.calendar.catallaxy.com",
];

const ACCEPT_HEADER: &str = "application/vnd.opentimestamps.v1";
const MAX_RESPONSE_SIZE: usize = 10_000;
const PENDING_BODY: &str = "Pending confirmation in Bitcoin blockchain";

/// Outcome of asking a calendar for a commitment's proof
#[derive(Debug)]
pub enum CalendarResponse {
    Complete(Timestamp),
    /// The calendar has the commitment but no block commitment yet
    Pending,
    NotFound,
}

#[async_trait]
pub trait Calendar: Send + Sync {
    fn url(&self) -> &str;

    /// Submit a digest for aggregation; the returned fragment is
    /// rooted at the digest and ends in a pending attestation
    async fn submit(&self, digest: &[u8]) -> Result<Timestamp>;

    /// Fetch the completed proof for a previously submitted commitment
    async fn get_timestamp(&self, commitment: &[u8]) -> Result<CalendarResponse>;
}

/// A calendar reached over HTTPS.
pub struct RemoteCalendar {
    url: String,
    client: reqwest::Client,
}

impl RemoteCalendar {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn read_body(response: reqwest::Response) -> Result<Vec<u8>> {
        let body = response.bytes().await?;
        if body.len() > MAX_RESPONSE_SIZE {
            bail!(
                "calendar response of {} bytes exceeds the {MAX_RESPONSE_SIZE} byte limit",
                body.len()
            );
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Calendar for RemoteCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<Timestamp> {
        debug!("submitting {} to {}", hex::encode(digest), self.url);
        let response = self
            .client
            .post(format!("{}/digest", self.url))
            .header("Accept", ACCEPT_HEADER)
            .body(digest.to_vec())
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("calendar {} returned {}", self.url, response.status());
        }
        let body = Self::read_body(response).await?;
        Timestamp::from_bytes(&body, digest.to_vec())
            .map_err(|e| anyhow!("calendar {} sent an unparseable proof: {e}", self.url))
    }

    async fn get_timestamp(&self, commitment: &[u8]) -> Result<CalendarResponse> {
        let url = format!("{}/timestamp/{}", self.url, hex::encode(commitment));
        debug!("fetching {url}");
        let response = self
            .client
            .get(&url)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            if body.trim() == PENDING_BODY {
                return Ok(CalendarResponse::Pending);
            }
            return Ok(CalendarResponse::NotFound);
        }
        if !response.status().is_success() {
            bail!("calendar {} returned {}", self.url, response.status());
        }

        let body = Self::read_body(response).await?;
        let timestamp = Timestamp::from_bytes(&body, commitment.to_vec())
            .map_err(|e| anyhow!("calendar {} sent an unparseable proof: {e}", self.url))?;
        Ok(CalendarResponse::Complete(timestamp))
    }
}
