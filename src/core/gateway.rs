//! Authenticated calls to the firewall provider
//!
//! [`RemoteGateway`] talks to the provider's REST API. The rest of the crate
//! only sees the [`FirewallProvider`] trait, so workers and the orchestrator
//! can run against an in-memory provider in tests.

use crate::core::credentials::{CredentialPool, fingerprint};
use crate::core::document::{self, FirewallPage, ProviderFirewall, SystemAllowList};
use crate::core::error::{Error, ProviderErrorPattern, Result};
use crate::core::firewall::{FirewallId, FirewallRuleSet};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default provider API root
pub const DEFAULT_API_URL: &str = "https://api.linode.com/v4";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size requested when listing firewalls
const PAGE_SIZE: u32 = 100;

/// Longest provider body excerpt written to logs
const LOG_BODY_LIMIT: usize = 256;

/// Operations the reconciliation engine needs from the provider
#[async_trait]
pub trait FirewallProvider: Send + Sync {
    /// Every firewall the account owns, decoded
    async fn fetch_all(&self) -> Result<Vec<(FirewallId, FirewallRuleSet)>>;

    /// One firewall, decoded
    async fn fetch_one(&self, id: FirewallId) -> Result<FirewallRuleSet>;

    /// Replaces all inbound rules of `id` with the encoding of `rules`
    async fn push(&self, id: FirewallId, rules: &FirewallRuleSet) -> Result<()>;
}

pub struct RemoteGateway {
    client: Client,
    base_url: String,
    credentials: CredentialPool,
    system: SystemAllowList,
}

impl RemoteGateway {
    /// Creates a gateway for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the HTTP client cannot be built (TLS backend
    /// initialization).
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: CredentialPool,
        system: SystemAllowList,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fwsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            system,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request with the next bearer token and returns the body of a
    /// 2xx answer.
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let token = self.credentials.next_token();
        let response = request.bearer_auth(token.expose_secret()).send().await?;

        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await?;

        if !status.is_success() {
            let translation = ProviderErrorPattern::match_status(status.as_u16());
            warn!(
                status = status.as_u16(),
                path = %url,
                token = %fingerprint(token),
                body = %excerpt(&body),
                hint = %translation.user_message,
                suggestions = ?translation.suggestions,
                "Provider request failed"
            );
            return Err(Error::Provider {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), path = %url, "Provider request ok");
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body = %excerpt(&body), "Could not decode provider response");
            Error::MalformedResponse(e.to_string())
        })
    }
}

#[async_trait]
impl FirewallProvider for RemoteGateway {
    async fn fetch_all(&self) -> Result<Vec<(FirewallId, FirewallRuleSet)>> {
        let mut firewalls = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = self
                .client
                .get(self.url("/networking/firewalls"))
                .query(&[("page", page), ("page_size", PAGE_SIZE)]);
            let listing: FirewallPage = self.get_json(request).await?;
            if listing.page != page {
                debug!(requested = page, answered = listing.page, "Provider echoed a different page");
            }

            for firewall in listing.data {
                firewalls.push((firewall.id, document::decode(&firewall.rules)));
            }

            // Advance on our own counter; the echoed page is not trusted
            if page >= listing.pages {
                break;
            }
            page += 1;
        }

        info!(count = firewalls.len(), "Fetched firewall inventory");
        Ok(firewalls)
    }

    async fn fetch_one(&self, id: FirewallId) -> Result<FirewallRuleSet> {
        let request = self.client.get(self.url(&format!("/networking/firewalls/{id}")));
        let firewall: ProviderFirewall = self.get_json(request).await?;

        if firewall.id != id {
            return Err(Error::MalformedResponse(format!(
                "asked for firewall {id}, provider answered {}",
                firewall.id
            )));
        }

        let rules = document::decode(&firewall.rules);
        info!(firewall = id, label = ?firewall.label, entries = rules.len(), "Fetched firewall");
        Ok(rules)
    }

    async fn push(&self, id: FirewallId, rules: &FirewallRuleSet) -> Result<()> {
        let body = document::encode(rules, &self.system);
        let request = self
            .client
            .put(self.url(&format!("/networking/firewalls/{id}/rules")))
            .json(&body);

        self.send(request).await?;
        info!(
            firewall = id,
            tcp = rules.tcp_addresses.len(),
            udp = rules.udp_addresses.len(),
            temp = rules.temp_ports.len(),
            "Pushed rules"
        );
        Ok(())
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(LOG_BODY_LIMIT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
