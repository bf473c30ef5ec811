// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thin REST client for the platform's inventory API.
//!
//! Lab endpoints sit behind self-signed certificates, so certificate
//! validation is off; requests carry the lab's REST credentials as
//! basic auth.  Token negotiation is the platform's concern, not ours.

use slog::{debug, Logger};
use stratus_config::Credentials;
use thiserror::Error;

const DEFAULT_API_PORT: u16 = 6385;
const REQUEST_TIMEOUT: std::time::Duration =
    std::time::Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RestError {
    #[error("failed to build REST client")]
    Build(#[source] reqwest::Error),

    #[error("GET {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("GET {url} returned a non-JSON body")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct RestClient {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
    log: Logger,
}

impl RestClient {
    /// Client for the inventory API on `floating_ip`.  IPv6 addresses
    /// are bracketed for URL use.
    pub fn new(
        log: &Logger,
        floating_ip: &str,
        credentials: &Credentials,
    ) -> Result<RestClient, RestError> {
        let host = if floating_ip.contains(':') {
            format!("[{}]", floating_ip)
        } else {
            floating_ip.to_string()
        };
        let client = reqwest::ClientBuilder::new()
            .danger_accept_invalid_certs(true)
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RestError::Build)?;
        Ok(RestClient {
            base_url: format!("https://{}:{}", host, DEFAULT_API_PORT),
            credentials: credentials.clone(),
            client,
            log: log.new(slog::o!("component" => "rest")),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` (absolute, e.g. `/v1/ihosts`) and parse the JSON body.
    pub async fn get_json(
        &self,
        path: &str,
    ) -> Result<serde_json::Value, RestError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(self.log, "GET"; "url" => &url);
        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.credentials.user_name,
                Some(&self.credentials.password),
            )
            .send()
            .await
            .map_err(|source| RestError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status { url, status });
        }
        response
            .json()
            .await
            .map_err(|source| RestError::Body { url, source })
    }
}
