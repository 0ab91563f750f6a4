//! IP geolocation.
//!
//! Lookups are best effort: every failure is reported as a [`GeoError`] and
//! callers degrade to an unknown location.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Default ip-api.com endpoint
pub const DEFAULT_GEOLOCATION_URL: &str = "http://ip-api.com/json";

/// Where an IP address appears to be
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub country_code: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoLocation {
    /// Human-readable "City, Region, CC" label
    pub fn label(&self) -> String {
        [self.city.as_deref(), self.region.as_deref(), Some(self.country_code.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Geolocation failures
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Address is not publicly routable: {0}")]
    NotRoutable(String),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Geolocation lookup failed: {0}")]
    Lookup(String),

    #[error("Geolocation disabled")]
    Disabled,
}

/// Resolves IP addresses to locations
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: &str) -> Result<GeoLocation, GeoError>;
}

/// Whether a lookup for `ip` could possibly succeed
fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// ip-api.com JSON client
pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiLocator {
    /// `client` should carry its own request timeout
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| GeoError::InvalidAddress(ip.to_string()))?;
        if !is_public(&addr) {
            return Err(GeoError::NotRoutable(ip.to_string()));
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), addr);
        let body: IpApiResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.status != "success" {
            return Err(GeoError::Lookup(
                body.message.unwrap_or_else(|| body.status.clone()),
            ));
        }

        let country_code = body
            .country_code
            .filter(|cc| !cc.is_empty())
            .ok_or_else(|| GeoError::Lookup("missing country code".to_string()))?;

        Ok(GeoLocation {
            country_code,
            city: body.city,
            region: body.region_name,
            latitude: body.lat,
            longitude: body.lon,
        })
    }
}

/// Locator that never resolves anything
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLocator;

#[async_trait]
impl GeoLocator for DisabledLocator {
    async fn locate(&self, _ip: &str) -> Result<GeoLocation, GeoError> {
        Err(GeoError::Disabled)
    }
}
