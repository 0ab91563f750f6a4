//! Login risk scoring against a user's recent session history.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::auth::{AuthResult, Session, UserId};
use crate::db::SessionRepository;

/// Number of recent valid sessions a login is compared against
pub const HISTORY_WINDOW: i64 = 10;

/// Score at or above which a login triggers a notification
pub const SUSPICIOUS_THRESHOLD: u8 = 50;

/// Points for a country not seen in the history
pub const NEW_LOCATION_WEIGHT: u8 = 30;

/// Points for a device not seen in the history
pub const NEW_DEVICE_WEIGHT: u8 = 20;

/// Points for an IP address not seen in the history
pub const NEW_IP_WEIGHT: u8 = 10;

/// Outcome of scoring one login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub is_new_location: bool,
    pub is_new_device: bool,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    pub fn is_suspicious(&self) -> bool {
        self.risk_score >= SUSPICIOUS_THRESHOLD
    }
}

/// Score a login against `history` (the user's recent valid sessions).
///
/// An unknown country never counts as a new location.
pub fn score_against_history(
    history: &[Session],
    device: &str,
    ip: &str,
    country: Option<&str>,
) -> RiskAssessment {
    if history.is_empty() {
        return RiskAssessment {
            risk_score: 0,
            is_new_location: false,
            is_new_device: false,
            reasons: vec!["First login".to_string()],
        };
    }

    let countries: HashSet<&str> = history
        .iter()
        .filter_map(|s| s.country_code.as_deref())
        .collect();
    let devices: HashSet<&str> = history.iter().map(|s| s.user_agent.as_str()).collect();
    let ips: HashSet<&str> = history.iter().map(|s| s.ip_address.as_str()).collect();

    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    let is_new_location = country.is_some_and(|cc| !countries.contains(cc));
    if is_new_location {
        score += u32::from(NEW_LOCATION_WEIGHT);
        reasons.push(format!("New location: {}", country.unwrap_or_default()));
    }

    let is_new_device = !devices.contains(device);
    if is_new_device {
        score += u32::from(NEW_DEVICE_WEIGHT);
        reasons.push("New device".to_string());
    }

    if !ips.contains(ip) {
        score += u32::from(NEW_IP_WEIGHT);
        reasons.push("New IP address".to_string());
    }

    RiskAssessment {
        risk_score: score.min(100) as u8,
        is_new_location,
        is_new_device,
        reasons,
    }
}

/// Scores logins using the session store
#[derive(Clone)]
pub struct RiskScorer {
    sessions: Arc<dyn SessionRepository>,
}

impl RiskScorer {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// Assess a login attempt for `user_id`
    pub async fn assess(
        &self,
        user_id: UserId,
        device: &str,
        ip: &str,
        country: Option<&str>,
    ) -> AuthResult<RiskAssessment> {
        let history = self
            .sessions
            .recent_valid_sessions(user_id, HISTORY_WINDOW)
            .await?;
        Ok(score_against_history(&history, device, ip, country))
    }
}
