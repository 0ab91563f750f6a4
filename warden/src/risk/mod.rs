//! Login risk assessment: geolocation lookup and history-based scoring.

pub mod geo;
pub mod scorer;

pub use geo::{DisabledLocator, GeoError, GeoLocation, GeoLocator, IpApiLocator};
pub use scorer::{RiskAssessment, RiskScorer, SUSPICIOUS_THRESHOLD, score_against_history};
