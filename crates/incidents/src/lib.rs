//! Incident-management API client for uptime-healer.
//!
//! Mirrors downtime, recovery and fix outcomes to an external incident API and
//! manages the monitor registered there. Unlike chat notifications, callers
//! need to know whether these calls worked, so every call carries a retry
//! policy:
//!
//! - HTTP 429: exponential backoff (`2^attempt` × unit) before the next attempt
//! - HTTP 401: abort immediately, credentials are not transiently invalid
//! - anything else: fixed delay, retried up to `retry_attempts`
//!
//! # Example
//!
//! ```no_run
//! use incidents::{IncidentClient, IncidentSeverity, NewIncident};
//!
//! # async fn example() -> Result<(), incidents::IncidentError> {
//! let client = IncidentClient::from_env()?;
//!
//! let incident = client
//!     .create_incident(&NewIncident::open(
//!         "uptime-healer",
//!         "Website Downtime: https://example.com",
//!         "HTTP 503",
//!         IncidentSeverity::Medium,
//!     ))
//!     .await?;
//! # let _ = incident;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! - `PORTIA_API_KEY`: bearer token (client is disabled without it)
//! - `PORTIA_BASE_URL`: API base URL
//! - `PORTIA_ORG_ID`: optional organization header
//! - `PORTIA_TIMEOUT`: request timeout in seconds (default 30)
//! - `PORTIA_RETRY_ATTEMPTS`: attempts per call (default 3)

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::{backoff_delay, IncidentClient};
pub use config::{Endpoints, IncidentConfig};
pub use error::{IncidentError, IncidentResult};
pub use models::{
    Incident, IncidentFilter, IncidentSeverity, IncidentStatus, IncidentUpdate, Monitor,
    NewIncident, NewMonitor,
};
