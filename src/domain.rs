//! Pipeline domains
//!
//! A domain identifies the market a pipeline runs against: a country code
//! plus the name of the trading calendar that defines its sessions. The
//! `Generic` variant marks declarations and terms that have not been bound
//! to a market yet.

use crate::calendar::CalendarProvider;
use crate::error::{PipelineError, Result};
use crate::types::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete market, or the unbound placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Not yet bound to a market
    Generic,
    /// A concrete market
    Market {
        /// ISO 3166 country code, e.g. "US"
        country_code: String,
        /// Calendar name resolvable through a `CalendarProvider`
        calendar_name: String,
    },
}

impl Domain {
    pub fn market(country_code: impl Into<String>, calendar_name: impl Into<String>) -> Self {
        Domain::Market {
            country_code: country_code.into(),
            calendar_name: calendar_name.into(),
        }
    }

    /// US equities trading on NYSE sessions
    pub fn us_equities() -> Self {
        Self::market("US", "NYSE")
    }

    /// Canadian equities trading on TSX sessions
    pub fn canada_equities() -> Self {
        Self::market("CA", "TSX")
    }

    /// UK equities trading on LSE sessions
    pub fn uk_equities() -> Self {
        Self::market("GB", "LSE")
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Domain::Generic)
    }

    pub fn country_code(&self) -> Option<&str> {
        match self {
            Domain::Generic => None,
            Domain::Market { country_code, .. } => Some(country_code),
        }
    }

    pub fn calendar_name(&self) -> Option<&str> {
        match self {
            Domain::Generic => None,
            Domain::Market { calendar_name, .. } => Some(calendar_name),
        }
    }

    /// All valid sessions for this domain's calendar
    pub fn all_sessions(&self, provider: &dyn CalendarProvider) -> Result<Vec<Session>> {
        match self {
            Domain::Generic => Err(PipelineError::Domain(
                "generic domain has no sessions".to_string(),
            )),
            Domain::Market { calendar_name, .. } => Ok(provider
                .get_calendar(calendar_name)?
                .sessions()
                .to_vec()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Domain::Generic => write!(f, "GENERIC"),
            Domain::Market {
                country_code,
                calendar_name,
            } => write!(f, "{}/{}", country_code, calendar_name),
        }
    }
}

/// Infer the domain for a collection of domain-bearing items.
///
/// - No concrete domain present: the result is `Generic`.
/// - Exactly one concrete domain present (possibly mixed with generics):
///   that domain.
/// - Two or more distinct concrete domains: `AmbiguousDomain`, carrying
///   the conflicting domains sorted by country code.
pub fn infer_domain<'a, I>(domains: I) -> Result<Domain>
where
    I: IntoIterator<Item = &'a Domain>,
{
    let mut concrete: Vec<Domain> = Vec::new();
    for domain in domains {
        if !domain.is_generic() && !concrete.contains(domain) {
            concrete.push(domain.clone());
        }
    }
    match concrete.len() {
        0 => Ok(Domain::Generic),
        1 => Ok(concrete.remove(0)),
        _ => {
            concrete.sort_by(|a, b| a.country_code().cmp(&b.country_code()));
            Err(PipelineError::AmbiguousDomain(concrete))
        }
    }
}
