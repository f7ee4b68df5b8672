//! Certificate validity windows given as timestamps or relative durations.

use std::str::FromStr;

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::{IssuanceError, Result};

/// A bound given either as an RFC 3339 timestamp or as an offset from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrDuration {
    Time(OffsetDateTime),
    Duration(Duration),
}

impl TimeOrDuration {
    /// Absolute time relative to `now`.
    #[must_use]
    pub fn resolve(self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            Self::Time(at) => at,
            Self::Duration(offset) => now + offset,
        }
    }
}

impl FromStr for TimeOrDuration {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(at) = OffsetDateTime::parse(value, &Rfc3339) {
            return Ok(Self::Time(at));
        }
        parse_duration(value).map(Self::Duration)
    }
}

/// Requested validity window. `None` leaves the bound to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Validity {
    pub not_before: Option<OffsetDateTime>,
    pub not_after: Option<OffsetDateTime>,
}

impl Validity {
    /// Resolves both bounds against the current time.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve_at`].
    pub fn resolve(not_before: Option<&str>, not_after: Option<&str>) -> Result<Self> {
        Self::resolve_at(not_before, not_after, OffsetDateTime::now_utc())
    }

    /// Resolves both bounds against `now`. Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::InvalidOptionValue` for an unparsable bound and
    /// `IssuanceError::Configuration` when `not_before` is after `not_after`.
    pub fn resolve_at(
        not_before: Option<&str>,
        not_after: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Self> {
        let validity = Self {
            not_before: resolve_bound("not-before", not_before, now)?,
            not_after: resolve_bound("not-after", not_after, now)?,
        };
        if let (Some(start), Some(end)) = (validity.not_before, validity.not_after) {
            if start > end {
                return Err(IssuanceError::Configuration(format!(
                    "not-before ({}) must not be after not-after ({})",
                    format_rfc3339(start),
                    format_rfc3339(end)
                )));
            }
        }
        Ok(validity)
    }

    /// Whether neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.not_before.is_none() && self.not_after.is_none()
    }
}

fn resolve_bound(
    option: &'static str,
    value: Option<&str>,
    now: OffsetDateTime,
) -> Result<Option<OffsetDateTime>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<TimeOrDuration>()
            .map(|bound| Some(bound.resolve(now)))
            .map_err(|reason| IssuanceError::invalid_option(option, raw, reason)),
    }
}

pub(crate) fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Parses a duration such as `1h`, `30m`, `1h30m`, `-5m` or `90s`.
///
/// The magnitude goes through `humantime`; an optional leading sign and a
/// bare `0` are handled here.
///
/// # Errors
///
/// Returns a short reason when the value is not a duration.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let (negative, magnitude) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    if magnitude == "0" {
        return Ok(Duration::ZERO);
    }
    if magnitude.is_empty() {
        return Err("expected a timestamp or a duration such as 1h30m".to_owned());
    }
    let parsed = humantime::parse_duration(magnitude).map_err(|err| err.to_string())?;
    let duration =
        Duration::try_from(parsed).map_err(|_| "duration out of range".to_owned())?;
    Ok(if negative { -duration } else { duration })
}
