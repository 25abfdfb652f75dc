//! Retention policy parsing and pure expiry calculations, shared by
//! shadow columns and backups.

use chrono::{DateTime, Duration, Utc};

use crate::error::CollateralError;

/// Parses a retention policy string of the form `"{n}d"` into a day count.
pub fn parse_retention_days(policy: &str) -> Result<i64, CollateralError> {
    let digits = policy.strip_suffix('d').ok_or_else(|| CollateralError::InvalidRetentionPolicy {
        policy: policy.to_string(),
        reason: "expected a trailing 'd', e.g. \"30d\"".to_string(),
    })?;
    digits.parse::<i64>().map_err(|_| CollateralError::InvalidRetentionPolicy {
        policy: policy.to_string(),
        reason: "expected an integer day count before 'd'".to_string(),
    })
}

/// Whether `created_at + retention` has elapsed as of `now`. A pure
/// function of timestamp and retention, per the contract.
pub fn is_expired(created_at: DateTime<Utc>, retention_days: i64, now: DateTime<Utc>) -> bool {
    now >= created_at + Duration::days(retention_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_day_counts() {
        assert_eq!(parse_retention_days("30d").unwrap(), 30);
        assert_eq!(parse_retention_days("1d").unwrap(), 1);
    }

    #[test]
    fn rejects_malformed_policies() {
        assert!(parse_retention_days("30").is_err());
        assert!(parse_retention_days("xd").is_err());
    }

    #[test]
    fn expiry_is_a_pure_function_of_timestamp_and_retention() {
        let created = Utc::now() - Duration::days(31);
        assert!(is_expired(created, 30, Utc::now()));
        let created = Utc::now() - Duration::days(1);
        assert!(!is_expired(created, 30, Utc::now()));
    }
}
