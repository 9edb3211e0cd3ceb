//! Composite id codec
//!
//! SensorThings entities that do not exist as first-class twin objects are
//! addressed with `~`-joined composite ids: `provider`,
//! `provider~timestampHex`, `provider~service~resource` or
//! `provider~service~resource~timestampHex`. The trailing segment, when
//! present, is the lowercase-hex encoding of an epoch-millisecond instant
//! and round-trips losslessly at millisecond precision.
//!
//! Segments are never escaped; provider, service and resource names must
//! not contain `~` themselves, which [`validated_provider_id`] enforces at
//! the trust boundary.

use chrono::{DateTime, Utc};

use sensorgate_common::{GatewayError, Result};

/// The id segment before the first `~`.
///
/// An id without `~` is returned whole. Empty ids and ids with a leading or
/// trailing `~` are malformed.
pub fn extract_first_id_segment(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(GatewayError::invalid_id());
    }
    match id.find('~') {
        None => Ok(id),
        Some(0) => Err(GatewayError::invalid_id()),
        Some(idx) if idx == id.len() - 1 => Err(GatewayError::invalid_id()),
        Some(idx) => Ok(&id[..idx]),
    }
}

/// The `n`-th `~`-separated segment, if present.
pub fn id_segment(id: &str, n: usize) -> Option<&str> {
    id.split('~').nth(n).filter(|s| !s.is_empty())
}

/// The second id segment, e.g. the service name of `p~s~r`.
pub fn second_id_segment(id: &str) -> Option<&str> {
    id_segment(id, 1)
}

/// The third id segment, e.g. the resource name of `p~s~r`.
pub fn third_id_segment(id: &str) -> Option<&str> {
    id_segment(id, 2)
}

/// Decode the timestamp encoded after the last `~` of an id.
pub fn timestamp_from_id(id: &str) -> Result<DateTime<Utc>> {
    let idx = id.rfind('~').ok_or_else(GatewayError::invalid_id)?;
    if idx == id.len() - 1 {
        return Err(GatewayError::invalid_id());
    }
    let millis =
        i64::from_str_radix(&id[idx + 1..], 16).map_err(|_| GatewayError::invalid_id())?;
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(GatewayError::invalid_id)
}

/// Reject ids that span more than one segment.
pub fn validated_provider_id(id: &str) -> Result<()> {
    if id.contains('~') {
        return Err(GatewayError::BadRequest(
            "Multi-segments ID found".to_string(),
        ));
    }
    Ok(())
}

/// Hex encoding of an instant at millisecond precision.
pub fn timestamp_hex(time: DateTime<Utc>) -> String {
    format!("{:x}", time.timestamp_millis())
}

/// `provider~timestampHex`, the Location / HistoricalLocation id form.
pub fn historical_id(provider: &str, time: DateTime<Utc>) -> String {
    format!("{}~{}", provider, timestamp_hex(time))
}

/// `provider~service~resource`, the Datastream / Sensor / ObservedProperty
/// id form.
pub fn resource_id(provider: &str, service: &str, resource: &str) -> String {
    format!("{provider}~{service}~{resource}")
}

/// `provider~service~resource~timestampHex`, the Observation id form.
pub fn observation_id(
    provider: &str,
    service: &str,
    resource: &str,
    time: DateTime<Utc>,
) -> String {
    format!("{provider}~{service}~{resource}~{}", timestamp_hex(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_log::test;

    #[test]
    fn test_first_segment_of_composite_id() {
        assert_eq!(extract_first_id_segment("p~s~r~4d2").unwrap(), "p");
        assert_eq!(extract_first_id_segment("provider~1f").unwrap(), "provider");
    }

    #[test]
    fn test_first_segment_without_separator_is_whole_id() {
        assert_eq!(extract_first_id_segment("weather-42").unwrap(), "weather-42");
    }

    #[test]
    fn test_first_segment_rejects_malformed_boundaries() {
        assert!(extract_first_id_segment("").is_err());
        assert!(extract_first_id_segment("~p").is_err());
        assert!(extract_first_id_segment("p~").is_err());
    }

    #[test]
    fn test_segment_indexing() {
        assert_eq!(second_id_segment("p~s~r"), Some("s"));
        assert_eq!(third_id_segment("p~s~r"), Some("r"));
        assert_eq!(third_id_segment("p~s"), None);
        assert_eq!(second_id_segment("p"), None);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        let id = observation_id("p", "s", "r", time);
        assert_eq!(id, format!("p~s~r~{:x}", time.timestamp_millis()));
        assert_eq!(timestamp_from_id(&id).unwrap(), time);

        let hex = timestamp_hex(time);
        assert_eq!(timestamp_hex(timestamp_from_id(&format!("p~{hex}")).unwrap()), hex);
    }

    #[test]
    fn test_timestamp_requires_separator_and_hex() {
        assert!(timestamp_from_id("no-separator").is_err());
        assert!(timestamp_from_id("p~").is_err());
        assert!(timestamp_from_id("p~zz-not-hex").is_err());
    }

    #[test]
    fn test_validated_provider_id() {
        assert!(validated_provider_id("simple").is_ok());
        assert!(validated_provider_id("has~separator").is_err());
        assert!(validated_provider_id("a~b~c").is_err());
    }

    #[test]
    fn test_historical_id_uses_lowercase_hex() {
        let time = DateTime::<Utc>::from_timestamp_millis(0xABCDEF).unwrap();
        assert_eq!(historical_id("p", time), "p~abcdef");
    }
}
