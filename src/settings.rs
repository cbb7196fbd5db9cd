use crate::error::{Result, ServerError};
use std::collections::HashSet;

/// Validated configuration for a [`Socket`][crate::Socket].
///
/// Built from an ordered list of string key/value pairs via [`Settings::parse`], mirroring the
/// name/value configuration style used to bind a server implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// TCP port to listen on.
    pub port: u16,
    /// Whether to require TLS (SNI certificate resolution) on accepted connections.
    pub https: bool,
    /// Size of the worker thread pool.
    pub num_threads: u16,
    /// Idle-read timeout applied to each connection, in seconds.
    pub connection_timeout_sec: u32,
    /// Maximum number of concurrently accepted connections.
    pub connection_limit: u32,
    /// Maximum number of concurrently accepted connections per remote IP, or 0 for unlimited.
    pub per_ip_connection_limit: u32,
}

impl Settings {
    /// Parse settings from an ordered sequence of `(key, value)` pairs.
    ///
    /// Unknown keys, duplicate keys, and out-of-range values are rejected. `port` is the only
    /// required key; all others fall back to their documented defaults.
    pub fn parse<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut port: Option<u16> = None;
        let mut https = false;
        let mut num_threads: u16 = 4;
        let mut connection_timeout_sec: u32 = 120;
        let mut connection_limit: u32 = 1000;
        let mut per_ip_connection_limit: u32 = 0;

        for (key, value) in entries {
            let key = key.as_ref();
            let value = value.as_ref();

            if !seen.insert(key.to_string()) {
                return Err(ServerError::DuplicateKey(key.to_string()));
            }

            match key {
                "port" => port = Some(parse_bounded(key, value, 1, u16::MAX as u64)? as u16),
                "https" => https = parse_bool(key, value)?,
                "threads" => num_threads = parse_bounded(key, value, 1, u16::MAX as u64)? as u16,
                "connection-timeout" => {
                    connection_timeout_sec = parse_bounded(key, value, 1, u32::MAX as u64)? as u32
                }
                "connection-limit" => {
                    connection_limit = parse_bounded(key, value, 1, u32::MAX as u64)? as u32
                }
                "per-ip-connection-limit" => {
                    per_ip_connection_limit = parse_bounded(key, value, 1, u32::MAX as u64)? as u32
                }
                other => return Err(ServerError::UnknownKey(other.to_string())),
            }
        }

        let port = port.ok_or_else(|| ServerError::MissingRequired("port".into()))?;

        Ok(Self {
            port,
            https,
            num_threads,
            connection_timeout_sec,
            connection_limit,
            per_ip_connection_limit,
        })
    }

    /// Re-serialize these settings as the ordered key/value pairs [`Settings::parse`] would
    /// accept back. Only the explicitly-representable keys are emitted; this round-trips for
    /// equality under [`Settings::parse`].
    pub fn to_entries(self) -> Vec<(&'static str, String)> {
        vec![
            ("port", self.port.to_string()),
            ("https", self.https.to_string()),
            ("threads", self.num_threads.to_string()),
            ("connection-timeout", self.connection_timeout_sec.to_string()),
            ("connection-limit", self.connection_limit.to_string()),
            (
                "per-ip-connection-limit",
                self.per_ip_connection_limit.to_string(),
            ),
        ]
    }
}

fn parse_bounded(key: &str, value: &str, min: u64, max: u64) -> Result<u64> {
    let parsed: u64 = value.parse().map_err(|_| ServerError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    if parsed < min || parsed > max {
        return Err(ServerError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ServerError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = Settings::parse(entries(&[("port", "8080")])).unwrap();
        assert_eq!(settings.port, 8080);
        assert!(!settings.https);
        assert_eq!(settings.num_threads, 4);
        assert_eq!(settings.connection_timeout_sec, 120);
        assert_eq!(settings.connection_limit, 1000);
        assert_eq!(settings.per_ip_connection_limit, 0);
    }

    #[test]
    fn missing_port_is_rejected() {
        let err = Settings::parse(entries(&[("threads", "8")])).unwrap_err();
        assert!(matches!(err, ServerError::MissingRequired(k) if k == "port"));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let err =
            Settings::parse(entries(&[("port", "80"), ("port", "81")])).unwrap_err();
        assert!(matches!(err, ServerError::DuplicateKey(k) if k == "port"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Settings::parse(entries(&[("port", "80"), ("bogus", "x")])).unwrap_err();
        assert!(matches!(err, ServerError::UnknownKey(k) if k == "bogus"));
    }

    #[test]
    fn zero_value_is_rejected_for_bounded_keys() {
        let err = Settings::parse(entries(&[("port", "80"), ("threads", "0")])).unwrap_err();
        assert!(matches!(err, ServerError::InvalidValue { key, .. } if key == "threads"));
    }

    #[test]
    fn https_accepts_textual_variants() {
        for (value, expected) in [("true", true), ("TRUE", true), ("1", true), ("false", false), ("0", false)] {
            let settings =
                Settings::parse(entries(&[("port", "80"), ("https", value)])).unwrap();
            assert_eq!(settings.https, expected, "value was {value}");
        }
    }

    #[test]
    fn per_ip_connection_limit_defaults_to_unlimited() {
        let settings = Settings::parse(entries(&[("port", "80")])).unwrap();
        assert_eq!(settings.per_ip_connection_limit, 0);
    }

    #[test]
    fn roundtrip_through_entries() {
        let original =
            Settings::parse(entries(&[("port", "443"), ("https", "true"), ("threads", "8")]))
                .unwrap();
        let reparsed = Settings::parse(original.to_entries()).unwrap();
        assert_eq!(original, reparsed);
    }
}
