//! Description of tracker relay endpoints used for peer discovery.

use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::RelayUrlError;

/// One tracker relay endpoint. Relays are websocket signaling servers,
/// so only `ws` and `wss` schemes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    /// Parsed endpoint url.
    pub url: Url,
}

impl RelayEndpoint {
    /// Parse a comma-separated relay url list, as it appears in configs.
    pub fn vec_from_str(s: &str) -> Result<Vec<Self>, RelayUrlError> {
        s.split(',')
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(Self::from_str)
            .collect()
    }
}

impl FromStr for RelayEndpoint {
    type Err = RelayUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RelayUrlError::SchemeNotSupported(url.scheme().to_string()));
        }

        if url.host().is_none() {
            return Err(RelayUrlError::UrlMissHost);
        }

        Ok(Self { url })
    }
}

impl std::fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_relay() {
        let relay = RelayEndpoint::from_str("wss://tracker.example.com:8443/announce").unwrap();
        assert_eq!(relay.url.scheme(), "wss");
        assert_eq!(relay.url.host_str(), Some("tracker.example.com"));
    }

    #[test]
    fn test_reject_non_websocket_scheme() {
        assert!(matches!(
            RelayEndpoint::from_str("https://tracker.example.com"),
            Err(RelayUrlError::SchemeNotSupported(_))
        ));
    }

    #[test]
    fn test_vec_from_str() {
        let relays =
            RelayEndpoint::vec_from_str("wss://a.example.com, wss://b.example.com ,ws://c.example.com:7000")
                .unwrap();
        assert_eq!(relays.len(), 3);
        assert_eq!(relays[2].url.port(), Some(7000));
    }

    #[test]
    fn test_vec_from_str_propagates_bad_entry() {
        assert!(RelayEndpoint::vec_from_str("wss://a.example.com,stun://b.example.com").is_err());
    }
}
