//! HTTP client pool for maintaining persistent connections.
//!
//! Each base URL gets its own configured `reqwest::Client`, created on first use and
//! shared afterwards, so repeated gateway calls avoid DNS/TLS churn.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Global cache of HTTP clients indexed by base URL.
static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

/// Creates or retrieves a shared HTTP client for the given base URL.
///
/// The client is configured with:
/// - up to 16 idle connections per host
/// - 90-second idle timeout for persistent connections
/// - TCP keepalive to maintain long-lived connections
/// - 30-second connection timeout
///
/// When two callers race on a new base URL, both get the client that landed in the pool
/// first.
pub fn get_or_create_client(base_url: &str) -> Result<reqwest::Client, reqwest::Error> {
    if let Some(client) = CLIENT_POOL.get(base_url) {
        return Ok(client.clone());
    }
    let client = create_pooled_client()?;
    Ok(CLIENT_POOL
        .entry(base_url.to_string())
        .or_insert(client)
        .clone())
}

fn create_pooled_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_pool_caches_per_base_url() {
        let openai_url = "https://api.openai.com/v1";
        let local_url = "http://localhost:11434/v1";

        get_or_create_client(openai_url).unwrap();
        get_or_create_client(openai_url).unwrap();
        get_or_create_client(local_url).unwrap();

        assert!(CLIENT_POOL.contains_key(openai_url));
        assert!(CLIENT_POOL.contains_key(local_url));
        // Note: exact length depends on parallel tests
        assert!(CLIENT_POOL.len() >= 2);
    }

    #[test]
    fn test_repeated_lookups_keep_one_entry() {
        let url = "https://gateway.example.com/v1";
        for _ in 0..10 {
            get_or_create_client(url).unwrap();
        }
        assert_eq!(
            CLIENT_POOL.iter().filter(|entry| entry.key() == url).count(),
            1
        );
    }

    #[test]
    fn test_concurrent_first_use_shares_one_entry() {
        let url = "https://concurrent.example.com/v1";
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || get_or_create_client(url).is_ok()))
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert!(CLIENT_POOL.contains_key(url));
    }
}
