//! Content-addressed memoization of image inspections (SPEC_FULL.md §4.1).
//!
//! Consulted only when at least one argument contains `@sha256:`; a backend
//! fault degrades to a direct call rather than propagating, and there is no
//! negative caching. Pluggable backend, grounded on the worker-pool
//! pattern's "a trait boundary with one real and one in-memory impl" shape
//! used throughout the teacher's db layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
}

/// The default backend. An external memcached-like backend is a pluggable
/// alternative (SPEC_FULL.md §4.1 "Backend is pluggable"); this crate ships
/// only the in-process one since the spec does not mandate a particular
/// external cache wire protocol.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: Mutex<HashMap<String, (serde_json::Value, Instant)>>,
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }
}

/// Cache key = hash of (function name, arguments), joined with `|` before
/// hashing so argument boundaries can't collide.
pub fn cache_key(function_name: &str, args: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(function_name.as_bytes());
    for arg in args {
        hasher.update(b"|");
        hasher.update(arg.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// An argument list is content-addressable, and therefore cacheable, only
/// when at least one argument pins a digest.
pub fn is_content_addressable(args: &[&str]) -> bool {
    args.iter().any(|a| a.contains("@sha256:"))
}

#[derive(Clone)]
pub struct InspectCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl InspectCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Memoize `inspect`-shaped calls: consult the cache only when
    /// content-addressable, and never let a backend fault surface — it
    /// degrades straight to calling `f`.
    pub async fn get_or_inspect<F, Fut>(
        &self,
        function_name: &str,
        args: &[&str],
        f: F,
    ) -> serde_json::Value
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = serde_json::Value>,
    {
        if !is_content_addressable(args) {
            return f().await;
        }

        let key = cache_key(function_name, args);
        if let Some(cached) = self.backend.get(&key).await {
            return cached;
        }

        let value = f().await;
        self.backend.set(&key, value.clone(), self.ttl).await;
        value
    }
}

/// A backend whose every call fails, to exercise the "degrade to direct
/// call" requirement without a real network dependency.
#[cfg(test)]
struct FaultyBackend;

#[cfg(test)]
#[async_trait]
impl CacheBackend for FaultyBackend {
    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        warn!("cache backend fault on get");
        None
    }

    async fn set(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) {
        warn!("cache backend fault on set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cache_key_stable_for_equivalent_args() {
        let a = cache_key("inspect", &["docker://img@sha256:AAA"]);
        let b = cache_key("inspect", &["docker://img@sha256:AAA"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_free_args_are_not_content_addressable() {
        assert!(!is_content_addressable(&["docker://img:tag"]));
        assert!(is_content_addressable(&["docker://img@sha256:AAA"]));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_second_call() {
        let cache = InspectCache::new(Arc::new(InMemoryCacheBackend::default()), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_inspect("inspect", &["docker://img@sha256:AAA"], || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    serde_json::json!({"digest": "sha256:AAA"})
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_digest_free_calls_always_invoke_f() {
        let cache = InspectCache::new(Arc::new(InMemoryCacheBackend::default()), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_inspect("inspect", &["docker://img:tag"], || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    serde_json::json!({"digest": "sha256:BBB"})
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_faulty_backend_degrades_to_direct_call() {
        let cache = InspectCache::new(Arc::new(FaultyBackend), Duration::from_secs(60));
        let value = cache
            .get_or_inspect("inspect", &["docker://img@sha256:AAA"], || async move {
                serde_json::json!({"digest": "sha256:AAA"})
            })
            .await;
        assert_eq!(value["digest"], "sha256:AAA");
    }
}
