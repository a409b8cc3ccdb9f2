//! Bounded TTL cache for generated responses.
//!
//! Keyed by normalized query + conversation phase. Capacity-bounded with
//! oldest-inserted (FIFO) eviction; entries also expire after the TTL. A
//! cache hit never calls the provider.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::gateway::GeneratedResponse;
use crate::session::ConversationPhase;

struct CacheEntry {
    response: GeneratedResponse,
    inserted_at: Instant,
}

/// In-memory response cache. Not internally synchronized — the gateway
/// wraps it in a mutex since all operations are synchronous.
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order for FIFO eviction. May contain stale keys for
    /// entries that were replaced or expired; eviction skips those.
    order: VecDeque<String>,
    ttl: Duration,
    capacity: usize,
}

/// Cache key: conversation phase + normalized query (lowercased,
/// punctuation stripped, whitespace collapsed).
pub fn cache_key(query: &str, phase: ConversationPhase) -> String {
    let normalized: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{:?}|{}", phase, collapsed)
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    /// Look up a live entry, removing it if expired.
    pub fn get(&mut self, key: &str) -> Option<GeneratedResponse> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.response.clone())
    }

    /// Insert an entry, evicting the oldest inserted one on overflow.
    pub fn insert(&mut self, key: &str, response: GeneratedResponse) {
        if self.capacity == 0 {
            return;
        }

        let replacing = self.entries.contains_key(key);
        if !replacing {
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        // Skip stale order entries whose key was replaced.
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(key.to_string());
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ResponseSource;
    use crate::session::Intent;

    fn response(text: &str) -> GeneratedResponse {
        GeneratedResponse {
            text: text.to_string(),
            intent: Intent::GeneralInquiry,
            confidence: 0.9,
            should_escalate: false,
            source: ResponseSource::Provider,
        }
    }

    #[test]
    fn test_key_normalization() {
        let a = cache_key("What are your HOURS?!", ConversationPhase::Inquiry);
        let b = cache_key("what   are your hours", ConversationPhase::Inquiry);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_phase() {
        let a = cache_key("hello", ConversationPhase::Greeting);
        let b = cache_key("hello", ConversationPhase::Closing);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.insert("k1", response("cached"));
        assert_eq!(cache.get("k1").unwrap().text, "cached");
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = ResponseCache::new(Duration::from_millis(0), 10);
        cache.insert("k1", response("cached"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fifo_eviction_on_overflow() {
        let mut cache = ResponseCache::new(Duration::from_secs(60), 3);
        cache.insert("a", response("1"));
        cache.insert("b", response("2"));
        cache.insert("c", response("3"));
        cache.insert("d", response("4"));

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none(), "oldest inserted entry evicted");
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.insert("a", response("1"));
        cache.insert("a", response("1b"));
        cache.insert("b", response("2"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().text, "1b");
        assert!(cache.get("b").is_some());
    }
}
