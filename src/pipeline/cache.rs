//! Run-scoped map from result keys to published file references.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::export::ResultKind;

/// Cache key of one exported table: `<instance_id>_<kind>`.
///
/// ```
/// use redis_key_analysis::export::ResultKind;
/// use redis_key_analysis::pipeline::cache_key;
///
/// assert_eq!(cache_key("r-bp1abc", ResultKind::TopPrefix), "r-bp1abc_topprefix");
/// ```
pub fn cache_key(instance_id: &str, kind: ResultKind) -> String {
    format!("{}_{}", instance_id, kind.as_str())
}

/// Shared, clonable result cache.
///
/// Every instance task holds a clone and writes its own keys. The summary is
/// composed from a [`snapshot`](Self::snapshot) taken after all tasks joined.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the published reference of one instance's table.
    pub async fn record(&self, instance_id: &str, kind: ResultKind, reference: impl Into<String>) {
        self.insert(cache_key(instance_id, kind), reference).await;
    }

    pub async fn insert(&self, key: impl Into<String>, reference: impl Into<String>) {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.insert(key.clone(), reference.into()) {
            warn!(key = %key, previous = %previous, "Result cache entry overwritten");
        }
    }


    /// Copy of every entry recorded so far.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("r-1", ResultKind::TopPrefix), "r-1_topprefix");
        assert_eq!(cache_key("r-1", ResultKind::TopBigMem), "r-1_topbigmem");
    }

    #[tokio::test]
    async fn test_record_and_snapshot() {
        let cache = ResultCache::new();
        assert!(cache.snapshot().await.is_empty());

        cache.record("r-1", ResultKind::TopPrefix, "[a](/a)").await;
        cache.insert("r-1_topprefix", "[b](/b)").await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("r-1_topprefix").map(String::as_str), Some("[b](/b)"));
        assert!(!snapshot.contains_key("r-1_topbigmem"));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let cache = ResultCache::new();
        let mut handles = Vec::new();

        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let instance = format!("r-{}", i);
                cache.record(&instance, ResultKind::TopPrefix, format!("p{}", i)).await;
                cache.record(&instance, ResultKind::TopBigMem, format!("b{}", i)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 64);
        assert_eq!(snapshot.get("r-7_topbigmem").map(String::as_str), Some("b7"));
    }
}
