//! Candidate credential sources consumed by the engine.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::bounded_cache::BoundedCache;
use crate::error::SourceError;
use crate::matching::{domains_match, extract_domain, normalize_host, relate_packages, PasswordEntry};

/// Read-only view of the vault, as far as autofill is concerned.
///
/// Only these two calls may suspend while a request is processed.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Every stored credential.
    async fn get_all_passwords(&self) -> Result<Vec<Arc<PasswordEntry>>, SourceError>;

    /// Credentials narrowed to a web domain and/or an app package.
    async fn search_passwords(
        &self,
        domain: Option<&str>,
        package_name: Option<&str>,
    ) -> Result<Vec<Arc<PasswordEntry>>, SourceError>;
}

/// Credentials held in memory; used by hosts that load the vault up front.
#[derive(Debug, Default)]
pub struct InMemoryCredentialSource {
    entries: RwLock<Vec<Arc<PasswordEntry>>>,
}

impl InMemoryCredentialSource {
    pub fn new(entries: impl IntoIterator<Item = PasswordEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn insert(&self, entry: PasswordEntry) {
        let mut entries = self.entries.write();
        entries.retain(|existing| existing.id != entry.id);
        entries.push(Arc::new(entry));
    }

    pub fn replace_all(&self, entries: impl IntoIterator<Item = PasswordEntry>) {
        *self.entries.write() = entries.into_iter().map(Arc::new).collect();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CredentialSource for InMemoryCredentialSource {
    async fn get_all_passwords(&self) -> Result<Vec<Arc<PasswordEntry>>, SourceError> {
        Ok(self.entries.read().clone())
    }

    /// Domain first; the package is only consulted when the domain finds
    /// nothing.
    async fn search_passwords(
        &self,
        domain: Option<&str>,
        package_name: Option<&str>,
    ) -> Result<Vec<Arc<PasswordEntry>>, SourceError> {
        let entries = self.entries.read();

        if let Some(requested) = domain.and_then(normalize_host) {
            let by_domain: Vec<_> = entries
                .iter()
                .filter(|entry| domains_match(&requested, &extract_domain(&entry.website)))
                .cloned()
                .collect();
            if !by_domain.is_empty() {
                return Ok(by_domain);
            }
        }

        Ok(match package_name.filter(|p| !p.trim().is_empty()) {
            Some(package) => entries
                .iter()
                .filter(|entry| relate_packages(package, &entry.app_package_name).is_some())
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }
}

/// Default lifetime of a cached candidate list.
pub const CANDIDATE_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

/// Default number of cached candidate lists.
pub const CANDIDATE_CACHE_MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    All,
    Search {
        domain: Option<String>,
        package_name: Option<String>,
    },
}

/// Decorator that remembers candidate lists for a short while, so repeated
/// callbacks for the same form do not hit the vault every time.
pub struct CachedCredentialSource<S> {
    inner: S,
    cache: Mutex<BoundedCache<CacheKey, Vec<Arc<PasswordEntry>>>>,
}

impl<S: CredentialSource> CachedCredentialSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_limits(inner, CANDIDATE_CACHE_TTL_MS, CANDIDATE_CACHE_MAX_ENTRIES)
    }

    pub fn with_limits(inner: S, ttl_ms: i64, max_entries: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(BoundedCache::new(ttl_ms, max_entries)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Forget every cached list, e.g. after the vault changed.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<Arc<PasswordEntry>>> {
        let now = Utc::now().timestamp_millis();
        let mut cache = self.cache.lock();
        cache.evict(now);
        cache.get(key).cloned()
    }

    fn store(&self, key: CacheKey, entries: &[Arc<PasswordEntry>]) {
        let now = Utc::now().timestamp_millis();
        self.cache.lock().insert(key, entries.to_vec(), now);
    }
}

#[async_trait]
impl<S: CredentialSource> CredentialSource for CachedCredentialSource<S> {
    async fn get_all_passwords(&self) -> Result<Vec<Arc<PasswordEntry>>, SourceError> {
        if let Some(hit) = self.lookup(&CacheKey::All) {
            debug!(target: "autofill::performance", count = hit.len(), "candidate cache hit");
            return Ok(hit);
        }
        let entries = self.inner.get_all_passwords().await?;
        self.store(CacheKey::All, &entries);
        Ok(entries)
    }

    async fn search_passwords(
        &self,
        domain: Option<&str>,
        package_name: Option<&str>,
    ) -> Result<Vec<Arc<PasswordEntry>>, SourceError> {
        let key = CacheKey::Search {
            domain: domain.map(str::to_lowercase),
            package_name: package_name.map(str::to_lowercase),
        };
        if let Some(hit) = self.lookup(&key) {
            debug!(target: "autofill::performance", count = hit.len(), "candidate cache hit");
            return Ok(hit);
        }
        let entries = self.inner.search_passwords(domain, package_name).await?;
        self.store(key, &entries);
        Ok(entries)
    }
}
