//! Query cache keyed by resource identity.
//!
//! DESIGN
//! ======
//! Entries live in a `HashMap<QueryKey, Entry>` behind a std mutex that is
//! never held across an `.await`. Values are type-erased (`Arc<dyn Any>`) so
//! one cache can hold pages, records, and users; typed access downcasts at the
//! edge.
//!
//! ORDERING
//! ========
//! Every fetch for a key is stamped with a generation from a per-key counter.
//! A completion is applied only if its generation is newer than the value
//! already stored, so a slow early response cannot overwrite a fresher one.
//! Invalidation records the newest issued generation as the stale horizon:
//! anything fetched at or below it is stale, including fetches still in flight.
//! `clear` bumps a cache-wide epoch so completions from before a logout are
//! dropped instead of repopulating the cache.
//!
//! DEDUPLICATION
//! =============
//! Plain reads join an existing in-flight fetch via `futures::future::Shared`.
//! A forced refresh, or any read after invalidation, starts a new generation.
//! Each in-flight fetch counts its waiters; when the last one is dropped
//! before completion the fetch is cancelled and the key stops reporting
//! `Fetching`.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;

use crate::error::ApiError;
use crate::types::{AnimationQuery, MarketplaceFeed};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// KEYS AND STATES
// =============================================================================

/// Composite identity of a cached resource: kind plus parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Animations(AnimationQuery),
    Animation(String),
    CurrentUser,
    UserProfile(String),
    UserAnimations(String),
    /// A marketplace feed page.
    Marketplace(MarketplaceFeed, u32),
}

impl QueryKey {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Animations(_) => "animations",
            Self::Animation(_) => "animation",
            Self::CurrentUser => "current_user",
            Self::UserProfile(_) => "user_profile",
            Self::UserAnimations(_) => "user_animations",
            Self::Marketplace(..) => "marketplace",
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Animations(query) => {
                write!(f, "animations")?;
                for (name, value) in query.to_pairs() {
                    write!(f, " {name}={value}")?;
                }
                Ok(())
            }
            Self::Animation(id) => write!(f, "animation {id}"),
            Self::CurrentUser => write!(f, "current_user"),
            Self::UserProfile(username) => write!(f, "user_profile {username}"),
            Self::UserAnimations(username) => write!(f, "user_animations {username}"),
            Self::Marketplace(feed, page) => write!(f, "marketplace {} page={page}", feed.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Fetching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Serve a fresh value if present, otherwise fetch (joining any in-flight fetch).
    #[default]
    CacheFirst,
    /// Always start a new fetch.
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Cleared,
}

/// Handle for one issued fetch. Completing it applies the result if still newest.
#[derive(Debug)]
pub struct Ticket {
    key: QueryKey,
    epoch: u64,
    generation: u64,
}

impl Ticket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

type Value = Arc<dyn Any + Send + Sync>;
type FetchResult = Result<Value, ApiError>;

struct InFlight {
    generation: u64,
    fetch: Shared<BoxFuture<'static, FetchResult>>,
    waiters: usize,
}

#[derive(Default)]
struct Entry {
    value: Option<Value>,
    fetched_at: Option<Instant>,
    error: Option<ApiError>,
    /// Newest generation handed out.
    issued: u64,
    /// Generation of the stored value.
    applied: u64,
    /// Values at or below this generation are stale.
    stale_through: u64,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn fresh_value(&self, stale_time: Duration) -> Option<Value> {
        let value = self.value.as_ref()?;
        let fetched_at = self.fetched_at?;
        let fresh = self.applied > self.stale_through && fetched_at.elapsed() < stale_time;
        fresh.then(|| value.clone())
    }

    fn freshness(&self, stale_time: Duration) -> Freshness {
        if self.in_flight.is_some() {
            Freshness::Fetching
        } else if self.fresh_value(stale_time).is_some() {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, Entry>,
    epoch: u64,
}

// =============================================================================
// CACHE
// =============================================================================

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
    events: broadcast::Sender<CacheEvent>,
    stale_time: Duration,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.lock().entries.len())
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new(stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { inner: Arc::new(Mutex::new(CacheInner::default())), events, stale_time }
    }

    #[must_use]
    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Read through the cache.
    ///
    /// `fetcher` is only called when a new fetch must start; it should build
    /// the request future and return without doing work. Dropping the
    /// returned future withdraws this caller's interest; a shared in-flight
    /// fetch keeps running only while another caller polls it.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or a validation failure if the cached value
    /// for `key` has a different type than `T`.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, policy: FetchPolicy, fetcher: F) -> Result<Arc<T>, ApiError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (ticket, fetch) = {
            let mut inner = self.lock();
            let epoch = inner.epoch;
            let entry = inner.entries.entry(key.clone()).or_default();

            let joined = match policy {
                FetchPolicy::CacheFirst => {
                    if let Some(value) = entry.fresh_value(self.stale_time) {
                        tracing::trace!(%key, "cache hit");
                        return downcast(&key, value);
                    }
                    entry.in_flight.as_mut().map(|in_flight| {
                        in_flight.waiters += 1;
                        (in_flight.generation, in_flight.fetch.clone())
                    })
                }
                FetchPolicy::Refresh => None,
            };

            match joined {
                Some((generation, fetch)) => {
                    tracing::trace!(%key, generation, "joining in-flight fetch");
                    (Ticket { key: key.clone(), epoch, generation }, fetch)
                }
                None => {
                    entry.issued += 1;
                    let generation = entry.issued;
                    let request = fetcher();
                    let fetch = async move { request.await.map(|value| Arc::new(value) as Value) }.boxed().shared();
                    entry.in_flight = Some(InFlight { generation, fetch: fetch.clone(), waiters: 1 });
                    tracing::debug!(%key, generation, ?policy, "cache fetch started");
                    (Ticket { key: key.clone(), epoch, generation }, fetch)
                }
            }
        };

        let _waiter = Waiter { cache: self, ticket: &ticket };
        let (current, _) = self.settle(&ticket, fetch.await);
        downcast(&key, current?)
    }

    /// One caller stopped waiting on `ticket`. The last one to leave an
    /// unsettled fetch cancels it.
    fn leave(&self, ticket: &Ticket) {
        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            return;
        }
        let Some(entry) = inner.entries.get_mut(&ticket.key) else {
            return;
        };
        let abandoned = match entry.in_flight.as_mut() {
            Some(in_flight) if in_flight.generation == ticket.generation => {
                in_flight.waiters = in_flight.waiters.saturating_sub(1);
                in_flight.waiters == 0
            }
            _ => false,
        };
        if abandoned {
            entry.in_flight = None;
            tracing::debug!(key = %ticket.key, generation = ticket.generation, "fetch cancelled by every caller");
        }
    }

    /// Issue a generation for `key` without fetching. Pair with [`Self::complete`].
    #[must_use]
    pub fn begin(&self, key: &QueryKey) -> Ticket {
        let mut inner = self.lock();
        let epoch = inner.epoch;
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.issued += 1;
        Ticket { key: key.clone(), epoch, generation: entry.issued }
    }

    /// Apply the outcome of a [`Self::begin`] ticket.
    ///
    /// Returns `true` if the value was stored; `false` if it was an error, or
    /// older than what the cache already holds, or issued before a `clear`.
    pub fn complete<T: Any + Send + Sync>(&self, ticket: Ticket, result: Result<T, ApiError>) -> bool {
        let result = result.map(|value| Arc::new(value) as Value);
        self.settle(&ticket, result).1
    }

    /// Record a completion. Returns the value callers should see and whether
    /// this completion was stored.
    fn settle(&self, ticket: &Ticket, result: FetchResult) -> (FetchResult, bool) {
        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            tracing::debug!(key = %ticket.key, "dropping completion issued before cache clear");
            return (result, false);
        }
        let Some(entry) = inner.entries.get_mut(&ticket.key) else {
            return (result, false);
        };
        if entry.in_flight.as_ref().is_some_and(|f| f.generation == ticket.generation) {
            entry.in_flight = None;
        }

        match result {
            Ok(value) => {
                if ticket.generation > entry.applied {
                    entry.value = Some(value.clone());
                    entry.applied = ticket.generation;
                    entry.fetched_at = Some(Instant::now());
                    entry.error = None;
                    drop(inner);
                    self.emit(CacheEvent::Updated(ticket.key.clone()));
                    return (Ok(value), true);
                }
                if ticket.generation < entry.applied {
                    tracing::debug!(
                        key = %ticket.key,
                        generation = ticket.generation,
                        applied = entry.applied,
                        "discarding out-of-order completion"
                    );
                }
                (Ok(entry.value.clone().unwrap_or(value)), false)
            }
            Err(error) => {
                if ticket.generation >= entry.applied {
                    entry.error = Some(error.clone());
                }
                (Err(error), false)
            }
        }
    }

    /// Mark every key matching `predicate` stale. Returns how many matched.
    ///
    /// In-flight fetches for matching keys are detached: their results may
    /// still land, but they count as stale and the next read fetches anew.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool,
    {
        let invalidated: Vec<QueryKey> = {
            let mut inner = self.lock();
            inner
                .entries
                .iter_mut()
                .filter(|(key, _)| predicate(key))
                .map(|(key, entry)| {
                    entry.stale_through = entry.issued;
                    entry.in_flight = None;
                    key.clone()
                })
                .collect()
        };
        for key in &invalidated {
            tracing::debug!(%key, "cache key invalidated");
            self.emit(CacheEvent::Invalidated(key.clone()));
        }
        invalidated.len()
    }

    /// Drop every entry. Completions already in flight are discarded.
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.entries.clear();
            inner.epoch += 1;
        }
        tracing::debug!("cache cleared");
        self.emit(CacheEvent::Cleared);
    }

    /// Last stored value regardless of freshness.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let value = self.lock().entries.get(key)?.value.clone()?;
        value.downcast::<T>().ok()
    }

    #[must_use]
    pub fn freshness(&self, key: &QueryKey) -> Option<Freshness> {
        self.lock().entries.get(key).map(|entry| entry.freshness(self.stale_time))
    }

    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock().entries.get(key).is_some_and(|entry| entry.in_flight.is_some())
    }

    #[must_use]
    pub fn last_error(&self, key: &QueryKey) -> Option<ApiError> {
        self.lock().entries.get(key).and_then(|entry| entry.error.clone())
    }

    #[must_use]
    pub fn keys(&self) -> Vec<QueryKey> {
        self.lock().entries.keys().cloned().collect()
    }
}

/// Registered against an in-flight fetch for as long as a caller awaits it.
struct Waiter<'a> {
    cache: &'a QueryCache,
    ticket: &'a Ticket,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.cache.leave(self.ticket);
    }
}

fn downcast<T: Any + Send + Sync>(key: &QueryKey, value: Value) -> Result<Arc<T>, ApiError> {
    value
        .downcast::<T>()
        .map_err(|_| ApiError::ValidationFailure(format!("cached value for {key} has an unexpected type")))
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
