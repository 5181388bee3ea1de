//! Connection supervision for the remote cache.
//!
//! ## State machine
//!
//! ```text
//! Unknown ──connect()──▶ Connecting ──ok──▶ Connected
//!                             │                  │
//!                             └──fail/timeout──▶ Disabled ◀── any command failure
//!                                                │
//!                                 reconnect() ───┘ (back through Connecting)
//! ```
//!
//! The manager is the only writer of [`ConnectionState`]. Bounded clients read
//! it before every command and report failures back through a shared handle;
//! the handle only ever performs the `Connected -> Disabled` step, and only for
//! the connection generation the client was built on. There is no
//! automatic promotion back to `Connected`: a new attempt has to be requested
//! with [`ConnectionManager::reconnect`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::client::{CacheClient, NullClient, RemoteClient};
use crate::config::RedisConfig;
use crate::metrics;
use crate::store::{KvStore, RedisStore, StoreError};

/// Availability of the remote cache as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unknown = 0,
    Connecting = 1,
    Connected = 2,
    Disabled = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disabled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state cell. Transitions log exactly once per change.
///
/// The low byte holds the [`ConnectionState`]; the rest counts successful
/// connects. Clients remember the generation they were built under, so a
/// failure from a discarded connection cannot disable its replacement.
#[derive(Debug)]
pub(crate) struct Link {
    word: AtomicU64,
}

const STATE_MASK: u64 = 0xff;

fn pack(generation: u64, state: ConnectionState) -> u64 {
    (generation << 8) | state as u64
}

impl Link {
    fn new() -> Self {
        Self {
            word: AtomicU64::new(pack(0, ConnectionState::Unknown)),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8((self.word.load(Ordering::Acquire) & STATE_MASK) as u8)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.word.load(Ordering::Acquire) >> 8
    }

    /// `Connected` under the given generation.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.word.load(Ordering::Acquire) == pack(generation, ConnectionState::Connected)
    }

    fn set(&self, to: ConnectionState, next_generation: bool) -> ConnectionState {
        let previous = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let generation = (word >> 8) + u64::from(next_generation);
                Some(pack(generation, to))
            })
            .unwrap_or_else(|word| word);
        ConnectionState::from_u8((previous & STATE_MASK) as u8)
    }

    fn transition(&self, to: ConnectionState, backend: &str, reason: Option<&str>) -> bool {
        let from = self.set(to, false);
        if from == to {
            return false;
        }
        log_transition(from, to, backend, reason);
        true
    }

    /// Successful connect: `Connected` under a fresh generation.
    fn connected(&self, backend: &str) {
        let from = self.set(ConnectionState::Connected, true);
        log_transition(from, ConnectionState::Connected, backend, None);
    }

    /// `Connected -> Disabled` after an operational failure of a client built
    /// under `generation`.
    ///
    /// Returns `true` only for the call that performed the transition, so a
    /// burst of failing commands produces a single log line.
    pub(crate) fn degrade(&self, generation: u64, reason: &str) -> bool {
        let degraded = self
            .word
            .compare_exchange(
                pack(generation, ConnectionState::Connected),
                pack(generation, ConnectionState::Disabled),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if degraded {
            metrics::record_degraded();
            log_transition(
                ConnectionState::Connected,
                ConnectionState::Disabled,
                "remote",
                Some(reason),
            );
        } else if self.generation() != generation {
            tracing::debug!(generation, reason, "ignoring failure from a replaced connection");
        }
        degraded
    }
}

fn log_transition(from: ConnectionState, to: ConnectionState, backend: &str, reason: Option<&str>) {
    match to {
        ConnectionState::Connected => {
            tracing::info!(%from, %to, backend, "cache connected");
        }
        ConnectionState::Disabled => {
            tracing::warn!(
                %from,
                %to,
                backend,
                reason = reason.unwrap_or("unspecified"),
                "cache disabled, falling back to null client"
            );
        }
        ConnectionState::Connecting | ConnectionState::Unknown => {
            tracing::debug!(%from, %to, backend, "cache connection state changed");
        }
    }
}

/// Where the manager gets its store from.
enum StoreSource {
    /// Remote cache switched off in configuration.
    Off,
    /// Build a Redis pool from configuration on every (re)connect.
    Redis(RedisConfig),
    /// An already-built store, re-validated with a ping on (re)connect.
    Fixed(Arc<dyn KvStore>),
}

impl StoreSource {
    fn backend(&self) -> &'static str {
        match self {
            Self::Off => "none",
            Self::Redis(_) => "redis",
            Self::Fixed(store) => store.name(),
        }
    }

    async fn open(&self) -> Result<Arc<dyn KvStore>, StoreError> {
        match self {
            Self::Off => Err(StoreError::Connection(
                "remote cache disabled by configuration".to_string(),
            )),
            Self::Redis(config) => {
                let store = RedisStore::from_config(config)?;
                store.ping().await?;
                Ok(Arc::new(store))
            }
            Self::Fixed(store) => {
                store.ping().await?;
                Ok(Arc::clone(store))
            }
        }
    }
}

struct Inner {
    link: Arc<Link>,
    source: StoreSource,
    store: RwLock<Option<Arc<dyn KvStore>>>,
    connect_timeout: std::time::Duration,
    command_timeout: std::time::Duration,
    /// Serializes connect attempts; request paths never take it.
    attempt: Mutex<()>,
}

/// Establishes and supervises the remote cache connection and hands out the
/// client variant matching the current state.
///
/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("backend", &self.inner.source.backend())
            .finish()
    }
}

impl ConnectionManager {
    /// Manager for the Redis instance described by `config`.
    ///
    /// Nothing is attempted until [`connect`](Self::connect) is awaited.
    pub fn new(config: &RedisConfig) -> Self {
        let source = if config.is_remote() {
            StoreSource::Redis(config.clone())
        } else {
            StoreSource::Off
        };
        Self::build(source, config)
    }

    /// Manager over an already-built store (in-process store, test doubles).
    ///
    /// Timeouts are taken from `config`; its URL is ignored.
    pub fn with_store(store: Arc<dyn KvStore>, config: &RedisConfig) -> Self {
        Self::build(StoreSource::Fixed(store), config)
    }

    /// Manager that always hands out the null client.
    pub fn disabled() -> Self {
        Self::build(StoreSource::Off, &RedisConfig::disabled())
    }

    fn build(source: StoreSource, config: &RedisConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                link: Arc::new(Link::new()),
                source,
                store: RwLock::new(None),
                connect_timeout: config.connect_timeout(),
                command_timeout: config.command_timeout(),
                attempt: Mutex::new(()),
            }),
        }
    }

    /// Attempt the initial connection, bounded by the connect timeout.
    ///
    /// Never fails: an unreachable cache leaves the manager `Disabled`.
    pub async fn connect(&self) -> ConnectionState {
        let _attempt = self.inner.attempt.lock().await;
        if self.state() == ConnectionState::Connected {
            return ConnectionState::Connected;
        }
        self.attempt().await
    }

    /// Explicit reconnect after a degradation.
    ///
    /// A manager that is already `Connected` is left untouched.
    pub async fn reconnect(&self) -> ConnectionState {
        let _attempt = self.inner.attempt.lock().await;
        match self.state() {
            ConnectionState::Connected => ConnectionState::Connected,
            _ => self.attempt().await,
        }
    }

    async fn attempt(&self) -> ConnectionState {
        let inner = &self.inner;
        let backend = inner.source.backend();

        if let StoreSource::Off = inner.source {
            *inner.store.write() = None;
            if inner.link.set(ConnectionState::Disabled, false) != ConnectionState::Disabled {
                tracing::info!("Remote cache disabled, using null cache client");
            }
            return ConnectionState::Disabled;
        }

        inner.link.transition(ConnectionState::Connecting, backend, None);

        match tokio::time::timeout(inner.connect_timeout, inner.source.open()).await {
            Ok(Ok(store)) => {
                // Publish the store and its generation together.
                let mut slot = inner.store.write();
                *slot = Some(store);
                inner.link.connected(backend);
                ConnectionState::Connected
            }
            Ok(Err(e)) => {
                *inner.store.write() = None;
                let reason = e.to_string();
                inner
                    .link
                    .transition(ConnectionState::Disabled, backend, Some(&reason));
                ConnectionState::Disabled
            }
            Err(_) => {
                *inner.store.write() = None;
                let reason = format!("connect timed out after {:?}", inner.connect_timeout);
                inner
                    .link
                    .transition(ConnectionState::Disabled, backend, Some(&reason));
                ConnectionState::Disabled
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.state()
    }

    /// Non-blocking availability check.
    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Name of the configured backend (`redis`, `memory`, `none`, ...).
    pub fn backend(&self) -> &'static str {
        self.inner.source.backend()
    }

    /// Client for the current state: the bounded remote client while
    /// `Connected`, the null client otherwise.
    pub fn client(&self) -> CacheClient {
        if self.is_available() {
            let slot = self.inner.store.read();
            if let Some(store) = slot.as_ref() {
                return CacheClient::Remote(RemoteClient::new(
                    Arc::clone(store),
                    Arc::clone(&self.inner.link),
                    self.inner.link.generation(),
                    self.inner.command_timeout,
                ));
            }
        }
        CacheClient::Null(NullClient)
    }
}
