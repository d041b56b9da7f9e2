//! Token-based authorization: token entities, header generation and the
//! token store protocol.
//!
//! Tokens authorize low-value requests without a full multi-factor
//! signature. The store keeps `name → (identifier, secret)` in an encrypted
//! local database supplied by the host; creating a token on the server runs
//! through a [`TokenRemote`] implementation which carries the signed
//! provisioning request. Network transfer is this module's only suspension
//! point — everything else resolves synchronously.
//!
//! The store is thread safe. Concurrent requests for the same name coalesce
//! into one in-flight remote call whose result every waiter shares.

use crate::types::SignatureFactor;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pa_crypto::mac::hmac_sha256;
use pa_platform::traits::{Clock, TokenDatabase};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use zeroize::Zeroize;

/// Protocol version string carried in token headers.
const TOKEN_HEADER_VERSION: &str = "3.1";

/// Errors surfaced through token store completions.
#[derive(Debug, Clone, Error)]
pub enum TokenStoreError {
    /// The store cannot create access tokens right now.
    #[error("Token store cannot create access tokens")]
    Unavailable,

    /// The remote endpoint reported a failure.
    #[error("Remote token operation failed: {0}")]
    Remote(String),

    /// The local database failed.
    #[error("Token database failure: {0}")]
    Database(String),

    /// A stored token entry could not be parsed.
    #[error("Malformed token entry: {0}")]
    InvalidEntry(String),

    /// No token with the requested name exists locally.
    #[error("No token stored under the requested name")]
    MissingToken,
}

impl From<pa_platform::Error> for TokenStoreError {
    fn from(err: pa_platform::Error) -> Self {
        TokenStoreError::Database(err.to_string())
    }
}

/// Result alias for token store completions.
pub type TokenResult<T> = core::result::Result<T, TokenStoreError>;

/// Token data returned by the remote create endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTokenData {
    /// Server-assigned token identifier.
    pub identifier: String,
    /// Shared token secret.
    pub secret: [u8; 16],
}

/// Remote endpoint the store provisions tokens against.
///
/// Implementations own the HTTP transport and attach the multi-factor
/// signature (computed with the requested factors) to the create request.
pub trait TokenRemote: Send + Sync {
    /// Whether tokens can currently be requested; typically tied to the
    /// session having a valid activation.
    fn can_request_for_access_token(&self) -> bool;

    /// Create a token named `name` on the server, authorized with `factor`.
    fn create_token(&self, name: &str, factor: SignatureFactor) -> TokenResult<RemoteTokenData>;

    /// Invalidate the token with `identifier` on the server.
    fn remove_token(&self, identifier: &str) -> TokenResult<()>;
}

/// HTTP header produced by the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHttpHeader {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

impl AuthorizationHttpHeader {
    /// Header carrying a multi-factor request signature.
    pub fn authorization_header(value: String) -> Self {
        Self {
            key: "X-PowerAuth-Authorization".into(),
            value,
        }
    }

    /// Header carrying a token digest.
    pub fn token_header(value: String) -> Self {
        Self {
            key: "X-PowerAuth-Token".into(),
            value,
        }
    }
}

/// Named access token able to generate authorization headers.
///
/// Tokens hold a non-owning handle to their store; once the store is
/// dropped, header generation stops working instead of keeping the store
/// alive through a cycle.
pub struct Token {
    name: String,
    identifier: String,
    secret: [u8; 16],
    store: Weak<StoreInner>,
}

impl Token {
    /// Symbolic name the token is stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side token identifier. Useful mostly for debugging.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the token carries usable data.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.identifier.is_empty()
    }

    /// Whether a header can be generated right now: the token is valid, the
    /// store is alive and it can serve access tokens.
    pub fn can_generate_header(&self) -> bool {
        self.is_valid()
            && self
                .store
                .upgrade()
                .map(|store| store.remote.can_request_for_access_token())
                .unwrap_or(false)
    }

    /// Generate a token-based authorization header, or `None` when the
    /// token or its store can no longer serve.
    pub fn generate_header(&self) -> Option<AuthorizationHttpHeader> {
        if !self.is_valid() {
            return None;
        }
        let store = self.store.upgrade()?;
        if !store.remote.can_request_for_access_token() {
            return None;
        }

        let mut nonce = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let nonce_b64 = BASE64.encode(nonce);
        let timestamp = store.clock.now_millis().to_string();
        let data = format!("{nonce_b64}&{timestamp}");
        let digest = BASE64.encode(hmac_sha256(&self.secret, data.as_bytes()));

        let value = format!(
            "PowerAuth token_id=\"{}\", token_digest=\"{digest}\", \
             nonce=\"{nonce_b64}\", timestamp=\"{timestamp}\", \
             version=\"{TOKEN_HEADER_VERSION}\"",
            self.identifier
        );
        Some(AuthorizationHttpHeader::token_header(value))
    }
}

impl Clone for Token {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            identifier: self.identifier.clone(),
            secret: self.secret,
            store: self.store.clone(),
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.identifier == other.identifier
            && self.secret == other.secret
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Opaque handle for a pending store operation. Its only capability is
/// best-effort cancellation through [`TokenStore::cancel_task`].
pub struct TokenStoreTask {
    cancelled: Arc<AtomicBool>,
}

type CreateCompletion = Box<dyn FnOnce(TokenResult<Token>) + Send>;
type RemoveCompletion = Box<dyn FnOnce(TokenResult<()>) + Send>;

struct CreateWaiter {
    completion: CreateCompletion,
    cancelled: Arc<AtomicBool>,
}

struct InflightCreate {
    waiters: Mutex<Vec<CreateWaiter>>,
}

struct StoreInner {
    remote: Arc<dyn TokenRemote>,
    database: Arc<dyn TokenDatabase>,
    clock: Arc<dyn Clock>,
    inflight: Mutex<HashMap<String, Arc<InflightCreate>>>,
}

/// Thread-safe store of named access tokens.
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

impl TokenStore {
    /// Create a store over the remote endpoint and host-provided database
    /// and clock.
    pub fn new(
        remote: Arc<dyn TokenRemote>,
        database: Arc<dyn TokenDatabase>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                remote,
                database,
                clock,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether access tokens can currently be created.
    pub fn can_request_for_access_token(&self) -> bool {
        self.inner.remote.can_request_for_access_token()
    }

    /// Whether a token named `name` exists in the local database.
    pub fn has_local_token(&self, name: &str) -> bool {
        self.inner.database.contains(name)
    }

    /// Request an access token with the given name and signature factors.
    ///
    /// A locally stored token resolves synchronously and no task is
    /// returned. Otherwise one remote request per name is in flight at a
    /// time; concurrent callers attach to it and share its outcome. The
    /// returned task cancels only this caller's interest — a cancelled
    /// caller gets no completion and, when every caller cancelled, the
    /// created token is not persisted locally.
    pub fn request_access_token<F>(
        &self,
        name: &str,
        factor: SignatureFactor,
        completion: F,
    ) -> Option<TokenStoreTask>
    where
        F: FnOnce(TokenResult<Token>) + Send + 'static,
    {
        if name.is_empty() {
            completion(Err(TokenStoreError::InvalidEntry("Empty token name".into())));
            return None;
        }
        if !self.inner.remote.can_request_for_access_token() {
            completion(Err(TokenStoreError::Unavailable));
            return None;
        }

        // Fast path: the token is already local.
        match self.inner.database.load(name) {
            Ok(Some(entry)) => {
                completion(match parse_token_entry(&entry) {
                    Ok((identifier, secret)) => Ok(self.make_token(name, identifier, secret)),
                    Err(err) => Err(err),
                });
                return None;
            }
            Ok(None) => {}
            Err(err) => {
                completion(Err(err.into()));
                return None;
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let waiter = CreateWaiter {
            completion: Box::new(completion),
            cancelled: cancelled.clone(),
        };

        let mut inflight = lock_recover(&self.inner.inflight);
        if let Some(entry) = inflight.get(name) {
            // Coalesce with the request already in flight.
            lock_recover(&entry.waiters).push(waiter);
            return Some(TokenStoreTask { cancelled });
        }
        inflight.insert(
            name.to_owned(),
            Arc::new(InflightCreate {
                waiters: Mutex::new(vec![waiter]),
            }),
        );
        drop(inflight);

        let inner = self.inner.clone();
        let task_name = name.to_owned();
        std::thread::spawn(move || run_create(inner, task_name, factor));
        Some(TokenStoreTask { cancelled })
    }

    /// Remove a token on the server and, only when that succeeds, from the
    /// local database.
    pub fn remove_access_token<F>(&self, name: &str, completion: F) -> Option<TokenStoreTask>
    where
        F: FnOnce(TokenResult<()>) + Send + 'static,
    {
        let entry = match self.inner.database.load(name) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                completion(Err(TokenStoreError::MissingToken));
                return None;
            }
            Err(err) => {
                completion(Err(err.into()));
                return None;
            }
        };
        let (identifier, _) = match parse_token_entry(&entry) {
            Ok(parsed) => parsed,
            Err(err) => {
                completion(Err(err));
                return None;
            }
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let task = TokenStoreTask {
            cancelled: cancelled.clone(),
        };
        let inner = self.inner.clone();
        let name = name.to_owned();
        let completion: RemoveCompletion = Box::new(completion);
        std::thread::spawn(move || {
            let result = inner.remote.remove_token(&identifier);
            if cancelled.load(Ordering::SeqCst) {
                tracing::warn!(token = %name, "Token removal cancelled after server call");
                return;
            }
            match result {
                Ok(()) => {
                    let local = inner
                        .database
                        .remove(&name)
                        .map_err(TokenStoreError::from);
                    completion(local);
                }
                Err(err) => {
                    tracing::warn!(token = %name, "Server-side token removal failed");
                    completion(Err(err));
                }
            }
        });
        Some(task)
    }

    /// Remove a token from the local database only. The server-side token
    /// stays valid; use this as a fallback when online removal fails.
    pub fn remove_local_token(&self, name: &str) {
        if let Err(err) = self.inner.database.remove(name) {
            tracing::warn!(token = %name, error = %err, "Local token removal failed");
        }
    }

    /// Remove every token from the local database. Server-side tokens stay
    /// valid.
    pub fn remove_all_local_tokens(&self) {
        if let Err(err) = self.inner.database.remove_all() {
            tracing::warn!(error = %err, "Local token wipe failed");
        }
    }

    /// Cancel a pending store task. Best effort: the server may still
    /// complete the operation. Safe with `None`.
    pub fn cancel_task(&self, task: Option<TokenStoreTask>) {
        if let Some(task) = task {
            task.cancelled.store(true, Ordering::SeqCst);
        }
    }

    fn make_token(&self, name: &str, identifier: String, secret: [u8; 16]) -> Token {
        Token {
            name: name.to_owned(),
            identifier,
            secret,
            store: Arc::downgrade(&self.inner),
        }
    }
}

fn run_create(inner: Arc<StoreInner>, name: String, factor: SignatureFactor) {
    let result = inner.remote.create_token(&name, factor);

    let entry = {
        let mut inflight = lock_recover(&inner.inflight);
        inflight.remove(&name)
    };
    let Some(entry) = entry else { return };
    let waiters: Vec<CreateWaiter> = lock_recover(&entry.waiters).drain(..).collect();

    let live_waiters = waiters
        .iter()
        .filter(|w| !w.cancelled.load(Ordering::SeqCst))
        .count();

    match result {
        Ok(data) => {
            if live_waiters == 0 {
                // Nobody wants the result; the server-side token stays
                // orphaned until the next request reuses the name.
                tracing::warn!(token = %name, "Token request cancelled after server call");
                return;
            }
            let blob = serialize_token_entry(&data.identifier, &data.secret);
            if let Err(err) = inner.database.save(&name, &blob) {
                let err = TokenStoreError::from(err);
                deliver(waiters, || Err(err.clone()));
                return;
            }
            let store = Arc::downgrade(&inner);
            deliver(waiters, || {
                Ok(Token {
                    name: name.clone(),
                    identifier: data.identifier.clone(),
                    secret: data.secret,
                    store: store.clone(),
                })
            });
        }
        Err(err) => {
            deliver(waiters, || Err(err.clone()));
        }
    }
}

fn deliver<F>(waiters: Vec<CreateWaiter>, mut outcome: F)
where
    F: FnMut() -> TokenResult<Token>,
{
    for waiter in waiters {
        if waiter.cancelled.load(Ordering::SeqCst) {
            continue;
        }
        (waiter.completion)(outcome());
    }
}

/// Serialized token entry: identifier length (u16 LE), identifier bytes,
/// 16-byte secret.
fn serialize_token_entry(identifier: &str, secret: &[u8; 16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + identifier.len() + 16);
    out.extend_from_slice(&(identifier.len() as u16).to_le_bytes());
    out.extend_from_slice(identifier.as_bytes());
    out.extend_from_slice(secret);
    out
}

fn parse_token_entry(entry: &[u8]) -> TokenResult<(String, [u8; 16])> {
    if entry.len() < 2 {
        return Err(TokenStoreError::InvalidEntry("Entry is truncated".into()));
    }
    let id_len = u16::from_le_bytes([entry[0], entry[1]]) as usize;
    if entry.len() != 2 + id_len + 16 {
        return Err(TokenStoreError::InvalidEntry("Entry length mismatch".into()));
    }
    let identifier = String::from_utf8(entry[2..2 + id_len].to_vec())
        .map_err(|_| TokenStoreError::InvalidEntry("Identifier is not UTF-8".into()))?;
    let mut secret = [0u8; 16];
    secret.copy_from_slice(&entry[2 + id_len..]);
    Ok((identifier, secret))
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pa_platform::mock::{MockClock, MockTokenDatabase};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    struct MockRemote {
        can_request: bool,
        fail_create: bool,
        fail_remove: bool,
        delay: Duration,
        create_calls: AtomicUsize,
        remove_calls: AtomicUsize,
    }

    impl MockRemote {
        fn new() -> Self {
            Self {
                can_request: true,
                fail_create: false,
                fail_remove: false,
                delay: Duration::ZERO,
                create_calls: AtomicUsize::new(0),
                remove_calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenRemote for MockRemote {
        fn can_request_for_access_token(&self) -> bool {
            self.can_request
        }

        fn create_token(
            &self,
            name: &str,
            _factor: SignatureFactor,
        ) -> TokenResult<RemoteTokenData> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail_create {
                return Err(TokenStoreError::Remote("simulated failure".into()));
            }
            Ok(RemoteTokenData {
                identifier: format!("id-{name}"),
                secret: [0xAB; 16],
            })
        }

        fn remove_token(&self, _identifier: &str) -> TokenResult<()> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove {
                return Err(TokenStoreError::Remote("simulated failure".into()));
            }
            Ok(())
        }
    }

    fn store_with(remote: MockRemote) -> (TokenStore, Arc<MockRemote>, Arc<MockTokenDatabase>) {
        let remote = Arc::new(remote);
        let database = Arc::new(MockTokenDatabase::new());
        let store = TokenStore::new(
            remote.clone(),
            database.clone(),
            Arc::new(MockClock::at(1_700_000_000_000)),
        );
        (store, remote, database)
    }

    #[test]
    fn test_entry_roundtrip() {
        let blob = serialize_token_entry("token-id", &[0x42; 16]);
        let (identifier, secret) = parse_token_entry(&blob).unwrap();
        assert_eq!(identifier, "token-id");
        assert_eq!(secret, [0x42; 16]);
    }

    #[test]
    fn test_malformed_entries_rejected() {
        assert!(parse_token_entry(&[]).is_err());
        assert!(parse_token_entry(&[5, 0, b'a']).is_err());
        let mut blob = serialize_token_entry("id", &[0x42; 16]);
        blob.push(0);
        assert!(parse_token_entry(&blob).is_err());
    }

    #[test]
    fn test_request_creates_and_persists() {
        let (store, remote, database) = store_with(MockRemote::new());
        let (tx, rx) = mpsc::channel();

        let task = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        assert!(task.is_some());

        let token = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(token.name(), "login");
        assert_eq!(token.identifier(), "id-login");
        assert!(token.is_valid());
        assert!(database.contains("login"));
        assert_eq!(remote.create_calls.load(Ordering::SeqCst), 1);
        assert!(store.has_local_token("login"));
    }

    #[test]
    fn test_local_token_resolves_synchronously() {
        let (store, remote, database) = store_with(MockRemote::new());
        database
            .save("login", &serialize_token_entry("id-x", &[0x01; 16]))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let task = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        assert!(task.is_none());
        let token = rx.try_recv().unwrap().unwrap();
        assert_eq!(token.identifier(), "id-x");
        assert_eq!(remote.create_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unavailable_store_fails_synchronously() {
        let (store, _remote, _database) = store_with(MockRemote {
            can_request: false,
            ..MockRemote::new()
        });
        let (tx, rx) = mpsc::channel();
        let task = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        assert!(task.is_none());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(TokenStoreError::Unavailable)
        ));
    }

    #[test]
    fn test_concurrent_requests_coalesce() {
        let (store, remote, _database) = store_with(MockRemote {
            delay: Duration::from_millis(300),
            ..MockRemote::new()
        });
        let (tx, rx) = mpsc::channel();

        let tx1 = tx.clone();
        let first = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx1.send(r).unwrap();
        });
        // Attaches to the in-flight request while the remote call sleeps.
        let second = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        assert!(first.is_some());
        assert!(second.is_some());

        let a = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        let b = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(a == b);
        assert_eq!(remote.create_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_create_reported_to_all_waiters() {
        let (store, _remote, database) = store_with(MockRemote {
            fail_create: true,
            delay: Duration::from_millis(100),
            ..MockRemote::new()
        });
        let (tx, rx) = mpsc::channel();
        let tx1 = tx.clone();
        store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx1.send(r).unwrap();
        });
        store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });

        for _ in 0..2 {
            let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(outcome, Err(TokenStoreError::Remote(_))));
        }
        assert!(!database.contains("login"));
    }

    #[test]
    fn test_cancelled_request_is_not_persisted() {
        let (store, _remote, database) = store_with(MockRemote {
            delay: Duration::from_millis(150),
            ..MockRemote::new()
        });
        let (tx, rx) = mpsc::channel::<TokenResult<Token>>();
        let task = store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        store.cancel_task(task);

        // The worker finishes without delivering or persisting.
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
        assert!(!database.contains("login"));
    }

    #[test]
    fn test_cancel_with_none_is_safe() {
        let (store, _remote, _database) = store_with(MockRemote::new());
        store.cancel_task(None);
    }

    #[test]
    fn test_remove_deletes_local_on_success() {
        let (store, remote, database) = store_with(MockRemote::new());
        database
            .save("login", &serialize_token_entry("id-x", &[0x01; 16]))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let task = store.remove_access_token("login", move |r| {
            tx.send(r).unwrap();
        });
        assert!(task.is_some());
        rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(!database.contains("login"));
        assert_eq!(remote.remove_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_keeps_local_on_server_failure() {
        let (store, _remote, database) = store_with(MockRemote {
            fail_remove: true,
            ..MockRemote::new()
        });
        database
            .save("login", &serialize_token_entry("id-x", &[0x01; 16]))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        store.remove_access_token("login", move |r| {
            tx.send(r).unwrap();
        });
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(TokenStoreError::Remote(_))));
        assert!(database.contains("login"));
    }

    #[test]
    fn test_remove_missing_token_fails_synchronously() {
        let (store, _remote, _database) = store_with(MockRemote::new());
        let (tx, rx) = mpsc::channel();
        let task = store.remove_access_token("missing", move |r| {
            tx.send(r).unwrap();
        });
        assert!(task.is_none());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(TokenStoreError::MissingToken)
        ));
    }

    #[test]
    fn test_remove_local_token() {
        let (store, _remote, database) = store_with(MockRemote::new());
        database
            .save("a", &serialize_token_entry("id-a", &[0x01; 16]))
            .unwrap();
        database
            .save("b", &serialize_token_entry("id-b", &[0x02; 16]))
            .unwrap();

        store.remove_local_token("a");
        assert!(!store.has_local_token("a"));
        assert!(store.has_local_token("b"));

        store.remove_all_local_tokens();
        assert!(!store.has_local_token("b"));
    }

    #[test]
    fn test_generate_header_format() {
        let (store, _remote, database) = store_with(MockRemote::new());
        database
            .save("login", &serialize_token_entry("id-x", &[0x42; 16]))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        let token = rx.try_recv().unwrap().unwrap();
        assert!(token.can_generate_header());

        let header = token.generate_header().unwrap();
        assert_eq!(header.key, "X-PowerAuth-Token");
        assert!(header.value.starts_with("PowerAuth token_id=\"id-x\""));
        assert!(header.value.contains("timestamp=\"1700000000000\""));
        assert!(header.value.ends_with("version=\"3.1\""));

        // Recompute the digest from the header's own nonce and timestamp.
        let nonce = header
            .value
            .split("nonce=\"")
            .nth(1)
            .unwrap()
            .split('"')
            .next()
            .unwrap();
        let digest = header
            .value
            .split("token_digest=\"")
            .nth(1)
            .unwrap()
            .split('"')
            .next()
            .unwrap();
        let expected = BASE64.encode(hmac_sha256(
            &[0x42; 16],
            format!("{nonce}&1700000000000").as_bytes(),
        ));
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_dropped_store_invalidates_header_generation() {
        let (store, _remote, database) = store_with(MockRemote::new());
        database
            .save("login", &serialize_token_entry("id-x", &[0x42; 16]))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        store.request_access_token("login", SignatureFactor::Possession, move |r| {
            tx.send(r).unwrap();
        });
        let token = rx.try_recv().unwrap().unwrap();

        drop(store);
        assert!(!token.can_generate_header());
        assert!(token.generate_header().is_none());
    }
}
