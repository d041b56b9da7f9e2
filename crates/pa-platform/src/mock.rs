//! Mock and default implementations for testing.
//!
//! Provides deterministic, reproducible behavior for automated CI testing.

use crate::error::Result;
use crate::traits::{Clock, TokenDatabase};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// In-memory token database for testing.
///
/// Stores entries unencrypted in a process-local map; real deployments must
/// use a keychain-backed implementation.
///
/// # Example
///
/// ```
/// use pa_platform::mock::MockTokenDatabase;
/// use pa_platform::traits::TokenDatabase;
///
/// let db = MockTokenDatabase::new();
/// db.save("login", b"entry").unwrap();
/// assert!(db.contains("login"));
/// ```
#[derive(Default)]
pub struct MockTokenDatabase {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockTokenDatabase {
    /// Create an empty mock database.
    pub fn new() -> Self {
        tracing::warn!("Using MockTokenDatabase - not suitable for production");
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the database holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenDatabase for MockTokenDatabase {
    fn save(&self, name: &str, entry: &[u8]) -> Result<()> {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(name.to_owned(), entry.to_vec());
        }
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(name).cloned()))
    }

    fn remove(&self, name: &str) -> Result<()> {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(name);
        }
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(name))
            .unwrap_or(false)
    }
}

/// Settable clock for testing.
#[derive(Default)]
pub struct MockClock {
    millis: AtomicU64,
}

impl MockClock {
    /// Create a mock clock pinned at `millis`.
    pub fn at(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Advance the clock by a delta.
    pub fn advance(&self, delta_millis: u64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Clock backed by the operating system time.
#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
