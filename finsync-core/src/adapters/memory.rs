//! In-memory adapters
//!
//! Process-local implementations of every port. They back the unit and
//! integration tests and are usable for embedding the engine without a
//! database. The remote store supports failure injection, call counting and
//! artificial latency so the orchestrator's error paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::category::with_local_defaults;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Budget, Category, CreditAccount, DebtAccount, EncryptedPayload, Goal, Identity,
    LedgerTransaction, RemoteRecord, Snapshot, Transaction, UserProfile,
};
use crate::ports::{IdentityProvider, LocalStore, RemoteStore, StateStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::storage("in-memory store lock poisoned"))
}

// ============================================================================
// State store
// ============================================================================

/// Key-value state held in a map
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.values)?.remove(key);
        Ok(())
    }
}

// ============================================================================
// Local store
// ============================================================================

/// Local data held as a snapshot, with a change counter
pub struct MemoryLocalStore {
    data: Mutex<Snapshot>,
    changes: watch::Sender<u64>,
    fail_import: AtomicBool,
    imports: AtomicUsize,
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            data: Mutex::new(Snapshot::default()),
            changes,
            fail_import: AtomicBool::new(false),
            imports: AtomicUsize::new(0),
        }
    }

    /// Store pre-filled with the given snapshot
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        if let Ok(mut data) = store.data.lock() {
            *data = snapshot;
        }
        store
    }

    /// Apply a mutation and bump the change counter
    pub fn mutate(&self, f: impl FnOnce(&mut Snapshot)) {
        if let Ok(mut data) = self.data.lock() {
            f(&mut data);
        }
        self.changes.send_modify(|version| *version += 1);
    }

    pub fn add_transaction(&self, transaction: Transaction) {
        self.mutate(|s| s.transactions.push(transaction));
    }

    pub fn add_budget(&self, budget: Budget) {
        self.mutate(|s| s.budgets.push(budget));
    }

    pub fn add_category(&self, category: Category) {
        self.mutate(|s| s.categories.push(category));
    }

    pub fn add_debt_transaction(&self, entry: LedgerTransaction) {
        self.mutate(|s| s.debt_transactions.push(entry));
    }

    pub fn set_emergency_fund(&self, amount: Decimal) {
        self.mutate(|s| s.emergency_fund = amount);
    }

    pub fn set_profile(&self, profile: UserProfile) {
        self.mutate(|s| s.profile = Some(profile));
    }

    /// Current contents
    pub fn snapshot(&self) -> Snapshot {
        self.data
            .lock()
            .map(|data| data.clone())
            .unwrap_or_default()
    }

    /// Make the next imports fail
    pub fn set_fail_import(&self, fail: bool) {
        self.fail_import.store(fail, Ordering::SeqCst);
    }

    /// Number of successful imports
    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    /// Current value of the change counter
    pub fn version(&self) -> u64 {
        *self.changes.borrow()
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T> {
        let data = lock(&self.data)?;
        Ok(f(&data))
    }
}

impl LocalStore for MemoryLocalStore {
    fn transactions(&self) -> Result<Vec<Transaction>> {
        self.read(|s| s.transactions.clone())
    }

    fn budgets(&self) -> Result<Vec<Budget>> {
        self.read(|s| s.budgets.clone())
    }

    fn goals(&self) -> Result<Vec<Goal>> {
        self.read(|s| s.goals.clone())
    }

    fn debt_accounts(&self) -> Result<Vec<DebtAccount>> {
        self.read(|s| s.debt_accounts.clone())
    }

    fn credit_accounts(&self) -> Result<Vec<CreditAccount>> {
        self.read(|s| s.credit_accounts.clone())
    }

    fn debt_transactions(&self) -> Result<Vec<LedgerTransaction>> {
        self.read(|s| s.debt_transactions.clone())
    }

    fn credit_transactions(&self) -> Result<Vec<LedgerTransaction>> {
        self.read(|s| s.credit_transactions.clone())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        self.read(|s| s.categories.clone())
    }

    fn emergency_fund(&self) -> Result<Decimal> {
        self.read(|s| s.emergency_fund)
    }

    fn profile(&self) -> Result<Option<UserProfile>> {
        self.read(|s| s.profile.clone())
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(Error::import("local store rejected the snapshot"));
        }

        {
            let mut data = lock(&self.data)?;
            let categories = with_local_defaults(&data.categories, &snapshot.categories);
            *data = Snapshot {
                categories,
                ..snapshot.clone()
            };
        }

        self.imports.fetch_add(1, Ordering::SeqCst);
        self.changes.send_modify(|version| *version += 1);
        Ok(())
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

// ============================================================================
// Remote store
// ============================================================================

/// Device metadata as last reported to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub device_name: String,
    pub version: String,
}

#[derive(Default)]
struct RelayState {
    /// Latest record per (user, device)
    latest: HashMap<(String, Uuid), RemoteRecord>,
    /// Every record ever stored, oldest first
    history: Vec<(String, RemoteRecord)>,
    devices: HashMap<(String, Uuid), DeviceMetadata>,
    last_assigned: Option<DateTime<Utc>>,
}

/// In-process relay.
///
/// Assigns strictly increasing last-modified timestamps so "latest" is
/// unambiguous even when two stores happen within the same millisecond.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<RelayState>,
    fail_store: AtomicBool,
    fail_fetch: AtomicBool,
    store_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

/// Counts a call as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `store_snapshot` fail with a network error
    pub fn set_fail_store(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    /// Make `fetch_latest_snapshot` fail with a network error
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `delay` (simulates a slow or hung relay)
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Total remote calls of any kind
    pub fn total_calls(&self) -> usize {
        self.store_calls() + self.fetch_calls() + self.metadata_calls()
    }

    /// Number of records ever stored for a user
    pub fn history_len(&self, user_id: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.history.iter().filter(|(user, _)| user == user_id).count())
            .unwrap_or(0)
    }

    pub fn device_metadata(&self, user_id: &str, device_id: Uuid) -> Option<DeviceMetadata> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.devices.get(&(user_id.to_string(), device_id)).cloned())
    }

    /// Insert a record directly, bypassing timestamp assignment
    pub fn insert_record(&self, user_id: &str, record: RemoteRecord) {
        if let Ok(mut state) = self.state.lock() {
            state
                .history
                .push((user_id.to_string(), record.clone()));
            state
                .latest
                .insert((user_id.to_string(), record.device_id), record);
        }
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn latest_for(state: &RelayState, user_id: &str) -> Option<RemoteRecord> {
        state
            .latest
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, record)| record)
            .max_by_key(|record| record.last_modified)
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn store_snapshot(
        &self,
        user_id: &str,
        device_id: Uuid,
        payload: &EncryptedPayload,
    ) -> Result<DateTime<Utc>> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_store.load(Ordering::SeqCst) {
            return Err(Error::network("relay rejected the snapshot"));
        }

        let mut state = lock(&self.state)?;
        let now = Utc::now();
        let last_modified = match state.last_assigned {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        state.last_assigned = Some(last_modified);

        let record = RemoteRecord {
            device_id,
            ciphertext: payload.ciphertext.clone(),
            digest: payload.digest.clone(),
            version: payload.version.clone(),
            last_modified,
        };
        state.history.push((user_id.to_string(), record.clone()));
        state.latest.insert((user_id.to_string(), device_id), record);

        Ok(last_modified)
    }

    async fn fetch_latest_snapshot(&self, user_id: &str) -> Result<Option<RemoteRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::network("relay unreachable"));
        }

        let state = lock(&self.state)?;
        Ok(Self::latest_for(&state, user_id))
    }

    async fn update_device_metadata(
        &self,
        user_id: &str,
        device_id: Uuid,
        device_name: &str,
        version: &str,
    ) -> Result<()> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        lock(&self.state)?.devices.insert(
            (user_id.to_string(), device_id),
            DeviceMetadata {
                device_name: device_name.to_string(),
                version: version.to_string(),
            },
        );
        Ok(())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Identity that never changes
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    identity: Option<Identity>,
}

impl StaticIdentity {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self { identity: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn is_loading(&self) -> bool {
        false
    }
}

/// Identity that can be changed at runtime, e.g. to simulate a sign-in flow
/// still restoring its session
#[derive(Debug, Default)]
pub struct SharedIdentity {
    identity: RwLock<Option<Identity>>,
    loading: AtomicBool,
}

impl SharedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start in the loading state
    pub fn loading() -> Self {
        let shared = Self::default();
        shared.set_loading(true);
        shared
    }

    /// Sign in and finish loading
    pub fn sign_in(&self, identity: Identity) {
        if let Ok(mut current) = self.identity.write() {
            *current = Some(identity);
        }
        self.set_loading(false);
    }

    pub fn sign_out(&self) {
        if let Ok(mut current) = self.identity.write() {
            *current = None;
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }
}

impl IdentityProvider for SharedIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.read().ok().and_then(|i| i.clone())
    }

    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_mutations_bump_change_counter() {
        let store = MemoryLocalStore::new();
        let rx = store.subscribe_changes();
        assert_eq!(*rx.borrow(), 0);

        store.add_transaction(Transaction::new(
            Decimal::ONE,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ));
        store.set_emergency_fund(Decimal::new(10, 0));
        assert_eq!(*rx.borrow(), 2);

        store.import_snapshot(&Snapshot::default()).unwrap();
        assert_eq!(store.version(), 3);
        assert_eq!(store.import_count(), 1);
    }

    #[test]
    fn test_import_keeps_local_default_categories() {
        let food = Category::default_category(Uuid::from_u128(1), "Food");
        let store = MemoryLocalStore::new();
        store.add_category(food.clone());

        let mut incoming = Snapshot::default();
        incoming
            .categories
            .push(Category::default_category(Uuid::from_u128(1), "Renamed"));
        incoming
            .categories
            .push(Category::default_category(Uuid::from_u128(2), "Foreign"));
        let pets = Category::custom("Pets");
        incoming.categories.push(pets.clone());

        store.import_snapshot(&incoming).unwrap();
        assert_eq!(store.categories().unwrap(), vec![food, pets]);
    }

    #[test]
    fn test_failed_import_leaves_data_untouched() {
        let store = MemoryLocalStore::new();
        store.set_emergency_fund(Decimal::new(5, 0));
        store.set_fail_import(true);

        let mut incoming = Snapshot::default();
        incoming.emergency_fund = Decimal::new(99, 0);
        assert!(matches!(
            store.import_snapshot(&incoming),
            Err(Error::Import(_))
        ));
        assert_eq!(store.emergency_fund().unwrap(), Decimal::new(5, 0));
    }

    fn payload(tag: u8) -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: vec![tag; 32],
            digest: String::new(),
            version: "1.0".into(),
        }
    }

    #[tokio::test]
    async fn test_relay_returns_latest_across_devices() {
        let relay = MemoryRemoteStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(relay.fetch_latest_snapshot("u1").await.unwrap().is_none());

        let t1 = relay.store_snapshot("u1", a, &payload(1)).await.unwrap();
        let t2 = relay.store_snapshot("u1", b, &payload(2)).await.unwrap();
        assert!(t2 > t1);

        let latest = relay.fetch_latest_snapshot("u1").await.unwrap().unwrap();
        assert_eq!(latest.device_id, b);
        assert_eq!(latest.last_modified, t2);

        // Other users are isolated
        assert!(relay.fetch_latest_snapshot("u2").await.unwrap().is_none());
        assert_eq!(relay.history_len("u1"), 2);
    }

    #[tokio::test]
    async fn test_relay_failure_injection() {
        let relay = MemoryRemoteStore::new();
        relay.set_fail_store(true);
        let err = relay
            .store_snapshot("u1", Uuid::new_v4(), &payload(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(relay.store_calls(), 1);
        assert_eq!(relay.history_len("u1"), 0);
    }

    #[test]
    fn test_shared_identity_transitions() {
        let identity = SharedIdentity::loading();
        assert!(identity.is_loading());
        assert!(!identity.is_authenticated());

        identity.sign_in(Identity::new("u1", "u1@example.com"));
        assert!(!identity.is_loading());
        assert!(identity.is_authenticated());

        identity.sign_out();
        assert!(identity.current().is_none());
    }
}
