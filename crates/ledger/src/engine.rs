//! Wallet ledger - the only writer of vendor balances
//!
//! # Locking
//! Allocations take the pool lock, then the vendor's wallet lock. Every other
//! mutation takes only the wallet lock. Lock acquisition is bounded by
//! `LedgerConfig::lock_timeout`.
//!
//! The record is appended to the store and the new wallet state is swapped in
//! without any await point in between, so a caller that is dropped mid-way
//! leaves either both or neither.

use crate::error::{BalanceSource, LedgerError};
use crate::hash::{HashAlgorithm, HashEngine};
use crate::record::{HoldBucket, LedgerRecord, RecordContext, RecordKind};
use crate::store::{LedgerStore, StoreError};
use crate::wallet::{VendorProfile, VendorWallet};
use chrono::{DateTime, SubsecRound, Utc};
use fundtrail_bus::{EventBus, LifecycleEvent};
use fundtrail_core::{Amount, RequestId, VendorId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

/// Ledger tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on waiting for the pool or a wallet lock
    pub lock_timeout: Duration,
    /// Algorithm stamped onto new records
    pub algorithm: HashAlgorithm,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            algorithm: HashAlgorithm::default(),
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    allocated_total: Amount,
}

#[derive(Debug, Default)]
struct JournalCursor {
    last_sequence: u64,
    last_committed_at: Option<DateTime<Utc>>,
}

/// Vendor wallets plus the budget pool they draw from
pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
    bus: Arc<EventBus>,
    engine: HashEngine,
    lock_timeout: Duration,
    wallets: RwLock<HashMap<VendorId, Arc<Mutex<VendorWallet>>>>,
    pool: Mutex<PoolState>,
    cursor: StdMutex<JournalCursor>,
}

impl WalletLedger {
    /// Open a ledger over `store`, rebuilding every wallet from its records
    pub fn open(
        store: Arc<dyn LedgerStore>,
        bus: Arc<EventBus>,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let mut wallets: HashMap<VendorId, VendorWallet> = HashMap::new();
        for profile in store.vendors()? {
            wallets.insert(profile.vendor_id.clone(), VendorWallet::open(&profile));
        }

        let mut pool = PoolState::default();
        let mut cursor = JournalCursor::default();
        let records = store.records()?;

        for record in &records {
            if record.sequence <= cursor.last_sequence {
                return Err(LedgerError::Replay {
                    sequence: record.sequence,
                    reason: format!("follows sequence {}", cursor.last_sequence),
                });
            }
            let wallet = wallets
                .get_mut(&record.vendor_id)
                .ok_or_else(|| LedgerError::Replay {
                    sequence: record.sequence,
                    reason: format!("unknown vendor {}", record.vendor_id),
                })?;
            *wallet = wallet
                .apply(&record.kind, record.amount, record.created_at)
                .map_err(|e| LedgerError::Replay {
                    sequence: record.sequence,
                    reason: e.to_string(),
                })?;

            if record.kind == RecordKind::Allocation {
                pool.allocated_total = pool
                    .allocated_total
                    .checked_add(&record.amount)
                    .ok_or_else(|| LedgerError::Replay {
                        sequence: record.sequence,
                        reason: "pool total overflowed".to_string(),
                    })?;
            }
            cursor.last_sequence = record.sequence;
            cursor.last_committed_at = Some(match cursor.last_committed_at {
                Some(last) if last > record.created_at => last,
                _ => record.created_at,
            });
        }

        info!(
            vendors = wallets.len(),
            records = records.len(),
            last_sequence = cursor.last_sequence,
            "Wallet ledger opened"
        );

        Ok(Self {
            store,
            bus,
            engine: HashEngine::new(config.algorithm),
            lock_timeout: config.lock_timeout,
            wallets: RwLock::new(
                wallets
                    .into_iter()
                    .map(|(id, wallet)| (id, Arc::new(Mutex::new(wallet))))
                    .collect(),
            ),
            pool: Mutex::new(pool),
            cursor: StdMutex::new(cursor),
        })
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn hash_engine(&self) -> HashEngine {
        self.engine
    }

    /// Highest committed sequence number
    pub fn last_sequence(&self) -> Result<u64, LedgerError> {
        let cursor = self.cursor.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(cursor.last_sequence)
    }

    /// Register a vendor with an empty wallet
    pub async fn onboard_vendor(
        &self,
        vendor_id: VendorId,
        display_name: &str,
    ) -> Result<VendorWallet, LedgerError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(LedgerError::Validation(
                "vendor display name is required".to_string(),
            ));
        }

        let profile = VendorProfile {
            vendor_id: vendor_id.clone(),
            display_name: display_name.to_string(),
            onboarded_at: Utc::now(),
        };
        let wallet = VendorWallet::open(&profile);
        {
            let mut wallets = self.wallets.write().map_err(|_| StoreError::Poisoned)?;
            if wallets.contains_key(&vendor_id) {
                return Err(LedgerError::VendorExists(vendor_id));
            }
            self.store.save_vendor(&profile)?;
            wallets.insert(vendor_id.clone(), Arc::new(Mutex::new(wallet.clone())));
        }

        info!(vendor_id = %vendor_id, "Vendor onboarded");
        self.bus
            .publish(LifecycleEvent::VendorOnboarded {
                vendor_id,
                display_name: profile.display_name,
                timestamp: profile.onboarded_at,
            })
            .await;
        Ok(wallet)
    }

    /// Move `amount` from the pool into the vendor's `pending` bucket.
    ///
    /// Fails with `InsufficientBalance { bucket: Pool, .. }` when the pool's
    /// remaining headroom under `ceiling` is smaller than `amount`.
    pub async fn allocate(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        context: &RecordContext,
        ceiling: Amount,
    ) -> Result<LedgerRecord, LedgerError> {
        self.mutate(vendor_id, RecordKind::Allocation, amount, context, Some(ceiling))
            .await
    }

    /// `pending -> available`
    pub async fn release(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        context: &RecordContext,
    ) -> Result<LedgerRecord, LedgerError> {
        self.mutate(vendor_id, RecordKind::Release, amount, context, None)
            .await
    }

    /// `available -> withdrawn`, all or nothing
    pub async fn withdraw(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        context: &RecordContext,
    ) -> Result<LedgerRecord, LedgerError> {
        self.mutate(vendor_id, RecordKind::Withdrawal, amount, context, None)
            .await
    }

    /// Place a compliance hold on funds from `source`
    pub async fn freeze(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        source: HoldBucket,
        reason: &str,
        context: &RecordContext,
    ) -> Result<LedgerRecord, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("freeze reason is required".to_string()));
        }
        let kind = RecordKind::Freeze {
            source,
            reason: reason.trim().to_string(),
        };
        self.mutate(vendor_id, kind, amount, context, None).await
    }

    /// Lift a hold back into `target`
    pub async fn unfreeze(
        &self,
        vendor_id: &VendorId,
        amount: Amount,
        target: HoldBucket,
        context: &RecordContext,
    ) -> Result<LedgerRecord, LedgerError> {
        self.mutate(vendor_id, RecordKind::Unfreeze { target }, amount, context, None)
            .await
    }

    /// Snapshot of one wallet
    pub async fn wallet(&self, vendor_id: &VendorId) -> Result<VendorWallet, LedgerError> {
        let slot = self.slot(vendor_id)?;
        let wallet = self.acquire(&slot, || format!("wallet {vendor_id}")).await?;
        Ok(wallet.clone())
    }

    /// Snapshot of every wallet, ordered by vendor id
    pub async fn wallets(&self) -> Result<Vec<VendorWallet>, LedgerError> {
        let slots: Vec<(VendorId, Arc<Mutex<VendorWallet>>)> = {
            let wallets = self.wallets.read().map_err(|_| StoreError::Poisoned)?;
            wallets
                .iter()
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };

        let mut snapshot = Vec::with_capacity(slots.len());
        for (vendor_id, slot) in slots {
            let wallet = self.acquire(&slot, || format!("wallet {vendor_id}")).await?;
            snapshot.push(wallet.clone());
        }
        snapshot.sort_by(|a, b| a.vendor_id().as_str().cmp(b.vendor_id().as_str()));
        Ok(snapshot)
    }

    /// Sum of every allocation ever committed
    pub async fn allocated_total(&self) -> Result<Amount, LedgerError> {
        let pool = self.acquire(&self.pool, || "budget pool".to_string()).await?;
        Ok(pool.allocated_total)
    }

    /// Committed records tagged with `request_id`, in sequence order
    pub fn records_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self
            .store
            .records()?
            .into_iter()
            .filter(|record| record.request_id.as_ref() == Some(request_id))
            .collect())
    }

    /// Headroom left under `ceiling`
    pub async fn remaining(&self, ceiling: Amount) -> Result<Amount, LedgerError> {
        let allocated = self.allocated_total().await?;
        Ok(ceiling.checked_sub(&allocated).unwrap_or(Amount::ZERO))
    }

    async fn mutate(
        &self,
        vendor_id: &VendorId,
        kind: RecordKind,
        amount: Amount,
        context: &RecordContext,
        ceiling: Option<Amount>,
    ) -> Result<LedgerRecord, LedgerError> {
        let result = self
            .mutate_locked(vendor_id, kind.clone(), amount, context, ceiling)
            .await;

        match &result {
            Ok(record) => {
                info!(
                    sequence = record.sequence,
                    record_id = %record.record_id,
                    kind = record.kind.name(),
                    vendor_id = %vendor_id,
                    amount = %amount,
                    "Ledger record committed"
                );
                self.bus
                    .publish(LifecycleEvent::LedgerMutation {
                        sequence: record.sequence,
                        record_id: record.record_id.clone(),
                        kind: record.kind.name().to_string(),
                        vendor_id: vendor_id.clone(),
                        amount,
                        timestamp: record.created_at,
                    })
                    .await;
            }
            Err(LedgerError::InvariantViolation { vendor_id, detail }) => {
                error!(vendor_id = %vendor_id, detail = %detail, "Conservation invariant violated");
                self.bus
                    .publish(LifecycleEvent::InvariantBreached {
                        vendor_id: vendor_id.clone(),
                        detail: detail.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
            }
            Err(err) => {
                debug!(vendor_id = %vendor_id, kind = kind.name(), error = %err, "Ledger mutation rejected");
            }
        }
        result
    }

    async fn mutate_locked(
        &self,
        vendor_id: &VendorId,
        kind: RecordKind,
        amount: Amount,
        context: &RecordContext,
        ceiling: Option<Amount>,
    ) -> Result<LedgerRecord, LedgerError> {
        let slot = self.slot(vendor_id)?;

        let Some(ceiling) = ceiling else {
            let mut wallet = self.acquire(&slot, || format!("wallet {vendor_id}")).await?;
            return self.commit(&mut wallet, kind, amount, context);
        };

        let mut pool = self.acquire(&self.pool, || "budget pool".to_string()).await?;
        let mut wallet = self.acquire(&slot, || format!("wallet {vendor_id}")).await?;

        let headroom = ceiling.value() - pool.allocated_total.value();
        if amount.value() > headroom {
            return Err(LedgerError::insufficient(
                BalanceSource::Pool,
                amount.value(),
                headroom.max(Decimal::ZERO),
            ));
        }
        let allocated_total = pool
            .allocated_total
            .checked_add(&amount)
            .ok_or_else(|| LedgerError::Validation(format!("amount {amount} overflows pool")))?;

        let record = self.commit(&mut wallet, kind, amount, context)?;
        pool.allocated_total = allocated_total;
        Ok(record)
    }

    /// Apply, stamp, append and swap in, all under the journal cursor
    fn commit(
        &self,
        wallet: &mut MutexGuard<'_, VendorWallet>,
        kind: RecordKind,
        amount: Amount,
        context: &RecordContext,
    ) -> Result<LedgerRecord, LedgerError> {
        let mut cursor = self.cursor.lock().map_err(|_| StoreError::Poisoned)?;

        let now = Utc::now().trunc_subsecs(6);
        let created_at = match cursor.last_committed_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let next = wallet.apply(&kind, amount, created_at)?;
        let sequence = cursor.last_sequence + 1;
        let record = LedgerRecord::stamp(
            sequence,
            kind,
            amount,
            wallet.vendor_id().clone(),
            wallet.display_name().to_string(),
            context,
            created_at,
            self.engine.algorithm(),
        );

        self.store.append(&record)?;
        cursor.last_sequence = sequence;
        cursor.last_committed_at = Some(created_at);
        **wallet = next;
        Ok(record)
    }

    fn slot(&self, vendor_id: &VendorId) -> Result<Arc<Mutex<VendorWallet>>, LedgerError> {
        let wallets = self.wallets.read().map_err(|_| StoreError::Poisoned)?;
        wallets
            .get(vendor_id)
            .cloned()
            .ok_or_else(|| LedgerError::VendorNotFound(vendor_id.clone()))
    }

    async fn acquire<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        resource: impl FnOnce() -> String,
    ) -> Result<MutexGuard<'a, T>, LedgerError> {
        tokio::time::timeout(self.lock_timeout, mutex.lock())
            .await
            .map_err(|_| LedgerError::LockTimeout {
                resource: resource(),
                timeout_ms: self.lock_timeout.as_millis() as u64,
            })
    }
}
