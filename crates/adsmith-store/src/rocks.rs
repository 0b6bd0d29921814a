//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait. Every balance mutation follows one primitive: take the owning
//! account's lock, check the idempotency marker, check the zero floor,
//! then commit the ledger entry, its marker, the account record, and any
//! job row as a single `WriteBatch`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Months, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use adsmith_core::{
    GenerationJob, JobId, JobTransition, LedgerEntry, LedgerEntryId, LedgerReason,
    SubscriptionActivation, TokenAccount, UserId, INITIAL_GRANT_TOKENS,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{
    AccountCreation, ActivationOutcome, JobCreation, LedgerAudit, LedgerOutcome, RefillOutcome,
    Store,
};

/// Number of account lock shards.
///
/// Mutators of the same account always hash to the same shard, so the
/// check-then-write sequence is serialized per user; mutators of different
/// users rarely contend.
const LOCK_SHARDS: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    account_locks: Vec<Mutex<()>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Take the lock shard for an account.
    ///
    /// A poisoned shard is recovered: the guard only serializes access, it
    /// protects no in-memory state of its own.
    #[allow(clippy::cast_possible_truncation)]
    fn account_guard(&self, user_id: &UserId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        user_id.as_bytes().hash(&mut hasher);
        let shard = (hasher.finish() % self.account_locks.len() as u64) as usize;
        self.account_locks[shard]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an idempotency marker.
    ///
    /// Returns `None` when the key was never processed, `Some(None)` when
    /// it was processed without moving tokens, and `Some(Some(entry))`
    /// when it funded a ledger entry.
    fn lookup_marker(&self, key: &[u8]) -> Result<Option<Option<LedgerEntry>>> {
        let cf = self.cf(cf::IDEMPOTENCY)?;
        let Some(value) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        if value.is_empty() {
            return Ok(Some(None));
        }

        let bytes: [u8; 16] = value
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Database("malformed idempotency marker".into()))?;
        let entry_id = LedgerEntryId::from_bytes(bytes)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        self.get_ledger_entry(&entry_id).map(Some)
    }

    /// Stage a ledger entry plus the updated account into a batch.
    ///
    /// Writes the entry, its per-user index row, its idempotency marker
    /// (when it carries a reference id), and the account record. The
    /// caller has already applied the delta to `account.balance`.
    fn stage_entry(
        &self,
        batch: &mut WriteBatch,
        account: &TokenAccount,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;

        batch.put_cf(&cf_ledger, keys::ledger_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_ledger_key(&entry.user_id, &entry.id),
            [],
        );

        if let Some(reference) = &entry.reference_id {
            let cf_idem = self.cf(cf::IDEMPOTENCY)?;
            batch.put_cf(
                &cf_idem,
                keys::idempotency_key(&entry.user_id, &entry.reason.tag(), reference),
                entry.id.to_bytes(),
            );
        }

        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );

        Ok(())
    }

    /// Stage the account record alone (metadata or schedule updates).
    fn stage_account(&self, batch: &mut WriteBatch, account: &TokenAccount) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        Ok(())
    }

    /// Stage a no-entry idempotency marker.
    fn stage_empty_marker(&self, batch: &mut WriteBatch, key: &[u8]) -> Result<()> {
        let cf_idem = self.cf(cf::IDEMPOTENCY)?;
        batch.put_cf(&cf_idem, key, []);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Resolve an idempotency replay into a `LedgerOutcome`.
    fn replay_outcome(&self, user_id: &UserId, marker: Option<LedgerEntry>) -> Result<LedgerOutcome> {
        let entry = marker.ok_or_else(|| {
            StoreError::Database("idempotency marker without ledger entry".into())
        })?;
        let account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;
        Ok(LedgerOutcome::AlreadyApplied {
            balance: account.balance,
            entry,
        })
    }

    /// Collect index keys under a user prefix, newest first, paginated.
    fn page_index_keys(
        &self,
        cf_name: &str,
        prefix: &[u8],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        // ULID suffixes are time-ordered, so a forward scan is oldest first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }

        all_keys.reverse();

        Ok(all_keys.into_iter().skip(offset).take(limit).collect())
    }
}

fn account_not_found(user_id: &UserId) -> StoreError {
    StoreError::NotFound {
        entity: "account",
        id: user_id.to_string(),
    }
}

fn job_not_found(job_id: &JobId) -> StoreError {
    StoreError::NotFound {
        entity: "job",
        id: job_id.to_string(),
    }
}

/// Next refill one calendar month out.
fn next_refill(from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    from.checked_add_months(Months::new(1))
        .ok_or_else(|| StoreError::InvalidAmount("refill schedule out of range".into()))
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, user_id: &UserId) -> Result<AccountCreation> {
        let _guard = self.account_guard(user_id);

        if let Some(account) = self.get_account(user_id)? {
            return Ok(AccountCreation {
                account,
                granted: None,
                created: false,
            });
        }

        let mut account = TokenAccount::new(*user_id);
        account.balance = INITIAL_GRANT_TOKENS;
        let entry = LedgerEntry::initial_grant(*user_id, INITIAL_GRANT_TOKENS, account.balance);

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            granted = INITIAL_GRANT_TOKENS,
            "token account provisioned"
        );

        Ok(AccountCreation {
            account,
            granted: Some(entry),
            created: true,
        })
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<TokenAccount>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    fn get_ledger_entry(&self, entry_id: &LedgerEntryId) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::LEDGER)?;
        let key = keys::ledger_key(entry_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_ledger_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let prefix = keys::user_ledger_prefix(user_id);
        let page = self.page_index_keys(cf::LEDGER_BY_USER, &prefix, limit, offset)?;

        let mut entries = Vec::with_capacity(page.len());
        for key in page {
            let entry_id = keys::extract_entry_id_from_user_key(&key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if let Some(entry) = self.get_ledger_entry(&entry_id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn verify_ledger(&self, user_id: &UserId) -> Result<LedgerAudit> {
        let account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        let cf = self.cf(cf::LEDGER_BY_USER)?;
        let prefix = keys::user_ledger_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut running = 0i64;
        let mut entries = 0usize;
        let mut first_mismatch = None;

        // Oldest first: forward scan over the ULID-suffixed index.
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }

            let entry_id = keys::extract_entry_id_from_user_key(&key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let entry = self
                .get_ledger_entry(&entry_id)?
                .ok_or_else(|| StoreError::Database("index row without ledger entry".into()))?;

            running += entry.delta;
            entries += 1;
            if entry.balance_after != running && first_mismatch.is_none() {
                first_mismatch = Some(entry.id);
            }
        }

        let consistent = first_mismatch.is_none() && running == account.balance;

        Ok(LedgerAudit {
            entries,
            expected_balance: running,
            actual_balance: account.balance,
            first_mismatch,
            consistent,
        })
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn reserve(
        &self,
        user_id: &UserId,
        tokens_cost: i64,
        job_id: &JobId,
    ) -> Result<LedgerOutcome> {
        if tokens_cost <= 0 {
            return Err(StoreError::InvalidAmount(format!(
                "reservation cost must be positive, got {tokens_cost}"
            )));
        }

        let _guard = self.account_guard(user_id);

        let marker_key =
            keys::idempotency_key(user_id, &LedgerReason::JobReserve.tag(), &job_id.to_string());
        if let Some(marker) = self.lookup_marker(&marker_key)? {
            return self.replay_outcome(user_id, marker);
        }

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        if account.balance < tokens_cost {
            return Err(StoreError::InsufficientTokens {
                balance: account.balance,
                required: tokens_cost,
            });
        }

        account.balance -= tokens_cost;
        account.updated_at = Utc::now();
        let entry = LedgerEntry::reserve(*user_id, tokens_cost, job_id, account.balance);

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %user_id,
            job_id = %job_id,
            tokens_cost,
            balance = account.balance,
            "tokens reserved"
        );

        Ok(LedgerOutcome::Applied {
            balance: account.balance,
            entry,
        })
    }

    fn refund(&self, user_id: &UserId, tokens_cost: i64, job_id: &JobId) -> Result<LedgerOutcome> {
        if tokens_cost <= 0 {
            return Err(StoreError::InvalidAmount(format!(
                "refund amount must be positive, got {tokens_cost}"
            )));
        }

        let _guard = self.account_guard(user_id);

        let marker_key =
            keys::idempotency_key(user_id, &LedgerReason::JobRefund.tag(), &job_id.to_string());
        if let Some(marker) = self.lookup_marker(&marker_key)? {
            return self.replay_outcome(user_id, marker);
        }

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        account.balance += tokens_cost;
        account.updated_at = Utc::now();
        let entry = LedgerEntry::refund(*user_id, tokens_cost, job_id, account.balance);

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %user_id,
            job_id = %job_id,
            tokens_cost,
            balance = account.balance,
            "reservation refunded"
        );

        Ok(LedgerOutcome::Applied {
            balance: account.balance,
            entry,
        })
    }

    fn topup(
        &self,
        user_id: &UserId,
        tokens_amount: i64,
        checkout_session_id: &str,
        sku: &str,
    ) -> Result<LedgerOutcome> {
        if tokens_amount <= 0 {
            return Err(StoreError::InvalidAmount(format!(
                "topup amount must be positive, got {tokens_amount}"
            )));
        }

        let _guard = self.account_guard(user_id);

        let reason = LedgerReason::TopupPurchase {
            sku: sku.to_string(),
        };
        let marker_key = keys::idempotency_key(user_id, &reason.tag(), checkout_session_id);
        if let Some(marker) = self.lookup_marker(&marker_key)? {
            return self.replay_outcome(user_id, marker);
        }

        // Payment events provision lazily: the first purchase may precede
        // account setup.
        let mut account = self
            .get_account(user_id)?
            .unwrap_or_else(|| TokenAccount::new(*user_id));

        account.balance += tokens_amount;
        account.updated_at = Utc::now();
        let entry = LedgerEntry::topup(
            *user_id,
            tokens_amount,
            sku.to_string(),
            checkout_session_id,
            account.balance,
        );

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            tokens_amount,
            sku,
            checkout_session_id,
            balance = account.balance,
            "topup credited"
        );

        Ok(LedgerOutcome::Applied {
            balance: account.balance,
            entry,
        })
    }

    fn refill(
        &self,
        user_id: &UserId,
        tokens_per_period: i64,
        refill_date: &str,
    ) -> Result<RefillOutcome> {
        if tokens_per_period <= 0 {
            return Err(StoreError::InvalidAmount(format!(
                "refill allotment must be positive, got {tokens_per_period}"
            )));
        }

        let _guard = self.account_guard(user_id);

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        let marker_key =
            keys::idempotency_key(user_id, &LedgerReason::SubsRefill.tag(), refill_date);
        if let Some(marker) = self.lookup_marker(&marker_key)? {
            let next = account.next_refill_at.unwrap_or_else(Utc::now);
            return Ok(RefillOutcome {
                entry: marker,
                balance: account.balance,
                next_refill_at: next,
                replayed: true,
            });
        }

        let now = Utc::now();
        let next = next_refill(now)?;
        account.last_refill_at = Some(now);
        account.next_refill_at = Some(next);
        account.updated_at = now;

        let deficit = tokens_per_period - account.balance;
        let mut batch = WriteBatch::default();

        let entry = if deficit > 0 {
            account.balance = tokens_per_period;
            let entry = LedgerEntry::refill(*user_id, deficit, refill_date, account.balance);
            self.stage_entry(&mut batch, &account, &entry)?;
            Some(entry)
        } else {
            // Schedule advance only. The date is still marked processed so
            // a webhook redelivery cannot grant after the balance drops.
            self.stage_empty_marker(&mut batch, &marker_key)?;
            self.stage_account(&mut batch, &account)?;
            None
        };

        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            refill_date,
            granted = entry.as_ref().map_or(0, |e| e.delta),
            balance = account.balance,
            "subscription refill processed"
        );

        Ok(RefillOutcome {
            entry,
            balance: account.balance,
            next_refill_at: next,
            replayed: false,
        })
    }

    fn activate(
        &self,
        user_id: &UserId,
        activation: &SubscriptionActivation,
    ) -> Result<ActivationOutcome> {
        let _guard = self.account_guard(user_id);

        // Payment events provision lazily, same as topup.
        let mut account = self
            .get_account(user_id)?
            .unwrap_or_else(|| TokenAccount::new(*user_id));

        let now = Utc::now();
        let next = next_refill(now)?;

        // Phase one: provider metadata and plan, applied unconditionally
        // (a replayed event still refreshes status).
        account.plan = activation.plan;
        account.period = activation.period;
        account.stripe_customer_id = Some(activation.stripe_customer_id.clone());
        account.stripe_subscription_id = Some(activation.stripe_subscription_id.clone());
        account.subscription_status = Some(activation.status);
        account.cancellation_time = None;
        account.last_refill_at = Some(now);
        account.next_refill_at = Some(next);
        account.updated_at = now;

        // Phase two: ensure-minimum-balance grant, idempotent per
        // subscription id. Free-tier activation grants nothing, and a
        // downgrade never claws tokens back.
        let plan_tokens = activation.plan.monthly_tokens();
        let marker_key = keys::idempotency_key(
            user_id,
            &LedgerReason::SubsActivation.tag(),
            &activation.stripe_subscription_id,
        );
        let already_granted = self.lookup_marker(&marker_key)?.is_some();

        let mut batch = WriteBatch::default();
        let entry = if !already_granted && plan_tokens > 0 {
            if account.balance < plan_tokens {
                let delta = plan_tokens - account.balance;
                account.balance = plan_tokens;
                let entry = LedgerEntry::activation(
                    *user_id,
                    delta,
                    &activation.stripe_subscription_id,
                    account.balance,
                );
                self.stage_entry(&mut batch, &account, &entry)?;
                Some(entry)
            } else {
                self.stage_empty_marker(&mut batch, &marker_key)?;
                self.stage_account(&mut batch, &account)?;
                None
            }
        } else {
            self.stage_account(&mut batch, &account)?;
            None
        };

        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            plan = account.plan.code(),
            subscription_id = %activation.stripe_subscription_id,
            granted = entry.as_ref().map_or(0, |e| e.delta),
            balance = account.balance,
            "subscription activated"
        );

        Ok(ActivationOutcome {
            entry,
            balance: account.balance,
        })
    }

    fn mark_subscription_canceled(
        &self,
        user_id: &UserId,
        canceled_at: DateTime<Utc>,
    ) -> Result<TokenAccount> {
        let _guard = self.account_guard(user_id);

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        account.subscription_status = Some(adsmith_core::SubscriptionStatus::Canceled);
        account.cancellation_time = Some(canceled_at);
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.write(batch)?;

        tracing::info!(user_id = %user_id, "subscription cancelled, balance retained");

        Ok(account)
    }

    fn adjust(
        &self,
        user_id: &UserId,
        delta: i64,
        reference_id: Option<String>,
    ) -> Result<LedgerOutcome> {
        if delta == 0 {
            return Err(StoreError::InvalidAmount("zero adjustment".into()));
        }

        let _guard = self.account_guard(user_id);

        if let Some(reference) = &reference_id {
            let marker_key =
                keys::idempotency_key(user_id, &LedgerReason::AdminAdjust.tag(), reference);
            if let Some(marker) = self.lookup_marker(&marker_key)? {
                return self.replay_outcome(user_id, marker);
            }
        }

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        let new_balance = account.balance + delta;
        if new_balance < 0 {
            return Err(StoreError::InsufficientTokens {
                balance: account.balance,
                required: -delta,
            });
        }

        account.balance = new_balance;
        account.updated_at = Utc::now();
        let entry = LedgerEntry::adjustment(*user_id, delta, reference_id, account.balance);

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            delta,
            balance = account.balance,
            "operator adjustment applied"
        );

        Ok(LedgerOutcome::Applied {
            balance: account.balance,
            entry,
        })
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    fn create_job(
        &self,
        user_id: &UserId,
        job_id: &JobId,
        tokens_cost: i64,
    ) -> Result<JobCreation> {
        if tokens_cost <= 0 {
            return Err(StoreError::InvalidAmount(format!(
                "job cost must be positive, got {tokens_cost}"
            )));
        }

        let _guard = self.account_guard(user_id);

        let marker_key =
            keys::idempotency_key(user_id, &LedgerReason::JobReserve.tag(), &job_id.to_string());
        if self.lookup_marker(&marker_key)?.is_some() {
            let job = self
                .get_job(job_id)?
                .ok_or_else(|| StoreError::Database("reservation without job row".into()))?;
            let account = self
                .get_account(user_id)?
                .ok_or_else(|| account_not_found(user_id))?;
            return Ok(JobCreation {
                job,
                balance: account.balance,
                replayed: true,
            });
        }

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| account_not_found(user_id))?;

        if account.balance < tokens_cost {
            return Err(StoreError::InsufficientTokens {
                balance: account.balance,
                required: tokens_cost,
            });
        }

        account.balance -= tokens_cost;
        account.updated_at = Utc::now();
        let entry = LedgerEntry::reserve(*user_id, tokens_cost, job_id, account.balance);
        let job = GenerationJob::new(*job_id, *user_id, tokens_cost, entry.id);

        // Reservation and job row persist together or not at all.
        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, &entry)?;
        let cf_jobs = self.cf(cf::JOBS)?;
        let cf_jobs_by_user = self.cf(cf::JOBS_BY_USER)?;
        batch.put_cf(&cf_jobs, keys::job_key(job_id), Self::serialize(&job)?);
        batch.put_cf(&cf_jobs_by_user, keys::user_job_key(user_id, job_id), []);
        self.write(batch)?;

        tracing::info!(
            user_id = %user_id,
            job_id = %job_id,
            tokens_cost,
            balance = account.balance,
            "generation job created"
        );

        Ok(JobCreation {
            job,
            balance: account.balance,
            replayed: false,
        })
    }

    fn transition_job(&self, job_id: &JobId, transition: &JobTransition) -> Result<GenerationJob> {
        let existing = self.get_job(job_id)?.ok_or_else(|| job_not_found(job_id))?;

        let _guard = self.account_guard(&existing.user_id);

        // Re-read under the lock; a competing transition may have landed.
        let mut job = self.get_job(job_id)?.ok_or_else(|| job_not_found(job_id))?;

        let to = transition.target_status();
        if !job.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to,
            });
        }

        let now = Utc::now();
        job.status = to;
        match transition {
            JobTransition::Running => job.started_at = Some(now),
            JobTransition::Succeeded | JobTransition::Canceled => job.completed_at = Some(now),
            JobTransition::Failed {
                error_code,
                error_message,
            } => {
                job.completed_at = Some(now);
                job.error_code = Some(error_code.clone());
                job.error_message = Some(error_message.clone());
            }
        }

        let mut batch = WriteBatch::default();
        let cf_jobs = self.cf(cf::JOBS)?;
        batch.put_cf(&cf_jobs, keys::job_key(job_id), Self::serialize(&job)?);

        // Failure and cancellation release the reservation in the same
        // atomic write as the status change. The refund key matches the
        // standalone refund path, so whichever lands first wins and the
        // other is a no-op.
        if transition.refunds_reservation() {
            let marker_key = keys::idempotency_key(
                &job.user_id,
                &LedgerReason::JobRefund.tag(),
                &job_id.to_string(),
            );
            if self.lookup_marker(&marker_key)?.is_none() {
                let mut account = self
                    .get_account(&job.user_id)?
                    .ok_or_else(|| account_not_found(&job.user_id))?;
                account.balance += job.tokens_cost;
                account.updated_at = now;
                let entry =
                    LedgerEntry::refund(job.user_id, job.tokens_cost, job_id, account.balance);
                self.stage_entry(&mut batch, &account, &entry)?;
            }
        }

        self.write(batch)?;

        tracing::info!(
            job_id = %job_id,
            user_id = %job.user_id,
            status = ?job.status,
            refunded = transition.refunds_reservation(),
            "job transitioned"
        );

        Ok(job)
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<GenerationJob>> {
        let cf = self.cf(cf::JOBS)?;
        let key = keys::job_key(job_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationJob>> {
        let prefix = keys::user_jobs_prefix(user_id);
        let page = self.page_index_keys(cf::JOBS_BY_USER, &prefix, limit, offset)?;

        let mut jobs = Vec::with_capacity(page.len());
        for key in page {
            let job_id = keys::extract_job_id_from_user_key(&key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if let Some(job) = self.get_job(&job_id)? {
                jobs.push(job);
            }
        }

        Ok(jobs)
    }
}
