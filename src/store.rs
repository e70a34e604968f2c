//! In-memory relational store for wallet rows.
//!
//! One row set per user per product (spot, futures). The map key is the
//! uniqueness constraint: provisioning goes through the entry API, so two
//! racing creates for the same user both observe a single row.
//!
//! Mutations run as transactions: the user's row lock is taken, the closure
//! works on a copy, and the copy replaces the row only if the closure returns
//! `Ok`. A failed step anywhere in the closure leaves the committed row as it
//! was. Locks are synchronous and never held across an `.await`.

use crate::account::{FuturesAccount, SpotAccount};
use crate::types::{PositionId, Quote, Timestamp, UserId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no spot wallet for {0}")]
    MissingSpotWallet(UserId),

    #[error("no futures wallet for {0}")]
    MissingFuturesWallet(UserId),
}

type Row<T> = Arc<Mutex<T>>;

#[derive(Debug, Default)]
pub struct LedgerStore {
    spot: DashMap<UserId, Row<SpotAccount>>,
    futures: DashMap<UserId, Row<FuturesAccount>>,
    position_seq: AtomicU64,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provision_spot(&self, user: UserId, now: Timestamp) -> Provisioned {
        let mut created = false;
        self.spot.entry(user).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(SpotAccount::new(user, now)))
        });
        if created {
            Provisioned::Created
        } else {
            Provisioned::Existing
        }
    }

    pub fn provision_futures(&self, user: UserId, starting_balance: Quote, now: Timestamp) -> Provisioned {
        let mut created = false;
        self.futures.entry(user).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(FuturesAccount::new(user, starting_balance, now)))
        });
        if created {
            Provisioned::Created
        } else {
            Provisioned::Existing
        }
    }

    pub fn next_position_id(&self) -> PositionId {
        PositionId(self.position_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn spot_wallet_count(&self) -> usize {
        self.spot.len()
    }

    pub fn futures_wallet_count(&self) -> usize {
        self.futures.len()
    }

    pub fn has_futures_wallet(&self, user: UserId) -> bool {
        self.futures.contains_key(&user)
    }

    // clone the Arc out so the shard guard is released before we lock the row
    fn spot_row(&self, user: UserId) -> Result<Row<SpotAccount>, StoreError> {
        self.spot
            .get(&user)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StoreError::MissingSpotWallet(user))
    }

    fn futures_row(&self, user: UserId) -> Result<Row<FuturesAccount>, StoreError> {
        self.futures
            .get(&user)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StoreError::MissingFuturesWallet(user))
    }

    pub fn read_spot<T>(&self, user: UserId, f: impl FnOnce(&SpotAccount) -> T) -> Result<T, StoreError> {
        let row = self.spot_row(user)?;
        let guard = row.lock();
        Ok(f(&guard))
    }

    pub fn read_futures<T>(
        &self,
        user: UserId,
        f: impl FnOnce(&FuturesAccount) -> T,
    ) -> Result<T, StoreError> {
        let row = self.futures_row(user)?;
        let guard = row.lock();
        Ok(f(&guard))
    }

    pub fn spot_txn<T, E>(
        &self,
        user: UserId,
        f: impl FnOnce(&mut SpotAccount) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let row = self.spot_row(user)?;
        let mut guard = row.lock();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    pub fn futures_txn<T, E>(
        &self,
        user: UserId,
        f: impl FnOnce(&mut FuturesAccount) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let row = self.futures_row(user)?;
        let mut guard = row.lock();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }
}
