//! Wallet provisioning.
//!
//! Every user ends up with exactly one spot wallet and one futures wallet.
//! `register_user` creates both at account-creation time; the `ensure_*`
//! calls are the same idempotent get-or-create, used by engine operations
//! for users that were never registered.

use super::core::Engine;
use super::results::Registration;
use crate::events::{EventPayload, WalletKind, WalletProvisionedEvent};
use crate::store::Provisioned;
use crate::types::{Quote, Timestamp, UserId};
use tracing::info;

impl Engine {
    pub fn register_user(&self, user: UserId) -> Registration {
        Registration {
            spot: self.ensure_spot_wallet(user),
            futures: self.ensure_futures_wallet(user),
        }
    }

    pub fn ensure_spot_wallet(&self, user: UserId) -> Provisioned {
        let outcome = self.store.provision_spot(user, Timestamp::now());
        if outcome == Provisioned::Created {
            self.record_provisioned(user, WalletKind::Spot, Quote::zero());
        }
        outcome
    }

    pub fn ensure_futures_wallet(&self, user: UserId) -> Provisioned {
        let starting_balance = self.starting_balance();
        let outcome = self.store.provision_futures(user, starting_balance, Timestamp::now());
        if outcome == Provisioned::Created {
            self.record_provisioned(user, WalletKind::Futures, starting_balance);
        }
        outcome
    }

    fn record_provisioned(&self, user: UserId, wallet: WalletKind, starting_balance: Quote) {
        info!(%user, ?wallet, %starting_balance, "wallet provisioned");
        self.emit_event(
            user,
            EventPayload::WalletProvisioned(WalletProvisionedEvent {
                wallet,
                starting_balance,
            }),
        );
    }
}
