//! Account quota ledger.
//!
//! All arithmetic runs inside the caller's transaction: a failed check
//! aborts before any write, and a storage failure after a partial credit
//! rolls the whole operation back.

use river_types::models::River;

use crate::error::CoreError;
use crate::store::StoreWriter;

/// Gate for river creation: requires remaining quota, then debits one unit.
/// Raised before the river row is inserted so nothing partial can commit.
pub fn charge_river_creation(tx: &mut dyn StoreWriter, account_id: i64) -> Result<(), CoreError> {
    let account = tx.account(account_id)?.ok_or(CoreError::NotFound("account"))?;
    if account.river_quota_remaining <= 0 {
        return Err(CoreError::QuotaExceeded);
    }
    tx.debit_river_quota(account_id)?;
    Ok(())
}

/// Credits back everything the river consumed: the summed per-key channel
/// usage of each of its filters, plus one river unit.
pub fn refund_river_deletion(tx: &mut dyn StoreWriter, river: &River) -> Result<(), CoreError> {
    for filter in tx.channel_filters(river.id, false)? {
        for (key, used) in tx.channel_quota_usage(filter.id)? {
            tx.credit_channel_quota(river.account_id, &filter.channel, &key, used)?;
        }
    }
    tx.credit_river_quota(river.account_id, 1)?;
    Ok(())
}

/// Gate for adding a channel filter option: a configured per-key limit must
/// not be exhausted. A zero limit is unbounded.
pub fn charge_channel_option(
    tx: &mut dyn StoreWriter,
    account_id: i64,
    channel: &str,
    key: &str,
) -> Result<(), CoreError> {
    let quota = tx.channel_quota(account_id, channel, key)?;
    if quota.limit > 0 && quota.used >= quota.limit {
        return Err(CoreError::QuotaExceeded);
    }
    tx.debit_channel_quota(account_id, channel, key, 1)?;
    Ok(())
}

pub fn refund_channel_option(
    tx: &mut dyn StoreWriter,
    account_id: i64,
    channel: &str,
    key: &str,
) -> Result<(), CoreError> {
    tx.credit_channel_quota(account_id, channel, key, 1)?;
    Ok(())
}
