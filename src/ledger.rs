//! Per-user daily quota and lifetime entitlement tracking.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Usage state for one client-generated user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Calendar day (UTC) the counter belongs to.
    pub usage_date: NaiveDate,
    /// Compressions consumed on `usage_date`.
    pub usage_count: u32,
    /// Sticky once set; entitled users are never quota limited.
    pub is_entitled: bool,
}

impl UserRecord {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            usage_date: today,
            usage_count: 0,
            is_entitled: false,
        }
    }

    // Lazy day rollover, entitled records keep their stale counter
    fn roll_over(&mut self, today: NaiveDate) {
        if self.usage_date != today && !self.is_entitled {
            self.usage_date = today;
            self.usage_count = 0;
        }
    }
}

/// Result of a quota check. `remaining` is `None` for unlimited users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub remaining: Option<u32>,
}

/// Keyed storage behind the ledger.
///
/// `update` must run the closure while holding exclusive access to the
/// record, creating it with [`UserRecord::new`] when absent.
pub trait UsageStore: Send + Sync {
    fn get(&self, user_id: &str) -> Option<UserRecord>;

    fn update(
        &self,
        user_id: &str,
        today: NaiveDate,
        f: &mut dyn FnMut(&mut UserRecord),
    ) -> UserRecord;

    fn user_count(&self) -> usize;
}

/// Process-lifetime store, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, UserRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for MemoryStore {
    fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.records.get(user_id).map(|r| r.value().clone())
    }

    fn update(
        &self,
        user_id: &str,
        today: NaiveDate,
        f: &mut dyn FnMut(&mut UserRecord),
    ) -> UserRecord {
        // entry() holds the shard write lock until `record` drops
        let mut record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::new(today));
        f(&mut record);
        record.clone()
    }

    fn user_count(&self) -> usize {
        self.records.len()
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    daily_limit: u32,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    pub fn in_memory(daily_limit: u32) -> Self {
        Self::new(Arc::new(MemoryStore::new()), daily_limit)
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn tracked_users(&self) -> usize {
        self.store.user_count()
    }

    /// Current record without creating or rolling it over.
    pub fn peek(&self, user_id: &str) -> Option<UserRecord> {
        self.store.get(user_id)
    }

    pub fn get_or_init(&self, user_id: &str) -> UserRecord {
        self.get_or_init_on(user_id, today())
    }

    pub fn get_or_init_on(&self, user_id: &str, today: NaiveDate) -> UserRecord {
        self.store
            .update(user_id, today, &mut |record| record.roll_over(today))
    }

    pub fn check_quota(&self, record: &UserRecord) -> QuotaStatus {
        if record.is_entitled {
            return QuotaStatus {
                allowed: true,
                remaining: None,
            };
        }
        QuotaStatus {
            allowed: record.usage_count < self.daily_limit,
            remaining: Some(self.daily_limit.saturating_sub(record.usage_count)),
        }
    }

    /// Debit one compression. Entitled users are never debited.
    pub fn consume(&self, user_id: &str) -> UserRecord {
        self.consume_on(user_id, today())
    }

    pub fn consume_on(&self, user_id: &str, today: NaiveDate) -> UserRecord {
        self.store.update(user_id, today, &mut |record| {
            record.roll_over(today);
            if !record.is_entitled {
                record.usage_count += 1;
            }
        })
    }

    /// Check and debit under one lock on the user's record.
    ///
    /// `Ok` carries the quota left after the debit; `Err` carries the
    /// rejected status and leaves the record untouched.
    pub fn try_consume(&self, user_id: &str) -> Result<QuotaStatus, QuotaStatus> {
        self.try_consume_on(user_id, today())
    }

    pub fn try_consume_on(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<QuotaStatus, QuotaStatus> {
        let mut granted = false;
        let daily_limit = self.daily_limit;
        let record = self.store.update(user_id, today, &mut |record| {
            record.roll_over(today);
            if record.is_entitled {
                granted = true;
            } else if record.usage_count < daily_limit {
                record.usage_count += 1;
                granted = true;
            }
        });

        let status = self.check_quota(&record);
        if granted {
            Ok(QuotaStatus {
                allowed: true,
                remaining: status.remaining,
            })
        } else {
            Err(status)
        }
    }

    /// Debit one compression and hold it until the request delivers.
    ///
    /// The returned reservation refunds the debit when dropped without
    /// [`commit`](QuotaReservation::commit), including when the request
    /// future is cancelled mid-compression.
    pub fn reserve(self: &Arc<Self>, user_id: &str) -> Result<QuotaReservation, QuotaStatus> {
        self.reserve_on(user_id, today())
    }

    pub fn reserve_on(
        self: &Arc<Self>,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<QuotaReservation, QuotaStatus> {
        let status = self.try_consume_on(user_id, today)?;
        Ok(QuotaReservation {
            ledger: Arc::clone(self),
            user_id: user_id.to_string(),
            debited_on: today,
            status,
            committed: false,
        })
    }

    /// Give back a debit taken on `debited_on`. A record that has since
    /// rolled over to another day is left alone.
    pub fn refund_on(&self, user_id: &str, debited_on: NaiveDate) {
        self.store.update(user_id, debited_on, &mut |record| {
            if !record.is_entitled && record.usage_date == debited_on {
                record.usage_count = record.usage_count.saturating_sub(1);
            }
        });
    }

    // Only payment verification upgrades a user
    pub(crate) fn grant_entitlement(&self, user_id: &str) -> UserRecord {
        let today = today();
        self.store.update(user_id, today, &mut |record| {
            record.roll_over(today);
            record.is_entitled = true;
        })
    }
}

/// A debit that is refunded on drop unless committed.
#[must_use = "dropping a reservation refunds it"]
pub struct QuotaReservation {
    ledger: Arc<UsageLedger>,
    user_id: String,
    debited_on: NaiveDate,
    status: QuotaStatus,
    committed: bool,
}

impl QuotaReservation {
    /// Quota left after this debit.
    pub fn status(&self) -> QuotaStatus {
        self.status
    }

    pub fn commit(mut self) -> QuotaStatus {
        self.committed = true;
        self.status
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        // unlimited users were never debited
        if !self.committed && self.status.remaining.is_some() {
            self.ledger.refund_on(&self.user_id, self.debited_on);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn unseen_user_starts_empty() {
        let ledger = UsageLedger::in_memory(5);
        let record = ledger.get_or_init_on("u1", day("2026-03-01"));
        assert_eq!(record, UserRecord::new(day("2026-03-01")));
        assert_eq!(ledger.tracked_users(), 1);
    }

    #[test]
    fn free_user_resets_on_new_day() {
        let ledger = UsageLedger::in_memory(5);
        let yesterday = day("2026-03-01");
        for _ in 0..3 {
            ledger.consume_on("u1", yesterday);
        }

        let record = ledger.get_or_init_on("u1", yesterday.checked_add_days(Days::new(1)).unwrap());
        assert_eq!(record.usage_count, 0);
        assert_eq!(record.usage_date, day("2026-03-02"));
    }

    #[test]
    fn entitled_user_never_resets() {
        let ledger = UsageLedger::in_memory(5);
        let today = today();
        for _ in 0..3 {
            ledger.consume_on("u1", today);
        }
        ledger.grant_entitlement("u1");

        let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
        let record = ledger.get_or_init_on("u1", tomorrow);
        assert_eq!(record.usage_count, 3);
        assert_eq!(record.usage_date, today);
        assert!(record.is_entitled);
    }

    #[test]
    fn fifth_consume_exhausts_quota() {
        let ledger = UsageLedger::in_memory(5);
        let today = day("2026-03-01");
        for _ in 0..4 {
            ledger.consume_on("u1", today);
        }
        let record = ledger.consume_on("u1", today);
        assert_eq!(ledger.check_quota(&record).remaining, Some(0));

        let record = ledger.get_or_init_on("u1", today);
        assert_eq!(
            ledger.check_quota(&record),
            QuotaStatus {
                allowed: false,
                remaining: Some(0)
            }
        );
    }

    #[test]
    fn grant_is_idempotent_and_unlimits() {
        let ledger = UsageLedger::in_memory(2);
        ledger.consume("u1");
        ledger.consume("u1");
        ledger.consume("u1");

        let once = ledger.grant_entitlement("u1");
        let twice = ledger.grant_entitlement("u1");
        assert_eq!(once, twice);
        assert_eq!(
            ledger.check_quota(&twice),
            QuotaStatus {
                allowed: true,
                remaining: None
            }
        );

        // entitled users are not debited
        assert_eq!(ledger.consume("u1").usage_count, twice.usage_count);
    }

    #[test]
    fn try_consume_stops_at_limit_without_debiting() {
        let ledger = UsageLedger::in_memory(2);
        let today = day("2026-03-01");
        assert_eq!(ledger.try_consume_on("u1", today).unwrap().remaining, Some(1));
        assert_eq!(ledger.try_consume_on("u1", today).unwrap().remaining, Some(0));

        let rejected = ledger.try_consume_on("u1", today).unwrap_err();
        assert!(!rejected.allowed);
        assert_eq!(ledger.get_or_init_on("u1", today).usage_count, 2);
    }

    #[test]
    fn try_consume_is_atomic_across_threads() {
        let ledger = Arc::new(UsageLedger::in_memory(5));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.try_consume("shared").is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn refund_returns_a_debit() {
        let ledger = UsageLedger::in_memory(5);
        let today = day("2026-03-01");
        ledger.try_consume_on("u1", today).unwrap();
        ledger.refund_on("u1", today);
        assert_eq!(ledger.get_or_init_on("u1", today).usage_count, 0);

        // never goes negative
        ledger.refund_on("u1", today);
        assert_eq!(ledger.get_or_init_on("u1", today).usage_count, 0);
    }

    #[test]
    fn refund_after_rollover_leaves_new_day_alone() {
        let ledger = UsageLedger::in_memory(5);
        let yesterday = day("2026-03-01");
        let today = day("2026-03-02");
        ledger.try_consume_on("u1", yesterday).unwrap();
        ledger.try_consume_on("u1", today).unwrap();

        ledger.refund_on("u1", yesterday);
        let record = ledger.get_or_init_on("u1", today);
        assert_eq!(record.usage_date, today);
        assert_eq!(record.usage_count, 1);
    }

    #[test]
    fn dropped_reservation_is_refunded() {
        let ledger = Arc::new(UsageLedger::in_memory(5));
        let today = day("2026-03-01");

        let reservation = ledger.reserve_on("u1", today).unwrap();
        assert_eq!(reservation.status().remaining, Some(4));
        assert_eq!(ledger.peek("u1").unwrap().usage_count, 1);
        drop(reservation);
        assert_eq!(ledger.peek("u1").unwrap().usage_count, 0);
    }

    #[test]
    fn committed_reservation_keeps_the_debit() {
        let ledger = Arc::new(UsageLedger::in_memory(5));
        let today = day("2026-03-01");

        let status = ledger.reserve_on("u1", today).unwrap().commit();
        assert_eq!(status.remaining, Some(4));
        assert_eq!(ledger.peek("u1").unwrap().usage_count, 1);
    }

    #[test]
    fn reservation_rejected_at_limit() {
        let ledger = Arc::new(UsageLedger::in_memory(1));
        let today = day("2026-03-01");
        let _held = ledger.reserve_on("u1", today).unwrap();

        let rejected = ledger.reserve_on("u1", today).err().unwrap();
        assert_eq!(rejected.remaining, Some(0));
        assert_eq!(ledger.peek("u1").unwrap().usage_count, 1);
    }
}
