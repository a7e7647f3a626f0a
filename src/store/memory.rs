use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{PayrollStore, StoreError};
use crate::model::payroll::{
    PaymentFilter, PaymentPage, PaymentRecord, PaymentStatus, PayrollEntry, StoredPayroll,
};
use crate::payroll::calc::PayrollComputation;

/// In-process store for service and handler tests. Writes are staged on a
/// copy of the rows and swapped in only when every step succeeded.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<u64, StoredPayroll>>,
    next_id: AtomicU64,
    /// Number of upcoming calls that fail with a transient error.
    pub transient_failures: AtomicU32,
    /// Number of upcoming writes that fail after the header row is staged.
    pub detail_failures: AtomicU32,
    pub list_calls: AtomicU64,
    pub write_calls: AtomicU64,
    pub delay: Option<Duration>,
    /// Listings return the rows as they were before this pause.
    pub list_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn failing(times: u32) -> Self {
        let store = Self::default();
        store.transient_failures.store(times, Ordering::SeqCst);
        store
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn slow_listing(delay: Duration) -> Self {
        Self {
            list_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        if let Some(delay) = self.delay {
            actix_web::rt::time::sleep(delay).await;
        }
        if take_one(&self.transient_failures) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(())
    }

    fn write_details(&self) -> Result<(), StoreError> {
        if take_one(&self.detail_failures) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "detail row rejected".into(),
            )));
        }
        Ok(())
    }

    fn duplicate_of(
        rows: &BTreeMap<u64, StoredPayroll>,
        entry: &PayrollEntry,
        except: Option<u64>,
    ) -> bool {
        rows.values().any(|stored| {
            Some(stored.record.id) != except
                && stored.record.employee_id == entry.employee_id
                && stored.record.pay_period == entry.pay_period
        })
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn insert_payroll(
        &self,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError> {
        self.enter().await?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock().unwrap();
        if Self::duplicate_of(&rows, entry, None) {
            return Err(StoreError::Conflict("uq_payment_employee_period".into()));
        }

        let mut staged = rows.clone();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = StoredPayroll {
            record: PaymentRecord {
                id,
                employee_id: entry.employee_id,
                employee_name: entry.employee_name.clone(),
                pay_period: entry.pay_period,
                payment_date: entry.payment_date,
                payment_amount: computation.totals.net_pay,
                status: PaymentStatus::Pending,
                created_at: Utc::now(),
            },
            components: entry.components.clone(),
            policy: computation.policy,
        };
        staged.insert(id, stored.clone());
        self.write_details()?;

        *rows = staged;
        Ok(stored)
    }

    async fn update_payroll(
        &self,
        id: u64,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError> {
        self.enter().await?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock().unwrap();
        if !rows.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if Self::duplicate_of(&rows, entry, Some(id)) {
            return Err(StoreError::Conflict("uq_payment_employee_period".into()));
        }

        let mut staged = rows.clone();
        let stored = staged.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        stored.record.employee_id = entry.employee_id;
        stored.record.employee_name = entry.employee_name.clone();
        stored.record.pay_period = entry.pay_period;
        stored.record.payment_date = entry.payment_date;
        stored.record.payment_amount = computation.totals.net_pay;
        stored.components = entry.components.clone();
        stored.policy = computation.policy;
        let stored = stored.clone();
        self.write_details()?;

        *rows = staged;
        Ok(stored)
    }

    async fn get_payroll(&self, id: u64) -> Result<Option<StoredPayroll>, StoreError> {
        self.enter().await?;
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn find_payroll(
        &self,
        employee_id: u64,
        pay_period: NaiveDate,
    ) -> Result<Option<StoredPayroll>, StoreError> {
        self.enter().await?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|stored| {
                stored.record.employee_id == employee_id && stored.record.pay_period == pay_period
            })
            .cloned())
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<PaymentPage, StoreError> {
        self.enter().await?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let (page, per_page, offset) = filter.paging();
        let (data, total) = {
            let rows = self.rows.lock().unwrap();
            let mut matching: Vec<PaymentRecord> = rows
                .values()
                .map(|stored| stored.record.clone())
                .filter(|record| filter.matches(record))
                .collect();
            matching.sort_by(|a, b| b.pay_period.cmp(&a.pay_period).then(b.id.cmp(&a.id)));

            let total = matching.len() as i64;
            let data: Vec<PaymentRecord> = matching
                .into_iter()
                .skip(offset as usize)
                .take(per_page as usize)
                .collect();
            (data, total)
        };

        if let Some(delay) = self.list_delay {
            actix_web::rt::time::sleep(delay).await;
        }

        Ok(PaymentPage {
            data,
            page,
            per_page,
            total,
        })
    }

    async fn set_status(
        &self,
        id: u64,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        self.enter().await?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&id).map(|stored| {
            stored.record.status = status;
            stored.record.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payroll::calc::{AllowancePolicy, FixedDeductions, PayComponents, SalaryBasis};

    fn entry(lop_days: i32) -> PayrollEntry {
        PayrollEntry {
            employee_id: 7,
            employee_name: "Ravi Kumar".into(),
            pay_period: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            payment_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            components: PayComponents {
                salary_basis: SalaryBasis::Hourly {
                    hourly_rate: "500".into(),
                    hours_worked: "160".into(),
                },
                custom_earnings: vec![],
                custom_deductions: vec![],
                fixed_deductions: FixedDeductions::default(),
                paid_days: 30,
                lop_days,
            },
        }
    }

    fn computed(entry: &PayrollEntry) -> PayrollComputation {
        entry
            .components
            .finalize(&AllowancePolicy::default())
            .unwrap()
    }

    #[actix_web::test]
    async fn failed_insert_leaves_no_header() {
        let store = MemoryStore::default();
        store.detail_failures.store(1, Ordering::SeqCst);

        let first = entry(0);
        let err = store.insert_payroll(&first, &computed(&first)).await;
        assert!(matches!(err, Err(StoreError::Database(_))));
        assert_eq!(store.len(), 0);
        assert!(
            store
                .find_payroll(first.employee_id, first.pay_period)
                .await
                .unwrap()
                .is_none()
        );

        store.insert_payroll(&first, &computed(&first)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[actix_web::test]
    async fn failed_update_keeps_previous_rows() {
        let store = MemoryStore::default();
        let first = entry(0);
        let saved = store.insert_payroll(&first, &computed(&first)).await.unwrap();

        store.detail_failures.store(1, Ordering::SeqCst);
        let changed = entry(5);
        let err = store
            .update_payroll(saved.record.id, &changed, &computed(&changed))
            .await;
        assert!(err.is_err());

        let reloaded = store.get_payroll(saved.record.id).await.unwrap().unwrap();
        assert_eq!(reloaded, saved);
    }
}
