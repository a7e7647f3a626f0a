use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use actix_web::rt::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::PayrollError;
use crate::model::payroll::{
    PaymentFilter, PaymentPage, PaymentRecord, PaymentStatus, PayrollDetail, PayrollEntry,
    StoredPayroll,
};
use crate::payroll::calc::{
    AllowancePolicy, PayComponents, PayPeriodCalculation, PayrollComputation,
};
use crate::payroll::payslip::Payslip;
use crate::payroll::validation::validate_for_save;
use crate::store::{PayrollStore, StoreError};
use crate::utils::payment_cache::{PaymentCache, build_payment_cache};

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Request-scoped payroll operations over an injected store.
pub struct PayrollService {
    store: Arc<dyn PayrollStore>,
    policy: AllowancePolicy,
    cache: PaymentCache,
    /// Part of every cache key; bumped by each write so listings read before
    /// the write are never served after it.
    write_generation: AtomicU64,
    request_timeout: Duration,
    save_retries: u32,
}

impl PayrollService {
    pub fn new(store: Arc<dyn PayrollStore>, config: &Config) -> Self {
        Self {
            store,
            policy: config.allowance_policy,
            cache: build_payment_cache(
                config.list_cache_capacity,
                Duration::from_secs(config.list_cache_ttl_secs),
            ),
            write_generation: AtomicU64::new(0),
            request_timeout: config.request_timeout(),
            save_retries: config.save_retries,
        }
    }

    fn after_write(&self) {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_all();
    }

    pub fn policy(&self) -> &AllowancePolicy {
        &self.policy
    }

    /// Runs one store call under the request timeout, retrying transient
    /// failures up to `save_retries` times.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, PayrollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match timeout(self.request_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.save_retries => {
                    attempt += 1;
                    warn!(operation, attempt, error = %e, "Retrying payroll store call");
                    sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    tracing::error!(operation, attempt, error = %e, "Payroll store call failed");
                    return Err(e.into());
                }
            }
        }
    }

    pub fn preview(&self, components: &PayComponents) -> PayPeriodCalculation {
        components.calculate(&self.policy)
    }

    /// One insert attempt. A retry first checks whether an earlier attempt
    /// committed before its reply was lost, and returns that row if it holds
    /// the same entry.
    async fn insert_attempt(
        &self,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
        retry: bool,
    ) -> Result<StoredPayroll, StoreError> {
        if retry {
            let existing = self
                .store
                .find_payroll(entry.employee_id, entry.pay_period)
                .await?;
            if let Some(existing) = existing.filter(|stored| stored.holds(entry)) {
                warn!(payment_id = existing.record.id, "Earlier insert attempt had committed");
                return Ok(existing);
            }
        }
        self.store.insert_payroll(entry, computation).await
    }

    #[instrument(name = "payroll_create", skip(self, entry), fields(employee_id = entry.employee_id))]
    pub async fn create(&self, entry: PayrollEntry) -> Result<StoredPayroll, PayrollError> {
        let entry = validate_entry(entry)?;
        let computation = validate_for_save(&entry.components, &self.policy)?;

        let attempts = AtomicU32::new(0);
        let stored = self
            .with_retry("insert_payroll", || {
                let retry = attempts.fetch_add(1, Ordering::SeqCst) > 0;
                self.insert_attempt(&entry, &computation, retry)
            })
            .await?;

        self.after_write();
        info!(
            payment_id = stored.record.id,
            net_pay = computation.totals.net_pay,
            "Payroll entry saved"
        );
        Ok(stored)
    }

    #[instrument(name = "payroll_update", skip(self, entry), fields(employee_id = entry.employee_id))]
    pub async fn update(&self, id: u64, entry: PayrollEntry) -> Result<StoredPayroll, PayrollError> {
        let entry = validate_entry(entry)?;
        let computation = validate_for_save(&entry.components, &self.policy)?;

        let store = &self.store;
        let entry_ref = &entry;
        let computation_ref = &computation;
        let stored = self
            .with_retry("update_payroll", move || {
                store.update_payroll(id, entry_ref, computation_ref)
            })
            .await?;

        self.after_write();
        info!(payment_id = id, net_pay = computation.totals.net_pay, "Payroll entry updated");
        Ok(stored)
    }

    pub async fn stored(&self, id: u64) -> Result<StoredPayroll, PayrollError> {
        let store = &self.store;
        self.with_retry("get_payroll", move || store.get_payroll(id))
            .await?
            .ok_or(PayrollError::NotFound(id))
    }

    /// Rehydrates an entry for editing, with its figures recomputed.
    pub async fn get(&self, id: u64) -> Result<PayrollDetail, PayrollError> {
        let stored = self.stored(id).await?;
        let calculation = stored.components.calculate(&stored.policy);
        Ok(PayrollDetail {
            record: stored.record,
            components: stored.components,
            calculation,
        })
    }

    pub async fn list(&self, filter: PaymentFilter) -> Result<Arc<PaymentPage>, PayrollError> {
        let key = (
            self.write_generation.load(Ordering::SeqCst),
            filter.normalized(),
        );
        if let Some(page) = self.cache.get(&key).await {
            debug!(filter = ?key.1, "Payment listing served from cache");
            return Ok(page);
        }

        let store = &self.store;
        let filter_ref = &key.1;
        let page = Arc::new(
            self.with_retry("list_payments", move || store.list_payments(filter_ref))
                .await?,
        );
        self.cache.insert(key, page.clone()).await;
        Ok(page)
    }

    #[instrument(name = "payroll_set_status", skip(self))]
    pub async fn set_status(
        &self,
        id: u64,
        status: PaymentStatus,
    ) -> Result<PaymentRecord, PayrollError> {
        let store = &self.store;
        let record = self
            .with_retry("set_status", move || store.set_status(id, status))
            .await?
            .ok_or(PayrollError::NotFound(id))?;

        self.after_write();
        info!(payment_id = id, status = %status, "Payment status changed");
        Ok(record)
    }

    pub async fn payslip(&self, id: u64) -> Result<Payslip, PayrollError> {
        let stored = self.stored(id).await?;
        let computation = stored.components.finalize(&stored.policy).ok_or_else(|| {
            PayrollError::Validation(format!(
                "Payroll record {id} has an incomplete salary basis"
            ))
        })?;
        Ok(Payslip::new(&stored, &computation))
    }
}

fn validate_entry(entry: PayrollEntry) -> Result<PayrollEntry, PayrollError> {
    let entry = entry.normalized();
    if entry.employee_name.is_empty() {
        return Err(PayrollError::Validation(
            "Employee name is required".to_string(),
        ));
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payroll::calc::{FixedDeductions, LineItem, SalaryBasis};
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn config_with(overrides: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| {
            if let Some((_, value)) = overrides.iter().find(|(k, _)| *k == key) {
                return Some(value.to_string());
            }
            match key {
                "SERVER_ADDR" => Some("127.0.0.1:0".into()),
                "DATABASE_URL" => Some("mysql://unused".into()),
                "JWT_SECRET" => Some("secret".into()),
                "REQUEST_TIMEOUT_SECS" => Some("1".into()),
                "SAVE_RETRIES" => Some("2".into()),
                _ => None,
            }
        })
        .unwrap()
    }

    fn test_config() -> Config {
        config_with(&[])
    }

    /// Commits like the inner store, then loses the reply of the first insert.
    struct LostReplyStore {
        inner: MemoryStore,
        lost_replies: AtomicU32,
    }

    #[async_trait::async_trait]
    impl PayrollStore for LostReplyStore {
        async fn insert_payroll(
            &self,
            entry: &PayrollEntry,
            computation: &PayrollComputation,
        ) -> Result<StoredPayroll, StoreError> {
            let stored = self.inner.insert_payroll(entry, computation).await?;
            if self
                .lost_replies
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("connection reset after commit".into()));
            }
            Ok(stored)
        }

        async fn update_payroll(
            &self,
            id: u64,
            entry: &PayrollEntry,
            computation: &PayrollComputation,
        ) -> Result<StoredPayroll, StoreError> {
            self.inner.update_payroll(id, entry, computation).await
        }

        async fn get_payroll(&self, id: u64) -> Result<Option<StoredPayroll>, StoreError> {
            self.inner.get_payroll(id).await
        }

        async fn find_payroll(
            &self,
            employee_id: u64,
            pay_period: NaiveDate,
        ) -> Result<Option<StoredPayroll>, StoreError> {
            self.inner.find_payroll(employee_id, pay_period).await
        }

        async fn list_payments(&self, filter: &PaymentFilter) -> Result<PaymentPage, StoreError> {
            self.inner.list_payments(filter).await
        }

        async fn set_status(
            &self,
            id: u64,
            status: PaymentStatus,
        ) -> Result<Option<PaymentRecord>, StoreError> {
            self.inner.set_status(id, status).await
        }
    }

    fn service(store: Arc<MemoryStore>) -> PayrollService {
        PayrollService::new(store, &test_config())
    }

    fn entry(employee_id: u64, month: u32) -> PayrollEntry {
        PayrollEntry {
            employee_id,
            employee_name: " Asha Rao ".into(),
            pay_period: NaiveDate::from_ymd_opt(2026, month, 15).unwrap(),
            payment_date: NaiveDate::from_ymd_opt(2026, month, 28).unwrap(),
            components: PayComponents {
                salary_basis: SalaryBasis::Ctc {
                    annual_ctc: "1200000".into(),
                    basic_percent: "40".into(),
                },
                custom_earnings: vec![LineItem::new("Bonus", 2_000.0)],
                custom_deductions: vec![],
                fixed_deductions: FixedDeductions {
                    epf: 1_800.0,
                    ..FixedDeductions::default()
                },
                paid_days: 30,
                lop_days: 0,
            },
        }
    }

    #[actix_web::test]
    async fn create_persists_normalized_entry() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());

        let stored = svc.create(entry(1, 1)).await.unwrap();
        assert_eq!(stored.record.employee_name, "Asha Rao");
        assert_eq!(stored.record.pay_period, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(stored.record.payment_amount, 80_200.0);
        assert_eq!(stored.record.status, PaymentStatus::Pending);
        assert_eq!(store.len(), 1);
    }

    #[actix_web::test]
    async fn invalid_entry_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());

        let mut bad = entry(1, 1);
        bad.components.lop_days = 31;
        let err = svc.create(bad).await.unwrap_err();
        assert!(matches!(err, PayrollError::Validation(ref m) if m.contains("LOP days")));
        assert_eq!(store.write_calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(MemoryStore::failing(2));
        let svc = service(store.clone());

        svc.create(entry(1, 1)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[actix_web::test]
    async fn gives_up_after_configured_retries() {
        let store = Arc::new(MemoryStore::failing(3));
        let svc = service(store.clone());

        let err = svc.create(entry(1, 1)).await.unwrap_err();
        assert!(matches!(err, PayrollError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.len(), 0);
    }

    #[actix_web::test]
    async fn slow_store_times_out() {
        let store = Arc::new(MemoryStore::slow(Duration::from_secs(5)));
        let svc = PayrollService {
            request_timeout: Duration::from_millis(50),
            save_retries: 0,
            ..service(store)
        };

        let err = svc.get(1).await.unwrap_err();
        assert!(matches!(err, PayrollError::Timeout));
    }

    #[actix_web::test]
    async fn duplicate_period_is_a_conflict() {
        let svc = service(Arc::new(MemoryStore::default()));
        svc.create(entry(1, 1)).await.unwrap();
        let err = svc.create(entry(1, 1)).await.unwrap_err();
        assert!(matches!(err, PayrollError::Duplicate));
    }

    #[actix_web::test]
    async fn listing_is_cached_until_a_write() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());
        svc.create(entry(1, 1)).await.unwrap();

        let first = svc.list(PaymentFilter::default()).await.unwrap();
        let second = svc.list(PaymentFilter::default()).await.unwrap();
        assert_eq!(first.total, 1);
        assert_eq!(second.total, 1);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);

        svc.create(entry(2, 1)).await.unwrap();
        let third = svc.list(PaymentFilter::default()).await.unwrap();
        assert_eq!(third.total, 2);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn edit_rehydrates_and_recomputes() {
        let svc = service(Arc::new(MemoryStore::default()));
        let stored = svc.create(entry(1, 1)).await.unwrap();

        let mut changed = entry(1, 1);
        changed.components.lop_days = 5;
        svc.update(stored.record.id, changed).await.unwrap();

        let detail = svc.get(stored.record.id).await.unwrap();
        assert_eq!(detail.components.lop_days, 5);
        let lop = detail.calculation.lop_deduction.unwrap();
        assert!((lop - 11_428.571).abs() < 0.01);
        assert!((detail.record.payment_amount - detail.calculation.net_pay.unwrap()).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn update_of_missing_record_is_not_found() {
        let svc = service(Arc::new(MemoryStore::default()));
        let err = svc.update(42, entry(1, 1)).await.unwrap_err();
        assert!(matches!(err, PayrollError::NotFound(42)));
    }

    #[actix_web::test]
    async fn status_change_invalidates_listing() {
        let svc = service(Arc::new(MemoryStore::default()));
        let stored = svc.create(entry(1, 1)).await.unwrap();

        let pending = PaymentFilter {
            status: Some(PaymentStatus::Pending),
            ..PaymentFilter::default()
        };
        assert_eq!(svc.list(pending.clone()).await.unwrap().total, 1);

        let record = svc.set_status(stored.record.id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Paid);
        assert_eq!(svc.list(pending).await.unwrap().total, 0);
    }

    #[actix_web::test]
    async fn committed_insert_with_lost_reply_is_not_a_conflict() {
        let store = Arc::new(LostReplyStore {
            inner: MemoryStore::default(),
            lost_replies: AtomicU32::new(1),
        });
        let svc = PayrollService::new(store.clone(), &test_config());

        let stored = svc.create(entry(1, 1)).await.unwrap();
        assert_eq!(store.inner.len(), 1);
        assert_eq!(stored.record.employee_name, "Asha Rao");
        assert_eq!(stored.record.payment_amount, 80_200.0);
    }

    #[actix_web::test]
    async fn retry_still_reports_a_different_entry_as_conflict() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone());
        svc.create(entry(1, 1)).await.unwrap();

        let mut other = entry(1, 1);
        other.components.lop_days = 2;
        store.transient_failures.store(1, Ordering::SeqCst);
        let err = svc.create(other).await.unwrap_err();
        assert!(matches!(err, PayrollError::Duplicate));
        assert_eq!(store.len(), 1);
    }

    #[actix_web::test]
    async fn listing_read_during_a_write_is_not_served_afterwards() {
        let store = Arc::new(MemoryStore::slow_listing(Duration::from_millis(200)));
        let svc = service(store.clone());

        let (before, created) = futures::join!(svc.list(PaymentFilter::default()), async {
            sleep(Duration::from_millis(50)).await;
            svc.create(entry(1, 1)).await
        });
        assert_eq!(before.unwrap().total, 0);
        created.unwrap();

        let after = svc.list(PaymentFilter::default()).await.unwrap();
        assert_eq!(after.total, 1);
    }

    #[actix_web::test]
    async fn saved_entry_keeps_the_policy_it_was_saved_under() {
        let store = Arc::new(MemoryStore::default());
        let stored = service(store.clone()).create(entry(1, 1)).await.unwrap();
        assert_eq!(stored.policy, AllowancePolicy::default());

        let changed = PayrollService::new(store, &config_with(&[("HRA_PERCENT", "40")]));
        assert_eq!(changed.policy().hra_percent, 40.0);

        let slip = changed.payslip(stored.record.id).await.unwrap();
        let hra = slip
            .earnings
            .iter()
            .find(|line| line.label == "House Rent Allowance")
            .unwrap();
        assert_eq!(hra.amount, 20_000.0);
        assert_eq!(slip.net_pay, stored.record.payment_amount);

        let detail = changed.get(stored.record.id).await.unwrap();
        assert_eq!(detail.calculation.standard.unwrap().hra, 20_000.0);
        assert_eq!(changed.preview(&entry(1, 1).components).standard.unwrap().hra, 16_000.0);
    }
}
