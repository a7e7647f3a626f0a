use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::model::payroll::{PaymentFilter, PaymentPage};

/// Payment listings keyed by the write generation they were read in and the
/// (normalized) filter that produced them. Entries also expire after the TTL
/// so a write from another instance is picked up eventually.
pub type PaymentCache = Cache<(u64, PaymentFilter), Arc<PaymentPage>>;

pub fn build_payment_cache(capacity: u64, ttl: Duration) -> PaymentCache {
    Cache::builder()
        .max_capacity(capacity) // tune based on memory
        .time_to_live(ttl)
        .build()
}
