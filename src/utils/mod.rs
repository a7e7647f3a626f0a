pub mod payment_cache;
