//! Mock price oracle for integration testing.
//!
//! Returns whatever price the test last set, counts calls, and can be
//! forced into an outage. Optionally parks every call on a barrier so
//! tests can line up concurrent requests.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

use pricecall::oracle::{PriceOracle, Quote};
use pricecall::types::VoteError;

pub struct MockOracle {
    price: Mutex<Decimal>,
    /// If set, every call fails with this message.
    force_error: Mutex<Option<String>>,
    calls: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
}

impl MockOracle {
    pub fn new(price: Decimal) -> Arc<Self> {
        Arc::new(Self {
            price: Mutex::new(price),
            force_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            barrier: None,
        })
    }

    /// Every call waits until `parties` calls are in flight.
    pub fn gated(price: Decimal, parties: usize) -> Arc<Self> {
        Arc::new(Self {
            price: Mutex::new(price),
            force_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            barrier: Some(Arc::new(Barrier::new(parties))),
        })
    }

    pub fn set_price(&self, price: Decimal) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    async fn current_price(&self) -> Result<Quote, VoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(VoteError::DependencyFailure(msg));
        }
        let price = *self.price.lock().unwrap();
        Ok(Quote { price, source: "mock".into(), fetched_at: Utc::now() })
    }
}
