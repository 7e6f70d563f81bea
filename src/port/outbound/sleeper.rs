//! Injected delays.
//!
//! Retry and polling loops sleep through this port so tests can run them
//! without wall-clock waits.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
