//! Producers of orders.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Order, Result};

/// Detects new commits on tracked branches and emits orders for them.
///
/// A watcher runs until it fails or until `orders` is closed. Returning
/// stops this producer only; other watchers keep running.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Name of the watched repository, for logs.
    fn name(&self) -> &str;

    async fn run(&self, orders: mpsc::Sender<Order>) -> Result<()>;
}
