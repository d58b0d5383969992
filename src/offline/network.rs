//! Connectivity collaborator observed by the offline queue.

use async_trait::async_trait;
use tokio::sync::watch;

/// Narrow view of a connectivity source.
#[async_trait]
pub trait NetworkStatus: Send + Sync {
    /// Current connectivity.
    async fn fetch(&self) -> bool;

    /// Stream of connectivity changes; the queue reacts to transitions to
    /// `true`.
    fn changes(&self) -> watch::Receiver<bool>;
}

/// Connectivity flipped by hand. Useful in tests and for apps that learn
/// about connectivity from their own transport.
#[derive(Debug)]
pub struct ManualNetwork {
    tx: watch::Sender<bool>,
}

impl ManualNetwork {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Publish a connectivity change. Setting the current value again is not
    /// a transition and wakes nobody.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

#[async_trait]
impl NetworkStatus for ManualNetwork {
    async fn fetch(&self) -> bool {
        self.is_online()
    }

    fn changes(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
