//! Observer registry shared by the cache and the offline queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Observer callback: receives the current snapshot and an optional message.
pub type Callback<S> = Arc<dyn Fn(&S, Option<&str>) + Send + Sync>;

type Registry<S> = Arc<Mutex<Vec<(u64, Callback<S>)>>>;

/// Handle returned by `subscribe`. Dropping it keeps the observer registered;
/// call [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call unsubscribe()"]
pub struct Subscription {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Ordered set of observers. The same `Arc` registered twice is stored once.
pub struct Subscribers<S> {
    registry: Registry<S>,
    next_id: AtomicU64,
}

impl<S: 'static> Subscribers<S> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, callback: Callback<S>) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            match registry.iter().find(|(_, existing)| Arc::ptr_eq(existing, &callback)) {
                Some((id, _)) => *id,
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    registry.push((id, callback));
                    id
                }
            }
        };

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            remove: Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.lock().retain(|(existing, _)| *existing != id);
                }
            }),
        }
    }

    /// Call every observer in registration order. Observers run outside the
    /// lock and may subscribe or unsubscribe.
    pub fn notify(&self, state: &S, message: Option<&str>) {
        let callbacks: Vec<Callback<S>> = self.registry.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(state, message);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}

impl<S: 'static> Default for Subscribers<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_in_registration_order() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            let _sub = subscribers.subscribe(Arc::new(move |state: &u32, msg: Option<&str>| {
                seen.lock().push(format!("{}:{}:{}", tag, state, msg.unwrap_or("-")));
            }));
        }

        subscribers.notify(&7, Some("hi"));
        assert_eq!(*seen.lock(), vec!["first:7:hi", "second:7:hi"]);
    }

    #[test]
    fn test_same_callback_registered_once() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let callback: Callback<u32> = Arc::new(|_: &u32, _: Option<&str>| {});

        let a = subscribers.subscribe(callback.clone());
        let _b = subscribers.subscribe(callback);
        assert_eq!(subscribers.len(), 1);

        a.unsubscribe();
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let sub = subscribers.subscribe(Arc::new(|_: &u32, _: Option<&str>| {}));
        drop(subscribers);
        sub.unsubscribe();
    }
}
