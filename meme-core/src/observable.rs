//! Observable state cells with synchronous subscribers.
//!
//! An [`Observable`] holds an immutable snapshot of some value. Every write
//! replaces the snapshot and pushes the new value to all subscribers, in the
//! order the writes happened.
//!
//! ## Delivery
//!
//! ```text
//! a.set(v1) ──► dispatcher: [a:v1] ──► drain ──► cb_a1(v1), cb_a2(v1)
//!                                          │
//!          cb_a1 calls b.set(w1) ──────────┘ queued, delivered after v1 completes
//! ```
//!
//! Deliveries go through a [`Dispatcher`]. Cells that share one dispatcher
//! share one queue, so a write made from inside a callback, to the same cell
//! or to any sibling cell, is delivered only after the current round ends.
//! No subscriber ever sees a later write before an earlier one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Callback invoked with each published snapshot.
type Callback<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

/// A queued delivery round.
type Job = Box<dyn FnOnce() + Send>;

/// Who a delivery round is addressed to.
#[derive(Clone, Copy)]
enum Target {
    /// Every subscriber registered before this version.
    Broadcast(u64),
    /// A subscriber that just registered and needs the current value.
    Initial(u64),
}

struct Subscriber<T> {
    id: u64,
    /// Version current at registration; only later versions are broadcast to it.
    since: u64,
    callback: Callback<T>,
}

impl<T> Subscriber<T> {
    fn wants(&self, target: Target) -> bool {
        match target {
            Target::Broadcast(version) => self.since < version,
            Target::Initial(id) => self.id == id,
        }
    }
}

struct State<T> {
    value: Arc<T>,
    version: u64,
    subscribers: Vec<Subscriber<T>>,
    next_subscriber: u64,
}

#[derive(Default)]
struct DispatchState {
    queue: VecDeque<Job>,
    draining: bool,
}

/// FIFO delivery queue shared by a group of cells.
///
/// Cloning yields another handle to the same queue. Only one caller drains
/// at a time; anyone who enqueues while a drain is running leaves their
/// round to the running drain.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<Mutex<DispatchState>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Dispatcher")
            .field("pending", &state.queue.len())
            .field("draining", &state.draining)
            .finish()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `job`. Returns whether the caller must drain.
    fn enqueue(&self, job: Job) -> bool {
        let mut state = self.lock();
        state.queue.push_back(job);
        if state.draining {
            false
        } else {
            state.draining = true;
            true
        }
    }

    /// Run queued rounds until the queue is empty.
    fn drain(&self) {
        let _guard = DrainGuard { dispatcher: self };
        loop {
            let job = {
                let mut state = self.lock();
                let Some(job) = state.queue.pop_front() else {
                    state.draining = false;
                    return;
                };
                job
            };
            job();
        }
    }
}

/// Releases the drain flag if a subscriber panics mid-delivery.
struct DrainGuard<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.dispatcher.lock();
            state.queue.clear();
            state.draining = false;
        }
    }
}

/// A writable value that notifies subscribers on every change.
///
/// Cloning an `Observable` yields another handle to the same cell.
pub struct Observable<T> {
    state: Arc<Mutex<State<T>>>,
    dispatcher: Dispatcher,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Observable")
            .field("value", &state.value)
            .field("version", &state.version)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Observable<T> {
    /// Create a cell holding `value`, with a dispatcher of its own.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_dispatcher(value, Dispatcher::new())
    }

    /// Create a cell holding `value` that delivers through `dispatcher`.
    ///
    /// Writes to any cell on the same dispatcher are delivered in one global
    /// order.
    #[must_use]
    pub fn with_dispatcher(value: T, dispatcher: Dispatcher) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value: Arc::new(value),
                version: 0,
                subscribers: Vec::new(),
                next_subscriber: 0,
            })),
            dispatcher,
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&lock(&self.state).value)
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.update(|_| Some(value));
    }

    /// Derive a new value from the current one.
    ///
    /// Returning `None` from `f` leaves the cell untouched and notifies no one.
    /// `f` runs under the cell's lock and must not touch this cell.
    ///
    /// Returns whether a new value was published.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        let start_drain = {
            let mut state = lock(&self.state);
            let Some(next) = f(&state.value) else {
                return false;
            };
            let value = Arc::new(next);
            state.version += 1;
            state.value = Arc::clone(&value);
            // Enqueued under the cell lock so rounds keep write order.
            self.dispatcher
                .enqueue(self.round(Target::Broadcast(state.version), value))
        };
        if start_drain {
            self.dispatcher.drain();
        }
        true
    }

    /// Register `callback`.
    ///
    /// The callback receives the current value right away and then every
    /// later value, synchronously, in write order. Dropping the returned
    /// [`Subscription`] unregisters it.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let (id, start_drain) = {
            let mut state = lock(&self.state);
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            let since = state.version;
            state.subscribers.push(Subscriber {
                id,
                since,
                callback: Arc::new(callback),
            });
            let value = Arc::clone(&state.value);
            let start = self.dispatcher.enqueue(self.round(Target::Initial(id), value));
            (id, start)
        };
        if start_drain {
            self.dispatcher.drain();
        }

        let weak: Weak<Mutex<State<T>>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let removed = {
                    let mut state = lock(&state);
                    state
                        .subscribers
                        .iter()
                        .position(|s| s.id == id)
                        .map(|index| state.subscribers.remove(index))
                };
                // The callback may own subscriptions to this cell; drop it unlocked.
                drop(removed);
            }
        })
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Build the delivery round for `value`.
    ///
    /// Recipients are fixed when the round starts; each one is looked up
    /// again right before its call, so a subscriber removed mid-round is
    /// skipped.
    fn round(&self, target: Target, value: Arc<T>) -> Job {
        let state = Arc::clone(&self.state);
        Box::new(move || {
            let recipients: Vec<u64> = lock(&state)
                .subscribers
                .iter()
                .filter(|s| s.wants(target))
                .map(|s| s.id)
                .collect();
            for id in recipients {
                let callback = lock(&state)
                    .subscribers
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| Arc::clone(&s.callback));
                if let Some(callback) = callback {
                    callback(&value);
                }
            }
        })
    }
}

impl<T: Default + Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

fn lock<T>(state: &Mutex<State<T>>) -> MutexGuard<'_, State<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a registered subscriber.
///
/// Unsubscribes when dropped.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Stop receiving values.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Keep the subscriber registered for the lifetime of the cell.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&Arc<T>) + Send + Sync)
    where
        T: Sync,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &Arc<T>| {
            sink.lock().expect("recorder lock").push((**value).clone());
        })
    }

    #[test]
    fn test_subscribe_receives_current_then_updates() {
        let cell = Observable::new(1);
        let (seen, callback) = recorder::<i32>();
        let _sub = cell.subscribe(callback);

        cell.set(2);
        cell.set(3);

        assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_values_are_not_coalesced() {
        let cell = Observable::new(false);
        let (seen, callback) = recorder::<bool>();
        let _sub = cell.subscribe(callback);

        cell.set(true);
        cell.set(true);

        assert_eq!(*seen.lock().expect("lock"), vec![false, true, true]);
    }

    #[test]
    fn test_update_returning_none_does_not_notify() {
        let cell = Observable::new(5);
        let (seen, callback) = recorder::<i32>();
        let _sub = cell.subscribe(callback);

        assert!(!cell.update(|_| None));
        assert!(cell.update(|v| Some(v + 1)));

        assert_eq!(*seen.lock().expect("lock"), vec![5, 6]);
        assert_eq!(*cell.get(), 6);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let cell = Observable::new(0);
        let (seen, callback) = recorder::<i32>();
        let sub = cell.subscribe(callback);
        assert_eq!(cell.subscriber_count(), 1);

        drop(sub);
        cell.set(1);

        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(*seen.lock().expect("lock"), vec![0]);
    }

    #[test]
    fn test_detach_keeps_subscriber() {
        let cell = Observable::new(0);
        let (seen, callback) = recorder::<i32>();
        cell.subscribe(callback).detach();

        cell.set(1);

        assert_eq!(*seen.lock().expect("lock"), vec![0, 1]);
    }

    #[test]
    fn test_reentrant_set_is_delivered_in_order() {
        let cell = Observable::new(0);
        let writer = cell.clone();
        let _bump = cell.subscribe(move |v| {
            if **v == 1 {
                writer.set(2);
            }
        });
        let (seen, callback) = recorder::<i32>();
        let _sub = cell.subscribe(callback);

        cell.set(1);

        // The second subscriber must see 1 before 2 even though 2 was
        // written while 1 was still being delivered.
        assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2]);
        assert_eq!(*cell.get(), 2);
    }

    #[test]
    fn test_subscribe_from_callback_sees_only_current_and_later() {
        let cell = Observable::new(0);
        let late = Arc::new(Mutex::new(Vec::new()));
        let late_sink = Arc::clone(&late);
        let inner_cell = cell.clone();
        let held = Arc::new(Mutex::new(Vec::new()));
        let held_subs = Arc::clone(&held);

        let _outer = cell.subscribe(move |v| {
            if **v == 1 {
                let sink = Arc::clone(&late_sink);
                let sub = inner_cell.subscribe(move |v| sink.lock().expect("lock").push(**v));
                held_subs.lock().expect("lock").push(sub);
            }
        });

        cell.set(1);
        cell.set(2);

        assert_eq!(*late.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn test_sibling_write_from_callback_waits_for_round() {
        let dispatcher = Dispatcher::new();
        let first = Observable::with_dispatcher(0, dispatcher.clone());
        let second = Observable::with_dispatcher(0, dispatcher);
        let log = Arc::new(Mutex::new(Vec::new()));

        let writer = second.clone();
        let _chain = first.subscribe(move |v| {
            if **v == 1 {
                writer.set(10);
            }
        });
        let sink = Arc::clone(&log);
        let _watch_first = first.subscribe(move |v| sink.lock().expect("lock").push(("first", **v)));
        let sink = Arc::clone(&log);
        let _watch_second =
            second.subscribe(move |v| sink.lock().expect("lock").push(("second", **v)));

        first.set(1);

        assert_eq!(
            *log.lock().expect("lock"),
            vec![("first", 0), ("second", 0), ("first", 1), ("second", 10)]
        );
    }

    #[test]
    fn test_subscriber_removed_mid_round_is_skipped() {
        let cell = Observable::new(0);
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&victim);
        let _remover = cell.subscribe(move |v| {
            if **v == 1 {
                drop(slot.lock().expect("lock").take());
            }
        });
        let (seen, callback) = recorder::<i32>();
        *victim.lock().expect("lock") = Some(cell.subscribe(callback));

        cell.set(1);

        assert_eq!(*seen.lock().expect("lock"), vec![0]);
        assert_eq!(cell.subscriber_count(), 1);
    }
}
