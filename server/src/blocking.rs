/*
 * Created on Thu Jul 27 2023
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The blocking coordinator
//!
//! Backs `XREAD BLOCK` (notify-only: a reader just re-checks the stream
//! once woken, since reading it is non-destructive and any number of
//! readers can see the same entries) and `BLPOP`/`BRPOP` (destructive:
//! only one waiter may ever receive a given popped element). These are
//! different enough protocols to need different registrations.
//!
//! `XREAD` uses [`register`]/[`register_many`]: a waiter registers a bare
//! [`tokio::sync::Notify`] on the key it's blocked on *before* re-checking
//! the keyspace, appended to the back of that key's FIFO queue. A write
//! wakes exactly the front of the queue, and the waiter re-reads the
//! stream itself once woken — safe because nothing is consumed.
//!
//! `BLPOP`/`BRPOP` use [`register_pop_waiter`]: per spec.md's protocol,
//! the *pusher* pops the element on the waiter's behalf, under the same
//! keyspace-mutex critical section as the push, and hands it directly to
//! the waiter's result slot before waking it (see [`serve_pops`]). A
//! plain notify-then-recheck would let a brand-new, never-registered
//! `BLPOP` win the keyspace lock first and steal the element that was
//! specifically popped for an earlier, already-queued waiter; handing the
//! value off directly is what keeps delivery FIFO and exactly-once.
//!
//! Lock order is always keyspace before this coordinator (`K` -> `B` in
//! the design notes): a writer mutates the keyspace, and hands off to any
//! waiters, all within one locked section, only notifying (waking the
//! task) after. This avoids a deadlock with a waiter that is about to
//! take the keyspace lock again after being woken.

use bytes::Bytes;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Notify;

#[derive(Default)]
pub struct BlockingCoordinator {
    waiters: Mutex<HashMap<Vec<u8>, Vec<Arc<Notify>>>>,
    pop_waiters: Mutex<HashMap<Vec<u8>, Vec<PopWaiter>>>,
}

/// A single `BLPOP`/`BRPOP` caller's registration, shared (via `Arc`)
/// across every key it's waiting on. `front` is which end of the list
/// this specific caller wants to pop from (`BLPOP` vs `BRPOP`); the
/// pusher reads it back to know which element to hand over.
struct PopWaiterState {
    /// `true` once either a pusher has popped a value for this waiter, or
    /// the waiter itself has given up (so the other side knows not to
    /// act on it). Set together with `value` under the same lock
    /// acquisition so there's never a window where a reader could
    /// observe "claimed" without the value (if any) already being there.
    claimed: bool,
    value: Option<(Bytes, Bytes)>,
}

pub struct PopWaiterInner {
    front: bool,
    state: Mutex<PopWaiterState>,
    notify: Notify,
}

pub type PopWaiter = Arc<PopWaiterInner>;

impl PopWaiterInner {
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Takes the value a pusher deposited for this waiter, if any, without
    /// touching `claimed` (a wake is only ever genuine once a value has
    /// been placed here, so callers just loop back and wait again on
    /// `None`).
    pub fn take_value(&self) -> Option<(Bytes, Bytes)> {
        self.state.lock().value.take()
    }
}

impl BlockingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new waiter at the back of `key`'s queue
    pub fn register(&self, key: &[u8]) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.waiters
            .lock()
            .entry(key.to_vec())
            .or_default()
            .push(notify.clone());
        notify
    }

    /// Registers a single waiter across several keys at once (`BLPOP`
    /// blocks on the first of a list of keys to receive data). The same
    /// `Notify` is appended to every key's queue; whichever key is
    /// written to first wakes it, and the caller must then
    /// [`cancel_many`] the rest of the registrations.
    pub fn register_many(&self, keys: &[Bytes]) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut guard = self.waiters.lock();
        for key in keys {
            guard.entry(key.to_vec()).or_default().push(notify.clone());
        }
        notify
    }

    pub fn cancel_many(&self, keys: &[Bytes], notify: &Arc<Notify>) {
        for key in keys {
            self.cancel(key, notify);
        }
    }

    /// Removes a waiter that gave up (timed out or its connection closed)
    /// without having been served
    pub fn cancel(&self, key: &[u8], notify: &Arc<Notify>) {
        let mut guard = self.waiters.lock();
        if let Some(q) = guard.get_mut(key) {
            q.retain(|n| !Arc::ptr_eq(n, notify));
            if q.is_empty() {
                guard.remove(key);
            }
        }
    }

    /// Wakes the single oldest waiter on `key`, if any
    pub fn notify_one(&self, key: &[u8]) {
        let mut guard = self.waiters.lock();
        if let Some(q) = guard.get_mut(key) {
            if !q.is_empty() {
                let notify = q.remove(0);
                if q.is_empty() {
                    guard.remove(key);
                }
                drop(guard);
                notify.notify_one();
                return;
            }
        }
    }

    /// Wakes up to `count` of the oldest waiters on `key` (used when a
    /// single command, e.g. a pipelined `RPUSH`, makes several items
    /// available at once)
    pub fn notify_many(&self, key: &[u8], count: usize) {
        for _ in 0..count {
            self.notify_one(key);
        }
    }

    /// Registers a `BLPOP`/`BRPOP` caller across all of `keys` at once,
    /// at the back of each key's FIFO queue, wanting to pop from the
    /// front (`front = true`) or back of whichever key is served first.
    pub fn register_pop_waiter(&self, keys: &[Bytes], front: bool) -> PopWaiter {
        let waiter = Arc::new(PopWaiterInner {
            front,
            state: Mutex::new(PopWaiterState {
                claimed: false,
                value: None,
            }),
            notify: Notify::new(),
        });
        let mut guard = self.pop_waiters.lock();
        for key in keys {
            guard.entry(key.to_vec()).or_default().push(waiter.clone());
        }
        waiter
    }

    /// Removes `waiter` from every key in `keys`. If a pusher had already
    /// popped a value on its behalf in the same instant this raced
    /// against a timeout or shutdown, that value is returned here instead
    /// of being silently dropped — it was already taken out of the list,
    /// so it has to be delivered to someone.
    pub fn cancel_pop_waiter(&self, keys: &[Bytes], waiter: &PopWaiter) -> Option<(Bytes, Bytes)> {
        {
            let mut state = waiter.state.lock();
            if state.claimed {
                return state.value.take();
            }
            state.claimed = true;
        }
        let mut guard = self.pop_waiters.lock();
        for key in keys {
            if let Some(q) = guard.get_mut(key.as_ref()) {
                q.retain(|w| !Arc::ptr_eq(w, waiter));
                if q.is_empty() {
                    guard.remove(key.as_ref());
                }
            }
        }
        None
    }

    /// Called by the pusher, inside the same keyspace-mutex critical
    /// section as the push that made new elements available on `key`.
    /// While there's still a queued waiter on `key` and `pop` still
    /// yields a value for it, hands that value directly to the oldest
    /// waiter's result slot and wakes it — never leaving a bare notify
    /// for the waiter to turn into its own, separately-racing pop.
    ///
    /// `pop(front)` must pop from the list's front or back end per the
    /// flag and return `None` once the list is exhausted.
    pub fn serve_pops(&self, key: &[u8], mut pop: impl FnMut(bool) -> Option<Bytes>) {
        loop {
            let waiter = {
                let mut guard = self.pop_waiters.lock();
                let Some(q) = guard.get_mut(key) else {
                    break;
                };
                if q.is_empty() {
                    guard.remove(key);
                    break;
                }
                let w = q.remove(0);
                if q.is_empty() {
                    guard.remove(key);
                }
                w
            };
            let mut state = waiter.state.lock();
            if state.claimed {
                // already cancelled (timed out / connection shutting
                // down) concurrently; nothing was popped for it, move on
                drop(state);
                continue;
            }
            match pop(waiter.front) {
                Some(value) => {
                    state.claimed = true;
                    state.value = Some((Bytes::copy_from_slice(key), value));
                    drop(state);
                    waiter.notify.notify_one();
                }
                None => {
                    // list ran out before this waiter could be served;
                    // put it back at the front of the queue, unclaimed,
                    // for the next push to try again
                    drop(state);
                    self.pop_waiters
                        .lock()
                        .entry(key.to_vec())
                        .or_default()
                        .insert(0, waiter);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wakes_waiters_in_fifo_order() {
        let coord = BlockingCoordinator::new();
        let n1 = coord.register(b"k");
        let n2 = coord.register(b"k");
        coord.notify_one(b"k");
        // n1 should be woken, n2 should not yet be
        n1.notified().await;
        assert!(tokio::time::timeout(std::time::Duration::from_millis(10), n2.notified())
            .await
            .is_err());
        coord.notify_one(b"k");
        n2.notified().await;
    }

    #[test]
    fn cancel_removes_only_the_matching_waiter() {
        let coord = BlockingCoordinator::new();
        let n1 = coord.register(b"k");
        let n2 = coord.register(b"k");
        coord.cancel(b"k", &n1);
        assert_eq!(coord.waiters.lock().get(b"k".as_slice()).unwrap().len(), 1);
        coord.cancel(b"k", &n2);
        assert!(coord.waiters.lock().get(b"k".as_slice()).is_none());
    }

    #[tokio::test]
    async fn serve_pops_hands_the_value_straight_to_the_oldest_waiter() {
        let coord = BlockingCoordinator::new();
        let key = Bytes::from("k");
        let w1 = coord.register_pop_waiter(&[key.clone()], true);
        let w2 = coord.register_pop_waiter(&[key.clone()], true);
        // a single pushed element should go to w1, not w2, and not be
        // handed out twice
        let mut elements = vec![Bytes::from("a")];
        coord.serve_pops(&key, |_front| elements.pop());
        w1.notified().await;
        assert_eq!(
            w1.state.lock().value.take(),
            Some((key.clone(), Bytes::from("a")))
        );
        assert!(tokio::time::timeout(std::time::Duration::from_millis(10), w2.notified())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn cancel_still_returns_a_value_claimed_by_a_racing_pusher() {
        let coord = BlockingCoordinator::new();
        let key = Bytes::from("k");
        let w = coord.register_pop_waiter(&[key.clone()], true);
        let mut elements = vec![Bytes::from("a")];
        coord.serve_pops(&key, |_front| elements.pop());
        // the waiter "times out" after the value was already handed to it
        let served = coord.cancel_pop_waiter(&[key.clone()], &w);
        assert_eq!(served, Some((key, Bytes::from("a"))));
    }

    #[test]
    fn cancel_before_any_push_returns_nothing_and_deregisters() {
        let coord = BlockingCoordinator::new();
        let key = Bytes::from("k");
        let w = coord.register_pop_waiter(&[key.clone()], true);
        assert_eq!(coord.cancel_pop_waiter(&[key.clone()], &w), None);
        assert!(coord.pop_waiters.lock().get(key.as_ref()).is_none());
    }
}
