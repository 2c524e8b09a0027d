//! Loom models of the long-polling engine's concurrency protocol.
//!
//! The engine relies on two small lock-free patterns:
//!
//! 1. **Single resolution** - data, deadline, failure and cancellation race to
//!    move a parked fetch out of `Pending` with one compare-and-swap; exactly
//!    one of them may run the callback.
//!
//! 2. **Recheck coalescing** - a notification sets a `recheck` flag and tries
//!    to become the puller; a puller loops while the flag is set and checks it
//!    again after releasing the pull guard, so no notification is lost.
//!
//! The transaction coordinator adds a third: the producer-epoch fence is
//! checked and raised under one map entry lock, so the epochs it accepts form
//! a non-decreasing sequence even across transaction ids.
//!
//! Loom tests require the `loom` feature:
//!
//! ```sh
//! cargo test --test loom_tests --features loom --release
//! ```

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use loom::sync::{Arc, Mutex};
use loom::thread;

const PENDING: u8 = 0;

fn transition(state: &AtomicU8, to: u8) -> bool {
    state
        .compare_exchange(PENDING, to, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Success, expiry and cancellation race; exactly one wins and the callback
/// slot is emptied exactly once.
#[test]
fn test_single_resolution() {
    loom::model(|| {
        let state = Arc::new(AtomicU8::new(PENDING));
        let callback = Arc::new(Mutex::new(Some(())));
        let fired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = [1u8, 2, 4]
            .into_iter()
            .map(|outcome| {
                let state = state.clone();
                let callback = callback.clone();
                let fired = fired.clone();
                thread::spawn(move || {
                    if transition(&state, outcome) {
                        let taken = callback.lock().unwrap().take();
                        assert!(taken.is_some());
                        // cancellation drops the callback without running it
                        if outcome != 4 {
                            fired.fetch_add(1, Ordering::SeqCst);
                        }
                        true
                    } else {
                        false
                    }
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(fired.load(Ordering::SeqCst) <= 1);
        assert_ne!(state.load(Ordering::SeqCst), PENDING);
        assert!(callback.lock().unwrap().is_none());
    });
}

/// Two notifiers race with each other. Every notification is observed by
/// some pull attempt, and no two attempts run at once.
#[test]
fn test_recheck_coalescing_loses_no_notification() {
    loom::model(|| {
        let recheck = Arc::new(AtomicBool::new(false));
        let pulling = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let pulls = Arc::new(AtomicUsize::new(0));

        let notify = {
            let recheck = recheck.clone();
            let pulling = pulling.clone();
            let in_flight = in_flight.clone();
            let pulls = pulls.clone();
            move || {
                recheck.store(true, Ordering::SeqCst);
                loop {
                    if pulling
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        return;
                    }
                    while recheck.swap(false, Ordering::SeqCst) {
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        pulls.fetch_add(1, Ordering::SeqCst);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                    pulling.store(false, Ordering::SeqCst);
                    if !recheck.load(Ordering::SeqCst) {
                        return;
                    }
                }
            }
        };

        let n1 = notify.clone();
        let n2 = notify.clone();
        let t1 = thread::spawn(n1);
        let t2 = thread::spawn(n2);
        t1.join().unwrap();
        t2.join().unwrap();

        // whatever the interleaving, the last notification was consumed
        assert!(!recheck.load(Ordering::SeqCst));
        assert!(pulls.load(Ordering::SeqCst) >= 1);
    });
}

/// Capacity reservation with `fetch_update` never admits more than the limit.
#[test]
fn test_capacity_reservation() {
    loom::model(|| {
        let max = 2usize;
        let pending = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pending = pending.clone();
                thread::spawn(move || {
                    pending
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                            (count < max).then_some(count + 1)
                        })
                        .is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 2);
        assert_eq!(pending.load(Ordering::SeqCst), 2);
    });
}

/// Fence check and high-water raise under one lock: a lower epoch is never
/// accepted after a higher one was recorded.
#[test]
fn test_epoch_fence_never_regresses() {
    loom::model(|| {
        let high_water: Arc<Mutex<Option<i16>>> = Arc::new(Mutex::new(None));
        let accepted = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = [1i16, 2]
            .into_iter()
            .map(|epoch| {
                let high_water = high_water.clone();
                let accepted = accepted.clone();
                thread::spawn(move || {
                    let mut current = high_water.lock().unwrap();
                    if current.is_some_and(|seen| seen > epoch) {
                        return;
                    }
                    accepted.lock().unwrap().push(epoch);
                    *current = Some(current.map_or(epoch, |seen| seen.max(epoch)));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let accepted = accepted.lock().unwrap();
        assert!(accepted.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(accepted.contains(&2));
        assert_eq!(*high_water.lock().unwrap(), Some(2));
    });
}
