use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use crate::error::CallError;

/// Shared outcome broadcast to followers of one initialization attempt.
///
/// The error side is a rendered message rather than the original
/// [`CallError`] so the outcome can fan out to any number of waiters.
type Shared<T> = Option<Result<T, String>>;

enum FlightState<T> {
    Uninitialized,
    Initializing(watch::Receiver<Shared<T>>),
    Ready(T),
}

/// At-most-once concurrent execution of a shared async bootstrap.
///
/// The first caller to find the state uninitialized becomes the leader and
/// runs the factory; every caller arriving while that attempt is in flight
/// attaches to the same outcome. Success caches the value for the lifetime
/// of the process. Failure is delivered to the leader and every attached
/// follower, then resets the state so a later caller may retry — a failed
/// bootstrap never poisons the system permanently.
pub struct SingleFlight<T> {
    state: Mutex<FlightState<T>>,
}

enum Role<T> {
    Lead(watch::Sender<Shared<T>>),
    Follow(watch::Receiver<Shared<T>>),
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Uninitialized),
        }
    }

    /// The cached value, if initialization has completed.
    pub fn get(&self) -> Option<T> {
        match &*self.lock() {
            FlightState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the cached value, or run `factory` (at most once per attempt)
    /// and share its outcome with every concurrent caller.
    pub async fn get_or_init<F, Fut>(&self, factory: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut factory = Some(factory);

        loop {
            let role = {
                let mut state = self.lock();
                match &*state {
                    FlightState::Ready(value) => return Ok(value.clone()),
                    FlightState::Initializing(rx) => Role::Follow(rx.clone()),
                    FlightState::Uninitialized => {
                        let (tx, rx) = watch::channel(None);
                        *state = FlightState::Initializing(rx);
                        Role::Lead(tx)
                    }
                }
            };

            match role {
                Role::Follow(mut rx) => {
                    match rx.wait_for(|slot| slot.is_some()).await {
                        Ok(slot) => {
                            if let Some(outcome) = slot.clone() {
                                return outcome.map_err(CallError::InitFailed);
                            }
                        }
                        // Leader dropped mid-attempt; its guard reset the
                        // state, so contend for leadership again.
                        Err(_) => continue,
                    }
                }
                Role::Lead(tx) => {
                    let Some(factory) = factory.take() else {
                        return Err(CallError::InitFailed(
                            "initializer led twice in one call".to_string(),
                        ));
                    };

                    let guard = ResetGuard { flight: self };
                    let result = factory().await;
                    {
                        let mut state = self.lock();
                        *state = match &result {
                            Ok(value) => FlightState::Ready(value.clone()),
                            Err(err) => {
                                debug!(%err, "bootstrap attempt failed, resetting");
                                FlightState::Uninitialized
                            }
                        };
                    }
                    std::mem::forget(guard);

                    let shared = result
                        .as_ref()
                        .map(T::clone)
                        .map_err(|err| err.to_string());
                    let _ = tx.send(Some(shared.clone()));
                    return shared.map_err(CallError::InitFailed);
                }
            }
        }
    }
}

impl<T> SingleFlight<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, FlightState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets an in-flight attempt if its leader is cancelled before settling.
struct ResetGuard<'a, T> {
    flight: &'a SingleFlight<T>,
}

impl<T> Drop for ResetGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.flight.lock();
        if matches!(*state, FlightState::Initializing(_)) {
            *state = FlightState::Uninitialized;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_attempt() {
        let flight = Arc::new(SingleFlight::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let flight = Arc::clone(&flight);
            let invocations = Arc::clone(&invocations);
            tasks.push(tokio::spawn(async move {
                flight
                    .get_or_init(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42u64)
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 42);
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(flight.get(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_fans_out_then_allows_retry() {
        let flight = Arc::new(SingleFlight::<u64>::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = Arc::clone(&flight);
            let invocations = Arc::clone(&invocations);
            tokio::spawn(async move {
                flight
                    .get_or_init(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err(CallError::ChannelClosed("peer died".to_string()))
                    })
                    .await
            })
        };
        let follower = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                // Attach while the first attempt is in flight.
                tokio::time::sleep(Duration::from_millis(1)).await;
                flight.get_or_init(|| async move { Ok(7u64) }).await
            })
        };

        let leader_err = leader.await.unwrap().unwrap_err();
        let follower_err = follower.await.unwrap().unwrap_err();
        assert!(matches!(leader_err, CallError::InitFailed(_)));
        assert!(matches!(follower_err, CallError::InitFailed(_)));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(flight.get(), None);

        // State reset: a later caller retries and succeeds.
        let retry_invocations = Arc::clone(&invocations);
        let value = flight
            .get_or_init(|| async move {
                retry_invocations.fetch_add(1, Ordering::SeqCst);
                Ok(9u64)
            })
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ready_value_skips_factory() {
        let flight = SingleFlight::new();
        flight.get_or_init(|| async { Ok(1u64) }).await.unwrap();

        let called = AtomicUsize::new(0);
        let value = flight
            .get_or_init(|| async {
                called.fetch_add(1, Ordering::SeqCst);
                Ok(2u64)
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
