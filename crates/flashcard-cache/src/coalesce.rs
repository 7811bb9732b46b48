//! Per-fingerprint single-flight: concurrent callers for the same key share
//! one computation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub(crate) enum Role<V, E> {
    Leader,
    Waiter(broadcast::Receiver<Result<V, E>>),
}

pub(crate) struct InFlight<K, V, E> {
    requests: Mutex<HashMap<K, broadcast::Sender<Result<V, E>>>>,
}

impl<K, V, E> InFlight<K, V, E>
where
    K: Hash + Eq,
    V: Clone,
    E: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically becomes the leader for `key`, or joins an existing leader.
    pub(crate) fn join_or_lead(&self, key: K) -> Role<V, E> {
        let mut requests = self.requests.lock().unwrap();
        match requests.entry(key) {
            Entry::Occupied(entry) => Role::Waiter(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                Role::Leader
            }
        }
    }

    /// Delivers the result to every waiter and releases the reservation.
    pub(crate) fn complete(&self, key: &K, result: Result<V, E>) {
        if let Some(sender) = self.requests.lock().unwrap().remove(key) {
            let _ = sender.send(result);
        }
    }

    /// Releases the reservation without delivering a result. Dropping the
    /// sender closes the channel, so any waiter's `recv` resolves to an
    /// error instead of hanging forever.
    pub(crate) fn cancel(&self, key: &K) {
        self.requests.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_caller_joins_the_first() {
        let in_flight: InFlight<String, i32, String> = InFlight::new();
        assert!(matches!(in_flight.join_or_lead("k".to_string()), Role::Leader));
        assert!(matches!(in_flight.join_or_lead("k".to_string()), Role::Waiter(_)));
    }

    #[tokio::test]
    async fn waiter_receives_leader_result() {
        let in_flight: InFlight<String, i32, String> = InFlight::new();
        assert!(matches!(in_flight.join_or_lead("k".to_string()), Role::Leader));
        let mut rx = match in_flight.join_or_lead("k".to_string()) {
            Role::Waiter(rx) => rx,
            Role::Leader => panic!("expected waiter"),
        };
        in_flight.complete(&"k".to_string(), Ok(42));
        assert_eq!(rx.recv().await.unwrap(), Ok(42));
    }

    #[test]
    fn new_leader_allowed_after_completion() {
        let in_flight: InFlight<String, i32, String> = InFlight::new();
        let _ = in_flight.join_or_lead("k".to_string());
        in_flight.complete(&"k".to_string(), Ok(1));
        assert!(matches!(in_flight.join_or_lead("k".to_string()), Role::Leader));
    }
}
