use crate::config::RateLimiterConfig;
use crate::error::RateLimiterError;
use crate::events::RateLimiterEvent;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// A promise that `count` tokens will be available at `execute_at`.
///
/// Redeemable exactly once via [`RateLimiter::execute_reservation`]. Unredeemed
/// reservations expire and return their tokens after `execute_at + grace`.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: u64,
    pub key: Option<String>,
    pub execute_at: Instant,
    pub count: u64,
    pub shard: usize,
}

/// Outcome of a non-blocking [`RateLimiter::try_acquire`] call.
#[derive(Debug, Clone)]
pub struct TryAcquireOutcome {
    pub allowed: bool,
    pub retry_after: Option<Duration>,
    pub shard_id: usize,
}

struct ReservationEntry {
    id: u64,
    count: u64,
    execute_at: Instant,
}

struct Shard {
    last_refill: Instant,
    tokens: f64,
    reserved: f64,
    capacity: f64,
    refill_per_sec: f64,
    reservations: VecDeque<ReservationEntry>,
}

impl Shard {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            last_refill: Instant::now(),
            tokens: capacity,
            reserved: 0.0,
            capacity,
            refill_per_sec,
            reservations: VecDeque::new(),
        }
    }

    /// Adds accrued tokens since `last_refill`, clamping to capacity. A clock
    /// that runs backwards is treated as no time having passed.
    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            self.last_refill = now;
            return;
        }
        let elapsed = now.duration_since(self.last_refill);
        self.last_refill = now;
        let added = elapsed.as_secs_f64() * self.refill_per_sec;
        self.tokens = (self.tokens + added).min(self.capacity);
    }

    fn available(&self) -> f64 {
        (self.tokens - self.reserved).max(0.0)
    }

    /// Time until `available()` would reach `count`, assuming no further
    /// consumption by other callers.
    fn wait_for(&self, count: f64) -> Duration {
        let deficit = count - self.available();
        if deficit <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }

    /// Drops reservations past `execute_at + grace`, returning their tokens.
    fn expire_reservations(&mut self, now: Instant, grace: Duration) {
        while let Some(front) = self.reservations.front() {
            if now >= front.execute_at + grace {
                let entry = self.reservations.pop_front().unwrap();
                self.reserved = (self.reserved - entry.count as f64).max(0.0);
            } else {
                break;
            }
        }
    }

    fn residue_ratio(&self) -> f64 {
        if self.capacity <= 0.0 {
            0.0
        } else {
            self.tokens / self.capacity
        }
    }
}

struct ShardTable {
    shards: Vec<Mutex<Shard>>,
}

/// Sharded token-bucket rate limiter with reservations.
///
/// Admits operations at an average rate `R` per period `P` with burst
/// capacity `B`, spreading state across `N` shards chosen by hashing a
/// caller-supplied key. Each shard holds `(last_refill, tokens)` behind its
/// own mutex; the limiter itself holds only immutable configuration plus the
/// (rarely swapped) shard table.
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    table: RwLock<ShardTable>,
    next_reservation_id: AtomicU64,
    round_robin: AtomicUsize,
    last_adapt_check: Mutex<Instant>,
}

const ADAPT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const ADAPT_IMBALANCE_THRESHOLD: f64 = 3.0;

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = Arc::new(config);
        let table = build_shard_table(&config, config.shards);
        Self {
            config,
            table: RwLock::new(table),
            next_reservation_id: AtomicU64::new(1),
            round_robin: AtomicUsize::new(0),
            last_adapt_check: Mutex::new(Instant::now()),
        }
    }

    fn shard_count(&self) -> usize {
        self.table.read().unwrap().shards.len()
    }

    fn shard_index(&self, key: Option<&str>, n: usize) -> usize {
        match key {
            Some(k) => {
                let mut hasher = DefaultHasher::new();
                k.hash(&mut hasher);
                (hasher.finish() as usize) % n
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % n,
        }
    }

    /// Non-blocking: consumes `count` tokens immediately if available.
    pub fn try_acquire(&self, key: Option<&str>, count: u64) -> Result<TryAcquireOutcome, RateLimiterError> {
        self.maybe_adapt();
        let n = self.shard_count();
        let shard_id = self.shard_index(key, n);

        let per_shard_burst = self.config.burst as f64 / n as f64;
        if count as f64 > per_shard_burst {
            return Err(RateLimiterError::Infeasible {
                requested: count,
                max_burst: per_shard_burst as u64,
            });
        }

        let table = self.table.read().unwrap();
        let mut shard = table.shards[shard_id].lock().unwrap();
        let now = Instant::now();
        shard.refill(now);
        shard.expire_reservations(now, self.config.reservation_grace);

        let outcome = if shard.available() >= count as f64 {
            shard.tokens -= count as f64;
            self.emit(RateLimiterEvent::Admitted {
                name: self.config.name.clone(),
                timestamp: now,
                shard: shard_id,
                waited: Duration::ZERO,
            });
            TryAcquireOutcome {
                allowed: true,
                retry_after: None,
                shard_id,
            }
        } else {
            let retry_after = shard.wait_for(count as f64);
            self.emit(RateLimiterEvent::Rejected {
                name: self.config.name.clone(),
                timestamp: now,
                shard: shard_id,
            });
            TryAcquireOutcome {
                allowed: false,
                retry_after: Some(retry_after),
                shard_id,
            }
        };
        Ok(outcome)
    }

    /// Blocks until `count` tokens are admitted or `deadline` elapses.
    pub async fn acquire(
        &self,
        key: Option<&str>,
        count: u64,
        deadline: Option<Instant>,
    ) -> Result<TryAcquireOutcome, RateLimiterError> {
        loop {
            let outcome = self.try_acquire(key, count)?;
            if outcome.allowed {
                return Ok(outcome);
            }
            let wait = outcome.retry_after.unwrap_or_default();
            if let Some(deadline) = deadline {
                if Instant::now() + wait > deadline {
                    return Err(RateLimiterError::Timeout);
                }
            }
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Allocates a future slot for `count` tokens, failing if it would fall
    /// further out than `max_wait`.
    pub fn reserve(
        &self,
        key: Option<&str>,
        count: u64,
        max_wait: Duration,
    ) -> Result<Reservation, RateLimiterError> {
        self.maybe_adapt();
        let n = self.shard_count();
        let shard_id = self.shard_index(key, n);
        let per_shard_burst = self.config.burst as f64 / n as f64;
        if count as f64 > per_shard_burst {
            return Err(RateLimiterError::Infeasible {
                requested: count,
                max_burst: per_shard_burst as u64,
            });
        }

        let table = self.table.read().unwrap();
        let mut shard = table.shards[shard_id].lock().unwrap();
        let now = Instant::now();
        shard.refill(now);
        shard.expire_reservations(now, self.config.reservation_grace);

        let wait = shard.wait_for(count as f64);
        if wait > max_wait {
            return Err(RateLimiterError::Timeout);
        }

        let execute_at = now + wait;
        shard.reserved += count as f64;
        let id = self.next_reservation_id.fetch_add(1, Ordering::Relaxed);
        shard.reservations.push_back(ReservationEntry {
            id,
            count,
            execute_at,
        });

        self.emit(RateLimiterEvent::Reserved {
            name: self.config.name.clone(),
            timestamp: now,
            shard: shard_id,
            execute_at,
        });

        Ok(Reservation {
            id,
            key: key.map(str::to_string),
            execute_at,
            count,
            shard: shard_id,
        })
    }

    /// Redeems a reservation, deducting its tokens. Each reservation may be
    /// redeemed exactly once.
    pub fn execute_reservation(&self, reservation: &Reservation) -> Result<(), RateLimiterError> {
        let table = self.table.read().unwrap();
        let mut shard = table.shards[reservation.shard].lock().unwrap();
        let now = Instant::now();
        shard.refill(now);

        let position = shard
            .reservations
            .iter()
            .position(|entry| entry.id == reservation.id)
            .ok_or(RateLimiterError::UnknownReservation)?;
        shard.reservations.remove(position);

        shard.reserved = (shard.reserved - reservation.count as f64).max(0.0);
        shard.tokens = (shard.tokens - reservation.count as f64).max(0.0);
        Ok(())
    }

    fn emit(&self, event: RateLimiterEvent) {
        self.config.event_listeners.emit(&event);
    }

    /// Samples per-shard residue imbalance and, if adaptive resharding is
    /// enabled and the imbalance ratio exceeds the threshold, doubles the
    /// shard count. Outstanding reservations are migrated by execute-time
    /// order so none are dropped.
    fn maybe_adapt(&self) {
        if !self.config.adaptive {
            return;
        }
        let mut last_check = match self.last_adapt_check.try_lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let now = Instant::now();
        if now.duration_since(*last_check) < ADAPT_CHECK_INTERVAL {
            return;
        }
        *last_check = now;
        drop(last_check);

        let imbalance = {
            let table = self.table.read().unwrap();
            let residues: Vec<f64> = table
                .shards
                .iter()
                .map(|s| s.lock().unwrap().residue_ratio())
                .collect();
            let max = residues.iter().cloned().fold(0.0_f64, f64::max);
            let avg = residues.iter().sum::<f64>() / residues.len().max(1) as f64;
            if avg <= 0.0 {
                0.0
            } else {
                max / avg
            }
        };

        if imbalance > ADAPT_IMBALANCE_THRESHOLD {
            self.reshard();
        }
    }

    fn reshard(&self) {
        let mut table = self.table.write().unwrap();
        let old_count = table.shards.len();
        let new_count = old_count * 2;

        let mut pending_reservations = Vec::new();
        let mut residual_tokens = 0.0;
        for shard in table.shards.iter() {
            let mut shard = shard.lock().unwrap();
            residual_tokens += shard.tokens;
            for entry in shard.reservations.drain(..) {
                pending_reservations.push(entry);
            }
        }
        pending_reservations.sort_by_key(|r| r.execute_at);

        let mut new_table = build_shard_table(&self.config, new_count);
        let tokens_per_shard = residual_tokens / new_count as f64;
        for shard in new_table.shards.iter_mut() {
            let shard = shard.get_mut().unwrap();
            shard.tokens = tokens_per_shard.min(shard.capacity);
        }
        for (idx, entry) in pending_reservations.into_iter().enumerate() {
            let shard = new_table.shards[idx % new_count].get_mut().unwrap();
            shard.reserved += entry.count as f64;
            shard.reservations.push_back(entry);
        }

        self.emit(RateLimiterEvent::Resharded {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            old_shards: old_count,
            new_shards: new_count,
        });
        *table = new_table;
    }
}

fn build_shard_table(config: &RateLimiterConfig, n: usize) -> ShardTable {
    let n = n.max(1);
    let refill_per_sec = config.rate as f64 / (n as f64 * config.period.as_secs_f64());
    let capacity = config.burst as f64 / n as f64;
    let shards = (0..n)
        .map(|_| Mutex::new(Shard::new(capacity, refill_per_sec)))
        .collect();
    ShardTable { shards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimiterConfig;

    fn limiter(rate: u64, period: Duration, burst: u64, shards: usize) -> RateLimiter {
        let config = RateLimiterConfig::builder()
            .rate(rate, period)
            .burst(burst)
            .shards(shards)
            .build();
        RateLimiter::new(config)
    }

    #[test]
    fn admits_up_to_burst_immediately() {
        let rl = limiter(60, Duration::from_secs(1), 4, 1);
        for _ in 0..4 {
            let outcome = rl.try_acquire(Some("k"), 1).unwrap();
            assert!(outcome.allowed);
        }
        let outcome = rl.try_acquire(Some("k"), 1).unwrap();
        assert!(!outcome.allowed);
        assert!(outcome.retry_after.is_some());
    }

    #[test]
    fn count_over_burst_is_infeasible() {
        let rl = limiter(60, Duration::from_secs(1), 4, 1);
        let err = rl.try_acquire(Some("k"), 100).unwrap_err();
        assert!(matches!(err, RateLimiterError::Infeasible { .. }));
    }

    #[test]
    fn different_keys_can_land_on_different_shards() {
        let rl = limiter(60, Duration::from_secs(1), 40, 4);
        let mut shards = std::collections::HashSet::new();
        for i in 0..20 {
            let key = format!("key-{i}");
            let outcome = rl.try_acquire(Some(&key), 1).unwrap();
            shards.insert(outcome.shard_id);
        }
        assert!(shards.len() > 1, "expected keys to spread across shards");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill_then_admits() {
        let rl = limiter(60, Duration::from_secs(1), 1, 1);
        assert!(rl.try_acquire(Some("k"), 1).unwrap().allowed);
        assert!(!rl.try_acquire(Some("k"), 1).unwrap().allowed);

        let result = rl
            .acquire(Some("k"), 1, Some(Instant::now() + Duration::from_secs(5)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_before_deadline() {
        let rl = limiter(1, Duration::from_secs(60), 1, 1);
        assert!(rl.try_acquire(Some("k"), 1).unwrap().allowed);

        let result = rl
            .acquire(Some("k"), 1, Some(Instant::now() + Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(RateLimiterError::Timeout)));
    }

    #[test]
    fn reservation_redeems_exactly_once() {
        let rl = limiter(60, Duration::from_secs(1), 4, 1);
        let reservation = rl.reserve(Some("k"), 2, Duration::from_secs(1)).unwrap();
        rl.execute_reservation(&reservation).unwrap();
        let err = rl.execute_reservation(&reservation).unwrap_err();
        assert!(matches!(err, RateLimiterError::UnknownReservation));
    }

    #[test]
    fn reservation_past_max_wait_is_timeout() {
        let rl = limiter(1, Duration::from_secs(60), 1, 1);
        assert!(rl.try_acquire(Some("k"), 1).unwrap().allowed);
        let err = rl
            .reserve(Some("k"), 1, Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, RateLimiterError::Timeout));
    }

    #[test]
    fn unredeemed_reservation_returns_tokens_after_grace() {
        let config = RateLimiterConfig::builder()
            .rate(60, Duration::from_secs(1))
            .burst(2)
            .shards(1)
            .reservation_grace(Duration::from_millis(10))
            .build();
        let rl = RateLimiter::new(config);

        let reservation = rl.reserve(Some("k"), 2, Duration::from_secs(1)).unwrap();
        assert!(!rl.try_acquire(Some("k"), 1).unwrap().allowed);

        std::thread::sleep(reservation.execute_at - Instant::now() + Duration::from_millis(20));
        let outcome = rl.try_acquire(Some("k"), 1).unwrap();
        assert!(outcome.allowed);
    }
}
