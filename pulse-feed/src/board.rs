//! Transient price board: short-lived direction flags plus the latest update per token.
//!
//! Flag expiry is driven by a single min-heap of `(deadline, seq, token)` entries instead of one
//! timer per token. A newer update for the same token bumps its `seq`, so a stale heap entry
//! popped later is recognised and skipped. Reads also check the deadline, so a flag is reported
//! neutral from its deadline onwards even if the sweep has not run yet.

use crate::model::{Direction, PriceUpdate, TokenId};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flag {
    direction: Direction,
    expires_at: Instant,
    seq: u64,
}

#[derive(Debug)]
pub struct PriceBoard {
    flash_duration: Duration,
    flags: FnvHashMap<TokenId, Flag>,
    expiries: BinaryHeap<Reverse<(Instant, u64, TokenId)>>,
    next_seq: u64,
    latest: FnvHashMap<TokenId, PriceUpdate>,
    update_count: u64,
    last_update_at: Option<DateTime<Utc>>,
}

impl PriceBoard {
    pub fn new(flash_duration: Duration) -> Self {
        Self {
            flash_duration,
            flags: FnvHashMap::default(),
            expiries: BinaryHeap::new(),
            next_seq: 0,
            latest: FnvHashMap::default(),
            update_count: 0,
            last_update_at: None,
        }
    }

    /// Record a batch received at `now`. Each non-neutral update (re)starts its token's flash
    /// window, replacing any pending expiry for that token.
    pub fn apply_batch(&mut self, batch: &[PriceUpdate], now: Instant) {
        for update in batch {
            self.set_direction(&update.token_id, update.direction, now);
            self.latest.insert(update.token_id.clone(), update.clone());
        }

        self.update_count += batch.len() as u64;
        if let Some(latest) = batch.iter().map(|update| update.timestamp).max() {
            self.last_update_at = Some(self.last_update_at.map_or(latest, |prev| prev.max(latest)));
        }
    }

    fn set_direction(&mut self, id: &TokenId, direction: Direction, now: Instant) {
        if direction.is_neutral() {
            self.flags.remove(id);
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let expires_at = now + self.flash_duration;

        self.flags.insert(
            id.clone(),
            Flag {
                direction,
                expires_at,
                seq,
            },
        );
        self.expiries.push(Reverse((expires_at, seq, id.clone())));
    }

    /// Current flag for `id`, neutral once its deadline has passed.
    pub fn direction(&self, id: &str, now: Instant) -> Direction {
        self.flags
            .get(id)
            .filter(|flag| flag.expires_at > now)
            .map(|flag| flag.direction)
            .unwrap_or_default()
    }

    /// Every token whose flag is still live at `now`.
    pub fn active_directions(&self, now: Instant) -> Vec<(TokenId, Direction)> {
        let mut active = self
            .flags
            .iter()
            .filter(|(_, flag)| flag.expires_at > now)
            .map(|(id, flag)| (id.clone(), flag.direction))
            .collect::<Vec<_>>();
        active.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        active
    }

    /// Reset every flag whose deadline is at or before `now`. Returns how many were reset.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        while let Some(Reverse((expires_at, _, _))) = self.expiries.peek() {
            if *expires_at > now {
                break;
            }
            let Some(Reverse((_, seq, id))) = self.expiries.pop() else {
                break;
            };

            let current = self.flags.get(&id).is_some_and(|flag| flag.seq == seq);
            if current {
                self.flags.remove(&id);
                trace!(token_id = %id, "direction flag expired");
                expired += 1;
            }
        }
        expired
    }

    /// Deadline of the earliest pending expiry, stale entries included.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.expiries
            .peek()
            .map(|Reverse((expires_at, _, _))| *expires_at)
    }

    pub fn latest_update(&self, id: &str) -> Option<&PriceUpdate> {
        self.latest.get(id)
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.last_update_at
    }

    /// Drop the flag and latest update of one token. Other tokens' expiries are unaffected.
    pub fn forget(&mut self, id: &str) {
        self.flags.remove(id);
        self.latest.remove(id);
    }

    pub fn clear_all_directions(&mut self) {
        self.flags.clear();
        self.expiries.clear();
    }

    pub fn reset(&mut self) {
        self.clear_all_directions();
        self.latest.clear();
        self.update_count = 0;
        self.last_update_at = None;
    }
}
