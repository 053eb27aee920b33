// The sorted-set cache adapter: per-key timeline caches with add-with-score,
// remove-member, reverse-range, reverse-rank, cardinality, and an atomic
// prune-to-cap. Grounded on the teacher's `QueryCache`/`AppState` pattern of
// an `Arc<RwLock<HashMap<...>>>` shared, cloneable store — generalized here
// from a single TTL-guarded slot per query into one sorted set per cache
// key, with a lock scoped to the key rather than the whole map so that
// pruning two different consumers' timelines never contends (spec.md §5:
// "writes to different cache keys are independent").
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::CoreError;

/// One consumer's materialized timeline: `item_id -> timestamp`, ordered for
/// reverse-range reads as score descending, member ascending (spec.md I3).
#[derive(Default)]
struct SortedSet {
    // member -> score, for O(1) existence/score lookups on add and remove.
    scores: HashMap<String, i64>,
    // Ordered by `(-score, member)` ascending, which is exactly score
    // descending with member ascending as a tie-break — the order `consume`
    // wants to read in, with no reversal needed at read time.
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn len(&self) -> usize {
        self.scores.len()
    }

    fn add(&mut self, member: String, score: i64) {
        if let Some(&existing) = self.scores.get(&member) {
            if existing == score {
                return; // idempotent: same (member, score) is a no-op.
            }
            self.order.remove(&(-existing, member.clone()));
        }
        self.order.insert((-score, member.clone()));
        self.scores.insert(member, score);
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(-score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn rank(&self, member: &str) -> Option<usize> {
        let score = *self.scores.get(member)?;
        let key = (-score, member.to_string());
        Some(self.order.range(..key).count())
    }

    fn range(&self, start: isize, end: isize) -> Vec<(String, i64)> {
        if start < 0 || end < start {
            return Vec::new();
        }
        self.order
            .iter()
            .skip(start as usize)
            .take((end - start + 1) as usize)
            .map(|(neg_score, member)| (member.clone(), -neg_score))
            .collect()
    }

    /// Pops the lowest-score members (the tail of our ascending-by-`-score`
    /// ordering) until cardinality equals `cap`. Returns the evicted count.
    fn prune(&mut self, cap: usize) -> usize {
        let mut evicted = 0;
        while self.scores.len() > cap {
            let Some((_, member)) = self.order.iter().next_back().cloned() else {
                break;
            };
            self.order.remove(&(-self.scores[&member], member.clone()));
            self.scores.remove(&member);
            evicted += 1;
        }
        evicted
    }
}

pub struct TimelineCache {
    shards: RwLock<HashMap<String, Arc<Mutex<SortedSet>>>>,
}

impl TimelineCache {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    async fn shard(&self, key: &str) -> Arc<Mutex<SortedSet>> {
        if let Some(shard) = self.shards.read().await.get(key) {
            return shard.clone();
        }
        let mut shards = self.shards.write().await;
        shards
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SortedSet::default())))
            .clone()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.shards.read().await.contains_key(key)
    }

    pub async fn cardinality(&self, key: &str) -> usize {
        self.shard(key).await.lock().await.len()
    }

    /// `zadd` + the atomic scripted prune, in one lock acquisition — the
    /// fan-out write path's "(cache_add(c, item_id, timestamp); prune(c))".
    pub async fn add_and_prune(&self, key: &str, members: &[(String, i64)], max_cache: usize) {
        let shard = self.shard(key).await;
        let mut set = shard.lock().await;
        for (member, score) in members {
            set.add(member.clone(), *score);
        }
        set.prune(max_cache);
    }

    pub async fn remove(&self, key: &str, member: &str) -> bool {
        let shard = self.shard(key).await;
        shard.lock().await.remove(member)
    }

    pub async fn remove_many(&self, key: &str, members: &[String]) -> usize {
        let shard = self.shard(key).await;
        let mut set = shard.lock().await;
        members.iter().filter(|m| set.remove(m)).count()
    }

    pub async fn reverse_range(&self, key: &str, start: isize, end: isize) -> Vec<(String, i64)> {
        let shard = self.shard(key).await;
        shard.lock().await.range(start, end)
    }

    pub async fn reverse_rank(&self, key: &str, member: &str) -> Result<usize, CoreError> {
        let shard = self.shard(key).await;
        shard
            .lock()
            .await
            .rank(member)
            .ok_or_else(|| CoreError::UnknownCursor(member.to_string()))
    }
}

impl Default for TimelineCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn cache_key(consumer_id: &str, feed_name: &str) -> String {
    format!("{consumer_id}:{feed_name}")
}
