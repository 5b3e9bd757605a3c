use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

/// Rental statistics for one pool, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total `rent` calls.
    pub rented: u64,
    /// Rentals served from a retained array instead of a fresh allocation.
    pub reused: u64,
    /// Total `give_back` calls.
    pub returned: u64,
    /// Arrays currently held for reuse.
    pub retained: usize,
}

impl PoolStats {
    fn accumulate(&mut self, other: PoolStats) {
        self.rented += other.rented;
        self.reused += other.reused;
        self.returned += other.returned;
        self.retained += other.retained;
    }
}

/// Recycles `Vec<T>` backing arrays, bucketed by power-of-two capacity.
///
/// Vectors handed out are always empty; callers move their live prefix in
/// and give the previous array back. The pool is single-threaded.
pub struct ArrayPool<T> {
    buckets: HashMap<usize, Vec<Vec<T>>>,
    retain_per_bucket: usize,
    stats: PoolStats,
}

impl<T> ArrayPool<T> {
    pub fn new(retain_per_bucket: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            retain_per_bucket,
            stats: PoolStats::default(),
        }
    }

    /// Rent an empty vector able to hold at least `min_capacity` items.
    pub fn rent(&mut self, min_capacity: usize) -> Vec<T> {
        let bucket = bucket_for_request(min_capacity);
        self.stats.rented += 1;
        if let Some(vec) = self.buckets.get_mut(&bucket).and_then(Vec::pop) {
            self.stats.reused += 1;
            self.stats.retained -= 1;
            debug_assert!(vec.is_empty() && vec.capacity() >= min_capacity);
            return vec;
        }
        Vec::with_capacity(bucket)
    }

    /// Return a vector to the pool. Remaining items are dropped.
    pub fn give_back(&mut self, mut vec: Vec<T>) {
        self.stats.returned += 1;
        if vec.capacity() == 0 {
            return;
        }
        vec.clear();
        let bucket = bucket_for_capacity(vec.capacity());
        let slot = self.buckets.entry(bucket).or_default();
        if slot.len() < self.retain_per_bucket {
            slot.push(vec);
            self.stats.retained += 1;
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

/// Smallest power of two that can satisfy a request.
fn bucket_for_request(min_capacity: usize) -> usize {
    min_capacity.max(1).next_power_of_two()
}

/// Largest power of two not above `capacity`, so any array found in a
/// bucket satisfies every request routed to that bucket.
fn bucket_for_capacity(capacity: usize) -> usize {
    debug_assert!(capacity > 0);
    1usize << (usize::BITS - 1 - capacity.leading_zeros())
}

trait ErasedPool: Any {
    fn stats(&self) -> PoolStats;
    fn element_name(&self) -> &'static str;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedPool for ArrayPool<T> {
    fn stats(&self) -> PoolStats {
        self.stats
    }

    fn element_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-keyed collection of [`ArrayPool`]s shared by every table in a scene.
pub struct ArrayPools {
    pools: HashMap<TypeId, Box<dyn ErasedPool>>,
    retain_per_bucket: usize,
}

impl ArrayPools {
    pub fn new(retain_per_bucket: usize) -> Self {
        Self {
            pools: HashMap::new(),
            retain_per_bucket,
        }
    }

    /// Pool for element type `T`, created on first use.
    pub fn pool_mut<T: 'static>(&mut self) -> &mut ArrayPool<T> {
        let retain = self.retain_per_bucket;
        let pool = self
            .pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ArrayPool::<T>::new(retain)));
        match pool.as_any_mut().downcast_mut::<ArrayPool<T>>() {
            Some(pool) => pool,
            None => unreachable!("array pool keyed by the wrong TypeId"),
        }
    }

    pub fn rent<T: 'static>(&mut self, min_capacity: usize) -> Vec<T> {
        self.pool_mut::<T>().rent(min_capacity)
    }

    pub fn give_back<T: 'static>(&mut self, vec: Vec<T>) {
        self.pool_mut::<T>().give_back(vec);
    }

    /// Statistics summed over every element type.
    pub fn stats(&self) -> PoolStats {
        let mut total = PoolStats::default();
        for pool in self.pools.values() {
            total.accumulate(pool.stats());
        }
        total
    }

    /// Per element type statistics, sorted by type name.
    pub fn stats_by_type(&self) -> Vec<(&'static str, PoolStats)> {
        let mut out: Vec<_> = self
            .pools
            .values()
            .map(|pool| (pool.element_name(), pool.stats()))
            .collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }
}

impl Default for ArrayPools {
    fn default() -> Self {
        Self::new(8)
    }
}
