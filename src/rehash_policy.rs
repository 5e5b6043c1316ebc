//! RehashPolicy: decides when a chained table grows and to what size.
//!
//! The policy never touches memory. It keeps one piece of cached state, the
//! element count at which the next growth triggers (`next_resize`). Every
//! call that can change that cache takes `&mut self`, and `decide_rehash`
//! reports the post-call threshold in its result, so the mutation is part
//! of the visible contract rather than a hidden side effect.

use crate::primes;

/// Minimum multiplicative increase in bucket count per growth.
pub const GROWTH_FACTOR: usize = 2;

/// Outcome of a sizing query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RehashDecision {
    /// Keep the current bucket array. `next_resize` is the cached threshold
    /// after the call.
    Stay { next_resize: usize },
    /// Grow to `bucket_count` buckets. `next_resize` already reflects the
    /// new size.
    Grow {
        bucket_count: usize,
        next_resize: usize,
    },
}

impl RehashDecision {
    /// `(false, 0)` or `(true, bucket_count)`.
    pub fn as_pair(&self) -> (bool, usize) {
        match *self {
            RehashDecision::Stay { .. } => (false, 0),
            RehashDecision::Grow { bucket_count, .. } => (true, bucket_count),
        }
    }

    pub fn should_grow(&self) -> bool {
        matches!(self, RehashDecision::Grow { .. })
    }

    pub fn next_resize(&self) -> usize {
        match *self {
            RehashDecision::Stay { next_resize } | RehashDecision::Grow { next_resize, .. } => {
                next_resize
            }
        }
    }
}

/// Which bucket array a cursor position refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BucketSide {
    /// The array being drained.
    Old,
    /// The array receiving relocated nodes.
    New,
}

/// A tagged bucket position: `(Old, x)` is the old array's bucket `x`,
/// `(New, y)` the new array's bucket `y`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BucketIndex {
    pub side: BucketSide,
    pub offset: usize,
}

impl Default for BucketIndex {
    fn default() -> Self {
        BucketIndex {
            side: BucketSide::Old,
            offset: 0,
        }
    }
}

/// Progress marker for a step-wise migration between two bucket arrays.
///
/// The cursor only records where the driver is; moving nodes is the
/// driver's job.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RehashCursor {
    in_progress: bool,
    position: BucketIndex,
}

impl RehashCursor {
    /// Start draining the old array from bucket 0.
    pub fn begin(&mut self) {
        assert!(!self.in_progress, "migration already in progress");
        self.in_progress = true;
        self.position = BucketIndex::default();
    }

    /// Record that `buckets` more old buckets were drained; returns the new
    /// offset.
    pub fn advance(&mut self, buckets: usize) -> usize {
        debug_assert!(self.in_progress);
        self.position.offset += buckets;
        self.position.offset
    }

    /// Mark the migration complete. The cursor now points at the start of
    /// the new array.
    pub fn finish(&mut self) {
        self.in_progress = false;
        self.position = BucketIndex {
            side: BucketSide::New,
            offset: 0,
        };
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn position(&self) -> BucketIndex {
        self.position
    }
}

/// Result of one migration step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RehashStatus {
    /// No migration was in progress.
    Idle,
    /// Work remains; call again.
    Paused,
    /// The last old bucket was drained and the old array released.
    Completed,
}

#[derive(Clone, Debug)]
pub struct RehashPolicy {
    max_load_factor: f32,
    next_resize: usize,
    enabled: bool,
    cursor: RehashCursor,
}

impl Default for RehashPolicy {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RehashPolicy {
    /// Growable policy targeting `max_load_factor` elements per bucket.
    ///
    /// Panics if `max_load_factor` is not a finite positive number.
    pub fn new(max_load_factor: f32) -> Self {
        assert!(
            max_load_factor.is_finite() && max_load_factor > 0.0,
            "max_load_factor must be finite and positive, got {max_load_factor}"
        );
        RehashPolicy {
            max_load_factor,
            next_resize: 0,
            enabled: true,
            cursor: RehashCursor::default(),
        }
    }

    /// Fixed-capacity policy with the default load factor: sizing math still
    /// runs but growth is never signalled.
    pub fn fixed() -> Self {
        Self::fixed_with_load_factor(1.0)
    }

    pub fn fixed_with_load_factor(max_load_factor: f32) -> Self {
        RehashPolicy {
            enabled: false,
            ..Self::new(max_load_factor)
        }
    }

    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Cached element count above which the next growth triggers.
    pub fn next_resize(&self) -> usize {
        self.next_resize
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Overwrite the cached threshold, e.g. to roll back after a failed
    /// bucket allocation.
    pub fn reset(&mut self, threshold: usize) {
        self.next_resize = threshold;
    }

    pub fn cursor(&self) -> &RehashCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut RehashCursor {
        &mut self.cursor
    }

    fn threshold_for(&self, buckets: usize) -> usize {
        // Float-to-int `as` saturates.
        (buckets as f64 * self.max_load_factor as f64).ceil() as usize
    }

    /// Smallest tabulated bucket count `>= requested`.
    ///
    /// Also stores `next_resize = ceil(result * max_load_factor)`: calling
    /// this twice with the same input is not a no-op on the cache if
    /// anything else moved it in between.
    ///
    /// Panics if `requested` exceeds the largest tabulated prime.
    pub fn next_bucket_count(&mut self, requested: usize) -> usize {
        let Some(count) = primes::prime_at_least(requested) else {
            panic!(
                "requested {requested} buckets, above the largest tabulated size {}",
                primes::largest_prime()
            );
        };
        self.next_resize = self.threshold_for(count);
        count
    }

    /// Least bucket count that holds `elements` within the load factor,
    /// i.e. `ceil(elements / max_load_factor)`.
    ///
    /// Panics if that count does not fit in `usize`.
    pub fn buckets_needed_for(&self, elements: usize) -> usize {
        let mlf = self.max_load_factor as f64;
        let n = elements as f64;
        let mut buckets = (n / mlf).ceil() as usize;
        // The quotient may round across an integer boundary; settle on the
        // exact ceiling as seen through f64 multiplication.
        while (buckets as f64) * mlf < n && buckets < usize::MAX {
            buckets += 1;
        }
        while buckets > 0 && ((buckets - 1) as f64) * mlf >= n {
            buckets -= 1;
        }
        assert!(
            (buckets as f64) * mlf >= n,
            "{elements} elements need more than usize::MAX buckets at load factor {}",
            self.max_load_factor
        );
        buckets
    }

    /// Decide whether a table with `buckets` buckets and `elements` entries
    /// must grow before inserting `pending` more.
    ///
    /// A fixed policy never returns `Grow`, but still runs the sizing math
    /// and updates the cached threshold as if it had.
    pub fn decide_rehash(
        &mut self,
        buckets: usize,
        elements: usize,
        pending: usize,
    ) -> RehashDecision {
        let total = elements.saturating_add(pending);
        if total <= self.next_resize {
            return RehashDecision::Stay {
                next_resize: self.next_resize,
            };
        }

        let min_buckets = self.buckets_needed_for(total);
        if min_buckets <= buckets {
            // Headroom left over from removals: keep the array.
            self.next_resize = self.threshold_for(buckets);
            return RehashDecision::Stay {
                next_resize: self.next_resize,
            };
        }

        let candidate = min_buckets.max(buckets.saturating_mul(GROWTH_FACTOR));
        let bucket_count = self.next_bucket_count(candidate);
        if !self.enabled {
            log::debug!(
                "fixed policy refused growth {buckets} -> {bucket_count} buckets at {total} elements"
            );
            return RehashDecision::Stay {
                next_resize: self.next_resize,
            };
        }
        log::debug!("growing {buckets} -> {bucket_count} buckets for {total} elements");
        RehashDecision::Grow {
            bucket_count,
            next_resize: self.next_resize,
        }
    }
}
