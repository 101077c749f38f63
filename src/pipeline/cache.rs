/// Pooled bitmap allocation.
///
/// Interactive rendering churns through same-sized buffers (every preview
/// frame, every icon). The cache keeps free-lists keyed by size and
/// buffer kind so those allocations are reused instead of repeated.
/// Kinds partition the pool: full-resolution buffers never thrash the
/// icon slots and vice versa.
///
/// Ownership rule: a buffer handed out by `get_bitmap` belongs
/// exclusively to the caller until it is given back with `cache`.
/// Returning more buffers than were handed out is a programmer error
/// (the pipeline's equivalent of a double free) and panics.
use std::collections::HashMap;

use crate::Bitmap;

/// What a buffer is for; drives pool partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Tiny filter-strip icons.
    Icon,
    /// Interactive preview frames.
    Preview,
    /// Full-resolution render targets.
    Full,
}

/// Free buffers kept per (width, height, kind) bucket.
const MAX_POOLED_PER_BUCKET: usize = 4;

type BucketKey = (u32, u32, BufferKind);

#[derive(Debug, Default)]
struct Bucket {
    free: Vec<Bitmap>,
    /// Buffers currently owned by callers.
    handed_out: usize,
}

#[derive(Debug, Default)]
pub struct BitmapCache {
    buckets: HashMap<BucketKey, Bucket>,
}

impl BitmapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer ready for writing: a recycled one whose dimensions match
    /// exactly, or a fresh allocation. Contents are unspecified.
    pub fn get_bitmap(&mut self, width: u32, height: u32, kind: BufferKind) -> Bitmap {
        let bucket = self.buckets.entry((width, height, kind)).or_default();
        bucket.handed_out += 1;
        match bucket.free.pop() {
            Some(bitmap) => bitmap,
            None => Bitmap::new(width, height),
        }
    }

    /// Return a buffer for reuse. The caller must not touch its pixels
    /// afterwards.
    ///
    /// # Panics
    /// Panics when the bucket has no outstanding buffers, which means the
    /// caller returned something it no longer owned.
    pub fn cache(&mut self, bitmap: Bitmap, kind: BufferKind) {
        let key = (bitmap.width(), bitmap.height(), kind);
        let bucket = self.buckets.get_mut(&key).unwrap_or_else(|| {
            panic!(
                "returned a {}x{} {:?} buffer that was never handed out",
                key.0, key.1, kind
            )
        });
        assert!(
            bucket.handed_out > 0,
            "returned a {}x{} {:?} buffer twice",
            key.0,
            key.1,
            kind
        );
        bucket.handed_out -= 1;
        if bucket.free.len() < MAX_POOLED_PER_BUCKET {
            bucket.free.push(bitmap);
        }
    }

    /// Free buffers currently pooled, across all buckets.
    pub fn pooled_count(&self) -> usize {
        self.buckets.values().map(|b| b.free.len()).sum()
    }

    /// Drop every pooled buffer, releasing their memory. Outstanding
    /// buffers are unaffected; their buckets keep accounting.
    pub fn clear(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.free.clear();
        }
        self.buckets.retain(|_, b| b.handed_out > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returned_buffers_are_reused() {
        let mut cache = BitmapCache::new();
        let mut bitmap = cache.get_bitmap(64, 64, BufferKind::Preview);
        // Tag a pixel so we can recognize the buffer when it comes back.
        bitmap.put_pixel(0, 0, image::Rgba([1, 2, 3, 4]));
        cache.cache(bitmap, BufferKind::Preview);

        let recycled = cache.get_bitmap(64, 64, BufferKind::Preview);
        assert_eq!(recycled.get_pixel(0, 0).0, [1, 2, 3, 4]);
        assert_eq!(cache.pooled_count(), 0);
    }

    #[test]
    fn kinds_partition_the_pool() {
        let mut cache = BitmapCache::new();
        let bitmap = cache.get_bitmap(64, 64, BufferKind::Icon);
        cache.cache(bitmap, BufferKind::Icon);

        // Same size, different kind: must be a fresh buffer, and the
        // icon one stays pooled.
        let _preview = cache.get_bitmap(64, 64, BufferKind::Preview);
        assert_eq!(cache.pooled_count(), 1);
    }

    #[test]
    fn mismatched_sizes_do_not_reuse() {
        let mut cache = BitmapCache::new();
        let bitmap = cache.get_bitmap(64, 64, BufferKind::Full);
        cache.cache(bitmap, BufferKind::Full);

        let other = cache.get_bitmap(32, 32, BufferKind::Full);
        assert_eq!(other.dimensions(), (32, 32));
        assert_eq!(cache.pooled_count(), 1);
    }

    #[test]
    fn two_live_owners_get_distinct_buffers() {
        let mut cache = BitmapCache::new();
        let mut a = cache.get_bitmap(16, 16, BufferKind::Preview);
        let b = cache.get_bitmap(16, 16, BufferKind::Preview);
        a.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        assert_ne!(a.get_pixel(0, 0), b.get_pixel(0, 0));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn double_return_panics() {
        let mut cache = BitmapCache::new();
        let bitmap = cache.get_bitmap(8, 8, BufferKind::Icon);
        cache.cache(bitmap.clone(), BufferKind::Icon);
        cache.cache(bitmap, BufferKind::Icon);
    }

    #[test]
    fn pool_depth_is_bounded() {
        let mut cache = BitmapCache::new();
        let buffers: Vec<_> = (0..10)
            .map(|_| cache.get_bitmap(8, 8, BufferKind::Icon))
            .collect();
        for buffer in buffers {
            cache.cache(buffer, BufferKind::Icon);
        }
        assert_eq!(cache.pooled_count(), MAX_POOLED_PER_BUCKET);
    }

    #[test]
    fn clear_releases_pooled_memory() {
        let mut cache = BitmapCache::new();
        let bitmap = cache.get_bitmap(8, 8, BufferKind::Icon);
        cache.cache(bitmap, BufferKind::Icon);
        cache.clear();
        assert_eq!(cache.pooled_count(), 0);
    }
}
