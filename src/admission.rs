//! Cross-thread admission queue for scene mutations and pick requests.
//!
//! Any thread may submit [`PendingOp`]s; only the render thread drains them.
//! The producer-side lock is held just long enough to push onto (or swap out)
//! the pending list, never across GPU calls. Draining swaps the list with an
//! empty one and applies the taken ops outside the lock, in enqueue order, so
//! every op is applied exactly once and a single producer's submissions are
//! applied in the order it issued them.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::data_structures::volume::VolumeDescriptor;
use crate::scene::{GeometryData, Light, Transform};

/// A scene mutation awaiting application by the render thread.
pub enum PendingOp {
    /// Create the named geometry, or replace its payload if it already exists.
    /// Replacement keeps the record's selection ID.
    UpsertGeometry(String, GeometryData),
    /// Update only the transform of an existing geometry. Unknown names are
    /// skipped with a logged error, since the producer may race a removal.
    SetTransform(String, Transform),
    RemoveGeometry(String),
    /// Replace the resident volume. The samples are already expanded to the
    /// texel layout of the target texture format.
    SetVolume(VolumeDescriptor, Vec<f32>),
    AddLight(u16, Light),
}

impl std::fmt::Debug for PendingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpsertGeometry(name, _) => f.debug_tuple("UpsertGeometry").field(name).finish(),
            Self::SetTransform(name, _) => f.debug_tuple("SetTransform").field(name).finish(),
            Self::RemoveGeometry(name) => f.debug_tuple("RemoveGeometry").field(name).finish(),
            Self::SetVolume(desc, samples) => f
                .debug_tuple("SetVolume")
                .field(&desc.dimensions)
                .field(&samples.len())
                .finish(),
            Self::AddLight(name, _) => f.debug_tuple("AddLight").field(name).finish(),
        }
    }
}

/// Thread-safe inbox of pending scene mutations.
///
/// `submit` never blocks beyond the list push; `drain` is meant to be called
/// from the render thread only and takes all queued ops at once.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    pending: Mutex<Vec<PendingOp>>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an op. Callable from any thread.
    pub fn submit(&self, op: PendingOp) {
        self.pending
            .lock()
            .expect("admission queue lock poisoned")
            .push(op);
    }

    /// Take ownership of all currently queued ops, in enqueue order.
    ///
    /// Swap-and-release: the lock is exchanged against an empty list and
    /// dropped before the caller touches any of the taken ops.
    pub fn drain(&self) -> Vec<PendingOp> {
        let mut guard = self
            .pending
            .lock()
            .expect("admission queue lock poisoned");
        std::mem::take(&mut *guard)
    }

    pub fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .expect("admission queue lock poisoned")
            .is_empty()
    }
}

/// A screen-space pick request in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickRequest {
    pub x: u32,
    pub y: u32,
}

/// Outcome of a resolved pick request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickResult {
    /// The named geometry was under the requested pixel.
    Hit(String),
    /// The background sentinel was read back.
    Miss,
}

/// Cross-thread handshake for mouse picking: a request slot written by
/// producers and a result slot written by the render thread. A newer request
/// supersedes a pending one (last request wins); a stale result is simply
/// overwritten.
#[derive(Debug, Default)]
pub struct PickSlots {
    request: Mutex<Option<PickRequest>>,
    result: Mutex<Option<PickResult>>,
}

impl PickSlots {
    /// Request a pick at the given surface coordinate. Any thread.
    pub fn request(&self, x: u32, y: u32) {
        *self.request.lock().expect("pick request lock poisoned") = Some(PickRequest { x, y });
    }

    /// Take the pending request, if any. Render thread.
    pub fn take_request(&self) -> Option<PickRequest> {
        self.request.lock().expect("pick request lock poisoned").take()
    }

    /// Deliver a resolved pick. Render thread.
    pub fn deliver(&self, result: PickResult) {
        *self.result.lock().expect("pick result lock poisoned") = Some(result);
    }

    /// Poll for a delivered result. Any thread.
    pub fn take_result(&self) -> Option<PickResult> {
        self.result.lock().expect("pick result lock poisoned").take()
    }
}

/// Smallest accepted scene scale. `world_size` divides voxel spacing by the
/// scale, so zero or negative values would produce unbounded extents.
pub const MIN_SCALE: f32 = 1e-3;

/// Lock-free toggles and the scene scale, shared between producer threads and
/// the render thread. The scale is stored as raw f32 bits.
#[derive(Debug)]
pub struct SharedSettings {
    show_grid: AtomicBool,
    show_volume_bbox: AtomicBool,
    scale_bits: AtomicU32,
}

impl SharedSettings {
    pub fn new() -> Self {
        Self {
            show_grid: AtomicBool::new(true),
            show_volume_bbox: AtomicBool::new(false),
            scale_bits: AtomicU32::new(1.0_f32.to_bits()),
        }
    }

    pub fn show_grid(&self) -> bool {
        self.show_grid.load(Ordering::Relaxed)
    }

    pub fn set_show_grid(&self, on: bool) {
        self.show_grid.store(on, Ordering::Relaxed);
    }

    pub fn toggle_grid(&self) {
        self.show_grid.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn show_volume_bbox(&self) -> bool {
        self.show_volume_bbox.load(Ordering::Relaxed)
    }

    pub fn set_show_volume_bbox(&self, on: bool) {
        self.show_volume_bbox.store(on, Ordering::Relaxed);
    }

    pub fn toggle_volume_bbox(&self) {
        self.show_volume_bbox.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn scale(&self) -> f32 {
        f32::from_bits(self.scale_bits.load(Ordering::Relaxed))
    }

    /// Values below [`MIN_SCALE`] (including zero, negatives and NaN) are
    /// clamped to it.
    pub fn set_scale(&self, scale: f32) {
        self.scale_bits
            .store(scale.max(MIN_SCALE).to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything producer threads and the render thread share. Held behind an
/// `Arc` by both the [`SceneClient`](crate::visualizer::SceneClient) handles
/// and the event loop.
#[derive(Debug, Default)]
pub struct Shared {
    pub queue: AdmissionQueue,
    pub picks: PickSlots,
    pub settings: SharedSettings,
    shutdown: AtomicBool,
}

impl Shared {
    /// Ask the render thread to exit its event loop after the current frame.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remove(name: &str) -> PendingOp {
        PendingOp::RemoveGeometry(name.to_string())
    }

    fn op_name(op: &PendingOp) -> &str {
        match op {
            PendingOp::RemoveGeometry(name) => name,
            _ => panic!("unexpected op"),
        }
    }

    #[test]
    fn drain_preserves_enqueue_order() {
        let queue = AdmissionQueue::new();
        for i in 0..100 {
            queue.submit(remove(&format!("g{i}")));
        }
        let ops = queue.drain();
        assert_eq!(ops.len(), 100);
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(op_name(op), format!("g{i}"));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_takes_each_op_exactly_once() {
        let queue = AdmissionQueue::new();
        queue.submit(remove("a"));
        queue.submit(remove("b"));
        assert_eq!(queue.drain().len(), 2);
        assert_eq!(queue.drain().len(), 0);
    }

    #[test]
    fn per_producer_fifo_under_contention() {
        use std::sync::Arc;

        let queue = Arc::new(AdmissionQueue::new());
        let producers = 4;
        let per_producer = 250;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.submit(remove(&format!("p{p}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ops = queue.drain();
        assert_eq!(ops.len(), producers * per_producer);

        // Each producer's ops must appear in its submission order, whatever
        // the interleaving across producers.
        let mut last_seen = vec![-1_i64; producers];
        for op in &ops {
            let name = op_name(op);
            let (p, i) = name[1..].split_once('-').unwrap();
            let p: usize = p.parse().unwrap();
            let i: i64 = i.parse().unwrap();
            assert!(i > last_seen[p], "producer {p} reordered: {i} after {}", last_seen[p]);
            last_seen[p] = i;
        }
    }

    #[test]
    fn newer_pick_request_wins() {
        let slots = PickSlots::default();
        slots.request(1, 1);
        slots.request(7, 9);
        assert_eq!(slots.take_request(), Some(PickRequest { x: 7, y: 9 }));
        assert_eq!(slots.take_request(), None);
    }

    #[test]
    fn pick_result_is_polled_once() {
        let slots = PickSlots::default();
        slots.deliver(PickResult::Hit("cube".into()));
        assert_eq!(slots.take_result(), Some(PickResult::Hit("cube".into())));
        assert_eq!(slots.take_result(), None);
    }

    #[test]
    fn settings_roundtrip() {
        let settings = SharedSettings::new();
        assert!(settings.show_grid());
        settings.toggle_grid();
        assert!(!settings.show_grid());
        settings.set_scale(2.5);
        assert_eq!(settings.scale(), 2.5);
    }

    #[test]
    fn scale_is_clamped_to_a_positive_minimum() {
        let settings = SharedSettings::new();
        settings.set_scale(0.0);
        assert_eq!(settings.scale(), MIN_SCALE);
        settings.set_scale(-4.0);
        assert_eq!(settings.scale(), MIN_SCALE);
        settings.set_scale(f32::NAN);
        assert_eq!(settings.scale(), MIN_SCALE);
        settings.set_scale(3.0);
        assert_eq!(settings.scale(), 3.0);
    }
}
