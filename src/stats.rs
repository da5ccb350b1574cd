//! Frame statistics for debugging and performance analysis.
//!
//! Enable with the `render-stats` feature:
//! ```bash
//! cargo run --example headless_frame --features render-stats
//! ```
//!
//! A summary is logged at `info` level once per second of frames, showing:
//! - Node updates that did work vs. ones that hit the fast path
//! - Queue flushes and the nodes they searched
//! - Sprites batched, batch flushes and draw calls
//! - Object renderer switches

/// Snapshot of accumulated statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub node_updates: u64,
    pub node_updates_skipped: u64,
    pub queue_flushes: u64,
    pub nodes_searched: u64,
    pub sprites_batched: u64,
    pub batch_flushes: u64,
    pub draw_calls: u64,
    pub renderer_switches: u64,
}

#[cfg(feature = "render-stats")]
mod inner {
    use super::StatsSnapshot;
    use std::cell::RefCell;
    use std::time::Instant;

    thread_local! {
        static STATS: RefCell<FrameStats> = RefCell::new(FrameStats::new());
    }

    struct FrameStats {
        counters: StatsSnapshot,
        last_print: Instant,
    }

    impl FrameStats {
        fn new() -> Self {
            Self {
                counters: StatsSnapshot::default(),
                last_print: Instant::now(),
            }
        }

        fn reset(&mut self) {
            self.counters = StatsSnapshot::default();
            self.last_print = Instant::now();
        }
    }

    fn with_counters(f: impl FnOnce(&mut StatsSnapshot)) {
        STATS.with(|s| f(&mut s.borrow_mut().counters));
    }

    /// Record an update that recomputed at least one component.
    #[inline]
    pub fn record_node_update() {
        with_counters(|c| c.node_updates += 1);
    }

    /// Record an update that found nothing to do.
    #[inline]
    pub fn record_node_update_skipped() {
        with_counters(|c| c.node_updates_skipped += 1);
    }

    /// Record a queue flush that searched `searched` nodes.
    #[inline]
    pub fn record_queue_flush(searched: usize) {
        with_counters(|c| {
            c.queue_flushes += 1;
            c.nodes_searched += searched as u64;
        });
    }

    /// Record a sprite batch flush.
    #[inline]
    pub fn record_batch_flush(sprites: usize, draw_calls: usize) {
        with_counters(|c| {
            c.batch_flushes += 1;
            c.sprites_batched += sprites as u64;
            c.draw_calls += draw_calls as u64;
        });
    }

    #[inline]
    pub fn record_renderer_switch() {
        with_counters(|c| c.renderer_switches += 1);
    }

    /// Return a snapshot of the current stats (for testing).
    pub fn get_stats() -> StatsSnapshot {
        STATS.with(|s| s.borrow().counters.clone())
    }

    /// Reset all stats to zero (for test isolation).
    pub fn reset_stats() {
        STATS.with(|s| s.borrow_mut().reset());
    }

    /// Called at the end of each rendered frame to potentially log stats.
    pub fn end_frame() {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();
            stats.counters.frames += 1;

            if stats.last_print.elapsed().as_secs() < 1 {
                return;
            }

            let c = &stats.counters;
            let total_updates = c.node_updates + c.node_updates_skipped;
            let skip_rate = if total_updates > 0 {
                (c.node_updates_skipped as f64 / total_updates as f64) * 100.0
            } else {
                0.0
            };

            log::info!(
                "[Frame Stats] frames={} updates={} skipped={} skip_rate={:.1}%",
                c.frames,
                c.node_updates,
                c.node_updates_skipped,
                skip_rate
            );
            log::info!(
                "  queue: flushes={} searched={}",
                c.queue_flushes,
                c.nodes_searched
            );
            log::info!(
                "  batch: sprites={} flushes={} draw_calls={} switches={}",
                c.sprites_batched,
                c.batch_flushes,
                c.draw_calls,
                c.renderer_switches
            );

            stats.reset();
        });
    }
}

#[cfg(feature = "render-stats")]
pub use inner::*;

// No-op implementations when the feature is disabled

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn get_stats() -> StatsSnapshot {
    StatsSnapshot::default()
}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn reset_stats() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_node_update() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_node_update_skipped() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_queue_flush(_searched: usize) {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_batch_flush(_sprites: usize, _draw_calls: usize) {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_renderer_switch() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn end_frame() {}
