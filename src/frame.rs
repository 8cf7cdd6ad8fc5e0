use log::trace;
use std::thread;
use std::time::{Duration, Instant};

/// Identifies one requested refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Provider of display refreshes.
///
/// A caller requests a frame, then waits for it. Timestamps are milliseconds and never
/// decrease.
pub trait FrameSource {
    /// Current time on this source's clock.
    fn now(&self) -> f64;

    fn request_frame(&mut self) -> FrameHandle;

    /// Drops a pending request. Waiting on it afterwards yields `None`.
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Blocks until the refresh for `handle` and returns its timestamp.
    fn wait_for_frame(&mut self, handle: FrameHandle) -> Option<f64>;
}

/// Bookkeeping for the single outstanding request both sources allow.
#[derive(Debug, Default)]
struct PendingFrame {
    next_id: u64,
    pending: Option<u64>,
}

impl PendingFrame {
    fn request(&mut self) -> FrameHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some(id);
        FrameHandle(id)
    }

    fn cancel(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle.0) {
            self.pending = None;
        }
    }

    /// Consumes the request if `handle` is the outstanding one.
    fn take(&mut self, handle: FrameHandle) -> bool {
        if self.pending == Some(handle.0) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

/// A display that refreshes at a fixed rate on a simulated clock starting at 0.
///
/// Waiting never sleeps, so a whole animation runs as fast as it can be computed while
/// keeping the exact timestamps a real display would have produced.
#[derive(Debug)]
pub struct SimulatedFrameSource {
    interval_ms: f64,
    now_ms: f64,
    frames: PendingFrame,
    delivered: u64,
}

impl SimulatedFrameSource {
    pub fn new(refresh_rate_hz: f64) -> Self {
        Self::with_interval(1000.0 / refresh_rate_hz)
    }

    pub fn with_interval(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            now_ms: 0.0,
            frames: PendingFrame::default(),
            delivered: 0,
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered
    }
}

impl FrameSource for SimulatedFrameSource {
    fn now(&self) -> f64 {
        self.now_ms
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.frames.request()
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.frames.cancel(handle);
    }

    fn wait_for_frame(&mut self, handle: FrameHandle) -> Option<f64> {
        if !self.frames.take(handle) {
            return None;
        }
        self.now_ms += self.interval_ms;
        self.delivered += 1;
        Some(self.now_ms)
    }
}

const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(86_400);

/// Wall-clock refreshes: sleeps until the next refresh deadline.
#[derive(Debug)]
pub struct RealtimeFrameSource {
    interval: Duration,
    origin: Instant,
    next_deadline: Instant,
    frames: PendingFrame,
}

impl RealtimeFrameSource {
    /// Rates too low to express (or not positive) fall back to one refresh per day.
    pub fn new(refresh_rate_hz: f64) -> Self {
        let interval = Duration::try_from_secs_f64(1.0 / refresh_rate_hz)
            .map_or(MAX_REFRESH_INTERVAL, |interval| interval.min(MAX_REFRESH_INTERVAL));
        let origin = Instant::now();
        Self {
            interval,
            origin,
            next_deadline: origin + interval,
            frames: PendingFrame::default(),
        }
    }

    fn elapsed_ms(&self, at: Instant) -> f64 {
        at.duration_since(self.origin).as_secs_f64() * 1000.0
    }
}

impl FrameSource for RealtimeFrameSource {
    fn now(&self) -> f64 {
        self.elapsed_ms(Instant::now())
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.frames.request()
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.frames.cancel(handle);
    }

    fn wait_for_frame(&mut self, handle: FrameHandle) -> Option<f64> {
        if !self.frames.take(handle) {
            return None;
        }
        let now = Instant::now();
        if now < self.next_deadline {
            thread::sleep(self.next_deadline - now);
            self.next_deadline += self.interval;
        } else {
            // Fell behind: skip the missed refreshes instead of bursting to catch up.
            trace!("Frame deadline missed by {:?}", now - self.next_deadline);
            self.next_deadline = now + self.interval;
        }
        Some(self.elapsed_ms(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_frames_advance_by_the_interval() {
        let mut source = SimulatedFrameSource::with_interval(16.0);
        assert_eq!(source.now(), 0.0);
        let first = source.request_frame();
        assert_eq!(source.wait_for_frame(first), Some(16.0));
        let second = source.request_frame();
        assert_eq!(source.wait_for_frame(second), Some(32.0));
        assert_eq!(source.frames_delivered(), 2);
    }

    #[test]
    fn cancelled_frames_never_arrive() {
        let mut source = SimulatedFrameSource::new(60.0);
        let handle = source.request_frame();
        source.cancel_frame(handle);
        assert_eq!(source.wait_for_frame(handle), None);
        assert_eq!(source.now(), 0.0);
    }

    #[test]
    fn only_the_latest_request_is_pending() {
        let mut source = SimulatedFrameSource::with_interval(10.0);
        let stale = source.request_frame();
        let fresh = source.request_frame();
        assert_eq!(source.wait_for_frame(stale), None);
        assert_eq!(source.wait_for_frame(fresh), Some(10.0));
        // A handle is fulfilled once.
        assert_eq!(source.wait_for_frame(fresh), None);
    }

    #[test]
    fn realtime_timestamps_do_not_decrease() {
        let mut source = RealtimeFrameSource::new(1000.0);
        let mut last = source.now();
        for _ in 0..3 {
            let handle = source.request_frame();
            let now = source.wait_for_frame(handle).unwrap();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn unrepresentable_rates_fall_back_to_a_daily_refresh() {
        for rate in [1e-20, 0.0, -5.0, f64::NAN] {
            assert_eq!(RealtimeFrameSource::new(rate).interval, MAX_REFRESH_INTERVAL, "rate {rate}");
        }
        assert_eq!(RealtimeFrameSource::new(50.0).interval, Duration::from_millis(20));
    }
}
