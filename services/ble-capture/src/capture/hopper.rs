//! Time-driven channel hopping over the configured scan list

use std::time::{Duration, Instant};

use crate::config::ConfigError;

/// Cursor over a non-empty channel list with a dwell deadline
#[derive(Debug, Clone)]
pub struct ChannelHopper {
    channels: Vec<u8>,
    dwell: Duration,
    cursor: usize,
    /// Next hop time; `None` when pinned to a single channel
    deadline: Option<Instant>,
    hops: u64,
}

impl ChannelHopper {
    /// Hop across `channels`, staying `dwell` on each, starting now
    pub fn new(channels: Vec<u8>, dwell: Duration, now: Instant) -> Result<Self, ConfigError> {
        if channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if dwell.is_zero() {
            return Err(ConfigError::InvalidScanWindow(dwell.as_secs_f64()));
        }

        Ok(Self {
            channels,
            dwell,
            cursor: 0,
            deadline: Some(now + dwell),
            hops: 0,
        })
    }

    /// Stay on one channel forever (file replay)
    pub fn pinned(channel: u8) -> Self {
        Self {
            channels: vec![channel],
            dwell: Duration::ZERO,
            cursor: 0,
            deadline: None,
            hops: 0,
        }
    }

    pub fn current(&self) -> u8 {
        self.channels[self.cursor]
    }

    pub fn is_hopping(&self) -> bool {
        self.deadline.is_some()
    }

    /// Total dwell periods elapsed
    pub fn hops(&self) -> u64 {
        self.hops
    }

    /// Advance the cursor for every dwell period that ended by `now`.
    ///
    /// Returns the new channel when the receiver has to be retuned.
    pub fn poll(&mut self, now: Instant) -> Option<u8> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        let dwell_ns = self.dwell.as_nanos();
        let steps = 1 + now.duration_since(deadline).as_nanos() / dwell_ns;
        let len = self.channels.len();
        let previous = self.current();

        self.cursor = (self.cursor + (steps % len as u128) as usize) % len;
        self.deadline = Some(deadline + Duration::from_nanos((steps * dwell_ns) as u64));
        self.hops += steps as u64;

        let channel = self.current();
        (channel != previous).then_some(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_no_hop_before_deadline() {
        let t0 = Instant::now();
        let mut hopper = ChannelHopper::new(vec![37, 38, 39], WINDOW, t0).unwrap();

        assert_eq!(hopper.poll(t0), None);
        assert_eq!(hopper.poll(t0 + Duration::from_millis(9_999)), None);
        assert_eq!(hopper.current(), 37);
        assert_eq!(hopper.hops(), 0);
    }

    #[test]
    fn test_hops_in_order_and_wraps() {
        let t0 = Instant::now();
        let mut hopper = ChannelHopper::new(vec![37, 38, 39], WINDOW, t0).unwrap();

        assert_eq!(hopper.poll(t0 + WINDOW), Some(38));
        assert_eq!(hopper.poll(t0 + WINDOW * 2), Some(39));
        assert_eq!(hopper.poll(t0 + WINDOW * 3), Some(37));
        assert_eq!(hopper.cursor, 0);
    }

    #[test]
    fn test_cursor_advances_k_steps_after_k_windows() {
        let t0 = Instant::now();
        for k in 1..=10u32 {
            let mut hopper = ChannelHopper::new(vec![1, 5, 9, 13], WINDOW, t0).unwrap();
            hopper.poll(t0 + WINDOW * k);
            assert_eq!(hopper.cursor, k as usize % 4, "k={}", k);
            assert_eq!(hopper.hops(), k as u64);
        }
    }

    #[test]
    fn test_frequent_polling_matches_single_poll() {
        let t0 = Instant::now();
        let mut hopper = ChannelHopper::new(vec![37, 38, 39], WINDOW, t0).unwrap();

        let mut now = t0;
        while now < t0 + WINDOW * 7 {
            now += Duration::from_millis(250);
            hopper.poll(now);
        }
        assert_eq!(hopper.hops(), 7);
        assert_eq!(hopper.cursor, 7 % 3);
    }

    #[test]
    fn test_deadline_strictly_increases() {
        let t0 = Instant::now();
        let mut hopper = ChannelHopper::new(vec![37, 38], WINDOW, t0).unwrap();

        let mut last = hopper.deadline.unwrap();
        for k in 1..5u32 {
            hopper.poll(t0 + WINDOW * k + Duration::from_millis(3));
            let next = hopper.deadline.unwrap();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_single_channel_never_retunes() {
        let t0 = Instant::now();
        let mut hopper = ChannelHopper::new(vec![38], WINDOW, t0).unwrap();
        assert_eq!(hopper.poll(t0 + WINDOW * 3), None);
        assert_eq!(hopper.current(), 38);
    }

    #[test]
    fn test_pinned_never_hops() {
        let mut hopper = ChannelHopper::pinned(39);
        assert!(!hopper.is_hopping());
        assert_eq!(hopper.poll(Instant::now() + Duration::from_secs(3600)), None);
        assert_eq!(hopper.current(), 39);
    }

    #[test]
    fn test_empty_schedule_rejected() {
        assert!(matches!(
            ChannelHopper::new(Vec::new(), WINDOW, Instant::now()),
            Err(ConfigError::NoChannels)
        ));
    }
}
