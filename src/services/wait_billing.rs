//! Wait time billing at the pickup point
//!
//! A `WaitSession` starts when the trip reaches `AtPickup`. The first
//! `grace_ms` of waiting are free; beyond that the charge accrues at
//! `rate_per_min_usd`, prorated per whole second. There is no internal
//! timer: `snapshot` is a pure function of the clock, so any tick
//! cadence produces the same numbers for the same instant. Starting the
//! trip freezes the session and pins the final charge.

/// Billing state for one stay at the pickup
#[derive(Debug, Clone)]
pub struct WaitSession {
    started_at_ms: u64,
    grace_ms: u64,
    rate_per_min_usd: f64,
    frozen: Option<WaitSnapshot>,
}

/// Point-in-time view of the wait accrual
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitSnapshot {
    pub waited_ms: u64,
    pub billable_ms: u64,
    pub charge_usd: f64,
}

impl WaitSnapshot {
    #[inline]
    pub fn waited_secs(&self) -> u64 {
        self.waited_ms / 1000
    }

    #[inline]
    pub fn billable_secs(&self) -> u64 {
        self.billable_ms / 1000
    }

    #[inline]
    pub fn in_grace(&self) -> bool {
        self.billable_ms == 0
    }
}

impl WaitSession {
    pub fn new(started_at_ms: u64, grace_ms: u64, rate_per_min_usd: f64) -> Self {
        Self { started_at_ms, grace_ms, rate_per_min_usd, frozen: None }
    }

    #[inline]
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Accrual at `now_ms`. Clamps to zero when the clock reads earlier
    /// than the session start. Once frozen, always returns the frozen
    /// snapshot.
    pub fn snapshot(&self, now_ms: u64) -> WaitSnapshot {
        if let Some(frozen) = self.frozen {
            return frozen;
        }

        let waited_ms = now_ms.saturating_sub(self.started_at_ms);
        let billable_ms = waited_ms.saturating_sub(self.grace_ms);
        let charge_usd = (billable_ms / 1000) as f64 * self.rate_per_min_usd / 60.0;

        WaitSnapshot { waited_ms, billable_ms, charge_usd }
    }

    /// Pin the accrual at `now_ms`; later snapshots return this value.
    /// Freezing twice keeps the first snapshot.
    pub fn freeze(&mut self, now_ms: u64) -> WaitSnapshot {
        let snap = match self.frozen {
            Some(s) => s,
            None => self.snapshot(now_ms),
        };
        self.frozen = Some(snap);
        snap
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE_MS: u64 = 120_000;
    const RATE: f64 = 0.35;

    #[test]
    fn test_no_charge_inside_grace() {
        let session = WaitSession::new(0, GRACE_MS, RATE);
        let snap = session.snapshot(119_999);
        assert_eq!(snap.billable_ms, 0);
        assert_eq!(snap.charge_usd, 0.0);
        assert!(snap.in_grace());
        assert_eq!(snap.waited_secs(), 119);
    }

    #[test]
    fn test_charge_starts_after_grace() {
        let session = WaitSession::new(0, GRACE_MS, RATE);

        let snap = session.snapshot(120_000);
        assert_eq!(snap.billable_ms, 0);
        assert_eq!(snap.charge_usd, 0.0);

        let snap = session.snapshot(121_000);
        assert_eq!(snap.billable_ms, 1_000);
        assert!((snap.charge_usd - RATE / 60.0).abs() < 1e-12);
        assert!(!snap.in_grace());
    }

    #[test]
    fn test_reference_charge_150_seconds() {
        // 150 s waited, 120 s grace: 30 billable seconds at $0.35/min
        let session = WaitSession::new(0, GRACE_MS, RATE);
        let snap = session.snapshot(150_000);
        assert_eq!(snap.waited_ms, 150_000);
        assert_eq!(snap.billable_secs(), 30);
        assert!((snap.charge_usd - 0.175).abs() < 1e-12);
    }

    #[test]
    fn test_charge_prorates_per_whole_second() {
        let session = WaitSession::new(0, GRACE_MS, RATE);
        // 30.4 billable seconds bills the same as 30
        let snap = session.snapshot(150_400);
        assert!((snap.charge_usd - 0.175).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_is_pure() {
        let session = WaitSession::new(10_000, GRACE_MS, RATE);
        let a = session.snapshot(200_000);
        let b = session.snapshot(200_000);
        assert_eq!(a, b);
        // asking about an earlier instant is fine too
        let earlier = session.snapshot(50_000);
        assert!(earlier.waited_ms < a.waited_ms);
    }

    #[test]
    fn test_clock_before_start_clamps_to_zero() {
        let session = WaitSession::new(100_000, GRACE_MS, RATE);
        let snap = session.snapshot(40_000);
        assert_eq!(snap.waited_ms, 0);
        assert_eq!(snap.billable_ms, 0);
        assert_eq!(snap.charge_usd, 0.0);
    }

    #[test]
    fn test_freeze_pins_the_charge() {
        let mut session = WaitSession::new(0, GRACE_MS, RATE);
        let frozen = session.freeze(150_000);
        assert!((frozen.charge_usd - 0.175).abs() < 1e-12);
        assert!(session.is_frozen());

        // time keeps passing, the snapshot does not
        let later = session.snapshot(600_000);
        assert_eq!(later, frozen);
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let mut session = WaitSession::new(0, GRACE_MS, RATE);
        let first = session.freeze(150_000);
        let second = session.freeze(300_000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_rate_never_charges() {
        let session = WaitSession::new(0, GRACE_MS, 0.0);
        let snap = session.snapshot(900_000);
        assert!(snap.billable_ms > 0);
        assert_eq!(snap.charge_usd, 0.0);
    }
}
