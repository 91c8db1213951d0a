//! Ride offer controller - time-boxed accept/decline
//!
//! Holds at most one pending offer. The session's 1 Hz tick drives the
//! countdown; when the deadline passes the offer auto-declines exactly
//! once. A newer offer displaces the pending one along with its
//! countdown. Every resolution path (accept, manual decline,
//! auto-decline, displacement) takes the offer out of the controller,
//! so a second resolution attempt finds nothing to resolve.

use crate::domain::offer::RideOffer;
use crate::domain::types::OfferId;
use tracing::{info, warn};

/// Why a decline went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineKind {
    /// Driver tapped decline
    Driver,
    /// Offer window ran out
    AutoTimeout,
    /// Offer arrived while a trip was already active
    DriverBusy,
}

impl DeclineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineKind::Driver => "driver",
            DeclineKind::AutoTimeout => "auto_timeout",
            DeclineKind::DriverBusy => "driver_busy",
        }
    }
}

/// Result of presenting a new offer
#[derive(Debug)]
pub enum PresentOutcome {
    /// Offer staged, countdown running
    Presented { remaining_s: u64 },
    /// Offer staged after displacing the pending one, whose countdown
    /// is cancelled; the displaced offer rides along
    Replaced { remaining_s: u64, superseded: RideOffer },
}

/// What the 1 Hz tick produced
#[derive(Debug)]
pub enum OfferTick {
    /// Remaining whole seconds changed; surface to the UI
    Countdown { offer_id: OfferId, remaining_s: u64 },
    /// Deadline passed; the offer is resolved and must be declined upstream
    AutoDeclined(RideOffer),
}

/// Rejected accept/decline call, controller state unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferError {
    NoPendingOffer,
    /// The deadline has passed; auto-decline owns the resolution
    Expired,
}

impl std::fmt::Display for OfferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferError::NoPendingOffer => write!(f, "no pending offer"),
            OfferError::Expired => write!(f, "offer window already expired"),
        }
    }
}

impl std::error::Error for OfferError {}

struct PendingOffer {
    offer: RideOffer,
    /// Last countdown value surfaced, to emit one update per second
    last_countdown_s: Option<u64>,
}

/// Single-offer controller driven by the session loop
#[derive(Default)]
pub struct OfferController {
    pending: Option<PendingOffer>,
}

impl OfferController {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Stage a new offer. A newcomer displaces any pending offer and
    /// cancels its countdown; the displaced offer comes back in
    /// `Replaced`.
    pub fn present(&mut self, offer: RideOffer, now_ms: u64) -> PresentOutcome {
        let superseded = self.pending.take().map(|p| {
            warn!(
                offer_id = %p.offer.id,
                replaced_by = %offer.id,
                "offer_superseded"
            );
            p.offer
        });

        let remaining_s = offer.remaining_secs(now_ms);
        info!(
            offer_id = %offer.id,
            fare = %offer.estimated_fare,
            surge = %offer.surge_multiplier,
            remaining_s = %remaining_s,
            "offer_presented"
        );
        self.pending = Some(PendingOffer { offer, last_countdown_s: None });
        match superseded {
            Some(superseded) => PresentOutcome::Replaced { remaining_s, superseded },
            None => PresentOutcome::Presented { remaining_s },
        }
    }

    /// Countdown step. Resolves the offer exactly once if the deadline
    /// has passed; otherwise emits the remaining seconds when the whole
    /// second changed since the last tick.
    pub fn tick(&mut self, now_ms: u64) -> Option<OfferTick> {
        let pending = self.pending.as_mut()?;

        if pending.offer.is_expired(now_ms) {
            let pending = self.pending.take()?;
            info!(offer_id = %pending.offer.id, "offer_auto_declined");
            return Some(OfferTick::AutoDeclined(pending.offer));
        }

        let remaining_s = pending.offer.remaining_secs(now_ms);
        if pending.last_countdown_s == Some(remaining_s) {
            return None;
        }
        pending.last_countdown_s = Some(remaining_s);
        Some(OfferTick::Countdown { offer_id: pending.offer.id.clone(), remaining_s })
    }

    /// Accept before the deadline. Past it, the call is refused and the
    /// next tick auto-declines.
    pub fn accept(&mut self, now_ms: u64) -> Result<RideOffer, OfferError> {
        self.take_unexpired(now_ms)
    }

    /// Manual decline before the deadline
    pub fn decline(&mut self, now_ms: u64) -> Result<RideOffer, OfferError> {
        self.take_unexpired(now_ms)
    }

    /// Take the pending offer out if its deadline has not passed.
    /// An expired offer stays put; the tick owns its resolution.
    fn take_unexpired(&mut self, now_ms: u64) -> Result<RideOffer, OfferError> {
        let expired = match &self.pending {
            None => return Err(OfferError::NoPendingOffer),
            Some(p) => p.offer.is_expired(now_ms),
        };
        if expired {
            return Err(OfferError::Expired);
        }
        let pending = self.pending.take().ok_or(OfferError::NoPendingOffer)?;
        Ok(pending.offer)
    }

    #[inline]
    pub fn pending(&self) -> Option<&RideOffer> {
        self.pending.as_ref().map(|p| &p.offer)
    }

    /// Drop any pending offer on teardown, returning it for a decline
    pub fn clear(&mut self) -> Option<RideOffer> {
        self.pending.take().map(|p| p.offer)
    }
}
