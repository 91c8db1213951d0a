//! Ride offer model - the time-boxed proposal a driver may accept or decline

use crate::domain::types::{Location, OfferId, OfferMessage, RiderSummary};

/// A ride offer with its deadline resolved to an absolute epoch-ms instant
#[derive(Debug, Clone, PartialEq)]
pub struct RideOffer {
    pub id: OfferId,
    pub rider: RiderSummary,
    pub pickup: Location,
    pub destination: Location,
    pub estimated_fare: f64,
    pub estimated_distance_miles: f64,
    pub estimated_duration_minutes: f64,
    pub surge_multiplier: f64,
    /// Absolute deadline (epoch ms); the offer auto-declines at this instant
    pub expires_at_ms: u64,
}

impl RideOffer {
    /// Build from the dispatch wire message, resolving the deadline.
    ///
    /// An absolute `expires_at` wins when present; otherwise the relative
    /// window (message field, or `default_window_ms`) counts from `now_ms`.
    pub fn from_message(msg: OfferMessage, now_ms: u64, default_window_ms: u64) -> Self {
        let expires_at_ms = msg
            .expires_at
            .to_epoch_ms()
            .unwrap_or_else(|| now_ms + msg.offer_window_ms.unwrap_or(default_window_ms));

        Self {
            id: OfferId(msg.offer_id),
            rider: msg.rider,
            pickup: msg.pickup,
            destination: msg.destination,
            estimated_fare: msg.estimated_fare,
            estimated_distance_miles: msg.estimated_distance_miles,
            estimated_duration_minutes: msg.estimated_duration_minutes,
            surge_multiplier: msg.surge_multiplier,
            expires_at_ms,
        }
    }

    /// Milliseconds until the deadline, zero once passed
    #[inline]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms)
    }

    /// Whole seconds left for countdown display, rounded up so a fresh
    /// 15_000 ms offer shows 15 and the display reaches 0 exactly at the
    /// deadline
    #[inline]
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        self.remaining_ms(now_ms).div_ceil(1000)
    }

    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ExpiryStamp;

    fn offer_message(expires_at: ExpiryStamp, window: Option<u64>) -> OfferMessage {
        OfferMessage {
            offer_id: "of-77".to_string(),
            rider: RiderSummary {
                name: "Ana".to_string(),
                rating: 4.9,
                phone: None,
                photo_url: None,
            },
            pickup: Location::new("100 Main St", 36.373, -94.209),
            destination: Location::new("200 Elm St", 36.385, -94.220),
            estimated_fare: 12.5,
            estimated_distance_miles: 3.2,
            estimated_duration_minutes: 11.0,
            surge_multiplier: 1.5,
            expires_at,
            offer_window_ms: window,
        }
    }

    #[test]
    fn test_absolute_deadline_wins() {
        let msg = offer_message(ExpiryStamp::EpochMs(50_000), Some(99_000));
        let offer = RideOffer::from_message(msg, 10_000, 15_000);
        assert_eq!(offer.expires_at_ms, 50_000);
    }

    #[test]
    fn test_window_from_message() {
        let msg = offer_message(ExpiryStamp::None, Some(20_000));
        let offer = RideOffer::from_message(msg, 10_000, 15_000);
        assert_eq!(offer.expires_at_ms, 30_000);
    }

    #[test]
    fn test_default_window_when_message_has_neither() {
        let msg = offer_message(ExpiryStamp::None, None);
        let offer = RideOffer::from_message(msg, 10_000, 15_000);
        assert_eq!(offer.expires_at_ms, 25_000);
    }

    #[test]
    fn test_remaining_counts_down_and_clamps() {
        let msg = offer_message(ExpiryStamp::None, Some(15_000));
        let offer = RideOffer::from_message(msg, 0, 15_000);

        assert_eq!(offer.remaining_secs(0), 15);
        assert_eq!(offer.remaining_secs(1), 15);
        assert_eq!(offer.remaining_secs(1_000), 14);
        assert_eq!(offer.remaining_secs(14_999), 1);
        assert_eq!(offer.remaining_secs(15_000), 0);
        assert!(offer.is_expired(15_000));
        assert_eq!(offer.remaining_ms(60_000), 0);
    }
}
