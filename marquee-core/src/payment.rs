use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reservation::{SeatId, UserId};

/// Signal emitted by the payment processor once a charge for a seat set went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
    pub price: i64,
    #[serde(alias = "paymentconf_id")]
    pub confirmation_id: String,
}

impl PaymentConfirmation {
    /// True when this payload pays for exactly the seats and user named by `key`.
    pub fn matches(&self, key: &CorrelationKey) -> bool {
        CorrelationKey::new(&self.seat_ids, self.user_id) == *key
    }
}

/// Identifies one in-flight booking attempt: the sorted seat set plus the paying user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    seat_ids: Vec<SeatId>,
    user_id: UserId,
}

impl CorrelationKey {
    pub fn new(seat_ids: &[SeatId], user_id: UserId) -> Self {
        let mut seat_ids = seat_ids.to_vec();
        seat_ids.sort();
        seat_ids.dedup();
        Self { seat_ids, user_id }
    }

    pub fn for_confirmation(confirmation: &PaymentConfirmation) -> Self {
        Self::new(&confirmation.seat_ids, confirmation.user_id)
    }

    /// Parses the broker message-key form `"<user>:<seat>,<seat>,..."`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (user, seats) = raw.split_once(':')?;
        let user_id = UserId(user.trim().parse().ok()?);
        let seat_ids: Vec<SeatId> = seats
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SeatId::new)
            .collect();
        if seat_ids.is_empty() {
            return None;
        }
        Some(Self::new(&seat_ids, user_id))
    }

    pub fn seat_ids(&self) -> &[SeatId] {
        &self.seat_ids
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.user_id)?;
        for (i, seat) in self.seat_ids.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(seat.as_str())?;
        }
        Ok(())
    }
}

/// Result of handing a confirmation to the handshake registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Accepted,
    /// The waiter was found but the payload names other seats or another user.
    /// The waiting booking is failed rather than completed.
    RejectedMismatch,
    NoWaiter,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(ids: &[&str]) -> Vec<SeatId> {
        ids.iter().map(|s| SeatId::new(*s)).collect()
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = CorrelationKey::new(&seats(&["B2", "A1"]), UserId(7));
        let b = CorrelationKey::new(&seats(&["A1", "B2"]), UserId(7));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "7:A1,B2");
    }

    #[test]
    fn test_key_distinguishes_seats_that_differ_only_in_punctuation() {
        let a = CorrelationKey::new(&seats(&["A-1"]), UserId(7));
        let b = CorrelationKey::new(&seats(&["A1"]), UserId(7));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_message_key() {
        let key = CorrelationKey::parse("9: B1 ,A1").unwrap();
        assert_eq!(key.user_id(), UserId(9));
        assert_eq!(key.seat_ids(), seats(&["A1", "B1"]).as_slice());

        assert!(CorrelationKey::parse("nine:A1").is_none());
        assert!(CorrelationKey::parse("9:").is_none());
        assert!(CorrelationKey::parse("A1,B1").is_none());
    }

    #[test]
    fn test_confirmation_matching() {
        let key = CorrelationKey::new(&seats(&["A1", "A2"]), UserId(7));
        let mut confirmation = PaymentConfirmation {
            seat_ids: seats(&["A2", "A1"]),
            user_id: UserId(7),
            price: 4000,
            confirmation_id: "481516".to_string(),
        };
        assert!(confirmation.matches(&key));

        confirmation.user_id = UserId(8);
        assert!(!confirmation.matches(&key));

        confirmation.user_id = UserId(7);
        confirmation.seat_ids.pop();
        assert!(!confirmation.matches(&key));
    }

    #[test]
    fn test_confirmation_accepts_legacy_field_name() {
        let json = r#"{"seat_ids":["A1"],"user_id":3,"price":25,"paymentconf_id":"123456"}"#;
        let confirmation: PaymentConfirmation = serde_json::from_str(json).unwrap();
        assert_eq!(confirmation.confirmation_id, "123456");
    }
}
