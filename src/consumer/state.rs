//! RECEIVED -> PARSED -> IN-FLIGHT -> {ACKED, REQUEUED, DEAD-LETTERED}
//! (spec §4.4 "State machine per delivery").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Received,
    Parsed,
    InFlight,
    Acked,
    Requeued,
    DeadLettered,
}

impl DeliveryState {
    /// Terminal states free one prefetch slot (spec §4.4); `Requeued` does
    /// not — the message returns to the same queue for another delivery.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Acked | DeliveryState::DeadLettered)
    }

    /// Only a terminal `Acked` outcome emits training data (spec §4.4,
    /// §4.5).
    pub fn emits_training_data(self) -> bool {
        matches!(self, DeliveryState::Acked)
    }

    pub fn metric_status_label(self) -> &'static str {
        match self {
            DeliveryState::Acked => "success",
            DeliveryState::Requeued => "retry",
            DeliveryState::DeadLettered => "dead_letter",
            DeliveryState::Received | DeliveryState::Parsed | DeliveryState::InFlight => "in_progress",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_acked_and_dead_lettered_are_terminal() {
        assert!(DeliveryState::Acked.is_terminal());
        assert!(DeliveryState::DeadLettered.is_terminal());
        assert!(!DeliveryState::Requeued.is_terminal());
        assert!(!DeliveryState::InFlight.is_terminal());
    }

    #[test]
    fn only_acked_emits_training_data() {
        assert!(DeliveryState::Acked.emits_training_data());
        assert!(!DeliveryState::DeadLettered.emits_training_data());
        assert!(!DeliveryState::Requeued.emits_training_data());
    }
}
