//! Fixture constructors

use bbq_core::{ParticipantId, Topic};

/// Topic from a literal; panics on an empty name
pub fn topic(name: &str) -> Topic {
    Topic::new(name).expect("fixture topic must not be empty")
}

/// Participant from a literal
pub fn participant(name: &str) -> ParticipantId {
    ParticipantId::new(name)
}
