use crate::domain::notice::{Notice, Target, Timestamp};
use crate::ports::outbound::TimeSource;

/// Time source frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub Timestamp);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        self.0
    }
}

pub fn make_notice(target: Target, timestamp: Timestamp, attributes: &[(&str, &str)]) -> Notice {
    attributes
        .iter()
        .fold(Notice::new(target, timestamp), |notice, (attribute, value)| {
            notice.with(*attribute, *value)
        })
}
