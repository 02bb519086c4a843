//! Wall-clock and identifier helpers.

pub mod timestamps;

pub use timestamps::{iso_timestamp, Clock, ManualClock, SystemClock, Timestamp};

/// Generates a time-ordered run identifier.
#[must_use]
pub fn generate_run_id() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_v7_and_ordered() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_eq!(a.get_version_num(), 7);
        assert!(a <= b);
    }
}
