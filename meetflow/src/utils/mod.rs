//! Utility functions for task identifiers, timestamps and text.

mod ids;
mod text;
mod timestamps;

pub use ids::{generate_task_id, is_valid_task_id, RandomTaskIds, TaskIdGenerator};
pub use text::truncate;
pub use timestamps::{now_utc, unix_seconds, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_is_valid() {
        let id = generate_task_id();
        assert!(is_valid_task_id(&id));
    }
}
