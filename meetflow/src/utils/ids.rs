//! Task identifier generation.
//!
//! Identifiers have the shape `YYYYMMDDHHMMSS_<32 hex chars>`: a UTC
//! second-resolution timestamp followed by the simple form of a random
//! UUIDv4. They sort by submission time and are safe to use as directory
//! names.

use chrono::Utc;
use uuid::Uuid;

const STAMP_LEN: usize = 14;
const SUFFIX_LEN: usize = 32;

/// Generates a new task identifier.
#[must_use]
pub fn generate_task_id() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    format!("{stamp}_{}", Uuid::new_v4().simple())
}

/// Returns true if `id` has the shape produced by [`generate_task_id`].
///
/// Anything that reaches the filesystem from a request path goes through
/// this check first.
#[must_use]
pub fn is_valid_task_id(id: &str) -> bool {
    let Some((stamp, suffix)) = id.split_once('_') else {
        return false;
    };
    stamp.len() == STAMP_LEN
        && stamp.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Source of task identifiers.
///
/// The default generator is [`generate_task_id`]; tests swap in a fixed
/// sequence to exercise collision handling.
pub trait TaskIdGenerator: Send + Sync {
    /// Produces the next identifier.
    fn next_id(&self) -> String;
}

/// Generator backed by [`generate_task_id`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTaskIds;

impl TaskIdGenerator for RandomTaskIds {
    fn next_id(&self) -> String {
        generate_task_id()
    }
}

impl<F> TaskIdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn next_id(&self) -> String {
        self()
    }
}
