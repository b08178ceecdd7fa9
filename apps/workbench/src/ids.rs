//! Record id generation.
//!
//! Ids are opaque strings of the form `<prefix>_<epochMillis>_<suffix>` where
//! the suffix is six random base36 characters. Only uniqueness matters to the
//! rest of the crate; nothing parses an id back apart.

use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

pub const RESUME_PREFIX: &str = "resume";
pub const COVER_LETTER_PREFIX: &str = "cover";
pub const LOG_PREFIX: &str = "log";
pub const JOB_PREFIX: &str = "job";

/// `<prefix>_<epochMillis>_<6 base36 chars>`
pub fn generate_id(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().timestamp_millis(),
        random_suffix(SUFFIX_LEN)
    )
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}
