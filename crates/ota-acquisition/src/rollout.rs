/// Separator between client id and release tag in the bucketing input.
const DELIMITER: char = '-';

/// A rollout below 100% is still being staged.
pub fn is_unfinished_rollout(rollout: Option<u8>) -> bool {
    matches!(rollout, Some(percent) if percent != 100)
}

/// Whether `client_id` falls into the first `rollout` percent of clients
/// for the release tagged `release_tag`.
///
/// The bucket is stable per client and release, so a client keeps its
/// answer across checks and gets a fresh draw for the next release.
pub fn is_selected_for_rollout(client_id: &str, rollout: u8, release_tag: &str) -> bool {
    let identifier = format!("{client_id}{DELIMITER}{release_tag}");
    bucket(&identifier) < u64::from(rollout)
}

/// Position of `identifier` in `0..100`.
pub fn bucket(identifier: &str) -> u64 {
    hash_code(identifier).unsigned_abs() % 100
}

/// `hash = (hash << 5) - hash + unit` over UTF-16 code units, where the
/// shift operates on the value truncated to 32 bits and the sum does not.
fn hash_code(input: &str) -> i64 {
    input.encode_utf16().fold(0i64, |hash, unit| {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        shifted - hash + i64::from(unit)
    })
}
