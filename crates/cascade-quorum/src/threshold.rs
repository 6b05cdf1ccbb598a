//! Strict-majority threshold over the live leaderboard.
//!
//! The threshold is computed from the number of filled slots at execution
//! time, not at signing time:
//! - 0 members → 1 required (nothing can pass)
//! - n members → floor(n / 2) + 1 required
//!
//! Signatures collected against a smaller leaderboard can stop being enough
//! once more slots fill.

/// Default leaderboard capacity.
pub const DEFAULT_CAPACITY: usize = 12;

/// Minimum number of valid signer pairs for `members` filled slots.
///
/// # Examples
///
/// ```
/// use cascade_quorum::majority_threshold;
///
/// assert_eq!(majority_threshold(4), 3);
/// assert_eq!(majority_threshold(12), 7);
/// ```
pub const fn majority_threshold(members: usize) -> usize {
    members / 2 + 1
}

/// Check if a vote count is a strict majority of `members`.
pub const fn meets_threshold(votes: usize, members: usize) -> bool {
    votes >= majority_threshold(members)
}

/// How many more valid votes are needed.
pub const fn votes_needed(votes: usize, members: usize) -> usize {
    let threshold = majority_threshold(members);
    if votes >= threshold {
        0
    } else {
        threshold - votes
    }
}
