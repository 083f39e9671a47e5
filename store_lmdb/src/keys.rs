//! Composite key construction.
//!
//! Identifiers are variable-length strings, so key segments are joined
//! with a 0x00 separator (platform ids never contain NUL). Timestamps are
//! big-endian so lexicographic key order matches chronological order.

use warden_types::{GroupId, PrincipalId, Timestamp};

pub(crate) const SEP: u8 = 0x00;

/// `group ++ 0x00 ++ principal`
pub(crate) fn principal_key(group: &GroupId, principal: &PrincipalId) -> Vec<u8> {
    join(&[group.as_str().as_bytes(), principal.as_str().as_bytes()])
}

/// `group ++ 0x00 ++ be64(deadline) ++ 0x00 ++ principal`
pub(crate) fn deadline_key(
    group: &GroupId,
    deadline: Timestamp,
    principal: &PrincipalId,
) -> Vec<u8> {
    join(&[
        group.as_str().as_bytes(),
        &deadline.as_millis().to_be_bytes(),
        principal.as_str().as_bytes(),
    ])
}

/// `group ++ 0x00 ++ be64(timestamp) ++ be64(seq)`
pub(crate) fn log_key(group: &GroupId, timestamp: Timestamp, seq: u64) -> Vec<u8> {
    let mut key = join(&[
        group.as_str().as_bytes(),
        &timestamp.as_millis().to_be_bytes(),
    ]);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// `group ++ 0x00 ++ principal ++ 0x00 ++ alias_name`
pub(crate) fn alias_key(group: &GroupId, principal: &PrincipalId, alias_name: &str) -> Vec<u8> {
    join(&[
        group.as_str().as_bytes(),
        principal.as_str().as_bytes(),
        alias_name.as_bytes(),
    ])
}

/// `group ++ 0x00 ++ issue_key`
pub(crate) fn throttle_key(group: &GroupId, issue_key: &str) -> Vec<u8> {
    join(&[group.as_str().as_bytes(), issue_key.as_bytes()])
}

/// `group ++ 0x00` — prefix covering everything in the group.
pub(crate) fn group_prefix(group: &GroupId) -> Vec<u8> {
    let mut p = group.as_str().as_bytes().to_vec();
    p.push(SEP);
    p
}

pub(crate) fn join(segments: &[&[u8]]) -> Vec<u8> {
    let len = segments.iter().map(|s| s.len()).sum::<usize>() + segments.len();
    let mut key = Vec::with_capacity(len);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(segment);
    }
    key
}

/// Increment a prefix so it becomes the exclusive upper bound for a
/// range scan. Trailing 0xff bytes are dropped before incrementing.
pub(crate) fn increment_prefix(prefix: &mut Vec<u8>) {
    while let Some(last) = prefix.last_mut() {
        if *last == 0xff {
            prefix.pop();
        } else {
            *last += 1;
            return;
        }
    }
}
