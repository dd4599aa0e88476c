use std::sync::LockResult;

use tracing::warn;

/// Take the guard out of a lock result, recovering from poisoning.
///
/// Registry entries and captured diagnostic lines stay usable after a panic
/// elsewhere; the purge path never depends on them being complete.
pub(crate) fn recover<G>(result: LockResult<G>, owner: &'static str, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "purgekeeper::lock",
            owner,
            op,
            "purge lock poisoned, continuing with recovered state"
        );
        poisoned.into_inner()
    })
}
