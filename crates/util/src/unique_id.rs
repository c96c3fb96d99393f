use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a process-unique identifier with the given prefix.
///
/// All prefixes share one counter, so ids never repeat across prefixes.
///
/// # Examples
///
/// ```
/// use modelkit_util::unique_id;
///
/// let a = unique_id("mod");
/// let b = unique_id("mod");
/// assert!(a.starts_with("mod"));
/// assert_ne!(a, b);
/// ```
pub fn unique_id(prefix: &str) -> String {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{prefix}{id}")
}
