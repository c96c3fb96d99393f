/// Cut `s` down to at most `max_chars` characters, marking the cut with `...`.
///
/// # Examples
///
/// ```
/// use modelkit_util::strings::truncate;
///
/// assert_eq!(truncate("abcdef", 4), "a...");
/// assert_eq!(truncate("abc", 4), "abc");
/// ```
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
