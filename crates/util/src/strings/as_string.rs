/// Quote text as a JSON string literal.
///
/// Used wherever an offending value is shown to a human, so that empty
/// strings and strings with whitespace stay visible.
///
/// # Examples
///
/// ```
/// use modelkit_util::strings::as_string;
///
/// assert_eq!(as_string("hello"), "\"hello\"");
/// assert_eq!(as_string(""), "\"\"");
/// ```
pub fn as_string(s: &str) -> String {
    // serde_json always succeeds on a plain string
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}
