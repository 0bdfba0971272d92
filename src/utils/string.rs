//! UTF-8 safe text previews.
//!
//! Message content is often CJK or otherwise multibyte, so previews are cut
//! by chars, never by byte index.

/// Return a one-line preview of `s`, at most `n` characters plus `...`.
///
/// Newlines and runs of whitespace collapse to single spaces.
///
/// # Example
/// ```
/// use taskclaw::utils::string::preview;
///
/// assert_eq!(preview("hello\nworld", 20), "hello world");
/// assert_eq!(preview("任务代理核心", 2), "任务...");
/// ```
pub fn preview(s: &str, n: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: String = flat.chars().take(n).collect();
    if flat.chars().count() > n {
        out.push_str("...");
    }
    out
}
