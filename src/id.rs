//! IdNormaliser. Pure, no I/O.

/// canonical OpenAlex URL prefix stripped from every identifier at
/// extraction time, so every table stores and joins on the bare id.
pub const URL_PREFIX: &str = "https://openalex.org/";

/// strips [`URL_PREFIX`] from `raw` if present, otherwise returns `raw`
/// unchanged. Empty or absent input yields `None`. No case folding, no
/// trimming beyond the exact prefix match.
pub fn normalise(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.strip_prefix(URL_PREFIX)
            .unwrap_or(raw)
            .to_string(),
    )
}
