/// Keeps at most `max_words` whitespace separated words.
///
/// # Examples
///
/// ```
/// use sketch_tutor::text_util::truncate_words;
///
/// assert_eq!(truncate_words("  how do  planes fly  ", 2), "how do");
/// assert_eq!(truncate_words("hi", 5), "hi");
/// ```
#[inline]
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trims a model-written title and strips surrounding quotes.
#[inline]
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.trim();
    loop {
        let stripped = title
            .strip_prefix(['"', '\'', '`', '“', '‘'])
            .and_then(|t| t.strip_suffix(['"', '\'', '`', '”', '’']));
        match stripped {
            Some(inner) => title = inner.trim(),
            None => break,
        }
    }
    title.trim_end_matches('.').trim().to_string()
}
