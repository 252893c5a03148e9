//! Offset-safe span substitution.

/// A span to replace in one text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Span<'a> {
    pub start: usize,
    pub end: usize,
    pub replacement: &'a str,
}

fn valid(text: &str, span: &Span<'_>) -> bool {
    span.start < span.end
        && span.end <= text.len()
        && text.is_char_boundary(span.start)
        && text.is_char_boundary(span.end)
}

/// Substitute `spans` into `text`, last span first.
///
/// Invalid spans are skipped. A span lying inside another span is skipped.
/// A span that overlaps an already-substituted region is clamped to end
/// where that region begins.
pub(crate) fn substitute(text: &str, mut spans: Vec<Span<'_>>) -> String {
    spans.retain(|s| {
        let ok = valid(text, s);
        if !ok {
            tracing::debug!(start = s.start, end = s.end, len = text.len(), "skipping invalid span");
        }
        ok
    });
    let inside_another: Vec<bool> = spans
        .iter()
        .enumerate()
        .map(|(i, s)| {
            spans.iter().enumerate().any(|(j, o)| {
                j != i
                    && o.start <= s.start
                    && s.end <= o.end
                    && ((o.start, o.end) != (s.start, s.end) || j < i)
            })
        })
        .collect();
    let mut spans: Vec<Span<'_>> = spans
        .into_iter()
        .zip(inside_another)
        .filter_map(|(s, inside)| (!inside).then_some(s))
        .collect();
    spans.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut out = text.to_string();
    // Start of the leftmost region substituted so far
    let mut floor = text.len();
    for span in spans {
        if span.start >= floor {
            continue;
        }
        out.replace_range(span.start..span.end.min(floor), span.replacement);
        floor = span.start;
    }
    out
}
