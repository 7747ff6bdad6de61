//! Helpers for pointing at a position inside a script.

/// 1-based line and column of byte `offset` in `data`. Offsets past the end
/// point at the end.
pub fn line_column_from_offset(data: &str, offset: usize) -> (usize, usize) {
    let bytes = &data.as_bytes()[..offset.min(data.len())];
    let line = bytes.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    (line, bytes.len() - line_start + 1)
}

/// Up to `before` lines before and `after` lines after the 1-based `line`,
/// joined by newlines. With `numbered`, each line is prefixed with its
/// right-aligned number.
pub fn lines_around(data: &str, line: usize, before: usize, after: usize, numbered: bool) -> String {
    let first = line.saturating_sub(before).max(1);
    let last = line.saturating_add(after);
    let selected: Vec<(usize, &str)> = data
        .lines()
        .enumerate()
        .map(|(idx, text)| (idx + 1, text))
        .filter(|(number, _)| (first..=last).contains(number))
        .collect();

    let width = selected
        .last()
        .map_or(1, |(number, _)| number.to_string().len());
    selected
        .iter()
        .map(|(number, text)| {
            if numbered {
                format!("{number:>width$}: {text}")
            } else {
                (*text).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
