/// Group every dependency belongs to when it names none.
pub const DEFAULT_GROUP: &str = "default";

/// Canonical text form of a declaration, the input to fingerprinting.
///
/// Every line is trimmed and internal whitespace runs collapse to a single
/// space. Blank lines are dropped. Line order is preserved, so reordering
/// dependency lines changes the result while re-indenting does not.
pub fn normalize_declaration_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(first);
        for word in words {
            out.push(' ');
            out.push_str(word);
        }
    }
    out
}

/// Trim, drop empties, sort and deduplicate group tags. An empty input
/// yields the default group.
pub fn normalize_groups(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    if out.is_empty() {
        out.push(DEFAULT_GROUP.to_owned());
    }
    out
}
