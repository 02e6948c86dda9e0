//! Identifier normalization for the template value tree.

const SEPARATORS: [char; 5] = ['-', '_', '.', ' ', '/'];

/// Turn a namespace or object name into a template identifier
///
/// Lower-cases the input, strips separators (`-`, `_`, `.`, space, `/`) and
/// upper-cases the first letter following each separator:
/// `team-settings` becomes `teamSettings`, `Prod_EU.v2` becomes `prodEuV2`.
#[must_use]
pub fn identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (index, segment) in raw
        .split(|c| SEPARATORS.contains(&c))
        .filter(|s| !s.is_empty())
        .enumerate()
    {
        let lowered = segment.to_lowercase();
        if index == 0 {
            out.push_str(&lowered);
            continue;
        }
        let mut chars = lowered.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
