//! Effective ids.
//!
//! A control inside repeats is identified by its static id followed by the
//! 1-based iteration of each enclosing repeat, outermost first:
//! `price·2-1` is `price` in iteration 1 of an inner repeat inside iteration
//! 2 of an outer one.

use smallvec::SmallVec;

/// Separates the static id from the iteration suffix.
pub const REPEAT_SEPARATOR: char = '\u{b7}';
/// Separates iterations within the suffix.
pub const INDEX_SEPARATOR: char = '-';

/// Iterations of the enclosing repeats, outermost first.
pub type Iterations = SmallVec<usize, 4>;

/// Build an effective id from a static id and enclosing iterations.
pub fn effective_id(static_id: &str, iterations: &[usize]) -> String {
    if iterations.is_empty() {
        return static_id.to_owned();
    }
    let mut id = String::with_capacity(static_id.len() + iterations.len() * 3);
    id.push_str(static_id);
    id.push(REPEAT_SEPARATOR);
    id.push_str(&suffix(iterations));
    id
}

/// `2-1` for `[2, 1]`.
pub fn suffix(iterations: &[usize]) -> String {
    iterations
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(&INDEX_SEPARATOR.to_string())
}

pub fn static_id(effective_id: &str) -> &str {
    effective_id
        .split_once(REPEAT_SEPARATOR)
        .map_or(effective_id, |(static_id, _)| static_id)
}

/// The iteration suffix, without the separator. Empty outside repeats.
pub fn suffix_of(effective_id: &str) -> &str {
    effective_id
        .split_once(REPEAT_SEPARATOR)
        .map_or("", |(_, suffix)| suffix)
}

/// Parse the iterations of an effective id. Malformed suffixes yield `None`.
pub fn iterations(effective_id: &str) -> Option<Iterations> {
    let suffix = suffix_of(effective_id);
    if suffix.is_empty() {
        return Some(Iterations::new());
    }
    suffix
        .split(INDEX_SEPARATOR)
        .map(|part| part.parse().ok())
        .collect()
}

/// Whether an effective id carries an iteration suffix.
pub fn is_repeated(effective_id: &str) -> bool {
    effective_id.contains(REPEAT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if ids do not round-trip.
    #[test]
    fn effective_ids_compose_and_split() {
        let id = effective_id("price", &[2, 1]);
        assert_eq!(id, "price\u{b7}2-1");
        assert_eq!(static_id(&id), "price");
        assert_eq!(suffix_of(&id), "2-1");
        assert_eq!(iterations(&id).unwrap().as_slice(), &[2, 1]);
        assert!(is_repeated(&id));

        assert_eq!(effective_id("total", &[]), "total");
        assert!(iterations("total").unwrap().is_empty());
        assert_eq!(iterations("total\u{b7}x"), None);
    }
}
