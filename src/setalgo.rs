//! Subsumption-driven set reductions.
//!
//! Both reductions keep the first occurrence among equal elements and
//! preserve input order otherwise, so results are deterministic.

/// Keep the elements not strictly subsumed by another element.
///
/// `subsumes(a, b)` must be reflexive and transitive.
pub fn most_general<T, F>(items: impl IntoIterator<Item = T>, subsumes: F) -> Vec<T>
where
    F: Fn(&T, &T) -> bool,
{
    let mut kept: Vec<T> = Vec::new();
    for candidate in items {
        if kept.iter().any(|k| subsumes(k, &candidate)) {
            continue;
        }
        kept.retain(|k| !subsumes(&candidate, k));
        kept.push(candidate);
    }
    kept
}

/// Keep the elements that strictly subsume no other element.
pub fn most_specific<T, F>(items: impl IntoIterator<Item = T>, subsumes: F) -> Vec<T>
where
    F: Fn(&T, &T) -> bool,
{
    let mut kept: Vec<T> = Vec::new();
    for candidate in items {
        if kept.iter().any(|k| subsumes(&candidate, k)) {
            continue;
        }
        kept.retain(|k| !subsumes(k, &candidate));
        kept.push(candidate);
    }
    kept
}
