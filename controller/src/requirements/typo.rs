//! Levenshtein distance and nearest-well-known-label lookup, used by
//! [`super::Requirements::compatible`]'s allow-undefined mode to suggest a
//! correction for an unrecognised label key.

use karpenter_api::WELL_KNOWN_LABELS;

/// Classic O(n*m) edit distance, iterative two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// Returns the closest well-known label to `key` within edit distance 5, if any.
pub fn nearest_well_known_label(key: &str) -> Option<&'static str> {
    WELL_KNOWN_LABELS
        .iter()
        .map(|label| (*label, levenshtein(key, label)))
        .filter(|(_, dist)| *dist <= 5)
        .min_by_key(|(_, dist)| *dist)
        .map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        assert_eq!(levenshtein("zone", "zone"), 0);
    }

    #[test]
    fn single_edit_distance_one() {
        assert_eq!(levenshtein("zone", "zne"), 1);
        assert_eq!(levenshtein("zone", "zonee"), 1);
        assert_eq!(levenshtein("zone", "zona"), 1);
    }

    #[test]
    fn suggests_nearest_well_known_label_for_typo() {
        assert_eq!(
            nearest_well_known_label("karpenter.sh/nodepol"),
            Some("karpenter.sh/nodepool")
        );
    }

    #[test]
    fn no_suggestion_when_nothing_close() {
        assert_eq!(nearest_well_known_label("completely-unrelated-key-xyz"), None);
    }
}
