//! Edit-distance matching between query tokens and document stems

use std::collections::HashSet;

/// Largest edit distance still considered a match
pub const MAX_DISTANCE: usize = 2;

/// Levenshtein distance over chars, keeping a single DP row sized by the shorter input
pub fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return long.len();
    }

    let mut costs: Vec<usize> = (0..=short.len()).collect();

    for (i, lc) in long.iter().enumerate() {
        let mut prev = costs[0];
        costs[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let temp = costs[j + 1];
            costs[j + 1] = if lc == sc {
                prev
            } else {
                prev.min(costs[j]).min(costs[j + 1]) + 1
            };
            prev = temp;
        }
    }

    costs[short.len()]
}

/// True if some stem is within `MAX_DISTANCE` edits of `token` and the distance is
/// smaller than the token itself, so tiny tokens cannot match anything trivially
pub fn is_similar(token: &str, stems: &HashSet<String>) -> bool {
    let token_len = token.chars().count();
    stems.iter().any(|stem| {
        let distance = levenshtein(token, stem);
        distance <= MAX_DISTANCE && distance < token_len
    })
}
