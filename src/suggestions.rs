//! # Error Suggestions
//!
//! Helpers for actionable error messages: errors should say what went
//! wrong AND how to fix it. The name matcher backs the "did you mean"
//! hints attached to unresolved node queries.

use std::path::Path;

/// Generate an error for a missing project configuration file.
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create a modbuild.yaml file in your project root\n\
         hint: Use -c/--config to specify a different path\n\
         hint: Set the MODBUILD_CONFIG environment variable",
        path = path.display()
    )
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
pub fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a_len {
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[a_len][b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_includes_hints() {
        let error = config_not_found(Path::new("/some/path/modbuild.yaml"));
        let message = error.to_string();

        assert!(message.contains("Configuration file not found"));
        assert!(message.contains("/some/path/modbuild.yaml"));
        assert!(message.contains("hint:"));
        assert!(message.contains("-c/--config"));
        assert!(message.contains("MODBUILD_CONFIG"));
    }

    #[test]
    fn test_find_similar_matches_typo() {
        let candidates = ["baudrate", "parity", "stopbits"];
        assert_eq!(find_similar("baudrat", &candidates), Some("baudrate"));
        assert_eq!(find_similar("parrity", &candidates), Some("parity"));
    }

    #[test]
    fn test_find_similar_rejects_distant_input() {
        let candidates = ["baudrate", "parity"];
        assert_eq!(find_similar("frequency", &candidates), None);
    }

    #[test]
    fn test_find_similar_prefers_closest() {
        let candidates = ["uart", "usart"];
        assert_eq!(find_similar("uartt", &candidates), Some("uart"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("uart", "uart"), 0);
        assert_eq!(edit_distance("uart", "usart"), 1);
        assert_eq!(edit_distance("spi", "i2c"), 3);
    }
}
