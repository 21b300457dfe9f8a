//! Property-based tests for partial name filling.
//!
//! These tests use proptest to generate random scope and query segments
//! and verify that invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::resolver::fill_partial_name;
    use proptest::prelude::*;

    /// Strategy for a single name segment, possibly empty.
    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "[a-z][a-z0-9_-]{0,8}",
            1 => Just(String::new()),
        ]
    }

    /// Strategy for a list of segments.
    fn segments(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(segment(), 1..=max)
    }

    /// Strategy for non-empty segments, used for scopes.
    fn scope_segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z][a-z0-9_-]{0,8}", 0..4)
    }

    proptest! {
        /// Filling is deterministic.
        #[test]
        fn fill_is_deterministic(partial in segments(4), scope in scope_segments()) {
            prop_assert_eq!(
                fill_partial_name(&partial, &scope),
                fill_partial_name(&partial, &scope)
            );
        }

        /// Non-empty query segments always survive filling unchanged.
        #[test]
        fn fill_preserves_given_segments(partial in segments(4), scope in scope_segments()) {
            let filled = fill_partial_name(&partial, &scope);
            let offset = filled.len() - partial.len();
            for (index, part) in partial.iter().enumerate() {
                if !part.is_empty() {
                    prop_assert_eq!(&filled[offset + index], part);
                }
            }
        }

        /// A multi-segment query never changes length; a single-segment
        /// query grows by the scope depth.
        #[test]
        fn fill_output_length(partial in segments(4), scope in scope_segments()) {
            let filled = fill_partial_name(&partial, &scope);
            if partial.len() == 1 {
                prop_assert_eq!(filled.len(), scope.len() + 1);
            } else {
                prop_assert_eq!(filled.len(), partial.len());
            }
        }

        /// Every filled segment comes either from the query or from the
        /// matching position of the scope.
        #[test]
        fn fill_only_uses_query_or_scope(partial in segments(4), scope in scope_segments()) {
            let filled = fill_partial_name(&partial, &scope);
            let offset = filled.len() - partial.len();
            for (index, part) in filled.iter().enumerate() {
                let from_query = index >= offset && *part == partial[index - offset];
                let from_scope = scope.get(index) == Some(part);
                let unfillable = part.is_empty();
                prop_assert!(from_query || from_scope || unfillable);
            }
        }

        /// An all-empty multi-segment query copies the scope prefix.
        #[test]
        fn fill_all_empty_copies_scope(len in 2usize..4, scope in scope_segments()) {
            let partial = vec![String::new(); len];
            let filled = fill_partial_name(&partial, &scope);
            for (index, part) in filled.iter().enumerate() {
                match scope.get(index) {
                    Some(expected) => prop_assert_eq!(part, expected),
                    None => prop_assert!(part.is_empty()),
                }
            }
        }

        /// Filling with an empty scope is the identity for multi-segment
        /// queries.
        #[test]
        fn fill_empty_scope_is_identity(partial in segments(4)) {
            prop_assume!(partial.len() > 1);
            prop_assert_eq!(fill_partial_name(&partial, &[]), partial);
        }
    }
}
