//! The one normalization rule shared by Vary-header parsing and key
//! derivation: case-fold and sort a multi-valued set, but leave a
//! single value untouched (`spec.md §4.6`).
//!
//! Callers control splitting (comma-separated `Vary` header vs. an
//! already-discrete list of query keys) — this helper only orders and
//! case-folds whatever collection it is handed.

/// `f(f(x)) = f(x)`; `f({a, b}) = f({b, a})` — see `spec.md §8`.
pub fn get_order_casing_normalized_string_values(values: &[String]) -> Vec<String> {
    if values.len() > 1 {
        let mut upper: Vec<String> =
            values.iter().map(|v| v.to_ascii_uppercase()).collect();
        upper.sort();
        upper
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_untouched() {
        let v = vec!["accept-encoding".to_string()];
        assert_eq!(
            get_order_casing_normalized_string_values(&v),
            vec!["accept-encoding".to_string()]
        );
    }

    #[test]
    fn multi_value_upper_and_sorted() {
        let v = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            get_order_casing_normalized_string_values(&v),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn idempotent() {
        let v = vec!["b".to_string(), "a".to_string()];
        let once = get_order_casing_normalized_string_values(&v);
        let twice = get_order_casing_normalized_string_values(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn commutative_with_input_order() {
        let ab = vec!["a".to_string(), "b".to_string()];
        let ba = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            get_order_casing_normalized_string_values(&ab),
            get_order_casing_normalized_string_values(&ba)
        );
    }
}
