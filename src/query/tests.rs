#[cfg(test)]
mod tests {
    use crate::query::condition::{Condition, ConditionOp, MultiConditionQuery};
    use crate::query::range::RangeQuery;
    use crate::query::is_structured;

    fn records(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ============================================================
    // CONDITION PARSING
    // ============================================================

    #[test]
    fn test_parse_operators() {
        let cases = [
            ("size >= 10", ConditionOp::GreaterEqual),
            ("size <= 10", ConditionOp::LessEqual),
            ("state != done", ConditionOp::NotEquals),
            ("name ~= LLSM-[0-9]+", ConditionOp::RegexMatch),
            ("path contains data", ConditionOp::Contains),
            ("path startsWith /data", ConditionOp::StartsWith),
            ("path endsWith .tif", ConditionOp::EndsWith),
            ("size > 10", ConditionOp::GreaterThan),
            ("size < 10", ConditionOp::LessThan),
            ("name = value", ConditionOp::Equals),
        ];

        for (input, expected_op) in cases {
            let condition = Condition::parse(input).expect(input);
            assert_eq!(condition.op, expected_op, "input '{}'", input);
        }
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let condition = Condition::parse("  StageX  =  300.00  ").expect("parse");
        assert_eq!(condition.key, "StageX");
        assert_eq!(condition.value, "300.00");
    }

    #[test]
    fn test_parse_without_operator_fails() {
        assert!(Condition::parse("no operator here at all").is_err());
    }

    // ============================================================
    // CONDITION MATCHING
    // ============================================================

    #[test]
    fn test_numeric_comparison_beats_lexicographic() {
        let condition = Condition::parse("size > 20").expect("parse");
        // Lexicographically "100" < "20"; numerically 100 > 20.
        assert!(condition.matches("size", "100"));
        assert!(!condition.matches("size", "7"));
    }

    #[test]
    fn test_lexicographic_fallback() {
        let condition = Condition::parse("name > beta").expect("parse");
        assert!(condition.matches("name", "gamma"));
        assert!(!condition.matches("name", "alpha"));
    }

    #[test]
    fn test_key_wildcards_in_conditions() {
        let condition = Condition::parse("Stage* = 300.00").expect("parse");
        assert!(condition.matches("StageX", "300.00"));
        assert!(condition.matches("StageY", "300.00"));
        assert!(!condition.matches("Position", "300.00"));
    }

    #[test]
    fn test_value_wildcards_for_equality() {
        let equals = Condition::parse("path = *tif").expect("parse");
        assert!(equals.matches("path", "/data/488nm.tif"));
        assert!(!equals.matches("path", "/data/488nm.json"));

        let not_equals = Condition::parse("path != *tif").expect("parse");
        assert!(!not_equals.matches("path", "/data/488nm.tif"));
        assert!(not_equals.matches("path", "/data/488nm.json"));
    }

    #[test]
    fn test_regex_requires_full_match() {
        let condition = Condition::parse("name ~= LLSM-[0-9]").expect("parse");
        assert!(condition.matches("name", "LLSM-1"));
        assert!(!condition.matches("name", "XLLSM-1"));
        assert!(!condition.matches("name", "LLSM-1-extra"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let condition = Condition::parse("name ~= [unclosed").expect("parse");
        assert!(!condition.matches("name", "[unclosed"));
    }

    // ============================================================
    // MULTI-CONDITION EVALUATION
    // ============================================================

    #[test]
    fn test_and_requires_both() {
        let query = MultiConditionQuery::parse("StageX > 200 AND microscope = LLSM-2")
            .expect("parse");

        assert!(query.matches(&records(&[("StageX", "300"), ("microscope", "LLSM-2")])));
        assert!(!query.matches(&records(&[("StageX", "100"), ("microscope", "LLSM-2")])));
        assert!(!query.matches(&records(&[("StageX", "300"), ("microscope", "LLSM-1")])));
    }

    #[test]
    fn test_or_requires_either() {
        let query =
            MultiConditionQuery::parse("StageX = 100 OR StageX = 300").expect("parse");

        assert!(query.matches(&records(&[("StageX", "100")])));
        assert!(query.matches(&records(&[("StageX", "300")])));
        assert!(!query.matches(&records(&[("StageX", "200")])));
    }

    #[test]
    fn test_evaluation_is_left_to_right_with_short_circuit() {
        // No precedence: a satisfied OR short-circuits the whole chain,
        // so the trailing AND is never consulted.
        let query = MultiConditionQuery::parse("a = 1 OR b = 2 AND c = 3").expect("parse");
        assert!(query.matches(&records(&[("a", "1"), ("c", "999")])));

        // With the first condition false, evaluation continues.
        assert!(!query.matches(&records(&[("a", "0"), ("b", "2"), ("c", "999")])));
        assert!(query.matches(&records(&[("a", "0"), ("b", "2"), ("c", "3")])));
    }

    #[test]
    fn test_condition_matches_any_record_of_an_object() {
        // The object has several records under the same key; one
        // satisfying record is enough.
        let query = MultiConditionQuery::parse("tag = blue").expect("parse");
        assert!(query.matches(&records(&[("tag", "red"), ("tag", "blue")])));
    }

    #[test]
    fn test_display_round_trip() {
        let query = MultiConditionQuery::parse("StageX >= 100 AND StageX <= 300")
            .expect("parse");
        assert_eq!(query.to_string(), "StageX >= 100 AND StageX <= 300");
    }

    // ============================================================
    // RANGE QUERIES
    // ============================================================

    #[test]
    fn test_numeric_range_parse_and_bounds() {
        let range = RangeQuery::parse("StageX in range [100 to 300]").expect("parse");
        assert_eq!(range.key(), "StageX");
        assert!(!range.is_date_range());

        // Bounds are inclusive.
        assert!(range.is_in_range("StageX", "100"));
        assert!(range.is_in_range("StageX", "300"));
        assert!(range.is_in_range("StageX", "250.5"));
        assert!(!range.is_in_range("StageX", "99.99"));
        assert!(!range.is_in_range("StageX", "301"));

        // Wrong key, and non-numeric values, never match.
        assert!(!range.is_in_range("StageY", "200"));
        assert!(!range.is_in_range("StageX", "not-a-number"));
    }

    #[test]
    fn test_negative_numeric_range() {
        let range = RangeQuery::parse("offset in range [-10 to 10]").expect("parse");
        assert!(!range.is_date_range());
        assert!(range.is_in_range("offset", "-5"));
        assert!(!range.is_in_range("offset", "-11"));
    }

    #[test]
    fn test_date_range_default_format() {
        let range =
            RangeQuery::parse("creation_date in range [2023-05-01 to 2023-06-30]").expect("parse");
        assert!(range.is_date_range());

        assert!(range.is_in_range("creation_date", "2023-05-26"));
        assert!(range.is_in_range("creation_date", "2023-06-30"));
        assert!(!range.is_in_range("creation_date", "2023-07-01"));
        assert!(!range.is_in_range("creation_date", "definitely not a date"));
    }

    #[test]
    fn test_date_range_slash_format() {
        let range =
            RangeQuery::parse("acquired in range [05/01/2023 to 06/30/2023]").expect("parse");
        assert!(range.is_date_range());
        assert!(range.is_in_range("acquired", "05/26/2023"));
        assert!(!range.is_in_range("acquired", "07/01/2023"));
    }

    #[test]
    fn test_date_range_day_first_format() {
        let range =
            RangeQuery::parse("acquired in range [01-05-2023 to 30-06-2023]").expect("parse");
        assert!(range.is_date_range());
        assert!(range.is_in_range("acquired", "26-05-2023"));
        assert!(!range.is_in_range("acquired", "01-07-2023"));
    }

    #[test]
    fn test_range_with_key_wildcard() {
        let range = RangeQuery::parse("Stage* in range [0 to 500]").expect("parse");
        assert!(range.is_in_range("StageX", "300"));
        assert!(range.is_in_range("StageZ", "75"));
        assert!(!range.is_in_range("microscope", "300"));
    }

    #[test]
    fn test_malformed_range_is_an_error() {
        assert!(RangeQuery::parse("StageX in range [100]").is_err());
        assert!(RangeQuery::parse("StageX in range 100 to 300").is_err());
        assert!(RangeQuery::parse("in range [1 to 2").is_err());
        // Mixed kinds: not numeric, not a known date layout.
        assert!(RangeQuery::parse("x in range [abc to xyz]").is_err());
    }

    #[test]
    fn test_range_lowers_to_condition_pair() {
        let range = RangeQuery::parse("StageX in range [100 to 300]").expect("parse");
        let lowered = range.to_multi_condition_query();

        assert_eq!(lowered.conditions().len(), 2);
        assert!(lowered.matches(&records(&[("StageX", "200")])));
        assert!(!lowered.matches(&records(&[("StageX", "301")])));
    }

    // ============================================================
    // GRAMMAR DETECTION
    // ============================================================

    #[test]
    fn test_is_structured() {
        assert!(is_structured("StageX in range [100 to 300]"));
        assert!(is_structured("a = 1 AND b = 2"));
        assert!(is_structured("size > 5"));
        assert!(is_structured("state != done"));

        // Plain affix queries stay on the trie path.
        assert!(!is_structured("StageX=300.00"));
        assert!(!is_structured("Stage*=*"));
        assert!(!is_structured("*FILE*=*metadata*"));
    }
}
