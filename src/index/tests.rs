#[cfg(test)]
mod tests {
    use crate::index::ObjectId;
    use crate::index::pattern::{AffixPattern, split_query};
    use crate::index::store::MetadataStore;

    /// Microscopy metadata from the acquisition-pipeline examples.
    fn corpus() -> Vec<(&'static str, &'static str, ObjectId)> {
        vec![
            ("FILE_PATH", "/data/488nm.tif", 1001),
            ("FILE_PATH", "/data/561nm.tif", 1002),
            ("StageX", "100.00", 1001),
            ("StageY", "200.00", 1001),
            ("StageZ", "50.00", 1001),
            ("StageX", "300.00", 1002),
            ("StageY", "400.00", 1002),
            ("StageZ", "75.00", 1002),
            ("creation_date", "2023-05-26", 1001),
            ("creation_date", "2023-06-15", 1002),
            ("microscope", "LLSM-1", 1001),
            ("microscope", "LLSM-2", 1002),
            ("AUXILIARY_FILE", "/data/488nm_metadata.json", 1001),
            ("AUXILIARY_FILE", "/data/561nm_metadata.json", 1002),
        ]
    }

    fn populated_store(dir: &std::path::Path, suffix_mode: bool) -> MetadataStore {
        let mut store = MetadataStore::new(0, dir, suffix_mode).expect("store");
        for (key, value, id) in corpus() {
            store.add_indexed_key(key, value, id);
        }
        store
    }

    /// Reference semantics: scan every record with plain string matching.
    fn brute_force(query: &str) -> Vec<ObjectId> {
        let (key_part, value_part) = split_query(query);
        let key_pattern = AffixPattern::parse(&key_part);
        let value_pattern = AffixPattern::parse(&value_part);

        let mut ids: Vec<ObjectId> = corpus()
            .into_iter()
            .filter(|(key, value, _)| key_pattern.matches(key) && value_pattern.matches(value))
            .map(|(_, _, id)| id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    // ============================================================
    // QUERY-SHAPE COMPLETENESS (trie vs. brute force)
    // ============================================================

    #[test]
    fn test_all_shapes_match_brute_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);

        let queries = [
            "StageX=300.00",
            "Stage*=*",
            "*PATH=*tif",
            "*FILE*=*metadata*",
            "Stage*=*00",
            "*=*488*",
            "FILE_PATH=*",
            "*=*.tif",
            "*Z=*",
            "microscope=LLSM-1",
            "*scope=LLSM*",
            "nonexistent=*",
            "Stage*=9*",
        ];

        for query in queries {
            assert_eq!(
                store.execute_affix_query(query),
                brute_force(query),
                "query '{}'",
                query
            );
        }
    }

    // ============================================================
    // LITERAL END-TO-END SCENARIOS
    // ============================================================

    #[test]
    fn test_exact_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);
        assert_eq!(store.execute_affix_query("StageX=300.00"), vec![1002]);
    }

    #[test]
    fn test_suffix_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);
        assert_eq!(store.execute_affix_query("*PATH=*tif"), vec![1001, 1002]);
    }

    #[test]
    fn test_infix_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");
        store.add_indexed_key("AUXILIARY_FILE", "/data/488nm_metadata.json", 1001);
        assert_eq!(store.execute_affix_query("*FILE*=*metadata*"), vec![1001]);
    }

    #[test]
    fn test_wildcard_key_with_infix_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");
        store.add_indexed_key("microscope", "LLSM-1", 1001);
        store.add_indexed_key("microscope", "LLSM-2", 1002);
        store.add_indexed_key("FILE_PATH", "/data/488nm.tif", 1001);
        assert_eq!(store.execute_affix_query("*=*488*"), vec![1001]);
    }

    // ============================================================
    // SUFFIX-TREE MODE
    // ============================================================

    #[test]
    fn test_suffix_mode_off_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), false);

        assert!(store.execute_affix_query("*PATH=*").is_empty());
        assert!(store.execute_affix_query("*FILE*=*").is_empty());
        assert!(store.execute_affix_query("FILE_PATH=*tif").is_empty());

        // Exact, prefix and wildcard shapes are unaffected.
        assert_eq!(store.execute_affix_query("StageX=300.00"), vec![1002]);
        assert_eq!(store.execute_affix_query("Stage*=*"), vec![1001, 1002]);
        assert_eq!(store.execute_affix_query("*=*"), vec![1001, 1002]);
    }

    #[test]
    fn test_shared_suffix_terminals_stay_separate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");

        // "AX" and "BX" share the suffix terminal "X"; a suffix query for
        // "AX" must not leak ids recorded under "BX".
        store.add_indexed_key("k", "AX", 1);
        store.add_indexed_key("k", "BX", 2);

        assert_eq!(store.execute_affix_query("k=*AX"), vec![1]);
        assert_eq!(store.execute_affix_query("k=*BX"), vec![2]);
        assert_eq!(store.execute_affix_query("k=*X"), vec![1, 2]);

        // Prefix and exact shapes ignore suffix echoes entirely.
        assert!(store.execute_affix_query("k=X*").is_empty());
        assert!(store.execute_affix_query("k=X").is_empty());
        assert_eq!(store.execute_affix_query("k=AX"), vec![1]);
    }

    #[test]
    fn test_value_that_is_also_a_suffix_of_another() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");

        // "X" is both a value in its own right and a suffix of "AX"; the
        // shared terminal must not blend the two objects' ids.
        store.add_indexed_key("k", "X", 1);
        store.add_indexed_key("k", "AX", 2);

        assert_eq!(store.execute_affix_query("k=X"), vec![1]);
        assert_eq!(store.execute_affix_query("k=X*"), vec![1]);
        assert_eq!(store.execute_affix_query("k=*X"), vec![1, 2]);
        assert_eq!(store.execute_affix_query("k=*AX"), vec![2]);
    }

    #[test]
    fn test_double_star_is_wildcard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);
        assert_eq!(
            store.execute_affix_query("**=**"),
            store.execute_affix_query("*=*")
        );
    }

    // ============================================================
    // MUTATION
    // ============================================================

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");

        store.add_indexed_key("StageX", "300.00", 1002);
        store.add_indexed_key("StageX", "300.00", 1002);

        assert_eq!(store.execute_affix_query("StageX=300.00"), vec![1002]);
        assert_eq!(store.execute_affix_query("Stage*=*"), vec![1002]);
    }

    #[test]
    fn test_delete_removes_from_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = populated_store(dir.path(), true);

        store.remove_indexed_key("StageX", "300.00", 1002);

        assert!(store.execute_affix_query("StageX=300.00").is_empty());
        // Other records of the same object survive.
        assert_eq!(store.execute_affix_query("StageY=400.00"), vec![1002]);
    }

    #[test]
    fn test_delete_last_record_drops_object_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(0, dir.path(), true).expect("store");

        store.add_indexed_key("k", "v", 7);
        assert_eq!(store.object_count(), 1);

        store.remove_indexed_key("k", "v", 7);
        assert_eq!(store.object_count(), 0);
        assert!(store.execute_affix_query("k=v").is_empty());

        // Known limitation: the trie keeps its nodes, so the key still
        // looks present to the early capability check.
        assert!(store.can_handle_query("k=v"));
    }

    #[test]
    fn test_delete_unknown_record_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = populated_store(dir.path(), true);

        store.remove_indexed_key("no_such_key", "none", 9999);
        assert_eq!(store.execute_affix_query("Stage*=*"), vec![1001, 1002]);
    }

    // ============================================================
    // CAPABILITY CHECK
    // ============================================================

    #[test]
    fn test_can_handle_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);

        assert!(store.can_handle_query("StageX=300.00"));
        assert!(store.can_handle_query("Stage*=*"));
        assert!(store.can_handle_query("*PATH=*"));
        assert!(store.can_handle_query("*FILE*=*"));
        assert!(store.can_handle_query("*=anything"));

        assert!(!store.can_handle_query("Temperature=21"));
        assert!(!store.can_handle_query("Zz*=*"));
        assert!(!store.can_handle_query("*QQQQ=*"));
    }

    #[test]
    fn test_can_handle_suffix_without_suffix_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), false);
        assert!(!store.can_handle_query("*PATH=*"));
    }

    // ============================================================
    // STRUCTURED QUERIES THROUGH THE STORE
    // ============================================================

    #[test]
    fn test_multi_condition_query_execution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);

        let results = store
            .execute_query("StageX > 200.00 AND StageY < 500.00")
            .expect("parse");
        assert_eq!(results, vec![1002]);

        let results = store
            .execute_query("microscope = LLSM-1 OR StageX = 300.00")
            .expect("parse");
        assert_eq!(results, vec![1001, 1002]);
    }

    #[test]
    fn test_range_query_execution() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);

        let results = store
            .execute_query("StageX in range [50 to 200]")
            .expect("parse");
        assert_eq!(results, vec![1001]);

        let results = store
            .execute_query("creation_date in range [2023-05-01 to 2023-06-30]")
            .expect("parse");
        assert_eq!(results, vec![1001, 1002]);

        let results = store
            .execute_query("creation_date in range [2023-05-01 to 2023-05-31]")
            .expect("parse");
        assert_eq!(results, vec![1001]);
    }

    #[test]
    fn test_malformed_structured_query_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = populated_store(dir.path(), true);
        assert!(store.execute_query("StageX in range [oops]").is_err());
    }

    // ============================================================
    // CHECKPOINT / RECOVER
    // ============================================================

    #[test]
    fn test_checkpoint_recover_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");

        let store = populated_store(dir.path(), true);
        store.checkpoint().expect("checkpoint");

        let mut fresh = MetadataStore::new(0, dir.path(), true).expect("store");
        assert!(fresh.recover().expect("recover"));
        assert_eq!(fresh.object_count(), store.object_count());

        for query in ["StageX=300.00", "Stage*=*", "*PATH=*tif", "*FILE*=*metadata*"] {
            assert_eq!(
                fresh.execute_affix_query(query),
                store.execute_affix_query(query),
                "query '{}'",
                query
            );
        }
    }

    #[test]
    fn test_recover_refuses_foreign_server_id() {
        let dir = tempfile::tempdir().expect("tempdir");

        let store = populated_store(dir.path(), true);
        store.checkpoint().expect("checkpoint");

        // Same directory layout, different identity.
        let checkpoint = dir.path().join("server_0").join("index.dat");
        let foreign_dir = dir.path().join("server_3");
        std::fs::create_dir_all(&foreign_dir).expect("mkdir");
        std::fs::copy(&checkpoint, foreign_dir.join("index.dat")).expect("copy");

        let mut foreign = MetadataStore::new(3, dir.path(), true).expect("store");
        assert!(!foreign.recover().expect("recover refusal"));
        assert_eq!(foreign.object_count(), 0);
    }

    #[test]
    fn test_recover_without_checkpoint_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = MetadataStore::new(1, dir.path(), true).expect("store");
        assert!(store.recover().is_err());
    }
}
