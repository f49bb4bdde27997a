#[cfg(test)]
mod tests {
    use crate::routing::router::DartRouter;
    use crate::routing::vnode::NUM_VIRTUAL_NODES;

    // ============================================================
    // VIRTUAL NODE SELECTION
    // ============================================================

    #[test]
    fn test_key_coverage() {
        let router = DartRouter::new(4, 0.1);

        // Every key, however odd, maps to a valid virtual node.
        let keys = [
            "StageX",
            "FILE_PATH",
            "creation_date",
            "microscope",
            "0numeric",
            "_underscore",
            "/path/like",
            "~tilde-start",
            "ünicode",
            "",
        ];
        for key in keys {
            let vnode_id = router.virtual_node_id(key);
            assert!((vnode_id as usize) < NUM_VIRTUAL_NODES, "key '{}'", key);
        }
    }

    #[test]
    fn test_virtual_node_selection_is_deterministic() {
        let a = DartRouter::new(8, 0.1);
        let b = DartRouter::new(8, 0.1);

        for key in ["StageX", "FILE_PATH", "temperature", "z"] {
            assert_eq!(a.virtual_node_id(key), b.virtual_node_id(key));
            assert_eq!(a.servers_for_key(key), b.servers_for_key(key));
        }
    }

    #[test]
    fn test_scan_order_prefers_single_char_prefixes() {
        let router = DartRouter::new(4, 0.1);

        // "StageX" is claimed by the 'S' node (ID order) even though a
        // two-character "St" node exists later in the pool.
        let vnode_id = router.virtual_node_id("StageX");
        assert_eq!(vnode_id, router.virtual_node_id("Sample"));
    }

    // ============================================================
    // REPLICA SELECTION
    // ============================================================

    #[test]
    fn test_default_ratio_four_servers() {
        let router = DartRouter::new(4, 0.1);

        // floor(4 * 0.1) = 0, clamped to the minimum of 1.
        assert_eq!(router.replication_factor(), 1);

        let servers = router.servers_for_key("StageX");
        assert_eq!(servers.len(), 2);
        assert_ne!(servers[0], servers[1]);
        for &server in &servers {
            assert!(server < 4);
        }
    }

    #[test]
    fn test_explicit_replication_factor() {
        let router = DartRouter::new(8, 0.1);

        let servers = router.servers_for_key_with_factor("StageX", 3);
        assert!(servers.len() <= 4);
        assert!(servers.len() >= 2);

        let mut unique = servers.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), servers.len());
    }

    // ============================================================
    // QUERY-SHAPE DISPATCH
    // ============================================================

    #[test]
    fn test_wildcard_query_fans_out_to_all() {
        let router = DartRouter::new(4, 0.1);
        assert_eq!(router.destination_servers("*=*488*"), vec![0, 1, 2, 3]);
        assert_eq!(router.destination_servers("*"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_exact_query_routes_like_key() {
        let router = DartRouter::new(4, 0.1);
        assert_eq!(
            router.destination_servers("StageX=300.00"),
            router.servers_for_key("StageX")
        );
    }

    #[test]
    fn test_suffix_query_routes_like_suffix_key() {
        let router = DartRouter::new(4, 0.1);
        assert_eq!(
            router.destination_servers("*PATH=*tif"),
            router.servers_for_key("PATH")
        );
    }

    #[test]
    fn test_prefix_query_covers_matching_vnodes() {
        let router = DartRouter::new(4, 0.1);

        let servers = router.servers_for_prefix_query("Stage");
        assert!(!servers.is_empty());

        // The 'S' node and the "St" nodes both satisfy the prefix
        // relation, and the catch-all node matches every query.
        let s_server = router.server_for_virtual_node(router.virtual_node_id("S"));
        assert!(servers.contains(&s_server));

        let mut unique = servers.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), servers.len());
    }

    #[test]
    fn test_infix_query_routes_like_prefix() {
        let router = DartRouter::new(4, 0.1);
        assert_eq!(
            router.destination_servers("*FILE*=*metadata*"),
            router.servers_for_prefix_query("FILE")
        );
    }

    // ============================================================
    // MAPPING PERSISTENCE & REMAP
    // ============================================================

    #[test]
    fn test_mapping_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dart_mapping.dat");

        let original = DartRouter::new(4, 0.1);
        original.save_mapping(&path).expect("save");

        let mut restored = DartRouter::new(4, 0.1);
        assert!(restored.load_mapping(&path).expect("load"));

        for key in ["StageX", "FILE_PATH", "microscope"] {
            assert_eq!(original.virtual_node_id(key), restored.virtual_node_id(key));
            assert_eq!(original.servers_for_key(key), restored.servers_for_key(key));
        }
    }

    #[test]
    fn test_mapping_load_refuses_server_count_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dart_mapping.dat");

        DartRouter::new(4, 0.1).save_mapping(&path).expect("save");

        let mut other = DartRouter::new(8, 0.1);
        assert!(!other.load_mapping(&path).expect("load"));
        // The refusal leaves the router untouched.
        assert_eq!(other.num_servers(), 8);
    }

    #[test]
    fn test_remap_to_same_count_moves_nothing() {
        let mut router = DartRouter::new(4, 0.1);
        assert_eq!(router.remap_servers(4), 0);
    }

    #[test]
    fn test_remap_reports_migrations() {
        let mut router = DartRouter::new(4, 0.1);

        let migrations = router.remap_servers(3);
        assert!(migrations <= NUM_VIRTUAL_NODES);
        assert_eq!(router.num_servers(), 3);

        // Every assignment now lands on a surviving server.
        for key in ["StageX", "FILE_PATH", "creation_date"] {
            for server in router.servers_for_key(key) {
                assert!(server < 3);
            }
        }
    }
}
