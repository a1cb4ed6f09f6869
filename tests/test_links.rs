#[cfg(test)]
mod tests {
    use svbreak::graph::build::SeqLoader;
    use svbreak::graph::db_graph::DbGraph;
    use svbreak::kmer::binary_kmer::{BinaryKmer, Orient};
    use svbreak::kmer::packed_seq;
    use svbreak::paths::checks::{check_all_links, check_link};
    use svbreak::paths::io::{load_links, save_links};
    use svbreak::paths::threading::{thread_seq, ContigHists, ThreadStats};
    use svbreak::paths::{GPathHash, GPathStore, LinkAdd};

    fn packed(s: &str) -> Vec<u8> {
        packed_seq::from_str(s).unwrap()
    }

    /* --------------------------------------------------------------------- */
    /*  insertion and dedupe                                                 */
    /* --------------------------------------------------------------------- */

    #[test]
    fn add_find_and_color_semantics() {
        let store = GPathStore::new(4096, 64, 2);
        let gphash = GPathHash::new(64);
        let juncs = packed("AC");

        let (p0, add) = store
            .find_or_add_mt(&gphash, 42, Orient::Forward, 3, 2, &juncs, 0)
            .unwrap();
        assert_eq!(add, LinkAdd::NewPath);

        // repeat for the same color
        let (p1, add) = store
            .find_or_add_mt(&gphash, 42, Orient::Forward, 3, 2, &juncs, 0)
            .unwrap();
        assert_eq!((p1, add), (p0, LinkAdd::AlreadyPresent));

        // first time in color 1 flips its bit
        let (p2, add) = store
            .find_or_add_mt(&gphash, 42, Orient::Forward, 3, 2, &juncs, 1)
            .unwrap();
        assert_eq!((p2, add), (p0, LinkAdd::AddedColor));

        let link = store.find_link(42, Orient::Forward, 2, &juncs).unwrap();
        assert!(store.colset_has(&link, 0));
        assert!(store.colset_has(&link, 1));
        assert_eq!(store.nseen(&link, 0), 2);
        assert_eq!(store.nseen(&link, 1), 1);
        assert_eq!(link.juncs_string(), "AC");
        assert_eq!(store.num_paths(), 1);
        assert_eq!(store.num_kmers_with_paths(), 1);
    }

    #[test]
    fn concurrent_inserts_create_one_record() {
        let store = GPathStore::new(4096, 64, 2);
        let gphash = GPathHash::new(64);
        let juncs = packed("AC");

        let (a, b) = std::thread::scope(|s| {
            let t0 = s.spawn(|| {
                store
                    .find_or_add_mt(&gphash, 42, Orient::Forward, 3, 2, &packed("AC"), 0)
                    .unwrap()
                    .1
            });
            let t1 = s.spawn(|| {
                store
                    .find_or_add_mt(&gphash, 42, Orient::Forward, 3, 2, &packed("AC"), 1)
                    .unwrap()
                    .1
            });
            (t0.join().unwrap(), t1.join().unwrap())
        });

        // exactly one record: one thread created it, the other added a color
        assert_eq!(store.num_paths(), 1);
        assert!(matches!(
            (a, b),
            (LinkAdd::NewPath, LinkAdd::AddedColor) | (LinkAdd::AddedColor, LinkAdd::NewPath)
        ));
        let link = store.find_link(42, Orient::Forward, 2, &juncs).unwrap();
        assert!(store.colset_has(&link, 0) && store.colset_has(&link, 1));
    }

    #[test]
    fn distinct_links_chain_newest_first() {
        let store = GPathStore::new(4096, 64, 1);
        let gphash = GPathHash::new(64);
        store
            .find_or_add_mt(&gphash, 7, Orient::Forward, 2, 1, &packed("A"), 0)
            .unwrap();
        store
            .find_or_add_mt(&gphash, 7, Orient::Forward, 2, 1, &packed("C"), 0)
            .unwrap();
        let chain: Vec<String> = store.links(7).map(|l| l.juncs_string()).collect();
        assert_eq!(chain, vec!["C".to_string(), "A".to_string()]);
        assert_eq!(store.num_paths(), 2);
        assert_eq!(store.num_kmers_with_paths(), 1);
        // orientation is part of link identity
        assert!(store.find_link(7, Orient::Reverse, 1, &packed("A")).is_none());
    }

    #[test]
    fn empty_kmer_has_no_links() {
        let store = GPathStore::new(1024, 16, 1);
        assert!(store.first_link(3).is_none());
        assert!(store.find_link(3, Orient::Forward, 1, &packed("A")).is_none());
        assert_eq!(store.num_paths(), 0);
        assert_eq!(store.path_bytes(), 0);
    }

    #[test]
    fn arena_exhaustion_is_fatal() {
        // deliberately tiny arena: smaller than a single record
        let store = GPathStore::new(8, 16, 1);
        let gphash = GPathHash::new(16);
        let r = store.find_or_add_mt(&gphash, 1, Orient::Forward, 2, 1, &packed("A"), 0);
        assert!(matches!(r, Err(svbreak::EngineError::OutOfPathMemory { .. })));
    }

    /* --------------------------------------------------------------------- */
    /*  threading sequences into links                                       */
    /* --------------------------------------------------------------------- */

    fn forked_graph() -> DbGraph {
        let graph = DbGraph::alloc(5, 1, 64, true, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(b"CAAACGAT").unwrap();
        loader.load_contig(b"CAAACGCT").unwrap();
        graph
    }

    #[test]
    fn threading_records_branch_choices() {
        let graph = forked_graph();
        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let gphash = GPathHash::new(64);
        let mut stats = ThreadStats::default();
        let mut hists = ContigHists::new(1);

        thread_seq(&graph, &store, &gphash, 0, b"CAAACGAT", &mut stats, &mut hists).unwrap();
        thread_seq(&graph, &store, &gphash, 0, b"CAAACGCT", &mut stats, &mut hists).unwrap();

        // one link per branch choice, both hanging off the CAAAC node
        let bk = BinaryKmer::from_str("CAAAC", 5).unwrap();
        let node = graph.find_node(&bk).unwrap();
        let choices: Vec<String> = store.links(node.key).map(|l| l.juncs_string()).collect();
        assert_eq!(choices.len(), 2);
        assert!(choices.contains(&"A".to_string()));
        assert!(choices.contains(&"C".to_string()));
        assert_eq!(hists.entries(0), vec![(4, 2)]); // two 4-kmer contigs

        // everything we stored is walkable in the graph
        check_all_links(&graph, &store).unwrap();
    }

    #[test]
    fn inconsistent_link_fails_the_check() {
        let graph = forked_graph();
        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let gphash = GPathHash::new(64);

        let bk = BinaryKmer::from_str("AAACG", 5).unwrap();
        let node = graph.find_node(&bk).unwrap();
        // the fork offers A and C, never G
        let (pindex, _) = store
            .find_or_add_mt(&gphash, node.key, node.orient, 2, 1, &packed("G"), 0)
            .unwrap();
        let link = store.path(pindex);
        assert!(check_link(&graph, &store, node.key, &link).is_err());
    }

    /* --------------------------------------------------------------------- */
    /*  ctp save / load round-trip                                           */
    /* --------------------------------------------------------------------- */

    #[test]
    fn save_load_roundtrip() {
        let graph = forked_graph();
        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let gphash = GPathHash::new(64);
        let mut stats = ThreadStats::default();
        let mut hists = ContigHists::new(1);
        thread_seq(&graph, &store, &gphash, 0, b"CAAACGAT", &mut stats, &mut hists).unwrap();
        thread_seq(&graph, &store, &gphash, 0, b"CAAACGCT", &mut stats, &mut hists).unwrap();

        let dir = tempfile::tempdir().unwrap();
        for name in ["links.ctp", "links.ctp.gz"] {
            let path = dir.path().join(name);
            save_links(&graph, &store, &path, true, &["sample0".to_string()], &hists).unwrap();

            let store2 = GPathStore::new(4096, graph.ht.capacity(), 1);
            let gphash2 = GPathHash::new(64);
            let loaded = load_links(&path, &graph, &store2, &gphash2).unwrap();
            assert_eq!(loaded.links_loaded as usize, store.num_paths());
            assert_eq!(store2.num_paths(), store.num_paths());
            assert_eq!(store2.num_kmers_with_paths(), store.num_kmers_with_paths());

            let bk = BinaryKmer::from_str("CAAAC", 5).unwrap();
            let node = graph.find_node(&bk).unwrap();
            for link in store.links(node.key) {
                let twin = store2
                    .find_link(node.key, link.orient, link.num_juncs, &link.seq)
                    .expect("link lost in round-trip");
                assert_eq!(twin.num_kmers, link.num_kmers);
                assert_eq!(store2.nseen(&twin, 0), store.nseen(&link, 0));
            }
            check_all_links(&graph, &store2).unwrap();
        }
    }

    #[test]
    fn loading_rejects_wrong_kmer_size() {
        let graph = forked_graph();
        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let gphash = GPathHash::new(64);
        let mut stats = ThreadStats::default();
        let mut hists = ContigHists::new(1);
        thread_seq(&graph, &store, &gphash, 0, b"CAAACGAT", &mut stats, &mut hists).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.ctp");
        save_links(&graph, &store, &path, false, &["s".to_string()], &hists).unwrap();

        let other = DbGraph::alloc(7, 1, 64, false, false).unwrap();
        let store2 = GPathStore::new(4096, other.ht.capacity(), 1);
        let gphash2 = GPathHash::new(64);
        assert!(load_links(&path, &other, &store2, &gphash2).is_err());
    }
}
