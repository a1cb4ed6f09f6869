#[cfg(test)]
mod tests {
    use svbreak::graph::build::SeqLoader;
    use svbreak::graph::db_graph::DbGraph;
    use svbreak::kmer::binary_kmer::BinaryKmer;

    fn kmer_covg(graph: &DbGraph, kmer: &str) -> u32 {
        let bk = BinaryKmer::from_str(kmer, graph.kmer_size).unwrap();
        let node = graph.find_node(&bk).expect("kmer not in graph");
        graph.covg(node.key, 0)
    }

    /* --------------------------------------------------------------------- */
    /*  basic contig loading                                                 */
    /* --------------------------------------------------------------------- */

    #[test]
    fn twenty_bp_contig_gives_twelve_kmers() {
        // A/C-only sequence: no window collides with a reverse complement
        let graph = DbGraph::alloc(9, 1, 64, true, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(b"AACACCAACCACACAACCCA").unwrap();
        assert_eq!(graph.ht.num_kmers(), 12);
        assert_eq!(loader.stats.kmers_loaded, 12);
        assert_eq!(loader.stats.novel_kmers, 12);
        // every kmer was counted once
        for hkey in graph.ht.iter() {
            assert_eq!(graph.covg(hkey, 0), 1);
            assert!(graph.node_has_col(hkey, 0));
        }
    }

    #[test]
    fn repeated_kmers_accumulate_coverage() {
        let graph = DbGraph::alloc(9, 1, 64, false, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(b"AAACACCAACA").unwrap();
        loader.load_contig(b"AAACACCAACA").unwrap();
        assert_eq!(kmer_covg(&graph, "AAACACCAA"), 2);
    }

    #[test]
    fn non_acgt_bases_split_contigs() {
        let graph = DbGraph::alloc(5, 1, 64, false, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        // the N breaks the read into two stretches, one too short to hold a kmer
        loader.load_contig(b"ACCGTTANAGGT").unwrap();
        assert_eq!(graph.ht.num_kmers(), 3); // ACCGT, CCGTT, CGTTA
    }

    #[test]
    fn single_all_a_kmer_is_allowed() {
        let graph = DbGraph::alloc(9, 1, 64, false, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(b"AAAAAAAAAAA").unwrap();
        assert_eq!(graph.ht.num_kmers(), 1);
        assert_eq!(kmer_covg(&graph, "AAAAAAAAA"), 3);
    }

    /* --------------------------------------------------------------------- */
    /*  edges welded between neighbours                                      */
    /* --------------------------------------------------------------------- */

    #[test]
    fn consecutive_kmers_are_linked() {
        let graph = DbGraph::alloc(5, 1, 64, false, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(b"CAAACGAT").unwrap();
        let bk = BinaryKmer::from_str("CAAAC", 5).unwrap();
        let node = graph.find_node(&bk).unwrap();
        let nexts = graph.next_nodes(node, graph.edges(node.key, 0));
        assert_eq!(nexts.len(), 1);
        assert_eq!(graph.node_bkmer(nexts[0].0).to_string(5), "AAACG");
        // and the back edge exists
        let back = graph.next_nodes(
            nexts[0].0.reverse(),
            graph.edges(nexts[0].0.key, 0),
        );
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].0, node.reverse());
    }

    /* --------------------------------------------------------------------- */
    /*  PCR duplicate filtering (read pairs)                                 */
    /* --------------------------------------------------------------------- */

    const R1A: &[u8] = b"CTACGATGTATGCTTAGCTGTTCCG";
    const R2A: &[u8] = b"TAGAACGTTCCCTACACGTCCTATG";
    const R1B: &[u8] = b"CTACGATGTATGCTTAGCTAATGAT";
    const R2B: &[u8] = b"TAGAACGTTCCCTACACGTTGTTTG";

    #[test]
    fn duplicate_pairs_are_dropped_when_filtering() {
        let graph = DbGraph::alloc(19, 1, 256, false, true).unwrap();
        let mut loader = SeqLoader::new(&graph, 0).remove_pcr_dup_pairs(true);

        loader.load_read_pair(R1A, R2A).unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 1);
        assert_eq!(kmer_covg(&graph, "TAGAACGTTCCCTACACGT"), 1);

        // same first kmer on both mates: treated as a PCR duplicate
        loader.load_read_pair(R1B, R2B).unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 1);
        assert_eq!(kmer_covg(&graph, "TAGAACGTTCCCTACACGT"), 1);
        assert_eq!(loader.stats.dup_reads, 2);
    }

    #[test]
    fn duplicate_pairs_load_when_filtering_disabled() {
        let graph = DbGraph::alloc(19, 1, 256, false, true).unwrap();
        let mut dedup = SeqLoader::new(&graph, 0).remove_pcr_dup_pairs(true);
        dedup.load_read_pair(R1A, R2A).unwrap();

        let mut plain = SeqLoader::new(&graph, 0);
        plain.load_read_pair(R1B, R2B).unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 2);
        assert_eq!(kmer_covg(&graph, "TAGAACGTTCCCTACACGT"), 2);
        assert_eq!(plain.stats.dup_reads, 0);
    }

    #[test]
    fn half_matching_pair_is_not_a_duplicate() {
        let graph = DbGraph::alloc(19, 1, 256, false, true).unwrap();
        let mut loader = SeqLoader::new(&graph, 0).remove_pcr_dup_pairs(true);
        loader.load_read_pair(R1A, R2A).unwrap();
        // mate 2 starts elsewhere, so the pair survives
        loader
            .load_read_pair(R1B, b"GGCCATTGCACTCCAGCCTGGGCA")
            .unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 2);
        assert_eq!(loader.stats.dup_reads, 0);
    }

    /* --------------------------------------------------------------------- */
    /*  PCR duplicate filtering (single-end)                                 */
    /* --------------------------------------------------------------------- */

    #[test]
    fn single_end_duplicates_are_dropped() {
        let graph = DbGraph::alloc(19, 1, 256, false, true).unwrap();
        let mut loader = SeqLoader::new(&graph, 0).remove_pcr_dup_reads(true);

        loader.load_read(R1A).unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 1);

        // same start kmer, different tail
        loader.load_read(b"CTACGATGTATGCTTAGCTAGTGTGATATCCTCC").unwrap();
        assert_eq!(kmer_covg(&graph, "CTACGATGTATGCTTAGCT"), 1);
        assert_eq!(loader.stats.dup_reads, 1);
    }
}
