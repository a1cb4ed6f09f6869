#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use svbreak::calls::breakpoint_caller::{call_breakpoints, BreakpointOpts};
    use svbreak::calls::json_header::breakpoints_header_json;
    use svbreak::calls::kmer_occur::KOGraph;
    use svbreak::graph::build::SeqLoader;
    use svbreak::graph::db_graph::DbGraph;
    use svbreak::paths::GPathStore;

    // reference and a sample carrying it plus one SNV (position 10, T>C)
    const REF: &[u8] = b"GGATCTTCGATGAACGGTCAT";
    const VAR: &[u8] = b"GGATCTTCGACGAACGGTCAT";

    struct Record {
        flank5p_chr: String,
        flank5p_seq: String,
        flank3p_chr: String,
        flank3p_seq: String,
        cols: String,
        path_seq: String,
    }

    /// Split caller output into records keyed by their 5' flank run list.
    fn parse_records(text: &str) -> HashMap<String, Record> {
        let mut out = HashMap::new();
        for block in text.split("\n\n").filter(|b| b.contains(">brkpnt.")) {
            let lines: Vec<&str> = block.lines().filter(|l| !l.is_empty()).collect();
            assert_eq!(lines.len(), 6, "bad record block: {block:?}");
            assert!(lines[0].contains(".5pflank chr="));
            assert!(lines[2].contains(".3pflank chr="));
            assert!(lines[4].contains(".path cols="));
            let rec = Record {
                flank5p_chr: lines[0].split("chr=").nth(1).unwrap().to_string(),
                flank5p_seq: lines[1].to_string(),
                flank3p_chr: lines[2].split("chr=").nth(1).unwrap().to_string(),
                flank3p_seq: lines[3].to_string(),
                cols: lines[4].split("cols=").nth(1).unwrap().to_string(),
                path_seq: lines[5].to_string(),
            };
            out.insert(rec.flank5p_chr.clone(), rec);
        }
        out
    }

    fn call_snv_graph() -> (String, svbreak::calls::CallStats) {
        let graph = DbGraph::alloc(5, 1, 512, true, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(REF).unwrap();
        loader.load_contig(VAR).unwrap();

        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let contigs = vec![("chr1".to_string(), REF.to_vec())];
        let kograph = KOGraph::build(&graph, &contigs).unwrap();

        let opts = BreakpointOpts {
            nthreads: 1,
            min_ref_nkmers: 3,
            max_ref_nkmers: 100,
            prefix: "call".to_string(),
        };
        let (stats, out) =
            call_breakpoints(&graph, &store, &kograph, &opts, Vec::new()).unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    /* --------------------------------------------------------------------- */
    /*  end-to-end SNV call                                                  */
    /* --------------------------------------------------------------------- */

    #[test]
    fn snv_produces_anchored_records_on_both_strands() {
        let (text, stats) = call_snv_graph();
        let records = parse_records(&text);

        // the variant is seen once from each side of the break
        assert_eq!(stats.breaks_examined, 2);
        assert_eq!(stats.calls_emitted, 2);
        assert_eq!(stats.flank5p_unanchored, 0);
        assert_eq!(records.len(), 2);

        // forward view: flank anchors on the first 10 reference bases
        let fwd = &records["chr1:1-10:+:0"];
        assert_eq!(fwd.flank5p_seq, "GGATCTTCGA");
        assert_eq!(fwd.flank3p_chr, "chr1:12-21:+:0");
        assert_eq!(fwd.flank3p_seq, "GAACGGTCAT");
        assert_eq!(fwd.cols, "0");
        assert_eq!(fwd.path_seq, "C"); // the SNV base

        // reverse view: same break walked from the other strand
        let rev = &records["chr1:21-12:-:0"];
        assert_eq!(rev.flank5p_seq, "ATGACCGTTC");
        assert_eq!(rev.flank3p_chr, "chr1:10-1:-:0");
        assert_eq!(rev.flank3p_seq, "TCGAAGATCC");
        assert_eq!(rev.cols, "0");
        assert_eq!(rev.path_seq, "G"); // reverse complement of the SNV base
    }

    #[test]
    fn record_ids_are_distinct_and_sections_ordered() {
        let (text, _) = call_snv_graph();
        let mut ids: Vec<&str> = text
            .lines()
            .filter(|l| l.contains(".5pflank"))
            .map(|l| {
                l.strip_prefix(">brkpnt.call")
                    .unwrap()
                    .split('.')
                    .next()
                    .unwrap()
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["0", "1"]);

        // within a record the three sections are contiguous
        for block in text.split("\n\n").filter(|b| b.contains(">brkpnt.")) {
            let headers: Vec<&str> = block.lines().filter(|l| l.starts_with('>')).collect();
            assert_eq!(headers.len(), 3);
            assert!(headers[0].contains(".5pflank"));
            assert!(headers[1].contains(".3pflank"));
            assert!(headers[2].contains(".path"));
        }
    }

    #[test]
    fn strict_anchoring_suppresses_calls() {
        // requiring more homology than the reference offers yields nothing
        let graph = DbGraph::alloc(5, 1, 512, true, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(REF).unwrap();
        loader.load_contig(VAR).unwrap();
        let store = GPathStore::new(4096, graph.ht.capacity(), 1);
        let kograph = KOGraph::build(&graph, &[("chr1".to_string(), REF.to_vec())]).unwrap();

        let opts = BreakpointOpts {
            nthreads: 1,
            min_ref_nkmers: 50,
            max_ref_nkmers: 100,
            prefix: "call".to_string(),
        };
        let (stats, out) =
            call_breakpoints(&graph, &store, &kograph, &opts, Vec::new()).unwrap();
        assert_eq!(stats.calls_emitted, 0);
        assert!(!String::from_utf8(out).unwrap().contains(">brkpnt."));
    }

    /* --------------------------------------------------------------------- */
    /*  JSON header                                                          */
    /* --------------------------------------------------------------------- */

    #[test]
    fn header_carries_format_and_contig_metadata() {
        let graph = DbGraph::alloc(5, 1, 512, true, false).unwrap();
        let mut loader = SeqLoader::new(&graph, 0);
        loader.load_contig(REF).unwrap();
        let kograph = KOGraph::build(&graph, &[("chr1".to_string(), REF.to_vec())]).unwrap();

        let hdr = breakpoints_header_json(
            &graph,
            &["sample0".to_string()],
            &[std::path::PathBuf::from("ref.fa")],
            &kograph,
            &["svbreak breakpoints -g in.ctx".to_string()],
        );
        assert_eq!(hdr["file_format"], "CtxBreakpoints");
        assert_eq!(hdr["format_version"], 2);
        assert_eq!(hdr["kmer_size"], 5);
        assert_eq!(hdr["colors"][0]["sample"], "sample0");
        assert_eq!(hdr["breakpoints"]["contigs"][0]["id"], "chr1");
        assert_eq!(hdr["breakpoints"]["contigs"][0]["length"], REF.len() as u64);
        assert_eq!(hdr["breakpoints"]["ref_files"].as_array().unwrap().len(), 1);
    }
}
