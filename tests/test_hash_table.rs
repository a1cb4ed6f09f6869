#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use svbreak::kmer::binary_kmer::BinaryKmer;
    use svbreak::graph::hash_table::{capacity_for, KmerTable};
    use svbreak::EngineError;

    const K: usize = 21;

    fn distinct_canonical_kmers(n: usize, seed: u64) -> Vec<BinaryKmer> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        while out.len() < n {
            let s: String = (0..K)
                .map(|_| ['A', 'C', 'G', 'T'][rng.gen_range(0..4)])
                .collect();
            let canon = BinaryKmer::from_str(&s, K).unwrap().canonical(K);
            if seen.insert(canon) {
                out.push(canon);
            }
        }
        out
    }

    /* --------------------------------------------------------------------- */
    /*  capacity selection                                                   */
    /* --------------------------------------------------------------------- */

    #[test]
    fn capacity_shape_is_sane() {
        for req in [1usize, 100, 10_000, 1_000_000] {
            let (num_buckets, bucket_size) = capacity_for(req);
            assert!(num_buckets.is_power_of_two());
            assert!(bucket_size <= 254);
            assert!(num_buckets * bucket_size >= req, "req {req}");
        }
    }

    /* --------------------------------------------------------------------- */
    /*  single-threaded find / insert                                        */
    /* --------------------------------------------------------------------- */

    #[test]
    fn find_or_insert_then_find() {
        let table = KmerTable::new(K, 500);
        let kmers = distinct_canonical_kmers(200, 1);
        let mut slots = Vec::new();
        for bk in &kmers {
            let (slot, inserted) = table.find_or_insert(bk).unwrap();
            assert!(inserted);
            slots.push(slot);
        }
        assert_eq!(table.num_kmers(), 200);
        for (bk, &slot) in kmers.iter().zip(&slots) {
            assert_eq!(table.find(bk), Some(slot));
            assert_eq!(table.bkmer(slot), *bk);
            // second insert finds the same slot
            assert_eq!(table.find_or_insert(bk).unwrap(), (slot, false));
        }
        // absent kmer
        let absent = distinct_canonical_kmers(201, 1).pop().unwrap();
        assert_eq!(table.find(&absent), None);
    }

    /* --------------------------------------------------------------------- */
    /*  concurrent insertion                                                 */
    /* --------------------------------------------------------------------- */

    #[test]
    fn concurrent_inserts_deduplicate() {
        let table = KmerTable::new(K, 400);
        let kmers = distinct_canonical_kmers(100, 2);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for bk in &kmers {
                        table.find_or_insert(bk).unwrap();
                    }
                });
            }
        });

        // after join every kmer has exactly one slot
        assert_eq!(table.num_kmers(), 100);
        let mut seen_slots = HashSet::new();
        for bk in &kmers {
            let slot = table.find(bk).expect("kmer lost");
            assert!(seen_slots.insert(slot), "slot reused");
            assert_eq!(table.bkmer(slot), *bk);
        }
    }

    /* --------------------------------------------------------------------- */
    /*  table exhaustion                                                     */
    /* --------------------------------------------------------------------- */

    #[test]
    fn overfull_table_reports_table_full() {
        // one bucket of two entries: every rehash lands in the same bucket
        let table = KmerTable::with_shape(K, 1, 2);
        let kmers = distinct_canonical_kmers(3, 3);
        table.find_or_insert(&kmers[0]).unwrap();
        table.find_or_insert(&kmers[1]).unwrap();
        match table.find_or_insert(&kmers[2]) {
            Err(EngineError::TableFull { occupancy, capacity }) => {
                assert_eq!(occupancy, 2);
                assert_eq!(capacity, 2);
            }
            other => panic!("expected TableFull, got {other:?}"),
        }
    }

    /* --------------------------------------------------------------------- */
    /*  partitioned iteration                                                */
    /* --------------------------------------------------------------------- */

    #[test]
    fn partitions_cover_all_slots_once() {
        let table = KmerTable::new(K, 300);
        for bk in distinct_canonical_kmers(150, 4) {
            table.find_or_insert(&bk).unwrap();
        }
        let mut visited = HashSet::new();
        for part in 0..3 {
            table.for_each_in_partition(part, 3, |hkey| {
                assert!(visited.insert(hkey), "slot {hkey} visited twice");
            });
        }
        assert_eq!(visited.len(), 150);
        assert_eq!(table.iter().count(), 150);
    }
}
