#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use svbreak::kmer::packed_seq::*;

    /* --------------------------------------------------------------------- */
    /*  get / set                                                            */
    /* --------------------------------------------------------------------- */

    #[test]
    fn set_then_get_leaves_other_positions_unchanged() {
        let n = 13;
        let mut buf = vec![0u8; num_bytes(n)];
        // seed a known pattern
        for i in 0..n {
            set(&mut buf, i, (i % 4) as u8);
        }
        for b in 0..4u8 {
            let before: Vec<u8> = (0..n).map(|i| get(&buf, i)).collect();
            set(&mut buf, 5, b);
            assert_eq!(get(&buf, 5), b);
            for (i, &prev) in before.iter().enumerate() {
                if i != 5 {
                    assert_eq!(get(&buf, i), prev, "position {i} disturbed");
                }
            }
        }
    }

    /* --------------------------------------------------------------------- */
    /*  pack / unpack round-trip                                             */
    /* --------------------------------------------------------------------- */

    #[test]
    fn pack_unpack_roundtrip_random() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for len in [1usize, 3, 4, 5, 8, 17, 64, 101] {
            let bases: Vec<u8> = (0..len).map(|_| rng.gen_range(0..4u8)).collect();
            let mut packed = vec![0u8; num_bytes(len)];
            pack(&mut packed, &bases);
            let mut out = vec![0u8; len];
            unpack(&packed, &mut out, len);
            assert_eq!(out, bases, "len {len}");
        }
    }

    #[test]
    fn pack_zeroes_unused_high_bits() {
        let mut packed = vec![0xffu8; 2];
        pack(&mut packed, &[3, 3, 3, 3, 3]); // 5 bases -> 2 bits used in byte 1
        assert_eq!(packed[1] & !0x03, 0);
    }

    /* --------------------------------------------------------------------- */
    /*  reverse complement                                                   */
    /* --------------------------------------------------------------------- */

    fn rc_str(s: &str) -> String {
        let packed = from_str(s).unwrap();
        let mut buf = packed.clone();
        reverse_complement(&mut buf, s.len());
        to_string(&buf, s.len())
    }

    #[test]
    fn reverse_complement_known_values() {
        assert_eq!(rc_str("ACGT"), "ACGT"); // palindrome
        assert_eq!(rc_str("AAC"), "GTT");
        assert_eq!(rc_str("ACGTACG"), "CGTACGT");
        assert_eq!(rc_str("A"), "T");
    }

    #[test]
    fn reverse_complement_is_involution() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for len in [2usize, 7, 12, 33] {
            let bases: Vec<u8> = (0..len).map(|_| rng.gen_range(0..4u8)).collect();
            let mut buf = vec![0u8; num_bytes(len)];
            pack(&mut buf, &bases);
            let orig = buf.clone();
            reverse_complement(&mut buf, len);
            reverse_complement(&mut buf, len);
            assert_eq!(buf, orig, "len {len}");
        }
    }

    /* --------------------------------------------------------------------- */
    /*  shifted copy                                                         */
    /* --------------------------------------------------------------------- */

    #[test]
    fn shift_copy_drops_leading_bases() {
        let src = from_str("ACGTACG").unwrap();
        let mut dst = vec![0xffu8; 2];
        shift_copy(&mut dst, &src, 2, 7);
        assert_eq!(to_string(&dst, 5), "GTACG");
        // unused high bits of the top byte are cleared
        assert_eq!(dst[1] & !0x03, 0);
    }

    #[test]
    fn shift_copy_whole_byte_shift() {
        let src = from_str("ACGTACGT").unwrap();
        let mut dst = vec![0u8; 1];
        shift_copy(&mut dst, &src, 4, 8);
        assert_eq!(to_string(&dst, 4), "ACGT");
    }

    #[test]
    fn shift_copy_by_zero_is_a_copy() {
        let src = from_str("TGCAT").unwrap();
        let mut dst = vec![0u8; 2];
        shift_copy(&mut dst, &src, 0, 5);
        assert_eq!(to_string(&dst, 5), "TGCAT");
    }
}
