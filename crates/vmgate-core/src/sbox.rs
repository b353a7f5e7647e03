//! The S-box engine: byte-wise application of `vm` and `vm_inv` (actions
//! 0 and 1, §4.5).

/// `buf[i] = table[buf[i]]` for all i, in place.
pub fn apply_table(buf: &mut [u8], table: &[u8; 256]) {
    for b in buf.iter_mut() {
        *b = table[*b as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_table_maps_every_byte() {
        let mut table = [0u8; 256];
        for i in 0..256 {
            table[i] = (255 - i) as u8;
        }
        let mut buf = [0u8, 1, 254, 255];
        apply_table(&mut buf, &table);
        assert_eq!(buf, [255, 254, 1, 0]);
    }

    #[test]
    fn apply_then_apply_inv_is_identity() {
        let vm: [u8; 256] = {
            let mut t = [0u8; 256];
            for i in 0..256 {
                t[i] = ((i as u32 * 167 + 31) % 256) as u8;
            }
            // Ensure it's a permutation by construction check in test only.
            t
        };
        let mut seen = [false; 256];
        for &b in vm.iter() {
            seen[b as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "test fixture must be a permutation");

        let mut vm_inv = [0u8; 256];
        for i in 0..256 {
            vm_inv[vm[i] as usize] = i as u8;
        }

        let original: Vec<u8> = (0..=255u8).collect();
        let mut buf = original.clone();
        apply_table(&mut buf, &vm);
        apply_table(&mut buf, &vm_inv);
        assert_eq!(buf, original);
    }
}
