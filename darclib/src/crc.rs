//! The three DARC checksums: CRC-14 (L2 information blocks), CRC-16
//! (L4 data groups) and CRC-82 (the DSCC vertical parity / syndrome).
//!
//! All three share one algorithmic shape - MSB-first, initial value zero,
//! no reflection, no final XOR - so a single macro stamps out the
//! 256-entry table, the byte-aligned table-driven digest and the
//! bit-by-bit digest for non-byte-aligned lengths.
//!
//! Reference: ARIB STD-B3 section 4 (error detection / correction codes).

use std::sync::LazyLock;

macro_rules! darc_crc {
    ($table:ident, $table_fn:ident, $bits_fn:ident, $pub_fn:ident, $pub_bits_fn:ident,
     $ty:ty, $width:expr, $poly:expr, $doc:expr) => {
        static $table: LazyLock<[$ty; 256]> = LazyLock::new(|| {
            const MSB: $ty = 1 << ($width - 1);
            const MASK: $ty = !0 >> (<$ty>::BITS as usize - $width);
            let mut table = [0 as $ty; 256];
            let mut i = 0usize;
            while i < 256 {
                let mut value = (i as $ty) << ($width - 8);
                let mut bit = 0;
                while bit < 8 {
                    value = if value & MSB != 0 {
                        (value << 1) ^ $poly
                    } else {
                        value << 1
                    };
                    bit += 1;
                }
                table[i] = value & MASK;
                i += 1;
            }
            table
        });

        fn $table_fn(message: &[u8]) -> $ty {
            const MASK: $ty = !0 >> (<$ty>::BITS as usize - $width);
            let table = &*$table;
            let mut crc: $ty = 0;
            for &byte in message {
                let index = (((crc >> ($width - 8)) as u8) ^ byte) as usize;
                crc = table[index] ^ (crc << 8);
                crc &= MASK;
            }
            crc
        }

        fn $bits_fn(message: &[u8], mut bits: usize) -> $ty {
            const MSB: $ty = 1 << ($width - 1);
            const MASK: $ty = !0 >> (<$ty>::BITS as usize - $width);
            let mut crc: $ty = 0;
            'outer: for &byte in message {
                for i in 0..8 {
                    if bits == 0 {
                        break 'outer;
                    }
                    let fed = if byte & (0x80 >> i) != 0 { MSB } else { 0 };
                    crc = if ((crc & MSB) ^ fed) != 0 {
                        ((crc << 1) ^ $poly) & MASK
                    } else {
                        (crc << 1) & MASK
                    };
                    bits -= 1;
                }
            }
            crc
        }

        #[doc = $doc]
        pub fn $pub_fn(message: &[u8]) -> $ty {
            $table_fn(message)
        }

        #[doc = $doc]
        #[doc = ""]
        #[doc = "Digests exactly `bits` bits of `message`, MSB-first within each byte."]
        pub fn $pub_bits_fn(message: &[u8], bits: usize) -> $ty {
            if bits % 8 == 0 && bits / 8 <= message.len() {
                $table_fn(&message[..bits / 8])
            } else {
                $bits_fn(message, bits)
            }
        }
    };
}

darc_crc!(
    CRC_14_TABLE,
    crc_14_table_driven,
    crc_14_bit_by_bit,
    crc_14_darc,
    crc_14_darc_bits,
    u16,
    14,
    0x0805,
    "CRC-14/DARC over whole bytes (polynomial `0x0805`, initial value 0)."
);

darc_crc!(
    CRC_16_TABLE,
    crc_16_table_driven,
    crc_16_bit_by_bit,
    crc_16_darc,
    crc_16_darc_bits,
    u16,
    16,
    0x1021,
    "CRC-16/DARC over whole bytes (polynomial `0x1021`, initial value 0)."
);

darc_crc!(
    CRC_82_TABLE,
    crc_82_table_driven,
    crc_82_bit_by_bit,
    crc_82_darc,
    crc_82_darc_bits,
    u128,
    82,
    0x0308C0111011401440411,
    "CRC-82/DARC over whole bytes (polynomial `0x0308C0111011401440411`, initial value 0)."
);

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK: &[u8] = b"123456789";

    #[test]
    fn test_crc14() {
        assert_eq!(crc_14_darc(CHECK), 0x11AE);
    }

    #[test]
    fn test_crc16() {
        assert_eq!(crc_16_darc(CHECK), 0x31C3);
    }

    #[test]
    fn test_crc82() {
        assert_eq!(crc_82_darc(CHECK), 0xD791BF40F8897E6341D2);
    }

    #[test]
    fn table_and_bitwise_agree_on_byte_aligned_input() {
        let data: Vec<u8> = (0u16..600).map(|i| (i * 7 % 251) as u8).collect();
        for len in [0, 1, 2, 9, 22, 34, 599] {
            let msg = &data[..len];
            assert_eq!(crc_14_table_driven(msg), crc_14_bit_by_bit(msg, len * 8));
            assert_eq!(crc_16_table_driven(msg), crc_16_bit_by_bit(msg, len * 8));
            assert_eq!(crc_82_table_driven(msg), crc_82_bit_by_bit(msg, len * 8));
        }
    }

    #[test]
    fn bit_count_variants() {
        // A 36-bit message exercises the non-aligned path.
        let msg = [0x12, 0x34, 0x56, 0x78, 0x90];
        assert_eq!(crc_14_darc_bits(&msg, 36), 0x2BE6);
        assert_eq!(crc_16_darc_bits(&msg, 36), 0x6282);
        // Aligned counts route to the table-driven digest.
        assert_eq!(crc_16_darc_bits(CHECK, 72), crc_16_darc(CHECK));
    }

    #[test]
    fn appending_the_crc_zeroes_the_digest() {
        // crc(M || crc(M)) == 0 holds for an init-0, non-reflected CRC.
        let crc = crc_16_darc(CHECK);
        let mut buf = CHECK.to_vec();
        buf.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(crc_16_darc(&buf), 0);
    }

    #[test]
    fn cross_check_against_crc_any() {
        let mut reference = crc_any::CRC::create_crc(0x1021, 16, 0, 0, false);
        reference.digest(CHECK);
        assert_eq!(crc_16_darc(CHECK) as u64, reference.get_crc());

        let mut reference = crc_any::CRC::create_crc(0x0805, 14, 0, 0, false);
        reference.digest(CHECK);
        assert_eq!(crc_14_darc(CHECK) as u64, reference.get_crc());
    }
}
