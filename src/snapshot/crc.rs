//! CRC-16-CCITT over the snapshot image (spec §4.3, §6: "poly `0x1021`,
//! init `0xFFFF`"). That's the standard CRC-16/CCITT-FALSE parameterization,
//! which is exactly `crc::CRC_16_IBM_3740` — reached for here the way the
//! pack's `atlas-runtime` uses `crc32fast` for its own bytecode checksum
//! instead of hand-rolling the polynomial.

use crc::{Crc, CRC_16_IBM_3740};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksums `bytes`, which the caller has already sliced to `[6, end)`
/// (spec §4.3: "expectedCRC (CRC-16-CCITT of bytes from offset 6 to end)").
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_the_initial_value() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn checksum_is_deterministic() {
        let data = [1u8, 2, 3, 4, 5];
        assert_eq!(checksum(&data), checksum(&data));
    }
}
