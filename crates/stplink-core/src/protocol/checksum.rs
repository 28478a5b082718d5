//! CRC-8/SMBUS checksum (poly 0x07, init 0x00, no reflection, no final XOR)

use crc::{Crc, CRC_8_SMBUS};

const CRC_STP: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Compute the frame checksum over `bytes`.
///
/// Over a frame this is called on `LEN ++ KIND ++ payload`, i.e. everything
/// after the SOF and CRC fields.
pub fn crc8(bytes: &[u8]) -> u8 {
    CRC_STP.checksum(bytes)
}
