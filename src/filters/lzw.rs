//! LZWDecode via weezl, MSB-first with 8-bit symbols.
//!
//! `EarlyChange` selects when the code width grows: the default (1) bumps the
//! width one code early, matching TIFF; 0 is the textbook transition. The
//! encoder always emits a clear-table code first and an end-of-data code
//! last, which weezl does on its own.

use weezl::{BitOrder, LzwError, LzwStatus, decode::Decoder as LzwDecoder, encode::Encoder as LzwEncoder};

use super::{filter_error, output_cap};
use crate::config::DecodeLimits;
use crate::{Error, Result};

pub fn decode(data: &[u8], early_change: bool, limits: &DecodeLimits) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };

    let cap = output_cap(data.len(), limits);
    let mut out = Vec::new();
    let mut buffer = vec![0u8; 16 << 10];
    let mut consumed = 0usize;
    loop {
        let result = decoder.decode_bytes(&data[consumed..], &mut buffer);
        consumed += result.consumed_in;
        out.extend_from_slice(&buffer[..result.consumed_out]);
        if out.len() as u64 > cap {
            return Err(Error::DecompressionLimit { limit: cap });
        }
        match result.status {
            Ok(LzwStatus::Done) => break,
            Ok(LzwStatus::Ok) => {}
            Ok(LzwStatus::NoProgress) => {
                // Data ran out before an end-of-data code; accept what we
                // have, mirroring how common viewers treat truncated LZW.
                break;
            }
            Err(LzwError::InvalidCode) => {
                return Err(filter_error(b"LZWDecode", "invalid code in stream"));
            }
        }
    }
    Ok(out)
}

pub fn encode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut encoder = if early_change {
        LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwEncoder::new(BitOrder::Msb, 8)
    };
    encoder
        .encode(data)
        .map_err(|err| filter_error(b"LZWDecode", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_both_variants() {
        let data = b"TOBEORNOTTOBEORTOBEORNOT".to_vec();
        for early in [true, false] {
            let encoded = encode(&data, early).unwrap();
            assert_eq!(decode(&encoded, early, &DecodeLimits::default()).unwrap(), data, "early_change={early}");
        }
    }

    #[test]
    fn variants_disagree_on_wire_format_for_long_input() {
        // Once the dictionary passes a width boundary the two variants pack
        // codes differently.
        let data: Vec<u8> = (0u16..2048).map(|i| (i % 256) as u8).collect();
        let with_switch = encode(&data, true).unwrap();
        let without = encode(&data, false).unwrap();
        assert_ne!(with_switch, without);
        assert_eq!(decode(&with_switch, true, &DecodeLimits::default()).unwrap(), data);
        assert_eq!(decode(&without, false, &DecodeLimits::default()).unwrap(), data);
    }

    #[test]
    fn expansion_cap() {
        let data = vec![b'x'; 1 << 18];
        let encoded = encode(&data, true).unwrap();
        let limits = DecodeLimits {
            max_bytes: 1 << 10,
            max_ratio: 1,
        };
        assert!(matches!(
            decode(&encoded, true, &limits),
            Err(Error::DecompressionLimit { .. })
        ));
    }
}
