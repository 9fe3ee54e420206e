//! FlateDecode via flate2. Some producers write raw deflate data without the
//! zlib wrapper; decoding falls back to that before giving up.

use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use log::warn;
use std::io::prelude::*;

use super::{filter_error, output_cap};
use crate::config::DecodeLimits;
use crate::{Error, Result};

pub fn decode(data: &[u8], limits: &DecodeLimits) -> Result<Vec<u8>> {
    let cap = output_cap(data.len(), limits);
    match bounded_read(ZlibDecoder::new(data), cap) {
        Ok(out) => Ok(out),
        Err(Error::DecompressionLimit { limit }) => Err(Error::DecompressionLimit { limit }),
        Err(_) => {
            warn!("zlib wrapper missing or damaged, retrying as raw deflate");
            bounded_read(DeflateDecoder::new(data), cap)
                .map_err(|err| match err {
                    limit @ Error::DecompressionLimit { .. } => limit,
                    other => filter_error(b"FlateDecode", other),
                })
        }
    }
}

fn bounded_read<R: Read>(reader: R, cap: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut limited = reader.take(cap + 1);
    limited
        .read_to_end(&mut out)
        .map_err(|err| filter_error(b"FlateDecode", err))?;
    if out.len() as u64 > cap {
        return Err(Error::DecompressionLimit { limit: cap });
    }
    Ok(out)
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to a Vec cannot fail");
    encoder.finish().expect("writing to a Vec cannot fail")
}
