//! Stream filter pipeline.
//!
//! A stream's `/Filter` entry names the codecs in the order they must be
//! applied to decode; `/DecodeParms` carries per-filter parameters aligned
//! with that order. Decoding walks the list front to back, encoding back to
//! front. Every decoder runs under the caller's [`DecodeLimits`] so hostile
//! payloads cannot expand without bound.

pub mod ascii_85;
pub mod ascii_hex;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod run_length;

use log::debug;

use crate::config::DecodeLimits;
use crate::object::{Dictionary, Object};
use crate::{Error, Result};

/// Raster codecs the pipeline carries through unchanged; their payloads are
/// image data that a renderer decodes, not byte content of the document.
const PASSTHROUGH: [&[u8]; 5] = [
    b"CCITTFaxDecode",
    b"DCTDecode",
    b"JBIG2Decode",
    b"JPXDecode",
    b"Crypt",
];

pub(crate) fn filter_error<N: AsRef<[u8]>, R: ToString>(name: N, reason: R) -> Error {
    Error::Filter {
        name: String::from_utf8_lossy(name.as_ref()).into_owned(),
        reason: reason.to_string(),
    }
}

/// Ceiling on the decoded size of one filter application.
pub(crate) fn output_cap(input_len: usize, limits: &DecodeLimits) -> u64 {
    let by_ratio = (input_len as u64)
        .saturating_mul(limits.max_ratio as u64)
        .max(64 << 10);
    by_ratio.min(limits.max_bytes)
}

/// The filter names and aligned decode parameters of a stream dictionary.
fn filter_chain(dict: &Dictionary) -> Result<Vec<(Vec<u8>, Option<Dictionary>)>> {
    let filters: Vec<Vec<u8>> = match dict.get(b"Filter") {
        Err(_) => return Ok(vec![]),
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(names)) => names
            .iter()
            .map(|n| n.as_name().map(<[u8]>::to_vec))
            .collect::<Result<_>>()?,
        Ok(other) => {
            return Err(Error::ObjectType {
                expected: "Name or Array",
                found: other.type_name(),
            });
        }
    };

    let parms: Vec<Option<Dictionary>> = match dict.get(b"DecodeParms").or_else(|_| dict.get(b"DP")) {
        Err(_) => vec![None; filters.len()],
        Ok(Object::Dictionary(parms)) => {
            let mut list = vec![None; filters.len()];
            if let Some(first) = list.first_mut() {
                *first = Some(parms.clone());
            }
            list
        }
        Ok(Object::Array(list)) => {
            let mut aligned = vec![None; filters.len()];
            for (slot, entry) in aligned.iter_mut().zip(list) {
                if let Object::Dictionary(parms) = entry {
                    *slot = Some(parms.clone());
                }
            }
            aligned
        }
        Ok(_) => vec![None; filters.len()],
    };

    Ok(filters.into_iter().zip(parms).collect())
}

/// Decode `content` through every filter the stream dictionary names.
pub fn decode_stream(dict: &Dictionary, content: &[u8], limits: &DecodeLimits) -> Result<Vec<u8>> {
    let chain = filter_chain(dict)?;
    if chain.is_empty() {
        return Ok(content.to_vec());
    }
    let mut data = content.to_vec();
    for (name, parms) in &chain {
        data = decode(name, &data, parms.as_ref(), limits)?;
    }
    Ok(data)
}

/// Apply a single named decode filter.
pub fn decode(name: &[u8], data: &[u8], parms: Option<&Dictionary>, limits: &DecodeLimits) -> Result<Vec<u8>> {
    let decoded = match name {
        b"FlateDecode" | b"Fl" => flate::decode(data, limits)?,
        b"LZWDecode" | b"LZW" => lzw::decode(data, early_change(parms), limits)?,
        b"ASCIIHexDecode" | b"AHx" => ascii_hex::decode(data)?,
        b"ASCII85Decode" | b"A85" => ascii_85::decode(data)?,
        b"RunLengthDecode" | b"RL" => run_length::decode(data, limits)?,
        _ if PASSTHROUGH.contains(&name) => {
            debug!("passing {} data through undecoded", String::from_utf8_lossy(name));
            return Ok(data.to_vec());
        }
        _ => return Err(filter_error(name, "unknown filter")),
    };
    match name {
        b"FlateDecode" | b"Fl" | b"LZWDecode" | b"LZW" => match parms {
            Some(parms) => predictor::decode(decoded, parms),
            None => Ok(decoded),
        },
        _ => Ok(decoded),
    }
}

/// Apply a single named encode filter; the inverse of [`decode`].
pub fn encode(name: &[u8], data: &[u8], parms: Option<&Dictionary>) -> Result<Vec<u8>> {
    match name {
        b"FlateDecode" | b"Fl" => Ok(flate::encode(data)),
        b"LZWDecode" | b"LZW" => lzw::encode(data, early_change(parms)),
        b"ASCIIHexDecode" | b"AHx" => Ok(ascii_hex::encode(data)),
        b"ASCII85Decode" | b"A85" => Ok(ascii_85::encode(data)),
        b"RunLengthDecode" | b"RL" => Ok(run_length::encode(data)),
        _ if PASSTHROUGH.contains(&name) => Ok(data.to_vec()),
        _ => Err(filter_error(name, "unknown filter")),
    }
}

fn early_change(parms: Option<&Dictionary>) -> bool {
    parms
        .and_then(|parms| parms.get(b"EarlyChange").ok())
        .and_then(|v| v.as_i64().ok())
        .map(|v| v != 0)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_with_filters(filters: Object, parms: Option<Object>) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Filter", filters);
        if let Some(parms) = parms {
            dict.set("DecodeParms", parms);
        }
        dict
    }

    #[test]
    fn no_filter_is_identity() {
        let dict = Dictionary::new();
        let out = decode_stream(&dict, b"payload", &DecodeLimits::default()).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn chained_filters_compose() {
        let payload = b"composable filter chains".repeat(8);
        let flated = flate::encode(&payload);
        let hexed = ascii_hex::encode(&flated);

        let dict = dict_with_filters(
            Object::Array(vec![Object::name("ASCIIHexDecode"), Object::name("FlateDecode")]),
            None,
        );
        let out = decode_stream(&dict, &hexed, &DecodeLimits::default()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn every_codec_round_trips() {
        let payload: Vec<u8> = (0u16..600).map(|i| (i % 251) as u8).collect();
        let limits = DecodeLimits::default();
        for name in [
            &b"FlateDecode"[..],
            b"LZWDecode",
            b"ASCIIHexDecode",
            b"ASCII85Decode",
            b"RunLengthDecode",
        ] {
            let encoded = encode(name, &payload, None).unwrap();
            let decoded = decode(name, &encoded, None, &limits).unwrap();
            assert_eq!(decoded, payload, "{}", String::from_utf8_lossy(name));
        }
    }

    #[test]
    fn passthrough_codecs_are_identity() {
        let data = b"\xff\xd8jpeg-ish".to_vec();
        let out = decode(b"DCTDecode", &data, None, &DecodeLimits::default()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn unknown_filter_is_an_error() {
        let err = decode(b"Bogus", b"", None, &DecodeLimits::default()).unwrap_err();
        assert!(matches!(err, Error::Filter { .. }));
    }

    #[test]
    fn expansion_is_capped() {
        // A zlib payload inflating far beyond the ratio ceiling must error,
        // not allocate.
        let bomb_plain = vec![0u8; 1 << 20];
        let bomb = flate::encode(&bomb_plain);
        let limits = DecodeLimits {
            max_bytes: 1 << 14,
            max_ratio: 2,
        };
        let err = decode(b"FlateDecode", &bomb, None, &limits).unwrap_err();
        assert!(matches!(err, Error::DecompressionLimit { .. }));
    }
}
