//! ASCII85Decode: five characters `!`..`u` per four bytes, `z` standing in
//! for four zero bytes, `~>` ending the data.

use super::filter_error;
use crate::Result;

pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 5 * 4);
    let mut group = [0u32; 5];
    let mut filled = 0usize;

    // An optional `<~` prologue is tolerated.
    let data = data.strip_prefix(b"<~").unwrap_or(data);

    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if filled == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[filled] = (byte - b'!') as u32;
                filled += 1;
                if filled == 5 {
                    push_group(&mut out, &group, 4);
                    filled = 0;
                }
            }
            b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0' => {}
            other => {
                return Err(filter_error(
                    b"ASCII85Decode",
                    format!("unexpected byte 0x{:02x}", other),
                ));
            }
        }
    }

    match filled {
        0 => {}
        1 => return Err(filter_error(b"ASCII85Decode", "single trailing character")),
        n => {
            let mut padded = group;
            for slot in padded.iter_mut().skip(n) {
                *slot = 84;
            }
            push_group(&mut out, &padded, n - 1);
        }
    }
    Ok(out)
}

fn push_group(out: &mut Vec<u8>, group: &[u32; 5], count: usize) {
    let value = group.iter().fold(0u32, |acc, c| acc.wrapping_mul(85).wrapping_add(*c));
    out.extend_from_slice(&value.to_be_bytes()[..count]);
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 2);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);
        if value == 0 && chunk.len() == 4 {
            out.push(b'z');
            continue;
        }
        let mut encoded = [0u8; 5];
        for slot in encoded.iter_mut().rev() {
            *slot = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&encoded[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_shortcut() {
        assert_eq!(decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn partial_group() {
        let encoded = encode(b"sure.");
        assert_eq!(decode(&encoded).unwrap(), b"sure.");
    }

    #[test]
    fn whitespace_is_ignored() {
        let mut spaced = Vec::new();
        for byte in encode(b"spread out payload") {
            spaced.push(byte);
            spaced.push(b'\n');
        }
        assert_eq!(decode(&spaced).unwrap(), b"spread out payload");
    }

    #[test]
    fn round_trip_binary() {
        let data: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }
}
