//! Predictor post-processing for FlateDecode and LZWDecode.
//!
//! Predictor 1 is a no-op, 2 is the TIFF horizontal differencing predictor,
//! and 10..=15 are the PNG filters applied row by row with a leading filter
//! type byte per row. The stream's `/DecodeParms` supplies Colors,
//! BitsPerComponent and Columns.

use super::filter_error;
use crate::object::{Dictionary, Object};
use crate::Result;

fn parm(parms: &Dictionary, key: &[u8], default: i64) -> i64 {
    parms.get(key).and_then(Object::as_i64).unwrap_or(default)
}

pub fn decode(data: Vec<u8>, parms: &Dictionary) -> Result<Vec<u8>> {
    let predictor = parm(parms, b"Predictor", 1);
    if predictor <= 1 {
        return Ok(data);
    }
    let colors = parm(parms, b"Colors", 1).max(1) as usize;
    let bits = parm(parms, b"BitsPerComponent", 8).max(1) as usize;
    let columns = parm(parms, b"Columns", 1).max(1) as usize;
    let bytes_per_pixel = (colors * bits).div_ceil(8);
    let row_length = (colors * bits * columns).div_ceil(8);

    match predictor {
        2 => tiff_horizontal(data, bits, bytes_per_pixel, row_length),
        10..=15 => png(data, bytes_per_pixel, row_length),
        other => Err(filter_error(
            b"FlateDecode",
            format!("unsupported predictor {}", other),
        )),
    }
}

fn tiff_horizontal(mut data: Vec<u8>, bits: usize, bytes_per_pixel: usize, row_length: usize) -> Result<Vec<u8>> {
    if bits != 8 {
        return Err(filter_error(
            b"FlateDecode",
            format!("TIFF predictor with {} bits per component", bits),
        ));
    }
    for row in data.chunks_mut(row_length) {
        for i in bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
        }
    }
    Ok(data)
}

fn png(data: Vec<u8>, bytes_per_pixel: usize, row_length: usize) -> Result<Vec<u8>> {
    let stride = row_length + 1;
    if data.len() % stride != 0 {
        return Err(filter_error(b"FlateDecode", "predictor row size mismatch"));
    }
    let rows = data.len() / stride;
    let mut out = vec![0u8; rows * row_length];
    let mut previous = vec![0u8; row_length];

    for (row_index, row) in data.chunks(stride).enumerate() {
        let filter_type = row[0];
        let row = &row[1..];
        let current = &mut out[row_index * row_length..(row_index + 1) * row_length];
        match filter_type {
            0 => current.copy_from_slice(row),
            1 => {
                for i in 0..row_length {
                    let left = if i >= bytes_per_pixel { current[i - bytes_per_pixel] } else { 0 };
                    current[i] = row[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..row_length {
                    current[i] = row[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_length {
                    let left = if i >= bytes_per_pixel { current[i - bytes_per_pixel] } else { 0 };
                    let average = ((left as u16 + previous[i] as u16) / 2) as u8;
                    current[i] = row[i].wrapping_add(average);
                }
            }
            4 => {
                for i in 0..row_length {
                    let left = if i >= bytes_per_pixel { current[i - bytes_per_pixel] } else { 0 };
                    let upper_left = if i >= bytes_per_pixel { previous[i - bytes_per_pixel] } else { 0 };
                    current[i] = row[i].wrapping_add(paeth(left, previous[i], upper_left));
                }
            }
            other => {
                return Err(filter_error(
                    b"FlateDecode",
                    format!("unknown PNG filter type {}", other),
                ));
            }
        }
        previous.copy_from_slice(current);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parms(predictor: i64, colors: i64, bits: i64, columns: i64) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Predictor", predictor);
        dict.set("Colors", colors);
        dict.set("BitsPerComponent", bits);
        dict.set("Columns", columns);
        dict
    }

    #[test]
    fn predictor_one_is_identity() {
        let parms = parms(1, 1, 8, 4);
        assert_eq!(decode(b"abcd".to_vec(), &parms).unwrap(), b"abcd");
    }

    #[test]
    fn png_up_rows() {
        // Two rows of four columns under the Up filter: row two adds to row
        // one byte by byte.
        let parms = parms(12, 1, 8, 4);
        let data = vec![2, 10, 20, 30, 40, 2, 1, 1, 1, 1];
        assert_eq!(decode(data, &parms).unwrap(), vec![10, 20, 30, 40, 11, 21, 31, 41]);
    }

    #[test]
    fn png_sub_row() {
        let parms = parms(11, 1, 8, 4);
        let data = vec![1, 5, 5, 5, 5];
        assert_eq!(decode(data, &parms).unwrap(), vec![5, 10, 15, 20]);
    }

    #[test]
    fn tiff_differencing() {
        let parms = parms(2, 1, 8, 4);
        let data = vec![10, 5, 5, 5];
        assert_eq!(decode(data, &parms).unwrap(), vec![10, 15, 20, 25]);
    }

    #[test]
    fn ragged_png_input_is_an_error() {
        let parms = parms(12, 1, 8, 4);
        assert!(decode(vec![0, 1, 2], &parms).is_err());
    }
}
