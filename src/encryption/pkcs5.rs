use aes::cipher::block_padding::{PadType, RawPadding, UnpadError};

/// PKCS#5 padding: every added byte carries the count of bytes added.
///
/// Identical to PKCS#7 for the 16-byte AES block, but defined only for block
/// sizes up to 16 ([RFC 2898](https://tools.ietf.org/html/rfc2898)).
#[derive(Clone, Copy, Debug)]
pub struct Pkcs5;

impl RawPadding for Pkcs5 {
    const TYPE: PadType = PadType::Reversible;

    #[inline]
    fn raw_pad(block: &mut [u8], pos: usize) {
        debug_assert!(block.len() <= 16, "block size is too big for PKCS#5");
        debug_assert!(pos < block.len(), "`pos` is bigger or equal to block size");
        let padding = (block.len() - pos) as u8;
        for byte in &mut block[pos..] {
            *byte = padding;
        }
    }

    #[inline]
    fn raw_unpad(block: &[u8]) -> Result<&[u8], UnpadError> {
        if block.len() > 16 {
            return Err(UnpadError);
        }
        let length = block.len();
        let padding = block[length - 1];
        if padding == 0 || padding as usize > length {
            return Err(UnpadError);
        }
        let data_end = length - padding as usize;
        if block[data_end..length - 1].iter().any(|&byte| byte != padding) {
            return Err(UnpadError);
        }
        Ok(&block[..data_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_fills_with_count() {
        let mut block = [0xAAu8; 8];
        Pkcs5::raw_pad(&mut block, 5);
        assert_eq!(block, [0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 3, 3, 3]);
    }

    #[test]
    fn unpad_rejects_inconsistent_padding() {
        assert_eq!(Pkcs5::raw_unpad(&[1, 2, 3, 3, 3]).unwrap(), &[1, 2]);
        assert!(Pkcs5::raw_unpad(&[1, 2, 2, 3, 3]).is_err());
        assert!(Pkcs5::raw_unpad(&[0, 0, 0, 0]).is_err());
    }
}
