use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression as Level};

use super::file::BitbaseError;

/// Codec identifiers as stored in the file header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Compression {
    None = 0,
    Deflate = 1,
}

impl TryFrom<u32> for Compression {
    type Error = BitbaseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Deflate),
            other => Err(BitbaseError::UnknownCompression(other)),
        }
    }
}

pub fn compress(data: &[u8], compression: Compression) -> Result<Vec<u8>, BitbaseError> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Level::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decompress(
    data: &[u8],
    compression: Compression,
    expected_max: usize,
) -> Result<Vec<u8>, BitbaseError> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Deflate => {
            let mut out = Vec::with_capacity(expected_max);
            DeflateDecoder::new(data).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod compress_tests {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let packed = compress(&data, Compression::Deflate).unwrap();
        assert!(packed.len() < data.len());
        let unpacked = decompress(&packed, Compression::Deflate, data.len()).unwrap();
        assert_eq!(data, unpacked);
    }

    #[test]
    fn stored_round_trip() {
        let data = vec![42u8; 64];
        let packed = compress(&data, Compression::None).unwrap();
        assert_eq!(packed, data);
        assert_eq!(decompress(&packed, Compression::None, 64).unwrap(), data);
    }

    #[test]
    fn unknown_codec_is_rejected() {
        assert!(Compression::try_from(7).is_err());
        assert_eq!(Compression::try_from(1).unwrap(), Compression::Deflate);
    }
}
