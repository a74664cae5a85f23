use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use super::compress::{compress, decompress, Compression};

pub const MAGIC_1: u32 = 0x4C50_4151; // "QAPL"
pub const MAGIC_2: u32 = 0x4249_4241; // "ABIB"
pub const CURRENT_VERSION: u32 = 1;
/// Uncompressed cluster payload
pub const DEFAULT_CLUSTER_BYTES: u32 = 16 * 1024;

const HEADER_BYTES: usize = 40;

#[derive(Debug, Error)]
pub enum BitbaseError {
    #[error("bitbase file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("bad magic number (not a bitbase file)")]
    BadMagic,
    #[error("unsupported bitbase version {0}")]
    BadVersion(u32),
    #[error("unknown compression id {0}")]
    UnknownCompression(u32),
    #[error("bitbase holds {got} bits, expected {expected}")]
    SizeMismatch { expected: u64, got: u64 },
    #[error("cluster {0} is corrupt")]
    CorruptCluster(u32),
    #[error("written file does not read back identically")]
    VerifyFailed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The 40-byte leading header: two magics, version, codec id, uncompressed
/// cluster size, cluster count, 64-bit total bit count, and a reserved
/// word. Everything little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub compression: Compression,
    pub cluster_size_bytes: u32,
    pub cluster_count: u32,
    pub size_in_bits: u64,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        out[0..4].copy_from_slice(&MAGIC_1.to_le_bytes());
        out[4..8].copy_from_slice(&MAGIC_2.to_le_bytes());
        out[8..12].copy_from_slice(&CURRENT_VERSION.to_le_bytes());
        out[12..16].copy_from_slice(&(self.compression as u32).to_le_bytes());
        out[16..20].copy_from_slice(&self.cluster_size_bytes.to_le_bytes());
        out[20..24].copy_from_slice(&self.cluster_count.to_le_bytes());
        out[24..32].copy_from_slice(&self.size_in_bits.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; HEADER_BYTES]) -> Result<Self, BitbaseError> {
        let word = |i: usize| u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());
        if word(0) != MAGIC_1 || word(4) != MAGIC_2 {
            return Err(BitbaseError::BadMagic);
        }
        let version = word(8);
        if version != CURRENT_VERSION {
            return Err(BitbaseError::BadVersion(version));
        }
        Ok(Self {
            compression: Compression::try_from(word(12))?,
            cluster_size_bytes: word(16),
            cluster_count: word(20),
            size_in_bits: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        })
    }
}

/// Header plus the absolute byte offsets of each compressed cluster; entry
/// `i+1` marks where cluster `i` ends
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub header: Header,
    pub offsets: Vec<u64>,
}

/// Splits the payload into clusters, compresses each, and writes header,
/// offset table and clusters to a temporary file that is atomically
/// renamed into place once it verifies.
pub fn write(
    path: &Path,
    data: &[u8],
    size_in_bits: u64,
    cluster_size_bytes: u32,
    compression: Compression,
) -> Result<(), BitbaseError> {
    assert!(cluster_size_bytes > 0, "cluster size must be positive");
    let cluster_count = data.len().div_ceil(cluster_size_bytes as usize);

    let mut compressed_clusters = Vec::with_capacity(cluster_count);
    for chunk in data.chunks(cluster_size_bytes as usize) {
        compressed_clusters.push(compress(chunk, compression)?);
    }

    let table_start = (HEADER_BYTES + (cluster_count + 1) * 8) as u64;
    let mut offsets = Vec::with_capacity(cluster_count + 1);
    let mut offset = table_start;
    offsets.push(offset);
    for cluster in &compressed_clusters {
        offset += cluster.len() as u64;
        offsets.push(offset);
    }

    let header = Header {
        compression,
        cluster_size_bytes,
        cluster_count: cluster_count as u32,
        size_in_bits,
    };

    let tmp = path.with_extension("tmp");
    {
        let mut out = File::create(&tmp)?;
        out.write_all(&header.to_bytes())?;
        for off in &offsets {
            out.write_all(&off.to_le_bytes())?;
        }
        for cluster in &compressed_clusters {
            out.write_all(cluster)?;
        }
        out.sync_all()?;
    }

    // Read the temp file back before committing it
    let info = read_file_info(&tmp)?;
    let read_back = read_all(&tmp, &info)?;
    if read_back != data {
        fs::remove_file(&tmp).ok();
        return Err(BitbaseError::VerifyFailed);
    }

    fs::rename(&tmp, path)?;
    debug!("wrote bitbase {} ({} clusters, {} bits)", path.display(), cluster_count, size_in_bits);
    Ok(())
}

pub fn read_file_info(path: &Path) -> Result<FileInfo, BitbaseError> {
    let mut file = open(path)?;
    let mut header_bytes = [0u8; HEADER_BYTES];
    file.read_exact(&mut header_bytes)?;
    let header = Header::from_bytes(&header_bytes)?;

    let offset_count = header.cluster_count as usize + 1;
    let mut table = vec![0u8; offset_count * 8];
    file.read_exact(&mut table)?;
    let offsets = table.chunks_exact(8).map(|c| u64::from_le_bytes(c.try_into().unwrap())).collect();

    Ok(FileInfo { header, offsets })
}

/// Random access to one decompressed cluster
pub fn read_cluster(path: &Path, info: &FileInfo, cluster_index: u32) -> Result<Vec<u8>, BitbaseError> {
    let idx = cluster_index as usize;
    if idx + 1 >= info.offsets.len() {
        return Err(BitbaseError::CorruptCluster(cluster_index));
    }
    let start = info.offsets[idx];
    let end = info.offsets[idx + 1];
    if end < start {
        return Err(BitbaseError::CorruptCluster(cluster_index));
    }

    let mut file = open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut compressed = vec![0u8; (end - start) as usize];
    file.read_exact(&mut compressed)?;

    let data = decompress(&compressed, info.header.compression, info.header.cluster_size_bytes as usize)?;
    if data.len() > info.header.cluster_size_bytes as usize || data.is_empty() {
        return Err(BitbaseError::CorruptCluster(cluster_index));
    }
    Ok(data)
}

pub fn read_all(path: &Path, info: &FileInfo) -> Result<Vec<u8>, BitbaseError> {
    let expected = (info.header.size_in_bits as usize).div_ceil(8);
    let mut data = Vec::with_capacity(expected);
    for cluster in 0..info.header.cluster_count {
        data.extend_from_slice(&read_cluster(path, info, cluster)?);
    }
    if data.len() < expected {
        return Err(BitbaseError::SizeMismatch {
            expected: info.header.size_in_bits,
            got: data.len() as u64 * 8,
        });
    }
    data.truncate(expected);
    Ok(data)
}

fn open(path: &Path) -> Result<File, BitbaseError> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            BitbaseError::NotFound(path.to_path_buf())
        } else {
            BitbaseError::Io(e)
        }
    })
}

#[cfg(test)]
mod file_tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("aplite_bitbase_files");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn write_and_read_all() {
        for compression in [Compression::None, Compression::Deflate] {
            let path = temp_path(&format!("roundtrip_{}.btb", compression as u32));
            let data = sample_data(40_000);
            write(&path, &data, data.len() as u64 * 8, DEFAULT_CLUSTER_BYTES, compression).unwrap();

            let info = read_file_info(&path).unwrap();
            assert_eq!(info.header.cluster_count, 3);
            assert_eq!(info.header.size_in_bits, 320_000);
            assert_eq!(read_all(&path, &info).unwrap(), data);
            fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn header_layout_is_bit_exact() {
        let path = temp_path("layout.btb");
        let data = sample_data(100);
        write(&path, &data, 800, DEFAULT_CLUSTER_BYTES, Compression::None).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &0x4C50_4151u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0x4249_4241u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &DEFAULT_CLUSTER_BYTES.to_le_bytes());
        assert_eq!(&bytes[20..24], &1u32.to_le_bytes());
        assert_eq!(&bytes[24..32], &800u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &[0u8; 8]);
        // One cluster: offsets point past header + two table entries
        let first_offset = u64::from_le_bytes(bytes[40..48].try_into().unwrap());
        assert_eq!(first_offset, 40 + 16);
        let end_offset = u64::from_le_bytes(bytes[48..56].try_into().unwrap());
        assert_eq!(end_offset, first_offset + 100);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn random_cluster_access() {
        let path = temp_path("random.btb");
        let data = sample_data(3 * DEFAULT_CLUSTER_BYTES as usize + 17);
        write(&path, &data, data.len() as u64 * 8, DEFAULT_CLUSTER_BYTES, Compression::Deflate).unwrap();

        let info = read_file_info(&path).unwrap();
        assert_eq!(info.header.cluster_count, 4);
        let second = read_cluster(&path, &info, 1).unwrap();
        assert_eq!(second.len(), DEFAULT_CLUSTER_BYTES as usize);
        assert_eq!(
            second,
            data[DEFAULT_CLUSTER_BYTES as usize..2 * DEFAULT_CLUSTER_BYTES as usize].to_vec()
        );
        let last = read_cluster(&path, &info, 3).unwrap();
        assert_eq!(last.len(), 17);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn bad_magic_is_fatal() {
        let path = temp_path("badmagic.btb");
        fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(matches!(read_file_info(&path), Err(BitbaseError::BadMagic)));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = temp_path("does_not_exist.btb");
        assert!(matches!(read_file_info(&path), Err(BitbaseError::NotFound(_))));
    }
}
