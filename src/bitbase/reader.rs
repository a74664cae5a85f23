use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::{board::board::Board, types::pieces::Color};

use super::{
    bitbase::Bitbase,
    cluster_cache::ClusterCache,
    file::{self, BitbaseError, FileInfo},
    index::BitbaseIndex,
    piece_list::PieceList,
    signature::{expand_wildcards, PieceSignature},
};

/// Result of a dual-sided probe, from the side-to-move's perspective
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Probe {
    Win,
    Loss,
    Draw,
    Unknown,
}

/// Result of a single-bitbase probe, always from White's view
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SingleProbe {
    Win,
    DrawOrLoss,
    Unknown,
}

/// Cluster cache entries to hold; at the default cluster size this bounds
/// the cache around 64 MB
const CACHE_CAPACITY: usize = 4096;

enum Storage {
    /// The whole bit vector lives in memory
    Memory(Bitbase),
    /// Only the header is resident; clusters stream in through the cache
    Attached { path: PathBuf, info: FileInfo },
}

struct LoadedBitbase {
    storage: Storage,
}

/// Registry of loaded bitbases keyed by material signature. Probes answer
/// from memory, falling back to on-demand cluster reads for attached
/// files. A missing bitbase is never an error; the search just continues
/// on heuristics.
pub struct BitbaseReader {
    bitbases: FxHashMap<PieceSignature, LoadedBitbase>,
    cache: Mutex<ClusterCache>,
    path: PathBuf,
    max_pieces: u32,
}

impl Default for BitbaseReader {
    fn default() -> Self {
        Self::new(Path::new("."))
    }
}

impl BitbaseReader {
    pub fn new(path: &Path) -> Self {
        Self {
            bitbases: FxHashMap::default(),
            cache: Mutex::new(ClusterCache::new(CACHE_CAPACITY)),
            path: path.to_path_buf(),
            max_pieces: 0,
        }
    }

    pub fn set_path(&mut self, path: &Path) {
        self.path = path.to_path_buf();
    }

    pub fn file_name(&self, sig: PieceSignature) -> PathBuf {
        self.path.join(format!("{sig}.btb"))
    }

    /// Largest non-king piece count any loaded bitbase covers; the search
    /// gates its probes on this
    pub fn max_probe_pieces(&self) -> u32 {
        self.max_pieces
    }

    pub fn is_available(&self, sig: PieceSignature) -> bool {
        self.bitbases.contains_key(&sig)
    }

    /// Registers a freshly generated bitbase
    pub fn set_bitbase(&mut self, sig: PieceSignature, bitbase: Bitbase) {
        self.max_pieces = self.max_pieces.max(sig.non_king_pieces());
        self.bitbases.insert(sig, LoadedBitbase { storage: Storage::Memory(bitbase) });
    }

    /// Loads one signature from disk. `full` pulls the entire bit vector
    /// into memory, otherwise clusters stream through the cache on demand.
    /// A missing file is quietly skipped; a malformed one fails loudly and
    /// the signature simply stays unregistered.
    pub fn load(&mut self, sig: PieceSignature, full: bool) -> Result<(), BitbaseError> {
        if self.is_available(sig) {
            return Ok(());
        }
        let path = self.file_name(sig);
        let info = match file::read_file_info(&path) {
            Ok(info) => info,
            Err(BitbaseError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let list = PieceList::from_signature(sig);
        let expected = BitbaseIndex::size_in_bits(&list);
        if info.header.size_in_bits != expected {
            return Err(BitbaseError::SizeMismatch { expected, got: info.header.size_in_bits });
        }

        let storage = if full {
            let bytes = file::read_all(&path, &info)?;
            Storage::Memory(Bitbase::from_bytes(&bytes, expected))
        } else {
            Storage::Attached { path, info }
        };
        self.max_pieces = self.max_pieces.max(sig.non_king_pieces());
        self.bitbases.insert(sig, LoadedBitbase { storage });
        info!("loaded bitbase {sig}");
        Ok(())
    }

    /// Loads every signature a pattern expands to; per-signature failures
    /// are logged and skipped so one bad file cannot take down the rest
    pub fn load_patterns(&mut self, patterns: &[&str], full: bool) {
        for pattern in patterns {
            for name in expand_wildcards(pattern) {
                let Some(sig) = PieceSignature::parse(&name) else { continue };
                if let Err(e) = self.load(sig, full) {
                    warn!("skipping bitbase {name}: {e}");
                }
            }
        }
    }

    fn bit(&self, loaded: &LoadedBitbase, sig: PieceSignature, index: u64) -> bool {
        match &loaded.storage {
            Storage::Memory(bitbase) => bitbase.get(index),
            Storage::Attached { path, info } => {
                let byte_index = index / 8;
                let cluster_bytes = u64::from(info.header.cluster_size_bytes);
                let cluster = (byte_index / cluster_bytes) as u32;
                let within = (byte_index % cluster_bytes) as usize;
                let bit = (index % 8) as u8;

                let mut cache = self.cache.lock().unwrap();
                if let Some(data) = cache.get(sig, cluster) {
                    return data.get(within).is_some_and(|b| b >> bit & 1 != 0);
                }
                drop(cache);

                match file::read_cluster(path, info, cluster) {
                    Ok(data) => {
                        let result = data.get(within).is_some_and(|b| b >> bit & 1 != 0);
                        self.cache.lock().unwrap().insert(sig, cluster, data);
                        result
                    }
                    Err(e) => {
                        warn!("cluster read failed for {sig}: {e}");
                        false
                    }
                }
            }
        }
    }

    /// White-view probe of exactly this signature's bitbase. The initial
    /// generation pass uses it to resolve captures into smaller endings.
    pub fn probe_single(&self, board: &Board) -> SingleProbe {
        let sig = PieceSignature::from_board(board);
        if !sig.has_any_material(Color::White) {
            return SingleProbe::DrawOrLoss;
        }
        let Some(loaded) = self.bitbases.get(&sig) else {
            return SingleProbe::Unknown;
        };
        let list = PieceList::from_board(board);
        let index = BitbaseIndex::from_piece_list(&list, board.stm == Color::White);
        if self.bit(loaded, sig, index) {
            SingleProbe::Win
        } else {
            SingleProbe::DrawOrLoss
        }
    }

    /// Full probe from the side-to-move's perspective. Consults the
    /// position's own bitbase for a white win, then the color-swapped
    /// signature for a black win, and can conclude a draw when the side
    /// that failed to win also lacks mating material.
    pub fn probe_dual(&self, board: &Board) -> Probe {
        if self.bitbases.is_empty() {
            return Probe::Unknown;
        }
        let sig = PieceSignature::from_board(board);
        let wtm = board.stm == Color::White;

        let white_side = self.bitbases.get(&sig);
        if let Some(loaded) = white_side {
            let list = PieceList::from_board(board);
            let index = BitbaseIndex::from_piece_list(&list, wtm);
            if self.bit(loaded, sig, index) {
                return if wtm { Probe::Win } else { Probe::Loss };
            }
            // White cannot win here; if black cannot possibly mate either,
            // the game is dead
            if !sig.has_enough_material_to_mate(Color::Black) {
                return Probe::Draw;
            }
        }

        let sym_sig = sig.symmetric();
        let black_side = self.bitbases.get(&sym_sig);
        if let Some(loaded) = black_side {
            let sym_list = PieceList::from_board(board).to_symmetric();
            let index = BitbaseIndex::from_piece_list(&sym_list, !wtm);
            if self.bit(loaded, sym_sig, index) {
                return if wtm { Probe::Loss } else { Probe::Win };
            }
            if !sym_sig.has_enough_material_to_mate(Color::Black) {
                return Probe::Draw;
            }
        }

        if white_side.is_some() && black_side.is_some() {
            Probe::Draw
        } else {
            Probe::Unknown
        }
    }
}
