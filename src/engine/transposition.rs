use crate::{moves::moves::Move, search::search::NEAR_CHECKMATE};
use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

/// One table record, packed into two 64-bit words so that a store is two
/// plain writes and a racing reader that sees a torn pair fails the tag
/// check and discards it.
///
/// key word:  bits 0-31 move, bits 32-63 high half of the zobrist hash
/// data word: bits 0-15 score, 16-31 static eval, 32-40 depth,
///            41-42 bound, 43 pv flag, 44 null-move-threat flag, 45-48 age
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableEntry {
    key: u64,
    data: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryFlag {
    #[default]
    None = 0,
    /// Upper bound on the score of the position
    AlphaUnchanged = 1,
    /// Lower bound on the score of the position
    BetaCutOff = 2,
    Exact = 3,
}

impl From<u64> for EntryFlag {
    fn from(value: u64) -> Self {
        match value & 0b11 {
            0 => Self::None,
            1 => Self::AlphaUnchanged,
            2 => Self::BetaCutOff,
            3 => Self::Exact,
            _ => unreachable!(),
        }
    }
}

impl TableEntry {
    #[allow(clippy::too_many_arguments)]
    fn new(
        hash: u64,
        m: Move,
        depth: i32,
        flag: EntryFlag,
        score: i32,
        is_pv: bool,
        threat: bool,
        static_eval: i32,
        age: u64,
    ) -> Self {
        debug_assert!((0..512).contains(&depth));
        let key = (hash >> 32) << 32 | u64::from(m.0);
        let data = (score as i16 as u16 as u64)
            | (static_eval as i16 as u16 as u64) << 16
            | (depth as u64) << 32
            | (flag as u64) << 41
            | u64::from(is_pv) << 43
            | u64::from(threat) << 44
            | age << 45;
        Self { key, data }
    }

    pub const fn tag(self) -> u32 {
        (self.key >> 32) as u32
    }

    pub fn best_move(self) -> Move {
        Move(self.key as u32)
    }

    pub const fn search_score(self) -> i32 {
        self.data as u16 as i16 as i32
    }

    pub const fn static_eval(self) -> i32 {
        (self.data >> 16) as u16 as i16 as i32
    }

    pub const fn depth(self) -> i32 {
        (self.data >> 32 & 0x1FF) as i32
    }

    pub fn flag(self) -> EntryFlag {
        EntryFlag::from(self.data >> 41)
    }

    pub const fn was_pv(self) -> bool {
        self.data >> 43 & 1 != 0
    }

    pub const fn null_move_threat(self) -> bool {
        self.data >> 44 & 1 != 0
    }

    const fn age(self) -> u64 {
        self.data >> 45 & 0b1111
    }

    const fn is_occupied(self) -> bool {
        self.data != 0 || self.key != 0
    }
}

/// Two slots per bucket: index 0 prefers depth, index 1 is always-replace
struct Bucket {
    keys: [AtomicU64; 2],
    datas: [AtomicU64; 2],
}

impl Bucket {
    fn read(&self, slot: usize) -> TableEntry {
        TableEntry {
            key: self.keys[slot].load(Ordering::Relaxed),
            data: self.datas[slot].load(Ordering::Relaxed),
        }
    }

    fn write(&self, slot: usize, entry: TableEntry) {
        self.datas[slot].store(entry.data, Ordering::Relaxed);
        self.keys[slot].store(entry.key, Ordering::Relaxed);
    }

    fn clear(&self) {
        for slot in 0..2 {
            self.keys[slot].store(0, Ordering::Relaxed);
            self.datas[slot].store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            keys: [AtomicU64::new(0), AtomicU64::new(0)],
            datas: [AtomicU64::new(0), AtomicU64::new(0)],
        }
    }
}

pub struct TranspositionTable {
    buckets: Box<[Bucket]>,
    age: AtomicU64,
}

pub const DEFAULT_TABLE_SIZE_MB: usize = 16;
const BYTES_PER_MB: usize = 1024 * 1024;
const ENTRY_SIZE: usize = 16;
const MAX_AGE: u64 = (1 << 4) - 1;

impl TranspositionTable {
    pub fn new(mb: usize) -> Self {
        let entries = (mb.max(1) * BYTES_PER_MB / ENTRY_SIZE) & !1;
        let bucket_count = entries / 2;
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Bucket::default);
        Self { buckets: buckets.into_boxed_slice(), age: AtomicU64::new(0) }
    }

    fn bucket(&self, hash: u64) -> &Bucket {
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    pub fn clear(&self) {
        self.buckets.iter().for_each(Bucket::clear);
        self.age.store(0, Ordering::Relaxed);
    }

    fn age(&self) -> u64 {
        self.age.load(Ordering::Relaxed)
    }

    /// Called once per root search so stale entries lose their replacement
    /// priority
    pub fn age_up(&self) {
        self.age.store((self.age() + 1) & MAX_AGE, Ordering::Relaxed);
    }

    pub fn get(&self, hash: u64, ply: i32) -> Option<TableEntry> {
        let bucket = self.bucket(hash);
        let tag = (hash >> 32) as u32;

        for slot in 0..2 {
            let mut entry = bucket.read(slot);
            if entry.tag() == tag && entry.is_occupied() {
                // Mate scores are stored relative to this node and converted
                // back to be root-relative
                let score = entry.search_score();
                if score > NEAR_CHECKMATE {
                    entry.data = entry.data & !0xFFFF | ((score - ply) as i16 as u16 as u64);
                } else if score < -NEAR_CHECKMATE {
                    entry.data = entry.data & !0xFFFF | ((score + ply) as i16 as u16 as u64);
                }
                return Some(entry);
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        hash: u64,
        m: Move,
        depth: i32,
        flag: EntryFlag,
        mut score: i32,
        ply: i32,
        is_pv: bool,
        threat: bool,
        static_eval: i32,
    ) {
        let bucket = self.bucket(hash);
        let tag = (hash >> 32) as u32;
        let age = self.age();

        if score > NEAR_CHECKMATE {
            score += ply;
        } else if score < -NEAR_CHECKMATE {
            score -= ply;
        }

        let depth_slot = bucket.read(0);
        // Keep a known best move when the new search produced none
        let m = if m.is_empty() && depth_slot.tag() == tag { depth_slot.best_move() } else { m };
        let entry = TableEntry::new(hash, m, depth, flag, score, is_pv, threat, static_eval, age);

        let replace_depth_slot = !depth_slot.is_occupied()
            || depth_slot.age() != age
            || (depth_slot.tag() == tag && depth >= depth_slot.depth())
            || (is_pv && !depth_slot.was_pv())
            || (flag == EntryFlag::Exact && depth_slot.flag() != EntryFlag::Exact && depth + 2 >= depth_slot.depth());

        if replace_depth_slot {
            bucket.write(0, entry);
            return;
        }

        let always_slot = bucket.read(1);
        if always_slot.tag() != tag || depth >= always_slot.depth() || always_slot.age() != age {
            bucket.write(1, entry);
        }
    }

    /// Portion of sampled entries written during the current search, in
    /// permille, as reported over UCI
    pub fn permille_usage(&self) -> usize {
        self.buckets
            .iter()
            .take(500)
            .flat_map(|b| [b.read(0), b.read(1)])
            .filter(|e| e.is_occupied() && e.depth() > 0 && e.age() == self.age())
            .count()
    }

    /// Writes the whole table to disk: entry count (i64), age (i32),
    /// occupied count (i32), then every entry as two little-endian words
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = Vec::with_capacity(16 + self.buckets.len() * 2 * ENTRY_SIZE);
        let entries = self.buckets.len() as i64 * 2;
        out.extend_from_slice(&entries.to_le_bytes());
        out.extend_from_slice(&(self.age() as i32).to_le_bytes());
        let occupied = self.buckets.iter().flat_map(|b| [b.read(0), b.read(1)]).filter(|e| e.is_occupied()).count();
        out.extend_from_slice(&(occupied as i32).to_le_bytes());
        for bucket in self.buckets.iter() {
            for slot in 0..2 {
                let e = bucket.read(slot);
                out.extend_from_slice(&e.key.to_le_bytes());
                out.extend_from_slice(&e.data.to_le_bytes());
            }
        }
        File::create(path)?.write_all(&out)
    }

    /// Restores a table previously written by `save`. The restored table
    /// adopts the file's size, which may differ from the current one.
    pub fn load(path: &Path) -> io::Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        if bytes.len() < 16 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated table file"));
        }
        let entries = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let age = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if entries <= 0 || entries % 2 != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad entry count"));
        }
        let expected = 16 + entries as usize * ENTRY_SIZE;
        if bytes.len() < expected {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated table file"));
        }

        let bucket_count = entries as usize / 2;
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Bucket::default);
        let table = Self { buckets: buckets.into_boxed_slice(), age: AtomicU64::new(age as u64 & MAX_AGE) };

        let mut offset = 16;
        for bucket in table.buckets.iter() {
            for slot in 0..2 {
                let key = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
                let data = u64::from_le_bytes(bytes[offset + 8..offset + 16].try_into().unwrap());
                bucket.write(slot, TableEntry { key, data });
                offset += 16;
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod transpos_tests {
    use super::*;
    use crate::{
        board::{board::Board, fen::STARTING_FEN},
        moves::moves::{Move, MoveType},
        search::search::CHECKMATE,
        types::{pieces::Piece, square::Square},
    };

    fn any_move() -> Move {
        Move::new(Square(12), Square(28), MoveType::Normal, Piece::WhitePawn, Piece::None)
    }

    #[test]
    fn store_then_get() {
        let b = Board::from_fen(STARTING_FEN);
        let table = TranspositionTable::new(4);
        assert!(table.get(b.zobrist_hash, 4).is_none());

        let m = any_move();
        table.store(b.zobrist_hash, m, 3, EntryFlag::Exact, 25, 4, false, false, 17);
        let entry = table.get(b.zobrist_hash, 2).unwrap();
        assert_eq!(entry.search_score(), 25);
        assert_eq!(entry.static_eval(), 17);
        assert_eq!(entry.depth(), 3);
        assert_eq!(entry.flag(), EntryFlag::Exact);
        assert_eq!(entry.best_move(), m);
    }

    #[test]
    fn mate_scores_are_ply_adjusted() {
        let table = TranspositionTable::new(4);
        let m = any_move();

        let ply = 15;
        let mated_score = -CHECKMATE + ply;
        table.store(0, m, 0, EntryFlag::Exact, mated_score, ply, false, false, 25);
        assert_eq!(table.get(0, 2).unwrap().search_score(), -CHECKMATE + 2);

        table.clear();
        let ply = 12;
        let found_mate = CHECKMATE - ply;
        table.store(0, m, 0, EntryFlag::Exact, found_mate, ply, false, false, 25);
        assert_eq!(table.get(0, 4).unwrap().search_score(), CHECKMATE - 4);
    }

    #[test]
    fn tt_round_trip_is_exact() {
        let table = TranspositionTable::new(4);
        let m = any_move();
        for score in [-500, -1, 0, 3, 999] {
            table.clear();
            table.store(0xDEAD_BEEF_0000_1234, m, 7, EntryFlag::BetaCutOff, score, 9, true, false, -42);
            let e = table.get(0xDEAD_BEEF_0000_1234, 9).unwrap();
            assert_eq!(e.search_score(), score);
            assert_eq!(e.static_eval(), -42);
            assert!(e.was_pv());
            assert!(!e.null_move_threat());
        }
    }

    #[test]
    fn deeper_entry_survives_in_depth_slot() {
        let table = TranspositionTable::new(1);
        let m = any_move();
        let hash = 0xAAAA_BBBB_0000_0001u64;
        table.store(hash, m, 9, EntryFlag::Exact, 50, 0, true, false, 0);
        // A shallow non-pv entry for the same hash must not evict the deep one
        table.store(hash, Move::EMPTY, 1, EntryFlag::AlphaUnchanged, 10, 0, false, false, 0);
        let e = table.get(hash, 0).unwrap();
        assert_eq!(e.depth(), 9);
        assert_eq!(e.search_score(), 50);
    }

    #[test]
    fn persistence_round_trip() {
        let dir = std::env::temp_dir().join("aplite_tt_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("table.bin");

        let table = TranspositionTable::new(1);
        let m = any_move();
        table.store(0x1234_5678_0000_0042, m, 5, EntryFlag::Exact, 77, 0, false, false, 33);
        table.save(&path).unwrap();

        let restored = TranspositionTable::load(&path).unwrap();
        let e = restored.get(0x1234_5678_0000_0042, 0).unwrap();
        assert_eq!(e.search_score(), 77);
        assert_eq!(e.depth(), 5);
        std::fs::remove_file(&path).unwrap();
    }
}
