use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

use super::{bitbase::Bitbase, index::BitbaseIndex, piece_list::PieceList};

/// Working state while one material signature is being generated: three
/// bitmaps over the same index space plus counters. `won` carries the
/// final result; `computed` marks indices settled one way or the other;
/// `candidates` marks positions a later sweep must revisit.
pub struct GenerationState {
    size_in_bits: u64,
    won: Bitbase,
    computed: Bitbase,
    candidates: Bitbase,
    won_count: AtomicU64,
    draw_or_loss_count: AtomicU64,
    illegal_count: AtomicU64,
    piece_list: PieceList,
}

impl GenerationState {
    pub fn new(piece_list: PieceList) -> Self {
        let size_in_bits = BitbaseIndex::size_in_bits(&piece_list);
        Self {
            size_in_bits,
            won: Bitbase::new(size_in_bits),
            computed: Bitbase::new(size_in_bits),
            candidates: Bitbase::new(size_in_bits),
            won_count: AtomicU64::new(0),
            draw_or_loss_count: AtomicU64::new(0),
            illegal_count: AtomicU64::new(0),
            piece_list,
        }
    }

    pub fn piece_list(&self) -> &PieceList {
        &self.piece_list
    }

    pub const fn size_in_bits(&self) -> u64 {
        self.size_in_bits
    }

    pub fn won_positions(&self) -> &Bitbase {
        &self.won
    }

    pub fn into_won_positions(self) -> Bitbase {
        self.won
    }

    /// Whether a sweep should look at this index. The first pass visits
    /// everything unsettled, later passes only flagged candidates.
    pub fn is_position_to_check(&self, index: u64, only_candidates: bool) -> bool {
        !self.computed.get(index) && (!only_candidates || self.candidates.get(index))
    }

    pub fn is_candidate(&self, index: u64) -> bool {
        self.candidates.get(index)
    }

    pub fn set_candidates(&self, indices: &[u64]) {
        for &index in indices {
            if index < self.size_in_bits {
                self.candidates.set(index);
            }
        }
    }

    pub fn clear_candidate(&self, index: u64) {
        self.candidates.clear_bit(index);
    }

    pub fn set_win(&self, index: u64) {
        self.won_count.fetch_add(1, Ordering::Relaxed);
        self.won.set(index);
        self.computed.set(index);
    }

    pub fn set_draw_or_loss(&self, index: u64) {
        self.draw_or_loss_count.fetch_add(1, Ordering::Relaxed);
        self.computed.set(index);
    }

    pub fn set_illegal(&self, index: u64) {
        self.illegal_count.fetch_add(1, Ordering::Relaxed);
        self.computed.set(index);
    }

    pub fn won_count(&self) -> u64 {
        self.won_count.load(Ordering::Relaxed)
    }

    pub fn log_statistics(&self, name: &str) {
        let won = self.won_count();
        let illegal = self.illegal_count.load(Ordering::Relaxed);
        let settled_not_won = self.draw_or_loss_count.load(Ordering::Relaxed);
        info!(
            "{name}: won {won} ({}%), draw or loss {settled_not_won}, illegal {illegal} ({}%), {} bits",
            won * 100 / self.size_in_bits.max(1),
            illegal * 100 / self.size_in_bits.max(1),
            self.size_in_bits,
        );
        debug_assert_eq!(won, self.won.count_set());
    }
}
