use arrayvec::ArrayVec;
use std::ops::{Index, IndexMut};

use crate::moves::moves::Move;

use self::search::MAX_SEARCH_DEPTH;

pub mod aspiration;
pub mod clock;
pub mod history;
pub mod quiescence;
pub mod search;
pub mod see;
pub mod thread;

pub const NUM_KILLER_MOVES: usize = 2;

/// Everything the search keeps per ply. Frames are plain values in a flat
/// array indexed by ply, so no frame ever borrows from another.
#[derive(Clone, Copy, Default)]
pub(crate) struct PlyEntry {
    /// Quiet moves that produced a cutoff at this ply in a sibling node
    pub killers: [Move; NUM_KILLER_MOVES],
    /// Capture that produced a cutoff at this ply, kept apart from the
    /// quiet killers
    pub capture_killer: Move,
    pub played_move: Move,
    pub static_eval: i32,
    /// Move being excluded by a singular verification search
    pub singular: Move,
    /// Blocks a second null move directly after a failed verification
    pub forbid_null: bool,
}

#[derive(Clone, Default)]
pub struct PV {
    pub line: ArrayVec<Move, { MAX_SEARCH_DEPTH as usize }>,
}

impl PV {
    pub fn update(&mut self, m: Move, other: &PV) {
        self.line.clear();
        self.line.push(m);
        self.line.extend(other.line.iter().copied());
    }
}

#[derive(Clone)]
pub(crate) struct SearchStack {
    stack: [PlyEntry; MAX_SEARCH_DEPTH as usize + 4],
}

impl SearchStack {
    pub fn prev_move(&self, ply: i32) -> Move {
        if ply < 0 {
            Move::EMPTY
        } else {
            self.stack.get(ply as usize).map_or(Move::EMPTY, |e| e.played_move)
        }
    }
}

impl Default for SearchStack {
    fn default() -> Self {
        Self { stack: [PlyEntry::default(); MAX_SEARCH_DEPTH as usize + 4] }
    }
}

impl Index<i32> for SearchStack {
    type Output = PlyEntry;

    fn index(&self, index: i32) -> &Self::Output {
        &self.stack[index as usize]
    }
}

impl IndexMut<i32> for SearchStack {
    fn index_mut(&mut self, index: i32) -> &mut Self::Output {
        &mut self.stack[index as usize]
    }
}

/// Late-move reductions follow a ln(depth)·ln(moves) surface built once at
/// startup
pub struct LmrTable {
    table: [[i32; 64]; 64],
}

impl Default for LmrTable {
    fn default() -> Self {
        let mut lmr = Self { table: [[0; 64]; 64] };
        for depth in 1..64 {
            for moves_played in 1..64 {
                let reduction = (0.89 + (depth as f32).ln() * (moves_played as f32).ln() / 1.99) as i32;
                lmr.table[depth][moves_played] = reduction;
            }
        }
        lmr
    }
}

impl LmrTable {
    pub(crate) fn base_reduction(&self, depth: i32, moves_played: i32) -> i32 {
        self.table[(depth.max(0) as usize).min(63)][(moves_played.max(0) as usize).min(63)]
    }
}

#[cfg(test)]
mod lmr_tests {
    use super::*;

    #[test]
    fn reductions_grow_with_depth_and_moves() {
        let lmr = LmrTable::default();
        assert_eq!(lmr.base_reduction(1, 1), 0);
        assert!(lmr.base_reduction(20, 20) > lmr.base_reduction(4, 4));
        assert!(lmr.base_reduction(63, 63) >= lmr.base_reduction(63, 10));
        // Out of range indexes clamp instead of panicking
        let _ = lmr.base_reduction(400, 400);
    }
}
