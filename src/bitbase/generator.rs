use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    board::board::Board,
    moves::{
        attack_boards::{king_attacks, knight_attacks},
        magics::{bishop_attacks, queen_attacks, rook_attacks},
        movegenerator::generate_legal_moves,
    },
    types::{
        bitboard::Bitboard,
        pieces::{Color, PieceName},
        square::Square,
    },
};

use super::{
    compress::Compression,
    file::{self, BitbaseError, DEFAULT_CLUSTER_BYTES},
    generation_state::GenerationState,
    index::BitbaseIndex,
    piece_list::PieceList,
    reader::{BitbaseReader, SingleProbe},
    signature::expand_wildcards,
};

/// Sweeps before the fixed point is declared stuck; real signatures
/// converge orders of magnitude sooner
const MAX_SWEEPS: u32 = 1024;

/// Offline retrograde generator. Produces the "White wins" bitbase for a
/// material signature, recursively generating every smaller signature the
/// material can convert into first.
pub struct BitbaseGenerator {
    pub threads: usize,
    pub compression: Compression,
    pub cluster_bytes: u32,
}

impl Default for BitbaseGenerator {
    fn default() -> Self {
        Self { threads: 1, compression: Compression::Deflate, cluster_bytes: DEFAULT_CLUSTER_BYTES }
    }
}

impl BitbaseGenerator {
    /// Generates every signature a wildcard pattern expands to. Failures
    /// are per-signature: one broken ending is logged and the rest proceed.
    pub fn generate_patterns(&self, patterns: &[&str], reader: &mut BitbaseReader) {
        for pattern in patterns {
            for name in expand_wildcards(pattern) {
                let Some(list) = PieceList::from_string(&name) else {
                    warn!("not a piece string: {name}");
                    continue;
                };
                if let Err(e) = self.generate_recursive(&list, reader) {
                    warn!("generation of {name} failed: {e}");
                }
            }
        }
    }

    /// Generates all prerequisite endings (every capture and promotion
    /// target), then the signature itself
    pub fn generate_recursive(
        &self,
        list: &PieceList,
        reader: &mut BitbaseReader,
    ) -> Result<(), BitbaseError> {
        if list.num_pieces() <= 2 {
            return Ok(());
        }
        let sig = list.signature();
        if reader.is_available(sig) {
            return Ok(());
        }
        // A file from a previous run is good enough
        if let Err(e) = reader.load(sig, true) {
            warn!("ignoring existing bitbase for {sig}: {e}");
        }
        if reader.is_available(sig) {
            return Ok(());
        }

        for piece_no in 2..list.num_pieces() {
            if list.piece(piece_no).name() == PieceName::Pawn {
                for promo in [PieceName::Queen, PieceName::Rook, PieceName::Bishop, PieceName::Knight] {
                    let mut promoted = list.clone();
                    promoted.promote_pawn(piece_no, promo);
                    self.generate_recursive(&promoted, reader)?;
                }
            }
            let mut reduced = list.clone();
            reduced.remove_piece(piece_no);
            self.generate_recursive(&reduced, reader)?;
        }

        self.compute_bitbase(list, reader)
    }

    /// Retrograde computation of one signature, assuming every smaller
    /// ending is already available through the reader
    fn compute_bitbase(&self, list: &PieceList, reader: &mut BitbaseReader) -> Result<(), BitbaseError> {
        let sig = list.signature();
        let state = GenerationState::new(list.clone());
        let started = Instant::now();
        info!("computing bitbase {sig} ({} positions, {} threads)", state.size_in_bits(), self.threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads.max(1))
            .build()
            .expect("failed to build worker pool");

        pool.install(|| self.initial_pass(&state, reader));
        state.log_statistics("initial pass");

        pool.install(|| self.fixed_point(&state));
        state.log_statistics("fixed point");
        info!("finished {sig} in {:.1}s", started.elapsed().as_secs_f64());

        let path = reader.file_name(sig);
        let won = state.into_won_positions();
        file::write(&path, &won.to_bytes(), won.size_in_bits(), self.cluster_bytes, self.compression)?;
        reader.set_bitbase(sig, won);
        Ok(())
    }

    /// Workers partition the index range and settle what a single ply can:
    /// illegal placements, mates, stalemates, and conversions into known
    /// smaller endings via capture or promotion
    fn initial_pass(&self, state: &GenerationState, reader: &BitbaseReader) {
        let list = state.piece_list();
        index_ranges(state.size_in_bits()).into_par_iter().for_each(|range| {
            for index in range {
                let rec = BitbaseIndex::reconstruct(index, list);
                if !rec.is_legal() {
                    state.set_illegal(index);
                    continue;
                }
                let board = board_from_index(&rec, list);
                // The side that is not to move may not stand in check
                if board.square_under_attack(board.stm, board.king_square(!board.stm)) {
                    state.set_illegal(index);
                    continue;
                }
                initial_compute_position(index, &board, state, reader);
            }
        });
    }

    /// Sweeps until no new wins are found. Each newly won position flags
    /// its pseudo-predecessors as candidates for the next sweep, so later
    /// sweeps only touch a shrinking frontier.
    fn fixed_point(&self, state: &GenerationState) {
        let list = state.piece_list();
        for sweep in 0..MAX_SWEEPS {
            let changed: u64 = index_ranges(state.size_in_bits())
                .into_par_iter()
                .map(|range| {
                    let mut local_changed = 0;
                    for index in range {
                        if !state.is_position_to_check(index, sweep > 0) {
                            continue;
                        }
                        let rec = BitbaseIndex::reconstruct(index, list);
                        debug_assert!(rec.is_legal());
                        let board = board_from_index(&rec, list);

                        if position_is_won(&board, state) {
                            state.set_win(index);
                            state.set_candidates(&predecessors(&board));
                            local_changed += 1;
                        }
                        state.clear_candidate(index);
                    }
                    local_changed
                })
                .sum();

            info!("sweep {sweep}: {changed} new wins, {} total", state.won_count());
            if changed == 0 {
                break;
            }
        }
    }
}

/// Splits the index space into worker-sized chunks
fn index_ranges(size: u64) -> Vec<std::ops::Range<u64>> {
    const CHUNK: u64 = 1 << 14;
    let mut ranges = Vec::with_capacity((size / CHUNK + 1) as usize);
    let mut start = 0;
    while start < size {
        ranges.push(start..(start + CHUNK).min(size));
        start += CHUNK;
    }
    ranges
}

/// Places the decoded squares on an empty board
pub(super) fn board_from_index(rec: &BitbaseIndex, list: &PieceList) -> Board {
    let mut board = Board::empty();
    for no in 0..list.num_pieces() {
        board.place_piece(list.piece(no), rec.square(no));
    }
    board.stm = if rec.white_to_move() { Color::White } else { Color::Black };
    board.zobrist_hash = board.generate_hash();
    board.refresh_masks();
    board
}

fn initial_compute_position(index: u64, board: &Board, state: &GenerationState, reader: &BitbaseReader) {
    let legal_moves = generate_legal_moves(board);
    let wtm = board.stm == Color::White;

    if legal_moves.is_empty() {
        // Mate against black is the only win a single ply can prove
        if !wtm && board.in_check() {
            state.set_win(index);
        } else {
            state.set_draw_or_loss(index);
        }
        return;
    }

    // Captures and promotions leave this index space; the smaller bitbases
    // give their exact value
    for entry in legal_moves.iter().filter(|e| e.m.is_tactical()) {
        let mut new_b = *board;
        let legal = new_b.make_move(entry.m);
        debug_assert!(legal);
        let white_wins = reader.probe_single(&new_b) == SingleProbe::Win;
        if wtm && white_wins {
            state.set_win(index);
            return;
        }
        if !wtm && !white_wins {
            // Black converts into an ending white cannot win
            state.set_draw_or_loss(index);
            return;
        }
    }
}

/// One retrograde step inside the same material: the position is won for
/// White exactly when the mover can reach (white to move) or cannot avoid
/// (black to move) an index already marked won. Captures and promotions
/// were settled by the initial pass and are skipped here.
fn position_is_won(board: &Board, state: &GenerationState) -> bool {
    let wtm = board.stm == Color::White;
    let result = !wtm;

    for entry in generate_legal_moves(board).iter().filter(|e| !e.m.is_tactical()) {
        let mut new_b = *board;
        let legal = new_b.make_move(entry.m);
        debug_assert!(legal);
        let after = PieceList::from_board(&new_b);
        let after_index = BitbaseIndex::from_piece_list(&after, new_b.stm == Color::White);
        let white_wins = state.won_positions().get(after_index);

        if wtm && white_wins {
            return true;
        }
        if !wtm && !white_wins {
            return false;
        }
    }
    result
}

/// Pseudo-reverse moves: indices of every position that could have moved
/// into this one, ignoring checks and uncaptures. Pieces of the side that
/// just moved are walked backwards onto empty squares.
fn predecessors(board: &Board) -> Vec<u64> {
    let mover = !board.stm;
    let occupied = board.occupancies();
    let base_list = PieceList::from_board(board);
    let mut result = Vec::new();

    let mut push = |piece_no: usize, destination: Square| {
        let mut relocated = base_list.clone();
        relocated.set_square(piece_no, destination);
        result.push(BitbaseIndex::from_piece_list(&relocated, mover == Color::White));
    };

    for piece_no in 0..base_list.num_pieces() {
        let piece = base_list.piece(piece_no);
        if piece.color() != mover {
            continue;
        }
        let from = base_list.square(piece_no);

        match piece.name() {
            PieceName::Pawn => {
                // A pawn can only have pushed; rank four and five also allow
                // the double step
                let (back, start_rank) = match mover {
                    Color::White => (-8i8, 3),
                    Color::Black => (8i8, 4),
                };
                let single = Square(from.0.wrapping_add(back as u8));
                if (1..7).contains(&single.rank()) && occupied.empty(single) {
                    push(piece_no, single);
                    if from.rank() == start_rank {
                        let double = Square(single.0.wrapping_add(back as u8));
                        if occupied.empty(double) {
                            push(piece_no, double);
                        }
                    }
                }
            }
            PieceName::King => {
                let enemy_king = board.king_square(!mover);
                let backwards = king_attacks(from) & !occupied & !king_attacks(enemy_king);
                for d in backwards {
                    if d != enemy_king {
                        push(piece_no, d);
                    }
                }
            }
            name => {
                let attacks = match name {
                    PieceName::Knight => knight_attacks(from),
                    PieceName::Bishop => bishop_attacks(from, occupied),
                    PieceName::Rook => rook_attacks(from, occupied),
                    PieceName::Queen => queen_attacks(from, occupied),
                    _ => Bitboard::EMPTY,
                };
                for d in attacks & !occupied {
                    push(piece_no, d);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod generator_tests {
    use super::*;
    use crate::bitbase::reader::Probe;
    use crate::bitbase::signature::PieceSignature;
    use crate::moves::moves::from_lan;

    use std::sync::OnceLock;

    /// KPK takes a moment to generate; every test shares one copy
    fn kpk_reader() -> &'static BitbaseReader {
        static KPK: OnceLock<BitbaseReader> = OnceLock::new();
        KPK.get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("aplite_kpk_{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let mut reader = BitbaseReader::new(&dir);
            let generator = BitbaseGenerator { threads: 2, ..BitbaseGenerator::default() };
            generator.generate_patterns(&["KPK"], &mut reader);
            assert!(reader.is_available(PieceSignature::parse("KPK").unwrap()));
            reader
        })
    }

    #[test]
    fn kpk_generation_and_probes() {
        let reader = kpk_reader();

        // The classic drawn king-and-pawn ending: black reaches the key
        // squares in front of the pawn
        let board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        assert_eq!(reader.probe_dual(&board), Probe::Draw);

        let mut after_push = board;
        assert!(after_push.make_move(from_lan("e2e4", &board)));
        assert_eq!(reader.probe_dual(&after_push), Probe::Draw);

        // King on the sixth in front of its pawn wins no matter whose turn
        // it is
        let board = Board::from_fen("4k3/8/4K3/4P3/8/8/8/8 w - - 0 1");
        assert_eq!(reader.probe_dual(&board), Probe::Win);

        let board = Board::from_fen("4k3/8/4K3/4P3/8/8/8/8 b - - 0 1");
        assert_eq!(reader.probe_dual(&board), Probe::Loss);
    }

    #[test]
    fn kpk_probe_from_blacks_side_uses_symmetry() {
        let reader = kpk_reader();

        // Black has the pawn; the color-swapped signature answers
        let board = Board::from_fen("8/8/8/8/2kp4/8/8/3K4 b - - 0 1");
        let probe = reader.probe_dual(&board);
        assert!(probe == Probe::Win || probe == Probe::Draw);

        // Mirrored version of a known white win must be a black win
        let board = Board::from_fen("8/8/8/8/8/8/4kp2/5K2 b - - 0 1");
        let mirrored_white = Board::from_fen("5k2/4KP2/8/8/8/8/8/8 w - - 0 1");
        assert_eq!(
            reader.probe_dual(&board) == Probe::Win,
            reader.probe_dual(&mirrored_white) == Probe::Win
        );
    }

    #[test]
    fn predecessors_invert_quiet_moves() {
        let board = Board::from_fen("4k3/8/8/8/4P3/8/8/4K3 b - - 0 1");
        // The pawn just pushed e2e4 (or e3e4); the black king cannot have
        // moved because white did. Among predecessors must be the position
        // with the pawn back on e2, white to move.
        let preds = predecessors(&board);
        let origin = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        let origin_index =
            BitbaseIndex::from_piece_list(&PieceList::from_board(&origin), true);
        assert!(preds.contains(&origin_index));
    }
}
