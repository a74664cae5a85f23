use lazy_static::lazy_static;

use crate::types::{pieces::PieceName, square::Square};

use super::piece_list::{PieceList, MAX_PIECES};

/// Legal (non-adjacent) king pairs with the white king folded into files
/// a-d, as used when pawns fix the left/right orientation
pub const KING_PAIRS_WITH_PAWN: u64 = 1806;
/// Legal king pairs with the white king folded into the a1-d1-d4 triangle
pub const KING_PAIRS_WITHOUT_PAWN: u64 = 462;
/// Pawns live on ranks 2-7
pub const PAWN_POSITIONS: u64 = 48;
const COLOR_COUNT: u64 = 2;

const MAP_FILE: u32 = 1;
const MAP_RANK: u32 = 2;
const MAP_DIAGONAL: u32 = 4;

/// White king squares forming the a1-d1-d4 triangle
const TRIANGLE_SQUARES: [u8; 10] = [0, 1, 2, 3, 9, 10, 11, 18, 19, 27];

struct KingTables {
    to_index_with_pawn: Vec<u32>,
    to_squares_with_pawn: Vec<u32>,
    to_index_without_pawn: Vec<u32>,
    to_squares_without_pawn: Vec<u32>,
}

/// Kings may not touch; the same square counts as touching so colliding
/// king pairs drop out of the index space as well
fn is_adjacent(a: Square, b: Square) -> bool {
    a.dist(b) <= 1
}

const fn is_above_diagonal(sq: Square) -> bool {
    sq.rank() > sq.file()
}

const fn is_on_diagonal(sq: Square) -> bool {
    sq.rank() == sq.file()
}

lazy_static! {
    static ref KING_TABLES: KingTables = KingTables::build();
}

impl KingTables {
    /// Dense indices over king pairs, skipping adjacent (illegal) ones.
    /// The forward map is defined for every pair; only non-adjacent pairs
    /// get an inverse entry.
    fn build() -> Self {
        let mut to_index_with_pawn = vec![0u32; 64 * 64];
        let mut to_squares_with_pawn = vec![0u32; KING_PAIRS_WITH_PAWN as usize];
        let mut index = 0u32;
        for wk in Square::iter().filter(|wk| wk.file() < 4) {
            for bk in Square::iter() {
                let lookup = wk.idx() + bk.idx() * 64;
                to_index_with_pawn[lookup] = index;
                if !is_adjacent(wk, bk) {
                    to_squares_with_pawn[index as usize] = lookup as u32;
                    index += 1;
                }
            }
        }
        assert_eq!(index as u64, KING_PAIRS_WITH_PAWN);

        let mut to_index_without_pawn = vec![0u32; 64 * 64];
        let mut to_squares_without_pawn = vec![0u32; KING_PAIRS_WITHOUT_PAWN as usize];
        let mut index = 0u32;
        for &wk in &TRIANGLE_SQUARES {
            let wk = Square(wk);
            for bk in Square::iter() {
                // With the white king on the long diagonal the black king
                // is the first piece allowed to break the tie, and it must
                // not sit above it
                if is_on_diagonal(wk) && is_above_diagonal(bk) {
                    continue;
                }
                let lookup = wk.idx() + bk.idx() * 64;
                to_index_without_pawn[lookup] = index;
                if !is_adjacent(wk, bk) {
                    to_squares_without_pawn[index as usize] = lookup as u32;
                    index += 1;
                }
            }
        }
        assert_eq!(index as u64, KING_PAIRS_WITHOUT_PAWN);

        Self { to_index_with_pawn, to_squares_with_pawn, to_index_without_pawn, to_squares_without_pawn }
    }
}

fn map_square(sq: Square, map_type: u32) -> Square {
    let mut sq = sq;
    if map_type & MAP_FILE != 0 {
        sq = sq.flip_horizontal();
    }
    if map_type & MAP_RANK != 0 {
        sq = sq.flip_vertical();
    }
    if map_type & MAP_DIAGONAL != 0 {
        sq = sq.flip_diagonal();
    }
    sq
}

/// Which mirrors fold this position onto its canonical representative.
/// Pawned positions may only flip left/right; pawnless ones additionally
/// fold vertically and across the a1-h8 diagonal, where the first piece
/// off the diagonal decides the flip.
fn compute_map_type(list: &PieceList) -> u32 {
    let mut map_type = 0;
    let wk = list.square(0);
    if wk.file() >= 4 {
        map_type |= MAP_FILE;
    }
    if list.num_pawns() > 0 {
        return map_type;
    }
    if wk.rank() >= 4 {
        map_type |= MAP_RANK;
    }

    // Kings first: the earliest piece off the diagonal settles the fold
    for no in 0..2 {
        let mapped = map_square(list.square(no), map_type);
        if is_on_diagonal(mapped) {
            continue;
        }
        if is_above_diagonal(mapped) {
            map_type |= MAP_DIAGONAL;
        }
        return map_type;
    }

    let mut no = 2;
    while no < list.num_pieces() {
        let count = list.same_kind_run(no);
        let mut squares: Vec<Square> = (no..no + count).map(|i| map_square(list.square(i), map_type)).collect();
        squares.sort();
        for mapped in squares {
            if is_on_diagonal(mapped) {
                continue;
            }
            if is_above_diagonal(mapped) {
                map_type |= MAP_DIAGONAL;
            }
            return map_type;
        }
        no += count;
    }
    map_type
}

/// Both directions of the position ↔ index bijection for one material
/// signature. Reconstruction flags indices that decode to no canonical
/// legal placement.
pub struct BitbaseIndex {
    squares: [Square; MAX_PIECES],
    num_squares: usize,
    pieces_bb: u64,
    pawns_bb: u64,
    wtm: bool,
    legal: bool,
}

impl BitbaseIndex {
    /// Total number of indices for this material
    pub fn size_in_bits(list: &PieceList) -> u64 {
        let kings = if list.num_pawns() > 0 { KING_PAIRS_WITH_PAWN } else { KING_PAIRS_WITHOUT_PAWN };
        let mut size = COLOR_COUNT * kings;
        for i in 0..list.num_pawns() as u64 {
            size *= PAWN_POSITIONS - i;
        }
        for i in 0..(list.num_pieces() - 2 - list.num_pawns()) as u64 {
            size *= 62 - list.num_pawns() as u64 - i;
        }
        size
    }

    /// Forward direction: the dense index of a canonicalized position
    pub fn from_piece_list(list: &PieceList, wtm: bool) -> u64 {
        let map_type = compute_map_type(list);
        let has_pawns = list.num_pawns() > 0;

        let mut index = u64::from(!wtm);
        let mut size = COLOR_COUNT;

        let wk = map_square(list.square(0), map_type);
        let bk = map_square(list.square(1), map_type);
        let lookup = wk.idx() + bk.idx() * 64;
        let (king_index, king_count) = if has_pawns {
            (KING_TABLES.to_index_with_pawn[lookup], KING_PAIRS_WITH_PAWN)
        } else {
            (KING_TABLES.to_index_without_pawn[lookup], KING_PAIRS_WITHOUT_PAWN)
        };
        index += u64::from(king_index) * size;
        size *= king_count;

        let mut pawns_bb = 0u64;
        let mut pawn_count = 0u64;
        let mut pieces_bb = (1u64 << wk.0) | (1u64 << bk.0);
        let mut placed = 2u64;

        let mut no = 2;
        while no < list.num_pieces() {
            let count = list.same_kind_run(no);
            let piece = list.piece(no);
            let mut squares: Vec<Square> = (no..no + count).map(|i| map_square(list.square(i), map_type)).collect();
            squares.sort();

            for sq in squares {
                if piece.name() == PieceName::Pawn {
                    let below = ((1u64 << sq.0) - 1) & pawns_bb;
                    let value = u64::from(sq.0 - 8) - below.count_ones() as u64;
                    index += value * size;
                    size *= PAWN_POSITIONS - pawn_count;
                    pawn_count += 1;
                    pawns_bb |= 1 << sq.0;
                } else {
                    let below = ((1u64 << sq.0) - 1) & pieces_bb;
                    let value = u64::from(sq.0) - u64::from(below.count_ones());
                    index += value * size;
                    size *= 64 - placed;
                }
                pieces_bb |= 1 << sq.0;
                placed += 1;
            }
            no += count;
        }
        index
    }

    /// Reverse direction: decodes an index back into square assignments.
    /// `legal` is false for indices that correspond to no canonical
    /// position (colliding squares, out-of-board pawns, non-canonical
    /// orderings of identical pieces, or the wrong side of the diagonal).
    pub fn reconstruct(index: u64, list: &PieceList) -> Self {
        let has_pawns = list.num_pawns() > 0;
        let mut out = Self {
            squares: [Square(0); MAX_PIECES],
            num_squares: 0,
            pieces_bb: 0,
            pawns_bb: 0,
            wtm: index % COLOR_COUNT == 0,
            legal: true,
        };
        let mut index = index / COLOR_COUNT;

        let king_count = if has_pawns { KING_PAIRS_WITH_PAWN } else { KING_PAIRS_WITHOUT_PAWN };
        let lookup = if has_pawns {
            KING_TABLES.to_squares_with_pawn[(index % king_count) as usize]
        } else {
            KING_TABLES.to_squares_without_pawn[(index % king_count) as usize]
        } as usize;
        index /= king_count;
        out.push_square(Square((lookup % 64) as u8));
        out.push_square(Square((lookup / 64) as u8));

        // Pieces come back in list order: all pawns first, then the rest,
        // exactly as the forward direction multiplied them in
        let mut all_on_diagonal = !has_pawns
            && is_on_diagonal(out.squares[0])
            && is_on_diagonal(out.squares[1]);

        let mut remaining_pawns = PAWN_POSITIONS;
        for no in 2..2 + list.num_pawns() {
            let raw = (index % remaining_pawns) as u8;
            index /= remaining_pawns;
            remaining_pawns -= 1;

            let sq = skip_occupied(out.pawns_bb, Square(8 + raw));
            if sq > Square::H7 {
                out.legal = false;
            }
            if out.pieces_bb & (1 << sq.0) != 0 {
                // A pawn decoded onto a king square: no real position maps
                // here
                out.legal = false;
            }
            if list.piece(no) == list.piece(no - 1) && sq < out.squares[no - 1] {
                // Only the sorted arrangement of an identical pair is the
                // canonical representative
                out.legal = false;
            }
            out.pawns_bb |= 1 << sq.0;
            out.push_square(sq);
        }

        let mut remaining = 62 - list.num_pawns() as u64;
        for no in 2 + list.num_pawns()..list.num_pieces() {
            let raw = (index % remaining) as u8;
            index /= remaining;
            remaining -= 1;

            let sq = skip_occupied(out.pieces_bb, Square(raw));
            if !sq.is_valid() {
                out.legal = false;
                break;
            }
            if list.piece(no) == list.piece(no - 1) && sq < out.squares[no - 1] {
                out.legal = false;
            }
            if !has_pawns {
                if all_on_diagonal && is_above_diagonal(sq) {
                    out.legal = false;
                }
                all_on_diagonal &= is_on_diagonal(sq);
            }
            out.push_square(sq);
        }

        out
    }

    fn push_square(&mut self, sq: Square) {
        self.squares[self.num_squares] = sq;
        self.num_squares += 1;
        if sq.is_valid() {
            self.pieces_bb |= 1 << sq.0;
        }
    }

    pub const fn is_legal(&self) -> bool {
        self.legal
    }

    pub const fn white_to_move(&self) -> bool {
        self.wtm
    }

    pub fn square(&self, no: usize) -> Square {
        self.squares[no]
    }
}

/// Walks `raw` up past every occupied square at or below it, yielding the
/// raw-th free square
fn skip_occupied(occupied: u64, raw: Square) -> Square {
    let mut sq = raw;
    let mut occupied = occupied;
    loop {
        if !sq.is_valid() {
            return sq;
        }
        let up_to_here = (1u64 << sq.0) | ((1u64 << sq.0) - 1);
        if up_to_here & occupied != 0 {
            sq = Square(sq.0 + 1);
            occupied &= occupied - 1;
        } else {
            return sq;
        }
    }
}

#[cfg(test)]
mod index_tests {
    use super::*;
    use crate::bitbase::piece_list::PieceList;
    use crate::board::board::Board;
    use crate::types::pieces::{Color, Piece};

    /// Builds a board from reconstructed squares, None when the placement
    /// is not a legal chess position
    fn board_from(idx: &BitbaseIndex, list: &PieceList) -> Option<Board> {
        let mut board = Board::empty();
        for no in 0..list.num_pieces() {
            if board.piece_at(idx.square(no)) != Piece::None {
                return None;
            }
            board.place_piece(list.piece(no), idx.square(no));
        }
        board.stm = if idx.white_to_move() { Color::White } else { Color::Black };
        board.zobrist_hash = board.generate_hash();
        board.refresh_masks();
        Some(board)
    }

    fn round_trip_signature(pieces: &str) {
        let list = PieceList::from_string(pieces).unwrap();
        let size = BitbaseIndex::size_in_bits(&list);
        let mut legal = 0u64;
        for index in 0..size {
            let rec = BitbaseIndex::reconstruct(index, &list);
            if !rec.is_legal() {
                continue;
            }
            let mut placed = list.clone();
            for no in 0..list.num_pieces() {
                placed.set_square(no, rec.square(no));
            }
            let forward = BitbaseIndex::from_piece_list(&placed, rec.white_to_move());
            assert_eq!(forward, index, "bijection broke for {pieces} at index {index}");
            legal += 1;
        }
        assert!(legal > 0, "no legal indices for {pieces}");
    }

    #[test]
    fn king_tables_have_expected_sizes() {
        assert_eq!(KING_TABLES.to_squares_with_pawn.len() as u64, KING_PAIRS_WITH_PAWN);
        assert_eq!(KING_TABLES.to_squares_without_pawn.len() as u64, KING_PAIRS_WITHOUT_PAWN);
    }

    #[test]
    fn kpk_size() {
        let list = PieceList::from_string("KPK").unwrap();
        assert_eq!(BitbaseIndex::size_in_bits(&list), 2 * KING_PAIRS_WITH_PAWN * PAWN_POSITIONS);
    }

    #[test]
    fn kqk_size() {
        let list = PieceList::from_string("KQK").unwrap();
        assert_eq!(BitbaseIndex::size_in_bits(&list), 2 * KING_PAIRS_WITHOUT_PAWN * 62);
    }

    #[test]
    fn round_trip_kpk() {
        round_trip_signature("KPK");
    }

    #[test]
    fn round_trip_kqk() {
        round_trip_signature("KQK");
    }

    #[test]
    fn round_trip_krk() {
        round_trip_signature("KRK");
    }

    #[test]
    fn round_trip_knkp_sampled() {
        // Four-piece spaces run into the millions; a strided sweep still
        // exercises every decode path
        let list = PieceList::from_string("KNKP").unwrap();
        let size = BitbaseIndex::size_in_bits(&list);
        for index in (0..size).step_by(13) {
            let rec = BitbaseIndex::reconstruct(index, &list);
            if !rec.is_legal() {
                continue;
            }
            let mut placed = list.clone();
            for no in 0..list.num_pieces() {
                placed.set_square(no, rec.square(no));
            }
            assert_eq!(BitbaseIndex::from_piece_list(&placed, rec.white_to_move()), index);
        }
    }

    #[test]
    fn round_trip_same_kind_pair_sampled() {
        let list = PieceList::from_string("KNNK").unwrap();
        let size = BitbaseIndex::size_in_bits(&list);
        for index in (0..size).step_by(7) {
            let rec = BitbaseIndex::reconstruct(index, &list);
            if !rec.is_legal() {
                continue;
            }
            let mut placed = list.clone();
            for no in 0..list.num_pieces() {
                placed.set_square(no, rec.square(no));
            }
            assert_eq!(BitbaseIndex::from_piece_list(&placed, rec.white_to_move()), index);
        }
    }

    #[test]
    fn file_mirror_maps_to_same_index() {
        // KPK position and its left-right mirror share an index
        let a = PieceList::from_board(&Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"));
        let b = PieceList::from_board(&Board::from_fen("3k4/8/8/8/8/8/3P4/3K4 w - - 0 1"));
        assert_eq!(
            BitbaseIndex::from_piece_list(&a, true),
            BitbaseIndex::from_piece_list(&b, true),
        );
    }

    #[test]
    fn diagonal_mirror_maps_to_same_index() {
        // Pawnless positions fold across the a1-h8 diagonal: mirroring
        // every square must not change the index
        let list = PieceList::from_board(&Board::from_fen("8/8/8/3q4/8/8/1k6/K7 b - - 0 1"));
        let mut mirror = list.clone();
        for no in 0..list.num_pieces() {
            mirror.set_square(no, list.square(no).flip_diagonal());
        }
        assert_eq!(
            BitbaseIndex::from_piece_list(&list, false),
            BitbaseIndex::from_piece_list(&mirror, false),
        );
    }

    #[test]
    fn vertical_mirror_maps_to_same_index_without_pawns() {
        let list = PieceList::from_board(&Board::from_fen("8/8/8/3q4/8/8/1k6/K7 b - - 0 1"));
        let mut mirror = list.clone();
        for no in 0..list.num_pieces() {
            mirror.set_square(no, list.square(no).flip_vertical());
        }
        assert_eq!(
            BitbaseIndex::from_piece_list(&list, false),
            BitbaseIndex::from_piece_list(&mirror, false),
        );
    }

    #[test]
    fn reconstruction_yields_real_boards() {
        let list = PieceList::from_string("KPK").unwrap();
        let size = BitbaseIndex::size_in_bits(&list);
        let mut boards = 0;
        for index in (0..size).step_by(97) {
            let rec = BitbaseIndex::reconstruct(index, &list);
            if rec.is_legal() {
                assert!(board_from(&rec, &list).is_some(), "legal index {index} decoded to colliding squares");
                boards += 1;
            }
        }
        assert!(boards > 100);
    }
}
