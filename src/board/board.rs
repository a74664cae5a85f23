use core::fmt;

use crate::{
    board::zobrist::ZOBRIST,
    moves::{
        attack_boards::{between, king_attacks, knight_attacks, pawn_attacks, pawn_set_attacks},
        magics::{bishop_attacks, rook_attacks},
        moves::{Castle, Direction::{North, South}, Move, MoveType, CASTLING_RIGHTS},
    },
    types::{
        bitboard::Bitboard,
        pieces::{Color, Piece, PieceName, NUM_PIECES},
        square::Square,
    },
};

use super::fen::STARTING_FEN;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Board {
    bitboards: [Bitboard; NUM_PIECES],
    color_occupancies: [Bitboard; 2],
    mailbox: [Piece; 64],
    /// Side to move
    pub stm: Color,
    pub castling_rights: u8,
    pub en_passant_square: Option<Square>,
    /// Fullmove counter, incremented after black moves
    pub num_moves: usize,
    /// Halfmove clock since the last pawn move or capture
    pub half_moves: usize,
    pub zobrist_hash: u64,
    threats: Bitboard,
    checkers: Bitboard,
    pinned: Bitboard,
}

impl Default for Board {
    fn default() -> Self {
        Board::from_fen(STARTING_FEN)
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            bitboards: [Bitboard::EMPTY; NUM_PIECES],
            color_occupancies: [Bitboard::EMPTY; 2],
            mailbox: [Piece::None; 64],
            castling_rights: 0,
            stm: Color::White,
            en_passant_square: None,
            num_moves: 1,
            half_moves: 0,
            zobrist_hash: 0,
            threats: Bitboard::EMPTY,
            checkers: Bitboard::EMPTY,
            pinned: Bitboard::EMPTY,
        }
    }

    pub fn bitboard(&self, side: Color, piece: PieceName) -> Bitboard {
        self.piece(piece) & self.color(side)
    }

    pub fn piece(&self, piece: PieceName) -> Bitboard {
        self.bitboards[piece]
    }

    pub fn color(&self, color: Color) -> Bitboard {
        self.color_occupancies[color]
    }

    pub fn occupancies(&self) -> Bitboard {
        self.color(Color::White) | self.color(Color::Black)
    }

    pub fn piece_at(&self, sq: Square) -> Piece {
        self.mailbox[sq]
    }

    /// Count of non-king pieces on the board, the gate for bitbase probes
    pub fn non_king_pieces(&self) -> u32 {
        self.occupancies().count_bits() - 2
    }

    pub fn is_material_draw(&self) -> bool {
        // Any pawn leaves mating chances
        if self.piece(PieceName::Pawn) != Bitboard::EMPTY {
            return false;
        }
        let piece_count = self.occupancies().count_bits();
        if piece_count == 2
            || (piece_count == 3
                && (self.piece(PieceName::Knight).count_bits() == 1
                    || self.piece(PieceName::Bishop).count_bits() == 1))
        {
            return true;
        }
        if piece_count == 4 {
            if self.piece(PieceName::Knight).count_bits() == 2 {
                return true;
            }
            if self.color(Color::White).count_bits() == 2 && self.piece(PieceName::Bishop).count_bits() == 2 {
                return true;
            }
        }

        false
    }

    pub fn is_draw(&self) -> bool {
        self.half_moves >= 100 || self.is_material_draw()
    }

    pub fn has_non_pawns(&self, side: Color) -> bool {
        self.color(side) ^ self.bitboard(side, PieceName::King) ^ self.bitboard(side, PieceName::Pawn)
            != Bitboard::EMPTY
    }

    pub const fn can_en_passant(&self) -> bool {
        self.en_passant_square.is_some()
    }

    pub const fn can_castle(&self, c: Castle) -> bool {
        self.castling_rights & c as u8 != 0
    }

    pub fn place_piece(&mut self, piece: Piece, sq: Square) {
        self.mailbox[sq] = piece;
        self.bitboards[piece.name()] ^= sq.bitboard();
        self.color_occupancies[piece.color()] ^= sq.bitboard();
        self.zobrist_hash ^= ZOBRIST.piece_square[piece.color()][piece.name()][sq];
    }

    pub fn remove_piece(&mut self, sq: Square) {
        let piece = self.mailbox[sq];
        if piece != Piece::None {
            self.mailbox[sq] = Piece::None;
            self.bitboards[piece.name()] ^= sq.bitboard();
            self.color_occupancies[piece.color()] ^= sq.bitboard();
            self.zobrist_hash ^= ZOBRIST.piece_square[piece.color()][piece.name()][sq];
        }
    }

    pub fn king_square(&self, color: Color) -> Square {
        self.bitboard(color, PieceName::King).lsb()
    }

    pub fn attackers(&self, sq: Square, occupancy: Bitboard) -> Bitboard {
        self.attackers_for_side(Color::White, sq, occupancy) | self.attackers_for_side(Color::Black, sq, occupancy)
    }

    pub fn attackers_for_side(&self, attacker: Color, sq: Square, occupancy: Bitboard) -> Bitboard {
        let bishops = self.piece(PieceName::Queen) | self.piece(PieceName::Bishop);
        let rooks = self.piece(PieceName::Queen) | self.piece(PieceName::Rook);
        let pawn_attacks = pawn_attacks(sq, !attacker) & self.piece(PieceName::Pawn);
        let knight_attacks = knight_attacks(sq) & self.piece(PieceName::Knight);
        let bishop_attacks = bishop_attacks(sq, occupancy) & bishops;
        let rook_attacks = rook_attacks(sq, occupancy) & rooks;
        let king_attacks = king_attacks(sq) & self.piece(PieceName::King);
        (pawn_attacks | knight_attacks | bishop_attacks | rook_attacks | king_attacks) & self.color(attacker)
    }

    pub fn square_under_attack(&self, attacker: Color, sq: Square) -> bool {
        self.attackers_for_side(attacker, sq, self.occupancies()) != Bitboard::EMPTY
    }

    pub fn in_check(&self) -> bool {
        self.checkers != Bitboard::EMPTY
    }

    pub const fn threats(&self) -> Bitboard {
        self.threats
    }

    fn pinned_and_checkers(&mut self) {
        self.pinned = Bitboard::EMPTY;
        let attacker = !self.stm;
        let king_sq = self.king_square(self.stm);

        self.checkers = knight_attacks(king_sq) & self.bitboard(attacker, PieceName::Knight)
            | pawn_attacks(king_sq, self.stm) & self.bitboard(attacker, PieceName::Pawn);

        let sliders_attacks = self.diags(attacker) & bishop_attacks(king_sq, Bitboard::EMPTY)
            | self.orthos(attacker) & rook_attacks(king_sq, Bitboard::EMPTY);
        for sq in sliders_attacks {
            let blockers = between(sq, king_sq) & self.occupancies();
            if blockers == Bitboard::EMPTY {
                self.checkers |= sq.bitboard();
            } else if blockers.count_bits() == 1 {
                self.pinned |= blockers & self.color(self.stm);
            }
        }
    }

    pub(crate) fn diags(&self, side: Color) -> Bitboard {
        self.bitboard(side, PieceName::Bishop) | self.bitboard(side, PieceName::Queen)
    }

    pub(crate) fn orthos(&self, side: Color) -> Bitboard {
        self.bitboard(side, PieceName::Rook) | self.bitboard(side, PieceName::Queen)
    }

    fn calculate_threats(&mut self) {
        let attacker = !self.stm;
        let mut threats = Bitboard::EMPTY;
        let occ = self.occupancies() ^ self.king_square(self.stm).bitboard();

        threats |= pawn_set_attacks(self.bitboard(attacker, PieceName::Pawn), attacker);

        for sq in self.orthos(attacker) {
            threats |= rook_attacks(sq, occ);
        }
        for sq in self.diags(attacker) {
            threats |= bishop_attacks(sq, occ);
        }
        for sq in self.bitboard(attacker, PieceName::Knight) {
            threats |= knight_attacks(sq);
        }
        threats |= king_attacks(self.king_square(attacker));

        self.threats = threats;
    }

    /// Recomputes threat, checker and pin boards after direct board surgery
    /// (FEN loading, bitbase reconstruction)
    pub fn refresh_masks(&mut self) {
        self.calculate_threats();
        self.pinned_and_checkers();
    }

    /// Validates a TT or killer move against the current position before the
    /// move provider may emit it
    pub(crate) fn is_pseudo_legal(&self, m: Move) -> bool {
        if !m.is_valid() {
            return false;
        }

        let from = m.from();
        let to = m.to();

        let moved_piece = self.piece_at(from);
        let captured_piece = self.piece_at(to);
        let is_capture = captured_piece != Piece::None;

        if moved_piece != m.piece_moving() || moved_piece == Piece::None {
            return false;
        }

        if moved_piece.color() != self.stm {
            return false;
        }

        if is_capture && captured_piece.color() == self.stm {
            return false;
        }

        if m.is_en_passant() {
            if captured_piece != Piece::None || m.capture() != Piece::new(PieceName::Pawn, !self.stm) {
                return false;
            }
        } else if m.capture() != captured_piece {
            return false;
        }

        if m.is_castle() {
            if self.in_check() || moved_piece.name() != PieceName::King {
                return false;
            }
            let castle = m.castle_type();
            if castle.color() != self.stm || !self.can_castle(castle) {
                return false;
            }
            if self.occupancies() & Bitboard(castle.empty_squares()) != Bitboard::EMPTY {
                return false;
            }
            if Bitboard(castle.check_squares()) & self.threats() != Bitboard::EMPTY {
                return false;
            }
            if self.bitboard(self.stm, PieceName::Rook) & castle.rook_from().bitboard() == Bitboard::EMPTY {
                return false;
            }
            return true;
        }

        match moved_piece.name() {
            PieceName::Pawn => {
                let should_promote = to.rank() == 7 || to.rank() == 0;
                if should_promote && m.promotion().is_none() {
                    return false;
                }
                if !should_promote && m.promotion().is_some() {
                    return false;
                }
                let up = match self.stm {
                    Color::White => North,
                    Color::Black => South,
                };
                if m.is_en_passant() {
                    return Some(to) == self.en_passant_square
                        && pawn_attacks(from, self.stm).occupied(to);
                }
                if m.flag() == MoveType::DoublePush {
                    let Some(one_forward) = from.checked_shift(up) else { return false };
                    return !is_capture
                        && self.piece_at(one_forward) == Piece::None
                        && Some(to) == one_forward.checked_shift(up);
                }
                if !is_capture {
                    return Some(to) == from.checked_shift(up);
                }
                pawn_attacks(from, self.stm).occupied(to)
            }
            PieceName::Knight => knight_attacks(from).occupied(to),
            PieceName::Bishop => bishop_attacks(from, self.occupancies()).occupied(to),
            PieceName::Rook => rook_attacks(from, self.occupancies()).occupied(to),
            PieceName::Queen => (rook_attacks(from, self.occupancies()) | bishop_attacks(from, self.occupancies())).occupied(to),
            PieceName::King => king_attacks(from).occupied(to),
            PieceName::None => false,
        }
    }

    /// Applies a move to this board copy. Returns false if the mover's king
    /// ends up attacked, in which case the board must be discarded.
    #[must_use]
    pub fn make_move(&mut self, m: Move) -> bool {
        let piece_moving = m.piece_moving();
        debug_assert_eq!(piece_moving, self.piece_at(m.from()));
        let capture = m.capture();

        self.remove_piece(m.to());

        if m.promotion().is_none() {
            self.place_piece(piece_moving, m.to());
        }

        self.remove_piece(m.from());

        if m.is_castle() {
            let rook = Piece::new(PieceName::Rook, self.stm);
            self.place_piece(rook, m.castle_type().rook_to());
            self.remove_piece(m.castle_type().rook_from());
        } else if let Some(p) = m.promotion() {
            self.place_piece(Piece::new(p, self.stm), m.to());
        } else if m.is_en_passant() {
            match self.stm {
                Color::White => self.remove_piece(m.to().shift(South)),
                Color::Black => self.remove_piece(m.to().shift(North)),
            }
        }

        // Leaving your own king in check makes the move illegal
        if self.square_under_attack(!self.stm, self.king_square(self.stm)) {
            return false;
        }

        if let Some(sq) = self.en_passant_square {
            self.zobrist_hash ^= ZOBRIST.en_passant[sq];
        }
        self.en_passant_square = None;
        if m.flag() == MoveType::DoublePush {
            let ep = match self.stm {
                Color::White => m.to().shift(South),
                Color::Black => m.to().shift(North),
            };
            self.en_passant_square = Some(ep);
            self.zobrist_hash ^= ZOBRIST.en_passant[ep];
        }

        if capture == Piece::None && piece_moving.name() != PieceName::Pawn {
            self.half_moves += 1;
        } else {
            self.half_moves = 0;
        }

        self.zobrist_hash ^= ZOBRIST.castling[self.castling_rights as usize];
        self.castling_rights &= CASTLING_RIGHTS[m.from()] & CASTLING_RIGHTS[m.to()];
        self.zobrist_hash ^= ZOBRIST.castling[self.castling_rights as usize];

        if self.stm == Color::Black {
            self.num_moves += 1;
        }
        self.stm = !self.stm;
        self.zobrist_hash ^= ZOBRIST.turn;

        self.refresh_masks();

        true
    }

    /// Passes the turn, used by null-move pruning
    pub fn make_null_move(&mut self) {
        self.stm = !self.stm;
        self.zobrist_hash ^= ZOBRIST.turn;
        self.half_moves += 1;
        if let Some(sq) = self.en_passant_square {
            self.zobrist_hash ^= ZOBRIST.en_passant[sq];
        }
        self.en_passant_square = None;
        self.refresh_masks();
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in (0..8).rev() {
            write!(f, "{} | ", row + 1)?;
            for col in 0..8 {
                write!(f, "{} | ", self.piece_at(Square(row * 8 + col)).char())?;
            }
            writeln!(f)?;
        }
        writeln!(f, "    a   b   c   d   e   f   g   h")?;
        writeln!(f)?;
        writeln!(f, "{}", self.to_fen())
    }
}

#[cfg(test)]
mod board_tests {
    use super::*;
    use crate::moves::moves::from_lan;

    #[test]
    fn place_and_remove() {
        let mut board = Board::empty();
        board.place_piece(Piece::WhiteRook, Square(0));
        assert!(board.bitboard(Color::White, PieceName::Rook).occupied(Square(0)));

        board.remove_piece(Square(0));
        assert!(board.occupancies().empty(Square(0)));
        assert_eq!(board.zobrist_hash, 0);
    }

    #[test]
    fn make_move_updates_hash_incrementally() {
        let mut board = Board::default();
        let m = from_lan("e2e4", &board);
        assert!(board.make_move(m));
        assert_eq!(board.zobrist_hash, board.generate_hash());
        assert_eq!(board.en_passant_square, Some(Square(20)));

        let m = from_lan("d7d5", &board);
        assert!(board.make_move(m));
        assert_eq!(board.zobrist_hash, board.generate_hash());

        let m = from_lan("e4d5", &board);
        assert!(board.make_move(m));
        assert_eq!(board.zobrist_hash, board.generate_hash());
        assert_eq!(board.half_moves, 0);
    }

    #[test]
    fn illegal_move_reports_false() {
        let mut board = Board::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1");
        // King may not walk into the rook's file-adjacent squares while pinned logic allows captures
        let m = from_lan("e1e2", &board);
        assert!(board.make_move(m));
        let mut board = Board::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1");
        let m = from_lan("e1d2", &board);
        assert!(!board.make_move(m));
    }

    #[test]
    fn material_draws() {
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").is_material_draw());
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4KN2 w - - 0 1").is_material_draw());
        assert!(!Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").is_material_draw());
        assert!(!Board::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").is_material_draw());
    }
}
