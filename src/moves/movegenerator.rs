use crate::{
    board::board::Board,
    types::{
        bitboard::Bitboard,
        pieces::{Color, Piece, PieceName},
        square::Square,
    },
};

use super::{
    attack_boards::{king_attacks, knight_attacks, RANKS},
    magics::{bishop_attacks, queen_attacks, rook_attacks},
    movelist::MoveList,
    moves::{Castle, Direction, Direction::*, Move, MoveType},
};

#[allow(clippy::upper_case_acronyms)]
pub type MGT = MoveGenerationType;
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum MoveGenerationType {
    CapturesOnly,
    QuietsOnly,
    All,
}

/// Generates only moves that survive the legality filter in `make_move`
pub fn generate_legal_moves(board: &Board) -> MoveList {
    let mut legal = MoveList::default();
    for entry in board.generate_moves(MGT::All) {
        let mut new_b = *board;
        if new_b.make_move(entry.m) {
            legal.push(entry.m);
        }
    }
    legal
}

impl Board {
    /// Generates all pseudolegal moves of the requested class
    pub fn generate_moves(&self, gen_type: MGT) -> MoveList {
        let mut moves = MoveList::default();

        self.generate_bitboard_moves(PieceName::Knight, gen_type, &mut moves);
        self.generate_bitboard_moves(PieceName::King, gen_type, &mut moves);
        self.generate_bitboard_moves(PieceName::Queen, gen_type, &mut moves);
        self.generate_bitboard_moves(PieceName::Rook, gen_type, &mut moves);
        self.generate_bitboard_moves(PieceName::Bishop, gen_type, &mut moves);
        self.generate_pawn_moves(gen_type, &mut moves);
        if matches!(gen_type, MGT::QuietsOnly | MGT::All) {
            self.generate_castling_moves(&mut moves);
        }
        moves
    }

    fn generate_castling_moves(&self, moves: &mut MoveList) {
        let (kingside, queenside) = match self.stm {
            Color::White => (Castle::WhiteKing, Castle::WhiteQueen),
            Color::Black => (Castle::BlackKing, Castle::BlackQueen),
        };
        let king = Piece::new(PieceName::King, self.stm);
        for castle in [kingside, queenside] {
            if self.can_castle(castle)
                && self.occupancies() & Bitboard(castle.empty_squares()) == Bitboard::EMPTY
                && (Bitboard(castle.check_squares()) & self.threats()) == Bitboard::EMPTY
            {
                let (from, to) = match castle {
                    Castle::WhiteKing => (Square(4), Square(6)),
                    Castle::WhiteQueen => (Square(4), Square(2)),
                    Castle::BlackKing => (Square(60), Square(62)),
                    Castle::BlackQueen => (Square(60), Square(58)),
                };
                moves.push(Move::new(from, to, MoveType::Castle, king, Piece::None));
            }
        }
    }

    fn generate_pawn_moves(&self, gen_type: MGT, moves: &mut MoveList) {
        let piece = Piece::new(PieceName::Pawn, self.stm);
        let pawns = self.bitboard(self.stm, PieceName::Pawn);
        let vacancies = !self.occupancies();
        let enemies = self.color(!self.stm);

        let seventh = match self.stm {
            Color::White => RANKS[6],
            Color::Black => RANKS[1],
        };
        let non_promotions = pawns & !seventh;
        let promotions = pawns & seventh;

        let up = match self.stm {
            Color::White => North,
            Color::Black => South,
        };
        let down = up.opp();

        let up_left = match self.stm {
            Color::White => NorthWest,
            Color::Black => SouthEast,
        };
        let down_right = up_left.opp();

        let up_right = match self.stm {
            Color::White => NorthEast,
            Color::Black => SouthWest,
        };
        let down_left = up_right.opp();

        let rank3_bb = match self.stm {
            Color::White => RANKS[2],
            Color::Black => RANKS[5],
        };

        if matches!(gen_type, MGT::All | MGT::QuietsOnly) {
            // Single and double pushes without captures
            let push_one = vacancies & non_promotions.shift(up);
            let push_two = vacancies & (push_one & rank3_bb).shift(up);
            for dest in push_one {
                let src = dest.shift(down);
                moves.push(Move::new(src, dest, MoveType::Normal, piece, Piece::None));
            }
            for dest in push_two {
                let src = dest.shift(down).shift(down);
                moves.push(Move::new(src, dest, MoveType::DoublePush, piece, Piece::None));
            }
        }

        // Promotions are always generated, no matter the move class
        if promotions != Bitboard::EMPTY {
            let no_capture_promotions = promotions.shift(up) & vacancies;
            let left_capture_promotions = promotions.shift(up_left) & enemies;
            let right_capture_promotions = promotions.shift(up_right) & enemies;
            for dest in no_capture_promotions {
                self.gen_promotions(piece, dest.shift(down), dest, moves);
            }
            for dest in left_capture_promotions {
                self.gen_promotions(piece, dest.shift(down_right), dest, moves);
            }
            for dest in right_capture_promotions {
                self.gen_promotions(piece, dest.shift(down_left), dest, moves);
            }
        }

        if matches!(gen_type, MGT::All | MGT::CapturesOnly) {
            if non_promotions != Bitboard::EMPTY {
                let left_captures = non_promotions.shift(up_left) & enemies;
                let right_captures = non_promotions.shift(up_right) & enemies;
                for dest in left_captures {
                    let src = dest.shift(down_right);
                    moves.push(Move::new(src, dest, MoveType::Normal, piece, self.piece_at(dest)));
                }
                for dest in right_captures {
                    let src = dest.shift(down_left);
                    moves.push(Move::new(src, dest, MoveType::Normal, piece, self.piece_at(dest)));
                }
            }

            if self.can_en_passant() {
                if let Some(m) = self.get_en_passant(down_right, piece) {
                    moves.push(m);
                }
                if let Some(m) = self.get_en_passant(down_left, piece) {
                    moves.push(m);
                }
            }
        }
    }

    fn get_en_passant(&self, dir: Direction, piece: Piece) -> Option<Move> {
        let dest = self.en_passant_square?;
        let src = dest.checked_shift(dir)?;
        let pawn = src.bitboard() & self.bitboard(self.stm, PieceName::Pawn);
        if pawn != Bitboard::EMPTY {
            let captured = Piece::new(PieceName::Pawn, !self.stm);
            return Some(Move::new(src, dest, MoveType::EnPassant, piece, captured));
        }
        None
    }

    fn gen_promotions(&self, piece: Piece, src: Square, dest: Square, moves: &mut MoveList) {
        const PROMOS: [MoveType; 4] = [
            MoveType::QueenPromotion,
            MoveType::RookPromotion,
            MoveType::BishopPromotion,
            MoveType::KnightPromotion,
        ];
        for promo in PROMOS {
            moves.push(Move::new(src, dest, promo, piece, self.piece_at(dest)));
        }
    }

    fn generate_bitboard_moves(&self, piece_name: PieceName, gen_type: MGT, moves: &mut MoveList) {
        let occ_self = self.bitboard(self.stm, piece_name);
        let piece_moving = Piece::new(piece_name, self.stm);
        for sq in occ_self {
            let occupancies = self.occupancies();
            let attack_bb = match piece_name {
                PieceName::King => king_attacks(sq),
                PieceName::Queen => queen_attacks(sq, occupancies),
                PieceName::Rook => rook_attacks(sq, occupancies),
                PieceName::Bishop => bishop_attacks(sq, occupancies),
                PieceName::Knight => knight_attacks(sq),
                _ => panic!("pawns are generated separately"),
            };
            let attacks = match gen_type {
                MGT::CapturesOnly => attack_bb & self.color(!self.stm),
                MGT::QuietsOnly => attack_bb & !self.occupancies(),
                MGT::All => attack_bb & !self.color(self.stm),
            };
            for dest in attacks {
                moves.push(Move::new(sq, dest, MoveType::Normal, piece_moving, self.piece_at(dest)));
            }
        }
    }
}
