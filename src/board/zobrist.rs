use lazy_static::lazy_static;

use crate::{
    board::board::Board,
    moves::magics::Rng,
    types::pieces::{Color, PieceName},
};

pub struct Zobrist {
    pub piece_square: [[[u64; 64]; 6]; 2],
    pub turn: u64,
    pub castling: [u64; 16],
    pub en_passant: [u64; 64],
}

lazy_static! {
    pub static ref ZOBRIST: Zobrist = Zobrist::default();
}

impl Default for Zobrist {
    fn default() -> Self {
        let mut rng = Rng::default();
        let turn = rng.next_u64();
        let mut piece_square = [[[0; 64]; 6]; 2];
        piece_square.iter_mut().flatten().flatten().for_each(|x| *x = rng.next_u64());
        // Index 0 is the no-rights state and must hash to zero so that the
        // incremental xor-out/xor-in pair stays an identity there
        let mut castling = [0; 16];
        castling.iter_mut().skip(1).for_each(|x| *x = rng.next_u64());
        let mut en_passant = [0; 64];
        en_passant.iter_mut().for_each(|x| *x = rng.next_u64());
        Self { turn, piece_square, castling, en_passant }
    }
}

impl Board {
    /// Rebuilds the hash from scratch; the incrementally maintained value
    /// must always agree with this
    pub(crate) fn generate_hash(&self) -> u64 {
        let mut hash = 0;

        for color in Color::iter() {
            for piece in PieceName::iter() {
                for sq in self.bitboard(color, piece) {
                    hash ^= ZOBRIST.piece_square[color][piece][sq];
                }
            }
        }

        if let Some(sq) = self.en_passant_square {
            hash ^= ZOBRIST.en_passant[sq];
        }

        hash ^= ZOBRIST.castling[self.castling_rights as usize];

        if self.stm == Color::Black {
            hash ^= ZOBRIST.turn;
        }

        hash
    }
}

#[cfg(test)]
mod hashing_tests {
    use crate::board::board::Board;
    use crate::board::fen::STARTING_FEN;

    #[test]
    fn hash_distinguishes_positions() {
        let board1 = Board::from_fen(STARTING_FEN);
        let board2 = Board::from_fen("4r3/4k3/8/4K3/8/8/8/8 w - - 0 1");
        let board3 = Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        assert_ne!(board1.generate_hash(), board2.generate_hash());
        assert_eq!(board1.generate_hash(), board3.generate_hash());
    }

    #[test]
    fn hash_depends_on_side_to_move() {
        let w = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1");
        let b = Board::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1");
        assert_ne!(w.generate_hash(), b.generate_hash());
    }
}
