use crate::{
    board::board::Board,
    types::{
        pieces::{Color, Piece, PieceName},
        square::Square,
    },
};

use super::signature::PieceSignature;

pub const MAX_PIECES: usize = 10;

/// Pieces of one endgame in canonical order: white king, black king, then
/// the rest sorted so identical pieces sit next to each other and pawns
/// come before all other piece types. The indexing scheme depends on that
/// order being stable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceList {
    pieces: [Piece; MAX_PIECES],
    squares: [Square; MAX_PIECES],
    num_pieces: usize,
    num_pawns: usize,
}

impl Default for PieceList {
    fn default() -> Self {
        Self {
            pieces: [Piece::None; MAX_PIECES],
            squares: [Square(0); MAX_PIECES],
            num_pieces: 0,
            num_pawns: 0,
        }
    }
}

impl PieceList {
    /// Builds the list from a piece string such as "KRPKP"
    pub fn from_string(piece_string: &str) -> Option<Self> {
        let sig = PieceSignature::parse(piece_string)?;
        Some(Self::from_signature(sig))
    }

    pub fn from_signature(sig: PieceSignature) -> Self {
        let mut list = Self::default();
        list.add(Piece::WhiteKing, Square(0));
        list.add(Piece::BlackKing, Square(0));
        for color in Color::iter() {
            for piece in PieceName::iter().take(5) {
                for _ in 0..sig.count(color, piece) {
                    list.add(Piece::new(piece, color), Square(0));
                }
            }
        }
        list.sort();
        list
    }

    pub fn from_board(board: &Board) -> Self {
        let mut list = Self::default();
        list.add(Piece::WhiteKing, board.king_square(Color::White));
        list.add(Piece::BlackKing, board.king_square(Color::Black));
        for color in Color::iter() {
            for piece in PieceName::iter().take(5) {
                for sq in board.bitboard(color, piece) {
                    list.add(Piece::new(piece, color), sq);
                }
            }
        }
        list.sort();
        list
    }

    fn add(&mut self, piece: Piece, square: Square) {
        debug_assert!(self.num_pieces < MAX_PIECES);
        self.pieces[self.num_pieces] = piece;
        self.squares[self.num_pieces] = square;
        self.num_pieces += 1;
        if piece.name() == PieceName::Pawn {
            self.num_pawns += 1;
        }
    }

    pub fn piece(&self, no: usize) -> Piece {
        if no < self.num_pieces {
            self.pieces[no]
        } else {
            Piece::None
        }
    }

    pub fn square(&self, no: usize) -> Square {
        self.squares[no]
    }

    pub fn set_square(&mut self, no: usize, square: Square) {
        self.squares[no] = square;
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn num_pawns(&self) -> usize {
        self.num_pawns
    }

    pub fn num_non_pawns(&self) -> usize {
        self.num_pieces - self.num_pawns
    }

    /// Count of identical pieces starting at `no`
    pub fn same_kind_run(&self, no: usize) -> usize {
        let piece = self.piece(no);
        (no..self.num_pieces).take_while(|&i| self.pieces[i] == piece).count()
    }

    pub fn signature(&self) -> PieceSignature {
        let mut s = String::from("K");
        for i in 2..self.num_pieces {
            if self.pieces[i].color() == Color::White {
                s.push(self.pieces[i].name().char());
            }
        }
        s.push('K');
        for i in 2..self.num_pieces {
            if self.pieces[i].color() == Color::Black {
                s.push(self.pieces[i].name().char());
            }
        }
        PieceSignature::parse(&s).expect("piece list forms a valid signature")
    }

    pub fn piece_string(&self) -> String {
        self.signature().to_string()
    }

    /// Drops a non-king piece
    pub fn remove_piece(&mut self, no: usize) {
        debug_assert!(no >= 2 && no < self.num_pieces);
        if self.pieces[no].name() == PieceName::Pawn {
            self.num_pawns -= 1;
        }
        for i in no..self.num_pieces - 1 {
            self.pieces[i] = self.pieces[i + 1];
            self.squares[i] = self.squares[i + 1];
        }
        self.num_pieces -= 1;
    }

    /// Replaces a pawn with its promoted piece and restores the canonical
    /// order
    pub fn promote_pawn(&mut self, no: usize, promote_to: PieceName) {
        debug_assert!(self.pieces[no].name() == PieceName::Pawn);
        self.pieces[no] = Piece::new(promote_to, self.pieces[no].color());
        self.num_pawns -= 1;
        self.sort();
    }

    /// Mirrors the material: colors swap and every square flips vertically.
    /// Used to probe a position from the other side's bitbase.
    pub fn to_symmetric(&self) -> Self {
        let mut sym = Self::default();
        // White king slot must come first again after the swap
        sym.add(Piece::WhiteKing, self.squares[1].flip_vertical());
        sym.add(Piece::BlackKing, self.squares[0].flip_vertical());
        for i in 2..self.num_pieces {
            let flipped = Piece::new(self.pieces[i].name(), !self.pieces[i].color());
            sym.add(flipped, self.squares[i].flip_vertical());
        }
        sym.sort();
        sym
    }

    /// Stable sort of everything behind the kings by piece code; identical
    /// pieces end up adjacent, pawns in front of the other types
    fn sort(&mut self) {
        if self.num_pieces <= 3 {
            return;
        }
        for outer in (3..self.num_pieces).rev() {
            for inner in 3..=outer {
                if self.pieces[inner - 1] as u8 > self.pieces[inner] as u8 {
                    self.pieces.swap(inner - 1, inner);
                    self.squares.swap(inner - 1, inner);
                }
            }
        }
    }
}

#[cfg(test)]
mod piece_list_tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        for s in ["KPK", "KQKP", "KRPKR", "KQQKQ", "KPPKP"] {
            let list = PieceList::from_string(s).unwrap();
            assert_eq!(list.piece_string(), s);
        }
    }

    #[test]
    fn canonical_order_groups_pieces() {
        let list = PieceList::from_string("KQPKQ").unwrap();
        assert_eq!(list.piece(0), Piece::WhiteKing);
        assert_eq!(list.piece(1), Piece::BlackKing);
        // Pawns sort before queens, white queens before black queens
        assert_eq!(list.piece(2), Piece::WhitePawn);
        assert_eq!(list.piece(3), Piece::WhiteQueen);
        assert_eq!(list.piece(4), Piece::BlackQueen);
    }

    #[test]
    fn board_and_string_agree() {
        let board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        let list = PieceList::from_board(&board);
        assert_eq!(list.piece_string(), "KPK");
        assert_eq!(list.square(0), Square(4));
        assert_eq!(list.square(1), Square(60));
        assert_eq!(list.square(2), Square(12));
    }

    #[test]
    fn symmetric_flips_colors_and_squares() {
        let board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        let sym = PieceList::from_board(&board).to_symmetric();
        assert_eq!(sym.piece_string(), "KKP");
        assert_eq!(sym.piece(0), Piece::WhiteKing);
        // The old white king at e1 becomes the black king at e8
        assert_eq!(sym.square(1), Square(4).flip_vertical());
        assert_eq!(sym.square(2), Square(12).flip_vertical());
    }

    #[test]
    fn promotion_restores_order() {
        let mut list = PieceList::from_string("KPPK").unwrap();
        list.promote_pawn(2, PieceName::Queen);
        assert_eq!(list.piece_string(), "KQPK");
        assert_eq!(list.piece(2), Piece::WhitePawn);
        assert_eq!(list.piece(3), Piece::WhiteQueen);
    }

    #[test]
    fn same_kind_runs() {
        let list = PieceList::from_string("KQQKQ").unwrap();
        assert_eq!(list.same_kind_run(2), 2);
        assert_eq!(list.same_kind_run(4), 1);
    }
}
