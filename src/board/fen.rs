use crate::{
    moves::moves::Castle,
    types::{
        pieces::{Color, Piece},
        square::Square,
    },
};

use super::board::Board;

/// Fen string for the starting position
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Board {
    /// Builds a board from a position in Forsyth-Edwards notation. Panics on
    /// malformed input; the UCI layer validates before calling.
    pub fn from_fen(fen_string: &str) -> Board {
        let mut board = Board::empty();
        let mut fields = fen_string.split_whitespace();

        let placement = fields.next().expect("fen has a piece placement field");
        let mut row = 7u8;
        for rank_str in placement.split('/') {
            let mut col = 0u8;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    col += skip as u8;
                    continue;
                }
                let piece = match c {
                    'K' => Piece::WhiteKing,
                    'Q' => Piece::WhiteQueen,
                    'R' => Piece::WhiteRook,
                    'B' => Piece::WhiteBishop,
                    'N' => Piece::WhiteKnight,
                    'P' => Piece::WhitePawn,
                    'k' => Piece::BlackKing,
                    'q' => Piece::BlackQueen,
                    'r' => Piece::BlackRook,
                    'b' => Piece::BlackBishop,
                    'n' => Piece::BlackKnight,
                    'p' => Piece::BlackPawn,
                    _ => panic!("unrecognized piece char {c}"),
                };
                board.place_piece(piece, Square(row * 8 + col));
                col += 1;
            }
            row = row.wrapping_sub(1);
        }

        board.stm = match fields.next().expect("fen has a side to move") {
            "w" => Color::White,
            "b" => Color::Black,
            other => panic!("invalid side to move {other}"),
        };

        board.castling_rights = parse_castling(fields.next().unwrap_or("-"));

        board.en_passant_square = match fields.next().unwrap_or("-") {
            "-" => None,
            sq => {
                let chars: Vec<char> = sq.chars().collect();
                let file = chars[0] as u8 - b'a';
                let rank = chars[1] as u8 - b'1';
                Some(Square(rank * 8 + file))
            }
        };

        board.half_moves = fields.next().and_then(|t| t.parse().ok()).unwrap_or(0);
        board.num_moves = fields.next().and_then(|t| t.parse().ok()).unwrap_or(1);

        board.zobrist_hash = board.generate_hash();
        board.refresh_masks();
        board
    }

    pub fn to_fen(&self) -> String {
        let mut fen = String::new();
        for row in (0..8).rev() {
            let mut empty = 0;
            for col in 0..8 {
                let piece = self.piece_at(Square(row * 8 + col));
                if piece == Piece::None {
                    empty += 1;
                } else {
                    if empty > 0 {
                        fen.push_str(&empty.to_string());
                        empty = 0;
                    }
                    fen.push(piece.char());
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if row > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.stm {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        if self.castling_rights == 0 {
            fen.push('-');
        } else {
            for (castle, c) in [
                (Castle::WhiteKing, 'K'),
                (Castle::WhiteQueen, 'Q'),
                (Castle::BlackKing, 'k'),
                (Castle::BlackQueen, 'q'),
            ] {
                if self.can_castle(castle) {
                    fen.push(c);
                }
            }
        }

        fen.push(' ');
        match self.en_passant_square {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }

        fen.push_str(&format!(" {} {}", self.half_moves, self.num_moves));
        fen
    }
}

fn parse_castling(buf: &str) -> u8 {
    buf.chars().fold(0, |x, ch| {
        x | match ch {
            'K' => Castle::WhiteKing as u8,
            'Q' => Castle::WhiteQueen as u8,
            'k' => Castle::BlackKing as u8,
            'q' => Castle::BlackQueen as u8,
            _ => 0,
        }
    })
}

/// Extracts the six FEN fields from a tokenized `position fen ...` command
pub fn parse_fen_from_buffer(buf: &[&str]) -> String {
    buf.iter().skip(2).take(6).copied().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod fen_tests {
    use super::*;

    #[test]
    fn round_trip() {
        for fen in [
            STARTING_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "4k3/8/8/8/4P3/8/8/4K3 b - - 4 11",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        ] {
            assert_eq!(Board::from_fen(fen).to_fen(), fen);
        }
    }

    #[test]
    fn castling_field() {
        assert_eq!(parse_castling("KQkq"), 0b1111);
        assert_eq!(parse_castling("Kk"), 0b0101);
        assert_eq!(parse_castling("-"), 0);
    }

    #[test]
    fn en_passant_field() {
        let board = Board::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1");
        assert_eq!(board.en_passant_square, Some(Square(20)));
    }
}
