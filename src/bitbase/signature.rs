use std::fmt;

use crate::{
    board::board::Board,
    types::pieces::{Color, PieceName},
};

/// Packed per-color piece counts (kings excluded): three bits for each of
/// the five piece types and two colors. Keys the bitbase registry and
/// doubles as the material gate for probes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, PartialOrd, Ord)]
pub struct PieceSignature(u32);

const TYPES: [PieceName; 5] =
    [PieceName::Pawn, PieceName::Knight, PieceName::Bishop, PieceName::Rook, PieceName::Queen];

fn shift(color: Color, piece: PieceName) -> u32 {
    color as u32 * 15 + piece.idx() as u32 * 3
}

impl PieceSignature {
    pub fn from_board(board: &Board) -> Self {
        let mut sig = Self::default();
        for color in Color::iter() {
            for piece in TYPES {
                let count = board.bitboard(color, piece).count_bits();
                sig.set_count(color, piece, count);
            }
        }
        sig
    }

    /// Parses a piece string such as "KQKP": white pieces after the first
    /// king, black pieces after the second. Returns None on anything else.
    pub fn parse(piece_string: &str) -> Option<Self> {
        let mut sig = Self::default();
        let mut chars = piece_string.chars();
        if chars.next() != Some('K') {
            return None;
        }
        let mut color = Color::White;
        for c in chars {
            if c == 'K' {
                if color == Color::Black {
                    return None;
                }
                color = Color::Black;
                continue;
            }
            let piece = match c {
                'P' => PieceName::Pawn,
                'N' => PieceName::Knight,
                'B' => PieceName::Bishop,
                'R' => PieceName::Rook,
                'Q' => PieceName::Queen,
                _ => return None,
            };
            let count = sig.count(color, piece);
            if count >= 7 {
                return None;
            }
            sig.set_count(color, piece, count + 1);
        }
        (color == Color::Black).then_some(sig)
    }

    pub fn count(self, color: Color, piece: PieceName) -> u32 {
        self.0 >> shift(color, piece) & 0b111
    }

    fn set_count(&mut self, color: Color, piece: PieceName, count: u32) {
        debug_assert!(count <= 7);
        self.0 = self.0 & !(0b111 << shift(color, piece)) | count << shift(color, piece);
    }

    pub fn non_king_pieces(self) -> u32 {
        Color::iter().flat_map(|c| TYPES.map(|p| self.count(c, p))).sum()
    }

    pub fn pawn_count(self) -> u32 {
        self.count(Color::White, PieceName::Pawn) + self.count(Color::Black, PieceName::Pawn)
    }

    /// Swaps the colors of every piece
    pub fn symmetric(self) -> Self {
        Self((self.0 >> 15) | (self.0 & 0x7FFF) << 15)
    }

    pub fn has_any_material(self, color: Color) -> bool {
        TYPES.iter().any(|&p| self.count(color, p) > 0)
    }

    /// Whether the side can force mate at all: a pawn, rook or queen, two
    /// bishops, or bishop plus knight. Two bare knights cannot.
    pub fn has_enough_material_to_mate(self, color: Color) -> bool {
        if self.count(color, PieceName::Pawn) > 0
            || self.count(color, PieceName::Rook) > 0
            || self.count(color, PieceName::Queen) > 0
        {
            return true;
        }
        let bishops = self.count(color, PieceName::Bishop);
        let knights = self.count(color, PieceName::Knight);
        bishops >= 2 || (bishops >= 1 && knights >= 1)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceSignature {
    /// Canonical piece string with pieces in descending value per color
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for color in Color::iter() {
            write!(f, "K")?;
            for piece in TYPES.iter().rev() {
                for _ in 0..self.count(color, *piece) {
                    write!(f, "{}", piece.char())?;
                }
            }
        }
        Ok(())
    }
}

/// Expands `*` wildcards over the five piece types: "K*K" becomes KPK,
/// KNK, KBK, KRK, KQK
pub fn expand_wildcards(pattern: &str) -> Vec<String> {
    match pattern.find('*') {
        None => vec![pattern.to_string()],
        Some(pos) => "QRBNP"
            .chars()
            .flat_map(|c| {
                let mut next = pattern.to_string();
                next.replace_range(pos..=pos, &c.to_string());
                expand_wildcards(&next)
            })
            .collect(),
    }
}

#[cfg(test)]
mod signature_tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for s in ["KPK", "KQK", "KQKP", "KRPKR", "KBNK", "KQQKQ"] {
            let sig = PieceSignature::parse(s).unwrap();
            assert_eq!(sig.to_string(), s, "round trip failed for {s}");
        }
        assert!(PieceSignature::parse("QK").is_none());
        assert!(PieceSignature::parse("KXK").is_none());
        assert!(PieceSignature::parse("KP").is_none());
    }

    #[test]
    fn board_signature_matches_parse() {
        let board = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        assert_eq!(PieceSignature::from_board(&board), PieceSignature::parse("KPK").unwrap());
    }

    #[test]
    fn symmetric_swaps_sides() {
        let sig = PieceSignature::parse("KQKP").unwrap();
        assert_eq!(sig.symmetric(), PieceSignature::parse("KPKQ").unwrap());
        assert_eq!(sig.symmetric().symmetric(), sig);
    }

    #[test]
    fn mating_material() {
        let sig = PieceSignature::parse("KPK").unwrap();
        assert!(sig.has_enough_material_to_mate(Color::White));
        assert!(!sig.has_enough_material_to_mate(Color::Black));

        let sig = PieceSignature::parse("KNNK").unwrap();
        assert!(!sig.has_enough_material_to_mate(Color::White));

        let sig = PieceSignature::parse("KBNK").unwrap();
        assert!(sig.has_enough_material_to_mate(Color::White));
    }

    #[test]
    fn wildcard_expansion() {
        let expanded = expand_wildcards("K*K");
        assert_eq!(expanded.len(), 5);
        assert!(expanded.contains(&"KPK".to_string()));
        assert!(expanded.contains(&"KQK".to_string()));
        assert_eq!(expand_wildcards("K*K*").len(), 25);
        assert_eq!(expand_wildcards("KRK"), vec!["KRK".to_string()]);
    }
}
