use crate::{
    board::board::Board,
    moves::{attack_boards::pawn_attacks, magics::{bishop_attacks, rook_attacks}, moves::Move},
    types::{bitboard::Bitboard, pieces::{Piece, PieceName}},
};

/// Static exchange evaluation: plays out the capture sequence on the
/// destination square, both sides recapturing with their cheapest attacker
/// and standing pat when that is better. Returns whether the exchange beats
/// `threshold`.
pub fn see(board: &Board, m: Move, threshold: i32) -> bool {
    let from = m.from();
    let to = m.to();

    let mut val = if m.capture() == Piece::None { -threshold } else { m.capture().value() - threshold };
    if val < 0 {
        return false;
    }

    val -= m.piece_moving().value();
    if val >= 0 {
        return true;
    }

    let mut occupied = (board.occupancies() ^ from.bitboard()) | to.bitboard();
    let mut attackers = board.attackers(to, occupied) & occupied;

    let bishops = board.piece(PieceName::Bishop) | board.piece(PieceName::Queen);
    let rooks = board.piece(PieceName::Rook) | board.piece(PieceName::Queen);

    let mut to_move = !board.stm;

    loop {
        attackers &= occupied;

        let my_attackers = attackers & board.color(to_move);
        if my_attackers == Bitboard::EMPTY {
            break;
        }

        // Recapture with the least valuable attacker first
        let mut cheapest = PieceName::King;
        for p in PieceName::iter() {
            if my_attackers & board.piece(p) != Bitboard::EMPTY {
                cheapest = p;
                break;
            }
        }

        to_move = !to_move;
        val = -val - 1 - cheapest.value();
        if val >= 0 {
            if cheapest == PieceName::King && (attackers & board.color(to_move) != Bitboard::EMPTY) {
                // The king cannot legally recapture into remaining attackers
                to_move = !to_move;
            }
            break;
        }

        occupied ^= (my_attackers & board.piece(cheapest)).lsb().bitboard();

        // Remove blockers and pick up x-ray attackers behind the piece that
        // just captured
        if matches!(cheapest, PieceName::Pawn | PieceName::Bishop | PieceName::Queen) {
            attackers |= bishop_attacks(to, occupied) & bishops;
        }
        if matches!(cheapest, PieceName::Rook | PieceName::Queen) {
            attackers |= rook_attacks(to, occupied) & rooks;
        }
    }

    to_move != board.stm
}

/// The cheap pre-filter: a capture is treated as losing when the moving
/// piece outvalues its victim and the destination square is guarded by an
/// enemy pawn
pub fn losing_capture(board: &Board, m: Move) -> bool {
    if m.capture() == Piece::None {
        return false;
    }
    let mover = m.piece_moving();
    if mover.value() <= m.capture().value() {
        return false;
    }
    let enemy_pawns = board.bitboard(!board.stm, PieceName::Pawn);
    pawn_attacks(m.to(), board.stm) & enemy_pawns != Bitboard::EMPTY
}

#[cfg(test)]
mod see_tests {
    use super::*;
    use crate::moves::moves::from_lan;

    #[test]
    fn winning_exchange() {
        let board = Board::from_fen("4k3/8/4p3/3p4/8/8/8/3RK3 w - - 0 1");
        let m = from_lan("d1d5", &board);
        // Rook takes pawn, pawn recaptures: losing for the rook
        assert!(!see(&board, m, 0));

        let board = Board::from_fen("4k3/8/8/3p4/8/8/8/3RK3 w - - 0 1");
        let m = from_lan("d1d5", &board);
        assert!(see(&board, m, 0));
    }

    #[test]
    fn xray_attackers_count() {
        // Doubled rooks on both sides; grabbing the pawn loses the exchange
        // sequence once the x-rays join in
        let board = Board::from_fen("3r4/3r4/8/3p4/8/8/3R4/3RK1k1 w - - 0 1");
        let m = from_lan("d2d5", &board);
        assert!(!see(&board, m, 0));
        // With only one defender the capture holds
        let board = Board::from_fen("3r4/8/8/3p4/8/8/3R4/3RK1k1 w - - 0 1");
        let m = from_lan("d2d5", &board);
        assert!(see(&board, m, 0));
    }

    #[test]
    fn light_see_flags_pawn_defence() {
        let board = Board::from_fen("4k3/8/2p5/3p4/8/8/8/3QK3 w - - 0 1");
        let m = from_lan("d1d5", &board);
        assert!(losing_capture(&board, m));

        let board = Board::from_fen("4k3/8/8/3p4/8/8/8/3QK3 w - - 0 1");
        let m = from_lan("d1d5", &board);
        assert!(!losing_capture(&board, m));
    }
}
