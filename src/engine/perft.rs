use crate::{board::board::Board, moves::movegenerator::generate_legal_moves};

/// Counts leaf nodes of the legal move tree, printing the per-move split
/// like most engines do for `go perft`
pub fn perft(board: &Board, depth: i32) -> usize {
    let mut total = 0;
    for entry in generate_legal_moves(board) {
        let mut new_b = *board;
        assert!(new_b.make_move(entry.m));
        let count = count_moves(depth - 1, &new_b);
        total += count;
        println!("{}: {count}", entry.m.to_lan());
    }
    println!("\nNodes searched: {total}");
    total
}

/// Bulk-counting recursion: at depth one the move count is the answer
pub fn count_moves(depth: i32, board: &Board) -> usize {
    let moves = generate_legal_moves(board);
    if depth <= 0 {
        return 1;
    }
    if depth == 1 {
        return moves.len();
    }

    let mut count = 0;
    for entry in moves {
        let mut new_b = *board;
        assert!(new_b.make_move(entry.m));
        count += count_moves(depth - 1, &new_b);
    }
    count
}

#[cfg(test)]
mod perft_tests {
    use super::*;
    use crate::board::fen::STARTING_FEN;

    #[test]
    fn perft_start_position_shallow() {
        let board = Board::from_fen(STARTING_FEN);
        assert_eq!(count_moves(1, &board), 20);
        assert_eq!(count_moves(2, &board), 400);
        assert_eq!(count_moves(3, &board), 8902);
        assert_eq!(count_moves(4, &board), 197_281);
    }

    #[test]
    fn perft_start_position_depth_five() {
        let board = Board::from_fen(STARTING_FEN);
        assert_eq!(count_moves(5, &board), 4_865_609);
    }

    #[test]
    #[ignore = "roughly a minute of work; run with --ignored"]
    fn perft_start_position_depth_six() {
        let board = Board::from_fen(STARTING_FEN);
        assert_eq!(count_moves(6, &board), 119_060_324);
    }

    #[test]
    fn perft_kiwipete_depth_four() {
        let board =
            Board::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        assert_eq!(count_moves(1, &board), 48);
        assert_eq!(count_moves(2, &board), 2039);
        assert_eq!(count_moves(3, &board), 97_862);
        assert_eq!(count_moves(4, &board), 4_085_603);
    }

    #[test]
    fn perft_en_passant_and_promotion_positions() {
        // Position 3 from the chessprogramming wiki table
        let board = Board::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1");
        assert_eq!(count_moves(4, &board), 43_238);
        assert_eq!(count_moves(5, &board), 674_624);

        // Position 5 exercises promotions and castling edge cases
        let board = Board::from_fen("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8");
        assert_eq!(count_moves(3, &board), 62_379);
        assert_eq!(count_moves(4, &board), 2_103_487);
    }
}
