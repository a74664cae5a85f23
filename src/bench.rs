use std::{
    sync::atomic::{AtomicBool, AtomicU64},
    time::Instant,
};

use crate::{
    bitbase::reader::BitbaseReader,
    board::board::Board,
    engine::transposition::TranspositionTable,
    search::{
        clock::{ClockManager, ClockSetting},
        search::search,
        thread::ThreadData,
        LmrTable,
    },
};

const BENCH_DEPTH: i32 = 8;

/// A spread of openings, middlegames and endgames for a stable node count
const BENCH_FENS: [&str; 12] = [
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r2q1rk1/ppp2ppp/3p1n2/8/2PNP3/2N5/PP3PPP/R2QK2R w KQ - 0 10",
    "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1",
    "8/8/1k6/8/8/8/1K1P4/8 w - - 0 1",
    "4k3/8/4K3/4Q3/8/8/8/8 w - - 0 1",
    "6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1",
    "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3",
    "8/8/8/4p3/4k3/8/8/4K3 w - - 0 1",
];

/// Fixed-depth search over the suite, reporting total nodes and speed the
/// way OpenBench expects
pub fn bench() {
    let halt = AtomicBool::new(false);
    let global_nodes = AtomicU64::new(0);
    let lmr = LmrTable::default();
    let tt = TranspositionTable::new(16);
    let reader = BitbaseReader::default();

    let start = Instant::now();
    let mut total_nodes = 0u64;

    for fen in BENCH_FENS {
        let board = Board::from_fen(fen);
        let mut td = ThreadData::new(&halt, vec![board.zobrist_hash], 0, &lmr, &global_nodes);
        td.clock = ClockManager::start_calculating_move(ClockSetting {
            depth_limit: BENCH_DEPTH,
            ..ClockSetting::default()
        });
        let report = search(&mut td, false, &board, &tt, &reader, 1);
        total_nodes += td.nodes.local_count();
        println!("{fen}: best {} score {}", report.best_move.to_lan(), report.score);
        tt.age_up();
    }

    let elapsed = start.elapsed();
    println!("{total_nodes} nodes {} nps", (total_nodes as f64 / elapsed.as_secs_f64()) as u64);
}

#[cfg(test)]
mod bench_tests {
    use super::*;
    use crate::search::search::{CHECKMATE, NEAR_CHECKMATE};

    fn fixed_depth_search(fen: &str, depth: i32) -> (crate::moves::moves::Move, i32) {
        let halt = AtomicBool::new(false);
        let global_nodes = AtomicU64::new(0);
        let lmr = LmrTable::default();
        let tt = TranspositionTable::new(16);
        let reader = BitbaseReader::default();
        let board = Board::from_fen(fen);
        let mut td = ThreadData::new(&halt, vec![board.zobrist_hash], 0, &lmr, &global_nodes);
        td.clock = ClockManager::start_calculating_move(ClockSetting {
            depth_limit: depth,
            ..ClockSetting::default()
        });
        let report = search(&mut td, false, &board, &tt, &reader, 1);
        (report.best_move, report.score)
    }

    #[test]
    fn finds_mate_in_one() {
        // Back rank mate with the rook
        let (best, score) = fixed_depth_search("6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1", 4);
        assert_eq!(best.to_lan(), "d1d8");
        assert!(score > NEAR_CHECKMATE, "expected mate score, got {score}");
    }

    #[test]
    fn kqk_search_finds_mate() {
        // The queen boxes the king in; depth 3 already proves the mate
        let (best, score) = fixed_depth_search("4k3/8/4K3/4Q3/8/8/8/8 w - - 0 1", 3);
        assert!(score > CHECKMATE - 8, "expected near mate, got {score}");
        assert_eq!(best.to_lan(), "e5e7");
    }

    #[test]
    fn avoids_hanging_material() {
        // Queen must not take the defended rook
        let (best, _) = fixed_depth_search("4k3/8/2p5/3r4/8/8/8/3QK3 w - - 0 1", 5);
        assert_ne!(best.to_lan(), "d1d5");
    }

    #[test]
    fn search_scores_stay_bounded() {
        for fen in BENCH_FENS.iter().take(6) {
            let (_, score) = fixed_depth_search(fen, 4);
            assert!(score.abs() <= CHECKMATE, "score {score} out of range for {fen}");
        }
    }
}
