use std::time::Instant;

use crate::{
    bitbase::reader::{BitbaseReader, Probe},
    board::board::Board,
    engine::transposition::{EntryFlag, TranspositionTable},
    eval::evaluate,
    moves::{
        movegenerator::generate_legal_moves,
        movelist::MoveListEntry,
        movepicker::MovePicker,
        moves::Move,
    },
    types::pieces::{Color, PieceName},
};

use super::{aspiration::AspirationWindow, quiescence::quiescence, thread::ThreadData, SearchStack, PV};

pub const CHECKMATE: i32 = 25000;
pub const STALEMATE: i32 = 0;
pub const NEAR_CHECKMATE: i32 = CHECKMATE - 1000;
pub const INFINITY: i32 = 30000;
pub const MAX_SEARCH_DEPTH: i32 = 100;

/// Scores handed out by endgame bitbase probes. A known win outranks any
/// positional value but never masquerades as a mate score; the known draw
/// stays distinguishable from the repetition draw at 0.
pub const BITBASE_WIN: i32 = 8000;
pub const BITBASE_DRAW: i32 = 1;

const NULL_MOVE_LIMIT: i32 = 2;
const NULL_MOVE_REDUCTION: i32 = 4;

/// One candidate at the root with the bookkeeping iterative deepening needs
#[derive(Clone)]
pub struct RootMove {
    pub m: Move,
    pub value: i32,
    pub prev_value: i32,
    pub nodes: u64,
    pub pv: PV,
}

pub struct SearchReport {
    pub best_move: Move,
    pub ponder: Option<Move>,
    pub score: i32,
}

pub fn search(
    td: &mut ThreadData,
    print_uci: bool,
    board: &Board,
    tt: &TranspositionTable,
    reader: &BitbaseReader,
    multi_pv: usize,
) -> SearchReport {
    td.search_start = Instant::now();
    td.nodes_table = [[0; 64]; 64];
    td.stack = SearchStack::default();
    td.sel_depth = 0;
    td.best_move = Move::EMPTY;

    iterative_deepening(td, board, print_uci, tt, reader, multi_pv)
}

/// Ramping the depth one level at a time is cheaper than searching the
/// target depth cold: shallow iterations fill the transposition and history
/// tables, so deeper ones cut off far earlier. Root moves are re-sorted by
/// the values of the last completed iteration, previous best first.
fn iterative_deepening(
    td: &mut ThreadData,
    board: &Board,
    print_uci: bool,
    tt: &TranspositionTable,
    reader: &BitbaseReader,
    multi_pv: usize,
) -> SearchReport {
    let legal = generate_legal_moves(board);
    if legal.is_empty() {
        return SearchReport { best_move: Move::EMPTY, ponder: None, score: if board.in_check() { -CHECKMATE } else { STALEMATE } };
    }
    let mut root_moves: Vec<RootMove> = legal
        .iter()
        .map(|e| RootMove { m: e.m, value: -INFINITY, prev_value: -INFINITY, nodes: 0, pv: PV::default() })
        .collect();

    let mut window = AspirationWindow::default();
    window.init_search();

    let mut best = SearchReport { best_move: root_moves[0].m, ponder: None, score: -INFINITY };
    let multi_pv = multi_pv.max(1).min(root_moves.len());
    let mut depth = 1;

    'deepening: loop {
        td.iter_max_depth = depth;
        td.clock.set_calculation_depth(depth);
        for rm in &mut root_moves {
            rm.prev_value = rm.value;
        }

        for pv_idx in 0..multi_pv {
            td.root_excluded = root_moves.iter().take(pv_idx).map(|rm| rm.m).collect();
            td.ply = 0;
            td.sel_depth = 0;

            // Only the principal pass uses the aspiration machine; the
            // remaining multi-pv passes search the full window
            if pv_idx == 0 {
                window.new_depth(depth);
            }

            let value = loop {
                let (alpha, beta) = if pv_idx == 0 { (window.alpha(), window.beta()) } else { (-INFINITY, INFINITY) };
                let mut pv = PV::default();
                let value = negamax::<true>(depth, alpha, beta, &mut pv, td, tt, reader, board, false);

                if td.halted() || td.clock.is_search_stopped() {
                    // A partial iteration only replaces the completed one if
                    // it finished the previous best move and improved on it
                    if pv_idx == 0 && !pv.line.is_empty() && value > best.score && value > alpha {
                        record_root_value(&mut root_moves, &pv, value);
                    }
                    break 'deepening;
                }

                if pv_idx == 0 {
                    if value <= alpha {
                        td.clock.set_searched_root_move(true, value);
                    } else if value < beta {
                        td.clock.set_searched_root_move(false, value);
                    }
                    window.set_search_result(value);
                    if value > alpha && value < beta {
                        record_root_value(&mut root_moves, &pv, value);
                        break value;
                    }
                    // Out of window: re-search with the widened bounds
                    continue;
                }
                record_root_value(&mut root_moves, &pv, value);
                break value;
            };

            if pv_idx == 0 {
                td.clock.set_search_result(depth, value);
            }
        }

        // Stable sort keeps the previous best in front on equal values
        root_moves.sort_by(|a, b| b.value.cmp(&a.value));

        best.best_move = root_moves[0].m;
        best.score = root_moves[0].value;
        best.ponder = root_moves[0].pv.line.get(1).copied();
        td.best_move = best.best_move;

        if print_uci {
            for (idx, rm) in root_moves.iter().take(multi_pv).enumerate() {
                td.print_search_stats(rm.value, &rm.pv, tt, idx);
            }
        }

        if td.halted() {
            break;
        }
        if td.clock.setting().depth_limit > 0 && depth >= td.clock.setting().depth_limit {
            break;
        }
        if depth >= MAX_SEARCH_DEPTH {
            break;
        }
        if !td.clock.may_compute_next_depth(depth + 1) {
            break;
        }

        td.history.new_search();
        depth += 1;
    }

    // A partial iteration that finished searching a better move may still
    // improve on the last completed result
    root_moves.sort_by(|a, b| b.value.cmp(&a.value));
    if root_moves[0].value > best.score || best.best_move.is_empty() {
        best.best_move = root_moves[0].m;
        best.score = root_moves[0].value;
        best.ponder = root_moves[0].pv.line.get(1).copied();
    }
    td.best_move = best.best_move;
    best
}

fn record_root_value(root_moves: &mut [RootMove], pv: &PV, value: i32) {
    let Some(&first) = pv.line.first() else { return };
    if let Some(rm) = root_moves.iter_mut().find(|rm| rm.m == first) {
        rm.value = value;
        rm.pv = pv.clone();
    }
}

/// Principal-variation negamax. All windows are in the side-to-move frame.
/// `cut_node` marks nodes expected to fail high, which searches a little
/// harder before trusting reductions.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub(crate) fn negamax<const IS_PV: bool>(
    mut depth: i32,
    mut alpha: i32,
    mut beta: i32,
    pv: &mut PV,
    td: &mut ThreadData,
    tt: &TranspositionTable,
    reader: &BitbaseReader,
    board: &Board,
    cut_node: bool,
) -> i32 {
    let is_root = td.ply == 0;
    let in_check = board.in_check();

    let singular_move = td.stack[td.ply].singular;
    let singular_search = singular_move.is_valid();

    td.sel_depth = td.sel_depth.max(td.ply);

    if td.should_stop() {
        return STALEMATE;
    }

    if depth <= 0 && !in_check {
        return quiescence::<IS_PV>(alpha, beta, pv, td, tt, board);
    }
    depth = depth.max(0);

    if !is_root {
        // Repetitions and the 50-move rule end the game on the spot
        if board.is_draw() || td.is_repetition(board) {
            return STALEMATE;
        }

        if td.ply >= MAX_SEARCH_DEPTH - 1 {
            return if in_check { STALEMATE } else { evaluate(board) };
        }

        // Mate distance pruning: a forced mate closer to the root already
        // bounds what this subtree can achieve
        alpha = alpha.max(-CHECKMATE + td.ply);
        beta = beta.min(CHECKMATE - td.ply);
        if alpha >= beta {
            return alpha;
        }

        // With little enough material the bitbases give a perfect verdict
        if !singular_search && board.non_king_pieces() <= reader.max_probe_pieces() {
            match reader.probe_dual(board) {
                Probe::Win => return BITBASE_WIN - td.ply,
                Probe::Loss => return -BITBASE_WIN + td.ply,
                Probe::Draw => return BITBASE_DRAW,
                Probe::Unknown => (),
            }
        }
    }

    let mut tt_move = Move::EMPTY;
    let mut tt_threat = false;
    let entry = tt.get(board.zobrist_hash, td.ply);
    if let Some(entry) = entry {
        let tt_score = entry.search_score();
        tt_move = entry.best_move();
        tt_threat = entry.null_move_threat();

        // The stored bounds may satisfy this node outright; exact entries
        // return, one-sided ones tighten the window first
        if !singular_search && !IS_PV && entry.depth() >= depth {
            match entry.flag() {
                EntryFlag::Exact => return tt_score,
                EntryFlag::BetaCutOff => alpha = alpha.max(tt_score),
                EntryFlag::AlphaUnchanged => beta = beta.min(tt_score),
                EntryFlag::None => (),
            }
            if alpha >= beta {
                return tt_score;
            }
        }
    }

    let static_eval = if in_check {
        -INFINITY
    } else if let Some(entry) = entry {
        if entry.static_eval() != -INFINITY { entry.static_eval() } else { evaluate(board) }
    } else {
        let eval = evaluate(board);
        if !singular_search {
            tt.store(board.zobrist_hash, Move::EMPTY, 0, EntryFlag::None, -INFINITY, td.ply, IS_PV, false, eval);
        }
        eval
    };
    td.stack[td.ply].static_eval = static_eval;

    let improving = !in_check
        && td.ply > 1
        && td.stack[td.ply - 2].static_eval != -INFINITY
        && static_eval > td.stack[td.ply - 2].static_eval;

    if td.ply < MAX_SEARCH_DEPTH {
        td.stack[td.ply + 1].singular = Move::EMPTY;
        td.stack[td.ply + 1].killers = [Move::EMPTY; 2];
    }

    let can_prune = !IS_PV && !in_check && !singular_search && !is_root;

    // Futility: far enough above beta that the margin cannot be eaten back
    if can_prune
        && depth <= 10
        && static_eval.abs() < NEAR_CHECKMATE
        && static_eval - (100 * (depth + 1) - 100 * i32::from(improving)) >= beta
    {
        return static_eval;
    }

    // Null move: hand the opponent a free shot at a reduced depth; if the
    // position still clears beta the real moves will too
    if can_prune
        && depth > NULL_MOVE_LIMIT
        && static_eval >= beta
        && !tt_threat
        && !td.stack[td.ply].forbid_null
        && board.has_non_pawns(board.stm)
        && !td.stack.prev_move(td.ply - 1).is_null()
    {
        let mut new_b = *board;
        new_b.make_null_move();
        td.stack[td.ply].played_move = Move::NULL;
        td.hash_history.push(new_b.zobrist_hash);
        td.ply += 1;

        let mut node_pv = PV::default();
        let r = NULL_MOVE_REDUCTION;
        let null_eval =
            -negamax::<false>(depth - r, -beta, -beta + 1, &mut node_pv, td, tt, reader, &new_b, !cut_node);

        td.hash_history.pop();
        td.ply -= 1;

        if null_eval >= beta {
            if depth <= 6 {
                return null_eval.min(NEAR_CHECKMATE - 1);
            }
            // Deep nodes verify the cutoff without the null move before
            // trusting it
            td.stack[td.ply].forbid_null = true;
            let mut verify_pv = PV::default();
            let verified =
                negamax::<false>(depth - r, beta - 1, beta, &mut verify_pv, td, tt, reader, board, cut_node);
            td.stack[td.ply].forbid_null = false;
            if verified >= beta {
                return null_eval.min(NEAR_CHECKMATE - 1);
            }
            // Verification failed: the position hides a threat
            tt_threat = true;
        }
    }

    // Internal iterative deepening digs up a hash move for pv nodes that
    // lack one
    if IS_PV && tt_move.is_empty() && depth >= 4 && !singular_search {
        let mut iid_pv = PV::default();
        negamax::<IS_PV>(depth - 2, alpha, beta, &mut iid_pv, td, tt, reader, board, cut_node);
        if let Some(entry) = tt.get(board.zobrist_hash, td.ply) {
            tt_move = entry.best_move();
        }
    }

    let original_alpha = alpha;
    let mut best_score = -INFINITY;
    let mut best_move = Move::EMPTY;
    let mut moves_searched = 0;
    let mut quiets_tried: Vec<Move> = Vec::new();

    let mut picker = MovePicker::new(tt_move, td);
    while let Some(MoveListEntry { m, .. }) = picker.next(board, td) {
        if m == singular_move {
            continue;
        }
        if is_root && td.root_excluded.contains(&m) {
            continue;
        }

        let mut new_b = *board;
        if !new_b.make_move(m) {
            continue;
        }
        let is_quiet = !m.is_tactical();

        let extension = extension(entry, m, depth, &new_b, board, td, tt, reader, cut_node);
        let new_depth = depth + extension - 1;

        td.nodes.increment();
        let pre_search_nodes = td.nodes.local_count();
        td.stack[td.ply].played_move = m;
        td.hash_history.push(new_b.zobrist_hash);
        td.ply += 1;

        let mut node_pv = PV::default();
        let mut eval = -INFINITY;

        // Late moves get a reduced null-window probe first; anything that
        // raises alpha is re-searched at full depth, and pv candidates get
        // the full window back
        if depth > 2 && moves_searched > 1 + i32::from(is_root) && is_quiet {
            let mut r = td.lmr.base_reduction(depth, moves_searched);
            r -= i32::from(IS_PV);
            r += i32::from(cut_node);
            let d = (new_depth - r).clamp(1, new_depth.max(1));
            eval = -negamax::<false>(d, -alpha - 1, -alpha, &mut node_pv, td, tt, reader, &new_b, true);

            if eval > alpha && d < new_depth {
                eval = -negamax::<false>(new_depth, -alpha - 1, -alpha, &mut node_pv, td, tt, reader, &new_b, !cut_node);
            }
        } else if moves_searched > 0 || !IS_PV {
            eval = -negamax::<false>(new_depth, -alpha - 1, -alpha, &mut node_pv, td, tt, reader, &new_b, !cut_node);
        }

        if IS_PV && (moves_searched == 0 || (eval > alpha && eval < beta)) {
            eval = -negamax::<true>(new_depth, -beta, -alpha, &mut node_pv, td, tt, reader, &new_b, false);
        }

        td.hash_history.pop();
        td.ply -= 1;
        moves_searched += 1;

        if is_root {
            td.nodes_table[m.from()][m.to()] += td.nodes.local_count() - pre_search_nodes;
        }
        if is_quiet {
            quiets_tried.push(m);
        }

        if td.halted() {
            return best_score.max(eval);
        }

        best_score = best_score.max(eval);
        if eval <= alpha {
            continue;
        }

        alpha = eval;
        best_move = m;
        pv.update(m, &node_pv);

        if eval < beta {
            continue;
        }

        // Beta cutoff: remember what refuted this node
        if is_quiet {
            let killers = &mut td.stack[td.ply].killers;
            if killers[0] != m {
                killers[1] = killers[0];
                killers[0] = m;
            }
            td.history.cutoff(m, depth, &quiets_tried);
        } else if m.is_capture() {
            td.stack[td.ply].capture_killer = m;
        }
        break;
    }

    if moves_searched == 0 {
        return if singular_search {
            alpha
        } else if in_check {
            // Distance to the root lets callers prefer the shortest mate
            -CHECKMATE + td.ply
        } else {
            STALEMATE
        };
    }

    let entry_flag = if best_score >= beta {
        EntryFlag::BetaCutOff
    } else if best_score > original_alpha {
        EntryFlag::Exact
    } else {
        EntryFlag::AlphaUnchanged
    };

    if !singular_search {
        tt.store(board.zobrist_hash, best_move, depth, entry_flag, best_score, td.ply, IS_PV, tt_threat, static_eval);
    }

    best_score
}

#[cfg(test)]
mod search_tests {
    use super::*;
    use crate::search::clock::{ClockManager, ClockSetting};
    use crate::search::thread::ThreadData;
    use crate::search::LmrTable;
    use crate::types::pieces::Piece;
    use crate::types::square::Square;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    fn run_search(board: &Board, depth: i32) -> SearchReport {
        let halt = AtomicBool::new(false);
        let global_nodes = AtomicU64::new(0);
        let lmr = LmrTable::default();
        let tt = TranspositionTable::new(8);
        let reader = BitbaseReader::default();
        let mut td = ThreadData::new(&halt, vec![board.zobrist_hash], 0, &lmr, &global_nodes);
        td.clock = ClockManager::start_calculating_move(ClockSetting {
            depth_limit: depth,
            ..ClockSetting::default()
        });
        search(&mut td, false, board, &tt, &reader, 1)
    }

    /// Swaps colors, flips the board vertically, and hands the move to the
    /// other side: the same game seen from the other chair
    fn mirror(board: &Board) -> Board {
        let mut mirrored = Board::empty();
        for sq in Square::iter() {
            let piece = board.piece_at(sq);
            if piece != Piece::None {
                mirrored.place_piece(Piece::new(piece.name(), !piece.color()), sq.flip_vertical());
            }
        }
        mirrored.stm = !board.stm;
        mirrored.zobrist_hash = mirrored.generate_hash();
        mirrored.refresh_masks();
        mirrored
    }

    #[test]
    fn scores_stay_within_mate_bounds() {
        for fen in [
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "4k3/8/4K3/4Q3/8/8/8/8 w - - 0 1",
            "8/8/8/4p3/4k3/8/8/4K3 w - - 0 1",
        ] {
            let report = run_search(&Board::from_fen(fen), 5);
            assert!(report.score.abs() <= CHECKMATE, "out of bounds for {fen}");
        }
    }

    #[test]
    fn search_is_color_symmetric_with_empty_tables() {
        // Shallow enough that no order-sensitive reduction fires, so the
        // returned value is the exact value of the pruned tree. Positions
        // without castling rights, since the mirror helper ignores them.
        for fen in [
            "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        ] {
            let board = Board::from_fen(fen);
            let a = run_search(&board, 2);
            let b = run_search(&mirror(&board), 2);
            assert_eq!(a.score, b.score, "asymmetric search for {fen}");
        }
    }

    #[test]
    fn stalemate_is_scored_zero() {
        // Black to move has no moves and is not in check
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let report = run_search(&board, 4);
        assert_eq!(report.score, STALEMATE);
        assert!(report.best_move.is_empty());
    }

    #[test]
    fn mated_side_reports_negative_mate() {
        // White is checkmated in the corner
        let board = Board::from_fen("K7/1q6/1k6/8/8/8/8/8 w - - 0 1");
        let report = run_search(&board, 3);
        assert_eq!(report.score, -CHECKMATE);
    }
}

/// Extensions counterbalance the reductions: checks, pawns stepping to the
/// edge of promotion, and singular hash moves get one extra ply
#[allow(clippy::too_many_arguments)]
fn extension(
    tt_entry: Option<crate::engine::transposition::TableEntry>,
    m: Move,
    depth: i32,
    board_after: &Board,
    board: &Board,
    td: &mut ThreadData,
    tt: &TranspositionTable,
    reader: &BitbaseReader,
    cut_node: bool,
) -> i32 {
    if board_after.in_check() {
        return 1;
    }

    if m.piece_moving().name() == PieceName::Pawn {
        let to_rank = m.to().rank();
        let seventh = match m.piece_moving().color() {
            Color::White => 6,
            Color::Black => 1,
        };
        if to_rank == seventh {
            return 1;
        }
    }

    // Singular: the hash move beats every rival at reduced depth, so the
    // node hangs on this single move and deserves a deeper look
    let Some(entry) = tt_entry else { return 0 };
    let tt_move = entry.best_move();
    if m != tt_move
        || depth < 7
        || td.ply == 0
        || entry.depth() < depth - 3
        || matches!(entry.flag(), EntryFlag::AlphaUnchanged | EntryFlag::None)
        || entry.search_score().abs() >= NEAR_CHECKMATE
    {
        return 0;
    }

    let ext_beta = (entry.search_score() - 2 * depth).max(-CHECKMATE);
    let ext_depth = (depth - 1) / 2;
    let mut node_pv = PV::default();

    td.stack[td.ply].singular = m;
    let ext_score =
        negamax::<false>(ext_depth, ext_beta - 1, ext_beta, &mut node_pv, td, tt, reader, board, cut_node);
    td.stack[td.ply].singular = Move::EMPTY;

    i32::from(ext_score < ext_beta)
}
