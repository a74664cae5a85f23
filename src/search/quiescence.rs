use crate::{
    board::board::Board,
    engine::transposition::{EntryFlag, TranspositionTable},
    eval::evaluate,
    moves::{movelist::MoveListEntry, movepicker::MovePicker, moves::Move},
    search::see::losing_capture,
    types::pieces::PieceName,
};

use super::{
    search::{CHECKMATE, INFINITY, MAX_SEARCH_DEPTH, STALEMATE},
    thread::ThreadData,
    PV,
};

/// Margin a capture must be able to close on top of the captured material
/// before it is worth searching
const DELTA_MARGIN: i32 = 50;

/// Capture-only tail search. Resolves hanging tactics before the static
/// eval is trusted; in check it searches every evasion instead.
pub(super) fn quiescence<const IS_PV: bool>(
    mut alpha: i32,
    beta: i32,
    pv: &mut PV,
    td: &mut ThreadData,
    tt: &TranspositionTable,
    board: &Board,
) -> i32 {
    if td.should_stop() {
        return STALEMATE;
    }

    if board.is_draw() || td.is_repetition(board) {
        return STALEMATE;
    }

    td.sel_depth = td.sel_depth.max(td.ply);

    if td.ply >= MAX_SEARCH_DEPTH {
        return evaluate(board);
    }

    let in_check = board.in_check();

    // Probe the table for an early cutoff and a stand-pat correction
    let mut table_move = Move::EMPTY;
    let entry = tt.get(board.zobrist_hash, td.ply);
    if let Some(e) = entry {
        let score = e.search_score();
        if !IS_PV
            && match e.flag() {
                EntryFlag::None => false,
                EntryFlag::AlphaUnchanged => score <= alpha,
                EntryFlag::BetaCutOff => score >= beta,
                EntryFlag::Exact => true,
            }
        {
            return score;
        }
        table_move = e.best_move();
    }

    let stand_pat = if in_check {
        -INFINITY
    } else if let Some(e) = entry {
        let eval = if e.static_eval() != -INFINITY { e.static_eval() } else { evaluate(board) };
        // A stored search score bounds the static eval more tightly
        match e.flag() {
            EntryFlag::AlphaUnchanged if e.search_score() < eval => e.search_score(),
            EntryFlag::BetaCutOff if e.search_score() > eval => e.search_score(),
            EntryFlag::Exact => e.search_score(),
            _ => eval,
        }
    } else {
        let eval = evaluate(board);
        tt.store(board.zobrist_hash, Move::EMPTY, 0, EntryFlag::None, -INFINITY, td.ply, IS_PV, false, eval);
        eval
    };
    td.stack[td.ply].static_eval = stand_pat;

    if !in_check {
        if stand_pat >= beta {
            return stand_pat;
        }
        alpha = alpha.max(stand_pat);
    }

    let original_alpha = alpha;
    let mut best_score = if in_check { -CHECKMATE } else { stand_pat };
    let mut best_move = Move::EMPTY;
    let mut legal_moves = 0;

    let mut picker = MovePicker::qsearch(table_move, td, in_check);
    while let Some(MoveListEntry { m, .. }) = picker.next(board, td) {
        if !in_check && m.is_capture() {
            // Delta pruning: even winning this piece cannot lift alpha
            if m.promotion().is_none() && stand_pat + m.capture().value() + DELTA_MARGIN < alpha {
                continue;
            }
            if m.promotion().is_none() && losing_capture(board, m) {
                continue;
            }
        }
        // Quiescence only looks at queen promotions
        if m.promotion().is_some_and(|p| p != PieceName::Queen) {
            continue;
        }

        let mut new_b = *board;
        if !new_b.make_move(m) {
            continue;
        }
        legal_moves += 1;
        td.nodes.increment();
        td.stack[td.ply].played_move = m;
        td.hash_history.push(new_b.zobrist_hash);
        td.ply += 1;

        let mut node_pv = PV::default();
        let eval = -quiescence::<IS_PV>(-beta, -alpha, &mut node_pv, td, tt, &new_b);

        td.ply -= 1;
        td.hash_history.pop();

        if td.halted() {
            return STALEMATE;
        }

        if eval > best_score {
            best_score = eval;
            if eval > alpha {
                best_move = m;
                alpha = eval;
                if IS_PV {
                    pv.update(m, &node_pv);
                }
            }
            if alpha >= beta {
                break;
            }
        }
    }

    if in_check && legal_moves == 0 {
        return -CHECKMATE + td.ply;
    }

    let entry_flag = if best_score >= beta {
        EntryFlag::BetaCutOff
    } else if best_score > original_alpha {
        EntryFlag::Exact
    } else {
        EntryFlag::AlphaUnchanged
    };
    tt.store(board.zobrist_hash, best_move, 0, entry_flag, best_score, td.ply, IS_PV, false, td.stack[td.ply].static_eval);

    best_score
}
