use crate::{
    board::board::Board,
    moves::movegenerator::MGT,
    search::{see::losing_capture, thread::ThreadData, NUM_KILLER_MOVES},
    types::{pieces::PieceName, square::Square},
};

use super::{
    movelist::{MoveList, MoveListEntry},
    moves::Move,
};

#[derive(Default, PartialEq, Eq, Clone, Copy)]
enum Phase {
    #[default]
    TTMove,

    CapturesInit,
    GoodCaptures,

    FirstKiller,
    SecondKiller,

    QuietsInit,
    Quiets,

    LosingCaptures,

    Finished,
}

const TTMOVE: i32 = i32::MAX - 1000;
const QUEEN_PROMOTION: i32 = 20_000_001;
const KILLER_ONE: i32 = 1_000_000;
const KILLER_TWO: i32 = 900_000;
const CAPTURE_KILLER_BONUS: i32 = 500;
const RECAPTURE_BONUS: i32 = 10;
/// Light-SEE losers drop far below every sensible capture weight
const LOSING_SUB: i32 = 100_000;
const LOSING_THRESHOLD: i32 = -50_000;
const BAD_PROMOTION: i32 = -QUEEN_PROMOTION;

/// Lazily staged move provider. Emits moves in decreasing expected quality
/// and never yields the same move twice: hash move, winning captures,
/// killers, history-ordered quiets, then the losing captures.
pub struct MovePicker {
    phase: Phase,
    gen_quiets: bool,

    captures: MoveList,
    quiets: MoveList,
    cap_idx: usize,
    quiet_idx: usize,

    tt_move: Move,
    killers: [Move; NUM_KILLER_MOVES],
    capture_killer: Move,
    recapture_sq: Option<Square>,
}

impl MovePicker {
    /// Full provider for main-search nodes
    pub fn new(tt_move: Move, td: &ThreadData) -> Self {
        let prev = td.stack.prev_move(td.ply - 1);
        MovePicker {
            phase: Phase::TTMove,
            gen_quiets: true,
            captures: MoveList::default(),
            quiets: MoveList::default(),
            cap_idx: 0,
            quiet_idx: 0,
            tt_move,
            killers: td.stack[td.ply].killers,
            capture_killer: td.stack[td.ply].capture_killer,
            recapture_sq: prev.is_valid().then(|| prev.to()),
        }
    }

    /// Quiescence provider: captures only, or every evasion when in check
    pub fn qsearch(tt_move: Move, td: &ThreadData, in_check: bool) -> Self {
        let prev = td.stack.prev_move(td.ply - 1);
        MovePicker {
            phase: Phase::TTMove,
            gen_quiets: in_check,
            captures: MoveList::default(),
            quiets: MoveList::default(),
            cap_idx: 0,
            quiet_idx: 0,
            tt_move,
            killers: [Move::EMPTY; NUM_KILLER_MOVES],
            capture_killer: Move::EMPTY,
            recapture_sq: prev.is_valid().then(|| prev.to()),
        }
    }

    pub fn next(&mut self, board: &Board, td: &ThreadData) -> Option<MoveListEntry> {
        if self.phase == Phase::TTMove {
            self.phase = Phase::CapturesInit;
            // Validated late against the position instead of pre-filtering
            if board.is_pseudo_legal(self.tt_move) {
                return Some(MoveListEntry { m: self.tt_move, score: TTMOVE });
            }
        }

        if self.phase == Phase::CapturesInit {
            self.phase = Phase::GoodCaptures;
            self.captures = board.generate_moves(MGT::CapturesOnly);
            self.score_captures(board);
        }

        if self.phase == Phase::GoodCaptures {
            while self.cap_idx < self.captures.len() {
                let entry = self.captures.pick_move(self.cap_idx);
                if entry.score < LOSING_THRESHOLD {
                    // Everything left loses material; postpone behind quiets
                    break;
                }
                self.cap_idx += 1;
                if entry.m == self.tt_move {
                    continue;
                }
                return Some(entry);
            }
            self.phase = if self.gen_quiets { Phase::FirstKiller } else { Phase::LosingCaptures };
        }

        if self.phase == Phase::FirstKiller {
            self.phase = Phase::SecondKiller;
            let killer = self.killers[0];
            if killer != self.tt_move && !killer.is_tactical() && board.is_pseudo_legal(killer) {
                return Some(MoveListEntry { m: killer, score: KILLER_ONE });
            }
        }

        if self.phase == Phase::SecondKiller {
            self.phase = Phase::QuietsInit;
            let killer = self.killers[1];
            if killer != self.tt_move
                && killer != self.killers[0]
                && !killer.is_tactical()
                && board.is_pseudo_legal(killer)
            {
                return Some(MoveListEntry { m: killer, score: KILLER_TWO });
            }
        }

        if self.phase == Phase::QuietsInit {
            self.phase = Phase::Quiets;
            self.quiets = board.generate_moves(MGT::QuietsOnly);
            for entry in self.quiets.arr.iter_mut() {
                entry.score = td.history.get(entry.m);
            }
        }

        if self.phase == Phase::Quiets {
            while self.quiet_idx < self.quiets.len() {
                let entry = self.quiets.pick_move(self.quiet_idx);
                self.quiet_idx += 1;
                if self.is_cached(entry.m) {
                    continue;
                }
                return Some(entry);
            }
            self.phase = Phase::LosingCaptures;
        }

        if self.phase == Phase::LosingCaptures {
            while self.cap_idx < self.captures.len() {
                let entry = self.captures.pick_move(self.cap_idx);
                self.cap_idx += 1;
                if entry.m == self.tt_move {
                    continue;
                }
                return Some(entry);
            }
            self.phase = Phase::Finished;
        }

        None
    }

    /// Weight = value of the victim, plus a bonus for recapturing on the
    /// square the opponent just moved to. Light-SEE losers are demoted
    /// wholesale instead of being discarded.
    fn score_captures(&mut self, board: &Board) {
        for MoveListEntry { m, score } in self.captures.arr.iter_mut() {
            *score = if let Some(p) = m.promotion() {
                let captured = if m.is_capture() { m.capture().value() } else { 0 };
                match p {
                    PieceName::Queen => QUEEN_PROMOTION + captured,
                    _ => BAD_PROMOTION,
                }
            } else {
                let mut weight = m.capture().value();
                if self.recapture_sq == Some(m.to()) {
                    weight += RECAPTURE_BONUS;
                }
                if *m == self.capture_killer {
                    weight += CAPTURE_KILLER_BONUS;
                }
                if losing_capture(board, *m) {
                    weight -= LOSING_SUB;
                }
                weight
            }
        }
    }

    fn is_cached(&self, m: Move) -> bool {
        m == self.tt_move || self.killers.contains(&m)
    }
}

#[cfg(test)]
mod movepicker_tests {
    use super::*;
    use crate::search::LmrTable;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    fn thread_data<'a>(halt: &'a AtomicBool, lmr: &'a LmrTable, nodes: &'a AtomicU64) -> ThreadData<'a> {
        ThreadData::new(halt, Vec::new(), 0, lmr, nodes)
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let halt = AtomicBool::new(false);
        let lmr = LmrTable::default();
        let nodes = AtomicU64::new(0);
        let td = thread_data(&halt, &lmr, &nodes);

        let board =
            Board::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        let mut picker = MovePicker::new(Move::EMPTY, &td);
        let mut seen = HashSet::new();
        let mut count = 0;
        while let Some(entry) = picker.next(&board, &td) {
            assert!(seen.insert(entry.m), "{} returned twice", entry.m);
            count += 1;
        }
        assert_eq!(count, board.generate_moves(MGT::All).len());
    }

    #[test]
    fn tt_move_comes_first_and_is_not_repeated() {
        let halt = AtomicBool::new(false);
        let lmr = LmrTable::default();
        let nodes = AtomicU64::new(0);
        let td = thread_data(&halt, &lmr, &nodes);

        let board = Board::default();
        let tt_move = crate::moves::moves::from_lan("e2e4", &board);
        let mut picker = MovePicker::new(tt_move, &td);
        let first = picker.next(&board, &td).unwrap();
        assert_eq!(first.m, tt_move);
        while let Some(entry) = picker.next(&board, &td) {
            assert_ne!(entry.m, tt_move);
        }
    }

    #[test]
    fn losing_captures_come_last() {
        let halt = AtomicBool::new(false);
        let lmr = LmrTable::default();
        let nodes = AtomicU64::new(0);
        let td = thread_data(&halt, &lmr, &nodes);

        // Qxd5 walks into the c6 pawn, Nxd5 wins the exchange
        let board = Board::from_fen("4k3/8/2p5/3r4/8/2N5/8/3QK3 w - - 0 1");
        let mut picker = MovePicker::new(Move::EMPTY, &td);
        let mut order = Vec::new();
        while let Some(entry) = picker.next(&board, &td) {
            if entry.m.is_capture() {
                order.push(entry.m.to_lan());
            }
        }
        assert_eq!(order.first().map(String::as_str), Some("c3d5"));
        assert_eq!(order.last().map(String::as_str), Some("d1d5"));
    }

    #[test]
    fn qsearch_mode_emits_captures_only() {
        let halt = AtomicBool::new(false);
        let lmr = LmrTable::default();
        let nodes = AtomicU64::new(0);
        let td = thread_data(&halt, &lmr, &nodes);

        let board = Board::from_fen("4k3/8/2p5/3r4/8/2N5/8/3QK3 w - - 0 1");
        let mut picker = MovePicker::qsearch(Move::EMPTY, &td, false);
        while let Some(entry) = picker.next(&board, &td) {
            assert!(entry.m.is_tactical(), "{} is not tactical", entry.m);
        }
    }
}
