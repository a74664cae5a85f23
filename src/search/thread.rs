use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Instant,
};

use crate::{
    board::board::Board,
    engine::transposition::TranspositionTable,
    moves::moves::Move,
    search::{
        clock::{ClockManager, ClockMode},
        history::HistoryTable,
        search::{CHECKMATE, NEAR_CHECKMATE},
        LmrTable, SearchStack, PV,
    },
};

/// All per-searcher state. The transposition table and stop flag are shared
/// between searchers; everything else is private to the thread.
pub struct ThreadData<'a> {
    pub ply: i32,
    pub iter_max_depth: i32,
    /// Deepest ply reached by a pv node this iteration
    pub sel_depth: i32,
    pub best_move: Move,

    pub nodes: AtomicCounter<'a>,
    /// Nodes spent under each root move, feeds time management
    pub nodes_table: [[u64; 64]; 64],
    pub(crate) stack: SearchStack,
    pub history: HistoryTable,
    pub hash_history: Vec<u64>,
    pub clock: ClockManager,

    pub search_start: Instant,
    pub thread_idx: usize,
    pub halt: &'a AtomicBool,
    /// Raised by the front-end when the predicted move was played
    pub ponder_hit: Option<&'a AtomicBool>,
    pub lmr: &'a LmrTable,
    /// Root moves excluded from this multi-pv pass
    pub root_excluded: Vec<Move>,
}

impl<'a> ThreadData<'a> {
    pub fn new(
        halt: &'a AtomicBool,
        hash_history: Vec<u64>,
        thread_idx: usize,
        lmr: &'a LmrTable,
        global_nodes: &'a AtomicU64,
    ) -> Self {
        Self {
            ply: 0,
            iter_max_depth: 0,
            sel_depth: 0,
            best_move: Move::EMPTY,
            nodes: AtomicCounter::new(global_nodes),
            nodes_table: [[0; 64]; 64],
            stack: SearchStack::default(),
            history: HistoryTable::default(),
            hash_history,
            clock: ClockManager::default(),
            search_start: Instant::now(),
            thread_idx,
            halt,
            ponder_hit: None,
            lmr,
            root_excluded: Vec::new(),
        }
    }

    pub fn main_thread(&self) -> bool {
        self.thread_idx == 0
    }

    pub fn halted(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }

    pub fn set_halt(&self, val: bool) {
        self.halt.store(val, Ordering::Relaxed);
    }

    /// Cheap cancellation poll at node entry; real time checks only run when
    /// the batched node counter rolls over
    pub fn should_stop(&mut self) -> bool {
        if self.halted() {
            return true;
        }
        if self.nodes.check_time() && self.main_thread() {
            if self.clock.mode() == ClockMode::Ponder
                && self.ponder_hit.is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                self.clock.ponder_hit();
            }
            let nodes = self.nodes.global_count();
            if self.clock.emergency_abort() || self.clock.stop_on_node_target(nodes) {
                self.set_halt(true);
                return true;
            }
        }
        false
    }

    /// Repetition if this hash already occurred twice among the ancestors
    /// within the halfmove window
    pub fn is_repetition(&self, board: &Board) -> bool {
        if self.hash_history.len() < 6 {
            return false;
        }

        let mut reps = 2;
        for &hash in self.hash_history.iter().rev().take(board.half_moves + 1).skip(1) {
            reps -= u32::from(hash == board.zobrist_hash);
            if reps == 0 {
                return true;
            }
        }
        false
    }

    pub fn print_search_stats(&self, eval: i32, pv: &PV, tt: &TranspositionTable, multipv_idx: usize) {
        let nodes = self.nodes.global_count();
        let elapsed = self.search_start.elapsed();
        print!(
            "info depth {} seldepth {} multipv {} time {} nodes {} nps {} score ",
            self.iter_max_depth,
            self.sel_depth,
            multipv_idx + 1,
            elapsed.as_millis(),
            nodes,
            (nodes as f64 / elapsed.as_secs_f64()) as i64,
        );

        if eval.abs() >= NEAR_CHECKMATE {
            if eval.is_positive() {
                print!("mate {}", (CHECKMATE - eval + 1) / 2);
            } else {
                print!("mate {}", -(CHECKMATE + eval) / 2);
            }
        } else {
            print!("cp {eval}");
        }

        print!(" hashfull {} pv", tt.permille_usage());
        for m in &pv.line {
            print!(" {}", m.to_lan());
        }
        println!();
    }
}


/// Node counter that publishes to a shared atomic in batches so the hot
/// path stays cheap
pub struct AtomicCounter<'a> {
    global_nodes: &'a AtomicU64,
    local_nodes: u64,
    batch: u64,
}

const UPDATE_FREQ: u64 = 1024;

impl<'a> AtomicCounter<'a> {
    const fn new(global_nodes: &'a AtomicU64) -> Self {
        Self { global_nodes, local_nodes: 0, batch: 0 }
    }

    pub fn global_count(&self) -> u64 {
        self.global_nodes.load(Ordering::Relaxed) + self.batch
    }

    pub const fn local_count(&self) -> u64 {
        self.local_nodes + self.batch
    }

    pub fn increment(&mut self) {
        self.batch += 1;
        if self.batch > UPDATE_FREQ {
            self.local_nodes += self.batch;
            self.global_nodes.fetch_add(self.batch, Ordering::Relaxed);
            self.batch = 0;
        }
    }

    pub fn reset(&mut self) {
        self.batch = 0;
        self.local_nodes = 0;
        self.global_nodes.store(0, Ordering::Relaxed);
    }

    pub const fn check_time(&self) -> bool {
        self.batch == 0
    }
}
