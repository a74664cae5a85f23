use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use itertools::Itertools;

use crate::{
    bitbase::reader::BitbaseReader,
    board::{
        board::Board,
        fen::{parse_fen_from_buffer, STARTING_FEN},
    },
    engine::{
        perft::perft,
        transposition::{TranspositionTable, DEFAULT_TABLE_SIZE_MB},
    },
    moves::moves::from_lan,
    search::{
        clock::{ClockManager, ClockSetting},
        history::HistoryTable,
        search::search,
        thread::ThreadData,
        LmrTable,
    },
    types::pieces::Color,
};

/// Standard set of endings loaded when a bitbase directory is configured
const DEFAULT_BITBASE_PATTERNS: [&str; 3] = ["K*K", "K*K*", "K**K"];

/// Everything a running search shares with the command loop
struct EngineState {
    tt: Arc<TranspositionTable>,
    reader: Arc<BitbaseReader>,
    lmr: Arc<LmrTable>,
    halt: Arc<AtomicBool>,
    ponder_hit: Arc<AtomicBool>,
    global_nodes: Arc<AtomicU64>,
    history: Arc<Mutex<HistoryTable>>,
    threads: usize,
    multi_pv: usize,
    bitbase_path: Option<PathBuf>,
    bitbase_patterns: Vec<String>,
}

impl EngineState {
    /// Bitbases cannot be mutated under a running search, so option changes
    /// build a fresh registry and swap the handle
    fn rebuild_reader(&mut self) {
        let Some(path) = &self.bitbase_path else { return };
        let mut reader = BitbaseReader::new(path);
        let patterns: Vec<&str> = DEFAULT_BITBASE_PATTERNS
            .into_iter()
            .chain(self.bitbase_patterns.iter().map(String::as_str))
            .collect();
        reader.load_patterns(&patterns, false);
        self.reader = Arc::new(reader);
    }
}

/// Main loop handling UCI communication with a front-end
pub fn main_loop() -> ! {
    let mut board = Board::from_fen(STARTING_FEN);
    let mut hash_history = vec![board.zobrist_hash];
    let mut state = EngineState {
        tt: Arc::new(TranspositionTable::new(DEFAULT_TABLE_SIZE_MB)),
        reader: Arc::new(BitbaseReader::default()),
        lmr: Arc::new(LmrTable::default()),
        halt: Arc::new(AtomicBool::new(false)),
        ponder_hit: Arc::new(AtomicBool::new(false)),
        global_nodes: Arc::new(AtomicU64::new(0)),
        history: Arc::new(Mutex::new(HistoryTable::default())),
        threads: 1,
        multi_pv: 1,
        bitbase_path: None,
        bitbase_patterns: Vec::new(),
    };

    let mut buffer = String::new();
    loop {
        buffer.clear();
        if io::stdin().read_line(&mut buffer).unwrap_or(0) == 0 {
            std::process::exit(0);
        }
        let tokens: Vec<&str> = buffer.split_whitespace().collect();
        let Some(&command) = tokens.first() else { continue };

        match command {
            "uci" => {
                println!("id name Aplite");
                println!("id author the Aplite developers");
                println!("option name Hash type spin default {DEFAULT_TABLE_SIZE_MB} min 1 max 8192");
                println!("option name Threads type spin default 1 min 1 max 64");
                println!("option name MultiPV type spin default 1 min 1 max 64");
                println!("option name BitbasePath type string default <empty>");
                println!("option name BitbasePieces type string default <empty>");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                board = Board::from_fen(STARTING_FEN);
                hash_history = vec![board.zobrist_hash];
                state.tt.clear();
                state.history.lock().unwrap().clear();
            }
            "setoption" => {
                handle_setoption(&tokens, &mut state);
            }
            "position" => {
                (board, hash_history) = parse_position(&tokens, &buffer);
            }
            "go" => {
                if tokens.get(1) == Some(&"perft") {
                    let depth = tokens.get(2).and_then(|t| t.parse().ok()).unwrap_or(1);
                    perft(&board, depth);
                } else {
                    handle_go(&tokens, &board, &hash_history, &state);
                }
            }
            "stop" => state.halt.store(true, Ordering::Relaxed),
            "ponderhit" => state.ponder_hit.store(true, Ordering::Relaxed),
            "d" => println!("{board}"),
            "quit" => std::process::exit(0),
            _ => println!("info string unknown command {command}"),
        }
    }
}

fn handle_setoption(tokens: &[&str], state: &mut EngineState) {
    let name = tokens.iter().position(|&t| t == "name").and_then(|i| tokens.get(i + 1));
    let value = tokens.iter().position(|&t| t == "value").and_then(|i| tokens.get(i + 1));
    let (Some(&name), Some(&value)) = (name, value) else {
        println!("info string malformed setoption");
        return;
    };

    match name {
        "Hash" => {
            if let Ok(mb) = value.parse::<usize>() {
                state.tt = Arc::new(TranspositionTable::new(mb));
            }
        }
        "Threads" => {
            if let Ok(t) = value.parse::<usize>() {
                state.threads = t.clamp(1, 64);
            }
        }
        "MultiPV" => {
            if let Ok(k) = value.parse::<usize>() {
                state.multi_pv = k.clamp(1, 64);
            }
        }
        "BitbasePath" => {
            state.bitbase_path = Some(PathBuf::from(value));
            state.rebuild_reader();
        }
        "BitbasePieces" => {
            state.bitbase_patterns.push(value.to_string());
            state.rebuild_reader();
        }
        _ => println!("info string unknown option {name}"),
    }
}

fn parse_position(tokens: &[&str], buffer: &str) -> (Board, Vec<u64>) {
    let mut board = if buffer.contains("fen") {
        Board::from_fen(&parse_fen_from_buffer(tokens))
    } else {
        Board::from_fen(STARTING_FEN)
    };
    let mut hash_history = vec![board.zobrist_hash];

    if let Some(moves_at) = tokens.iter().position(|&t| t == "moves") {
        for move_str in &tokens[moves_at + 1..] {
            let m = from_lan(move_str, &board);
            assert!(board.make_move(m), "front-end sent illegal move {move_str}");
            hash_history.push(board.zobrist_hash);
        }
    }
    (board, hash_history)
}

fn parse_go(tokens: &[&str], stm: Color, moves_played: usize) -> ClockSetting {
    let mut setting = ClockSetting { moves_played: moves_played as i32, ..ClockSetting::default() };
    let mut pairs = tokens.iter().skip(1).tuples();
    while let Some((&key, &value)) = pairs.next() {
        let millis = || value.parse().map(Duration::from_millis).unwrap_or_default();
        match (key, stm) {
            ("wtime", Color::White) | ("btime", Color::Black) => setting.time_left = millis(),
            ("winc", Color::White) | ("binc", Color::Black) => setting.increment = millis(),
            ("movestogo", _) => setting.moves_to_go = value.parse().unwrap_or(0),
            ("depth", _) => setting.depth_limit = value.parse().unwrap_or(0),
            ("nodes", _) => setting.node_target = value.parse().unwrap_or(0),
            ("movetime", _) => setting.exact_time_per_move = value.parse().ok().map(Duration::from_millis),
            _ => (),
        }
    }
    setting.analyze = tokens.contains(&"infinite");
    setting.ponder = tokens.contains(&"ponder");
    setting
}

/// Launches the search on detached threads so the loop stays responsive to
/// `stop` and `ponderhit`
fn handle_go(tokens: &[&str], board: &Board, hash_history: &[u64], state: &EngineState) {
    state.halt.store(false, Ordering::Relaxed);
    state.ponder_hit.store(false, Ordering::Relaxed);
    state.global_nodes.store(0, Ordering::Relaxed);

    let setting = parse_go(tokens, board.stm, hash_history.len());
    let board = *board;
    let hash_history = hash_history.to_vec();
    let tt = Arc::clone(&state.tt);
    let reader = Arc::clone(&state.reader);
    let lmr = Arc::clone(&state.lmr);
    let halt = Arc::clone(&state.halt);
    let ponder_hit = Arc::clone(&state.ponder_hit);
    let global_nodes = Arc::clone(&state.global_nodes);
    let history = Arc::clone(&state.history);
    let threads = state.threads;
    let multi_pv = state.multi_pv;

    thread::spawn(move || {
        thread::scope(|s| {
            for idx in 1..threads {
                let mut td = ThreadData::new(&halt, hash_history.clone(), idx, &lmr, &global_nodes);
                // Helpers never self-terminate; the main thread's halt flag
                // reaps them
                td.clock = ClockManager::start_calculating_move(ClockSetting { analyze: true, ..setting });
                td.history = history.lock().unwrap().clone();
                let (tt, reader, board) = (&tt, &reader, &board);
                s.spawn(move || {
                    search(&mut td, false, board, tt, reader, 1);
                });
            }

            let mut td = ThreadData::new(&halt, hash_history.clone(), 0, &lmr, &global_nodes);
            td.ponder_hit = Some(&ponder_hit);
            td.clock = ClockManager::start_calculating_move(setting);
            td.history = history.lock().unwrap().clone();
            let report = search(&mut td, true, &board, &tt, &reader, multi_pv);
            halt.store(true, Ordering::Relaxed);

            match report.ponder {
                Some(ponder) => {
                    println!("bestmove {} ponder {}", report.best_move.to_lan(), ponder.to_lan());
                }
                None => println!("bestmove {}", report.best_move.to_lan()),
            }

            *history.lock().unwrap() = td.history.clone();
        });
        tt.age_up();
    });
}
