#![allow(clippy::module_inception)]
#![allow(clippy::cast_possible_truncation)]

mod bench;
mod bitbase;
mod board;
mod engine;
mod eval;
mod moves;
mod search;
mod types;

use crate::bench::bench;
use crate::bitbase::cli::BitbaseArgs;
use crate::engine::uci::main_loop;
use clap::Parser;
use std::env;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("bench") => bench(),
        Some("bitbase") => {
            let parsed = BitbaseArgs::parse_from(&args[1..]);
            bitbase::cli::run(&parsed);
        }
        _ => main_loop(),
    }
}
