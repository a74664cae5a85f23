use std::path::PathBuf;

use clap::Parser;
use log::info;

use super::{
    compress::Compression,
    file::DEFAULT_CLUSTER_BYTES,
    generator::BitbaseGenerator,
    reader::BitbaseReader,
};

/// Offline bitbase generation: `aplite bitbase --pieces K*K --threads 8`
#[derive(Parser, Debug)]
#[command(name = "bitbase", about = "Generate endgame bitbases")]
pub struct BitbaseArgs {
    /// Piece strings to generate; `*` expands over P, N, B, R and Q
    #[arg(long, required = true, num_args = 1..)]
    pub pieces: Vec<String>,

    /// Worker threads for the generation passes
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// Store clusters without compression
    #[arg(long, default_value_t = false)]
    pub uncompressed: bool,

    /// Directory the bitbase files are read from and written to
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub fn run(args: &BitbaseArgs) {
    let mut reader = BitbaseReader::new(&args.path);
    let generator = BitbaseGenerator {
        threads: args.threads,
        compression: if args.uncompressed { Compression::None } else { Compression::Deflate },
        cluster_bytes: DEFAULT_CLUSTER_BYTES,
    };

    let patterns: Vec<&str> = args.pieces.iter().map(String::as_str).collect();
    info!("generating bitbases for {:?} into {}", patterns, args.path.display());
    generator.generate_patterns(&patterns, &mut reader);
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn argument_parsing() {
        let args =
            BitbaseArgs::parse_from(["bitbase", "--pieces", "KPK", "K*K", "--threads", "4", "--uncompressed"]);
        assert_eq!(args.pieces, vec!["KPK", "K*K"]);
        assert_eq!(args.threads, 4);
        assert!(args.uncompressed);
        assert_eq!(args.path, PathBuf::from("."));
    }
}
