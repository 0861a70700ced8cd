// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// m3embed - Dense, sparse and multi-vector embeddings
///
/// Tokenizes text with an external tokenizer, runs an external embedding
/// model, and reduces its raw tensors into dense vectors, lexical weights
/// and ColBERT vectors.
#[derive(Parser, Debug)]
#[command(name = "m3embed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Use deterministic offline tokenizer and model (for testing)
    #[arg(long, global = true)]
    pub dummy: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode texts into dense, sparse and multi-vector embeddings
    #[command(alias = "e")]
    Encode {
        /// Texts to encode
        texts: Vec<String>,

        /// Read texts from a file, one per line
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the JSON record map to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Suppress progress output
        #[arg(short = 'q', long)]
        quiet: bool,
    },

    /// Show ordered token ids and attention mask for a text
    Tokenize {
        /// Text to tokenize
        text: String,
    },

    /// Re-encode every text of a reference file and compare the results
    Compare {
        /// Reference JSON file mapping text to embedding record
        #[arg(short, long)]
        reference: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
