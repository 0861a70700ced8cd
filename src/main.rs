// SPDX-License-Identifier: MIT OR Apache-2.0

//! m3embed - Dense, sparse and multi-vector embedding tool
//!
//! Runs external tokenizer and model collaborators and post-processes their
//! tensors into the three BGE-M3 embedding representations.

mod cli;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use m3embed::config::{Config, ConfigOutputFormat, ProviderType};
use m3embed::embedding::{compare, EmbeddingResult, M3Embedder, Tolerances};
use m3embed::output;

fn main() -> Result<()> {
    // Initialize tracing with M3EMBED_LOG env var (e.g., M3EMBED_LOG=debug m3embed encode "text")
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("M3EMBED_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load();
    config.apply_env()?;
    if cli.dummy {
        config.tokenizer.provider = Some(ProviderType::Dummy);
        config.model.provider = Some(ProviderType::Dummy);
    }

    let format = cli.format.unwrap_or(match config.output_format() {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });

    match cli.command {
        Commands::Encode {
            texts,
            input,
            output,
            quiet,
        } => {
            let texts = collect_texts(texts, input.as_deref())?;
            let embedder = M3Embedder::from_config(&config)?;
            info!(model = embedder.model_id(), texts = texts.len(), "encoding");

            let results = encode_all(&embedder, &texts, quiet)?;

            if let Some(path) = output {
                let records: BTreeMap<&str, &EmbeddingResult> = texts
                    .iter()
                    .map(String::as_str)
                    .zip(&results)
                    .collect();
                let json = to_json(&records, cli.compact)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !quiet {
                    eprintln!("Wrote {} embeddings to {}", results.len(), path.display());
                }
            } else {
                match format {
                    OutputFormat::Json => {
                        let records: BTreeMap<&str, &EmbeddingResult> = texts
                            .iter()
                            .map(String::as_str)
                            .zip(&results)
                            .collect();
                        println!("{}", to_json(&records, cli.compact)?);
                    }
                    OutputFormat::Text => {
                        let use_color = output::use_colors();
                        for (text, result) in texts.iter().zip(&results) {
                            println!("{}", output::format_summary(text, result, use_color));
                        }
                    }
                }
            }
        }
        Commands::Tokenize { text } => {
            let embedder = M3Embedder::from_config(&config)?;
            let input = embedder.prepare(&text)?;
            match format {
                OutputFormat::Json => println!("{}", to_json(&input, cli.compact)?),
                OutputFormat::Text => {
                    let ids: Vec<String> = input.input_ids.iter().map(i64::to_string).collect();
                    let mask: Vec<String> =
                        input.attention_mask.iter().map(i64::to_string).collect();
                    println!("input_ids: [{}]", ids.join(", "));
                    println!("attention_mask: [{}]", mask.join(", "));
                }
            }
        }
        Commands::Compare { reference } => {
            let content = std::fs::read_to_string(&reference)
                .with_context(|| format!("Failed to read {}", reference.display()))?;
            let references: BTreeMap<String, EmbeddingResult> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", reference.display()))?;

            let embedder = M3Embedder::from_config(&config)?;
            let tolerances = Tolerances::from(&config.compare);
            let use_color = output::use_colors();

            let mut failed = 0usize;
            let mut reports = BTreeMap::new();
            for (text, expected) in &references {
                let actual = embedder
                    .encode(text)
                    .with_context(|| format!("Failed to encode {:?}", text))?;
                let report = compare(&actual, expected, &tolerances);
                if !report.passed() {
                    failed += 1;
                }
                if format == OutputFormat::Text {
                    print!("{}", output::format_comparison(text, &report, use_color));
                }
                reports.insert(text.as_str(), report);
            }

            if format == OutputFormat::Json {
                println!("{}", to_json(&reports, cli.compact)?);
            }
            if failed > 0 {
                bail!(
                    "{} of {} reference embeddings did not match",
                    failed,
                    references.len()
                );
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "m3embed", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn collect_texts(mut texts: Vec<String>, input: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        texts.extend(content.lines().map(str::to_string));
    }
    if texts.is_empty() {
        bail!("No texts given; pass TEXT arguments or --input FILE");
    }
    Ok(texts)
}

fn encode_all(
    embedder: &M3Embedder,
    texts: &[String],
    quiet: bool,
) -> Result<Vec<EmbeddingResult>> {
    if quiet || texts.len() < 2 {
        return Ok(embedder.encode_batch(texts)?);
    }

    let pb = ProgressBar::new(texts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} texts | Encoding")
            .expect("valid progress bar template")
            .progress_chars("##."),
    );

    let results = texts
        .par_iter()
        .progress_with(pb.clone())
        .map(|text| embedder.encode(text))
        .collect::<m3embed::errors::Result<Vec<_>>>();
    pb.finish_and_clear();
    Ok(results?)
}

fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(json)
}
