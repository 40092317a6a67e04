// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! irmeta-inspect - Inspect persisted object graph files.
//!
//! Usage:
//!   irmeta-inspect graph.irm
//!   irmeta-inspect graph.irm --header-only
//!   irmeta-inspect graph.irm --json --all

use anyhow::Context;
use clap::Parser;
use irmeta::{load_file, read_header, DescriptorSummary, Heap, Registry};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "irmeta-inspect")]
#[command(about = "Inspect persisted irmeta object graph files")]
#[command(version)]
struct Args {
    /// Persisted graph file
    file: PathBuf,

    /// Validate and print the header only
    #[arg(long)]
    header_only: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Include the bootstrap descriptors
    #[arg(long)]
    all: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn print_descriptor(summary: &DescriptorSummary) {
    let mut line = format!(
        "  {:>4}  {:<40} {:<9} size {:>4} align {:>2}",
        summary.id, summary.name, summary.kind, summary.size, summary.alignment
    );
    if let Some(base) = &summary.base {
        line.push_str(&format!("  : {}", base));
    }
    if let Some(target) = &summary.target {
        line.push_str(&format!("  -> {}", target));
    }
    if let Some(tag) = summary.tag_offset {
        line.push_str(&format!("  tag@{}", tag));
    }
    println!("{}", line);
    for field in &summary.fields {
        println!("        {:>4}  {:<24} {}", field.offset, field.name, field.type_name);
    }
    for alternative in &summary.alternatives {
        println!(
            "        {:>4}  {:<24} {} (alternative)",
            alternative.offset, alternative.name, alternative.type_name
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !args.file.exists() {
        anyhow::bail!("Input file not found: {}", args.file.display());
    }

    let header = read_header(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    info!(version = %header.format_version, producer = %header.producer, "header valid");
    if args.header_only {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&header)?);
        } else {
            println!("format:   {}", header.format_version);
            println!("producer: {}", header.producer);
        }
        return Ok(());
    }

    let mut registry = Registry::new();
    let mut heap = Heap::new();
    let loaded = load_file(&mut registry, &mut heap, &args.file)
        .with_context(|| format!("cannot load {}", args.file.display()))?;

    let from_file: HashSet<&str> = loaded
        .report
        .live
        .iter()
        .chain(&loaded.report.lists)
        .chain(&loaded.report.cloned)
        .map(String::as_str)
        .collect();
    let last_builtin = registry.builtins().registry.get();
    let descriptors: Vec<DescriptorSummary> = registry
        .summaries()
        .into_iter()
        .filter(|s| args.all || (s.id > last_builtin && from_file.contains(s.name.as_str())))
        .collect();

    if args.json {
        let out = serde_json::json!({
            "file": args.file.display().to_string(),
            "header": loaded.header,
            "roots": loaded.roots.len(),
            "objects": heap.len(),
            "sync": loaded.report,
            "descriptors": descriptors,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("file:     {}", args.file.display());
    println!("format:   {}", loaded.header.format_version);
    println!("producer: {}", loaded.header.producer);
    println!("roots:    {}", loaded.roots.len());
    println!("objects:  {}", heap.len());
    println!(
        "sync:     {} live, {} lists, {} cloned, {} adjusted",
        loaded.report.live.len(),
        loaded.report.lists.len(),
        loaded.report.cloned.len(),
        loaded.report.adjusted.len()
    );
    for name in &loaded.report.adjusted {
        println!("  [!] layout of {} differs from the writer", name);
    }
    let moved = loaded.report.remap.iter().filter(|(old, new)| **old != new.get()).count();
    if moved > 0 {
        println!("  {} descriptor ids renumbered", moved);
    }
    println!("descriptors:");
    for summary in &descriptors {
        print_descriptor(summary);
    }
    Ok(())
}
