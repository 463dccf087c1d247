//! Subcommand implementations.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lts_core::{CacheStats, ShardAddress, ShardStore};
use serde::Serialize;
use tracing::debug;

use crate::output::{OutputMode, hex_preview, kv, print_json, section};

const PREVIEW_BYTES: usize = 32;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Logical byte offset.
    pub offset: u64,
    /// Number of bytes requested.
    pub size: u64,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Logical byte offset to start at.
    pub offset: u64,
    /// Number of bytes to read. May span several shards.
    pub size: u64,
    /// Write the bytes to this file instead of printing a preview.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
    /// Print handle cache counters after the read.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Debug, Serialize)]
struct ReadOutput<'a> {
    offset: u64,
    requested: u64,
    read: u64,
    segments: Vec<ShardAddress>,
    truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<&'a PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CacheStats>,
}

pub fn run_resolve(args: &ResolveArgs, store: &ShardStore, output: OutputMode) -> Result<()> {
    let address = store.resolve(args.offset, args.size);

    if output.is_json() {
        return print_json(&address);
    }

    let mut out = io::stdout().lock();
    kv(&mut out, "path", &address.path)?;
    kv(&mut out, "in_file_offset", address.in_file_offset.to_string())?;
    kv(&mut out, "clipped_size", address.clipped_size.to_string())?;
    Ok(())
}

pub fn run_read(args: &ReadArgs, store: &ShardStore, output: OutputMode) -> Result<()> {
    let mut data = Vec::new();
    let mut segments = Vec::new();
    let mut cursor = args.offset;
    let mut remaining = args.size;
    let mut truncated = false;

    while remaining > 0 {
        let address = store.resolve(cursor, remaining);
        let chunk = store.read(cursor, remaining).map_err(|err| {
            let hint = err.hint().map(|h| format!(" ({h})")).unwrap_or_default();
            anyhow::anyhow!("{}: {err}{hint}", err.code())
        })?;
        let got = chunk.len() as u64;
        debug!(path = %address.path, requested = address.clipped_size, got, "read segment");

        data.extend_from_slice(&chunk);
        segments.push(address.clone());
        cursor += got;
        remaining -= got;

        if got < address.clipped_size {
            truncated = true;
            break;
        }
    }

    if let Some(path) = &args.out {
        fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let report = ReadOutput {
        offset: args.offset,
        requested: args.size,
        read: data.len() as u64,
        segments,
        truncated,
        preview_hex: args
            .out
            .is_none()
            .then(|| hex_preview(&data, PREVIEW_BYTES)),
        written_to: args.out.as_ref(),
        stats: args.stats.then(|| store.stats()),
    };

    if output.is_json() {
        return print_json(&report);
    }
    render_read_human(&report)
}

fn render_read_human(report: &ReadOutput<'_>) -> Result<()> {
    let mut out = io::stdout().lock();
    kv(&mut out, "offset", report.offset.to_string())?;
    kv(&mut out, "requested", report.requested.to_string())?;
    kv(&mut out, "read", report.read.to_string())?;
    if report.truncated {
        kv(&mut out, "truncated", "yes (shard shorter than expected)")?;
    }
    for segment in &report.segments {
        kv(
            &mut out,
            "segment",
            format!(
                "{} @ {} (+{})",
                segment.path, segment.in_file_offset, segment.clipped_size
            ),
        )?;
    }
    match (&report.written_to, &report.preview_hex) {
        (Some(path), _) => kv(&mut out, "written_to", path.display().to_string())?,
        (None, Some(hex)) => kv(&mut out, "bytes", hex)?,
        (None, None) => {}
    }

    if let Some(stats) = &report.stats {
        writeln!(out)?;
        render_stats(&mut out, stats)?;
    }
    Ok(())
}

fn render_stats(out: &mut dyn Write, stats: &CacheStats) -> io::Result<()> {
    section(out, "handle cache")?;
    kv(out, "hits", stats.hits.to_string())?;
    kv(out, "misses", stats.misses.to_string())?;
    kv(out, "opens", stats.opens.to_string())?;
    kv(out, "closes", stats.closes.to_string())?;
    kv(out, "evictions", stats.evictions.to_string())?;
    kv(out, "blocking_evictions", stats.blocking_evictions.to_string())?;
    kv(out, "stale_retries", stats.stale_retries.to_string())?;
    kv(out, "short_reads", stats.short_reads.to_string())?;
    kv(out, "open_handles", stats.open_handles.to_string())?;
    kv(out, "peak_open_handles", stats.peak_open_handles.to_string())
}
