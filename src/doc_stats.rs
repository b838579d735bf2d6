/*
Per-language document and byte counts.

A cheap companion to the signal statistics: one `{index:05}_lang_stats.json` per input
file mapping language -> {total_docs, total_bytes}, summed by the reducer.
*/

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Error, Result};
use log::info;
use mj_io::{build_pbar, expand_dirs, read_pathbuf_to_mem, write_mem_to_pathbuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stats::find_shards;
use crate::utils::json_get;

pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStats {
    pub total_docs: u64,
    pub total_bytes: u64,
}

pub type LanguageDocStats = BTreeMap<String, DocStats>;

pub fn merge_doc_stats(into: &mut LanguageDocStats, other: &LanguageDocStats) {
    for (language, stats) in other {
        let entry = into.entry(language.clone()).or_default();
        entry.total_docs += stats.total_docs;
        entry.total_bytes += stats.total_bytes;
    }
}

/// Counts documents and UTF-8 text bytes per language over JSONL lines
pub fn count_lines<I>(lines: I, text_field: &str, language_field: &str) -> Result<LanguageDocStats, Error>
where
    I: IntoIterator<Item = String>,
{
    let mut stats = LanguageDocStats::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let data: Value = serde_json::from_str(&line)?;
        let language = json_get(&data, language_field)
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_LANGUAGE);
        let n_bytes = json_get(&data, text_field).and_then(|v| v.as_str()).map_or(0, |t| t.len());
        let entry = stats.entry(language.to_string()).or_default();
        entry.total_docs += 1;
        entry.total_bytes += n_bytes as u64;
    }
    Ok(stats)
}


/*================================================================================
=                            FILE DRIVERS                                        =
================================================================================*/

pub fn doc_stats(
    input_dir: &PathBuf,
    output_dir: &PathBuf,
    text_field: &str,
    language_field: &str,
) -> Result<(), Error> {
    let start_main = Instant::now();
    let all_files = expand_dirs(vec![input_dir.clone()], None)?;
    info!("Counting documents in {} files", all_files.len());

    let pbar = build_pbar(all_files.len(), "Files");
    all_files.par_iter().enumerate().try_for_each(|(idx, p)| -> Result<(), Error> {
        let data = read_pathbuf_to_mem(p)?;
        let lines = data.lines().collect::<Result<Vec<String>, _>>()?;
        let stats = count_lines(lines, text_field, language_field)
            .with_context(|| format!("Unable to count documents in {:?}", p))?;
        let output_file = output_dir.join(format!("{:05}_lang_stats.json", idx));
        write_mem_to_pathbuf(&serde_json::to_vec(&stats)?, &output_file)?;
        pbar.inc(1);
        Ok(())
    })?;

    println!("Counted {} files in {:?} seconds", all_files.len(), start_main.elapsed().as_secs());
    Ok(())
}

pub fn doc_stats_reduce(input_dir: &PathBuf, output_file: &PathBuf) -> Result<LanguageDocStats, Error> {
    let mut total = LanguageDocStats::new();
    for path in find_shards(input_dir)? {
        let contents = read_pathbuf_to_mem(&path)?.into_inner().into_inner();
        let stats: LanguageDocStats = serde_json::from_slice(&contents)
            .with_context(|| format!("Corrupt document stats {:?}", path))?;
        merge_doc_stats(&mut total, &stats);
    }
    write_mem_to_pathbuf(&serde_json::to_vec(&total)?, output_file)?;

    for (language, stats) in &total {
        println!("{}: {} docs | {} bytes", language, stats.total_docs, stats.total_bytes);
    }
    Ok(total)
}
