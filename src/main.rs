use std::path::PathBuf;

use anyhow::{Error, Result};
use clap::{Parser, Subcommand};

use langstats_rs::doc_stats::{doc_stats, doc_stats_reduce};
use langstats_rs::pipeline::{collect, filter, reduce, ReduceMode};

/*
Typical run, per corpus:

    langstats-rs collect --input-dir docs/ --output-dir shards/ --config collect.yaml
    langstats-rs reduce --input-dir shards/ --output-file thresholds.yaml --mode filters_meanstd
    langstats-rs filter --input-dir docs/ --output-dir kept/ --err-dir dropped/ --config filter.yaml

*/
/*============================================================
=                            ARGS                            =
============================================================*/

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct ArgParser {
    #[clap(subcommand)]
    command: Commands,

    #[arg(long, default_value_t = 0)]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Per-file shard aggregates of the quality signals
    #[clap(arg_required_else_help = true)]
    Collect {
        #[arg(required = true, long)]
        input_dir: PathBuf,

        #[arg(required = true, long)]
        output_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Merge shard aggregates into per-language statistics or thresholds
    #[clap(arg_required_else_help = true)]
    Reduce {
        #[arg(required = true, long)]
        input_dir: PathBuf,

        #[arg(required = true, long)]
        output_file: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long, value_enum, default_value_t = ReduceMode::Statistics)]
        mode: ReduceMode,
    },

    /// Run a filter pipeline, splitting documents into kept and dropped
    #[clap(arg_required_else_help = true)]
    Filter {
        #[arg(required = true, long)]
        input_dir: PathBuf,

        #[arg(required = true, long)]
        output_dir: PathBuf,

        #[arg(required = true, long)]
        config: PathBuf,

        #[arg(long)]
        err_dir: Option<PathBuf>,
    },

    DocStats {
        #[arg(required = true, long)]
        input_dir: PathBuf,

        #[arg(required = true, long)]
        output_dir: PathBuf,

        #[arg(long, default_value = "text")]
        text_field: String,

        #[arg(long, default_value = "metadata.language")]
        language_field: String,
    },

    DocStatsReduce {
        #[arg(required = true, long)]
        input_dir: PathBuf,

        #[arg(required = true, long)]
        output_file: PathBuf,
    },
}


/*============================================================
=                            MAIN                            =
============================================================*/

fn main() -> Result<(), Error> {
    env_logger::init();
    let args = ArgParser::parse();
    let threads = args.threads;
    if threads != 0 {
        std::env::set_var("RAYON_NUM_THREADS", threads.to_string());
    }

    match &args.command {
        Commands::Collect {
            input_dir,
            output_dir,
            config,
            language,
        } => collect(input_dir, output_dir, config.as_ref(), language.clone()),
        Commands::Reduce {
            input_dir,
            output_file,
            config,
            language,
            mode,
        } => reduce(input_dir, output_file, config.as_ref(), language.as_deref(), *mode),
        Commands::Filter {
            input_dir,
            output_dir,
            config,
            err_dir,
        } => filter(input_dir, output_dir, config, err_dir.clone()),
        Commands::DocStats {
            input_dir,
            output_dir,
            text_field,
            language_field,
        } => doc_stats(input_dir, output_dir, text_field, language_field),
        Commands::DocStatsReduce {
            input_dir,
            output_file,
        } => doc_stats_reduce(input_dir, output_file).map(|_| ()),
    }
}
