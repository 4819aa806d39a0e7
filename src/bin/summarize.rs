use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use condense::{
    collaborators::DirectorySink,
    config, logging,
    processing::{
        BatchItem, ChunkMethod, ChunkOptions, DocumentInput, SummarizationService,
        SummarizeOptions,
    },
};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "condense-summarize",
    about = "Summarize transcripts and documents through a text-generation provider"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize one document (file path, JSON string, or plain text).
    Summarize {
        input: String,
        #[command(flatten)]
        shared: SharedArgs,
    },
    /// Summarize every `.json` and `.txt` file under the given paths, one at a time.
    Batch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        shared: SharedArgs,
    },
}

#[derive(Args)]
struct SharedArgs {
    #[arg(long, short)]
    provider: Option<String>,
    #[arg(long, env = "CONDENSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, short)]
    model: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    chunk_method: Option<String>,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    chunk_overlap: Option<usize>,
    #[arg(long)]
    adaptive: bool,
    #[arg(long)]
    multi_level: bool,
    #[arg(long)]
    no_metadata: bool,
    /// Write `<title>_<source>_summary.json` files into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl SharedArgs {
    fn options(&self) -> Result<SummarizeOptions> {
        let customized = self.chunk_method.is_some()
            || self.chunk_size.is_some()
            || self.chunk_overlap.is_some()
            || self.adaptive
            || self.multi_level;
        let chunking = if customized {
            let base = config::get_config().chunk_options.clone();
            let method = match self.chunk_method.as_deref() {
                Some(name) => match name.parse::<ChunkMethod>() {
                    Ok(method) => method,
                    Err(()) => bail!(
                        "unknown chunk method '{name}' \
                         (expected words, sentences, paragraphs, tokens, or semantic)"
                    ),
                },
                None => base.method,
            };
            Some(ChunkOptions {
                method,
                max_size: self.chunk_size.unwrap_or(base.max_size),
                overlap: self.chunk_overlap.unwrap_or(base.overlap),
                adaptive: self.adaptive || base.adaptive,
                multi_level: self.multi_level || base.multi_level,
                ..base
            })
        } else {
            None
        };

        Ok(SummarizeOptions {
            provider: self.provider.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            chunking,
            include_metadata: Some(!self.no_metadata),
        })
    }

    fn service(&self) -> SummarizationService {
        let service = SummarizationService::new();
        match &self.output_dir {
            Some(dir) => service.with_sink(Arc::new(DirectorySink::new(dir.clone()))),
            None => service,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("Failed to load configuration")?;
    logging::init_cli_tracing();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current request...");
            trigger.cancel();
        }
    });

    match cli.command {
        Command::Summarize { input, shared } => {
            let options = shared.options()?;
            let service = shared.service();
            let source_id = source_id_for(&input);
            let outcome = service
                .summarize(&source_id, DocumentInput::Text(input), &options, &cancel)
                .await
                .map_err(|error| anyhow::anyhow!(error.describe()))?;
            println!("{}", outcome.summary);
        }
        Command::Batch { paths, shared } => {
            let options = shared.options()?;
            let service = shared.service();
            let items = collect_inputs(&paths)?;
            if items.is_empty() {
                bail!("no .json or .txt files found");
            }
            let report = service
                .summarize_batch_with(items, &options, &cancel, |update| {
                    eprintln!("{}", update.progress);
                    eprintln!("{}", update.status);
                })
                .await;

            let mut failures = 0;
            for result in &report.results {
                match &result.outcome {
                    Ok(outcome) => println!("## {}\n\n{}\n", result.source_id, outcome.summary),
                    Err(_) => failures += 1,
                }
            }
            if failures > 0 {
                bail!("{failures} of {} documents failed", report.results.len());
            }
        }
    }
    Ok(())
}

fn source_id_for(input: &str) -> String {
    let path = Path::new(input.trim());
    if path.is_file() {
        path.display().to_string()
    } else {
        "inline".into()
    }
}

fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<BatchItem>> {
    let mut items = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let input = match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => DocumentInput::Path(path.to_path_buf()),
                Some("txt") => DocumentInput::Text(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                _ => continue,
            };
            items.push(BatchItem {
                source_id: path.display().to_string(),
                input,
            });
        }
    }
    Ok(items)
}
