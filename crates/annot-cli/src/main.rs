//! `annot`: inspect and maintain an annotation store.
//!
//! # Usage
//!
//! ```
//! annot --store annotations.db init
//! annot keys list
//! annot stable export --annotator alice > alice.jsonl
//! annot --config annot.toml stable import alice.jsonl
//! ```

mod settings;

use std::{
  io::{self, BufRead, BufReader, Write},
  path::{Path, PathBuf},
};

use annot_core::{
  annotation::{AnnotationKind, AnnotationType, Feature, Label, Prediction},
  stable::StableLabel,
  store::{AnnotationStore, StableLabelQuery},
};
use annot_store_sqlite::SqliteStore;
use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{StoreConfig, expand_tilde};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Annotation store maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "annot.toml")]
  config: PathBuf,

  /// SQLite file to open; overrides `store_path` from the config.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the schema if it does not exist.
  Init,
  /// Manage annotation keys.
  Keys {
    #[command(subcommand)]
    action: KeysCommand,
  },
  /// Print row counts per table.
  Stats {
    #[arg(long)]
    json: bool,
  },
  /// Print the labels, features or predictions of a candidate or a key.
  Show {
    /// `label`, `feature` or `prediction`.
    kind:      AnnotationType,
    #[arg(long, conflicts_with = "key")]
    candidate: Option<i64>,
    #[arg(long)]
    key:       Option<String>,
  },
  /// Export or import stable labels as JSON lines.
  Stable {
    #[command(subcommand)]
    action: StableCommand,
  },
}

#[derive(Subcommand)]
enum KeysCommand {
  List,
  Add { name: String },
  /// Remove a key together with every annotation it produced.
  Remove { name: String },
}

#[derive(Subcommand)]
enum StableCommand {
  Export {
    #[arg(long)]
    annotator: Option<String>,
    #[arg(long)]
    split:     Option<i64>,
  },
  /// Upsert labels from a JSON-lines file. Nothing is written unless every
  /// line parses.
  Import { file: PathBuf },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let store_path = match cli.store {
    Some(path) => path,
    None => StoreConfig::load(&cli.config)?.store_path,
  };
  let store_path = expand_tilde(&store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Init => {
      tracing::info!(path = ?store_path, "annotation store initialised");
    }
    Command::Keys { action } => keys(&store, action).await?,
    Command::Stats { json } => {
      let stats = store.stats().await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
      }
      println!("annotation_key {:>10}", stats.keys);
      println!("candidate      {:>10}", stats.candidates);
      println!("label          {:>10}", stats.labels);
      println!("feature        {:>10}", stats.features);
      println!("prediction     {:>10}", stats.predictions);
      println!("stable_label   {:>10}", stats.stable_labels);
    }
    Command::Show { kind, candidate, key } => {
      let target = match (candidate, key) {
        (Some(id), _) => Target::Candidate(id),
        (None, Some(name)) => Target::Key(name),
        (None, None) => bail!("either --candidate or --key is required"),
      };
      match kind {
        AnnotationType::Label => show::<Label>(&store, target).await?,
        AnnotationType::Feature => show::<Feature>(&store, target).await?,
        AnnotationType::Prediction => show::<Prediction>(&store, target).await?,
      }
    }
    Command::Stable { action } => stable(&store, action).await?,
  }

  Ok(())
}

// ─── Subcommands ──────────────────────────────────────────────────────────────

async fn keys(store: &SqliteStore, action: KeysCommand) -> anyhow::Result<()> {
  match action {
    KeysCommand::List => {
      for key in store.list_keys().await? {
        println!("{:>6}  {}", key.id, key.name);
      }
    }
    KeysCommand::Add { name } => {
      let key = store.create_key(&name).await?;
      println!("{}", key.id);
    }
    KeysCommand::Remove { name } => {
      if !store.delete_key(&name).await? {
        bail!("no annotation key named {name:?}");
      }
      tracing::info!(%name, "removed annotation key");
    }
  }
  Ok(())
}

enum Target {
  Candidate(i64),
  Key(String),
}

async fn show<K: AnnotationKind>(store: &SqliteStore, target: Target) -> anyhow::Result<()> {
  let annotations = match target {
    Target::Candidate(id) => store.annotations_for_candidate::<K>(id).await?,
    Target::Key(name) => {
      let Some(key) = store.get_key(&name).await? else {
        bail!("no annotation key named {name:?}");
      };
      store.annotations_for_key::<K>(key.id).await?
    }
  };

  for annotation in &annotations {
    println!("{:>8}  {annotation}", annotation.candidate_id);
  }
  Ok(())
}

async fn stable(store: &SqliteStore, action: StableCommand) -> anyhow::Result<()> {
  match action {
    StableCommand::Export { annotator, split } => {
      let query = StableLabelQuery { annotator_name: annotator, split };
      let labels = store.list_stable_labels(&query).await?;

      let mut out = io::stdout().lock();
      for label in &labels {
        serde_json::to_writer(&mut out, label)?;
        out.write_all(b"\n")?;
      }
      tracing::info!(count = labels.len(), "exported stable labels");
    }
    StableCommand::Import { file } => {
      let reader = BufReader::new(
        std::fs::File::open(&file).with_context(|| format!("failed to open {file:?}"))?,
      );
      let labels = parse_stable_labels(reader, &file)?;

      let count = labels.len();
      for label in labels {
        store.upsert_stable_label(label).await?;
      }
      tracing::info!(count, "imported stable labels");
    }
  }
  Ok(())
}

/// Parse every non-blank line as a [`StableLabel`]; errors name the line.
fn parse_stable_labels(reader: impl BufRead, source: &Path) -> anyhow::Result<Vec<StableLabel>> {
  let mut labels = Vec::new();
  for (n, line) in reader.lines().enumerate() {
    let line = line.with_context(|| format!("failed to read {}", source.display()))?;
    if line.trim().is_empty() {
      continue;
    }
    let label = serde_json::from_str(&line)
      .with_context(|| format!("{}:{}: invalid stable label", source.display(), n + 1))?;
    labels.push(label);
  }
  Ok(labels)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_skips_blank_lines() {
    let input = concat!(
      r#"{"context_stable_ids":"a::1","annotator_name":"bob","value":1}"#,
      "\n\n",
      r#"{"context_stable_ids":"a::2~~a::3","annotator_name":"bob","split":2,"value":-1}"#,
      "\n",
    );
    let labels = parse_stable_labels(input.as_bytes(), Path::new("bob.jsonl")).unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[1].split, 2);
  }

  #[test]
  fn malformed_line_fails_the_whole_file() {
    let input = concat!(
      r#"{"context_stable_ids":"a::1","annotator_name":"bob","value":1}"#,
      "\n",
      r#"{"context_stable_ids":"a~","annotator_name":"bob","value":1}"#,
      "\n",
    );
    let err = parse_stable_labels(input.as_bytes(), Path::new("bob.jsonl")).unwrap_err();
    assert!(err.to_string().starts_with("bob.jsonl:2:"), "{err}");
  }
}
