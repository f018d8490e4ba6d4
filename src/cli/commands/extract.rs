//! Page extraction command.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use formscrape::config::Config;
use formscrape::{
    ExtractEvent, FormExtractor, FormRecord, ImageFileLoader, PageLoader, RegionCatalog,
    RunOptions,
};

use super::OutputFormat;

/// Extract every template field from each image and print the records.
pub async fn cmd_extract(
    config: &Config,
    images: &[PathBuf],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let catalog = Arc::new(config.load_catalog()?);
    let extractor = config.build_extractor()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut mismatched = 0;
    for path in images {
        let record = extract_page(config, &extractor, &catalog, path, cancel.clone()).await?;

        if record.is_template_mismatch() {
            mismatched += 1;
            eprintln!(
                "{} no field of template {} fits {}",
                style("!").yellow(),
                catalog.name(),
                path.display()
            );
        }

        print_record(path, &record, format, images.len() > 1)?;

        if cancel.load(Ordering::Relaxed) {
            eprintln!("{} cancelled", style("!").yellow());
            break;
        }
    }

    if mismatched > 0 && mismatched == images.len() {
        anyhow::bail!(
            "template {} does not match any of the pages",
            catalog.name()
        );
    }
    Ok(())
}

async fn extract_page(
    config: &Config,
    extractor: &FormExtractor,
    catalog: &Arc<RegionCatalog>,
    path: &Path,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<FormRecord> {
    let loader_path = path.to_path_buf();
    let page = tokio::task::spawn_blocking(move || ImageFileLoader.load(&loader_path)).await??;

    let pb = ProgressBar::new(catalog.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_message(
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<ExtractEvent>(64);
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    ExtractEvent::FieldCompleted { .. } => pb.inc(1),
                    ExtractEvent::FieldFailed { field, error } => {
                        pb.inc(1);
                        pb.println(format!("  {} {}: {}", style("✗").red(), field, error));
                    }
                    ExtractEvent::FieldStarted { .. } | ExtractEvent::RunComplete { .. } => {}
                }
            }
        })
    };

    let mut options = RunOptions::from_config(&config.extraction);
    options.cancel = Some(cancel);
    options.events = Some(event_tx);

    let result = extractor
        .extract_parallel(Arc::new(page), catalog.clone(), &options)
        .await;

    drop(options);
    let _ = progress.await;
    pb.finish_and_clear();

    Ok(result?)
}

fn print_record(
    path: &Path,
    record: &FormRecord,
    format: OutputFormat,
    with_header: bool,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            if with_header {
                println!("{}", style(path.display()).bold());
            }
            print!("{}", record.to_text());
            if with_header {
                println!();
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Yaml => print!("---\n{}", serde_yaml::to_string(record)?),
    }
    Ok(())
}
