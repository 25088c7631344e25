use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use corebox_core::export::{export_listing, export_rows, process_images};
use corebox_core::manifest::Manifest;
use corebox_core::report::{write_failed_manifest, RunLog, RunPaths};
use corebox_core::synchronise::synchronise;

use crate::client::PortalClient;
use crate::load_config::load_config;

/// CLI for corebox: batch operations against the drill-core image portal.
#[derive(Parser)]
#[clap(
    name = "corebox",
    version,
    about = "Upload, list, export and process drill-core images on the image portal"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the images in a manifest, skipping ones the portal already holds
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// CSV manifest of staged images
        #[clap(long)]
        manifest: PathBuf,
    },
    /// Export the portal's images, duplicate images and drill holes as CSV
    List {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Export row-level OCR and core outline data
    ExportRows {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Submit every image of the project/prospect to a processing workflow
    Process {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Overrides `workflow_id` from the config file
        #[clap(long)]
        workflow_id: Option<i64>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload { config, manifest } => {
            let config = load_config(config)?;
            let manifest = Manifest::from_path(&manifest)
                .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
            let paths = RunPaths::create(&config.output_dir, "upload_image")
                .context("Failed to create run directories")?;
            let mut log = RunLog::create(paths.log_file("upload_log", "txt"))
                .context("Failed to create run log")?;

            let client = PortalClient::connect(&config)
                .await
                .context("Authentication failed")?;
            println!("Upload starting ({} manifest rows)...", manifest.len());
            let report = synchronise(&config, &client, &manifest, &mut log).await?;

            let failed = report.failed_rows();
            if !failed.is_empty() {
                let fail_csv = paths.fail_file("file_summary_fail", "csv");
                write_failed_manifest(&fail_csv, &manifest, &failed)?;
                println!("Failed rows written to {}", fail_csv.display());
            }
            let s = report.summary;
            println!(
                "Upload complete. Total: {}, uploaded: {}, skipped (duplicates): {}, failed: {}",
                s.total, s.uploaded, s.skipped, s.failed
            );
            if let Some(path) = log.path() {
                println!("Run log: {}", path.display());
            }
        }
        Commands::List { config } => {
            let config = load_config(config)?;
            let paths = RunPaths::create(&config.output_dir, "get_upload_list")
                .context("Failed to create run directories")?;
            let client = PortalClient::connect(&config)
                .await
                .context("Authentication failed")?;
            let report = export_listing(&config, &client, &paths).await?;
            println!(
                "Listed {} images ({} redundant duplicates) and {} drill holes.",
                report.images, report.duplicate_ids, report.drill_holes
            );
            println!("  {}", report.images_csv.display());
            println!("  {}", report.duplicates_csv.display());
            println!("  {}", report.drill_holes_csv.display());
        }
        Commands::ExportRows { config } => {
            let config = load_config(config)?;
            let paths = RunPaths::create(&config.output_dir, "get_image_row")
                .context("Failed to create run directories")?;
            let client = PortalClient::connect(&config)
                .await
                .context("Authentication failed")?;
            let report = export_rows(&config, &client, &paths).await?;
            println!(
                "Exported {} row items ({} OCR blocks, {} core outlines).",
                report.items, report.ocr_rows, report.outline_rows
            );
            println!("  {}", report.raw_json.display());
            println!("  {}", report.summary_csv.display());
            println!("  {}", report.detailed_csv.display());
        }
        Commands::Process {
            config,
            workflow_id,
        } => {
            let config = load_config(config)?;
            let workflow_id = workflow_id
                .or(config.workflow_id)
                .context("No workflow id: pass --workflow-id or set workflow_id in the config")?;
            let paths = RunPaths::create(&config.output_dir, "execute_batch")
                .context("Failed to create run directories")?;
            let mut log = RunLog::create(paths.log_file("batch_processing_log", "txt"))
                .context("Failed to create run log")?;
            let client = PortalClient::connect(&config)
                .await
                .context("Authentication failed")?;
            let report = process_images(&config, &client, workflow_id, &paths, &mut log).await?;
            println!(
                "Processing complete. Total: {}, processed: {}, failed: {}",
                report.total, report.succeeded, report.failed
            );
            if let Some(path) = &report.failed_csv {
                println!("Some images failed to process. See {}", path.display());
            }
        }
    }

    Ok(())
}
