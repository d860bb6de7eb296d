//! QR Hand-off CLI
//!
//! Receiving-side tooling: print or render the session link, watch the fetch
//! endpoint, or push image files through the upload flow.

use clap::{Parser, Subcommand};
use qr_handoff::{
    config::PollingCallbacks,
    image_queue::ImagePayload,
    qr_link::QrRenderOptions,
    CaptureSession, ConfigOverrides,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "qr-handoff", version, about = "QR session hand-off tooling")]
struct Cli {
    /// JSON overrides, applied on top of environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the capture link for a fresh session
    Link {
        /// Extra query parameter (k=v), repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Render the capture link as a QR PNG
    Qr {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 300)]
        size: u32,
        /// Logo image drawn at the centre
        #[arg(long)]
        logo: Option<PathBuf>,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Poll the fetch endpoint and log new items until Ctrl-C
    Watch,
    /// Upload image files as one batch
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn load_overrides(path: Option<&Path>) -> anyhow::Result<ConfigOverrides> {
    let env = ConfigOverrides::from_env();
    match path {
        Some(path) => {
            let file = ConfigOverrides::from_json_file(path)?;
            tracing::info!(path = %path.display(), "Config file loaded");
            Ok(file.or(env))
        }
        None => Ok(env),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qr_handoff=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut overrides = load_overrides(cli.config.as_deref())?;

    let session = CaptureSession::new();

    match cli.command {
        Command::Link { params } => {
            session.init(overrides);
            println!("{}", session.link_url(&params)?);
        }

        Command::Qr {
            out,
            size,
            logo,
            params,
        } => {
            session.init(overrides);
            let logo = match logo {
                Some(path) => Some(tokio::fs::read(&path).await?),
                None => None,
            };
            let options = QrRenderOptions {
                size,
                logo,
                params,
                ..Default::default()
            };
            let image = session.generate_qr_code(&options).await?;
            tokio::fs::write(&out, &image.png).await?;
            tracing::info!(
                out = %out.display(),
                width = image.width,
                height = image.height,
                session_id = %session.session_id(),
                "QR code written"
            );
        }

        Command::Watch => {
            overrides.polling = Some(PollingCallbacks {
                on_polling_start: Some(Arc::new(|| tracing::info!("Watching for new items"))),
                on_polling_stop: Some(Arc::new(|| tracing::info!("Stopped watching"))),
                on_polling_error: None,
                on_new_items: Some(Arc::new(|items: Vec<serde_json::Value>| {
                    for item in items {
                        println!("{}", item);
                    }
                })),
            });
            session.init(overrides);
            if session.config().fetch.is_none() {
                anyhow::bail!("Fetch API not configured (set FETCH_URL or fetchApi.url)");
            }

            session.start_polling()?;
            tokio::signal::ctrl_c().await?;
            session.unmount().await;
        }

        Command::Upload { files } => {
            let image_config = overrides.image_config.get_or_insert_with(Default::default);
            image_config.multi_photo = Some(true);
            image_config.max_images = Some(files.len());
            session.init(overrides);

            for path in &files {
                let bytes = tokio::fs::read(path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let id = session.enqueue(ImagePayload::new(bytes, content_type_for(path), file_name))?;
                tracing::debug!(capture_id = %id, path = %path.display(), "File queued");
            }

            let report = session.submit().await?;
            for uploaded in &report.uploaded {
                println!("uploaded {} {}", uploaded.file_name, uploaded.response);
            }
            for failed in &report.failed {
                println!("failed   {} {}", failed.capture_id, failed.error);
            }

            if !report.all_succeeded() {
                anyhow::bail!("{} of {} uploads failed", report.failed.len(), report.attempted());
            }
        }
    }

    Ok(())
}
