//! `ls-export run`: serve images, make sure Label Studio is up, publish, wait.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Local;
use ls_export::{image_urls, publish, read_document, ConvertOptions};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::label_studio::LabelStudio;
use crate::server;

const READY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_LS_PORT: u16 = 8081;

pub struct RunArgs {
    pub name: String,
    pub coco: PathBuf,
    pub images: PathBuf,
    pub port: u16,
    pub ls_base: String,
    pub token: String,
    pub include_boxes: bool,
    pub launch: bool,
}

/// `"{name} 2026-Oct-19_03-45PM"`
pub fn project_title(name: &str) -> String {
    format!("{name} {}", Local::now().format("%Y-%b-%d_%I-%M%p"))
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    if !args.images.is_dir() {
        bail!("image directory {} does not exist", args.images.display());
    }
    if server::port_in_use(args.port).await {
        info!(port = args.port, "port already open, reusing the running image server");
    } else {
        let (dir, port) = (args.images.clone(), args.port);
        tokio::spawn(async move {
            if let Err(e) = server::serve(dir, port).await {
                warn!(error = %e, "image server stopped");
            }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let ls_port = reqwest::Url::parse(&args.ls_base)
        .with_context(|| format!("invalid Label Studio URL {}", args.ls_base))?
        .port()
        .unwrap_or(DEFAULT_LS_PORT);
    let label_studio = LabelStudio::new(&args.ls_base, args.token.clone());

    let mut child = None;
    if server::port_in_use(ls_port).await {
        info!(port = ls_port, "Label Studio already running");
    } else if args.launch {
        info!(port = ls_port, "starting Label Studio");
        child = Some(launch_label_studio(ls_port, &args.token)?);
        label_studio.wait_until_ready(READY_TIMEOUT).await?;
    } else {
        bail!(
            "nothing is listening on {}; start Label Studio or pass --launch",
            args.ls_base
        );
    }

    let dataset = read_document(&args.coco)?;
    let urls = image_urls(&dataset, &server::base_url(args.port));
    let options = ConvertOptions {
        include_boxes: args.include_boxes,
        ..Default::default()
    };
    let published = publish(
        &label_studio,
        &project_title(&args.name),
        &dataset,
        &urls,
        &options,
    )
    .await?;

    let url = published.project.url.unwrap_or_default();
    println!("Created project '{}' (ID {})", published.project.title, published.project.id);
    println!("Uploaded {} tasks", published.receipt.task_count);
    println!("View annotations here: {url}");
    println!("Press Ctrl+C to stop the servers.");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    if let Some(mut child) = child {
        info!("stopping Label Studio");
        child.kill().await?;
    }
    Ok(())
}

fn launch_label_studio(port: u16, token: &str) -> anyhow::Result<Child> {
    Command::new("label-studio")
        .args(["start", "--port", &port.to_string()])
        .env("LABEL_STUDIO_USER_TOKEN", token)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to start label-studio; is it installed and on PATH?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_title_format() {
        let title = project_title("yolo run");
        let stamp = title.strip_prefix("yolo run ").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%b-%d_%I-%M%p").is_ok());
    }
}
