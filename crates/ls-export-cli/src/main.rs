use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ls_export::document::write_atomic;
use ls_export::{
    convert, image_urls, read_document, ConvertOptions, Error, ExportOptions, Exporter,
    ImageDetections,
};
use tracing_subscriber::EnvFilter;

mod label_studio;
mod run;
mod server;

#[derive(Parser)]
#[command(name = "ls-export")]
#[command(about = "Export detector output as COCO and review it in Label Studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a COCO document from a JSON list of per-image detections
    Export(ExportArgs),
    /// Convert a COCO document into Label Studio tasks
    Convert(ConvertArgs),
    /// Serve an image directory with permissive CORS
    Serve {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = 8888)]
        port: u16,
    },
    /// Serve images, create a Label Studio project and upload a COCO document into it
    Run(RunArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Detections JSON: `[{path, width, height, detections: [{label, score, box, mask?}]}]`
    #[arg(long)]
    detections: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Only encode boxes; masks are ignored
    #[arg(long)]
    no_masks: bool,
    /// Check the document against the COCO layout before writing it
    #[arg(long)]
    validate: bool,
    /// Write box/polygon overlays next to the output
    #[arg(long)]
    debug: bool,
    #[arg(long, default_value_t = 4, conflicts_with = "compact")]
    indent: usize,
    /// Write compact JSON
    #[arg(long)]
    compact: bool,
    /// Skip detections with zero area
    #[arg(long)]
    drop_empty: bool,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(long)]
    coco: PathBuf,
    /// Base URL the images are served from, e.g. http://localhost:8888
    #[arg(long)]
    image_url: String,
    #[arg(long)]
    output: PathBuf,
    /// Emit a rectangle for every annotation, not only those without polygons
    #[arg(long)]
    include_boxes: bool,
    #[arg(long)]
    no_polygons: bool,
    #[arg(long, default_value = "ls-export")]
    model_version: String,
}

#[derive(Args)]
struct RunArgs {
    /// Project name; a timestamp is appended
    #[arg(long)]
    name: String,
    #[arg(long)]
    coco: PathBuf,
    /// Directory holding the images named in the document
    #[arg(long)]
    images: PathBuf,
    /// Image server port
    #[arg(long, default_value_t = 8888)]
    port: u16,
    #[arg(long, default_value = "http://localhost:8081")]
    ls_base: String,
    #[arg(long, env = "LABELSTUDIO_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long)]
    include_boxes: bool,
    /// Start `label-studio` if nothing is listening on the --ls-base port
    #[arg(long)]
    launch: bool,
}

fn check_port(port: u16) -> Result<u16, Error> {
    if port == 0 {
        return Err(Error::Config("port must be between 1 and 65535".into()));
    }
    Ok(port)
}

fn export(args: ExportArgs) -> anyhow::Result<()> {
    let file = std::fs::File::open(&args.detections)
        .with_context(|| format!("failed to open {}", args.detections.display()))?;
    let results: Vec<ImageDetections> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", args.detections.display()))?;

    let options = ExportOptions {
        include_masks: !args.no_masks,
        validate: args.validate,
        debug: args.debug,
        indent: (!args.compact).then_some(args.indent),
        drop_empty: args.drop_empty,
        ..Default::default()
    };
    if let Some(summary) = Exporter::new(options).export(&results, &args.output)? {
        println!(
            "Wrote {} ({} images, {} categories, {} annotations)",
            summary.path.display(),
            summary.images,
            summary.categories,
            summary.annotations
        );
    }
    Ok(())
}

fn convert_tasks(args: ConvertArgs) -> anyhow::Result<()> {
    let dataset = read_document(&args.coco)?;
    let options = ConvertOptions {
        include_boxes: args.include_boxes,
        include_polygons: !args.no_polygons,
        model_version: args.model_version,
    };
    let tasks = convert(&dataset, &image_urls(&dataset, &args.image_url), &options)?;
    let bytes = serde_json::to_vec_pretty(&tasks)?;
    write_atomic(&args.output, &bytes)?;
    println!("Wrote {} tasks to {}", tasks.len(), args.output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Export(args) => export(args),
        Command::Convert(args) => convert_tasks(args),
        Command::Serve { dir, port } => {
            server::serve(dir, check_port(port)?).await?;
            Ok(())
        }
        Command::Run(args) => {
            let token = args
                .token
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| {
                    Error::Config(
                        "a Label Studio token is required (--token or LABELSTUDIO_TOKEN)".into(),
                    )
                })?;
            run::run(run::RunArgs {
                name: args.name,
                coco: args.coco,
                images: args.images,
                port: check_port(args.port)?,
                ls_base: args.ls_base,
                token,
                include_boxes: args.include_boxes,
                launch: args.launch,
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_port_zero_is_config_error() {
        assert!(matches!(check_port(0), Err(Error::Config(_))));
        assert_eq!(check_port(8888).unwrap(), 8888);
    }

    #[test]
    fn test_export_then_convert_files() {
        let dir = tempfile::tempdir().unwrap();
        let detections = dir.path().join("detections.json");
        std::fs::write(
            &detections,
            r#"[{"path": "/imgs/a.jpg", "width": 4, "height": 2, "detections": [
                {"label": "cat", "score": 0.75, "box": {"x1": 0, "y1": 0, "x2": 2, "y2": 2},
                 "mask": {"width": 4, "height": 2, "data": [1, 1, 0, 0, 1, 1, 0, 0]}}
            ]}]"#,
        )
        .unwrap();
        let coco = dir.path().join("coco.json");
        export(ExportArgs {
            detections,
            output: coco.clone(),
            no_masks: false,
            validate: true,
            debug: false,
            indent: 2,
            compact: false,
            drop_empty: false,
        })
        .unwrap();

        let tasks_path = dir.path().join("tasks.json");
        convert_tasks(ConvertArgs {
            coco,
            image_url: "http://localhost:8888".into(),
            output: tasks_path.clone(),
            include_boxes: false,
            no_polygons: false,
            model_version: "test".into(),
        })
        .unwrap();

        let tasks: serde_json::Value =
            serde_json::from_slice(&std::fs::read(tasks_path).unwrap()).unwrap();
        assert_eq!(tasks[0]["data"]["image"], "http://localhost:8888/a.jpg");
        assert_eq!(tasks[0]["predictions"][0]["model_version"], "test");
        assert_eq!(tasks[0]["predictions"][0]["score"], 0.75);
    }
}
