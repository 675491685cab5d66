use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use urbanzones::collect::earthengine::client::{DryRun, RestClient};
use urbanzones::commons::config::PipelineConfig;
use urbanzones::geometric::composite::ExportSubmitter;
use urbanzones::geometric::pipeline::LayerPipeline;

/// Build the seven thematic layers remotely and submit the composite export
#[derive(Parser, Debug)]
#[command(name = "build_layers", version, about)]
struct Args {
    /// JSON pipeline configuration; defaults reproduce the Nairobi study
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OAuth2 access token for the Earth Engine REST API
    #[arg(long, env = "EARTHENGINE_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Directory the export manifest is written to
    #[arg(long, default_value = ".")]
    manifest_dir: PathBuf,

    /// Print the export request body instead of contacting the service
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(token) = args.access_token {
        config.api.access_token = Some(token);
    }

    if args.dry_run {
        let (boundary, composite) = LayerPipeline::new(&DryRun, &config).composite()?;
        let request = ExportSubmitter::new(&DryRun, &config.export).request(&composite, &boundary);
        println!("{}", serde_json::to_string_pretty(&request.to_body())?);
        return Ok(());
    }

    let token = config.api.access_token.clone().unwrap_or_default();
    let client = RestClient::initialize(&config.api.base_url, &config.project, &token)?;

    let outcome = LayerPipeline::new(&client, &config).run(&args.manifest_dir)?;
    println!("Earth Engine task created: {}", outcome.task.name);
    if let Some(path) = outcome.manifest {
        println!("Manifest written to: {}", path.display());
    }
    Ok(())
}
