use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use urbanzones::commons::config::ZoningConfig;
use urbanzones::geometric::layers::LayerName;
use urbanzones::geometric::vectorize::Connectivity;
use urbanzones::geometric::zoning::ZoneClassifier;
use urbanzones::PipelineError;

/// Classify one band of the master raster into zones and write them as GeoJSON
#[derive(Parser, Debug)]
#[command(name = "classify_zones", version, about)]
struct Args {
    /// JSON zoning configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from the built-in preset of a layer (output name and class breaks)
    #[arg(long, value_parser = parse_layer)]
    preset: Option<LayerName>,

    /// Layer to zone, keeping the configured class breaks and output file;
    /// a layer other than the configured one also needs --output
    #[arg(long, value_parser = parse_layer)]
    layer: Option<LayerName>,

    /// Multi-band master raster
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output GeoJSON file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat the band's declared no-data value as class 0
    #[arg(long)]
    respect_nodata: bool,

    /// Do not check the band layout against the export manifest
    #[arg(long)]
    skip_manifest: bool,

    /// Group diagonal neighbours into the same zone
    #[arg(long)]
    eight_connected: bool,
}

fn parse_layer(s: &str) -> Result<LayerName, String> {
    s.parse()
}

fn zoning_config(args: &Args) -> Result<ZoningConfig> {
    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => ZoningConfig::load(path)?,
        (None, Some(layer)) => ZoningConfig::preset(layer),
        (None, None) => ZoningConfig::default(),
    };
    if let (Some(_), Some(layer)) = (&args.config, args.preset) {
        let preset = ZoningConfig::preset(layer);
        config.layer = preset.layer;
        config.output = preset.output;
        config.scheme = preset.scheme;
    }

    if let Some(layer) = args.layer {
        if layer != config.layer && args.output.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "--layer {} would overwrite {} (the {} output); pass --output or --preset {}",
                layer,
                config.output.display(),
                config.layer,
                layer
            ))
            .into());
        }
        config.layer = layer;
    }
    if let Some(input) = &args.input {
        config.raster_path = input.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if args.respect_nodata {
        config.respect_nodata = true;
    }
    if args.skip_manifest {
        config.verify_manifest = false;
    }
    if args.eight_connected {
        config.connectivity = Connectivity::Eight;
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let result = zoning_config(&args).and_then(|config| ZoneClassifier::new(&config).run());
    if let Err(e) = result {
        log::error!("{:#}", e);
        println!("An error occurred: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(argv: &[&str]) -> Result<ZoningConfig> {
        let argv = std::iter::once("classify_zones").chain(argv.iter().copied());
        let args = Args::try_parse_from(argv)?;
        zoning_config(&args)
    }

    #[test]
    fn test_layer_switch_needs_output() {
        let err = config_from(&["--layer", "heat"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));

        let config = config_from(&["--layer", "heat", "--output", "heat.geojson"]).unwrap();
        assert_eq!(config.layer, LayerName::Heat);
        assert_eq!(config.output, PathBuf::from("heat.geojson"));
        assert_eq!(config.scheme, ZoningConfig::default().scheme);
    }

    #[test]
    fn test_layer_matching_config_keeps_output() {
        let config = config_from(&["--layer", "flood_risk"]).unwrap();
        assert_eq!(config.output, ZoningConfig::default().output);

        let config = config_from(&["--preset", "heat", "--layer", "heat"]).unwrap();
        assert_eq!(config, ZoningConfig::preset(LayerName::Heat));
    }
}
