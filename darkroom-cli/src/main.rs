use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use std::path::{Path, PathBuf};

use darkroom::transport;
use darkroom::{ColorPreset, Editor, EditorConfig, ImageFormat};

#[derive(Parser)]
#[command(name = "darkroom-cli")]
#[command(about = "Apply filters to photos and classify them", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ~/.config/darkroom/config.json)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t, global = true)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, default_value_t, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a chain of transforms and write the result
    Apply {
        /// Input image (PNG or JPEG)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file; the extension picks the format
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Transform as `name` or `name:p1,p2,...`, applied in order
        #[arg(short, long = "transform", value_name = "TRANSFORM", required = true)]
        transforms: Vec<String>,

        /// JPEG/WebP quality (0-100)
        #[arg(long, value_name = "QUALITY", default_value_t = 90)]
        quality: u8,
    },
    /// Classify an image with a model blob
    Classify {
        /// Input image (PNG or JPEG)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Model file
        #[arg(short, long, value_name = "FILE")]
        model: PathBuf,

        /// Label list, one per line (overrides labels in the model)
        #[arg(short, long, value_name = "FILE")]
        labels: Option<PathBuf>,
    },
    /// List color presets
    Presets,
    /// Update and save the editor config
    Config {
        /// Default cutoff for `threshold`
        #[arg(long, value_name = "LUMA")]
        threshold_cutoff: Option<u8>,

        /// Luma above which `threshold-colorize` turns white
        #[arg(long, value_name = "LUMA")]
        colorize_midpoint: Option<u8>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(args.verbose, args.quiet);

    let config = match (&args.command, args.config.as_deref()) {
        // `config` may create the file it was pointed at
        (Command::Config { .. }, Some(path)) if !path.exists() => EditorConfig::default(),
        (_, path) => load_config(path)?,
    };

    match args.command {
        Command::Apply {
            input,
            output,
            transforms,
            quality,
        } => apply(config, &input, &output, &transforms, quality),
        Command::Classify {
            input,
            model,
            labels,
        } => classify(config, &input, &model, labels.as_deref()),
        Command::Config {
            threshold_cutoff,
            colorize_midpoint,
        } => save_config(
            config,
            args.config.as_deref(),
            threshold_cutoff,
            colorize_midpoint,
        ),
        Command::Presets => {
            for preset in ColorPreset::iter() {
                let bias = preset.bias();
                println!("{:<12} {:>4} {:>4} {:>4}", preset.name(), bias.r, bias.g, bias.b);
            }
            Ok(())
        }
    }
}

fn apply(
    mut config: EditorConfig,
    input: &Path,
    output: &Path,
    transforms: &[String],
    quality: u8,
) -> Result<()> {
    if quality > 100 {
        anyhow::bail!("Quality must be between 0 and 100");
    }

    let ext = output
        .extension()
        .and_then(|s| s.to_str())
        .context("Output file needs an extension (png, jpg or webp)")?;
    config.output_format = ImageFormat::from_extension(ext, quality)
        .with_context(|| format!("Unsupported output extension: {ext}"))?;

    let editor = Editor::new(config);
    let upload = editor.upload_image(&read_as_data_url(input)?)?;
    log::info!("Loaded `{}`", input.display());

    let mut shown = upload.image;
    for spec in transforms {
        let (name, params) = parse_transform(spec)?;
        shown = editor
            .apply(upload.id, name, &params)
            .with_context(|| format!("Failed to apply `{spec}`"))?;
        log::info!("Applied {name}");
    }

    let payload = transport::decode_payload(&shown)?;
    std::fs::write(output, payload.bytes).context("Failed to write output file")?;
    log::info!("Done: {}", output.display());

    Ok(())
}

fn classify(config: EditorConfig, input: &Path, model: &Path, labels: Option<&Path>) -> Result<()> {
    let editor = Editor::new(config);
    let id = editor.upload_image(&read_as_data_url(input)?)?.id;

    let labels = labels.map(read_as_data_url).transpose()?;
    let model = editor
        .load_model(&read_as_data_url(model)?, labels.as_deref())
        .context("Failed to load model")?;

    if model.labels().is_some() {
        let (result, label) = editor.classify_labeled(id, &model)?;
        println!("{label} (class {}, {:.1}%)", result.class_index, result.confidence * 100.0);
    } else {
        let result = editor.classify(id, &model)?;
        println!("class {} ({:.1}%)", result.class_index, result.confidence * 100.0);
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::load_from(path)
            .with_context(|| format!("Failed to read config `{}`", path.display())),
        None => Ok(EditorConfig::load().unwrap_or_default()),
    }
}

fn save_config(
    mut config: EditorConfig,
    path: Option<&Path>,
    threshold_cutoff: Option<u8>,
    colorize_midpoint: Option<u8>,
) -> Result<()> {
    if let Some(cutoff) = threshold_cutoff {
        config.threshold_cutoff = cutoff;
    }
    if let Some(midpoint) = colorize_midpoint {
        config.colorize_midpoint = midpoint;
    }

    let saved = match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    };
    saved.context("Failed to save config")?;

    log::info!(
        "Saved config: threshold cutoff {}, colorize midpoint {}",
        config.threshold_cutoff,
        config.colorize_midpoint
    );
    Ok(())
}

fn read_as_data_url(path: &Path) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read `{}`", path.display()))?;

    let mime = match path.extension().and_then(|s| s.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    };
    Ok(transport::to_data_url(mime, &bytes))
}

/// Split `colorize:0,40,110` into a name and its integer parameters.
fn parse_transform(spec: &str) -> Result<(&str, Vec<i32>)> {
    let (name, params) = spec.split_once(':').unwrap_or((spec, ""));
    let params = params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<i32>()
                .with_context(|| format!("Invalid parameter `{p}` in `{spec}`"))
        })
        .collect::<Result<_>>()?;
    Ok((name.trim(), params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_arguments() {
        assert_eq!(parse_transform("sharpen").unwrap(), ("sharpen", vec![]));
        assert_eq!(
            parse_transform("colorize:0, 40,110").unwrap(),
            ("colorize", vec![0, 40, 110])
        );
        assert_eq!(
            parse_transform("convolve:0,-1,0,-1,5,-1,0,-1,0,1,0").unwrap().1.len(),
            11
        );
        assert!(parse_transform("threshold:high").is_err());
    }

    #[test]
    fn cli_parses_transform_chain() {
        let args = Args::try_parse_from([
            "darkroom-cli",
            "apply",
            "in.png",
            "-o",
            "out.jpg",
            "-t",
            "grayscale",
            "-t",
            "threshold:100",
        ])
        .unwrap();
        match args.command {
            Command::Apply { transforms, .. } => assert_eq!(transforms, ["grayscale", "threshold:100"]),
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn config_subcommand_writes_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("darkroom").join("config.json");

        let args = Args::try_parse_from([
            "darkroom-cli",
            "config",
            "--threshold-cutoff",
            "90",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Config {
            threshold_cutoff,
            colorize_midpoint,
        } = args.command
        else {
            panic!("expected config");
        };
        assert_eq!(threshold_cutoff, Some(90));
        assert_eq!(colorize_midpoint, None);

        save_config(EditorConfig::default(), Some(&path), threshold_cutoff, colorize_midpoint).unwrap();
        let saved = EditorConfig::load_from(&path).unwrap();
        assert_eq!(saved.threshold_cutoff, 90);
        assert_eq!(saved.colorize_midpoint, EditorConfig::default().colorize_midpoint);

        save_config(saved, Some(&path), None, Some(200)).unwrap();
        let saved = EditorConfig::load_from(&path).unwrap();
        assert_eq!((saved.threshold_cutoff, saved.colorize_midpoint), (90, 200));

        assert!(Args::try_parse_from(["darkroom-cli", "config", "--threshold-cutoff", "300"]).is_err());
    }
}
