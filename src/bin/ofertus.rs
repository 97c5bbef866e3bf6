//! CLI binary for ofertus.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `render` and `preview` do the same work offline on local files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ofertus::pipeline::input::parse_payload;
use ofertus::storage::{write_atomic, OutputKind};
use ofertus::{
    preview_context, render_offer, serve, AliasPolicy, ContextLayout, GeneratorConfig,
    ImageSizing, ServerConfig, DEFAULT_TEMPLATE_NAME,
};
use std::io::{self, Read};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}

fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on port 8000 with templates/oferta_template.docx as the default
  ofertus serve

  # Render one offer offline
  ofertus render --payload offer.json --template my_template.docx -o offer.docx

  # See what a template would receive
  ofertus preview --payload offer.json --layout list

TEMPLATES:
  Word templates use {{ NAME }} placeholders, e.g. {{ NUMER_OFERTY }}, and
  loops such as {%tr for item in items %} ... {%tr endfor %} with
  {{ item.lp }}, {{ item.OPIS }} and {{ item.IMAGE }} inside.
"#;

/// Render commercial offers (JSON) into Word documents.
#[derive(Parser, Debug)]
#[command(
    name = "ofertus",
    version,
    about = "Render commercial offers (JSON) into Word documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OFERTUS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OFERTUS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Render one offer to a .docx file.
    Render(RenderArgs),
    /// Print the template context for an offer as JSON.
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Interface to listen on.
    #[arg(long, env = "OFERTUS_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "OFERTUS_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory holding the default template and uploaded ones.
    #[arg(long, env = "OFERTUS_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,

    /// Directory for generated documents and persisted images.
    #[arg(long, env = "OFERTUS_OUTPUT_DIR", default_value = "generated")]
    output_dir: PathBuf,

    /// File name of the default template inside the templates directory.
    #[arg(long, env = "OFERTUS_DEFAULT_TEMPLATE", default_value = DEFAULT_TEMPLATE_NAME)]
    default_template: String,

    /// Largest accepted request body, in MiB.
    #[arg(long, env = "OFERTUS_MAX_BODY_MB", default_value_t = 25,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_body_mb: u64,

    #[command(flatten)]
    generator: GeneratorArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Offer JSON file, or `-` for stdin.
    #[arg(long)]
    payload: PathBuf,

    /// Word template to fill.
    #[arg(long, env = "OFERTUS_TEMPLATE", default_value = "templates/oferta_template.docx")]
    template: PathBuf,

    /// Output file. Default: oferta_<random>.docx in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    generator: GeneratorArgs,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Offer JSON file, or `-` for stdin.
    #[arg(long)]
    payload: PathBuf,

    #[command(flatten)]
    generator: GeneratorArgs,
}

#[derive(Args, Debug)]
struct GeneratorArgs {
    /// Context shape: positional (SYSTEM1..5) or list (SYSTEMY).
    #[arg(long, env = "OFERTUS_LAYOUT", value_enum, default_value = "positional")]
    layout: LayoutArg,

    /// Which values a line-item alias may hold and still win.
    #[arg(long, env = "OFERTUS_ALIAS_POLICY", value_enum, default_value = "truthy")]
    alias_policy: AliasPolicyArg,

    /// Image width in millimetres; height follows the aspect ratio.
    #[arg(long, env = "OFERTUS_IMAGE_WIDTH_MM", default_value_t = 70.0)]
    image_width_mm: f64,

    /// Fit every image into a square box of this side (cm) instead.
    #[arg(long, env = "OFERTUS_IMAGE_BOX_CM")]
    image_box_cm: Option<f64>,

    /// Also write decoded line-item images to the output directory (serve only).
    #[arg(long, env = "OFERTUS_PERSIST_IMAGES")]
    persist_images: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Positional,
    List,
}

impl From<LayoutArg> for ContextLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Positional => ContextLayout::Positional,
            LayoutArg::List => ContextLayout::List,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AliasPolicyArg {
    Truthy,
    Present,
}

impl From<AliasPolicyArg> for AliasPolicy {
    fn from(v: AliasPolicyArg) -> Self {
        match v {
            AliasPolicyArg::Truthy => AliasPolicy::Truthy,
            AliasPolicyArg::Present => AliasPolicy::Present,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => {
            let generator = build_config(&args.generator)?;
            let server = ServerConfig {
                bind: (args.host, args.port).into(),
                templates_dir: args.templates_dir,
                output_dir: args.output_dir,
                default_template: args.default_template,
                max_body_bytes: (args.max_body_mb * 1024 * 1024) as usize,
            };
            serve(server, generator).await.context("Server failed")?;
        }
        Command::Render(args) => {
            let config = build_config(&args.generator)?;
            let payload = parse_payload(&read_payload(&args.payload)?)
                .context("Failed to parse offer payload")?;
            let template = std::fs::read(&args.template)
                .with_context(|| format!("Failed to read template {:?}", args.template))?;

            let rendered =
                render_offer(&payload, &template, &config).context("Rendering failed")?;

            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(OutputKind::Document.file_name()));
            write_atomic(&output, &rendered.bytes)
                .with_context(|| format!("Failed to write {:?}", output))?;

            if !cli.quiet {
                eprintln!(
                    "{} {}  {}",
                    green("✓"),
                    output.display(),
                    dim(&format!(
                        "{} bytes, {} images",
                        rendered.bytes.len(),
                        rendered.images_embedded
                    ))
                );
            }
        }
        Command::Preview(args) => {
            let config = build_config(&args.generator)?;
            let payload = parse_payload(&read_payload(&args.payload)?)
                .context("Failed to parse offer payload")?;
            let context = preview_context(&payload, &config);
            let json =
                serde_json::to_string_pretty(&context).context("Failed to serialise context")?;
            println!("{json}");
        }
    }

    Ok(())
}

/// Map CLI args to `GeneratorConfig`.
fn build_config(args: &GeneratorArgs) -> Result<GeneratorConfig> {
    let sizing = match args.image_box_cm {
        Some(side) => ImageSizing::square_cm(side),
        None => ImageSizing::FixedWidth {
            width_mm: args.image_width_mm,
        },
    };
    GeneratorConfig::builder()
        .layout(args.layout.into())
        .alias_policy(args.alias_policy.into())
        .image_sizing(sizing)
        .persist_images(args.persist_images)
        .build()
        .context("Invalid configuration")
}

fn read_payload(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read payload from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read payload {:?}", path))
    }
}
