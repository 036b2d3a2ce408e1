use anyhow::Result;
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use folio_core::{DocumentId, ExtractionRequest, RecognitionProfile};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod reporter;

use config::Config;

/// Extract text from invoice scans with OCR.
#[derive(Parser, Debug)]
#[command(name = "folio", version, about)]
struct Cli {
    /// TOML config file (default: <config dir>/folio.toml).
    #[arg(long, global = true, env = "FOLIO_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log more (-v debug, -vv everything).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run OCR on one document or on every document still missing text.
    Extract(ExtractArgs),
    /// Show backlog counts and recent failures.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["document", "all"])))]
struct ExtractArgs {
    /// Document to extract.
    #[arg(long, value_name = "UUID")]
    document: Option<DocumentId>,

    /// Every document with a file attached and no text yet.
    #[arg(long)]
    all: bool,

    /// Extract again even if text is already stored.
    #[arg(long)]
    force: bool,

    /// Tesseract languages, e.g. `eng` or `eng+spa`.
    #[arg(long, value_name = "PROFILE")]
    lang: Option<RecognitionProfile>,
}

impl ExtractArgs {
    fn into_request(self, default_profile: &RecognitionProfile) -> ExtractionRequest {
        let request = match self.document {
            Some(id) => ExtractionRequest::one(id),
            None => ExtractionRequest::all(),
        };
        request
            .forced(self.force)
            .with_profile(self.lang.unwrap_or_else(|| default_profile.clone()))
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "folio=info",
        1 => "folio=debug",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract(args) => {
            let request = args.into_request(&config.ocr.default_profile);
            commands::extract(&config, request).await
        }
        Commands::Status { json } => commands::status(&config, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use folio_core::Selection;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("folio").chain(args.iter().copied()))
    }

    fn extract_args(args: &[&str]) -> ExtractArgs {
        match parse(args).unwrap().command {
            Commands::Extract(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extract_needs_exactly_one_target() {
        assert!(parse(&["extract"]).is_err());
        assert!(parse(&["extract", "--all", "--document", &DocumentId::new().to_string()]).is_err());
        assert!(parse(&["extract", "--document", "not-a-uuid"]).is_err());
        assert!(parse(&["extract", "--all", "--lang", "eng+"]).is_err());
    }

    #[test]
    fn single_document_request() {
        let id = DocumentId::new();
        let default = RecognitionProfile::default();
        let request = extract_args(&["extract", "--document", &id.to_string(), "--force"])
            .into_request(&default);

        assert_eq!(request.selection, Selection::One(id));
        assert!(request.force);
        assert_eq!(request.profile, default);
    }

    #[test]
    fn batch_request_with_language_override() {
        let default = RecognitionProfile::default();
        let request = extract_args(&["extract", "--all", "--lang", "eng+spa"]).into_request(&default);

        assert_eq!(request.selection, Selection::All);
        assert!(!request.force);
        assert_eq!(request.profile.to_string(), "eng+spa");
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["status", "--json", "-vv", "--config", "/etc/folio.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/folio.toml")));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }
}
