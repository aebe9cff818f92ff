use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use guardrail::config::{load_config, GuardConfig};
use guardrail::security::{
    sanitize_for_prompt, strip_markup, validate_url, FileIntegrityValidator, Rejection,
    UploadCandidate,
};

#[derive(Parser)]
#[command(name = "guardrail-cli")]
#[command(about = "Run guardrail validators offline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a URL against the SSRF and scheme rules
    Url { url: String },
    /// Strip markup from text
    Strip { text: String },
    /// Neutralize text before it is embedded in a model prompt
    Prompt {
        text: String,
        #[arg(long, default_value_t = guardrail::security::sanitize::DEFAULT_PROMPT_MAX_CHARS)]
        max_chars: usize,
    },
    /// Validate a file as an upload with the given content type
    File {
        path: PathBuf,
        #[arg(long)]
        mime: String,
        /// Upload policy from this config instead of defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Parse and validate a configuration file
    CheckConfig { path: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok((report, ok)) => {
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<(Value, bool), Box<dyn std::error::Error>> {
    Ok(match command {
        Commands::Url { url } => match validate_url(&url) {
            Ok(url) => (json!({ "valid": true, "sanitizedUrl": url.as_str() }), true),
            Err(rejection) => (rejection_report(&rejection), false),
        },
        Commands::Strip { text } => (json!({ "text": strip_markup(&text) }), true),
        Commands::Prompt { text, max_chars } => {
            (json!({ "text": sanitize_for_prompt(&text, max_chars) }), true)
        }
        Commands::File { path, mime, config } => {
            let policy = match config {
                Some(path) => load_config(&path)?.uploads,
                None => GuardConfig::default().uploads,
            };
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let candidate = UploadCandidate {
                name: &name,
                declared_mime: &mime,
                size_bytes: bytes.len() as u64,
                bytes: &bytes,
            };
            match FileIntegrityValidator::new(policy).validate(&candidate) {
                Ok(record) => (
                    json!({
                        "valid": true,
                        "sanitizedFilename": record.sanitized_filename,
                        "kind": format!("{:?}", record.content_kind),
                        "sha256Hash": record.sha256_hex(),
                    }),
                    true,
                ),
                Err(rejection) => (rejection_report(&rejection), false),
            }
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => (json!({ "valid": true, "config": config }), true),
            Err(e) => (json!({ "valid": false, "error": e.to_string() }), false),
        },
    })
}

fn rejection_report(rejection: &Rejection) -> Value {
    json!({
        "valid": false,
        "code": rejection.code(),
        "category": rejection.kind.category(),
        "error": rejection.message,
    })
}
