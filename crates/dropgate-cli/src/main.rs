// crates/dropgate-cli/src/main.rs
// ============================================================================
// Module: Dropgate CLI Entry Point
// Description: Command dispatcher for serving and operating dropgate.
// Purpose: Start the HTTP server, check configuration, and mint secrets.
// Dependencies: clap, dropgate-config, dropgate-core, dropgate-server, rand, tokio
// ============================================================================

//! ## Overview
//! The `dropgate` binary wraps the server crate. `serve` loads
//! `dropgate.toml`, resolves secrets from the environment, and runs the
//! `/v1` API. `config check` validates a config file without starting
//! anything, and `keys generate` prints fresh secrets in `NAME=value` form
//! ready for an environment file. Inputs are untrusted and every failure
//! exits non-zero with a single message on stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use dropgate_config::AuditSinkKind;
use dropgate_config::BlobBackend;
use dropgate_config::DropgateConfig;
use dropgate_config::PaymentProvider;
use dropgate_config::ResolvedSecrets;
use dropgate_config::SecretsConfig;
use dropgate_config::StoreBackend;
use dropgate_config::secrets::SECRET_KEY_BYTES;
use dropgate_config::secrets::encode_key;
use dropgate_core::TokenSigner;
use dropgate_server::DropgateServer;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Random bytes behind a generated webhook secret.
const WEBHOOK_SECRET_BYTES: usize = 24;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "dropgate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the dropgate HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Secret material utilities.
    Keys {
        /// Selected keys subcommand.
        #[command(subcommand)]
        command: KeysCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to dropgate.toml or `DROPGATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a config file and print a summary.
    Check(ConfigCheckCommand),
}

/// Configuration for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path (defaults to dropgate.toml or `DROPGATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Skip resolving secrets from the environment.
    #[arg(long, action = ArgAction::SetTrue)]
    skip_secrets: bool,
}

/// Keys subcommands.
#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Print freshly generated secrets as `NAME=value` lines.
    Generate(KeysGenerateCommand),
}

/// Configuration for `keys generate`.
#[derive(Args, Debug)]
struct KeysGenerateCommand {
    /// Config file whose secret variable names should be used.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("dropgate {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Keys {
            command,
        } => command_keys(command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = DropgateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let secrets = ResolvedSecrets::from_env(&config)
        .map_err(|err| CliError::new(format!("failed to resolve secrets: {err}")))?;
    warn_network_exposure(&config)?;

    let server = tokio::task::spawn_blocking(move || DropgateServer::from_config(&config, secrets))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    write_stderr_line(&format!("dropgate listening on {}", server.bind_addr()))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;

    Ok(ExitCode::SUCCESS)
}

/// Warns when the server will accept connections from other hosts.
fn warn_network_exposure(config: &DropgateConfig) -> CliResult<()> {
    let addr = config
        .server
        .socket_addr()
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if addr.ip().is_loopback() {
        return Ok(());
    }
    write_stderr_line(&format!(
        "warning: binding {addr} exposes the API beyond this host; terminate TLS upstream"
    ))
    .map_err(|err| CliError::new(output_error("stderr", &err)))
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Check(command) => command_config_check(&command),
    }
}

/// Executes the config check command.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = DropgateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if !command.skip_secrets {
        ResolvedSecrets::from_env(&config)
            .map_err(|err| CliError::new(format!("failed to resolve secrets: {err}")))?;
    }
    for line in config_summary(&config) {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Renders the lines printed by `config check`.
fn config_summary(config: &DropgateConfig) -> Vec<String> {
    vec![
        "config ok".to_string(),
        format!("bind: {}", config.server.bind),
        format!("public base url: {}", config.server.public_base_url()),
        format!("store: {}", store_label(config.store.backend)),
        format!("blobs: {}", blob_label(config.blobs.backend)),
        format!("payments: {}", payment_label(config.payments.provider)),
        format!("audit: {}", audit_label(config.audit.sink)),
        format!("principals: {}", config.identity.principals.len()),
    ]
}

/// Returns the config label for a store backend.
const fn store_label(backend: StoreBackend) -> &'static str {
    match backend {
        StoreBackend::Memory => "memory",
        StoreBackend::Sqlite => "sqlite",
    }
}

/// Returns the config label for a blob backend.
const fn blob_label(backend: BlobBackend) -> &'static str {
    match backend {
        BlobBackend::Memory => "memory",
        BlobBackend::Filesystem => "filesystem",
        BlobBackend::S3 => "s3",
    }
}

/// Returns the config label for a payment provider.
const fn payment_label(provider: PaymentProvider) -> &'static str {
    match provider {
        PaymentProvider::Mock => "mock",
        PaymentProvider::Http => "http",
    }
}

/// Returns the config label for an audit sink.
const fn audit_label(sink: AuditSinkKind) -> &'static str {
    match sink {
        AuditSinkKind::Stderr => "stderr",
        AuditSinkKind::File => "file",
        AuditSinkKind::None => "none",
    }
}

// ============================================================================
// SECTION: Keys Commands
// ============================================================================

/// Freshly generated secret material.
struct GeneratedSecrets {
    /// Ed25519 seed for claim and download tokens.
    signing_seed: [u8; SECRET_KEY_BYTES],
    /// Envelope wrapping key.
    envelope_key: [u8; SECRET_KEY_BYTES],
    /// Payment webhook secret bytes.
    webhook_secret: [u8; WEBHOOK_SECRET_BYTES],
}

impl GeneratedSecrets {
    /// Draws every secret from `rng`.
    fn generate(rng: &mut impl RngCore) -> Self {
        let mut signing_seed = [0_u8; SECRET_KEY_BYTES];
        let mut envelope_key = [0_u8; SECRET_KEY_BYTES];
        let mut webhook_secret = [0_u8; WEBHOOK_SECRET_BYTES];
        rng.fill_bytes(&mut signing_seed);
        rng.fill_bytes(&mut envelope_key);
        rng.fill_bytes(&mut webhook_secret);
        Self {
            signing_seed,
            envelope_key,
            webhook_secret,
        }
    }

    /// Renders `NAME=value` lines using the variable names in `names`.
    fn env_lines(&self, names: &SecretsConfig) -> Vec<String> {
        let verifying_key = TokenSigner::from_seed(&self.signing_seed).public_key();
        vec![
            format!("# token verifying key: {}", encode_key(&verifying_key)),
            format!("{}={}", names.signing_seed_env, encode_key(&self.signing_seed)),
            format!("{}={}", names.envelope_key_env, encode_key(&self.envelope_key)),
            format!("{}={}", names.webhook_secret_env, encode_key(&self.webhook_secret)),
        ]
    }
}

/// Dispatches keys subcommands.
fn command_keys(command: KeysCommand) -> CliResult<ExitCode> {
    match command {
        KeysCommand::Generate(command) => command_keys_generate(&command),
    }
}

/// Executes the keys generation command.
fn command_keys_generate(command: &KeysGenerateCommand) -> CliResult<ExitCode> {
    let names = match &command.config {
        Some(path) => {
            DropgateConfig::load(Some(path.as_path()))
                .map_err(|err| CliError::new(format!("failed to load config: {err}")))?
                .secrets
        }
        None => SecretsConfig::default(),
    };
    let generated = GeneratedSecrets::generate(&mut OsRng);
    for line in generated.env_lines(&names) {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
