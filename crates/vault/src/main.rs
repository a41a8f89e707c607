//! `phi-keytool` — operator tool for the field encryption keys.
//!
//! Startup sequence for every subcommand except `generate-key`:
//! 1. Load and validate `Config` from environment variables.
//! 2. Initialise tracing (JSON logs, optional OTLP export).
//! 3. Build the `KeyRing` from the configured master secrets. A missing or
//!    short secret aborts here.
//! 4. Run the subcommand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use phi_vault::{audit::AuditContext, config::Config, key, telemetry, FieldEncryptor};

#[derive(Parser)]
#[command(name = "phi-keytool", version, about = "Manage field encryption keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a freshly generated master secret.
    GenerateKey,
    #[command(flatten)]
    Keyed(KeyedCommand),
}

/// Subcommands that need the configured master keys.
#[derive(Subcommand)]
enum KeyedCommand {
    /// Validate configuration, self-test the keys, and print key metadata.
    Check,
    /// Encrypt one value and print its envelope.
    Encrypt {
        value: String,
        /// Data type recorded in the audit trail.
        #[arg(long, default_value = common::protocol::DEFAULT_DATA_TYPE)]
        data_type: String,
    },
    /// Decrypt one envelope and print its plaintext.
    Decrypt {
        envelope: String,
        #[arg(long, default_value = common::protocol::DEFAULT_DATA_TYPE)]
        data_type: String,
    },
    /// Watch the rotation schedule until interrupted.
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Command::GenerateKey => {
            println!("{}", key::generate_master_secret().as_str());
            return Ok(());
        }
        Command::Keyed(command) => command,
    };

    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Keys
    // -----------------------------------------------------------------------
    let ring = cfg.key_ring().context("master key configuration invalid")?;
    let rotation = cfg.key_rotation()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        key_version = ring.current_version(),
        retired_keys = ring.snapshot().retired_versions().len(),
        "phi-keytool starting"
    );

    // -----------------------------------------------------------------------
    // 4. Subcommand
    // -----------------------------------------------------------------------
    let fields = FieldEncryptor::with_tracing_audit(ring);
    match command {
        KeyedCommand::Check => {
            self_test(&fields)?;
            println!("{}", serde_json::to_string_pretty(&rotation.metadata())?);
        }
        KeyedCommand::Encrypt { value, data_type } => {
            let stored = fields.encrypt(&value, &AuditContext::new(data_type))?;
            println!("{stored}");
        }
        KeyedCommand::Decrypt { envelope, data_type } => {
            let plain = fields.decrypt(&envelope, &AuditContext::new(data_type))?;
            println!("{plain}");
        }
        KeyedCommand::Monitor => {
            let monitor = key::spawn_rotation_monitor(rotation, cfg.rotation_check_interval());
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            monitor.abort();
            info!("rotation monitor stopped");
        }
    }

    Ok(())
}

/// Round-trip a probe value through the current key.
fn self_test(fields: &FieldEncryptor) -> Result<()> {
    let ctx = AuditContext::new("self_test");
    let probe = "phi-keytool self-test";
    let stored = fields.encrypt(probe, &ctx)?;
    let opened = fields.decrypt(&stored, &ctx)?;
    anyhow::ensure!(opened == probe, "self-test round trip returned different plaintext");

    info!(
        key_version = fields.key_ring().current_version(),
        envelope_len = stored.len(),
        "self-test passed"
    );
    Ok(())
}
