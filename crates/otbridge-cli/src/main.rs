//! Command-line interface for OTBridge.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otbridge_core::config::env_vars;
use otbridge_core::{FieldCodec, FieldValue, MessageId, MessageType, ALIAS_TABLE};
use otbridge_devices::{Assembly, EndpointHandle, HubConfig};

/// OTBridge - Map OpenTherm payload fields to endpoints.
#[derive(Parser, Debug)]
#[command(name = "otbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a hub configuration and list its bindings.
    Check {
        /// Configuration file (TOML, or JSON with a .json extension).
        config: PathBuf,
        /// Reject overlapping fields regardless of the file setting.
        #[arg(long)]
        strict: bool,
    },
    /// Decode a payload through every named field alias.
    Inspect {
        /// Payload word (0x hex, 0b binary or decimal).
        #[arg(value_parser = parse_payload)]
        payload: u16,
    },
    /// Deliver a payload to a configured hub and print endpoint states.
    Decode {
        /// Configuration file.
        config: PathBuf,
        /// Message id (name, decimal or 0x hex).
        #[arg(long)]
        id: MessageId,
        /// Message type.
        #[arg(long = "type", default_value = "READ_DATA")]
        message_type: MessageType,
        /// Payload word (0x hex, 0b binary or decimal).
        #[arg(value_parser = parse_payload)]
        payload: u16,
        /// Print states as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Set endpoint values and compose the outbound payload.
    Compose {
        /// Configuration file.
        config: PathBuf,
        /// Message id (name, decimal or 0x hex).
        #[arg(long)]
        id: MessageId,
        /// Message type.
        #[arg(long = "type", default_value = "WRITE_DATA")]
        message_type: MessageType,
        /// Initial payload word.
        #[arg(long, default_value = "0", value_parser = parse_payload)]
        initial: u16,
        /// Endpoint value as name=value. May be repeated.
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, FieldValue)>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.verbose {
        "otbridge=debug"
    } else {
        "otbridge=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // Logs go to stderr so command output stays parseable
    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Check { config, strict } => run_check(&config, strict),
        Command::Inspect { payload } => run_inspect(payload),
        Command::Decode {
            config,
            id,
            message_type,
            payload,
            json,
        } => run_decode(&config, id, message_type, payload, json),
        Command::Compose {
            config,
            id,
            message_type,
            initial,
            set,
        } => run_compose(&config, id, message_type, initial, &set),
    }
}

/// Load and build a hub configuration.
fn load_assembly(path: &Path, strict: bool) -> Result<Assembly> {
    let mut config = HubConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.reject_overlaps |= strict;
    config
        .build()
        .with_context(|| format!("Invalid config {}", path.display()))
}

fn run_check(path: &Path, strict: bool) -> Result<()> {
    let assembly = load_assembly(path, strict)?;
    assembly.hub.dump_config();

    for binding in &assembly.bindings {
        let field = |f: Option<otbridge_core::FieldSpec>| {
            f.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<24} {:<14} {}  read={} write={}",
            binding.endpoint().name(),
            binding.endpoint().kind().to_string(),
            binding.key(),
            field(binding.read_field()),
            field(binding.write_field()),
        );
    }
    println!(
        "OK: {} endpoints on {} message keys",
        assembly.bindings.len(),
        assembly.hub.keys().len()
    );
    Ok(())
}

fn run_inspect(payload: u16) -> Result<()> {
    println!("Payload 0x{:04X} (0b{:016b}, {})", payload, payload, payload);
    for (alias, spec) in ALIAS_TABLE {
        let codec = FieldCodec::new(*spec)?;
        println!(
            "  {:<9} {:<10} {}",
            alias,
            spec.to_string(),
            codec.decode(payload)
        );
    }
    Ok(())
}

fn run_decode(
    path: &Path,
    id: MessageId,
    message_type: MessageType,
    payload: u16,
    json: bool,
) -> Result<()> {
    let assembly = load_assembly(path, false)?;
    let readers = assembly.hub.deliver(id, message_type, payload);
    if readers == 0 {
        tracing::warn!(id = id.0, message_type = %message_type, "No endpoint reads this message");
    }

    if json {
        let states: serde_json::Map<String, serde_json::Value> = assembly
            .endpoints()
            .map(|e| -> Result<_, serde_json::Error> {
                let value = serde_json::to_value(e.endpoint().current_value())?;
                Ok((e.name().to_string(), value))
            })
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&states)?);
    } else {
        for endpoint in assembly.endpoints() {
            println!("{}", describe(endpoint));
        }
    }
    Ok(())
}

fn run_compose(
    path: &Path,
    id: MessageId,
    message_type: MessageType,
    initial: u16,
    assignments: &[(String, FieldValue)],
) -> Result<()> {
    let assembly = load_assembly(path, false)?;
    for (name, value) in assignments {
        let endpoint = assembly
            .endpoint(name)
            .with_context(|| format!("No endpoint named '{}'", name))?;
        endpoint
            .set(*value)
            .with_context(|| format!("Cannot set '{}' to {}", name, value))?;
    }

    let payload = assembly.hub.compose(id, message_type, initial);
    println!("0x{:04X}", payload);
    Ok(())
}

fn describe(endpoint: &EndpointHandle) -> String {
    let value = endpoint
        .endpoint()
        .current_value()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{} ({}): {}", endpoint.name(), endpoint.kind(), value)
}

/// Parse a payload word written as `0x` hex, `0b` binary or decimal.
fn parse_payload(s: &str) -> Result<u16, String> {
    let cleaned = s.trim().replace('_', "");
    let parsed = if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else if let Some(bin) = cleaned
        .strip_prefix("0b")
        .or_else(|| cleaned.strip_prefix("0B"))
    {
        u16::from_str_radix(bin, 2)
    } else {
        cleaned.parse()
    };
    parsed.map_err(|e| format!("invalid payload '{}': {}", s, e))
}

/// Parse `name=value`, where value is a boolean, an integer or a float.
fn parse_assignment(s: &str) -> Result<(String, FieldValue), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let raw = raw.trim();
    let value = match raw.to_ascii_lowercase().as_str() {
        "true" | "on" => FieldValue::Bool(true),
        "false" | "off" => FieldValue::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i32>() {
                FieldValue::Int(i)
            } else {
                raw.parse::<f32>()
                    .map(FieldValue::Float)
                    .map_err(|_| format!("invalid value '{}' for '{}'", raw, name))?
            }
        }
    };
    Ok((name.trim().to_string(), value))
}
