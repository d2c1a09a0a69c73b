//! Command-line pRPC client.
//!
//! ```text
//! prpc call <host> <service>.<method> --descriptor-set FILE [--format json] [--timeout 10s] [-H key=value]...
//! prpc check-config <file>
//! ```

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use prost_reflect::{DescriptorPool, DynamicMessage};

use prpc::client::{CallOptions, Client, ClientError, ClientOptions};
use prpc::codec::encode_any;
use prpc::config::{load_config, ObservabilityConfig};
use prpc::format::Format;
use prpc::observability;
use prpc::server::CallContext;

#[derive(Parser)]
#[command(name = "prpc")]
#[command(about = "Issue pRPC calls from the command line", long_about = None)]
struct Cli {
    /// Log level for the client's own diagnostics.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method with a JSON request read from stdin
    Call {
        /// Server address, e.g. localhost:8080
        host: String,

        /// Fully qualified method, e.g. helloworld.Greeter.SayHello
        method: String,

        /// Serialized FileDescriptorSet describing the service
        #[arg(long)]
        descriptor_set: PathBuf,

        /// Wire format: binary, json or text
        #[arg(long, default_value = "binary")]
        format: Format,

        /// Call timeout, e.g. 500ms, 10s, 2m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Request metadata, repeatable
        #[arg(short = 'H', long = "header", value_parser = parse_key_value)]
        headers: Vec<(String, String)>,
    },
    /// Load and validate a server config file
    CheckConfig {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    });

    let result = match cli.command {
        Commands::Call {
            host,
            method,
            descriptor_set,
            format,
            timeout,
            headers,
        } => call(host, &method, descriptor_set, format, timeout, headers).await,
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!("{} is valid (listening on {})", path.display(), config.listener.bind_address);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn call(
    host: String,
    method: &str,
    descriptor_set: PathBuf,
    format: Format,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
) -> Result<(), String> {
    let (service_name, method_name) = method
        .rsplit_once('.')
        .ok_or_else(|| format!("method must be <service>.<method>, got {method:?}"))?;

    let bytes = fs::read(&descriptor_set).map_err(|e| format!("{}: {e}", descriptor_set.display()))?;
    let pool = DescriptorPool::decode(bytes.as_slice()).map_err(|e| format!("{}: {e}", descriptor_set.display()))?;
    let service = pool
        .get_service_by_name(service_name)
        .ok_or_else(|| format!("service {service_name:?} not found in descriptor set"))?;
    let method_desc = service
        .methods()
        .find(|m| m.name() == method_name)
        .ok_or_else(|| format!("method {method_name:?} not found in service {service_name:?}"))?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("reading stdin: {e}"))?;
    let input = if input.trim().is_empty() { "{}" } else { input.as_str() };
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let request = DynamicMessage::deserialize(method_desc.input(), &mut deserializer)
        .map_err(|e| format!("parsing request: {e}"))?;
    deserializer.end().map_err(|e| format!("parsing request: {e}"))?;

    let mut opts = CallOptions::default().format(format);
    if let Some(timeout) = timeout {
        opts = opts.timeout(timeout);
    }
    for (key, value) in headers {
        opts = opts.metadata(key, value);
    }

    let client = Client::with_options(host, ClientOptions::default().descriptor_pool(pool.clone()));
    let mut response = DynamicMessage::new(method_desc.output());
    match client
        .call_into(&CallContext::new(), service_name, method_name, &request, &mut response, &opts)
        .await
    {
        Ok(_) => {
            let json = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }
        Err(ClientError::Status(status)) => {
            let mut report = format!("code: {}\nmessage: {}", status.code(), status.message());
            for detail in status.details() {
                let rendered = encode_any(detail, Format::JsonPb, &pool)
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_else(|_| detail.type_url.clone());
                report.push_str(&format!("\ndetail: {rendered}"));
            }
            Err(report)
        }
        Err(e) => Err(format!("code: {}\nerror: {e}", e.code())),
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in {s:?}"))?;
    let (value, unit) = s.split_at(split);
    let value: u64 = value.parse().map_err(|_| format!("invalid duration {s:?}"))?;
    let secs = |per_unit: u64| {
        value
            .checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is too large"))
    };
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(3600),
        _ => Err(format!("unknown unit {unit:?} in {s:?}")),
    }
}
