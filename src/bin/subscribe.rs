use clap::Parser;
use cobalt_stomp::{ClientError, Connector, ConnectorConfig, SessionEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

/// Exit codes for different error conditions
mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Network/connection error (e.g., host unreachable, connection refused)
    pub const NETWORK_ERROR: u8 = 1;
    /// Authentication error (e.g., invalid credentials)
    pub const AUTH_ERROR: u8 = 2;
    /// Anything else (e.g., unreadable configuration file)
    pub const GENERIC_ERROR: u8 = 255;
}

#[derive(Parser)]
#[command(name = "subscribe")]
#[command(about = "Subscribe to STOMP topics and print received frames")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the --config path and exit
    #[arg(long)]
    save_config: bool,

    /// Broker hostname
    #[arg(long)]
    hostname: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Virtual host named in the CONNECT frame
    #[arg(short, long)]
    broker: Option<String>,

    /// Login username
    #[arg(short, long)]
    login: Option<String>,

    /// Passcode
    #[arg(short, long)]
    passcode: Option<String>,

    /// Destinations to subscribe to (can be specified multiple times)
    #[arg(short, long)]
    subscribe: Vec<String>,
}

/// Persisted subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Config {
    broker_name: String,
    hostname: String,
    port: u16,
    user: String,
    password: String,
    topic_names: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_name: String::new(),
            hostname: "127.0.0.1".to_string(),
            port: cobalt_stomp::connector::DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            topic_names: Vec::new(),
        }
    }
}

impl Config {
    fn load(path: &PathBuf) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        serde_json::from_str(&raw).map_err(|e| format!("cannot parse {}: {}", path.display(), e))
    }

    fn save(&self, path: &PathBuf) -> Result<(), String> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| format!("cannot serialize config: {}", e))?;
        std::fs::write(path, raw).map_err(|e| format!("cannot write {}: {}", path.display(), e))
    }

    /// CLI flags win over file contents.
    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(hostname) = &cli.hostname {
            self.hostname = hostname.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(broker) = &cli.broker {
            self.broker_name = broker.clone();
        }
        if let Some(login) = &cli.login {
            self.user = login.clone();
        }
        if let Some(passcode) = &cli.passcode {
            self.password = passcode.clone();
        }
        if !cli.subscribe.is_empty() {
            self.topic_names = cli.subscribe.clone();
        }
    }
}

/// Format a connection error with user-friendly messaging
fn format_connection_error(err: &ClientError, address: &str) -> (String, u8) {
    match err {
        ClientError::Transport(io_err) => {
            let message = match io_err.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    format!("Connection refused: {}", address)
                }
                std::io::ErrorKind::TimedOut => {
                    format!("Connection timed out: {}", address)
                }
                _ => {
                    format!("Connection failed: {}", io_err)
                }
            };
            (message, exit_codes::NETWORK_ERROR)
        }
        ClientError::Rejected { reason } => (
            format!("Authentication failed: {}", reason),
            exit_codes::AUTH_ERROR,
        ),
        ClientError::MalformedFrame { context } => (
            format!("Malformed frame: {}", context),
            exit_codes::GENERIC_ERROR,
        ),
    }
}

/// Print one received frame; JSON bodies are pretty-printed.
fn print_frame(frame: &cobalt_stomp::Frame) {
    println!("MESSAGE received:");
    for (k, v) in &frame.headers {
        println!("  {}: {}", k, v);
    }
    if frame.body.is_empty() {
        return;
    }
    let is_json = frame
        .content_type()
        .map(|(mime, _)| mime.ends_with("/json"))
        .unwrap_or(false);
    if is_json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&frame.body) {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_default();
            println!("  Body: {}", pretty);
            return;
        }
    }
    match std::str::from_utf8(&frame.body) {
        Ok(s) => println!("  Body: {}", s),
        Err(_) => println!("  Body: ({} bytes, binary)", frame.body.len()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) if path.exists() => match Config::load(path) {
            Ok(config) => config,
            Err(message) => {
                eprintln!("{}", message);
                return ExitCode::from(exit_codes::GENERIC_ERROR);
            }
        },
        _ => Config::default(),
    };
    config.apply_overrides(&cli);

    if cli.save_config {
        let Some(path) = &cli.config else {
            eprintln!("--save-config requires --config <path>");
            return ExitCode::from(exit_codes::GENERIC_ERROR);
        };
        return match config.save(path) {
            Ok(()) => {
                println!("Configuration written to {}", path.display());
                ExitCode::from(exit_codes::SUCCESS)
            }
            Err(message) => {
                eprintln!("{}", message);
                ExitCode::from(exit_codes::GENERIC_ERROR)
            }
        };
    }

    let address = format!("{}:{}", config.hostname, config.port);
    println!("Connecting to {}...", address);

    let connector_config = ConnectorConfig {
        hostname: config.hostname.clone(),
        port: config.port,
        broker: config.broker_name.clone(),
        username: config.user.clone(),
        password: config.password.clone(),
    };

    let (connector, mut events) = match Connector::connect(connector_config).await {
        Ok(pair) => pair,
        Err(err) => {
            let (message, exit_code) = format_connection_error(&err, &address);
            eprintln!("{}", message);
            return ExitCode::from(exit_code);
        }
    };

    let mut exit_code = exit_codes::SUCCESS;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                connector.disconnect(true);
            }
            event = events.next() => match event {
                None => break,
                Some(SessionEvent::Connected) => {
                    println!("Connected.");
                }
                Some(SessionEvent::Subscribe) => {
                    for (index, topic) in config.topic_names.iter().enumerate() {
                        let frame = connector.subscribe_frame(&index.to_string(), topic);
                        connector.send(frame);
                        println!("Subscribed to: {}", topic);
                    }
                }
                Some(SessionEvent::Ready) => {
                    debug!(version = %connector.version(), session = %connector.session_id(), "session ready");
                }
                Some(SessionEvent::Message(frame)) => {
                    if frame.command == "MESSAGE" {
                        print_frame(&frame);
                    }
                }
                Some(SessionEvent::Rejected { reason }) => {
                    let err = ClientError::Rejected { reason };
                    let (message, code) = format_connection_error(&err, &address);
                    eprintln!("{}", message);
                    exit_code = code;
                }
                Some(SessionEvent::Error(err)) => {
                    let (message, code) = format_connection_error(&err, &address);
                    eprintln!("{}", message);
                    exit_code = code;
                }
                Some(SessionEvent::Disconnect { graceful }) => {
                    println!("Disconnected (graceful: {}).", graceful);
                    break;
                }
            }
        }
    }

    ExitCode::from(exit_code)
}
