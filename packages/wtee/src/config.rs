use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::actor::{BridgeConfig, DEFAULT_OUTBOX_CAPACITY, DEFAULT_READ_BUFFER};
use crate::encoding::InputEncoding;

// =============================================================================
// Command line
// =============================================================================

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "wtee", version)]
#[command(about = "A webview for piped data")]
#[command(after_help = "Example command-line usage:\n  tail -f /var/log/debug | wtee -b localhost:8080 | nl")]
pub struct Args {
    /// Listen on the specified address and port (default: localhost:8080)
    #[arg(short = 'b', long, value_name = "addr:port")]
    pub bind: Option<String>,

    /// Webapp root path
    #[arg(short = 'r', long, value_name = "path")]
    pub relative_root: Option<String>,

    /// Encoding of the piped input (default: utf-8)
    #[arg(long, value_enum, value_name = "enc")]
    pub input_encoding: Option<InputEncoding>,

    /// Encoding for output (accepted for compatibility, output is passed through unchanged)
    #[arg(long, value_name = "enc")]
    pub output_encoding: Option<String>,

    /// Start the page with line wrapping turned off
    #[arg(long)]
    pub no_wrap_lines: bool,

    /// Show debug messages
    #[arg(short, long)]
    pub debug: bool,

    /// Read settings from a TOML file
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

// =============================================================================
// Layered config (figment: defaults / config file / WTEE_* env / flags)
// =============================================================================
//
//   config.toml:     [server]
//                    bind = "*:8080"
//
//   env var:         WTEE_SERVER__BIND='*:8080'   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub input: InputFileConfig,
    #[serde(default)]
    pub ui: UiFileConfig,
    #[serde(default)]
    pub websocket: WebsocketFileConfig,
}

/// Lives under `[server]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub relative_root: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            relative_root: String::new(),
        }
    }
}

/// Lives under `[input]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputFileConfig {
    #[serde(default)]
    pub encoding: InputEncoding,
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,
}

impl Default for InputFileConfig {
    fn default() -> Self {
        Self {
            encoding: InputEncoding::default(),
            read_buffer: default_read_buffer(),
        }
    }
}

/// Lives under `[ui]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UiFileConfig {
    #[serde(default = "default_wrap_lines")]
    pub wrap_lines: bool,
    /// Lines the page keeps before dropping the oldest
    #[serde(default = "default_history_lines")]
    pub history_lines: usize,
}

impl Default for UiFileConfig {
    fn default() -> Self {
        Self {
            wrap_lines: default_wrap_lines(),
            history_lines: default_history_lines(),
        }
    }
}

/// Lives under `[websocket]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebsocketFileConfig {
    /// Batches queued per client before new ones are dropped
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl Default for WebsocketFileConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

fn default_bind() -> String {
    "localhost:8080".to_string()
}

fn default_read_buffer() -> usize {
    DEFAULT_READ_BUFFER
}

fn default_wrap_lines() -> bool {
    true
}

fn default_history_lines() -> usize {
    2000
}

fn default_outbox_capacity() -> usize {
    DEFAULT_OUTBOX_CAPACITY
}

/// Build a figment that layers: defaults → config file → WTEE_* env vars → flags.
///
/// Only flags given on the command line are merged, so an unset flag never
/// masks a value from the file or the environment.
pub fn load_config(config_file: Option<&Path>, args: &Args) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("WTEE_").split("__"));

    if let Some(bind) = &args.bind {
        figment = figment.merge(Serialized::default("server.bind", bind));
    }
    if let Some(root) = &args.relative_root {
        figment = figment.merge(Serialized::default("server.relative_root", root));
    }
    if let Some(encoding) = args.input_encoding {
        figment = figment.merge(Serialized::default("input.encoding", encoding));
    }
    if args.no_wrap_lines {
        figment = figment.merge(Serialized::default("ui.wrap_lines", false));
    }

    figment
}

// =============================================================================
// Resolved settings
// =============================================================================

/// A `host:port` pair. An empty or `*` host listens on every interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindAddr {
    pub host: String,
    pub port: u16,
}

impl FromStr for BindAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None => ("", s),
        };
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port in bind address '{}'", s))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let host = match host {
            "" | "*" => "0.0.0.0",
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BindAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Turn a user supplied root into `/` or `/segment/.../`.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind: BindAddr,
    /// Always starts and ends with `/`
    pub relative_root: String,
    pub encoding: InputEncoding,
    pub read_buffer: usize,
    pub wrap_lines: bool,
    pub history_lines: usize,
    pub outbox_capacity: usize,
}

impl Settings {
    pub fn resolve(args: &Args) -> Result<Self> {
        if let Some(path) = &args.config {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
        }

        let fc: FileConfig = load_config(args.config.as_deref(), args)
            .extract()
            .context("Failed to load configuration")?;

        Self::from_file(&fc)
    }

    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        Ok(Self {
            bind: fc.server.bind.parse()?,
            relative_root: normalize_root(&fc.server.relative_root),
            encoding: fc.input.encoding,
            read_buffer: fc.input.read_buffer.max(1),
            wrap_lines: fc.ui.wrap_lines,
            history_lines: fc.ui.history_lines,
            outbox_capacity: fc.websocket.outbox_capacity.max(1),
        })
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            encoding: self.encoding,
            read_buffer: self.read_buffer,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: BindAddr {
                host: "localhost".to_string(),
                port: 8080,
            },
            relative_root: "/".to_string(),
            encoding: InputEncoding::default(),
            read_buffer: DEFAULT_READ_BUFFER,
            wrap_lines: true,
            history_lines: default_history_lines(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}
