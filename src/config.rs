//! Start-up settings read from the process environment.

use std::path::PathBuf;

use tokio::time::Duration;
use url::Url;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 180;
const DOWNLOAD_SUBDIR: &str = "twitter_spaces";

/// Which HTTP binding of the core is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Long-running server: info, Space download, notification and file routes.
    Standalone,
    /// Function-style binding: a single info route plus health.
    Serverless,
}

impl Deployment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standalone" | "server" => Some(Self::Standalone),
            "serverless" | "function" => Some(Self::Serverless),
            _ => None,
        }
    }

    fn default_debug(self) -> bool {
        matches!(self, Self::Serverless)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub deployment: Deployment,
    pub debug: bool,
    pub bind_addr: String,
    pub download_dir: PathBuf,
    pub yt_dlp_bin: String,
    pub yt_dlp_timeout: Duration,
    pub notify_webhook: Option<Url>,
    /// Problems found while reading the environment, logged once tracing is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut warnings = Vec::new();

        let deployment = match lookup("DEPLOYMENT").as_deref().and_then(non_empty) {
            Some(value) => Deployment::parse(value).unwrap_or_else(|| {
                warnings.push(format!("Unknown DEPLOYMENT {value:?}; using standalone."));
                Deployment::Standalone
            }),
            None => Deployment::Standalone,
        };

        let debug = match lookup("DEBUG") {
            Some(value) => read_bool(&value).unwrap_or_else(|| {
                warnings.push(format!(
                    "Invalid DEBUG {value:?}; using {}.",
                    deployment.default_debug()
                ));
                deployment.default_debug()
            }),
            None => deployment.default_debug(),
        };

        let download_dir = lookup("DOWNLOAD_DIR")
            .as_deref()
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DOWNLOAD_SUBDIR));

        let yt_dlp_bin = lookup("YT_DLP_BIN")
            .as_deref()
            .and_then(non_empty)
            .unwrap_or("yt-dlp")
            .to_string();

        let yt_dlp_timeout = match lookup("YT_DLP_TIMEOUT_SECONDS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => seconds,
                _ => {
                    warnings.push(format!(
                        "Invalid YT_DLP_TIMEOUT_SECONDS {value:?}; using {DEFAULT_YT_DLP_TIMEOUT_SECONDS}."
                    ));
                    DEFAULT_YT_DLP_TIMEOUT_SECONDS
                }
            },
            None => DEFAULT_YT_DLP_TIMEOUT_SECONDS,
        };

        let notify_webhook = lookup("NOTIFY_WEBHOOK_URL")
            .as_deref()
            .and_then(non_empty)
            .and_then(|value| match Url::parse(value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                _ => {
                    warnings.push(format!(
                        "Ignoring NOTIFY_WEBHOOK_URL {value:?}: expected an http(s) URL."
                    ));
                    None
                }
            });

        Self {
            deployment,
            debug,
            bind_addr: resolve_bind_addr(&lookup, &mut warnings),
            download_dir,
            yt_dlp_bin,
            yt_dlp_timeout: Duration::from_secs(yt_dlp_timeout),
            notify_webhook,
            warnings,
        }
    }
}

fn resolve_bind_addr(
    lookup: &impl Fn(&str) -> Option<String>,
    warnings: &mut Vec<String>,
) -> String {
    if let Some(configured) = lookup("APP_ADDR")
        .as_deref()
        .and_then(non_empty)
        .map(ToString::to_string)
    {
        return configured;
    }

    let port = match lookup("PORT") {
        Some(value) => value.trim().parse::<u16>().unwrap_or_else(|_| {
            warnings.push(format!("Invalid PORT {value:?}; using {DEFAULT_PORT}."));
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    };

    format!("0.0.0.0:{port}")
}

fn read_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
