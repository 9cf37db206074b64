/// Configuration management
use crate::error::{LostFoundError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8787;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listening address
    pub listen_addr: SocketAddr,

    /// Directory holding the sled databases
    pub data_dir: PathBuf,

    /// Buffered push events per subscriber before it is reported as lagged
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            data_dir: PathBuf::from(".lostfound"),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut port: Option<u16> = None;
        let mut bind: IpAddr = Config::default().listen_addr.ip();
        let mut data_dir: Option<PathBuf> = None;
        let mut event_capacity = DEFAULT_EVENT_CAPACITY;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        LostFoundError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    data_dir = Some(PathBuf::from(path));
                    i += 2;
                }
                "--bind" => {
                    let ip = args.get(i + 1).ok_or_else(|| {
                        LostFoundError::Config("--bind requires an address argument".to_string())
                    })?;
                    bind = ip.parse().map_err(|_| {
                        LostFoundError::Config(format!("--bind: invalid IP address {}", ip))
                    })?;
                    i += 2;
                }
                "--event-capacity" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        LostFoundError::Config("--event-capacity requires a number".to_string())
                    })?;
                    event_capacity = n
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| {
                            LostFoundError::Config(
                                "--event-capacity must be a positive number".to_string(),
                            )
                        })?;
                    i += 2;
                }
                other if port.is_none() && !other.starts_with("--") => {
                    port = Some(other.parse::<u16>().map_err(|_| {
                        LostFoundError::Config("Port must be a valid number (0-65535)".to_string())
                    })?);
                    i += 1;
                }
                other => {
                    return Err(LostFoundError::Config(format!(
                        "Unknown argument: {}\nUsage: {} [port] [--bind <ip>] [--data-dir <path>] [--event-capacity <n>]",
                        other,
                        args.first().map(String::as_str).unwrap_or("lostfound")
                    )));
                }
            }
        }

        // Env overrides (nice for containers)
        if let Some(p) = std::env::var("LOSTFOUND_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            port = Some(p);
        }
        if let Ok(dir) = std::env::var("LOSTFOUND_DATA_DIR") {
            if !dir.trim().is_empty() {
                data_dir = Some(PathBuf::from(dir));
            }
        }

        let defaults = Config::default();
        Ok(Self {
            listen_addr: SocketAddr::new(bind, port.unwrap_or(defaults.listen_addr.port())),
            data_dir: data_dir.unwrap_or(defaults.data_dir),
            event_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lostfound")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_flags_are_parsed() {
        let cfg = Config::from_args(&args(&[
            "9100",
            "--bind",
            "0.0.0.0",
            "--data-dir",
            "/tmp/lf",
            "--event-capacity",
            "8",
        ]))
        .unwrap();
        // Env overrides may be set by the caller; only check what they cannot touch
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(cfg.event_capacity, 8);
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(Config::from_args(&args(&["notaport"])).is_err());
        assert!(Config::from_args(&args(&["--data-dir"])).is_err());
        assert!(Config::from_args(&args(&["--event-capacity", "0"])).is_err());
        assert!(Config::from_args(&args(&["--bogus"])).is_err());
    }
}
