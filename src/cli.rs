use crate::config::{parse_deadzone, parse_millis, EngineConfig};
use crate::logging::LogLevel;
use anyhow::{Context, Result};
use clap::Parser;

/// padlayer - replay a scripted controller timeline through the engine
#[derive(Parser, Debug, Default)]
#[command(name = "padlayer")]
#[command(version = "0.1.0")]
#[command(about = "Layered controller-to-keyboard/mouse translation demo", long_about = None)]
pub struct Cli {
    /// Number of frames to run
    #[arg(short, long, value_name = "COUNT")]
    pub frames: Option<u32>,

    /// Frame duration in milliseconds (default 100)
    #[arg(long = "frame-ms", value_name = "MS")]
    pub frame_ms: Option<String>,

    /// Default hold threshold in milliseconds
    #[arg(long = "hold-ms", value_name = "MS")]
    pub hold_ms: Option<String>,

    /// Initial auto-repeat delay in milliseconds
    #[arg(long = "repeat-delay", value_name = "MS")]
    pub repeat_delay: Option<String>,

    /// Auto-repeat interval in milliseconds
    #[arg(long = "repeat-rate", value_name = "MS")]
    pub repeat_rate: Option<String>,

    /// Analog deadzone as a percentage of full scale (0-100)
    #[arg(short, long, value_name = "PERCENT")]
    pub deadzone: Option<String>,

    /// Log level (nothing, user, error, warning, info, debug, all)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print idle frames too
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Frame count to replay
    pub fn frame_count(&self) -> u32 {
        self.frames.unwrap_or(20)
    }

    /// Frame duration in milliseconds
    pub fn frame_duration(&self) -> Result<u32> {
        match self.frame_ms {
            Some(ref ms) => parse_millis(ms).context("Invalid frame duration"),
            None => Ok(100),
        }
    }

    /// Merge CLI arguments into the engine configuration
    pub fn merge_into_config(&self, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(ref ms) = self.hold_ms {
            config.default_hold_ms = parse_millis(ms).context("Invalid hold time")?;
        }

        if let Some(ref ms) = self.repeat_delay {
            config.repeat_delay_ms = parse_millis(ms).context("Invalid repeat delay")?;
        }

        if let Some(ref ms) = self.repeat_rate {
            config.repeat_rate_ms = parse_millis(ms).context("Invalid repeat rate")?;
        }

        if let Some(ref dz) = self.deadzone {
            config.analog_deadzone = parse_deadzone(dz)?;
        }

        Ok(config)
    }

    /// Requested log level, `Info` when not given
    pub fn log_level(&self) -> Result<LogLevel> {
        match self.log_level {
            Some(ref level) => Self::parse_log_level(level),
            None => Ok(LogLevel::Info),
        }
    }

    fn parse_log_level(s: &str) -> Result<LogLevel> {
        match s.to_lowercase().as_str() {
            "nothing" | "off" => Ok(LogLevel::Nothing),
            "user" | "fatal" => Ok(LogLevel::User),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "all" | "trace" => Ok(LogLevel::All),
            _ => anyhow::bail!(
                "Invalid log level: {}. Valid options: nothing, user, error, warning, info, debug, all",
                s
            ),
        }
    }
}
