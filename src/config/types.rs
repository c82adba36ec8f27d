use std::time::Duration;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Durations ----------------------------------------------------------------------------------

/// clap value parser for human-readable, strictly positive durations
/// (`1s`, `250ms`, `100000h`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw).map_err(|e| format!("{raw:?}: {e}"))?;

    if duration.is_zero() {
        return Err(format!("{raw:?}: duration must be greater than zero"));
    }

    Ok(duration)
}

// -------------------------------------------------------------------------------------------------
// ---- Tests --------------------------------------------------------------------------------------


// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
