use dotenv::dotenv;
use std::env;

/// Ceiling on any LIMIT clause accepted by the safety validator.
pub const ROW_LIMIT_CEILING: u64 = 10_000;

/// Maximum number of queries a single turn may issue.
pub const MAX_QUERIES_PER_TURN: usize = 3;

/// Router confidence at or above which no external assistance is needed.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI API key; absent means external assistance is unavailable.
    pub open_ai_key: Option<String>,
    /// Default for turns that do not specify safe mode.
    pub safe_mode_default: bool,
    /// Default for turns that do not specify privacy mode.
    pub privacy_mode_default: bool,
    /// Default for turns that do not specify whether AI assistance is allowed.
    pub ai_assist_default: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            open_ai_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            safe_mode_default: env_flag("SAFE_MODE", true),
            privacy_mode_default: env_flag("PRIVACY_MODE", true),
            ai_assist_default: env_flag("AI_ASSIST_ENABLED", false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_ai_key: None,
            safe_mode_default: true,
            privacy_mode_default: true,
            ai_assist_default: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
