use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure, every option can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "docshrink")]
#[command(about = "PDF compression service with daily quotas and lifetime upgrades")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    // Free compressions per user per calendar day
    #[arg(long, env = "DAILY_LIMIT", default_value_t = 5)]
    pub daily_limit: u32,

    // Rate limit max requests per window (per client origin)
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 60)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_window: u64,

    // How often idle rate limit origins are evicted, in seconds
    #[arg(long, env = "RATE_LIMIT_CLEANUP_SECS", default_value_t = 60)]
    pub rate_cleanup_interval: u64,

    // Largest accepted upload in MiB
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 20)]
    pub max_upload_mb: usize,

    // Compression tool candidates, tried in order (comma-separated)
    // Example: "gswin64c,gswin32c" or "sh ./wrap.sh"
    #[arg(long = "tool", env = "COMPRESSION_TOOLS", value_delimiter = ',')]
    pub tools: Vec<String>,

    // Wall-clock limit for one tool invocation in seconds
    #[arg(long, env = "COMPRESSION_TOOL_TIMEOUT_SECS", default_value_t = 120)]
    pub tool_timeout: u64,

    // Where temporary input/output documents are written
    #[arg(long, env = "COMPRESSION_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    #[arg(long, env = "RAZORPAY_KEY_ID")]
    pub razorpay_key_id: Option<String>,

    #[arg(long, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    pub razorpay_key_secret: Option<String>,

    #[arg(long, env = "RAZORPAY_API_BASE", default_value = "https://api.razorpay.com")]
    pub razorpay_api_base: String,

    // Lifetime upgrade price in the currency's minor unit (paise for INR)
    #[arg(long, env = "PRO_PRICE_MINOR", default_value_t = 9000)]
    pub pro_price: u64,

    #[arg(long, env = "PRO_CURRENCY", default_value = "INR")]
    pub currency: String,

    // Browser origins allowed to call the API (comma-separated)
    #[arg(
        long = "cors-origin",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://127.0.0.1:3000"
    )]
    pub cors_origins: Vec<String>,
}

impl Args {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    // Configured tool list, or the platform's Ghostscript names when none given
    pub fn tool_candidates(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .tools
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if configured.is_empty() {
            default_tool_candidates()
        } else {
            configured
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

pub fn default_tool_candidates() -> Vec<String> {
    if cfg!(windows) {
        vec!["gswin64c".to_string(), "gswin32c".to_string()]
    } else {
        vec!["gs".to_string()]
    }
}
