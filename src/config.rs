use clap::Parser;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "clinic-gateway")]
#[command(
    about = "Rate-limited API gateway for the clinic's AI assistants, admin tools and webhooks"
)]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window (public AI endpoints)
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    // Distinct identifiers kept before the whole table is cleared
    #[arg(long, default_value_t = 10_000)]
    pub rate_limit_max_entries: usize,

    // Shared secret for /api/admin/*
    #[arg(long, env = "ADMIN_ACCESS_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    // Webhook HMAC secret; takes precedence over --webhook-secret
    #[arg(long, env = "VERCEL_WEBHOOK_SECRET", hide_env_values = true)]
    pub vercel_webhook_secret: Option<String>,

    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    // No key means every assistant runs on its keyword fallback
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    #[arg(long, default_value = "gpt-4o-mini")]
    pub llm_model: String,

    // Upper bound on a single LLM call in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub llm_timeout_ms: u64,

    // Phone number quoted in every recommendation
    #[arg(long, default_value = "+91-9778280044")]
    pub clinic_phone: String,

    // Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn admin_key(&self) -> Option<&str> {
        non_empty(self.admin_key.as_deref())
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        non_empty(self.vercel_webhook_secret.as_deref())
            .or_else(|| non_empty(self.webhook_secret.as_deref()))
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        non_empty(self.llm_api_key.as_deref())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
