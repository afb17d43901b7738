use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const DEFAULT_START_URLS: &[&str] = &[
    "https://obluda.fandom.com/wiki/Category:Characters",
    "https://nana.fandom.com/wiki/Category:Characters",
    "https://dr-stone.fandom.com/wiki/Category:Characters",
    "https://madeinabyss.fandom.com/wiki/Category:Characters",
    "https://dandadan.fandom.com/wiki/Category:Characters",
    "https://kaichouwamaidsama.fandom.com/wiki/Category:Characters",
    "https://ao-haru-ride.fandom.com/wiki/Category:Characters",
    "https://sayiloveyou.fandom.com/wiki/Category:Characters",
    "https://kiminitodoke.fandom.com/wiki/Category:Characters",
    "https://watashi-ga-motete-dousunda.fandom.com/wiki/Category:Characters",
    "https://bokudakegainaimachi.fandom.com/wiki/Category:Characters",
    "https://violet-evergarden.fandom.com/wiki/Category:Characters",
    "https://ansatsukyoshitsu.fandom.com/wiki/Category:Characters",
    "https://fruitsbasket.fandom.com/wiki/Category:Characters",
    "https://detectiveconan.fandom.com/wiki/Category:Characters",
    "https://dragonball.fandom.com/wiki/Category:Characters",
    "https://codegeass.fandom.com/wiki/Category:Characters",
    "https://gintama.fandom.com/wiki/Category:Characters",
    "https://swordartonline.fandom.com/wiki/Category:Characters",
    "https://noragami.fandom.com/wiki/Category:Characters",
    "https://mob-psycho-100.fandom.com/wiki/Category:Characters",
    "https://vinlandsaga.fandom.com/wiki/Category:Characters",
    "https://shigatsu-wa-kimi-no-uso.fandom.com/wiki/Category:Characters",
    "https://tokyorevengers.fandom.com/wiki/Category:Characters",
];

/// Process-wide settings, read once from `CRAWLER_*` environment variables
/// and passed by reference from `main`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,
    #[serde(default = "default_true")]
    pub run_crawl: bool,
    #[serde(default = "default_start_urls")]
    pub start_urls: Vec<String>,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://data/characters.sqlite".into()
}

fn default_json_path() -> PathBuf {
    PathBuf::from("data/characters.json")
}

fn default_true() -> bool {
    true
}

fn default_start_urls() -> Vec<String> {
    DEFAULT_START_URLS.iter().map(|s| s.to_string()).collect()
}

fn default_allowed_domains() -> Vec<String> {
    vec!["fandom.com".into()]
}

fn default_concurrency() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("fandom_crawler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix("CRAWLER"))
    }

    fn from_environment(env: Environment) -> Result<Self> {
        Config::builder()
            .add_source(
                env.try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("start_urls")
                    .with_list_parse_key("allowed_domains"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Invalid CRAWLER_* configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether `run` crawls before loading. `--no-crawl` and
    /// `CRAWLER_RUN_CRAWL=false` both turn it off.
    pub fn crawl_before_load(&self, no_crawl: bool) -> bool {
        self.run_crawl && !no_crawl
    }
}
