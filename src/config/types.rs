use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Council-Harvest
///
/// Every section and every field is optional in the TOML file; missing
/// values fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub throttle: ThrottleConfig,
    pub collection: CollectionConfig,
    pub output: OutputConfig,
}

/// Remote source location and HTTP identity
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base URL every relative link is resolved against
    pub base_url: String,

    /// Path of the page listing all council members
    pub members_path: String,

    /// Path of the index page linking each member's detailed documents
    pub index_path: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-attempt request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.camarabotucatu.sp.gov.br".to_string(),
            members_path: "/Vereador".to_string(),
            index_path: "/Consulta/Vereadores/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Request pacing and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ThrottleConfig {
    /// Minimum time between outbound requests (milliseconds)
    pub request_delay_ms: u64,

    /// Pause after each entity of a phase (milliseconds)
    pub batch_delay_ms: u64,

    /// Pause between individual documents of one entity (milliseconds)
    pub document_delay_ms: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base; attempt `n` sleeps `retry_delay * 2^n` (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1000,
            batch_delay_ms: 10_000,
            document_delay_ms: 500,
            max_retries: 3,
            retry_delay_ms: 5000,
        }
    }
}

impl ThrottleConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn document_delay(&self) -> Duration {
        Duration::from_millis(self.document_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// What gets collected and how it is batched
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CollectionConfig {
    /// Detailed documents dated before this year are skipped
    pub min_year: i32,

    /// Buffered records that trigger a batch flush
    pub flush_threshold: usize,

    /// Length of the rankings in the final report
    pub top_n: usize,

    /// Drop index entries for members on leave ("Licenciado/a")
    pub skip_inactive: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            min_year: 2021,
            flush_threshold: 100,
            top_n: 5,
            skip_inactive: true,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Directory member photos are written to
    pub image_dir: String,

    /// Directory the metrics JSON is written to at cleanup
    pub metrics_dir: String,

    /// Optional markdown report; empty disables it
    pub report_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "council.db".to_string(),
            image_dir: "img".to_string(),
            metrics_dir: "data".to_string(),
            report_path: String::new(),
        }
    }
}

impl OutputConfig {
    pub fn report_path(&self) -> Option<PathBuf> {
        if self.report_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.report_path))
        }
    }
}
