//! Configuration management for titlescout
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! Credentials are never stored in the config file; only the names of the
//! environment variables that carry them are.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Portal connection and selector configuration
    #[serde(default)]
    pub portal: PortalConfig,

    /// Browser session configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Download stage configuration
    #[serde(default)]
    pub download: DownloadConfig,

    /// OCR normalization configuration
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Field extraction configuration
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Tabular output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Portal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal base URL (login page)
    #[serde(default = "default_portal_url")]
    pub base_url: String,

    /// Search page path relative to the base URL
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Environment variable name holding the portal username
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Environment variable name holding the portal password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Document-category leaf controls to tick on the search form
    #[serde(default = "default_category_items")]
    pub category_items: Vec<String>,

    /// Element selectors for the portal DOM
    #[serde(default)]
    pub selectors: PortalSelectors,
}

/// CSS selectors for every portal control the scrape driver touches.
///
/// These are the fragile half of the portal contract; the state machine in
/// `scrape` only ever sees them through this block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSelectors {
    pub username_field: String,
    pub password_field: String,
    pub login_button: String,
    pub advanced_search_button: String,
    pub category_expander: String,
    pub from_date_input: String,
    pub to_date_input: String,
    pub datepicker: String,
    pub datepicker_prev: String,
    pub summary_search_button: String,
    pub results_table: String,
    pub results_rows: String,
    pub header_cells: String,
    pub viewer_container: String,
    pub viewer_page: String,
    pub pdf_links: String,
    pub save_image_link: String,
    pub next_button: String,
    /// Class substring that marks the next button as disabled
    pub next_disabled_class: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username_field: "#txtUsername".to_string(),
            password_field: "#txtPassword".to_string(),
            login_button: "#btnLogin".to_string(),
            advanced_search_button: "#btnCriteriaAdvancedNameSearch".to_string(),
            category_expander: "#cat2 > i.jstree-ocl".to_string(),
            from_date_input: "#dtFrom".to_string(),
            to_date_input: "#dtTo".to_string(),
            datepicker: "#ui-datepicker-div".to_string(),
            datepicker_prev: "#ui-datepicker-div .ui-datepicker-prev".to_string(),
            summary_search_button: "#btnSummarySearch".to_string(),
            results_table: "#gridResults".to_string(),
            results_rows: "#gridResults tbody tr".to_string(),
            header_cells: "#gridResults thead th".to_string(),
            viewer_container: "#viewerContainer".to_string(),
            viewer_page: "#viewerContainer .page".to_string(),
            pdf_links: "a[href*='.pdf' i], a[href*='PDF']".to_string(),
            save_image_link: "#lnkSaveImage".to_string(),
            next_button: "#gridResults_next".to_string(),
            next_disabled_class: "disabled".to_string(),
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable the browser sandbox (required in some Docker/CI environments)
    #[serde(default)]
    pub no_sandbox: bool,

    /// Page load timeout (milliseconds)
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,

    /// Bounded wait for DOM readiness signals (seconds)
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Fixed settle wait after asynchronous UI updates (milliseconds)
    #[serde(default = "default_settle_wait_ms")]
    pub settle_wait_ms: u64,
}

/// Download stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Request timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

/// OCR normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Rasterization resolution (DPI)
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,

    /// OCR language code
    #[serde(default = "default_ocr_language")]
    pub language: String,
}

/// Field extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Completion model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion API base URL (OpenAI-compatible)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Environment variable name holding the completion API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Token budget per chunk
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,

    /// Character slice length when tokenization is unavailable
    #[serde(default = "default_fallback_chunk_chars")]
    pub fallback_chunk_chars: usize,

    /// Completion token ceiling per request
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: usize,

    /// Completion temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Path to a tokenizer.json compatible with the target model.
    /// When absent or unloadable the chunker falls back to character slicing.
    #[serde(default)]
    pub tokenizer_file: Option<PathBuf>,
}

/// Tabular output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Scraped-rows output file name (relative to the base dir)
    #[serde(default = "default_rows_file")]
    pub rows_file: String,

    /// Extraction-records output file name (relative to the base dir)
    #[serde(default = "default_extractions_file")]
    pub extractions_file: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for titlescout data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// PDF store directory
    pub store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            browser: BrowserConfig::default(),
            download: DownloadConfig::default(),
            ocr: OcrConfig::default(),
            extract: ExtractConfig::default(),
            output: OutputConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_url(),
            search_path: default_search_path(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            category_items: default_category_items(),
            selectors: PortalSelectors::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            no_sandbox: false,
            page_load_timeout_ms: default_page_load_timeout_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            settle_wait_ms: default_settle_wait_ms(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: default_ocr_dpi(),
            language: default_ocr_language(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            max_chunk_tokens: default_max_chunk_tokens(),
            fallback_chunk_chars: default_fallback_chunk_chars(),
            max_completion_tokens: default_max_completion_tokens(),
            temperature: default_temperature(),
            tokenizer_file: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rows_file: default_rows_file(),
            extractions_file: default_extractions_file(),
        }
    }
}

impl Config {
    /// Get the default base directory for titlescout (~/.titlescout)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".titlescout")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            store_dir: base.join("pdfs"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            store_dir: base.join("pdfs"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        Ok(())
    }

    /// Get the portal credentials from the environment
    pub fn portal_credentials(&self) -> Result<(String, String)> {
        let username = std::env::var(&self.portal.username_env).map_err(|_| {
            Error::Config(format!(
                "Portal username not set: export {}",
                self.portal.username_env
            ))
        })?;
        let password = std::env::var(&self.portal.password_env).map_err(|_| {
            Error::Config(format!(
                "Portal password not set: export {}",
                self.portal.password_env
            ))
        })?;
        Ok((username, password))
    }

    /// Get the completion API key from the environment
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.extract.api_key_env).map_err(|_| {
            Error::Config(format!(
                "Completion API key not set: export {}",
                self.extract.api_key_env
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extract.max_chunk_tokens == 0 {
            return Err(Error::Config(
                "extract.max_chunk_tokens must be positive".to_string(),
            ));
        }

        if self.extract.fallback_chunk_chars == 0 {
            return Err(Error::Config(
                "extract.fallback_chunk_chars must be positive".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.extract.temperature) {
            return Err(Error::Config(
                "extract.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.ocr.dpi == 0 {
            return Err(Error::Config("ocr.dpi must be positive".to_string()));
        }

        if self.browser.wait_timeout_secs == 0 {
            return Err(Error::Config(
                "browser.wait_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
