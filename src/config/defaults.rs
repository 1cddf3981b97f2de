//! Default values for configuration

/// Default portal base URL
pub fn default_portal_url() -> String {
    "https://lisweb.loudoun.gov/PAXSubscription/".to_string()
}

/// Default search page path relative to the portal base
pub fn default_search_path() -> String {
    "views/search".to_string()
}

/// Default environment variable name for the portal username
pub fn default_username_env() -> String {
    "TITLESCOUT_PORTAL_USERNAME".to_string()
}

/// Default environment variable name for the portal password
pub fn default_password_env() -> String {
    "TITLESCOUT_PORTAL_PASSWORD".to_string()
}

/// Default document-category leaves ticked on the search form: the deed
/// sub-types under the expanded deeds node
pub fn default_category_items() -> Vec<String> {
    vec![
        "#cat2 > ul > li:nth-child(41) > a".to_string(),
        "#cat2 > ul > li:nth-child(60) > a".to_string(),
    ]
}

/// Default bounded-wait timeout for portal readiness signals (seconds)
pub fn default_wait_timeout_secs() -> u64 {
    20
}

/// Default settle wait after asynchronous UI updates (milliseconds)
pub fn default_settle_wait_ms() -> u64 {
    2000
}

/// Default page load timeout for the browser session (milliseconds)
pub fn default_page_load_timeout_ms() -> u64 {
    30000
}

/// Default: run the browser headless
pub fn default_headless() -> bool {
    true
}

/// Default download timeout in seconds
pub fn default_download_timeout() -> u64 {
    60
}

/// Default rasterization resolution for OCR (DPI)
pub fn default_ocr_dpi() -> u32 {
    300
}

/// Default OCR language
pub fn default_ocr_language() -> String {
    "eng".to_string()
}

/// Default token budget per extraction chunk
pub fn default_max_chunk_tokens() -> usize {
    2000
}

/// Default character slice length when tokenization is unavailable
pub fn default_fallback_chunk_chars() -> usize {
    4000
}

/// Default completion model
pub fn default_model() -> String {
    "gpt-4".to_string()
}

/// Default completion API base URL
pub fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Default environment variable name for the completion API key
pub fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default completion token ceiling per request
pub fn default_max_completion_tokens() -> usize {
    500
}

/// Default completion temperature
pub fn default_temperature() -> f32 {
    0.1
}

/// Default scraped-rows output file name
pub fn default_rows_file() -> String {
    "scrape_results.csv".to_string()
}

/// Default extraction-records output file name
pub fn default_extractions_file() -> String {
    "extraction_results.csv".to_string()
}
