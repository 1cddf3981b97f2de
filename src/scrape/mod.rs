//! Portal scrape stage
//!
//! Drives the records portal through a `PortalSurface`: log in, submit the
//! month-to-date search, then walk the paginated results grid. Each row is an
//! independent unit of work; a row is skipped when the store already holds an
//! artifact for it, and a failed row never stops the sweep.

pub mod download;
pub mod portal;

pub use download::Downloader;
pub use portal::{ChromiumPortal, LinkRef, Locator, PortalSurface};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::status::{RunStatus, Stage, WorkOutcome};
use crate::store::{resolve_identity, ArtifactStore};
use chrono::{Datelike, Local};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Scraped grid contents: the header row plus every newly saved data row
#[derive(Debug, Clone, Default)]
pub struct RowTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Statistics from a scrape sweep
#[derive(Debug, Default, Clone)]
pub struct ScrapeStats {
    pub pages_visited: u32,
    pub rows_seen: usize,
    pub rows_skipped: usize,
    pub rows_saved: usize,
    pub rows_failed: usize,
    pub pdfs_downloaded: usize,
}

/// Run the full scrape sweep: login, search, and paginated row processing.
pub async fn run_scrape(
    surface: &dyn PortalSurface,
    config: &Config,
    store: &mut ArtifactStore,
    downloader: &Downloader,
    status: &mut RunStatus,
) -> Result<(RowTable, ScrapeStats)> {
    status.begin_stage(Stage::Scrape, 0);

    let wait = Duration::from_secs(config.browser.wait_timeout_secs);
    let settle = Duration::from_millis(config.browser.settle_wait_ms);
    let sel = &config.portal.selectors;

    surface.set_download_dir(store.dir()).await?;

    login(surface, config, wait).await?;
    status.log("Logged in to portal");

    submit_search(surface, config, wait, settle).await?;
    status.log("Search submitted");

    let mut table = RowTable {
        headers: surface.texts(&sel.header_cells).await?,
        rows: Vec::new(),
    };
    let mut stats = ScrapeStats::default();

    let mut page_number: u32 = 1;
    loop {
        stats.pages_visited = page_number;
        surface.wait_present(&sel.results_rows, wait).await?;
        let row_count = surface.count(&sel.results_rows).await?;
        debug!("Page {}: {} rows", page_number, row_count);

        for row_index in 0..row_count {
            stats.rows_seen += 1;
            let row_css = format!("{}:nth-child({})", sel.results_rows, row_index + 1);
            let cells = surface.texts(&format!("{} td", row_css)).await?;
            let identity = resolve_identity(&cells, row_index, page_number);

            if store.exists_for(&identity) {
                debug!("Skipping {}: artifact already stored", identity);
                stats.rows_skipped += 1;
                continue;
            }

            let outcome = process_row(
                surface, config, store, downloader, &row_css, &identity, cells, wait, settle,
            )
            .await;
            match outcome {
                WorkOutcome::Saved((row, downloaded)) => {
                    stats.rows_saved += 1;
                    stats.pdfs_downloaded += downloaded;
                    table.rows.push(row);
                }
                WorkOutcome::Skipped(reason) => {
                    stats.rows_skipped += 1;
                    debug!("Skipping {}: {}", identity, reason);
                }
                WorkOutcome::Failed(reason) => {
                    stats.rows_failed += 1;
                    warn!("Row {} failed: {}", identity, reason);
                    status.log(&format!("Row {} failed: {}", identity, reason));
                }
            }
        }

        if !advance_page(surface, config, page_number, wait, settle).await? {
            break;
        }
        page_number += 1;
    }

    status.log(&format!(
        "Scrape complete: {} rows saved, {} skipped, {} failed across {} pages",
        stats.rows_saved, stats.rows_skipped, stats.rows_failed, stats.pages_visited
    ));
    Ok((table, stats))
}

/// Log in with credentials from the environment. Any failure here is fatal
/// for the stage; nothing downstream can proceed without a session.
async fn login(surface: &dyn PortalSurface, config: &Config, wait: Duration) -> Result<()> {
    let (username, password) = config.portal_credentials()?;
    let sel = &config.portal.selectors;

    surface.goto(&config.portal.base_url).await?;
    surface
        .wait_present(&sel.username_field, wait)
        .await
        .map_err(|e| Error::Login(format!("Login form did not appear: {}", e)))?;

    surface.fill(&sel.username_field, &username).await?;
    surface.fill(&sel.password_field, &password).await?;
    surface.activate(&Locator::Css(sel.login_button.clone())).await?;

    // The search page is only reachable with a valid session
    let search_url = search_url(config)?;
    surface.goto(&search_url).await?;
    surface
        .wait_present(&sel.advanced_search_button, wait)
        .await
        .map_err(|e| Error::Login(format!("Search page did not load after login: {}", e)))
}

fn search_url(config: &Config) -> Result<String> {
    let base = Url::parse(&config.portal.base_url)?;
    Ok(base.join(&config.portal.search_path)?.to_string())
}

/// Fill the advanced search form with the month-to-date window and submit.
///
/// The from-date is day 1 of the previous calendar month page shown by the
/// picker; the to-date is today.
async fn submit_search(
    surface: &dyn PortalSurface,
    config: &Config,
    wait: Duration,
    settle: Duration,
) -> Result<()> {
    let sel = &config.portal.selectors;

    surface
        .activate(&Locator::Css(sel.advanced_search_button.clone()))
        .await?;
    surface.settle(settle).await;

    if !config.portal.category_items.is_empty() {
        surface
            .activate(&Locator::Css(sel.category_expander.clone()))
            .await?;
        surface.settle(settle).await;
        for item in &config.portal.category_items {
            surface.activate(&Locator::Css(item.clone())).await?;
        }
    }

    surface
        .activate(&Locator::Css(sel.from_date_input.clone()))
        .await?;
    surface.wait_present(&sel.datepicker, wait).await?;
    surface
        .activate(&Locator::Css(sel.datepicker_prev.clone()))
        .await?;
    surface
        .activate(&Locator::DayCell {
            calendar: sel.datepicker.clone(),
            day: 1,
        })
        .await?;

    surface
        .activate(&Locator::Css(sel.to_date_input.clone()))
        .await?;
    surface.wait_present(&sel.datepicker, wait).await?;
    surface
        .activate(&Locator::DayCell {
            calendar: sel.datepicker.clone(),
            day: Local::now().day(),
        })
        .await?;

    surface
        .activate(&Locator::Css(sel.summary_search_button.clone()))
        .await?;
    surface.wait_present(&sel.results_table, wait).await?;
    surface.settle(settle).await;
    Ok(())
}

/// Open one grid row's document viewer and save its PDFs.
///
/// The row is Saved only if, by the end, the store holds an artifact matching
/// its identity; everything in between degrades gracefully.
#[allow(clippy::too_many_arguments)]
async fn process_row(
    surface: &dyn PortalSurface,
    config: &Config,
    store: &mut ArtifactStore,
    downloader: &Downloader,
    row_css: &str,
    identity: &str,
    cells: Vec<String>,
    wait: Duration,
    settle: Duration,
) -> WorkOutcome<(Vec<String>, usize)> {
    let sel = &config.portal.selectors;

    if let Err(e) = surface.double_activate(row_css).await {
        return WorkOutcome::Failed(format!("could not open viewer: {}", e));
    }

    // Viewer readiness is best effort; some documents render without the
    // container and still expose links
    if let Err(e) = surface.wait_present(&sel.viewer_container, wait).await {
        warn!("Viewer did not appear for {}: {}", identity, e);
    } else if let Err(e) = surface.wait_present(&sel.viewer_page, wait).await {
        warn!("Viewer pages did not render for {}: {}", identity, e);
    }
    surface.settle(settle).await;

    let mut downloaded = 0;
    match surface.link_refs(&sel.pdf_links).await {
        Ok(links) => {
            for link in links {
                let suggested = if link.text.is_empty() {
                    identity.to_string()
                } else {
                    link.text.clone()
                };
                match downloader.download(&link.href, &suggested, store, identity).await {
                    Ok(_) => downloaded += 1,
                    Err(e) => warn!("Download of {} failed: {}", link.href, e),
                }
            }
        }
        Err(e) => warn!("Link harvest failed for {}: {}", identity, e),
    }

    // The viewer's save control triggers a browser download into the store
    // directory; it is driven for every row that exposes it, in addition to
    // any harvested links
    if let Ok(true) = surface.is_present(&sel.save_image_link).await {
        downloaded += save_image_export(surface, store, identity, sel, settle).await;
    }

    if let Err(e) = surface.back().await {
        warn!("Return to results grid failed for {}: {}", identity, e);
    }
    if let Err(e) = surface.wait_present(&sel.results_table, wait).await {
        return WorkOutcome::Failed(format!("results grid lost after viewer: {}", e));
    }

    if store.exists_for(identity) {
        info!("Saved row {}: {} PDFs", identity, downloaded);
        WorkOutcome::Saved((cells, downloaded))
    } else {
        WorkOutcome::Failed("no artifact stored for row".to_string())
    }
}

/// Click the save-image control and adopt whatever new PDFs land in the
/// store directory, renaming them under the row identity.
async fn save_image_export(
    surface: &dyn PortalSurface,
    store: &mut ArtifactStore,
    identity: &str,
    sel: &crate::config::PortalSelectors,
    settle: Duration,
) -> usize {
    let before: std::collections::HashSet<_> = match store.list_pdfs() {
        Ok(pdfs) => pdfs.into_iter().collect(),
        Err(e) => {
            warn!("Store listing failed before save-image: {}", e);
            return 0;
        }
    };

    if let Err(e) = surface.activate(&Locator::Css(sel.save_image_link.clone())).await {
        warn!("Save-image control failed for {}: {}", identity, e);
        return 0;
    }
    // The browser writes the file asynchronously
    surface.settle(settle).await;
    surface.settle(settle).await;

    let after = match store.list_pdfs() {
        Ok(pdfs) => pdfs,
        Err(e) => {
            warn!("Store listing failed after save-image: {}", e);
            return 0;
        }
    };

    let mut adopted = 0;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    for path in after.into_iter().filter(|p| !before.contains(p)) {
        let new_name = store.unique_name(&format!("{}_saved_image_{}.pdf", identity, stamp));
        let new_path = store.dir().join(&new_name);
        if let Err(e) = std::fs::rename(&path, &new_path) {
            warn!("Failed to rename saved image {}: {}", path.display(), e);
            continue;
        }
        match store.record(identity, &new_name) {
            Ok(()) => adopted += 1,
            Err(e) => warn!("Failed to record saved image {}: {}", new_name, e),
        }
    }
    adopted
}

/// Advance to the next results page. Returns false when pagination is done:
/// the next control is missing or carries the disabled class.
async fn advance_page(
    surface: &dyn PortalSurface,
    config: &Config,
    page_number: u32,
    wait: Duration,
    settle: Duration,
) -> Result<bool> {
    let sel = &config.portal.selectors;

    if !surface.is_present(&sel.next_button).await? {
        return Ok(false);
    }
    if let Some(classes) = surface.class_of(&sel.next_button).await? {
        if classes.split_whitespace().any(|c| c == sel.next_disabled_class) {
            return Ok(false);
        }
    }

    // Mark the current grid so the re-render after the click is observable
    let token = format!("page-{}", page_number);
    surface.mark(&sel.results_table, &token).await?;
    surface.activate(&Locator::Css(sel.next_button.clone())).await?;
    surface.wait_unmarked(&sel.results_table, &token, wait).await?;
    surface.settle(settle).await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted single-page portal: fixed headers, a few rows, optionally a
    /// PDF link and a save-image control exposed by the viewer of whichever
    /// row is opened. Activating the save-image control drops a file into
    /// the configured download directory, like the real browser would.
    struct FakePortal {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        pdf_url: Option<String>,
        save_image: bool,
        download_dir: Mutex<Option<std::path::PathBuf>>,
        opened_rows: Mutex<Vec<String>>,
        exports: Mutex<usize>,
    }

    impl FakePortal {
        fn new(rows: Vec<Vec<String>>, pdf_url: Option<&str>, save_image: bool) -> Self {
            Self {
                headers: vec![
                    "Instrument".to_string(),
                    "Name".to_string(),
                    "Recorded".to_string(),
                ],
                rows,
                pdf_url: pdf_url.map(String::from),
                save_image,
                download_dir: Mutex::new(None),
                opened_rows: Mutex::new(Vec::new()),
                exports: Mutex::new(0),
            }
        }

        fn row_for_css(&self, css: &str) -> Option<&Vec<String>> {
            let idx = css.split("nth-child(").nth(1)?.split(')').next()?;
            let idx: usize = idx.parse().ok()?;
            self.rows.get(idx - 1)
        }
    }

    #[async_trait]
    impl PortalSurface for FakePortal {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn back(&self) -> Result<()> {
            Ok(())
        }

        async fn set_download_dir(&self, dir: &Path) -> Result<()> {
            *self.download_dir.lock().unwrap() = Some(dir.to_path_buf());
            Ok(())
        }

        async fn fill(&self, _css: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        async fn activate(&self, locator: &Locator) -> Result<()> {
            if let Locator::Css(css) = locator {
                if css == "#lnkSaveImage" {
                    let mut exports = self.exports.lock().unwrap();
                    *exports += 1;
                    let dir = self.download_dir.lock().unwrap().clone().unwrap();
                    std::fs::write(
                        dir.join(format!("export_{}.pdf", exports)),
                        format!("%PDF-1.4 export {}", exports),
                    )
                    .unwrap();
                }
            }
            Ok(())
        }

        async fn double_activate(&self, css: &str) -> Result<()> {
            self.opened_rows.lock().unwrap().push(css.to_string());
            Ok(())
        }

        async fn wait_present(&self, _css: &str, _wait: Duration) -> Result<()> {
            Ok(())
        }

        async fn is_present(&self, css: &str) -> Result<bool> {
            Ok(self.save_image && css == "#lnkSaveImage")
        }

        async fn count(&self, _css: &str) -> Result<usize> {
            Ok(self.rows.len())
        }

        async fn texts(&self, css: &str) -> Result<Vec<String>> {
            if css.contains("thead") {
                return Ok(self.headers.clone());
            }
            Ok(self.row_for_css(css).cloned().unwrap_or_default())
        }

        async fn link_refs(&self, _css: &str) -> Result<Vec<LinkRef>> {
            Ok(self
                .pdf_url
                .iter()
                .map(|url| LinkRef {
                    href: url.clone(),
                    text: String::new(),
                })
                .collect())
        }

        async fn class_of(&self, _css: &str) -> Result<Option<String>> {
            // Single page of results
            Ok(Some("paginate_button next disabled".to_string()))
        }

        async fn mark(&self, _css: &str, _token: &str) -> Result<()> {
            Ok(())
        }

        async fn wait_unmarked(&self, _css: &str, _token: &str, _wait: Duration) -> Result<()> {
            Ok(())
        }

        async fn settle(&self, _wait: Duration) {}
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.browser.settle_wait_ms = 0;
        config.portal.username_env = "TS_TEST_SCRAPE_USER".to_string();
        config.portal.password_env = "TS_TEST_SCRAPE_PASS".to_string();
        std::env::set_var("TS_TEST_SCRAPE_USER", "user");
        std::env::set_var("TS_TEST_SCRAPE_PASS", "pass");
        config
    }

    #[tokio::test]
    async fn test_sweep_skips_stored_rows_and_saves_new_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 new".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        // Row A's artifact is already in the store
        std::fs::write(tmp.path().join("DEED_2024_001.pdf"), b"old").unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();

        let portal = FakePortal::new(
            vec![
                vec!["DEED_2024_001".to_string(), "Jane Doe".to_string()],
                vec!["DEED_2024_002".to_string(), "John Smith".to_string()],
            ],
            Some(&format!("{}/doc.pdf", server.uri())),
            false,
        );
        let downloader = Downloader::new(10).unwrap();
        let config = test_config();
        let mut status = RunStatus::default();
        status.start();

        let (table, stats) =
            run_scrape(&portal, &config, &mut store, &downloader, &mut status)
                .await
                .unwrap();

        assert_eq!(stats.rows_seen, 2);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.rows_saved, 1);
        assert_eq!(stats.rows_failed, 0);
        assert_eq!(stats.pdfs_downloaded, 1);
        assert_eq!(stats.pages_visited, 1);

        // Only the new row appears in the output table
        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "DEED_2024_002");

        // Only row B's viewer was opened
        assert_eq!(portal.opened_rows.lock().unwrap().len(), 1);
        assert!(store.exists_for("DEED_2024_002"));
    }

    #[tokio::test]
    async fn test_save_image_export_adopts_browser_download() {
        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();

        // No harvestable links; the save-image control is the only source
        let portal = FakePortal::new(
            vec![vec!["DEED_2024_003".to_string(), "Jane Doe".to_string()]],
            None,
            true,
        );
        let downloader = Downloader::new(10).unwrap();
        let config = test_config();
        let mut status = RunStatus::default();
        status.start();

        let (table, stats) =
            run_scrape(&portal, &config, &mut store, &downloader, &mut status)
                .await
                .unwrap();

        assert_eq!(stats.rows_saved, 1);
        assert_eq!(stats.pdfs_downloaded, 1);
        assert_eq!(table.rows.len(), 1);
        assert!(store.exists_for("DEED_2024_003"));

        // The browser's file was renamed under the row identity
        let names: Vec<String> = store
            .list_pdfs()
            .unwrap()
            .into_iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        assert!(names.iter().any(|n| n.starts_with("DEED_2024_003_saved_image_")));
    }

    #[tokio::test]
    async fn test_save_image_runs_even_after_link_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 linked".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();

        let portal = FakePortal::new(
            vec![vec!["DEED_2024_004".to_string(), "John Smith".to_string()]],
            Some(&format!("{}/doc.pdf", server.uri())),
            true,
        );
        let downloader = Downloader::new(10).unwrap();
        let config = test_config();
        let mut status = RunStatus::default();
        status.start();

        let (_, stats) = run_scrape(&portal, &config, &mut store, &downloader, &mut status)
            .await
            .unwrap();

        // Both the harvested link and the export were saved
        assert_eq!(stats.rows_saved, 1);
        assert_eq!(stats.pdfs_downloaded, 2);
        assert_eq!(*portal.exports.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_grid_produces_empty_table() {
        let tmp = TempDir::new().unwrap();
        let mut store = ArtifactStore::open(tmp.path()).unwrap();
        let portal = FakePortal::new(Vec::new(), None, false);
        let downloader = Downloader::new(10).unwrap();
        let config = test_config();
        let mut status = RunStatus::default();
        status.start();

        let (table, stats) =
            run_scrape(&portal, &config, &mut store, &downloader, &mut status)
                .await
                .unwrap();

        assert!(table.rows.is_empty());
        assert_eq!(stats.rows_seen, 0);
        assert_eq!(stats.pages_visited, 1);
    }
}
