mod artifact;
mod canvas;
mod debug;
mod error;
mod font;
mod images;
mod inspect;
mod layout;
mod metrics;
mod pdf;
mod record;
mod stamp;
mod types;
mod wrap;

pub use artifact::{Artifact, FALLBACK_FILE_STEM, file_name_for};
pub use canvas::{Canvas, Command, Document, Page};
pub use debug::DebugLogger;
pub use error::{ImageLoadError, ReportError};
pub use font::{FontFace, TextFont};
pub use images::{FsImageLoader, ImageLoader, LoadedImage, MemoryImageLoader, parse_data_uri};
pub use inspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
};
pub use layout::{
    Cursor, DESCRIPTION_LABEL_TEXT, IMAGE_MARKER_TEXT, LOGO_MARKER_TEXT, LayoutConfig,
    LayoutStats, STEPS_LABEL_TEXT, TITLE_TEXT, fit_image, layout_document, status_color,
};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use pdf::{PdfOptions, document_to_pdf, document_to_pdf_with_metrics, write_document};
pub use record::{
    CREATED_AT_FORMAT, ConfidentialityLevel, ImageSource, Record, Scenario, ScenarioId, Step,
    StepId, StepStatus,
};
pub use stamp::{finish_pages, footer_text};
pub use types::{Color, Pt, Size};
pub use wrap::{block_height, wrap_text};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Renders test-evidence records into watermarked, paginated PDFs.
///
/// One engine can serve any number of renders, including concurrent ones:
/// all mutable layout state lives inside a single `render` call.
pub struct EvidenceReport {
    config: LayoutConfig,
    title: Option<String>,
    retain_document: bool,
    debug: Option<Arc<DebugLogger>>,
}

#[derive(Clone)]
pub struct EvidenceReportBuilder {
    config: LayoutConfig,
    title: Option<String>,
    retain_document: bool,
    debug_path: Option<PathBuf>,
}

impl EvidenceReport {
    pub fn builder() -> EvidenceReportBuilder {
        EvidenceReportBuilder::new()
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    fn pdf_options_for(&self, record: &Record) -> PdfOptions {
        let title = self.title.clone().unwrap_or_else(|| {
            let work_item = record.work_item_id.trim();
            if work_item.is_empty() {
                TITLE_TEXT.to_string()
            } else {
                format!("{} - {}", TITLE_TEXT, work_item)
            }
        });
        PdfOptions { title: Some(title) }
    }

    /// Lays out and stamps the record without serializing it.
    pub async fn layout<L: ImageLoader>(&self, record: &Record, loader: &L) -> Document {
        let (document, _) = self.layout_with_stats(record, loader).await;
        document
    }

    async fn layout_with_stats<L: ImageLoader>(
        &self,
        record: &Record,
        loader: &L,
    ) -> (Document, LayoutStats) {
        let (mut document, stats) =
            layout_document(record, &self.config, loader, self.debug.as_deref()).await;
        finish_pages(
            &mut document,
            &record.confidentiality.watermark_text(),
            &self.config,
        );
        (document, stats)
    }

    /// Produces the named PDF for `record`. Image failures never fail the
    /// render; they show up as inline markers and in `metrics.image_failures`.
    pub async fn render<L: ImageLoader>(
        &self,
        record: &Record,
        loader: &L,
    ) -> Result<Artifact, ReportError> {
        let started = Instant::now();
        let (document, stats) = self.layout_with_stats(record, loader).await;
        let layout_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (bytes, pages) =
            document_to_pdf_with_metrics(&document, &self.pdf_options_for(record))?;
        let metrics = DocumentMetrics {
            pages,
            steps_rendered: stats.steps_rendered,
            image_failures: stats.image_failures,
            layout_ms,
            total_bytes: bytes.len(),
        };
        let artifact = Artifact {
            file_name: file_name_for(&record.work_item_id),
            page_count: document.page_count(),
            bytes,
            metrics,
            document: self.retain_document.then_some(document),
        };

        if let Some(logger) = self.debug.as_deref() {
            logger.log_event(serde_json::json!({
                "type": "render.summary",
                "file_name": artifact.file_name,
                "pages": artifact.page_count,
                "scenarios": stats.scenarios_rendered,
                "steps": stats.steps_rendered,
                "images_placed": stats.images_placed,
                "image_failures": stats.image_failures,
                "page_breaks": stats.page_breaks,
                "bytes": artifact.bytes.len(),
                "fingerprint": artifact.fingerprint(),
                "layout_ms": layout_ms,
            }));
            logger.increment("pages", artifact.page_count as u64);
        }
        self.emit_debug_summary("render");
        Ok(artifact)
    }

    /// Same as [`EvidenceReport::render`] for a record handed over as JSON.
    pub async fn render_json<L: ImageLoader>(
        &self,
        json: &str,
        loader: &L,
    ) -> Result<Artifact, ReportError> {
        let record = Record::from_json(json)?;
        self.render(&record, loader).await
    }
}

impl Default for EvidenceReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceReportBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
            title: None,
            retain_document: false,
            debug_path: None,
        }
    }

    /// Replaces every layout setting at once.
    pub fn layout_config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn margins_mm(mut self, left: f32, right: f32) -> Self {
        self.config.margin_left = Pt::from_mm(left);
        self.config.margin_right = Pt::from_mm(right);
        self
    }

    pub fn top_margin_mm(mut self, value: f32) -> Self {
        self.config.top_margin = Pt::from_mm(value);
        self
    }

    pub fn break_thresholds_mm(mut self, scenario: f32, step: f32) -> Self {
        self.config.scenario_break_threshold = Pt::from_mm(scenario);
        self.config.step_break_threshold = Pt::from_mm(step);
        self
    }

    pub fn image_max_mm(mut self, width: f32, height: f32) -> Self {
        self.config.image_max_width = Pt::from_mm(width);
        self.config.image_max_height = Pt::from_mm(height);
        self
    }

    pub fn watermark_opacity(mut self, opacity: f32) -> Self {
        self.config.watermark_opacity = opacity;
        self
    }

    // Off by default: a load that never resolves stalls the render.
    pub fn image_timeout(mut self, limit: Duration) -> Self {
        self.config.image_timeout = Some(limit);
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Keep the laid-out `Document` on the returned `Artifact`.
    pub fn retain_document(mut self, enabled: bool) -> Self {
        self.retain_document = enabled;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<EvidenceReport, ReportError> {
        self.config.validate()?;
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        Ok(EvidenceReport {
            config: self.config,
            title: self.title,
            retain_document: self.retain_document,
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::test_images::{png_bytes, png_data_uri};

    struct FailingLoader;

    impl ImageLoader for FailingLoader {
        async fn load(&self, source: &ImageSource) -> Result<Arc<LoadedImage>, ImageLoadError> {
            Err(ImageLoadError::NotFound(source.as_str().to_string()))
        }
    }

    fn logo_loader() -> MemoryImageLoader {
        let mut loader = MemoryImageLoader::new();
        loader
            .insert_bytes("/assets/logo1.png", &png_bytes(90, 45))
            .expect("logo 1");
        loader
            .insert_bytes("/assets/logo2.png", &png_bytes(80, 40))
            .expect("logo 2");
        loader
    }

    fn rel9_record() -> Record {
        let sentence = "Submit the login form with an expired password and verify that the \
            error banner explains the lockout policy and links to the reset flow. ";
        let long_description: String = sentence.chars().cycle().take(400).collect();
        Record::new("REL-9", "Ana Souza", ConfidentialityLevel::RestrictedConfidential)
            .with_logos("/assets/logo1.png", "/assets/logo2.png")
            .with_scenario(
                Scenario::new("Login flow")
                    .with_step(Step::with_created_at(
                        "Open login page",
                        StepStatus::Ok,
                        "02/03/2026, 09:15:00",
                    ))
                    .with_step(
                        Step::with_created_at(long_description, StepStatus::NotOk, "02/03/2026, 09:16:30")
                            .with_image(png_data_uri(640, 480)),
                    ),
            )
    }

    fn engine() -> EvidenceReport {
        EvidenceReport::builder()
            .retain_document(true)
            .build()
            .expect("engine")
    }

    fn assert_stamped(report: &PdfInspectReport, watermark: &str) {
        let total = report.page_count;
        for page in 1..=total {
            assert!(
                report.page_shows_text(page, &format!("Page {} of {}", page, total)),
                "footer missing on page {page}"
            );
            assert!(report.page_shows_text(page, watermark), "watermark missing on page {page}");
        }
    }

    #[tokio::test]
    async fn rel9_renders_wrapped_description_image_and_stamps() {
        let artifact = engine()
            .render(&rel9_record(), &logo_loader())
            .await
            .expect("render");
        assert_eq!(artifact.file_name, "REL-9.pdf");
        assert_eq!(artifact.metrics.steps_rendered, 2);
        assert_eq!(artifact.metrics.image_failures, 0);
        assert_eq!(artifact.metrics.total_bytes, artifact.bytes.len());

        let document = artifact.document.as_ref().expect("retained document");
        let value_x = Pt::from_mm(15.0)
            + Pt::from_mm(15.0)
            + TextFont::regular(10.0).measure(DESCRIPTION_LABEL_TEXT);
        let description_lines = document
            .pages
            .iter()
            .flat_map(|page| page.commands.iter())
            .filter(|cmd| matches!(cmd, Command::DrawString { x, .. } if *x == value_x))
            .count();
        assert!(description_lines > 2, "got {description_lines} description lines");
        // Two logos and the step image.
        assert_eq!(document.images.len(), 3);

        let report = inspect_pdf_bytes(&artifact.bytes).expect("inspect");
        assert_eq!(report.page_count, artifact.page_count);
        assert_eq!(report.title.as_deref(), Some("Software Test Report - REL-9"));
        assert!(report.page_shows_text(1, "Work Item: REL-9"));
        assert!(report.page_shows_text(1, "Status: NOT OK"));
        assert_stamped(&report, "RESTRICTED CONFIDENTIAL");
    }

    #[tokio::test]
    async fn rel9_step_two_moves_to_next_page_when_space_runs_out() {
        let mut config = LayoutConfig::default();
        // Leaves step 2 starting above the step threshold but with too
        // little room below it for the image estimate.
        config.last_field_gap = Pt::from_mm(80.0);
        let engine = EvidenceReport::builder()
            .layout_config(config.clone())
            .retain_document(true)
            .build()
            .expect("engine");
        let artifact = engine
            .render(&rel9_record(), &logo_loader())
            .await
            .expect("render");
        assert_eq!(artifact.page_count, 2);

        let document = artifact.document.as_ref().expect("retained document");
        let step_image_on_page_two = document.pages[1].commands.iter().any(|cmd| {
            matches!(cmd, Command::DrawImage { y, .. } if *y == config.top_margin)
        });
        assert!(step_image_on_page_two);

        let report = inspect_pdf_bytes(&artifact.bytes).expect("inspect");
        assert_stamped(&report, "RESTRICTED CONFIDENTIAL");
        assert!(report.page_shows_text(2, "Page 2 of 2"));
    }

    #[tokio::test]
    async fn always_failing_loader_still_produces_a_report() {
        let artifact = engine()
            .render(&rel9_record(), &FailingLoader)
            .await
            .expect("render");
        assert_eq!(artifact.metrics.image_failures, 3);
        let report = inspect_pdf_bytes(&artifact.bytes).expect("inspect");
        let markers = report.page_contents[0]
            .matches(&format!("({}) Tj", LOGO_MARKER_TEXT))
            .count();
        assert_eq!(markers, 2);
        let all_pages = report.page_contents.join("\n");
        assert!(all_pages.contains(&format!("({}) Tj", IMAGE_MARKER_TEXT)));
    }

    #[tokio::test]
    async fn zero_scenarios_render_a_single_stamped_page() {
        let record = Record::new("  PBI 123 #456  ", "QA", ConfidentialityLevel::Public);
        let artifact = engine().render(&record, &FailingLoader).await.expect("render");
        assert_eq!(artifact.page_count, 1);
        assert_eq!(artifact.file_name, "PBI_123_456.pdf");
        let report = inspect_pdf_bytes(&artifact.bytes).expect("inspect");
        assert!(report.page_shows_text(1, TITLE_TEXT));
        assert!(report.page_shows_text(1, "Page 1 of 1"));
        assert!(report.page_shows_text(1, "PUBLIC"));
        assert!(!report.page_contents[0].contains("Scenario "));
    }

    #[tokio::test]
    async fn renders_are_reproducible() {
        let engine = engine();
        let first = engine.render(&rel9_record(), &logo_loader()).await.expect("first");
        let second = engine.render(&rel9_record(), &logo_loader()).await.expect("second");
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[tokio::test]
    async fn render_json_accepts_serialized_records() {
        let json = serde_json::to_string(&rel9_record()).expect("serialize");
        let artifact = engine()
            .render_json(&json, &logo_loader())
            .await
            .expect("render");
        assert_eq!(artifact.metrics.steps_rendered, 2);

        let err = engine()
            .render_json("{\"scenarios\": 3}", &logo_loader())
            .await
            .expect_err("bad json");
        assert!(matches!(err, ReportError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn debug_log_records_failures_and_summary() {
        let path = std::env::temp_dir().join(format!(
            "evidence_report_render_{}.jsonl",
            std::process::id()
        ));
        let engine = EvidenceReport::builder()
            .debug_log(&path)
            .build()
            .expect("engine");
        engine
            .render(&rel9_record(), &FailingLoader)
            .await
            .expect("render");
        let text = std::fs::read_to_string(&path).expect("log");
        let events: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        let failures = events
            .iter()
            .filter(|event| event["type"] == "image.load_failed")
            .count();
        assert_eq!(failures, 3);
        let summary = events
            .iter()
            .find(|event| event["type"] == "render.summary")
            .expect("render summary");
        assert_eq!(summary["image_failures"], 3);
        assert_eq!(summary["steps"], 2);
        let counts = events
            .iter()
            .find(|event| event["type"] == "debug.summary")
            .expect("debug summary");
        assert_eq!(counts["counts"]["image.load_failed"], 3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn builder_rejects_invalid_configuration() {
        let err = EvidenceReport::builder()
            .margins_mm(110.0, 110.0)
            .build()
            .err()
            .expect("invalid margins");
        assert!(matches!(err, ReportError::InvalidConfiguration(_)));

        assert!(EvidenceReport::builder().watermark_opacity(-0.1).build().is_err());
        assert!(
            EvidenceReport::builder()
                .break_thresholds_mm(200.0, 250.0)
                .build()
                .is_err()
        );
        assert!(EvidenceReport::builder().image_max_mm(0.0, 70.0).build().is_err());
        assert!(
            EvidenceReport::builder()
                .image_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn builder_settings_reach_the_engine() {
        let engine = EvidenceReport::builder()
            .page_size(Size::letter())
            .top_margin_mm(25.0)
            .image_timeout(Duration::from_secs(3))
            .document_title("Evidence")
            .build()
            .expect("engine");
        assert_eq!(engine.config().page_size, Size::letter());
        assert_eq!(engine.config().top_margin, Pt::from_mm(25.0));
        assert_eq!(engine.config().image_timeout, Some(Duration::from_secs(3)));
        let record = Record::new("X", "Y", ConfidentialityLevel::Public);
        assert_eq!(engine.pdf_options_for(&record).title.as_deref(), Some("Evidence"));
    }
}
