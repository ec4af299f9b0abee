use crate::canvas::{Canvas, Document};
use crate::debug::DebugLogger;
use crate::error::{ImageLoadError, ReportError};
use crate::font::TextFont;
use crate::images::{ImageLoader, LoadedImage};
use crate::record::{ImageSource, Record, Scenario, Step, StepStatus};
use crate::types::{Color, Pt, Size};
use crate::wrap::{block_height, wrap_text};
use std::sync::Arc;
use std::time::Duration;

pub const TITLE_TEXT: &str = "Software Test Report";
pub const LOGO_MARKER_TEXT: &str = "[logo unavailable]";
pub const IMAGE_MARKER_TEXT: &str = "[failed to load step image]";
pub const STEPS_LABEL_TEXT: &str = "Steps:";
pub const DESCRIPTION_LABEL_TEXT: &str = "Description: ";

fn title_font() -> TextFont {
    TextFont::bold(18.0)
}

fn field_font() -> TextFont {
    TextFont::regular(12.0)
}

fn scenario_font() -> TextFont {
    TextFont::bold(14.0)
}

fn steps_label_font() -> TextFont {
    TextFont::bold(12.0)
}

fn step_heading_font() -> TextFont {
    TextFont::bold(11.0)
}

fn step_body_font() -> TextFont {
    TextFont::regular(10.0)
}

fn marker_font() -> TextFont {
    TextFont::regular(10.0)
}

/// Every position, threshold and gap the layout uses. Lengths are in
/// points; the defaults are the A4 millimetre values converted once.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub page_size: Size,
    pub margin_left: Pt,
    pub margin_right: Pt,
    /// Cursor position at the top of page 1 and after every page break.
    pub top_margin: Pt,
    pub logo_top: Pt,
    pub logo_width: Pt,
    pub logo_height: Pt,
    /// Cursor advance for the logo row.
    pub header_block_height: Pt,
    pub title_gap: Pt,
    pub field_gap: Pt,
    pub last_field_gap: Pt,
    /// A scenario starting below this y begins on a new page.
    pub scenario_break_threshold: Pt,
    /// A step starting below this y begins on a new page.
    pub step_break_threshold: Pt,
    /// Offsets from `margin_left` for the "Steps:" label, step headings and step data.
    pub steps_indent: Pt,
    pub step_title_indent: Pt,
    pub step_data_indent: Pt,
    pub scenario_heading_gap: Pt,
    pub steps_label_gap: Pt,
    pub step_heading_gap: Pt,
    pub meta_line_gap: Pt,
    pub description_gap: Pt,
    /// Vertical space assumed for a step image when deciding whether it
    /// still fits above the footer.
    pub image_block_estimate: Pt,
    pub bottom_margin: Pt,
    pub footer_reserve: Pt,
    pub image_max_width: Pt,
    pub image_max_height: Pt,
    pub image_gap: Pt,
    pub image_error_gap: Pt,
    pub step_gap: Pt,
    pub scenario_gap: Pt,
    /// Distance of the footer line from the bottom edge.
    pub footer_offset: Pt,
    pub footer_font_size: Pt,
    pub footer_color: Color,
    pub watermark_font_size: Pt,
    pub watermark_opacity: f32,
    pub watermark_angle_deg: f32,
    pub watermark_color: Color,
    pub line_height_factor: f32,
    /// Upper bound on a single image load. `None` waits indefinitely.
    /// Requires a Tokio runtime with the time driver enabled.
    pub image_timeout: Option<Duration>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margin_left: Pt::from_mm(15.0),
            margin_right: Pt::from_mm(15.0),
            top_margin: Pt::from_mm(20.0),
            logo_top: Pt::from_mm(10.0),
            logo_width: Pt::from_mm(30.0),
            logo_height: Pt::from_mm(15.0),
            header_block_height: Pt::from_mm(20.0),
            title_gap: Pt::from_mm(15.0),
            field_gap: Pt::from_mm(4.0),
            last_field_gap: Pt::from_mm(8.0),
            scenario_break_threshold: Pt::from_mm(260.0),
            step_break_threshold: Pt::from_mm(240.0),
            steps_indent: Pt::from_mm(5.0),
            step_title_indent: Pt::from_mm(10.0),
            step_data_indent: Pt::from_mm(15.0),
            scenario_heading_gap: Pt::from_mm(7.0),
            steps_label_gap: Pt::from_mm(2.0),
            step_heading_gap: Pt::from_mm(4.0),
            meta_line_gap: Pt::from_mm(2.0),
            description_gap: Pt::from_mm(4.0),
            image_block_estimate: Pt::from_mm(60.0),
            bottom_margin: Pt::from_mm(15.0),
            footer_reserve: Pt::from_mm(10.0),
            image_max_width: Pt::from_mm(80.0),
            image_max_height: Pt::from_mm(70.0),
            image_gap: Pt::from_mm(8.0),
            image_error_gap: Pt::from_mm(4.0),
            step_gap: Pt::from_mm(5.0),
            scenario_gap: Pt::from_mm(10.0),
            footer_offset: Pt::from_mm(10.0),
            footer_font_size: Pt::from_f32(8.0),
            footer_color: Color::gray8(100),
            watermark_font_size: Pt::from_f32(60.0),
            watermark_opacity: 0.15,
            watermark_angle_deg: -45.0,
            watermark_color: Color::gray8(150),
            line_height_factor: 1.15,
            image_timeout: None,
        }
    }
}

impl LayoutConfig {
    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margin_left - self.margin_right
    }

    /// Lowest y at which a step image may start without a page break.
    pub fn image_limit(&self) -> Pt {
        self.page_size.height - self.bottom_margin - self.footer_reserve
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let invalid = |message: String| Err(ReportError::InvalidConfiguration(message));
        let page = self.page_size;
        if page.width <= Pt::ZERO || page.height <= Pt::ZERO {
            return invalid("page size must be positive".to_string());
        }
        if self.margin_left < Pt::ZERO || self.margin_right < Pt::ZERO {
            return invalid("margins must not be negative".to_string());
        }
        if self.content_width() <= Pt::ZERO {
            return invalid("margins leave no content width".to_string());
        }
        if page.width - self.margin_left - self.step_data_indent - self.margin_right <= Pt::ZERO {
            return invalid("step data indent leaves no content width".to_string());
        }
        if self.top_margin < Pt::ZERO || self.top_margin >= page.height {
            return invalid("top margin must lie inside the page".to_string());
        }
        for (name, threshold) in [
            ("scenario_break_threshold", self.scenario_break_threshold),
            ("step_break_threshold", self.step_break_threshold),
        ] {
            if threshold <= self.top_margin || threshold >= page.height {
                return invalid(format!(
                    "{name} must lie between the top margin and the page height"
                ));
            }
        }
        if self.step_break_threshold > self.scenario_break_threshold {
            return invalid(
                "step_break_threshold must not exceed scenario_break_threshold".to_string(),
            );
        }
        if self.image_limit() <= self.top_margin {
            return invalid("bottom margin and footer reserve leave no body height".to_string());
        }
        if self.image_max_width <= Pt::ZERO || self.image_max_height <= Pt::ZERO {
            return invalid("image maxima must be positive".to_string());
        }
        if self.logo_width <= Pt::ZERO || self.logo_height <= Pt::ZERO {
            return invalid("logo box must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.watermark_opacity) {
            return invalid("watermark opacity must be within 0..=1".to_string());
        }
        if !self.watermark_angle_deg.is_finite() {
            return invalid("watermark angle must be finite".to_string());
        }
        if self.watermark_font_size <= Pt::ZERO || self.footer_font_size <= Pt::ZERO {
            return invalid("font sizes must be positive".to_string());
        }
        if !self.line_height_factor.is_finite() || self.line_height_factor <= 0.0 {
            return invalid("line height factor must be positive".to_string());
        }
        if self.footer_offset <= Pt::ZERO || self.footer_offset >= page.height {
            return invalid("footer offset must lie inside the page".to_string());
        }
        if self.image_timeout.is_some_and(|limit| limit.is_zero()) {
            return invalid("image timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Where the next element goes. Font and color survive page breaks;
/// only `page` and `y` change there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub page: usize,
    pub y: Pt,
    pub font: TextFont,
    pub color: Color,
}

impl Cursor {
    pub fn start(config: &LayoutConfig) -> Self {
        Self {
            page: 1,
            y: config.top_margin,
            font: TextFont::regular(12.0),
            color: Color::BLACK,
        }
    }

    pub fn advance(self, by: Pt) -> Self {
        Self {
            y: self.y + by,
            ..self
        }
    }

    pub fn with_font(self, font: TextFont) -> Self {
        Self { font, ..self }
    }

    pub fn with_color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    /// Strictly below the threshold; a cursor exactly on it stays put.
    pub fn needs_break(&self, threshold: Pt) -> bool {
        self.y > threshold
    }
}

pub fn status_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Ok => Color::rgb8(40, 167, 69),
        StepStatus::NotOk => Color::rgb8(220, 53, 69),
        StepStatus::Pending => Color::rgb8(108, 117, 125),
    }
}

/// Fits a `width_px` x `height_px` image to `max_width`, then caps the height
/// at `max_height` and re-derives the width, keeping the aspect ratio.
pub fn fit_image(width_px: u32, height_px: u32, max_width: Pt, max_height: Pt) -> (Pt, Pt) {
    if width_px == 0 || height_px == 0 {
        return (Pt::ZERO, Pt::ZERO);
    }
    let aspect = width_px as f32 / height_px as f32;
    let width = max_width;
    let height = width / aspect;
    if height > max_height {
        (max_height * aspect, max_height)
    } else {
        (width, height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutStats {
    pub scenarios_rendered: usize,
    pub steps_rendered: usize,
    pub images_placed: usize,
    pub image_failures: usize,
    pub page_breaks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakReason {
    Scenario,
    Step,
    Image,
}

impl BreakReason {
    fn as_str(&self) -> &'static str {
        match self {
            BreakReason::Scenario => "scenario",
            BreakReason::Step => "step",
            BreakReason::Image => "image",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ImageRole {
    LogoA,
    LogoB,
    Step,
}

impl ImageRole {
    fn as_str(&self) -> &'static str {
        match self {
            ImageRole::LogoA => "logo_a",
            ImageRole::LogoB => "logo_b",
            ImageRole::Step => "step_image",
        }
    }
}

/// Lays out the record's content pages. Image failures become inline
/// markers; nothing here fails. Watermark and footer are applied separately
/// once the page count is known.
pub async fn layout_document<L: ImageLoader>(
    record: &Record,
    config: &LayoutConfig,
    loader: &L,
    logger: Option<&DebugLogger>,
) -> (Document, LayoutStats) {
    let duplicates = record.duplicate_ids();
    if let Some(logger) = logger {
        if !duplicates.is_empty() {
            let ids: Vec<String> = duplicates.iter().map(|id| id.to_string()).collect();
            logger.log_event(serde_json::json!({
                "type": "record.duplicate_ids",
                "ids": ids,
            }));
        }
    }

    let mut run = LayoutRun {
        config,
        loader,
        logger,
        canvas: Canvas::new(config.page_size),
        stats: LayoutStats::default(),
    };
    let cursor = run.place_header(record).await;
    let mut cursor = run.place_fields(cursor, record);
    for (index, scenario) in record.scenarios.iter().enumerate() {
        cursor = run.place_scenario(cursor, index + 1, scenario).await;
    }
    (run.canvas.finish(), run.stats)
}

struct LayoutRun<'a, L> {
    config: &'a LayoutConfig,
    loader: &'a L,
    logger: Option<&'a DebugLogger>,
    canvas: Canvas,
    stats: LayoutStats,
}

impl<L: ImageLoader> LayoutRun<'_, L> {
    fn line_height(&self, font: &TextFont) -> Pt {
        font.line_height(self.config.line_height_factor)
    }

    fn apply_style(&mut self, cursor: &Cursor) {
        self.canvas.set_font(cursor.font);
        self.canvas.set_fill_color(cursor.color);
    }

    /// Draws `lines` top-down from the cursor and returns the block height.
    fn draw_lines(&mut self, cursor: &Cursor, x: Pt, lines: &[String]) -> Pt {
        self.apply_style(cursor);
        let line_height = self.line_height(&cursor.font);
        let mut y = cursor.y;
        for line in lines {
            if !line.is_empty() {
                self.canvas.draw_string(x, y, line.as_str());
            }
            y += line_height;
        }
        block_height(lines.len(), &cursor.font, self.config.line_height_factor)
    }

    fn draw_line(&mut self, cursor: &Cursor, x: Pt, text: &str) -> Pt {
        self.draw_lines(cursor, x, &[text.to_string()])
    }

    fn break_page(&mut self, cursor: Cursor, reason: BreakReason) -> Cursor {
        let from_y = cursor.y;
        self.canvas.show_page();
        self.stats.page_breaks += 1;
        let next = Cursor {
            page: cursor.page + 1,
            y: self.config.top_margin,
            ..cursor
        };
        if let Some(logger) = self.logger {
            logger.log_event(serde_json::json!({
                "type": "layout.page_break",
                "page": next.page,
                "reason": reason.as_str(),
                "y": from_y.to_f32(),
            }));
        }
        next
    }

    async fn load_image(
        &mut self,
        role: ImageRole,
        source: Option<&ImageSource>,
        page: usize,
    ) -> Option<Arc<LoadedImage>> {
        let result = match source {
            None => Err(ImageLoadError::Missing),
            Some(source) => match self.config.image_timeout {
                Some(limit) => tokio::time::timeout(limit, self.loader.load(source))
                    .await
                    .unwrap_or(Err(ImageLoadError::TimedOut)),
                None => self.loader.load(source).await,
            },
        };
        match result {
            Ok(image) => Some(image),
            Err(err) => {
                self.stats.image_failures += 1;
                if let Some(logger) = self.logger {
                    logger.log_event(serde_json::json!({
                        "type": "image.load_failed",
                        "role": role.as_str(),
                        "source": source.map(ImageSource::describe),
                        "code": err.code(),
                        "error": err.to_string(),
                        "page": page,
                    }));
                }
                None
            }
        }
    }

    async fn place_header(&mut self, record: &Record) -> Cursor {
        let config = self.config;
        let mut cursor = Cursor::start(config);
        let anchors = [
            (ImageRole::LogoA, record.header_logo_a.as_ref(), config.margin_left),
            (
                ImageRole::LogoB,
                record.header_logo_b.as_ref(),
                config.page_size.width - config.margin_right - config.logo_width,
            ),
        ];
        for (role, source, x) in anchors {
            match self.load_image(role, source, cursor.page).await {
                Some(image) => {
                    self.canvas.draw_image(
                        x,
                        config.logo_top,
                        config.logo_width,
                        config.logo_height,
                        image,
                    );
                }
                None => {
                    cursor = cursor.with_font(marker_font());
                    let at = Cursor {
                        y: config.logo_top,
                        ..cursor
                    };
                    self.draw_line(&at, x, LOGO_MARKER_TEXT);
                }
            }
        }
        let cursor = cursor.advance(config.header_block_height).with_font(title_font());
        let title_width = cursor.font.measure(TITLE_TEXT);
        let title_x = (config.page_size.width - title_width).mul_ratio(1, 2).max(Pt::ZERO);
        self.draw_line(&cursor, title_x, TITLE_TEXT);
        cursor.advance(config.title_gap)
    }

    fn place_fields(&mut self, cursor: Cursor, record: &Record) -> Cursor {
        let config = self.config;
        let fields = [
            format!("Work Item: {}", record.work_item_id),
            format!("Tester: {}", record.tester_name),
            format!("Confidentiality Level: {}", record.confidentiality.label()),
        ];
        let mut cursor = cursor.with_font(field_font());
        let last = fields.len() - 1;
        for (index, field) in fields.iter().enumerate() {
            let lines = wrap_text(field, &cursor.font, config.content_width());
            let height = self.draw_lines(&cursor, config.margin_left, &lines);
            let gap = if index == last {
                config.last_field_gap
            } else {
                config.field_gap
            };
            cursor = cursor.advance(height + gap);
        }
        cursor
    }

    async fn place_scenario(&mut self, cursor: Cursor, number: usize, scenario: &Scenario) -> Cursor {
        let config = self.config;
        let mut cursor = cursor;
        if cursor.needs_break(config.scenario_break_threshold) {
            cursor = self.break_page(cursor, BreakReason::Scenario);
        }
        self.canvas
            .meta("scenario", scenario.id.as_uuid().to_string());

        cursor = cursor.with_font(scenario_font());
        let heading = format!("Scenario {}: {}", number, scenario.description);
        let lines = wrap_text(&heading, &cursor.font, config.content_width());
        let height = self.draw_lines(&cursor, config.margin_left, &lines);
        cursor = cursor.advance(height + config.scenario_heading_gap);

        cursor = cursor.with_font(steps_label_font());
        let height = self.draw_line(
            &cursor,
            config.margin_left + config.steps_indent,
            STEPS_LABEL_TEXT,
        );
        cursor = cursor.advance(height + config.steps_label_gap);

        for (index, step) in scenario.steps.iter().enumerate() {
            cursor = self.place_step(cursor, index + 1, step).await;
        }
        self.stats.scenarios_rendered += 1;
        cursor.advance(config.scenario_gap)
    }

    async fn place_step(&mut self, cursor: Cursor, number: usize, step: &Step) -> Cursor {
        let config = self.config;
        let mut cursor = cursor;
        if cursor.needs_break(config.step_break_threshold) {
            cursor = self.break_page(cursor, BreakReason::Step);
        }
        self.canvas.meta("step", step.id.as_uuid().to_string());

        cursor = cursor.with_font(step_heading_font());
        let height = self.draw_line(
            &cursor,
            config.margin_left + config.step_title_indent,
            &format!("Step {}:", number),
        );
        cursor = cursor.advance(height + config.step_heading_gap);

        let data_x = config.margin_left + config.step_data_indent;
        cursor = cursor.with_font(step_body_font());
        let height = self.draw_line(&cursor, data_x, &format!("Created: {}", step.created_at));
        cursor = cursor.advance(height + config.meta_line_gap);

        cursor = self.place_status(cursor, data_x, step.status);
        cursor = self.place_description(cursor, data_x, &step.description);

        if let Some(source) = step.image.as_ref() {
            cursor = self.place_step_image(cursor, data_x, source).await;
        }
        self.stats.steps_rendered += 1;
        cursor.advance(config.step_gap)
    }

    fn place_status(&mut self, cursor: Cursor, x: Pt, status: StepStatus) -> Cursor {
        let colored = cursor.with_color(status_color(status));
        let height = self.draw_line(&colored, x, &format!("Status: {}", status.label()));
        // Reset right away so the color never leaks into the next run.
        let reset = colored.with_color(Color::BLACK);
        self.canvas.set_fill_color(reset.color);
        reset.advance(height + self.config.meta_line_gap)
    }

    fn place_description(&mut self, cursor: Cursor, x: Pt, description: &str) -> Cursor {
        let config = self.config;
        let label_height = self.draw_line(&cursor, x, DESCRIPTION_LABEL_TEXT);
        if description.trim().is_empty() {
            return cursor.advance(label_height + config.description_gap);
        }
        let value_x = x + cursor.font.measure(DESCRIPTION_LABEL_TEXT);
        let mut width = config.page_size.width - value_x - config.margin_right;
        if width <= Pt::ZERO {
            width = config.page_size.width - x - config.margin_right;
        }
        let lines = wrap_text(description, &cursor.font, width);
        let height = self.draw_lines(&cursor, value_x, &lines);
        cursor.advance(height + config.description_gap)
    }

    async fn place_step_image(&mut self, cursor: Cursor, x: Pt, source: &ImageSource) -> Cursor {
        let config = self.config;
        let mut cursor = cursor;
        if cursor.y + config.image_block_estimate > config.image_limit() {
            cursor = self.break_page(cursor, BreakReason::Image);
        }
        match self.load_image(ImageRole::Step, Some(source), cursor.page).await {
            Some(image) => {
                let (width, height) = fit_image(
                    image.width(),
                    image.height(),
                    config.image_max_width,
                    config.image_max_height,
                );
                self.canvas.draw_image(x, cursor.y, width, height, image);
                self.stats.images_placed += 1;
                cursor.advance(height + config.image_gap)
            }
            None => {
                let height = self.draw_line(&cursor, x, IMAGE_MARKER_TEXT);
                cursor.advance(height + config.image_error_gap)
            }
        }
    }
}
