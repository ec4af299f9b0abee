use crate::canvas::{Command, Document};
use crate::font::FontFace;
use crate::layout::LayoutConfig;
use crate::types::{Pt, Size};
use std::f32::consts::PI;

/// Stamps the watermark and the "Page i of N" footer on every page. Runs
/// after layout, once the page count is final.
pub fn finish_pages(doc: &mut Document, watermark_text: &str, config: &LayoutConfig) {
    let total_pages = doc.pages.len();
    let page_size = doc.page_size;
    for (idx0, page) in doc.pages.iter_mut().enumerate() {
        page.commands
            .extend(build_watermark_commands(watermark_text, page_size, config));
        page.commands
            .extend(build_footer_commands(idx0 + 1, total_pages, page_size, config));
    }
}

pub fn footer_text(page_number: usize, total_pages: usize) -> String {
    format!("Page {} of {}", page_number, total_pages)
}

fn build_watermark_commands(
    text: &str,
    page_size: Size,
    config: &LayoutConfig,
) -> Vec<Command> {
    let face = FontFace::Helvetica;
    let font_size = config.watermark_font_size;
    let angle = config.watermark_angle_deg * (PI / 180.0);
    let cx = page_size.width.mul_ratio(1, 2);
    let cy = page_size.height.mul_ratio(1, 2);
    let width = face.measure(font_size, text);
    // DrawString uses top-left page coordinates with a y-flip in PDF emission.
    // Compensate so the text is vertically centered on the translated origin.
    let local_y = Pt::ZERO - font_size.mul_ratio(1, 2);
    let compensated_y = page_size.height - local_y - font_size;

    let mut commands = vec![
        Command::BeginArtifact {
            subtype: Some("Watermark".to_string()),
        },
        Command::SaveState,
        Command::SetOpacity {
            fill: config.watermark_opacity,
            stroke: config.watermark_opacity,
        },
        Command::SetFillColor(config.watermark_color),
        Command::Translate(cx, cy),
    ];
    if angle.abs() > f32::EPSILON {
        commands.push(Command::Rotate(angle));
    }
    commands.extend([
        Command::SetFontName(face.base_name().to_string()),
        Command::SetFontSize(font_size),
        Command::DrawString {
            x: Pt::ZERO - width.mul_ratio(1, 2),
            y: compensated_y,
            text: text.to_string(),
        },
        Command::RestoreState,
        Command::EndMarkedContent,
    ]);
    commands
}

fn build_footer_commands(
    page_number: usize,
    total_pages: usize,
    page_size: Size,
    config: &LayoutConfig,
) -> Vec<Command> {
    let face = FontFace::Helvetica;
    let text = footer_text(page_number, total_pages);
    let width = face.measure(config.footer_font_size, &text);
    let x = (page_size.width - width).mul_ratio(1, 2).max(Pt::ZERO);
    // Baseline sits `footer_offset` above the bottom edge.
    let y = (page_size.height - config.footer_offset - config.footer_font_size).max(Pt::ZERO);
    vec![
        Command::SaveState,
        Command::SetFillColor(config.footer_color),
        Command::SetFontName(face.base_name().to_string()),
        Command::SetFontSize(config.footer_font_size),
        Command::DrawString { x, y, text },
        Command::RestoreState,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, Page};
    use crate::types::Color;

    fn three_page_document() -> Document {
        let mut canvas = Canvas::new(Size::a4());
        for label in ["one", "two", "three"] {
            canvas.draw_string(Pt::from_f32(40.0), Pt::from_f32(60.0), label);
            canvas.show_page();
        }
        canvas.finish()
    }

    fn footer_of(page: &Page) -> Option<&str> {
        page.texts().find(|text| text.starts_with("Page "))
    }

    #[test]
    fn every_page_gets_footer_and_watermark() {
        let mut doc = three_page_document();
        finish_pages(&mut doc, "INTERNAL", &LayoutConfig::default());
        assert_eq!(doc.page_count(), 3);
        for (idx0, page) in doc.pages.iter().enumerate() {
            let expected = format!("Page {} of 3", idx0 + 1);
            assert_eq!(footer_of(page), Some(expected.as_str()));
            assert!(page.texts().any(|text| text == "INTERNAL"));
        }
    }

    #[test]
    fn watermark_is_wrapped_in_artifact_and_graphics_state() {
        let mut doc = three_page_document();
        let config = LayoutConfig::default();
        finish_pages(&mut doc, "SECRET", &config);
        let commands = &doc.pages[0].commands;
        let begin = commands
            .iter()
            .position(|cmd| matches!(cmd, Command::BeginArtifact { subtype: Some(s) } if s == "Watermark"))
            .expect("artifact begin");
        assert_eq!(commands[begin + 1], Command::SaveState);
        assert!(commands[begin..].contains(&Command::SetOpacity {
            fill: 0.15,
            stroke: 0.15
        }));
        assert!(commands[begin..].contains(&Command::SetFillColor(Color::gray8(150))));
        let rotate = commands[begin..].iter().find_map(|cmd| match cmd {
            Command::Rotate(angle) => Some(*angle),
            _ => None,
        });
        assert!((rotate.expect("rotation") + PI / 4.0).abs() < 1e-6);
        let end = commands
            .iter()
            .position(|cmd| *cmd == Command::EndMarkedContent)
            .expect("artifact end");
        assert_eq!(commands[end - 1], Command::RestoreState);
    }

    #[test]
    fn watermark_is_centered_on_the_page() {
        let config = LayoutConfig::default();
        let page = Size::a4();
        let commands = build_watermark_commands("PUBLIC", page, &config);
        assert!(commands.contains(&Command::Translate(
            page.width.mul_ratio(1, 2),
            page.height.mul_ratio(1, 2)
        )));
        let x = commands.iter().find_map(|cmd| match cmd {
            Command::DrawString { x, .. } => Some(*x),
            _ => None,
        });
        let width = FontFace::Helvetica.measure(config.watermark_font_size, "PUBLIC");
        assert_eq!(x, Some(Pt::ZERO - width.mul_ratio(1, 2)));
    }

    #[test]
    fn footer_is_centered_and_leaves_state_restored() {
        let config = LayoutConfig::default();
        let page = Size::a4();
        let commands = build_footer_commands(2, 5, page, &config);
        assert_eq!(commands.first(), Some(&Command::SaveState));
        assert_eq!(commands.last(), Some(&Command::RestoreState));
        let (x, y) = commands
            .iter()
            .find_map(|cmd| match cmd {
                Command::DrawString { x, y, text } if text == "Page 2 of 5" => Some((*x, *y)),
                _ => None,
            })
            .expect("footer text");
        let width = FontFace::Helvetica.measure(config.footer_font_size, "Page 2 of 5");
        assert_eq!(x, (page.width - width).mul_ratio(1, 2));
        assert_eq!(y + config.footer_font_size + config.footer_offset, page.height);
    }

    #[test]
    fn single_blank_page_still_gets_stamped() {
        let mut doc = Canvas::new(Size::a4()).finish();
        finish_pages(&mut doc, "PUBLIC", &LayoutConfig::default());
        assert_eq!(footer_of(&doc.pages[0]), Some("Page 1 of 1"));
    }
}
