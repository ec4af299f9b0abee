use crate::font::TextFont;
use crate::types::Pt;

/// Splits `text` into lines no wider than `max_width`.
///
/// Explicit newlines start a new line, whitespace between words collapses to a
/// single space, and a word wider than the whole line is broken between
/// characters. Feeding the joined result back in yields the same lines.
pub fn wrap_text(text: &str, font: &TextFont, max_width: Pt) -> Vec<String> {
    let max_width = max_width.max(Pt::from_f32(1.0));
    let space_width = font.measure(" ");
    let mut lines = Vec::new();

    for segment in text.split('\n') {
        let segment = segment.trim_end_matches('\r');
        if segment.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        let mut current_width = Pt::ZERO;
        for word in segment.split_whitespace() {
            let word_width = font.measure(word);
            if !current.is_empty() {
                let next_width = current_width + space_width + word_width;
                if next_width <= max_width {
                    current.push(' ');
                    current.push_str(word);
                    current_width = next_width;
                    continue;
                }
                lines.push(std::mem::take(&mut current));
            }
            if word_width > max_width {
                let mut pieces = split_long_word(word, font, max_width);
                // The last piece stays open so following words can join it.
                if let Some(last) = pieces.pop() {
                    lines.extend(pieces);
                    current_width = font.measure(&last);
                    current = last;
                }
            } else {
                current.push_str(word);
                current_width = word_width;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn split_long_word(word: &str, font: &TextFont, max_width: Pt) -> Vec<String> {
    // Widths are summed in font units and rounded once, exactly like
    // `TextFont::measure` on the finished piece.
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_units: i32 = 0;
    for ch in word.chars() {
        let ch_units = font.face.advance(ch) as i32;
        let next_units = current_units.saturating_add(ch_units);
        if !current.is_empty() && font.size.mul_ratio(next_units, 1000) > max_width {
            pieces.push(std::mem::take(&mut current));
            current_units = ch_units;
        } else {
            current_units = next_units;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Height of a block of `line_count` lines.
pub fn block_height(line_count: usize, font: &TextFont, line_height_factor: f32) -> Pt {
    let count = line_count.max(1).min(i32::MAX as usize) as i32;
    font.line_height(line_height_factor) * count
}
