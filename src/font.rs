use crate::types::Pt;

/// The base-14 faces the report uses. They are never embedded, so only
/// advance widths are needed for measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFace {
    Helvetica,
    HelveticaBold,
}

impl FontFace {
    pub fn base_name(&self) -> &'static str {
        match self {
            FontFace::Helvetica => "Helvetica",
            FontFace::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub fn from_base_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "helvetica" => Some(FontFace::Helvetica),
            "helvetica-bold" => Some(FontFace::HelveticaBold),
            _ => None,
        }
    }

    fn widths(&self) -> &'static [u16; 95] {
        match self {
            FontFace::Helvetica => &HELVETICA_WIDTHS,
            FontFace::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        }
    }

    /// Advance width in 1/1000 em.
    pub fn advance(&self, ch: char) -> u16 {
        let code = ch as u32;
        if (32..=126).contains(&code) {
            self.widths()[(code - 32) as usize]
        } else if ch == '\u{00A0}' {
            self.widths()[0]
        } else {
            MISSING_WIDTH
        }
    }

    pub fn measure(&self, size: Pt, text: &str) -> Pt {
        let units: i64 = text.chars().map(|ch| self.advance(ch) as i64).sum();
        let units = units.clamp(0, i32::MAX as i64) as i32;
        size.mul_ratio(units, 1000)
    }
}

/// Face and size in effect for a text run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextFont {
    pub face: FontFace,
    pub size: Pt,
}

impl TextFont {
    pub fn regular(size: f32) -> Self {
        Self {
            face: FontFace::Helvetica,
            size: Pt::from_f32(size),
        }
    }

    pub fn bold(size: f32) -> Self {
        Self {
            face: FontFace::HelveticaBold,
            size: Pt::from_f32(size),
        }
    }

    pub fn measure(&self, text: &str) -> Pt {
        self.face.measure(self.size, text)
    }

    pub fn line_height(&self, factor: f32) -> Pt {
        self.size * factor
    }
}

// Accented Latin-1 letters fall here too; their widths in the base-14 AFMs
// match the unaccented forms closely enough for wrapping.
const MISSING_WIDTH: u16 = 556;

// AFM advance widths for WinAnsi codes 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0..?
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // P.._
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // `..o
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // p..~
];
