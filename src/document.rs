//! C9: the structured result document. Purely data -- assembled by the page
//! driver (C7) during translation and rewritten in place by the consolidator
//! (C8). See spec §3 for the field-by-field invariants.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub fonts: Vec<Font>,
    pub pages: Vec<Page>,
}

/// A logical font, post-consolidation: one entry per unique `font_name`,
/// numbered by first-encounter position (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    pub font_num: u32,
    pub font_name: String,
    pub font_path: String,
    pub font_features: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub page_fonts: Vec<PageFont>,
    pub rules: Vec<Rule>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageFont {
    pub font_num: u32,
    pub glyphs: Vec<Glyph>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub glyph_index: u32,
    pub glyph_sizes: Vec<GlyphSize>,
}

/// `sz` is the font's scaled pixel size at the moment these placements were
/// emitted (`fontScaledPixelSize`, §4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphSize {
    pub sz: i32,
    pub glyph_placements: Vec<GlyphPlacement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphPlacement {
    pub x: i32,
    pub y: i32,
}

/// Top-left anchored, integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Top-left anchored, integer pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub file_name: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}
