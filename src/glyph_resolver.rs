//! C5: resolves a DVI character code, in the context of the current font,
//! to an external glyph index. Pure lookup logic, grounded directly on
//! §4.5 -- kept free of any state-machine bookkeeping so it can be tested
//! against hand-built [`FontDescriptor`]s.

use crate::fontreg::glyph_description::UnicodeValue;
use crate::fontreg::FontDescriptor;

/// Index of the conventional `.notdef` glyph substituted when resolution
/// produces an index past the font's `ec`.
pub const NOTDEF_GLYPH: u32 = 0;

/// Resolve DVI character code `p` against `font`. Returns `None` only when
/// the font has no description at all for `p` (§4.5 step 1's "emit
/// nothing"); any other outcome yields a glyph index, possibly `.notdef`.
pub fn resolve_glyph(font: &FontDescriptor, p: u32) -> Option<u32> {
    let description = font.glyph_descriptions.get(&p.to_string())?;

    let resolved = match &description.unicode {
        Some(UnicodeValue::Scalar(u)) => font
            .asset
            .glyph_index_map
            .get(u)
            .copied()
            .unwrap_or(description.glyph_index),
        Some(UnicodeValue::Sequence(_)) | None => description.glyph_index,
    };

    if resolved > font.font_ec {
        Some(NOTDEF_GLYPH)
    } else {
        Some(resolved)
    }
}
