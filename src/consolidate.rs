//! C8: the output consolidator. Multiple DVI font numbers can denote the
//! same external font at different scales; since each glyph placement
//! already records its own scaled pixel size (`sz`), the scale distinction
//! is no longer needed once translation is done. This pass collapses those
//! duplicates away, per §4.8.

use std::collections::HashMap;

use crate::document::{Document, Font, Page, PageFont};
use crate::fontreg::FontRegistry;

/// Rewrite `document` in place: one `Document.fonts` entry per unique font
/// name, page-fonts remapped and merged onto it, glyphs merged and sorted
/// within each page-font. Idempotent: running this again on its own output
/// is a no-op (§8 round-trip property), since a document with unique
/// `PageFont.fontNum`s per page and sorted glyphs is already a fixed point.
pub fn consolidate(document: &mut Document, registry: &FontRegistry) {
    let mut unique_font_names: Vec<String> = Vec::new();
    let mut old_to_new: HashMap<u32, u32> = HashMap::new();

    for (&old_num, descriptor) in registry.iter_in_definition_order() {
        let new_num = match unique_font_names.iter().position(|n| n == &descriptor.font_name) {
            Some(pos) => pos as u32,
            None => {
                unique_font_names.push(descriptor.font_name.clone());
                (unique_font_names.len() - 1) as u32
            }
        };
        old_to_new.insert(old_num, new_num);
    }

    document.fonts = unique_font_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let descriptor = registry
                .iter()
                .find(|(_, d)| &d.font_name == name)
                .map(|(_, d)| d)
                .expect("every unique name originated from a registry entry");
            Font {
                font_num: i as u32,
                font_name: name.clone(),
                font_path: descriptor.font_path.clone(),
                font_features: descriptor.font_features.clone(),
            }
        })
        .collect();

    for page in &mut document.pages {
        consolidate_page(page, &old_to_new);
    }
}

fn consolidate_page(page: &mut Page, old_to_new: &HashMap<u32, u32>) {
    let mut merged: HashMap<u32, PageFont> = HashMap::new();
    for page_font in page.page_fonts.drain(..) {
        let new_num = old_to_new.get(&page_font.font_num).copied().unwrap_or(page_font.font_num);
        merged
            .entry(new_num)
            .or_insert_with(|| PageFont {
                font_num: new_num,
                glyphs: Vec::new(),
            })
            .glyphs
            .extend(page_font.glyphs);
    }

    let mut page_fonts: Vec<PageFont> = merged.into_values().collect();
    page_fonts.sort_by_key(|pf| pf.font_num);

    for page_font in &mut page_fonts {
        let mut by_glyph: HashMap<u32, Vec<_>> = HashMap::new();
        for glyph in page_font.glyphs.drain(..) {
            by_glyph
                .entry(glyph.glyph_index)
                .or_default()
                .extend(glyph.glyph_sizes);
        }
        let mut glyphs: Vec<_> = by_glyph
            .into_iter()
            .map(|(glyph_index, glyph_sizes)| crate::document::Glyph {
                glyph_index,
                glyph_sizes: merge_glyph_sizes(glyph_sizes),
            })
            .collect();
        glyphs.sort_by_key(|g| g.glyph_index);
        page_font.glyphs = glyphs;
    }

    page.page_fonts = page_fonts;
}

/// Concatenates `glyph_placements` for entries that share the same `sz`,
/// since those describe placements of the same glyph at the same pixel
/// size and belong in one bucket (§4.8 cascades down to this level too).
fn merge_glyph_sizes(glyph_sizes: Vec<crate::document::GlyphSize>) -> Vec<crate::document::GlyphSize> {
    let mut by_sz: Vec<crate::document::GlyphSize> = Vec::new();
    for glyph_size in glyph_sizes {
        match by_sz.iter_mut().find(|existing| existing.sz == glyph_size.sz) {
            Some(existing) => existing.glyph_placements.extend(glyph_size.glyph_placements),
            None => by_sz.push(glyph_size),
        }
    }
    by_sz
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diagnostics::VecDiagnosticSink;
    use crate::document::{Glyph, GlyphPlacement, GlyphSize};
    use crate::fontreg::asset::{FontAsset, StaticFontAssetSource};
    use crate::fontreg::glyph_description::StaticGlyphDescriptionSource;
    use crate::fontreg::FontDefinition;

    fn page_font(font_num: u32, glyph_index: u32, sz: i32, x: i32, y: i32) -> PageFont {
        PageFont {
            font_num,
            glyphs: vec![Glyph {
                glyph_index,
                glyph_sizes: vec![GlyphSize {
                    sz,
                    glyph_placements: vec![GlyphPlacement { x, y }],
                }],
            }],
        }
    }

    #[test]
    fn merges_duplicate_font_numbers_after_remap() {
        let mut page = Page::default();
        page.page_fonts.push(page_font(5, 3, 100, 0, 0));
        page.page_fonts.push(page_font(7, 3, 100, 10, 10));

        let mut old_to_new = HashMap::new();
        old_to_new.insert(5, 0);
        old_to_new.insert(7, 0);

        consolidate_page(&mut page, &old_to_new);

        assert_eq!(page.page_fonts.len(), 1);
        assert_eq!(page.page_fonts[0].glyphs.len(), 1);
        assert_eq!(page.page_fonts[0].glyphs[0].glyph_sizes.len(), 1);
        assert_eq!(page.page_fonts[0].glyphs[0].glyph_sizes[0].glyph_placements.len(), 2);
    }

    #[test]
    fn sorts_page_fonts_and_glyphs_by_numeric_index() {
        let mut page = Page::default();
        page.page_fonts.push(page_font(2, 9, 50, 0, 0));
        page.page_fonts.push(page_font(1, 3, 50, 0, 0));

        let old_to_new = HashMap::new();
        consolidate_page(&mut page, &old_to_new);

        assert_eq!(page.page_fonts[0].font_num, 1);
        assert_eq!(page.page_fonts[1].font_num, 2);
    }

    #[test]
    fn consolidation_is_idempotent() {
        let mut page = Page::default();
        page.page_fonts.push(page_font(0, 3, 100, 0, 0));
        let old_to_new = HashMap::new();
        consolidate_page(&mut page, &old_to_new);
        let once = page.clone();
        consolidate_page(&mut page, &old_to_new);
        assert_eq!(page, once);
    }

    #[test]
    fn document_fonts_follow_definition_order_not_numeric_order() {
        let mut fonts = StaticFontAssetSource::default();
        fonts.assets.insert("zzz".to_owned(), FontAsset::default());
        fonts.assets.insert("aaa".to_owned(), FontAsset::default());
        let mut descriptions = StaticGlyphDescriptionSource::default();
        descriptions.descriptions.insert("zzz".to_owned(), HashMap::new());
        descriptions.descriptions.insert("aaa".to_owned(), HashMap::new());
        let mut sink = VecDiagnosticSink::default();

        let mut registry = crate::fontreg::FontRegistry::default();
        // font number 9 is defined first even though it is numerically
        // larger than font number 2, defined second.
        registry
            .define_font(
                FontDefinition {
                    font_num: 9,
                    checksum: 0,
                    scaled_size: 655360,
                    design_size: 655360,
                    dir_path: "",
                    font_name: "zzz",
                    features: "",
                },
                1000,
                1.0,
                96,
                &fonts,
                &HashMap::new(),
                &descriptions,
                "",
                &mut sink,
            )
            .unwrap();
        registry
            .define_font(
                FontDefinition {
                    font_num: 2,
                    checksum: 0,
                    scaled_size: 655360,
                    design_size: 655360,
                    dir_path: "",
                    font_name: "aaa",
                    features: "",
                },
                1000,
                1.0,
                96,
                &fonts,
                &HashMap::new(),
                &descriptions,
                "",
                &mut sink,
            )
            .unwrap();

        let mut document = Document::default();
        consolidate(&mut document, &registry);

        assert_eq!(document.fonts.len(), 2);
        assert_eq!(document.fonts[0].font_name, "zzz");
        assert_eq!(document.fonts[1].font_name, "aaa");
    }
}
