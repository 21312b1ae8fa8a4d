#![allow(clippy::too_many_arguments)]

//! Decoder for the Device-Independent (DVI) page-description format
//! emitted by Lua-enabled TeX engines. See [`decode`] for the entry point.

pub mod arithmetic;
pub mod consolidate;
pub mod diagnostics;
pub mod document;
mod driver;
pub mod error;
pub mod fontreg;
pub mod glyph_resolver;
pub mod opcode;
pub mod options;
pub mod reader;
pub mod state_machine;

pub use diagnostics::{DiagnosticSink, LogDiagnosticSink, NullDiagnosticSink, VecDiagnosticSink};
pub use document::Document;
pub use driver::decode;
pub use error::{DviError, DviResult};
pub use fontreg::asset::{FontAsset, FontAssetSource, OpenTypeFontAssetSource};
pub use fontreg::glyph_description::{GlyphDescriptionSource, JsonGlyphDescriptionSource};
pub use options::DecodeOptions;

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::diagnostics::VecDiagnosticSink;
    use crate::fontreg::asset::StaticFontAssetSource;
    use crate::fontreg::glyph_description::StaticGlyphDescriptionSource;
    use crate::options::DecodeOptions;

    /// Assembles a minimal, valid DVI byte stream: preamble, zero or more
    /// pages (already-encoded bytes), postamble, post_post, trailer. Shared
    /// by the end-to-end scenario tests below.
    struct DviBuilder {
        bytes: Vec<u8>,
        numerator: i32,
        denominator: i32,
        magnification: i32,
    }

    impl DviBuilder {
        fn new() -> Self {
            let numerator: i32 = 25_400_000;
            let denominator: i32 = 473_628_672;
            let magnification: i32 = 1000;
            let mut bytes = Vec::new();
            bytes.push(crate::opcode::PRE);
            bytes.push(2);
            bytes.extend_from_slice(&numerator.to_be_bytes());
            bytes.extend_from_slice(&denominator.to_be_bytes());
            bytes.extend_from_slice(&magnification.to_be_bytes());
            bytes.push(0); // comment length
            Self {
                bytes,
                numerator,
                denominator,
                magnification,
            }
        }

        fn push_page(&mut self, prev_bop: i32, body: impl FnOnce(&mut Vec<u8>)) -> i32 {
            let bop_offset = self.bytes.len() as i32;
            self.bytes.push(crate::opcode::BOP);
            for _ in 0..10 {
                self.bytes.extend_from_slice(&0i32.to_be_bytes());
            }
            self.bytes.extend_from_slice(&prev_bop.to_be_bytes());
            body(&mut self.bytes);
            self.bytes.push(crate::opcode::EOP);
            bop_offset
        }

        fn finish(mut self, max_v: i32, max_h: i32, max_s: u16, total_pages: u16) -> Vec<u8> {
            let post_offset = self.bytes.len() as i32;
            self.bytes.push(crate::opcode::POST);
            self.bytes.extend_from_slice(&(-1i32).to_be_bytes());
            self.bytes.extend_from_slice(&self.numerator.to_be_bytes());
            self.bytes.extend_from_slice(&self.denominator.to_be_bytes());
            self.bytes.extend_from_slice(&self.magnification.to_be_bytes());
            self.bytes.extend_from_slice(&max_v.to_be_bytes());
            self.bytes.extend_from_slice(&max_h.to_be_bytes());
            self.bytes.extend_from_slice(&max_s.to_be_bytes());
            self.bytes.extend_from_slice(&total_pages.to_be_bytes());
            self.bytes.push(crate::opcode::POST_POST);
            self.bytes.extend_from_slice(&post_offset.to_be_bytes());
            self.bytes.push(2);
            for _ in 0..4 {
                self.bytes.push(223);
            }
            self.bytes
        }
    }

    #[test]
    fn s1_empty_document_decodes_to_no_fonts_no_pages() {
        let dvi = DviBuilder::new().finish(0, 0, 0, 0);
        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let document = crate::decode(
            &dvi,
            DecodeOptions::default(),
            &fonts,
            &HashMap::new(),
            &descriptions,
            "",
            &mut sink,
        )
        .unwrap();
        assert!(document.fonts.is_empty());
        assert!(document.pages.is_empty());
    }

    #[test]
    fn s2_single_rule_computes_rule_pixels_and_top_left_y() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |bytes| {
            bytes.push(crate::opcode::SET_RULE);
            bytes.extend_from_slice(&655_360i32.to_be_bytes()); // a: height
            bytes.extend_from_slice(&1_310_720i32.to_be_bytes()); // b: width
        });
        let dvi = builder.finish(0, 0, 1, 1);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let options = DecodeOptions {
            display_dpi: 72,
            ..Default::default()
        };
        let document = crate::decode(&dvi, options, &fonts, &HashMap::new(), &descriptions, "", &mut sink).unwrap();

        assert_eq!(document.pages.len(), 1);
        let page = &document.pages[0];
        assert!(page.page_fonts.is_empty());
        assert_eq!(page.rules.len(), 1);
        let conv = 25_400_000.0 / 254_000.0 * (72.0 / 473_628_672.0) * 1.0;
        let expected_w = crate::arithmetic::rule_pixels(conv, 1_310_720);
        let expected_h = crate::arithmetic::rule_pixels(conv, 655_360);
        assert_eq!(page.rules[0].w, expected_w);
        assert_eq!(page.rules[0].h, expected_h);
        assert_eq!(page.rules[0].x, 0);
        assert_eq!(page.rules[0].y, -expected_h);
    }

    #[test]
    fn s3_push_right_down_pop_round_trips_registers() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |bytes| {
            bytes.push(crate::opcode::PUSH);
            bytes.push(crate::opcode::RIGHT1);
            bytes.push(50);
            bytes.push(crate::opcode::DOWN1);
            bytes.push(60);
            bytes.push(crate::opcode::POP);
            // The only observable effect of a balanced push/pop with no
            // glyphs/rules emitted is that decoding succeeds with an empty
            // page; the register-level invariant is covered directly in
            // state_machine's own test.
        });
        let dvi = builder.finish(0, 0, 1, 1);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let document = crate::decode(
            &dvi,
            DecodeOptions::default(),
            &fonts,
            &HashMap::new(),
            &descriptions,
            "",
            &mut sink,
        )
        .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert!(document.pages[0].rules.is_empty());
    }

    #[test]
    fn s5_psfile_special_emits_image_placement() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |bytes| {
            // With this DVI's conv (display_dpi=72, the file's own
            // num/den/mag), these DVI-unit moves round to hh=200, vv=300.
            bytes.push(crate::opcode::RIGHT4);
            bytes.extend_from_slice(&13_156_352i32.to_be_bytes());
            bytes.push(crate::opcode::DOWN4);
            bytes.extend_from_slice(&19_734_528i32.to_be_bytes());
            let payload = br#"PSfile="img.eps" llx=0 lly=0 urx=100 ury=50 rwi=1000 rhi=500"#;
            bytes.push(crate::opcode::XXX1);
            bytes.push(payload.len() as u8);
            bytes.extend_from_slice(payload);
        });
        let dvi = builder.finish(0, 0, 1, 1);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let options = DecodeOptions {
            display_dpi: 72,
            ..Default::default()
        };
        let document = crate::decode(&dvi, options, &fonts, &HashMap::new(), &descriptions, "", &mut sink).unwrap();

        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.pages[0].images.len(), 1);
        let image = &document.pages[0].images[0];
        assert_eq!(image.file_name, "img.eps");
        assert_eq!(image.w, 100);
        assert_eq!(image.h, 50);
        assert_eq!(image.x, 200);
        assert_eq!(image.y, 300 - image.h);
    }

    #[test]
    fn s6_mismatched_backpointer_is_a_diagnostic_not_a_failure() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |_| {});
        // second page's prev_bop deliberately wrong
        builder.push_page(999, |_| {});
        let dvi = builder.finish(0, 0, 1, 2);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let document = crate::decode(
            &dvi,
            DecodeOptions::default(),
            &fonts,
            &HashMap::new(),
            &descriptions,
            "",
            &mut sink,
        )
        .unwrap();
        assert_eq!(document.pages.len(), 2);
        assert!(sink.lines.iter().any(|l| l.contains("nonmatching_backpointer")));
    }

    #[test]
    fn debug_mode_emits_offset_prefixed_opcode_traces() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |bytes| {
            bytes.push(crate::opcode::SET_RULE);
            bytes.extend_from_slice(&655_360i32.to_be_bytes());
            bytes.extend_from_slice(&1_310_720i32.to_be_bytes());
        });
        let dvi = builder.finish(0, 0, 1, 1);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        let options = DecodeOptions {
            debug: true,
            ..Default::default()
        };
        crate::decode(&dvi, options, &fonts, &HashMap::new(), &descriptions, "", &mut sink).unwrap();

        assert!(sink.lines.iter().any(|l| l.starts_with("trace: offset=")));
    }

    #[test]
    fn debug_off_emits_no_opcode_traces() {
        let mut builder = DviBuilder::new();
        builder.push_page(-1, |bytes| {
            bytes.push(crate::opcode::SET_RULE);
            bytes.extend_from_slice(&655_360i32.to_be_bytes());
            bytes.extend_from_slice(&1_310_720i32.to_be_bytes());
        });
        let dvi = builder.finish(0, 0, 1, 1);

        let fonts = StaticFontAssetSource::default();
        let descriptions = StaticGlyphDescriptionSource::default();
        let mut sink = VecDiagnosticSink::default();
        crate::decode(
            &dvi,
            DecodeOptions::default(),
            &fonts,
            &HashMap::new(),
            &descriptions,
            "",
            &mut sink,
        )
        .unwrap();

        assert!(!sink.lines.iter().any(|l| l.starts_with("trace:")));
    }
}
