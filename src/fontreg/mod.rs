//! C4: the font registry. Owns `define_font` (§4.4) and the per-font
//! descriptors the state machine (C6) and glyph resolver (C5) consult by
//! font number.

pub mod asset;
pub mod glyph_description;
mod opentype;

use std::collections::HashMap;

use fixed::types::I16F16;

use crate::diagnostics::DiagnosticSink;
use crate::error::DviResult;
use crate::fontreg::asset::{FontAsset, FontAssetSource};
use crate::fontreg::glyph_description::{GlyphDescription, GlyphDescriptionSource};

/// Everything the state machine and glyph resolver need about one font
/// number, assembled once by `define_font` and never mutated afterward.
#[derive(Debug, Clone)]
pub struct FontDescriptor {
    pub font_num: u32,
    pub font_name: String,
    pub font_path: String,
    pub font_features: String,
    pub checksum: u32,
    pub scaled_size: i32,
    pub design_size: i32,

    /// `(magnification/1000 * scaled_size) / 65536`, as 16.16 fixed point.
    pub font_scaled_point_size: I16F16,
    /// `round(conv * scaled_size)`.
    pub font_scaled_pixel_size: i32,
    /// `floor(scaled_size / 6)`, the "3-unit thin space" resync threshold.
    pub font_space: i32,

    /// Per external-glyph-index DVI-unit advance width, §4.4 step "Compute
    /// widths". 0 for glyphs the asset did not report.
    pub width: HashMap<u32, i32>,
    /// Per external-glyph-index pixel advance width.
    pub pixel_width: HashMap<u32, i32>,

    pub asset: FontAsset,
    /// DVI character code (decimal string, matching the on-disk key format)
    /// to glyph description, as loaded from the auxiliary file.
    pub glyph_descriptions: HashMap<String, GlyphDescription>,
    /// The font's `ec` (largest valid character code) used by the resolver
    /// to decide whether to substitute `.notdef`. Approximated here as the
    /// largest glyph index the asset actually reports.
    pub font_ec: u32,
}

#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: HashMap<u32, FontDescriptor>,
    /// Font numbers in the order `define_font` first saw them, since
    /// `fonts` itself (a `HashMap`) doesn't preserve it. Consulted by the
    /// output consolidator (§4.8 step 1: "first-encounter order").
    definition_order: Vec<u32>,
}

/// The decomposed, parsed body of a `fnt_def*` command, after the
/// composite name string has been split into path/basename/features.
pub struct FontDefinition<'a> {
    pub font_num: u32,
    pub checksum: u32,
    pub scaled_size: i32,
    pub design_size: i32,
    pub dir_path: &'a str,
    pub font_name: &'a str,
    pub features: &'a str,
}

/// Splits a `fnt_def*` composite name (already stripped of bytes `0o133`
/// `[` and `0o135` `]` per §4.4) of the form `<path>/<basename>:<features>`
/// into its three parts. Either the path or the features (or both) may be
/// absent.
pub fn split_composite_name(composite: &str) -> (&str, &str, &str) {
    let (path_and_name, features) = match composite.rfind(':') {
        Some(idx) => (&composite[..idx], &composite[idx + 1..]),
        None => (composite, ""),
    };
    let (dir_path, font_name) = match path_and_name.rfind('/') {
        Some(idx) => (&path_and_name[..idx], &path_and_name[idx + 1..]),
        None => ("", path_and_name),
    };
    (dir_path, font_name, features)
}

impl FontRegistry {
    pub fn get(&self, font_num: u32) -> Option<&FontDescriptor> {
        self.fonts.get(&font_num)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &FontDescriptor)> {
        self.fonts.iter()
    }

    /// Font numbers and their descriptors in the order `define_font` first
    /// saw them (§4.8 step 1: "first-encounter order").
    pub fn iter_in_definition_order(&self) -> impl Iterator<Item = (&u32, &FontDescriptor)> {
        self.definition_order
            .iter()
            .filter_map(|num| self.fonts.get(num).map(|d| (num, d)))
    }

    /// `define_font`, §4.4. `conv` is the preamble's pixel-conversion factor;
    /// `magnification` is the effective one (in-file or overridden, already
    /// resolved by the caller). `font_dirs` resolves `font_name` to a
    /// filesystem directory for the asset source; `font_dirs` lookups miss
    /// are tolerated by passing an empty directory through to `fonts`.
    #[allow(clippy::too_many_arguments)]
    pub fn define_font(
        &mut self,
        def: FontDefinition,
        magnification: i32,
        conv: f64,
        display_dpi: u32,
        fonts: &dyn FontAssetSource,
        font_dirs: &HashMap<String, String>,
        glyph_descriptions: &dyn GlyphDescriptionSource,
        lua_root: &str,
        sink: &mut dyn DiagnosticSink,
    ) -> DviResult<()> {
        if let Some(existing) = self.fonts.get(&def.font_num) {
            if existing.checksum != def.checksum
                || existing.scaled_size != def.scaled_size
                || existing.design_size != def.design_size
                || existing.font_name != def.font_name
            {
                sink.report(&format!(
                    "fnt_def_mismatch: font {} redefined with checksum={} scaled_size={} design_size={} name={:?}, \
                     kept original checksum={} scaled_size={} design_size={} name={:?}",
                    def.font_num,
                    def.checksum,
                    def.scaled_size,
                    def.design_size,
                    def.font_name,
                    existing.checksum,
                    existing.scaled_size,
                    existing.design_size,
                    existing.font_name,
                ));
            }
            return Ok(());
        }

        if def.scaled_size <= 0 || def.scaled_size >= (1 << 27) {
            sink.report(&format!(
                "bad_scaled_size: font {} has scaled_size={}",
                def.font_num, def.scaled_size
            ));
        }
        if def.design_size <= 0 || def.design_size >= (1 << 27) {
            sink.report(&format!(
                "bad_design_size: font {} has design_size={}",
                def.font_num, def.design_size
            ));
        }

        // `scaled_size` is itself a 16.16 fixed-point scaled-point value (TeX
        // "sp" units); reinterpret its bits directly rather than converting
        // the raw integer, or values past 2^15 would overflow `I16F16`.
        let font_scaled_point_size =
            I16F16::from_bits(def.scaled_size) * I16F16::from_num(magnification) / I16F16::from_num(1000);
        let font_scaled_pixel_size = (conv * f64::from(def.scaled_size)).round() as i32;
        let font_space = def.scaled_size / 6;

        let dir_path = font_dirs
            .get(def.font_name)
            .map(String::as_str)
            .unwrap_or(def.dir_path);
        let asset = fonts.load(def.font_name, dir_path, def.features)?;

        let pixels_per_em = font_scaled_point_size.to_num::<f64>() * f64::from(display_dpi) / 72.27;
        let dvi_unit_per_em = pixels_per_em / conv;
        let otf_unit_conv = if asset.units_per_em == 0 {
            0.0
        } else {
            dvi_unit_per_em / f64::from(asset.units_per_em)
        };

        let mut width = HashMap::with_capacity(asset.advance_width.len());
        let mut pixel_width = HashMap::with_capacity(asset.advance_width.len());
        for (&glyph, &advance) in &asset.advance_width {
            let w = (f64::from(advance) * otf_unit_conv).round() as i32;
            width.insert(glyph, w);
            let pw = if w == 0 {
                0
            } else {
                (conv * f64::from(w)).round() as i32
            };
            pixel_width.insert(glyph, pw);
        }

        let glyph_descriptions = glyph_descriptions.load(def.font_name, lua_root)?;
        let font_ec = asset.glyph_index_map.values().copied().max().unwrap_or(0);

        self.fonts.insert(
            def.font_num,
            FontDescriptor {
                font_num: def.font_num,
                font_name: def.font_name.to_owned(),
                font_path: dir_path.to_owned(),
                font_features: def.features.to_owned(),
                checksum: def.checksum,
                scaled_size: def.scaled_size,
                design_size: def.design_size,
                font_scaled_point_size,
                font_scaled_pixel_size,
                font_space,
                width,
                pixel_width,
                asset,
                glyph_descriptions,
                font_ec,
            },
        );
        self.definition_order.push(def.font_num);
        Ok(())
    }

    /// Used by the state machine when dispatching `fnt_num*`/`fnt*`: an
    /// undefined font number is a non-fatal condition (§7), reported here
    /// and `None` returned so the caller can decide how to proceed.
    pub fn select(&self, font_num: u32, sink: &mut dyn DiagnosticSink) -> Option<&FontDescriptor> {
        let found = self.fonts.get(&font_num);
        if found.is_none() {
            sink.report(&format!("undefined_font: font number {font_num} was never defined"));
        }
        found
    }
}
