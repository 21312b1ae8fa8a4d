//! C6: the register bank, operand stack, and per-opcode effects that run
//! between a `bop` and its `eop`. The page driver (§4.7) owns the outer
//! pre/post/scan states; this module is only ever invoked once a page is
//! open.

use crate::arithmetic::Registers;
use crate::diagnostics::DiagnosticSink;
use crate::document::{Glyph, GlyphPlacement, GlyphSize, Page, PageFont, Rule};
use crate::error::{DviError, DviResult};
use crate::fontreg::FontRegistry;
use crate::glyph_resolver::resolve_glyph;
use crate::opcode::OpcodeClass;
use crate::reader::Reader;

/// Per-page interpreter state: the eight threaded registers plus the
/// `push`/`pop` stack. `cur_font` lives alongside but, per §3, is
/// deliberately outside the pushed/popped tuple.
#[derive(Debug, Default)]
pub struct PageState {
    pub registers: Registers,
    pub cur_font: Option<u32>,
    stack: Vec<Registers>,
    max_depth_seen: usize,
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.stack.push(self.registers);
        self.max_depth_seen = self.max_depth_seen.max(self.stack.len());
    }

    pub fn pop(&mut self) -> DviResult<()> {
        self.registers = self.stack.pop().ok_or(DviError::StackUnderflow)?;
        Ok(())
    }

    pub fn max_depth_seen(&self) -> usize {
        self.max_depth_seen
    }
}

/// The claims carried from the postamble, needed by the arithmetic overflow
/// guards and the `maxS` diagnostic (§8 invariant 4).
pub struct PageLimits {
    pub max_h: i32,
    pub max_v: i32,
    pub max_s: u16,
}

/// Translate one opcode already classified by [`crate::opcode`] against the
/// open `page`, per the dispatch table in §4.6. `r` is positioned just past
/// the opcode's first parameter (callers call
/// [`crate::opcode::first_parameter`] before this). Returns `true` if this
/// opcode was `eop` (the caller should stop translating and commit the
/// page).
#[allow(clippy::too_many_arguments)]
pub fn translate_opcode(
    class: OpcodeClass,
    first_param: i64,
    r: &mut Reader,
    state: &mut PageState,
    page: &mut Page,
    fonts: &FontRegistry,
    limits: &PageLimits,
    conv: f64,
    magnification: i32,
    display_dpi: u32,
    max_h_so_far: &mut i32,
    max_v_so_far: &mut i32,
    sink: &mut dyn DiagnosticSink,
) -> DviResult<bool> {
    match class {
        OpcodeClass::SetCharImplicit(_) | OpcodeClass::Set(_) => {
            set_or_put_char(first_param as u32, true, state, page, fonts, conv, sink);
        }
        OpcodeClass::Put(_) => {
            set_or_put_char(first_param as u32, false, state, page, fonts, conv, sink);
        }
        OpcodeClass::SetRule | OpcodeClass::PutRule => {
            let height = first_param as i32;
            let width = r.get_signed(4);
            let advances = class == OpcodeClass::SetRule;
            emit_rule(height, width, advances, state, page, conv, sink);
        }
        OpcodeClass::Nop => {}
        OpcodeClass::Bop => {
            return Err(DviError::BopWithinPage { offset: r.cursor() });
        }
        OpcodeClass::Eop => {
            if !state.stack.is_empty() {
                return Err(DviError::PageEndedWithoutEop {
                    bop_offset: r.cursor(),
                });
            }
            return Ok(true);
        }
        OpcodeClass::Push => state.push(),
        OpcodeClass::Pop => state.pop()?,
        OpcodeClass::Right(_) => {
            let font_space = cur_font_space(state, fonts);
            state.registers.out_space(
                first_param as i32,
                conv,
                font_space,
                limits.max_h,
                max_h_so_far,
                sink,
            );
        }
        OpcodeClass::W0 => {
            let w = state.registers.w;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .out_space(w, conv, font_space, limits.max_h, max_h_so_far, sink);
        }
        OpcodeClass::W(_) => {
            state.registers.w = first_param as i32;
            let w = state.registers.w;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .out_space(w, conv, font_space, limits.max_h, max_h_so_far, sink);
        }
        OpcodeClass::X0 => {
            let x = state.registers.x;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .out_space(x, conv, font_space, limits.max_h, max_h_so_far, sink);
        }
        OpcodeClass::X(_) => {
            state.registers.x = first_param as i32;
            let x = state.registers.x;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .out_space(x, conv, font_space, limits.max_h, max_h_so_far, sink);
        }
        OpcodeClass::Down(_) => {
            let font_space = cur_font_space(state, fonts);
            state.registers.move_down(
                first_param as i32,
                conv,
                font_space,
                limits.max_v,
                max_v_so_far,
                sink,
            );
        }
        OpcodeClass::Y0 => {
            let y = state.registers.y;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .move_down(y, conv, font_space, limits.max_v, max_v_so_far, sink);
        }
        OpcodeClass::Y(_) => {
            state.registers.y = first_param as i32;
            let y = state.registers.y;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .move_down(y, conv, font_space, limits.max_v, max_v_so_far, sink);
        }
        OpcodeClass::Z0 => {
            let z = state.registers.z;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .move_down(z, conv, font_space, limits.max_v, max_v_so_far, sink);
        }
        OpcodeClass::Z(_) => {
            state.registers.z = first_param as i32;
            let z = state.registers.z;
            let font_space = cur_font_space(state, fonts);
            state
                .registers
                .move_down(z, conv, font_space, limits.max_v, max_v_so_far, sink);
        }
        OpcodeClass::FntNumImplicit(_) | OpcodeClass::Fnt(_) => {
            let font_num = first_param as u32;
            if fonts.select(font_num, sink).is_some() {
                state.cur_font = Some(font_num);
            }
        }
        OpcodeClass::Xxx(_) => {
            let k = first_param;
            if k < 0 {
                return Err(DviError::IllegalCommandInSkip {
                    opcode: class_opcode_hint(class),
                });
            }
            let payload = r.get_bytes(k as usize);
            handle_special(payload, state, page, conv, magnification, display_dpi, sink);
        }
        OpcodeClass::FntDef(_) => {
            // Fonts are fully registered during the postamble sweep
            // (§4.5); a mid-page fnt_def only needs its body skipped so
            // the reader stays in sync with the rest of the page.
            let _checksum = r.get_u32();
            let _scaled_size = r.get_i32();
            let _design_size = r.get_i32();
            let dir_len = r.get_u8();
            let name_len = r.get_u8();
            let _name = r.get_bytes(dir_len as usize + name_len as usize);
        }
        OpcodeClass::Pre => {
            return Err(DviError::PreOrPostWithinPage {
                offset: r.cursor(),
                opcode_name: "pre",
            });
        }
        OpcodeClass::Post => {
            return Err(DviError::PreOrPostWithinPage {
                offset: r.cursor(),
                opcode_name: "post",
            });
        }
        OpcodeClass::PostPost => {
            return Err(DviError::PreOrPostWithinPage {
                offset: r.cursor(),
                opcode_name: "post_post",
            });
        }
        OpcodeClass::Undefined => {
            sink.report("undefined_opcode_250..255: ignoring and continuing");
        }
    }

    if matches!(class, OpcodeClass::Push) && state.max_depth_seen() > limits.max_s as usize {
        sink.report(&format!(
            "stack_depth_exceeds_claim: depth {} exceeds claimed maxS {}",
            state.max_depth_seen(),
            limits.max_s
        ));
    }

    Ok(false)
}

fn class_opcode_hint(class: OpcodeClass) -> u8 {
    match class {
        OpcodeClass::Xxx(width) => crate::opcode::XXX1 + width - 1,
        _ => 0,
    }
}

fn cur_font_space(state: &PageState, fonts: &FontRegistry) -> i32 {
    state
        .cur_font
        .and_then(|n| fonts.get(n))
        .map(|f| f.font_space)
        .unwrap_or(0)
}

fn set_or_put_char(
    code: u32,
    advances: bool,
    state: &mut PageState,
    page: &mut Page,
    fonts: &FontRegistry,
    conv: f64,
    sink: &mut dyn DiagnosticSink,
) {
    let Some(font_num) = state.cur_font else {
        sink.report("undefined_font: set/put with no font selected; ignoring");
        return;
    };
    let Some(font) = fonts.get(font_num) else {
        sink.report(&format!("undefined_font: font number {font_num} not defined"));
        return;
    };

    let glyph_index = resolve_glyph(font, code);
    if let Some(glyph_index) = glyph_index {
        emit_glyph_placement(page, font_num, glyph_index, font.font_scaled_pixel_size, state.registers.hh, state.registers.vv);
    } else {
        sink.report(&format!("invalid_glyph_in_font: no description for code {code} in font {font_num}"));
    }

    if advances {
        let (dvi_width, pixel_width) = match glyph_index {
            Some(glyph_index) => (
                font.width.get(&glyph_index).copied().unwrap_or(0),
                font.pixel_width.get(&glyph_index).copied().unwrap_or(0),
            ),
            None => (0, 0),
        };
        state.registers.h += dvi_width;
        state.registers.hh += pixel_width;
        let _ = conv; // width advance uses precomputed pixel widths, not conv directly
    }
}

fn emit_glyph_placement(page: &mut Page, font_num: u32, glyph_index: u32, sz: i32, x: i32, y: i32) {
    let page_font = match page.page_fonts.iter_mut().find(|pf| pf.font_num == font_num) {
        Some(pf) => pf,
        None => {
            page.page_fonts.push(PageFont {
                font_num,
                glyphs: Vec::new(),
            });
            page.page_fonts.last_mut().unwrap()
        }
    };
    let glyph = match page_font.glyphs.iter_mut().find(|g| g.glyph_index == glyph_index) {
        Some(g) => g,
        None => {
            page_font.glyphs.push(Glyph {
                glyph_index,
                glyph_sizes: Vec::new(),
            });
            page_font.glyphs.last_mut().unwrap()
        }
    };
    let glyph_size = match glyph.glyph_sizes.iter_mut().find(|gs| gs.sz == sz) {
        Some(gs) => gs,
        None => {
            glyph.glyph_sizes.push(GlyphSize {
                sz,
                glyph_placements: Vec::new(),
            });
            glyph.glyph_sizes.last_mut().unwrap()
        }
    };
    glyph_size.glyph_placements.push(GlyphPlacement { x, y });
}

fn emit_rule(
    height: i32,
    width: i32,
    advances: bool,
    state: &mut PageState,
    page: &mut Page,
    conv: f64,
    sink: &mut dyn DiagnosticSink,
) {
    if height > 0 && width > 0 {
        let w = crate::arithmetic::rule_pixels(conv, width);
        let h = crate::arithmetic::rule_pixels(conv, height);
        page.rules.push(Rule {
            x: state.registers.hh,
            y: state.registers.vv - h,
            w,
            h,
        });
    }
    if advances {
        let pixel_width = crate::arithmetic::rule_pixels(conv, width);
        state.registers.h += width;
        state.registers.hh += pixel_width;
    }
    let _ = sink;
}

/// `xxx*` special handling, §4.7: only `PSfile=` payloads are interpreted.
fn handle_special(
    payload: &[u8],
    state: &PageState,
    page: &mut Page,
    conv: f64,
    magnification: i32,
    display_dpi: u32,
    sink: &mut dyn DiagnosticSink,
) {
    if payload.iter().any(|&b| !(0o40..=0o176).contains(&b)) {
        sink.report("nonascii_in_special: ignoring non-printable byte in xxx payload");
    }

    let text = String::from_utf8_lossy(payload);
    let Some(rest) = text.strip_prefix("PSfile=") else {
        return;
    };

    let mut chars = rest.chars().peekable();
    if chars.peek() != Some(&'"') {
        return;
    }
    chars.next();
    let mut file_name = String::new();
    for c in chars.by_ref() {
        if c == '"' {
            break;
        }
        file_name.push(c);
    }
    let remainder: String = chars.collect();

    let mut llx = 0i32;
    let mut lly = 0i32;
    let mut urx = 0i32;
    let mut ury = 0i32;
    let mut rwi = 0i32;
    let mut rhi = 0i32;
    for token in remainder.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<i32>() else {
            continue;
        };
        match key {
            "llx" => llx = value,
            "lly" => lly = value,
            "urx" => urx = value,
            "ury" => ury = value,
            "rwi" => rwi = value,
            "rhi" => rhi = value,
            _ => {}
        }
    }

    if urx == llx || ury == lly {
        sink.report("degenerate_psfile_bbox: urx==llx or ury==lly; ignoring image");
        return;
    }

    let ps_width_scale = if rwi == 0 {
        1.0
    } else {
        f64::from(rwi) / 10.0 / f64::from(urx - llx)
    };
    let ps_height_scale = if rhi == 0 {
        ps_width_scale
    } else {
        f64::from(rhi) / 10.0 / f64::from(ury - lly)
    };
    let pixel_scale = f64::from(display_dpi) / 72.0 * (f64::from(magnification) / 1000.0);
    let w = (f64::from(urx - llx) * ps_width_scale * pixel_scale).floor() as i32;
    let h = (f64::from(ury - lly) * ps_height_scale * pixel_scale).floor() as i32;

    let _ = conv;
    page.images.push(crate::document::Image {
        file_name,
        x: state.registers.hh,
        y: state.registers.vv - h,
        w,
        h,
    });
}
