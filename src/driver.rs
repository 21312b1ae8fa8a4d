//! C7: the two-pass page driver. Pass 1 discovers the postamble by walking
//! backward from the end of the file, collects and loads every font
//! definition; Pass 2 re-scans from just after the preamble, translating
//! each page's opcode stream through [`crate::state_machine`].

use std::collections::HashMap;

use crate::diagnostics::DiagnosticSink;
use crate::document::{Document, Page};
use crate::error::{DviError, DviResult};
use crate::fontreg::{split_composite_name, FontDefinition, FontRegistry};
use crate::fontreg::asset::FontAssetSource;
use crate::fontreg::glyph_description::GlyphDescriptionSource;
use crate::opcode::{self, OpcodeClass};
use crate::options::DecodeOptions;
use crate::reader::Reader;
use crate::state_machine::{translate_opcode, PageLimits, PageState};

/// Conversion factors derived from the preamble (§4.1/§9 Glossary).
struct Conv {
    conv: f64,
    /// Unmagnified pixels-per-DVI-unit; established per the preamble but not
    /// consumed downstream since virtual fonts are out of scope.
    #[allow(dead_code)]
    true_conv: f64,
}

struct Preamble {
    numerator: i32,
    denominator: i32,
    magnification: i32,
    after_pre: usize,
    conv: Conv,
}

fn read_preamble(buf: &[u8], options: &DecodeOptions) -> DviResult<Preamble> {
    let mut r = Reader::new(buf);
    let opcode = r.get_u8();
    if opcode != opcode::PRE {
        return Err(DviError::BadPreamble {
            reason: format!("expected pre (247) at offset 0, found {opcode}"),
        });
    }
    let id = r.get_u8();
    if id != 2 {
        return Err(DviError::MissingIdByte { found: id });
    }
    let numerator = r.get_i32();
    let denominator = r.get_i32();
    let file_magnification = r.get_i32();
    if numerator <= 0 || denominator <= 0 {
        return Err(DviError::NonpositiveNumeratorOrDenominator {
            numerator,
            denominator,
        });
    }
    if file_magnification <= 0 {
        return Err(DviError::NonpositiveMagnification(file_magnification));
    }
    let k = r.get_u8();
    let _comment = r.get_bytes(k as usize);

    let magnification = if options.magnification_override > 0 {
        options.magnification_override as i32
    } else {
        file_magnification
    };

    let conv = f64::from(numerator) / 254000.0 * (f64::from(options.display_dpi) / f64::from(denominator))
        * (f64::from(magnification) / 1000.0);
    let true_conv = conv / (f64::from(magnification) / 1000.0);

    Ok(Preamble {
        numerator,
        denominator,
        magnification,
        after_pre: r.cursor(),
        conv: Conv { conv, true_conv },
    })
}

/// Backward-scan result: the postamble's own `post` offset (`q`), already
/// bounds-checked.
struct TrailerLocation {
    post_offset: i32,
}

fn find_postamble(buf: &[u8]) -> DviResult<TrailerLocation> {
    let length = buf.len();
    if length < 53 {
        return Err(DviError::TruncatedInput { offset: length });
    }

    let mut cursor = length;
    while cursor > 0 && buf[cursor - 1] == 223 {
        cursor -= 1;
    }
    if length - cursor < 4 {
        return Err(DviError::InsufficientTrailer);
    }

    if cursor < 1 {
        return Err(DviError::TruncatedInput { offset: cursor });
    }
    let id_byte = buf[cursor - 1];
    if id_byte != 2 {
        return Err(DviError::MissingIdByte { found: id_byte });
    }
    cursor -= 1;

    if cursor < 4 {
        return Err(DviError::TruncatedInput { offset: cursor });
    }
    let mut q_bytes = [0u8; 4];
    q_bytes.copy_from_slice(&buf[cursor - 4..cursor]);
    let post_offset = i32::from_be_bytes(q_bytes);
    cursor -= 4;

    if cursor < 1 {
        return Err(DviError::TruncatedInput { offset: cursor });
    }
    let post_post_opcode = buf[cursor - 1];
    if post_post_opcode != opcode::POST_POST {
        return Err(DviError::BadPostambleMarker {
            offset: cursor - 1,
            found: post_post_opcode,
        });
    }

    if post_offset < 0 || post_offset as usize > length.saturating_sub(33) {
        return Err(DviError::BadPostamblePointer {
            pointer: post_offset,
            length,
        });
    }

    Ok(TrailerLocation { post_offset })
}

struct PostambleHeader {
    max_v: i32,
    max_h: i32,
    max_s: u16,
}

/// Pass 1: read the postamble header, collect and define every font,
/// verify the `post_post` trailer that closes the file.
#[allow(clippy::too_many_arguments)]
fn sweep_postamble(
    buf: &[u8],
    preamble: &Preamble,
    post_offset: i32,
    display_dpi: u32,
    debug: bool,
    fonts: &dyn FontAssetSource,
    font_dirs: &HashMap<String, String>,
    glyph_descriptions: &dyn GlyphDescriptionSource,
    lua_root: &str,
    registry: &mut FontRegistry,
    sink: &mut dyn DiagnosticSink,
) -> DviResult<PostambleHeader> {
    let mut r = Reader::new(buf);
    r.peek_set(post_offset as usize);

    let opcode = r.get_u8();
    if opcode != crate::opcode::POST {
        return Err(DviError::BadPostambleMarker {
            offset: post_offset as usize,
            found: opcode,
        });
    }
    let _prev_bop_ptr = r.get_i32();
    let numerator = r.get_i32();
    let denominator = r.get_i32();
    let magnification = r.get_i32();
    if numerator != preamble.numerator
        || denominator != preamble.denominator
        || magnification != preamble.magnification
    {
        sink.report("mismatched_preamble_postamble_fields: postamble numerator/denominator/magnification differ from preamble");
    }
    let max_v = r.get_i32();
    let max_h = r.get_i32();
    let max_s = r.get_u16();
    let _total_pages = r.get_u16();

    loop {
        let opcode_offset = r.cursor();
        let opcode = r.get_u8();
        let class = OpcodeClass::classify(opcode);
        if debug {
            sink.report(&format!("trace: offset={opcode_offset} opcode={opcode}"));
        }
        match class {
            OpcodeClass::Nop => continue,
            OpcodeClass::FntDef(_) => {
                let raw_font_num = opcode::first_parameter(class, &mut r);
                if raw_font_num < 0 {
                    return Err(DviError::IllegalCommandInSkip { opcode });
                }
                let font_num = raw_font_num as u32;
                define_font_from_body(
                    &mut r,
                    font_num,
                    preamble,
                    display_dpi,
                    registry,
                    fonts,
                    font_dirs,
                    glyph_descriptions,
                    lua_root,
                    sink,
                )?;
            }
            OpcodeClass::PostPost => break,
            _ => return Err(DviError::IllegalCommandInSkip { opcode }),
        }
    }

    let trailer_post_offset = r.get_i32();
    if trailer_post_offset != post_offset {
        return Err(DviError::BadPostamblePointer {
            pointer: trailer_post_offset,
            length: buf.len(),
        });
    }
    let id_byte = r.get_u8();
    if id_byte != 2 {
        return Err(DviError::MissingIdByte { found: id_byte });
    }
    let mut trailer_count = 0;
    while !r.eof() {
        if r.get_u8() != 223 {
            return Err(DviError::InsufficientTrailer);
        }
        trailer_count += 1;
    }
    if trailer_count < 4 {
        return Err(DviError::InsufficientTrailer);
    }

    Ok(PostambleHeader { max_v, max_h, max_s })
}

#[allow(clippy::too_many_arguments)]
fn define_font_from_body(
    r: &mut Reader,
    font_num: u32,
    preamble: &Preamble,
    display_dpi: u32,
    registry: &mut FontRegistry,
    fonts: &dyn FontAssetSource,
    font_dirs: &HashMap<String, String>,
    glyph_descriptions: &dyn GlyphDescriptionSource,
    lua_root: &str,
    sink: &mut dyn DiagnosticSink,
) -> DviResult<()> {
    let checksum = r.get_u32();
    let scaled_size = r.get_i32();
    let design_size = r.get_i32();
    let dir_len = r.get_u8();
    let name_len = r.get_u8();
    let raw_name = r.get_bytes(dir_len as usize + name_len as usize);
    let composite: String = raw_name
        .iter()
        .filter(|&&b| b != 0o133 && b != 0o135)
        .map(|&b| b as char)
        .collect();
    let (dir_path, font_name, features) = split_composite_name(&composite);

    let def = FontDefinition {
        font_num,
        checksum,
        scaled_size,
        design_size,
        dir_path,
        font_name,
        features,
    };

    registry.define_font(
        def,
        preamble.magnification,
        preamble.conv.conv,
        display_dpi,
        fonts,
        font_dirs,
        glyph_descriptions,
        lua_root,
        sink,
    )
}

/// The public entry point named in §6.
#[allow(clippy::too_many_arguments)]
pub fn decode(
    dvi: &[u8],
    options: DecodeOptions,
    fonts: &dyn FontAssetSource,
    font_dirs: &HashMap<String, String>,
    glyph_descriptions: &dyn GlyphDescriptionSource,
    lua_root: &str,
    sink: &mut dyn DiagnosticSink,
) -> DviResult<Document> {
    let preamble = read_preamble(dvi, &options)?;
    let trailer = find_postamble(dvi)?;

    let mut registry = FontRegistry::default();
    let postamble = sweep_postamble(
        dvi,
        &preamble,
        trailer.post_offset,
        options.display_dpi,
        options.debug,
        fonts,
        font_dirs,
        glyph_descriptions,
        lua_root,
        &mut registry,
        sink,
    )?;

    let mut document = Document::default();
    let mut r = Reader::new(dvi);
    r.peek_set(preamble.after_pre);

    let mut prev_bop_offset: i32 = -1;
    let mut max_h_so_far = 0i32;
    let mut max_v_so_far = 0i32;

    loop {
        let opcode_offset = r.cursor();
        let opcode = r.get_u8();
        let class = OpcodeClass::classify(opcode);
        if options.debug {
            sink.report(&format!("trace: offset={opcode_offset} opcode={opcode}"));
        }
        match class {
            OpcodeClass::Nop => continue,
            OpcodeClass::FntDef(_) => {
                // Fonts are fully registered during Pass 1; a mid-stream
                // fnt_def before the first bop just needs its body skipped.
                let _font_num = opcode::first_parameter(class, &mut r);
                let _checksum = r.get_u32();
                let _scaled_size = r.get_i32();
                let _design_size = r.get_i32();
                let dir_len = r.get_u8();
                let name_len = r.get_u8();
                let _name = r.get_bytes(dir_len as usize + name_len as usize);
            }
            OpcodeClass::Bop => {
                let mut counts = [0i32; 10];
                for count in &mut counts {
                    *count = r.get_i32();
                }
                let backpointer = r.get_i32();
                if backpointer != prev_bop_offset {
                    sink.report(&format!(
                        "nonmatching_backpointer: bop at {opcode_offset} has backpointer {backpointer}, expected {prev_bop_offset}"
                    ));
                }
                prev_bop_offset = opcode_offset as i32;

                let mut page = Page::default();
                let mut state = PageState::new();
                let limits = PageLimits {
                    max_h: postamble.max_h,
                    max_v: postamble.max_v,
                    max_s: postamble.max_s,
                };

                loop {
                    let op_offset = r.cursor();
                    let op = r.get_u8();
                    let class = OpcodeClass::classify(op);
                    if options.debug {
                        sink.report(&format!("trace: offset={op_offset} opcode={op}"));
                    }
                    let first_param = opcode::first_parameter(class, &mut r);
                    let is_eop = translate_opcode(
                        class,
                        first_param,
                        &mut r,
                        &mut state,
                        &mut page,
                        &registry,
                        &limits,
                        preamble.conv.conv,
                        preamble.magnification,
                        options.display_dpi,
                        &mut max_h_so_far,
                        &mut max_v_so_far,
                        sink,
                    )?;
                    if is_eop {
                        break;
                    }
                    if r.eof() {
                        return Err(DviError::PageEndedWithoutEop {
                            bop_offset: opcode_offset,
                        });
                    }
                }
                document.pages.push(page);
            }
            OpcodeClass::Post => break,
            _ => {
                return Err(DviError::NonBopWhereBopExpected {
                    offset: opcode_offset,
                    found: opcode,
                })
            }
        }
    }

    crate::consolidate::consolidate(&mut document, &registry);
    Ok(document)
}
