//! A minimal sfnt (OpenType/TrueType container) reader: just enough of
//! `head`, `hhea`/`hmtx`, and `cmap` to answer the questions C4/C5 ask of a
//! font asset. Not a general OpenType parser or shaping engine -- grounded
//! in shape on the teacher lineage's own `font::true_type::table` structs
//! (`FontDirectory`, `Head`, `CmapTable`/`CmapSubtable`), but reading only
//! the fields the DVI decoder actually consumes.

use std::collections::HashMap;

use crate::reader::Reader;

#[derive(Debug, thiserror::Error)]
pub enum OpenTypeError {
    #[error("sfnt table directory truncated")]
    TruncatedDirectory,
    #[error("required table {0:?} missing from font")]
    MissingTable(&'static str),
    #[error("unsupported cmap subtable format {0}")]
    UnsupportedCmapFormat(u16),
    #[error("no usable cmap subtable (unicode BMP/full or format 4/12) found")]
    NoUsableCmapSubtable,
}

struct TableDirectory {
    entries: HashMap<[u8; 4], (u32, u32)>, // tag -> (offset, length)
}

impl TableDirectory {
    fn read(r: &mut Reader) -> Result<Self, OpenTypeError> {
        if r.len() < 12 {
            return Err(OpenTypeError::TruncatedDirectory);
        }
        let _sfnt_version = r.get_u32();
        let num_tables = r.get_u16();
        let _search_range = r.get_u16();
        let _entry_selector = r.get_u16();
        let _range_shift = r.get_u16();

        let mut entries = HashMap::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let tag_bytes = r.get_bytes(4);
            let mut tag = [0u8; 4];
            tag.copy_from_slice(tag_bytes);
            let _checksum = r.get_u32();
            let offset = r.get_u32();
            let length = r.get_u32();
            entries.insert(tag, (offset, length));
        }
        Ok(Self { entries })
    }

    fn offset(&self, tag: &[u8; 4]) -> Option<u32> {
        self.entries.get(tag).map(|(offset, _)| *offset)
    }
}

/// The subset of a font file's data the registry needs: units-per-em (for
/// deriving pixel widths in §4.4) and, per glyph, its advance width and its
/// Unicode-to-glyph-index mapping (consumed by the resolver in §4.5).
#[derive(Debug, Clone, Default)]
pub struct FontAsset {
    pub units_per_em: u16,
    /// glyph index -> advance width, in font design units
    pub advance_width: HashMap<u32, u16>,
    /// Unicode scalar value -> glyph index
    pub glyph_index_map: HashMap<u32, u32>,
}

impl FontAsset {
    pub fn parse(bytes: &[u8]) -> Result<Self, OpenTypeError> {
        let mut r = Reader::new(bytes);
        let directory = TableDirectory::read(&mut r)?;

        let units_per_em = read_units_per_em(bytes, &directory)?;
        let advance_width = read_advance_widths(bytes, &directory)?;
        let glyph_index_map = read_cmap(bytes, &directory)?;

        Ok(FontAsset {
            units_per_em,
            advance_width,
            glyph_index_map,
        })
    }
}

fn read_units_per_em(bytes: &[u8], dir: &TableDirectory) -> Result<u16, OpenTypeError> {
    let offset = dir.offset(b"head").ok_or(OpenTypeError::MissingTable("head"))?;
    let mut r = Reader::new(bytes);
    r.peek_set(offset as usize + 18); // version[4] + fontRevision[4] + checksumAdjustment[4] + magicNumber[4] + flags[2]
    Ok(r.get_u16())
}

fn read_advance_widths(
    bytes: &[u8],
    dir: &TableDirectory,
) -> Result<HashMap<u32, u16>, OpenTypeError> {
    let hhea_offset = match dir.offset(b"hhea") {
        Some(o) => o,
        None => return Ok(HashMap::new()),
    };
    let hmtx_offset = match dir.offset(b"hmtx") {
        Some(o) => o,
        None => return Ok(HashMap::new()),
    };

    let mut r = Reader::new(bytes);
    r.peek_set(hhea_offset as usize + 34); // up to numberOfHMetrics, see OpenType `hhea` layout
    let number_of_h_metrics = r.get_u16();

    let mut widths = HashMap::with_capacity(number_of_h_metrics as usize);
    let mut r = Reader::new(bytes);
    r.peek_set(hmtx_offset as usize);
    for glyph in 0..number_of_h_metrics as u32 {
        let advance_width = r.get_u16();
        let _left_side_bearing = r.get_i16();
        widths.insert(glyph, advance_width);
    }
    Ok(widths)
}

fn read_cmap(bytes: &[u8], dir: &TableDirectory) -> Result<HashMap<u32, u32>, OpenTypeError> {
    let cmap_offset = dir.offset(b"cmap").ok_or(OpenTypeError::MissingTable("cmap"))?;

    let mut r = Reader::new(bytes);
    r.peek_set(cmap_offset as usize);
    let _version = r.get_u16();
    let num_tables = r.get_u16();

    let mut best_subtable_offset = None;
    let mut best_score = -1i32;
    for _ in 0..num_tables {
        let platform_id = r.get_u16();
        let encoding_id = r.get_u16();
        let offset = r.get_u32();

        // Prefer Windows Unicode BMP (3,1) or full-repertoire (3,10), then
        // any Unicode platform (0, *).
        let score = match (platform_id, encoding_id) {
            (3, 10) => 3,
            (3, 1) => 2,
            (0, _) => 1,
            _ => 0,
        };
        if score > best_score {
            best_score = score;
            best_subtable_offset = Some(cmap_offset as usize + offset as usize);
        }
    }

    let subtable_offset = best_subtable_offset.ok_or(OpenTypeError::NoUsableCmapSubtable)?;
    let mut r = Reader::new(bytes);
    r.peek_set(subtable_offset);
    let format = r.get_u16();

    match format {
        4 => read_cmap_format4(bytes, subtable_offset),
        12 => read_cmap_format12(bytes, subtable_offset),
        other => Err(OpenTypeError::UnsupportedCmapFormat(other)),
    }
}

fn read_cmap_format4(bytes: &[u8], offset: usize) -> Result<HashMap<u32, u32>, OpenTypeError> {
    let mut r = Reader::new(bytes);
    r.peek_set(offset);
    let _format = r.get_u16();
    let _length = r.get_u16();
    let _language = r.get_u16();
    let seg_count_x2 = r.get_u16();
    let seg_count = seg_count_x2 as usize / 2;
    let _search_range = r.get_u16();
    let _entry_selector = r.get_u16();
    let _range_shift = r.get_u16();

    let end_code: Vec<u16> = (0..seg_count).map(|_| r.get_u16()).collect();
    let _reserved_pad = r.get_u16();
    let start_code: Vec<u16> = (0..seg_count).map(|_| r.get_u16()).collect();
    let id_delta: Vec<i16> = (0..seg_count).map(|_| r.get_i16()).collect();
    let id_range_offset_pos = r.cursor();
    let id_range_offset: Vec<u16> = (0..seg_count).map(|_| r.get_u16()).collect();

    let mut map = HashMap::new();
    for seg in 0..seg_count {
        let start = start_code[seg];
        let end = end_code[seg];
        if start == 0xFFFF && end == 0xFFFF {
            continue;
        }
        for code in start..=end {
            let glyph_index = if id_range_offset[seg] == 0 {
                (i32::from(id_delta[seg]) + i32::from(code)) as u32 & 0xFFFF
            } else {
                let addr = id_range_offset_pos
                    + seg * 2
                    + id_range_offset[seg] as usize
                    + (code - start) as usize * 2;
                let mut gr = Reader::new(bytes);
                gr.peek_set(addr);
                let raw = gr.get_u16();
                if raw == 0 {
                    0
                } else {
                    (i32::from(id_delta[seg]) + i32::from(raw)) as u32 & 0xFFFF
                }
            };
            if glyph_index != 0 {
                map.insert(code as u32, glyph_index);
            }
        }
    }
    Ok(map)
}

fn read_cmap_format12(bytes: &[u8], offset: usize) -> Result<HashMap<u32, u32>, OpenTypeError> {
    let mut r = Reader::new(bytes);
    r.peek_set(offset);
    let _format = r.get_u16();
    let _reserved = r.get_u16();
    let _length = r.get_u32();
    let _language = r.get_u32();
    let num_groups = r.get_u32();

    let mut map = HashMap::new();
    for _ in 0..num_groups {
        let start_char_code = r.get_u32();
        let end_char_code = r.get_u32();
        let start_glyph_code = r.get_u32();
        for (i, code) in (start_char_code..=end_char_code).enumerate() {
            map.insert(code, start_glyph_code + i as u32);
        }
    }
    Ok(map)
}
