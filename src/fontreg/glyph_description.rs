//! The second external collaborator boundary named in §4.4.1: the
//! auxiliary per-font glyph-description files (LuaTeX's "Lua tables",
//! treated here as JSON per §9's resolved open question) mapping a DVI
//! character code to a glyph index and, optionally, a Unicode value.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DviError, DviResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UnicodeValue {
    Scalar(u32),
    Sequence(Vec<u32>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlyphDescription {
    pub glyph_index: u32,
    pub unicode: Option<UnicodeValue>,
}

#[derive(Debug, Deserialize)]
struct DescriptionFile {
    descriptions: HashMap<String, GlyphDescription>,
}

/// Loads the map of character code (as a decimal string key, matching the
/// source format) to [`GlyphDescription`] for one font.
pub trait GlyphDescriptionSource {
    fn load(&self, font_name: &str, lua_root: &str) -> DviResult<HashMap<String, GlyphDescription>>;
}

/// Reads `<lua_root>/<font_name, lowercased>.lua` as JSON and extracts its
/// `descriptions` object. The on-disk extension is `.lua` for continuity
/// with the LuaTeX tool that emits these files; the content itself is JSON.
#[derive(Debug, Default)]
pub struct JsonGlyphDescriptionSource;

impl GlyphDescriptionSource for JsonGlyphDescriptionSource {
    fn load(&self, font_name: &str, lua_root: &str) -> DviResult<HashMap<String, GlyphDescription>> {
        let path = Path::new(lua_root).join(format!("{}.lua", font_name.to_lowercase()));
        let text = fs::read_to_string(&path).map_err(|e| DviError::GlyphDescriptionLoadFailure {
            font_name: font_name.to_owned(),
            source: anyhow::Error::new(e).context(format!("reading {}", path.display())),
        })?;

        let parsed: DescriptionFile =
            serde_json::from_str(&text).map_err(|e| DviError::GlyphDescriptionLoadFailure {
                font_name: font_name.to_owned(),
                source: anyhow::Error::new(e).context(format!("parsing {}", path.display())),
            })?;

        Ok(parsed.descriptions)
    }
}

/// A test double that returns canned descriptions instead of touching the
/// filesystem.
#[derive(Debug, Default)]
pub struct StaticGlyphDescriptionSource {
    pub descriptions: HashMap<String, HashMap<String, GlyphDescription>>,
}

impl GlyphDescriptionSource for StaticGlyphDescriptionSource {
    fn load(&self, font_name: &str, _lua_root: &str) -> DviResult<HashMap<String, GlyphDescription>> {
        self.descriptions
            .get(font_name)
            .cloned()
            .ok_or_else(|| DviError::GlyphDescriptionLoadFailure {
                font_name: font_name.to_owned(),
                source: anyhow::anyhow!("no static descriptions registered for {font_name:?}"),
            })
    }
}
