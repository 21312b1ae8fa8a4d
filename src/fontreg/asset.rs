//! The external collaborator boundary for font files (§4.4.1). The core
//! never touches a font file directly; it asks a `FontAssetSource` for the
//! handful of numbers (units-per-em, advance widths, cmap) it needs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{DviError, DviResult};
use crate::fontreg::opentype;

pub use crate::fontreg::opentype::FontAsset;

/// Loads the measurements a font registry entry needs from a font name and
/// containing directory. `features` is passed through unexamined -- the
/// spec explicitly does not require parsing it, only preserving it on the
/// consolidated [`crate::document::Font`] (§9 open question, resolved: not
/// enforced).
pub trait FontAssetSource {
    fn load(&self, name: &str, dir_path: &str, features: &str) -> DviResult<FontAsset>;
}

/// Reads a real OpenType/TrueType font file named `<dir_path>/<name>.otf` (or
/// `.ttf`, tried as a fallback) from disk.
#[derive(Debug, Default)]
pub struct OpenTypeFontAssetSource;

impl FontAssetSource for OpenTypeFontAssetSource {
    fn load(&self, name: &str, dir_path: &str, _features: &str) -> DviResult<FontAsset> {
        let otf_path = Path::new(dir_path).join(format!("{name}.otf"));
        let ttf_path = Path::new(dir_path).join(format!("{name}.ttf"));

        let bytes = fs::read(&otf_path)
            .or_else(|_| fs::read(&ttf_path))
            .map_err(|e| DviError::FontAssetLoadFailure {
                font_name: name.to_owned(),
                source: anyhow::Error::new(e).context(format!(
                    "could not read {} or {}",
                    otf_path.display(),
                    ttf_path.display()
                )),
            })?;

        opentype::FontAsset::parse(&bytes).map_err(|e| DviError::FontAssetLoadFailure {
            font_name: name.to_owned(),
            source: anyhow::Error::new(e),
        })
    }
}

/// A test double that returns canned assets instead of touching the
/// filesystem.
#[derive(Debug, Default)]
pub struct StaticFontAssetSource {
    pub assets: HashMap<String, FontAsset>,
}

impl FontAssetSource for StaticFontAssetSource {
    fn load(&self, name: &str, _dir_path: &str, _features: &str) -> DviResult<FontAsset> {
        self.assets
            .get(name)
            .cloned()
            .ok_or_else(|| DviError::FontAssetLoadFailure {
                font_name: name.to_owned(),
                source: anyhow::anyhow!("no static asset registered for {name:?}"),
            })
    }
}
