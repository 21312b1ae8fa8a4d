use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use dvi_decode::{decode, DecodeOptions, LogDiagnosticSink, OpenTypeFontAssetSource};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let dvi_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: dvi <file.dvi> [--font-dir NAME=PATH]... [--lua-root DIR] [--dpi N]");
            return ExitCode::FAILURE;
        }
    };

    let mut font_dirs: HashMap<String, String> = HashMap::new();
    let mut lua_root = String::from(".");
    let mut options = DecodeOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--font-dir" => {
                if let Some(spec) = args.next() {
                    if let Some((name, path)) = spec.split_once('=') {
                        font_dirs.insert(name.to_owned(), path.to_owned());
                    }
                }
            }
            "--lua-root" => {
                if let Some(dir) = args.next() {
                    lua_root = dir;
                }
            }
            "--dpi" => {
                if let Some(dpi) = args.next().and_then(|s| s.parse().ok()) {
                    options.display_dpi = dpi;
                }
            }
            "--debug" => options.debug = true,
            other => {
                eprintln!("unrecognized argument: {other}");
                return ExitCode::FAILURE;
            }
        }
    }

    let dvi_bytes = match std::fs::read(PathBuf::from(&dvi_path)) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read {dvi_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let fonts = OpenTypeFontAssetSource;
    let glyph_descriptions = dvi_decode::JsonGlyphDescriptionSource;
    let mut sink = LogDiagnosticSink;

    match decode(&dvi_bytes, options, &fonts, &font_dirs, &glyph_descriptions, &lua_root, &mut sink) {
        Ok(document) => {
            println!(
                "{} font(s), {} page(s)",
                document.fonts.len(),
                document.pages.len()
            );
            for page in &document.pages {
                println!(
                    "  page: {} font(s), {} rule(s), {} image(s)",
                    page.page_fonts.len(),
                    page.rules.len(),
                    page.images.len()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("decode failed: {e}");
            ExitCode::FAILURE
        }
    }
}
