use thiserror::Error;

/// Fatal decode errors. Each one unwinds the whole decode; see the
/// non-fatal diagnostics emitted through [`crate::diagnostics::DiagnosticSink`]
/// for conditions that are merely logged and do not abort.
#[derive(Debug, Error)]
pub enum DviError {
    #[error("unexpected end of input at offset {offset}")]
    TruncatedInput { offset: usize },

    #[error("bad preamble: {reason}")]
    BadPreamble { reason: String },

    #[error("expected post (248) opcode at postamble pointer {offset}, found {found}")]
    BadPostambleMarker { offset: usize, found: u8 },

    #[error("postamble pointer {pointer} out of range for a {length}-byte file")]
    BadPostamblePointer { pointer: i32, length: usize },

    #[error("fewer than 4 trailing 0xdf (223) bytes before end of file")]
    InsufficientTrailer,

    #[error("expected id byte 2, found {found}")]
    MissingIdByte { found: u8 },

    #[error("expected bop (139) at offset {offset}, found opcode {found}")]
    NonBopWhereBopExpected { offset: usize, found: u8 },

    #[error("illegal opcode {opcode} encountered while skipping to the next bop/post")]
    IllegalCommandInSkip { opcode: u8 },

    #[error("nonpositive numerator ({numerator}) or denominator ({denominator})")]
    NonpositiveNumeratorOrDenominator { numerator: i32, denominator: i32 },

    #[error("nonpositive magnification ({0})")]
    NonpositiveMagnification(i32),

    #[error("page beginning at offset {bop_offset} ran off the end of the input without an eop")]
    PageEndedWithoutEop { bop_offset: usize },

    #[error("bop encountered at offset {offset} while a page was already open")]
    BopWithinPage { offset: usize },

    #[error("{opcode_name} encountered at offset {offset} while a page was open")]
    PreOrPostWithinPage {
        offset: usize,
        opcode_name: &'static str,
    },

    #[error("stack underflow: pop with no matching push")]
    StackUnderflow,

    #[error("failed to load font asset for {font_name:?}: {source}")]
    FontAssetLoadFailure {
        font_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load glyph description table for {font_name:?}: {source}")]
    GlyphDescriptionLoadFailure {
        font_name: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type DviResult<T> = Result<T, DviError>;
