//! Configuration for a single [`crate::decode`] call (§6).

#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Target display DPI. Spec §6 default: 96.
    pub display_dpi: u32,
    /// If greater than 0, overrides the DVI's own magnification; otherwise
    /// the in-file value is used.
    pub magnification_override: u32,
    /// When set, opcode traces are sent to the diagnostic sink prefixed
    /// with the byte offset of the opcode being processed.
    pub debug: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            display_dpi: 96,
            magnification_override: 0,
            debug: false,
        }
    }
}
