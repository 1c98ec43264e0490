//! The 32-bit permissions word `P`.

use bitflags::bitflags;

bitflags! {
    /// User-access permissions (ISO 32000-1 Table 22). Bit positions are
    /// 1-based in the standard; bit 3 is `1 << 2` here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_ACCESSIBLE = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_RES = 1 << 11;
    }
}

impl Permissions {
    /// All feature bits granted.
    pub fn all_granted() -> Self {
        Self::all()
    }

    /// Interpret the signed `P` value from an encryption dictionary.
    pub fn from_p(p: i64) -> Self {
        Self::from_bits_truncate(p as u32)
    }

    /// The signed `P` value with the reserved bits filled the way R≥3
    /// handlers expect (bits 7-8 and 13-32 set, bits 1-2 clear).
    pub fn to_p(self) -> i32 {
        (self.bits() | 0xFFFF_F0C0) as i32
    }
}
