// Value tags.
pub const TAG_NULL: u8 = 0x00;
pub const TAG_BOOL: u8 = 0x01;
pub const TAG_INT32: u8 = 0x02;
pub const TAG_INT64: u8 = 0x03;
pub const TAG_FLOAT32: u8 = 0x04;
pub const TAG_FLOAT64: u8 = 0x05;
pub const TAG_STRING: u8 = 0x06;
pub const TAG_ENUM: u8 = 0x07;
pub const TAG_ARRAY: u8 = 0x08;
pub const TAG_DICTIONARY: u8 = 0x09;
pub const TAG_RECORD: u8 = 0x0A;
pub const TAG_REFERENCE: u8 = 0x0B;
pub const TAG_END_OF_STREAM: u8 = 0x7F;

// Type and schema reference markers.
pub const REF_DEFINE: u8 = 0x01;
pub const REF_REUSE: u8 = 0x02;

/// Recursion guard for hostile or corrupted input.
pub const MAX_NESTING: usize = 256;
