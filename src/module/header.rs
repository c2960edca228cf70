//! Bit-exact module image header (§6).
//!
//! Little-endian, fixed layout. [`ModuleHeader::parse`] and
//! [`ModuleHeader::encode`] are the only place that knows the wire
//! format; everything else in [`super::manager`] works with the parsed
//! struct.

// Layer 1: Standard library imports
use std::convert::TryFrom;

// Layer 2: Third-party crate imports
use bitflags::bitflags;

/// `"MOD\0"` read as a little-endian `u32` (§6).
pub const MAGIC: u32 = 0x0044_4F4D;

/// The only header version this core understands.
pub const HEADER_VERSION: u32 = 1;

const NAME_LEN: usize = 64;
const DESCRIPTION_LEN: usize = 256;
const AUTHOR_LEN: usize = 128;
const LICENSE_LEN: usize = 64;

/// Size in bytes of the fixed header, computed from §6's field list.
pub const HEADER_SIZE: usize = 4 // magic
    + 4 // header_version
    + 4 // module_version
    + NAME_LEN
    + DESCRIPTION_LEN
    + AUTHOR_LEN
    + LICENSE_LEN
    + 1 // module_type
    + 1 // priority
    + 2 // flags
    + 4 // code_size
    + 4 // data_size
    + 4 // bss_size
    + 4 // entry_point_offset
    + 4 // exit_point_offset
    + 4 // symbol_count
    + 4 // symbol_table_offset
    + 4 // dependency_count
    + 4 // dependency_table_offset
    + 4 // checksum
    + 4; // signature

/// Maximum total image size and maximum per-section size (§6).
pub const MAX_IMAGE_SIZE: usize = 1024 * 1024;

/// Module category tag (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModuleType {
    /// Device driver.
    Driver = 0,
    /// Filesystem implementation.
    Filesystem = 1,
    /// Network stack component.
    Network = 2,
    /// Scheduler extension.
    Scheduler = 3,
    /// Memory management component.
    Memory = 4,
    /// Security policy component.
    Security = 5,
    /// Behavioral supervisor extension.
    Supervisor = 6,
    /// Ordinary user module.
    User = 7,
    /// Anything not covered above.
    Misc = 8,
}

impl TryFrom<u8> for ModuleType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Driver,
            1 => Self::Filesystem,
            2 => Self::Network,
            3 => Self::Scheduler,
            4 => Self::Memory,
            5 => Self::Security,
            6 => Self::Supervisor,
            7 => Self::User,
            8 => Self::Misc,
            _ => return Err(()),
        })
    }
}

bitflags! {
    /// Module flags (§6): `core=0x01`, `auto-start=0x02`, `hot-swap=0x04`,
    /// `monitored=0x08`, `privileged=0x10`, `persistent=0x20`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModuleFlags: u16 {
        /// Cannot be unloaded while set (§3 invariant).
        const CORE = 0x01;
        /// `module_start` is invoked automatically on successful load.
        const AUTO_START = 0x02;
        /// `module_hot_swap` is permitted only when this bit is set.
        const HOT_SWAP = 0x04;
        /// The supervisor samples this module's pattern.
        const MONITORED = 0x08;
        /// Elevated default sandbox security level.
        const PRIVILEGED = 0x10;
        /// Carried through for interface completeness; persistence across
        /// restart is a declared Non-goal (§1) and this core never acts on it.
        const PERSISTENT = 0x20;
    }
}

/// Parsed module image header (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHeader {
    /// Module semantic version.
    pub module_version: u32,
    /// Name, ≤64 bytes (§3), decoded from its NUL-padded field.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Free-text author.
    pub author: String,
    /// Free-text license identifier.
    pub license: String,
    /// Module category.
    pub module_type: ModuleType,
    /// Scheduling priority to seed any actors the module spawns.
    pub priority: u8,
    /// Module flags.
    pub flags: ModuleFlags,
    /// Code section size in bytes.
    pub code_size: u32,
    /// Data section size in bytes.
    pub data_size: u32,
    /// BSS section size in bytes (not stored in the image; zeroed on load).
    pub bss_size: u32,
    /// Entry-point offset, relative to the code base.
    pub entry_point_offset: u32,
    /// Exit-point offset, relative to the code base.
    pub exit_point_offset: u32,
    /// Number of exported symbol table entries.
    pub symbol_count: u32,
    /// Byte offset of the symbol table within the image.
    pub symbol_table_offset: u32,
    /// Number of dependency table entries.
    pub dependency_count: u32,
    /// Byte offset of the dependency table within the image.
    pub dependency_table_offset: u32,
    /// Opaque checksum, carried through but not verified (§1 Non-goals:
    /// signature verification is a pluggable hook, not a requirement).
    pub checksum: u32,
    /// Opaque signature, carried through unverified.
    pub signature: u32,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(buf)
}

fn read_fixed_str(bytes: &[u8], offset: usize, len: usize) -> String {
    let field = &bytes[offset..offset + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_fixed_str(buf: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}

impl ModuleHeader {
    /// Parse a header from the start of `image`.
    ///
    /// Returns `None` if `image` is shorter than [`HEADER_SIZE`], the
    /// magic does not match, the header version is unsupported, or the
    /// module type/flags fields are malformed. Section-size and
    /// total-size bound checks are the caller's job (`module_validate`,
    /// §4.C step 1) since they require the full image length.
    pub fn parse(image: &[u8]) -> Option<Self> {
        if image.len() < HEADER_SIZE {
            return None;
        }
        let mut offset = 0usize;

        let magic = read_u32(image, offset);
        offset += 4;
        if magic != MAGIC {
            return None;
        }

        let header_version = read_u32(image, offset);
        offset += 4;
        if header_version != HEADER_VERSION {
            return None;
        }

        let module_version = read_u32(image, offset);
        offset += 4;

        let name = read_fixed_str(image, offset, NAME_LEN);
        offset += NAME_LEN;
        let description = read_fixed_str(image, offset, DESCRIPTION_LEN);
        offset += DESCRIPTION_LEN;
        let author = read_fixed_str(image, offset, AUTHOR_LEN);
        offset += AUTHOR_LEN;
        let license = read_fixed_str(image, offset, LICENSE_LEN);
        offset += LICENSE_LEN;

        let module_type = ModuleType::try_from(image[offset]).ok()?;
        offset += 1;
        let priority = image[offset];
        offset += 1;

        let flags = ModuleFlags::from_bits_truncate(read_u16(image, offset));
        offset += 2;

        let code_size = read_u32(image, offset);
        offset += 4;
        let data_size = read_u32(image, offset);
        offset += 4;
        let bss_size = read_u32(image, offset);
        offset += 4;
        let entry_point_offset = read_u32(image, offset);
        offset += 4;
        let exit_point_offset = read_u32(image, offset);
        offset += 4;
        let symbol_count = read_u32(image, offset);
        offset += 4;
        let symbol_table_offset = read_u32(image, offset);
        offset += 4;
        let dependency_count = read_u32(image, offset);
        offset += 4;
        let dependency_table_offset = read_u32(image, offset);
        offset += 4;
        let checksum = read_u32(image, offset);
        offset += 4;
        let signature = read_u32(image, offset);
        offset += 4;
        debug_assert_eq!(offset, HEADER_SIZE);

        Some(Self {
            module_version,
            name,
            description,
            author,
            license,
            module_type,
            priority,
            flags,
            code_size,
            data_size,
            bss_size,
            entry_point_offset,
            exit_point_offset,
            symbol_count,
            symbol_table_offset,
            dependency_count,
            dependency_table_offset,
            checksum,
            signature,
        })
    }

    /// Encode this header back into its bit-exact wire form, for tests
    /// and for constructing synthetic images.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        let mut offset = 0usize;

        buf[offset..offset + 4].copy_from_slice(&MAGIC.to_le_bytes());
        offset += 4;
        buf[offset..offset + 4].copy_from_slice(&HEADER_VERSION.to_le_bytes());
        offset += 4;
        buf[offset..offset + 4].copy_from_slice(&self.module_version.to_le_bytes());
        offset += 4;

        write_fixed_str(&mut buf[offset..offset + NAME_LEN], &self.name);
        offset += NAME_LEN;
        write_fixed_str(&mut buf[offset..offset + DESCRIPTION_LEN], &self.description);
        offset += DESCRIPTION_LEN;
        write_fixed_str(&mut buf[offset..offset + AUTHOR_LEN], &self.author);
        offset += AUTHOR_LEN;
        write_fixed_str(&mut buf[offset..offset + LICENSE_LEN], &self.license);
        offset += LICENSE_LEN;

        buf[offset] = self.module_type as u8;
        offset += 1;
        buf[offset] = self.priority;
        offset += 1;

        buf[offset..offset + 2].copy_from_slice(&self.flags.bits().to_le_bytes());
        offset += 2;

        for value in [
            self.code_size,
            self.data_size,
            self.bss_size,
            self.entry_point_offset,
            self.exit_point_offset,
            self.symbol_count,
            self.symbol_table_offset,
            self.dependency_count,
            self.dependency_table_offset,
            self.checksum,
            self.signature,
        ] {
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            offset += 4;
        }
        debug_assert_eq!(offset, HEADER_SIZE);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ModuleHeader {
        ModuleHeader {
            module_version: 1,
            name: "mod_timer".to_string(),
            description: "timer driver".to_string(),
            author: "kernel team".to_string(),
            license: "MIT".to_string(),
            module_type: ModuleType::Driver,
            priority: 2,
            flags: ModuleFlags::AUTO_START | ModuleFlags::HOT_SWAP,
            code_size: 16,
            data_size: 4,
            bss_size: 8,
            entry_point_offset: 0,
            exit_point_offset: 8,
            symbol_count: 0,
            symbol_table_offset: 0,
            dependency_count: 0,
            dependency_table_offset: 0,
            checksum: 0xDEAD_BEEF,
            signature: 0,
        }
    }

    #[test]
    fn encode_then_parse_round_trips_header_fields() {
        let header = sample_header();
        let mut image = header.encode();
        image.extend(std::iter::repeat(0u8).take(32));

        let parsed = ModuleHeader::parse(&image).expect("valid header");
        assert_eq!(parsed, header);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut image = sample_header().encode();
        image[0] = 0;
        assert!(ModuleHeader::parse(&image).is_none());
    }

    #[test]
    fn parse_rejects_short_buffer() {
        assert!(ModuleHeader::parse(&[0u8; 8]).is_none());
    }

    #[test]
    fn flags_round_trip_through_bits() {
        let header = sample_header();
        assert!(header.flags.contains(ModuleFlags::HOT_SWAP));
        assert!(!header.flags.contains(ModuleFlags::CORE));
    }
}
