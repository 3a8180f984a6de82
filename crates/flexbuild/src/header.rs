//! ROM header record: the `driver_version:` block embedded in `romprefix.S`.
//!
//! Layout (one `.long` per 32-bit word):
//!
//! | word | content                                   |
//! |------|-------------------------------------------|
//! | 0    | signature `0x73786c6d` ("mlxs")           |
//! | 1    | signature `0x3a6e6769` ("ign:")           |
//! | 2    | length tag `0x0010` : major               |
//! | 3    | minor : patch                             |
//! | 4    | device id : port (`00`) : protocol (`ff`) |

use crate::device::Device;
use crate::error::BuildError;
use crate::version::VersionSpec;
use std::fmt;

const SIGNATURE: [u32; 2] = [0x7378_6c6d, 0x3a6e_6769];
const LENGTH_TAG: u16 = 0x0010;
const PORT_PLACEHOLDER: u8 = 0x00;
const PROTOCOL_PLACEHOLDER: u8 = 0xff;

/// Label that opens the record; also the start marker in the template.
pub const LABEL: &str = "driver_version:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderRecord {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub device_id: u16,
}

impl HeaderRecord {
    pub fn new(version: &VersionSpec, device: &Device) -> Result<Self, BuildError> {
        Ok(Self {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            device_id: device.pci_id()?,
        })
    }

    /// The five data words, in emission order.
    pub fn words(&self) -> [u32; 5] {
        [
            SIGNATURE[0],
            SIGNATURE[1],
            (u32::from(LENGTH_TAG) << 16) | u32::from(self.major),
            (u32::from(self.minor) << 16) | u32::from(self.patch),
            (u32::from(self.device_id) << 16)
                | (u32::from(PORT_PLACEHOLDER) << 8)
                | u32::from(PROTOCOL_PLACEHOLDER),
        ]
    }

    /// Assembly text: label, alignment, the words, then a blank line.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HeaderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{LABEL}")?;
        writeln!(f, " .align 16")?;
        for word in self.words() {
            writeln!(f, " .long 0x{word:08x}")?;
        }
        writeln!(f)
    }
}
