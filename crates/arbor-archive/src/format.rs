//! Archive header layout.
//!
//! ```text
//! magic          8 bytes  "ARBOROBJ"
//! major, minor   u32, u32 generic format version
//! hierarchy      string   (minor >= 1)
//! libs           string   (minor >= 1)
//! ```

use arbor_core::{Class, Version};
use arbor_io::DataSource;
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};

pub const MAGIC: &[u8; 8] = b"ARBOROBJ";

/// Version of the generic object format written by this crate.
pub const FORMAT_VERSION: Version = Version::new(7, 2);

/// First minor version carrying hierarchy and library strings.
pub const HIERARCHY_SINCE_MINOR: u32 = 1;

pub const VARIABLE_TABLE_VERSION: u32 = 1;

/// Suffix appended to the previous archive when backups are enabled.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Decoded archive header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    /// `None` for archives older than [`HIERARCHY_SINCE_MINOR`].
    pub hierarchy: Option<String>,
    pub libs: Option<String>,
}

pub fn write_header(src: &mut DataSource<'_>, class: &Class) -> ArchiveResult<()> {
    src.write(MAGIC)?;
    src.write_u32(FORMAT_VERSION.major)?;
    src.write_u32(FORMAT_VERSION.minor)?;
    src.write_string(class.hierarchy())?;
    src.write_string(class.libs())?;
    Ok(())
}

pub fn read_header(src: &mut DataSource<'_>) -> ArchiveResult<Header> {
    let mut magic = [0u8; 8];
    src.read(&mut magic)?;
    if &magic != MAGIC {
        return Err(ArchiveError::InvalidMagic {
            expected: String::from_utf8_lossy(MAGIC).into(),
            actual: String::from_utf8_lossy(&magic).into(),
        });
    }

    let version = Version::new(src.read_u32()?, src.read_u32()?);
    if version.major != FORMAT_VERSION.major {
        return Err(ArchiveError::IncompatibleVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    if version.minor > FORMAT_VERSION.minor {
        debug!(%version, supported = %FORMAT_VERSION, "archive written by a newer format");
    }

    let (hierarchy, libs) = if version.minor >= HIERARCHY_SINCE_MINOR {
        (Some(src.read_string()?), Some(src.read_string()?))
    } else {
        (None, None)
    };

    Ok(Header {
        version,
        hierarchy,
        libs,
    })
}
