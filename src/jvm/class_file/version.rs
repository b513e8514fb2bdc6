use crate::jvm::{ClassReader, Deserialize, Error, Serialize};
use byteorder::WriteBytesExt;

/// Class file format version
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-B.2
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA6: Version = Version {
        major: 50,
        minor: 0,
    };
    pub const JAVA7: Version = Version {
        major: 51,
        minor: 0,
    };
    pub const JAVA8: Version = Version {
        major: 52,
        minor: 0,
    };

    /// `jsr` and `ret` are rejected by the verifier from Java 7 on
    pub fn allows_subroutines(&self) -> bool {
        *self < Version::JAVA7
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let minor = reader.read_u16()?;
        let major = reader.read_u16()?;
        Ok(Version { major, minor })
    }
}
