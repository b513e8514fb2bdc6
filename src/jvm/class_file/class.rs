use crate::jvm::class_file::{Attribute, ConstantIndex, ConstantPool, Field, Method, Version};
use crate::jvm::{ClassAccessFlags, ClassReader, Deserialize, Error, Serialize};
use byteorder::WriteBytesExt;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantIndex,

    /// Zero only for `java/lang/Object`
    pub super_class: ConstantIndex,
    pub interfaces: Vec<ConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = ClassReader::new(bytes);
        let class = ClassFile::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::MalformedClassFile(format!(
                "trailing bytes after offset {}",
                reader.position()
            )));
        }
        Ok(class)
    }

    /// Internal name of the class (eg. `java/lang/String`)
    pub fn this_class_name(&self) -> Result<String, Error> {
        self.constants.class_name(self.this_class)
    }

    /// Serialize the class file into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        if reader.read_bytes(4)? != ClassFile::MAGIC {
            return Err(Error::MalformedClassFile(String::from(
                "missing 0xCAFEBABE header",
            )));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantPool::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ConstantIndex::deserialize(reader)?;
        constants.expect_kind(this_class, "Class")?;
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class: ConstantIndex::deserialize(reader)?,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn empty_class() -> ClassFile {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_class("me/Empty").unwrap();
        let super_class = constants.get_class("java/lang/Object").unwrap();
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn class_round_trip() {
        let bytes = empty_class().to_bytes().unwrap();
        assert_eq!(&bytes[..8], &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]);
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.this_class_name().unwrap(), "me/Empty");
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn rejects_bad_headers_and_truncation() {
        let mut bytes = empty_class().to_bytes().unwrap();
        assert!(ClassFile::parse(&bytes[..bytes.len() - 1]).is_err());
        bytes[0] = 0;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::MalformedClassFile(_))
        ));
    }
}
