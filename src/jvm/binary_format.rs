use super::Error;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`] for reading class files back in
pub trait Deserialize: Sized {
    /// Read the construct from the current position of the reader
    fn deserialize(reader: &mut ClassReader<'_>) -> std::result::Result<Self, Error>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for u64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<BigEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for u8 {
    fn deserialize(reader: &mut ClassReader<'_>) -> std::result::Result<Self, Error> {
        reader.read_u8()
    }
}

impl Deserialize for u16 {
    fn deserialize(reader: &mut ClassReader<'_>) -> std::result::Result<Self, Error> {
        reader.read_u16()
    }
}

impl Deserialize for u32 {
    fn deserialize(reader: &mut ClassReader<'_>) -> std::result::Result<Self, Error> {
        reader.read_u32()
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize(reader: &mut ClassReader<'_>) -> std::result::Result<Self, Error> {
        let len = reader.read_u16()?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Big-endian cursor over the bytes of a class file (or of one of its attributes)
///
/// Running off the end of the input is reported as a malformed class file, along with the
/// offset at which the read was attempted.
#[derive(Clone)]
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ClassReader<'a> {
        ClassReader { bytes, position: 0 }
    }

    /// Offset of the next byte to be read
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// Read exactly `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> std::result::Result<&'a [u8], Error> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::MalformedClassFile(format!(
                    "unexpected end of input reading {} bytes at offset {}",
                    len, self.position
                ))
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Split off a reader for the next `len` bytes
    pub fn sub_reader(&mut self, len: usize) -> std::result::Result<ClassReader<'a>, Error> {
        self.read_bytes(len).map(ClassReader::new)
    }

    pub fn read_u8(&mut self) -> std::result::Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> std::result::Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> std::result::Result<u16, Error> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> std::result::Result<i16, Error> {
        Ok(BigEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> std::result::Result<u32, Error> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> std::result::Result<i32, Error> {
        Ok(BigEndian::read_i32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> std::result::Result<u64, Error> {
        Ok(BigEndian::read_u64(self.read_bytes(8)?))
    }

    /// Skip forward so that the position is a multiple of four (used for switch padding)
    pub fn align_to_four(&mut self) -> std::result::Result<(), Error> {
        let padding = (4 - self.position % 4) % 4;
        self.read_bytes(padding).map(|_| ())
    }
}
