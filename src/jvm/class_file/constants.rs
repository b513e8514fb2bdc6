use crate::jvm::class_file::{Attribute, AttributeLike};
use crate::jvm::{ClassReader, Deserialize, Error, Serialize};
use byteorder::WriteBytesExt;
use std::collections::HashMap;
use std::result::Result;

/// Index into the constant pool (indexing starts at 1)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        reader.read_u16().map(ConstantIndex)
    }
}

/// Constants as in the constant pool
///
/// Floating point constants are kept as their raw bits, so that NaN payloads survive a round
/// trip and constants can be used as hash keys.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes (see [`decode_modified_utf8`])
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(ConstantIndex),
    String(ConstantIndex),
    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },

    /// `Methodref` or `InterfaceMethodref`
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
        is_interface: bool,
    },
    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },
    MethodHandle {
        reference_kind: u8,
        reference: ConstantIndex,
    },
    MethodType(ConstantIndex),

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },
    Module(ConstantIndex),
    Package(ConstantIndex),
}

impl Constant {
    /// `long` and `double` constants take up two entries in the pool
    pub fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if *is_interface { 11u8 } else { 10u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                reference_kind,
                reference,
            } => {
                15u8.serialize(writer)?;
                reference_kind.serialize(writer)?;
                reference.serialize(writer)?;
            }
            Constant::MethodType(descriptor) => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        let constant = match tag {
            1 => {
                let len = reader.read_u16()?;
                Constant::Utf8(reader.read_bytes(len as usize)?.to_vec())
            }
            3 => Constant::Integer(reader.read_i32()?),
            4 => Constant::Float(reader.read_u32()?),
            5 => Constant::Long(reader.read_u64()? as i64),
            6 => Constant::Double(reader.read_u64()?),
            7 => Constant::Class(ConstantIndex::deserialize(reader)?),
            8 => Constant::String(ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef {
                class: ConstantIndex::deserialize(reader)?,
                name_and_type: ConstantIndex::deserialize(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: ConstantIndex::deserialize(reader)?,
                name_and_type: ConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: ConstantIndex::deserialize(reader)?,
                descriptor: ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                reference_kind: reader.read_u8()?,
                reference: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType(ConstantIndex::deserialize(reader)?),
            17 => Constant::Dynamic {
                bootstrap_method: reader.read_u16()?,
                name_and_type: ConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: reader.read_u16()?,
                name_and_type: ConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(ConstantIndex::deserialize(reader)?),
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "unknown constant tag {} at offset {}",
                    other, offset
                )))
            }
        };
        Ok(constant)
    }
}

/// Field or method reference, resolved down to strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// Class file constant pool
///
/// The pool is append only: constants read from an existing class keep their indices (so that
/// attributes copied through as raw bytes stay valid) and new constants go at the end. Lookups
/// for new constants reuse an existing entry whenever there is one.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    /// Entry `i` is constant index `i`. Index 0 and the second half of wide constants are empty.
    constants: Vec<Option<Constant>>,

    utf8s: HashMap<Vec<u8>, ConstantIndex>,
    classes: HashMap<ConstantIndex, ConstantIndex>,
    strings: HashMap<ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    field_refs: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    method_refs: HashMap<(ConstantIndex, ConstantIndex, bool), ConstantIndex>,
    method_types: HashMap<ConstantIndex, ConstantIndex>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: vec![None],
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            field_refs: HashMap::new(),
            method_refs: HashMap::new(),
            method_types: HashMap::new(),
        }
    }

    /// Number of pool slots, as written in the `constant_pool_count` of a class file
    pub fn slot_count(&self) -> usize {
        self.constants.len()
    }

    /// Record a constant in the lookup tables (the first occurrence of a duplicate wins)
    fn remember(&mut self, constant: &Constant, index: ConstantIndex) {
        match constant {
            Constant::Utf8(bytes) => {
                self.utf8s.entry(bytes.clone()).or_insert(index);
            }
            Constant::Integer(value) => {
                self.integers.entry(*value).or_insert(index);
            }
            Constant::Float(bits) => {
                self.floats.entry(*bits).or_insert(index);
            }
            Constant::Long(value) => {
                self.longs.entry(*value).or_insert(index);
            }
            Constant::Double(bits) => {
                self.doubles.entry(*bits).or_insert(index);
            }
            Constant::Class(name) => {
                self.classes.entry(*name).or_insert(index);
            }
            Constant::String(utf8) => {
                self.strings.entry(*utf8).or_insert(index);
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(index);
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                self.field_refs
                    .entry((*class, *name_and_type))
                    .or_insert(index);
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.method_refs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(index);
            }
            Constant::MethodType(descriptor) => {
                self.method_types.entry(*descriptor).or_insert(index);
            }
            Constant::MethodHandle { .. }
            | Constant::Dynamic { .. }
            | Constant::InvokeDynamic { .. }
            | Constant::Module(_)
            | Constant::Package(_) => (),
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    pub fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.len();
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { offset });
        }
        let index = ConstantIndex(offset as u16);
        self.remember(&constant, index);
        let width = constant.width();
        self.constants.push(Some(constant));
        if width == 2 {
            self.constants.push(None);
        }
        Ok(index)
    }

    /// Look up a constant
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get(index.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::BadConstantIndex {
                index: index.0,
                expected: "constant",
            })
    }

    fn bad(index: ConstantIndex, expected: &'static str) -> Error {
        Error::BadConstantIndex {
            index: index.0,
            expected,
        }
    }

    /// Raw bytes of a `Utf8` constant
    pub fn utf8_bytes(&self, index: ConstantIndex) -> Result<&[u8], Error> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(Self::bad(index, "Utf8")),
        }
    }

    /// Decoded contents of a `Utf8` constant
    pub fn utf8(&self, index: ConstantIndex) -> Result<String, Error> {
        decode_modified_utf8(self.utf8_bytes(index)?)
    }

    /// Internal name of a `Class` constant (array classes are descriptors)
    pub fn class_name(&self, index: ConstantIndex) -> Result<String, Error> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Self::bad(index, "Class")),
        }
    }

    pub fn name_and_type(&self, index: ConstantIndex) -> Result<(String, String), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Self::bad(index, "NameAndType")),
        }
    }

    /// Resolve a `Fieldref`, `Methodref`, or `InterfaceMethodref`
    pub fn member_ref(&self, index: ConstantIndex) -> Result<MemberRef, Error> {
        let (class, name_and_type, is_interface) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => return Err(Self::bad(index, "member reference")),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8(&mut self, utf8: &str) -> Result<ConstantIndex, Error> {
        self.get_utf8_bytes(&encode_modified_utf8(utf8))
    }

    /// Get or insert a utf8 constant from already encoded bytes
    pub fn get_utf8_bytes(&mut self, bytes: &[u8]) -> Result<ConstantIndex, Error> {
        match self.utf8s.get(bytes) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Utf8(bytes.to_vec())),
        }
    }

    /// Get or insert a class constant
    pub fn get_class(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        match self.classes.get(&name) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Class(name)),
        }
    }

    /// Get or insert a string constant
    pub fn get_string(&mut self, string: &str) -> Result<ConstantIndex, Error> {
        self.get_string_bytes(&encode_modified_utf8(string))
    }

    /// Get or insert a string constant whose contents are already encoded
    pub fn get_string_bytes(&mut self, bytes: &[u8]) -> Result<ConstantIndex, Error> {
        let utf8 = self.get_utf8_bytes(bytes)?;
        match self.strings.get(&utf8) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::String(utf8)),
        }
    }

    pub fn get_integer(&mut self, value: i32) -> Result<ConstantIndex, Error> {
        match self.integers.get(&value) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Integer(value)),
        }
    }

    pub fn get_float(&mut self, bits: u32) -> Result<ConstantIndex, Error> {
        match self.floats.get(&bits) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Float(bits)),
        }
    }

    pub fn get_long(&mut self, value: i64) -> Result<ConstantIndex, Error> {
        match self.longs.get(&value) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Long(value)),
        }
    }

    pub fn get_double(&mut self, bits: u64) -> Result<ConstantIndex, Error> {
        match self.doubles.get(&bits) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Double(bits)),
        }
    }

    /// Get or insert a name & type constant
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        match self.name_and_types.get(&(name, descriptor)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::NameAndType { name, descriptor }),
        }
    }

    /// Get or insert a `Fieldref`
    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.field_refs.get(&(class, name_and_type)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::FieldRef {
                class,
                name_and_type,
            }),
        }
    }

    /// Get or insert a `Methodref` or `InterfaceMethodref`
    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.method_refs.get(&(class, name_and_type, is_interface)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            }),
        }
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.get_utf8(descriptor)?;
        match self.method_types.get(&descriptor) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodType(descriptor)),
        }
    }

    /// Serialize an attribute and intern its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info).map_err(Error::IoError)?;
        Ok(Attribute { name_index, info })
    }

    /// Check that a constant exists and has the expected kind
    pub fn expect_kind(
        &self,
        index: ConstantIndex,
        expected: &'static str,
    ) -> Result<&Constant, Error> {
        let constant = self.get(index)?;
        if constant.kind() == expected {
            Ok(constant)
        } else {
            Err(Self::bad(index, expected))
        }
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.constants.len() as u16).serialize(writer)?;
        for constant in self.constants.iter().flatten() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantPool {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let count = reader.read_u16()? as usize;
        let mut pool = ConstantPool::new();
        while pool.constants.len() < count {
            let constant = Constant::deserialize(reader)?;
            if pool.constants.len() + constant.width() > count {
                return Err(Error::MalformedClassFile(String::from(
                    "wide constant overruns the constant pool",
                )));
            }
            pool.push_constant(constant)?;
        }
        Ok(pool)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code != 0 && code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Unpaired surrogates can't be represented in a Rust string and are reported as malformed.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = || {
        Error::MalformedClassFile(format!(
            "invalid modified UTF-8 constant {:?}",
            String::from_utf8_lossy(bytes)
        ))
    };
    let continuation = |byte: Option<&u8>| match byte {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
        _ => Err(malformed()),
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&first) = iter.next() {
        let unit = if first & 0x80 == 0 && first != 0 {
            first as u16
        } else if first & 0b1110_0000 == 0b1100_0000 {
            ((first & 0x1F) as u16) << 6 | continuation(iter.next())?
        } else if first & 0b1111_0000 == 0b1110_0000 {
            let high = continuation(iter.next())?;
            let low = continuation(iter.next())?;
            ((first & 0x0F) as u16) << 12 | high << 6 | low
        } else {
            return Err(malformed());
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| malformed())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let text = "ĄǍǞऄअॲ";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[..4], &[196, 132, 199, 141]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
    }

    #[test]
    fn supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{10FFFF}"
        );
    }

    #[test]
    fn bad_encodings() {
        assert!(decode_modified_utf8(&[0]).is_err());
        assert!(decode_modified_utf8(&[0xC0]).is_err());
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0x80]).is_err());
    }

    #[test]
    fn pool_reuses_existing_entries() {
        let mut pool = ConstantPool::new();
        let owner = pool.get_method_ref("a/B", "m", "()V", false).unwrap();
        let again = pool.get_method_ref("a/B", "m", "()V", false).unwrap();
        assert_eq!(owner, again);
        let interface = pool.get_method_ref("a/B", "m", "()V", true).unwrap();
        assert_ne!(owner, interface);
        assert_eq!(
            pool.member_ref(interface).unwrap(),
            MemberRef {
                owner: String::from("a/B"),
                name: String::from("m"),
                descriptor: String::from("()V"),
                is_interface: true,
            }
        );
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.get_long(7).unwrap();
        let int = pool.get_integer(7).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
        assert!(pool.get(ConstantIndex(2)).is_err());
        assert_eq!(pool.slot_count(), 4);

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let read = ConstantPool::deserialize(&mut ClassReader::new(&bytes)).unwrap();
        assert_eq!(read.get(int).unwrap(), &Constant::Integer(7));
        assert_eq!(read.slot_count(), 4);
    }

    #[test]
    fn parsed_pool_keeps_indices() {
        let mut pool = ConstantPool::new();
        pool.get_utf8("unused").unwrap();
        let string = pool.get_string("hello").unwrap();
        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();

        let mut read = ConstantPool::deserialize(&mut ClassReader::new(&bytes)).unwrap();
        assert_eq!(read.get_string("hello").unwrap(), string);
        assert_eq!(read.get_string("fresh").unwrap(), ConstantIndex(5));
    }
}
