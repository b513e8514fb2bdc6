use crate::jvm::class_file::{ConstantIndex, ConstantPool};
use crate::jvm::{ClassReader, Deserialize, Error, Serialize};
use byteorder::WriteBytesExt;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept as raw bytes. The ones the rewriter needs to look inside of (the code
/// attribute and its tables) are parsed on demand with [`Attribute::parse`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Name of the attribute
    pub fn name(&self, constants: &ConstantPool) -> Result<String, Error> {
        constants.utf8(self.name_index)
    }

    /// Is this an attribute of type `A`?
    pub fn is<A: AttributeLike>(&self, constants: &ConstantPool) -> bool {
        matches!(constants.utf8_bytes(self.name_index), Ok(name) if name == A::NAME.as_bytes())
    }

    /// Parse the attribute contents
    pub fn parse<A: AttributeLike + Deserialize>(&self) -> Result<A, Error> {
        let mut reader = ClassReader::new(&self.info);
        let parsed = A::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::MalformedClassFile(format!(
                "{} attribute has trailing bytes",
                A::NAME
            )));
        }
        Ok(parsed)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let name_index = ConstantIndex::deserialize(reader)?;
        let len = reader.read_u32()?;
        let info = reader.read_bytes(len as usize)?.to_vec();
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code_array.len() as u32).serialize(writer)?;
        writer.write_all(&self.code_array)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let code_len = reader.read_u32()?;
        let code_array = reader.read_bytes(code_len as usize)?.to_vec();
        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Zero for `finally` blocks (catch anything)
    pub catch_type: ConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: reader.read_u16()?,
            end_pc: reader.read_u16()?,
            handler_pc: reader.read_u16()?,
            catch_type: ConstantIndex::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(LineNumberTable)
    }
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: reader.read_u16()?,
            line_number: reader.read_u16()?,
        })
    }
}

/// Shared layout of `LocalVariableTable` and `LocalVariableTypeTable` entries
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: ConstantIndex,

    /// Descriptor or generic signature, depending on the table
    pub descriptor: ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name.serialize(writer)?;
        self.descriptor.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Deserialize for LocalVariable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: reader.read_u16()?,
            length: reader.read_u16()?,
            name: ConstantIndex::deserialize(reader)?,
            descriptor: ConstantIndex::deserialize(reader)?,
            index: reader.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl Serialize for LocalVariableTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LocalVariableTable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(LocalVariableTable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";
}

impl Serialize for LocalVariableTypeTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for LocalVariableTypeTable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(LocalVariableTypeTable)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(StackMapTable)
    }
}

/// Type annotations on things inside a method body (the `Code` attribute's own
/// `RuntimeVisibleTypeAnnotations`)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.20
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVisibleTypeAnnotations(pub Vec<TypeAnnotation>);

impl AttributeLike for RuntimeVisibleTypeAnnotations {
    const NAME: &'static str = "RuntimeVisibleTypeAnnotations";
}

impl Serialize for RuntimeVisibleTypeAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeVisibleTypeAnnotations {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(RuntimeVisibleTypeAnnotations)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInvisibleTypeAnnotations(pub Vec<TypeAnnotation>);

impl AttributeLike for RuntimeInvisibleTypeAnnotations {
    const NAME: &'static str = "RuntimeInvisibleTypeAnnotations";
}

impl Serialize for RuntimeInvisibleTypeAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeInvisibleTypeAnnotations {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(RuntimeInvisibleTypeAnnotations)
    }
}

/// One `type_annotation` whose target is in the code array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target: TypeAnnotationTarget,

    /// `type_path`, `type_index` and the element-value pairs, none of which refer to code
    pub annotation: Vec<u8>,
}

/// The part of a type annotation pointing into the code array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotationTarget {
    /// Local variable (or resource variable) live ranges
    LocalVariable(Vec<LocalVariableRange>),

    /// Index into the exception table
    Catch(u16),

    /// Offset of an `instanceof`, `new`, or method reference instruction
    Offset(u16),

    /// Cast, or type argument of a constructor or method call or reference
    TypeArgument { offset: u16, index: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableRange {
    pub start_pc: u16,
    pub length: u16,
    pub index: u16,
}

impl TypeAnnotationTarget {
    /// Read the target info of a `target_type` that only occurs inside `Code`
    fn deserialize(target_type: u8, reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let target = match target_type {
            0x40 | 0x41 => {
                let len = reader.read_u16()?;
                let mut ranges = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    ranges.push(LocalVariableRange {
                        start_pc: reader.read_u16()?,
                        length: reader.read_u16()?,
                        index: reader.read_u16()?,
                    });
                }
                TypeAnnotationTarget::LocalVariable(ranges)
            }
            0x42 => TypeAnnotationTarget::Catch(reader.read_u16()?),
            0x43..=0x46 => TypeAnnotationTarget::Offset(reader.read_u16()?),
            0x47..=0x4B => TypeAnnotationTarget::TypeArgument {
                offset: reader.read_u16()?,
                index: reader.read_u8()?,
            },
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "type annotation target 0x{:02x} can't appear on code",
                    other
                )))
            }
        };
        Ok(target)
    }
}

impl Serialize for TypeAnnotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.target_type.serialize(writer)?;
        match &self.target {
            TypeAnnotationTarget::LocalVariable(ranges) => {
                (ranges.len() as u16).serialize(writer)?;
                for range in ranges {
                    range.start_pc.serialize(writer)?;
                    range.length.serialize(writer)?;
                    range.index.serialize(writer)?;
                }
            }
            TypeAnnotationTarget::Catch(index) => index.serialize(writer)?,
            TypeAnnotationTarget::Offset(offset) => offset.serialize(writer)?,
            TypeAnnotationTarget::TypeArgument { offset, index } => {
                offset.serialize(writer)?;
                index.serialize(writer)?;
            }
        }
        writer.write_all(&self.annotation)
    }
}

impl Deserialize for TypeAnnotation {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let target_type = reader.read_u8()?;
        let target = TypeAnnotationTarget::deserialize(target_type, reader)?;

        let mut annotation = reader.clone();
        let start = reader.position();
        let path_length = reader.read_u8()?;
        reader.read_bytes(2 * path_length as usize)?;
        skip_annotation(reader)?;
        let annotation = annotation.read_bytes(reader.position() - start)?.to_vec();

        Ok(TypeAnnotation {
            target_type,
            target,
            annotation,
        })
    }
}

/// Skip `type_index` and the element-value pairs of an annotation
fn skip_annotation(reader: &mut ClassReader<'_>) -> Result<(), Error> {
    reader.read_u16()?;
    let pairs = reader.read_u16()?;
    for _ in 0..pairs {
        reader.read_u16()?;
        skip_element_value(reader)?;
    }
    Ok(())
}

fn skip_element_value(reader: &mut ClassReader<'_>) -> Result<(), Error> {
    match reader.read_u8()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            reader.read_u16()?;
        }
        b'e' => {
            reader.read_bytes(4)?;
        }
        b'@' => skip_annotation(reader)?,
        b'[' => {
            let values = reader.read_u16()?;
            for _ in 0..values {
                skip_element_value(reader)?;
            }
        }
        tag => {
            return Err(Error::MalformedClassFile(format!(
                "unknown element value tag '{}'",
                tag as char
            )))
        }
    }
    Ok(())
}

/// These types are from [this hierarchy][0]
///
/// `U` is how an uninitialized object points at its `new` instruction: a bytecode offset in the
/// class file, something more stable while the code is being edited.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<U> {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(ConstantIndex),

    /// State of an object after `new` has been called by `<init>` has not been called
    Uninitialized(U),
}

impl<U> VerificationType<U> {
    /// Local slots (or stack words) taken by a value of this type
    pub fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }

    /// Change how uninitialized objects are identified
    pub fn map_uninitialized<V, E>(
        &self,
        f: impl FnOnce(&U) -> Result<V, E>,
    ) -> Result<VerificationType<V>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(*cls),
            VerificationType::Uninitialized(u) => VerificationType::Uninitialized(f(u)?),
        })
    }
}

impl Serialize for VerificationType<u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for VerificationType<u16> {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let typ = match reader.read_u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ConstantIndex::deserialize(reader)?),
            8 => VerificationType::Uninitialized(reader.read_u16()?),
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "unknown verification type tag {}",
                    other
                )))
            }
        };
        Ok(typ)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<u16>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with 1 to 3 extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<u16>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<u16>>,
        stack: Vec<VerificationType<u16>>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        let tag = reader.read_u8()?;
        let frame = match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: tag as u16 - 64,
                stack: VerificationType::deserialize(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: reader.read_u16()?,
                stack: VerificationType::deserialize(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: reader.read_u16()?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: reader.read_u16()?,
            },
            252..=254 => {
                let offset_delta = reader.read_u16()?;
                let mut locals = vec![];
                for _ in 0..(tag - 251) {
                    locals.push(VerificationType::deserialize(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: reader.read_u16()?,
                locals: Vec::deserialize(reader)?,
                stack: Vec::deserialize(reader)?,
            },
            other => {
                return Err(Error::MalformedClassFile(format!(
                    "reserved stack map frame tag {}",
                    other
                )))
            }
        };
        Ok(frame)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.23
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// `MethodHandle` constant
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl AttributeLike for BootstrapMethods {
    const NAME: &'static str = "BootstrapMethods";
}

impl Serialize for BootstrapMethods {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BootstrapMethods {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Vec::deserialize(reader).map(BootstrapMethods)
    }
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for BootstrapMethod {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, Error> {
        Ok(BootstrapMethod {
            bootstrap_method: ConstantIndex::deserialize(reader)?,
            bootstrap_arguments: Vec::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stack_map_frame_encodings() {
        let frames = StackMapTable(vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 3 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 300 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 1,
                stack: VerificationType::Integer,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 5,
                chopped_k: 2,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 0,
                locals: vec![VerificationType::Long, VerificationType::Uninitialized(17)],
            },
            StackMapFrame::Full {
                offset_delta: 9,
                locals: vec![VerificationType::Object(ConstantIndex(4))],
                stack: vec![],
            },
        ]);
        let mut bytes = vec![];
        frames.serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[..6], &[0, 6, 3, 251, 1, 44]);

        let attribute = Attribute {
            name_index: ConstantIndex(1),
            info: bytes,
        };
        assert_eq!(attribute.parse::<StackMapTable>().unwrap(), frames);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let attribute = Attribute {
            name_index: ConstantIndex(1),
            info: vec![0, 0, 7],
        };
        assert!(attribute.parse::<LineNumberTable>().is_err());
    }

    #[test]
    fn code_type_annotations() {
        #[rustfmt::skip]
        let info = vec![
            0, 2,
            // local variable: two ranges of slot 3, empty type path, no values
            0x40, 0, 2, 0, 4, 0, 10, 0, 3, 0, 20, 0, 1, 0, 3, 0, 0, 9, 0, 0,
            // cast type argument 1 at offset 7, path of one step, nested array and annotation
            0x47, 0, 7, 1, 1, 3, 0, 0, 9, 0, 1,
            0, 5, b'[', 0, 2, b'@', 0, 9, 0, 0, b'e', 0, 6, 0, 8,
        ];
        let attribute = Attribute {
            name_index: ConstantIndex(1),
            info: info.clone(),
        };
        let parsed = attribute.parse::<RuntimeVisibleTypeAnnotations>().unwrap();
        assert_eq!(
            parsed.0[0].target,
            TypeAnnotationTarget::LocalVariable(vec![
                LocalVariableRange {
                    start_pc: 4,
                    length: 10,
                    index: 3
                },
                LocalVariableRange {
                    start_pc: 20,
                    length: 1,
                    index: 3
                },
            ])
        );
        assert_eq!(parsed.0[0].annotation, vec![0, 0, 9, 0, 0]);
        assert_eq!(
            parsed.0[1].target,
            TypeAnnotationTarget::TypeArgument {
                offset: 7,
                index: 1
            }
        );
        assert_eq!(parsed.0[1].annotation.len(), 22);

        let mut bytes = vec![];
        parsed.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, info);

        let outside_code = Attribute {
            name_index: ConstantIndex(1),
            info: vec![0, 1, 0x13, 0, 0, 9, 0, 0],
        };
        assert!(outside_code
            .parse::<RuntimeInvisibleTypeAnnotations>()
            .is_err());
    }
}
