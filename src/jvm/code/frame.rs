use super::Frame;
use crate::jvm::class_file::{ConstantIndex, ConstantPool, StackMapFrame, VerificationType};
use crate::jvm::{
    BaseType, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name, RefType,
    RenderDescriptor, UnqualifiedName,
};

/// Verification type of a value of some field type
pub fn verification_type(
    constants: &mut ConstantPool,
    field_type: &FieldType,
) -> Result<VerificationType<usize>, Error> {
    let typ = match field_type {
        FieldType::Base(
            BaseType::Boolean | BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Int,
        ) => VerificationType::Integer,
        FieldType::Base(BaseType::Float) => VerificationType::Float,
        FieldType::Base(BaseType::Long) => VerificationType::Long,
        FieldType::Base(BaseType::Double) => VerificationType::Double,
        FieldType::Ref(RefType::Object(name)) => {
            VerificationType::Object(constants.get_class(name.as_str())?)
        }
        FieldType::Ref(array) => VerificationType::Object(constants.get_class(&array.render())?),
    };
    Ok(typ)
}

/// Locals on entry to a method, which is what the first stack map frame is relative to
pub fn initial_locals(
    constants: &mut ConstantPool,
    this_class: ConstantIndex,
    method_name: &str,
    descriptor: &MethodDescriptor,
    access_flags: MethodAccessFlags,
) -> Result<Vec<VerificationType<usize>>, Error> {
    let mut locals = vec![];
    if access_flags.has_receiver() {
        if method_name == UnqualifiedName::INIT.as_str() {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(this_class));
        }
    }
    for parameter in &descriptor.parameters {
        locals.push(verification_type(constants, parameter)?);
    }
    Ok(locals)
}

/// Turn absolute frames (sorted by offset) back into the compressed `StackMapTable` form
///
/// `new_offsets` gives the offset of every `new` instruction, in code order, so that
/// uninitialized types can point back at their allocation.
pub fn compress_frames(
    initial_locals: &[VerificationType<usize>],
    frames: &[(usize, &Frame)],
    new_offsets: &[usize],
) -> Result<Vec<StackMapFrame>, Error> {
    let to_offset = |ordinal: &usize| -> Result<u16, Error> {
        new_offsets
            .get(*ordinal)
            .map(|offset| *offset as u16)
            .ok_or_else(|| {
                Error::MalformedClassFile(format!(
                    "frame mentions uninitialized object from `new` #{}, which no longer exists",
                    ordinal
                ))
            })
    };
    let convert = |types: &[VerificationType<usize>]| -> Result<Vec<VerificationType<u16>>, Error> {
        types
            .iter()
            .map(|typ| typ.map_uninitialized(to_offset))
            .collect()
    };

    let mut compressed = vec![];
    let mut previous_locals: &[VerificationType<usize>] = initial_locals;
    let mut previous_offset: Option<usize> = None;
    for (offset, frame) in frames {
        let offset_delta = match previous_offset {
            None => *offset,
            Some(previous) if *offset > previous => offset - previous - 1,
            Some(_) => {
                return Err(Error::MalformedClassFile(format!(
                    "stack map frames are not in increasing offset order at {}",
                    offset
                )))
            }
        };
        let offset_delta = u16::try_from(offset_delta)
            .map_err(|_| Error::MethodCodeOverflow(*offset))?;
        previous_offset = Some(*offset);

        let locals = &frame.locals[..];
        let same_locals = locals == previous_locals;
        let extension = if locals.len() > previous_locals.len() {
            locals.len() - previous_locals.len()
        } else {
            0
        };
        let chopped = if locals.len() < previous_locals.len() {
            previous_locals.len() - locals.len()
        } else {
            0
        };

        let compressed_frame = if same_locals && frame.stack.is_empty() {
            StackMapFrame::SameLocalsNoStack { offset_delta }
        } else if same_locals && frame.stack.len() == 1 {
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack: convert(&frame.stack)?[0],
            }
        } else if frame.stack.is_empty()
            && (1..=3).contains(&chopped)
            && previous_locals.starts_with(locals)
        {
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k: chopped as u8,
            }
        } else if frame.stack.is_empty()
            && (1..=3).contains(&extension)
            && locals.starts_with(previous_locals)
        {
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals: convert(&locals[previous_locals.len()..])?,
            }
        } else {
            StackMapFrame::Full {
                offset_delta,
                locals: convert(locals)?,
                stack: convert(&frame.stack)?,
            }
        };
        compressed.push(compressed_frame);
        previous_locals = locals;
    }
    Ok(compressed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ParseDescriptor;

    #[test]
    fn constructor_and_static_entry() {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_class("a/B").unwrap();
        let descriptor = MethodDescriptor::parse("(J[ILjava/lang/String;Z)V").unwrap();

        let ctor = initial_locals(
            &mut constants,
            this_class,
            "<init>",
            &descriptor,
            MethodAccessFlags::PUBLIC,
        )
        .unwrap();
        assert_eq!(ctor[0], VerificationType::UninitializedThis);
        assert_eq!(ctor[1], VerificationType::Long);
        assert_eq!(
            ctor[2],
            VerificationType::Object(constants.get_class("[I").unwrap())
        );
        assert_eq!(
            ctor[3],
            VerificationType::Object(constants.get_class("java/lang/String").unwrap())
        );
        assert_eq!(ctor[4], VerificationType::Integer);

        let stat = initial_locals(
            &mut constants,
            this_class,
            "run",
            &descriptor,
            MethodAccessFlags::STATIC,
        )
        .unwrap();
        assert_eq!(stat.len(), 4);
    }

    #[test]
    fn picks_compact_frame_kinds() {
        let int = VerificationType::<usize>::Integer;
        let long = VerificationType::<usize>::Long;
        let initial = vec![int];
        let append = Frame {
            locals: vec![int, long, int],
            stack: vec![],
        };
        let same_one = Frame {
            locals: vec![int, long, int],
            stack: vec![VerificationType::Uninitialized(0)],
        };
        let chop = Frame {
            locals: vec![int],
            stack: vec![],
        };
        let full = Frame {
            locals: vec![long],
            stack: vec![int, int],
        };
        let frames = vec![(3, &append), (7, &same_one), (8, &chop), (20, &full)];
        let compressed = compress_frames(&initial, &frames, &[5]).unwrap();
        assert_eq!(
            compressed,
            vec![
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta: 3,
                    locals: vec![VerificationType::Long, VerificationType::Integer],
                },
                StackMapFrame::SameLocalsOneStack {
                    offset_delta: 3,
                    stack: VerificationType::Uninitialized(5),
                },
                StackMapFrame::ChopLocalsNoStack {
                    offset_delta: 0,
                    chopped_k: 2,
                },
                StackMapFrame::Full {
                    offset_delta: 11,
                    locals: vec![VerificationType::Long],
                    stack: vec![VerificationType::Integer, VerificationType::Integer],
                },
            ]
        );
    }

    #[test]
    fn dangling_uninitialized_is_an_error() {
        let frame = Frame {
            locals: vec![],
            stack: vec![VerificationType::Uninitialized(2)],
        };
        assert!(compress_frames(&[], &[(0, &frame)], &[1]).is_err());
    }
}
