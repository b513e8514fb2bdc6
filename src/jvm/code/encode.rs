//! Laying a [`MethodBody`] back out as a `Code` attribute

use super::{
    compress_frames, has_explicit_slot, infer_frames, label_positions, max_stack, AnnotatedCode,
    Frame, Instruction, Label, LdcValue, MethodBody, Node,
};
use crate::isa::{opcode, Category, InstructionSet, Jvm};
use crate::jvm::class_file::{
    Code, ConstantIndex, ConstantPool, ExceptionHandler, LineNumber, LineNumberTable,
    LocalVariable, LocalVariableRange, LocalVariableTable, LocalVariableTypeTable,
    RuntimeInvisibleTypeAnnotations, RuntimeVisibleTypeAnnotations, StackMapTable,
    TypeAnnotation, TypeAnnotationTarget, VerificationType,
};
use crate::jvm::{Error, MethodDescriptor, ParseDescriptor};
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashSet;

/// Method-level context needed to encode a method body
pub struct EncodeContext<'a> {
    /// Used in diagnostics only
    pub method_name: &'a str,

    /// Types of the locals on method entry (only consulted if the body has frames)
    pub initial_locals: &'a [VerificationType<usize>],

    /// Class declaring the method, which is what `this` is once a constructor called `super`
    pub this_class: ConstantIndex,
}

/// Largest code array the class file format allows
const MAX_CODE_LENGTH: usize = 65535;

/// Conditional jump with the opposite condition
fn invert_condition(op: u8) -> Option<u8> {
    let inverted = match op {
        opcode::IFEQ => opcode::IFNE,
        opcode::IFNE => opcode::IFEQ,
        opcode::IFLT => opcode::IFGE,
        opcode::IFGE => opcode::IFLT,
        opcode::IFGT => opcode::IFLE,
        opcode::IFLE => opcode::IFGT,
        opcode::IF_ICMPEQ => opcode::IF_ICMPNE,
        opcode::IF_ICMPNE => opcode::IF_ICMPEQ,
        opcode::IF_ICMPLT => opcode::IF_ICMPGE,
        opcode::IF_ICMPGE => opcode::IF_ICMPLT,
        opcode::IF_ICMPGT => opcode::IF_ICMPLE,
        opcode::IF_ICMPLE => opcode::IF_ICMPGT,
        opcode::IF_ACMPEQ => opcode::IF_ACMPNE,
        opcode::IF_ACMPNE => opcode::IF_ACMPEQ,
        opcode::IFNULL => opcode::IFNONNULL,
        opcode::IFNONNULL => opcode::IFNULL,
        _ => return None,
    };
    Some(inverted)
}

/// Instruction whose symbolic operands have been interned
struct Interned<'b> {
    instruction: &'b Instruction,
    constant: Option<ConstantIndex>,

    /// Extra operand for `invokeinterface`: the argument word count
    count: u8,
}

fn intern<'b>(
    instruction: &'b Instruction,
    constants: &mut ConstantPool,
) -> Result<Interned<'b>, Error> {
    let mut count = 0;
    let constant = match instruction {
        Instruction::Ldc(value) => Some(match value {
            LdcValue::Integer(value) => constants.get_integer(*value)?,
            LdcValue::Float(bits) => constants.get_float(*bits)?,
            LdcValue::Long(value) => constants.get_long(*value)?,
            LdcValue::Double(bits) => constants.get_double(*bits)?,
            LdcValue::String(bytes) => constants.get_string_bytes(bytes)?,
            LdcValue::Class(name) => constants.get_class(name)?,
            LdcValue::MethodType(descriptor) => constants.get_method_type(descriptor)?,
            LdcValue::MethodHandle(index) | LdcValue::Dynamic { index, .. } => *index,
        }),
        Instruction::Field {
            owner,
            name,
            descriptor,
            ..
        } => Some(constants.get_field_ref(owner, name, descriptor)?),
        Instruction::Method {
            opcode,
            owner,
            name,
            descriptor,
            is_interface,
        } => {
            if *opcode == opcode::INVOKEINTERFACE {
                count = MethodDescriptor::parse(descriptor)?.parameter_length(true) as u8;
            }
            Some(constants.get_method_ref(owner, name, descriptor, *is_interface)?)
        }
        Instruction::InvokeDynamic { index, .. } => Some(*index),
        Instruction::Type { class, .. } => Some(constants.get_class(class)?),
        Instruction::MultiANewArray { descriptor, .. } => Some(constants.get_class(descriptor)?),
        _ => None,
    };
    Ok(Interned {
        instruction,
        constant,
        count,
    })
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Encoded size of an instruction placed at `offset`
fn size(interned: &Interned<'_>, offset: usize, widened: bool) -> usize {
    match interned.instruction {
        Instruction::Insn(_) => 1,
        Instruction::Int { opcode, .. } => match *opcode {
            opcode::SIPUSH => 3,
            _ => 2,
        },
        Instruction::Var { opcode, var } => {
            if !has_explicit_slot(*opcode) {
                1
            } else if *var <= u8::MAX as u16 {
                2
            } else {
                4
            }
        }
        Instruction::IInc { var, increment } => {
            if *var <= u8::MAX as u16 && i8::try_from(*increment).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Jump { opcode, .. } => {
            if matches!(*opcode, opcode::GOTO_W | opcode::JSR_W) {
                5
            } else if !widened {
                3
            } else if matches!(*opcode, opcode::GOTO | opcode::JSR) {
                5
            } else {
                8
            }
        }
        Instruction::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len()
        }
        Instruction::LookupSwitch { pairs, .. } => {
            1 + switch_padding(offset) + 8 + 8 * pairs.len()
        }
        Instruction::Ldc(value) => match (value.category(), interned.constant) {
            (Category::One, Some(ConstantIndex(index))) if index <= u8::MAX as u16 => 2,
            _ => 3,
        },
        Instruction::Field { .. } | Instruction::Type { .. } => 3,
        Instruction::Method { opcode, .. } => match *opcode {
            opcode::INVOKEINTERFACE => 5,
            _ => 3,
        },
        Instruction::InvokeDynamic { .. } => 5,
        Instruction::MultiANewArray { .. } => 4,
    }
}

/// Offsets of every node (plus the end of the code) given which jumps are widened
fn layout(
    nodes: &[Node],
    interned: &[Option<Interned<'_>>],
    widened: &HashSet<usize>,
) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(nodes.len() + 1);
    let mut offset = 0;
    for (index, entry) in interned.iter().enumerate() {
        offsets.push(offset);
        if let Some(entry) = entry {
            offset += size(entry, offset, widened.contains(&index));
        }
    }
    offsets.push(offset);
    offsets
}

/// Encode a method body, interning whatever constants it needs
///
/// Jumps are widened until every offset fits, `max_stack` is recomputed from scratch, and
/// every table that refers to code positions is remapped. Frames are kept exactly as they are
/// in the body, so whoever inserts code has to make sure those stay valid. The only frames
/// added are the ones for the fall-through of widened conditional jumps, which are inferred.
pub fn encode(
    body: &MethodBody,
    constants: &mut ConstantPool,
    context: &EncodeContext<'_>,
) -> Result<Code, Error> {
    let nodes = &body.nodes;
    let mut interned = Vec::with_capacity(nodes.len());
    for node in nodes {
        interned.push(match node {
            Node::Instruction(instruction) => Some(intern(instruction, constants)?),
            _ => None,
        });
    }

    let positions = label_positions(nodes);
    let label_index = |label: &Label| -> Result<usize, Error> {
        positions
            .get(label)
            .copied()
            .ok_or(Error::MissingLabel(*label))
    };

    // Widen jumps until the layout is stable (widening only ever grows the code)
    let mut widened: HashSet<usize> = HashSet::new();
    let offsets = loop {
        let offsets = layout(nodes, &interned, &widened);
        let mut changed = false;
        for (index, node) in nodes.iter().enumerate() {
            if let Node::Instruction(Instruction::Jump {
                opcode: jump_opcode,
                target,
            }) = node
            {
                if matches!(*jump_opcode, opcode::GOTO_W | opcode::JSR_W)
                    || widened.contains(&index)
                {
                    continue;
                }
                let distance =
                    offsets[label_index(target)?] as isize - offsets[index] as isize;
                if i16::try_from(distance).is_err() {
                    widened.insert(index);
                    changed = true;
                }
            }
        }
        if !changed {
            break offsets;
        }
    };
    let code_length = offsets[nodes.len()];
    if code_length > MAX_CODE_LENGTH {
        return Err(Error::MethodCodeOverflow(code_length));
    }
    let offset_of = |label: &Label| -> Result<usize, Error> { Ok(offsets[label_index(label)?]) };

    // A widened conditional jump hops over a `goto_w`, so the code after it becomes a jump
    // target that needs a frame of its own
    let mut extra_frames: Vec<(usize, Frame)> = vec![];
    if body.has_frames() {
        let conditionals: HashSet<usize> = widened
            .iter()
            .copied()
            .filter(|index| match &nodes[*index] {
                Node::Instruction(instruction) => instruction.is_conditional_jump(),
                _ => false,
            })
            .collect();
        if !conditionals.is_empty() {
            let mut inferred = infer_frames(body, constants, context, &conditionals)?;
            let mut conditionals: Vec<usize> = conditionals.into_iter().collect();
            conditionals.sort_unstable();
            for index in conditionals {
                let after = offsets[index + 1];
                match inferred.remove(&index) {
                    Some(frame) => extra_frames.push((after, frame)),
                    None => {
                        let target = match &nodes[index] {
                            Node::Instruction(Instruction::Jump { target, .. }) => {
                                offset_of(target)?
                            }
                            _ => after,
                        };
                        return Err(Error::BranchOffsetOverflow {
                            offset: offsets[index],
                            distance: target as isize - offsets[index] as isize,
                        });
                    }
                }
            }
            log::debug!(
                "`{}`: {} frames added after widened branches",
                context.method_name,
                extra_frames.len()
            );
        }
    }

    // Instructions
    let mut code_array: Vec<u8> = Vec::with_capacity(code_length);
    let mut new_offsets = vec![];
    let mut max_locals = body.max_locals as usize;
    for (index, entry) in interned.iter().enumerate() {
        if let Some(entry) = entry {
            let offset = offsets[index];
            debug_assert_eq!(code_array.len(), offset);
            if let Instruction::Type {
                opcode: opcode::NEW,
                ..
            } = entry.instruction
            {
                new_offsets.push(offset);
            }
            max_locals = max_locals.max(locals_used(entry.instruction));
            write_instruction(
                &mut code_array,
                entry,
                offset,
                widened.contains(&index),
                &offset_of,
            )?;
        }
    }

    // Exception table
    let mut exception_table = vec![];
    let mut handler_indices: Vec<Option<u16>> = Vec::with_capacity(body.handlers.len());
    for handler in &body.handlers {
        let start_pc = offset_of(&handler.start)?;
        let end_pc = offset_of(&handler.end)?;
        if start_pc >= end_pc {
            handler_indices.push(None);
            continue;
        }
        handler_indices.push(Some(exception_table.len() as u16));
        let catch_type = match &handler.catch_type {
            None => ConstantIndex(0),
            Some(class) => constants.get_class(class)?,
        };
        exception_table.push(ExceptionHandler {
            start_pc: start_pc as u16,
            end_pc: end_pc as u16,
            handler_pc: offset_of(&handler.handler)? as u16,
            catch_type,
        });
    }

    // Code attributes
    let mut attributes = vec![];
    let mut line_numbers = vec![];
    for node in nodes {
        if let Node::Line { line, start } = node {
            line_numbers.push(LineNumber {
                start_pc: offset_of(start)? as u16,
                line_number: *line,
            });
        }
    }
    if !line_numbers.is_empty() {
        attributes.push(constants.get_attribute(&LineNumberTable(line_numbers))?);
    }

    let mut variables = vec![];
    let mut variable_types = vec![];
    for entry in &body.local_variables {
        let start = offset_of(&entry.start)?;
        let end = offset_of(&entry.end)?.max(start);
        let variable = LocalVariable {
            start_pc: start as u16,
            length: (end - start) as u16,
            name: entry.name,
            descriptor: entry.descriptor,
            index: entry.index,
        };
        if entry.is_type_table {
            variable_types.push(variable);
        } else {
            variables.push(variable);
        }
    }
    if !variables.is_empty() {
        attributes.push(constants.get_attribute(&LocalVariableTable(variables))?);
    }
    if !variable_types.is_empty() {
        attributes.push(constants.get_attribute(&LocalVariableTypeTable(variable_types))?);
    }

    let mut visible_annotations = vec![];
    let mut invisible_annotations = vec![];
    for entry in &body.type_annotations {
        let target = match &entry.target {
            AnnotatedCode::LocalVariable(ranges) => {
                let mut remapped = Vec::with_capacity(ranges.len());
                for (start, end, index) in ranges {
                    let start = offset_of(start)?;
                    let end = offset_of(end)?.max(start);
                    remapped.push(LocalVariableRange {
                        start_pc: start as u16,
                        length: (end - start) as u16,
                        index: *index,
                    });
                }
                Some(TypeAnnotationTarget::LocalVariable(remapped))
            }
            AnnotatedCode::Catch(index) => handler_indices
                .get(*index)
                .copied()
                .flatten()
                .map(TypeAnnotationTarget::Catch),
            AnnotatedCode::Instruction {
                at,
                instruction,
                type_argument,
            } => {
                let from = label_index(at)?;
                nodes[from..]
                    .iter()
                    .position(|node| {
                        matches!(node, Node::Instruction(other) if other == instruction)
                    })
                    .map(|found| {
                        let offset = offsets[from + found] as u16;
                        match type_argument {
                            None => TypeAnnotationTarget::Offset(offset),
                            Some(index) => TypeAnnotationTarget::TypeArgument {
                                offset,
                                index: *index,
                            },
                        }
                    })
            }
        };
        let target = match target {
            Some(target) => target,
            None => {
                log::warn!(
                    "dropping a type annotation of `{}`: its target is gone",
                    context.method_name
                );
                continue;
            }
        };
        let annotation = TypeAnnotation {
            target_type: entry.target_type,
            target,
            annotation: entry.annotation.clone(),
        };
        if entry.visible {
            visible_annotations.push(annotation);
        } else {
            invisible_annotations.push(annotation);
        }
    }
    if !visible_annotations.is_empty() {
        attributes.push(
            constants.get_attribute(&RuntimeVisibleTypeAnnotations(visible_annotations))?,
        );
    }
    if !invisible_annotations.is_empty() {
        attributes.push(
            constants.get_attribute(&RuntimeInvisibleTypeAnnotations(invisible_annotations))?,
        );
    }

    if body.has_frames() {
        let mut located: Vec<(usize, &Frame)> = vec![];
        for (label, frame) in &body.frames {
            let offset = offset_of(label)?;
            if offset < code_length {
                located.push((offset, frame));
            } else {
                log::warn!(
                    "dropping stack map frame past the end of `{}`",
                    context.method_name
                );
            }
        }
        // Frames already in the body win over the added ones at the same offset
        for (offset, frame) in &extra_frames {
            if *offset < code_length {
                located.push((*offset, frame));
            }
        }
        located.sort_by_key(|(offset, _)| *offset);
        located.dedup_by_key(|(offset, _)| *offset);
        let frames = compress_frames(context.initial_locals, &located, &new_offsets)?;
        attributes.push(constants.get_attribute(&StackMapTable(frames))?);
    }

    for name in &body.unmapped_attributes {
        log::warn!(
            "dropping `{}` attribute of `{}`: its code offsets can't be remapped",
            name,
            context.method_name
        );
    }

    Ok(Code {
        max_stack: max_stack(body)?,
        max_locals: u16::try_from(max_locals).map_err(|_| {
            Error::MalformedClassFile(format!(
                "`{}` needs {} local slots",
                context.method_name, max_locals
            ))
        })?,
        code_array,
        exception_table,
        attributes,
    })
}

/// One past the highest local slot an instruction touches
fn locals_used(instruction: &Instruction) -> usize {
    match instruction {
        Instruction::Var { opcode, var } => {
            let width = Jvm.category(*opcode).map_or(1, |category| category.width());
            *var as usize + width
        }
        Instruction::IInc { var, .. } => *var as usize + 1,
        _ => 0,
    }
}

fn write_instruction(
    code: &mut Vec<u8>,
    entry: &Interned<'_>,
    offset: usize,
    widened: bool,
    offset_of: &impl Fn(&Label) -> Result<usize, Error>,
) -> Result<(), Error> {
    let relative = |label: &Label| -> Result<i32, Error> {
        Ok((offset_of(label)? as isize - offset as isize) as i32)
    };
    let constant = entry.constant.unwrap_or(ConstantIndex(0)).0;

    match entry.instruction {
        Instruction::Insn(op) => code.write_u8(*op)?,
        Instruction::Int { opcode, operand } => {
            code.write_u8(*opcode)?;
            match *opcode {
                opcode::SIPUSH => code.write_i16::<BigEndian>(*operand as i16)?,
                opcode::BIPUSH => code.write_i8(*operand as i8)?,
                _ => code.write_u8(*operand as u8)?,
            }
        }
        Instruction::Var { opcode, var } => {
            if !has_explicit_slot(*opcode) {
                code.write_u8(*opcode)?;
            } else if *var <= u8::MAX as u16 {
                code.write_u8(*opcode)?;
                code.write_u8(*var as u8)?;
            } else {
                code.write_u8(opcode::WIDE)?;
                code.write_u8(*opcode)?;
                code.write_u16::<BigEndian>(*var)?;
            }
        }
        Instruction::IInc { var, increment } => {
            if *var <= u8::MAX as u16 && i8::try_from(*increment).is_ok() {
                code.write_u8(opcode::IINC)?;
                code.write_u8(*var as u8)?;
                code.write_i8(*increment as i8)?;
            } else {
                code.write_u8(opcode::WIDE)?;
                code.write_u8(opcode::IINC)?;
                code.write_u16::<BigEndian>(*var)?;
                code.write_i16::<BigEndian>(*increment)?;
            }
        }
        Instruction::Jump { opcode, target } => match *opcode {
            opcode::GOTO_W | opcode::JSR_W => {
                code.write_u8(*opcode)?;
                code.write_i32::<BigEndian>(relative(target)?)?;
            }
            _ if !widened => {
                code.write_u8(*opcode)?;
                code.write_i16::<BigEndian>(relative(target)? as i16)?;
            }
            opcode::GOTO => {
                code.write_u8(opcode::GOTO_W)?;
                code.write_i32::<BigEndian>(relative(target)?)?;
            }
            opcode::JSR => {
                code.write_u8(opcode::JSR_W)?;
                code.write_i32::<BigEndian>(relative(target)?)?;
            }
            conditional => {
                // Hop over a `goto_w` when the condition does not hold
                let inverted = invert_condition(conditional).ok_or_else(|| {
                    Error::MalformedClassFile(format!("can't widen jump opcode {}", conditional))
                })?;
                code.write_u8(inverted)?;
                code.write_i16::<BigEndian>(8)?;
                code.write_u8(opcode::GOTO_W)?;
                code.write_i32::<BigEndian>(relative(target)? - 3)?;
            }
        },
        Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            code.write_u8(opcode::TABLESWITCH)?;
            for _ in 0..switch_padding(offset) {
                code.write_u8(0)?;
            }
            code.write_i32::<BigEndian>(relative(default)?)?;
            code.write_i32::<BigEndian>(*low)?;
            code.write_i32::<BigEndian>(*high)?;
            for target in targets {
                code.write_i32::<BigEndian>(relative(target)?)?;
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            code.write_u8(opcode::LOOKUPSWITCH)?;
            for _ in 0..switch_padding(offset) {
                code.write_u8(0)?;
            }
            code.write_i32::<BigEndian>(relative(default)?)?;
            code.write_i32::<BigEndian>(pairs.len() as i32)?;
            for (key, target) in pairs {
                code.write_i32::<BigEndian>(*key)?;
                code.write_i32::<BigEndian>(relative(target)?)?;
            }
        }
        Instruction::Ldc(value) => {
            if value.category() == Category::Two {
                code.write_u8(opcode::LDC2_W)?;
                code.write_u16::<BigEndian>(constant)?;
            } else if constant <= u8::MAX as u16 {
                code.write_u8(opcode::LDC)?;
                code.write_u8(constant as u8)?;
            } else {
                code.write_u8(opcode::LDC_W)?;
                code.write_u16::<BigEndian>(constant)?;
            }
        }
        Instruction::Field { opcode, .. } | Instruction::Type { opcode, .. } => {
            code.write_u8(*opcode)?;
            code.write_u16::<BigEndian>(constant)?;
        }
        Instruction::Method { opcode, .. } => {
            code.write_u8(*opcode)?;
            code.write_u16::<BigEndian>(constant)?;
            if *opcode == opcode::INVOKEINTERFACE {
                code.write_u8(entry.count)?;
                code.write_u8(0)?;
            }
        }
        Instruction::InvokeDynamic { .. } => {
            code.write_u8(opcode::INVOKEDYNAMIC)?;
            code.write_u16::<BigEndian>(constant)?;
            code.write_u16::<BigEndian>(0)?;
        }
        Instruction::MultiANewArray { dimensions, .. } => {
            code.write_u8(opcode::MULTIANEWARRAY)?;
            code.write_u16::<BigEndian>(constant)?;
            code.write_u8(*dimensions)?;
        }
    }
    Ok(())
}
