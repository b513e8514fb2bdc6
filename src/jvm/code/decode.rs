//! Reading a `Code` attribute into a [`MethodBody`]

use super::{
    takes_no_operands, AnnotatedCode, BootstrapInfo, CodeTypeAnnotation, Frame, Handler,
    Instruction, Label, LabelGenerator, LdcValue, LocalVariableEntry, MethodBody, Node,
};
use crate::isa::opcode;
use crate::jvm::class_file::{
    Attribute, BootstrapMethod, Code, Constant, ConstantIndex, ConstantPool, LineNumberTable,
    LocalVariable, LocalVariableTable, LocalVariableTypeTable, RuntimeInvisibleTypeAnnotations,
    RuntimeVisibleTypeAnnotations, StackMapFrame, StackMapTable, TypeAnnotation,
    TypeAnnotationTarget, VerificationType,
};
use crate::jvm::{ClassReader, Error};
use std::collections::{BTreeMap, HashMap};

/// Class-level context needed to decode a method body
pub struct DecodeContext<'a> {
    pub constants: &'a ConstantPool,
    pub bootstrap_methods: &'a [BootstrapMethod],

    /// Types of the locals on method entry (see [`super::initial_locals`])
    pub initial_locals: Vec<VerificationType<usize>>,
}

/// Assigns labels to bytecode offsets, in order of first reference
struct Labels {
    generator: LabelGenerator,
    by_offset: BTreeMap<usize, Label>,
}

impl Labels {
    fn at(&mut self, offset: usize) -> Label {
        let generator = &mut self.generator;
        *self
            .by_offset
            .entry(offset)
            .or_insert_with(|| generator.fresh_label())
    }
}

fn relative(offset: usize, delta: i32) -> Result<usize, Error> {
    let target = offset as i64 + delta as i64;
    usize::try_from(target).map_err(|_| {
        Error::MalformedClassFile(format!(
            "jump at offset {} lands before the method start",
            offset
        ))
    })
}

/// Decode the instructions and tables of a `Code` attribute
pub fn decode(code: &Code, context: &DecodeContext<'_>) -> Result<MethodBody, Error> {
    let mut labels = Labels {
        generator: LabelGenerator::new(),
        by_offset: BTreeMap::new(),
    };

    // Instructions
    let mut instructions: Vec<(usize, Instruction)> = vec![];
    let mut new_ordinals: HashMap<usize, usize> = HashMap::new();
    let mut reader = ClassReader::new(&code.code_array);
    while !reader.is_empty() {
        let offset = reader.position();
        let instruction = decode_instruction(&mut reader, offset, &mut labels, context)?;
        if let Instruction::Type {
            opcode: opcode::NEW,
            ..
        } = instruction
        {
            let ordinal = new_ordinals.len();
            new_ordinals.insert(offset, ordinal);
        }
        instructions.push((offset, instruction));
    }
    let code_len = code.code_array.len();

    // Exception table
    let mut handlers = vec![];
    for entry in &code.exception_table {
        let catch_type = if entry.catch_type.0 == 0 {
            None
        } else {
            Some(context.constants.class_name(entry.catch_type)?)
        };
        handlers.push(Handler {
            start: labels.at(entry.start_pc as usize),
            end: labels.at(entry.end_pc as usize),
            handler: labels.at(entry.handler_pc as usize),
            catch_type,
        });
    }

    // Code attributes
    let mut lines: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    let mut local_variables = vec![];
    let mut frames = vec![];
    let mut type_annotations = vec![];
    let mut unmapped_attributes = vec![];
    for attribute in &code.attributes {
        if attribute.is::<LineNumberTable>(context.constants) {
            for entry in attribute.parse::<LineNumberTable>()?.0 {
                labels.at(entry.start_pc as usize);
                lines
                    .entry(entry.start_pc as usize)
                    .or_default()
                    .push(entry.line_number);
            }
        } else if attribute.is::<LocalVariableTable>(context.constants) {
            for entry in attribute.parse::<LocalVariableTable>()?.0 {
                local_variables.push(local_variable(&mut labels, &entry, false));
            }
        } else if attribute.is::<LocalVariableTypeTable>(context.constants) {
            for entry in attribute.parse::<LocalVariableTypeTable>()?.0 {
                local_variables.push(local_variable(&mut labels, &entry, true));
            }
        } else if attribute.is::<StackMapTable>(context.constants) {
            frames = decode_frames(attribute, context, &new_ordinals, &mut labels)?;
        } else if attribute.is::<RuntimeVisibleTypeAnnotations>(context.constants) {
            for annotation in attribute.parse::<RuntimeVisibleTypeAnnotations>()?.0 {
                type_annotations.push(type_annotation(
                    annotation,
                    true,
                    &instructions,
                    &mut labels,
                )?);
            }
        } else if attribute.is::<RuntimeInvisibleTypeAnnotations>(context.constants) {
            for annotation in attribute.parse::<RuntimeInvisibleTypeAnnotations>()?.0 {
                type_annotations.push(type_annotation(
                    annotation,
                    false,
                    &instructions,
                    &mut labels,
                )?);
            }
        } else {
            unmapped_attributes.push(attribute.name(context.constants)?);
        }
    }

    // Every label must sit on an instruction boundary (or the end of the code)
    let mut boundaries: Vec<usize> = instructions.iter().map(|(offset, _)| *offset).collect();
    boundaries.push(code_len);
    for offset in labels.by_offset.keys() {
        if boundaries.binary_search(offset).is_err() {
            return Err(Error::MalformedClassFile(format!(
                "offset {} is referenced but is not the start of an instruction",
                offset
            )));
        }
    }

    // Interleave labels, line markers, and instructions
    let mut nodes = vec![];
    let emit_position = |offset: usize, nodes: &mut Vec<Node>| {
        if let Some(label) = labels.by_offset.get(&offset) {
            nodes.push(Node::Label(*label));
            for line in lines.get(&offset).into_iter().flatten() {
                nodes.push(Node::Line {
                    line: *line,
                    start: *label,
                });
            }
        }
    };
    for (offset, instruction) in instructions {
        emit_position(offset, &mut nodes);
        nodes.push(Node::Instruction(instruction));
    }
    emit_position(code_len, &mut nodes);

    Ok(MethodBody {
        nodes,
        handlers,
        frames,
        local_variables,
        type_annotations,
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        unmapped_attributes,
        labels: labels.generator,
    })
}

fn local_variable(
    labels: &mut Labels,
    entry: &LocalVariable,
    is_type_table: bool,
) -> LocalVariableEntry {
    let start = entry.start_pc as usize;
    LocalVariableEntry {
        start: labels.at(start),
        end: labels.at(start + entry.length as usize),
        name: entry.name,
        descriptor: entry.descriptor,
        index: entry.index,
        is_type_table,
    }
}

fn type_annotation(
    annotation: TypeAnnotation,
    visible: bool,
    instructions: &[(usize, Instruction)],
    labels: &mut Labels,
) -> Result<CodeTypeAnnotation, Error> {
    let target = match annotation.target {
        TypeAnnotationTarget::Offset(offset) => {
            annotated_instruction(offset as usize, None, instructions, labels)?
        }
        TypeAnnotationTarget::TypeArgument { offset, index } => {
            annotated_instruction(offset as usize, Some(index), instructions, labels)?
        }
        TypeAnnotationTarget::Catch(index) => AnnotatedCode::Catch(index as usize),
        TypeAnnotationTarget::LocalVariable(ranges) => AnnotatedCode::LocalVariable(
            ranges
                .iter()
                .map(|range| {
                    let start = range.start_pc as usize;
                    (
                        labels.at(start),
                        labels.at(start + range.length as usize),
                        range.index,
                    )
                })
                .collect(),
        ),
    };
    Ok(CodeTypeAnnotation {
        visible,
        target_type: annotation.target_type,
        target,
        annotation: annotation.annotation,
    })
}

fn annotated_instruction(
    offset: usize,
    type_argument: Option<u8>,
    instructions: &[(usize, Instruction)],
    labels: &mut Labels,
) -> Result<AnnotatedCode, Error> {
    match instructions.binary_search_by_key(&offset, |(at, _)| *at) {
        Ok(index) => Ok(AnnotatedCode::Instruction {
            at: labels.at(offset),
            instruction: instructions[index].1.clone(),
            type_argument,
        }),
        Err(_) => Err(Error::MalformedClassFile(format!(
            "type annotation on offset {}, which is not an instruction",
            offset
        ))),
    }
}

/// Expand the compressed frames of a `StackMapTable` into absolute ones
fn decode_frames(
    attribute: &Attribute,
    context: &DecodeContext<'_>,
    new_ordinals: &HashMap<usize, usize>,
    labels: &mut Labels,
) -> Result<Vec<(Label, Frame)>, Error> {
    let to_ordinal = |offset: &u16| -> Result<usize, Error> {
        new_ordinals.get(&(*offset as usize)).copied().ok_or_else(|| {
            Error::MalformedClassFile(format!(
                "uninitialized type refers to offset {}, which is not a `new`",
                offset
            ))
        })
    };
    let convert = |types: &[VerificationType<u16>]| -> Result<Vec<VerificationType<usize>>, Error> {
        types
            .iter()
            .map(|typ| typ.map_uninitialized(to_ordinal))
            .collect()
    };

    let mut frames = vec![];
    let mut locals = context.initial_locals.clone();
    let mut previous_offset: Option<usize> = None;
    for frame in attribute.parse::<StackMapTable>()?.0 {
        let offset = match previous_offset {
            None => frame.offset_delta() as usize,
            Some(previous) => previous + frame.offset_delta() as usize + 1,
        };
        previous_offset = Some(offset);

        let stack = match frame {
            StackMapFrame::SameLocalsNoStack { .. } => vec![],
            StackMapFrame::SameLocalsOneStack { stack, .. } => convert(&[stack])?,
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let chopped = chopped_k as usize;
                if chopped > locals.len() {
                    return Err(Error::MalformedClassFile(format!(
                        "frame at offset {} chops more locals than there are",
                        offset
                    )));
                }
                locals.truncate(locals.len() - chopped);
                vec![]
            }
            StackMapFrame::AppendLocalsNoStack {
                locals: appended, ..
            } => {
                locals.extend(convert(&appended)?);
                vec![]
            }
            StackMapFrame::Full {
                locals: full_locals,
                stack,
                ..
            } => {
                locals = convert(&full_locals)?;
                convert(&stack)?
            }
        };
        frames.push((
            labels.at(offset),
            Frame {
                locals: locals.clone(),
                stack,
            },
        ));
    }
    Ok(frames)
}

fn decode_instruction(
    reader: &mut ClassReader<'_>,
    offset: usize,
    labels: &mut Labels,
    context: &DecodeContext<'_>,
) -> Result<Instruction, Error> {
    let constants = context.constants;
    let op = reader.read_u8()?;
    let instruction = match op {
        op if takes_no_operands(op) => Instruction::Insn(op),
        opcode::BIPUSH => Instruction::Int {
            opcode: op,
            operand: reader.read_i8()? as i32,
        },
        opcode::SIPUSH => Instruction::Int {
            opcode: op,
            operand: reader.read_i16()? as i32,
        },
        opcode::LDC => {
            let index = ConstantIndex(reader.read_u8()? as u16);
            Instruction::Ldc(ldc_value(constants, index)?)
        }
        opcode::LDC_W | opcode::LDC2_W => {
            let index = ConstantIndex(reader.read_u16()?);
            Instruction::Ldc(ldc_value(constants, index)?)
        }
        opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET => {
            Instruction::Var {
                opcode: op,
                var: reader.read_u8()? as u16,
            }
        }
        opcode::ILOAD_0..=opcode::ALOAD_3 => Instruction::Var {
            opcode: op,
            var: ((op - opcode::ILOAD_0) % 4) as u16,
        },
        opcode::ISTORE_0..=opcode::ASTORE_3 => Instruction::Var {
            opcode: op,
            var: ((op - opcode::ISTORE_0) % 4) as u16,
        },
        opcode::IINC => Instruction::IInc {
            var: reader.read_u8()? as u16,
            increment: reader.read_i8()? as i16,
        },
        opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL => {
            let delta = reader.read_i16()? as i32;
            Instruction::Jump {
                opcode: op,
                target: labels.at(relative(offset, delta)?),
            }
        }
        opcode::GOTO_W | opcode::JSR_W => {
            let delta = reader.read_i32()?;
            Instruction::Jump {
                opcode: op,
                target: labels.at(relative(offset, delta)?),
            }
        }
        opcode::TABLESWITCH => {
            reader.align_to_four()?;
            let default = labels.at(relative(offset, reader.read_i32()?)?);
            let low = reader.read_i32()?;
            let high = reader.read_i32()?;
            if high < low {
                return Err(Error::MalformedClassFile(format!(
                    "tableswitch at offset {} has low {} above high {}",
                    offset, low, high
                )));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                targets.push(labels.at(relative(offset, reader.read_i32()?)?));
            }
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        opcode::LOOKUPSWITCH => {
            reader.align_to_four()?;
            let default = labels.at(relative(offset, reader.read_i32()?)?);
            let count = reader.read_i32()?;
            let count = usize::try_from(count).map_err(|_| {
                Error::MalformedClassFile(format!(
                    "lookupswitch at offset {} has a negative case count",
                    offset
                ))
            })?;
            let mut pairs = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                let key = reader.read_i32()?;
                pairs.push((key, labels.at(relative(offset, reader.read_i32()?)?)));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        opcode::GETSTATIC..=opcode::PUTFIELD => {
            let member = constants.member_ref(ConstantIndex(reader.read_u16()?))?;
            Instruction::Field {
                opcode: op,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
            }
        }
        opcode::INVOKEVIRTUAL..=opcode::INVOKEINTERFACE => {
            let member = constants.member_ref(ConstantIndex(reader.read_u16()?))?;
            if op == opcode::INVOKEINTERFACE {
                let _count = reader.read_u8()?;
                let _zero = reader.read_u8()?;
            }
            Instruction::Method {
                opcode: op,
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
                is_interface: member.is_interface,
            }
        }
        opcode::INVOKEDYNAMIC => {
            let index = ConstantIndex(reader.read_u16()?);
            let _zeros = reader.read_u16()?;
            invoke_dynamic(context, index)?
        }
        opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF => {
            Instruction::Type {
                opcode: op,
                class: constants.class_name(ConstantIndex(reader.read_u16()?))?,
            }
        }
        opcode::NEWARRAY => Instruction::Int {
            opcode: op,
            operand: reader.read_u8()? as i32,
        },
        opcode::MULTIANEWARRAY => Instruction::MultiANewArray {
            descriptor: constants.class_name(ConstantIndex(reader.read_u16()?))?,
            dimensions: reader.read_u8()?,
        },
        opcode::WIDE => {
            let widened = reader.read_u8()?;
            match widened {
                opcode::IINC => Instruction::IInc {
                    var: reader.read_u16()?,
                    increment: reader.read_i16()?,
                },
                opcode::ILOAD..=opcode::ALOAD
                | opcode::ISTORE..=opcode::ASTORE
                | opcode::RET => Instruction::Var {
                    opcode: widened,
                    var: reader.read_u16()?,
                },
                other => {
                    return Err(Error::UnknownOpcode {
                        opcode: other,
                        offset: offset + 1,
                    })
                }
            }
        }
        other => {
            return Err(Error::UnknownOpcode {
                opcode: other,
                offset,
            })
        }
    };
    Ok(instruction)
}

fn ldc_value(constants: &ConstantPool, index: ConstantIndex) -> Result<LdcValue, Error> {
    let value = match constants.get(index)? {
        Constant::Integer(value) => LdcValue::Integer(*value),
        Constant::Float(bits) => LdcValue::Float(*bits),
        Constant::Long(value) => LdcValue::Long(*value),
        Constant::Double(bits) => LdcValue::Double(*bits),
        Constant::String(utf8) => LdcValue::String(constants.utf8_bytes(*utf8)?.to_vec()),
        Constant::Class(name) => LdcValue::Class(constants.utf8(*name)?),
        Constant::MethodType(descriptor) => LdcValue::MethodType(constants.utf8(*descriptor)?),
        Constant::MethodHandle { .. } => LdcValue::MethodHandle(index),
        Constant::Dynamic { name_and_type, .. } => LdcValue::Dynamic {
            index,
            descriptor: constants.name_and_type(*name_and_type)?.1,
        },
        _ => {
            return Err(Error::BadConstantIndex {
                index: index.0,
                expected: "loadable constant",
            })
        }
    };
    Ok(value)
}

/// Owner and name of the method a `MethodHandle` constant points at
fn method_handle_target(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<(String, String), Error> {
    match constants.get(index)? {
        Constant::MethodHandle { reference, .. } => {
            let member = constants.member_ref(*reference)?;
            Ok((member.owner, member.name))
        }
        _ => Err(Error::BadConstantIndex {
            index: index.0,
            expected: "MethodHandle",
        }),
    }
}

fn invoke_dynamic(
    context: &DecodeContext<'_>,
    index: ConstantIndex,
) -> Result<Instruction, Error> {
    let constants = context.constants;
    let (bootstrap_index, name_and_type) = match constants.get(index)? {
        Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        } => (*bootstrap_method, *name_and_type),
        _ => {
            return Err(Error::BadConstantIndex {
                index: index.0,
                expected: "InvokeDynamic",
            })
        }
    };
    let (name, descriptor) = constants.name_and_type(name_and_type)?;
    let bootstrap_method = context
        .bootstrap_methods
        .get(bootstrap_index as usize)
        .ok_or_else(|| {
            Error::MalformedClassFile(format!(
                "invokedynamic refers to missing bootstrap method {}",
                bootstrap_index
            ))
        })?;
    let (owner, bootstrap_name) =
        method_handle_target(constants, bootstrap_method.bootstrap_method)?;

    // Lambdas report their implementation class, string concatenation its recipe
    let arguments = &bootstrap_method.bootstrap_arguments;
    let detail = if owner.ends_with("LambdaMetafactory") {
        match arguments.get(1) {
            Some(handle) => method_handle_target(constants, *handle)?.0,
            None => bootstrap_name.clone(),
        }
    } else if owner.ends_with("StringConcatFactory") {
        match arguments.first().map(|arg| constants.get(*arg)) {
            Some(Ok(Constant::String(utf8))) => constants.utf8(*utf8)?,
            _ => bootstrap_name.clone(),
        }
    } else {
        bootstrap_name.clone()
    };

    Ok(Instruction::InvokeDynamic {
        index,
        name,
        descriptor,
        bootstrap: BootstrapInfo {
            owner,
            name: bootstrap_name,
            detail,
        },
    })
}
