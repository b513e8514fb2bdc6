//! Type states between instructions, for the frames the encoder has to add itself

use super::{
    verification_type, EncodeContext, Frame, Instruction, Label, LdcValue, MethodBody, Node,
};
use crate::isa::opcode;
use crate::jvm::class_file::{ConstantPool, VerificationType};
use crate::jvm::{Error, FieldType, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};
use std::collections::{HashMap, HashSet};

type Type = VerificationType<usize>;

/// Locals and operand stack at one point of a method
///
/// Locals are kept one per slot (the second slot of a `long` or `double` is `Top`) and only turn
/// back into the frame form when a frame is taken. The stack has one entry per value.
#[derive(Clone, Debug, PartialEq)]
struct TypeState {
    locals: Vec<Type>,
    stack: Vec<Type>,
}

impl TypeState {
    fn from_frame(frame: &Frame) -> TypeState {
        let mut locals = vec![];
        for typ in &frame.locals {
            locals.push(*typ);
            if typ.width() == 2 {
                locals.push(VerificationType::Top);
            }
        }
        TypeState {
            locals,
            stack: frame.stack.clone(),
        }
    }

    fn to_frame(&self) -> Frame {
        let mut locals = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let typ = self.locals[slot];
            locals.push(typ);
            slot += typ.width();
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }
        Frame {
            locals,
            stack: self.stack.clone(),
        }
    }

    fn push(&mut self, typ: Type) {
        self.stack.push(typ);
    }

    fn pop(&mut self, instruction: &Instruction) -> Result<Type, Error> {
        self.stack.pop().ok_or_else(|| Error::StackUnderflow {
            instruction: instruction.to_string(),
        })
    }

    fn pop_n(&mut self, count: usize, instruction: &Instruction) -> Result<(), Error> {
        for _ in 0..count {
            self.pop(instruction)?;
        }
        Ok(())
    }

    fn load(&self, slot: u16) -> Type {
        self.locals
            .get(slot as usize)
            .copied()
            .unwrap_or(VerificationType::Top)
    }

    fn store(&mut self, slot: u16, typ: Type) {
        let slot = slot as usize;
        let end = slot + typ.width();
        if self.locals.len() < end {
            self.locals.resize(end, VerificationType::Top);
        }

        // Overwriting the second half of a wide value kills the whole value
        if slot > 0 && self.locals[slot - 1].width() == 2 {
            self.locals[slot - 1] = VerificationType::Top;
        }
        self.locals[slot] = typ;
        if typ.width() == 2 {
            self.locals[slot + 1] = VerificationType::Top;
        }
    }

    /// Every copy of an uninitialized value turns into `initialized` once `<init>` ran
    fn initialize(&mut self, uninitialized: Type, initialized: Type) {
        for typ in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if *typ == uninitialized {
                *typ = initialized;
            }
        }
    }
}

/// Type of values in slot or array element `kind` order: `i`, `l`, `f`, `d`
fn numeric(kind: u8) -> Type {
    match kind % 4 {
        0 => VerificationType::Integer,
        1 => VerificationType::Long,
        2 => VerificationType::Float,
        _ => VerificationType::Double,
    }
}

/// Walks a method body in code order, one type state at a time
///
/// No merging happens: every jump target and every instruction after an unconditional jump
/// already carries a frame in a method with a `StackMapTable`, and taking that frame is what the
/// verifier does too. Code with no frame after an unconditional jump is unreachable and has no
/// state.
struct Inference<'a> {
    constants: &'a mut ConstantPool,
    context: &'a EncodeContext<'a>,

    /// How many `new` instructions came before the current one
    allocations: usize,
}

impl<'a> Inference<'a> {
    fn class(&mut self, name: &str) -> Result<Type, Error> {
        Ok(VerificationType::Object(self.constants.get_class(name)?))
    }

    fn field(&mut self, descriptor: &FieldType) -> Result<Type, Error> {
        verification_type(self.constants, descriptor)
    }

    /// Apply one instruction, returning whether execution can continue with the next one
    fn step(&mut self, state: &mut TypeState, instruction: &Instruction) -> Result<bool, Error> {
        use VerificationType::*;

        match instruction {
            Instruction::Insn(op) => return self.zero_operand(state, *op, instruction),

            Instruction::Int {
                opcode: opcode::NEWARRAY,
                operand,
            } => {
                state.pop(instruction)?;
                let array = match operand {
                    4 => "[Z",
                    5 => "[C",
                    6 => "[F",
                    7 => "[D",
                    8 => "[B",
                    9 => "[S",
                    10 => "[I",
                    11 => "[J",
                    _ => {
                        return Err(Error::MalformedClassFile(format!(
                            "newarray of unknown type {}",
                            operand
                        )))
                    }
                };
                let array = self.class(array)?;
                state.push(array);
            }
            Instruction::Int { .. } => state.push(Integer),

            Instruction::Var { opcode, var } => match *opcode {
                opcode::ALOAD | opcode::ALOAD_0..=opcode::ALOAD_3 => state.push(state.load(*var)),
                opcode::ILOAD..=opcode::DLOAD => state.push(numeric(*opcode - opcode::ILOAD)),
                opcode::ILOAD_0..=opcode::DLOAD_3 => {
                    state.push(numeric((*opcode - opcode::ILOAD_0) / 4))
                }
                opcode::ISTORE..=opcode::ASTORE | opcode::ISTORE_0..=opcode::ASTORE_3 => {
                    let value = state.pop(instruction)?;
                    state.store(*var, value);
                }
                _ => return Err(subroutines_unsupported(instruction)),
            },

            Instruction::IInc { .. } => (),

            Instruction::Jump { opcode, .. } => match *opcode {
                opcode::IFEQ..=opcode::IFLE | opcode::IFNULL | opcode::IFNONNULL => {
                    state.pop(instruction)?;
                }
                opcode::IF_ICMPEQ..=opcode::IF_ACMPNE => state.pop_n(2, instruction)?,
                opcode::GOTO | opcode::GOTO_W => return Ok(false),
                _ => return Err(subroutines_unsupported(instruction)),
            },

            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                state.pop(instruction)?;
                return Ok(false);
            }

            Instruction::Ldc(value) => {
                let typ = match value {
                    LdcValue::Integer(_) => Integer,
                    LdcValue::Float(_) => Float,
                    LdcValue::Long(_) => Long,
                    LdcValue::Double(_) => Double,
                    LdcValue::String(_) => self.class("java/lang/String")?,
                    LdcValue::Class(_) => self.class("java/lang/Class")?,
                    LdcValue::MethodType(_) => self.class("java/lang/invoke/MethodType")?,
                    LdcValue::MethodHandle(_) => self.class("java/lang/invoke/MethodHandle")?,
                    LdcValue::Dynamic { descriptor, .. } => {
                        self.field(&FieldType::parse(descriptor)?)?
                    }
                };
                state.push(typ);
            }

            Instruction::Field {
                opcode, descriptor, ..
            } => {
                let field_type = FieldType::parse(descriptor)?;
                match *opcode {
                    opcode::GETSTATIC => {
                        let typ = self.field(&field_type)?;
                        state.push(typ);
                    }
                    opcode::GETFIELD => {
                        state.pop(instruction)?;
                        let typ = self.field(&field_type)?;
                        state.push(typ);
                    }
                    opcode::PUTSTATIC => state.pop_n(1, instruction)?,
                    _ => state.pop_n(2, instruction)?,
                }
            }

            Instruction::Method {
                opcode,
                owner,
                name,
                descriptor,
                ..
            } => {
                let method = MethodDescriptor::parse(descriptor)?;
                state.pop_n(method.parameters.len(), instruction)?;
                if *opcode != opcode::INVOKESTATIC {
                    let receiver = state.pop(instruction)?;
                    if name == UnqualifiedName::INIT.as_str() {
                        match receiver {
                            UninitializedThis => {
                                state.initialize(receiver, Object(self.context.this_class))
                            }
                            Uninitialized(_) => {
                                let class = self.class(owner)?;
                                state.initialize(receiver, class);
                            }
                            _ => (),
                        }
                    }
                }
                if let Some(return_type) = &method.return_type {
                    let typ = self.field(return_type)?;
                    state.push(typ);
                }
            }

            Instruction::InvokeDynamic { descriptor, .. } => {
                let method = MethodDescriptor::parse(descriptor)?;
                state.pop_n(method.parameters.len(), instruction)?;
                if let Some(return_type) = &method.return_type {
                    let typ = self.field(return_type)?;
                    state.push(typ);
                }
            }

            Instruction::Type { opcode, class } => match *opcode {
                opcode::NEW => {
                    state.push(Uninitialized(self.allocations));
                    self.allocations += 1;
                }
                opcode::ANEWARRAY => {
                    state.pop(instruction)?;
                    let array = if class.starts_with('[') {
                        format!("[{}", class)
                    } else {
                        format!("[L{};", class)
                    };
                    let array = self.class(&array)?;
                    state.push(array);
                }
                opcode::CHECKCAST => {
                    state.pop(instruction)?;
                    let class = self.class(class)?;
                    state.push(class);
                }
                _ => {
                    state.pop(instruction)?;
                    state.push(Integer);
                }
            },

            Instruction::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                state.pop_n(*dimensions as usize, instruction)?;
                let array = self.class(descriptor)?;
                state.push(array);
            }
        }
        Ok(true)
    }

    fn zero_operand(
        &mut self,
        state: &mut TypeState,
        op: u8,
        instruction: &Instruction,
    ) -> Result<bool, Error> {
        use VerificationType::*;

        match op {
            opcode::NOP => (),
            opcode::ACONST_NULL => state.push(Null),
            opcode::ICONST_M1..=opcode::ICONST_5 => state.push(Integer),
            opcode::LCONST_0 | opcode::LCONST_1 => state.push(Long),
            opcode::FCONST_0..=opcode::FCONST_2 => state.push(Float),
            opcode::DCONST_0 | opcode::DCONST_1 => state.push(Double),

            opcode::AALOAD => {
                state.pop(instruction)?;
                let element = match state.pop(instruction)? {
                    Object(array) => {
                        let name = self.constants.class_name(array)?;
                        match name.strip_prefix('[') {
                            Some(element) => self.field(&FieldType::parse(element)?)?,
                            None => {
                                return Err(Error::MalformedClassFile(format!(
                                    "aaload from non-array {}",
                                    name
                                )))
                            }
                        }
                    }
                    _ => Null,
                };
                state.push(element);
            }
            opcode::BALOAD | opcode::CALOAD | opcode::SALOAD => {
                state.pop_n(2, instruction)?;
                state.push(Integer);
            }
            opcode::IALOAD..=opcode::DALOAD => {
                state.pop_n(2, instruction)?;
                state.push(numeric(op - opcode::IALOAD));
            }
            opcode::IASTORE..=opcode::SASTORE => state.pop_n(3, instruction)?,

            opcode::POP => {
                state.pop(instruction)?;
            }
            opcode::POP2 => {
                if state.pop(instruction)?.width() == 1 {
                    state.pop(instruction)?;
                }
            }
            opcode::DUP => {
                let a = state.pop(instruction)?;
                state.stack.extend([a, a]);
            }
            opcode::DUP_X1 => {
                let a = state.pop(instruction)?;
                let b = state.pop(instruction)?;
                state.stack.extend([a, b, a]);
            }
            opcode::DUP_X2 => {
                let a = state.pop(instruction)?;
                let b = state.pop(instruction)?;
                if b.width() == 2 {
                    state.stack.extend([a, b, a]);
                } else {
                    let c = state.pop(instruction)?;
                    state.stack.extend([a, c, b, a]);
                }
            }
            opcode::DUP2 => {
                let a = state.pop(instruction)?;
                if a.width() == 2 {
                    state.stack.extend([a, a]);
                } else {
                    let b = state.pop(instruction)?;
                    state.stack.extend([b, a, b, a]);
                }
            }
            opcode::DUP2_X1 => {
                let a = state.pop(instruction)?;
                let b = state.pop(instruction)?;
                if a.width() == 2 {
                    state.stack.extend([a, b, a]);
                } else {
                    let c = state.pop(instruction)?;
                    state.stack.extend([b, a, c, b, a]);
                }
            }
            opcode::DUP2_X2 => {
                let a = state.pop(instruction)?;
                let b = state.pop(instruction)?;
                match (a.width(), b.width()) {
                    (2, 2) => state.stack.extend([a, b, a]),
                    (2, _) => {
                        let c = state.pop(instruction)?;
                        state.stack.extend([a, c, b, a]);
                    }
                    _ => {
                        let c = state.pop(instruction)?;
                        if c.width() == 2 {
                            state.stack.extend([b, a, c, b, a]);
                        } else {
                            let d = state.pop(instruction)?;
                            state.stack.extend([b, a, d, c, b, a]);
                        }
                    }
                }
            }
            opcode::SWAP => {
                let a = state.pop(instruction)?;
                let b = state.pop(instruction)?;
                state.stack.extend([a, b]);
            }

            opcode::IADD..=opcode::DREM => {
                state.pop_n(2, instruction)?;
                state.push(numeric(op - opcode::IADD));
            }
            opcode::INEG..=opcode::DNEG => {
                state.pop(instruction)?;
                state.push(numeric(op - opcode::INEG));
            }
            opcode::ISHL..=opcode::LXOR => {
                state.pop_n(2, instruction)?;
                state.push(if (op - opcode::ISHL) % 2 == 0 { Integer } else { Long });
            }

            opcode::I2L..=opcode::I2S => {
                state.pop(instruction)?;
                state.push(match op {
                    opcode::I2L | opcode::F2L | opcode::D2L => Long,
                    opcode::I2F | opcode::L2F | opcode::D2F => Float,
                    opcode::I2D | opcode::L2D | opcode::F2D => Double,
                    _ => Integer,
                });
            }
            opcode::LCMP..=opcode::DCMPG => {
                state.pop_n(2, instruction)?;
                state.push(Integer);
            }

            opcode::IRETURN..=opcode::RETURN | opcode::ATHROW => return Ok(false),

            opcode::ARRAYLENGTH => {
                state.pop(instruction)?;
                state.push(Integer);
            }
            opcode::MONITORENTER | opcode::MONITOREXIT => {
                state.pop(instruction)?;
            }

            _ => {
                return Err(Error::MalformedClassFile(format!(
                    "no type information for {}",
                    instruction
                )))
            }
        }
        Ok(true)
    }
}

fn subroutines_unsupported(instruction: &Instruction) -> Error {
    Error::MalformedClassFile(format!("{} in a method with stack map frames", instruction))
}

/// Frames right after the instructions at `indices` (positions in `body.nodes`)
///
/// Instructions in unreachable code have no entry in the result.
pub fn infer_frames(
    body: &MethodBody,
    constants: &mut ConstantPool,
    context: &EncodeContext<'_>,
    indices: &HashSet<usize>,
) -> Result<HashMap<usize, Frame>, Error> {
    let frames: HashMap<Label, &Frame> = body
        .frames
        .iter()
        .map(|(label, frame)| (*label, frame))
        .collect();
    let entry = Frame {
        locals: context.initial_locals.to_vec(),
        stack: vec![],
    };

    let mut inference = Inference {
        constants,
        context,
        allocations: 0,
    };
    let mut state = Some(TypeState::from_frame(&entry));
    let mut inferred = HashMap::new();
    for (index, node) in body.nodes.iter().enumerate() {
        match node {
            Node::Label(label) => {
                if let Some(frame) = frames.get(label) {
                    state = Some(TypeState::from_frame(frame));
                }
            }
            Node::Line { .. } => (),
            Node::Instruction(instruction) => match state.as_mut() {
                Some(current) => {
                    if !inference.step(current, instruction)? {
                        state = None;
                    } else if indices.contains(&index) {
                        inferred.insert(index, current.to_frame());
                    }
                }
                None => {
                    if let Instruction::Type {
                        opcode: opcode::NEW,
                        ..
                    } = instruction
                    {
                        inference.allocations += 1;
                    }
                }
            },
        }
    }
    Ok(inferred)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::LabelGenerator;

    fn run(
        constants: &mut ConstantPool,
        initial_locals: &[Type],
        body: &MethodBody,
        index: usize,
    ) -> Option<Frame> {
        let this_class = constants.get_class("a/B").unwrap();
        let context = EncodeContext {
            method_name: "test",
            initial_locals,
            this_class,
        };
        let indices = HashSet::from([index]);
        infer_frames(body, constants, &context, &indices)
            .unwrap()
            .remove(&index)
    }

    fn nodes(instructions: Vec<Instruction>) -> Vec<Node> {
        instructions.into_iter().map(Node::Instruction).collect()
    }

    #[test]
    fn wide_locals_and_stack_shuffles() {
        let mut constants = ConstantPool::new();
        let mut body = MethodBody::new(4);
        body.nodes = nodes(vec![
            Instruction::Insn(opcode::LCONST_1),
            Instruction::Var {
                opcode: opcode::LSTORE_1,
                var: 1,
            },
            Instruction::Insn(opcode::ICONST_2),
            // clobbers the second half of the long in 1-2
            Instruction::Var {
                opcode: opcode::ISTORE_2,
                var: 2,
            },
            Instruction::Insn(opcode::DCONST_0),
            Instruction::Insn(opcode::ACONST_NULL),
            Instruction::Insn(opcode::DUP_X2),
            Instruction::Insn(opcode::POP),
            Instruction::Var {
                opcode: opcode::ILOAD_0,
                var: 0,
            },
        ]);
        let frame = run(&mut constants, &[VerificationType::Integer], &body, 8).unwrap();
        assert_eq!(
            frame,
            Frame {
                locals: vec![
                    VerificationType::Integer,
                    VerificationType::Top,
                    VerificationType::Integer
                ],
                stack: vec![
                    VerificationType::Null,
                    VerificationType::Double,
                    VerificationType::Integer
                ],
            }
        );
    }

    #[test]
    fn constructors_initialize_every_copy() {
        let mut constants = ConstantPool::new();
        let init = |owner: &str| Instruction::Method {
            opcode: opcode::INVOKESPECIAL,
            owner: owner.to_owned(),
            name: String::from("<init>"),
            descriptor: String::from("()V"),
            is_interface: false,
        };
        let mut body = MethodBody::new(2);
        body.nodes = nodes(vec![
            Instruction::Type {
                opcode: opcode::NEW,
                class: String::from("java/lang/Object"),
            },
            Instruction::Insn(opcode::DUP),
            Instruction::Var {
                opcode: opcode::ASTORE_1,
                var: 1,
            },
            Instruction::Type {
                opcode: opcode::NEW,
                class: String::from("a/C"),
            },
            Instruction::Insn(opcode::DUP),
            init("a/C"),
            Instruction::Var {
                opcode: opcode::ALOAD_0,
                var: 0,
            },
            init("java/lang/Object"),
        ]);
        let initial = [VerificationType::UninitializedThis];

        let frame = run(&mut constants, &initial, &body, 5).unwrap();
        let c = constants.get_class("a/C").unwrap();
        assert_eq!(
            frame.stack,
            vec![VerificationType::Uninitialized(0), VerificationType::Object(c)]
        );
        assert_eq!(
            frame.locals,
            vec![
                VerificationType::UninitializedThis,
                VerificationType::Uninitialized(0)
            ]
        );

        let frame = run(&mut constants, &initial, &body, 7).unwrap();
        let this_class = constants.get_class("a/B").unwrap();
        assert_eq!(frame.locals[0], VerificationType::Object(this_class));
    }

    #[test]
    fn array_and_call_results() {
        let mut constants = ConstantPool::new();
        let mut body = MethodBody::new(1);
        body.nodes = nodes(vec![
            Instruction::Var {
                opcode: opcode::ALOAD_0,
                var: 0,
            },
            Instruction::Insn(opcode::ICONST_0),
            Instruction::Insn(opcode::AALOAD),
            Instruction::Insn(opcode::ICONST_1),
            Instruction::Type {
                opcode: opcode::ANEWARRAY,
                class: String::from("java/lang/Object"),
            },
            Instruction::Method {
                opcode: opcode::INVOKESTATIC,
                owner: String::from("a/B"),
                name: String::from("f"),
                descriptor: String::from("([[I[Ljava/lang/Object;)J"),
                is_interface: false,
            },
        ]);
        let matrix = constants.get_class("[[[I").unwrap();
        let initial = [VerificationType::Object(matrix)];

        let frame = run(&mut constants, &initial, &body, 4).unwrap();
        let rows = constants.get_class("[[I").unwrap();
        let objects = constants.get_class("[Ljava/lang/Object;").unwrap();
        assert_eq!(
            frame.stack,
            vec![VerificationType::Object(rows), VerificationType::Object(objects)]
        );

        let frame = run(&mut constants, &initial, &body, 5).unwrap();
        assert_eq!(frame.stack, vec![VerificationType::Long]);
    }

    #[test]
    fn frames_reset_the_state() {
        let mut constants = ConstantPool::new();
        let mut labels = LabelGenerator::new();
        let target = labels.fresh_label();
        let dead = labels.fresh_label();
        let mut body = MethodBody::new(1);
        body.nodes = vec![
            Node::Instruction(Instruction::Jump {
                opcode: opcode::GOTO,
                target,
            }),
            Node::Label(dead),
            Node::Instruction(Instruction::Insn(opcode::ICONST_0)),
            Node::Label(target),
            Node::Instruction(Instruction::Insn(opcode::ICONST_1)),
        ];
        let string = constants.get_class("java/lang/String").unwrap();
        body.frames.push((
            target,
            Frame {
                locals: vec![VerificationType::Object(string)],
                stack: vec![VerificationType::Float],
            },
        ));

        assert_eq!(run(&mut constants, &[], &body, 2), None);
        let frame = run(&mut constants, &[], &body, 4).unwrap();
        assert_eq!(frame.locals, vec![VerificationType::Object(string)]);
        assert_eq!(
            frame.stack,
            vec![VerificationType::Float, VerificationType::Integer]
        );
    }
}
