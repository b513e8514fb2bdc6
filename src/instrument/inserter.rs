use super::{probe_signature, CodeSink, CodeSinkExts, Error, MethodContext, INT, OBJECT, STRING};
use crate::isa::{opcode, Category, InstructionSet, Jvm};
use crate::jvm::code::{has_explicit_slot, takes_no_operands, Instruction, MethodBody, Node};
use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, TypeKind,
    UnqualifiedName,
};
use crate::settings::Settings;
use Category::{One, Two};

/// Prefix of the synthetic fields javac uses for the enclosing instance of an inner class
///
/// The suffix is the nesting depth (`this$0`, `this$1`, ...).
const OUTER_INSTANCE_PREFIX: &str = "this$";

/// Prefix of the synthetic fields holding variables captured by local and anonymous classes
const CAPTURED_VARIABLE_PREFIX: &str = "val$";

/// Inserts a probe call around every instruction of a method body
///
/// Probes are static methods of the configured probe class. Each one receives copies of the
/// values the instruction is about to consume (or has just produced), so the original
/// instructions see exactly the operand stack they would have seen without instrumentation.
pub struct ProbeInserter<I = Jvm> {
    isa: I,
    probe_class: BinaryName,
    skip_synthetic_capture_fields: bool,
}

impl ProbeInserter<Jvm> {
    pub fn new(settings: &Settings) -> ProbeInserter<Jvm> {
        ProbeInserter::with_isa(Jvm, settings)
    }
}

impl<I: InstructionSet<Opcode = u8>> ProbeInserter<I> {
    pub fn with_isa(isa: I, settings: &Settings) -> ProbeInserter<I> {
        ProbeInserter {
            isa,
            probe_class: settings.probe_class.clone(),
            skip_synthetic_capture_fields: settings.skip_synthetic_capture_fields,
        }
    }

    /// Rewrite one method body in place
    ///
    /// Probes for the method entry come first, then every node of the original body gets its
    /// probes. Nothing is reordered and no original node is dropped.
    pub fn instrument_method(
        &self,
        body: &mut MethodBody,
        context: &mut MethodContext,
    ) -> Result<(), Error> {
        let mut out: Vec<Node> = Vec::with_capacity(body.nodes.len() * 4);
        self.method_entry(&mut out, context);

        for node in &body.nodes {
            match node {
                Node::Label(label) => {
                    out.push(node.clone());
                    if context.is_handler_start(label) {
                        out.push_int(context.access.bits() as i32);
                        push_method(&mut out, context);
                        self.probe(
                            &mut out,
                            UnqualifiedName::HANDLER_BEGIN.as_str(),
                            &[INT, STRING, STRING, STRING],
                        );
                    } else if context.is_jump_target(label) {
                        self.probe(&mut out, UnqualifiedName::BB_BEGIN.as_str(), &[]);
                    }
                }
                Node::Line { line, .. } => {
                    out.push_int(*line as i32);
                    self.probe(&mut out, UnqualifiedName::SRC_LINE_NUMBER.as_str(), &[INT]);
                    out.push(node.clone());
                }
                Node::Instruction(instruction) => {
                    self.instruction(&mut out, instruction, context)?;
                    context.observe(instruction);
                }
            }
        }

        body.nodes = out;
        body.max_locals = body.max_locals.max(context.max_locals());
        Ok(())
    }

    /// `METHOD_BEGIN`, the receiver and parameters, then `METHOD_MAXS`
    fn method_entry(&self, out: &mut Vec<Node>, context: &MethodContext) {
        out.push_int(context.access.bits() as i32);
        push_method(out, context);
        self.probe(
            out,
            UnqualifiedName::METHOD_BEGIN.as_str(),
            &[INT, STRING, STRING, STRING],
        );

        let has_receiver =
            context.access.has_receiver() && context.name != UnqualifiedName::CLINIT.as_str();
        if has_receiver && context.name != UnqualifiedName::INIT.as_str() {
            out.load_local(0, TypeKind::Reference);
            self.probe(out, UnqualifiedName::METHOD_BEGIN_RECEIVER.as_str(), &[OBJECT]);
        }

        let parameters = &context.method_descriptor.parameters;
        let slots = context.method_descriptor.parameter_slots(has_receiver);
        for (index, (parameter, slot)) in parameters.iter().zip(slots).enumerate() {
            out.load_local(slot as u16, parameter.kind());
            out.push_int(index as i32);
            out.push_int(slot as i32);
            let descriptor = parameter.probe_descriptor();
            self.probe(
                out,
                UnqualifiedName::METHOD_BEGIN_PARAM.as_str(),
                &[descriptor.as_str(), INT, INT],
            );
        }

        // Maxima of the original body go out at entry, before the first instruction runs,
        // not after the last one
        push_method(out, context);
        out.push_int(context.original_max_stack as i32);
        out.push_int(context.original_max_locals as i32);
        self.probe(
            out,
            UnqualifiedName::METHOD_MAXS.as_str(),
            &[STRING, STRING, STRING, INT, INT],
        );
    }

    /// Emit an instruction along with its probe
    fn instruction(
        &self,
        out: &mut Vec<Node>,
        instruction: &Instruction,
        context: &mut MethodContext,
    ) -> Result<(), Error> {
        let name = self
            .isa
            .mnemonic(instruction.opcode())
            .ok_or_else(|| context.unsupported(instruction))?;

        match instruction {
            Instruction::Insn(op) => self.zero_operand(out, *op, name, context)?,

            Instruction::Int {
                opcode: opcode::BIPUSH | opcode::SIPUSH,
                ..
            } => {
                out.push_instruction(instruction.clone());
                out.duplicate(&self.isa, &[One], 0)?;
                self.probe(out, name, &[INT]);
                return Ok(());
            }
            Instruction::Int {
                opcode: opcode::NEWARRAY,
                operand,
            } => {
                out.duplicate(&self.isa, &[One], 0)?;
                out.push_int(*operand);
                push_location(out, context);
                self.probe(out, name, &[INT, INT, STRING, STRING]);
            }
            Instruction::Int { .. } => return Err(context.unsupported(instruction)),

            Instruction::Var { opcode, var } => {
                if has_explicit_slot(*opcode) {
                    out.push_int(*var as i32);
                    self.probe(out, name, &[INT]);
                } else if matches!(
                    *opcode,
                    opcode::ILOAD_0..=opcode::ALOAD_3 | opcode::ISTORE_0..=opcode::ASTORE_3
                ) {
                    self.probe(out, name, &[]);
                } else {
                    return Err(context.unsupported(instruction));
                }
            }

            Instruction::IInc { var, increment } => {
                out.push_int(*var as i32);
                out.push_int(*increment as i32);
                self.probe(out, name, &[INT, INT]);
            }

            Instruction::Jump { opcode, .. } => match *opcode {
                opcode::IFEQ..=opcode::IFLE => {
                    out.duplicate(&self.isa, &[One], 0)?;
                    self.branch_probe(out, name, &[INT], context);
                }
                opcode::IF_ICMPEQ..=opcode::IF_ICMPLE => {
                    out.duplicate_pair(&self.isa)?;
                    self.branch_probe(out, name, &[INT, INT], context);
                }
                opcode::IF_ACMPEQ | opcode::IF_ACMPNE => {
                    out.duplicate_pair(&self.isa)?;
                    self.branch_probe(out, name, &[OBJECT, OBJECT], context);
                }
                opcode::IFNULL | opcode::IFNONNULL => {
                    out.duplicate(&self.isa, &[One], 0)?;
                    self.branch_probe(out, name, &[OBJECT], context);
                }
                opcode::GOTO | opcode::GOTO_W | opcode::JSR | opcode::JSR_W => {
                    self.probe(out, name, &[]);
                }
                _ => return Err(context.unsupported(instruction)),
            },

            Instruction::TableSwitch { low, high, .. } => {
                let id = context.next_branch_id();
                out.duplicate(&self.isa, &[One], 0)?;
                out.push_int(*low);
                out.push_int(*high);
                push_location(out, context);
                out.push_int(id);
                self.probe(out, name, &[INT, INT, INT, STRING, STRING, INT]);
            }

            Instruction::LookupSwitch { pairs, .. } => {
                let id = context.next_branch_id();
                out.duplicate(&self.isa, &[One], 0)?;
                out.push_int(pairs.len() as i32);
                out.push_instruction(Instruction::Int {
                    opcode: opcode::NEWARRAY,
                    operand: NEWARRAY_INT,
                });
                for (index, (key, _)) in pairs.iter().enumerate() {
                    out.duplicate(&self.isa, &[One], 0)?;
                    out.push_int(index as i32);
                    out.push_int(*key);
                    out.push_instruction(Instruction::Insn(opcode::IASTORE));
                }
                push_location(out, context);
                out.push_int(id);
                self.probe(out, name, &[INT, "[I", STRING, STRING, INT]);
            }

            Instruction::Ldc(value) => {
                out.push_instruction(instruction.clone());
                out.duplicate(&self.isa, &[value.category()], 0)?;
                self.probe(out, name, &[value.probe_descriptor().as_str()]);
                return Ok(());
            }

            Instruction::Field {
                opcode,
                owner,
                name: field_name,
                descriptor,
            } => {
                if self.skips_field(field_name) {
                    log::trace!("no probe on synthetic field {}", field_name);
                } else if *opcode == opcode::PUTFIELD && context.receiver_uninitialized() {
                    log::trace!("no probe on {} before the receiver is initialized", field_name);
                } else {
                    let field_type = FieldType::parse(descriptor)?;
                    let value = field_type.kind().stack_descriptor();
                    let category = field_type.category();
                    let member = [owner.as_str(), field_name.as_str(), descriptor.as_str()];
                    match *opcode {
                        opcode::GETFIELD => {
                            out.duplicate(&self.isa, &[One], 0)?;
                            out.push_strings(&member);
                            self.probe(out, name, &[OBJECT, STRING, STRING, STRING]);
                        }
                        opcode::PUTFIELD => {
                            match category {
                                One => out.duplicate_pair(&self.isa)?,
                                Two => {
                                    out.duplicate(&self.isa, &[Two, One], 1)?;
                                    out.duplicate(&self.isa, &[One, Two, One], 1)?;
                                }
                            }
                            out.push_strings(&member);
                            self.probe(out, name, &[OBJECT, value, STRING, STRING, STRING]);
                        }
                        opcode::GETSTATIC => {
                            out.push_strings(&member);
                            self.probe(out, name, &[STRING, STRING, STRING]);
                        }
                        opcode::PUTSTATIC => {
                            out.duplicate(&self.isa, &[category], 0)?;
                            out.push_strings(&member);
                            self.probe(out, name, &[value, STRING, STRING, STRING]);
                        }
                        _ => return Err(context.unsupported(instruction)),
                    }
                }
            }

            Instruction::Method {
                opcode,
                owner,
                name: method_name,
                descriptor,
                ..
            } => {
                let has_receiver = match *opcode {
                    opcode::INVOKEVIRTUAL | opcode::INVOKEINTERFACE => true,
                    opcode::INVOKESPECIAL => method_name != UnqualifiedName::INIT.as_str(),
                    opcode::INVOKESTATIC => false,
                    _ => return Err(context.unsupported(instruction)),
                };
                let call = Call {
                    opcode: *opcode,
                    member: [owner.as_str(), method_name.as_str(), descriptor.as_str()],
                    method: MethodDescriptor::parse(descriptor)?,
                    has_receiver,
                };
                return self.call(out, instruction, name, &call, context);
            }

            Instruction::InvokeDynamic {
                descriptor,
                bootstrap,
                ..
            } => {
                let method = MethodDescriptor::parse(descriptor)?;
                out.push_instruction(instruction.clone());
                let bootstrap_info = [bootstrap.owner.as_str(), bootstrap.detail.as_str()];
                match &method.return_type {
                    Some(result) => {
                        out.duplicate(&self.isa, &[result.category()], 0)?;
                        out.push_strings(&bootstrap_info);
                        let value = result.kind().stack_descriptor();
                        self.probe(out, name, &[value, STRING, STRING]);
                    }
                    None => {
                        out.push_strings(&bootstrap_info);
                        self.probe(out, name, &[STRING, STRING]);
                    }
                }
                return Ok(());
            }

            Instruction::Type { opcode, class } => match *opcode {
                opcode::NEW => {
                    out.push_string(class);
                    self.probe(out, name, &[STRING]);
                }
                opcode::ANEWARRAY => {
                    out.duplicate(&self.isa, &[One], 0)?;
                    out.push_string(class);
                    push_location(out, context);
                    self.probe(out, name, &[INT, STRING, STRING, STRING]);
                }
                opcode::CHECKCAST | opcode::INSTANCEOF => {
                    out.duplicate(&self.isa, &[One], 0)?;
                    out.push_string(class);
                    self.probe(out, name, &[OBJECT, STRING]);
                }
                _ => return Err(context.unsupported(instruction)),
            },

            Instruction::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                out.push_string(descriptor);
                out.push_int(*dimensions as i32);
                push_location(out, context);
                self.probe(out, name, &[STRING, INT, STRING, STRING]);
            }
        }

        out.push_instruction(instruction.clone());
        Ok(())
    }

    /// Probes for instructions without operands, emitted before the instruction
    fn zero_operand(
        &self,
        out: &mut Vec<Node>,
        op: u8,
        name: &str,
        context: &MethodContext,
    ) -> Result<(), Error> {
        if !takes_no_operands(op) {
            return Err(context.unsupported(&Instruction::Insn(op)));
        }
        let category = self
            .isa
            .category(op)
            .ok_or_else(|| context.unsupported(&Instruction::Insn(op)))?;

        match op {
            // Only the divisor matters (it might be zero)
            opcode::IDIV
            | opcode::IREM
            | opcode::LDIV
            | opcode::LREM
            | opcode::FDIV
            | opcode::FREM
            | opcode::DDIV
            | opcode::DREM => {
                out.duplicate(&self.isa, &[category], 0)?;
                let divisor = match op {
                    opcode::IDIV | opcode::IREM => "I",
                    opcode::LDIV | opcode::LREM => "J",
                    opcode::FDIV | opcode::FREM => "F",
                    _ => "D",
                };
                self.probe(out, name, &[divisor]);
            }

            // array, index
            opcode::IALOAD..=opcode::SALOAD => {
                out.duplicate_pair(&self.isa)?;
                push_location(out, context);
                self.probe(out, name, &[OBJECT, INT, STRING, STRING]);
            }

            // array, index, value
            opcode::AASTORE => {
                out.duplicate(&self.isa, &[One, One, One], 2)?;
                out.duplicate(&self.isa, &[One, One, One, One], 2)?;
                out.duplicate(&self.isa, &[One, One, One, One, One], 2)?;
                push_location(out, context);
                self.probe(out, name, &[OBJECT, INT, OBJECT, STRING, STRING]);
            }
            opcode::IASTORE..=opcode::SASTORE => {
                out.duplicate(&self.isa, &[category, One, One], 2)?;
                out.duplicate(&self.isa, &[One, category, One, One], 2)?;
                push_location(out, context);
                self.probe(out, name, &[OBJECT, INT, STRING, STRING]);
            }

            opcode::ARRAYLENGTH | opcode::ATHROW => {
                out.duplicate(&self.isa, &[One], 0)?;
                self.probe(out, name, &[OBJECT]);
            }

            _ => self.probe(out, name, &[]),
        }
        Ok(())
    }

    /// Conditional jump probe: compared values are already on the stack
    fn branch_probe(
        &self,
        out: &mut Vec<Node>,
        name: &str,
        operands: &[&str],
        context: &mut MethodContext,
    ) {
        push_location(out, context);
        out.push_int(context.next_branch_id());
        let mut parameters = operands.to_vec();
        parameters.extend([STRING, STRING, INT]);
        self.probe(out, name, &parameters);
    }

    /// Emit a call with probes for its arguments, its receiver, and its result
    ///
    /// Arguments can't be duplicated in place (long argument lists have no shuffle), so they
    /// get stored into temporaries past the method's own locals and reloaded twice: once for
    /// the call itself and once for the argument probes.
    fn call(
        &self,
        out: &mut Vec<Node>,
        instruction: &Instruction,
        name: &str,
        call: &Call<'_>,
        context: &mut MethodContext,
    ) -> Result<(), Error> {
        let parameters = &call.method.parameters;
        let offsets = call.method.parameter_slots(false);
        let arguments_width = call.method.parameter_length(false);
        let park_receiver = call.has_receiver && !parameters.is_empty();
        let base = context.temporaries(arguments_width + park_receiver as usize)?;
        let receiver_temporary = base + arguments_width as u16;

        for (parameter, offset) in parameters.iter().zip(&offsets).rev() {
            out.store_local(base + *offset as u16, parameter.kind());
        }
        if call.has_receiver {
            out.duplicate(&self.isa, &[One], 0)?;
            if park_receiver {
                out.store_local(receiver_temporary, TypeKind::Reference);
            }
        }
        for (parameter, offset) in parameters.iter().zip(&offsets) {
            out.load_local(base + *offset as u16, parameter.kind());
        }

        let callee_slots = call
            .method
            .parameter_slots(call.opcode != opcode::INVOKESTATIC);
        let argument_probes = parameters.iter().zip(&offsets).zip(callee_slots);
        for (index, ((parameter, offset), slot)) in argument_probes.enumerate().rev() {
            out.load_local(base + *offset as u16, parameter.kind());
            out.push_int(index as i32);
            out.push_int(slot as i32);
            let descriptor = parameter.probe_descriptor();
            self.probe(
                out,
                UnqualifiedName::CALLER_STACK_PARAM.as_str(),
                &[descriptor.as_str(), INT, INT],
            );
        }

        if park_receiver {
            out.load_local(receiver_temporary, TypeKind::Reference);
        }
        out.push_strings(&call.member);
        if call.has_receiver {
            self.probe(out, name, &[OBJECT, STRING, STRING, STRING]);
        } else {
            self.probe(out, name, &[STRING, STRING, STRING]);
        }

        out.push_instruction(instruction.clone());

        let result = UnqualifiedName::CALL_RESULT;
        match &call.method.return_type {
            Some(return_type) => {
                out.duplicate(&self.isa, &[return_type.category()], 0)?;
                out.push_strings(&call.member);
                let value = match return_type {
                    FieldType::Base(BaseType::Boolean) => "Z",
                    other => other.kind().stack_descriptor(),
                };
                self.probe(out, result.as_str(), &[value, STRING, STRING, STRING]);
            }
            None => {
                out.push_strings(&call.member);
                self.probe(out, result.as_str(), &[STRING, STRING, STRING]);
            }
        }
        Ok(())
    }

    fn skips_field(&self, field_name: &str) -> bool {
        is_outer_instance(field_name)
            || (self.skip_synthetic_capture_fields
                && field_name.starts_with(CAPTURED_VARIABLE_PREFIX))
    }

    fn probe(&self, out: &mut Vec<Node>, name: &str, parameters: &[&str]) {
        out.invoke_probe(&self.probe_class, name, &probe_signature(parameters));
    }
}

fn is_outer_instance(field_name: &str) -> bool {
    match field_name.strip_prefix(OUTER_INSTANCE_PREFIX) {
        Some(depth) => !depth.is_empty() && depth.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// `newarray` type code for `int[]`
const NEWARRAY_INT: i32 = 10;

/// A call being instrumented
struct Call<'a> {
    opcode: u8,

    /// Owner, name, descriptor
    member: [&'a str; 3],
    method: MethodDescriptor,
    has_receiver: bool,
}

/// Owner, name, and descriptor of the method being instrumented
fn push_method(out: &mut Vec<Node>, context: &MethodContext) {
    out.push_strings(&[
        context.owner.as_str(),
        context.name.as_str(),
        context.descriptor.as_str(),
    ]);
}

/// Owner and name of the method being instrumented
fn push_location(out: &mut Vec<Node>, context: &MethodContext) {
    out.push_strings(&[context.owner.as_str(), context.name.as_str()]);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Handler, LdcValue};
    use crate::jvm::MethodAccessFlags;
    use crate::shuffle::{AbstractStack, PrimitiveOp, StackShape};
    use std::collections::HashMap;

    const OWNER: &str = "com/example/Widget";
    const METHOD: &str = "run";

    /// Symbolic values on the simulated operand stack
    #[derive(Clone, Debug, PartialEq)]
    enum Value {
        Named(&'static str),
        Int(i32),
        Str(String),
        Array(usize),
    }

    fn s(value: &str) -> Value {
        Value::Str(value.to_owned())
    }

    #[derive(Debug, PartialEq)]
    struct Probe {
        name: String,
        descriptor: String,
        arguments: Vec<Value>,
    }

    /// What the original instruction does to the stack
    struct Effect {
        pops: usize,
        pushes: Vec<(Value, Category)>,
    }

    /// Just enough of a JVM to run the code the inserter emits
    #[derive(Default)]
    struct Machine {
        stack: Vec<(Value, Category)>,
        locals: HashMap<u16, (Value, Category)>,
        arrays: Vec<Vec<i32>>,
        probes: Vec<Probe>,

        /// Stack as the original instruction found it
        seen: Option<Vec<(Value, Category)>>,
    }

    impl Machine {
        fn run(
            stack: Vec<(Value, Category)>,
            nodes: &[Node],
            original: &Instruction,
            effect: Effect,
        ) -> Machine {
            let mut machine = Machine {
                stack,
                ..Machine::default()
            };
            let mut effect = Some(effect);
            for node in nodes {
                let instruction = match node {
                    Node::Instruction(instruction) => instruction,
                    _ => continue,
                };
                if instruction == original && machine.seen.is_none() {
                    machine.seen = Some(machine.stack.clone());
                    let effect = effect.take().unwrap();
                    let len = machine.stack.len();
                    machine.stack.truncate(len - effect.pops);
                    machine.stack.extend(effect.pushes);
                } else {
                    machine.step(instruction);
                }
            }
            machine
        }

        fn pop(&mut self) -> Value {
            self.stack.pop().expect("stack underflow").0
        }

        fn step(&mut self, instruction: &Instruction) {
            match instruction {
                Instruction::Insn(op @ opcode::ICONST_M1..=opcode::ICONST_5) => {
                    let value = *op as i32 - opcode::ICONST_0 as i32;
                    self.stack.push((Value::Int(value), Category::One));
                }
                Instruction::Insn(opcode::IASTORE) => {
                    let value = self.pop();
                    let index = self.pop();
                    let array = self.pop();
                    match (array, index, value) {
                        (Value::Array(array), Value::Int(index), Value::Int(value)) => {
                            self.arrays[array][index as usize] = value
                        }
                        other => panic!("bad iastore {:?}", other),
                    }
                }
                Instruction::Insn(op) => {
                    let primitive = PrimitiveOp::ALL
                        .into_iter()
                        .find(|primitive| Jvm.primitive(*primitive) == *op)
                        .unwrap_or_else(|| panic!("cannot simulate {}", instruction));
                    let top_down: Vec<(Value, Category)> =
                        self.stack.iter().rev().cloned().collect();
                    let shape = StackShape(top_down.iter().map(|(_, cat)| *cat).collect());
                    let mut stack = AbstractStack::from_shape(&shape);
                    stack.apply(primitive).unwrap();
                    self.stack = stack
                        .top_down()
                        .into_iter()
                        .rev()
                        .map(|(id, _)| top_down[id].clone())
                        .collect();
                }
                Instruction::Int {
                    opcode: opcode::NEWARRAY,
                    ..
                } => match self.pop() {
                    Value::Int(len) => {
                        self.arrays.push(vec![0; len as usize]);
                        let array = Value::Array(self.arrays.len() - 1);
                        self.stack.push((array, Category::One));
                    }
                    other => panic!("bad array length {:?}", other),
                },
                Instruction::Int { operand, .. } => {
                    self.stack.push((Value::Int(*operand), Category::One))
                }
                Instruction::Ldc(LdcValue::Integer(value)) => {
                    self.stack.push((Value::Int(*value), Category::One))
                }
                Instruction::Ldc(LdcValue::String(bytes)) => {
                    let string = String::from_utf8(bytes.clone()).unwrap();
                    self.stack.push((Value::Str(string), Category::One))
                }
                Instruction::Var { opcode, var }
                    if (opcode::ILOAD..=opcode::ALOAD).contains(opcode) =>
                {
                    let local = self.locals.get(var).cloned().expect("unset local");
                    self.stack.push(local);
                }
                Instruction::Var { opcode, var }
                    if (opcode::ISTORE..=opcode::ASTORE).contains(opcode) =>
                {
                    let local = self.stack.pop().expect("stack underflow");
                    self.locals.insert(*var, local);
                }
                Instruction::Method {
                    opcode: opcode::INVOKESTATIC,
                    owner,
                    name,
                    descriptor,
                    ..
                } if owner.as_str() == BinaryName::PROBE_VM.as_str() => {
                    let method = MethodDescriptor::parse(descriptor).unwrap();
                    assert_eq!(method.return_type, None);
                    let mut arguments = vec![];
                    for parameter in method.parameters.iter().rev() {
                        let (value, category) = self.stack.pop().expect("stack underflow");
                        assert_eq!(category, parameter.category(), "{}{}", name, descriptor);
                        arguments.push(value);
                    }
                    arguments.reverse();
                    self.probes.push(Probe {
                        name: name.clone(),
                        descriptor: descriptor.clone(),
                        arguments,
                    });
                }
                other => panic!("cannot simulate {}", other),
            }
        }

        fn probe_names(&self) -> Vec<&str> {
            self.probes.iter().map(|probe| probe.name.as_str()).collect()
        }
    }

    fn context() -> MethodContext {
        let body = MethodBody::new(4);
        MethodContext::new(OWNER, METHOD, "()V", MethodAccessFlags::PUBLIC, &body).unwrap()
    }

    fn emit(instruction: &Instruction, context: &mut MethodContext) -> Result<Vec<Node>, Error> {
        let inserter = ProbeInserter::new(&Settings::default());
        let mut out = vec![];
        inserter.instruction(&mut out, instruction, context)?;
        Ok(out)
    }

    /// Instrument a single instruction and run it on `stack` (bottom first)
    fn simulate(
        instruction: Instruction,
        stack: Vec<(Value, Category)>,
        effect: Effect,
    ) -> Machine {
        let nodes = emit(&instruction, &mut context()).unwrap();
        let machine = Machine::run(stack.clone(), &nodes, &instruction, effect);
        assert_eq!(
            machine.seen.as_ref(),
            Some(&stack),
            "stack changed under {}",
            instruction
        );
        machine
    }

    fn one(name: &'static str) -> (Value, Category) {
        (Value::Named(name), Category::One)
    }

    fn two(name: &'static str) -> (Value, Category) {
        (Value::Named(name), Category::Two)
    }

    fn consumes(pops: usize) -> Effect {
        Effect {
            pops,
            pushes: vec![],
        }
    }

    #[test]
    fn divisor_is_observed() {
        let machine = simulate(
            Instruction::Insn(opcode::LREM),
            vec![two("dividend"), two("divisor")],
            Effect {
                pops: 2,
                pushes: vec![two("remainder")],
            },
        );
        assert_eq!(
            machine.probes,
            vec![Probe {
                name: String::from("LREM"),
                descriptor: String::from("(J)V"),
                arguments: vec![Value::Named("divisor")],
            }]
        );
        assert_eq!(machine.stack, vec![two("remainder")]);
    }

    #[test]
    fn array_stores_observe_array_and_index() {
        for (op, value) in [
            (opcode::IASTORE, one("value")),
            (opcode::DASTORE, two("value")),
        ] {
            let machine = simulate(
                Instruction::Insn(op),
                vec![one("array"), one("index"), value],
                consumes(3),
            );
            assert_eq!(machine.probes.len(), 1);
            assert_eq!(
                machine.probes[0].arguments,
                vec![
                    Value::Named("array"),
                    Value::Named("index"),
                    s(OWNER),
                    s(METHOD)
                ]
            );
            assert!(machine.stack.is_empty());
        }

        let machine = simulate(
            Instruction::Insn(opcode::AASTORE),
            vec![one("array"), one("index"), one("value")],
            consumes(3),
        );
        assert_eq!(
            machine.probes[0].descriptor,
            "(Ljava/lang/Object;ILjava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V"
        );
        assert_eq!(
            machine.probes[0].arguments[..3],
            [
                Value::Named("array"),
                Value::Named("index"),
                Value::Named("value")
            ]
        );
    }

    #[test]
    fn array_loads_and_plain_instructions() {
        let machine = simulate(
            Instruction::Insn(opcode::BALOAD),
            vec![one("array"), one("index")],
            Effect {
                pops: 2,
                pushes: vec![one("element")],
            },
        );
        assert_eq!(
            machine.probes[0].descriptor,
            "(Ljava/lang/Object;ILjava/lang/String;Ljava/lang/String;)V"
        );

        let machine = simulate(
            Instruction::Insn(opcode::IADD),
            vec![one("a"), one("b")],
            Effect {
                pops: 2,
                pushes: vec![one("sum")],
            },
        );
        assert_eq!(machine.probes[0].name, "IADD");
        assert_eq!(machine.probes[0].descriptor, "()V");
    }

    #[test]
    fn wide_field_write() {
        let write = Instruction::Field {
            opcode: opcode::PUTFIELD,
            owner: String::from("com/example/Box"),
            name: String::from("total"),
            descriptor: String::from("J"),
        };
        let machine = simulate(write, vec![one("receiver"), two("value")], consumes(2));
        assert_eq!(
            machine.probes,
            vec![Probe {
                name: String::from("PUTFIELD"),
                descriptor: String::from(
                    "(Ljava/lang/Object;JLjava/lang/String;Ljava/lang/String;Ljava/lang/String;)V"
                ),
                arguments: vec![
                    Value::Named("receiver"),
                    Value::Named("value"),
                    s("com/example/Box"),
                    s("total"),
                    s("J"),
                ],
            }]
        );
    }

    #[test]
    fn narrow_field_write_and_static_read() {
        let write = Instruction::Field {
            opcode: opcode::PUTFIELD,
            owner: String::from("com/example/Box"),
            name: String::from("flag"),
            descriptor: String::from("Z"),
        };
        let machine = simulate(write, vec![one("receiver"), one("value")], consumes(2));
        assert_eq!(
            machine.probes[0].descriptor,
            "(Ljava/lang/Object;ILjava/lang/String;Ljava/lang/String;Ljava/lang/String;)V"
        );

        let read = Instruction::Field {
            opcode: opcode::GETSTATIC,
            owner: String::from("com/example/Box"),
            name: String::from("COUNT"),
            descriptor: String::from("I"),
        };
        let machine = simulate(
            read,
            vec![],
            Effect {
                pops: 0,
                pushes: vec![one("count")],
            },
        );
        assert_eq!(
            machine.probes[0].descriptor,
            "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V"
        );
    }

    #[test]
    fn synthetic_outer_fields_are_skipped() {
        for name in ["this$0", "this$1", "this$12", "val$captured"] {
            let write = Instruction::Field {
                opcode: opcode::PUTFIELD,
                owner: String::from("com/example/Outer$Inner"),
                name: String::from(name),
                descriptor: String::from("Lcom/example/Outer;"),
            };
            let machine = simulate(write, vec![one("receiver"), one("outer")], consumes(2));
            assert!(machine.probes.is_empty(), "{}", name);
        }

        let write = Instruction::Field {
            opcode: opcode::PUTFIELD,
            owner: String::from("com/example/Outer$Inner"),
            name: String::from("this$"),
            descriptor: String::from("I"),
        };
        let machine = simulate(write, vec![one("receiver"), one("value")], consumes(2));
        assert_eq!(machine.probe_names(), vec!["PUTFIELD"]);
    }

    #[test]
    fn field_writes_wait_for_the_super_call() {
        let put = |name: &str| {
            Node::Instruction(Instruction::Field {
                opcode: opcode::PUTFIELD,
                owner: String::from(OWNER),
                name: String::from(name),
                descriptor: String::from("Ljava/lang/String;"),
            })
        };
        let load = |opcode, var| Node::Instruction(Instruction::Var { opcode, var });
        let mut body = MethodBody::new(2);
        body.nodes = vec![
            load(opcode::ALOAD_0, 0),
            load(opcode::ALOAD_1, 1),
            put("early"),
            load(opcode::ALOAD_0, 0),
            Node::Instruction(Instruction::Method {
                opcode: opcode::INVOKESPECIAL,
                owner: String::from("java/lang/Object"),
                name: String::from("<init>"),
                descriptor: String::from("()V"),
                is_interface: false,
            }),
            load(opcode::ALOAD_0, 0),
            load(opcode::ALOAD_1, 1),
            put("late"),
            Node::Instruction(Instruction::Insn(opcode::RETURN)),
        ];
        let descriptor = "(Ljava/lang/String;)V";
        let mut context =
            MethodContext::new(OWNER, "<init>", descriptor, MethodAccessFlags::PUBLIC, &body)
                .unwrap();
        ProbeInserter::new(&Settings::default())
            .instrument_method(&mut body, &mut context)
            .unwrap();

        let mut names = vec![];
        for node in &body.nodes {
            match node {
                Node::Instruction(Instruction::Method { owner, name, .. })
                    if owner.as_str() == BinaryName::PROBE_VM.as_str() =>
                {
                    names.push(name.as_str())
                }
                Node::Instruction(Instruction::Field { name, .. }) => names.push(name.as_str()),
                _ => (),
            }
        }
        assert_eq!(
            names[3..],
            [
                "ALOAD_0",
                "ALOAD_1",
                "early",
                "ALOAD_0",
                "INVOKESPECIAL",
                "CALL_RESULT",
                "ALOAD_0",
                "ALOAD_1",
                "PUTFIELD",
                "late",
                "RETURN",
            ]
        );
    }

    #[test]
    fn call_with_receiver_and_arguments() {
        let call = Instruction::Method {
            opcode: opcode::INVOKEVIRTUAL,
            owner: String::from("com/example/Box"),
            name: String::from("check"),
            descriptor: String::from("(IJLjava/lang/Object;)Z"),
            is_interface: false,
        };
        let mut context = context();
        let nodes = emit(&call, &mut context).unwrap();
        let stack = vec![one("receiver"), one("a"), two("b"), one("c")];
        let effect = Effect {
            pops: 4,
            pushes: vec![one("result")],
        };
        let machine = Machine::run(stack.clone(), &nodes, &call, effect);

        assert_eq!(machine.seen, Some(stack));
        assert_eq!(machine.stack, vec![one("result")]);
        assert_eq!(
            machine.probe_names(),
            vec![
                "CALLER_STACK_PARAM",
                "CALLER_STACK_PARAM",
                "CALLER_STACK_PARAM",
                "INVOKEVIRTUAL",
                "CALL_RESULT"
            ]
        );
        let arguments: Vec<&[Value]> = machine.probes[..3]
            .iter()
            .map(|probe| probe.arguments.as_slice())
            .collect();
        assert_eq!(
            arguments,
            vec![
                &[Value::Named("c"), Value::Int(2), Value::Int(4)][..],
                &[Value::Named("b"), Value::Int(1), Value::Int(2)][..],
                &[Value::Named("a"), Value::Int(0), Value::Int(1)][..],
            ]
        );
        assert_eq!(machine.probes[0].descriptor, "(Ljava/lang/Object;II)V");
        assert_eq!(machine.probes[1].descriptor, "(JII)V");
        assert_eq!(machine.probes[3].arguments[0], Value::Named("receiver"));
        assert_eq!(
            machine.probes[4].descriptor,
            "(ZLjava/lang/String;Ljava/lang/String;Ljava/lang/String;)V"
        );
        assert_eq!(machine.probes[4].arguments[0], Value::Named("result"));

        // four argument words plus the parked receiver
        assert_eq!(context.max_locals(), 9);
    }

    #[test]
    fn zero_argument_call() {
        let call = Instruction::Method {
            opcode: opcode::INVOKEINTERFACE,
            owner: String::from("java/lang/Runnable"),
            name: String::from("run"),
            descriptor: String::from("()V"),
            is_interface: true,
        };
        let machine = simulate(call, vec![one("receiver")], consumes(1));
        assert_eq!(machine.probe_names(), vec!["INVOKEINTERFACE", "CALL_RESULT"]);
        assert_eq!(machine.probes[0].arguments[0], Value::Named("receiver"));
        assert_eq!(
            machine.probes[1].descriptor,
            "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V"
        );
        assert!(machine.stack.is_empty());
    }

    #[test]
    fn constructor_and_static_calls_have_no_receiver() {
        let init = Instruction::Method {
            opcode: opcode::INVOKESPECIAL,
            owner: String::from("com/example/Box"),
            name: String::from("<init>"),
            descriptor: String::from("(I)V"),
            is_interface: false,
        };
        let machine = simulate(init, vec![one("fresh"), one("size")], consumes(2));
        assert_eq!(
            machine.probe_names(),
            vec!["CALLER_STACK_PARAM", "INVOKESPECIAL", "CALL_RESULT"]
        );
        assert_eq!(
            machine.probes[0].arguments,
            vec![Value::Named("size"), Value::Int(0), Value::Int(1)]
        );
        assert_eq!(machine.probes[1].arguments.len(), 3);

        let call = Instruction::Method {
            opcode: opcode::INVOKESTATIC,
            owner: String::from("java/lang/Math"),
            name: String::from("sqrt"),
            descriptor: String::from("(D)D"),
            is_interface: false,
        };
        let machine = simulate(
            call,
            vec![two("x")],
            Effect {
                pops: 1,
                pushes: vec![two("root")],
            },
        );
        assert_eq!(
            machine.probes[0].arguments,
            vec![Value::Named("x"), Value::Int(0), Value::Int(0)]
        );
        assert_eq!(machine.probes[2].arguments[0], Value::Named("root"));
        assert_eq!(machine.stack, vec![two("root")]);
    }

    #[test]
    fn branch_ids_increase() {
        let mut context = context();
        let mut labels = crate::jvm::code::LabelGenerator::new();
        let target = labels.fresh_label();
        let branch = Instruction::Jump {
            opcode: opcode::IF_ICMPLT,
            target,
        };
        let mut ids = vec![];
        for _ in 0..2 {
            let nodes = emit(&branch, &mut context).unwrap();
            let machine = Machine::run(vec![one("a"), one("b")], &nodes, &branch, consumes(2));
            let probe = &machine.probes[0];
            assert_eq!(probe.descriptor, "(IILjava/lang/String;Ljava/lang/String;I)V");
            assert_eq!(probe.arguments[..2], [Value::Named("a"), Value::Named("b")]);
            ids.push(probe.arguments[4].clone());
        }
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);

        let jump = Instruction::Jump {
            opcode: opcode::GOTO,
            target,
        };
        let nodes = emit(&jump, &mut context).unwrap();
        let machine = Machine::run(vec![], &nodes, &jump, consumes(0));
        assert_eq!(machine.probes[0].descriptor, "()V");
        assert_eq!(context.next_branch_id(), 3);
    }

    #[test]
    fn lookup_switch_passes_keys() {
        let mut labels = crate::jvm::code::LabelGenerator::new();
        let default = labels.fresh_label();
        let switch = Instruction::LookupSwitch {
            default,
            pairs: vec![(3, default), (7, default), (1000, default)],
        };
        let machine = simulate(switch, vec![one("selector")], consumes(1));
        let probe = &machine.probes[0];
        assert_eq!(probe.descriptor, "(I[ILjava/lang/String;Ljava/lang/String;I)V");
        assert_eq!(probe.arguments[0], Value::Named("selector"));
        assert_eq!(probe.arguments[1], Value::Array(0));
        assert_eq!(machine.arrays[0], vec![3, 7, 1000]);
        assert_eq!(probe.arguments[4], Value::Int(1));
    }

    #[test]
    fn constants_are_observed_after_loading() {
        let load = Instruction::Ldc(LdcValue::Double(2.5f64.to_bits()));
        let machine = simulate(
            load,
            vec![],
            Effect {
                pops: 0,
                pushes: vec![two("constant")],
            },
        );
        assert_eq!(machine.probes[0].name, "LDC2_W");
        assert_eq!(machine.probes[0].descriptor, "(D)V");
        assert_eq!(machine.probes[0].arguments, vec![Value::Named("constant")]);
        assert_eq!(machine.stack, vec![two("constant")]);

        let push = Instruction::Int {
            opcode: opcode::SIPUSH,
            operand: 300,
        };
        let nodes = emit(&push, &mut context()).unwrap();
        assert_eq!(nodes[0], Node::Instruction(push));
    }

    #[test]
    fn local_variable_forms() {
        let explicit = Instruction::Var {
            opcode: opcode::ISTORE,
            var: 7,
        };
        let machine = simulate(explicit, vec![one("value")], consumes(1));
        assert_eq!(machine.probes[0].arguments, vec![Value::Int(7)]);

        let implicit = Instruction::Var {
            opcode: opcode::ALOAD_0,
            var: 0,
        };
        let machine = simulate(
            implicit,
            vec![],
            Effect {
                pops: 0,
                pushes: vec![one("this")],
            },
        );
        assert_eq!(machine.probes[0].name, "ALOAD_0");
        assert_eq!(machine.probes[0].descriptor, "()V");
    }

    #[test]
    fn impossible_opcodes_are_rejected() {
        let mut labels = crate::jvm::code::LabelGenerator::new();
        let broken = [
            Instruction::Insn(opcode::GOTO),
            Instruction::Jump {
                opcode: opcode::IADD,
                target: labels.fresh_label(),
            },
            Instruction::Type {
                opcode: opcode::IADD,
                class: String::from("java/lang/Object"),
            },
            Instruction::Field {
                opcode: opcode::INVOKESTATIC,
                owner: String::from("a/B"),
                name: String::from("c"),
                descriptor: String::from("I"),
            },
        ];
        for instruction in broken {
            assert!(
                matches!(
                    emit(&instruction, &mut context()),
                    Err(Error::UnsupportedInstruction { .. })
                ),
                "{} should be rejected",
                instruction
            );
        }
    }

    #[test]
    fn block_entries_and_handlers() {
        let mut body = MethodBody::new(2);
        let start = body.labels.fresh_label();
        let end = body.labels.fresh_label();
        let handler = body.labels.fresh_label();
        let target = body.labels.fresh_label();
        body.nodes = vec![
            Node::Label(start),
            Node::Line { line: 10, start },
            Node::Instruction(Instruction::Var {
                opcode: opcode::ILOAD_1,
                var: 1,
            }),
            Node::Instruction(Instruction::Jump {
                opcode: opcode::IFNE,
                target,
            }),
            Node::Label(end),
            Node::Instruction(Instruction::Insn(opcode::RETURN)),
            Node::Label(handler),
            Node::Instruction(Instruction::Insn(opcode::ATHROW)),
            Node::Label(target),
            Node::Instruction(Instruction::Insn(opcode::RETURN)),
        ];
        body.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type: None,
        });

        let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
        let mut context = MethodContext::new(OWNER, METHOD, "(I)V", access, &body).unwrap();
        ProbeInserter::new(&Settings::default())
            .instrument_method(&mut body, &mut context)
            .unwrap();

        let mut names = vec![];
        for node in &body.nodes {
            match node {
                Node::Label(label) if *label == end => names.push("<end>"),
                Node::Instruction(Instruction::Method { owner, name, .. })
                    if owner.as_str() == BinaryName::PROBE_VM.as_str() =>
                {
                    names.push(name.as_str())
                }
                _ => (),
            }
        }
        assert_eq!(
            names,
            vec![
                "METHOD_BEGIN",
                "METHOD_BEGIN_PARAM",
                "METHOD_MAXS",
                "SRC_LINE_NUMBER",
                "ILOAD_1",
                "IFNE",
                "<end>",
                "RETURN",
                "HANDLER_BEGIN",
                "ATHROW",
                "BB_BEGIN",
                "RETURN",
            ]
        );
        assert!(body.nodes.contains(&Node::Line { line: 10, start }));
    }

    fn produces(pops: usize, pushes: Vec<(Value, Category)>) -> Effect {
        Effect { pops, pushes }
    }

    #[test]
    fn table_switch_passes_bounds() {
        let mut labels = crate::jvm::code::LabelGenerator::new();
        let default = labels.fresh_label();
        let switch = Instruction::TableSwitch {
            low: -2,
            high: 40,
            default,
            targets: vec![default; 43],
        };
        let machine = simulate(switch, vec![one("below"), one("selector")], consumes(1));
        assert_eq!(
            machine.probes,
            vec![Probe {
                name: String::from("TABLESWITCH"),
                descriptor: String::from("(IIILjava/lang/String;Ljava/lang/String;I)V"),
                arguments: vec![
                    Value::Named("selector"),
                    Value::Int(-2),
                    Value::Int(40),
                    s(OWNER),
                    s(METHOD),
                    Value::Int(1),
                ],
            }]
        );
        assert_eq!(machine.stack, vec![one("below")]);
    }

    #[test]
    fn array_creation() {
        let machine = simulate(
            Instruction::Int {
                opcode: opcode::NEWARRAY,
                operand: NEWARRAY_INT,
            },
            vec![one("length")],
            produces(1, vec![one("array")]),
        );
        assert_eq!(
            machine.probes[0].arguments,
            vec![
                Value::Named("length"),
                Value::Int(NEWARRAY_INT),
                s(OWNER),
                s(METHOD)
            ]
        );
        assert_eq!(machine.probes[0].descriptor, "(IILjava/lang/String;Ljava/lang/String;)V");
        assert_eq!(machine.stack, vec![one("array")]);

        let machine = simulate(
            Instruction::Type {
                opcode: opcode::ANEWARRAY,
                class: String::from("java/lang/String"),
            },
            vec![two("wide"), one("length")],
            produces(1, vec![one("array")]),
        );
        assert_eq!(
            machine.probes[0].arguments,
            vec![
                Value::Named("length"),
                s("java/lang/String"),
                s(OWNER),
                s(METHOD)
            ]
        );
        assert_eq!(machine.stack, vec![two("wide"), one("array")]);

        let machine = simulate(
            Instruction::MultiANewArray {
                descriptor: String::from("[[[I"),
                dimensions: 2,
            },
            vec![one("rows"), one("columns")],
            produces(2, vec![one("matrix")]),
        );
        assert_eq!(
            machine.probes,
            vec![Probe {
                name: String::from("MULTIANEWARRAY"),
                descriptor: String::from(
                    "(Ljava/lang/String;ILjava/lang/String;Ljava/lang/String;)V"
                ),
                arguments: vec![s("[[[I"), Value::Int(2), s(OWNER), s(METHOD)],
            }]
        );
        assert_eq!(machine.stack, vec![one("matrix")]);
    }

    #[test]
    fn type_checks_and_array_length() {
        for op in [opcode::CHECKCAST, opcode::INSTANCEOF] {
            let check = Instruction::Type {
                opcode: op,
                class: String::from("java/util/List"),
            };
            let machine = simulate(check, vec![one("value")], produces(1, vec![one("result")]));
            assert_eq!(machine.probes[0].descriptor, "(Ljava/lang/Object;Ljava/lang/String;)V");
            assert_eq!(
                machine.probes[0].arguments,
                vec![Value::Named("value"), s("java/util/List")]
            );
            assert_eq!(machine.stack, vec![one("result")]);
        }

        let machine = simulate(
            Instruction::Insn(opcode::ARRAYLENGTH),
            vec![one("array")],
            produces(1, vec![one("length")]),
        );
        assert_eq!(machine.probes[0].name, "ARRAYLENGTH");
        assert_eq!(machine.probes[0].arguments, vec![Value::Named("array")]);
        assert_eq!(machine.stack, vec![one("length")]);
    }

    #[test]
    fn increment_passes_slot_and_amount() {
        let machine = simulate(
            Instruction::IInc {
                var: 300,
                increment: -7,
            },
            vec![two("unrelated")],
            consumes(0),
        );
        assert_eq!(machine.probes[0].descriptor, "(II)V");
        assert_eq!(
            machine.probes[0].arguments,
            vec![Value::Int(300), Value::Int(-7)]
        );
        assert_eq!(machine.stack, vec![two("unrelated")]);
    }

    #[test]
    fn instance_read_and_static_writes() {
        let read = Instruction::Field {
            opcode: opcode::GETFIELD,
            owner: String::from("com/example/Box"),
            name: String::from("size"),
            descriptor: String::from("D"),
        };
        let machine = simulate(read, vec![one("receiver")], produces(1, vec![two("size")]));
        assert_eq!(
            machine.probes[0].arguments,
            vec![
                Value::Named("receiver"),
                s("com/example/Box"),
                s("size"),
                s("D")
            ]
        );
        assert_eq!(machine.stack, vec![two("size")]);

        let member = "Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V";
        for (descriptor, value, probe) in [
            ("Ljava/lang/String;", one("value"), "(Ljava/lang/Object;"),
            ("J", two("value"), "(J"),
        ] {
            let write = Instruction::Field {
                opcode: opcode::PUTSTATIC,
                owner: String::from("com/example/Box"),
                name: String::from("LAST"),
                descriptor: String::from(descriptor),
            };
            let machine = simulate(write, vec![one("below"), value], consumes(1));
            assert_eq!(machine.probes[0].descriptor, format!("{}{}", probe, member));
            assert_eq!(
                machine.probes[0].arguments,
                vec![
                    Value::Named("value"),
                    s("com/example/Box"),
                    s("LAST"),
                    s(descriptor)
                ]
            );
            assert_eq!(machine.stack, vec![one("below")]);
        }
    }

    #[test]
    fn dynamic_call_sites() {
        let site = |descriptor: &str| Instruction::InvokeDynamic {
            index: crate::jvm::class_file::ConstantIndex(9),
            name: String::from("apply"),
            descriptor: String::from(descriptor),
            bootstrap: crate::jvm::code::BootstrapInfo {
                owner: String::from("java/lang/invoke/LambdaMetafactory"),
                name: String::from("metafactory"),
                detail: String::from("com/example/Widget"),
            },
        };

        let machine = simulate(
            site("(Ljava/lang/String;)Ljava/util/function/Supplier;"),
            vec![one("captured")],
            produces(1, vec![one("lambda")]),
        );
        assert_eq!(
            machine.probes,
            vec![Probe {
                name: String::from("INVOKEDYNAMIC"),
                descriptor: String::from(
                    "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V"
                ),
                arguments: vec![
                    Value::Named("lambda"),
                    s("java/lang/invoke/LambdaMetafactory"),
                    s("com/example/Widget"),
                ],
            }]
        );
        assert_eq!(machine.stack, vec![one("lambda")]);

        let machine = simulate(site("(J)V"), vec![two("argument")], consumes(1));
        assert_eq!(machine.probes[0].descriptor, "(Ljava/lang/String;Ljava/lang/String;)V");
        assert_eq!(machine.probes[0].arguments.len(), 2);
        assert!(machine.stack.is_empty());
    }

    #[test]
    fn integer_division_observes_divisor() {
        let machine = simulate(
            Instruction::Insn(opcode::IDIV),
            vec![one("dividend"), one("divisor")],
            produces(2, vec![one("quotient")]),
        );
        assert_eq!(machine.probes[0].descriptor, "(I)V");
        assert_eq!(machine.probes[0].arguments, vec![Value::Named("divisor")]);
        assert_eq!(machine.stack, vec![one("quotient")]);
    }

    #[test]
    fn string_and_class_constants() {
        for (constant, descriptor) in [
            (LdcValue::String(b"hello".to_vec()), "(Ljava/lang/String;)V"),
            (LdcValue::Class(String::from("java/util/Map")), "(Ljava/lang/Class;)V"),
        ] {
            let machine = simulate(
                Instruction::Ldc(constant),
                vec![one("below")],
                produces(0, vec![one("constant")]),
            );
            assert_eq!(machine.probes[0].name, "LDC");
            assert_eq!(machine.probes[0].descriptor, descriptor);
            assert_eq!(machine.probes[0].arguments, vec![Value::Named("constant")]);
            assert_eq!(machine.stack, vec![one("below"), one("constant")]);
        }
    }
}

