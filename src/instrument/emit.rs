use super::Error;
use crate::isa::{opcode, Category, InstructionSet};
use crate::jvm::class_file::encode_modified_utf8;
use crate::jvm::code::{Instruction, LdcValue, Node};
use crate::jvm::{BinaryName, Name, TypeKind};
use crate::shuffle::{duplicate_buried, duplicate_top_pair, PrimitiveOp, StackShape};

/// `java/lang/String` as a probe parameter
pub const STRING: &str = "Ljava/lang/String;";

/// `java/lang/Object` as a probe parameter
pub const OBJECT: &str = "Ljava/lang/Object;";

pub const INT: &str = "I";

/// Descriptor of a probe taking the given parameters and returning nothing
pub fn probe_signature(parameters: &[&str]) -> String {
    let mut descriptor = String::from("(");
    for parameter in parameters {
        descriptor.push_str(parameter);
    }
    descriptor.push_str(")V");
    descriptor
}

/// Something instructions can be appended to
pub trait CodeSink {
    fn push_instruction(&mut self, instruction: Instruction);
}

impl CodeSink for Vec<Node> {
    fn push_instruction(&mut self, instruction: Instruction) {
        self.push(Node::Instruction(instruction));
    }
}

pub trait CodeSinkExts: CodeSink {
    /// Push an integer constant using the shortest form
    fn push_int(&mut self, value: i32) {
        let instruction = match value {
            -1..=5 => Instruction::Insn((opcode::ICONST_0 as i32 + value) as u8),
            -128..=127 => Instruction::Int {
                opcode: opcode::BIPUSH,
                operand: value,
            },
            -32768..=32767 => Instruction::Int {
                opcode: opcode::SIPUSH,
                operand: value,
            },
            _ => Instruction::Ldc(LdcValue::Integer(value)),
        };
        self.push_instruction(instruction);
    }

    fn push_string(&mut self, value: &str) {
        self.push_instruction(Instruction::Ldc(LdcValue::String(encode_modified_utf8(value))));
    }

    /// Push several strings in order
    fn push_strings(&mut self, values: &[&str]) {
        for value in values {
            self.push_string(value);
        }
    }

    /// Get a local at a particular slot
    fn load_local(&mut self, slot: u16, kind: TypeKind) {
        let opcode = match kind {
            TypeKind::Integer => opcode::ILOAD,
            TypeKind::WideInteger => opcode::LLOAD,
            TypeKind::Float => opcode::FLOAD,
            TypeKind::WideFloat => opcode::DLOAD,
            TypeKind::Reference => opcode::ALOAD,
        };
        self.push_instruction(Instruction::Var { opcode, var: slot });
    }

    /// Set a local at a particular slot
    fn store_local(&mut self, slot: u16, kind: TypeKind) {
        let opcode = match kind {
            TypeKind::Integer => opcode::ISTORE,
            TypeKind::WideInteger => opcode::LSTORE,
            TypeKind::Float => opcode::FSTORE,
            TypeKind::WideFloat => opcode::DSTORE,
            TypeKind::Reference => opcode::ASTORE,
        };
        self.push_instruction(Instruction::Var { opcode, var: slot });
    }

    /// Lower primitive reorderings to instructions of `isa`
    fn shuffle<I>(&mut self, isa: &I, ops: &[PrimitiveOp])
    where
        I: InstructionSet<Opcode = u8> + ?Sized,
    {
        for op in ops {
            self.push_instruction(Instruction::Insn(isa.primitive(*op)));
        }
    }

    /// Push a copy of the value `target_index` down a stack whose top looks like `top_down`
    fn duplicate<I>(
        &mut self,
        isa: &I,
        top_down: &[Category],
        target_index: usize,
    ) -> Result<(), Error>
    where
        I: InstructionSet<Opcode = u8> + ?Sized,
    {
        let ops = duplicate_buried(&StackShape::from_top(top_down), target_index)?;
        self.shuffle(isa, &ops);
        Ok(())
    }

    /// Push copies of the top two one-word values
    fn duplicate_pair<I>(&mut self, isa: &I) -> Result<(), Error>
    where
        I: InstructionSet<Opcode = u8> + ?Sized,
    {
        let ops = duplicate_top_pair(&StackShape::from_top(&[Category::One, Category::One]))?;
        self.shuffle(isa, &ops);
        Ok(())
    }

    /// Call a static method of the probe class
    fn invoke_probe(&mut self, probe_class: &BinaryName, name: &str, descriptor: &str) {
        log::trace!("probe {}{}", name, descriptor);
        self.push_instruction(Instruction::Method {
            opcode: opcode::INVOKESTATIC,
            owner: probe_class.as_str().to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            is_interface: false,
        });
    }
}

impl<S: CodeSink + ?Sized> CodeSinkExts for S {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::Jvm;

    #[test]
    fn shortest_integer_forms() {
        let mut code: Vec<Node> = vec![];
        for value in [-1, 5, 6, -129, 40000] {
            code.push_int(value);
        }
        let opcodes: Vec<u8> = code
            .iter()
            .map(|node| match node {
                Node::Instruction(instruction) => instruction.opcode(),
                _ => panic!("unexpected node {:?}", node),
            })
            .collect();
        assert_eq!(
            opcodes,
            vec![
                opcode::ICONST_M1,
                opcode::ICONST_5,
                opcode::BIPUSH,
                opcode::SIPUSH,
                opcode::LDC
            ]
        );
    }

    #[test]
    fn buried_duplicates_are_lowered() {
        let mut code: Vec<Node> = vec![];
        code.duplicate(&Jvm, &[Category::One, Category::Two], 1)
            .unwrap();
        assert_eq!(
            code,
            vec![
                Node::Instruction(Instruction::Insn(opcode::DUP_X2)),
                Node::Instruction(Instruction::Insn(opcode::POP)),
                Node::Instruction(Instruction::Insn(opcode::DUP2_X1)),
            ]
        );
        assert!(matches!(
            code.duplicate(&Jvm, &[Category::Two, Category::Two, Category::One], 2),
            Err(Error::ShuffleShapeUnsupported(_))
        ));
    }

    #[test]
    fn signatures() {
        assert_eq!(probe_signature(&[]), "()V");
        assert_eq!(
            probe_signature(&[OBJECT, INT, STRING]),
            "(Ljava/lang/Object;ILjava/lang/String;)V"
        );
    }
}
