//! Building small class files for tests, and reading back the probes in the rewritten ones

#![allow(dead_code)]

use jprobe::jvm::class_file::{ClassFile, ConstantPool, Method, Version};
use jprobe::isa::opcode;
use jprobe::jvm::code::{encode, EncodeContext, Instruction, LdcValue, MethodBody, Node};
use jprobe::jvm::{BinaryName, ClassAccessFlags, MethodAccessFlags, Name};
use jprobe::rewrite::ClassModel;

/// Class file under construction
pub struct ClassBuilder {
    name: String,
    version: Version,
    methods: Vec<(MethodAccessFlags, String, String, MethodBody)>,
}

impl ClassBuilder {
    /// Class `name` (in internal form) extending `java/lang/Object`
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_owned(),
            version: Version::JAVA6,
            methods: vec![],
        }
    }

    pub fn method(
        mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        body: MethodBody,
    ) -> ClassBuilder {
        self.methods
            .push((access_flags, name.to_owned(), descriptor.to_owned(), body));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_class(&self.name).unwrap();
        let super_class = constants
            .get_class(BinaryName::OBJECT.as_str())
            .unwrap();

        let mut methods = vec![];
        for (access_flags, name, descriptor, body) in &self.methods {
            let context = EncodeContext {
                method_name: name,
                initial_locals: &[],
                this_class,
            };
            let code = encode(body, &mut constants, &context).unwrap();
            let attribute = constants.get_attribute(&code).unwrap();
            methods.push(Method {
                access_flags: *access_flags,
                name_index: constants.get_utf8(name).unwrap(),
                descriptor_index: constants.get_utf8(descriptor).unwrap(),
                attributes: vec![attribute],
            });
        }

        ClassFile {
            version: self.version,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods,
            attributes: vec![],
        }
        .to_bytes()
        .unwrap()
    }
}

/// Method body holding exactly these instructions
pub fn body(max_locals: u16, instructions: Vec<Instruction>) -> MethodBody {
    let mut body = MethodBody::new(max_locals);
    body.nodes = instructions.into_iter().map(Node::Instruction).collect();
    body
}

/// Probe call found in a rewritten method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeCall {
    pub name: String,
    pub descriptor: String,
}

/// Every call into the default probe class made by `method`, in code order
pub fn probe_calls(class_bytes: &[u8], method: &str) -> Vec<ProbeCall> {
    calls_into(class_bytes, method, BinaryName::PROBE_VM.as_str())
}

/// Every static call into `owner` made by `method`, in code order
pub fn calls_into(class_bytes: &[u8], method: &str, owner: &str) -> Vec<ProbeCall> {
    instructions(class_bytes, method)
        .into_iter()
        .filter_map(|instruction| match instruction {
            Instruction::Method {
                owner: callee,
                name,
                descriptor,
                ..
            } if callee == owner => Some(ProbeCall { name, descriptor }),
            _ => None,
        })
        .collect()
}

/// Instructions of `method` in a (rewritten) class
pub fn instructions(class_bytes: &[u8], method: &str) -> Vec<Instruction> {
    let class = ClassModel::parse(class_bytes).unwrap();
    let model = class
        .methods
        .iter()
        .find(|model| model.name == method)
        .unwrap_or_else(|| panic!("no method {}", method));
    model.body.as_ref().unwrap().instructions().cloned().collect()
}

/// Integer pushed by an instruction, if it is an integer constant
pub fn pushed_int(instruction: &Instruction) -> Option<i32> {
    match instruction {
        Instruction::Insn(op) if (opcode::ICONST_M1..=opcode::ICONST_5).contains(op) => {
            Some(*op as i32 - opcode::ICONST_0 as i32)
        }
        Instruction::Int {
            opcode: opcode::BIPUSH | opcode::SIPUSH,
            operand,
        } => Some(*operand),
        Instruction::Ldc(LdcValue::Integer(value)) => Some(*value),
        _ => None,
    }
}

/// Ids passed to the probes named `probe`, which all take the id as their last argument
pub fn branch_ids(class_bytes: &[u8], method: &str, probe: &str) -> Vec<i32> {
    let mut last_int = None;
    let mut ids = vec![];
    for instruction in instructions(class_bytes, method) {
        if let Instruction::Method { name, .. } = &instruction {
            if name == probe {
                ids.push(last_int.unwrap_or_else(|| panic!("{} without an id", probe)));
            }
        }
        if let Some(value) = pushed_int(&instruction) {
            last_int = Some(value);
        }
    }
    ids
}

/// Names of the probes `method` calls
pub fn probe_names(class_bytes: &[u8], method: &str) -> Vec<String> {
    probe_calls(class_bytes, method)
        .into_iter()
        .map(|probe| probe.name)
        .collect()
}

/// Integer constants pushed by `method`, in code order
pub fn pushed_ints(class_bytes: &[u8], method: &str) -> Vec<i32> {
    instructions(class_bytes, method)
        .iter()
        .filter_map(pushed_int)
        .collect()
}
