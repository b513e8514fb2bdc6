use super::Error;
use crate::isa::opcode;
use crate::jvm::code::{max_stack, Instruction, Label, MethodBody, Node};
use crate::jvm::{
    self, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
};
use std::collections::HashSet;

/// Everything the probe inserter knows about the method it is rewriting
///
/// One context is created per method, so branch ids and temporaries never leak between
/// methods (or between classes rewritten concurrently).
pub struct MethodContext {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccessFlags,
    pub method_descriptor: MethodDescriptor,

    /// Next branch id to hand out
    next_branch: i32,

    /// Labels where exception handlers start
    handler_starts: HashSet<Label>,

    /// Labels that are jumped to
    jump_targets: HashSet<Label>,

    /// First local slot free for temporaries
    first_temporary: u16,

    /// Widest block of temporaries requested so far
    temporaries_used: u16,

    /// Constructor that hasn't yet called `super(...)` or `this(...)`
    receiver_uninitialized: bool,

    /// Objects created with `new` whose `<init>` hasn't run yet
    pending_allocations: usize,

    /// Maxima of the body before any probes were added
    pub original_max_stack: u16,
    pub original_max_locals: u16,
}

impl MethodContext {
    pub fn new(
        owner: &str,
        name: &str,
        descriptor: &str,
        access: MethodAccessFlags,
        body: &MethodBody,
    ) -> Result<MethodContext, Error> {
        let method_descriptor = MethodDescriptor::parse(descriptor)?;
        let handler_starts = body.handlers.iter().map(|handler| handler.handler).collect();
        let jump_targets = body
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Instruction(instruction) => Some(instruction.jump_targets()),
                _ => None,
            })
            .flatten()
            .collect();
        let original_max_stack = max_stack(body)?;
        let first_temporary = body
            .max_locals
            .max(method_descriptor.parameter_length(access.has_receiver()) as u16);

        Ok(MethodContext {
            owner: owner.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access,
            method_descriptor,
            next_branch: 1,
            handler_starts,
            jump_targets,
            first_temporary,
            temporaries_used: 0,
            receiver_uninitialized: name == UnqualifiedName::INIT.as_str(),
            pending_allocations: 0,
            original_max_stack,
            original_max_locals: body.max_locals,
        })
    }

    /// Assign the next branch id
    pub fn next_branch_id(&mut self) -> i32 {
        let id = self.next_branch;
        self.next_branch += 1;
        id
    }

    pub fn is_handler_start(&self, label: &Label) -> bool {
        self.handler_starts.contains(label)
    }

    /// Does some instruction jump to this label?
    pub fn is_jump_target(&self, label: &Label) -> bool {
        self.jump_targets.contains(label)
    }

    /// Is `this` still an `uninitializedThis` at the current instruction?
    ///
    /// Nothing may be done with such a receiver except storing to its fields and passing it to
    /// a constructor, so it can't be handed to a probe.
    pub fn receiver_uninitialized(&self) -> bool {
        self.receiver_uninitialized
    }

    /// Follow constructor progress past an original instruction, in code order
    ///
    /// The first `invokespecial <init>` not matched by an earlier `new` is the call initializing
    /// `this`.
    pub fn observe(&mut self, instruction: &Instruction) {
        if !self.receiver_uninitialized {
            return;
        }
        match instruction {
            Instruction::Type {
                opcode: opcode::NEW,
                ..
            } => self.pending_allocations += 1,
            Instruction::Method {
                opcode: opcode::INVOKESPECIAL,
                name,
                ..
            } if name == UnqualifiedName::INIT.as_str() => {
                if self.pending_allocations > 0 {
                    self.pending_allocations -= 1;
                } else {
                    log::trace!("receiver of {} initialized", self.qualified_name());
                    self.receiver_uninitialized = false;
                }
            }
            _ => (),
        }
    }

    /// Reserve `width` consecutive local slots past the original locals, returning the first
    ///
    /// Every request starts at the same slot: temporaries only live for the duration of one
    /// probe sequence.
    pub fn temporaries(&mut self, width: usize) -> Result<u16, Error> {
        let end = self.first_temporary as usize + width;
        if end > u16::MAX as usize {
            return Err(Error::Jvm(jvm::Error::MalformedClassFile(format!(
                "{} needs {} local slots",
                self.qualified_name(),
                end
            ))));
        }
        self.temporaries_used = self.temporaries_used.max(width as u16);
        Ok(self.first_temporary)
    }

    /// Local slots the rewritten method needs
    pub fn max_locals(&self) -> u16 {
        self.first_temporary + self.temporaries_used
    }

    /// `owner.name(descriptor)`, for messages
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor)
    }

    pub fn unsupported(&self, instruction: &Instruction) -> Error {
        Error::UnsupportedInstruction {
            method: self.qualified_name(),
            instruction: instruction.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Handler;

    fn body() -> MethodBody {
        let mut body = MethodBody::new(3);
        let start = body.labels.fresh_label();
        let end = body.labels.fresh_label();
        let handler = body.labels.fresh_label();
        let target = body.labels.fresh_label();
        body.nodes = vec![
            Node::Label(start),
            Node::Instruction(Instruction::Var {
                opcode: opcode::ILOAD,
                var: 1,
            }),
            Node::Instruction(Instruction::Jump {
                opcode: opcode::IFEQ,
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
        body
    }

    #[test]
    fn block_entries_and_branch_ids() {
        let body = body();
        let mut context =
            MethodContext::new("a/B", "run", "(I)V", MethodAccessFlags::PUBLIC, &body).unwrap();
        let labels: Vec<Label> = body
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Label(label) => Some(*label),
                _ => None,
            })
            .collect();
        assert!(!context.is_jump_target(&labels[0]));
        assert!(context.is_handler_start(&labels[2]));
        assert!(context.is_jump_target(&labels[3]));
        assert_eq!(context.original_max_stack, 1);

        assert_eq!(context.next_branch_id(), 1);
        assert_eq!(context.next_branch_id(), 2);
    }

    #[test]
    fn temporaries_are_reused() {
        let mut context =
            MethodContext::new("a/B", "run", "(I)V", MethodAccessFlags::PUBLIC, &body()).unwrap();
        assert_eq!(context.max_locals(), 3);
        assert_eq!(context.temporaries(3).unwrap(), 3);
        assert_eq!(context.temporaries(1).unwrap(), 3);
        assert_eq!(context.max_locals(), 6);
        assert!(context.temporaries(70000).is_err());
    }

    #[test]
    fn constructor_receiver_tracking() {
        let init = |owner: &str| Instruction::Method {
            opcode: opcode::INVOKESPECIAL,
            owner: owner.to_owned(),
            name: String::from("<init>"),
            descriptor: String::from("()V"),
            is_interface: false,
        };
        let body = MethodBody::new(1);
        let mut context =
            MethodContext::new("a/B", "<init>", "()V", MethodAccessFlags::PUBLIC, &body).unwrap();
        assert!(context.receiver_uninitialized());

        // super(new Object())
        context.observe(&Instruction::Type {
            opcode: opcode::NEW,
            class: String::from("java/lang/Object"),
        });
        context.observe(&init("java/lang/Object"));
        assert!(context.receiver_uninitialized());
        context.observe(&init("a/Base"));
        assert!(!context.receiver_uninitialized());

        context.observe(&init("a/Base"));
        assert!(!context.receiver_uninitialized());

        let plain =
            MethodContext::new("a/B", "run", "()V", MethodAccessFlags::PUBLIC, &body).unwrap();
        assert!(!plain.receiver_uninitialized());
    }
}
