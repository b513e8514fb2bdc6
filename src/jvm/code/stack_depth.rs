use super::{Instruction, Label, MethodBody, Node};
use crate::isa::{opcode, InstructionSet, Jvm, StackEffect};
use crate::jvm::{Error, FieldType, MethodDescriptor, ParseDescriptor};
use std::collections::HashMap;

/// Stack words popped and pushed by an instruction
pub fn stack_effect(instruction: &Instruction) -> Result<(u16, u16), Error> {
    if let Some(StackEffect::Fixed { pop, push }) = Jvm.stack_effect(instruction.opcode()) {
        return Ok((pop as u16, push as u16));
    }
    let effect = match instruction {
        Instruction::Field {
            opcode, descriptor, ..
        } => {
            let width = FieldType::parse(descriptor)?.category().width() as u16;
            match *opcode {
                opcode::GETSTATIC => (0, width),
                opcode::PUTSTATIC => (width, 0),
                opcode::GETFIELD => (1, width),
                _ => (1 + width, 0),
            }
        }
        Instruction::Method {
            opcode, descriptor, ..
        } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            let has_receiver = *opcode != opcode::INVOKESTATIC;
            (
                descriptor.parameter_length(has_receiver) as u16,
                descriptor.return_width() as u16,
            )
        }
        Instruction::InvokeDynamic { descriptor, .. } => {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            (
                descriptor.parameter_length(false) as u16,
                descriptor.return_width() as u16,
            )
        }
        Instruction::MultiANewArray { dimensions, .. } => (*dimensions as u16, 1),
        other => {
            return Err(Error::MalformedClassFile(format!(
                "no stack effect known for {}",
                other
            )))
        }
    };
    Ok(effect)
}

/// Position of every label in the node list
pub fn label_positions(nodes: &[Node]) -> HashMap<Label, usize> {
    let mut positions = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if let Node::Label(label) = node {
            positions.entry(*label).or_insert(index);
        }
    }
    positions
}

fn position(positions: &HashMap<Label, usize>, label: Label) -> Result<usize, Error> {
    positions
        .get(&label)
        .copied()
        .ok_or(Error::MissingLabel(label))
}

/// Compute the maximum operand stack depth over all reachable instructions
///
/// This is a worklist data-flow over the node list: every path must reach an instruction with
/// the same stack height, and exception handlers start with just the thrown exception.
pub fn max_stack(body: &MethodBody) -> Result<u16, Error> {
    let nodes = &body.nodes;
    let positions = label_positions(nodes);

    let mut handlers = vec![];
    for handler in &body.handlers {
        handlers.push((
            position(&positions, handler.start)?,
            position(&positions, handler.end)?,
            position(&positions, handler.handler)?,
        ));
    }

    let mut depths: Vec<Option<u16>> = vec![None; nodes.len()];
    let mut worklist: Vec<usize> = vec![];
    let mut max_depth: u16 = 0;

    let visit = |index: usize,
                 depth: u16,
                 depths: &mut Vec<Option<u16>>,
                 worklist: &mut Vec<usize>|
     -> Result<(), Error> {
        match depths.get(index).copied().flatten() {
            None if index < depths.len() => {
                depths[index] = Some(depth);
                worklist.push(index);
                Ok(())
            }
            None => Ok(()),
            Some(existing) if existing == depth => Ok(()),
            Some(existing) => {
                let instruction = nodes[index..]
                    .iter()
                    .find_map(|node| match node {
                        Node::Instruction(instruction) => Some(instruction.to_string()),
                        _ => None,
                    })
                    .unwrap_or_else(|| String::from("<end>"));
                Err(Error::InconsistentStackHeight {
                    instruction,
                    first: existing,
                    second: depth,
                })
            }
        }
    };

    if !nodes.is_empty() {
        visit(0, 0, &mut depths, &mut worklist)?;
    }
    while let Some(index) = worklist.pop() {
        let depth = depths[index].unwrap_or(0);
        max_depth = max_depth.max(depth);
        let instruction = match &nodes[index] {
            Node::Instruction(instruction) => instruction,
            _ => {
                visit(index + 1, depth, &mut depths, &mut worklist)?;
                continue;
            }
        };

        for (start, end, handler) in &handlers {
            if (*start..*end).contains(&index) {
                visit(*handler, 1, &mut depths, &mut worklist)?;
                max_depth = max_depth.max(1);
            }
        }

        let (pop, push) = stack_effect(instruction)?;
        if pop > depth {
            return Err(Error::StackUnderflow {
                instruction: instruction.to_string(),
            });
        }
        let after = depth - pop + push;
        max_depth = max_depth.max(after);

        if instruction.is_subroutine_call() {
            // The subroutine starts with the return address pushed, and hands the stack back
            // without it
            for target in instruction.jump_targets() {
                visit(position(&positions, target)?, after, &mut depths, &mut worklist)?;
            }
            visit(index + 1, depth, &mut depths, &mut worklist)?;
            continue;
        }
        for target in instruction.jump_targets() {
            visit(position(&positions, target)?, after, &mut depths, &mut worklist)?;
        }
        if instruction.falls_through() {
            visit(index + 1, after, &mut depths, &mut worklist)?;
        }
    }

    Ok(max_depth)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Handler, LabelGenerator};

    fn insn(op: u8) -> Node {
        Node::Instruction(Instruction::Insn(op))
    }

    #[test]
    fn straight_line_calls() {
        let mut body = MethodBody::new(1);
        body.nodes = vec![
            insn(opcode::LCONST_1),
            insn(opcode::DCONST_0),
            Node::Instruction(Instruction::Method {
                opcode: opcode::INVOKESTATIC,
                owner: String::from("a/B"),
                name: String::from("f"),
                descriptor: String::from("(JD)J"),
                is_interface: false,
            }),
            insn(opcode::LRETURN),
        ];
        assert_eq!(max_stack(&body).unwrap(), 4);
    }

    #[test]
    fn branches_and_handlers() {
        let mut labels = LabelGenerator::new();
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let join = labels.fresh_label();
        let catch = labels.fresh_label();

        let mut body = MethodBody::new(1);
        body.nodes = vec![
            Node::Label(start),
            Node::Instruction(Instruction::Var {
                opcode: opcode::ILOAD_0,
                var: 0,
            }),
            Node::Instruction(Instruction::Jump {
                opcode: opcode::IFEQ,
                target: join,
            }),
            insn(opcode::ICONST_1),
            insn(opcode::ICONST_2),
            insn(opcode::IADD),
            insn(opcode::POP),
            Node::Label(end),
            Node::Label(join),
            insn(opcode::RETURN),
            Node::Label(catch),
            insn(opcode::ATHROW),
        ];
        body.handlers.push(Handler {
            start,
            end,
            handler: catch,
            catch_type: None,
        });
        assert_eq!(max_stack(&body).unwrap(), 2);
    }

    #[test]
    fn mismatched_heights() {
        let mut labels = LabelGenerator::new();
        let join = labels.fresh_label();
        let mut body = MethodBody::new(1);
        body.nodes = vec![
            insn(opcode::ICONST_0),
            Node::Instruction(Instruction::Jump {
                opcode: opcode::IFEQ,
                target: join,
            }),
            insn(opcode::ICONST_1),
            Node::Label(join),
            insn(opcode::RETURN),
        ];
        assert!(matches!(
            max_stack(&body),
            Err(Error::InconsistentStackHeight { .. })
        ));

        body.nodes = vec![insn(opcode::POP), insn(opcode::RETURN)];
        assert!(matches!(
            max_stack(&body),
            Err(Error::StackUnderflow { .. })
        ));
    }
}
