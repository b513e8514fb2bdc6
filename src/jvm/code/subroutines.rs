//! Inlining of `jsr`/`ret` subroutines
//!
//! Old compilers emit `finally` blocks as subroutines. Every call site gets its own copy of the
//! subroutine: `jsr L` becomes `aconst_null; goto L'` (the `null` stands in for the return
//! address, so that stack heights don't change) and `ret` becomes a `goto` back to just after
//! the call site. Nested subroutines are copied once per nesting path.
//!
//! Instructions are assigned to subroutines by walking the control flow from each entry point.
//! An instruction reachable from several subroutines is owned by the outermost copy on the
//! current nesting path, and jumps to it from inner copies go there.

use super::{label_positions, Handler, Instruction, Label, LabelGenerator, LocalVariableEntry};
use super::{MethodBody, Node};
use crate::isa::opcode;
use crate::jvm::class_file::{
    AttributeLike, RuntimeInvisibleTypeAnnotations, RuntimeVisibleTypeAnnotations,
};
use crate::jvm::Error;
use std::collections::{HashMap, VecDeque};

/// Code reachable from one entry point (the method start or a `jsr` target)
struct Subroutine {
    entry: Option<Label>,
    members: Vec<bool>,
}

/// One copy of a subroutine, for a particular nesting of call sites
struct Instantiation {
    subroutine: usize,
    previous: Option<usize>,

    /// Where `ret` goes (none for the main body)
    return_label: Option<Label>,

    /// Label of this copy for each original label
    range_table: HashMap<Label, Label>,
}

struct Inliner<'a> {
    nodes: &'a [Node],
    positions: HashMap<Label, usize>,
    labels: &'a mut LabelGenerator,
    subroutines: Vec<Subroutine>,
    by_entry: HashMap<Label, usize>,
    instantiations: Vec<Instantiation>,
}

/// Replace all subroutines in a method body by inline copies
///
/// Returns whether anything changed. Stack map frames are discarded since every offset moves
/// (only class files old enough to not need them use subroutines anyway).
pub fn inline_subroutines(body: &mut MethodBody) -> Result<bool, Error> {
    if !body.has_subroutines() {
        return Ok(false);
    }

    let nodes = std::mem::take(&mut body.nodes);
    let mut inliner = Inliner {
        positions: label_positions(&nodes),
        nodes: &nodes,
        labels: &mut body.labels,
        subroutines: vec![],
        by_entry: HashMap::new(),
        instantiations: vec![],
    };
    inliner.mark_subroutines(&body.handlers)?;

    let main = inliner.instantiate(0, None, None)?;
    let mut queue = VecDeque::from([main]);
    let mut inlined = vec![];
    while let Some(instantiation) = queue.pop_front() {
        inliner.emit(instantiation, &mut inlined, &mut queue)?;
    }

    let mut handlers = vec![];
    for handler in &body.handlers {
        for instantiation in 0..inliner.instantiations.len() {
            let start = inliner.range_label(instantiation, handler.start)?;
            let end = inliner.range_label(instantiation, handler.end)?;
            if start == end {
                continue;
            }
            handlers.push(Handler {
                start,
                end,
                handler: inliner.goto_label(instantiation, handler.handler)?,
                catch_type: handler.catch_type.clone(),
            });
        }
    }

    let mut local_variables = vec![];
    for variable in &body.local_variables {
        for instantiation in 0..inliner.instantiations.len() {
            let start = inliner.range_label(instantiation, variable.start)?;
            let end = inliner.range_label(instantiation, variable.end)?;
            if start == end {
                continue;
            }
            local_variables.push(LocalVariableEntry {
                start,
                end,
                ..variable.clone()
            });
        }
    }

    log::debug!(
        "inlined {} subroutine copies",
        inliner.instantiations.len() - 1
    );
    body.nodes = inlined;
    body.handlers = handlers;
    body.local_variables = local_variables;
    body.frames.clear();

    // Type annotations name single offsets, which copies of a subroutine no longer have
    for annotation in std::mem::take(&mut body.type_annotations) {
        let name = if annotation.visible {
            RuntimeVisibleTypeAnnotations::NAME
        } else {
            RuntimeInvisibleTypeAnnotations::NAME
        };
        if !body.unmapped_attributes.iter().any(|unmapped| unmapped == name) {
            body.unmapped_attributes.push(name.to_string());
        }
    }
    Ok(true)
}

impl<'a> Inliner<'a> {
    fn position(&self, label: Label) -> Result<usize, Error> {
        self.positions
            .get(&label)
            .copied()
            .ok_or(Error::MissingLabel(label))
    }

    /// Find the main body and every subroutine, and which nodes belong to each
    fn mark_subroutines(&mut self, handlers: &[Handler]) -> Result<(), Error> {
        let mut entries = vec![None];
        for node in self.nodes {
            if let Node::Instruction(instruction) = node {
                if instruction.is_subroutine_call() {
                    for target in instruction.jump_targets() {
                        if !entries.contains(&Some(target)) {
                            entries.push(Some(target));
                        }
                    }
                }
            }
        }

        for entry in entries {
            let start = match entry {
                None => 0,
                Some(label) => self.position(label)?,
            };
            let mut members = vec![false; self.nodes.len()];
            self.walk(start, &mut members)?;

            // Handlers protecting any code of the subroutine are part of it too
            loop {
                let mut changed = false;
                for handler in handlers {
                    let handler_start = self.position(handler.handler)?;
                    if members[handler_start] {
                        continue;
                    }
                    let range = self.position(handler.start)?..self.position(handler.end)?;
                    if range.into_iter().any(|index| members[index]) {
                        self.walk(handler_start, &mut members)?;
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            if let Some(label) = entry {
                self.by_entry.insert(label, self.subroutines.len());
            }
            self.subroutines.push(Subroutine { entry, members });
        }
        Ok(())
    }

    /// Mark everything reachable from `start` without entering other subroutines
    fn walk(&self, start: usize, members: &mut [bool]) -> Result<(), Error> {
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            if index >= self.nodes.len() || members[index] {
                continue;
            }
            members[index] = true;
            match &self.nodes[index] {
                Node::Instruction(instruction) => {
                    if !instruction.is_subroutine_call() {
                        for target in instruction.jump_targets() {
                            stack.push(self.position(target)?);
                        }
                    }
                    if instruction.falls_through() {
                        stack.push(index + 1);
                    }
                }
                _ => stack.push(index + 1),
            }
        }
        Ok(())
    }

    /// Outermost copy on the nesting path that contains a node, provided this copy contains it
    fn find_owner(&self, instantiation: usize, index: usize) -> Option<usize> {
        let in_copy =
            |copy: usize| self.subroutines[self.instantiations[copy].subroutine].members[index];
        if !in_copy(instantiation) {
            return None;
        }
        let mut owner = instantiation;
        let mut current = self.instantiations[instantiation].previous;
        while let Some(copy) = current {
            if in_copy(copy) {
                owner = copy;
            }
            current = self.instantiations[copy].previous;
        }
        Some(owner)
    }

    fn instantiate(
        &mut self,
        subroutine: usize,
        previous: Option<usize>,
        return_label: Option<Label>,
    ) -> Result<usize, Error> {
        let mut current = previous;
        while let Some(copy) = current {
            if self.instantiations[copy].subroutine == subroutine {
                let entry = self.subroutines[subroutine].entry;
                return Err(match entry {
                    Some(label) => Error::RecursiveSubroutine(label),
                    None => Error::MalformedClassFile(String::from("jsr into the method start")),
                });
            }
            current = self.instantiations[copy].previous;
        }

        let instantiation = self.instantiations.len();
        self.instantiations.push(Instantiation {
            subroutine,
            previous,
            return_label,
            range_table: HashMap::new(),
        });

        // Consecutive labels with none of this copy's code in between share one clone
        let mut range_table = HashMap::new();
        let mut shared: Option<Label> = None;
        let nodes = self.nodes;
        for (index, node) in nodes.iter().enumerate() {
            match node {
                Node::Label(label) => {
                    let clone = match shared {
                        Some(clone) => clone,
                        None => {
                            let clone = self.labels.fresh_label();
                            shared = Some(clone);
                            clone
                        }
                    };
                    range_table.insert(*label, clone);
                }
                _ if self.find_owner(instantiation, index) == Some(instantiation) => {
                    shared = None;
                }
                _ => (),
            }
        }
        self.instantiations[instantiation].range_table = range_table;
        Ok(instantiation)
    }

    fn range_label(&self, instantiation: usize, label: Label) -> Result<Label, Error> {
        self.instantiations[instantiation]
            .range_table
            .get(&label)
            .copied()
            .ok_or(Error::MissingLabel(label))
    }

    /// Label to jump to from this copy
    fn goto_label(&self, instantiation: usize, label: Label) -> Result<Label, Error> {
        let owner = self
            .find_owner(instantiation, self.position(label)?)
            .ok_or_else(|| {
                Error::MalformedClassFile(format!(
                    "jump to {:?} leaves the subroutine it is in",
                    label
                ))
            })?;
        self.range_label(owner, label)
    }

    fn emit(
        &mut self,
        instantiation: usize,
        output: &mut Vec<Node>,
        queue: &mut VecDeque<usize>,
    ) -> Result<(), Error> {
        let nodes = self.nodes;
        let mut last_label: Option<Label> = None;
        for (index, node) in nodes.iter().enumerate() {
            let instruction = match node {
                Node::Label(label) => {
                    let copy = self.range_label(instantiation, *label)?;
                    if last_label != Some(copy) {
                        output.push(Node::Label(copy));
                        last_label = Some(copy);
                    }
                    continue;
                }
                _ if self.find_owner(instantiation, index) != Some(instantiation) => continue,
                Node::Line { line, start } => {
                    output.push(Node::Line {
                        line: *line,
                        start: self.range_label(instantiation, *start)?,
                    });
                    continue;
                }
                Node::Instruction(instruction) => instruction,
            };

            match instruction {
                Instruction::Var {
                    opcode: opcode::RET,
                    ..
                } => {
                    let target = self.instantiations[instantiation]
                        .return_label
                        .ok_or_else(|| {
                            Error::MalformedClassFile(String::from("ret outside of a subroutine"))
                        })?;
                    output.push(Node::Instruction(Instruction::Jump {
                        opcode: opcode::GOTO,
                        target,
                    }));
                }
                Instruction::Jump { target, .. } if instruction.is_subroutine_call() => {
                    let subroutine = self.by_entry.get(target).copied().ok_or_else(|| {
                        Error::MalformedClassFile(format!("no subroutine at {:?}", target))
                    })?;
                    let return_label = self.labels.fresh_label();
                    let copy =
                        self.instantiate(subroutine, Some(instantiation), Some(return_label))?;
                    queue.push_back(copy);
                    output.push(Node::Instruction(Instruction::Insn(opcode::ACONST_NULL)));
                    output.push(Node::Instruction(Instruction::Jump {
                        opcode: opcode::GOTO,
                        target: self.goto_label(copy, *target)?,
                    }));
                    output.push(Node::Label(return_label));
                    last_label = Some(return_label);
                }
                other => {
                    let copied = self.relabel(instantiation, other)?;
                    output.push(Node::Instruction(copied));
                }
            }
            if !matches!(output.last(), Some(Node::Label(_))) {
                last_label = None;
            }
        }
        Ok(())
    }

    fn relabel(
        &self,
        instantiation: usize,
        instruction: &Instruction,
    ) -> Result<Instruction, Error> {
        let goto = |label: &Label| self.goto_label(instantiation, *label);
        let relabeled = match instruction {
            Instruction::Jump { opcode, target } => Instruction::Jump {
                opcode: *opcode,
                target: goto(target)?,
            },
            Instruction::TableSwitch {
                low,
                high,
                default,
                targets,
            } => Instruction::TableSwitch {
                low: *low,
                high: *high,
                default: goto(default)?,
                targets: targets.iter().map(goto).collect::<Result<_, _>>()?,
            },
            Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                default: goto(default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, target)| Ok((*key, goto(target)?)))
                    .collect::<Result<_, Error>>()?,
            },
            other => other.clone(),
        };
        Ok(relabeled)
    }
}
