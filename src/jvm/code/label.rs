use std::fmt;

/// Opaque position in a method body
///
/// Labels are placed in the node list with [`super::Node::Label`] and are referenced by jumps,
/// switches, exception handlers, line numbers, local variable ranges, and stack map frames.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(u32);

impl Label {
    /// Get the next fresh label
    fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

/// Generates new labels for one method body
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct LabelGenerator(Label);

impl Default for LabelGenerator {
    fn default() -> Self {
        LabelGenerator::new()
    }
}

impl LabelGenerator {
    pub fn new() -> LabelGenerator {
        LabelGenerator(Label(0))
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}
