use super::ClassModel;
use crate::instrument::{Error, MethodContext, ProbeInserter};
use crate::isa::InstructionSet;
use crate::jvm::code::inline_subroutines;
use crate::jvm;

/// One pass over a whole class
///
/// Stages run in order, each seeing the output of the previous one. Any closure
/// `Fn(&mut ClassModel) -> Result<(), Error>` is a stage; closures should report their own
/// failures as [`Error::Stage`].
pub trait ClassTransform: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn transform(&self, class: &mut ClassModel) -> Result<(), Error>;
}

impl<F> ClassTransform for F
where
    F: Fn(&mut ClassModel) -> Result<(), Error> + Send + Sync,
{
    fn name(&self) -> &str {
        std::any::type_name::<F>()
    }

    fn transform(&self, class: &mut ClassModel) -> Result<(), Error> {
        self(class)
    }
}

/// Replaces `jsr`/`ret` subroutines with inline copies
pub struct SubroutineInliner;

impl ClassTransform for SubroutineInliner {
    fn name(&self) -> &str {
        "inline subroutines"
    }

    fn transform(&self, class: &mut ClassModel) -> Result<(), Error> {
        let allows_subroutines = class.class.version.allows_subroutines();
        for method in &mut class.methods {
            let body = match &mut method.body {
                Some(body) if body.has_subroutines() => body,
                _ => continue,
            };
            if !allows_subroutines {
                return Err(Error::Jvm(jvm::Error::MalformedClassFile(format!(
                    "{}.{} uses subroutines, which version {}.{} class files can't",
                    class.name,
                    method.signature(),
                    class.class.version.major,
                    class.class.version.minor
                ))));
            }
            if inline_subroutines(body)? {
                log::debug!("inlined subroutines in {}.{}", class.name, method.signature());
            }
        }
        Ok(())
    }
}

impl<I> ClassTransform for ProbeInserter<I>
where
    I: InstructionSet<Opcode = u8> + Send + Sync,
{
    fn name(&self) -> &str {
        "insert probes"
    }

    fn transform(&self, class: &mut ClassModel) -> Result<(), Error> {
        for method in &mut class.methods {
            if let Some(body) = &mut method.body {
                let mut context = MethodContext::new(
                    &class.name,
                    &method.name,
                    &method.descriptor,
                    method.access_flags,
                    body,
                )?;
                self.instrument_method(body, &mut context)?;
                log::debug!("instrumented {}", context.qualified_name());
            }
        }
        Ok(())
    }
}
