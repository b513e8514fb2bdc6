use super::{ClassModel, ClassTransform, SubroutineInliner};
use crate::instrument::{Error, ProbeInserter};
use crate::isa::{self, Jvm};
use crate::settings::Settings;
use crate::shuffle::ShuffleTable;

/// Rewrites class files by running them through a pipeline of stages
///
/// The rewriter holds no mutable state, so one instance can serve any number of threads.
/// Rewriting is a pure function of the input bytes and the settings.
pub struct ClassRewriter {
    settings: Settings,
    stages: Vec<Box<dyn ClassTransform>>,
}

impl ClassRewriter {
    /// Rewriter with the built-in stages
    ///
    /// The opcode table and the shuffle table are checked here, so that a gap in either shows
    /// up before any class is touched.
    pub fn new(settings: Settings) -> Result<ClassRewriter, Error> {
        isa::validate(&Jvm)?;
        ShuffleTable::validate()?;

        let mut stages: Vec<Box<dyn ClassTransform>> = vec![];
        if settings.inline_subroutines {
            stages.push(Box::new(SubroutineInliner));
        }
        stages.push(Box::new(ProbeInserter::new(&settings)));
        Ok(ClassRewriter { settings, stages })
    }

    /// Append a stage that runs after all the existing ones
    pub fn with_stage(mut self, stage: impl ClassTransform + 'static) -> ClassRewriter {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Names of the stages, in the order they run
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn rewrite(&self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let mut class = ClassModel::parse(bytes)?;
        for stage in &self.stages {
            log::debug!("running stage '{}' on {}", stage.name(), class.name);
            stage.transform(&mut class)?;
        }
        Ok(class.to_bytes()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn built_in_stages() {
        let rewriter = ClassRewriter::new(Settings::default()).unwrap();
        assert_eq!(
            rewriter.stage_names(),
            vec!["inline subroutines", "insert probes"]
        );

        let mut settings = Settings::default();
        settings.inline_subroutines = false;
        let rewriter = ClassRewriter::new(settings)
            .unwrap()
            .with_stage(|_: &mut ClassModel| -> Result<(), Error> { Ok(()) });
        assert_eq!(rewriter.stage_names().len(), 2);
        assert_eq!(rewriter.stage_names()[0], "insert probes");
    }

    #[test]
    fn garbage_is_rejected() {
        let rewriter = ClassRewriter::new(Settings::default()).unwrap();
        assert!(matches!(
            rewriter.rewrite(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]),
            Err(Error::Jvm(_))
        ));
    }
}
