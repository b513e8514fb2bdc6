use crate::instrument::Error;
use crate::jvm::{BinaryName, Name};

/// Knobs for rewriting classes
#[derive(Clone, Debug)]
pub struct Settings {
    /// Class whose static methods receive the probes, written as `my/probe/Sink`
    pub probe_class: BinaryName,

    /// Replace `jsr`/`ret` subroutines with inline copies before inserting probes
    ///
    /// Probes assume every instruction has a single, statically known stack shape, which
    /// subroutines shared between call sites don't have.
    pub inline_subroutines: bool,

    /// Skip field probes on the `val$*` fields javac generates for captured variables
    ///
    /// Like `this$0`, these are written before the super constructor runs, while the receiver
    /// can't be passed anywhere. `this$0` is always skipped.
    pub skip_synthetic_capture_fields: bool,

    /// Dotted class name prefixes that are never instrumented
    pub exclusions: Vec<String>,
}

impl Settings {
    pub fn new(probe_class: impl Into<String>) -> Result<Settings, Error> {
        let probe_class = BinaryName::from_string(probe_class.into()).map_err(Error::Settings)?;
        let exclusions = Settings::default_exclusions(&probe_class);
        Ok(Settings {
            probe_class,
            inline_subroutines: true,
            skip_synthetic_capture_fields: true,
            exclusions,
        })
    }

    /// The probe class's own package, the JDK, and test frameworks
    pub fn default_exclusions(probe_class: &BinaryName) -> Vec<String> {
        let mut exclusions = vec![];
        let package = probe_class.package();
        if !package.is_empty() {
            exclusions.push(package.replace('/', "."));
        }
        for prefix in [
            "java.",
            "javax.",
            "jdk.",
            "sun.",
            "com.sun.",
            "org.junit.",
            "junit.",
        ] {
            exclusions.push(String::from(prefix));
        }
        exclusions
    }

    /// Is the dotted class name excluded from instrumentation?
    pub fn is_excluded(&self, class_name: &str) -> bool {
        self.exclusions
            .iter()
            .any(|prefix| class_name.starts_with(prefix.as_str()))
    }
}

impl Default for Settings {
    fn default() -> Settings {
        let probe_class = BinaryName::PROBE_VM;
        Settings {
            exclusions: Settings::default_exclusions(&probe_class),
            probe_class,
            inline_subroutines: true,
            skip_synthetic_capture_fields: true,
        }
    }
}
