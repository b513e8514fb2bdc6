use std::borrow::Cow;
use std::fmt;

/// Validated name, backed by either a static string or an owned one
pub trait Name: Sized {
    fn as_cow(&self) -> &Cow<'static, str>;

    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Validate and wrap an owned string
    fn from_string(name: String) -> Result<Self, String>;
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Hash, Eq, PartialEq)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            const fn name(value: &'static str) -> $name {
                $name(Cow::Borrowed(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_ref()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.as_ref())
            }
        }

        impl Name for $name {
            fn as_cow(&self) -> &Cow<'static, str> {
                &self.0
            }

            fn from_string(name: String) -> Result<Self, String> {
                $name::validate(&name)?;
                Ok($name(Cow::Owned(name)))
            }
        }
    };
}

name_type!(
    /// Names of methods and fields
    ///
    /// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
    UnqualifiedName
);

name_type!(
    /// Names of classes and interfaces, in internal form (`java/lang/Object`)
    ///
    /// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
    BinaryName
);

impl UnqualifiedName {
    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("empty name"));
        }
        match name.chars().find(|c| matches!(c, '.' | ';' | '[' | '/')) {
            Some(c) => Err(format!("'{}' contains '{}'", name, c)),
            None => Ok(()),
        }
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // Probe entry points that aren't named after an opcode
    pub const METHOD_BEGIN: Self = Self::name("METHOD_BEGIN");
    pub const METHOD_BEGIN_RECEIVER: Self = Self::name("METHOD_BEGIN_RECEIVER");
    pub const METHOD_BEGIN_PARAM: Self = Self::name("METHOD_BEGIN_PARAM");
    pub const METHOD_MAXS: Self = Self::name("METHOD_MAXS");
    pub const CALLER_STACK_PARAM: Self = Self::name("CALLER_STACK_PARAM");
    pub const CALL_RESULT: Self = Self::name("CALL_RESULT");
    pub const BB_BEGIN: Self = Self::name("BB_BEGIN");
    pub const HANDLER_BEGIN: Self = Self::name("HANDLER_BEGIN");
    pub const SRC_LINE_NUMBER: Self = Self::name("SRC_LINE_NUMBER");
}

impl BinaryName {
    fn validate(name: &str) -> Result<(), String> {
        name.split('/')
            .try_for_each(UnqualifiedName::validate)
            .map_err(|err| format!("bad class name '{}': {}", name, err))
    }

    /// Package prefix, including the trailing `/` (empty for the default package)
    pub fn package(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[..=idx],
            None => "",
        }
    }

    pub const OBJECT: Self = Self::name("java/lang/Object");

    /// Default owner of every probe entry point
    pub const PROBE_VM: Self = Self::name("org/evosuite/dse/VM");
}
