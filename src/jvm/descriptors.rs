use super::{BinaryName, Error, Name};
use crate::isa::Category;
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self, Error> {
        let malformed = |message: String| Error::MalformedDescriptor {
            descriptor: source.to_owned(),
            message,
        };
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars).map_err(malformed)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(malformed(format!("Unexpected leftover input '{}'", c))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

/// How a value is represented on the operand stack
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    /// `int` and everything narrower (`boolean`, `byte`, `char`, `short`)
    Integer,
    /// `long`
    WideInteger,
    Float,
    /// `double`
    WideFloat,
    Reference,
}

impl TypeKind {
    pub fn category(&self) -> Category {
        match self {
            TypeKind::WideInteger | TypeKind::WideFloat => Category::Two,
            TypeKind::Integer | TypeKind::Float | TypeKind::Reference => Category::One,
        }
    }

    /// Descriptor of the type the value has once it is on the stack
    pub fn stack_descriptor(&self) -> &'static str {
        match self {
            TypeKind::Integer => "I",
            TypeKind::WideInteger => "J",
            TypeKind::Float => "F",
            TypeKind::WideFloat => "D",
            TypeKind::Reference => "Ljava/lang/Object;",
        }
    }
}

impl BaseType {
    pub fn kind(&self) -> TypeKind {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => TypeKind::Integer,
            BaseType::Long => TypeKind::WideInteger,
            BaseType::Float => TypeKind::Float,
            BaseType::Double => TypeKind::WideFloat,
        }
    }

    pub fn category(&self) -> Category {
        self.kind().category()
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => return Err(format!("Invalid base type character '{}'", c)),
            None => return Err(String::from("Missing base type character")),
        };
        Ok(typ)
    }
}

/// Generic array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    /// Total number of dimensions in the array type
    ///
    /// This is always just `additional_dimensions + 1`
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source
                    .next()
                    .ok_or_else(|| format!("Missing terminator for 'L{}'", class_name))?;
                if c == ';' {
                    return BinaryName::from_string(class_name);
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(String::from("Expected object type to start with `L`"))
        }
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(BinaryName::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if additional_dimensions > 254 {
                    return Err(String::from("Array type has more than 255 dimensions"));
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => return Err(format!("Invalid reference type character '{}'", c)),
            None => return Err(String::from("Missing field type")),
        })
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl FieldType {
    pub fn kind(&self) -> TypeKind {
        match self {
            FieldType::Base(base_type) => base_type.kind(),
            FieldType::Ref(_) => TypeKind::Reference,
        }
    }

    pub fn category(&self) -> Category {
        self.kind().category()
    }

    /// Descriptor used when this value is passed to a probe
    ///
    /// Primitive types keep their declared letter (a `boolean` local is still passed as `Z`) and
    /// references are widened to `java/lang/Object`.
    pub fn probe_descriptor(&self) -> String {
        match self {
            FieldType::Base(base_type) => base_type.render(),
            FieldType::Ref(_) => String::from("Ljava/lang/Object;"),
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        match source.peek().copied() {
            None => Err(String::from("Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => Err(format!("Invalid field type character '{}'", c)),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len
            + self
                .parameters
                .iter()
                .map(|parameter| parameter.category().width())
                .sum::<usize>()
    }

    /// Local slot of each parameter in the callee's frame, in declaration order
    pub fn parameter_slots(&self, has_this_param: bool) -> Vec<usize> {
        let mut slot = if has_this_param { 1 } else { 0 };
        self.parameters
            .iter()
            .map(|parameter| {
                let this_slot = slot;
                slot += parameter.category().width();
                this_slot
            })
            .collect()
    }

    /// Number of stack words the return value occupies
    pub fn return_width(&self) -> usize {
        self.return_type
            .as_ref()
            .map_or(0, |typ| typ.category().width())
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        // Assert open paren
        if source.next() != Some('(') {
            return Err(String::from("Expected '(' for method"));
        }

        // Parse parameters
        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::parse_from(source)?);
        }

        // Assert close paren
        if source.next() != Some(')') {
            return Err(String::from("Expected ')' for method"));
        }

        // Parse return
        let return_type = if let Some('V') = source.peek().copied() {
            let _ = source.next();
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn method_parameter_slots() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;D[I)V").unwrap();
        assert_eq!(desc.parameter_slots(true), vec![1, 2, 4, 5, 7]);
        assert_eq!(desc.parameter_slots(false), vec![0, 1, 3, 4, 6]);
        assert_eq!(desc.parameter_length(true), 8);
        assert_eq!(desc.return_width(), 0);
    }

    #[test]
    fn categories_and_kinds() {
        let desc = MethodDescriptor::parse("(ZJD[JLjava/lang/Object;)J").unwrap();
        let kinds: Vec<TypeKind> = desc.parameters.iter().map(FieldType::kind).collect();
        assert_eq!(
            kinds,
            vec![
                TypeKind::Integer,
                TypeKind::WideInteger,
                TypeKind::WideFloat,
                TypeKind::Reference,
                TypeKind::Reference,
            ]
        );
        assert_eq!(desc.return_width(), 2);
        assert_eq!(desc.parameters[0].probe_descriptor(), "Z");
        assert_eq!(desc.parameters[3].probe_descriptor(), "Ljava/lang/Object;");
    }

    #[test]
    fn malformed_descriptors() {
        for bad in ["", "(", "(I", "(I)", "(Q)V", "(Ljava/lang/String)V", "(I)VV", "[", "L;"] {
            let parsed = MethodDescriptor::parse(bad);
            assert!(
                matches!(parsed, Err(Error::MalformedDescriptor { .. })),
                "Parsing {:?} should fail",
                bad
            );
        }
    }

    fn base_type() -> impl Strategy<Value = BaseType> {
        prop_oneof![
            Just(BaseType::Byte),
            Just(BaseType::Char),
            Just(BaseType::Double),
            Just(BaseType::Float),
            Just(BaseType::Int),
            Just(BaseType::Long),
            Just(BaseType::Short),
            Just(BaseType::Boolean),
        ]
    }

    fn class_name() -> impl Strategy<Value = BinaryName> {
        "[a-z]{1,4}(/[A-Z][a-z]{0,4}){0,2}".prop_map(|name| BinaryName::from_string(name).unwrap())
    }

    fn field_type() -> impl Strategy<Value = FieldType> {
        let leaf = prop_oneof![
            base_type().prop_map(FieldType::Base),
            class_name().prop_map(|name| FieldType::Ref(RefType::Object(name))),
        ];
        prop_oneof![
            leaf,
            (0usize..3, base_type()).prop_map(|(additional_dimensions, element_type)| {
                FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                    additional_dimensions,
                    element_type,
                }))
            }),
            (0usize..3, class_name()).prop_map(|(additional_dimensions, element_type)| {
                FieldType::Ref(RefType::ObjectArray(ArrayType {
                    additional_dimensions,
                    element_type,
                }))
            }),
        ]
    }

    proptest! {
        #[test]
        fn rendered_method_descriptors_parse_back(
            parameters in proptest::collection::vec(field_type(), 0..6),
            return_type in proptest::option::of(field_type()),
        ) {
            let desc = MethodDescriptor { parameters, return_type };
            let rendered = desc.render();
            prop_assert_eq!(MethodDescriptor::parse(&rendered).unwrap(), desc.clone());

            let slots = desc.parameter_slots(false);
            let total = desc.parameter_length(false);
            prop_assert!(slots.iter().all(|slot| *slot < total));
        }
    }
}
