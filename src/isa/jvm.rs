use super::{Category, InstructionSet, StackEffect};
use crate::shuffle::PrimitiveOp;

/// Metadata for one JVM opcode
#[derive(Copy, Clone, Debug)]
pub struct OpcodeInfo {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub category: Category,
    pub stack_effect: StackEffect,
}

const fn fixed(pop: u8, push: u8) -> StackEffect {
    StackEffect::Fixed { pop, push }
}

const VARIABLE: StackEffect = StackEffect::Variable;

/// Declares the `opcode` constants and the metadata table from the same list, so the two can't
/// drift apart.
macro_rules! jvm_opcodes {
    ($($name:ident = $value:expr, $category:ident, $effect:expr;)*) => {
        /// Numeric values of every JVM opcode
        ///
        /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5
        pub mod opcode {
            $(pub const $name: u8 = $value;)*
        }

        /// Metadata for every opcode, indexed by the opcode itself
        pub static JVM_OPCODES: &[OpcodeInfo] = &[
            $(OpcodeInfo {
                opcode: $value,
                mnemonic: stringify!($name),
                category: Category::$category,
                stack_effect: $effect,
            },)*
        ];
    };
}

// Category is that of the value the instruction is typed over: the operand for stores,
// arithmetic, compares and conversions, the result for loads and constants.
jvm_opcodes! {
    NOP = 0x00, One, fixed(0, 0);
    ACONST_NULL = 0x01, One, fixed(0, 1);
    ICONST_M1 = 0x02, One, fixed(0, 1);
    ICONST_0 = 0x03, One, fixed(0, 1);
    ICONST_1 = 0x04, One, fixed(0, 1);
    ICONST_2 = 0x05, One, fixed(0, 1);
    ICONST_3 = 0x06, One, fixed(0, 1);
    ICONST_4 = 0x07, One, fixed(0, 1);
    ICONST_5 = 0x08, One, fixed(0, 1);
    LCONST_0 = 0x09, Two, fixed(0, 2);
    LCONST_1 = 0x0A, Two, fixed(0, 2);
    FCONST_0 = 0x0B, One, fixed(0, 1);
    FCONST_1 = 0x0C, One, fixed(0, 1);
    FCONST_2 = 0x0D, One, fixed(0, 1);
    DCONST_0 = 0x0E, Two, fixed(0, 2);
    DCONST_1 = 0x0F, Two, fixed(0, 2);
    BIPUSH = 0x10, One, fixed(0, 1);
    SIPUSH = 0x11, One, fixed(0, 1);
    LDC = 0x12, One, fixed(0, 1);
    LDC_W = 0x13, One, fixed(0, 1);
    LDC2_W = 0x14, Two, fixed(0, 2);
    ILOAD = 0x15, One, fixed(0, 1);
    LLOAD = 0x16, Two, fixed(0, 2);
    FLOAD = 0x17, One, fixed(0, 1);
    DLOAD = 0x18, Two, fixed(0, 2);
    ALOAD = 0x19, One, fixed(0, 1);
    ILOAD_0 = 0x1A, One, fixed(0, 1);
    ILOAD_1 = 0x1B, One, fixed(0, 1);
    ILOAD_2 = 0x1C, One, fixed(0, 1);
    ILOAD_3 = 0x1D, One, fixed(0, 1);
    LLOAD_0 = 0x1E, Two, fixed(0, 2);
    LLOAD_1 = 0x1F, Two, fixed(0, 2);
    LLOAD_2 = 0x20, Two, fixed(0, 2);
    LLOAD_3 = 0x21, Two, fixed(0, 2);
    FLOAD_0 = 0x22, One, fixed(0, 1);
    FLOAD_1 = 0x23, One, fixed(0, 1);
    FLOAD_2 = 0x24, One, fixed(0, 1);
    FLOAD_3 = 0x25, One, fixed(0, 1);
    DLOAD_0 = 0x26, Two, fixed(0, 2);
    DLOAD_1 = 0x27, Two, fixed(0, 2);
    DLOAD_2 = 0x28, Two, fixed(0, 2);
    DLOAD_3 = 0x29, Two, fixed(0, 2);
    ALOAD_0 = 0x2A, One, fixed(0, 1);
    ALOAD_1 = 0x2B, One, fixed(0, 1);
    ALOAD_2 = 0x2C, One, fixed(0, 1);
    ALOAD_3 = 0x2D, One, fixed(0, 1);
    IALOAD = 0x2E, One, fixed(2, 1);
    LALOAD = 0x2F, Two, fixed(2, 2);
    FALOAD = 0x30, One, fixed(2, 1);
    DALOAD = 0x31, Two, fixed(2, 2);
    AALOAD = 0x32, One, fixed(2, 1);
    BALOAD = 0x33, One, fixed(2, 1);
    CALOAD = 0x34, One, fixed(2, 1);
    SALOAD = 0x35, One, fixed(2, 1);
    ISTORE = 0x36, One, fixed(1, 0);
    LSTORE = 0x37, Two, fixed(2, 0);
    FSTORE = 0x38, One, fixed(1, 0);
    DSTORE = 0x39, Two, fixed(2, 0);
    ASTORE = 0x3A, One, fixed(1, 0);
    ISTORE_0 = 0x3B, One, fixed(1, 0);
    ISTORE_1 = 0x3C, One, fixed(1, 0);
    ISTORE_2 = 0x3D, One, fixed(1, 0);
    ISTORE_3 = 0x3E, One, fixed(1, 0);
    LSTORE_0 = 0x3F, Two, fixed(2, 0);
    LSTORE_1 = 0x40, Two, fixed(2, 0);
    LSTORE_2 = 0x41, Two, fixed(2, 0);
    LSTORE_3 = 0x42, Two, fixed(2, 0);
    FSTORE_0 = 0x43, One, fixed(1, 0);
    FSTORE_1 = 0x44, One, fixed(1, 0);
    FSTORE_2 = 0x45, One, fixed(1, 0);
    FSTORE_3 = 0x46, One, fixed(1, 0);
    DSTORE_0 = 0x47, Two, fixed(2, 0);
    DSTORE_1 = 0x48, Two, fixed(2, 0);
    DSTORE_2 = 0x49, Two, fixed(2, 0);
    DSTORE_3 = 0x4A, Two, fixed(2, 0);
    ASTORE_0 = 0x4B, One, fixed(1, 0);
    ASTORE_1 = 0x4C, One, fixed(1, 0);
    ASTORE_2 = 0x4D, One, fixed(1, 0);
    ASTORE_3 = 0x4E, One, fixed(1, 0);
    IASTORE = 0x4F, One, fixed(3, 0);
    LASTORE = 0x50, Two, fixed(4, 0);
    FASTORE = 0x51, One, fixed(3, 0);
    DASTORE = 0x52, Two, fixed(4, 0);
    AASTORE = 0x53, One, fixed(3, 0);
    BASTORE = 0x54, One, fixed(3, 0);
    CASTORE = 0x55, One, fixed(3, 0);
    SASTORE = 0x56, One, fixed(3, 0);
    POP = 0x57, One, fixed(1, 0);
    POP2 = 0x58, Two, fixed(2, 0);
    DUP = 0x59, One, fixed(1, 2);
    DUP_X1 = 0x5A, One, fixed(2, 3);
    DUP_X2 = 0x5B, One, fixed(3, 4);
    DUP2 = 0x5C, Two, fixed(2, 4);
    DUP2_X1 = 0x5D, Two, fixed(3, 5);
    DUP2_X2 = 0x5E, Two, fixed(4, 6);
    SWAP = 0x5F, One, fixed(2, 2);
    IADD = 0x60, One, fixed(2, 1);
    LADD = 0x61, Two, fixed(4, 2);
    FADD = 0x62, One, fixed(2, 1);
    DADD = 0x63, Two, fixed(4, 2);
    ISUB = 0x64, One, fixed(2, 1);
    LSUB = 0x65, Two, fixed(4, 2);
    FSUB = 0x66, One, fixed(2, 1);
    DSUB = 0x67, Two, fixed(4, 2);
    IMUL = 0x68, One, fixed(2, 1);
    LMUL = 0x69, Two, fixed(4, 2);
    FMUL = 0x6A, One, fixed(2, 1);
    DMUL = 0x6B, Two, fixed(4, 2);
    IDIV = 0x6C, One, fixed(2, 1);
    LDIV = 0x6D, Two, fixed(4, 2);
    FDIV = 0x6E, One, fixed(2, 1);
    DDIV = 0x6F, Two, fixed(4, 2);
    IREM = 0x70, One, fixed(2, 1);
    LREM = 0x71, Two, fixed(4, 2);
    FREM = 0x72, One, fixed(2, 1);
    DREM = 0x73, Two, fixed(4, 2);
    INEG = 0x74, One, fixed(1, 1);
    LNEG = 0x75, Two, fixed(2, 2);
    FNEG = 0x76, One, fixed(1, 1);
    DNEG = 0x77, Two, fixed(2, 2);
    ISHL = 0x78, One, fixed(2, 1);
    LSHL = 0x79, Two, fixed(3, 2);
    ISHR = 0x7A, One, fixed(2, 1);
    LSHR = 0x7B, Two, fixed(3, 2);
    IUSHR = 0x7C, One, fixed(2, 1);
    LUSHR = 0x7D, Two, fixed(3, 2);
    IAND = 0x7E, One, fixed(2, 1);
    LAND = 0x7F, Two, fixed(4, 2);
    IOR = 0x80, One, fixed(2, 1);
    LOR = 0x81, Two, fixed(4, 2);
    IXOR = 0x82, One, fixed(2, 1);
    LXOR = 0x83, Two, fixed(4, 2);
    IINC = 0x84, One, fixed(0, 0);
    I2L = 0x85, One, fixed(1, 2);
    I2F = 0x86, One, fixed(1, 1);
    I2D = 0x87, One, fixed(1, 2);
    L2I = 0x88, Two, fixed(2, 1);
    L2F = 0x89, Two, fixed(2, 1);
    L2D = 0x8A, Two, fixed(2, 2);
    F2I = 0x8B, One, fixed(1, 1);
    F2L = 0x8C, One, fixed(1, 2);
    F2D = 0x8D, One, fixed(1, 2);
    D2I = 0x8E, Two, fixed(2, 1);
    D2L = 0x8F, Two, fixed(2, 2);
    D2F = 0x90, Two, fixed(2, 1);
    I2B = 0x91, One, fixed(1, 1);
    I2C = 0x92, One, fixed(1, 1);
    I2S = 0x93, One, fixed(1, 1);
    LCMP = 0x94, Two, fixed(4, 1);
    FCMPL = 0x95, One, fixed(2, 1);
    FCMPG = 0x96, One, fixed(2, 1);
    DCMPL = 0x97, Two, fixed(4, 1);
    DCMPG = 0x98, Two, fixed(4, 1);
    IFEQ = 0x99, One, fixed(1, 0);
    IFNE = 0x9A, One, fixed(1, 0);
    IFLT = 0x9B, One, fixed(1, 0);
    IFGE = 0x9C, One, fixed(1, 0);
    IFGT = 0x9D, One, fixed(1, 0);
    IFLE = 0x9E, One, fixed(1, 0);
    IF_ICMPEQ = 0x9F, One, fixed(2, 0);
    IF_ICMPNE = 0xA0, One, fixed(2, 0);
    IF_ICMPLT = 0xA1, One, fixed(2, 0);
    IF_ICMPGE = 0xA2, One, fixed(2, 0);
    IF_ICMPGT = 0xA3, One, fixed(2, 0);
    IF_ICMPLE = 0xA4, One, fixed(2, 0);
    IF_ACMPEQ = 0xA5, One, fixed(2, 0);
    IF_ACMPNE = 0xA6, One, fixed(2, 0);
    GOTO = 0xA7, One, fixed(0, 0);
    JSR = 0xA8, One, fixed(0, 1);
    RET = 0xA9, One, fixed(0, 0);
    TABLESWITCH = 0xAA, One, fixed(1, 0);
    LOOKUPSWITCH = 0xAB, One, fixed(1, 0);
    IRETURN = 0xAC, One, fixed(1, 0);
    LRETURN = 0xAD, Two, fixed(2, 0);
    FRETURN = 0xAE, One, fixed(1, 0);
    DRETURN = 0xAF, Two, fixed(2, 0);
    ARETURN = 0xB0, One, fixed(1, 0);
    RETURN = 0xB1, One, fixed(0, 0);
    GETSTATIC = 0xB2, One, VARIABLE;
    PUTSTATIC = 0xB3, One, VARIABLE;
    GETFIELD = 0xB4, One, VARIABLE;
    PUTFIELD = 0xB5, One, VARIABLE;
    INVOKEVIRTUAL = 0xB6, One, VARIABLE;
    INVOKESPECIAL = 0xB7, One, VARIABLE;
    INVOKESTATIC = 0xB8, One, VARIABLE;
    INVOKEINTERFACE = 0xB9, One, VARIABLE;
    INVOKEDYNAMIC = 0xBA, One, VARIABLE;
    NEW = 0xBB, One, fixed(0, 1);
    NEWARRAY = 0xBC, One, fixed(1, 1);
    ANEWARRAY = 0xBD, One, fixed(1, 1);
    ARRAYLENGTH = 0xBE, One, fixed(1, 1);
    ATHROW = 0xBF, One, fixed(1, 0);
    CHECKCAST = 0xC0, One, fixed(1, 1);
    INSTANCEOF = 0xC1, One, fixed(1, 1);
    MONITORENTER = 0xC2, One, fixed(1, 0);
    MONITOREXIT = 0xC3, One, fixed(1, 0);
    WIDE = 0xC4, One, fixed(0, 0);
    MULTIANEWARRAY = 0xC5, One, VARIABLE;
    IFNULL = 0xC6, One, fixed(1, 0);
    IFNONNULL = 0xC7, One, fixed(1, 0);
    GOTO_W = 0xC8, One, fixed(0, 0);
    JSR_W = 0xC9, One, fixed(0, 1);
}

/// Highest opcode the JVM defines (`jsr_w`)
pub const LAST_OPCODE: u8 = opcode::JSR_W;

/// The JVM instruction set
#[derive(Copy, Clone, Debug, Default)]
pub struct Jvm;

impl Jvm {
    /// Look up the metadata entry for an opcode
    pub fn info(&self, opcode: u8) -> Option<&'static OpcodeInfo> {
        JVM_OPCODES
            .get(opcode as usize)
            .filter(|info| info.opcode == opcode)
    }
}

impl InstructionSet for Jvm {
    type Opcode = u8;

    fn defined_opcodes(&self) -> Vec<u8> {
        (0..=LAST_OPCODE).collect()
    }

    fn mnemonic(&self, opcode: u8) -> Option<&'static str> {
        self.info(opcode).map(|info| info.mnemonic)
    }

    fn category(&self, opcode: u8) -> Option<Category> {
        self.info(opcode).map(|info| info.category)
    }

    fn stack_effect(&self, opcode: u8) -> Option<StackEffect> {
        self.info(opcode).map(|info| info.stack_effect)
    }

    fn primitive(&self, op: PrimitiveOp) -> u8 {
        match op {
            PrimitiveOp::Dup => opcode::DUP,
            PrimitiveOp::DupX1 => opcode::DUP_X1,
            PrimitiveOp::DupX2 => opcode::DUP_X2,
            PrimitiveOp::Dup2 => opcode::DUP2,
            PrimitiveOp::Dup2X1 => opcode::DUP2_X1,
            PrimitiveOp::Dup2X2 => opcode::DUP2_X2,
            PrimitiveOp::Swap => opcode::SWAP,
            PrimitiveOp::Pop => opcode::POP,
            PrimitiveOp::Pop2 => opcode::POP2,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::{validate, Error};

    #[test]
    fn jvm_table_is_complete() {
        assert_eq!(validate(&Jvm), Ok(()));
        assert_eq!(JVM_OPCODES.len(), LAST_OPCODE as usize + 1);
    }

    #[test]
    fn mnemonics_and_categories() {
        assert_eq!(Jvm.mnemonic(opcode::IADD), Some("IADD"));
        assert_eq!(Jvm.mnemonic(opcode::WIDE), Some("WIDE"));
        assert_eq!(Jvm.mnemonic(opcode::GOTO_W), Some("GOTO_W"));
        assert_eq!(Jvm.mnemonic(0xCA), None);
        assert_eq!(Jvm.category(opcode::LDIV), Some(Category::Two));
        assert_eq!(Jvm.category(opcode::IREM), Some(Category::One));
        assert_eq!(Jvm.category(opcode::LDC2_W), Some(Category::Two));
        assert_eq!(
            Jvm.stack_effect(opcode::DASTORE),
            Some(StackEffect::Fixed { pop: 4, push: 0 })
        );
        assert_eq!(Jvm.stack_effect(opcode::INVOKEVIRTUAL), Some(StackEffect::Variable));
    }

    /// An instruction set missing an opcode is caught before any class is touched
    #[test]
    fn gaps_are_reported() {
        struct Truncated;
        impl InstructionSet for Truncated {
            type Opcode = u8;
            fn defined_opcodes(&self) -> Vec<u8> {
                Jvm.defined_opcodes()
            }
            fn mnemonic(&self, opcode: u8) -> Option<&'static str> {
                if opcode == opcode::SWAP {
                    None
                } else {
                    Jvm.mnemonic(opcode)
                }
            }
            fn category(&self, opcode: u8) -> Option<Category> {
                Jvm.category(opcode)
            }
            fn stack_effect(&self, opcode: u8) -> Option<StackEffect> {
                Jvm.stack_effect(opcode)
            }
            fn primitive(&self, op: PrimitiveOp) -> u8 {
                Jvm.primitive(op)
            }
        }

        assert!(matches!(
            validate(&Truncated),
            Err(Error::IncompleteIsaTable(_))
        ));
    }
}
