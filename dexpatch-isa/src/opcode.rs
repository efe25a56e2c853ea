//! Opcode table.
//!
//! Every opcode carries its smali mnemonic, its operand [`Format`] and a set
//! of [`OpcodeFlags`]. The table below is the single source of truth; the
//! lookup functions are generated from it.

use std::fmt;

bitflags::bitflags! {
    /// Behavioural properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct OpcodeFlags: u16 {
        /// Transfers control to a label operand.
        const BRANCH = 1 << 0;
        /// Branch that may fall through.
        const CONDITIONAL = 1 << 1;
        const RETURN = 1 << 2;
        const THROW = 1 << 3;
        /// Method invocation (`invoke-*`).
        const INVOKE = 1 << 4;
        /// Loads a constant (literal, string or class).
        const CONST = 1 << 5;
        const FIELD_GET = 1 << 6;
        const FIELD_PUT = 1 << 7;
        /// `move-result*`, consuming the result of the preceding invoke.
        const MOVE_RESULT = 1 << 8;
        /// Operates on register pairs.
        const WIDE = 1 << 9;
        /// Register range form (`/range`).
        const RANGE = 1 << 10;
    }
}

/// Operand shape of an instruction.
///
/// Register widths follow the Dalvik encoding: a `Reg4` slot holds `v0`..`v15`,
/// a `Reg8` slot `v0`..`v255`, a `Reg16` slot `v0`..`v65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `op`
    NoArgs,
    /// `op vAA`
    Reg8,
    /// `op vA, vB`
    Reg4Reg4,
    /// `op vAA, vBBBB`
    Reg8Reg16,
    /// `op vAA, vBB, vCC`
    Reg8Reg8Reg8,
    /// `op vA, #+B`
    Reg4Lit4,
    /// `op vAA, #+BBBB`
    Reg8Lit16,
    /// `op vAA, #+BBBBBBBB`
    Reg8Lit32,
    /// `op vAA, #+BBBB0000`
    Reg8LitHigh16,
    /// `op vAA, #+BBBB000000000000`
    Reg8LitWideHigh16,
    /// `op vAA, #+BBBBBBBBBBBBBBBB`
    Reg8Lit64,
    /// `op vA, vB, #+CCCC`
    Reg4Reg4Lit16,
    /// `op vAA, vBB, #+CC`
    Reg8Reg8Lit8,
    /// `op vAA, string@BBBB`
    Reg8String,
    /// `op vAA, type@BBBB`
    Reg8Type,
    /// `op vAA, field@BBBB`
    Reg8Field,
    /// `op vA, vB, type@CCCC`
    Reg4Reg4Type,
    /// `op vA, vB, field@CCCC`
    Reg4Reg4Field,
    /// `op +AA`
    Branch,
    /// `op vAA, +BBBB`
    Reg8Branch,
    /// `op vA, vB, +CCCC`
    Reg4Reg4Branch,
    /// `op {vC, vD, vE, vF, vG}, meth@BBBB`
    InvokeList,
    /// `op {vCCCC .. vNNNN}, meth@BBBB`
    InvokeRange,
}

/// The non-register operand a format expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    None,
    Literal,
    String,
    Type,
    Field,
    Method,
    Label,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperandKind::None => "no operand",
            OperandKind::Literal => "literal",
            OperandKind::String => "string",
            OperandKind::Type => "type",
            OperandKind::Field => "field reference",
            OperandKind::Method => "method reference",
            OperandKind::Label => "label",
        };
        f.write_str(s)
    }
}

/// How many registers a format takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registers {
    /// Exactly this many.
    Fixed(usize),
    /// Up to five explicit registers.
    List,
    /// A contiguous run of up to 255 registers.
    Range,
}

/// Maximum number of registers in an `invoke-*` register list.
pub const MAX_INVOKE_LIST: usize = 5;
/// Maximum number of registers in an `invoke-*/range` run.
pub const MAX_INVOKE_RANGE: usize = 255;

impl Format {
    pub const fn registers(self) -> Registers {
        match self {
            Format::NoArgs | Format::Branch => Registers::Fixed(0),
            Format::Reg8
            | Format::Reg4Lit4
            | Format::Reg8Lit16
            | Format::Reg8Lit32
            | Format::Reg8LitHigh16
            | Format::Reg8LitWideHigh16
            | Format::Reg8Lit64
            | Format::Reg8String
            | Format::Reg8Type
            | Format::Reg8Field
            | Format::Reg8Branch => Registers::Fixed(1),
            Format::Reg4Reg4
            | Format::Reg8Reg16
            | Format::Reg4Reg4Lit16
            | Format::Reg8Reg8Lit8
            | Format::Reg4Reg4Type
            | Format::Reg4Reg4Field
            | Format::Reg4Reg4Branch => Registers::Fixed(2),
            Format::Reg8Reg8Reg8 => Registers::Fixed(3),
            Format::InvokeList => Registers::List,
            Format::InvokeRange => Registers::Range,
        }
    }

    /// Encodable register width, in bits, of the register at `position`.
    pub const fn register_bits(self, position: usize) -> u32 {
        match self {
            Format::Reg4Reg4
            | Format::Reg4Lit4
            | Format::Reg4Reg4Lit16
            | Format::Reg4Reg4Type
            | Format::Reg4Reg4Field
            | Format::Reg4Reg4Branch
            | Format::InvokeList => 4,
            Format::Reg8Reg16 if position > 0 => 16,
            Format::InvokeRange => 16,
            _ => 8,
        }
    }

    pub const fn operand(self) -> OperandKind {
        match self {
            Format::NoArgs
            | Format::Reg8
            | Format::Reg4Reg4
            | Format::Reg8Reg16
            | Format::Reg8Reg8Reg8 => OperandKind::None,
            Format::Reg4Lit4
            | Format::Reg8Lit16
            | Format::Reg8Lit32
            | Format::Reg8LitHigh16
            | Format::Reg8LitWideHigh16
            | Format::Reg8Lit64
            | Format::Reg4Reg4Lit16
            | Format::Reg8Reg8Lit8 => OperandKind::Literal,
            Format::Reg8String => OperandKind::String,
            Format::Reg8Type | Format::Reg4Reg4Type => OperandKind::Type,
            Format::Reg8Field | Format::Reg4Reg4Field => OperandKind::Field,
            Format::Branch | Format::Reg8Branch | Format::Reg4Reg4Branch => OperandKind::Label,
            Format::InvokeList | Format::InvokeRange => OperandKind::Method,
        }
    }

    /// Whether `value` is encodable as this format's literal.
    pub fn accepts_literal(self, value: i64) -> bool {
        match self {
            Format::Reg4Lit4 => (-8..=7).contains(&value),
            Format::Reg8Reg8Lit8 => i8::try_from(value).is_ok(),
            Format::Reg8Lit16 | Format::Reg4Reg4Lit16 => i16::try_from(value).is_ok(),
            Format::Reg8Lit32 => i32::try_from(value).is_ok(),
            Format::Reg8LitHigh16 => i32::try_from(value).is_ok() && value & 0xffff == 0,
            Format::Reg8LitWideHigh16 => value & 0x0000_ffff_ffff_ffff == 0,
            Format::Reg8Lit64 => true,
            _ => false,
        }
    }
}

macro_rules! opcodes {
    ($( $variant:ident = $mnemonic:literal, $format:ident, [$($flag:ident),*]; )*) => {
        /// A Dalvik opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            /// The smali mnemonic, e.g. `"invoke-static"`.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $(Opcode::$variant => Format::$format,)*
                }
            }

            pub const fn flags(self) -> OpcodeFlags {
                match self {
                    $(Opcode::$variant => OpcodeFlags::empty()$(.union(OpcodeFlags::$flag))*,)*
                }
            }

            /// Look up an opcode by its smali mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = "nop", NoArgs, [];
    Move = "move", Reg4Reg4, [];
    MoveFrom16 = "move/from16", Reg8Reg16, [];
    MoveWide = "move-wide", Reg4Reg4, [WIDE];
    MoveObject = "move-object", Reg4Reg4, [];
    MoveObjectFrom16 = "move-object/from16", Reg8Reg16, [];
    MoveResult = "move-result", Reg8, [MOVE_RESULT];
    MoveResultWide = "move-result-wide", Reg8, [MOVE_RESULT, WIDE];
    MoveResultObject = "move-result-object", Reg8, [MOVE_RESULT];
    MoveException = "move-exception", Reg8, [];
    ReturnVoid = "return-void", NoArgs, [RETURN];
    Return = "return", Reg8, [RETURN];
    ReturnWide = "return-wide", Reg8, [RETURN, WIDE];
    ReturnObject = "return-object", Reg8, [RETURN];
    Const4 = "const/4", Reg4Lit4, [CONST];
    Const16 = "const/16", Reg8Lit16, [CONST];
    Const = "const", Reg8Lit32, [CONST];
    ConstHigh16 = "const/high16", Reg8LitHigh16, [CONST];
    ConstWide16 = "const-wide/16", Reg8Lit16, [CONST, WIDE];
    ConstWide32 = "const-wide/32", Reg8Lit32, [CONST, WIDE];
    ConstWide = "const-wide", Reg8Lit64, [CONST, WIDE];
    ConstWideHigh16 = "const-wide/high16", Reg8LitWideHigh16, [CONST, WIDE];
    ConstString = "const-string", Reg8String, [CONST];
    ConstStringJumbo = "const-string/jumbo", Reg8String, [CONST];
    ConstClass = "const-class", Reg8Type, [CONST];
    MonitorEnter = "monitor-enter", Reg8, [];
    MonitorExit = "monitor-exit", Reg8, [];
    CheckCast = "check-cast", Reg8Type, [];
    InstanceOf = "instance-of", Reg4Reg4Type, [];
    ArrayLength = "array-length", Reg4Reg4, [];
    NewInstance = "new-instance", Reg8Type, [];
    NewArray = "new-array", Reg4Reg4Type, [];
    Throw = "throw", Reg8, [THROW];
    Goto = "goto", Branch, [BRANCH];
    Goto16 = "goto/16", Branch, [BRANCH];
    Goto32 = "goto/32", Branch, [BRANCH];
    CmplFloat = "cmpl-float", Reg8Reg8Reg8, [];
    CmpgFloat = "cmpg-float", Reg8Reg8Reg8, [];
    CmplDouble = "cmpl-double", Reg8Reg8Reg8, [WIDE];
    CmpgDouble = "cmpg-double", Reg8Reg8Reg8, [WIDE];
    CmpLong = "cmp-long", Reg8Reg8Reg8, [WIDE];
    IfEq = "if-eq", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfNe = "if-ne", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfLt = "if-lt", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfGe = "if-ge", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfGt = "if-gt", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfLe = "if-le", Reg4Reg4Branch, [BRANCH, CONDITIONAL];
    IfEqz = "if-eqz", Reg8Branch, [BRANCH, CONDITIONAL];
    IfNez = "if-nez", Reg8Branch, [BRANCH, CONDITIONAL];
    IfLtz = "if-ltz", Reg8Branch, [BRANCH, CONDITIONAL];
    IfGez = "if-gez", Reg8Branch, [BRANCH, CONDITIONAL];
    IfGtz = "if-gtz", Reg8Branch, [BRANCH, CONDITIONAL];
    IfLez = "if-lez", Reg8Branch, [BRANCH, CONDITIONAL];
    Aget = "aget", Reg8Reg8Reg8, [];
    AgetWide = "aget-wide", Reg8Reg8Reg8, [WIDE];
    AgetObject = "aget-object", Reg8Reg8Reg8, [];
    AgetBoolean = "aget-boolean", Reg8Reg8Reg8, [];
    AgetByte = "aget-byte", Reg8Reg8Reg8, [];
    AgetChar = "aget-char", Reg8Reg8Reg8, [];
    AgetShort = "aget-short", Reg8Reg8Reg8, [];
    Aput = "aput", Reg8Reg8Reg8, [];
    AputWide = "aput-wide", Reg8Reg8Reg8, [WIDE];
    AputObject = "aput-object", Reg8Reg8Reg8, [];
    AputBoolean = "aput-boolean", Reg8Reg8Reg8, [];
    AputByte = "aput-byte", Reg8Reg8Reg8, [];
    AputChar = "aput-char", Reg8Reg8Reg8, [];
    AputShort = "aput-short", Reg8Reg8Reg8, [];
    Iget = "iget", Reg4Reg4Field, [FIELD_GET];
    IgetWide = "iget-wide", Reg4Reg4Field, [FIELD_GET, WIDE];
    IgetObject = "iget-object", Reg4Reg4Field, [FIELD_GET];
    IgetBoolean = "iget-boolean", Reg4Reg4Field, [FIELD_GET];
    IgetByte = "iget-byte", Reg4Reg4Field, [FIELD_GET];
    IgetChar = "iget-char", Reg4Reg4Field, [FIELD_GET];
    IgetShort = "iget-short", Reg4Reg4Field, [FIELD_GET];
    Iput = "iput", Reg4Reg4Field, [FIELD_PUT];
    IputWide = "iput-wide", Reg4Reg4Field, [FIELD_PUT, WIDE];
    IputObject = "iput-object", Reg4Reg4Field, [FIELD_PUT];
    IputBoolean = "iput-boolean", Reg4Reg4Field, [FIELD_PUT];
    IputByte = "iput-byte", Reg4Reg4Field, [FIELD_PUT];
    IputChar = "iput-char", Reg4Reg4Field, [FIELD_PUT];
    IputShort = "iput-short", Reg4Reg4Field, [FIELD_PUT];
    Sget = "sget", Reg8Field, [FIELD_GET];
    SgetWide = "sget-wide", Reg8Field, [FIELD_GET, WIDE];
    SgetObject = "sget-object", Reg8Field, [FIELD_GET];
    SgetBoolean = "sget-boolean", Reg8Field, [FIELD_GET];
    SgetByte = "sget-byte", Reg8Field, [FIELD_GET];
    SgetChar = "sget-char", Reg8Field, [FIELD_GET];
    SgetShort = "sget-short", Reg8Field, [FIELD_GET];
    Sput = "sput", Reg8Field, [FIELD_PUT];
    SputWide = "sput-wide", Reg8Field, [FIELD_PUT, WIDE];
    SputObject = "sput-object", Reg8Field, [FIELD_PUT];
    SputBoolean = "sput-boolean", Reg8Field, [FIELD_PUT];
    SputByte = "sput-byte", Reg8Field, [FIELD_PUT];
    SputChar = "sput-char", Reg8Field, [FIELD_PUT];
    SputShort = "sput-short", Reg8Field, [FIELD_PUT];
    InvokeVirtual = "invoke-virtual", InvokeList, [INVOKE];
    InvokeSuper = "invoke-super", InvokeList, [INVOKE];
    InvokeDirect = "invoke-direct", InvokeList, [INVOKE];
    InvokeStatic = "invoke-static", InvokeList, [INVOKE];
    InvokeInterface = "invoke-interface", InvokeList, [INVOKE];
    InvokeVirtualRange = "invoke-virtual/range", InvokeRange, [INVOKE, RANGE];
    InvokeSuperRange = "invoke-super/range", InvokeRange, [INVOKE, RANGE];
    InvokeDirectRange = "invoke-direct/range", InvokeRange, [INVOKE, RANGE];
    InvokeStaticRange = "invoke-static/range", InvokeRange, [INVOKE, RANGE];
    InvokeInterfaceRange = "invoke-interface/range", InvokeRange, [INVOKE, RANGE];
    NegInt = "neg-int", Reg4Reg4, [];
    NotInt = "not-int", Reg4Reg4, [];
    NegLong = "neg-long", Reg4Reg4, [WIDE];
    NotLong = "not-long", Reg4Reg4, [WIDE];
    NegFloat = "neg-float", Reg4Reg4, [];
    NegDouble = "neg-double", Reg4Reg4, [WIDE];
    IntToLong = "int-to-long", Reg4Reg4, [WIDE];
    IntToFloat = "int-to-float", Reg4Reg4, [];
    IntToDouble = "int-to-double", Reg4Reg4, [WIDE];
    LongToInt = "long-to-int", Reg4Reg4, [WIDE];
    FloatToInt = "float-to-int", Reg4Reg4, [];
    DoubleToInt = "double-to-int", Reg4Reg4, [WIDE];
    IntToByte = "int-to-byte", Reg4Reg4, [];
    IntToChar = "int-to-char", Reg4Reg4, [];
    IntToShort = "int-to-short", Reg4Reg4, [];
    AddInt = "add-int", Reg8Reg8Reg8, [];
    SubInt = "sub-int", Reg8Reg8Reg8, [];
    MulInt = "mul-int", Reg8Reg8Reg8, [];
    DivInt = "div-int", Reg8Reg8Reg8, [];
    RemInt = "rem-int", Reg8Reg8Reg8, [];
    AndInt = "and-int", Reg8Reg8Reg8, [];
    OrInt = "or-int", Reg8Reg8Reg8, [];
    XorInt = "xor-int", Reg8Reg8Reg8, [];
    ShlInt = "shl-int", Reg8Reg8Reg8, [];
    ShrInt = "shr-int", Reg8Reg8Reg8, [];
    UshrInt = "ushr-int", Reg8Reg8Reg8, [];
    AddLong = "add-long", Reg8Reg8Reg8, [WIDE];
    SubLong = "sub-long", Reg8Reg8Reg8, [WIDE];
    MulLong = "mul-long", Reg8Reg8Reg8, [WIDE];
    AddFloat = "add-float", Reg8Reg8Reg8, [];
    MulFloat = "mul-float", Reg8Reg8Reg8, [];
    AddDouble = "add-double", Reg8Reg8Reg8, [WIDE];
    MulDouble = "mul-double", Reg8Reg8Reg8, [WIDE];
    AddInt2Addr = "add-int/2addr", Reg4Reg4, [];
    SubInt2Addr = "sub-int/2addr", Reg4Reg4, [];
    MulInt2Addr = "mul-int/2addr", Reg4Reg4, [];
    AndInt2Addr = "and-int/2addr", Reg4Reg4, [];
    OrInt2Addr = "or-int/2addr", Reg4Reg4, [];
    AddIntLit16 = "add-int/lit16", Reg4Reg4Lit16, [];
    RsubInt = "rsub-int", Reg4Reg4Lit16, [];
    MulIntLit16 = "mul-int/lit16", Reg4Reg4Lit16, [];
    AndIntLit16 = "and-int/lit16", Reg4Reg4Lit16, [];
    OrIntLit16 = "or-int/lit16", Reg4Reg4Lit16, [];
    AddIntLit8 = "add-int/lit8", Reg8Reg8Lit8, [];
    RsubIntLit8 = "rsub-int/lit8", Reg8Reg8Lit8, [];
    MulIntLit8 = "mul-int/lit8", Reg8Reg8Lit8, [];
    AndIntLit8 = "and-int/lit8", Reg8Reg8Lit8, [];
    OrIntLit8 = "or-int/lit8", Reg8Reg8Lit8, [];
    ShlIntLit8 = "shl-int/lit8", Reg8Reg8Lit8, [];
    ShrIntLit8 = "shr-int/lit8", Reg8Reg8Lit8, [];
}

impl Opcode {
    #[inline]
    pub fn is_branch(self) -> bool {
        self.flags().contains(OpcodeFlags::BRANCH)
    }

    #[inline]
    pub fn is_invoke(self) -> bool {
        self.flags().contains(OpcodeFlags::INVOKE)
    }

    #[inline]
    pub fn is_return(self) -> bool {
        self.flags().contains(OpcodeFlags::RETURN)
    }

    /// Bit `i` is set when register operand `i` names a register pair.
    ///
    /// Only meaningful for [`OpcodeFlags::WIDE`] opcodes, which may mix
    /// pair and single operands (`long-to-int`, `cmp-long`).
    pub const fn pair_operands(self) -> u8 {
        use Opcode::*;
        match self {
            MoveWide | NegLong | NotLong | NegDouble => 0b11,
            MoveResultWide | ReturnWide | ConstWide16 | ConstWide32 | ConstWide
            | ConstWideHigh16 | AgetWide | AputWide | IgetWide | IputWide | SgetWide
            | SputWide | IntToLong | IntToDouble => 0b01,
            LongToInt | DoubleToInt => 0b10,
            CmplDouble | CmpgDouble | CmpLong => 0b110,
            AddLong | SubLong | MulLong | AddDouble | MulDouble => 0b111,
            _ => 0,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
