//! A minimal lowered IR for pointer analysis.
//!
//! The analysis does not parse a surface language; a frontend lowers its
//! program into this small module model first. Only pointer-relevant
//! structure survives the lowering: globals with (possibly aggregate)
//! initializers, functions with their pointer parameters, and a handful
//! of statement kinds covering allocation, indirect reads/writes,
//! copy-like value flow, calls, and returns. Everything else is dropped
//! before the analysis ever sees it.

use std::fmt;

/// An opaque reference to an IR value (a global, a function used as a
/// value, a parameter, or an instruction result).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueRef(u32);

impl ValueRef {
    pub const fn new(raw: u32) -> Self {
        ValueRef(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An opaque reference to a function declaration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FuncRef(u32);

impl FuncRef {
    pub const fn new(raw: u32) -> Self {
        FuncRef(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Initializer of a global, already flattened by the frontend.
#[derive(Debug, Clone)]
pub enum Init {
    /// No definitive initializer (defined in another translation unit).
    Unknown,
    /// The null pointer.
    Null,
    /// A non-pointer scalar; induces no constraint.
    Scalar,
    /// The address of another global (or address-taken function).
    Global(ValueRef),
    /// An array or struct initializer; element constraints all collapse
    /// onto the single object node of the global.
    Aggregate(Vec<Init>),
}

#[derive(Debug, Clone)]
pub struct Global {
    pub value: ValueRef,
    pub init: Init,
    pub is_const: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub value: ValueRef,
    pub is_pointer: bool,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub func: FuncRef,
    /// The function's own value identity, used when its address is taken
    /// or when it appears as a call operand.
    pub value: ValueRef,
    pub name: String,
    pub params: Vec<Param>,
    pub returns_pointer: bool,
    pub is_variadic: bool,
    pub is_address_taken: bool,
    /// Declaration only; calls to it go through the external-call oracle.
    pub is_external: bool,
    pub body: Vec<Statement>,
}

/// A call or data operand. Non-pointer operands keep their positional
/// slot so argument lists line up with formals.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(ValueRef),
    Null,
    NonPointer,
}

#[derive(Debug, Clone)]
pub enum Callee {
    Direct(FuncRef),
    Indirect(ValueRef),
}

#[derive(Debug, Clone)]
pub enum Statement {
    /// Stack allocation producing a pointer.
    Alloca { dst: ValueRef },
    /// `dst = *addr`
    Load { dst: ValueRef, addr: ValueRef },
    /// `*addr = value`
    Store { addr: ValueRef, value: Operand },
    /// Copy-like flow: casts, pointer arithmetic, phi/select merges.
    /// One constraint per source.
    Assign { dst: ValueRef, srcs: Vec<Operand> },
    /// Integer-to-pointer conversion. `origin` is the value previously
    /// cast to an integer when the frontend can prove it; otherwise the
    /// result is unknown memory.
    IntToPtr {
        dst: ValueRef,
        origin: Option<ValueRef>,
    },
    Call {
        /// The call's result value, present iff pointer-typed.
        dst: Option<ValueRef>,
        callee: Callee,
        args: Vec<Operand>,
    },
    /// Read of the enclosing function's variadic area.
    VaArg { dst: ValueRef },
    /// Return of a pointer from the enclosing function.
    Return { value: Operand },
}

/// A whole translation unit handed to the analysis.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    next_value: u32,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh value reference.
    pub fn fresh_value(&mut self) -> ValueRef {
        let v = ValueRef::new(self.next_value);
        self.next_value += 1;
        v
    }

    pub fn add_global(&mut self, init: Init, is_const: bool) -> ValueRef {
        let value = self.fresh_value();
        self.globals.push(Global {
            value,
            init,
            is_const,
        });
        value
    }

    /// Adds an empty function and returns its reference. Flesh it out
    /// through [`Module::function_mut`].
    pub fn add_function(&mut self, name: &str) -> FuncRef {
        let func = FuncRef::new(self.functions.len() as u32);
        let value = self.fresh_value();
        self.functions.push(Function {
            func,
            value,
            name: name.to_owned(),
            params: Vec::new(),
            returns_pointer: false,
            is_variadic: false,
            is_address_taken: false,
            is_external: false,
            body: Vec::new(),
        });
        func
    }

    pub fn function(&self, f: FuncRef) -> &Function {
        &self.functions[f.raw() as usize]
    }

    pub fn function_mut(&mut self, f: FuncRef) -> &mut Function {
        &mut self.functions[f.raw() as usize]
    }
}
