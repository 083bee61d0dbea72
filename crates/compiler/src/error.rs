//! Compile-time error types
//!
//! Every semantic failure the two passes can raise. The first error unwinds
//! the pass; the packager is never invoked on a failed compilation.

use crate::ast::Span;
use std::fmt;

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Function declared inside another function
    NestedFunction { inner: String, outer: String },
    /// Two functions share a name
    DuplicateFunction { name: String },
    /// Variable declared twice in the same scope
    Redefinition { name: String },
    /// `load` / `tick` declared with parameters
    BuiltinArity { name: String },
    /// `load` / `tick` declared with a return type
    BuiltinReturn { name: String },
    /// Reference to a name no scope knows
    UndeclaredVariable { name: String },
    /// Call to a function the mapping pass never saw
    UndefinedFunction { name: String },
    /// Call with the wrong number of arguments
    ArgumentCount {
        name: String,
        expected: usize,
        given: usize,
    },
    /// Call argument of the wrong type
    ArgumentType {
        param: String,
        expected: String,
        given: String,
    },
    /// Incompatible operand / assignment / return types
    TypeMismatch { expected: String, given: String },
    /// Array index of a non-int type
    NonIntIndex { given: String },
    /// Runtime value stored into a `$`-binding
    AssignRuntimeToCompile,
    /// A `$`-array index or value that only exists at runtime
    NotCompileTime { what: &'static str },
    BreakOutsideLoop,
    ReturnOutsideFunction,
    /// Command emitted with no active function or loop buffer
    CodeOutsideFunction,
    /// `return expr;` in a void function
    VoidReturnsValue,
    /// Bare `return;` in a non-void function
    NonVoidMissingReturn,
    /// `print` with fewer than three arguments
    PrintArity { given: usize },
    /// `print` selector or colour not a compile-time string
    PrintArgType { position: &'static str },
    /// A void function call used where a value is needed
    VoidValue,
    /// Indexing a name that is not array-typed
    NotAnArray { name: String },
    /// Array element type that is itself an array
    NestedArray,
    /// `[]` with no elements to infer a type from
    EmptyArray,
    /// Compile-time index outside a `$`-array
    IndexOutOfBounds { index: i32, size: usize },
    /// Zero divisor in a compile-time expression
    DivisionByZero,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NestedFunction { inner, outer } => write!(
                f,
                "Nested functions not supported ('{}' inside '{}')",
                inner, outer
            ),
            ErrorKind::DuplicateFunction { name } => {
                write!(f, "Multiple definitions of function '{}'", name)
            }
            ErrorKind::Redefinition { name } => {
                write!(f, "Multiple definitions of variable '{}'", name)
            }
            ErrorKind::BuiltinArity { name } => {
                write!(f, "The built-in function '{}' takes no args", name)
            }
            ErrorKind::BuiltinReturn { name } => {
                write!(f, "The built-in function '{}' must return 'void'", name)
            }
            ErrorKind::UndeclaredVariable { name } => {
                write!(f, "Undeclared variable '{}'", name)
            }
            ErrorKind::UndefinedFunction { name } => {
                write!(f, "Undefined function '{}'", name)
            }
            ErrorKind::ArgumentCount {
                name,
                expected,
                given,
            } => write!(
                f,
                "Function '{}' takes {} {}, but {} {} given",
                name,
                expected,
                if *expected == 1 {
                    "argument"
                } else {
                    "arguments"
                },
                given,
                if *given == 1 { "was" } else { "were" }
            ),
            ErrorKind::ArgumentType {
                param,
                expected,
                given,
            } => write!(
                f,
                "Argument '{}' is of type '{}', but '{}' was provided",
                param, expected, given
            ),
            ErrorKind::TypeMismatch { expected, given } => {
                write!(f, "Mismatching types: '{}' and '{}'", expected, given)
            }
            ErrorKind::NonIntIndex { given } => {
                write!(f, "List indexes must be integers (was {})", given)
            }
            ErrorKind::AssignRuntimeToCompile => write!(
                f,
                "Compile-time variable can't be assigned to an in-game variable"
            ),
            ErrorKind::NotCompileTime { what } => {
                write!(f, "{} must be evaluated at compile-time", what)
            }
            ErrorKind::BreakOutsideLoop => {
                write!(f, "Break statement is outside of a loop")
            }
            ErrorKind::ReturnOutsideFunction => write!(f, "Return outside function"),
            ErrorKind::CodeOutsideFunction => {
                write!(f, "All code must reside inside a function")
            }
            ErrorKind::VoidReturnsValue => write!(f, "Void function returns a value"),
            ErrorKind::NonVoidMissingReturn => {
                write!(f, "No return value for non-void function")
            }
            ErrorKind::PrintArity { given } => write!(
                f,
                "Built-in function 'print' takes at least 3 arguments, but only {} {} given",
                given,
                if *given == 1 { "was" } else { "were" }
            ),
            ErrorKind::PrintArgType { position } => write!(
                f,
                "The {} argument of 'print' must be a string evaluated at compile time",
                position
            ),
            ErrorKind::VoidValue => {
                write!(f, "A void function call cannot be used as a value")
            }
            ErrorKind::NotAnArray { name } => {
                write!(f, "Variable '{}' is not an array", name)
            }
            ErrorKind::NestedArray => write!(f, "Arrays of arrays are not supported"),
            ErrorKind::EmptyArray => {
                write!(f, "Array literals must contain at least one element")
            }
            ErrorKind::IndexOutOfBounds { index, size } => write!(
                f,
                "Index {} is out of bounds for a list of size {}",
                index, size
            ),
            ErrorKind::DivisionByZero => {
                write!(f, "Division by zero in a compile-time expression")
            }
        }
    }
}

/// A semantic error anchored to a source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        CompileError { kind, span }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

impl std::error::Error for CompileError {}
