//! Lowering pass: semantic analysis + command generation
//!
//! The second tree walk. Consumes the signature table built by the mapping
//! pass and turns every statement into Minecraft commands, appended to the
//! buffer of the enclosing function or synthetic loop.
//!
//! Expressions evaluate to a [`Value`]: either a compile-time [`Literal`]
//! (constant folding, `$`-bindings) or the name of a scoreboard/storage
//! register holding the result at runtime. Temporary registers `_varN` come
//! from a free-list arena and are recycled as soon as their last use has
//! been emitted, which keeps the `_setup` objective table small.
//!
//! Control flow has no branches in the target: conditional execution is an
//! `execute ... run` prefix stack applied to every emitted command, and
//! loops become guarded tail-recursive functions `_loopN`.

mod arrays;
mod expressions;
mod statements;

use crate::ast::{Program, Span};
use crate::diagnostics::Reporter;
use crate::error::{CompileError, ErrorKind};
use crate::mapping::{FunctionInfo, ProgramMap};
use crate::types::Type;
use indexmap::IndexMap;

/// Fake player under which every generated score lives
pub const FAKE_PLAYER: &str = "#MineScript";

/// Suffix mangled onto function-local names to keep scopes collision-free
pub const LOCAL_SUFFIX: &str = "+local";

/// A compile-time value
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub ty: Type,
    /// True for values threaded through `$`-bindings
    pub constant: bool,
}

impl Literal {
    pub fn new(value: LiteralValue, ty: Type) -> Self {
        Literal {
            value,
            ty,
            constant: false,
        }
    }

    pub fn int(value: i32) -> Self {
        Literal::new(LiteralValue::Int(value), Type::Int)
    }

    /// Truth is "non-zero" for scalars, "non-empty" for arrays
    pub fn truthy(&self) -> bool {
        match &self.value {
            LiteralValue::Int(v) => *v != 0,
            LiteralValue::Array(items) => !items.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    /// A scalar; `char` stores its code point here
    Int(i32),
    /// Array elements in order (`char[]` stores code points)
    Array(Vec<i32>),
}

impl LiteralValue {
    pub fn as_int(&self) -> i32 {
        match self {
            LiteralValue::Int(v) => *v,
            LiteralValue::Array(_) => 0,
        }
    }
}

/// What lowering an expression produced
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Known at compile time; nothing was emitted
    Literal(Literal),
    /// The name of a scoreboard score or storage entry holding the result
    Register(String),
}

/// How the surrounding tree consumes an expression's result.
///
/// `Discarded` marks the immediate child of an expression statement;
/// `Condition` is sticky through a condition subtree and forces name
/// references to materialise into a register the guard can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprUse {
    Value,
    Condition,
    Discarded,
}

impl ExprUse {
    pub(super) fn used(self) -> bool {
        self != ExprUse::Discarded
    }

    /// The usage seen by sub-expressions of this node
    pub(super) fn child(self) -> ExprUse {
        if self == ExprUse::Condition {
            ExprUse::Condition
        } else {
            ExprUse::Value
        }
    }
}

/// Output tables handed to the packager
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredProgram {
    /// Global name -> type (user globals, return slots, break flags, temps)
    pub globals: IndexMap<String, Type>,
    /// Function name -> (local name -> type)
    pub locals: IndexMap<String, IndexMap<String, Type>>,
    /// Function name -> signature and emitted commands
    pub functions: IndexMap<String, FunctionInfo>,
    /// Synthetic loop name -> emitted commands
    pub loops: IndexMap<String, Vec<String>>,
}

/// Run the lowering pass over a mapped program
pub fn lower(
    program: &Program,
    map: ProgramMap,
    pack_name: &str,
    reporter: &mut Reporter,
) -> Result<LoweredProgram, CompileError> {
    let mut lowering = Lowering::new(map, pack_name, reporter);
    for stat in &program.stats {
        lowering.lower_stat(stat)?;
    }
    Ok(lowering.finish())
}

/// Mutable state threaded through the walk
pub struct Lowering<'r> {
    pack_name: String,
    reporter: &'r mut Reporter,

    /// Compile-time (`$`) bindings with live literal values
    memory: IndexMap<String, Literal>,
    globals: IndexMap<String, Type>,
    locals: IndexMap<String, IndexMap<String, Type>>,
    functions: IndexMap<String, FunctionInfo>,
    loops: IndexMap<String, Vec<String>>,

    current_function: Option<String>,
    /// Break flag of the function currently being lowered
    current_break: Option<String>,

    /// Temp arena; slot N maps to `_varN`, true = currently allocated
    temps: Vec<bool>,
    /// Guard fragments wrapped around every emitted command
    prefixes: Vec<String>,
    /// Names of the loop buffers currently open, innermost last
    active_loops: Vec<String>,
    /// Break variable per open loop (None for element-access loops)
    break_vars: Vec<Option<String>>,
    /// Number of loop buffers opened so far; never rewound
    loop_counter: usize,
}

impl<'r> Lowering<'r> {
    fn new(map: ProgramMap, pack_name: &str, reporter: &'r mut Reporter) -> Self {
        Lowering {
            pack_name: pack_name.to_string(),
            reporter,
            memory: IndexMap::new(),
            globals: map.globals,
            locals: IndexMap::new(),
            functions: map.functions,
            loops: IndexMap::new(),
            current_function: None,
            current_break: None,
            temps: Vec::new(),
            prefixes: Vec::new(),
            active_loops: Vec::new(),
            break_vars: Vec::new(),
            loop_counter: 0,
        }
    }

    fn finish(self) -> LoweredProgram {
        LoweredProgram {
            globals: self.globals,
            locals: self.locals,
            functions: self.functions,
            loops: self.loops,
        }
    }

    pub(super) fn reporter(&mut self) -> &mut Reporter {
        self.reporter
    }

    /// The storage path all generated arrays live under
    pub(super) fn storage(&self) -> String {
        format!("{}:minescript", self.pack_name)
    }

    pub(super) fn pack_name(&self) -> &str {
        &self.pack_name
    }

    // ------------------------------------------------------------------
    // Symbol table
    // ------------------------------------------------------------------

    /// Resolution order: `$`-map, then current function's locals, then globals
    pub(super) fn is_defined(&self, name: &str) -> bool {
        if name.starts_with('$') {
            return self.memory.contains_key(name);
        }
        let base = name.strip_suffix(LOCAL_SUFFIX).unwrap_or(name);
        if let Some(func) = &self.current_function
            && self
                .locals
                .get(func)
                .is_some_and(|scope| scope.contains_key(base))
        {
            return true;
        }
        self.globals.contains_key(base)
    }

    pub(super) fn assert_defined(&self, name: &str, span: Span) -> Result<(), CompileError> {
        if self.is_defined(name) {
            Ok(())
        } else {
            Err(CompileError::new(
                ErrorKind::UndeclaredVariable {
                    name: name.to_string(),
                },
                span,
            ))
        }
    }

    pub(super) fn lookup_type(&self, name: &str, span: Span) -> Result<Type, CompileError> {
        let found = if name.starts_with('$') {
            self.memory.get(name).map(|lit| lit.ty)
        } else {
            let base = name.strip_suffix(LOCAL_SUFFIX).unwrap_or(name);
            self.current_function
                .as_ref()
                .and_then(|func| self.locals.get(func))
                .and_then(|scope| scope.get(base))
                .or_else(|| self.globals.get(base))
                .copied()
        };
        found.ok_or_else(|| {
            CompileError::new(
                ErrorKind::UndeclaredVariable {
                    name: name.to_string(),
                },
                span,
            )
        })
    }

    pub(super) fn value_type(&self, value: &Value, span: Span) -> Result<Type, CompileError> {
        match value {
            Value::Literal(lit) => Ok(lit.ty),
            Value::Register(name) => self.lookup_type(name, span),
        }
    }

    pub(super) fn check_types(
        &self,
        expected: Type,
        given: Type,
        span: Span,
    ) -> Result<(), CompileError> {
        if expected == given {
            Ok(())
        } else {
            Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    expected: expected.to_string(),
                    given: given.to_string(),
                },
                span,
            ))
        }
    }

    /// Register a name in the scope it belongs to.
    ///
    /// A `span` makes redefinition an error; internal reservations pass None
    /// and are idempotent. Names starting with `_` always live in the global
    /// scope, wherever they are declared.
    pub(super) fn add_var(
        &mut self,
        name: &str,
        ty: Type,
        span: Option<Span>,
    ) -> Result<(), CompileError> {
        if name.starts_with('$') {
            let value = match ty {
                Type::Int | Type::Char => LiteralValue::Int(0),
                Type::IntArray | Type::CharArray => LiteralValue::Array(Vec::new()),
            };
            self.memory.insert(
                name.to_string(),
                Literal {
                    value,
                    ty,
                    constant: true,
                },
            );
            return Ok(());
        }
        match &self.current_function {
            Some(func) if !name.starts_with('_') => {
                let scope = self.locals.entry(func.clone()).or_default();
                if !scope.contains_key(name) || span.is_none() {
                    scope.insert(name.to_string(), ty);
                    Ok(())
                } else {
                    Err(CompileError::new(
                        ErrorKind::Redefinition {
                            name: name.to_string(),
                        },
                        span.unwrap_or_default(),
                    ))
                }
            }
            _ => {
                if !self.globals.contains_key(name) || span.is_none() {
                    self.globals.insert(name.to_string(), ty);
                    Ok(())
                } else {
                    Err(CompileError::new(
                        ErrorKind::Redefinition {
                            name: name.to_string(),
                        },
                        span.unwrap_or_default(),
                    ))
                }
            }
        }
    }

    /// Store `value` into the register or `$`-binding called `name`
    pub(super) fn set_var(
        &mut self,
        name: &str,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        // A reference to a $-binding carries its value, not a register
        let value = match value {
            Value::Register(reg) if reg.starts_with('$') => {
                Value::Literal(self.const_literal(value, span)?)
            }
            _ => value.clone(),
        };
        match &value {
            Value::Literal(lit) => {
                if name.starts_with('$') {
                    self.memory.insert(name.to_string(), lit.clone());
                    return Ok(());
                }
                if !lit.ty.is_array() {
                    self.add_cmd(
                        format!(
                            "scoreboard players set {} {} {}",
                            FAKE_PLAYER,
                            name,
                            lit.value.as_int()
                        ),
                        span,
                    )
                } else {
                    let items = match &lit.value {
                        LiteralValue::Array(items) => items
                            .iter()
                            .map(i32::to_string)
                            .collect::<Vec<_>>()
                            .join(","),
                        LiteralValue::Int(_) => String::new(),
                    };
                    let size = match &lit.value {
                        LiteralValue::Array(items) => items.len(),
                        LiteralValue::Int(_) => 0,
                    };
                    self.add_cmd(
                        format!(
                            "data modify storage {} {} set value {{value:[{}],size:{}}}",
                            self.storage(),
                            name,
                            items,
                            size
                        ),
                        span,
                    )
                }
            }
            Value::Register(reg) => {
                if name.starts_with('$') {
                    return Err(CompileError::new(ErrorKind::AssignRuntimeToCompile, span));
                }
                let ty = self.lookup_type(reg, span)?;
                if !ty.is_array() {
                    self.add_cmd(
                        format!(
                            "scoreboard players operation {} {} = {} {}",
                            FAKE_PLAYER, name, FAKE_PLAYER, reg
                        ),
                        span,
                    )
                } else {
                    let storage = self.storage();
                    self.add_cmd(
                        format!(
                            "data modify storage {} {} set from storage {} {}",
                            storage, name, storage, reg
                        ),
                        span,
                    )
                }
            }
        }
    }

    /// The `+local` suffix for `name` if it resolves to the current
    /// function's scope, empty otherwise
    pub(super) fn local_suffix(&self, name: &str) -> &'static str {
        match &self.current_function {
            Some(func)
                if self
                    .locals
                    .get(func)
                    .is_some_and(|scope| scope.contains_key(name)) =>
            {
                LOCAL_SUFFIX
            }
            _ => "",
        }
    }

    // ------------------------------------------------------------------
    // Temporary register arena
    // ------------------------------------------------------------------

    /// Allocate the lowest free `_varN` slot and type it
    pub(super) fn get_temp_var(&mut self, ty: Type) -> String {
        let slot = match self.temps.iter().position(|&used| !used) {
            Some(slot) => slot,
            None => {
                self.temps.push(false);
                self.temps.len() - 1
            }
        };
        self.temps[slot] = true;
        let name = format!("_var{}", slot);
        // Reserved names re-type silently; the objective itself persists
        self.globals.insert(name.clone(), ty);
        name
    }

    /// Free a slot; only `_var`-prefixed names that are currently allocated
    pub(super) fn mark_unused(&mut self, name: &str) {
        if let Some(digits) = name.strip_prefix("_var")
            && let Ok(slot) = digits.parse::<usize>()
            && slot < self.temps.len()
        {
            self.temps[slot] = false;
        }
    }

    /// Free the register behind `value`, if it is a temporary
    pub(super) fn release(&mut self, value: &Value) {
        if let Value::Register(name) = value {
            self.mark_unused(name);
        }
    }

    #[cfg(test)]
    pub(crate) fn live_temps(&self) -> usize {
        self.temps.iter().filter(|&&used| used).count()
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    /// Append a command to the active sink, wrapped in the prefix stack
    pub(super) fn add_cmd(&mut self, command: String, span: Span) -> Result<(), CompileError> {
        let command = if self.prefixes.is_empty() {
            command
        } else {
            format!("execute {} run {}", self.prefixes.join(" "), command)
        };
        if let Some(loop_name) = self.active_loops.last()
            && let Some(buffer) = self.loops.get_mut(loop_name)
        {
            buffer.push(command);
            return Ok(());
        }
        if let Some(func) = &self.current_function
            && let Some(info) = self.functions.get_mut(func)
        {
            info.commands.push(command);
            return Ok(());
        }
        Err(CompileError::new(ErrorKind::CodeOutsideFunction, span))
    }

    pub(super) fn push_prefix(&mut self, fragment: String) {
        self.prefixes.push(fragment);
    }

    pub(super) fn pop_prefix(&mut self) {
        self.prefixes.pop();
    }

    /// Name the next `start_loop` call will use
    pub(super) fn next_loop_name(&self) -> String {
        format!("_loop{}", self.loop_counter)
    }

    /// Open a loop buffer; a break variable guards every command in it
    pub(super) fn start_loop(&mut self, name: String, break_var: Option<String>) {
        self.loops.insert(name.clone(), Vec::new());
        self.active_loops.push(name);
        if let Some(bv) = &break_var {
            self.push_prefix(format!("unless score {} {} matches 0", FAKE_PLAYER, bv));
        }
        self.break_vars.push(break_var);
        self.loop_counter += 1;
    }

    /// Seal the innermost loop buffer and free its break variable
    pub(super) fn end_loop(&mut self) {
        self.active_loops.pop();
        if let Some(Some(bv)) = self.break_vars.pop() {
            self.pop_prefix();
            self.mark_unused(&bv);
        }
    }

    pub(super) fn current_break_var(&self) -> Option<&String> {
        self.break_vars.last().and_then(|bv| bv.as_ref())
    }

    pub(super) fn in_loop(&self) -> bool {
        !self.break_vars.is_empty()
    }

    pub(super) fn current_function(&self) -> Option<&String> {
        self.current_function.as_ref()
    }

    pub(super) fn enter_function(&mut self, name: &str, break_flag: String) {
        self.current_function = Some(name.to_string());
        self.locals.entry(name.to_string()).or_default();
        self.current_break = Some(break_flag);
    }

    pub(super) fn exit_function(&mut self) {
        self.current_function = None;
        self.current_break = None;
    }

    pub(super) fn current_break_flag(&self) -> Option<&String> {
        self.current_break.as_ref()
    }

    pub(super) fn function_info(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    // ------------------------------------------------------------------
    // Compile-time values
    // ------------------------------------------------------------------

    /// Literals and `$`-register references are compile-time
    pub(super) fn is_compile_time(&self, value: &Value) -> bool {
        match value {
            Value::Literal(_) => true,
            Value::Register(name) => name.starts_with('$'),
        }
    }

    /// Resolve a compile-time value to its literal
    pub(super) fn const_literal(&self, value: &Value, span: Span) -> Result<Literal, CompileError> {
        match value {
            Value::Literal(lit) => Ok(lit.clone()),
            Value::Register(name) => self.memory.get(name).cloned().ok_or_else(|| {
                CompileError::new(
                    ErrorKind::UndeclaredVariable {
                        name: name.clone(),
                    },
                    span,
                )
            }),
        }
    }

    pub(super) fn const_int(&self, value: &Value, span: Span) -> Result<i32, CompileError> {
        Ok(self.const_literal(value, span)?.value.as_int())
    }

    /// Update a `$`-binding in place
    pub(super) fn set_memory(&mut self, name: &str, literal: Literal) {
        self.memory.insert(name.to_string(), literal);
    }

    /// Missing expression value (a void call used where a value is needed)
    pub(super) fn require_value(
        &self,
        value: Option<Value>,
        span: Span,
    ) -> Result<Value, CompileError> {
        value.ok_or_else(|| CompileError::new(ErrorKind::VoidValue, span))
    }

    /// Render a literal the way `print` shows it: characters as themselves,
    /// numbers as decimal
    pub(super) fn render_text(&self, literal: &Literal) -> String {
        match (&literal.value, literal.ty) {
            (LiteralValue::Int(code), Type::Char) => render_char(*code),
            (LiteralValue::Int(v), _) => v.to_string(),
            (LiteralValue::Array(items), Type::CharArray) => {
                items.iter().map(|&code| render_char(code)).collect()
            }
            (LiteralValue::Array(items), _) => {
                let joined = items
                    .iter()
                    .map(i32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}]", joined)
            }
        }
    }
}

fn render_char(code: i32) -> String {
    char::from_u32(code as u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
        .to_string()
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::diagnostics::Reporter;
    use crate::mapping::ProgramMap;
    use std::path::Path;

    #[test]
    fn test_temp_arena_reuses_lowest_free_slot() {
        let mut reporter = Reporter::new(Path::new("test.ms"), "");
        let mut lowering = Lowering::new(ProgramMap::default(), "p", &mut reporter);
        let a = lowering.get_temp_var(Type::Int);
        let b = lowering.get_temp_var(Type::Int);
        assert_eq!(a, "_var0");
        assert_eq!(b, "_var1");
        lowering.mark_unused(&a);
        assert_eq!(lowering.get_temp_var(Type::Char), "_var0");
        assert_eq!(lowering.get_temp_var(Type::Int), "_var2");
        assert_eq!(lowering.live_temps(), 3);
        // Slots survive in the global table even when free
        assert!(lowering.globals.contains_key("_var1"));
    }

    #[test]
    fn test_mark_unused_ignores_non_temps() {
        let mut reporter = Reporter::new(Path::new("test.ms"), "");
        let mut lowering = Lowering::new(ProgramMap::default(), "p", &mut reporter);
        let a = lowering.get_temp_var(Type::Int);
        lowering.mark_unused("x");
        lowering.mark_unused("_break_load");
        assert_eq!(lowering.live_temps(), 1);
        lowering.mark_unused(&a);
        lowering.mark_unused(&a);
        assert_eq!(lowering.live_temps(), 0);
    }

    #[test]
    fn test_add_cmd_renders_prefix_stack_in_order() {
        let (lowered, _) = lower_source("void load() { int x; if (x == 0) { x = 1; } }");
        let cmds = commands(&lowered, "load");
        let last = cmds.last().unwrap();
        assert!(
            last.starts_with("execute unless score #MineScript _break_load matches 1 if score "),
            "got: {}",
            last
        );
        assert!(last.ends_with("run scoreboard players set #MineScript x+local 1"));
    }

    #[test]
    fn test_code_outside_function_is_rejected() {
        let err = lower_err("int x = 1;");
        assert_eq!(err.kind, ErrorKind::CodeOutsideFunction);
    }

    #[test]
    fn test_top_level_declaration_without_initialiser_is_global() {
        let (lowered, _) = lower_source("int score;\nvoid load() { score = 3; }");
        assert_eq!(lowered.globals.get("score"), Some(&Type::Int));
        // Globals referenced from a function carry no +local suffix
        assert!(
            commands(&lowered, "load")
                .iter()
                .any(|c| c.ends_with("scoreboard players set #MineScript score 3"))
        );
    }

    #[test]
    fn test_output_tables_are_deterministic() {
        let source = "void load() { int a = 1; int b = a + 2; } void tick() { int c; }";
        let (first, _) = lower_source(source);
        let (second, _) = lower_source(source);
        assert_eq!(first, second);
    }

    #[test]
    fn test_redefinition_is_rejected() {
        let err = lower_err("void load() { int x; int x; }");
        assert_eq!(
            err.kind,
            ErrorKind::Redefinition {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_live_temporaries_drain_by_end_of_lowering() {
        let source = "int f(int x) { return x + 1; }\n\
                      void load() {\n\
                          int xs[] = [1, 2, 3];\n\
                          int i;\n\
                          for (i = 0; i < 3; i++) { xs[i] = f(xs[i]); }\n\
                          if (xs[0] == 2) { print(\"@a\", \"red\", xs[0]); }\n\
                      }";
        let program = crate::parser::Parser::new(source)
            .expect("tokenize")
            .parse()
            .expect("parse");
        let map = crate::mapping::collect(&program).expect("mapping");
        let mut reporter = Reporter::new(Path::new("test.ms"), source);
        let mut lowering = Lowering::new(map, "p", &mut reporter);
        for stat in &program.stats {
            lowering.lower_stat(stat).expect("lowering");
        }
        assert_eq!(lowering.live_temps(), 0);
    }

    #[test]
    fn test_local_shadows_global() {
        let (lowered, _) = lower_source("int x;\nvoid load() { int x; x = 1; }");
        assert!(
            commands(&lowered, "load")
                .iter()
                .any(|c| c.ends_with("scoreboard players set #MineScript x+local 1"))
        );
    }
}
