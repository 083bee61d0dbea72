//! Mapping pass: function signature collection
//!
//! The first of the two tree walks. Registers every function's name,
//! parameter list, and return type, rejects nesting and redefinition, and
//! reserves the global return slot `_f_<name>` for non-void functions.
//! Statement semantics are left entirely to the lowering pass.

use crate::ast::{Program, Stat};
use crate::error::{CompileError, ErrorKind};
use crate::types::Type;
use indexmap::IndexMap;

/// Functions that the game calls through event tags; they take no
/// parameters and return nothing.
pub const BUILTIN_FUNCTIONS: &[&str] = &["load", "tick"];

/// Everything the lowering pass needs to know about one function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Parameters in declaration order
    pub args: Vec<(String, Type)>,
    /// Global slot holding the return value (`_f_<name>`), if non-void
    pub return_slot: Option<String>,
    /// Emitted commands, filled by the lowering pass
    pub commands: Vec<String>,
}

/// Output of the mapping pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramMap {
    /// Function table in declaration order
    pub functions: IndexMap<String, FunctionInfo>,
    /// Global type map, pre-seeded with the reserved return slots
    pub globals: IndexMap<String, Type>,
}

/// Walk the tree and collect every function signature
pub fn collect(program: &Program) -> Result<ProgramMap, CompileError> {
    let mut map = ProgramMap::default();
    for stat in &program.stats {
        collect_stat(stat, None, &mut map)?;
    }
    Ok(map)
}

fn collect_stat(
    stat: &Stat,
    enclosing: Option<&str>,
    map: &mut ProgramMap,
) -> Result<(), CompileError> {
    match stat {
        Stat::Function {
            ret,
            name,
            params,
            body,
            span,
        } => {
            if let Some(outer) = enclosing {
                return Err(CompileError::new(
                    ErrorKind::NestedFunction {
                        inner: name.clone(),
                        outer: outer.to_string(),
                    },
                    *span,
                ));
            }
            if map.functions.contains_key(name) {
                return Err(CompileError::new(
                    ErrorKind::DuplicateFunction { name: name.clone() },
                    *span,
                ));
            }

            if BUILTIN_FUNCTIONS.contains(&name.as_str()) {
                if let Some(param) = params.first() {
                    return Err(CompileError::new(
                        ErrorKind::BuiltinArity { name: name.clone() },
                        param.span,
                    ));
                }
                if ret.is_some() {
                    return Err(CompileError::new(
                        ErrorKind::BuiltinReturn { name: name.clone() },
                        *span,
                    ));
                }
            }

            let args = params
                .iter()
                .map(|p| (p.name.clone(), p.ty))
                .collect::<Vec<_>>();
            let return_slot = ret.map(|ty| {
                let slot = format!("_f_{}", name);
                map.globals.insert(slot.clone(), ty);
                slot
            });
            map.functions.insert(
                name.clone(),
                FunctionInfo {
                    args,
                    return_slot,
                    commands: Vec::new(),
                },
            );

            collect_stat(body, Some(name.as_str()), map)
        }
        Stat::Block { stats, .. } => {
            for stat in stats {
                collect_stat(stat, enclosing, map)?;
            }
            Ok(())
        }
        Stat::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_stat(then_branch, enclosing, map)?;
            if let Some(else_branch) = else_branch {
                collect_stat(else_branch, enclosing, map)?;
            }
            Ok(())
        }
        Stat::For { body, .. } | Stat::While { body, .. } => collect_stat(body, enclosing, map),
        _ => Ok(()),
    }
}

/// Span-free helper used by tests elsewhere in the crate
#[cfg(test)]
pub(crate) fn collect_source(source: &str) -> Result<ProgramMap, CompileError> {
    let program = crate::parser::Parser::new(source)
        .expect("tokenize")
        .parse()
        .expect("parse");
    collect(&program)
}
