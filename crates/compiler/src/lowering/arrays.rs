//! Array lowering
//!
//! Arrays live in NBT storage as `{value:[...], size:N}`. A literal index
//! reaches its element with a single `data get`/`data modify`; a runtime
//! index has no direct addressing in the target, so reads pop the head of a
//! scratch copy element by element, and writes rebuild the array while a
//! `done` latch swaps in the new value at the right position. Both compile
//! to self-recursive `_loopN` functions.

use super::{ExprUse, Literal, LiteralValue, Lowering, Value, FAKE_PLAYER};
use crate::ast::{Expr, Span};
use crate::error::{CompileError, ErrorKind};
use crate::types::Type;

impl Lowering<'_> {
    /// `[e1, e2, ...]` type-checks its elements and materialises them into
    /// a storage temp
    pub(super) fn lower_array_literal(
        &mut self,
        elements: &[Expr],
        span: Span,
        usage: ExprUse,
    ) -> Result<Option<Value>, CompileError> {
        let mut values = Vec::new();
        let mut element_ty: Option<Type> = None;
        for element in elements {
            let value = self.lower_expr(element, ExprUse::Value)?;
            let value = self.require_value(value, element.span())?;
            let ty = self.value_type(&value, element.span())?;
            match element_ty {
                None => element_ty = Some(ty),
                Some(first) => self.check_types(first, ty, element.span())?,
            }
            values.push((value, element.span()));
        }

        if !usage.used() {
            for (value, _) in &values {
                self.release(value);
            }
            return Ok(None);
        }

        let Some(element_ty) = element_ty else {
            return Err(CompileError::new(ErrorKind::EmptyArray, span));
        };
        let array_ty = element_ty
            .array()
            .ok_or_else(|| CompileError::new(ErrorKind::NestedArray, span))?;

        let mut items = Vec::with_capacity(values.len());
        for (value, value_span) in &values {
            if !self.is_compile_time(value) {
                return Err(CompileError::new(
                    ErrorKind::NotCompileTime {
                        what: "Array elements",
                    },
                    *value_span,
                ));
            }
            items.push(self.const_int(value, *value_span)?);
        }

        let temp = self.get_temp_var(array_ty);
        self.set_var(
            &temp,
            &Value::Literal(Literal::new(LiteralValue::Array(items), array_ty)),
            span,
        )?;
        Ok(Some(Value::Register(temp)))
    }

    /// An array literal destined for a `$`-binding: no storage temp, the
    /// elements themselves must be compile-time
    pub(super) fn const_array_literal(
        &mut self,
        elements: &[Expr],
        span: Span,
    ) -> Result<Literal, CompileError> {
        let mut items = Vec::with_capacity(elements.len());
        let mut element_ty: Option<Type> = None;
        for element in elements {
            let value = self.lower_expr(element, ExprUse::Value)?;
            let value = self.require_value(value, element.span())?;
            let ty = self.value_type(&value, element.span())?;
            match element_ty {
                None => element_ty = Some(ty),
                Some(first) => self.check_types(first, ty, element.span())?,
            }
            if !self.is_compile_time(&value) {
                return Err(CompileError::new(
                    ErrorKind::NotCompileTime {
                        what: "Array elements",
                    },
                    element.span(),
                ));
            }
            items.push(self.const_int(&value, element.span())?);
        }
        let element_ty =
            element_ty.ok_or_else(|| CompileError::new(ErrorKind::EmptyArray, span))?;
        let array_ty = element_ty
            .array()
            .ok_or_else(|| CompileError::new(ErrorKind::NestedArray, span))?;
        Ok(Literal {
            value: LiteralValue::Array(items),
            ty: array_ty,
            constant: true,
        })
    }

    /// Read `name[element]` into a fresh temp (or fold it for `$`-arrays)
    pub(super) fn get_arr_element(
        &mut self,
        name: &str,
        element: &Value,
        span: Span,
    ) -> Result<Value, CompileError> {
        let index_ty = self.value_type(element, span)?;
        if index_ty != Type::Int {
            return Err(CompileError::new(
                ErrorKind::NonIntIndex {
                    given: index_ty.to_string(),
                },
                span,
            ));
        }
        let array_ty = self.lookup_type(name, span)?;
        let element_ty = array_ty.element().ok_or_else(|| {
            CompileError::new(
                ErrorKind::NotAnArray {
                    name: display_name(name),
                },
                span,
            )
        })?;

        if name.starts_with('$') {
            return self.get_const_element(name, element, element_ty, span);
        }

        if self.is_compile_time(element) {
            let index = self.const_int(element, span)?;
            let temp = self.get_temp_var(element_ty);
            self.add_cmd(
                format!(
                    "execute store result score {} {} run data get storage {} {}.value[{}]",
                    FAKE_PLAYER,
                    temp,
                    self.storage(),
                    name,
                    index
                ),
                span,
            )?;
            return Ok(Value::Register(temp));
        }

        let Value::Register(index_reg) = element else {
            return Err(CompileError::new(
                ErrorKind::NotCompileTime { what: "List index" },
                span,
            ));
        };
        let index_reg = index_reg.clone();
        let storage = self.storage();

        // Pop the head of a scratch copy (index + 1) times; the last pop
        // lands the wanted element in the result temp
        let scratch_list = self.get_temp_var(array_ty);
        let counter = self.get_temp_var(Type::Int);
        let result = self.get_temp_var(element_ty);
        self.set_var(&counter, &Value::Literal(Literal::int(0)), span)?;
        self.set_var(&scratch_list, &Value::Register(name.to_string()), span)?;

        let loop_name = self.next_loop_name();
        self.add_cmd(format!("function {}:{}", self.pack_name(), loop_name), span)?;

        self.start_loop(loop_name.clone(), None);
        self.add_cmd(
            format!("scoreboard players add {} {} 1", FAKE_PLAYER, counter),
            span,
        )?;
        self.add_cmd(
            format!(
                "execute store result score {} {} run data get storage {} {}.value[0]",
                FAKE_PLAYER, result, storage, scratch_list
            ),
            span,
        )?;
        self.add_cmd(
            format!("data remove storage {} {}.value[0]", storage, scratch_list),
            span,
        )?;
        self.add_cmd(
            format!(
                "execute unless score {} {} > {} {} run function {}:{}",
                FAKE_PLAYER,
                counter,
                FAKE_PLAYER,
                index_reg,
                self.pack_name(),
                loop_name
            ),
            span,
        )?;
        self.end_loop();

        self.mark_unused(&scratch_list);
        self.mark_unused(&counter);
        Ok(Value::Register(result))
    }

    /// Write `name[element] = value` (or update the `$`-array in place)
    pub(super) fn set_arr_element(
        &mut self,
        name: &str,
        element: &Value,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        let index_ty = self.value_type(element, span)?;
        if index_ty != Type::Int {
            return Err(CompileError::new(
                ErrorKind::NonIntIndex {
                    given: index_ty.to_string(),
                },
                span,
            ));
        }
        let array_ty = self.lookup_type(name, span)?;
        if array_ty.element().is_none() {
            return Err(CompileError::new(
                ErrorKind::NotAnArray {
                    name: display_name(name),
                },
                span,
            ));
        }

        if name.starts_with('$') {
            return self.set_const_element(name, element, value, span);
        }
        let storage = self.storage();

        if self.is_compile_time(element) {
            let index = self.const_int(element, span)?;
            return match value {
                value if self.is_compile_time(value) => {
                    let stored = self.const_int(value, span)?;
                    self.add_cmd(
                        format!(
                            "data modify storage {} {}.value[{}] value {}",
                            storage, name, index, stored
                        ),
                        span,
                    )
                }
                Value::Register(reg) => self.add_cmd(
                    format!(
                        "execute store result storage {} {}.value[{}] run scoreboard players get {} {}",
                        storage, name, index, FAKE_PLAYER, reg
                    ),
                    span,
                ),
                Value::Literal(_) => Ok(()),
            };
        }

        let Value::Register(index_reg) = element else {
            return Err(CompileError::new(
                ErrorKind::NotCompileTime { what: "List index" },
                span,
            ));
        };
        let index_reg = index_reg.clone();

        // Rebuild the array: copy every element except position `index`,
        // splice the new value there, latch `done` so it happens once
        let scratch_list = self.get_temp_var(array_ty);
        let counter = self.get_temp_var(Type::Int);
        let done = self.get_temp_var(Type::Int);
        let size = self.get_temp_var(Type::Int);
        self.add_cmd(
            format!(
                "execute store result score {} {} run data get storage {} {}.size",
                FAKE_PLAYER, size, storage, name
            ),
            span,
        )?;
        self.set_var(&counter, &Value::Literal(Literal::int(0)), span)?;
        self.set_var(&done, &Value::Literal(Literal::int(0)), span)?;
        self.set_var(
            &scratch_list,
            &Value::Literal(Literal::new(LiteralValue::Array(Vec::new()), array_ty)),
            span,
        )?;

        let loop_name = self.next_loop_name();
        self.add_cmd(format!("function {}:{}", self.pack_name(), loop_name), span)?;

        self.start_loop(loop_name.clone(), None);
        let at_index = format!(
            "if score {} {} = {} {} if score {} {} matches 0",
            FAKE_PLAYER, counter, FAKE_PLAYER, index_reg, FAKE_PLAYER, done
        );
        self.add_cmd(
            format!(
                "execute unless score {} {} = {} {} run data modify storage {} {}.value append from storage {} {}.value[0]",
                FAKE_PLAYER, counter, FAKE_PLAYER, index_reg, storage, scratch_list, storage, name
            ),
            span,
        )?;
        if self.is_compile_time(value) {
            let stored = self.const_int(value, span)?;
            self.add_cmd(
                format!(
                    "execute {} run data modify storage {} {}.value append value {}",
                    at_index, storage, scratch_list, stored
                ),
                span,
            )?;
        } else if let Value::Register(value_reg) = value {
            self.add_cmd(
                format!(
                    "execute {} run data modify storage {} {}.value append value 0",
                    at_index, storage, scratch_list
                ),
                span,
            )?;
            self.add_cmd(
                format!(
                    "execute {} run execute store result storage {} {}.value[-1] int 1 run scoreboard players get {} {}",
                    at_index, storage, scratch_list, FAKE_PLAYER, value_reg
                ),
                span,
            )?;
        }
        self.add_cmd(
            format!(
                "execute {} run scoreboard players set {} {} 1",
                at_index, FAKE_PLAYER, done
            ),
            span,
        )?;
        self.add_cmd(
            format!("data remove storage {} {}.value[0]", storage, name),
            span,
        )?;
        self.add_cmd(
            format!("scoreboard players add {} {} 1", FAKE_PLAYER, counter),
            span,
        )?;
        self.add_cmd(
            format!(
                "execute unless score {} {} >= {} {} run function {}:{}",
                FAKE_PLAYER,
                counter,
                FAKE_PLAYER,
                size,
                self.pack_name(),
                loop_name
            ),
            span,
        )?;
        self.end_loop();

        self.add_cmd(
            format!(
                "data modify storage {} {}.value set from storage {} {}.value",
                storage, name, storage, scratch_list
            ),
            span,
        )?;
        self.mark_unused(&scratch_list);
        self.mark_unused(&counter);
        self.mark_unused(&size);
        self.mark_unused(&done);
        Ok(())
    }

    /// Element read of a `$`-array, resolved during lowering
    fn get_const_element(
        &mut self,
        name: &str,
        element: &Value,
        element_ty: Type,
        span: Span,
    ) -> Result<Value, CompileError> {
        if !self.is_compile_time(element) {
            return Err(CompileError::new(
                ErrorKind::NotCompileTime { what: "List index" },
                span,
            ));
        }
        let index = self.const_int(element, span)?;
        let binding = self.const_literal(&Value::Register(name.to_string()), span)?;
        let LiteralValue::Array(items) = &binding.value else {
            return Err(CompileError::new(
                ErrorKind::NotAnArray {
                    name: name.to_string(),
                },
                span,
            ));
        };
        let item = usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .ok_or_else(|| {
                CompileError::new(
                    ErrorKind::IndexOutOfBounds {
                        index,
                        size: items.len(),
                    },
                    span,
                )
            })?;
        Ok(Value::Literal(Literal {
            value: LiteralValue::Int(*item),
            ty: element_ty,
            constant: true,
        }))
    }

    /// Element write of a `$`-array, resolved during lowering
    fn set_const_element(
        &mut self,
        name: &str,
        element: &Value,
        value: &Value,
        span: Span,
    ) -> Result<(), CompileError> {
        if !self.is_compile_time(value) {
            return Err(CompileError::new(
                ErrorKind::NotCompileTime {
                    what: "Assigned value",
                },
                span,
            ));
        }
        if !self.is_compile_time(element) {
            return Err(CompileError::new(
                ErrorKind::NotCompileTime { what: "List index" },
                span,
            ));
        }
        let index = self.const_int(element, span)?;
        let stored = self.const_int(value, span)?;
        let mut binding = self.const_literal(&Value::Register(name.to_string()), span)?;
        let LiteralValue::Array(items) = &mut binding.value else {
            return Err(CompileError::new(
                ErrorKind::NotAnArray {
                    name: name.to_string(),
                },
                span,
            ));
        };
        let size = items.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| items.get_mut(i))
            .ok_or_else(|| {
                CompileError::new(ErrorKind::IndexOutOfBounds { index, size }, span)
            })?;
        *slot = stored;
        self.set_memory(name, binding);
        Ok(())
    }
}

/// Diagnostics name a variable the way the source spells it
fn display_name(name: &str) -> String {
    name.strip_suffix(super::LOCAL_SUFFIX)
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn test_array_literal_writes_storage_object() {
        let (lowered, _) = lower_source("void load() { int xs[] = [1, 2, 3]; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds.iter().any(|c| c.ends_with(
            "data modify storage p:minescript _var0 set value {value:[1,2,3],size:3}"
        )));
        assert!(cmds.iter().any(|c| c.ends_with(
            "data modify storage p:minescript xs+local set from storage p:minescript _var0"
        )));
        assert_eq!(
            lowered.locals["load"].get("xs"),
            Some(&Type::IntArray)
        );
    }

    #[test]
    fn test_string_initialiser_stores_code_points() {
        let (lowered, _) = lower_source("void load() { char s[] = \"abc\"; }");
        assert!(commands(&lowered, "load").iter().any(|c| c.ends_with(
            "data modify storage p:minescript s+local set value {value:[97,98,99],size:3}"
        )));
    }

    #[test]
    fn test_array_literal_elements_must_share_a_type() {
        let err = lower_err("void load() { int xs[] = [1, 'c']; }");
        assert_eq!(
            err.kind,
            ErrorKind::TypeMismatch {
                expected: "int".to_string(),
                given: "char".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_array_literal_is_rejected() {
        let err = lower_err("void load() { int xs[] = []; }");
        assert_eq!(err.kind, ErrorKind::EmptyArray);
    }

    #[test]
    fn test_literal_index_read_is_a_single_data_get() {
        let (lowered, _) =
            lower_source("void load() { int xs[] = [5, 6]; int y = xs[1]; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds.iter().any(|c| c.contains(
            "run data get storage p:minescript xs+local.value[1]"
        )));
        assert!(lowered.loops.is_empty());
    }

    #[test]
    fn test_register_index_read_builds_pop_loop() {
        let (lowered, _) = lower_source(
            "void load() { int xs[] = [5, 6]; int i; int y = xs[i]; }",
        );
        assert!(lowered.loops.contains_key("_loop0"));
        let body = &lowered.loops["_loop0"];
        assert!(body[0].ends_with("scoreboard players add #MineScript _var1 1"));
        assert!(body[1].contains("run data get storage p:minescript _var0.value[0]"));
        assert!(body[2].ends_with("data remove storage p:minescript _var0.value[0]"));
        assert!(body[3].contains(
            "unless score #MineScript _var1 > #MineScript i+local run function p:_loop0"
        ));
        // The original array is read through a scratch copy
        assert!(commands(&lowered, "load").iter().any(|c| c.ends_with(
            "data modify storage p:minescript _var0 set from storage p:minescript xs+local"
        )));
    }

    #[test]
    fn test_literal_index_write_forms() {
        let (lowered, _) = lower_source(
            "void load() { int xs[] = [5, 6]; int v; xs[0] = 9; xs[1] = v; }",
        );
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("data modify storage p:minescript xs+local.value[0] value 9")));
        assert!(cmds.iter().any(|c| c.ends_with(
            "execute store result storage p:minescript xs+local.value[1] run scoreboard players get #MineScript v+local"
        )));
    }

    #[test]
    fn test_register_index_write_rebuilds_with_done_latch() {
        let (lowered, _) = lower_source(
            "void load() { int xs[] = [5, 6]; int i; xs[i] = 9; }",
        );
        assert!(lowered.loops.contains_key("_loop0"));
        let body = &lowered.loops["_loop0"];
        assert!(body
            .iter()
            .any(|c| c.contains(".value append from storage p:minescript xs+local.value[0]")));
        assert!(body
            .iter()
            .any(|c| c.contains("if score #MineScript _var2 matches 0 run data modify storage")));
        assert!(body
            .iter()
            .any(|c| c.contains("run scoreboard players set #MineScript _var2 1")));
        // The rebuilt list replaces the original afterwards
        assert!(commands(&lowered, "load").iter().any(|c| c.ends_with(
            "data modify storage p:minescript xs+local.value set from storage p:minescript _var0.value"
        )));
    }

    #[test]
    fn test_non_int_index_is_rejected() {
        let err = lower_err("void load() { int xs[] = [1]; int y = xs['c']; }");
        assert_eq!(
            err.kind,
            ErrorKind::NonIntIndex {
                given: "char".to_string()
            }
        );
    }

    #[test]
    fn test_indexing_a_scalar_is_rejected() {
        let err = lower_err("void load() { int x; int y = x[0]; }");
        assert_eq!(
            err.kind,
            ErrorKind::NotAnArray {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_element_write_type_mismatch() {
        let err = lower_err("void load() { int xs[] = [1]; xs[0] = 'c'; }");
        assert_eq!(
            err.kind,
            ErrorKind::TypeMismatch {
                expected: "int".to_string(),
                given: "char".to_string(),
            }
        );
    }

    #[test]
    fn test_compile_time_array_reads_and_writes_fold() {
        let (lowered, _) = lower_source(
            "void load() { int $xs[] = [10, 20]; $xs[1] = 21; int y = $xs[1] + $xs[0]; }",
        );
        let cmds = commands(&lowered, "load");
        assert_eq!(cmds.len(), 2);
        assert!(cmds[1].ends_with("scoreboard players set #MineScript y+local 31"));
    }

    #[test]
    fn test_compile_time_array_register_index_is_rejected() {
        let err = lower_err(
            "void load() { int $xs[] = [1, 2]; int i; int y = $xs[i]; }",
        );
        assert_eq!(
            err.kind,
            ErrorKind::NotCompileTime { what: "List index" }
        );
    }

    #[test]
    fn test_compile_time_array_runtime_value_is_rejected() {
        let err = lower_err(
            "void load() { int $xs[] = [1, 2]; int v; $xs[0] = v; }",
        );
        assert_eq!(
            err.kind,
            ErrorKind::NotCompileTime {
                what: "Assigned value"
            }
        );
    }

    #[test]
    fn test_compile_time_index_out_of_bounds() {
        let err = lower_err("void load() { int $xs[] = [1, 2]; int y = $xs[5]; }");
        assert_eq!(
            err.kind,
            ErrorKind::IndexOutOfBounds { index: 5, size: 2 }
        );
    }
}
