//! Expression lowering
//!
//! Every expression node yields a [`Value`]: a folded [`Literal`] when all
//! inputs are compile-time, otherwise the name of the register the emitted
//! commands leave the result in.

use super::{ExprUse, Literal, LiteralValue, Lowering, Value, FAKE_PLAYER};
use crate::ast::{BinOp, CmpOp, Expr, Fixity, IncDecOp, Span};
use crate::error::{CompileError, ErrorKind};
use crate::types::Type;

impl Lowering<'_> {
    /// Lower one expression. Returns None when the node produces no value
    /// (a void call, or a pure operation whose result nobody consumes).
    pub(super) fn lower_expr(
        &mut self,
        expr: &Expr,
        usage: ExprUse,
    ) -> Result<Option<Value>, CompileError> {
        match expr {
            Expr::Int { value, .. } => Ok(Some(Value::Literal(Literal::int(*value)))),
            Expr::Char { value, .. } => Ok(Some(Value::Literal(Literal::new(
                LiteralValue::Int(*value as i32),
                Type::Char,
            )))),
            Expr::Str { value, .. } => {
                let codes = value.chars().map(|c| c as i32).collect();
                Ok(Some(Value::Literal(Literal::new(
                    LiteralValue::Array(codes),
                    Type::CharArray,
                ))))
            }
            Expr::Parens { inner, .. } => self.lower_expr(inner, usage.child()),
            Expr::Array { elements, span } => self.lower_array_literal(elements, *span, usage),
            Expr::Assign {
                name,
                compile_time,
                index,
                value,
                span,
            } => self.lower_assign(
                name,
                *compile_time,
                index.as_deref(),
                value.as_deref(),
                *span,
                usage,
            ),
            Expr::IncDec {
                name,
                compile_time,
                op,
                fixity,
                span,
            } => self.lower_inc_dec(name, *compile_time, *op, *fixity, *span, usage),
            Expr::Binary { op, lhs, rhs, span } => {
                let left = self.lower_expr(lhs, usage.child())?;
                let left = self.require_value(left, lhs.span())?;
                let right = self.lower_expr(rhs, usage.child())?;
                let right = self.require_value(right, rhs.span())?;
                if usage.used() {
                    self.operate(left, right, *op, *span).map(Some)
                } else {
                    self.release(&left);
                    self.release(&right);
                    Ok(None)
                }
            }
            Expr::Compare { op, lhs, rhs, span } => {
                let left = self.lower_expr(lhs, usage.child())?;
                let left = self.require_value(left, lhs.span())?;
                let right = self.lower_expr(rhs, usage.child())?;
                let right = self.require_value(right, rhs.span())?;
                if usage.used() {
                    self.compare(left, right, *op, *span).map(Some)
                } else {
                    self.release(&left);
                    self.release(&right);
                    Ok(None)
                }
            }
            Expr::Cast { ty, expr, span } => self.lower_cast(*ty, expr, *span, usage).map(Some),
            Expr::Call { name, args, span } => self.lower_call(name, args, *span),
        }
    }

    /// Name reference / assignment / element read / element write
    #[allow(clippy::too_many_arguments)]
    fn lower_assign(
        &mut self,
        name: &str,
        compile_time: bool,
        index: Option<&Expr>,
        value: Option<&Expr>,
        span: Span,
        usage: ExprUse,
    ) -> Result<Option<Value>, CompileError> {
        let name = if compile_time {
            format!("${}", name)
        } else {
            name.to_string()
        };
        self.assert_defined(&name, span)?;
        let suffix = if compile_time {
            ""
        } else {
            self.local_suffix(&name)
        };
        let target = format!("{}{}", name, suffix);

        if let Some(value_expr) = value {
            let val = match value_expr {
                // A `$`-array takes its literal without a storage temp
                Expr::Array { elements, span } if compile_time && index.is_none() => {
                    Value::Literal(self.const_array_literal(elements, *span)?)
                }
                _ => {
                    let val = self.lower_expr(value_expr, ExprUse::Value)?;
                    self.require_value(val, value_expr.span())?
                }
            };
            match index {
                None => {
                    let expected = self.lookup_type(&name, span)?;
                    let given = self.value_type(&val, value_expr.span())?;
                    self.check_types(expected, given, span)?;
                    self.set_var(&target, &val, span)?;
                }
                Some(index_expr) => {
                    let element = self.lower_expr(index_expr, ExprUse::Value)?;
                    let element = self.require_value(element, index_expr.span())?;
                    let array_ty = self.lookup_type(&name, span)?;
                    let element_ty = array_ty.element().ok_or_else(|| {
                        CompileError::new(
                            ErrorKind::NotAnArray {
                                name: name.clone(),
                            },
                            span,
                        )
                    })?;
                    let given = self.value_type(&val, value_expr.span())?;
                    self.check_types(element_ty, given, value_expr.span())?;
                    self.set_arr_element(&target, &element, &val, span)?;
                    self.release(&element);
                }
            }
            self.release(&val);
        }

        // Read-back: what the expression itself evaluates to
        if compile_time {
            return match index {
                Some(index_expr) if usage.used() => {
                    let element = self.lower_expr(index_expr, ExprUse::Value)?;
                    let element = self.require_value(element, index_expr.span())?;
                    let result = self.get_arr_element(&name, &element, span)?;
                    self.release(&element);
                    Ok(Some(result))
                }
                _ => Ok(Some(Value::Register(name))),
            };
        }
        match index {
            Some(index_expr) if usage.used() => {
                let element = self.lower_expr(index_expr, ExprUse::Value)?;
                let element = self.require_value(element, index_expr.span())?;
                let result = self.get_arr_element(&target, &element, span)?;
                self.release(&element);
                Ok(Some(result))
            }
            Some(_) => Ok(Some(Value::Register(target))),
            // A condition can only branch on a register it can test, so a
            // bare name is copied into a temp first
            None if usage == ExprUse::Condition => {
                let ty = self.lookup_type(&name, span)?;
                let temp = self.get_temp_var(ty);
                self.set_var(&temp, &Value::Register(target), span)?;
                Ok(Some(Value::Register(temp)))
            }
            None => Ok(Some(Value::Register(target))),
        }
    }

    fn lower_inc_dec(
        &mut self,
        name: &str,
        compile_time: bool,
        op: IncDecOp,
        fixity: Fixity,
        span: Span,
        usage: ExprUse,
    ) -> Result<Option<Value>, CompileError> {
        let name = if compile_time {
            format!("${}", name)
        } else {
            name.to_string()
        };
        self.assert_defined(&name, span)?;

        if compile_time {
            // Resolved wholly during lowering; never emits
            let old = self
                .const_literal(&Value::Register(name.clone()), span)?;
            if old.ty.is_array() {
                return Err(CompileError::new(
                    ErrorKind::TypeMismatch {
                        expected: Type::Int.to_string(),
                        given: old.ty.to_string(),
                    },
                    span,
                ));
            }
            let delta = match op {
                IncDecOp::Inc => 1,
                IncDecOp::Dec => -1,
            };
            let new = Literal {
                value: LiteralValue::Int(old.value.as_int().wrapping_add(delta)),
                ty: old.ty,
                constant: true,
            };
            self.set_memory(&name, new.clone());
            return Ok(Some(Value::Literal(match fixity {
                Fixity::Post => old,
                Fixity::Pre => new,
            })));
        }

        let ty = self.lookup_type(&name, span)?;
        if ty.is_array() {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    expected: Type::Int.to_string(),
                    given: ty.to_string(),
                },
                span,
            ));
        }
        let suffix = self.local_suffix(&name);
        let register = format!("{}{}", name, suffix);
        let verb = match op {
            IncDecOp::Inc => "add",
            IncDecOp::Dec => "remove",
        };

        match fixity {
            Fixity::Post => {
                // The old value only survives in a temp when somebody reads it
                let snapshot = if usage.used() {
                    let temp = self.get_temp_var(ty);
                    self.set_var(&temp, &Value::Register(register.clone()), span)?;
                    Some(temp)
                } else {
                    None
                };
                self.add_cmd(
                    format!("scoreboard players {} {} {} 1", verb, FAKE_PLAYER, register),
                    span,
                )?;
                Ok(Some(Value::Register(snapshot.unwrap_or(register))))
            }
            Fixity::Pre => {
                self.add_cmd(
                    format!("scoreboard players {} {} {} 1", verb, FAKE_PLAYER, register),
                    span,
                )?;
                Ok(Some(Value::Register(register)))
            }
        }
    }

    /// Lower a comparison to a 0/1 temp, or fold it
    pub(super) fn compare(
        &mut self,
        left: Value,
        right: Value,
        op: CmpOp,
        span: Span,
    ) -> Result<Value, CompileError> {
        let left_ty = self.value_type(&left, span)?;
        let right_ty = self.value_type(&right, span)?;
        self.check_types(left_ty, right_ty, span)?;

        if self.is_compile_time(&left) && self.is_compile_time(&right) {
            let a = self.const_literal(&left, span)?;
            let b = self.const_literal(&right, span)?;
            let result = fold_compare(&a.value, &b.value, op);
            return Ok(Value::Literal(Literal::int(result as i32)));
        }

        if let Value::Register(reg) = &left
            && !self.is_compile_time(&left)
            && self.is_compile_time(&right)
        {
            let reg = reg.clone();
            let bound = self.const_int(&right, span)?;
            let temp = self.get_temp_var(Type::Int);
            self.set_var(&temp, &Value::Literal(Literal::int(0)), span)?;
            let test = match op {
                CmpOp::Eq => format!("if score {} {} matches {}", FAKE_PLAYER, reg, bound),
                CmpOp::Ne => format!("unless score {} {} matches {}", FAKE_PLAYER, reg, bound),
                CmpOp::Le => format!("if score {} {} matches ..{}", FAKE_PLAYER, reg, bound),
                CmpOp::Ge => format!("if score {} {} matches {}..", FAKE_PLAYER, reg, bound),
                // Strict bounds are the unless-complement of the inclusive ones
                CmpOp::Lt => format!("unless score {} {} matches {}..", FAKE_PLAYER, reg, bound),
                CmpOp::Gt => format!("unless score {} {} matches ..{}", FAKE_PLAYER, reg, bound),
            };
            self.add_cmd(
                format!(
                    "execute {} run scoreboard players set {} {} 1",
                    test, FAKE_PLAYER, temp
                ),
                span,
            )?;
            self.mark_unused(&reg);
            return Ok(Value::Register(temp));
        }

        if self.is_compile_time(&left) {
            // Literal vs register: swap operands, mirror the operator
            return self.compare(right, left, op.swapped(), span);
        }

        // Register vs register
        let (Value::Register(a), Value::Register(b)) = (&left, &right) else {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    expected: left_ty.to_string(),
                    given: right_ty.to_string(),
                },
                span,
            ));
        };
        let (a, b) = (a.clone(), b.clone());
        let temp = self.get_temp_var(Type::Int);
        self.set_var(&temp, &Value::Literal(Literal::int(0)), span)?;
        let test = match op {
            CmpOp::Eq => format!("if score {} {} = {} {}", FAKE_PLAYER, a, FAKE_PLAYER, b),
            CmpOp::Ne => format!("unless score {} {} = {} {}", FAKE_PLAYER, a, FAKE_PLAYER, b),
            other => format!(
                "if score {} {} {} {} {}",
                FAKE_PLAYER,
                a,
                other.scoreboard(),
                FAKE_PLAYER,
                b
            ),
        };
        self.add_cmd(
            format!(
                "execute {} run scoreboard players set {} {} 1",
                test, FAKE_PLAYER, temp
            ),
            span,
        )?;
        self.mark_unused(&a);
        self.mark_unused(&b);
        Ok(Value::Register(temp))
    }

    /// Lower arithmetic into scoreboard operations, or fold it
    pub(super) fn operate(
        &mut self,
        left: Value,
        right: Value,
        op: BinOp,
        span: Span,
    ) -> Result<Value, CompileError> {
        let left_ty = self.value_type(&left, span)?;
        let right_ty = self.value_type(&right, span)?;
        self.check_types(left_ty, right_ty, span)?;

        if self.is_compile_time(&left) && self.is_compile_time(&right) {
            let a = self.const_literal(&left, span)?;
            let b = self.const_literal(&right, span)?;
            let value = fold_arith(&a.value, &b.value, op, span)?;
            return Ok(Value::Literal(Literal::new(value, left_ty)));
        }

        if let Value::Register(reg) = &left
            && !self.is_compile_time(&left)
            && self.is_compile_time(&right)
        {
            let reg = reg.clone();
            let operand = self.const_int(&right, span)?;
            let temp = self.get_temp_var(right_ty);
            match op {
                BinOp::Add => {
                    self.set_var(&temp, &left, span)?;
                    self.add_cmd(
                        format!("scoreboard players add {} {} {}", FAKE_PLAYER, temp, operand),
                        span,
                    )?;
                }
                BinOp::Sub => {
                    self.set_var(&temp, &left, span)?;
                    self.add_cmd(
                        format!(
                            "scoreboard players remove {} {} {}",
                            FAKE_PLAYER, temp, operand
                        ),
                        span,
                    )?;
                }
                BinOp::Mul => {
                    self.set_var(&temp, &right, span)?;
                    self.add_cmd(
                        format!(
                            "scoreboard players operation {} {} *= {} {}",
                            FAKE_PLAYER, temp, FAKE_PLAYER, reg
                        ),
                        span,
                    )?;
                }
                BinOp::Div | BinOp::Rem => {
                    // Literal denominators need a scratch score
                    let scratch = self.get_temp_var(right_ty);
                    self.set_var(&scratch, &right, span)?;
                    self.set_var(&temp, &left, span)?;
                    self.add_cmd(
                        format!(
                            "scoreboard players operation {} {} {} {} {}",
                            FAKE_PLAYER,
                            temp,
                            op.scoreboard(),
                            FAKE_PLAYER,
                            scratch
                        ),
                        span,
                    )?;
                    self.mark_unused(&scratch);
                }
            }
            self.mark_unused(&reg);
            return Ok(Value::Register(temp));
        }

        if self.is_compile_time(&left) {
            if matches!(op, BinOp::Add | BinOp::Mul) {
                return self.operate(right, left, op, span);
            }
            // Non-commutative with the literal on the left: materialise the
            // literal into the result temp and operate against the register
            let Value::Register(reg) = &right else {
                return Err(CompileError::new(
                    ErrorKind::TypeMismatch {
                        expected: left_ty.to_string(),
                        given: right_ty.to_string(),
                    },
                    span,
                ));
            };
            let reg = reg.clone();
            let temp = self.get_temp_var(left_ty);
            self.set_var(&temp, &left, span)?;
            self.add_cmd(
                format!(
                    "scoreboard players operation {} {} {} {} {}",
                    FAKE_PLAYER,
                    temp,
                    op.scoreboard(),
                    FAKE_PLAYER,
                    reg
                ),
                span,
            )?;
            self.mark_unused(&reg);
            return Ok(Value::Register(temp));
        }

        // Register op register: operate against a copy of the left
        let (Value::Register(a), Value::Register(b)) = (&left, &right) else {
            return Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    expected: left_ty.to_string(),
                    given: right_ty.to_string(),
                },
                span,
            ));
        };
        let (a, b) = (a.clone(), b.clone());
        let temp = self.get_temp_var(left_ty);
        self.set_var(&temp, &left, span)?;
        self.add_cmd(
            format!(
                "scoreboard players operation {} {} {} {} {}",
                FAKE_PLAYER,
                temp,
                op.scoreboard(),
                FAKE_PLAYER,
                b
            ),
            span,
        )?;
        self.mark_unused(&a);
        self.mark_unused(&b);
        Ok(Value::Register(temp))
    }

    /// `int <-> char` casts; `char -> int` re-types, `int -> char` wraps mod 256
    fn lower_cast(
        &mut self,
        to: Type,
        expr: &Expr,
        span: Span,
        usage: ExprUse,
    ) -> Result<Value, CompileError> {
        let value = self.lower_expr(expr, usage.child())?;
        let value = self.require_value(value, expr.span())?;
        let from = self.value_type(&value, span)?;

        if from == to {
            return Ok(value);
        }
        match (from, to) {
            (Type::Char, Type::Int) => {
                if self.is_compile_time(&value) {
                    let lit = self.const_literal(&value, span)?;
                    Ok(Value::Literal(Literal::new(lit.value, Type::Int)))
                } else {
                    let temp = self.get_temp_var(Type::Int);
                    self.set_var(&temp, &value, span)?;
                    self.release(&value);
                    Ok(Value::Register(temp))
                }
            }
            (Type::Int, Type::Char) => {
                if self.is_compile_time(&value) {
                    let lit = self.const_literal(&value, span)?;
                    Ok(Value::Literal(Literal::new(
                        LiteralValue::Int(lit.value.as_int().rem_euclid(256)),
                        Type::Char,
                    )))
                } else {
                    let scratch = self.get_temp_var(Type::Int);
                    self.set_var(&scratch, &Value::Literal(Literal::int(256)), span)?;
                    let temp = self.get_temp_var(Type::Char);
                    self.set_var(&temp, &value, span)?;
                    self.release(&value);
                    self.add_cmd(
                        format!(
                            "scoreboard players operation {} {} %= {} {}",
                            FAKE_PLAYER, temp, FAKE_PLAYER, scratch
                        ),
                        span,
                    )?;
                    self.mark_unused(&scratch);
                    Ok(Value::Register(temp))
                }
            }
            _ => Err(CompileError::new(
                ErrorKind::TypeMismatch {
                    expected: to.to_string(),
                    given: from.to_string(),
                },
                span,
            )),
        }
    }

    /// Copy arguments into the callee's parameter slots, call, and hand back
    /// the callee's return slot
    fn lower_call(
        &mut self,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<Option<Value>, CompileError> {
        let Some(info) = self.function_info(name) else {
            return Err(CompileError::new(
                ErrorKind::UndefinedFunction {
                    name: name.to_string(),
                },
                span,
            ));
        };
        let params = info.args.clone();
        let return_slot = info.return_slot.clone();

        let mut values = Vec::new();
        for arg in args {
            let value = self.lower_expr(arg, ExprUse::Value)?;
            let value = self.require_value(value, arg.span())?;
            values.push((value, arg.span()));
        }
        if values.len() != params.len() {
            return Err(CompileError::new(
                ErrorKind::ArgumentCount {
                    name: name.to_string(),
                    expected: params.len(),
                    given: values.len(),
                },
                span,
            ));
        }
        // Copies happen in source order
        for ((value, value_span), (param, param_ty)) in values.iter().zip(&params) {
            let given = self.value_type(value, *value_span)?;
            if given != *param_ty {
                return Err(CompileError::new(
                    ErrorKind::ArgumentType {
                        param: param.clone(),
                        expected: param_ty.to_string(),
                        given: given.to_string(),
                    },
                    *value_span,
                ));
            }
            let slot = format!("{}{}", param, super::LOCAL_SUFFIX);
            self.set_var(&slot, value, *value_span)?;
        }
        self.add_cmd(format!("function {}:{}", self.pack_name(), name), span)?;
        for (value, _) in &values {
            self.release(value);
        }
        Ok(return_slot.map(Value::Register))
    }
}

fn fold_compare(a: &LiteralValue, b: &LiteralValue, op: CmpOp) -> bool {
    match (a, b) {
        (LiteralValue::Int(x), LiteralValue::Int(y)) => match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        },
        (LiteralValue::Array(x), LiteralValue::Array(y)) => match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
        },
        // Mixed shapes are stopped by the type check
        _ => false,
    }
}

fn fold_arith(
    a: &LiteralValue,
    b: &LiteralValue,
    op: BinOp,
    span: Span,
) -> Result<LiteralValue, CompileError> {
    match (a, b) {
        (LiteralValue::Int(x), LiteralValue::Int(y)) => {
            let value = match op {
                BinOp::Add => x.wrapping_add(*y),
                BinOp::Sub => x.wrapping_sub(*y),
                BinOp::Mul => x.wrapping_mul(*y),
                BinOp::Div | BinOp::Rem => {
                    if *y == 0 {
                        return Err(CompileError::new(ErrorKind::DivisionByZero, span));
                    }
                    match op {
                        BinOp::Div => x.wrapping_div(*y),
                        _ => x.wrapping_rem(*y),
                    }
                }
            };
            Ok(LiteralValue::Int(value))
        }
        (LiteralValue::Array(x), LiteralValue::Array(y)) if op == BinOp::Add => {
            let mut joined = x.clone();
            joined.extend_from_slice(y);
            Ok(LiteralValue::Array(joined))
        }
        _ => Err(CompileError::new(
            ErrorKind::TypeMismatch {
                expected: Type::Int.to_string(),
                given: "array".to_string(),
            },
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn test_all_literal_arithmetic_folds_to_a_single_set() {
        let (lowered, _) = lower_source("void load() { int x = 2 + 3 * 4; }");
        let cmds = commands(&lowered, "load");
        // Break-flag reset plus the folded store, nothing else
        assert_eq!(cmds.len(), 2);
        assert!(cmds[1].ends_with("scoreboard players set #MineScript x+local 14"));
    }

    #[test]
    fn test_fold_wraps_at_32_bits() {
        let (lowered, _) =
            lower_source("void load() { int x = 2147483647 + 1; }");
        assert!(
            commands(&lowered, "load")[1]
                .ends_with("scoreboard players set #MineScript x+local -2147483648")
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let err = lower_err("void load() { int x = 1 / 0; }");
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_register_plus_literal_uses_add() {
        let (lowered, _) = lower_source("void load() { int x; int y = x + 5; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players operation #MineScript _var0 = #MineScript x+local")));
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players add #MineScript _var0 5")));
    }

    #[test]
    fn test_literal_minus_register_keeps_operand_order() {
        let (lowered, _) = lower_source("void load() { int x; int y = 10 - x; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players set #MineScript _var0 10")));
        assert!(cmds.iter().any(|c| c.ends_with(
            "scoreboard players operation #MineScript _var0 -= #MineScript x+local"
        )));
    }

    #[test]
    fn test_register_divided_by_literal_takes_a_scratch() {
        let (lowered, _) = lower_source("void load() { int x; int y = x / 3; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players set #MineScript _var1 3")));
        assert!(cmds.iter().any(|c| c.ends_with(
            "scoreboard players operation #MineScript _var0 /= #MineScript _var1"
        )));
    }

    #[test]
    fn test_comparison_against_literal_uses_matches_bounds() {
        let (lowered, _) = lower_source("void load() { int x; int a = x <= 4; int b = x < 4; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.contains("if score #MineScript x+local matches ..4 run")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("unless score #MineScript x+local matches 4.. run")));
    }

    #[test]
    fn test_not_equal_literal_is_the_unless_complement() {
        let (lowered, _) = lower_source("void load() { int x; int a = x != 7; }");
        assert!(commands(&lowered, "load")
            .iter()
            .any(|c| c.contains("unless score #MineScript x+local matches 7 run")));
    }

    #[test]
    fn test_literal_on_the_left_swaps_and_mirrors() {
        // 4 > x becomes x < 4
        let (lowered, _) = lower_source("void load() { int x; int a = 4 > x; }");
        assert!(commands(&lowered, "load")
            .iter()
            .any(|c| c.contains("unless score #MineScript x+local matches 4.. run")));
    }

    #[test]
    fn test_register_comparison_uses_score_operators() {
        let (lowered, _) = lower_source("void load() { int x; int y; int a = x < y; int b = x != y; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.contains("if score #MineScript x+local < #MineScript y+local run")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("unless score #MineScript x+local = #MineScript y+local run")));
    }

    #[test]
    fn test_comparison_folds_to_literal() {
        let (lowered, _) = lower_source("void load() { int x = 3 < 4; int y = 4 < 3; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds[1].ends_with("scoreboard players set #MineScript x+local 1"));
        assert!(cmds[2].ends_with("scoreboard players set #MineScript y+local 0"));
    }

    #[test]
    fn test_comparing_mismatched_types_is_an_error() {
        let err = lower_err("void load() { int x; char c; int a = x == c; }");
        assert_eq!(
            err.kind,
            ErrorKind::TypeMismatch {
                expected: "int".to_string(),
                given: "char".to_string(),
            }
        );
    }

    #[test]
    fn test_cast_char_to_int_folds() {
        let (lowered, _) = lower_source("void load() { int x = (int) 'A'; }");
        assert!(commands(&lowered, "load")[1]
            .ends_with("scoreboard players set #MineScript x+local 65"));
    }

    #[test]
    fn test_cast_int_to_char_wraps_mod_256() {
        let (lowered, _) = lower_source("void load() { char c = (char) 256; }");
        assert!(commands(&lowered, "load")[1]
            .ends_with("scoreboard players set #MineScript c+local 0"));
    }

    #[test]
    fn test_cast_register_to_char_emits_modulo() {
        let (lowered, _) = lower_source("void load() { int x; char c = (char) x; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players set #MineScript _var0 256")));
        assert!(cmds.iter().any(|c| c.ends_with(
            "scoreboard players operation #MineScript _var1 %= #MineScript _var0"
        )));
    }

    #[test]
    fn test_cast_between_arrays_is_rejected() {
        let err = lower_err("void load() { int xs[] = [1]; char c = (char) xs; }");
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_post_increment_snapshots_when_used() {
        let (lowered, _) = lower_source("void load() { int x; int y = x++; }");
        let cmds = commands(&lowered, "load");
        let copy = cmds
            .iter()
            .position(|c| {
                c.ends_with("scoreboard players operation #MineScript _var0 = #MineScript x+local")
            })
            .expect("snapshot copy");
        let bump = cmds
            .iter()
            .position(|c| c.ends_with("scoreboard players add #MineScript x+local 1"))
            .expect("increment");
        assert!(copy < bump);
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players operation #MineScript y+local = #MineScript _var0")));
    }

    #[test]
    fn test_post_increment_alone_takes_no_temp() {
        let (lowered, _) = lower_source("void load() { int x; x++; }");
        let cmds = commands(&lowered, "load");
        assert_eq!(cmds.len(), 2);
        assert!(cmds[1].ends_with("scoreboard players add #MineScript x+local 1"));
        assert!(lowered.globals.keys().all(|k| !k.starts_with("_var")));
    }

    #[test]
    fn test_pre_decrement_returns_the_register_itself() {
        let (lowered, _) = lower_source("void load() { int x; int y = --x; }");
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players remove #MineScript x+local 1")));
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players operation #MineScript y+local = #MineScript x+local")));
    }

    #[test]
    fn test_increment_of_undeclared_name_fails() {
        for source in [
            "void load() { x++; }",
            "void load() { ++x; }",
            "void load() { x--; }",
            "void load() { --x; }",
        ] {
            let err = lower_err(source);
            assert_eq!(
                err.kind,
                ErrorKind::UndeclaredVariable {
                    name: "x".to_string()
                },
                "for {}",
                source
            );
        }
    }

    #[test]
    fn test_compile_time_bindings_fold_through_expressions() {
        let (lowered, _) =
            lower_source("void load() { int $n = 20; int x = $n * 2 + 2; }");
        assert!(commands(&lowered, "load")[1]
            .ends_with("scoreboard players set #MineScript x+local 42"));
    }

    #[test]
    fn test_compile_time_increment_never_emits() {
        let (lowered, _) =
            lower_source("void load() { int $n = 1; $n++; int x = $n; }");
        let cmds = commands(&lowered, "load");
        assert_eq!(cmds.len(), 2);
        assert!(cmds[1].ends_with("scoreboard players set #MineScript x+local 2"));
    }

    #[test]
    fn test_assigning_register_to_compile_time_binding_fails() {
        let err = lower_err("void load() { int x; int $n = 0; $n = x; }");
        assert_eq!(err.kind, ErrorKind::AssignRuntimeToCompile);
    }

    #[test]
    fn test_call_copies_arguments_in_source_order() {
        let (lowered, _) = lower_source(
            "void f(int a, int b) {} void load() { f(1, 2); }",
        );
        let cmds = commands(&lowered, "load");
        let first = cmds
            .iter()
            .position(|c| c.ends_with("scoreboard players set #MineScript a+local 1"))
            .expect("first argument");
        let second = cmds
            .iter()
            .position(|c| c.ends_with("scoreboard players set #MineScript b+local 2"))
            .expect("second argument");
        let call = cmds
            .iter()
            .position(|c| c.ends_with("function p:f"))
            .expect("call");
        assert!(first < second && second < call);
    }

    #[test]
    fn test_call_returns_the_return_slot() {
        let (lowered, _) = lower_source(
            "int f(int x) { return x + 1; } void load() { int y = f(41); }",
        );
        let cmds = commands(&lowered, "load");
        assert!(cmds
            .iter()
            .any(|c| c.ends_with("scoreboard players set #MineScript x+local 41")));
        assert!(cmds.iter().any(|c| c.ends_with("function p:f")));
        assert!(cmds.iter().any(|c| c.ends_with(
            "scoreboard players operation #MineScript y+local = #MineScript _f_f"
        )));
        assert_eq!(lowered.globals.get("_f_f"), Some(&Type::Int));
    }

    #[test]
    fn test_call_arity_mismatch() {
        let err = lower_err("void f(int a) {} void load() { f(); }");
        assert_eq!(
            err.kind,
            ErrorKind::ArgumentCount {
                name: "f".to_string(),
                expected: 1,
                given: 0,
            }
        );
    }

    #[test]
    fn test_call_argument_type_mismatch() {
        let err = lower_err("void f(int a) {} void load() { f('c'); }");
        assert_eq!(
            err.kind,
            ErrorKind::ArgumentType {
                param: "a".to_string(),
                expected: "int".to_string(),
                given: "char".to_string(),
            }
        );
    }

    #[test]
    fn test_undefined_function_call() {
        let err = lower_err("void load() { g(); }");
        assert_eq!(
            err.kind,
            ErrorKind::UndefinedFunction {
                name: "g".to_string()
            }
        );
    }

    #[test]
    fn test_void_call_used_as_value() {
        let err = lower_err("void f() {} void load() { int x = f(); }");
        assert_eq!(err.kind, ErrorKind::VoidValue);
    }

    #[test]
    fn test_discarded_operation_emits_nothing() {
        let (lowered, _) = lower_source("void load() { 1 + 2; }");
        assert_eq!(commands(&lowered, "load").len(), 1);
    }
}
