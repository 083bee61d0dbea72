//! Statement and control-flow lowering
//!
//! The target has no branch instruction: `if` pushes a guard onto the
//! prefix stack, loops compile their body into a synthetic `_loopN`
//! function that tail-calls itself while the condition holds, and `return`
//! / `break` flip the flag registers those guards test.

use super::{ExprUse, Literal, Lowering, Value, FAKE_PLAYER};
use crate::ast::{Declarator, Expr, ForInit, Span, Stat};
use crate::error::{CompileError, ErrorKind};
use crate::types::Type;

impl Lowering<'_> {
    pub(super) fn lower_stat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        match stat {
            Stat::Function {
                name, body, span, ..
            } => self.lower_function(name, body, *span),
            Stat::VarDecl { ty, decls, .. } => self.lower_var_decl(*ty, decls),
            Stat::Block { stats, .. } => {
                for stat in stats {
                    self.lower_stat(stat)?;
                }
                Ok(())
            }
            Stat::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            Stat::For {
                init,
                cond,
                update,
                body,
                span,
            } => self.lower_for(init, cond, update, body, *span),
            Stat::While { cond, body, span } => self.lower_while(cond, body, *span),
            Stat::Return { value, span } => self.lower_return(value.as_ref(), *span),
            Stat::Break { span } => self.lower_break(*span),
            Stat::Print { args, span } => self.lower_print(args, *span),
            Stat::Command { text, span } => self.add_cmd(text.clone(), *span),
            Stat::Expr { expr, .. } => {
                if let Some(value) = self.lower_expr(expr, ExprUse::Discarded)? {
                    self.release(&value);
                }
                Ok(())
            }
        }
    }

    /// Lower a function body: open the local scope, bind parameters, set up
    /// the break flag, and guard every body command with it
    fn lower_function(&mut self, name: &str, body: &Stat, span: Span) -> Result<(), CompileError> {
        if let Some(outer) = self.current_function() {
            // The mapping pass rejects nested declarations before lowering runs
            return Err(CompileError::new(
                ErrorKind::NestedFunction {
                    inner: name.to_string(),
                    outer: outer.clone(),
                },
                span,
            ));
        }
        let Some(info) = self.function_info(name) else {
            return Err(CompileError::new(
                ErrorKind::UndefinedFunction {
                    name: name.to_string(),
                },
                span,
            ));
        };
        let params = info.args.clone();

        let break_flag = format!("_break_{}", name);
        self.enter_function(name, break_flag.clone());
        for (param, ty) in &params {
            self.add_var(param, *ty, None)?;
        }
        self.add_var(&break_flag, Type::Int, None)?;
        self.set_var(&break_flag, &Value::Literal(Literal::int(0)), span)?;

        self.push_prefix(format!(
            "unless score {} {} matches 1",
            FAKE_PLAYER, break_flag
        ));
        let result = self.lower_stat(body);
        self.pop_prefix();
        self.exit_function();
        result
    }

    fn lower_var_decl(&mut self, ty: Type, decls: &[Declarator]) -> Result<(), CompileError> {
        for dec in decls {
            let name = if dec.compile_time {
                format!("${}", dec.name)
            } else {
                dec.name.clone()
            };
            let declared_ty = if dec.array {
                match ty.array() {
                    Some(array_ty) => array_ty,
                    None => {
                        return Err(CompileError::new(ErrorKind::NestedArray, dec.span));
                    }
                }
            } else {
                ty
            };
            let suffix = if self.current_function().is_none() || dec.compile_time {
                ""
            } else {
                super::LOCAL_SUFFIX
            };
            self.add_var(&name, declared_ty, Some(dec.span))?;

            if let Some(init) = &dec.init {
                let value = match init {
                    // A `$`-array takes its literal without a storage temp
                    Expr::Array { elements, span } if dec.compile_time => {
                        Value::Literal(self.const_array_literal(elements, *span)?)
                    }
                    _ => {
                        let value = self.lower_expr(init, ExprUse::Value)?;
                        self.require_value(value, init.span())?
                    }
                };
                let given = self.value_type(&value, init.span())?;
                self.check_types(declared_ty, given, init.span())?;
                self.set_var(&format!("{}{}", name, suffix), &value, dec.span)?;
                self.release(&value);
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stat,
        else_branch: Option<&Stat>,
    ) -> Result<(), CompileError> {
        let condition = self.lower_expr(cond, ExprUse::Condition)?;
        let condition = self.require_value(condition, cond.span())?;

        if self.is_compile_time(&condition) {
            // Only the taken branch exists in the output
            let lit = self.const_literal(&condition, cond.span())?;
            if lit.truthy() {
                self.lower_stat(then_branch)?;
            } else if let Some(else_branch) = else_branch {
                self.lower_stat(else_branch)?;
            }
            return Ok(());
        }

        let Value::Register(reg) = &condition else {
            return Ok(());
        };
        let reg = reg.clone();
        self.push_prefix(format!("if score {} {} matches 1", FAKE_PLAYER, reg));
        self.lower_stat(then_branch)?;
        self.pop_prefix();
        if let Some(else_branch) = else_branch {
            self.push_prefix(format!("unless score {} {} matches 1", FAKE_PLAYER, reg));
            self.lower_stat(else_branch)?;
            self.pop_prefix();
        }
        self.mark_unused(&reg);
        Ok(())
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stat, span: Span) -> Result<(), CompileError> {
        let condition = self.lower_expr(cond, ExprUse::Condition)?;
        let condition = self.require_value(condition, cond.span())?;

        let break_var = self.get_temp_var(Type::Int);
        self.set_var(&break_var, &Value::Literal(Literal::int(1)), span)?;

        let name = self.next_loop_name();
        let mut always_true = false;
        if self.is_compile_time(&condition) {
            let lit = self.const_literal(&condition, cond.span())?;
            if !lit.truthy() {
                self.reporter().warning(cond.span(), "Condition is always false");
                self.mark_unused(&break_var);
                return Ok(());
            }
            self.reporter().warning(cond.span(), "Condition is always true");
            self.add_cmd(format!("function {}:{}", self.pack_name(), name), span)?;
            always_true = true;
        } else if let Value::Register(reg) = &condition {
            self.add_cmd(
                format!(
                    "execute unless score {} {} matches 0 run function {}:{}",
                    FAKE_PLAYER,
                    reg,
                    self.pack_name(),
                    name
                ),
                span,
            )?;
        }

        self.start_loop(name.clone(), Some(break_var));
        self.lower_stat(body)?;
        let tail_condition = self.emit_loop_tail(cond, &condition, &name, always_true, span)?;
        self.end_loop();
        if let Some(tail) = tail_condition {
            self.release(&tail);
        }
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: &ForInit,
        cond: &Expr,
        update: &Expr,
        body: &Stat,
        span: Span,
    ) -> Result<(), CompileError> {
        let init_value = match init {
            ForInit::Decl(stat) => {
                self.lower_stat(stat)?;
                None
            }
            ForInit::Expr(expr) => self.lower_expr(expr, ExprUse::Condition)?,
        };
        let condition = self.lower_expr(cond, ExprUse::Condition)?;
        let condition = self.require_value(condition, cond.span())?;

        let break_var = self.get_temp_var(Type::Int);
        self.set_var(&break_var, &Value::Literal(Literal::int(1)), span)?;

        let name = self.next_loop_name();
        let mut always_true = false;
        if self.is_compile_time(&condition) {
            let lit = self.const_literal(&condition, cond.span())?;
            if !lit.truthy() {
                self.reporter().warning(cond.span(), "Condition is always false");
                self.mark_unused(&break_var);
                if let Some(value) = &init_value {
                    self.release(value);
                }
                return Ok(());
            }
            self.reporter().warning(cond.span(), "Condition is always true");
            self.add_cmd(format!("function {}:{}", self.pack_name(), name), span)?;
            always_true = true;
        } else if let Value::Register(reg) = &condition {
            self.add_cmd(
                format!(
                    "execute unless score {} {} matches 0 run function {}:{}",
                    FAKE_PLAYER,
                    reg,
                    self.pack_name(),
                    name
                ),
                span,
            )?;
        }

        self.start_loop(name.clone(), Some(break_var));
        self.lower_stat(body)?;
        let update_value = self.lower_expr(update, ExprUse::Condition)?;
        let tail_condition = self.emit_loop_tail(cond, &condition, &name, always_true, span)?;
        self.end_loop();
        if let Some(tail) = tail_condition {
            self.release(&tail);
        }
        if let Some(value) = &init_value {
            self.release(value);
        }
        if let Some(value) = &update_value {
            self.release(value);
        }
        Ok(())
    }

    /// Re-arm the loop from inside its own body: re-evaluate the condition
    /// and emit the guarded self-call (or the unconditional one when the
    /// condition is a constant truth)
    fn emit_loop_tail(
        &mut self,
        cond: &Expr,
        site_condition: &Value,
        name: &str,
        always_true: bool,
        span: Span,
    ) -> Result<Option<Value>, CompileError> {
        if always_true {
            self.add_cmd(format!("function {}:{}", self.pack_name(), name), span)?;
            return Ok(None);
        }
        self.release(site_condition);
        let condition = self.lower_expr(cond, ExprUse::Condition)?;
        let condition = self.require_value(condition, cond.span())?;
        if let Value::Register(reg) = &condition {
            self.add_cmd(
                format!(
                    "execute unless score {} {} matches 0 run function {}:{}",
                    FAKE_PLAYER,
                    reg,
                    self.pack_name(),
                    name
                ),
                span,
            )?;
        }
        Ok(Some(condition))
    }

    /// `break` disables the innermost loop's break variable
    fn lower_break(&mut self, span: Span) -> Result<(), CompileError> {
        if !self.in_loop() {
            return Err(CompileError::new(ErrorKind::BreakOutsideLoop, span));
        }
        let Some(break_var) = self.current_break_var().cloned() else {
            return Err(CompileError::new(ErrorKind::BreakOutsideLoop, span));
        };
        self.set_var(&break_var, &Value::Literal(Literal::int(0)), span)
    }

    fn lower_return(&mut self, value: Option<&Expr>, span: Span) -> Result<(), CompileError> {
        let Some(func) = self.current_function().cloned() else {
            return Err(CompileError::new(ErrorKind::ReturnOutsideFunction, span));
        };
        let Some(break_flag) = self.current_break_flag().cloned() else {
            return Err(CompileError::new(ErrorKind::ReturnOutsideFunction, span));
        };
        let return_slot = self
            .function_info(&func)
            .and_then(|info| info.return_slot.clone());

        match (return_slot, value) {
            (Some(slot), Some(expr)) => {
                let value = self.lower_expr(expr, ExprUse::Value)?;
                let value = self.require_value(value, expr.span())?;
                let expected = self.lookup_type(&slot, span)?;
                let given = self.value_type(&value, expr.span())?;
                self.check_types(expected, given, expr.span())?;
                self.set_var(&slot, &value, span)?;
                self.add_cmd(
                    format!("scoreboard players set {} {} 1", FAKE_PLAYER, break_flag),
                    span,
                )?;
                self.release(&value);
                Ok(())
            }
            (Some(_), None) => Err(CompileError::new(ErrorKind::NonVoidMissingReturn, span)),
            (None, Some(_)) => Err(CompileError::new(ErrorKind::VoidReturnsValue, span)),
            (None, None) => self.add_cmd(
                format!("scoreboard players set {} {} 1", FAKE_PLAYER, break_flag),
                span,
            ),
        }
    }

    /// `print(selector, colour, args...)` lowers to one `tellraw`
    fn lower_print(&mut self, args: &[Expr], span: Span) -> Result<(), CompileError> {
        if args.len() < 3 {
            return Err(CompileError::new(
                ErrorKind::PrintArity { given: args.len() },
                span,
            ));
        }
        let selector = self.lower_expr(&args[0], ExprUse::Value)?;
        let selector = self.require_value(selector, args[0].span())?;
        if !self.is_compile_time(&selector)
            || self.value_type(&selector, args[0].span())? != Type::CharArray
        {
            return Err(CompileError::new(
                ErrorKind::PrintArgType { position: "first" },
                args[0].span(),
            ));
        }
        let colour = self.lower_expr(&args[1], ExprUse::Value)?;
        let colour = self.require_value(colour, args[1].span())?;
        if !self.is_compile_time(&colour)
            || self.value_type(&colour, args[1].span())? != Type::CharArray
        {
            return Err(CompileError::new(
                ErrorKind::PrintArgType { position: "second" },
                args[1].span(),
            ));
        }

        let selector_lit = self.const_literal(&selector, args[0].span())?;
        let selector_text = self.render_text(&selector_lit);
        let colour_lit = self.const_literal(&colour, args[1].span())?;
        let colour_field = format!("\"color\":\"{}\"", self.render_text(&colour_lit));

        let mut components = Vec::new();
        for arg in &args[2..] {
            let value = self.lower_expr(arg, ExprUse::Value)?;
            let value = self.require_value(value, arg.span())?;
            if self.is_compile_time(&value) {
                let lit = self.const_literal(&value, arg.span())?;
                components.push(format!(
                    "{{\"text\":\"{}\", {}}}",
                    escape_json(&self.render_text(&lit)),
                    colour_field
                ));
            } else if let Value::Register(reg) = &value {
                // Only scores can be interpolated at runtime
                if self.value_type(&value, arg.span())? == Type::Int {
                    components.push(format!(
                        "{{\"score\":{{\"name\":\"{}\",\"objective\":\"{}\"}}}}",
                        FAKE_PLAYER, reg
                    ));
                }
                let reg = reg.clone();
                self.mark_unused(&reg);
            }
        }
        self.add_cmd(
            format!("tellraw {} [{}]", selector_text, components.join(",")),
            span,
        )
    }
}

/// Escape text for embedding in a JSON string literal
fn escape_json(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
