//! JavaScript backend.
//!
//! Walks a [`Program`] and produces the body of the unit wrapper function
//! (see [`crate::compiler`]), collecting the dependency declarations it
//! meets on the way. Every Ruby method call becomes a dispatch through a
//! `$`-prefixed property; constants are looked up through the runtime's
//! scope chain; truthiness is decided by `Opal.truthy`.

use std::collections::HashSet;

use crate::ast::{
    Block, Call, ConstBase, Expr, Params, Program, RescueClause, StrPart, Target, WhenClause,
};
use crate::builtins::{BuiltinKind, builtin_for_call};
use crate::error::CoreError;
use crate::requires::{EdgeKind, RequireDecl, classify};

type GenResult<T> = Result<T, CoreError>;

/// Output of [`generate`]: wrapper body lines plus the unit's declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub lines: Vec<String>,
    pub declarations: Vec<RequireDecl>,
}

/// Generate the wrapper body for one parsed unit.
pub fn generate(program: &Program, file: &str) -> Result<GeneratedUnit, CoreError> {
    let mut generator = JsGenerator {
        file,
        has_end_data: program.end_data.is_some(),
        scopes: Vec::new(),
        indent: 0,
        declarations: Vec::new(),
    };

    let (body, scope) = generator.function(Scope::new(ScopeKind::Top), |g| {
        g.body(&program.body, true)
    })?;

    let mut setup = Vec::new();
    if let Some(data) = &program.end_data {
        setup.push(line_at(1, "var $__END__ = Opal.Object.$new();"));
        setup.push(line_at(
            1,
            format!("$__END__.$read = function() {{ return {}; }};", js_string(data)),
        ));
    }
    let vars = vec![
        "self = Opal.top".to_string(),
        "$scope = Opal".to_string(),
        "nil = Opal.nil".to_string(),
    ];
    let lines = generator.assemble(&scope, vars, setup, body);

    Ok(GeneratedUnit {
        lines,
        declarations: generator.declarations,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Top,
    Class,
    Module,
    SClass,
    Def,
    Block,
    /// Function wrapped around a statement used as a value.
    Iife,
}

/// One JavaScript function being generated.
#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    /// Ruby locals owned by this function, declared with `var`.
    locals: Vec<String>,
    params: HashSet<String>,
    temps: usize,
    loop_depth: usize,
    uses_iter: bool,
    catches_return: bool,
    /// Def only.
    method: Option<MethodInfo>,
}

#[derive(Debug, Clone)]
struct MethodInfo {
    name: String,
    function_name: String,
    /// Arguments forwarded by a bare `super`.
    forward_args: String,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            locals: Vec::new(),
            params: HashSet::new(),
            temps: 0,
            loop_depth: 0,
            uses_iter: false,
            catches_return: false,
            method: None,
        }
    }

    fn with_params(kind: ScopeKind, params: &Params) -> Self {
        let mut scope = Scope::new(kind);
        scope.params.extend(params.required.iter().cloned());
        scope
            .params
            .extend(params.optional.iter().map(|(name, _)| name.clone()));
        scope
    }

    fn sees_outer_locals(&self) -> bool {
        matches!(self.kind, ScopeKind::Block | ScopeKind::Iife)
    }
}

struct JsGenerator<'a> {
    file: &'a str,
    has_end_data: bool,
    scopes: Vec<Scope>,
    indent: usize,
    declarations: Vec<RequireDecl>,
}

impl<'a> JsGenerator<'a> {
    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn body(&mut self, body: &[Expr], ret: bool) -> GenResult<Vec<String>> {
        if body.is_empty() {
            return Ok(if ret {
                vec![self.line("return nil;")]
            } else {
                Vec::new()
            });
        }
        let mut lines = Vec::new();
        let last = body.len() - 1;
        for (idx, expr) in body.iter().enumerate() {
            lines.extend(self.stmt(expr, ret && idx == last)?);
        }
        Ok(lines)
    }

    /// Compile `expr` as a statement; with `ret` its value is returned.
    fn stmt(&mut self, expr: &Expr, ret: bool) -> GenResult<Vec<String>> {
        match expr {
            Expr::If {
                cond,
                then_body,
                else_body,
            } => self.if_stmt(cond, then_body, else_body, ret),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.if_stmt(
                cond,
                std::slice::from_ref(&**then_expr),
                std::slice::from_ref(&**else_expr),
                ret,
            ),
            Expr::While {
                cond,
                body,
                until,
                do_while,
            } => {
                let mut lines = self.while_stmt(cond, body, *until, *do_while)?;
                if ret {
                    lines.push(self.line("return nil;"));
                }
                Ok(lines)
            }
            Expr::Case {
                subject,
                whens,
                else_body,
            } => self.case_stmt(subject.as_deref(), whens, else_body.as_deref(), ret),
            Expr::Begin {
                body,
                rescues,
                else_body,
                ensure,
            } => self.begin_stmt(body, rescues, else_body.as_deref(), ensure.as_deref(), ret),
            Expr::Seq(body) => self.body(body, ret),
            Expr::Return(value) => {
                let value = self.optional_value(value.as_deref())?;
                let text = if self.return_crosses_function() {
                    format!("Opal.ret({value});")
                } else {
                    format!("return {value};")
                };
                Ok(vec![self.line(text)])
            }
            Expr::Break(value) => {
                let text = self.jump(value.as_deref(), "break")?;
                Ok(vec![self.line(text)])
            }
            Expr::Next(value) => {
                let text = self.jump(value.as_deref(), "next")?;
                Ok(vec![self.line(text)])
            }
            Expr::And(left, right) if !ret => {
                let cond = self.cond(left)?;
                self.guarded(cond, right)
            }
            Expr::Or(left, right) if !ret => {
                let cond = self.cond(left)?;
                self.guarded(format!("!{cond}"), right)
            }
            Expr::XStr(parts) => {
                let text = self.xstr_text(parts)?;
                let trimmed = text.trim();
                if ret && is_js_statement(trimmed) {
                    let text = if trimmed.ends_with(';') || trimmed.ends_with('}') {
                        text
                    } else {
                        format!("{text};")
                    };
                    return Ok(vec![self.line(text), self.line("return nil;")]);
                }
                let line = if ret {
                    if trimmed.contains("return") || trimmed.contains(';') {
                        text
                    } else {
                        format!("return ({text});")
                    }
                } else if trimmed.ends_with(';') || trimmed.ends_with('}') {
                    text
                } else {
                    format!("{text};")
                };
                Ok(vec![self.line(line)])
            }
            Expr::Call(call) if is_builtin(call, BuiltinKind::Debugger) => {
                let mut lines = vec![self.line("debugger;")];
                if ret {
                    lines.push(self.line("return nil;"));
                }
                Ok(lines)
            }
            _ => {
                let js = self.expr(expr)?;
                let text = if ret {
                    format!("return {js};")
                } else {
                    format!("{js};")
                };
                Ok(vec![self.line(text)])
            }
        }
    }

    fn guarded(&mut self, cond: String, body: &Expr) -> GenResult<Vec<String>> {
        let mut lines = vec![self.line(format!("if ({cond}) {{"))];
        lines.extend(self.nested(|g| g.stmt(body, false))?);
        lines.push(self.line("}"));
        Ok(lines)
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then_body: &[Expr],
        else_body: &[Expr],
        ret: bool,
    ) -> GenResult<Vec<String>> {
        let cond = self.cond(cond)?;
        let mut lines = vec![self.line(format!("if ({cond}) {{"))];
        lines.extend(self.nested(|g| g.body(then_body, ret))?);
        if ret || !else_body.is_empty() {
            lines.push(self.line("} else {"));
            lines.extend(self.nested(|g| g.body(else_body, ret))?);
        }
        lines.push(self.line("}"));
        Ok(lines)
    }

    fn while_stmt(
        &mut self,
        cond: &Expr,
        body: &[Expr],
        until: bool,
        do_while: bool,
    ) -> GenResult<Vec<String>> {
        let mut cond = self.cond(cond)?;
        if until {
            cond = format!("!{cond}");
        }
        self.current().loop_depth += 1;
        let inner = self.nested(|g| g.body(body, false));
        self.current().loop_depth -= 1;

        let mut lines = Vec::new();
        if do_while {
            lines.push(self.line("do {"));
            lines.extend(inner?);
            lines.push(self.line(format!("}} while ({cond});")));
        } else {
            lines.push(self.line(format!("while ({cond}) {{")));
            lines.extend(inner?);
            lines.push(self.line("}"));
        }
        Ok(lines)
    }

    fn case_stmt(
        &mut self,
        subject: Option<&Expr>,
        whens: &[WhenClause],
        else_body: Option<&[Expr]>,
        ret: bool,
    ) -> GenResult<Vec<String>> {
        let mut lines = Vec::new();
        let subject = match subject {
            Some(subject) => {
                let value = self.expr(subject)?;
                let temp = self.temp();
                lines.push(self.line(format!("{temp} = {value};")));
                Some(temp)
            }
            None => None,
        };

        for (idx, when) in whens.iter().enumerate() {
            let mut tests = Vec::new();
            for value in &when.values {
                tests.push(self.when_test(value, subject.as_deref())?);
            }
            let keyword = if idx == 0 { "if" } else { "} else if" };
            lines.push(self.line(format!("{keyword} ({}) {{", tests.join(" || "))));
            lines.extend(self.nested(|g| g.body(&when.body, ret))?);
        }

        match else_body {
            Some(body) => {
                lines.push(self.line("} else {"));
                lines.extend(self.nested(|g| g.body(body, ret))?);
            }
            None if ret => {
                lines.push(self.line("} else {"));
                lines.extend(self.nested(|g| g.body(&[], true))?);
            }
            None => {}
        }
        lines.push(self.line("}"));
        Ok(lines)
    }

    fn when_test(&mut self, value: &Expr, subject: Option<&str>) -> GenResult<String> {
        match (value, subject) {
            (Expr::Splat(list), Some(subject)) => {
                let list = self.expr(list)?;
                Ok(format!("Opal.truthy(Opal.splat_eqq({list}, {subject}))"))
            }
            (value, Some(subject)) => {
                let pattern = self.recv(value)?;
                Ok(format!("Opal.truthy({pattern}[\"$===\"]({subject}))"))
            }
            (Expr::Splat(list), None) => self.cond(list),
            (value, None) => self.cond(value),
        }
    }

    fn begin_stmt(
        &mut self,
        body: &[Expr],
        rescues: &[RescueClause],
        else_body: Option<&[Expr]>,
        ensure: Option<&[Expr]>,
        ret: bool,
    ) -> GenResult<Vec<String>> {
        let protected = |g: &mut Self| -> GenResult<Vec<String>> {
            match else_body {
                Some(else_body) => {
                    let mut lines = g.body(body, false)?;
                    lines.extend(g.body(else_body, ret)?);
                    Ok(lines)
                }
                None => g.body(body, ret),
            }
        };
        if rescues.is_empty() && ensure.is_none() {
            return protected(self);
        }

        let mut lines = vec![self.line("try {")];
        lines.extend(self.nested(protected)?);
        if !rescues.is_empty() {
            lines.push(self.line("} catch ($err) {"));
            lines.extend(self.nested(|g| g.rescue_chain(rescues, ret))?);
        }
        if let Some(ensure) = ensure {
            lines.push(self.line("} finally {"));
            lines.extend(self.nested(|g| g.body(ensure, false))?);
        }
        lines.push(self.line("}"));
        Ok(lines)
    }

    fn rescue_chain(&mut self, rescues: &[RescueClause], ret: bool) -> GenResult<Vec<String>> {
        let mut lines = Vec::new();
        for (idx, rescue) in rescues.iter().enumerate() {
            let classes = if rescue.classes.is_empty() {
                vec!["$scope.get(\"StandardError\")".to_string()]
            } else {
                let mut classes = Vec::new();
                for class in &rescue.classes {
                    classes.push(self.expr(class)?);
                }
                classes
            };
            let keyword = if idx == 0 { "if" } else { "} else if" };
            lines.push(self.line(format!(
                "{keyword} (Opal.rescue($err, [{}])) {{",
                classes.join(", ")
            )));
            lines.extend(self.nested(|g| {
                let mut lines = Vec::new();
                if let Some(var) = &rescue.var {
                    g.declare_local(var);
                    lines.push(g.line(format!("{} = $err;", js_local(var))));
                }
                lines.extend(g.body(&rescue.body, ret)?);
                Ok(lines)
            })?);
        }
        lines.push(self.line("} else {"));
        lines.extend(self.nested(|g| Ok(vec![g.line("throw $err;")]))?);
        lines.push(self.line("}"));
        Ok(lines)
    }

    /// `break`/`next` as a statement.
    fn jump(&mut self, value: Option<&Expr>, keyword: &str) -> GenResult<String> {
        if self.current().loop_depth > 0 {
            return Ok(if keyword == "break" { "break;" } else { "continue;" }.to_string());
        }
        if self.current().kind != ScopeKind::Block {
            return Err(self.unsupported(format!("`{keyword}` used outside of a loop or block")));
        }
        let value = self.optional_value(value)?;
        Ok(if keyword == "break" {
            format!("return Opal.brk({value});")
        } else {
            format!("return {value};")
        })
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> GenResult<String> {
        let js = match expr {
            Expr::Nil => "nil".to_string(),
            Expr::True => "true".to_string(),
            Expr::False => "false".to_string(),
            Expr::SelfRef => "self".to_string(),
            Expr::Int(raw) => int_literal(raw)
                .ok_or_else(|| self.unsupported(format!("integer literal {raw} is out of range")))?,
            Expr::Float(raw) => float_literal(raw),
            Expr::Str(text) | Expr::Sym(text) => js_string(text),
            Expr::DStr(parts) | Expr::DSym(parts) => self.dstr(parts)?,
            Expr::XStr(parts) => format!("({})", self.xstr_text(parts)?),
            Expr::Array(items) => self.arg_array(items)?,
            Expr::Hash(pairs) => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for (key, value) in pairs {
                    keys.push(self.expr(key)?);
                    values.push(self.expr(value)?);
                }
                format!("Opal.hash([{}], [{}])", keys.join(", "), values.join(", "))
            }
            Expr::Range {
                start,
                end,
                exclusive,
            } => {
                let start = self.expr(start)?;
                let end = self.expr(end)?;
                format!("Opal.range({start}, {end}, {exclusive})")
            }
            Expr::LVar(name) => js_local(name),
            Expr::IVar(name) => {
                let prop = ivar_prop(name);
                format!("(self.{prop} == null ? nil : self.{prop})")
            }
            Expr::GVar(name) => {
                let global = gvar_ref(name);
                format!("({global} == null ? nil : {global})")
            }
            Expr::Const { base, name } => self.const_ref(base, name)?,
            Expr::Asgn { target, value } => self.assign(target, value)?,
            Expr::OpAsgn { target, op, value } => self.op_assign(target, op, value)?,
            Expr::Call(call) => self.call(call)?,
            Expr::Splat(inner) => format!("Opal.to_a({})", self.expr(inner)?),
            Expr::Not(inner) => format!("!{}", self.cond(inner)?),
            Expr::And(left, right) => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                let temp = self.temp();
                format!("(Opal.truthy({temp} = {left}) ? {right} : {temp})")
            }
            Expr::Or(left, right) => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                let temp = self.temp();
                format!("(Opal.truthy({temp} = {left}) ? {temp} : {right})")
            }
            Expr::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.cond(cond)?;
                let then_js = self.seq_expr(then_body)?;
                let else_js = self.seq_expr(else_body)?;
                format!("({cond} ? {then_js} : {else_js})")
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.cond(cond)?;
                let then_js = self.expr(then_expr)?;
                let else_js = self.expr(else_expr)?;
                format!("({cond} ? {then_js} : {else_js})")
            }
            Expr::Seq(body) => self.seq_expr(body)?,
            Expr::While { .. } | Expr::Case { .. } | Expr::Begin { .. } => self.iife(expr)?,
            Expr::Return(value) => {
                let value = self.optional_value(value.as_deref())?;
                self.mark_return_target();
                format!("Opal.ret({value})")
            }
            Expr::Break(value) if self.in_block_body() => {
                format!("Opal.brk({})", self.optional_value(value.as_deref())?)
            }
            Expr::Break(_) | Expr::Next(_) => {
                return Err(self.unsupported("`break` or `next` used as a value"));
            }
            Expr::Yield(args) => {
                let iter = self.iter_ref();
                let args = self.arg_array(args)?;
                format!("Opal.yieldX({iter}, {args})")
            }
            Expr::Super {
                args,
                block,
                block_arg,
            } => self.super_call(args.as_deref(), block.as_deref(), block_arg.as_deref())?,
            Expr::Def {
                singleton,
                name,
                params,
                body,
            } => self.def(singleton.as_deref(), name, params, body)?,
            Expr::Class {
                base,
                name,
                superclass,
                body,
            } => self.class(base, name, superclass.as_deref(), body)?,
            Expr::Module { base, name, body } => self.module(base, name, body)?,
            Expr::SClass { target, body } => self.singleton_class(target, body)?,
            Expr::Alias { new_name, old_name } => format!(
                "Opal.alias(self, {}, {})",
                js_string(&format!("${new_name}")),
                js_string(&format!("${old_name}"))
            ),
            Expr::Undef(names) => {
                let calls: Vec<_> = names
                    .iter()
                    .map(|name| format!("Opal.udef(self, {})", js_string(&format!("${name}"))))
                    .collect();
                match calls.len() {
                    1 => calls.join(""),
                    _ => format!("({})", calls.join(", ")),
                }
            }
        };
        Ok(js)
    }

    /// Compile `expr` for use as a receiver, parenthesised where needed.
    fn recv(&mut self, expr: &Expr) -> GenResult<String> {
        let js = self.expr(expr)?;
        let bare = matches!(
            expr,
            Expr::Nil
                | Expr::True
                | Expr::False
                | Expr::SelfRef
                | Expr::Str(_)
                | Expr::Sym(_)
                | Expr::DStr(_)
                | Expr::DSym(_)
                | Expr::XStr(_)
                | Expr::Array(_)
                | Expr::Hash(_)
                | Expr::Range { .. }
                | Expr::LVar(_)
                | Expr::IVar(_)
                | Expr::GVar(_)
                | Expr::Const { .. }
                | Expr::Call(_)
                | Expr::And(..)
                | Expr::Or(..)
                | Expr::If { .. }
                | Expr::Ternary { .. }
                | Expr::Yield(_)
                | Expr::Super { .. }
                | Expr::Class { .. }
                | Expr::Module { .. }
                | Expr::SClass { .. }
        );
        Ok(if bare { js } else { format!("({js})") })
    }

    /// Boolean JavaScript expression for a condition. The result is always
    /// safe to prefix with `!`.
    fn cond(&mut self, expr: &Expr) -> GenResult<String> {
        match expr {
            Expr::And(left, right) => {
                let left = self.cond(left)?;
                let right = self.cond(right)?;
                Ok(format!("({left} && {right})"))
            }
            Expr::Or(left, right) => {
                let left = self.cond(left)?;
                let right = self.cond(right)?;
                Ok(format!("({left} || {right})"))
            }
            Expr::Not(inner) => Ok(format!("!{}", self.cond(inner)?)),
            Expr::True => Ok("true".to_string()),
            Expr::False | Expr::Nil => Ok("false".to_string()),
            Expr::Call(call) if is_builtin(call, BuiltinKind::BlockGiven) => Ok(self.block_given()),
            other => Ok(format!("Opal.truthy({})", self.expr(other)?)),
        }
    }

    fn seq_expr(&mut self, body: &[Expr]) -> GenResult<String> {
        match body {
            [] => Ok("nil".to_string()),
            [single] => self.expr(single),
            many => {
                let mut parts = Vec::new();
                for expr in many {
                    parts.push(self.expr(expr)?);
                }
                Ok(format!("({})", parts.join(", ")))
            }
        }
    }

    fn optional_value(&mut self, value: Option<&Expr>) -> GenResult<String> {
        match value {
            Some(value) => self.expr(value),
            None => Ok("nil".to_string()),
        }
    }

    /// A statement-only construct used as a value.
    fn iife(&mut self, expr: &Expr) -> GenResult<String> {
        let (body, scope) = self.function(Scope::new(ScopeKind::Iife), |g| g.stmt(expr, true))?;
        let lines = self.assemble(&scope, Vec::new(), Vec::new(), body);
        Ok(format!("(function() {{\n{}\n{}}})()", lines.join("\n"), self.pad()))
    }

    fn dstr(&mut self, parts: &[StrPart]) -> GenResult<String> {
        let mut pieces = Vec::new();
        for part in parts {
            match part {
                StrPart::Lit(text) => pieces.push(js_string(text)),
                StrPart::Code(body) => {
                    let value = self.seq_expr(body)?;
                    pieces.push(format!("({value}).$to_s()"));
                }
            }
        }
        Ok(match pieces.len() {
            0 => "\"\"".to_string(),
            _ => format!("({})", pieces.join(" + ")),
        })
    }

    fn xstr_text(&mut self, parts: &[StrPart]) -> GenResult<String> {
        let mut text = String::new();
        for part in parts {
            match part {
                StrPart::Lit(raw) => text.push_str(raw),
                StrPart::Code(body) => text.push_str(&self.seq_expr(body)?),
            }
        }
        Ok(text)
    }

    /// Array of argument values, expanding splats.
    fn arg_array(&mut self, items: &[Expr]) -> GenResult<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut plain: Vec<String> = Vec::new();
        let mut has_splat = false;
        for item in items {
            if let Expr::Splat(inner) = item {
                has_splat = true;
                if !plain.is_empty() {
                    chunks.push(format!("[{}]", plain.join(", ")));
                    plain.clear();
                }
                chunks.push(format!("Opal.to_a({})", self.expr(inner)?));
            } else {
                plain.push(self.expr(item)?);
            }
        }
        if !has_splat {
            return Ok(format!("[{}]", plain.join(", ")));
        }
        if !plain.is_empty() {
            chunks.push(format!("[{}]", plain.join(", ")));
        }
        let first = chunks.remove(0);
        Ok(if chunks.is_empty() {
            first
        } else {
            format!("{first}.concat({})", chunks.join(", "))
        })
    }

    fn const_ref(&mut self, base: &ConstBase, name: &str) -> GenResult<String> {
        Ok(match base {
            ConstBase::Lexical if name == "DATA" && self.has_end_data => "$__END__".to_string(),
            ConstBase::Lexical => format!("$scope.get({})", js_string(name)),
            ConstBase::Top => format!("Opal.Object.$$scope.get({})", js_string(name)),
            ConstBase::Scoped(scope) => {
                let scope = self.expr(scope)?;
                format!("Opal.const_get_qualified({scope}, {})", js_string(name))
            }
        })
    }

    fn const_scope(&mut self, base: &ConstBase) -> GenResult<String> {
        Ok(match base {
            ConstBase::Lexical => "$scope".to_string(),
            ConstBase::Top => "Opal.Object.$$scope".to_string(),
            ConstBase::Scoped(scope) => format!("{}.$$scope", self.recv(scope)?),
        })
    }

    // -----------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------

    fn assign(&mut self, target: &Target, value: &Expr) -> GenResult<String> {
        if let Target::LVar(name) = target {
            self.declare_local(name);
        }
        let (head, tail, setup) = self.write_parts(target)?;
        let value = self.expr(value)?;
        Ok(with_setup(setup, format!("{head}{value}{tail}")))
    }

    fn op_assign(&mut self, target: &Target, op: &str, value: &Expr) -> GenResult<String> {
        if let Target::LVar(name) = target {
            self.declare_local(name);
        }
        let (head, tail, setup) = self.write_parts(target)?;
        let read = self.read_target(target, &setup)?;
        let value = self.expr(value)?;
        let result = match op {
            "||" => format!("(Opal.truthy({read}) ? {read} : {head}{value}{tail})"),
            "&&" => format!("(Opal.truthy({read}) ? {head}{value}{tail} : {read})"),
            _ => format!("{head}{read}{}({value}){tail}", method_access(op)),
        };
        Ok(with_setup(setup, result))
    }

    /// Text before and after the assigned value, plus temporaries that
    /// must be assigned first (receiver and index arguments).
    fn write_parts(&mut self, target: &Target) -> GenResult<(String, String, Vec<(String, String)>)> {
        let parts = match target {
            Target::LVar(name) => (format!("{} = ", js_local(name)), String::new(), Vec::new()),
            Target::IVar(name) => (format!("self.{} = ", ivar_prop(name)), String::new(), Vec::new()),
            Target::GVar(name) => (format!("{} = ", gvar_ref(name)), String::new(), Vec::new()),
            Target::Const { base, name } => {
                let scope = self.const_scope(base)?;
                (
                    format!("Opal.cdecl({scope}, {}, ", js_string(name)),
                    ")".to_string(),
                    Vec::new(),
                )
            }
            Target::Attr { recv, name } => {
                let recv_js = self.recv(recv)?;
                let temp = self.temp();
                (
                    format!("{temp}{}(", method_access(&format!("{name}="))),
                    ")".to_string(),
                    vec![(temp, recv_js)],
                )
            }
            Target::Index { recv, args } => {
                let recv_js = self.recv(recv)?;
                let temp = self.temp();
                let mut setup = vec![(temp.clone(), recv_js)];
                let mut arg_temps = Vec::new();
                for arg in args {
                    if matches!(arg, Expr::Splat(_)) {
                        return Err(self.unsupported("splat in an index assignment"));
                    }
                    let value = self.expr(arg)?;
                    let arg_temp = self.temp();
                    setup.push((arg_temp.clone(), value));
                    arg_temps.push(arg_temp);
                }
                let mut head = format!("{temp}[\"$[]=\"](");
                for arg in &arg_temps {
                    head.push_str(arg);
                    head.push_str(", ");
                }
                (head, ")".to_string(), setup)
            }
        };
        Ok(parts)
    }

    fn read_target(&mut self, target: &Target, setup: &[(String, String)]) -> GenResult<String> {
        Ok(match target {
            Target::LVar(name) => js_local(name),
            Target::IVar(name) => {
                let prop = ivar_prop(name);
                format!("(self.{prop} == null ? nil : self.{prop})")
            }
            Target::GVar(name) => {
                let global = gvar_ref(name);
                format!("({global} == null ? nil : {global})")
            }
            Target::Const { base, name } => self.const_ref(base, name)?,
            Target::Attr { name, .. } => {
                let recv = setup.first().map(|(temp, _)| temp.as_str()).unwrap_or("self");
                format!("{recv}{}()", method_access(name))
            }
            Target::Index { .. } => {
                let temps: Vec<&str> = setup.iter().map(|(temp, _)| temp.as_str()).collect();
                match temps.split_first() {
                    Some((recv, args)) => format!("{recv}[\"$[]\"]({})", args.join(", ")),
                    None => "nil".to_string(),
                }
            }
        })
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    fn call(&mut self, call: &Call) -> GenResult<String> {
        if let Some(builtin) = builtin_for_call(call) {
            match builtin.kind {
                BuiltinKind::Debugger => {
                    return Ok("(function() { debugger; return nil; })()".to_string());
                }
                BuiltinKind::BlockGiven => return Ok(self.block_given()),
                _ if builtin.declares_dependency() => {
                    let in_class = self.in_class_body();
                    if let Some(decl) = classify(call, self.file, in_class) {
                        let compiled = match decl.kind {
                            EdgeKind::Direct => {
                                Some(format!("self.$require({})", js_string(&decl.name)))
                            }
                            EdgeKind::Tree => {
                                Some(format!("self.$require_tree({})", js_string(&decl.name)))
                            }
                            EdgeKind::Autoload => None,
                        };
                        self.record(decl);
                        if let Some(compiled) = compiled {
                            return Ok(compiled);
                        }
                    }
                }
                _ => {}
            }
        }

        let recv = match &call.recv {
            Some(recv) => self.recv(recv)?,
            None => "self".to_string(),
        };
        let block = match (&call.block, &call.block_arg) {
            (Some(block), _) => Some(self.block(block)?),
            (None, Some(arg)) => Some(self.expr(arg)?),
            (None, None) => None,
        };
        self.send(recv, &call.name, &call.args, block)
    }

    fn send(
        &mut self,
        recv: String,
        name: &str,
        args: &[Expr],
        block: Option<String>,
    ) -> GenResult<String> {
        let has_splat = args.iter().any(|arg| matches!(arg, Expr::Splat(_)));
        if has_splat || block.is_some() {
            let args = self.arg_array(args)?;
            let block = block.unwrap_or_else(|| "nil".to_string());
            return Ok(format!(
                "Opal.send({recv}, {}, {args}, {block})",
                js_string(&format!("${name}"))
            ));
        }
        let mut values = Vec::new();
        for arg in args {
            values.push(self.expr(arg)?);
        }
        Ok(format!("{recv}{}({})", method_access(name), values.join(", ")))
    }

    fn block(&mut self, block: &Block) -> GenResult<String> {
        let scope = Scope::with_params(ScopeKind::Block, &block.params);
        let (body, scope) = self.function(scope, |g| {
            let mut lines = Vec::new();
            for name in &block.params.required {
                let local = js_local(name);
                lines.push(g.line(format!("if ({local} == null) {local} = nil;")));
            }
            lines.extend(g.param_setup(&block.params)?);
            if let Some(name) = &block.params.block {
                g.declare_local(name);
            }
            lines.extend(g.body(&block.body, true)?);
            Ok(lines)
        })?;
        let lines = self.assemble(&scope, Vec::new(), Vec::new(), body);
        Ok(format!(
            "function({}) {{\n{}\n{}}}",
            param_list(&block.params),
            lines.join("\n"),
            self.pad()
        ))
    }

    /// Optional-parameter defaults and the rest parameter.
    fn param_setup(&mut self, params: &Params) -> GenResult<Vec<String>> {
        let mut lines = Vec::new();
        for (name, default) in &params.optional {
            let local = js_local(name);
            let value = self.expr(default)?;
            lines.push(self.line(format!("if ({local} == null) {{ {local} = {value}; }}")));
        }
        if let Some(rest) = &params.rest {
            self.declare_local(rest);
            let skip = params.required.len() + params.optional.len();
            lines.push(self.line(format!(
                "{} = Array.prototype.slice.call(arguments, {skip});",
                js_local(rest)
            )));
        }
        Ok(lines)
    }

    fn super_call(
        &mut self,
        args: Option<&[Expr]>,
        block: Option<&Block>,
        block_arg: Option<&Expr>,
    ) -> GenResult<String> {
        let Some(method) = self.enclosing_method() else {
            return Err(self.unsupported("`super` outside of a method body"));
        };
        let args = match args {
            Some(args) => self.arg_array(args)?,
            None => method.forward_args.clone(),
        };
        let block = match (block, block_arg) {
            (Some(block), _) => self.block(block)?,
            (None, Some(arg)) => self.expr(arg)?,
            (None, None) => self.iter_ref(),
        };
        Ok(format!(
            "Opal.zuper(self, {}, {}, {args}, {block})",
            js_string(&format!("${}", method.name)),
            method.function_name
        ))
    }

    fn block_given(&mut self) -> String {
        match self.def_index() {
            Some(idx) => {
                self.scopes[idx].uses_iter = true;
                "($iter !== nil)".to_string()
            }
            None => "false".to_string(),
        }
    }

    fn iter_ref(&mut self) -> String {
        match self.def_index() {
            Some(idx) => {
                self.scopes[idx].uses_iter = true;
                "$iter".to_string()
            }
            None => "nil".to_string(),
        }
    }

    // -----------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------

    fn def(
        &mut self,
        singleton: Option<&Expr>,
        name: &str,
        params: &Params,
        body: &[Expr],
    ) -> GenResult<String> {
        let target = match singleton {
            Some(target) => Some(self.expr(target)?),
            None => None,
        };
        let function_name = format!("$${}", mangle(name));

        let mut scope = Scope::with_params(ScopeKind::Def, params);
        scope.method = Some(MethodInfo {
            name: name.to_string(),
            function_name: function_name.clone(),
            forward_args: forward_args(params),
        });
        let (body, scope) = self.function(scope, |g| {
            let mut lines = g.param_setup(params)?;
            if let Some(block) = &params.block {
                g.declare_local(block);
                lines.push(g.line(format!("{} = $iter;", js_local(block))));
            }
            lines.extend(g.body(body, true)?);
            Ok(lines)
        })?;

        let mut vars = vec!["self = this".to_string()];
        let mut setup = Vec::new();
        if scope.uses_iter || params.block.is_some() {
            vars.push(format!("$iter = {function_name}.$$p || nil"));
            setup.push(line_at(self.indent + 1, format!("{function_name}.$$p = null;")));
        }
        let lines = self.assemble(&scope, vars, setup, body);
        let function = format!(
            "function {function_name}({}) {{\n{}\n{}}}",
            param_list(params),
            lines.join("\n"),
            self.pad()
        );
        let method = js_string(&format!("${name}"));
        Ok(match target {
            Some(target) => format!("Opal.defs({target}, {method}, {function})"),
            None => format!("Opal.defn(self, {method}, {function})"),
        })
    }

    fn class(
        &mut self,
        base: &ConstBase,
        name: &str,
        superclass: Option<&Expr>,
        body: &[Expr],
    ) -> GenResult<String> {
        let base = self.namespace(base)?;
        let superclass = match superclass {
            Some(superclass) => self.expr(superclass)?,
            None => "null".to_string(),
        };
        let constructor = format!("${name}");
        let (body, scope) = self.function(Scope::new(ScopeKind::Class), |g| g.body(body, true))?;
        let vars = vec![
            format!(
                "self = {constructor} = Opal.klass($base, $super, {}, {constructor})",
                js_string(name)
            ),
            "def = self.$$proto".to_string(),
            "$scope = self.$$scope".to_string(),
        ];
        let mut lines = self.assemble(&scope, vars, Vec::new(), body);
        lines.insert(0, line_at(self.indent + 1, format!("function {constructor}(){{}};")));
        Ok(format!(
            "(function($base, $super) {{\n{}\n{}}})({base}, {superclass})",
            lines.join("\n"),
            self.pad()
        ))
    }

    fn module(&mut self, base: &ConstBase, name: &str, body: &[Expr]) -> GenResult<String> {
        let base = self.namespace(base)?;
        let (body, scope) = self.function(Scope::new(ScopeKind::Module), |g| g.body(body, true))?;
        let vars = vec![
            format!("self = Opal.module($base, {})", js_string(name)),
            "def = self.$$proto".to_string(),
            "$scope = self.$$scope".to_string(),
        ];
        let lines = self.assemble(&scope, vars, Vec::new(), body);
        Ok(format!(
            "(function($base) {{\n{}\n{}}})({base})",
            lines.join("\n"),
            self.pad()
        ))
    }

    fn singleton_class(&mut self, target: &Expr, body: &[Expr]) -> GenResult<String> {
        let target = self.expr(target)?;
        let (body, scope) = self.function(Scope::new(ScopeKind::SClass), |g| g.body(body, true))?;
        let vars = vec![
            "def = self.$$proto".to_string(),
            "$scope = self.$$scope".to_string(),
        ];
        let lines = self.assemble(&scope, vars, Vec::new(), body);
        Ok(format!(
            "(function(self) {{\n{}\n{}}})(Opal.get_singleton_class({target}))",
            lines.join("\n"),
            self.pad()
        ))
    }

    /// Object a class or module is defined under.
    fn namespace(&mut self, base: &ConstBase) -> GenResult<String> {
        Ok(match base {
            ConstBase::Lexical => "self".to_string(),
            ConstBase::Top => "Opal.Object".to_string(),
            ConstBase::Scoped(scope) => self.expr(scope)?,
        })
    }

    // -----------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------

    /// Generate the body of a nested function in `scope`.
    fn function<F>(&mut self, scope: Scope, body: F) -> GenResult<(Vec<String>, Scope)>
    where
        F: FnOnce(&mut Self) -> GenResult<Vec<String>>,
    {
        self.scopes.push(scope);
        self.indent += 1;
        let lines = body(self);
        self.indent -= 1;
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| self.unsupported("unbalanced scope stack"))?;
        Ok((lines?, scope))
    }

    /// Prefix a finished function body with its `var` declarations and, if
    /// a block returns through it, the non-local return handler.
    fn assemble(
        &self,
        scope: &Scope,
        mut vars: Vec<String>,
        setup: Vec<String>,
        body: Vec<String>,
    ) -> Vec<String> {
        let inner = self.indent + 1;
        vars.extend(scope.locals.iter().map(|name| format!("{} = nil", js_local(name))));
        vars.extend((1..=scope.temps).map(|idx| format!("$t{idx}")));

        let mut lines = Vec::new();
        if !vars.is_empty() {
            lines.push(line_at(inner, format!("var {};", vars.join(", "))));
        }
        lines.extend(setup);
        if scope.catches_return {
            lines.push(line_at(inner, "try {"));
            lines.extend(body.into_iter().map(|line| format!("  {line}")));
            lines.push(line_at(
                inner,
                "} catch ($returner) { if ($returner === Opal.returner) { return $returner.$v; } throw $returner; }",
            ));
        } else {
            lines.extend(body);
        }
        lines
    }

    fn nested<F>(&mut self, body: F) -> GenResult<Vec<String>>
    where
        F: FnOnce(&mut Self) -> GenResult<Vec<String>>,
    {
        self.indent += 1;
        let lines = body(self);
        self.indent -= 1;
        lines
    }

    fn current(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Directly inside a block, outside any loop.
    fn in_block_body(&self) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.kind == ScopeKind::Block && scope.loop_depth == 0)
    }

    fn temp(&mut self) -> String {
        let scope = self.current();
        scope.temps += 1;
        format!("$t{}", scope.temps)
    }

    fn is_declared(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.params.contains(name) || scope.locals.iter().any(|local| local == name) {
                return true;
            }
            if !scope.sees_outer_locals() {
                break;
            }
        }
        false
    }

    fn declare_local(&mut self, name: &str) {
        if self.is_declared(name) {
            return;
        }
        if let Some(scope) = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.kind != ScopeKind::Iife)
        {
            scope.locals.push(name.to_string());
        }
    }

    fn def_index(&self) -> Option<usize> {
        let idx = self
            .scopes
            .iter()
            .rposition(|scope| !scope.sees_outer_locals())?;
        (self.scopes[idx].kind == ScopeKind::Def).then_some(idx)
    }

    fn enclosing_method(&self) -> Option<MethodInfo> {
        self.def_index()
            .and_then(|idx| self.scopes[idx].method.clone())
    }

    fn in_class_body(&self) -> bool {
        self.scopes
            .iter()
            .rev()
            .find(|scope| !scope.sees_outer_locals())
            .is_some_and(|scope| {
                matches!(scope.kind, ScopeKind::Class | ScopeKind::Module | ScopeKind::SClass)
            })
    }

    /// Whether a `return` here must unwind through a block or wrapper
    /// function. Marks the function it returns from.
    fn return_crosses_function(&mut self) -> bool {
        let crosses = self.current().sees_outer_locals();
        if crosses {
            self.mark_return_target();
        }
        crosses
    }

    fn mark_return_target(&mut self) {
        if let Some(scope) = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| !scope.sees_outer_locals())
        {
            scope.catches_return = true;
        }
    }

    fn record(&mut self, decl: RequireDecl) {
        if !self.declarations.contains(&decl) {
            self.declarations.push(decl);
        }
    }

    fn pad(&self) -> String {
        "  ".repeat(self.indent)
    }

    fn line(&self, text: impl AsRef<str>) -> String {
        line_at(self.indent, text)
    }

    fn unsupported(&self, message: impl Into<String>) -> CoreError {
        CoreError::Unsupported {
            file: self.file.to_string(),
            message: message.into(),
        }
    }
}

fn is_builtin(call: &Call, kind: BuiltinKind) -> bool {
    builtin_for_call(call).is_some_and(|builtin| builtin.kind == kind)
}

fn with_setup(setup: Vec<(String, String)>, result: String) -> String {
    if setup.is_empty() {
        return result;
    }
    let assignments: Vec<_> = setup
        .into_iter()
        .map(|(temp, value)| format!("{temp} = {value}"))
        .collect();
    format!("({}, {result})", assignments.join(", "))
}

fn line_at(indent: usize, text: impl AsRef<str>) -> String {
    format!("{}{}", "  ".repeat(indent), text.as_ref())
}

fn param_list(params: &Params) -> String {
    params
        .required
        .iter()
        .chain(params.optional.iter().map(|(name, _)| name))
        .map(|name| js_local(name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn forward_args(params: &Params) -> String {
    let list = format!("[{}]", param_list(params));
    match &params.rest {
        Some(rest) => format!("{list}.concat({})", js_local(rest)),
        None => list,
    }
}

const JS_RESERVED: &[&str] = &[
    "arguments", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally", "for",
    "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
    "NaN", "Infinity",
];

const PROPERTY_CLASHES: &[&str] = &[
    "constructor", "prototype", "__proto__", "toString", "valueOf", "hasOwnProperty",
];

/// JavaScript name of a Ruby local variable.
pub fn js_local(name: &str) -> String {
    if JS_RESERVED.contains(&name) {
        format!("{name}$")
    } else {
        name.to_string()
    }
}

fn ivar_prop(name: &str) -> String {
    if PROPERTY_CLASHES.contains(&name) {
        format!("{name}$")
    } else {
        name.to_string()
    }
}

fn gvar_ref(name: &str) -> String {
    format!("Opal.gvars[{}]", js_string(name))
}

/// Property access for the method `name`: `.$name` or `["$name?"]`.
pub fn method_access(name: &str) -> String {
    let property = format!("${name}");
    if is_js_identifier(&property) {
        format!(".{property}")
    } else {
        format!("[{}]", js_string(&property))
    }
}

fn is_js_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Identifier-safe spelling of a method name, for function names.
fn mangle(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        let replacement = match ch {
            c if c.is_ascii_alphanumeric() || c == '_' => {
                out.push(c);
                continue;
            }
            '?' => "$p",
            '!' => "$b",
            '=' => "$eq",
            '+' => "$plus",
            '-' => "$minus",
            '*' => "$times",
            '/' => "$div",
            '%' => "$mod",
            '<' => "$lt",
            '>' => "$gt",
            '[' => "$lb",
            ']' => "$rb",
            '~' => "$tilde",
            '&' => "$and",
            '|' => "$or",
            '^' => "$xor",
            '@' => "$at",
            other => {
                out.push_str(&format!("${:x}", other as u32));
                continue;
            }
        };
        out.push_str(replacement);
    }
    out
}

/// Double-quoted JavaScript string literal.
pub fn js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// X-string text that starts with a JavaScript statement keyword and so
/// cannot be wrapped in an expression.
fn is_js_statement(text: &str) -> bool {
    const KEYWORDS: [&str; 10] = [
        "debugger", "throw", "var", "let", "const", "if", "for", "while", "try", "switch",
    ];
    let word_end = text
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '$')
        .unwrap_or(text.len());
    KEYWORDS.contains(&&text[..word_end])
}

/// Decimal form of an integer literal; `None` when it does not fit in 128 bits.
fn int_literal(raw: &str) -> Option<String> {
    let negative = raw.starts_with('-');
    let digits: String = raw
        .trim_start_matches('-')
        .chars()
        .filter(|&c| c != '_')
        .collect();
    let (radix, body) = match digits.get(..2) {
        Some("0x" | "0X") => (16, &digits[2..]),
        Some("0b" | "0B") => (2, &digits[2..]),
        Some("0o" | "0O") => (8, &digits[2..]),
        Some("0d" | "0D") => (10, &digits[2..]),
        _ if digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..]),
        _ => (10, digits.as_str()),
    };
    let value = u128::from_str_radix(body, radix).ok()?;
    Some(if negative {
        format!("-{value}")
    } else {
        value.to_string()
    })
}

fn float_literal(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|&c| c != '_').collect();
    match cleaned.parse::<f64>() {
        Ok(value) => js_number(value),
        Err(_) => cleaned,
    }
}

/// Format a number the way JavaScript's `Number#toString` does.
pub fn js_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{value}");
    }
    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_numbers_like_javascript() {
        assert_eq!(js_number(3.142), "3.142");
        assert_eq!(js_number(1230.0), "1230");
        assert_eq!(js_number(1230000000000.0), "1230000000000");
        assert_eq!(js_number(1e21), "1e+21");
        assert_eq!(js_number(1.5e-7), "1.5e-7");
        assert_eq!(js_number(0.000001), "0.000001");
    }

    #[test]
    fn normalises_float_and_integer_literals() {
        assert_eq!(float_literal("123e1"), "1230");
        assert_eq!(float_literal("123E+10"), "1230000000000");
        assert_eq!(float_literal("1_000.5"), "1000.5");
        assert_eq!(int_literal("0x1f").as_deref(), Some("31"));
        assert_eq!(int_literal("0b101").as_deref(), Some("5"));
        assert_eq!(int_literal("017").as_deref(), Some("15"));
        assert_eq!(int_literal("-1_000").as_deref(), Some("-1000"));
        assert_eq!(int_literal(&"9".repeat(40)), None);
    }

    #[test]
    fn escapes_strings() {
        assert_eq!(js_string("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
        assert_eq!(js_string("\u{1}"), "\"\\u0001\"");
    }

    #[test]
    fn accesses_operator_methods_with_brackets() {
        assert_eq!(method_access("map"), ".$map");
        assert_eq!(method_access("empty?"), "[\"$empty?\"]");
        assert_eq!(method_access("+"), "[\"$+\"]");
    }

    #[test]
    fn mangles_method_names_into_identifiers() {
        assert_eq!(mangle("empty?"), "empty$p");
        assert_eq!(mangle("[]="), "$lb$rb$eq");
        assert!(is_js_identifier(&format!("$${}", mangle("<=>"))));
    }

    #[test]
    fn renames_reserved_locals() {
        assert_eq!(js_local("default"), "default$");
        assert_eq!(js_local("value"), "value");
    }
}
