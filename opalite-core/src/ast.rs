//! Syntax tree for one unit.

/// A parsed unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Expr>,
    /// Text following the `__END__` marker.
    pub end_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    Code(Vec<Expr>),
}

/// Where a constant is looked up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstBase {
    /// Lexical scope chain, then the global table.
    Lexical,
    /// `::Name`
    Top,
    /// `Scope::Name`
    Scoped(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub required: Vec<String>,
    pub optional: Vec<(String, Expr)>,
    pub rest: Option<String>,
    pub block: Option<String>,
}

impl Params {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
            && self.optional.is_empty()
            && self.rest.is_none()
            && self.block.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Params,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub recv: Option<Box<Expr>>,
    pub name: String,
    pub args: Vec<Expr>,
    pub block: Option<Box<Block>>,
    /// `&expr` argument.
    pub block_arg: Option<Box<Expr>>,
}

impl Call {
    pub fn new(recv: Option<Expr>, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Call {
            recv: recv.map(Box::new),
            name: name.into(),
            args,
            block: None,
            block_arg: None,
        }
    }

    /// Receiver-less call with no arguments and no block, i.e. a bare identifier.
    pub fn is_bare(&self) -> bool {
        self.recv.is_none() && self.args.is_empty() && self.block.is_none() && self.block_arg.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    LVar(String),
    IVar(String),
    GVar(String),
    Const { base: ConstBase, name: String },
    Attr { recv: Box<Expr>, name: String },
    Index { recv: Box<Expr>, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub values: Vec<Expr>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescueClause {
    pub classes: Vec<Expr>,
    pub var: Option<String>,
    pub body: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    True,
    False,
    SelfRef,
    /// Integer literal as written, including any sign or radix prefix.
    Int(String),
    /// Float literal as written.
    Float(String),
    Str(String),
    DStr(Vec<StrPart>),
    /// Raw target-language text with interpolation slots.
    XStr(Vec<StrPart>),
    Sym(String),
    DSym(Vec<StrPart>),
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        exclusive: bool,
    },
    LVar(String),
    IVar(String),
    GVar(String),
    Const {
        base: ConstBase,
        name: String,
    },
    Asgn {
        target: Target,
        value: Box<Expr>,
    },
    /// `target op= value`, with `op` one of `||`, `&&` or a binary operator.
    OpAsgn {
        target: Target,
        op: String,
        value: Box<Expr>,
    },
    Call(Call),
    Splat(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Vec<Expr>,
        until: bool,
        /// `begin ... end while cond` runs the body first.
        do_while: bool,
    },
    Case {
        subject: Option<Box<Expr>>,
        whens: Vec<WhenClause>,
        else_body: Option<Vec<Expr>>,
    },
    Begin {
        body: Vec<Expr>,
        rescues: Vec<RescueClause>,
        else_body: Option<Vec<Expr>>,
        ensure: Option<Vec<Expr>>,
    },
    /// Parenthesised statement sequence.
    Seq(Vec<Expr>),
    Return(Option<Box<Expr>>),
    Break(Option<Box<Expr>>),
    Next(Option<Box<Expr>>),
    Yield(Vec<Expr>),
    /// `super` without arguments forwards the current ones (`args` is `None`).
    Super {
        args: Option<Vec<Expr>>,
        block: Option<Box<Block>>,
        block_arg: Option<Box<Expr>>,
    },
    Def {
        singleton: Option<Box<Expr>>,
        name: String,
        params: Params,
        body: Vec<Expr>,
    },
    Class {
        base: ConstBase,
        name: String,
        superclass: Option<Box<Expr>>,
        body: Vec<Expr>,
    },
    Module {
        base: ConstBase,
        name: String,
        body: Vec<Expr>,
    },
    /// `class << target`
    SClass {
        target: Box<Expr>,
        body: Vec<Expr>,
    },
    Alias {
        new_name: String,
        old_name: String,
    },
    Undef(Vec<String>),
}

impl Expr {
    pub fn is_call(&self, name: &str) -> bool {
        matches!(self, Expr::Call(call) if call.name == name)
    }

    /// The literal text of a plain string or symbol, if that is what this is.
    pub fn literal_str(&self) -> Option<&str> {
        match self {
            Expr::Str(text) | Expr::Sym(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_calls_by_name() {
        let expr = Expr::Call(Call::new(None, "require", vec![Expr::Str("foo".into())]));
        assert!(expr.is_call("require"));
        assert!(!expr.is_call("autoload"));
    }

    #[test]
    fn literal_str_ignores_interpolated_strings() {
        assert_eq!(Expr::Str("a".into()).literal_str(), Some("a"));
        let dstr = Expr::DStr(vec![StrPart::Lit("a".into())]);
        assert_eq!(dstr.literal_str(), None);
    }
}
