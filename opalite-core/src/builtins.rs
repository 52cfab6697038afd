//! Calls the compiler treats specially.
//!
//! Every other call is an ordinary dispatch through the runtime. The calls
//! listed here are recognised by name on a receiver-less call site: the
//! require family feeds the dependency graph, the rest compile to native
//! constructs instead of a method send.

/// Kind of builtin, used by the code generator and the require scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// `require "name"`
    Require,

    /// `require_relative "name"`, resolved against the requiring unit.
    RequireRelative,

    /// `require_tree "dir"`: every unit below a directory.
    RequireTree,

    /// `autoload Const, "name"` inside a class or module body.
    Autoload,

    /// `debugger`: the native breakpoint statement.
    Debugger,

    /// `block_given?`: whether the enclosing method received a block.
    BlockGiven,
}

/// Metadata about a single builtin call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Method name as written in source.
    pub name: &'static str,

    /// Number of arguments the special form expects.
    ///
    /// A call with a different count compiles as an ordinary send.
    pub arity: usize,

    /// Kind tag used by the code generator.
    pub kind: BuiltinKind,
}

impl BuiltinDescriptor {
    /// Whether the call declares a dependency.
    pub fn declares_dependency(&self) -> bool {
        matches!(
            self.kind,
            BuiltinKind::Require
                | BuiltinKind::RequireRelative
                | BuiltinKind::RequireTree
                | BuiltinKind::Autoload
        )
    }
}

/// The complete list of builtins known to the compiler.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "require",
        arity: 1,
        kind: BuiltinKind::Require,
    },
    BuiltinDescriptor {
        name: "require_relative",
        arity: 1,
        kind: BuiltinKind::RequireRelative,
    },
    BuiltinDescriptor {
        name: "require_tree",
        arity: 1,
        kind: BuiltinKind::RequireTree,
    },
    BuiltinDescriptor {
        name: "autoload",
        arity: 2,
        kind: BuiltinKind::Autoload,
    },
    BuiltinDescriptor {
        name: "debugger",
        arity: 0,
        kind: BuiltinKind::Debugger,
    },
    BuiltinDescriptor {
        name: "block_given?",
        arity: 0,
        kind: BuiltinKind::BlockGiven,
    },
];

/// Look up a builtin by its source-level name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

/// Look up the builtin a receiver-less call site invokes, if any.
pub fn builtin_for_call(call: &crate::ast::Call) -> Option<&'static BuiltinDescriptor> {
    if call.recv.is_some() || call.block.is_some() || call.block_arg.is_some() {
        return None;
    }
    find_builtin(&call.name).filter(|builtin| builtin.arity == call.args.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Call, Expr};

    #[test]
    fn finds_builtins_by_name() {
        assert_eq!(
            find_builtin("require_tree").map(|b| b.kind),
            Some(BuiltinKind::RequireTree)
        );
        assert!(find_builtin("puts").is_none());
    }

    #[test]
    fn only_receiverless_calls_with_matching_arity_are_builtins() {
        let bare = Call::new(None, "require", vec![Expr::Str("a".into())]);
        assert!(builtin_for_call(&bare).is_some());

        let with_recv = Call::new(Some(Expr::SelfRef), "require", vec![Expr::Str("a".into())]);
        assert!(builtin_for_call(&with_recv).is_none());

        let wrong_arity = Call::new(None, "debugger", vec![Expr::Int("1".into())]);
        assert!(builtin_for_call(&wrong_arity).is_none());
    }

    #[test]
    fn dependency_builtins_are_flagged() {
        let declaring: Vec<_> = BUILTINS
            .iter()
            .filter(|b| b.declares_dependency())
            .map(|b| b.name)
            .collect();
        assert_eq!(
            declaring,
            vec!["require", "require_relative", "require_tree", "autoload"]
        );
    }
}
