//! Static recognition of dependency-declaring calls.
//!
//! Only literal string arguments are resolvable. Presence of a call anywhere
//! in a unit is enough to register the dependency; conditionals and loops
//! around it are not evaluated.

use std::fmt;

use crate::ast::Call;
use crate::builtins::{BuiltinKind, builtin_for_call};
use crate::resolver::{join_relative, normalize_logical};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Direct,
    /// One of the units found under a `require_tree` directory.
    Tree,
    /// `autoload` inside a class or module body; loaded like a direct require.
    Autoload,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeKind::Direct => "direct",
            EdgeKind::Tree => "tree",
            EdgeKind::Autoload => "autoload",
        };
        f.write_str(name)
    }
}

/// A dependency declared by one unit, in normalised logical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireDecl {
    pub name: String,
    /// `Tree` names a directory rather than a unit.
    pub kind: EdgeKind,
}

/// A resolved edge of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.kind)
    }
}

/// Classify a call site of the unit `file`.
///
/// `in_class` is true when the nearest enclosing non-block scope is a class,
/// module or singleton class body.
pub fn classify(call: &Call, file: &str, in_class: bool) -> Option<RequireDecl> {
    let builtin = builtin_for_call(call)?;
    let decl = match builtin.kind {
        BuiltinKind::Require => RequireDecl {
            name: normalize_logical(call.args[0].literal_str()?),
            kind: EdgeKind::Direct,
        },
        BuiltinKind::RequireRelative => RequireDecl {
            name: join_relative(file, call.args[0].literal_str()?),
            kind: EdgeKind::Direct,
        },
        BuiltinKind::RequireTree => RequireDecl {
            name: join_relative(file, call.args[0].literal_str()?),
            kind: EdgeKind::Tree,
        },
        BuiltinKind::Autoload => {
            let name = call.args[1].literal_str()?;
            if !in_class {
                tracing::debug!(file, name, "ignoring autoload outside a class or module body");
                return None;
            }
            RequireDecl {
                name: normalize_logical(name),
                kind: EdgeKind::Autoload,
            }
        }
        BuiltinKind::Debugger | BuiltinKind::BlockGiven => return None,
    };
    Some(decl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ConstBase, Expr, StrPart};

    fn call(name: &str, args: Vec<Expr>) -> Call {
        Call::new(None, name, args)
    }

    fn lit(text: &str) -> Expr {
        Expr::Str(text.to_string())
    }

    #[test]
    fn recognises_plain_requires() {
        let decl = classify(&call("require", vec![lit("./pippo.rb")]), "main", false);
        assert_eq!(
            decl,
            Some(RequireDecl {
                name: "pippo".into(),
                kind: EdgeKind::Direct
            })
        );
    }

    #[test]
    fn resolves_require_relative_against_the_unit() {
        let decl = classify(
            &call("require_relative", vec![lit("../compiler_spec")]),
            "spec/cli/foo",
            false,
        );
        assert_eq!(decl.map(|d| d.name), Some("spec/compiler_spec".to_string()));
    }

    #[test]
    fn records_tree_requires() {
        let decl = classify(
            &call("require_tree", vec![lit("./fixtures/tree")]),
            "foo",
            false,
        );
        assert_eq!(
            decl,
            Some(RequireDecl {
                name: "fixtures/tree".into(),
                kind: EdgeKind::Tree
            })
        );
    }

    #[test]
    fn autoload_counts_only_inside_class_bodies() {
        let autoload = call(
            "autoload",
            vec![
                Expr::Const {
                    base: ConstBase::Lexical,
                    name: "Whatever".into(),
                },
                lit("file"),
            ],
        );
        assert!(classify(&autoload, "main", false).is_none());
        assert_eq!(
            classify(&autoload, "main", true).map(|d| d.kind),
            Some(EdgeKind::Autoload)
        );
    }

    #[test]
    fn skips_non_literal_arguments() {
        let dynamic = Expr::DStr(vec![StrPart::Lit("a".into()), StrPart::Code(vec![Expr::Nil])]);
        assert!(classify(&call("require", vec![dynamic]), "main", false).is_none());
        assert!(classify(&call("require", vec![Expr::LVar("x".into())]), "main", false).is_none());
    }

    #[test]
    fn displays_edges() {
        let edge = DependencyEdge {
            from: "a".into(),
            to: "b".into(),
            kind: EdgeKind::Autoload,
        };
        assert_eq!(edge.to_string(), "a -> b (autoload)");
    }
}
