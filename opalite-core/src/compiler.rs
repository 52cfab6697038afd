use crate::ast::Program;
use crate::codegen_js::generate;
use crate::error::CoreError;
use crate::parser::parse;
use crate::requires::{EdgeKind, RequireDecl};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Unit name: used for `__FILE__`, `require_relative` and errors.
    pub file: String,
    /// Register the unit in the runtime module table instead of running it.
    pub requirable: bool,
    pub banner: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            file: "(file)".to_string(),
            requirable: false,
            banner: true,
        }
    }
}

impl CompilerOptions {
    pub fn for_file(file: impl Into<String>) -> Self {
        CompilerOptions {
            file: file.into(),
            ..Self::default()
        }
    }
}

/// Output of compiling one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub javascript: String,
    /// Dependency declarations in source order, without duplicates.
    pub declarations: Vec<RequireDecl>,
}

impl CompiledUnit {
    /// Logical names of direct and autoload dependencies.
    pub fn requires(&self) -> Vec<&str> {
        self.declarations
            .iter()
            .filter(|decl| decl.kind != EdgeKind::Tree)
            .map(|decl| decl.name.as_str())
            .collect()
    }

    /// Directories named by `require_tree`.
    pub fn required_trees(&self) -> Vec<&str> {
        self.declarations
            .iter()
            .filter(|decl| decl.kind == EdgeKind::Tree)
            .map(|decl| decl.name.as_str())
            .collect()
    }
}

pub fn compile(source: &str, options: &CompilerOptions) -> Result<CompiledUnit, CoreError> {
    let program = parse(&options.file, source)?;
    compile_program(&program, options)
}

pub fn compile_program(
    program: &Program,
    options: &CompilerOptions,
) -> Result<CompiledUnit, CoreError> {
    let generated = generate(program, &options.file)?;

    let mut javascript = String::new();
    if options.banner {
        javascript.push_str(&format!("/* Generated by opalite {VERSION} */\n"));
    }
    if options.requirable {
        javascript.push_str(&format!(
            "Opal.modules[{}] = function(Opal) {{\n",
            crate::codegen_js::js_string(&options.file)
        ));
    } else {
        javascript.push_str("(function(Opal) {\n");
    }
    for line in &generated.lines {
        javascript.push_str(line);
        javascript.push('\n');
    }
    javascript.push_str(if options.requirable {
        "};\n"
    } else {
        "})(Opal);\n"
    });

    Ok(CompiledUnit {
        javascript,
        declarations: generated.declarations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(source: &str) -> String {
        compile(source, &CompilerOptions::default())
            .expect("compile should succeed")
            .javascript
    }

    fn js_in(file: &str, source: &str) -> CompiledUnit {
        compile(source, &CompilerOptions::for_file(file)).expect("compile should succeed")
    }

    #[test]
    fn compiles_require_to_runtime_call() {
        let unit = js_in("main", "require 'pippo'");
        assert!(unit.javascript.contains("self.$require(\"pippo\")"));
        assert_eq!(unit.requires(), vec!["pippo"]);
    }

    #[test]
    fn wraps_anonymous_units() {
        let output = js("");
        assert!(output.starts_with("/* Generated by opalite"));
        assert!(output.contains("(function(Opal) {\n"));
        assert!(output.ends_with("})(Opal);\n"));
        assert!(output.contains("return nil;"));
    }

    #[test]
    fn wraps_requirable_units() {
        let options = CompilerOptions {
            file: "foo".into(),
            requirable: true,
            banner: false,
        };
        let output = compile("", &options).expect("compile").javascript;
        assert!(output.starts_with("Opal.modules[\"foo\"] = function(Opal) {\n"));
        assert!(output.ends_with("};\n"));
    }

    #[test]
    fn prints_numbers_like_javascript() {
        assert!(js("3.142").contains("return 3.142;"));
        assert!(js("123e1").contains("return 1230;"));
        assert!(js("123E+10").contains("return 1230000000000;"));
    }

    #[test]
    fn interpolates_strings() {
        let output = js("\"hello #{100}\"");
        assert!(output.contains("\"hello \""));
        assert!(output.contains("(100).$to_s()"));
    }

    #[test]
    fn dispatches_method_calls() {
        assert!(js("[1, 2].inspect").contains("[1, 2].$inspect()"));
        let output = js("[1, 2].map { |x| x * 2 }");
        assert!(output.contains("Opal.send([1, 2], \"$map\", [], function(x) {"));
        assert!(output.contains("x[\"$*\"](2)"));
    }

    #[test]
    fn compiles_class_definitions() {
        let output = js("class Foo < Bar\n  def baz(a, b = 1)\n    a + b\n  end\nend");
        assert!(output.contains("function $Foo"));
        assert!(output.contains("Opal.klass($base, $super, \"Foo\", $Foo)"));
        assert!(output.contains("})(self, $scope.get(\"Bar\"))"));
        assert!(output.contains("Opal.defn(self, \"$baz\", function $$baz(a, b) {"));
        assert!(output.contains("if (b == null) { b = 1; }"));
    }

    #[test]
    fn compiles_bare_debugger_to_statement() {
        let output = js("debugger");
        assert!(output.contains("debugger;"));
        assert!(!output.contains("$debugger"));
    }

    #[test]
    fn exposes_end_data() {
        let output = js("a = DATA\n__END__\nhello\n");
        assert!(output.contains("var $__END__ = Opal.Object.$new();"));
        assert!(output.contains("return \"hello\\n\";"));
        assert!(output.contains("a = $__END__"));
    }

    #[test]
    fn data_without_end_marker_is_a_constant() {
        assert!(js("DATA").contains("$scope.get(\"DATA\")"));
    }

    #[test]
    fn keeps_xstring_escapes_verbatim() {
        let output = js(r#"`"\\n"`"#);
        assert!(output.contains(r#""\\n""#));
    }

    #[test]
    fn ignores_autoload_outside_class_bodies() {
        let unit = js_in("main", "autoload :Whatever, 'whatever'");
        assert!(unit.declarations.is_empty());
        assert!(unit.javascript.contains("self.$autoload(\"Whatever\", \"whatever\")"));
    }

    #[test]
    fn records_autoload_inside_class_bodies() {
        let unit = js_in("main", "module Foo\n  autoload :Bar, 'foo/bar'\nend");
        assert_eq!(
            unit.declarations,
            vec![RequireDecl {
                name: "foo/bar".into(),
                kind: EdgeKind::Autoload
            }]
        );
    }

    #[test]
    fn records_tree_requires() {
        let unit = js_in("spec/main", "require_tree './fixtures'");
        assert_eq!(unit.required_trees(), vec!["spec/fixtures"]);
        assert!(unit.javascript.contains("self.$require_tree(\"spec/fixtures\")"));
    }

    #[test]
    fn deduplicates_declarations() {
        let unit = js_in("main", "require 'a'\nrequire './a.rb'\nrequire 'b'");
        assert_eq!(unit.requires(), vec!["a", "b"]);
    }

    #[test]
    fn declares_locals_in_preamble() {
        let output = js("a = 1\nb = a");
        assert!(output.contains("var self = Opal.top, $scope = Opal, nil = Opal.nil, a = nil, b = nil;"));
    }

    #[test]
    fn compiles_logical_operators_with_truthiness() {
        let output = js("a = 1\nb = a || 2\nfoo if a && b");
        assert!(output.contains("(Opal.truthy($t1 = a) ? $t1 : 2)"));
        assert!(output.contains("if ((Opal.truthy(a) && Opal.truthy(b))) {"));
    }

    #[test]
    fn compiles_yield_and_block_given() {
        let output = js("def each\n  yield 1 if block_given?\nend");
        assert!(output.contains("$iter = $$each.$$p || nil"));
        assert!(output.contains("if (($iter !== nil)) {"));
        assert!(output.contains("Opal.yieldX($iter, [1])"));
    }

    #[test]
    fn returns_from_blocks_through_the_method() {
        let output = js("def first(list)\n  list.each { |x| return x }\nend");
        assert!(output.contains("Opal.ret(x);"));
        assert!(output.contains("$returner === Opal.returner"));
    }

    #[test]
    fn compiles_rescue_clauses() {
        let output = js("begin\n  risky\nrescue ArgumentError => e\n  e\nend");
        assert!(output.contains("} catch ($err) {"));
        assert!(output.contains("Opal.rescue($err, [$scope.get(\"ArgumentError\")])"));
        assert!(output.contains("e = $err;"));
        assert!(output.contains("throw $err;"));
    }

    #[test]
    fn compiles_operator_assignment_on_ivars() {
        let output = js("@count ||= 0");
        assert!(output.contains(
            "(Opal.truthy((self.count == null ? nil : self.count)) ? (self.count == null ? nil : self.count) : self.count = 0)"
        ));
    }

    #[test]
    fn substitutes_file_name() {
        assert!(js_in("lib/thing", "__FILE__").javascript.contains("return \"lib/thing\";"));
    }

    #[test]
    fn rejects_jumps_outside_loops_and_blocks() {
        let err = compile("break", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }

    #[test]
    fn reports_parse_errors_with_position() {
        let err = compile("a = (", &CompilerOptions::for_file("bad.rb")).unwrap_err();
        let CoreError::Parse(parse) = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(parse.file, "bad.rb");
        assert_eq!(parse.line, 1);
    }

    #[test]
    fn rejects_malformed_integer_literals() {
        for source in ["0b102", "09", "0o9", "0x"] {
            let err = compile(source, &CompilerOptions::default()).unwrap_err();
            assert!(matches!(err, CoreError::Parse(_)), "{source}: {err:?}");
        }
        let err = compile(&"1".repeat(50), &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }

    #[test]
    fn keeps_statement_xstrings_out_of_return_position() {
        let output = js("a = 1\n`debugger`");
        assert!(output.contains("debugger;"));
        assert!(!output.contains("return (debugger)"));
        assert!(output.contains("return nil;"));
        assert!(js("`throw new Error('boom')`").contains("throw new Error('boom');"));
        assert!(js("`1 + 1`").contains("return (1 + 1);"));
    }

    #[test]
    fn negates_powers_of_negative_literals() {
        let output = js("x = -2 ** 2");
        assert!(output.contains("x = (2)[\"$**\"](2)[\"$-@\"]();"));
        assert!(js("-2.abs").contains("(-2).$abs()"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = "class A\n  def b; @c ||= [1, *d]; end\nend\nx = A.new.b";
        assert_eq!(js(source), js(source));
    }
}
