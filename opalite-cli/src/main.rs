use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use opalite_core::stdlib::{RUNTIME_UNIT, default_stdlib_root, ensure_root};
use opalite_core::{BuildOptions, Builder, CompilerOptions, Processor, compile};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Compile Ruby sources to JavaScript and bundle their require graph.
#[derive(Parser, Debug)]
#[command(name = "opalite", version, about, long_about = None)]
struct Cli {
    /// Ruby source used as the entry (reads stdin when neither this nor
    /// `--entry` is given).
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Logical name of the entry, resolved through the search paths.
    #[arg(short, long, value_name = "NAME", conflicts_with = "input")]
    entry: Option<String>,

    /// Output file (stdout when omitted).
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Append a directory to the search paths.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the standard library root (defaults to bundled stdlib)"
    )]
    stdlib: Option<PathBuf>,

    #[arg(long, conflicts_with = "stdlib", help = "Do not add or preload the standard library")]
    no_stdlib: bool,

    /// Emit this name as an empty module.
    #[arg(long = "stub", value_name = "NAME")]
    stubs: Vec<String>,

    /// Treat this name as already loaded by the host.
    #[arg(long = "prerequire", value_name = "NAME")]
    prerequired: Vec<String>,

    /// Load this name before the entry's dependencies.
    #[arg(long = "preload", value_name = "NAME")]
    preload: Vec<String>,

    #[arg(long, value_enum, default_value_t = Emit::Bundle)]
    emit: Emit,

    /// With `--emit unit`, register the unit in the module table.
    #[arg(long)]
    requirable: bool,

    #[arg(long)]
    no_banner: bool,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// One artifact holding the entry and its dependencies.
    Bundle,
    /// The entry compiled alone.
    Unit,
    /// The dependency edges, one per line.
    Deps,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn execute(cli: Cli) -> Result<()> {
    match cli.emit {
        Emit::Unit => {
            let (source, file) = read_input(&cli)?;
            let options = CompilerOptions {
                file,
                requirable: cli.requirable,
                banner: !cli.no_banner,
            };
            let unit = compile(&source, &options)
                .with_context(|| format!("failed to compile {}", options.file))?;
            write_output(cli.output.as_deref(), unit.javascript.as_bytes())
        }
        Emit::Bundle | Emit::Deps => {
            let builder = configure_builder(&cli)?;
            let artifact = match &cli.entry {
                Some(entry) => builder
                    .build(entry)
                    .with_context(|| format!("failed to build {entry}"))?,
                None => {
                    let (source, file) = read_input(&cli)?;
                    builder
                        .build_str(&source, &file)
                        .with_context(|| format!("failed to build {file}"))?
                }
            };
            debug!(units = artifact.unit_count(), "artifact ready");
            let text = if cli.emit == Emit::Deps {
                artifact
                    .edges()
                    .iter()
                    .map(|edge| format!("{edge}\n"))
                    .collect()
            } else {
                artifact.into_text()
            };
            write_output(cli.output.as_deref(), text.as_bytes())
        }
    }
}

fn configure_builder(cli: &Cli) -> Result<Builder> {
    let mut options = BuildOptions {
        stubs: cli.stubs.iter().cloned().collect(),
        prerequired: cli.prerequired.iter().cloned().collect(),
        preload: Vec::new(),
        default_processor: Processor::Ruby,
        banner: !cli.no_banner,
    };

    let stdlib_root = if cli.no_stdlib {
        None
    } else {
        let root = cli.stdlib.clone().unwrap_or_else(default_stdlib_root);
        options.preload.push(RUNTIME_UNIT.to_string());
        Some(ensure_root(&root)?)
    };
    options.preload.extend(cli.preload.iter().cloned());

    let mut builder = Builder::new(options);
    for dir in &cli.include {
        builder.append_path(dir);
    }
    if let Some(dir) = cli.input.as_deref().and_then(Path::parent) {
        builder.append_path(if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        });
    }
    if let Some(root) = stdlib_root {
        builder.append_path(root);
    }
    Ok(builder)
}

/// Entry source and the name it is compiled under.
fn read_input(cli: &Cli) -> Result<(String, String)> {
    match &cli.input {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok((source, name))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read source from stdin")?;
            Ok((buffer, "(stdin)".to_string()))
        }
    }
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes).context("failed to write to stdout")?;
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    fn opalite() -> Command {
        Command::cargo_bin("opalite").expect("binary exists")
    }

    #[test]
    fn compiles_a_single_unit() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.rb");
        fs::write(&input_path, "require 'pippo'").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .arg("--emit")
            .arg("unit")
            .assert()
            .success()
            .stdout(predicate::str::contains("self.$require(\"pippo\")"))
            .stdout(predicate::str::starts_with("/* Generated by opalite"));
    }

    #[test]
    fn compiles_requirable_units_from_stdin() {
        opalite()
            .args(["--emit", "unit", "--requirable", "--no-banner"])
            .write_stdin("3.142")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Opal.modules[\"(stdin)\"] = function(Opal) {"))
            .stdout(predicate::str::contains("return 3.142;"));
    }

    #[test]
    fn bundles_an_entry_from_search_paths() {
        let dir = tempdir().expect("tempdir");
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).expect("create lib");
        fs::write(dir.path().join("main.rb"), "require 'helper'\nHelper.run").expect("write main");
        fs::write(lib.join("helper.rb"), "module Helper; end").expect("write helper");
        let output_path = dir.path().join("dist/out.js");

        opalite()
            .arg("--entry")
            .arg("main")
            .arg("-I")
            .arg(dir.path())
            .arg("-I")
            .arg(&lib)
            .arg("--no-stdlib")
            .arg("--output")
            .arg(&output_path)
            .assert()
            .success();

        let bundle = fs::read_to_string(&output_path).expect("read bundle");
        assert!(bundle.starts_with("/* opalite bundle: 2 units */"));
        assert!(bundle.contains("Opal.modules[\"helper\"] = function(Opal) {"));
        assert!(bundle.ends_with("})(Opal);\n"));
    }

    #[test]
    fn preloads_the_bundled_runtime() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.rb");
        fs::write(&input_path, "puts 1").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("var Opal = global.Opal = {};"));
    }

    #[test]
    fn applies_stub_and_prerequire_flags() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.rb");
        fs::write(&input_path, "require 'pippo'\nrequire 'host/thing'").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .args(["--no-stdlib", "--stub", "pippo", "--prerequire", "host/thing"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Opal.modules[\"pippo\"]"))
            .stdout(predicate::str::contains("Opal.modules[\"host/thing\"]").not());
    }

    #[test]
    fn lists_dependency_edges() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("main.rb"), "require 'helper'").expect("write main");
        fs::write(dir.path().join("helper.rb"), "").expect("write helper");

        opalite()
            .args(["--entry", "main", "--no-stdlib", "--emit", "deps", "-I"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout("main -> helper (direct)\n");
    }

    #[test]
    fn reports_missing_stdlib_root() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.rb");
        fs::write(&input_path, "1").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .arg("--stdlib")
            .arg(dir.path().join("missing"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("standard library directory was not found"));
    }

    #[test]
    fn reports_unresolved_dependencies() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.rb");
        fs::write(&input_path, "require 'missing'").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .arg("--no-stdlib")
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot load such file -- missing"));
    }

    #[test]
    fn reports_parse_errors_with_position() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("broken.rb");
        fs::write(&input_path, "class Foo\n  def bar\n").expect("write input");

        opalite()
            .arg("--input")
            .arg(&input_path)
            .args(["--emit", "unit"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("broken.rb:"));
    }
}
