use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::Parser;
use polex_core::Registry;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long)]
    input: Option<String>,

    /// Program file, positional form of --input.
    #[arg(value_name = "FILE", conflicts_with = "input")]
    file: Option<String>,

    #[arg(short, long, value_name = "EXPR", help = "Evaluate an expression given inline")]
    eval: Option<String>,

    #[arg(long, help = "Print the compiled type without evaluating")]
    type_only: bool,
}

fn main() -> Result<()> {
    init_logging();
    execute(Cli::parse())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let source = read_source(&cli)?;
    let registry = Registry::with_prelude().context("failed to install the prelude")?;
    let program = registry.compile(&source)?;

    if cli.type_only {
        println!("{}", program.ty);
        return Ok(());
    }

    let value = program.invoke()?;
    println!("{value} :: {}", program.ty);
    Ok(())
}

fn read_source(cli: &Cli) -> Result<String> {
    if let Some(source) = &cli.eval {
        return Ok(source.clone());
    }
    if let Some(path) = cli.input.as_ref().or(cli.file.as_ref()) {
        return fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"));
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn evaluates_a_program_file() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.plx");
        fs::write(&input_path, "+ 1 2").expect("write input");

        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("3 ::"));
    }

    #[test]
    fn accepts_a_positional_file() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.plx");
        fs::write(&input_path, "* 2 3").expect("write input");

        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("6 ::"));
    }

    #[test]
    fn evaluates_an_inline_expression() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--eval")
            .arg("+ 1 * 2 3")
            .assert()
            .success()
            .stdout(predicate::str::contains("7 ::"));
    }

    #[test]
    fn reads_from_stdin_when_no_file_is_given() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .write_stdin("/ 2 6")
            .assert()
            .success()
            .stdout(predicate::str::contains("3 ::"));
    }

    #[test]
    fn prints_only_the_type_when_asked() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--eval")
            .arg(r"\x:n x")
            .arg("--type-only")
            .assert()
            .success()
            .stdout(predicate::str::contains("(n -> n)"));
    }

    #[test]
    fn let_bindings_work_end_to_end() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.plx");
        fs::write(&input_path, "x 5 + x x").expect("write input");

        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("10 ::"));
    }

    #[test]
    fn reports_syntax_errors() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--eval")
            .arg("???")
            .assert()
            .failure()
            .stderr(predicate::str::contains("syntax error"));
    }

    #[test]
    fn reports_division_by_zero() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--eval")
            .arg("/ 0 1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("division by zero"));
    }

    #[test]
    fn reports_missing_input_files() {
        Command::cargo_bin("polex-cli")
            .expect("binary exists")
            .arg("--input")
            .arg("does-not-exist.plx")
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to read input file"));
    }
}
