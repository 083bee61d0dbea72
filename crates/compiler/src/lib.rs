//! MineScript Compiler Library
//!
//! Compiles MineScript source into a Minecraft datapack: a tree of
//! `.mcfunction` files built from scoreboard and storage commands, plus the
//! zipped archive the game loads at world start.
//!
//! The pipeline is parse -> mapping pass (function signatures) -> lowering
//! pass (semantic checks + command emission) -> packaging:
//!
//! ```rust,ignore
//! use minescriptc::{CompilerConfig, build_pack};
//!
//! let config = CompilerConfig::new().with_pack_name("demo");
//! let archive = build_pack(std::path::Path::new("demo.ms"), &config)?;
//! ```

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lowering;
pub mod mapping;
pub mod pack;
pub mod parser;
pub mod types;

pub use ast::Program;
pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, Reporter, Severity};
pub use error::{CompileError, ErrorKind};
pub use lowering::{LoweredProgram, Value};
pub use parser::Parser;
pub use types::Type;

use std::fs;
use std::path::{Path, PathBuf};

/// Compile source text into the output tables the packager consumes.
///
/// Warnings land in `reporter` as lowering encounters them; the first error
/// is reported there too and surfaces as the returned message.
pub fn compile_source(
    source: &str,
    pack_name: &str,
    reporter: &mut Reporter,
) -> Result<LoweredProgram, String> {
    let program = Parser::new(source)?.parse()?;
    let map = mapping::collect(&program).map_err(|e| report(reporter, e))?;
    lowering::lower(&program, map, pack_name, reporter).map_err(|e| report(reporter, e))
}

fn report(reporter: &mut Reporter, error: CompileError) -> String {
    reporter.error(error.span, error.kind.to_string());
    error.to_string()
}

/// Compile a `.ms` source file into `build/<pack>/` and `dist/<pack>.zip`,
/// returning the archive path
pub fn build_pack(input: &Path, config: &CompilerConfig) -> Result<PathBuf, String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read source file '{}': {}", input.display(), e))?;
    let name = config.resolve_pack_name(input);

    let mut reporter = Reporter::new(input, &source);
    let lowered = compile_source(&source, &name, &mut reporter)?;

    let root = match &config.out_dir {
        Some(dir) => dir.clone(),
        None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    let pack_dir = pack::write_pack(
        &lowered,
        &name,
        &config.description,
        config.pack_format,
        &root.join("build"),
    )?;
    pack::archive_pack(&pack_dir, &root.join("dist"), &name)
}

/// Parse and analyse a source file without writing anything
pub fn check_file(input: &Path, config: &CompilerConfig) -> Result<(), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read source file '{}': {}", input.display(), e))?;
    let name = config.resolve_pack_name(input);
    let mut reporter = Reporter::new(input, &source);
    compile_source(&source, &name, &mut reporter).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<LoweredProgram, String> {
        let mut reporter = Reporter::new(Path::new("test.ms"), source);
        compile_source(source, "p", &mut reporter)
    }

    #[test]
    fn test_empty_load_produces_only_the_break_reset() {
        let lowered = compile("void load() {}").unwrap();
        assert_eq!(
            lowered.functions["load"].commands,
            vec!["scoreboard players set #MineScript _break_load 0"]
        );
        assert_eq!(lowered.globals.get("_break_load"), Some(&Type::Int));
    }

    #[test]
    fn test_compile_error_surfaces_with_position() {
        let err = compile("void load() { int x; char c; x = c; }").unwrap_err();
        assert!(err.contains("Mismatching types: 'int' and 'char'"), "{}", err);
        assert!(err.contains("1:30"), "{}", err);
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = compile("void load() { int x = ; }").unwrap_err();
        assert!(err.contains("Unexpected"), "{}", err);
    }

    #[test]
    fn test_error_is_recorded_as_a_diagnostic() {
        let source = "void load() { break; }";
        let mut reporter = Reporter::new(Path::new("test.ms"), source);
        let result = compile_source(source, "p", &mut reporter);
        assert!(result.is_err());
        assert!(reporter.has_errors());
        assert_eq!(
            reporter.diagnostics()[0].message,
            "Break statement is outside of a loop"
        );
    }

    #[test]
    fn test_string_round_trips_through_print() {
        let lowered =
            compile("void load() { print(\"@a\", \"white\", \"abc\"); }").unwrap();
        let tellraw = lowered.functions["load"]
            .commands
            .iter()
            .find(|c| c.contains("tellraw"))
            .unwrap();
        assert!(tellraw.contains("{\"text\":\"abc\", \"color\":\"white\"}"));
    }

    #[test]
    fn test_build_pack_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("demo.ms");
        fs::write(&input, "void load() { int x = 2 + 3 * 4; }").unwrap();

        let config = CompilerConfig::new();
        let archive = build_pack(&input, &config).unwrap();
        assert_eq!(archive, dir.path().join("dist/demo.zip"));
        assert!(archive.is_file());
        assert!(dir
            .path()
            .join("build/demo/data/demo/functions/load.mcfunction")
            .is_file());
    }

    #[test]
    fn test_build_pack_propagates_compile_errors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.ms");
        fs::write(&input, "void load() { y = 1; }").unwrap();
        let err = build_pack(&input, &CompilerConfig::new()).unwrap_err();
        assert!(err.contains("Undeclared variable 'y'"), "{}", err);
        // Packaging never ran
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn test_check_file_reports_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("demo.ms");
        fs::write(&input, "void tick() { int t; t++; }").unwrap();
        check_file(&input, &CompilerConfig::new()).unwrap();
        assert!(!dir.path().join("build").exists());
        assert!(!dir.path().join("dist").exists());
    }
}
