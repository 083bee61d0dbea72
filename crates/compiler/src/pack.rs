//! Datapack serialisation
//!
//! Consumes the lowering output tables and writes the directory tree the
//! game loads, plus the distributable zip:
//!
//! ```text
//! build/<pack>/pack.mcmeta
//! build/<pack>/data/minecraft/tags/functions/{load,tick}.json
//! build/<pack>/data/<pack>/functions/*.mcfunction
//! dist/<pack>.zip
//! ```
//!
//! `_setup.mcfunction` declares the scoreboard objectives behind every
//! synthesised (`_`-prefixed) name, `_vars.mcfunction` the user-declared
//! ones; `load` runs both before its own body.

use crate::lowering::LoweredProgram;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct PackMeta<'a> {
    pack: PackMetaInner<'a>,
}

#[derive(Serialize)]
struct PackMetaInner<'a> {
    pack_format: u32,
    description: &'a str,
}

/// Function tag wiring `load`/`tick` to the game's event hooks
#[derive(Serialize)]
struct FunctionTag {
    values: Vec<String>,
}

/// Write the pack directory tree under `build_dir` and return its root
pub fn write_pack(
    lowered: &LoweredProgram,
    name: &str,
    description: &str,
    pack_format: u32,
    build_dir: &Path,
) -> Result<PathBuf, String> {
    let pack_dir = build_dir.join(name);
    if pack_dir.exists() {
        fs::remove_dir_all(&pack_dir)
            .map_err(|e| format!("Failed to clear build directory: {}", e))?;
    }
    let tags_dir = pack_dir.join("data/minecraft/tags/functions");
    let functions_dir = pack_dir.join("data").join(name).join("functions");
    fs::create_dir_all(&tags_dir).map_err(|e| format!("Failed to create pack tree: {}", e))?;
    fs::create_dir_all(&functions_dir)
        .map_err(|e| format!("Failed to create pack tree: {}", e))?;

    let meta = PackMeta {
        pack: PackMetaInner {
            pack_format,
            description,
        },
    };
    write_json(&pack_dir.join("pack.mcmeta"), &meta)?;
    write_json(
        &tags_dir.join("load.json"),
        &FunctionTag {
            values: vec![format!("{}:load", name)],
        },
    )?;
    write_json(
        &tags_dir.join("tick.json"),
        &FunctionTag {
            values: vec![format!("{}:tick", name)],
        },
    )?;

    let (setup, vars) = objective_tables(lowered);
    write_text(&functions_dir.join("_setup.mcfunction"), &setup)?;
    write_text(&functions_dir.join("_vars.mcfunction"), &vars)?;

    for (loop_name, commands) in &lowered.loops {
        write_text(
            &functions_dir.join(format!("{}.mcfunction", loop_name)),
            &join_lines(commands),
        )?;
    }

    for (func, info) in &lowered.functions {
        let mut body = String::new();
        if func == "load" {
            body.push_str(&load_prelude(name));
        }
        body.push_str(&join_lines(&info.commands));
        write_text(&functions_dir.join(format!("{}.mcfunction", func)), &body)?;
    }
    if !lowered.functions.contains_key("load") {
        write_text(&functions_dir.join("load.mcfunction"), &load_prelude(name))?;
    }

    Ok(pack_dir)
}

/// Zip the pack tree into `dist_dir/<name>.zip` and return the archive path
pub fn archive_pack(pack_dir: &Path, dist_dir: &Path, name: &str) -> Result<PathBuf, String> {
    fs::create_dir_all(dist_dir).map_err(|e| format!("Failed to create dist directory: {}", e))?;
    let zip_path = dist_dir.join(format!("{}.zip", name));
    let file = fs::File::create(&zip_path)
        .map_err(|e| format!("Failed to create archive '{}': {}", zip_path.display(), e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut files = Vec::new();
    collect_files(pack_dir, &mut files)
        .map_err(|e| format!("Failed to walk build directory: {}", e))?;
    files.sort();

    for path in files {
        let relative = path
            .strip_prefix(pack_dir)
            .map_err(|e| format!("Failed to relativise '{}': {}", path.display(), e))?;
        let entry = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer
            .start_file(entry, options)
            .map_err(|e| format!("Failed to add archive entry: {}", e))?;
        let contents =
            fs::read(&path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        writer
            .write_all(&contents)
            .map_err(|e| format!("Failed to write archive entry: {}", e))?;
    }
    writer
        .finish()
        .map_err(|e| format!("Failed to finish archive: {}", e))?;
    Ok(zip_path)
}

/// The objective declarations, split into (`_setup`, `_vars`) contents
fn objective_tables(lowered: &LoweredProgram) -> (String, String) {
    let mut setup = String::new();
    let mut vars = String::new();
    let mut push = |name: &str, display: &str, is_array: bool| {
        // Arrays live in storage; only synthesised names get a score anyway
        if !is_array || display.starts_with('_') {
            let sink = if display.starts_with('_') {
                &mut setup
            } else {
                &mut vars
            };
            sink.push_str(&format!(
                "scoreboard objectives add {} dummy \"{}\"\n",
                name, display
            ));
        }
    };

    for (name, ty) in &lowered.globals {
        push(name, name, ty.is_array());
    }
    let mut seen = HashSet::new();
    for scope in lowered.locals.values() {
        for (name, ty) in scope {
            if seen.insert(name.clone()) {
                push(&format!("{}+local", name), name, ty.is_array());
            }
        }
    }
    (setup, vars)
}

fn load_prelude(name: &str) -> String {
    format!("function {0}:_setup\nfunction {0}:_vars\n", name)
}

fn join_lines(commands: &[String]) -> String {
    let mut text = String::new();
    for command in commands {
        text.push_str(command);
        text.push('\n');
    }
    text
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialise '{}': {}", path.display(), e))?;
    write_text(path, &text)
}

fn write_text(path: &Path, text: &str) -> Result<(), String> {
    fs::write(path, text).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
