//! Manifest utility for Oncoguard model directories.
//!
//! Hashes `preprocessing.json` and `model.json` and writes `manifest.json`
//! so the runtime can verify the artifacts before loading them.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin write_manifest -- <model_dir>
//! ```

use std::env;
use std::path::PathBuf;

use oncoguard::adapters::xgboost::{write_manifest, ManifestPolicy, TreeEnsembleScorer};

fn usage() -> String {
    "Usage: write_manifest <model_dir>".to_string()
}

fn parse_args() -> Result<PathBuf, String> {
    let mut args = env::args().skip(1);
    let model_dir = match args.next().as_deref() {
        None | Some("-h" | "--help") => return Err(usage()),
        Some(dir) => PathBuf::from(dir),
    };
    if args.next().is_some() {
        return Err(usage());
    }

    if model_dir.is_file() {
        return model_dir
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| "Model path has no parent directory".to_string());
    }
    Ok(model_dir)
}

fn main() -> Result<(), String> {
    let model_dir = parse_args()?;

    let path = write_manifest(&model_dir).map_err(|e| e.to_string())?;
    // The dump must also compile.
    TreeEnsembleScorer::load(&model_dir, ManifestPolicy::Required).map_err(|e| e.to_string())?;

    println!("Wrote {}", path.display());
    Ok(())
}
