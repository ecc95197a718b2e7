use std::path::{Path, PathBuf};

fn workspace_version(manifest_dir: &Path) -> Result<String, String> {
    let version_path: PathBuf = manifest_dir
        .ancestors()
        .nth(2)
        .ok_or("crate is not nested under <workspace>/crates")?
        .join("VERSION");
    println!("cargo:rerun-if-changed={}", version_path.display());

    let raw = std::fs::read_to_string(&version_path)
        .map_err(|error| format!("read {}: {error}", version_path.display()))?;
    let version = raw.trim();
    if version.is_empty() || version.contains(char::is_whitespace) {
        return Err(format!("{} must hold a single version token", version_path.display()));
    }
    Ok(version.to_string())
}

fn main() {
    let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    match workspace_version(Path::new(&manifest_dir)) {
        Ok(version) => println!("cargo:rustc-env=LABHOST_VERSION={version}"),
        Err(error) => panic!("labhost version: {error}"),
    }
}
