use std::env;
#[cfg(feature = "fetch")]
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LANCEDB_VERSION");
    println!("cargo:rerun-if-env-changed=LANCEDB_RELEASE_URL");
    println!("cargo:rerun-if-env-changed=LANCEDB_RELEASE_SHA256");
    println!("cargo:rerun-if-env-changed=LANCEDB_NATIVE_ROOT");

    if env::var_os("DOCS_RS").is_some() {
        return;
    }

    #[cfg(feature = "fetch")]
    provision();
}

#[cfg(feature = "fetch")]
fn provision() {
    use lancedb_native_fetch::{ensure_binaries_exist, Platform};

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    // Default to the workspace root (crates/lancedb-native-sys -> ../..).
    let root = env::var_os("LANCEDB_NATIVE_ROOT")
        .map(PathBuf::from)
        .or_else(|| crate_dir.parent().and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or(crate_dir);

    if let Err(e) = ensure_binaries_exist(&root) {
        println!("cargo:warning=lancedb native binaries unavailable: {e}");
        return;
    }

    let platform = Platform::current();
    let lib_dir = root.join("lib").join(&platform.dir);
    println!("cargo:rustc-env=LANCEDB_NATIVE_LIB_DIR={}", lib_dir.display());
}
