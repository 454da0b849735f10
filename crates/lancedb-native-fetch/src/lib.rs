//! Native binary provisioning
//!
//! Resolves the platform pair, checks `<root>/lib/<os>_<arch>/` and
//! `<root>/include/` for the engine's static archive and header, downloads
//! the versioned release archive when they are missing, and falls back to
//! `make build-native` when the download or extraction fails.
//!
//! Releases ship a static archive (`liblancedb_go.a` / `lancedb_go.lib`).
//! The binding loads a shared library at runtime, so once the archive is in
//! place it is relinked next to it as `liblancedb_go.so` / `.dylib` with the
//! system C compiler driver.
//!
//! Environment:
//! - `LANCEDB_VERSION`: release tag to fetch (default [`DEFAULT_VERSION`])
//! - `LANCEDB_RELEASE_URL`: full archive URL, overrides the release template
//! - `LANCEDB_RELEASE_SHA256`: expected archive digest, verified when set
//! - `LANCEDB_SOURCE_DIR`: checkout holding the `Makefile` used by the
//!   source build fallback (default: the provisioning root)
//! - `CC`: compiler driver used for relinking (default `cc`)

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_RELEASE_URL_TEMPLATE: &str =
    "https://github.com/lancedb/lancedb-go/releases/download/{version}/lancedb-go-native-binaries.tar.gz";
pub const RELEASE_URL_ENV: &str = "LANCEDB_RELEASE_URL";
pub const VERSION_ENV: &str = "LANCEDB_VERSION";
pub const SHA256_ENV: &str = "LANCEDB_RELEASE_SHA256";
pub const SOURCE_DIR_ENV: &str = "LANCEDB_SOURCE_DIR";
pub const DEFAULT_VERSION: &str = "v0.1.1-3";
pub const HEADER_FILE: &str = "lancedb.h";

/// Per-entry ceiling while extracting (decompression bomb guard).
pub const MAX_ENTRY_SIZE: u64 = 500 * 1024 * 1024;

const DOWNLOAD_FILE: &str = ".lancedb-native-download.tmp";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("invalid file path (potential path traversal): {0:?}")]
    UnsafeEntry(PathBuf),

    #[error("file too large: {path:?} ({size} bytes)")]
    EntryTooLarge { path: PathBuf, size: u64 },

    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("build tool not found - install make and a C toolchain or download pre-built binaries manually")]
    BuildToolMissing,

    #[error("failed to build from source ({0}); ensure Rust, cbindgen and build tools are installed")]
    BuildFailed(ExitStatus),

    #[error("build completed but binaries not found under {0:?}")]
    BinariesMissing(PathBuf),

    #[error("no Makefile in {0:?}; set LANCEDB_SOURCE_DIR to a lancedb-go checkout to build from source")]
    NoBuildScript(PathBuf),

    #[error("cannot produce a shared library from the static archive on {0}")]
    LinkUnsupported(String),

    #[error("linking {path:?} failed ({status})")]
    LinkFailed { path: PathBuf, status: ExitStatus },
}

/// Target platform in the naming used by the release archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    /// `"{os}_{arch}"`, e.g. `linux_amd64`
    pub dir: String,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Normalize Rust target names (`macos`, `x86_64`, `aarch64`) to the
    /// archive layout (`darwin`, `amd64`, `arm64`).
    pub fn from_parts(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            dir: format!("{os}_{arch}"),
        }
    }

    /// Static archive shipped in the release, or `None` on platforms
    /// without a release.
    pub fn archive_file_name(&self) -> Option<&'static str> {
        match self.os.as_str() {
            "linux" | "darwin" => Some("liblancedb_go.a"),
            "windows" => Some("lancedb_go.lib"),
            _ => None,
        }
    }

    /// Shared library file name the binding loads at runtime.
    pub fn library_file_name(&self) -> Option<&'static str> {
        match self.os.as_str() {
            "linux" => Some("liblancedb_go.so"),
            "darwin" => Some("liblancedb_go.dylib"),
            "windows" => Some("lancedb_go.dll"),
            _ => None,
        }
    }

    pub fn lib_dir(&self, root: &Path) -> PathBuf {
        root.join("lib").join(&self.dir)
    }

    pub fn library_path(&self, root: &Path) -> Option<PathBuf> {
        self.library_file_name()
            .map(|name| self.lib_dir(root).join(name))
    }

    pub fn archive_path(&self, root: &Path) -> Option<PathBuf> {
        self.archive_file_name()
            .map(|name| self.lib_dir(root).join(name))
    }

    /// Compiler driver arguments that wrap `archive` into the shared library
    /// at `output`, keeping every exported symbol.
    fn link_args(&self, archive: &Path, output: &Path) -> Option<Vec<OsString>> {
        let mut args: Vec<OsString> = Vec::new();
        match self.os.as_str() {
            "linux" => {
                args.extend(["-shared", "-o"].map(OsString::from));
                args.push(output.into());
                args.push("-Wl,--whole-archive".into());
                args.push(archive.into());
                args.extend(["-Wl,--no-whole-archive", "-lm", "-ldl", "-lpthread"].map(OsString::from));
            }
            "darwin" => {
                args.extend(["-dynamiclib", "-o"].map(OsString::from));
                args.push(output.into());
                args.push("-Wl,-all_load".into());
                args.push(archive.into());
                args.extend(
                    ["-framework", "Security", "-framework", "CoreFoundation"].map(OsString::from),
                );
            }
            _ => return None,
        }
        Some(args)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir)
    }
}

/// The release artifacts (static archive and header) for `platform` are
/// present under `root`.
pub fn binaries_exist(root: &Path, platform: &Platform) -> bool {
    let Some(archive) = platform.archive_path(root) else {
        return false;
    };
    archive.is_file() && root.join("include").join(HEADER_FILE).is_file()
}

/// The loadable shared library for `platform` is present under `root`.
pub fn library_exists(root: &Path, platform: &Platform) -> bool {
    platform.library_path(root).is_some_and(|path| path.is_file())
}

pub fn resolve_version(from_env: Option<String>) -> String {
    from_env
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string())
}

pub fn release_url(version: &str, override_url: Option<String>) -> String {
    match override_url.filter(|u| !u.is_empty()) {
        Some(url) => url,
        None => DEFAULT_RELEASE_URL_TEMPLATE.replace("{version}", version),
    }
}

/// Make sure the native binaries for the current platform exist under `root`.
///
/// Cached files short-circuit. Otherwise the release archive is downloaded
/// and extracted into `root`; any failure there falls back to building from
/// source. The shared library is then linked from the static archive if it
/// is not there yet.
pub fn ensure_binaries_exist(root: &Path) -> Result<(), FetchError> {
    let platform = Platform::current();
    if platform.archive_file_name().is_none() {
        return Err(FetchError::UnsupportedPlatform {
            os: platform.os,
            arch: platform.arch,
        });
    }

    if library_exists(root, &platform) && binaries_exist(root, &platform) {
        tracing::debug!("native binaries for {} already cached in {:?}", platform, root);
        return Ok(());
    }

    if !binaries_exist(root, &platform) {
        fetch_release(root, &platform)?;
    }

    if !library_exists(root, &platform) {
        link_shared_library(root, &platform)?;
    }

    tracing::info!("native binaries ready for {}", platform);
    Ok(())
}

fn fetch_release(root: &Path, platform: &Platform) -> Result<(), FetchError> {
    let version = resolve_version(std::env::var(VERSION_ENV).ok());
    let url = release_url(&version, std::env::var(RELEASE_URL_ENV).ok());
    let expected_sha256 = std::env::var(SHA256_ENV).ok().filter(|s| !s.is_empty());
    let source = std::env::var_os(SOURCE_DIR_ENV)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| root.to_path_buf());

    tracing::info!("downloading native binaries {} for {}", version, platform);
    if let Err(e) = download_and_extract(root, &url, expected_sha256.as_deref()) {
        tracing::warn!("download failed ({}), falling back to building from source", e);
        return build_from_source(&source, root, platform);
    }

    if !binaries_exist(root, platform) {
        tracing::warn!("download incomplete, falling back to building from source");
        return build_from_source(&source, root, platform);
    }
    Ok(())
}

/// Download `url` into `root`, verify it when a digest is given, and unpack it.
pub fn download_and_extract(
    root: &Path,
    url: &str,
    expected_sha256: Option<&str>,
) -> Result<usize, FetchError> {
    fs::create_dir_all(root)?;
    let tmp_path = root.join(DOWNLOAD_FILE);

    let result = (|| -> Result<usize, FetchError> {
        download_file(url, &tmp_path)?;
        if let Some(expected) = expected_sha256 {
            let actual = compute_sha256(&tmp_path)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(FetchError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        let archive = BufReader::new(File::open(&tmp_path)?);
        extract_tar_gz(archive, root)
    })();

    let _ = fs::remove_file(&tmp_path);
    result
}

fn download_file(url: &str, dest: &Path) -> Result<(), FetchError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let mut response = client.get(url).send()?.error_for_status()?;
    let mut file = File::create(dest)?;
    response.copy_to(&mut file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Unpack a gzip-compressed tar stream into `dest`.
///
/// Entries escaping `dest` and entries larger than [`MAX_ENTRY_SIZE`] abort
/// the extraction. Returns the number of regular files written.
pub fn extract_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<usize, FetchError> {
    extract_with_limit(reader, dest, MAX_ENTRY_SIZE)
}

fn extract_with_limit<R: Read>(reader: R, dest: &Path, limit: u64) -> Result<usize, FetchError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut written = 0usize;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let rel = entry.path()?.into_owned();
        let size = entry.header().size()?;
        if size > limit {
            return Err(FetchError::EntryTooLarge { path: rel, size });
        }
        if !is_contained(&rel) {
            return Err(FetchError::UnsafeEntry(rel));
        }

        let target = dest.join(&rel);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&target)?;
            io::copy(&mut (&mut entry).take(limit), &mut file)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }
            written += 1;
        } else {
            tracing::debug!("skipping archive entry {:?} ({:?})", rel, kind);
        }
    }

    Ok(written)
}

/// Relative path with no root, prefix or parent components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Run `make build-native` in the `source` checkout, check the result
/// landed, and copy it into `root` when the two differ.
pub fn build_from_source(source: &Path, root: &Path, platform: &Platform) -> Result<(), FetchError> {
    if !source.join("Makefile").is_file() {
        return Err(FetchError::NoBuildScript(source.to_path_buf()));
    }
    tracing::info!("building native libraries from source in {:?}; this may take several minutes", source);

    let status = match Command::new("make").arg("build-native").current_dir(source).status() {
        Ok(status) => status,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(FetchError::BuildToolMissing),
        Err(e) => return Err(e.into()),
    };
    if !status.success() {
        return Err(FetchError::BuildFailed(status));
    }

    if !binaries_exist(source, platform) {
        return Err(FetchError::BinariesMissing(platform.lib_dir(source)));
    }
    if source != root {
        copy_artifacts(source, root, platform)?;
    }

    tracing::info!("built native libraries from source for {}", platform);
    Ok(())
}

fn copy_artifacts(source: &Path, root: &Path, platform: &Platform) -> Result<(), FetchError> {
    let lib_dir = platform.lib_dir(root);
    fs::create_dir_all(&lib_dir)?;
    for entry in fs::read_dir(platform.lib_dir(source))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), lib_dir.join(entry.file_name()))?;
        }
    }
    let include = root.join("include");
    fs::create_dir_all(&include)?;
    fs::copy(source.join("include").join(HEADER_FILE), include.join(HEADER_FILE))?;
    Ok(())
}

/// Wrap the static archive under `root` into the shared library that
/// `NativeLibrary::open` loads.
pub fn link_shared_library(root: &Path, platform: &Platform) -> Result<PathBuf, FetchError> {
    let (Some(archive), Some(output)) = (platform.archive_path(root), platform.library_path(root))
    else {
        return Err(FetchError::UnsupportedPlatform {
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        });
    };
    if !archive.is_file() {
        return Err(FetchError::BinariesMissing(platform.lib_dir(root)));
    }
    let args = platform
        .link_args(&archive, &output)
        .ok_or_else(|| FetchError::LinkUnsupported(platform.dir.clone()))?;

    let cc = std::env::var_os("CC")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "cc".into());
    tracing::info!("linking {:?} from {:?}", output, archive);
    let status = match Command::new(&cc).args(&args).status() {
        Ok(status) => status,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(FetchError::BuildToolMissing),
        Err(e) => return Err(e.into()),
    };
    if !status.success() || !output.is_file() {
        return Err(FetchError::LinkFailed { path: output, status });
    }
    Ok(output)
}

pub fn compute_sha256(path: &Path) -> Result<String, FetchError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
