//! Writes `metadata.toml`, which records where and how a run was carried out.
use anyhow::{Result, anyhow};
use chrono::Local;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Details of the run which are not part of the results
pub struct RunInfo<'a> {
    /// Path to the model directory
    pub model_path: &'a Path,
    /// Name of the site
    pub site_name: &'a str,
    /// Wall-clock time taken to build and solve the optimisation problem
    pub solve_time: Duration,
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    program: ProgramMetadata,
    platform: PlatformMetadata,
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    model_path: &'a Path,
    site_name: &'a str,
    /// RFC 2822 date and time at which the metadata was written
    finished: String,
    solve_seconds: f64,
}

#[derive(Serialize)]
struct ProgramMetadata {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    is_debug: bool,
    rustc_version: &'static str,
    build_time_utc: &'static str,
    /// Short commit hash, with `-dirty` appended if there were uncommitted changes
    git_commit_hash: String,
}

impl ProgramMetadata {
    fn new() -> Self {
        let git_commit_hash = match built_info::GIT_COMMIT_HASH_SHORT {
            Some(hash) if built_info::GIT_DIRTY == Some(true) => format!("{hash}-dirty"),
            Some(hash) => hash.to_string(),
            None => "unknown".to_string(),
        };

        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash,
        }
    }
}

/// The operating system and machine, as reported by [`PlatformInfo`]
#[derive(Serialize)]
struct PlatformMetadata {
    sysname: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}

/// Write metadata for a completed run to `output_path`
pub fn write_metadata(output_path: &Path, run: &RunInfo) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata {
            model_path: run.model_path,
            site_name: run.site_name,
            finished: Local::now().to_rfc2822(),
            solve_seconds: run.solve_time.as_secs_f64(),
        },
        program: ProgramMetadata::new(),
        platform: PlatformMetadata::new()?,
    };
    fs::write(
        output_path.join(METADATA_FILE_NAME),
        toml::to_string(&metadata)?,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_metadata() {
        let dir = tempdir().unwrap();
        let run = RunInfo {
            model_path: Path::new("demos/simple"),
            site_name: "Village",
            solve_time: Duration::from_millis(1500),
        };
        write_metadata(dir.path(), &run).unwrap();

        let contents = fs::read_to_string(dir.path().join(METADATA_FILE_NAME)).unwrap();
        let metadata: toml::Table = toml::from_str(&contents).unwrap();
        assert_eq!(metadata["run"]["model_path"].as_str(), Some("demos/simple"));
        assert_eq!(metadata["run"]["site_name"].as_str(), Some("Village"));
        assert_eq!(metadata["run"]["solve_seconds"].as_float(), Some(1.5));
        assert_eq!(
            metadata["program"]["name"].as_str(),
            Some(built_info::PKG_NAME)
        );
        assert!(metadata.contains_key("platform"));
    }
}
