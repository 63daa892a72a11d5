//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    libgit2: String,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let (major, minor, rev) = git2::Version::get().libgit2_version();
    let libgit2 = format!("{major}.{minor}.{rev}");

    if json {
        let output = VersionOutput {
            version,
            build,
            libgit2,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    println!("gitnotes version {version} ({build}, libgit2 {libgit2})");
    Ok(())
}
