use std::process::Command;

const SHA_VAR: &str = "PAYSTREAM_GIT_SHA";

// Exposes the build's commit to `/health`. A value already set in the
// environment wins, for builds from a source tarball without `.git`.
fn main() {
    println!("cargo:rerun-if-env-changed={SHA_VAR}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    let sha = std::env::var(SHA_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env={SHA_VAR}={sha}");
}

/// Short hash of HEAD, suffixed with `-dirty` when the tree has local edits.
fn git_describe() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?;
    let sha = sha.trim();
    (!sha.is_empty()).then(|| sha.to_string())
}
