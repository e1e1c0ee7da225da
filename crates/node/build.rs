use std::process::Command;

/// Expose the short commit hash to `util::build_version`.
fn main() {
    let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    else {
        return;
    };
    if let Ok(hash) = String::from_utf8(output.stdout) {
        let hash = hash.trim();
        if !hash.is_empty() {
            println!("cargo:rustc-env=GIT_SHORT_HASH={hash}");
        }
    }
}
