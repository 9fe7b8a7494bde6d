use std::process::Command;

/// Build identifier reported by `GET /health`.
///
/// Release images are built without a `.git` directory, so an explicit
/// `CHIME_BUILD_ID` wins over `git describe`.
fn build_id() -> String {
    if let Ok(id) = std::env::var("CHIME_BUILD_ID") {
        if !id.trim().is_empty() {
            return id.trim().to_owned();
        }
    }

    Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_owned())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "dev".to_owned())
}

fn main() {
    println!("cargo:rustc-env=CHIME_BUILD_ID={}", build_id());
    println!("cargo:rerun-if-env-changed=CHIME_BUILD_ID");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");
}
