use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let o = Command::new("git").args(args).output().ok()?;
    if !o.status.success() {
        return None;
    }
    String::from_utf8(o.stdout).ok().map(|s| s.trim().to_string())
}

fn main() {
    // Outside a checkout, fall back to the package version
    let version = git(&["describe", "--always", "--tags", "--dirty"])
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    println!("cargo:rustc-env=VERSION={version}");

    if let Some(dir) = git(&["rev-parse", "--path-format=relative", "--git-dir"]) {
        println!("cargo:rerun-if-changed={dir}/HEAD");
    }
}
