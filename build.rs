#![forbid(unsafe_code)]

// Build information is captured with fallbacks so that builds outside of a
// git checkout (source tarballs, CI sandboxes) still succeed.
fn main() {
    let branch = build_data::get_git_branch().unwrap_or_else(|_| "unknown".to_string());
    let commit = build_data::get_git_commit_short().unwrap_or_else(|_| "unknown".to_string());
    let dirty = match build_data::get_git_dirty() {
        Ok(d) => d.to_string(),
        Err(_) => "unknown".to_string(),
    };
    let rustc = build_data::get_rustc_version().unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_BRANCH={}", branch);
    println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", commit);
    println!("cargo:rustc-env=GIT_DIRTY={}", dirty);
    println!("cargo:rustc-env=RUSTC_VERSION={}", rustc);

    // Tells cargo not to rebuild build.rs during debug builds when other files change.
    // This speeds up development builds.
    //build_data::no_debug_rebuilds();
}
