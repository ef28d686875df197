//! Build script: pre-flight checks for GPU feature flags.
//!
//! Verifies that required toolkits are installed before whisper-rs-sys tries
//! to compile, so a missing CUDA or Vulkan SDK fails with a readable message
//! instead of deep inside a cmake log.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        check_cuda();
    }
    if cfg!(feature = "vulkan") {
        check_vulkan();
    }
}

fn check_cuda() {
    let output = Command::new("nvcc").arg("--version").output();
    match output {
        Ok(out) if out.status.success() => {
            let version = String::from_utf8_lossy(&out.stdout);
            if let Some(line) = version.lines().find(|l| l.contains("release")) {
                println!("cargo:warning=Building with CUDA: {}", line.trim());
            }
        }
        _ => {
            println!("cargo:warning=CUDA feature enabled but nvcc was not found in PATH.");
            println!("cargo:warning=Install the CUDA toolkit or build without --features cuda.");
        }
    }
}

fn check_vulkan() {
    let output = Command::new("glslc").arg("--version").output();
    if output.is_err() {
        println!("cargo:warning=Vulkan feature enabled but glslc was not found in PATH.");
        println!("cargo:warning=Install the Vulkan SDK (shaderc) or build without --features vulkan.");
    }
}
