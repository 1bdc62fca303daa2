//! Copies `memory.x` next to the build output so the linker finds it from
//! inside the workspace, and stamps the firmware and board versions into
//! the binary.

use std::{env, fs::File, io::Write, path::PathBuf};

#[derive(Clone, Copy, PartialEq, PartialOrd, Default)]
enum HwVersion {
    #[default]
    Rev1,
}

impl HwVersion {
    fn as_str(self) -> &'static str {
        match self {
            Self::Rev1 => "rev1",
        }
    }
}

fn linker_data() -> &'static [u8] {
    include_bytes!("memory.x")
}

fn main() {
    let hw_features = [(cfg!(feature = "rev1"), HwVersion::Rev1)];

    let enabled_hw: Vec<HwVersion> = hw_features
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, version)| version)
        .collect();

    if enabled_hw.len() > 1 {
        panic!("At most one hardware feature may be enabled.");
    }

    let hw_ver = enabled_hw.first().cloned().unwrap_or_default();

    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(linker_data())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    if env::var("CARGO_FEATURE_DEFMT").is_ok() {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }

    // Outside a git checkout the hash is simply left off.
    let pkg_version = env!("CARGO_PKG_VERSION");
    let git_hash = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_owned())
        .unwrap_or_default();

    if git_hash.is_empty() {
        println!("cargo:rustc-env=FW_VERSION={pkg_version}");
    } else {
        println!("cargo:rustc-env=COMMIT_HASH={git_hash}");
        println!("cargo:rustc-env=FW_VERSION={pkg_version}-{git_hash}");
    }

    println!("cargo:rustc-env=HW_VERSION={}", hw_ver.as_str());
}
