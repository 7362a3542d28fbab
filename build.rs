use std::env;
use std::path::PathBuf;

fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // Only Windows builds need help locating FFmpeg.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=endframe needs FFmpeg development libraries; set FFMPEG_DIR (or VCPKG_ROOT with an ffmpeg install)."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if candidate.exists() {
        println!(
            "cargo:warning=Found vcpkg FFmpeg at {}; export FFMPEG_DIR to that path to silence this warning.",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=No vcpkg FFmpeg install at {}.",
            candidate.display()
        );
    }
}
