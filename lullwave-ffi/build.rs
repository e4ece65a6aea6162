// Build script that tries to generate the C header with `cbindgen`.
// Without `cbindgen` it copies the checked-in `include/lullwave.h` to $OUT_DIR.
//
// Consumers can include the header from either:
//   - <repo>/lullwave-ffi/include/lullwave.h   (checked-in)
//   - $OUT_DIR/lullwave.h

use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/lullwave.h");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        println!("cargo:warning=lullwave-ffi: cargo directories not set; skipping header");
        return;
    };
    let crate_dir = PathBuf::from(crate_dir);
    let header_repo = crate_dir.join("include").join("lullwave.h");
    let header_out = PathBuf::from(out_dir).join("lullwave.h");

    let cbindgen_ok = Command::new("cbindgen")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if cbindgen_ok {
        let generated = Command::new("cbindgen")
            .args(["--crate", "lullwave-ffi", "--lang", "C", "--output"])
            .arg(&header_out)
            .current_dir(&crate_dir)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if generated {
            println!("cargo:warning=lullwave-ffi: generated header with cbindgen -> {}", header_out.display());
            return;
        }
        println!("cargo:warning=lullwave-ffi: cbindgen failed; falling back to checked-in header");
    }

    if let Err(e) = fs::copy(&header_repo, &header_out) {
        println!("cargo:warning=lullwave-ffi: could not copy include/lullwave.h: {e}");
    }
}
