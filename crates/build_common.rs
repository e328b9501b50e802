// Shared build script helper that turns a crate README.md into rustdoc.
// Include this in build.rs files with: include!("../build_common.rs");
//
// Required imports in the including file:
//   use std::env;
//   use std::fs;
//   use std::path::Path;

/// Copy a crate's README.md into `OUT_DIR/README_GENERATED.md` for rustdoc.
///
/// Links of the form `](src/foo.rs)` are rewritten to `](foo)` so they resolve
/// to modules. Links back to the workspace README are flattened to plain text
/// because rustdoc has nowhere to point them.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");

    let readme_path = Path::new(crate_dir).join("README.md");
    let content = fs::read_to_string(&readme_path).unwrap_or_else(|_| {
        // Still emit something so `include_str!` in lib.rs resolves.
        let name = env::var("CARGO_PKG_NAME").unwrap_or_default();
        format!("# {name}\n")
    });

    let rustdoc_content = content
        .replace("](src/", "](")
        .replace(".rs)", ")")
        .replace("](../../README.md)", "]");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("README_GENERATED.md");
    fs::write(dest_path, rustdoc_content).expect("failed to write README_GENERATED.md");
}
