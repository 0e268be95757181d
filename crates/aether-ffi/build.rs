use std::env;
use std::path::Path;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    let bindings = cbindgen::Builder::new()
        .with_language(cbindgen::Language::C)
        .with_crate(&crate_dir)
        .with_include_guard("AETHER_H")
        .with_documentation(true)
        .generate()
        .unwrap();
    bindings.write_to_file(Path::new(&crate_dir).join("aether.h"));
}
