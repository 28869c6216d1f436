fn main() {
    cdylib_link_lines::metabuild();

    #[cfg(feature = "cbindgen")]
    {
        let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        if let Ok(bindings) = cbindgen::generate(&crate_dir) {
            bindings.write_to_file("httpcore.h");
        }
    }
}
