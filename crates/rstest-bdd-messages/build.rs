//! Records the compiler version reported in run metadata.

#![expect(
    clippy::print_stdout,
    reason = "cargo reads build script directives from stdout"
)]

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    match rustc_version::version() {
        Ok(version) => println!("cargo:rustc-env=RSTEST_BDD_MESSAGES_RUSTC_VERSION={version}"),
        Err(err) => println!("cargo:warning=rustc version unavailable for run metadata: {err}"),
    }
}
