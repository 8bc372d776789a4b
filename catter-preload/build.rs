// SPDX-License-Identifier: GPL-3.0-or-later

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" && target_os != "macos" {
        println!("cargo:warning=catter-preload is only supported on Linux and macOS");
        return;
    }

    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/variadic.c");
    println!("cargo:rerun-if-env-changed=CATTER_DEFAULT_PROXY_PATH");

    // A session missing its own proxy-path key (an otherwise-uninitialized
    // environment) still needs somewhere to send its error report. Bake in
    // a fallback location, overridable at build time.
    let default_proxy_path = std::env::var("CATTER_DEFAULT_PROXY_PATH")
        .unwrap_or_else(|_| "/usr/local/libexec/catter/catter-proxy".to_string());
    println!("cargo:rustc-env=CATTER_DEFAULT_PROXY_PATH={default_proxy_path}");

    // Force building cdylib even in debug mode.
    println!("cargo:rustc-cfg=build_cdylib");
    println!("cargo:rustc-check-cfg=cfg(build_cdylib)");

    if target_os == "linux" {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--export-dynamic");
        println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN");
    }

    // Perform system capability checks (dlsym/RTLD_NEXT/exec family presence).
    platform_checks::perform_system_checks();

    // The variadic execl/execlp/execle entry points can't be expressed in
    // Rust directly (Rust has no varargs), so a small C shim collects the
    // platform's variadic argument list into a NULL-terminated argv and
    // hands it to our Rust implementation.
    cc::Build::new()
        .file("src/variadic.c")
        .warnings(true)
        .compile("catter_variadic");
}
