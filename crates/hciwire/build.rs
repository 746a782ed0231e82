fn main() {
    for (from, to) in [
        ("TARGET", "HCIWIRE_BUILD_TARGET"),
        ("PROFILE", "HCIWIRE_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(from) {
            println!("cargo:rustc-env={to}={value}");
        }
        println!("cargo:rerun-if-env-changed={from}");
    }
}
