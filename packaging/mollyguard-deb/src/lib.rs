//! Packaging-only crate: `cargo deb -p mollyguard-deb` reads the metadata in
//! `Cargo.toml`. There is no code to ship here.
