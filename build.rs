// Empty build script: exists only so the `[build-dependencies]` entry in
// Cargo.toml is resolved (see the comment there).
fn main() {}
