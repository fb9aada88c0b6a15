#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "viewer.json".to_string());
    let config = vitrine::ViewerConfig::from_file(&config_path)?;
    vitrine::app::run(config)
}

// The web build is driven by an embedding page through the library crate.
#[cfg(target_arch = "wasm32")]
fn main() {}
