//! Optional capability loading over a freshly built backend.
//!
//! Each step is independent and failure-isolated: a step that errors logs a
//! warning, leaves its flag off, and never prevents later steps from
//! running. The steps run in a fixed order — acceleration last, since it
//! swaps the scheduling strategy of whatever was built before it.

use log::{debug, info, warn};

use crate::backend::GenerationBackend;
use crate::config::GenerationConfig;

/// Which optional capabilities survived pipeline construction.
///
/// Populated once by [`CapabilityLoader::apply`] and read-only afterwards;
/// downstream code queries these flags instead of probing the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    /// Attention-efficiency optimization is active.
    pub attention_slicing: bool,
    /// Style/identity adapter conditioning is loaded.
    pub style_adapter: bool,
    /// Number of embedding sources that loaded successfully.
    pub embeddings_loaded: usize,
    /// Low-step acceleration adapter is installed.
    pub accelerator: bool,
}

/// Applies the optional capability steps in their fixed order.
pub struct CapabilityLoader;

impl CapabilityLoader {
    /// Run every step against `backend`, returning the surviving flags.
    pub fn apply(backend: &mut dyn GenerationBackend, config: &GenerationConfig) -> CapabilityFlags {
        let mut flags = CapabilityFlags::default();
        try_enable_attention_slicing(backend, config, &mut flags);
        try_load_style_adapter(backend, config, &mut flags);
        try_load_embeddings(backend, config, &mut flags);
        try_install_accelerator(backend, config, &mut flags);
        flags
    }
}

fn try_enable_attention_slicing(
    backend: &mut dyn GenerationBackend,
    config: &GenerationConfig,
    flags: &mut CapabilityFlags,
) {
    if !config.enable_attention_slicing {
        debug!("Attention-efficiency optimization disabled in configuration.");
        return;
    }
    match backend.enable_attention_slicing() {
        Ok(()) => {
            info!("Enabled attention-efficiency optimization.");
            flags.attention_slicing = true;
        }
        Err(err) => warn!("Attention optimization unavailable: {}", err),
    }
}

fn try_load_style_adapter(
    backend: &mut dyn GenerationBackend,
    config: &GenerationConfig,
    flags: &mut CapabilityFlags,
) {
    let Some(adapter) = &config.style_adapter else {
        debug!("No style-adapter configuration found.");
        return;
    };
    if adapter.weight_names.is_empty() {
        debug!("Style-adapter configuration has no weights; skipping.");
        return;
    }
    match backend.load_style_adapter(&adapter.repo, &adapter.subfolder, &adapter.weight_names) {
        Ok(()) => {
            info!("Style adapter loaded from {}.", adapter.repo);
            flags.style_adapter = true;
        }
        Err(err) => warn!("Style adapter load failed: {}", err),
    }
}

fn try_load_embeddings(
    backend: &mut dyn GenerationBackend,
    config: &GenerationConfig,
    flags: &mut CapabilityFlags,
) {
    // Each source is isolated; one bad source does not block the others.
    for source in &config.embedding_sources {
        match backend.load_embedding(source) {
            Ok(()) => {
                info!("Loaded embedding from {}.", source);
                flags.embeddings_loaded += 1;
            }
            Err(err) => warn!("Embedding load failed for {}: {}", source, err),
        }
    }
}

fn try_install_accelerator(
    backend: &mut dyn GenerationBackend,
    config: &GenerationConfig,
    flags: &mut CapabilityFlags,
) {
    if !config.accelerator.enabled {
        debug!("Acceleration adapter not enabled.");
        return;
    }
    match backend.install_accelerator(&config.accelerator.module_id) {
        Ok(()) => {
            info!(
                "Acceleration adapter {} installed; scheduler replaced.",
                config.accelerator.module_id
            );
            flags.accelerator = true;
        }
        Err(err) => {
            // Original scheduler stays in place on failure.
            warn!("Acceleration adapter install failed: {}", err);
        }
    }
}
