//! Render core error types

use thiserror::Error;

/// Render core errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Shader program '{label}' failed to build: {log}")]
    ShaderCompile { label: String, log: String },

    #[error("Framebuffer '{label}' is incomplete: {reason}")]
    IncompleteFramebuffer { label: String, reason: String },

    #[error("Unknown {kind} handle {id}")]
    UnknownResource { kind: &'static str, id: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for render core operations
pub type RenderResult<T> = Result<T, RenderError>;
