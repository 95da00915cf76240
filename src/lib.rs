pub mod asset;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use asset::{Mesh, MeshRef};
pub use error::{ArenaError, ContextError, RenderError};
pub use renderer::{
    BatchRenderer, FrameStats, GpuContext, HostDevice, Material, MaterialRef, ObjectHandle,
    RenderServer, ShaderHandle,
};
pub use scene::Transform;
pub use settings::ServerSettings;

/// Installs `env_logger` with an `Info` default; `RUST_LOG` still wins.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
