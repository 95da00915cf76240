use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Initial arena capacities, in elements. Arenas double on demand, so these
/// only decide how many growth steps a scene pays for at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_vertex_capacity")]
    pub vertex_capacity: usize,
    #[serde(default = "ServerSettings::default_index_capacity")]
    pub index_capacity: usize,
    #[serde(default = "ServerSettings::default_object_capacity")]
    pub object_capacity: usize,
    #[serde(default = "ServerSettings::default_material_capacity")]
    pub material_capacity: usize,
    #[serde(default = "ServerSettings::default_draw_capacity")]
    pub draw_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            vertex_capacity: Self::default_vertex_capacity(),
            index_capacity: Self::default_index_capacity(),
            object_capacity: Self::default_object_capacity(),
            material_capacity: Self::default_material_capacity(),
            draw_capacity: Self::default_draw_capacity(),
        }
    }
}

impl ServerSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ServerSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded server settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default server settings.",
                        path, err
                    );
                    ServerSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Server settings file {:?} not found. Using default settings.",
                    path
                );
                ServerSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default server settings.",
                    path, err
                );
                ServerSettings::default()
            }
        }
    }

    /// Replaces zero capacities with their defaults.
    pub fn validate(mut self) -> Self {
        fn fix(name: &str, value: &mut usize, default: usize) {
            if *value == 0 {
                warn!("{} must be greater than zero. Using {} instead.", name, default);
                *value = default;
            }
        }

        fix(
            "vertex_capacity",
            &mut self.vertex_capacity,
            Self::default_vertex_capacity(),
        );
        fix(
            "index_capacity",
            &mut self.index_capacity,
            Self::default_index_capacity(),
        );
        fix(
            "object_capacity",
            &mut self.object_capacity,
            Self::default_object_capacity(),
        );
        fix(
            "material_capacity",
            &mut self.material_capacity,
            Self::default_material_capacity(),
        );
        fix(
            "draw_capacity",
            &mut self.draw_capacity,
            Self::default_draw_capacity(),
        );
        self
    }

    const fn default_vertex_capacity() -> usize {
        4096
    }

    const fn default_index_capacity() -> usize {
        16384
    }

    const fn default_object_capacity() -> usize {
        1024
    }

    const fn default_material_capacity() -> usize {
        256
    }

    const fn default_draw_capacity() -> usize {
        256
    }
}
