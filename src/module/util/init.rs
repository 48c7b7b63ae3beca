//! This module is responsible for preparing the resources needed by the service, such as directories and configuration.
//!

pub mod resource {
    use super::{AppDir, AppPath, Property};
    use crate::module::define;
    use crate::module::util::path::{dir, join};

    /// Initialize the application resources and return a Property instance containing paths and configuration.
    ///
    /// Directory resolution is forgiving: when the configured image or
    /// log location cannot be created, the service falls back to `$HOME`
    /// and then `/tmp` instead of refusing to start. The resolved paths
    /// are written back into the configuration so every component sees
    /// the effective locations.
    ///
    /// # Arguments
    ///
    /// * `config_dir` - Directory holding `conf.toml`; `None` resolves
    ///   the standard data directory with its fallback chain.
    ///
    pub fn init(config_dir: Option<&str>) -> Property {
        // Prepare the app data directory (configuration lives here).
        let data_dir = match config_dir {
            Some(dir) => dir::create_dir_from_path_list(&[dir])
                .expect("Can't create the given config directory."),
            None => dir::create_data_dir(),
        };

        // Load the app configuration file, generating the default on first run.
        let mut conf =
            crate::module::util::conf::toml::load(&data_dir).expect("Can't load config.");

        let img_dir = dir::create_dir_with_fallbacks(
            &conf.paths.image_save_base_dir,
            &fallback_candidates("captures"),
        )
        .expect("Can't create image directory.");
        conf.paths.image_save_base_dir = img_dir.clone();

        let log_dir =
            dir::create_dir_with_fallbacks(&conf.paths.log_dir, &fallback_candidates("logs"))
                .expect("Can't create log directory.");
        conf.paths.log_dir = log_dir.clone();

        Property {
            path: AppPath {
                dir: AppDir {
                    data: data_dir,
                    img: img_dir,
                    log: log_dir,
                },
            },
            conf,
        }
    }

    /// Fallback directory candidates for a named resource, in order of
    /// preference: `$HOME/framekeeper/<name>`, then `/tmp/framekeeper/<name>`.
    fn fallback_candidates(name: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(join(&[&home, define::system::NAME, name]));
        }
        candidates.push(join(&[
            define::path::EPHEMERAL_DIR,
            define::system::NAME,
            name,
        ]));
        candidates
    }
}

/// This struct represents the properties of the service, such as paths and configuration.
///
#[derive(Debug, Clone)]
pub struct Property {
    pub path: AppPath,                              // The paths of the app resources
    pub conf: crate::module::util::conf::Config,    // The configuration of the app
}

/// Paths of Resources
#[derive(Debug, Clone)]
pub struct AppPath {
    /// Directories Paths
    pub dir: AppDir,
}

/// Paths of Directories
#[derive(Debug, Clone)]
pub struct AppDir {
    /// Data Directory Path (configuration)
    pub data: String,
    /// Image Store Base Directory Path
    pub img: String,
    /// Log Directory Path
    pub log: String,
}
