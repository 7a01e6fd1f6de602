//! Host configuration
//!
//! Read from a `modhost.toml` file:
//!
//! ```toml
//! [host]
//! library = "native/libnative_host.so"
//! flavor = "native-host"
//! auto_initialize = true
//! runtime_config = "app.runtimeconfig.json"
//!
//! [logging]
//! level = "info"
//!
//! [[modules]]
//! path = "Calculator.dll"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aot::AotEntryPoints;
use crate::dylib::{Binding, EntryPoints, ResolverAbi};
use crate::error::{HostError, Result};

/// Default configuration file name
pub const CONFIG_FILE: &str = "modhost.toml";

/// Environment variable that overrides `logging.level`
pub const LOG_ENV: &str = "MODHOST_LOG";

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModhostConfig {
    pub host: HostConfig,
    pub logging: LoggingConfig,
    pub modules: Vec<ModuleSpec>,
}

/// The `[host]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Path to the native hosting library
    pub library: PathBuf,
    pub flavor: Flavor,
    /// Start the runtime as part of host creation
    pub auto_initialize: bool,
    /// Runtime configuration file passed to the native initialize
    pub runtime_config: Option<PathBuf>,
    /// Name used in logs and error context
    pub name: String,
    /// Per-symbol overrides of the flavor's entry point names
    pub entry_points: EntryPointOverrides,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::new(),
            flavor: Flavor::default(),
            auto_initialize: true,
            runtime_config: None,
            name: "default".to_string(),
            entry_points: EntryPointOverrides::default(),
        }
    }
}

/// Which family of hosting library exports `library` provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flavor {
    #[default]
    NativeHost,
    NativePluginHost,
    /// Handle-less library exporting `initialize_runtime`,
    /// `load_assembly_and_get_function_pointer` and `close_runtime`
    NativeAotPluginHost,
}

/// Optional symbol name overrides under `[host.entry_points]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPointOverrides {
    pub create: Option<String>,
    pub destroy: Option<String>,
    pub initialize: Option<String>,
    pub load: Option<String>,
    pub unload: Option<String>,
    pub resolve: Option<String>,
    /// Only used by the plugin host resolvers
    pub delegate_type: Option<String>,
}

/// The `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `modhost=debug`
    pub level: String,
    pub format: LogFormat,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// The configured level, unless `MODHOST_LOG` is set.
    pub fn effective_level(&self) -> String {
        std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.level.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// One `[[modules]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub path: String,
}

impl ModhostConfig {
    /// Load configuration from a TOML file.
    ///
    /// A relative `host.library` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(dir) = path.parent() {
            if config.host.library.is_relative() {
                config.host.library = dir.join(&config.host.library);
            }
            if let Some(runtime_config) = &mut config.host.runtime_config {
                if runtime_config.is_relative() {
                    *runtime_config = dir.join(&*runtime_config);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ModhostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Walk up from `start_dir` looking for `modhost.toml`.
    pub fn discover(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    fn validate(&self) -> Result<()> {
        if self.host.library.as_os_str().is_empty() {
            return Err(HostError::Config(
                "host.library must name the native hosting library".to_string(),
            ));
        }
        if self.host.name.is_empty() {
            return Err(HostError::Config("host.name cannot be empty".to_string()));
        }
        if self
            .host
            .runtime_config
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(HostError::Config(
                "host.runtime_config cannot be empty".to_string(),
            ));
        }
        if let Some(module) = self.modules.iter().find(|m| m.path.is_empty()) {
            return Err(HostError::Config(format!(
                "module path cannot be empty: {:?}",
                module
            )));
        }
        Ok(())
    }
}

fn replace(slot: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

impl HostConfig {
    /// How to bind `library`: the flavor's entry points with any configured
    /// overrides applied.
    pub fn binding(&self) -> Binding {
        let overrides = &self.entry_points;
        let mut entry_points = match self.flavor {
            Flavor::NativeHost => EntryPoints::native_host(),
            Flavor::NativePluginHost => EntryPoints::native_plugin_host(),
            Flavor::NativeAotPluginHost => {
                let mut aot = AotEntryPoints::native_aot_plugin_host();
                replace(&mut aot.initialize, &overrides.initialize);
                replace(&mut aot.resolve, &overrides.resolve);
                replace(&mut aot.close, &overrides.destroy);
                replace(&mut aot.delegate_type, &overrides.delegate_type);
                return Binding::Aot(aot);
            }
        };

        replace(&mut entry_points.create, &overrides.create);
        replace(&mut entry_points.destroy, &overrides.destroy);
        replace(&mut entry_points.load, &overrides.load);
        replace(&mut entry_points.unload, &overrides.unload);
        replace(&mut entry_points.resolve, &overrides.resolve);
        if overrides.initialize.is_some() {
            entry_points.initialize = overrides.initialize.clone();
        }
        if let (ResolverAbi::FunctionPointer { delegate_type }, Some(value)) =
            (&mut entry_points.resolver, &overrides.delegate_type)
        {
            *delegate_type = value.clone();
        }

        Binding::Handles(entry_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ModhostConfig::from_toml_str(
            r#"
            [host]
            library = "libnative_host.so"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.flavor, Flavor::NativeHost);
        assert!(config.host.auto_initialize);
        assert_eq!(config.host.name, "default");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = ModhostConfig::from_toml_str(
            r#"
            [host]
            library = "/opt/native/libnative_plugin_host.so"
            flavor = "native-plugin-host"
            auto_initialize = false
            name = "plugins"

            [host.entry_points]
            delegate_type = "Demo.AddDelegate, Demo"

            [logging]
            level = "modhost=debug"
            format = "json"

            [[modules]]
            path = "Calculator.runtimeconfig.json"

            [[modules]]
            path = "Logger.runtimeconfig.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.flavor, Flavor::NativePluginHost);
        assert!(!config.host.auto_initialize);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.modules.len(), 2);

        let Binding::Handles(entry_points) = config.host.binding() else {
            panic!("plugin host binds through handles");
        };
        assert_eq!(entry_points.load, "native_plugin_host_load");
        assert_eq!(
            entry_points.resolver,
            ResolverAbi::FunctionPointer {
                delegate_type: "Demo.AddDelegate, Demo".to_string()
            }
        );
    }

    #[test]
    fn test_entry_point_overrides() {
        let config = ModhostConfig::from_toml_str(
            r#"
            [host]
            library = "libcustom.so"

            [host.entry_points]
            create = "custom_create"
            resolve = "custom_resolve"
            "#,
        )
        .unwrap();

        let Binding::Handles(entry_points) = config.host.binding() else {
            panic!("native host binds through handles");
        };
        assert_eq!(entry_points.create, "custom_create");
        assert_eq!(entry_points.resolve, "custom_resolve");
        assert_eq!(entry_points.destroy, "native_host_destroy");
        assert_eq!(entry_points.resolver, ResolverAbi::Delegate);
    }

    #[test]
    fn test_aot_plugin_host_binding() {
        let config = ModhostConfig::from_toml_str(
            r#"
            [host]
            library = "libnative_aot_plugin_host.so"
            flavor = "native-aot-plugin-host"
            runtime_config = "/srv/app/Calculator.runtimeconfig.json"

            [host.entry_points]
            destroy = "shutdown_runtime"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.flavor, Flavor::NativeAotPluginHost);
        assert_eq!(
            config.host.runtime_config,
            Some(PathBuf::from("/srv/app/Calculator.runtimeconfig.json"))
        );
        let Binding::Aot(entry_points) = config.host.binding() else {
            panic!("AOT plugin host binds without handles");
        };
        assert_eq!(entry_points.initialize, "initialize_runtime");
        assert_eq!(entry_points.resolve, "load_assembly_and_get_function_pointer");
        assert_eq!(entry_points.close, "shutdown_runtime");
    }

    #[test]
    fn test_empty_runtime_config_rejected() {
        let err = ModhostConfig::from_toml_str(
            "[host]\nlibrary = \"lib.so\"\nruntime_config = \"\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn test_missing_library_rejected() {
        let err = ModhostConfig::from_toml_str("[logging]\nlevel = \"debug\"\n").unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn test_unknown_flavor_rejected() {
        let err = ModhostConfig::from_toml_str(
            "[host]\nlibrary = \"lib.so\"\nflavor = \"jvm\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, HostError::Toml(_)));
    }

    #[test]
    fn test_load_resolves_library_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[host]\nlibrary = \"native/libnative_host.so\"\n").unwrap();

        let config = ModhostConfig::load(&path).unwrap();
        assert_eq!(
            config.host.library,
            dir.path().join("native/libnative_host.so")
        );

        std::fs::write(
            &path,
            r#"
            [host]
            library = "/lib/libnative_aot_plugin_host.so"
            runtime_config = "app.runtimeconfig.json"
            "#,
        )
        .unwrap();
        let config = ModhostConfig::load(&path).unwrap();
        assert_eq!(
            config.host.runtime_config,
            Some(dir.path().join("app.runtimeconfig.json"))
        );
    }

    #[test]
    fn test_load_keeps_absolute_library() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[host]\nlibrary = \"/usr/lib/libnative_host.so\"").unwrap();

        let config = ModhostConfig::load(file.path()).unwrap();
        assert_eq!(config.host.library, PathBuf::from("/usr/lib/libnative_host.so"));
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[host]\nlibrary = \"x.so\"\n").unwrap();

        assert_eq!(
            ModhostConfig::discover(&nested),
            Some(dir.path().join(CONFIG_FILE))
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModhostConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }
}
