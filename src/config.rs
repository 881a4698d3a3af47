//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/biofum.toml` (or an explicit path)
//! 2. Environment variables prefixed with `BIOFUM_`, nested with `__`
//!
//! Every section and field has a default, so a missing file yields a usable
//! configuration except for the location of the Tango library.
//!
//! # Example
//! ```no_run
//! use biofum::config::BiofumConfig;
//!
//! # fn main() -> Result<(), biofum::config::ConfigError> {
//! let config = BiofumConfig::load()?;
//! config.validate()?;
//! println!("Tango library: {}", config.stage.library_path()?.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use daq_driver_tango::{Axis, MotionBinding, StageSession, StageSettings, Unit};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::autofocus::{focus_stage, AutofocusPlan, AutofocusResult, FocusMetric, FocusPass};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/biofum.toml";

/// Prefix for environment overrides, e.g. `BIOFUM_STAGE__PORT=COM3`.
pub const ENV_PREFIX: &str = "BIOFUM_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No Tango library configured: set stage.library_path or stage.driver_dir")]
    MissingLibraryPath,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiofumConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub autofocus: AutofocusConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Stage controller connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Tango driver installation; holds `32/` and `64/` library directories.
    #[serde(default)]
    pub driver_dir: Option<PathBuf>,
    /// Which library build to load from `driver_dir`.
    #[serde(default)]
    pub architecture: Architecture,
    /// Explicit library path. Wins over `driver_dir`.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_unit")]
    pub unit: Unit,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            driver_dir: None,
            architecture: Architecture::Auto,
            library_path: None,
            port: default_port(),
            baud_rate: default_baud_rate(),
            unit: default_unit(),
        }
    }
}

/// Library build selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawArchitecture")]
pub enum Architecture {
    /// Match the pointer width of this process.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "32")]
    Bits32,
    #[serde(rename = "64")]
    Bits64,
}

/// TOML and environment values may spell the architecture as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawArchitecture {
    Bits(u32),
    Name(String),
}

impl TryFrom<RawArchitecture> for Architecture {
    type Error = String;

    fn try_from(raw: RawArchitecture) -> Result<Self, Self::Error> {
        let name = match raw {
            RawArchitecture::Bits(bits) => bits.to_string(),
            RawArchitecture::Name(name) => name.to_lowercase(),
        };
        match name.as_str() {
            "auto" => Ok(Self::Auto),
            "32" => Ok(Self::Bits32),
            "64" => Ok(Self::Bits64),
            other => Err(format!(
                "Invalid architecture '{}'. Must be one of: auto, 32, 64",
                other
            )),
        }
    }
}

impl Architecture {
    /// Resolve `Auto` against the running process.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_pointer_width = "64") => Self::Bits64,
            Self::Auto => Self::Bits32,
            fixed => fixed,
        }
    }

    /// Name of the library directory under the driver installation.
    pub fn dir_name(self) -> &'static str {
        match self.resolve() {
            Self::Bits32 => "32",
            _ => "64",
        }
    }
}

impl StageConfig {
    /// Path of the Tango library to load.
    ///
    /// `library_path` if set, otherwise `<driver_dir>/<32|64>/Tango_DLL.dll`.
    pub fn library_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.library_path {
            return Ok(path.clone());
        }
        let driver_dir = self
            .driver_dir
            .as_ref()
            .ok_or(ConfigError::MissingLibraryPath)?;
        Ok(driver_dir
            .join(self.architecture.dir_name())
            .join(tango_sys::LIBRARY_FILE_NAME))
    }

    /// Connection settings for a stage session.
    pub fn settings(&self) -> Result<StageSettings, ConfigError> {
        let baud_rate = i32::try_from(self.baud_rate).map_err(|_| {
            ConfigError::Invalid(format!("baud_rate {} is out of range", self.baud_rate))
        })?;
        Ok(StageSettings {
            port: self.port.clone(),
            baud_rate,
            unit: self.unit,
            ..Default::default()
        })
    }
}

/// Autofocus axis and passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofocusConfig {
    #[serde(default = "default_focus_axis")]
    pub axis: Axis,
    /// Focus axis velocity during a run. Defaults to the plan velocity;
    /// `0` keeps whatever velocity the axis already has.
    #[serde(
        default = "default_focus_velocity",
        deserialize_with = "deserialize_focus_velocity",
        serialize_with = "serialize_focus_velocity"
    )]
    pub velocity: Option<f64>,
    #[serde(default = "default_focus_passes")]
    pub passes: Vec<FocusPass>,
}

impl Default for AutofocusConfig {
    fn default() -> Self {
        Self {
            axis: default_focus_axis(),
            velocity: default_focus_velocity(),
            passes: default_focus_passes(),
        }
    }
}

impl AutofocusConfig {
    pub fn plan(&self) -> AutofocusPlan {
        AutofocusPlan {
            passes: self.passes.clone(),
            velocity: self.velocity,
        }
    }

    /// Run the configured plan on the configured axis of `session`.
    pub fn focus<B, M>(
        &self,
        session: &mut StageSession<B>,
        metric: M,
    ) -> anyhow::Result<AutofocusResult>
    where
        B: MotionBinding,
        M: FocusMetric,
    {
        focus_stage(session, self.axis, metric, &self.plan())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> String {
    "COM1".to_string()
}

fn default_baud_rate() -> u32 {
    57600
}

fn default_unit() -> Unit {
    Unit::Micrometer
}

fn default_focus_axis() -> Axis {
    Axis::Z
}

fn default_focus_velocity() -> Option<f64> {
    AutofocusPlan::default().velocity
}

fn deserialize_focus_velocity<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let velocity = f64::deserialize(deserializer)?;
    Ok((velocity != 0.0).then_some(velocity))
}

fn serialize_focus_velocity<S>(velocity: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(velocity.unwrap_or(0.0))
}

fn default_focus_passes() -> Vec<FocusPass> {
    AutofocusPlan::default().passes
}

impl BiofumConfig {
    /// Load configuration from `config/biofum.toml` and environment variables
    ///
    /// Example override: `BIOFUM_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    /// The provider stack used by [`BiofumConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        if self.stage.port.trim().is_empty() {
            return Err(ConfigError::Invalid("stage.port must not be empty".to_string()));
        }

        if self.stage.baud_rate == 0 {
            return Err(ConfigError::Invalid(
                "stage.baud_rate must be greater than zero".to_string(),
            ));
        }
        self.stage.settings()?;

        self.autofocus
            .plan()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("autofocus: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn from_toml(toml: &str) -> BiofumConfig {
        BiofumConfig::from_figment(Figment::new().merge(Toml::string(toml))).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = BiofumConfig::from_figment(Figment::new()).unwrap();
        assert_eq!(config, BiofumConfig::default());
        assert_eq!(config.stage.port, "COM1");
        assert_eq!(config.stage.baud_rate, 57600);
        assert_eq!(config.stage.unit, Unit::Micrometer);
        assert_eq!(config.autofocus.axis, Axis::Z);
        assert_eq!(config.autofocus.plan(), AutofocusPlan::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"
log_format = "json"

[stage]
driver_dir = "C:/Tango"
architecture = "32"
port = "COM4"
unit = "mm"

[autofocus]
axis = "z"
velocity = 20.0
passes = [{{ step_size = 50.0, steps = 5 }}, {{ step_size = 5.0, steps = 3 }}]
"#
        )
        .unwrap();

        let config = BiofumConfig::from_figment(Figment::new().merge(Toml::file(file.path())))
            .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.application.log_format, "json");
        assert_eq!(config.stage.port, "COM4");
        assert_eq!(config.stage.unit, Unit::Millimeter);
        assert_eq!(config.stage.architecture, Architecture::Bits32);
        assert_eq!(
            config.stage.library_path().unwrap(),
            PathBuf::from("C:/Tango").join("32").join("Tango_DLL.dll")
        );

        let plan = config.autofocus.plan();
        assert_eq!(plan.velocity, Some(20.0));
        assert_eq!(plan.passes, vec![FocusPass::new(50.0, 5), FocusPass::new(5.0, 3)]);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config =
            BiofumConfig::from_figment(Figment::new().merge(Toml::file(path))).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.autofocus.plan(), AutofocusPlan::default());
        assert!(config.stage.library_path().is_ok());
    }

    #[test]
    fn test_later_provider_overrides_file() {
        let config = BiofumConfig::from_figment(
            Figment::new()
                .merge(Toml::string("[stage]\nport = \"COM1\"\nbaud_rate = 9600"))
                .merge(Toml::string("[stage]\nport = \"COM7\"")),
        )
        .unwrap();
        assert_eq!(config.stage.port, "COM7");
        assert_eq!(config.stage.baud_rate, 9600);
    }

    #[test]
    fn test_architecture_accepts_numbers_and_names() {
        let numeric = from_toml("[stage]\narchitecture = 64");
        assert_eq!(numeric.stage.architecture, Architecture::Bits64);

        let named = from_toml("[stage]\narchitecture = \"AUTO\"");
        assert_eq!(named.stage.architecture, Architecture::Auto);

        let bad = BiofumConfig::from_figment(
            Figment::new().merge(Toml::string("[stage]\narchitecture = 16")),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_auto_architecture_follows_pointer_width() {
        let expected = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        assert_eq!(Architecture::Auto.dir_name(), expected);
        assert_eq!(Architecture::Bits32.dir_name(), "32");
    }

    #[test]
    fn test_library_path_override_wins() {
        let config = from_toml(
            "[stage]\ndriver_dir = \"C:/Tango\"\nlibrary_path = \"D:/custom/Tango_DLL.dll\"",
        );
        assert_eq!(
            config.stage.library_path().unwrap(),
            PathBuf::from("D:/custom/Tango_DLL.dll")
        );
    }

    #[test]
    fn test_missing_library_location() {
        let config = BiofumConfig::default();
        assert!(matches!(
            config.stage.library_path(),
            Err(ConfigError::MissingLibraryPath)
        ));
    }

    #[test]
    fn test_unknown_unit_rejected_at_load() {
        let result =
            BiofumConfig::from_figment(Figment::new().merge(Toml::string("[stage]\nunit = \"nm\"")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_axis_and_unit_names_ignore_case() {
        let config = from_toml("[stage]\nunit = \"Microsteps\"\n\n[autofocus]\naxis = \"Z\"");
        assert_eq!(config.stage.unit, Unit::Microsteps);
        assert_eq!(config.autofocus.axis, Axis::Z);

        let config = from_toml("[stage]\nunit = \"MM\"\n\n[autofocus]\naxis = \"Auxiliary\"");
        assert_eq!(config.stage.unit, Unit::Millimeter);
        assert_eq!(config.autofocus.axis, Axis::Auxiliary);

        // same spellings as the command line
        for name in ["millimeters", "deg", "inches", "Micrometer"] {
            let toml = format!("[stage]\nunit = \"{}\"", name);
            assert_eq!(from_toml(&toml).stage.unit, name.parse::<Unit>().unwrap());
        }
    }

    #[test]
    fn test_unknown_axis_rejected_at_load() {
        let result = BiofumConfig::from_figment(
            Figment::new().merge(Toml::string("[autofocus]\naxis = \"w\"")),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        assert!(err.to_string().contains("Unknown axis"), "{}", err);
    }

    #[test]
    fn test_focus_velocity_zero_keeps_current() {
        assert_eq!(from_toml("").autofocus.velocity, Some(15.0));
        assert_eq!(from_toml("[autofocus]\nvelocity = 8.5").autofocus.velocity, Some(8.5));

        let config = from_toml("[autofocus]\nvelocity = 0");
        assert_eq!(config.autofocus.velocity, None);
        assert_eq!(config.autofocus.plan().velocity, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = BiofumConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = BiofumConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_stage_settings() {
        let mut config = BiofumConfig::default();
        config.stage.port = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = BiofumConfig::default();
        config.stage.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = BiofumConfig::default();
        config.stage.baud_rate = u32::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_autofocus_pass() {
        let config = from_toml("[autofocus]\npasses = [{ step_size = 10.0, steps = 4 }]");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("odd"));
    }

    #[test]
    fn test_settings_from_stage_config() {
        let config = from_toml("[stage]\nport = \"COM9\"\nbaud_rate = 115200\nunit = \"degree\"");
        let settings = config.stage.settings().unwrap();
        assert_eq!(settings.port, "COM9");
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.unit, Unit::Degree);
        assert_eq!(settings.interface_type, 1);
        assert!(!settings.show_protocol);
    }
}
