use breeze::prompt::{load_system_prompt_file, DEFAULT_SYSTEM_PROMPT};
use breeze::providers::configs::{
    OpenAiProviderConfig, OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL,
};
use breeze::systems::Launchers;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Looked up in the working directory unless `BREEZE_CONFIG` points elsewhere
pub const DEFAULT_CONFIG_FILE: &str = "breeze.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid system prompt: {0}")]
    SystemPrompt(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings key onto the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    field.to_uppercase()
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub model: String,
    pub openai_api_key: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    pub system_prompt: String,
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    /// Extra suffix to interpreter entries, on top of the built-in ones.
    /// An empty interpreter runs files with that suffix as native executables.
    #[serde(default)]
    pub launchers: BTreeMap<String, String>,
    #[serde(default)]
    server_env: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var("BREEZE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    /// Defaults, then the optional TOML file at `path`, then environment variables
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("base_url", OPENAI_DEFAULT_BASE_URL)?
            .set_default("model", OPENAI_DEFAULT_MODEL)?
            .set_default("system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::default().try_parsing(false))
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => settings.validate(),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `openai_api_key`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("openai_api_key"),
            });
        }
        Ok(self)
    }

    pub fn provider_config(&self) -> OpenAiProviderConfig {
        let mut config = OpenAiProviderConfig::new(self.openai_api_key.as_str())
            .with_base_url(self.base_url.as_str())
            .with_model(self.model.as_str());
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        config
    }

    /// Built-in launchers extended (or overridden) by the configured ones
    pub fn launchers(&self) -> Launchers {
        self.launchers
            .iter()
            .fold(Launchers::default(), |launchers, (suffix, program)| {
                launchers.with_launcher(suffix.as_str(), program.as_str())
            })
    }

    /// Variables passed to the tool server besides the inherited allowlist.
    /// Names are uppercased since configuration keys are case-insensitive.
    pub fn server_env(&self) -> BTreeMap<String, String> {
        self.server_env
            .iter()
            .map(|(name, value)| (name.to_uppercase(), value.clone()))
            .collect()
    }

    /// The prompt file wins over the inline setting
    pub fn system_prompt(&self) -> Result<String, ConfigError> {
        match &self.system_prompt_file {
            Some(path) => load_system_prompt_file(path)
                .map_err(|e| ConfigError::SystemPrompt(format!("{:#}", e))),
            None => Ok(self.system_prompt.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breeze::systems::{Launch, NO_SUFFIX};
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VARS: &[&str] = &[
        "BASE_URL",
        "MODEL",
        "OPENAI_API_KEY",
        "SYSTEM_PROMPT",
        "SYSTEM_PROMPT_FILE",
        "TEMPERATURE",
        "MAX_TOKENS",
    ];

    fn clean_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    fn no_file() -> PathBuf {
        PathBuf::from("/definitely/not/here/breeze.toml")
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("OPENAI_API_KEY", "test-key");

        let settings = Settings::load(&no_file()).unwrap();
        assert_eq!(settings.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.openai_api_key, "test-key");
        assert_eq!(settings.system_prompt().unwrap(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.launchers(), Launchers::default());
        assert!(settings.server_env().is_empty());

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();

        let err = Settings::load(&no_file()).unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => assert_eq!(env_var, "OPENAI_API_KEY"),
            other => panic!("expected a missing variable error, got {:?}", other),
        }

        env::set_var("OPENAI_API_KEY", "   ");
        assert!(matches!(
            Settings::load(&no_file()),
            Err(ConfigError::MissingEnvVar { .. })
        ));
        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("OPENAI_API_KEY", "test-key");
        env::set_var("BASE_URL", "http://localhost:8080/v1");
        env::set_var("MODEL", "qwen-plus");

        let settings = Settings::load(&no_file()).unwrap();
        let provider = settings.provider_config();
        assert_eq!(
            provider.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(provider.model, "qwen-plus");
        assert_eq!(provider.api_key, "test-key");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_file_settings() {
        clean_env();
        env::set_var("OPENAI_API_KEY", "test-key");

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
model = "from-file"
system_prompt = "Only talk about the weather."
temperature = 0.2

[launchers]
sh = "sh"
py = "python3"
bin = ""

[server_env]
API_KEY = "weather-key"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.model, "from-file");
        assert_eq!(settings.temperature, Some(0.2));
        assert_eq!(
            settings.system_prompt().unwrap(),
            "Only talk about the weather."
        );
        assert_eq!(settings.server_env()["API_KEY"], "weather-key");

        let launchers = settings.launchers();
        assert_eq!(
            launchers.suffixes().collect::<Vec<_>>(),
            vec![NO_SUFFIX, "bin", "js", "py", "sh"]
        );
        assert_eq!(launchers.kind("bin"), Some(&Launch::Native));
        assert_eq!(
            launchers.resolve(Path::new("servers/weather.bin")).unwrap().program,
            "servers/weather.bin"
        );
        assert_eq!(
            launchers.resolve(Path::new("server.py")).unwrap().program,
            "python3"
        );

        // the environment still wins over the file
        env::set_var("MODEL", "from-env");
        assert_eq!(Settings::load(file.path()).unwrap().model, "from-env");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_system_prompt_file() {
        clean_env();
        env::set_var("OPENAI_API_KEY", "test-key");

        let mut prompt = NamedTempFile::new().unwrap();
        writeln!(prompt, "Answer in one sentence.").unwrap();
        env::set_var("SYSTEM_PROMPT_FILE", prompt.path());

        let settings = Settings::load(&no_file()).unwrap();
        assert_eq!(settings.system_prompt().unwrap(), "Answer in one sentence.");

        env::set_var("SYSTEM_PROMPT_FILE", "/definitely/not/here.md");
        let settings = Settings::load(&no_file()).unwrap();
        assert!(matches!(
            settings.system_prompt(),
            Err(ConfigError::SystemPrompt(_))
        ));

        clean_env();
    }
}
