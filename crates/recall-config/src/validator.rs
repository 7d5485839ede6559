//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

const KNOWN_PROVIDERS: [&str; 2] = ["none", "ollama"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a `ConfigError`, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(e) => Err(ConfigError::InvalidValue {
                field: e.path,
                message: e.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_search(config, &mut result);
        Self::validate_cache(config, &mut result);
        Self::validate_history(config, &mut result);
        Self::validate_indexer(config, &mut result);
        Self::validate_embedding(config, &mut result);
        Self::validate_guard(config, &mut result);

        Ok(result)
    }

    fn validate_search(config: &Config, result: &mut ValidationResult) {
        let search = &config.search;
        for (path, weight) in [
            ("search.lexical_weight", search.lexical_weight),
            ("search.vector_weight", search.vector_weight),
        ] {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                result.add_error(ValidationError::new(
                    path,
                    format!("weight must be within [0, 1], got {}", weight),
                ));
            }
        }

        if search.lexical_weight == 0.0 && search.vector_weight == 0.0 {
            result.add_warning(ValidationWarning::new(
                "search",
                "both weights are 0, modalities will be weighted equally",
            ));
        }

        if search.top_k == 0 {
            result.add_error(ValidationError::new(
                "search.top_k",
                "top_k must be at least 1",
            ));
        }

        if search.vector_timeout_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "search.vector_timeout_ms",
                "a zero timeout makes every vector lookup degrade to lexical-only",
            ));
        }
    }

    fn validate_cache(config: &Config, result: &mut ValidationResult) {
        let cache = &config.cache;
        if !cache.enabled {
            result.add_warning(ValidationWarning::new(
                "cache.enabled",
                "query cache is disabled",
            ));
        }

        if cache.max_entries == 0 {
            result.add_error(ValidationError::new(
                "cache.max_entries",
                "max_entries must be at least 1",
            ));
        }

        let t = cache.similarity_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            result.add_error(ValidationError::new(
                "cache.similarity_threshold",
                format!("similarity_threshold must be within (0, 1], got {}", t),
            ));
        }
    }

    fn validate_history(config: &Config, result: &mut ValidationResult) {
        if config.history.enabled && config.history.max_records == 0 {
            result.add_error(ValidationError::new(
                "history.max_records",
                "max_records must be at least 1 while history is enabled",
            ));
        }
    }

    fn validate_indexer(config: &Config, result: &mut ValidationResult) {
        if config.indexer.extensions.is_empty() {
            result.add_warning(ValidationWarning::new(
                "indexer.extensions",
                "no extensions configured, reconcile will find no documents",
            ));
        }
        if config.indexer.max_depth == 0 {
            result.add_error(ValidationError::new(
                "indexer.max_depth",
                "max_depth must be at least 1",
            ));
        }
    }

    fn validate_embedding(config: &Config, result: &mut ValidationResult) {
        let embedding = &config.embedding;
        if !KNOWN_PROVIDERS.contains(&embedding.provider.as_str()) {
            result.add_error(ValidationError::new(
                "embedding.provider",
                format!(
                    "Unknown embedding provider '{}', valid values: {:?}",
                    embedding.provider, KNOWN_PROVIDERS
                ),
            ));
        }

        if embedding.dimension == 0 {
            result.add_error(ValidationError::new(
                "embedding.dimension",
                "dimension must be at least 1",
            ));
        }

        if embedding.is_enabled()
            && !embedding.base_url.starts_with("http://")
            && !embedding.base_url.starts_with("https://")
        {
            result.add_error(ValidationError::new(
                "embedding.base_url",
                "base_url must start with http:// or https://",
            ));
        }
    }

    fn validate_guard(config: &Config, result: &mut ValidationResult) {
        if config.guard.max_snapshots == 0 {
            result.add_error(ValidationError::new(
                "guard.max_snapshots",
                "max_snapshots must be at least 1",
            ));
        }

        for file in &config.guard.protected_files {
            if file.is_empty() {
                result.add_error(ValidationError::new(
                    "guard.protected_files",
                    "protected file path cannot be empty",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
