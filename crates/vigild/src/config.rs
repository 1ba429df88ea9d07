use std::path::PathBuf;

use vigil_core::{DisabledBackend, FaceBackend, OnnxBackend};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// TCP port for the HTTP server.
    pub listen_port: u16,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity tolerance for a positive match.
    pub tolerance: f32,
    /// Consecutive monitoring mismatches before an admin alert fires.
    pub alert_threshold: u32,
    /// Administrator accounts that receive security alerts.
    pub admin_recipients: Vec<String>,
    /// Which face-analysis backend to run.
    pub backend: BackendKind,
}

/// Backend selection, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SCRFD + ArcFace via ONNX Runtime.
    Onnx,
    /// No real recognition; verification runs on the byte-similarity fallback.
    Disabled,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigil");

        let db_path = std::env::var("VIGIL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("vigil.db"));

        let model_dir = std::env::var("VIGIL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let backend = match std::env::var("VIGIL_BACKEND").as_deref() {
            Ok("disabled") => BackendKind::Disabled,
            _ => BackendKind::Onnx,
        };

        Self {
            listen_port: env_u16("VIGIL_PORT", 8090),
            db_path,
            model_dir,
            tolerance: env_f32("VIGIL_TOLERANCE", vigil_core::verifier::DEFAULT_TOLERANCE),
            alert_threshold: env_u32("VIGIL_ALERT_THRESHOLD", 3),
            admin_recipients: env_list("VIGIL_ADMIN_RECIPIENTS", &["admin"]),
            backend,
        }
    }

    /// Construct the configured backend. Nothing heavy is loaded here; the
    /// ONNX sessions initialize lazily on first use.
    pub fn build_backend(&self) -> Box<dyn FaceBackend> {
        match self.backend {
            BackendKind::Onnx => Box::new(OnnxBackend::new(&self.model_dir)),
            BackendKind::Disabled => Box::new(DisabledBackend),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_list_parses_csv() {
        std::env::set_var("VIGIL_TEST_RECIPIENTS", "root, ops,,audit ");
        let parsed = env_list("VIGIL_TEST_RECIPIENTS", &["admin"]);
        assert_eq!(parsed, vec!["root", "ops", "audit"]);
        std::env::remove_var("VIGIL_TEST_RECIPIENTS");
    }

    #[test]
    fn test_env_list_default() {
        let parsed = env_list("VIGIL_TEST_UNSET", &["admin"]);
        assert_eq!(parsed, vec!["admin"]);
    }

    #[test]
    fn test_env_f32_bad_value_falls_back() {
        std::env::set_var("VIGIL_TEST_TOLERANCE", "not-a-number");
        assert_eq!(env_f32("VIGIL_TEST_TOLERANCE", 0.6), 0.6);
        std::env::remove_var("VIGIL_TEST_TOLERANCE");
    }
}
