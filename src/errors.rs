use std::fmt;
use std::sync::PoisonError;
use thiserror::Error;

pub type AnalyzerResult<T, E = AnalyzerError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tree-sitter language error: {0}")]
    TreeSitter(#[from] tree_sitter::LanguageError),

    #[error("poisoned lock: {0}")]
    Poison(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Msg(String),
}

impl<T> From<PoisonError<T>> for AnalyzerError
where
    T: fmt::Debug,
{
    fn from(err: PoisonError<T>) -> Self {
        AnalyzerError::Poison(err.to_string())
    }
}

impl From<&str> for AnalyzerError {
    fn from(s: &str) -> Self {
        AnalyzerError::Msg(s.to_owned())
    }
}

impl From<String> for AnalyzerError {
    fn from(s: String) -> Self {
        AnalyzerError::Msg(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_retains_message() {
        let e = std::io::Error::new(std::io::ErrorKind::Other, "boom!");
        let n: AnalyzerError = e.into();
        assert!(matches!(n, AnalyzerError::Io(_)));
        assert!(n.to_string().contains("boom"));
    }

    #[test]
    fn poison_conversion_maps_correct_variant() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(()));
        {
            let lock2 = std::sync::Arc::clone(&lock);
            std::thread::spawn(move || {
                let _guard = lock2.lock().unwrap();
                panic!("intentional - poison the mutex");
            })
            .join()
            .ok();
        }

        let poison = lock.lock().unwrap_err();
        let err: AnalyzerError = poison.into();
        assert!(matches!(err, AnalyzerError::Poison(_)));
    }

    #[test]
    fn simple_string_into_msg() {
        let err: AnalyzerError = "plain msg".into();
        assert!(matches!(err, AnalyzerError::Msg(s) if s == "plain msg"));
    }
}
