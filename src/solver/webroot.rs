use super::{Solver, SolverError};
use crate::challenge::{AuthorizationChallenge, HttpDataExtractor, HTTP_01};
use async_std::fs::{create_dir_all, remove_file, write};
use async_std::path::PathBuf;
use async_trait::async_trait;
use std::io::ErrorKind;

/// Writes `http-01` responses below the document root of a running web server.
#[derive(Debug, Clone)]
pub struct WebrootHttpSolver {
    webroot: PathBuf,
}

impl WebrootHttpSolver {
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        Self {
            webroot: webroot.into(),
        }
    }

    fn file(&self, challenge: &AuthorizationChallenge) -> Result<PathBuf, SolverError> {
        let token = challenge.token();
        let base64url = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if token.is_empty() || !token.chars().all(base64url) {
            return Err(SolverError::InvalidToken(token.to_string()));
        }
        let path = HttpDataExtractor::check_path(challenge);
        Ok(self.webroot.join(path.trim_start_matches('/')))
    }
}

#[async_trait]
impl Solver for WebrootHttpSolver {
    fn supports(&self, challenge: &AuthorizationChallenge) -> bool {
        challenge.kind() == HTTP_01
    }

    async fn solve(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        let file = self.file(challenge)?;
        if let Some(dir) = file.parent() {
            create_dir_all(dir).await?;
        }
        write(&file, HttpDataExtractor::check_content(challenge)).await?;
        log::info!("wrote challenge response for {} to {:?}", challenge.domain(), file);
        Ok(())
    }

    async fn cleanup(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        let file = self.file(challenge)?;
        match remove_file(&file).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
