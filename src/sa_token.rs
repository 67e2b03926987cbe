//! Local Kubernetes service-account token source.

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::validator::config::DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH;

/// Read the local service-account token from disk.
///
/// Never cached across calls: the kubelet rotates the file in place, so
/// each call re-reads the current token. Trims surrounding whitespace;
/// empty or whitespace-only content is [`Error::CredentialInvalid`]. `ctx`
/// is honored across the read; cancellation aborts the in-flight read and
/// surfaces as [`Error::TransientFetch`].
pub async fn read_service_account_token(ctx: &CancellationToken, path: &str) -> Result<String> {
    let contents = tokio::select! {
        () = ctx.cancelled() => return Err(Error::TransientFetch(format!(
            "read of service account token at {path} was canceled"
        ))),
        result = tokio::fs::read_to_string(path) => result.map_err(|e| Error::CredentialInvalid(
            format!("failed to read service account token at {path}: {e}")
        ))?,
    };

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(Error::CredentialInvalid(format!(
            "service account token at {path} was empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Read the service-account token from the default well-known path.
pub async fn read_default_service_account_token(ctx: &CancellationToken) -> Result<String> {
    read_service_account_token(ctx, DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH).await
}
