//! Request dispatcher with bounded credential rotation.
//!
//! One logical request gets one pass over the credential pool, in rotation
//! order. Retryable failures (quota, auth) flag the key and move on to the
//! next; terminal failures surface immediately. Retries are strictly
//! sequential — a second attempt never starts before the first's outcome
//! is known, which keeps usage counters accurate without locking.

use crate::client::VisionClient;
use crate::credentials::CredentialPool;
use crate::error::ExtractionError;

/// Send one instruction + image request, rotating credentials on
/// retryable failures. Exhausting the pool yields
/// [`ExtractionError::AllCredentialsExhausted`].
pub fn dispatch(
    client: &dyn VisionClient,
    pool: &mut CredentialPool,
    instruction: &str,
    image_data_url: &str,
) -> Result<String, ExtractionError> {
    for index in pool.rotation() {
        pool.record_use(index);
        let cred = pool.get(index);
        let key_id = cred.id().to_string();

        match client.complete(cred.token(), instruction, image_data_url) {
            Ok(text) => {
                tracing::debug!(key = %key_id, "Request succeeded");
                return Ok(text);
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(key = %key_id, error = %e, "Retryable failure, rotating credential");
                pool.mark_exhausted(index);
            }
            Err(e) => {
                tracing::warn!(key = %key_id, error = %e, "Terminal API failure");
                return Err(e);
            }
        }
    }

    tracing::error!("Credential pool exhausted for this request");
    Err(ExtractionError::AllCredentialsExhausted)
}
