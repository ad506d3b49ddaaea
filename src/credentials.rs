//! Credential pool with round-robin rotation and usage accounting.
//!
//! **Why this exists**: the free tier of the extraction service rate-limits
//! per key. Running several keys and rotating away from the one that just
//! returned 429 keeps a batch of drawings moving instead of stalling on a
//! single exhausted quota.
//!
//! **Policy**: a circular cursor advances over the configured keys. A key
//! whose usage counter reached `USAGE_THRESHOLD` is skipped. If a full
//! circuit finds every key at the threshold, all counters (and exhausted
//! flags) reset and the first key is returned — forward progress is favored
//! over strict quota respect, since the upstream quota window may have
//! rolled over anyway. Keys are never removed from the pool.

use crate::error::ExtractionError;

/// Per-key request budget before the cursor starts skipping it.
pub const USAGE_THRESHOLD: u32 = 10;

/// How many trailing characters of a token are safe to log.
const ID_SUFFIX_LEN: usize = 6;

/// One API bearer token plus its process-lifetime accounting.
#[derive(Debug, Clone)]
pub struct Credential {
    token: String,
    usage: u32,
    exhausted: bool,
}

impl Credential {
    fn new(token: String) -> Self {
        Self { token, usage: 0, exhausted: false }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Short identifier for diagnostics. Never log the full token.
    pub fn id(&self) -> &str {
        let chars = self.token.chars().count();
        let skip = chars.saturating_sub(ID_SUFFIX_LEN);
        match self.token.char_indices().nth(skip) {
            Some((start, _)) => &self.token[start..],
            None => &self.token,
        }
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Ordered pool of credentials with a circular selection cursor.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: usize,
}

impl CredentialPool {
    /// Build a pool from an ordered token list. An empty list is rejected.
    pub fn new(tokens: Vec<String>) -> Result<Self, ExtractionError> {
        if tokens.is_empty() {
            return Err(ExtractionError::NoCredentials);
        }
        Ok(Self {
            credentials: tokens.into_iter().map(Credential::new).collect(),
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, index: usize) -> &Credential {
        &self.credentials[index]
    }

    /// Select the next usable credential and return its index.
    ///
    /// Advances the cursor past keys at/above [`USAGE_THRESHOLD`]. A full
    /// circuit with everything at the threshold triggers a full-pool reset:
    /// every counter and exhausted flag clears and the first key wins.
    pub fn next_credential(&mut self) -> usize {
        let n = self.credentials.len();
        for step in 0..n {
            let candidate = (self.cursor + step) % n;
            if self.credentials[candidate].usage < USAGE_THRESHOLD {
                self.cursor = (candidate + 1) % n;
                return candidate;
            }
        }

        tracing::warn!("All credentials at usage threshold; resetting pool counters");
        self.reset_all();
        self.cursor = 1 % n;
        0
    }

    /// Rotation order for one logical request: pool-size indices starting
    /// at the current selection. Bounds the dispatcher's retry loop.
    pub fn rotation(&mut self) -> Vec<usize> {
        let n = self.credentials.len();
        let first = self.next_credential();
        let mut order = Vec::with_capacity(n);
        order.push(first);
        for step in 1..n {
            order.push((first + step) % n);
        }
        order
    }

    /// Count one request attempt against a key. Called on success and
    /// failure alike — a failed attempt still spent quota.
    pub fn record_use(&mut self, index: usize) {
        self.credentials[index].usage += 1;
    }

    /// Flag a key that just returned a quota/auth error so later selection
    /// prefers its siblings. The key stays in the pool.
    pub fn mark_exhausted(&mut self, index: usize) {
        let cred = &mut self.credentials[index];
        cred.exhausted = true;
        tracing::warn!(key = cred.id(), usage = cred.usage, "Credential marked exhausted");
    }

    fn reset_all(&mut self) {
        for cred in &mut self.credentials {
            cred.usage = 0;
            cred.exhausted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| format!("sk-test-key-{i:04}")).collect()).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = CredentialPool::new(vec![]).unwrap_err();
        assert!(matches!(err, ExtractionError::NoCredentials));
    }

    #[test]
    fn id_is_token_suffix() {
        let p = pool(1);
        assert_eq!(p.get(0).id(), "y-0000");
    }

    #[test]
    fn id_of_short_token_is_whole_token() {
        let p = CredentialPool::new(vec!["abc".into()]).unwrap();
        assert_eq!(p.get(0).id(), "abc");
    }

    #[test]
    fn id_of_multibyte_token_takes_char_suffix() {
        let p = CredentialPool::new(vec!["sk-clé-sécrète-naïve".into()]).unwrap();
        assert_eq!(p.get(0).id(), "-naïve");
    }

    #[test]
    fn selection_round_robins() {
        let mut p = pool(3);
        assert_eq!(p.next_credential(), 0);
        assert_eq!(p.next_credential(), 1);
        assert_eq!(p.next_credential(), 2);
        assert_eq!(p.next_credential(), 0);
    }

    #[test]
    fn selection_skips_keys_at_threshold() {
        let mut p = pool(3);
        for _ in 0..USAGE_THRESHOLD {
            p.record_use(0);
        }
        assert_eq!(p.next_credential(), 1);
        assert_eq!(p.next_credential(), 2);
        assert_eq!(p.next_credential(), 1, "key 0 stays skipped");
    }

    #[test]
    fn full_pool_at_threshold_resets_and_returns_first() {
        let mut p = pool(2);
        for i in 0..2 {
            for _ in 0..USAGE_THRESHOLD {
                p.record_use(i);
            }
            p.mark_exhausted(i);
        }
        assert_eq!(p.next_credential(), 0);
        assert_eq!(p.get(0).usage(), 0);
        assert_eq!(p.get(1).usage(), 0);
        assert!(!p.get(0).is_exhausted());
        assert!(!p.get(1).is_exhausted());
    }

    #[test]
    fn record_use_increments() {
        let mut p = pool(1);
        p.record_use(0);
        p.record_use(0);
        assert_eq!(p.get(0).usage(), 2);
    }

    #[test]
    fn rotation_covers_whole_pool_once() {
        let mut p = pool(3);
        let order = p.rotation();
        assert_eq!(order.len(), 3);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn rotation_starts_where_cursor_points() {
        let mut p = pool(3);
        assert_eq!(p.next_credential(), 0);
        let order = p.rotation();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn single_key_pool_rotation_has_one_entry() {
        let mut p = pool(1);
        assert_eq!(p.rotation(), vec![0]);
    }

    #[test]
    fn exhausted_flag_does_not_remove_key() {
        let mut p = pool(2);
        p.mark_exhausted(0);
        assert_eq!(p.len(), 2);
        // Cursor still reaches key 0 while its usage is under threshold.
        assert_eq!(p.next_credential(), 0);
    }
}
