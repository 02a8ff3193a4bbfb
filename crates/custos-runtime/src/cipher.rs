//! Field encryption with failed decryptions recorded in the ledger.

use std::sync::Arc;

use custos_audit::{AuditEvent, AuditLedger};
use custos_core::{ActorId, DataClassification, EventCategory, KeyPurpose, RiskLevel};
use custos_keys::{EncryptedPayload, FieldCipher, KeyError, KeyResult};
use tracing::{error, warn};
use zeroize::Zeroizing;

use crate::actions;

/// A [`FieldCipher`] that records every authentication failure on decrypt.
///
/// A payload that fails authentication was altered, or is being replayed
/// under the wrong associated data; either way it is a security event.
#[derive(Debug, Clone)]
pub struct AuditedCipher {
    cipher: FieldCipher,
    ledger: Arc<AuditLedger>,
}

impl AuditedCipher {
    /// Wrap `cipher`, auditing into `ledger`.
    #[must_use]
    pub fn new(cipher: FieldCipher, ledger: Arc<AuditLedger>) -> Self {
        Self { cipher, ledger }
    }

    /// The wrapped cipher.
    #[must_use]
    pub fn inner(&self) -> &FieldCipher {
        &self.cipher
    }

    /// Encrypt with the active key of `purpose`.
    ///
    /// # Errors
    ///
    /// See [`FieldCipher::encrypt`].
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        purpose: KeyPurpose,
        aad: Option<&str>,
    ) -> KeyResult<EncryptedPayload> {
        self.cipher.encrypt(plaintext, purpose, aad)
    }

    /// Encrypt a UTF-8 string.
    ///
    /// # Errors
    ///
    /// See [`FieldCipher::encrypt_str`].
    pub fn encrypt_str(
        &self,
        plaintext: &str,
        purpose: KeyPurpose,
        aad: Option<&str>,
    ) -> KeyResult<EncryptedPayload> {
        self.cipher.encrypt_str(plaintext, purpose, aad)
    }

    /// Decrypt on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// See [`FieldCipher::decrypt`]. [`KeyError::AuthenticationFailed`] is
    /// returned after the failure has been appended to the ledger.
    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        actor: &ActorId,
    ) -> KeyResult<Zeroizing<Vec<u8>>> {
        self.cipher
            .decrypt(payload)
            .inspect_err(|e| self.audit_failure(e, payload, actor))
    }

    /// Decrypt to a UTF-8 string on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// See [`decrypt`](Self::decrypt).
    pub fn decrypt_to_string(&self, payload: &EncryptedPayload, actor: &ActorId) -> KeyResult<String> {
        self.cipher
            .decrypt_to_string(payload)
            .inspect_err(|e| self.audit_failure(e, payload, actor))
    }

    fn audit_failure(&self, err: &KeyError, payload: &EncryptedPayload, actor: &ActorId) {
        if !matches!(err, KeyError::AuthenticationFailed) {
            return;
        }
        warn!(%actor, key_id = %payload.key_id, "Payload failed authentication");
        let event = AuditEvent::new(actor.clone(), actions::DECRYPT_AUTH_FAILED)
            .category(EventCategory::Security)
            .classification(DataClassification::Restricted)
            .resource("encrypted_payload", payload.key_id.clone())
            .description("payload failed authentication on decrypt")
            .risk_hint(RiskLevel::High)
            .meta("key_id", payload.key_id.clone())
            .meta("key_version", payload.key_version)
            .failed();
        if let Err(e) = self.ledger.append(event) {
            error!(error = %e, "Failed to record decrypt authentication failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::harness;
    use custos_audit::AuditFilter;
    use custos_core::Outcome;

    fn reader() -> ActorId {
        ActorId::new("coach-17").unwrap()
    }

    #[test]
    fn test_round_trip_writes_nothing() {
        let h = harness();
        let cipher = AuditedCipher::new(FieldCipher::new(Arc::clone(&h.keys)), Arc::clone(&h.ledger));

        let payload = cipher
            .encrypt_str("session note", KeyPurpose::Data, Some("client:42"))
            .unwrap();
        assert_eq!(cipher.decrypt_to_string(&payload, &reader()).unwrap(), "session note");
        assert_eq!(h.ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_authentication_failure_is_audited() {
        let h = harness();
        let cipher = AuditedCipher::new(FieldCipher::new(Arc::clone(&h.keys)), Arc::clone(&h.ledger));

        let mut payload = cipher
            .encrypt(b"card ending 4242", KeyPurpose::Transit, Some("payment:9"))
            .unwrap();
        payload.metadata = Some("payment:10".into());

        let err = cipher.decrypt(&payload, &reader()).unwrap_err();
        assert!(matches!(err, KeyError::AuthenticationFailed));

        let page = h
            .ledger
            .query(&AuditFilter::default().action(actions::DECRYPT_AUTH_FAILED))
            .unwrap();
        assert_eq!(page.total_matching, 1);
        let entry = &page.entries[0];
        assert_eq!(entry.actor, reader());
        assert_eq!(entry.outcome, Outcome::Failure);
        assert_eq!(entry.category, EventCategory::Security);
        assert!(entry.risk_level >= RiskLevel::High);
    }

    #[test]
    fn test_other_failures_are_not_audited() {
        let h = harness();
        let cipher = AuditedCipher::new(FieldCipher::new(Arc::clone(&h.keys)), Arc::clone(&h.ledger));

        let mut payload = cipher.encrypt(b"x", KeyPurpose::Data, None).unwrap();
        payload.algorithm = "rot13".into();
        assert!(matches!(
            cipher.decrypt(&payload, &reader()),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(h.ledger.count().unwrap(), 0);
    }
}
