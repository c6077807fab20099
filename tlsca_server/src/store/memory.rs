// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory certificate store backed by a local authority.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{CertificateStore, KeyUsage};
use crate::authority::CertificateAuthority;
use crate::error::{StoreError, StoreResult};
use crate::key::RequesterKey;

/// Certificate store that signs with an in-process authority and keeps the
/// latest certificate per identity and key usage.
pub struct MemoryCertificateStore {
    authority: Arc<CertificateAuthority>,
    max_validity_secs: i64,
    certificates: DashMap<(String, KeyUsage), Vec<u8>>,
    next_serial: AtomicU64,
    /// Forced failure for every call, used to exercise error paths.
    fault: RwLock<Option<String>>,
}

impl MemoryCertificateStore {
    /// Create a store issuing through `authority`.
    #[must_use]
    pub fn new(authority: Arc<CertificateAuthority>, max_validity_secs: i64) -> Self {
        Self {
            authority,
            max_validity_secs,
            certificates: DashMap::new(),
            // Serial 1 is the root certificate
            next_serial: AtomicU64::new(2),
            fault: RwLock::new(None),
        }
    }

    /// Number of stored certificates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether no certificate has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Make every subsequent call fail with a backend error.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.fault.write() = Some(reason.into());
    }

    /// Clear a failure set with [`Self::fail_with`].
    pub fn recover(&self) {
        *self.fault.write() = None;
    }

    fn check_fault(&self) -> StoreResult<()> {
        match self.fault.read().as_ref() {
            Some(reason) => Err(StoreError::Backend(reason.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MemoryCertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCertificateStore")
            .field("authority", &self.authority)
            .field("max_validity_secs", &self.max_validity_secs)
            .field("certificates", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn create_certificate(
        &self,
        identity: &str,
        public_key: &RequesterKey,
        usage: KeyUsage,
        validity_secs: i64,
    ) -> StoreResult<Vec<u8>> {
        self.check_fault()?;

        if validity_secs <= 0 || validity_secs > self.max_validity_secs {
            return Err(StoreError::InvalidValidity(format!(
                "{validity_secs}s is outside 1..={}s",
                self.max_validity_secs
            )));
        }

        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        let der = self
            .authority
            .issue(identity, public_key, usage, serial, validity_secs)?;

        self.certificates
            .insert((identity.to_string(), usage), der.clone());

        tracing::debug!(
            identity = %identity,
            usage = %usage,
            serial,
            "Certificate stored"
        );

        Ok(der)
    }

    async fn read_certificate(&self, identity: &str, usage: KeyUsage) -> StoreResult<Vec<u8>> {
        self.check_fault()?;

        self.certificates
            .get(&(identity.to_string(), usage))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("{identity} ({usage})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthorityConfig;
    use crate::signer::RequestSigningKey;
    use std::collections::HashSet;
    use x509_parser::parse_x509_certificate;

    fn store() -> MemoryCertificateStore {
        let authority = CertificateAuthority::generate(&AuthorityConfig::default()).unwrap();
        MemoryCertificateStore::new(Arc::new(authority), 86_400)
    }

    fn requester() -> RequesterKey {
        let key = RequestSigningKey::generate_p384();
        RequesterKey::from_spki_der(&key.public_key_der().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let store = store();
        let der = store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 3600)
            .await
            .unwrap();

        let read = store
            .read_certificate("alice", KeyUsage::KeyAgreement)
            .await
            .unwrap();
        assert_eq!(der, read);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = store();
        let err = store
            .read_certificate("nobody", KeyUsage::KeyAgreement)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_usage_is_part_of_the_key() {
        let store = store();
        store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 3600)
            .await
            .unwrap();

        assert!(store
            .read_certificate("alice", KeyUsage::DigitalSignature)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reissue_replaces_latest() {
        let store = store();
        let first = store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 3600)
            .await
            .unwrap();
        let second = store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 3600)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(
            store
                .read_certificate("alice", KeyUsage::KeyAgreement)
                .await
                .unwrap(),
            second
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_validity_bounds() {
        let store = store();
        let key = requester();

        for secs in [0, -1, 86_401] {
            let err = store
                .create_certificate("alice", &key, KeyUsage::KeyAgreement, secs)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidValidity(_)), "{secs}");
        }

        assert!(store
            .create_certificate("alice", &key, KeyUsage::KeyAgreement, 86_400)
            .await
            .is_ok());
        assert!(store.len() == 1);
    }

    #[tokio::test]
    async fn test_unbounded_store_rejects_far_future_expiry() {
        let authority = CertificateAuthority::generate(&AuthorityConfig::default()).unwrap();
        let store = MemoryCertificateStore::new(Arc::new(authority), i64::MAX);

        let err = store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 1_000_000_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValidity(_)));
        assert!(store.is_empty());

        assert!(store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 3600)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = store();
        store.fail_with("disk full");

        let err = store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 60)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Backend("disk full".to_string()));
        assert!(store.is_empty());

        store.recover();
        assert!(store
            .create_certificate("alice", &requester(), KeyUsage::KeyAgreement, 60)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_issuance_assigns_unique_serials() {
        let store = Arc::new(store());
        let mut handles = Vec::new();

        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .create_certificate(&format!("node{i}"), &requester(), KeyUsage::KeyAgreement, 60)
                    .await
                    .unwrap()
            }));
        }

        let mut serials = HashSet::new();
        for handle in handles {
            let der = handle.await.unwrap();
            let (_, cert) = parse_x509_certificate(&der).unwrap();
            serials.insert(cert.tbs_certificate.serial.to_string());
        }

        assert_eq!(serials.len(), 16);
        assert!(!serials.contains("1"));
        assert_eq!(store.len(), 16);
    }
}
