// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit logging for certificate authority events.
//!
//! Records issuance, rejected requests, and revoke attempts for compliance and debugging.

#![allow(clippy::missing_panics_doc)]

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for audit logging.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Enable audit logging.
    pub enabled: bool,
    /// Log issued certificates.
    pub log_issuance: bool,
    /// Log rejected create requests.
    pub log_rejections: bool,
    /// Log certificate reads.
    pub log_reads: bool,
    /// Log revoke attempts.
    pub log_revocations: bool,
    /// Maximum entries to retain (0 = unlimited).
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_issuance: true,
            log_rejections: true,
            log_reads: false,
            log_revocations: true,
            max_entries: 100_000,
        }
    }
}

impl AuditConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable read logging.
    #[must_use]
    pub const fn with_read_logging(mut self) -> Self {
        self.log_reads = true;
        self
    }

    /// Disable rejection logging.
    #[must_use]
    pub const fn without_rejection_logging(mut self) -> Self {
        self.log_rejections = false;
        self
    }

    /// Set maximum entries to retain.
    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Disable audit logging.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Audit event types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEvent {
    /// A certificate was issued.
    CertificateIssued {
        /// Identity the certificate was issued to.
        identity: String,
        /// Curve of the requester key.
        curve: String,
        /// Requested validity in seconds.
        validity_secs: i64,
    },
    /// A certificate was returned to a reader.
    CertificateRead {
        /// Identity that was looked up.
        identity: String,
    },
    /// A create request named a key type the authority does not accept.
    UnsupportedKeyRejected {
        /// Claimed identity, if the request carried one.
        identity: Option<String>,
        /// Raw key type tag from the request.
        key_type: i32,
    },
    /// A create request failed proof of possession.
    SignatureRejected {
        /// Claimed identity.
        identity: String,
    },
    /// The certificate store failed to issue or look up a certificate.
    StoreFailure {
        /// Identity the store was asked about.
        identity: String,
        /// Store error description.
        reason: String,
    },
    /// A revoke call was made.
    RevokeAttempted {
        /// Whether the call came through the admin service.
        admin: bool,
    },
}

impl AuditEvent {
    /// Short name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CertificateIssued { .. } => "certificate_issued",
            Self::CertificateRead { .. } => "certificate_read",
            Self::UnsupportedKeyRejected { .. } => "unsupported_key_rejected",
            Self::SignatureRejected { .. } => "signature_rejected",
            Self::StoreFailure { .. } => "store_failure",
            Self::RevokeAttempted { .. } => "revoke_attempted",
        }
    }

    /// Identity the event is about, when it names one.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::CertificateIssued { identity, .. }
            | Self::CertificateRead { identity }
            | Self::SignatureRejected { identity }
            | Self::StoreFailure { identity, .. } => Some(identity),
            Self::UnsupportedKeyRejected { identity, .. } => identity.as_deref(),
            Self::RevokeAttempted { .. } => None,
        }
    }
}

/// Audit entry with timestamp and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: u64,
    /// The audit event.
    pub event: AuditEvent,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// Remote address of the client (if available).
    pub remote_addr: Option<String>,
}

/// Audit logger for authority events.
pub struct AuditLogger {
    entries: DashMap<u64, AuditEntry>,
    counter: AtomicU64,
    config: AuditConfig,
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    #[must_use]
    pub fn new(config: AuditConfig) -> Self {
        Self {
            entries: DashMap::new(),
            counter: AtomicU64::new(0),
            config,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn should_log(&self, event: &AuditEvent) -> bool {
        if !self.config.enabled {
            return false;
        }

        match event {
            AuditEvent::CertificateIssued { .. } => self.config.log_issuance,
            AuditEvent::CertificateRead { .. } => self.config.log_reads,
            AuditEvent::UnsupportedKeyRejected { .. } | AuditEvent::SignatureRejected { .. } => {
                self.config.log_rejections
            },
            AuditEvent::RevokeAttempted { .. } => self.config.log_revocations,
            AuditEvent::StoreFailure { .. } => true,
        }
    }

    /// Drop entries that fell out of the retention window ending at `newest`.
    fn evict_before(&self, newest: u64) {
        let max = self.config.max_entries as u64;
        if max == 0 || self.entries.len() as u64 <= max {
            return;
        }

        // Ids are allocated monotonically, so the window is an id range
        let oldest_kept = newest.saturating_sub(max - 1);
        self.entries.retain(|id, _| *id >= oldest_kept);
    }

    /// Record an audit event. Never fails; filtered events are dropped.
    pub fn record(&self, event: AuditEvent, remote_addr: Option<&str>) {
        if !self.should_log(&event) {
            return;
        }

        tracing::info!(
            target: "tlsca::audit",
            kind = event.kind(),
            identity = event.identity().unwrap_or("-"),
            remote_addr = remote_addr.unwrap_or("-"),
            "audit"
        );

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let entry = AuditEntry {
            id,
            event,
            timestamp: Self::now_millis(),
            remote_addr: remote_addr.map(ToString::to_string),
        };

        self.entries.insert(id, entry);
        self.evict_before(id);
    }

    /// Entries naming `identity`, oldest first.
    #[must_use]
    pub fn by_identity(&self, identity: &str) -> Vec<AuditEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.event.identity() == Some(identity))
            .map(|e| e.clone())
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    /// Get recent events, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.clone()).collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        entries
    }

    /// Get total event count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Check if audit logging is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &AuditConfig {
        &self.config
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}
