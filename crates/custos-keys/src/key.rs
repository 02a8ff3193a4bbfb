//! Encryption key records.

use std::fmt;

use custos_core::{KeyPurpose, Timestamp};
use custos_crypto::{ALGORITHM, Secret32};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of an encryption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub Uuid);

impl KeyId {
    /// Create a new random key ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form.
    ///
    /// Returns `None` for anything that is not a UUID.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    /// Material generated.
    Generated,
    /// Became the active key of its purpose.
    Activated,
    /// Replaced as the active key.
    Deactivated,
    /// Exported under a password.
    Exported,
    /// Imported from an export blob.
    Imported,
    /// Material destroyed after its retention window.
    Purged,
}

/// One line of a key's own history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// When it happened.
    pub at: Timestamp,
    /// What happened.
    pub kind: KeyEventKind,
    /// Who caused it, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Free-form detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl KeyEvent {
    pub(crate) fn now(kind: KeyEventKind) -> Self {
        Self {
            at: Timestamp::now(),
            kind,
            actor: None,
            detail: None,
        }
    }

    pub(crate) fn by(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(String::from);
        self
    }

    pub(crate) fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A symmetric data-encryption key and its lifecycle metadata.
///
/// Key material is held in memory only; the serialized form carries
/// metadata alone (the key store seals material separately).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    /// Unique ID.
    #[serde(rename = "key_id")]
    pub id: KeyId,
    /// Per-purpose version, starting at 1.
    pub version: u32,
    /// Which active-key slot this key belongs to.
    pub purpose: KeyPurpose,
    /// Cipher algorithm tag.
    pub algorithm: String,
    /// When the key was generated (or imported).
    pub created_at: Timestamp,
    /// When the key becomes due for rotation.
    pub expires_at: Timestamp,
    /// Whether this is the active key of its purpose.
    pub is_active: bool,
    /// Number of encryptions performed with the key.
    pub usage_count: u64,
    /// Last encryption with the key.
    pub last_used_at: Option<Timestamp>,
    /// When the key stopped being active (start of its retention window).
    pub retired_at: Option<Timestamp>,
    /// When the material was destroyed.
    pub purged_at: Option<Timestamp>,
    /// Lifecycle history.
    pub audit_trail: Vec<KeyEvent>,
    #[serde(skip)]
    material: Option<Secret32>,
}

impl EncryptionKey {
    /// A fresh, inactive key with random material.
    #[must_use]
    pub fn generate(purpose: KeyPurpose, version: u32, rotation_interval_days: u32) -> Self {
        let created_at = Timestamp::now();
        Self {
            id: KeyId::new(),
            version,
            purpose,
            algorithm: ALGORITHM.to_string(),
            created_at,
            expires_at: created_at.plus_days(rotation_interval_days),
            is_active: false,
            usage_count: 0,
            last_used_at: None,
            retired_at: None,
            purged_at: None,
            audit_trail: vec![KeyEvent::now(KeyEventKind::Generated)],
            material: Some(Secret32::generate()),
        }
    }

    /// An inactive key rebuilt from exported material.
    ///
    /// The retention window starts at import, so a key that is never
    /// activated is eventually purged like any retired key.
    pub(crate) fn imported(
        id: KeyId,
        purpose: KeyPurpose,
        version: u32,
        created_at: Timestamp,
        expires_at: Timestamp,
        material: Secret32,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            version,
            purpose,
            algorithm: ALGORITHM.to_string(),
            created_at,
            expires_at,
            is_active: false,
            usage_count: 0,
            last_used_at: None,
            retired_at: Some(now),
            purged_at: None,
            audit_trail: Vec::new(),
            material: Some(material),
        }
    }

    /// Key material, or `None` once purged.
    #[must_use]
    pub fn material(&self) -> Option<&Secret32> {
        self.material.as_ref()
    }

    /// Whether the material has been destroyed.
    #[must_use]
    pub fn is_purged(&self) -> bool {
        self.material.is_none()
    }

    /// Whole days since creation.
    #[must_use]
    pub fn age_days(&self, now: &Timestamp) -> i64 {
        self.created_at.days_until(now)
    }

    pub(crate) fn set_material(&mut self, material: Option<Secret32>) {
        self.material = material;
    }

    pub(crate) fn activate(&mut self, actor: Option<&str>) {
        self.is_active = true;
        self.retired_at = None;
        self.audit_trail
            .push(KeyEvent::now(KeyEventKind::Activated).by(actor));
    }

    pub(crate) fn deactivate(&mut self, actor: Option<&str>, reason: &str) {
        self.is_active = false;
        self.retired_at = Some(Timestamp::now());
        self.audit_trail.push(
            KeyEvent::now(KeyEventKind::Deactivated)
                .by(actor)
                .detail(reason),
        );
    }

    pub(crate) fn purge(&mut self) {
        self.material = None;
        self.purged_at = Some(Timestamp::now());
        self.audit_trail.push(KeyEvent::now(KeyEventKind::Purged));
    }

    pub(crate) fn record(&mut self, event: KeyEvent) {
        self.audit_trail.push(event);
    }

    pub(crate) fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used_at = Some(Timestamp::now());
    }

    /// Metadata-only summary.
    #[must_use]
    pub fn status(&self) -> KeyStatus {
        KeyStatus {
            key_id: self.id,
            purpose: self.purpose,
            version: self.version,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_active: self.is_active,
        }
    }
}

/// Metadata snapshot of a key, free of material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStatus {
    /// Key ID.
    pub key_id: KeyId,
    /// Purpose.
    pub purpose: KeyPurpose,
    /// Version.
    pub version: u32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Rotation due time.
    pub expires_at: Timestamp,
    /// Whether active.
    pub is_active: bool,
}
